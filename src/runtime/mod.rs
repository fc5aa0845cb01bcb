pub mod coercion;
pub mod evaluation;
pub mod logical;

// Re-export the main public functions
pub use evaluation::eval;
pub use logical::{expressions_are_equal_with_constant_substitution, implies};
