use crate::constants::ConstantRegistry;
use crate::context::ContextLookup;
use crate::runtime::{self, coercion, logical};
use crate::types::{ContextValue, Literal, Pattern};
use std::cmp::Ordering;
use std::fmt::{Debug, Display, Formatter};
use std::sync::{Arc, OnceLock, Weak};

/// The node variants, declared in canonical order: sorting AND/OR operands
/// compares this order first.
#[derive(Debug, Clone)]
pub enum ExprKind {
    False,
    True,
    Defined(String),
    Not(String),
    Equals(String, Literal),
    NotEquals(String, Literal),
    And(Vec<Expr>),
    /// `None` when the literal did not compile; such a node never matches.
    Regex(String, Option<Pattern>),
    /// Always wraps a `Regex` node.
    NotRegex(Expr),
    Or(Vec<Expr>),
    In(String, String),
    NotIn(String, String),
    Greater(String, Literal),
    GreaterEquals(String, Literal),
    Smaller(String, Literal),
    SmallerEquals(String, Literal),
}

impl ExprKind {
    pub fn tag(&self) -> u8 {
        match self {
            ExprKind::False => 0,
            ExprKind::True => 1,
            ExprKind::Defined(_) => 2,
            ExprKind::Not(_) => 3,
            ExprKind::Equals(..) => 4,
            ExprKind::NotEquals(..) => 5,
            ExprKind::And(_) => 6,
            ExprKind::Regex(..) => 7,
            ExprKind::NotRegex(_) => 8,
            ExprKind::Or(_) => 9,
            ExprKind::In(..) => 10,
            ExprKind::NotIn(..) => 11,
            ExprKind::Greater(..) => 12,
            ExprKind::GreaterEquals(..) => 13,
            ExprKind::Smaller(..) => 14,
            ExprKind::SmallerEquals(..) => 15,
        }
    }
}

enum Negation {
    Computed(Expr),
    /// This node was produced by negating `origin`; negating it again hands
    /// the origin back while it is alive.
    Origin(Weak<Node>),
}

struct Node {
    kind: ExprKind,
    negated: OnceLock<Negation>,
}

/// An immutable when-clause expression. Cloning is a reference-count bump.
#[derive(Clone)]
pub struct Expr(Arc<Node>);

lazy_static::lazy_static! {
    static ref FALSE: Expr = Expr::from_kind(ExprKind::False);
    static ref TRUE: Expr = Expr::from_kind(ExprKind::True);
}

/// Rewrites the leaves of an expression; compound nodes are rebuilt (and
/// renormalized) around the mapped leaves.
pub trait ExprMapper {
    fn map_defined(&self, key: &str) -> Expr {
        Expr::has(key)
    }
    fn map_not(&self, key: &str) -> Expr {
        Expr::not(key)
    }
    fn map_equals(&self, key: &str, value: &Literal) -> Expr {
        Expr::from_kind(ExprKind::Equals(key.to_string(), value.clone()))
    }
    fn map_not_equals(&self, key: &str, value: &Literal) -> Expr {
        Expr::from_kind(ExprKind::NotEquals(key.to_string(), value.clone()))
    }
    fn map_greater(&self, key: &str, value: &Literal) -> Expr {
        Expr::from_kind(ExprKind::Greater(key.to_string(), value.clone()))
    }
    fn map_greater_equals(&self, key: &str, value: &Literal) -> Expr {
        Expr::from_kind(ExprKind::GreaterEquals(key.to_string(), value.clone()))
    }
    fn map_smaller(&self, key: &str, value: &Literal) -> Expr {
        Expr::from_kind(ExprKind::Smaller(key.to_string(), value.clone()))
    }
    fn map_smaller_equals(&self, key: &str, value: &Literal) -> Expr {
        Expr::from_kind(ExprKind::SmallerEquals(key.to_string(), value.clone()))
    }
    fn map_regex(&self, key: &str, pattern: Option<&Pattern>) -> Expr {
        Expr::regex(key, pattern.cloned())
    }
    fn map_in(&self, key: &str, value_key: &str) -> Expr {
        Expr::in_(key, value_key)
    }
    fn map_not_in(&self, key: &str, value_key: &str) -> Expr {
        Expr::not_in(key, value_key)
    }
}

impl Expr {
    pub(crate) fn from_kind(kind: ExprKind) -> Self {
        Expr(Arc::new(Node { kind, negated: OnceLock::new() }))
    }

    pub fn kind(&self) -> &ExprKind {
        &self.0.kind
    }

    /// Whether both handles point at the very same node.
    pub fn ptr_eq(a: &Expr, b: &Expr) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }

    // ---- constructors ----

    pub fn false_() -> Expr {
        FALSE.clone()
    }

    pub fn true_() -> Expr {
        TRUE.clone()
    }

    pub fn bool(value: bool) -> Expr {
        if value {
            Expr::true_()
        } else {
            Expr::false_()
        }
    }

    pub fn has(key: impl Into<String>) -> Expr {
        Expr::from_kind(ExprKind::Defined(key.into()))
    }

    pub fn not(key: impl Into<String>) -> Expr {
        Expr::from_kind(ExprKind::Not(key.into()))
    }

    /// `key == value`. A boolean value collapses to `has`/`not`.
    pub fn equals(key: impl Into<String>, value: impl Into<ContextValue>) -> Expr {
        match value.into() {
            ContextValue::Bool(true) => Expr::has(key),
            ContextValue::Bool(false) => Expr::not(key),
            other => Expr::from_kind(ExprKind::Equals(key.into(), equality_literal(other))),
        }
    }

    /// `key != value`. A boolean value collapses to `not`/`has`.
    pub fn not_equals(key: impl Into<String>, value: impl Into<ContextValue>) -> Expr {
        match value.into() {
            ContextValue::Bool(true) => Expr::not(key),
            ContextValue::Bool(false) => Expr::has(key),
            other => Expr::from_kind(ExprKind::NotEquals(key.into(), equality_literal(other))),
        }
    }

    pub fn regex(key: impl Into<String>, pattern: Option<Pattern>) -> Expr {
        Expr::from_kind(ExprKind::Regex(key.into(), pattern))
    }

    pub fn in_(key: impl Into<String>, value_key: impl Into<String>) -> Expr {
        Expr::from_kind(ExprKind::In(key.into(), value_key.into()))
    }

    pub fn not_in(key: impl Into<String>, value_key: impl Into<String>) -> Expr {
        Expr::from_kind(ExprKind::NotIn(key.into(), value_key.into()))
    }

    pub fn greater(key: impl Into<String>, value: impl Into<ContextValue>) -> Expr {
        relational(value.into(), |v| ExprKind::Greater(key.into(), v))
    }

    pub fn greater_equals(key: impl Into<String>, value: impl Into<ContextValue>) -> Expr {
        relational(value.into(), |v| ExprKind::GreaterEquals(key.into(), v))
    }

    pub fn smaller(key: impl Into<String>, value: impl Into<ContextValue>) -> Expr {
        relational(value.into(), |v| ExprKind::Smaller(key.into(), v))
    }

    pub fn smaller_equals(key: impl Into<String>, value: impl Into<ContextValue>) -> Expr {
        relational(value.into(), |v| ExprKind::SmallerEquals(key.into(), v))
    }

    /// Conjunction with full normalization; `None` for an empty list.
    pub fn and(exprs: Vec<Expr>) -> Option<Expr> {
        Expr::and_with(exprs, true)
    }

    /// Disjunction with full normalization; `None` for an empty list.
    pub fn or(exprs: Vec<Expr>) -> Option<Expr> {
        Expr::or_with(exprs, true)
    }

    /// Parses a serialized when-clause with a default parser.
    pub fn deserialize(input: &str) -> Option<Expr> {
        crate::parser::Parser::new().parse(input)
    }

    pub(crate) fn and_with(exprs: Vec<Expr>, redundancy_check: bool) -> Option<Expr> {
        let mut expr: Vec<Expr> = Vec::with_capacity(exprs.len());
        let mut has_true = false;
        for e in exprs {
            match e.kind() {
                ExprKind::True => {
                    has_true = true;
                    continue;
                }
                ExprKind::False => return Some(Expr::false_()),
                ExprKind::And(items) => {
                    expr.extend(items.iter().cloned());
                    continue;
                }
                _ => {}
            }
            expr.push(e);
        }

        if expr.is_empty() {
            return has_true.then(Expr::true_);
        }
        if expr.len() == 1 {
            return expr.pop();
        }

        expr.sort();
        expr.dedup();
        if expr.len() == 1 {
            return expr.pop();
        }

        // No parentheses in the canonical form: an OR operand is distributed
        // over its neighbour until none is left.
        while expr.len() > 1 {
            let Some(pos) = expr.iter().position(|e| matches!(e.kind(), ExprKind::Or(_))) else {
                break;
            };
            let or_items = match expr.remove(pos).kind() {
                ExprKind::Or(items) => items.clone(),
                _ => break,
            };
            let neighbour = expr.remove(if pos > 0 { pos - 1 } else { 0 });
            let is_finished = expr.is_empty();
            let distributed: Vec<Expr> = or_items
                .into_iter()
                .filter_map(|el| Expr::and_with(vec![el, neighbour.clone()], redundancy_check))
                .collect();
            if let Some(result) = Expr::or_with(distributed, is_finished) {
                expr.push(result);
                expr.sort();
            }
        }

        if expr.len() == 1 {
            return expr.pop();
        }

        if redundancy_check && has_complementary_pair(&expr) {
            // a && !a
            return Some(Expr::false_());
        }

        Some(Expr::from_kind(ExprKind::And(expr)))
    }

    pub(crate) fn or_with(exprs: Vec<Expr>, redundancy_check: bool) -> Option<Expr> {
        let mut expr: Vec<Expr> = Vec::with_capacity(exprs.len());
        let mut has_false = false;
        for e in exprs {
            match e.kind() {
                ExprKind::False => {
                    has_false = true;
                    continue;
                }
                ExprKind::True => return Some(Expr::true_()),
                ExprKind::Or(items) => {
                    expr.extend(items.iter().cloned());
                    continue;
                }
                _ => {}
            }
            expr.push(e);
        }

        if expr.is_empty() {
            return has_false.then(Expr::false_);
        }
        expr.sort();
        if expr.len() == 1 {
            return expr.pop();
        }

        expr.dedup();
        if expr.len() == 1 {
            return expr.pop();
        }

        if redundancy_check && has_complementary_pair(&expr) {
            // a || !a
            return Some(Expr::true_());
        }

        Some(Expr::from_kind(ExprKind::Or(expr)))
    }

    // ---- queries ----

    pub fn evaluate(&self, context: &dyn ContextLookup) -> bool {
        runtime::eval(self, context)
    }

    pub fn serialize(&self) -> String {
        match self.kind() {
            ExprKind::False => "false".to_string(),
            ExprKind::True => "true".to_string(),
            ExprKind::Defined(key) => key.clone(),
            ExprKind::Not(key) => format!("!{}", key),
            ExprKind::Equals(key, value) => format!("{} == '{}'", key, value),
            ExprKind::NotEquals(key, value) => format!("{} != '{}'", key, value),
            ExprKind::And(items) => join(items, " && "),
            ExprKind::Or(items) => join(items, " || "),
            ExprKind::Regex(key, Some(pattern)) => format!("{} =~ {}", key, pattern),
            ExprKind::Regex(key, None) => format!("{} =~ /invalid/", key),
            ExprKind::NotRegex(inner) => format!("!({})", inner.serialize()),
            ExprKind::In(key, value_key) => format!("{} in '{}'", key, value_key),
            ExprKind::NotIn(key, value_key) => format!("{} not in '{}'", key, value_key),
            ExprKind::Greater(key, value) => format!("{} > {}", key, value),
            ExprKind::GreaterEquals(key, value) => format!("{} >= {}", key, value),
            ExprKind::Smaller(key, value) => format!("{} < {}", key, value),
            ExprKind::SmallerEquals(key, value) => format!("{} <= {}", key, value),
        }
    }

    /// Every context key the expression reads, in operand order.
    pub fn keys(&self) -> Vec<String> {
        match self.kind() {
            ExprKind::False | ExprKind::True => Vec::new(),
            ExprKind::Defined(key)
            | ExprKind::Not(key)
            | ExprKind::Equals(key, _)
            | ExprKind::NotEquals(key, _)
            | ExprKind::Regex(key, _)
            | ExprKind::Greater(key, _)
            | ExprKind::GreaterEquals(key, _)
            | ExprKind::Smaller(key, _)
            | ExprKind::SmallerEquals(key, _) => vec![key.clone()],
            ExprKind::In(key, value_key) | ExprKind::NotIn(key, value_key) => vec![key.clone(), value_key.clone()],
            ExprKind::NotRegex(inner) => inner.keys(),
            ExprKind::And(items) | ExprKind::Or(items) => items.iter().flat_map(Expr::keys).collect(),
        }
    }

    pub fn map(&self, mapper: &dyn ExprMapper) -> Expr {
        match self.kind() {
            ExprKind::False | ExprKind::True => self.clone(),
            ExprKind::Defined(key) => mapper.map_defined(key),
            ExprKind::Not(key) => mapper.map_not(key),
            ExprKind::Equals(key, value) => mapper.map_equals(key, value),
            ExprKind::NotEquals(key, value) => mapper.map_not_equals(key, value),
            ExprKind::Regex(key, pattern) => mapper.map_regex(key, pattern.as_ref()),
            ExprKind::NotRegex(inner) => {
                let mapped = inner.map(mapper);
                match mapped.kind() {
                    ExprKind::Regex(..) => Expr::from_kind(ExprKind::NotRegex(mapped)),
                    _ => mapped.negate(),
                }
            }
            ExprKind::In(key, value_key) => mapper.map_in(key, value_key),
            ExprKind::NotIn(key, value_key) => mapper.map_not_in(key, value_key),
            ExprKind::Greater(key, value) => mapper.map_greater(key, value),
            ExprKind::GreaterEquals(key, value) => mapper.map_greater_equals(key, value),
            ExprKind::Smaller(key, value) => mapper.map_smaller(key, value),
            ExprKind::SmallerEquals(key, value) => mapper.map_smaller_equals(key, value),
            ExprKind::And(items) => {
                Expr::and_with(items.iter().map(|e| e.map(mapper)).collect(), false).unwrap_or_else(Expr::true_)
            }
            ExprKind::Or(items) => {
                Expr::or_with(items.iter().map(|e| e.map(mapper)).collect(), false).unwrap_or_else(Expr::false_)
            }
        }
    }

    /// The logical complement. Computed once per node; negating the result
    /// again yields this node back.
    pub fn negate(&self) -> Expr {
        match self.kind() {
            ExprKind::False => return Expr::true_(),
            ExprKind::True => return Expr::false_(),
            ExprKind::Regex(..) => return Expr::from_kind(ExprKind::NotRegex(self.clone())),
            ExprKind::NotRegex(inner) => return inner.clone(),
            _ => {}
        }
        if let Some(cached) = self.cached_negation() {
            return cached;
        }
        let negated = logical::negate(self);
        match self.0.negated.set(Negation::Computed(negated.clone())) {
            Ok(()) => {
                negated.remember_origin(self);
                negated
            }
            // another thread got there first
            Err(_) => self.cached_negation().unwrap_or(negated),
        }
    }

    fn cached_negation(&self) -> Option<Expr> {
        match self.0.negated.get()? {
            Negation::Computed(e) => Some(e.clone()),
            Negation::Origin(origin) => origin.upgrade().map(Expr),
        }
    }

    fn remember_origin(&self, origin: &Expr) {
        if Expr::ptr_eq(self, origin) {
            return;
        }
        if matches!(self.kind(), ExprKind::False | ExprKind::True | ExprKind::Regex(..) | ExprKind::NotRegex(_)) {
            return;
        }
        let _ = self.0.negated.set(Negation::Origin(Arc::downgrade(&origin.0)));
    }

    /// Replaces keys known to `constants` by `true`/`false`. Returns this
    /// very handle when nothing changed.
    pub fn substitute_constants(&self, constants: &ConstantRegistry) -> Expr {
        logical::substitute_constants(self, constants)
    }

    /// Canonical comparison: variant order, then keys, then values.
    pub fn cmp_canonical(&self, other: &Expr) -> Ordering {
        let (a, b) = (self.kind(), other.kind());
        if a.tag() != b.tag() {
            return a.tag().cmp(&b.tag());
        }
        match (a, b) {
            (ExprKind::Defined(k1), ExprKind::Defined(k2)) | (ExprKind::Not(k1), ExprKind::Not(k2)) => k1.cmp(k2),
            (ExprKind::Equals(k1, v1), ExprKind::Equals(k2, v2))
            | (ExprKind::NotEquals(k1, v1), ExprKind::NotEquals(k2, v2))
            | (ExprKind::Greater(k1, v1), ExprKind::Greater(k2, v2))
            | (ExprKind::GreaterEquals(k1, v1), ExprKind::GreaterEquals(k2, v2))
            | (ExprKind::Smaller(k1, v1), ExprKind::Smaller(k2, v2))
            | (ExprKind::SmallerEquals(k1, v1), ExprKind::SmallerEquals(k2, v2)) => {
                k1.cmp(k2).then_with(|| v1.cmp_canonical(v2))
            }
            (ExprKind::In(k1, v1), ExprKind::In(k2, v2)) | (ExprKind::NotIn(k1, v1), ExprKind::NotIn(k2, v2)) => {
                k1.cmp(k2).then_with(|| v1.cmp(v2))
            }
            (ExprKind::Regex(k1, p1), ExprKind::Regex(k2, p2)) => {
                k1.cmp(k2).then_with(|| pattern_source(p1).cmp(pattern_source(p2)))
            }
            (ExprKind::NotRegex(r1), ExprKind::NotRegex(r2)) => r1.cmp_canonical(r2),
            (ExprKind::And(x), ExprKind::And(y)) | (ExprKind::Or(x), ExprKind::Or(y)) => x
                .len()
                .cmp(&y.len())
                .then_with(|| x.iter().zip(y.iter()).map(|(l, r)| l.cmp_canonical(r)).find(|o| o.is_ne()).unwrap_or(Ordering::Equal)),
            _ => Ordering::Equal,
        }
    }
}

fn equality_literal(value: ContextValue) -> Literal {
    match value {
        ContextValue::Number(n) => Literal::Number(n),
        ContextValue::String(s) => Literal::Str(s),
        other => Literal::Str(coercion::to_js_string(Some(&other))),
    }
}

// Strings that start with a number become that number; other strings are
// kept and make the comparison always false. Non-scalar operands give `false`.
fn relational(value: ContextValue, build: impl FnOnce(Literal) -> ExprKind) -> Expr {
    match value {
        ContextValue::Number(n) => Expr::from_kind(build(Literal::Number(n))),
        ContextValue::String(s) => {
            let n = coercion::parse_float(&s);
            let literal = if n.is_nan() { Literal::Str(s) } else { Literal::Number(n) };
            Expr::from_kind(build(literal))
        }
        _ => Expr::false_(),
    }
}

fn has_complementary_pair(expr: &[Expr]) -> bool {
    for i in 0..expr.len() {
        let negated = expr[i].negate();
        if expr[i + 1..].iter().any(|other| negated == *other) {
            return true;
        }
    }
    false
}

fn pattern_source(pattern: &Option<Pattern>) -> &str {
    pattern.as_ref().map(Pattern::source).unwrap_or("")
}

fn join(items: &[Expr], sep: &str) -> String {
    items.iter().map(Expr::serialize).collect::<Vec<_>>().join(sep)
}

impl PartialEq for Expr {
    fn eq(&self, other: &Self) -> bool {
        self.cmp_canonical(other) == Ordering::Equal
    }
}

impl Eq for Expr {}

impl PartialOrd for Expr {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Expr {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cmp_canonical(other)
    }
}

impl Display for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.serialize())
    }
}

impl Debug for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.kind() {
            ExprKind::And(items) => f.debug_tuple("And").field(items).finish(),
            ExprKind::Or(items) => f.debug_tuple("Or").field(items).finish(),
            _ => write!(f, "Expr({})", self.serialize()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn a() -> Expr {
        Expr::has("a")
    }
    fn b() -> Expr {
        Expr::has("b")
    }
    fn c() -> Expr {
        Expr::has("c")
    }

    #[test]
    fn and_absorbs_identities() {
        assert_eq!(Expr::and(vec![a(), a()]), Some(a()));
        assert_eq!(Expr::and(vec![a(), Expr::false_()]), Some(Expr::false_()));
        assert_eq!(Expr::and(vec![a(), Expr::true_()]), Some(a()));
        assert_eq!(Expr::and(vec![Expr::true_()]), Some(Expr::true_()));
        assert_eq!(Expr::and(vec![]), None);
    }

    #[test]
    fn or_absorbs_identities() {
        assert_eq!(Expr::or(vec![a(), a()]), Some(a()));
        assert_eq!(Expr::or(vec![a(), Expr::true_()]), Some(Expr::true_()));
        assert_eq!(Expr::or(vec![a(), Expr::false_()]), Some(a()));
        assert_eq!(Expr::or(vec![Expr::false_()]), Some(Expr::false_()));
        assert_eq!(Expr::or(vec![]), None);
    }

    #[test]
    fn operands_are_sorted_and_flattened() {
        let e = Expr::and(vec![c(), Expr::and(vec![b(), a()]).unwrap()]).unwrap();
        assert_eq!(e.serialize(), "a && b && c");
        let e = Expr::or(vec![Expr::equals("x", "1"), Expr::not("y"), Expr::has("z")]).unwrap();
        assert_eq!(e.serialize(), "z || !y || x == '1'");
    }

    #[test]
    fn and_distributes_over_trailing_or() {
        let e = Expr::and(vec![a(), Expr::or(vec![b(), c()]).unwrap()]).unwrap();
        assert_eq!(e.serialize(), "a && b || a && c");
    }

    #[test]
    fn complementary_operands_collapse() {
        assert_eq!(Expr::and(vec![a(), a().negate()]), Some(Expr::false_()));
        assert_eq!(Expr::or(vec![a(), a().negate()]), Some(Expr::true_()));
    }

    #[test]
    fn boolean_equality_collapses() {
        assert_eq!(Expr::equals("a", true), a());
        assert_eq!(Expr::equals("a", false), Expr::not("a"));
        assert_eq!(Expr::not_equals("a", true), Expr::not("a"));
        assert_eq!(Expr::equals("a", "true").serialize(), "a == 'true'");
    }

    #[test]
    fn relational_operands() {
        assert_eq!(Expr::greater("n", "5abc").serialize(), "n > 5");
        assert_eq!(Expr::greater("n", "abc").serialize(), "n > abc");
        assert_eq!(Expr::smaller("n", vec![1.0]), Expr::false_());
    }

    #[test]
    fn negation_is_memoized_and_involutive() {
        let e = Expr::and(vec![a(), Expr::or(vec![b(), c()]).unwrap()]).unwrap();
        let n1 = e.negate();
        let n2 = e.negate();
        assert!(Expr::ptr_eq(&n1, &n2));
        assert!(Expr::ptr_eq(&n1.negate(), &e));
    }

    #[test]
    fn regex_negation_round_trips_by_identity() {
        let r = Expr::regex("file", Pattern::new("\\.ts$", "").ok());
        let not_r = r.negate();
        assert_eq!(not_r.serialize(), "!(file =~ /\\.ts$/)");
        assert!(Expr::ptr_eq(&not_r.negate(), &r));
    }

    #[test]
    fn keys_and_ordering() {
        let e = Expr::and(vec![Expr::in_("x", "list"), b(), Expr::not("a")]).unwrap();
        assert_eq!(e.keys(), vec!["b", "a", "x", "list"]);
        assert!(Expr::has("a") < Expr::not("a"));
        assert!(Expr::has("a") < Expr::has("b"));
    }

    struct Rename;
    impl ExprMapper for Rename {
        fn map_defined(&self, key: &str) -> Expr {
            Expr::has(format!("ext.{}", key))
        }
    }

    #[test]
    fn map_rewrites_leaves() {
        let e = Expr::and(vec![a(), Expr::not("b")]).unwrap();
        assert_eq!(e.map(&Rename).serialize(), "ext.a && !b");
    }
}
