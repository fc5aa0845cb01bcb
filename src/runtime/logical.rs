use crate::ast::{Expr, ExprKind};
use crate::constants::ConstantRegistry;
use crate::types::Literal;
use std::cmp::Ordering;
use std::collections::VecDeque;

/// Builds the complement of `expr`. Callers go through [`Expr::negate`],
/// which memoizes the result.
pub(crate) fn negate(expr: &Expr) -> Expr {
    match expr.kind() {
        ExprKind::False => Expr::true_(),
        ExprKind::True => Expr::false_(),
        ExprKind::Defined(key) => Expr::not(key.as_str()),
        ExprKind::Not(key) => Expr::has(key.as_str()),
        ExprKind::Equals(key, value) => Expr::from_kind(ExprKind::NotEquals(key.clone(), value.clone())),
        ExprKind::NotEquals(key, value) => Expr::from_kind(ExprKind::Equals(key.clone(), value.clone())),
        ExprKind::Regex(..) => Expr::from_kind(ExprKind::NotRegex(expr.clone())),
        ExprKind::NotRegex(inner) => inner.clone(),
        ExprKind::In(key, value_key) => Expr::not_in(key.as_str(), value_key.as_str()),
        ExprKind::NotIn(key, value_key) => Expr::in_(key.as_str(), value_key.as_str()),
        ExprKind::Greater(key, value) => Expr::from_kind(ExprKind::SmallerEquals(key.clone(), value.clone())),
        ExprKind::GreaterEquals(key, value) => Expr::from_kind(ExprKind::Smaller(key.clone(), value.clone())),
        ExprKind::Smaller(key, value) => Expr::from_kind(ExprKind::GreaterEquals(key.clone(), value.clone())),
        ExprKind::SmallerEquals(key, value) => Expr::from_kind(ExprKind::Greater(key.clone(), value.clone())),
        ExprKind::And(items) => {
            // !(a && b) == !a || !b
            Expr::or_with(items.iter().map(Expr::negate).collect(), true).unwrap_or_else(Expr::false_)
        }
        ExprKind::Or(items) => {
            // !(a || b) == !a && !b; each negated operand may itself be an OR,
            // so pairs are multiplied out to keep the result an OR of ANDs.
            let mut result: VecDeque<Expr> = items.iter().map(Expr::negate).collect();
            while result.len() > 1 {
                let (left, right) = match (result.pop_front(), result.pop_front()) {
                    (Some(l), Some(r)) => (l, r),
                    _ => break,
                };
                let mut all = Vec::new();
                for l in terminals(&left) {
                    for r in terminals(&right) {
                        if let Some(pair) = Expr::and_with(vec![l.clone(), r.clone()], false) {
                            all.push(pair);
                        }
                    }
                }
                if let Some(product) = Expr::or_with(all, false) {
                    result.push_front(product);
                }
            }
            Expr::or_with(result.into(), true).unwrap_or_else(Expr::true_)
        }
    }
}

fn terminals(expr: &Expr) -> Vec<Expr> {
    match expr.kind() {
        ExprKind::Or(items) => items.clone(),
        _ => vec![expr.clone()],
    }
}

pub(crate) fn substitute_constants(expr: &Expr, constants: &ConstantRegistry) -> Expr {
    match expr.kind() {
        ExprKind::Defined(key) => constants.get(key).map(Expr::bool).unwrap_or_else(|| expr.clone()),
        ExprKind::Not(key) => constants.get(key).map(|v| Expr::bool(!v)).unwrap_or_else(|| expr.clone()),
        ExprKind::Equals(key, value) => match constants.get(key) {
            Some(v) => Expr::bool(matches_constant(value, v)),
            None => expr.clone(),
        },
        ExprKind::NotEquals(key, value) => match constants.get(key) {
            Some(v) => Expr::bool(!matches_constant(value, v)),
            None => expr.clone(),
        },
        ExprKind::And(items) => match substitute_all(items, constants) {
            Some(items) => Expr::and_with(items, false).unwrap_or_else(Expr::true_),
            None => expr.clone(),
        },
        ExprKind::Or(items) => match substitute_all(items, constants) {
            Some(items) => Expr::or_with(items, false).unwrap_or_else(Expr::false_),
            None => expr.clone(),
        },
        _ => expr.clone(),
    }
}

// A constant compares equal only to its spelled-out string form.
fn matches_constant(value: &Literal, constant: bool) -> bool {
    matches!(value, Literal::Str(s) if s == if constant { "true" } else { "false" })
}

/// `None` when no operand changed.
fn substitute_all(items: &[Expr], constants: &ConstantRegistry) -> Option<Vec<Expr>> {
    let substituted: Vec<Expr> = items.iter().map(|e| e.substitute_constants(constants)).collect();
    if substituted.iter().zip(items).all(|(new, old)| Expr::ptr_eq(new, old)) {
        None
    } else {
        Some(substituted)
    }
}

/// Sound but incomplete check that `p` implies `q`. Relies on AND/OR
/// operands being sorted.
pub fn implies(p: &Expr, q: &Expr) -> bool {
    if matches!(p.kind(), ExprKind::False) || matches!(q.kind(), ExprKind::True) {
        return true;
    }

    if let ExprKind::Or(p_items) = p.kind() {
        // `a || b` can only imply something like `a || b || c`
        return match q.kind() {
            ExprKind::Or(q_items) => all_elements_included(p_items, q_items),
            _ => false,
        };
    }

    if let ExprKind::Or(q_items) = q.kind() {
        return q_items.iter().any(|element| implies(p, element));
    }

    if let ExprKind::And(p_items) = p.kind() {
        if let ExprKind::And(q_items) = q.kind() {
            return all_elements_included(q_items, p_items);
        }
        return p_items.iter().any(|element| implies(element, q));
    }

    p == q
}

/// Whether every element of sorted `p` occurs in sorted `q`.
fn all_elements_included(p: &[Expr], q: &[Expr]) -> bool {
    let (mut pi, mut qi) = (0, 0);
    while pi < p.len() && qi < q.len() {
        match p[pi].cmp_canonical(&q[qi]) {
            Ordering::Less => return false,
            Ordering::Equal => {
                pi += 1;
                qi += 1;
            }
            Ordering::Greater => qi += 1,
        }
    }
    pi == p.len()
}

/// Compares two expressions after substituting constants into both.
pub fn expressions_are_equal_with_constant_substitution(
    a: Option<&Expr>,
    b: Option<&Expr>,
    constants: &ConstantRegistry,
) -> bool {
    let a = a.map(|e| e.substitute_constants(constants));
    let b = b.map(|e| e.substitute_constants(constants));
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}
