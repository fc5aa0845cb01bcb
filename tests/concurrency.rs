use contextkey::{parse, ConstantRegistry, ContextEvent, ContextStore, ContextValue, Expr, Parser, ParserConfig};
use std::collections::HashMap;
use std::sync::{mpsc, Arc};
use std::thread;

/// Expressions, registries and stores are shared across threads:
/// 1. a parsed expression evaluates consistently from many threads
/// 2. concurrent negation settles on a single memoized node
/// 3. constants can be registered once, from any thread
/// 4. point events from several writers all land in the store

#[test]
fn shared_expression_evaluates_consistently() {
    let expr = Arc::new(parse("mode == fast && n >= 10 || force").unwrap());
    let (tx, rx) = mpsc::channel();

    for thread_id in 0..8 {
        let expr = Arc::clone(&expr);
        let tx = tx.clone();
        thread::spawn(move || {
            let mut ctx: HashMap<String, ContextValue> = HashMap::new();
            ctx.insert("mode".into(), "fast".into());
            ctx.insert("n".into(), (thread_id as f64 * 3.0).into());
            let _ = tx.send((thread_id, expr.evaluate(&ctx)));
        });
    }
    drop(tx);

    let mut results: Vec<(usize, bool)> = rx.iter().collect();
    results.sort();
    assert_eq!(results.len(), 8);
    for (thread_id, result) in results {
        assert_eq!(result, thread_id * 3 >= 10, "thread {}", thread_id);
    }
}

#[test]
fn concurrent_negation_is_memoized_once() {
    let expr = parse("a && (b || c) && !d").unwrap();
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let expr = expr.clone();
            thread::spawn(move || expr.negate())
        })
        .collect();
    let negations: Vec<Expr> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let first = expr.negate();
    for n in &negations {
        assert!(Expr::ptr_eq(n, &first));
    }
    assert!(Expr::ptr_eq(&first.negate(), &expr));
}

#[test]
fn constants_register_once_across_threads() {
    let constants = Arc::new(ConstantRegistry::new());
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let constants = Arc::clone(&constants);
            thread::spawn(move || constants.set_constant("isRemote", i % 2 == 0).is_ok())
        })
        .collect();
    let successes = handles.into_iter().filter_map(|h| h.join().ok()).filter(|ok| *ok).count();
    assert_eq!(successes, 1);
    assert_eq!(constants.len(), 1);

    let mut parser = Parser::with_constants(ParserConfig::default(), constants.clone());
    let folded = parser.parse("isRemote").unwrap();
    assert!(folded == Expr::true_() || folded == Expr::false_());
}

#[test]
fn store_accepts_writers_from_many_threads() {
    let store = Arc::new(ContextStore::new());
    let handles: Vec<_> = (0..4)
        .map(|writer| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for i in 0..25 {
                    store.apply(&ContextEvent::ValueUpdated {
                        key: format!("w{}.k{}", writer, i),
                        value: ContextValue::Number(i as f64),
                    });
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let all = store.snapshot().collect_all_values(0).unwrap();
    assert_eq!(all.len(), 100);
    assert!(store.evaluate(&parse("w3.k24 == 24 && w0.k0 < 1").unwrap()));
}
