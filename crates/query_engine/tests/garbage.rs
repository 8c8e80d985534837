use query_engine::{Context, EngineConfig, InputQuery, Query};
use std::sync::Arc;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

struct Text;

impl InputQuery for Text {
    type Key = ();
    type Value = Arc<str>;

    fn default_value(_key: &()) -> Arc<str> {
        Arc::from("")
    }
}

/// Whitespace-separated words, without any empty ones.
struct Words;

impl Query for Words {
    type Key = ();
    type Value = Vec<Arc<str>>;

    fn execute(ctx: &Context, _key: ()) -> Vec<Arc<str>> {
        ctx.input::<Text>(())
            .split_whitespace()
            .map(Arc::from)
            .collect()
    }
}

#[test]
fn equal_recomputation_keeps_value_identity() {
    init_logging();
    let mut ctx = Context::new();
    ctx.set_input::<Text>((), Arc::from("alpha beta"));
    let before = ctx.query::<Words>(());

    // Same words, different spacing: Words runs again but merges as unchanged.
    ctx.set_input::<Text>((), Arc::from("alpha   beta"));
    let after = ctx.query::<Words>(());

    assert_eq!(ctx.entry_info::<Words>(&()).unwrap().executions, 2);
    assert!(Arc::ptr_eq(&before[0], &after[0]));
    assert!(Arc::ptr_eq(&before[1], &after[1]));
}

#[test]
fn partial_change_keeps_unchanged_elements() {
    init_logging();
    let mut ctx = Context::new();
    ctx.set_input::<Text>((), Arc::from("alpha beta"));
    let before = ctx.query::<Words>(());

    ctx.set_input::<Text>((), Arc::from("alpha gamma"));
    let after = ctx.query::<Words>(());

    assert!(Arc::ptr_eq(&before[0], &after[0]));
    assert_eq!(&*after[1], "gamma");
}

#[test]
fn superseded_values_wait_for_collection() {
    init_logging();
    let mut ctx = Context::new();
    ctx.set_input::<Text>((), Arc::from("one"));
    ctx.query::<Words>(());
    assert_eq!(ctx.stats().retained, 0);

    // The old text and the old word list are both superseded.
    ctx.set_input::<Text>((), Arc::from("two"));
    ctx.query::<Words>(());
    assert_eq!(ctx.stats().retained, 2);

    assert_eq!(ctx.collect_garbage(), 2);
    assert_eq!(ctx.stats().retained, 0);
    assert_eq!(ctx.collect_garbage(), 0);
}

#[test]
fn retention_can_be_disabled() {
    init_logging();
    let mut ctx = Context::with_config(EngineConfig::default().with_retention(false));
    ctx.set_input::<Text>((), Arc::from("one"));
    ctx.query::<Words>(());
    ctx.set_input::<Text>((), Arc::from("two"));
    ctx.query::<Words>(());

    assert_eq!(ctx.stats().retained, 0);
    assert_eq!(ctx.collect_garbage(), 0);
}
