use query_engine::{Context, InputQuery, Query, Symbol};
use std::sync::atomic::{AtomicU64, Ordering};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// State the engine cannot see changing.
static CLOCK: AtomicU64 = AtomicU64::new(0);

struct Tick;

impl Query for Tick {
    type Key = ();
    type Value = u64;

    fn execute(ctx: &Context, _key: ()) -> u64 {
        ctx.depends_on_external();
        CLOCK.load(Ordering::SeqCst) / 10
    }
}

struct Banner;

impl Query for Banner {
    type Key = ();
    type Value = String;

    fn execute(ctx: &Context, _key: ()) -> String {
        format!("tick {}", ctx.query::<Tick>(()))
    }
}

#[test]
fn external_reads_run_once_per_revision() {
    init_logging();
    let mut ctx = Context::new();
    CLOCK.store(3, Ordering::SeqCst);
    assert_eq!(ctx.query::<Banner>(()), "tick 0");
    assert!(ctx.entry_info::<Tick>(&()).unwrap().volatile);

    // Same revision: nothing runs even though the clock moved.
    CLOCK.store(25, Ordering::SeqCst);
    assert_eq!(ctx.query::<Banner>(()), "tick 0");
    assert_eq!(ctx.entry_info::<Tick>(&()).unwrap().executions, 1);

    ctx.advance_revision();
    assert_eq!(ctx.query::<Banner>(()), "tick 2");
    assert_eq!(ctx.entry_info::<Tick>(&()).unwrap().executions, 2);
    assert_eq!(ctx.entry_info::<Banner>(&()).unwrap().executions, 2);

    // Tick runs again but the value is the same, so Banner is confirmed.
    CLOCK.store(29, Ordering::SeqCst);
    ctx.advance_revision();
    assert_eq!(ctx.query::<Banner>(()), "tick 2");
    assert_eq!(ctx.entry_info::<Tick>(&()).unwrap().executions, 3);
    assert_eq!(ctx.entry_info::<Banner>(&()).unwrap().executions, 2);
    assert!(!ctx.entry_info::<Banner>(&()).unwrap().volatile);
}

#[test]
fn declaring_outside_a_query_is_harmless() {
    init_logging();
    let ctx = Context::new();
    ctx.depends_on_external();
    assert_eq!(ctx.stats().entries, 0);
}

struct Identifier;

impl InputQuery for Identifier {
    type Key = u32;
    type Value = String;

    fn default_value(key: &u32) -> String {
        format!("id{key}")
    }
}

struct Interned;

impl Query for Interned {
    type Key = u32;
    type Value = Symbol;

    fn execute(ctx: &Context, key: u32) -> Symbol {
        ctx.intern(&ctx.input::<Identifier>(key))
    }
}

#[test]
fn symbols_belong_to_their_context() {
    init_logging();
    let mut ctx = Context::new();
    let first = ctx.query::<Interned>(1);
    let second = ctx.query::<Interned>(2);
    assert_ne!(first, second);
    assert_eq!(ctx.resolve(first), Some("id1"));
    assert_eq!(ctx.lookup_symbol("id2"), Some(second));

    ctx.set_input::<Identifier>(2, "id1".to_owned());
    assert_eq!(ctx.query::<Interned>(2), first);
    assert_eq!(ctx.stats().symbols, 2);

    let other = Context::new();
    assert_eq!(other.resolve(second), None);
}
