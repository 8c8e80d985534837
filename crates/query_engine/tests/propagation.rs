use query_engine::{Context, EntryState, InputQuery, Query, Revision};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

struct Number;

impl InputQuery for Number {
    type Key = ();
    type Value = i64;

    fn default_value(_key: &()) -> i64 {
        0
    }
}

struct Successor;

impl Query for Successor {
    type Key = ();
    type Value = i64;

    fn execute(ctx: &Context, _key: ()) -> i64 {
        ctx.input::<Number>(()) + 1
    }
}

fn valid(changed_at: u64, checked_at: u64) -> EntryState {
    EntryState::Valid {
        changed_at: Revision::new(changed_at),
        checked_at: Revision::new(checked_at),
    }
}

#[test]
fn unchanged_input_then_changed_input() {
    init_logging();
    let mut ctx = Context::new();

    assert!(ctx.set_input::<Number>((), 1));
    assert_eq!(ctx.current_revision(), Revision::new(1));
    assert_eq!(ctx.query::<Successor>(()), 2);
    let info = ctx.entry_info::<Successor>(&()).unwrap();
    assert_eq!(info.state, valid(1, 1));
    assert_eq!(info.executions, 1);

    // Writing the same value is not a change.
    assert!(!ctx.set_input::<Number>((), 1));
    assert_eq!(ctx.current_revision(), Revision::new(1));
    assert_eq!(ctx.advance_revision(), Revision::new(2));

    assert_eq!(ctx.query::<Successor>(()), 2);
    let info = ctx.entry_info::<Successor>(&()).unwrap();
    assert_eq!(info.state, valid(1, 2));
    assert_eq!(info.executions, 1);

    assert!(ctx.set_input::<Number>((), 2));
    assert_eq!(ctx.current_revision(), Revision::new(3));
    assert_eq!(ctx.query::<Successor>(()), 3);
    let info = ctx.entry_info::<Successor>(&()).unwrap();
    assert_eq!(info.state, valid(3, 3));
    assert_eq!(info.executions, 2);
}

#[test]
fn unset_input_reads_default() {
    init_logging();
    let ctx = Context::new();
    assert_eq!(ctx.query::<Successor>(()), 1);
    assert!(ctx.input_info::<Number>(&()).is_some());
}

#[test]
fn input_setter_stamps_changed_revision() {
    init_logging();
    let mut ctx = Context::new();
    ctx.set_input::<Number>((), 5);
    ctx.set_input::<Number>((), 6);
    let info = ctx.input_info::<Number>(&()).unwrap();
    assert_eq!(info.state, valid(2, 2));
    assert_eq!(info.executions, 0);
}

// A three-level chain over an input, plus an unrelated input.

struct Base;

impl InputQuery for Base {
    type Key = u8;
    type Value = i64;

    fn default_value(_key: &u8) -> i64 {
        0
    }
}

struct Level1;

impl Query for Level1 {
    type Key = u8;
    type Value = i64;

    fn execute(ctx: &Context, key: u8) -> i64 {
        ctx.input::<Base>(key) * 10
    }
}

struct Level2;

impl Query for Level2 {
    type Key = u8;
    type Value = i64;

    fn execute(ctx: &Context, key: u8) -> i64 {
        ctx.query::<Level1>(key) + 1
    }
}

struct Level3;

impl Query for Level3 {
    type Key = u8;
    type Value = String;

    fn execute(ctx: &Context, key: u8) -> String {
        format!("value={}", ctx.query::<Level2>(key))
    }
}

fn executions<Q: Query>(ctx: &Context, key: &Q::Key) -> u64 {
    ctx.entry_info::<Q>(key).unwrap().executions
}

#[test]
fn chain_validates_without_recomputing() {
    init_logging();
    let mut ctx = Context::new();
    ctx.set_input::<Base>(0, 4);
    assert_eq!(ctx.query::<Level3>(0), "value=41");

    ctx.advance_revision();
    ctx.set_input::<Base>(1, 100);
    assert_eq!(ctx.query::<Level3>(0), "value=41");

    assert_eq!(executions::<Level1>(&ctx, &0), 1);
    assert_eq!(executions::<Level2>(&ctx, &0), 1);
    assert_eq!(executions::<Level3>(&ctx, &0), 1);
    assert_eq!(
        ctx.entry_info::<Level1>(&0).unwrap().state,
        valid(1, 3)
    );
}

#[test]
fn chain_recomputes_every_level_after_change() {
    init_logging();
    let mut ctx = Context::new();
    ctx.set_input::<Base>(0, 4);
    assert_eq!(ctx.query::<Level3>(0), "value=41");

    ctx.set_input::<Base>(0, 5);
    assert_eq!(ctx.query::<Level3>(0), "value=51");

    assert_eq!(executions::<Level1>(&ctx, &0), 2);
    assert_eq!(executions::<Level2>(&ctx, &0), 2);
    assert_eq!(executions::<Level3>(&ctx, &0), 2);
    assert_eq!(ctx.entry_info::<Level3>(&0).unwrap().state, valid(2, 2));
}

// Early cutoff: the parity of the input does not change from 1 to 3.

struct Parity;

impl Query for Parity {
    type Key = u8;
    type Value = bool;

    fn execute(ctx: &Context, key: u8) -> bool {
        ctx.input::<Base>(key) % 2 == 0
    }
}

struct Describe;

impl Query for Describe {
    type Key = u8;
    type Value = &'static str;

    fn execute(ctx: &Context, key: u8) -> &'static str {
        if ctx.query::<Parity>(key) { "even" } else { "odd" }
    }
}

#[test]
fn equal_recomputation_stops_propagation() {
    init_logging();
    let mut ctx = Context::new();
    ctx.set_input::<Base>(7, 1);
    assert_eq!(ctx.query::<Describe>(7), "odd");

    ctx.set_input::<Base>(7, 3);
    assert_eq!(ctx.query::<Describe>(7), "odd");

    assert_eq!(executions::<Parity>(&ctx, &7), 2);
    assert_eq!(executions::<Describe>(&ctx, &7), 1);
    // Parity re-ran in r2 but its content last changed in r1.
    assert_eq!(ctx.entry_info::<Parity>(&7).unwrap().state, valid(1, 2));
    assert_eq!(ctx.entry_info::<Describe>(&7).unwrap().state, valid(1, 2));

    ctx.set_input::<Base>(7, 4);
    assert_eq!(ctx.query::<Describe>(7), "even");
    assert_eq!(executions::<Describe>(&ctx, &7), 2);
}

// A NaN result equals itself, so its dependents are not re-run.

struct Ratio;

impl Query for Ratio {
    type Key = u8;
    type Value = f64;

    fn execute(ctx: &Context, key: u8) -> f64 {
        let base = ctx.input::<Base>(key) as f64;
        base * 0.0 / 0.0
    }
}

struct RatioIsNan;

impl Query for RatioIsNan {
    type Key = u8;
    type Value = bool;

    fn execute(ctx: &Context, key: u8) -> bool {
        ctx.query::<Ratio>(key).is_nan()
    }
}

#[test]
fn nan_recomputation_stops_propagation() {
    init_logging();
    let mut ctx = Context::new();
    ctx.set_input::<Base>(8, 1);
    assert!(ctx.query::<RatioIsNan>(8));

    ctx.set_input::<Base>(8, 2);
    assert!(ctx.query::<RatioIsNan>(8));

    assert_eq!(executions::<Ratio>(&ctx, &8), 2);
    assert_eq!(executions::<RatioIsNan>(&ctx, &8), 1);
    assert_eq!(ctx.entry_info::<Ratio>(&8).unwrap().state, valid(1, 2));
    assert_eq!(ctx.stats().retained, 2);
}

// The trail is replaced on every execution.

struct UseLeft;

impl InputQuery for UseLeft {
    type Key = ();
    type Value = bool;

    fn default_value(_key: &()) -> bool {
        true
    }
}

struct Select;

impl Query for Select {
    type Key = ();
    type Value = i64;

    fn execute(ctx: &Context, _key: ()) -> i64 {
        if ctx.input::<UseLeft>(()) {
            ctx.input::<Base>(0)
        } else {
            ctx.input::<Base>(1)
        }
    }
}

#[test]
fn dependencies_follow_the_latest_execution() {
    init_logging();
    let mut ctx = Context::new();
    ctx.set_input::<Base>(0, 10);
    ctx.set_input::<Base>(1, 20);
    assert_eq!(ctx.query::<Select>(()), 10);
    assert_eq!(ctx.entry_info::<Select>(&()).unwrap().dependencies, 2);

    ctx.set_input::<UseLeft>((), false);
    assert_eq!(ctx.query::<Select>(()), 20);
    assert_eq!(executions::<Select>(&ctx, &()), 2);

    // The left side is no longer read.
    ctx.set_input::<Base>(0, 11);
    assert_eq!(ctx.query::<Select>(()), 20);
    assert_eq!(executions::<Select>(&ctx, &()), 2);

    ctx.set_input::<Base>(1, 21);
    assert_eq!(ctx.query::<Select>(()), 21);
    assert_eq!(executions::<Select>(&ctx, &()), 3);
}
