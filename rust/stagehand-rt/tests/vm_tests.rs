//! Bytecode semantics, exercised through a real engine.
//!
//! Every script runs on the stage and leaves its result in the stage
//! variable `out`.

use stagehand_rt::{
    BlockContext, BlockOutcome, Engine, EngineConfig, MockClock, Opcode, Script, ScriptBuilder,
    Target, TargetId, Value, VarRef, Yield,
};
use std::sync::Arc;
use std::time::Duration;

const OUT: VarRef = VarRef::Stage(0);
const ITEMS: VarRef = VarRef::Stage(0);

fn setup() -> (Engine, TargetId) {
    let config = EngineConfig {
        random_seed: Some(7),
        ..EngineConfig::default()
    };
    let clock = Arc::new(MockClock::auto_advance(Duration::from_millis(1)));
    let mut engine = Engine::with_clock(config, clock);
    let stage = engine.add_target(
        Target::stage()
            .with_variable("out", 0)
            .with_list("items", vec![]),
    );
    (engine, stage)
}

fn run_to_end(engine: &mut Engine, stage: TargetId, script: Script) -> Value {
    let id = engine.add_script(stage, script, None);
    engine.start_script(id, stage).expect("stage exists");
    for _ in 0..1000 {
        if !engine.is_running() {
            break;
        }
        engine.step();
    }
    assert!(!engine.is_running(), "script did not finish");
    engine.variable(stage, OUT).cloned().expect("out exists")
}

fn eval(build: impl FnOnce(ScriptBuilder) -> ScriptBuilder) -> Value {
    let (mut engine, stage) = setup();
    let script = build(ScriptBuilder::new())
        .set_var(OUT)
        .build()
        .expect("script builds");
    run_to_end(&mut engine, stage, script)
}

// ─── arithmetic and logic ───

#[test]
fn arithmetic_uses_the_register_stack() {
    let out = eval(|b| {
        b.constant(2)
            .constant(3)
            .op(Opcode::Add)
            .constant(4)
            .op(Opcode::Multiply)
    });
    assert_eq!(out.to_double(), 20.0);
}

#[test]
fn numeric_strings_take_part_in_arithmetic() {
    let out = eval(|b| b.constant("10").constant(" 4 ").op(Opcode::Subtract));
    // " 4 " is not a number and reads as 0.
    assert_eq!(out.to_double(), 10.0);
}

#[test]
fn infinity_minus_infinity_is_nan() {
    let out = eval(|b| {
        b.constant(Value::Infinity)
            .constant(Value::Infinity)
            .op(Opcode::Subtract)
    });
    assert!(out.is_nan());
}

#[test]
fn comparisons_and_boolean_logic() {
    let out = eval(|b| {
        b.constant("abc")
            .constant("ABC")
            .op(Opcode::Equals)
            .constant(3)
            .constant(12)
            .op(Opcode::LessThan)
            .op(Opcode::And)
            .op(Opcode::Not)
    });
    assert_eq!(out, Value::Bool(false));
}

// ─── control flow ───

#[test]
fn if_else_takes_the_false_branch() {
    let out = eval(|b| {
        b.constant(false)
            .op(Opcode::If)
            .constant(1)
            .set_var(OUT)
            .op(Opcode::Else)
            .constant(2)
            .set_var(OUT)
            .op(Opcode::EndIf)
            .read_var(OUT)
    });
    assert_eq!(out.to_double(), 2.0);
}

#[test]
fn repeat_runs_its_body_count_times() {
    let (mut engine, stage) = setup();
    let script = ScriptBuilder::new()
        .constant(5)
        .op(Opcode::RepeatLoop)
        .constant(1)
        .change_var(OUT)
        .op(Opcode::LoopEnd)
        .build()
        .unwrap();
    assert_eq!(run_to_end(&mut engine, stage, script).to_double(), 5.0);
}

#[test]
fn repeat_of_zero_skips_the_body() {
    let (mut engine, stage) = setup();
    let script = ScriptBuilder::new()
        .constant(0)
        .op(Opcode::RepeatLoop)
        .constant(1)
        .change_var(OUT)
        .op(Opcode::LoopEnd)
        .build()
        .unwrap();
    assert_eq!(run_to_end(&mut engine, stage, script).to_double(), 0.0);
}

#[test]
fn repeat_index_counts_iterations() {
    let (mut engine, stage) = setup();
    let script = ScriptBuilder::new()
        .constant(4)
        .op(Opcode::RepeatLoop)
        .op(Opcode::RepeatLoopIndex1)
        .change_var(OUT)
        .op(Opcode::LoopEnd)
        .build()
        .unwrap();
    assert_eq!(run_to_end(&mut engine, stage, script).to_double(), 10.0);
}

#[test]
fn until_loop_checks_before_each_iteration() {
    let (mut engine, stage) = setup();
    let script = ScriptBuilder::new()
        .op(Opcode::UntilLoop)
        .read_var(OUT)
        .constant(3)
        .op(Opcode::GreaterThan)
        .op(Opcode::BeginUntilLoop)
        .constant(1)
        .change_var(OUT)
        .op(Opcode::LoopEnd)
        .build()
        .unwrap();
    assert_eq!(run_to_end(&mut engine, stage, script).to_double(), 4.0);
}

#[test]
fn loops_yield_between_iterations_unless_warped() {
    let body = |b: ScriptBuilder| {
        b.constant(200)
            .op(Opcode::RepeatLoop)
            .constant(1)
            .change_var(OUT)
            .op(Opcode::LoopEnd)
    };

    let (mut engine, stage) = setup();
    let id = engine.add_script(stage, body(ScriptBuilder::new()).build().unwrap(), None);
    engine.start_script(id, stage);
    engine.step();
    assert!(engine.is_running());
    assert!(engine.variable(stage, OUT).unwrap().to_double() < 200.0);

    let (mut engine, stage) = setup();
    let warped = body(
        ScriptBuilder::new()
            .op(Opcode::InitProcedure)
            .call(0)
            .begin_procedure(true),
    )
    .end_procedure()
    .build()
    .unwrap();
    let id = engine.add_script(stage, warped, None);
    engine.start_script(id, stage);
    engine.step();
    assert!(!engine.is_running());
    assert_eq!(engine.variable(stage, OUT).unwrap().to_double(), 200.0);
}

// ─── lists and strings ───

#[test]
fn list_append_and_join() {
    let out = eval(|b| {
        b.constant("a")
            .list_op(Opcode::ListAppend, ITEMS)
            .constant("b")
            .list_op(Opcode::ListAppend, ITEMS)
            .constant("c")
            .list_op(Opcode::ListAppend, ITEMS)
            .list_op(Opcode::ReadList, ITEMS)
    });
    assert_eq!(out.to_string(), "abc");
}

#[test]
fn list_insert_replace_and_lookup() {
    let (mut engine, stage) = setup();
    let script = ScriptBuilder::new()
        .constant("x")
        .list_op(Opcode::ListAppend, ITEMS)
        .constant("y")
        .list_op(Opcode::ListAppend, ITEMS)
        // insert "first" at 1
        .constant("first")
        .constant(1)
        .list_op(Opcode::ListInsert, ITEMS)
        // replace item 2 with "second"
        .constant(2)
        .constant("second")
        .list_op(Opcode::ListReplace, ITEMS)
        .constant("last")
        .list_op(Opcode::ListGetItem, ITEMS)
        .set_var(OUT)
        .build()
        .unwrap();
    assert_eq!(run_to_end(&mut engine, stage, script).to_string(), "y");
    let items: Vec<String> = engine
        .list(stage, ITEMS)
        .unwrap()
        .items()
        .iter()
        .map(Value::to_string)
        .collect();
    assert_eq!(items, ["first", "second", "y"]);
}

#[test]
fn list_search_and_delete() {
    let out = eval(|b| {
        b.constant("Apple")
            .list_op(Opcode::ListAppend, ITEMS)
            .constant("pear")
            .list_op(Opcode::ListAppend, ITEMS)
            .constant(1)
            .list_op(Opcode::ListDel, ITEMS)
            .constant("PEAR")
            .list_op(Opcode::ListIndexOf, ITEMS)
            .list_op(Opcode::ListLength, ITEMS)
            .op(Opcode::Add)
    });
    assert_eq!(out.to_double(), 2.0);
}

#[test]
fn missing_list_items_read_as_empty() {
    let out = eval(|b| b.constant(3).list_op(Opcode::ListGetItem, ITEMS));
    assert_eq!(out.to_string(), "");
}

#[test]
fn string_operators() {
    let out = eval(|b| b.constant("hello").constant(" world").op(Opcode::StrConcat));
    assert_eq!(out.to_string(), "hello world");

    let out = eval(|b| b.constant("hello").constant(2).op(Opcode::StrAt));
    assert_eq!(out.to_string(), "e");

    let out = eval(|b| b.constant("hello").op(Opcode::StrLength));
    assert_eq!(out.to_double(), 5.0);

    let out = eval(|b| b.constant("Hello").constant("LL").op(Opcode::StrContains));
    assert_eq!(out, Value::Bool(true));
}

// ─── procedures ───

#[test]
fn procedures_receive_arguments() {
    let out = eval(|b| {
        b.op(Opcode::InitProcedure)
            .constant(2)
            .op(Opcode::AddArg)
            .constant(3)
            .op(Opcode::AddArg)
            .call(0)
            .begin_procedure(false)
            .read_arg(0)
            .read_arg(1)
            .op(Opcode::Multiply)
            .set_var(OUT)
            .end_procedure()
            .read_var(OUT)
            .constant(1)
            .op(Opcode::Add)
    });
    assert_eq!(out.to_double(), 7.0);
}

#[test]
fn missing_arguments_read_as_zero() {
    let out = eval(|b| {
        b.op(Opcode::InitProcedure)
            .call(0)
            .begin_procedure(false)
            .read_arg(3)
            .set_var(OUT)
            .end_procedure()
            .read_var(OUT)
    });
    assert_eq!(out.to_double(), 0.0);
}

// ─── native blocks ───

fn sum_inputs(ctx: &mut BlockContext<'_>) -> BlockOutcome {
    ctx.input(0).add(ctx.input(1)).into()
}

fn finish(_: &mut BlockContext<'_>) -> BlockOutcome {
    BlockOutcome::Finish
}

/// Retries once from the checkpoint, using the timer slot as a flag.
fn retry_once(ctx: &mut BlockContext<'_>) -> BlockOutcome {
    if ctx.timer().is_none() {
        ctx.set_timer(Duration::ZERO);
        return BlockOutcome::Yield(Yield::RETRY);
    }
    ctx.clear_timer();
    BlockOutcome::Done
}

/// Asks for a restart from the top the first time.
fn restart_once(ctx: &mut BlockContext<'_>) -> BlockOutcome {
    if ctx.timer().is_none() {
        ctx.set_timer(Duration::ZERO);
        return BlockOutcome::Yield(Yield {
            resume_here: false,
            defer_this_pass: true,
            rewind_to_checkpoint: false,
        });
    }
    BlockOutcome::Done
}

#[test]
fn native_blocks_consume_their_inputs() {
    let (mut engine, stage) = setup();
    let script = ScriptBuilder::new()
        .constant(100)
        .constant(1)
        .constant(2)
        .exec(sum_inputs, 2)
        .op(Opcode::Add)
        .set_var(OUT)
        .exec(finish, 0)
        .constant(99)
        .set_var(OUT)
        .build()
        .unwrap();
    assert_eq!(run_to_end(&mut engine, stage, script).to_double(), 103.0);
}

#[test]
fn retry_rewinds_to_the_checkpoint() {
    let (mut engine, stage) = setup();
    let script = ScriptBuilder::new()
        .constant(1)
        .change_var(OUT)
        .checkpoint()
        .constant(10)
        .change_var(OUT)
        .exec(retry_once, 0)
        .build()
        .unwrap();
    // The +1 before the checkpoint runs once, the +10 after it twice.
    assert_eq!(run_to_end(&mut engine, stage, script).to_double(), 21.0);
}

#[test]
fn retry_after_a_call_rewinds_to_the_callers_checkpoint() {
    let (mut engine, stage) = setup();
    let script = ScriptBuilder::new()
        .constant(1)
        .change_var(OUT)
        .checkpoint()
        .op(Opcode::InitProcedure)
        .call(0)
        .exec(retry_once, 0)
        .constant(100)
        .change_var(OUT)
        .begin_procedure(false)
        .checkpoint()
        .constant(10)
        .change_var(OUT)
        .end_procedure()
        .build()
        .unwrap();
    // The procedure's own checkpoint is gone once it returns, so the retry
    // calls it again from the main script and then carries on to the +100.
    assert_eq!(run_to_end(&mut engine, stage, script).to_double(), 121.0);
}

#[test]
fn yield_without_resume_restarts_the_script() {
    let (mut engine, stage) = setup();
    let script = ScriptBuilder::new()
        .constant(1)
        .change_var(OUT)
        .exec(restart_once, 0)
        .build()
        .unwrap();
    assert_eq!(run_to_end(&mut engine, stage, script).to_double(), 2.0);
}

#[test]
fn random_between_integers_is_integral() {
    for _ in 0..20 {
        let out = eval(|b| b.constant(1).constant(6).op(Opcode::Random));
        let n = out.to_double();
        assert_eq!(n.fract(), 0.0);
        assert!((1.0..=6.0).contains(&n));
    }
}
