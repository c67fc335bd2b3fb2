//! Broadcasts and broadcast-and-wait.

use stagehand_rt::{
    Engine, EngineConfig, HatBinding, HatType, MockClock, Opcode, Script, ScriptBuilder, Target,
    TargetId, ThreadId, Value, VarRef,
};
use std::sync::Arc;
use std::time::Duration;

const OUT: VarRef = VarRef::Stage(0);
const HITS: VarRef = VarRef::Stage(1);

fn setup() -> (Engine, TargetId) {
    let config = EngineConfig {
        random_seed: Some(11),
        ..EngineConfig::default()
    };
    let clock = Arc::new(MockClock::auto_advance(Duration::from_millis(1)));
    let mut engine = Engine::with_clock(config, clock);
    let stage = engine.add_target(
        Target::stage()
            .with_variable("out", 0)
            .with_variable("hits", 0),
    );
    (engine, stage)
}

fn receiver(engine: &mut Engine, stage: TargetId, message: &str, script: Script) {
    engine.add_script(
        stage,
        script,
        Some(HatBinding::new(HatType::BroadcastReceived).with_field(message)),
    );
}

/// Counts a hit, then spans two more passes before finishing.
fn slow_receiver() -> Script {
    ScriptBuilder::new()
        .constant(1)
        .change_var(HITS)
        .op(Opcode::BreakFrame)
        .constant(1)
        .change_var(HITS)
        .op(Opcode::BreakFrame)
        .build()
        .unwrap()
}

fn forever() -> Script {
    ScriptBuilder::new()
        .op(Opcode::ForeverLoop)
        .op(Opcode::LoopEnd)
        .build()
        .unwrap()
}

/// A thread id to act as a sender.
fn idle_thread(engine: &mut Engine, stage: TargetId) -> ThreadId {
    let id = engine.add_script(stage, forever(), None);
    engine.start_script(id, stage).unwrap()
}

fn hits(engine: &Engine, stage: TargetId) -> f64 {
    engine.variable(stage, HITS).unwrap().to_double()
}

#[test]
fn broadcast_starts_receivers_ignoring_case() {
    let (mut engine, stage) = setup();
    let once = ScriptBuilder::new()
        .constant(1)
        .change_var(HITS)
        .build()
        .unwrap();
    receiver(&mut engine, stage, "Go", once);
    assert_eq!(engine.broadcast_by_name("gO").len(), 1);
    assert!(engine.broadcast_by_name("stop").is_empty());
    engine.step();
    assert_eq!(hits(&engine, stage), 1.0);
}

#[test]
fn broadcast_table_lookup() {
    let (mut engine, _) = setup();
    let go = engine.add_broadcast("Go");
    assert_eq!(engine.add_broadcast("Go"), go);
    assert_eq!(engine.find_broadcast("GO"), Some(go));
    assert_eq!(engine.broadcast_name(go), Some("Go"));
    assert_eq!(engine.find_broadcast("stop"), None);
    assert!(engine.broadcast(go).is_empty());
}

#[test]
fn sender_waits_until_every_receiver_finishes() {
    let (mut engine, stage) = setup();
    receiver(&mut engine, stage, "go", slow_receiver());
    let wait = engine.resolve_block("event_broadcastandwait").unwrap();
    let sender = ScriptBuilder::new()
        .constant("go")
        .exec(wait, 1)
        .read_var(HITS)
        .set_var(OUT)
        .build()
        .unwrap();
    let id = engine.add_script(stage, sender, None);
    engine.start_script(id, stage);

    engine.step();
    assert_eq!(engine.pending_broadcast_waits(), 1);
    assert_eq!(engine.variable(stage, OUT), Some(&Value::from(0)));

    for _ in 0..10 {
        if !engine.is_running() {
            break;
        }
        engine.step();
    }
    assert!(!engine.is_running());
    assert_eq!(engine.pending_broadcast_waits(), 0);
    // The sender only read `hits` after both increments.
    assert_eq!(engine.variable(stage, OUT).unwrap().to_double(), 2.0);
}

#[test]
fn wait_with_no_receivers_resolves_on_the_next_pass() {
    let (mut engine, stage) = setup();
    let sender = idle_thread(&mut engine, stage);
    let promise = engine.broadcast_and_wait("nobody", sender);
    assert!(!promise.is_resolved());
    engine.step();
    assert!(promise.is_resolved());
}

#[test]
fn later_wait_on_the_same_broadcast_resolves_the_earlier_one() {
    let (mut engine, stage) = setup();
    receiver(&mut engine, stage, "go", forever());
    let a = idle_thread(&mut engine, stage);
    let b = idle_thread(&mut engine, stage);

    let first = engine.broadcast_and_wait("go", a);
    let second = engine.broadcast_and_wait("go", b);
    assert!(first.is_resolved());
    assert!(!second.is_resolved());
    assert_eq!(engine.pending_broadcast_waits(), 1);

    engine.step();
    assert!(!second.is_resolved());
}

#[test]
fn waits_on_differently_cased_names_share_an_entry() {
    let (mut engine, stage) = setup();
    receiver(&mut engine, stage, "go", forever());
    let a = idle_thread(&mut engine, stage);
    let b = idle_thread(&mut engine, stage);
    engine.add_broadcast("go");

    let first = engine.broadcast_and_wait("go", a);
    let second = engine.broadcast_and_wait("GO", b);
    assert!(first.is_resolved());
    assert!(!second.is_resolved());
}

#[test]
fn stopping_the_sender_drops_its_wait() {
    let (mut engine, stage) = setup();
    receiver(&mut engine, stage, "go", forever());
    let sender = idle_thread(&mut engine, stage);
    engine.broadcast_and_wait("go", sender);
    assert_eq!(engine.pending_broadcast_waits(), 1);
    assert!(engine.kill_thread(sender));
    assert_eq!(engine.pending_broadcast_waits(), 0);
    assert!(!engine.kill_thread(sender));
}

#[test]
fn rebroadcast_restarts_receivers() {
    let (mut engine, stage) = setup();
    receiver(&mut engine, stage, "go", slow_receiver());
    engine.broadcast_by_name("go");
    engine.step();
    assert_eq!(hits(&engine, stage), 1.0);
    engine.broadcast_by_name("go");
    assert_eq!(engine.thread_count(), 1);
    engine.step();
    // The restarted receiver begins again from its first increment.
    assert_eq!(hits(&engine, stage), 2.0);
}
