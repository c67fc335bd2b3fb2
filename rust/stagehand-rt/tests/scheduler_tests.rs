//! Scheduler pass behaviour: hats, budgets, redraws, waits, edge hats,
//! monitors and questions.

use crossbeam_channel::Receiver;
use stagehand_rt::{
    Engine, EngineConfig, EngineEvent, HatBinding, HatType, MockClock, Opcode, Script,
    ScriptBuilder, Target, TargetId, Value, VarRef,
};
use std::sync::Arc;
use std::time::Duration;

const OUT: VarRef = VarRef::Stage(0);

fn engine_with(clock: Arc<MockClock>, turbo: bool) -> (Engine, TargetId) {
    let config = EngineConfig {
        random_seed: Some(3),
        turbo_mode: turbo,
        ..EngineConfig::default()
    };
    let mut engine = Engine::with_clock(config, clock);
    let stage = engine.add_target(Target::stage().with_variable("out", 0));
    (engine, stage)
}

fn setup() -> (Engine, TargetId) {
    engine_with(Arc::new(MockClock::auto_advance(Duration::from_millis(1))), false)
}

fn block(engine: &Engine, name: &str) -> stagehand_rt::BlockFn {
    engine
        .resolve_block(name)
        .unwrap_or_else(|| panic!("{name} is registered"))
}

fn forever_counting() -> Script {
    ScriptBuilder::new()
        .op(Opcode::ForeverLoop)
        .constant(1)
        .change_var(OUT)
        .op(Opcode::LoopEnd)
        .build()
        .unwrap()
}

fn out(engine: &Engine, stage: TargetId) -> Value {
    engine.variable(stage, OUT).cloned().unwrap()
}

fn drain(events: &Receiver<EngineEvent>) -> Vec<EngineEvent> {
    events.try_iter().collect()
}

fn stop_signals(events: &[EngineEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, EngineEvent::ThreadAboutToStop { .. }))
        .count()
}

// ─── hats ───

#[test]
fn green_flag_starts_scripts_on_every_target() {
    let (mut engine, stage) = setup();
    let cat = engine.add_target(Target::sprite("Cat"));
    let count = ScriptBuilder::new()
        .constant(1)
        .change_var(OUT)
        .build()
        .unwrap();
    engine.add_script(stage, count, Some(HatBinding::new(HatType::GreenFlag)));
    let count = ScriptBuilder::new()
        .constant(10)
        .change_var(OUT)
        .build()
        .unwrap();
    engine.add_script(cat, count, Some(HatBinding::new(HatType::GreenFlag)));

    assert_eq!(engine.start().len(), 2);
    engine.step();
    assert_eq!(out(&engine, stage).to_double(), 11.0);
    assert!(!engine.is_running());
}

#[test]
fn restarting_hat_replaces_the_running_thread_in_place() {
    let (mut engine, stage) = setup();
    let events = engine.subscribe();
    engine.add_script(
        stage,
        forever_counting(),
        Some(HatBinding::new(HatType::BroadcastReceived).with_field("go")),
    );

    let first = engine.broadcast_by_name("go");
    assert_eq!(first.len(), 1);
    engine.step();
    drain(&events);

    let second = engine.broadcast_by_name("GO");
    assert_eq!(second.len(), 1);
    assert_ne!(first, second);
    assert_eq!(engine.thread_count(), 1);
    assert!(engine.is_thread_running(second[0]));
    assert!(!engine.is_thread_running(first[0]));

    engine.step();
    assert_eq!(stop_signals(&drain(&events)), 1);
}

#[test]
fn non_restarting_hat_is_ignored_while_running() {
    let (mut engine, stage) = setup();
    engine.add_script(
        stage,
        forever_counting(),
        Some(HatBinding::new(HatType::KeyPressed).with_field("space")),
    );
    assert_eq!(engine.key_pressed("space").len(), 1);
    assert!(engine.key_pressed("space").is_empty());
    assert!(engine.key_pressed("a").is_empty());
    assert_eq!(engine.thread_count(), 1);
}

#[test]
fn any_key_hats_fire_for_every_key() {
    let (mut engine, stage) = setup();
    let once = ScriptBuilder::new()
        .constant(1)
        .change_var(OUT)
        .build()
        .unwrap();
    engine.add_script(
        stage,
        once,
        Some(HatBinding::new(HatType::KeyPressed).with_field("any")),
    );
    engine.key_pressed("x");
    engine.step();
    engine.key_pressed("y");
    engine.step();
    assert_eq!(out(&engine, stage).to_double(), 2.0);
}

#[test]
fn clicking_starts_only_that_targets_scripts() {
    let (mut engine, stage) = setup();
    let cat = engine.add_target(Target::sprite("Cat"));
    let dog = engine.add_target(Target::sprite("Dog"));
    for (target, amount) in [(cat, 1), (dog, 100)] {
        let script = ScriptBuilder::new()
            .constant(amount)
            .change_var(OUT)
            .build()
            .unwrap();
        engine.add_script(target, script, Some(HatBinding::new(HatType::TargetClicked)));
    }
    engine.click_target(dog);
    engine.step();
    assert_eq!(out(&engine, stage).to_double(), 100.0);
}

#[test]
fn backdrop_switch_starts_matching_hats() {
    let (mut engine, stage) = setup();
    if let Some(target) = engine.target_mut(stage) {
        target.costumes = vec!["day".into(), "night".into()];
    }
    let script = ScriptBuilder::new()
        .constant(1)
        .change_var(OUT)
        .build()
        .unwrap();
    engine.add_script(
        stage,
        script,
        Some(HatBinding::new(HatType::BackdropChanged).with_field("Night")),
    );
    assert!(engine.set_backdrop(&Value::from("day")).is_empty());
    assert_eq!(engine.set_backdrop(&Value::from(2)).len(), 1);
    engine.step();
    assert_eq!(out(&engine, stage).to_double(), 1.0);
    assert_eq!(engine.stage().unwrap().costume_name(), Some("night"));
}

// ─── pass termination ───

#[test]
fn infinite_loop_is_bounded_by_the_work_budget() {
    let clock = Arc::new(MockClock::auto_advance(Duration::from_millis(1)));
    let (mut engine, stage) = engine_with(Arc::clone(&clock), false);
    let id = engine.add_script(stage, forever_counting(), None);
    engine.start_script(id, stage);

    let events = engine.subscribe();
    let before = clock.peek();
    engine.step();
    let spent = clock.peek() - before;

    let budget = engine.config().work_budget();
    assert!(spent >= budget, "pass ended after {spent:?}");
    assert!(spent < budget + Duration::from_millis(5));
    assert!(out(&engine, stage).to_double() > 1.0);
    assert_eq!(drain(&events), vec![EngineEvent::AboutToRender]);
}

#[test]
fn redraw_request_ends_the_pass_outside_turbo_mode() {
    for (turbo, expect_more_than_one) in [(false, false), (true, true)] {
        let clock = Arc::new(MockClock::auto_advance(Duration::from_millis(1)));
        let (mut engine, _) = engine_with(clock, turbo);
        let cat = engine.add_target(Target::sprite("Cat"));
        let change_x = block(&engine, "motion_changexby");
        let script = ScriptBuilder::new()
            .op(Opcode::ForeverLoop)
            .constant(1)
            .exec(change_x, 1)
            .op(Opcode::LoopEnd)
            .build()
            .unwrap();
        let id = engine.add_script(cat, script, None);
        engine.start_script(id, cat);
        engine.step();
        let x = engine.target(cat).unwrap().sprite_state().unwrap().x;
        assert_eq!(x > 1.0, expect_more_than_one, "turbo = {turbo}");
    }
}

#[test]
fn positions_are_fenced_to_the_stage() {
    let (mut engine, _) = setup();
    let cat = engine.add_target(Target::sprite("Cat"));
    let go_to = block(&engine, "motion_gotoxy");
    let script = ScriptBuilder::new()
        .constant(1000)
        .constant(-1000)
        .exec(go_to, 2)
        .build()
        .unwrap();
    let id = engine.add_script(cat, script, None);
    engine.start_script(id, cat);
    engine.step();
    let sprite = engine.target(cat).unwrap().sprite_state().unwrap();
    assert_eq!((sprite.x, sprite.y), (240.0, -180.0));
}

// ─── waiting ───

#[test]
fn wait_block_sleeps_for_its_duration() {
    let clock = Arc::new(MockClock::new());
    let (mut engine, stage) = engine_with(Arc::clone(&clock), false);
    let wait = block(&engine, "control_wait");
    let script = ScriptBuilder::new()
        .checkpoint()
        .constant(0.5)
        .exec(wait, 1)
        .constant(1)
        .set_var(OUT)
        .build()
        .unwrap();
    let id = engine.add_script(stage, script, None);
    engine.start_script(id, stage);

    engine.step();
    clock.advance(Duration::from_millis(300));
    engine.step();
    assert_eq!(out(&engine, stage).to_double(), 0.0);

    clock.advance(Duration::from_millis(300));
    engine.step();
    assert_eq!(out(&engine, stage).to_double(), 1.0);
    assert!(!engine.is_running());
}

#[test]
fn wait_until_rechecks_each_pass() {
    let (mut engine, stage) = setup();
    let wait_until = block(&engine, "control_wait_until");
    let script = ScriptBuilder::new()
        .checkpoint()
        .read_var(OUT)
        .constant(5)
        .op(Opcode::Equals)
        .exec(wait_until, 1)
        .constant("done")
        .set_var(OUT)
        .build()
        .unwrap();
    let id = engine.add_script(stage, script, None);
    engine.start_script(id, stage);
    engine.run_frames(3);
    assert!(engine.is_running());

    *engine.variable_mut(stage, OUT).unwrap() = Value::from(5);
    engine.step();
    assert_eq!(out(&engine, stage).to_string(), "done");
}

// ─── stopping ───

#[test]
fn stop_all_from_a_script_stops_everything() {
    let (mut engine, stage) = setup();
    let events = engine.subscribe();
    let id = engine.add_script(stage, forever_counting(), None);
    engine.start_script(id, stage);

    let stop = block(&engine, "control_stop");
    let stopper = ScriptBuilder::new()
        .constant("all")
        .exec(stop, 1)
        .constant(-100)
        .set_var(OUT)
        .build()
        .unwrap();
    let id = engine.add_script(stage, stopper, None);
    engine.start_script(id, stage);

    engine.step();
    assert!(!engine.is_running());
    assert!(out(&engine, stage).to_double() >= 0.0);
    let seen = drain(&events);
    assert!(seen.contains(&EngineEvent::Stopped));
    assert_eq!(stop_signals(&seen), 2);
}

#[test]
fn stop_other_scripts_keeps_the_caller() {
    let (mut engine, stage) = setup();
    let id = engine.add_script(stage, forever_counting(), None);
    let victim = engine.start_script(id, stage).unwrap();

    let stop = block(&engine, "control_stop");
    let script = ScriptBuilder::new()
        .constant("other scripts in stage")
        .exec(stop, 1)
        .op(Opcode::ForeverLoop)
        .op(Opcode::LoopEnd)
        .build()
        .unwrap();
    let id = engine.add_script(stage, script, None);
    let keeper = engine.start_script(id, stage).unwrap();

    engine.step();
    assert!(!engine.is_thread_running(victim));
    assert!(engine.is_thread_running(keeper));
}

#[test]
fn a_thread_signals_its_stop_exactly_once() {
    let (mut engine, stage) = setup();
    let events = engine.subscribe();
    let script = ScriptBuilder::new().build().unwrap();
    let id = engine.add_script(stage, script, None);
    let thread = engine.start_script(id, stage).unwrap();
    engine.run_frames(3);
    engine.stop();
    let seen = drain(&events);
    let signals: Vec<_> = seen
        .iter()
        .filter(|e| matches!(e, EngineEvent::ThreadAboutToStop { thread: t, .. } if *t == thread))
        .collect();
    assert_eq!(signals.len(), 1);
}

// ─── edge-activated hats ───

#[test]
fn edge_hats_fire_on_false_to_true_transitions() {
    let (mut engine, stage) = setup();
    if let Some(target) = engine.target_mut(stage) {
        target.variables.push(stagehand_rt::target::Variable {
            name: "hits".into(),
            value: Value::from(0),
        });
    }
    let hits = VarRef::Stage(1);
    let predicate = ScriptBuilder::new()
        .read_var(OUT)
        .constant(5)
        .op(Opcode::GreaterThan)
        .build()
        .unwrap();
    let predicate = engine.add_script(stage, predicate, None);
    let body = ScriptBuilder::new()
        .constant(1)
        .change_var(hits)
        .build()
        .unwrap();
    engine.add_script(
        stage,
        body,
        Some(HatBinding::new(HatType::WhenGreaterThan).with_predicate(predicate)),
    );
    let hit_count = |engine: &Engine| engine.variable(stage, hits).unwrap().to_double();

    engine.step();
    assert_eq!(hit_count(&engine), 0.0);

    *engine.variable_mut(stage, OUT).unwrap() = Value::from(10);
    engine.step();
    engine.step();
    assert_eq!(hit_count(&engine), 1.0);

    *engine.variable_mut(stage, OUT).unwrap() = Value::from(0);
    engine.step();
    *engine.variable_mut(stage, OUT).unwrap() = Value::from(6);
    engine.step();
    assert_eq!(hit_count(&engine), 2.0);
}

// ─── monitors ───

#[test]
fn visible_monitors_refresh_after_each_pass() {
    let (mut engine, stage) = setup();
    let events = engine.subscribe();
    let read = ScriptBuilder::new().read_var(OUT).build().unwrap();
    let monitor = engine.add_monitor("out", stage, read);
    assert_eq!(drain(&events), vec![EngineEvent::MonitorAdded(monitor)]);

    *engine.variable_mut(stage, OUT).unwrap() = Value::from(42);
    engine.step();
    assert_eq!(engine.monitor(monitor).unwrap().value().to_double(), 42.0);

    engine.set_monitor_visible(monitor, false);
    *engine.variable_mut(stage, OUT).unwrap() = Value::from(7);
    engine.step();
    assert_eq!(engine.monitor(monitor).unwrap().value().to_double(), 42.0);

    assert!(engine.remove_monitor(monitor));
    assert!(engine.monitors().is_empty());
    assert!(drain(&events).contains(&EngineEvent::MonitorRemoved(monitor)));
}

#[test]
fn removing_a_monitor_unregisters_its_script() {
    let (mut engine, stage) = setup();
    let before = engine.script_count();
    let read = || ScriptBuilder::new().read_var(OUT).build().unwrap();

    let monitor = engine.add_monitor("out", stage, read());
    let script = engine.monitor(monitor).unwrap().script();
    assert_eq!(engine.script_count(), before + 1);

    assert!(engine.remove_monitor(monitor));
    assert_eq!(engine.script_count(), before);
    assert!(engine.script(script).is_none());

    // Adding and removing monitors repeatedly keeps reusing the freed id.
    for _ in 0..100 {
        let again = engine.add_monitor("out", stage, read());
        assert_eq!(engine.monitor(again).unwrap().script(), script);
        assert!(engine.remove_monitor(again));
    }
    assert_eq!(engine.script_count(), before);
}

#[test]
fn data_blocks_toggle_monitors_by_name() {
    let (mut engine, stage) = setup();
    let read = ScriptBuilder::new().read_var(OUT).build().unwrap();
    let monitor = engine.add_monitor("out", stage, read);
    let hide = block(&engine, "data_hidevariable");
    let script = ScriptBuilder::new()
        .constant("out")
        .exec(hide, 1)
        .build()
        .unwrap();
    let id = engine.add_script(stage, script, None);
    engine.start_script(id, stage);
    engine.step();
    assert!(!engine.monitor(monitor).unwrap().visible);
}

// ─── questions ───

fn asking_script(engine: &Engine, question: &str) -> Script {
    ScriptBuilder::new()
        .constant(question)
        .exec(block(engine, "sensing_askandwait"), 1)
        .exec(block(engine, "sensing_answer"), 0)
        .set_var(OUT)
        .build()
        .unwrap()
}

#[test]
fn ask_and_wait_resumes_with_the_answer() {
    let (mut engine, stage) = setup();
    let events = engine.subscribe();
    let script = asking_script(&engine, "name?");
    let id = engine.add_script(stage, script, None);
    engine.start_script(id, stage);

    engine.run_frames(2);
    assert_eq!(engine.current_question(), Some("name?"));
    assert!(engine.is_running());

    engine.answer("Ada");
    engine.step();
    assert_eq!(out(&engine, stage).to_string(), "Ada");
    assert_eq!(engine.last_answer(), "Ada");
    let seen = drain(&events);
    assert!(seen.contains(&EngineEvent::QuestionAsked("name?".into())));
    assert!(seen.contains(&EngineEvent::QuestionAnswered("Ada".into())));
}

#[test]
fn questions_are_asked_one_at_a_time() {
    let (mut engine, stage) = setup();
    for question in ["first?", "second?"] {
        let script = asking_script(&engine, question);
        let id = engine.add_script(stage, script, None);
        engine.start_script(id, stage);
    }
    engine.step();
    assert_eq!(engine.current_question(), Some("first?"));
    engine.answer("1");
    assert_eq!(engine.current_question(), Some("second?"));
}

#[test]
fn stopping_the_asker_aborts_its_question() {
    let (mut engine, stage) = setup();
    let events = engine.subscribe();
    let script = asking_script(&engine, "still there?");
    let id = engine.add_script(stage, script, None);
    engine.start_script(id, stage);
    engine.step();
    engine.stop();
    assert_eq!(engine.current_question(), None);
    assert!(drain(&events).contains(&EngineEvent::QuestionAborted));
}

// ─── timer ───

#[test]
fn timer_counts_from_the_last_reset() {
    let clock = Arc::new(MockClock::new());
    let (mut engine, _) = engine_with(Arc::clone(&clock), false);
    clock.advance(Duration::from_millis(1500));
    assert!((engine.timer() - 1.5).abs() < 1e-9);
    engine.reset_timer();
    assert_eq!(engine.timer(), 0.0);
    clock.advance(Duration::from_secs(2));
    engine.start();
    assert_eq!(engine.timer(), 0.0);
}
