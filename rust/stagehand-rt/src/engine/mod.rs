//! The engine: target arena, script table and the cooperative scheduler.
//!
//! # Scheduling pass ([`Engine::step`])
//!
//! 1. Sweep finished threads out of the running list.
//! 2. Evaluate edge-activated hats and start scripts whose predicate went
//!    from false to true.
//! 3. Wake broadcast-and-wait senders whose receivers have all finished.
//! 4. Run threads round-robin in list order, sweeping repeatedly until the
//!    list is empty, a sweep leaves no thread active, the work budget
//!    (`work_fraction` of the frame) is spent, or, outside turbo mode, a
//!    block requested a redraw.
//! 5. Refresh visible monitors and emit [`EngineEvent::AboutToRender`].
//!
//! Everything runs on the caller's thread. While a thread executes, its slot
//! in the running list is vacated so native blocks can borrow the engine
//! mutably; the list only grows during a pass and is compacted between
//! sweeps, so blocks that start, restart or stop threads never invalidate the
//! sweep in progress.

mod broadcast;
mod clones;
mod hats;
mod monitors;
mod questions;

pub use broadcast::BroadcastId;
pub use hats::{HatBinding, HatType};
pub use monitors::{Monitor, MonitorId};

use crate::blocks::{BlockRegistry, BlockSection};
use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::events::{EngineEvent, EventBus};
use crate::script::{Script, VarRef};
use crate::target::{List, Target, TargetId};
use crate::thread::{Thread, ThreadId};
use crate::vm::BlockFn;
use broadcast::BroadcastWait;
use crossbeam_channel::Receiver;
use questions::Question;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use stagehand_core::Value;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// Index of a script in the engine's script table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScriptId(pub u32);

impl ScriptId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ScriptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "script:{}", self.0)
    }
}

struct ScriptEntry {
    script: Arc<Script>,
    target: TargetId,
    hat: Option<HatBinding>,
}

/// One slot of the target arena. The generation is bumped when the slot is
/// vacated.
struct TargetSlot {
    generation: u32,
    target: Option<Target>,
}

/// Bookkeeping for the thread currently taken out of the list to run.
struct ActiveThread {
    id: ThreadId,
    target: TargetId,
    script: ScriptId,
    stopping: bool,
    replacement: Option<Thread>,
}

pub struct Engine {
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    rng: StdRng,
    registry: BlockRegistry,

    targets: Vec<TargetSlot>,
    free_targets: Vec<u32>,
    /// Drawing order, back to front. The stage is always first.
    layers: Vec<TargetId>,
    stage: Option<TargetId>,

    scripts: Vec<Option<ScriptEntry>>,
    free_scripts: Vec<u32>,
    hat_scripts: HashMap<(HatType, TargetId), Vec<ScriptId>>,
    /// Last predicate result per edge-activated (script, target) pair.
    edge_values: HashMap<(ScriptId, TargetId), bool>,

    broadcasts: Vec<String>,
    broadcast_waits: Vec<BroadcastWait>,

    threads: Vec<Option<Thread>>,
    active: Option<ActiveThread>,

    monitors: Vec<Monitor>,
    next_monitor: u32,
    questions: VecDeque<Question>,
    answer: String,
    keys_down: HashSet<String>,
    unsupported_blocks: BTreeSet<String>,

    events: EventBus,
    redraw_requested: bool,
    timer_origin: Duration,
    clone_count: usize,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock::new()))
    }

    pub fn with_clock(config: EngineConfig, clock: Arc<dyn Clock>) -> Self {
        let rng = match config.random_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let timer_origin = clock.now();
        let mut engine = Self {
            config,
            clock,
            rng,
            registry: BlockRegistry::default(),
            targets: Vec::new(),
            free_targets: Vec::new(),
            layers: Vec::new(),
            stage: None,
            scripts: Vec::new(),
            free_scripts: Vec::new(),
            hat_scripts: HashMap::new(),
            edge_values: HashMap::new(),
            broadcasts: Vec::new(),
            broadcast_waits: Vec::new(),
            threads: Vec::new(),
            active: None,
            monitors: Vec::new(),
            next_monitor: 0,
            questions: VecDeque::new(),
            answer: String::new(),
            keys_down: HashSet::new(),
            unsupported_blocks: BTreeSet::new(),
            events: EventBus::default(),
            redraw_requested: false,
            timer_origin,
            clone_count: 0,
        };
        for section in crate::blocks::builtin_sections() {
            engine.register_section(section.as_ref());
        }
        engine
    }

    /// Drop every target, script, thread and monitor. Registered blocks and
    /// configuration are kept.
    pub fn clear(&mut self) {
        self.stop();
        self.targets.clear();
        self.free_targets.clear();
        self.layers.clear();
        self.stage = None;
        self.scripts.clear();
        self.free_scripts.clear();
        self.hat_scripts.clear();
        self.edge_values.clear();
        self.broadcasts.clear();
        self.broadcast_waits.clear();
        self.threads.clear();
        for monitor in std::mem::take(&mut self.monitors) {
            self.events.emit(EngineEvent::MonitorRemoved(monitor.id()));
        }
        self.questions.clear();
        self.answer.clear();
        self.keys_down.clear();
        self.unsupported_blocks.clear();
        self.clone_count = 0;
    }

    // -- configuration ------------------------------------------------------

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Values that are not positive and finite are ignored.
    pub fn set_fps(&mut self, fps: f64) {
        if fps > 0.0 && fps.is_finite() {
            self.config.fps = fps;
        }
    }

    pub fn set_turbo_mode(&mut self, turbo: bool) {
        self.config.turbo_mode = turbo;
    }

    /// Negative means unlimited.
    pub fn set_clone_limit(&mut self, limit: i64) {
        self.config.clone_limit = limit;
    }

    pub fn subscribe(&mut self) -> Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub(crate) fn emit(&mut self, event: EngineEvent) {
        self.events.emit(event);
    }

    // -- block registry -----------------------------------------------------

    pub fn register_section(&mut self, section: &dyn BlockSection) {
        debug!(section = section.name(), "registering block section");
        section.register_blocks(&mut self.registry);
    }

    pub fn resolve_block(&self, opcode: &str) -> Option<BlockFn> {
        self.registry.resolve_block(opcode)
    }

    pub fn resolve_hat(&self, opcode: &str) -> Option<HatType> {
        self.registry.resolve_hat(opcode)
    }

    pub fn registry(&self) -> &BlockRegistry {
        &self.registry
    }

    /// Opcodes the compiler could not resolve; their scripts were skipped.
    pub fn unsupported_blocks(&self) -> &BTreeSet<String> {
        &self.unsupported_blocks
    }

    pub(crate) fn record_unsupported(&mut self, opcode: String) {
        self.unsupported_blocks.insert(opcode);
    }

    // -- targets ------------------------------------------------------------

    /// Add a target and return its id. The stage goes to the back layer,
    /// sprites in front of everything already added.
    pub fn add_target(&mut self, target: Target) -> TargetId {
        let is_stage = target.is_stage();
        let name = target.name.clone();
        let id = self.place_target(target);
        if is_stage && self.stage.is_none() {
            self.stage = Some(id);
            self.layers.insert(0, id);
        } else {
            self.layers.push(id);
        }
        debug!(target = %id, %name, "added target");
        id
    }

    /// Put `target` in a free arena slot, or a new one, without touching
    /// the layer list.
    pub(crate) fn place_target(&mut self, mut target: Target) -> TargetId {
        let id = match self.free_targets.pop() {
            Some(index) => {
                let generation = self
                    .targets
                    .get(index as usize)
                    .map_or(0, |slot| slot.generation);
                TargetId::new(index, generation)
            }
            None => {
                self.targets.push(TargetSlot {
                    generation: 0,
                    target: None,
                });
                TargetId::new(self.targets.len() as u32 - 1, 0)
            }
        };
        target.id = id;
        if let Some(slot) = self.targets.get_mut(id.index()) {
            slot.target = Some(target);
        }
        id
    }

    /// Vacate the slot of `id` for reuse under the next generation.
    pub(crate) fn take_target(&mut self, id: TargetId) -> Option<Target> {
        let slot = self
            .targets
            .get_mut(id.index())
            .filter(|slot| slot.generation == id.generation())?;
        let target = slot.target.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free_targets.push(id.index() as u32);
        Some(target)
    }

    /// Number of arena slots, live or free.
    pub fn target_capacity(&self) -> usize {
        self.targets.len()
    }

    pub fn target(&self, id: TargetId) -> Option<&Target> {
        self.targets
            .get(id.index())
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.target.as_ref())
    }

    pub fn target_mut(&mut self, id: TargetId) -> Option<&mut Target> {
        self.targets
            .get_mut(id.index())
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.target.as_mut())
    }

    pub fn stage_id(&self) -> Option<TargetId> {
        self.stage
    }

    pub fn stage(&self) -> Option<&Target> {
        self.stage.and_then(|id| self.target(id))
    }

    pub fn stage_mut(&mut self) -> Option<&mut Target> {
        let id = self.stage?;
        self.target_mut(id)
    }

    /// Live targets in arena order.
    pub fn targets(&self) -> impl Iterator<Item = &Target> {
        self.targets.iter().filter_map(|slot| slot.target.as_ref())
    }

    /// Find an original (non-clone) target by name.
    pub fn find_target(&self, name: &str) -> Option<TargetId> {
        self.targets()
            .find(|t| !t.is_clone() && t.name == name)
            .map(Target::id)
    }

    /// Target ids in drawing order, back to front.
    pub fn layer_order(&self) -> &[TargetId] {
        &self.layers
    }

    /// Move a sprite to the front or back layer. The stage stays behind.
    pub fn move_to_layer_edge(&mut self, id: TargetId, front: bool) {
        if Some(id) == self.stage {
            return;
        }
        let Some(pos) = self.layers.iter().position(|t| *t == id) else {
            return;
        };
        self.layers.remove(pos);
        if front {
            self.layers.push(id);
        } else {
            let first_sprite = usize::from(self.stage.is_some());
            self.layers.insert(first_sprite.min(self.layers.len()), id);
        }
    }

    // -- variables and lists ------------------------------------------------

    pub fn variable(&self, target: TargetId, var: VarRef) -> Option<&Value> {
        let (owner, index) = self.resolve_owner(target, var)?;
        self.target(owner)?.variables.get(index).map(|v| &v.value)
    }

    pub fn variable_mut(&mut self, target: TargetId, var: VarRef) -> Option<&mut Value> {
        let (owner, index) = self.resolve_owner(target, var)?;
        self.target_mut(owner)?
            .variables
            .get_mut(index)
            .map(|v| &mut v.value)
    }

    pub fn list(&self, target: TargetId, list: VarRef) -> Option<&List> {
        let (owner, index) = self.resolve_owner(target, list)?;
        self.target(owner)?.lists.get(index)
    }

    pub fn list_mut(&mut self, target: TargetId, list: VarRef) -> Option<&mut List> {
        let (owner, index) = self.resolve_owner(target, list)?;
        self.target_mut(owner)?.lists.get_mut(index)
    }

    fn resolve_owner(&self, target: TargetId, var: VarRef) -> Option<(TargetId, usize)> {
        match var {
            VarRef::Local(index) => Some((target, index)),
            VarRef::Stage(index) => Some((self.stage?, index)),
        }
    }

    /// Look a variable up by name on `target`, falling back to the stage.
    pub fn variable_by_name(&self, target: TargetId, name: &str) -> Option<&Value> {
        let local = self
            .target(target)
            .and_then(|t| t.find_variable(name).map(|i| &t.variables[i].value));
        local.or_else(|| {
            let stage = self.stage()?;
            stage.find_variable(name).map(|i| &stage.variables[i].value)
        })
    }

    pub fn list_by_name(&self, target: TargetId, name: &str) -> Option<&List> {
        let local = self
            .target(target)
            .and_then(|t| t.find_list(name).map(|i| &t.lists[i]));
        local.or_else(|| {
            let stage = self.stage()?;
            stage.find_list(name).map(|i| &stage.lists[i])
        })
    }

    // -- scripts and threads ------------------------------------------------

    /// Register a script owned by `target`. With a hat binding it starts
    /// whenever that hat fires; without one it only runs when started
    /// explicitly or evaluated as a monitor or predicate.
    pub fn add_script(
        &mut self,
        target: TargetId,
        script: Script,
        hat: Option<HatBinding>,
    ) -> ScriptId {
        let entry = ScriptEntry {
            script: Arc::new(script),
            target,
            hat,
        };
        let id = match self.free_scripts.pop() {
            Some(index) => ScriptId(index),
            None => {
                self.scripts.push(None);
                ScriptId(self.scripts.len() as u32 - 1)
            }
        };
        if let Some(binding) = &entry.hat {
            self.hat_scripts
                .entry((binding.hat, target))
                .or_default()
                .push(id);
        }
        if let Some(slot) = self.scripts.get_mut(id.index()) {
            *slot = Some(entry);
        }
        id
    }

    /// Unregister a script: stop its threads, forget its hat binding and
    /// edge state, and free its id for reuse. Returns whether it existed.
    pub fn remove_script(&mut self, id: ScriptId) -> bool {
        let Some(entry) = self.scripts.get_mut(id.index()).and_then(Option::take) else {
            return false;
        };
        if let Some(binding) = &entry.hat {
            if let Some(scripts) = self.hat_scripts.get_mut(&(binding.hat, entry.target)) {
                scripts.retain(|s| *s != id);
            }
        }
        let running: Vec<ThreadId> = self
            .threads()
            .filter(|t| t.script() == id)
            .map(Thread::id)
            .chain(self.active.iter().filter(|a| a.script == id).map(|a| a.id))
            .collect();
        for thread in running {
            self.kill_thread(thread);
        }
        if let Some(active) = self.active.as_mut() {
            if active.replacement.as_ref().is_some_and(|t| t.script() == id) {
                active.replacement = None;
            }
        }
        self.edge_values.retain(|(script, _), _| *script != id);
        self.free_scripts.push(id.0);
        debug!(script = %id, "script removed");
        true
    }

    fn script_entry(&self, id: ScriptId) -> Option<&ScriptEntry> {
        self.scripts.get(id.index()).and_then(Option::as_ref)
    }

    pub fn script(&self, id: ScriptId) -> Option<&Arc<Script>> {
        self.script_entry(id).map(|e| &e.script)
    }

    pub fn script_target(&self, id: ScriptId) -> Option<TargetId> {
        self.script_entry(id).map(|e| e.target)
    }

    pub fn script_hat(&self, id: ScriptId) -> Option<&HatBinding> {
        self.script_entry(id).and_then(|e| e.hat.as_ref())
    }

    /// Number of registered scripts.
    pub fn script_count(&self) -> usize {
        self.scripts.iter().flatten().count()
    }

    /// Start a new thread running `script` on `target`, appended to the
    /// running list.
    pub fn start_script(&mut self, script: ScriptId, target: TargetId) -> Option<ThreadId> {
        if self.target(target).is_none() {
            return None;
        }
        self.push_thread(script, target)
    }

    pub(crate) fn push_thread(&mut self, script: ScriptId, target: TargetId) -> Option<ThreadId> {
        let code = Arc::clone(self.script(script)?);
        let thread = Thread::new(script, code, target);
        let id = thread.id();
        debug!(thread = %id, %script, %target, "thread started");
        self.threads.push(Some(thread));
        Some(id)
    }

    /// Threads in the running list, excluding one that is executing right
    /// now.
    pub fn threads(&self) -> impl Iterator<Item = &Thread> {
        self.threads.iter().flatten()
    }

    pub fn thread_count(&self) -> usize {
        self.threads().count() + usize::from(self.active.is_some())
    }

    pub fn thread(&self, id: ThreadId) -> Option<&Thread> {
        self.threads().find(|t| t.id() == id)
    }

    /// Whether `id` exists and has not finished.
    pub fn is_thread_running(&self, id: ThreadId) -> bool {
        if self.active.as_ref().is_some_and(|a| a.id == id && !a.stopping) {
            return true;
        }
        self.thread(id).is_some_and(|t| !t.is_finished())
    }

    /// Whether the thread executing now has been stopped or replaced and
    /// must not execute another instruction.
    pub(crate) fn is_stopping(&self, thread: ThreadId) -> bool {
        self.active
            .as_ref()
            .is_some_and(|a| a.id == thread && a.stopping)
    }

    /// Stop a thread. Returns whether it was still running.
    pub fn kill_thread(&mut self, id: ThreadId) -> bool {
        if let Some(active) = self.active.as_mut().filter(|a| a.id == id) {
            let was_running = !active.stopping;
            active.stopping = true;
            return was_running;
        }
        let Some(index) = self
            .threads
            .iter()
            .position(|slot| slot.as_ref().is_some_and(|t| t.id() == id))
        else {
            return false;
        };
        let Some(mut thread) = self.threads[index].take() else {
            return false;
        };
        let was_running = thread.kill();
        self.signal_stopped(&mut thread);
        self.threads[index] = Some(thread);
        was_running
    }

    fn thread_ids_where(&self, keep: impl Fn(ThreadId, TargetId) -> bool) -> Vec<ThreadId> {
        let active = self
            .active
            .as_ref()
            .map(|a| (a.id, a.target))
            .into_iter();
        self.threads()
            .map(|t| (t.id(), t.target()))
            .chain(active)
            .filter(|(id, target)| keep(*id, *target))
            .map(|(id, _)| id)
            .collect()
    }

    /// Stop every thread running on `target`.
    pub fn stop_target_threads(&mut self, target: TargetId) {
        for id in self.thread_ids_where(|_, t| t == target) {
            self.kill_thread(id);
        }
    }

    /// Stop every thread on `target` except `keep`.
    pub fn stop_other_threads(&mut self, target: TargetId, keep: ThreadId) {
        for id in self.thread_ids_where(|id, t| t == target && id != keep) {
            self.kill_thread(id);
        }
    }

    /// Emit the "about to stop" notification for a stopped thread, once.
    fn signal_stopped(&mut self, thread: &mut Thread) {
        if thread.take_stop_signal() {
            self.on_thread_stopped(thread.id(), thread.target());
        }
    }

    fn on_thread_stopped(&mut self, id: ThreadId, target: TargetId) {
        debug!(thread = %id, %target, "thread stopped");
        self.broadcast_waits.retain(|w| w.sender != id);
        self.abort_question(id);
        self.events
            .emit(EngineEvent::ThreadAboutToStop { thread: id, target });
    }

    /// Remove finished threads from the list. Deferred while a thread is
    /// executing, since its slot is vacant.
    fn sweep_finished(&mut self) {
        if self.active.is_some() {
            return;
        }
        let mut stopped = Vec::new();
        self.threads.retain_mut(|slot| match slot {
            Some(thread) if thread.is_finished() => {
                if thread.take_stop_signal() {
                    stopped.push((thread.id(), thread.target()));
                }
                false
            }
            Some(_) => true,
            None => false,
        });
        for (id, target) in stopped {
            self.on_thread_stopped(id, target);
        }
    }

    // -- scheduler ----------------------------------------------------------

    /// Green flag: stop everything, reset the timer, start green-flag hats.
    pub fn start(&mut self) -> Vec<ThreadId> {
        self.stop();
        self.reset_timer();
        self.edge_values.clear();
        self.start_hats(HatType::GreenFlag, None)
    }

    /// Stop every thread, delete every clone and emit
    /// [`EngineEvent::Stopped`].
    pub fn stop(&mut self) {
        for id in self.thread_ids_where(|_, _| true) {
            self.kill_thread(id);
        }
        self.broadcast_waits.clear();
        self.delete_all_clones();
        self.sweep_finished();
        self.events.emit(EngineEvent::Stopped);
    }

    /// Whether any thread is still in the running list.
    pub fn is_running(&self) -> bool {
        self.thread_count() > 0
    }

    pub fn run_frames(&mut self, frames: usize) {
        for _ in 0..frames {
            self.step();
        }
    }

    /// One scheduler pass.
    pub fn step(&mut self) {
        let frame_start = self.clock.now();
        let budget = self.config.work_budget();
        self.sweep_finished();
        self.check_edge_hats();
        self.resolve_broadcast_waits();
        self.run_threads(frame_start, budget);
        self.update_monitors();
        self.events.emit(EngineEvent::AboutToRender);
    }

    fn run_threads(&mut self, frame_start: Duration, budget: Duration) {
        self.redraw_requested = false;
        for thread in self.threads.iter_mut().flatten() {
            thread.vm_mut().clear_deferred();
        }
        loop {
            let mut active = 0;
            let mut index = 0;
            // Threads started during the sweep are appended and run in it.
            while index < self.threads.len() {
                if self.run_thread_at(index) {
                    active += 1;
                }
                index += 1;
            }
            self.sweep_finished();

            if self.threads.is_empty() || active == 0 {
                break;
            }
            let elapsed = self.clock.now().saturating_sub(frame_start);
            if elapsed >= budget {
                trace!(?elapsed, active, "frame budget exhausted");
                break;
            }
            if self.redraw_requested && !self.config.turbo_mode {
                break;
            }
        }
    }

    /// Run the thread at `index` for one quantum. Returns whether it is
    /// still active afterwards: unfinished, not waiting and not deferred.
    fn run_thread_at(&mut self, index: usize) -> bool {
        let runnable = self.threads[index]
            .as_ref()
            .is_some_and(|t| !t.is_finished() && !t.vm().is_deferred() && !t.is_waiting());
        if !runnable {
            return false;
        }
        let Some(mut thread) = self.threads[index].take() else {
            return false;
        };
        self.active = Some(ActiveThread {
            id: thread.id(),
            target: thread.target(),
            script: thread.script(),
            stopping: false,
            replacement: None,
        });

        thread.run(self);

        let (stopping, replacement) = self
            .active
            .take()
            .map_or((false, None), |a| (a.stopping, a.replacement));
        if stopping {
            thread.kill();
            self.signal_stopped(&mut thread);
        }
        match replacement {
            Some(fresh) => {
                self.threads[index] = Some(fresh);
                false
            }
            None => {
                let active =
                    !thread.is_finished() && !thread.vm().is_deferred() && !thread.is_waiting();
                self.threads[index] = Some(thread);
                active
            }
        }
    }

    // -- timing, input and randomness ---------------------------------------

    pub fn now(&self) -> Duration {
        self.clock.now()
    }

    /// Seconds since the project timer was last reset.
    pub fn timer(&self) -> f64 {
        self.clock
            .now()
            .saturating_sub(self.timer_origin)
            .as_secs_f64()
    }

    pub fn reset_timer(&mut self) {
        self.timer_origin = self.clock.now();
    }

    /// Ask the host to redraw. Outside turbo mode this ends the current
    /// pass after the sweep in progress.
    pub fn request_redraw(&mut self) {
        self.redraw_requested = true;
    }

    pub fn redraw_requested(&self) -> bool {
        self.redraw_requested
    }

    /// A key went down: remember it and start matching key hats (including
    /// those listening for "any").
    pub fn key_pressed(&mut self, key: &str) -> Vec<ThreadId> {
        let key = key.to_lowercase();
        self.keys_down.insert(key.clone());
        let mut started = self.start_hats(HatType::KeyPressed, Some(&key));
        if key != "any" {
            started.extend(self.start_hats(HatType::KeyPressed, Some("any")));
        }
        started
    }

    pub fn key_released(&mut self, key: &str) {
        self.keys_down.remove(&key.to_lowercase());
    }

    pub fn is_key_down(&self, key: &str) -> bool {
        let key = key.to_lowercase();
        if key == "any" {
            !self.keys_down.is_empty()
        } else {
            self.keys_down.contains(&key)
        }
    }

    /// The user clicked `target`.
    pub fn click_target(&mut self, target: TargetId) -> Vec<ThreadId> {
        self.start_hats_on(HatType::TargetClicked, None, Some(target))
    }

    /// Switch the stage backdrop by name or number and start the matching
    /// backdrop hats.
    pub fn set_backdrop(&mut self, backdrop: &Value) -> Vec<ThreadId> {
        let Some(stage) = self.stage_mut() else {
            return Vec::new();
        };
        if !stage.set_costume(backdrop) {
            return Vec::new();
        }
        let name = stage.costume_name().unwrap_or_default().to_string();
        self.request_redraw();
        self.start_hats(HatType::BackdropChanged, Some(&name))
    }

    /// A random value between the bounds, inclusive. Integral when both
    /// bounds are integral numbers.
    pub fn random_between(&mut self, from: &Value, to: &Value) -> Value {
        let a = from.to_double();
        let b = to.to_double();
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        if low == high {
            return Value::from(low);
        }
        let integral = |v: &Value, n: f64| n.fract() == 0.0 && !v.to_string().contains('.');
        if integral(from, a) && integral(to, b) && high - low < u64::MAX as f64 {
            let offset = self.rng.gen_range(0..=(high - low) as u64);
            return Value::from(low + offset as f64);
        }
        Value::from(low + self.rng.gen::<f64>() * (high - low))
    }

    /// A uniformly chosen zero-based index below `len` (0 when empty).
    pub fn random_index(&mut self, len: usize) -> usize {
        if len == 0 {
            0
        } else {
            self.rng.gen_range(0..len)
        }
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("targets", &self.targets().count())
            .field("scripts", &self.script_count())
            .field("threads", &self.thread_count())
            .field("clones", &self.clone_count)
            .finish()
    }
}
