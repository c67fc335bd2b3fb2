//! Threads: one running instance of a script bound to a target.

use crate::engine::{Engine, ScriptId};
use crate::script::Script;
use crate::target::TargetId;
use crate::vm::VirtualMachine;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

/// Unique thread identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadId(u64);

impl ThreadId {
    pub(crate) fn next() -> Self {
        ThreadId(NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "thread:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Promise
// ---------------------------------------------------------------------------

/// One-shot resolution flag shared between a waiting thread and whatever
/// wakes it (a finished broadcast, an answered question).
#[derive(Debug, Clone, Default)]
pub struct Promise(Arc<AtomicBool>);

impl Promise {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve(&self) {
        let already = self.0.swap(true, Ordering::AcqRel);
        debug_assert!(!already, "promise resolved twice");
    }

    pub fn is_resolved(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Per-thread state that blocks keep across scheduler passes.
#[derive(Debug, Default)]
pub struct ThreadSlots {
    pub promise: Option<Promise>,
    /// Deadline of an in-progress timed wait.
    pub timer: Option<Duration>,
}

// ---------------------------------------------------------------------------
// Thread
// ---------------------------------------------------------------------------

pub struct Thread {
    id: ThreadId,
    target: TargetId,
    script: ScriptId,
    vm: VirtualMachine,
    slots: ThreadSlots,
    stop_signaled: bool,
}

impl Thread {
    pub(crate) fn new(script_id: ScriptId, script: Arc<Script>, target: TargetId) -> Self {
        Self {
            id: ThreadId::next(),
            target,
            script: script_id,
            vm: VirtualMachine::new(script, script_id, target),
            slots: ThreadSlots::default(),
            stop_signaled: false,
        }
    }

    pub fn id(&self) -> ThreadId {
        self.id
    }

    pub fn target(&self) -> TargetId {
        self.target
    }

    pub fn script(&self) -> ScriptId {
        self.script
    }

    pub fn vm(&self) -> &VirtualMachine {
        &self.vm
    }

    pub fn vm_mut(&mut self) -> &mut VirtualMachine {
        &mut self.vm
    }

    /// Run one quantum. A thread holding an unresolved promise does not run;
    /// once the promise resolves it is dropped and execution continues.
    /// Returns whether the VM was entered.
    pub fn run(&mut self, engine: &mut Engine) -> bool {
        if self.is_finished() {
            return false;
        }
        if let Some(promise) = &self.slots.promise {
            if !promise.is_resolved() {
                return false;
            }
            self.slots.promise = None;
        }
        self.vm.run(engine, self.id, &mut self.slots);
        true
    }

    pub fn is_finished(&self) -> bool {
        self.vm.at_end()
    }

    /// Waiting on an unresolved promise.
    pub fn is_waiting(&self) -> bool {
        self.slots
            .promise
            .as_ref()
            .is_some_and(|p| !p.is_resolved())
    }

    pub fn promise(&self) -> Option<&Promise> {
        self.slots.promise.as_ref()
    }

    pub fn set_promise(&mut self, promise: Promise) {
        debug_assert!(!self.is_waiting(), "thread already holds a live promise");
        self.slots.promise = Some(promise);
    }

    /// Stop without running further instructions. Returns whether the
    /// thread was still unfinished.
    pub fn kill(&mut self) -> bool {
        let was_running = !self.is_finished();
        self.vm.kill();
        self.slots = ThreadSlots::default();
        was_running
    }

    /// True exactly once per thread: the first time it is asked after the
    /// thread stopped.
    pub(crate) fn take_stop_signal(&mut self) -> bool {
        if self.stop_signaled || !self.is_finished() {
            return false;
        }
        self.stop_signaled = true;
        true
    }
}

impl fmt::Debug for Thread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thread")
            .field("id", &self.id)
            .field("target", &self.target)
            .field("script", &self.script)
            .field("finished", &self.is_finished())
            .field("waiting", &self.is_waiting())
            .finish()
    }
}
