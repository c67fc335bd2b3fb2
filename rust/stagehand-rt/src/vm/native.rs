//! The calling convention for native block functions.

use crate::engine::{Engine, ScriptId};
use crate::target::{SpriteState, Target, TargetId};
use crate::thread::{Promise, ThreadId, ThreadSlots};
use stagehand_core::Value;
use std::time::Duration;

/// A native block implementation, invoked by `EXEC`.
pub type BlockFn = fn(&mut BlockContext<'_>) -> BlockOutcome;

/// How a suspending block wants its thread resumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Yield {
    /// Continue from the current position on the next run; otherwise the
    /// script restarts from the top.
    pub resume_here: bool,
    /// Do not run this thread again during the current scheduler pass.
    pub defer_this_pass: bool,
    /// Before resuming, rewind to the most recent `CHECKPOINT` so the
    /// block's inputs are evaluated again.
    pub rewind_to_checkpoint: bool,
}

impl Yield {
    /// Give up the rest of this pass and continue after the block next pass.
    pub const NEXT_PASS: Yield = Yield {
        resume_here: true,
        defer_this_pass: true,
        rewind_to_checkpoint: false,
    };

    /// Re-run the block (and its inputs) from the checkpoint next pass.
    pub const RETRY: Yield = Yield {
        resume_here: true,
        defer_this_pass: true,
        rewind_to_checkpoint: true,
    };

    /// Let other threads run, but stay eligible within this pass.
    pub const SHARE: Yield = Yield {
        resume_here: true,
        defer_this_pass: false,
        rewind_to_checkpoint: false,
    };
}

/// What a native block did.
#[derive(Debug, Clone, PartialEq)]
pub enum BlockOutcome {
    /// Reporter result, pushed onto the register stack.
    Value(Value),
    /// Command completed; nothing is pushed.
    Done,
    /// Suspend the thread.
    Yield(Yield),
    /// End this script.
    Finish,
}

impl From<Value> for BlockOutcome {
    fn from(value: Value) -> Self {
        BlockOutcome::Value(value)
    }
}

static MISSING_INPUT: Value = Value::Number(0.0);

/// Everything a native block may touch while it runs.
pub struct BlockContext<'a> {
    engine: &'a mut Engine,
    thread: ThreadId,
    target: TargetId,
    script: ScriptId,
    inputs: &'a [Value],
    slots: &'a mut ThreadSlots,
}

impl<'a> BlockContext<'a> {
    pub(crate) fn new(
        engine: &'a mut Engine,
        thread: ThreadId,
        target: TargetId,
        script: ScriptId,
        inputs: &'a [Value],
        slots: &'a mut ThreadSlots,
    ) -> Self {
        Self {
            engine,
            thread,
            target,
            script,
            inputs,
            slots,
        }
    }

    pub fn engine(&mut self) -> &mut Engine {
        &mut *self.engine
    }

    pub fn engine_ref(&self) -> &Engine {
        &*self.engine
    }

    pub fn thread(&self) -> ThreadId {
        self.thread
    }

    pub fn target_id(&self) -> TargetId {
        self.target
    }

    pub fn script(&self) -> ScriptId {
        self.script
    }

    /// The executing target, or `None` if it has been deleted.
    pub fn target(&self) -> Option<&Target> {
        self.engine.target(self.target)
    }

    pub fn target_mut(&mut self) -> Option<&mut Target> {
        self.engine.target_mut(self.target)
    }

    /// Sprite state of the executing target; `None` on the stage.
    pub fn sprite_mut(&mut self) -> Option<&mut SpriteState> {
        self.engine
            .target_mut(self.target)
            .and_then(Target::sprite_state_mut)
    }

    /// Input `index`, counting from the first argument. Missing inputs read
    /// as `0`.
    pub fn input(&self, index: usize) -> &Value {
        self.inputs.get(index).unwrap_or(&MISSING_INPUT)
    }

    /// Input `index` of the last `arg_count` values on the register stack.
    pub fn get_input(&self, index: usize, arg_count: usize) -> &Value {
        let base = self.inputs.len().saturating_sub(arg_count);
        self.input(base + index)
    }

    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    pub fn set_promise(&mut self, promise: Promise) {
        debug_assert!(
            self.slots.promise.as_ref().map_or(true, Promise::is_resolved),
            "thread already holds a live promise"
        );
        self.slots.promise = Some(promise);
    }

    pub fn timer(&self) -> Option<Duration> {
        self.slots.timer
    }

    pub fn set_timer(&mut self, deadline: Duration) {
        self.slots.timer = Some(deadline);
    }

    pub fn clear_timer(&mut self) {
        self.slots.timer = None;
    }
}
