//! Stack VM dispatch loop for executing script bytecode.
//!
//! A [`VirtualMachine`] is bound to one script and one target. Each call to
//! [`VirtualMachine::run`] executes instructions until the script ends or a
//! suspension point is reached: the end of a loop iteration (outside warp
//! mode), `BREAK_FRAME`, or a native block returning
//! [`BlockOutcome::Yield`]. Execution is never preempted otherwise.
//!
//! Loop counters, call frames and the checkpoint live in the VM, not on the
//! register stack, so they survive suspension.

mod native;
mod ops;

pub use native::{BlockContext, BlockFn, BlockOutcome, Yield};

use crate::engine::{Engine, ScriptId};
use crate::script::{ChunkRef, Script};
use crate::target::TargetId;
use crate::thread::{ThreadId, ThreadSlots};
use stagehand_core::{Opcode, Value};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopKind {
    Forever,
    Repeat,
    Until,
}

#[derive(Debug, Clone)]
struct LoopState {
    kind: LoopKind,
    index: usize,
    count: usize,
}

/// Saved caller state for a procedure call.
#[derive(Debug, Clone)]
struct CallFrame {
    return_chunk: ChunkRef,
    return_pos: usize,
    caller_warp: bool,
    loop_depth: usize,
    args: Vec<Value>,
    /// Restored on return so a rewind never lands in a finished procedure.
    caller_checkpoint: Option<Checkpoint>,
}

#[derive(Debug, Clone, Copy)]
struct Checkpoint {
    chunk: ChunkRef,
    pos: usize,
    registers: usize,
    frames: usize,
    loops: usize,
}

pub struct VirtualMachine {
    script: Arc<Script>,
    script_id: ScriptId,
    target: TargetId,

    registers: Vec<Value>,
    chunk: ChunkRef,
    pos: usize,
    loops: Vec<LoopState>,
    frames: Vec<CallFrame>,
    pending_args: Vec<Vec<Value>>,
    checkpoint: Option<Checkpoint>,
    warp: bool,

    at_end: bool,
    /// Set by a yield that did not ask to resume in place.
    restart_pending: bool,
    rewind_pending: bool,
    deferred: bool,
}

impl VirtualMachine {
    pub fn new(script: Arc<Script>, script_id: ScriptId, target: TargetId) -> Self {
        let warp = script.chunk(ChunkRef::Main).is_warp();
        Self {
            script,
            script_id,
            target,
            registers: Vec::new(),
            chunk: ChunkRef::Main,
            pos: 0,
            loops: Vec::new(),
            frames: Vec::new(),
            pending_args: Vec::new(),
            checkpoint: None,
            warp,
            at_end: false,
            restart_pending: false,
            rewind_pending: false,
            deferred: false,
        }
    }

    pub fn script(&self) -> &Arc<Script> {
        &self.script
    }

    pub fn target(&self) -> TargetId {
        self.target
    }

    /// The script reached `HALT` or was killed.
    pub fn at_end(&self) -> bool {
        self.at_end
    }

    /// The last suspension asked not to be run again this pass.
    pub fn is_deferred(&self) -> bool {
        self.deferred
    }

    pub(crate) fn clear_deferred(&mut self) {
        self.deferred = false;
    }

    pub fn registers(&self) -> &[Value] {
        &self.registers
    }

    /// Restart from offset 0 with empty registers.
    pub fn reset(&mut self) {
        self.registers.clear();
        self.chunk = ChunkRef::Main;
        self.pos = 0;
        self.loops.clear();
        self.frames.clear();
        self.pending_args.clear();
        self.checkpoint = None;
        self.warp = self.script.chunk(ChunkRef::Main).is_warp();
        self.at_end = false;
        self.restart_pending = false;
        self.rewind_pending = false;
        self.deferred = false;
    }

    /// Rewind to the most recent `CHECKPOINT`, discarding registers, loops
    /// and frames pushed since. Without a checkpoint the script restarts.
    pub fn move_to_last_checkpoint(&mut self) {
        let Some(cp) = self.checkpoint else {
            self.reset();
            return;
        };
        self.chunk = cp.chunk;
        self.pos = cp.pos;
        self.registers.truncate(cp.registers);
        self.frames.truncate(cp.frames);
        self.loops.truncate(cp.loops);
        self.rewind_pending = false;
    }

    /// Suspend with the given resume behaviour. Takes effect when `run`
    /// returns.
    pub fn stop(&mut self, how: Yield) {
        self.restart_pending = !how.resume_here;
        self.rewind_pending = how.rewind_to_checkpoint;
        self.deferred = how.defer_this_pass;
    }

    /// Mark the script finished without executing anything further.
    pub fn kill(&mut self) {
        self.at_end = true;
        self.registers.clear();
        self.loops.clear();
        self.frames.clear();
        self.pending_args.clear();
    }

    /// Advance until the script ends or suspends.
    pub fn run(&mut self, engine: &mut Engine, thread: ThreadId, slots: &mut ThreadSlots) {
        if self.at_end {
            return;
        }
        if self.restart_pending {
            self.reset();
        } else if self.rewind_pending {
            self.move_to_last_checkpoint();
        }
        self.deferred = false;
        self.execute(engine, thread, slots);
    }

    /// Run the whole script synchronously in warp mode and return the top
    /// register. Used for monitors and hat predicates, which have no
    /// suspension points.
    pub fn evaluate(&mut self, engine: &mut Engine, thread: ThreadId) -> Value {
        self.reset();
        self.warp = true;
        let mut slots = ThreadSlots::default();
        self.execute(engine, thread, &mut slots);
        self.registers.last().cloned().unwrap_or_default()
    }

    fn pop(&mut self) -> Value {
        self.registers.pop().unwrap_or_default()
    }

    /// Pop `[a, b]` where `b` was pushed last.
    fn pop2(&mut self) -> (Value, Value) {
        let b = self.pop();
        let a = self.pop();
        (a, b)
    }

    fn push(&mut self, value: Value) {
        self.registers.push(value);
    }

    fn execute(&mut self, engine: &mut Engine, thread: ThreadId, slots: &mut ThreadSlots) {
        let script = Arc::clone(&self.script);
        loop {
            let chunk = script.chunk(self.chunk);
            let words = chunk.words();
            let Some(opcode) = words.get(self.pos).and_then(|w| Opcode::from_word(*w)) else {
                if self.return_from_procedure() {
                    continue;
                }
                self.at_end = true;
                return;
            };
            let at = self.pos;
            self.pos += 1 + opcode.operand_count();
            let operand = |n: usize| words[at + 1 + n] as usize;

            match opcode {
                Opcode::Start | Opcode::EndIf => {}
                Opcode::Halt => {
                    if self.return_from_procedure() {
                        continue;
                    }
                    self.at_end = true;
                    return;
                }
                Opcode::BreakFrame => {
                    self.stop(Yield::NEXT_PASS);
                    return;
                }
                Opcode::Warp => self.warp = true,

                Opcode::Const => self.push(script.constant(operand(0)).clone()),
                Opcode::Null => self.push(Value::default()),

                // -- control flow ------------------------------------------
                Opcode::If => {
                    if !self.pop().to_bool() {
                        self.pos = chunk.jump(at);
                    }
                }
                Opcode::Else => self.pos = chunk.jump(at),
                Opcode::ForeverLoop => self.loops.push(LoopState {
                    kind: LoopKind::Forever,
                    index: 0,
                    count: 0,
                }),
                Opcode::RepeatLoop => {
                    let count = self.pop().to_double().round();
                    if count >= 1.0 {
                        self.loops.push(LoopState {
                            kind: LoopKind::Repeat,
                            index: 0,
                            count: count as usize,
                        });
                    } else {
                        self.pos = chunk.jump(at);
                    }
                }
                Opcode::RepeatLoopIndex | Opcode::RepeatLoopIndex1 => {
                    let index = self
                        .loops
                        .iter()
                        .rev()
                        .find(|l| l.kind == LoopKind::Repeat)
                        .map_or(0, |l| l.index);
                    let offset = usize::from(opcode == Opcode::RepeatLoopIndex1);
                    self.push(Value::from(index + offset));
                }
                Opcode::UntilLoop => self.loops.push(LoopState {
                    kind: LoopKind::Until,
                    index: 0,
                    count: 0,
                }),
                Opcode::BeginUntilLoop => {
                    if self.pop().to_bool() {
                        self.loops.pop();
                        self.pos = chunk.jump(at);
                    }
                }
                Opcode::LoopEnd => {
                    let Some(state) = self.loops.last_mut() else {
                        continue;
                    };
                    if state.kind == LoopKind::Repeat {
                        state.index += 1;
                        if state.index >= state.count {
                            self.loops.pop();
                            continue;
                        }
                    }
                    self.pos = chunk.jump(at);
                    if !self.warp {
                        self.stop(Yield::SHARE);
                        return;
                    }
                }
                Opcode::Checkpoint => {
                    self.checkpoint = Some(Checkpoint {
                        chunk: self.chunk,
                        pos: self.pos,
                        registers: self.registers.len(),
                        frames: self.frames.len(),
                        loops: self.loops.len(),
                    });
                }

                // -- arithmetic and logic ----------------------------------
                Opcode::Add => {
                    let (a, b) = self.pop2();
                    self.push(a.add(&b));
                }
                Opcode::Subtract => {
                    let (a, b) = self.pop2();
                    self.push(a.subtract(&b));
                }
                Opcode::Multiply => {
                    let (a, b) = self.pop2();
                    self.push(a.multiply(&b));
                }
                Opcode::Divide => {
                    let (a, b) = self.pop2();
                    self.push(a.divide(&b));
                }
                Opcode::Mod => {
                    let (a, b) = self.pop2();
                    self.push(a.modulo(&b));
                }
                Opcode::Random => {
                    let (from, to) = self.pop2();
                    self.push(engine.random_between(&from, &to));
                }
                Opcode::Round
                | Opcode::Abs
                | Opcode::Floor
                | Opcode::Ceil
                | Opcode::Sqrt
                | Opcode::Sin
                | Opcode::Cos
                | Opcode::Tan
                | Opcode::Asin
                | Opcode::Acos
                | Opcode::Atan
                | Opcode::Ln
                | Opcode::Log10
                | Opcode::Exp
                | Opcode::Exp10 => {
                    let x = self.pop();
                    self.push(ops::math(opcode, &x));
                }
                Opcode::GreaterThan => {
                    let (a, b) = self.pop2();
                    self.push(Value::Bool(a.greater_than(&b)));
                }
                Opcode::LessThan => {
                    let (a, b) = self.pop2();
                    self.push(Value::Bool(a.less_than(&b)));
                }
                Opcode::Equals => {
                    let (a, b) = self.pop2();
                    self.push(Value::Bool(a.equals(&b)));
                }
                Opcode::And => {
                    let (a, b) = self.pop2();
                    self.push(Value::Bool(a.to_bool() && b.to_bool()));
                }
                Opcode::Or => {
                    let (a, b) = self.pop2();
                    self.push(Value::Bool(a.to_bool() || b.to_bool()));
                }
                Opcode::Not => {
                    let a = self.pop();
                    self.push(Value::Bool(!a.to_bool()));
                }

                // -- variables ---------------------------------------------
                Opcode::SetVar => {
                    let value = self.pop();
                    let var = script.variable(operand(0));
                    if let Some(slot) = engine.variable_mut(self.target, var) {
                        *slot = value;
                    }
                }
                Opcode::ChangeVar => {
                    let delta = self.pop();
                    let var = script.variable(operand(0));
                    if let Some(slot) = engine.variable_mut(self.target, var) {
                        *slot = slot.add(&delta);
                    }
                }
                Opcode::ReadVar => {
                    let var = script.variable(operand(0));
                    let value = engine
                        .variable(self.target, var)
                        .cloned()
                        .unwrap_or_default();
                    self.push(value);
                }

                // -- lists and strings -------------------------------------
                Opcode::ReadList
                | Opcode::ListAppend
                | Opcode::ListDel
                | Opcode::ListDelAll
                | Opcode::ListInsert
                | Opcode::ListReplace
                | Opcode::ListGetItem
                | Opcode::ListIndexOf
                | Opcode::ListLength
                | Opcode::ListContains => {
                    let list = script.list(operand(0));
                    self.list_op(engine, opcode, list);
                }
                Opcode::StrConcat => {
                    let (a, b) = self.pop2();
                    self.push(Value::from(format!("{}{}", a, b)));
                }
                Opcode::StrAt => {
                    let (text, index) = self.pop2();
                    self.push(ops::letter_of(&text, &index));
                }
                Opcode::StrLength => {
                    let text = self.pop();
                    self.push(Value::from(text.to_string().chars().count()));
                }
                Opcode::StrContains => {
                    let (haystack, needle) = self.pop2();
                    self.push(Value::Bool(ops::contains_ignore_case(
                        &haystack.to_string(),
                        &needle.to_string(),
                    )));
                }

                // -- calls -------------------------------------------------
                Opcode::Exec => {
                    let function = script.function(operand(0));
                    let argc = operand(1).min(self.registers.len());
                    let base = self.registers.len() - argc;
                    let outcome = {
                        let mut ctx = BlockContext::new(
                            engine,
                            thread,
                            self.target,
                            self.script_id,
                            &self.registers[base..],
                            slots,
                        );
                        function(&mut ctx)
                    };
                    self.registers.truncate(base);
                    if engine.is_stopping(thread) {
                        self.kill();
                        return;
                    }
                    match outcome {
                        BlockOutcome::Value(value) => self.push(value),
                        BlockOutcome::Done => {}
                        BlockOutcome::Yield(how) => {
                            self.stop(how);
                            return;
                        }
                        BlockOutcome::Finish => {
                            self.kill();
                            return;
                        }
                    }
                }
                Opcode::InitProcedure => self.pending_args.push(Vec::new()),
                Opcode::AddArg => {
                    let value = self.pop();
                    if let Some(args) = self.pending_args.last_mut() {
                        args.push(value);
                    }
                }
                Opcode::CallProcedure => {
                    let index = operand(0);
                    let callee = ChunkRef::Procedure(index);
                    let recursive = self.chunk == callee
                        || self.frames.iter().any(|f| f.return_chunk == callee);
                    let args = self.pending_args.pop().unwrap_or_default();
                    self.frames.push(CallFrame {
                        return_chunk: self.chunk,
                        return_pos: self.pos,
                        caller_warp: self.warp,
                        loop_depth: self.loops.len(),
                        args,
                        caller_checkpoint: self.checkpoint,
                    });
                    self.warp = self.warp || script.chunk(callee).is_warp();
                    self.chunk = callee;
                    self.pos = 0;
                    if recursive && !self.warp {
                        self.stop(Yield::SHARE);
                        return;
                    }
                }
                Opcode::ReadArg => {
                    let value = self
                        .frames
                        .last()
                        .and_then(|f| f.args.get(operand(0)))
                        .cloned()
                        .unwrap_or_default();
                    self.push(value);
                }
            }
        }
    }

    /// Pop a call frame if one is active. Returns whether execution should
    /// continue in the caller.
    fn return_from_procedure(&mut self) -> bool {
        let Some(frame) = self.frames.pop() else {
            return false;
        };
        self.chunk = frame.return_chunk;
        self.pos = frame.return_pos;
        self.warp = frame.caller_warp;
        self.loops.truncate(frame.loop_depth);
        self.checkpoint = frame.caller_checkpoint;
        true
    }
}

impl fmt::Debug for VirtualMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualMachine")
            .field("script", &self.script_id)
            .field("target", &self.target)
            .field("chunk", &self.chunk)
            .field("pos", &self.pos)
            .field("registers", &self.registers.len())
            .field("at_end", &self.at_end)
            .finish()
    }
}
