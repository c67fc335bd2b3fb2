//! A small assembler for building scripts by hand.
//!
//! ```ignore
//! let script = ScriptBuilder::new()
//!     .constant(10)
//!     .op(Opcode::RepeatLoop)
//!     .constant(1)
//!     .change_var(VarRef::Stage(0))
//!     .op(Opcode::LoopEnd)
//!     .build()?;
//! ```
//!
//! Constants and functions are interned, so emitting the same value twice
//! reuses one table slot.

use crate::error::ScriptError;
use crate::script::{Procedure, Script, ScriptParts, VarRef};
use crate::vm::BlockFn;
use stagehand_core::{Opcode, Value};

#[derive(Default)]
pub struct ScriptBuilder {
    parts: ScriptParts,
    /// Body of the procedure being assembled, if any.
    procedure: Option<Procedure>,
}

impl ScriptBuilder {
    /// Start a script with its `START` marker.
    pub fn new() -> Self {
        Self::default().op(Opcode::Start)
    }

    fn emit(mut self, word: u32) -> Self {
        match &mut self.procedure {
            Some(procedure) => procedure.bytecode.push(word),
            None => self.parts.bytecode.push(word),
        }
        self
    }

    pub fn op(self, opcode: Opcode) -> Self {
        self.emit(opcode.into())
    }

    /// Push a constant.
    pub fn constant(mut self, value: impl Into<Value>) -> Self {
        let value = value.into();
        let existing = self.parts.constants.iter().position(|c| {
            std::mem::discriminant(c) == std::mem::discriminant(&value)
                && c.to_string() == value.to_string()
        });
        let index = existing.unwrap_or_else(|| {
            self.parts.constants.push(value);
            self.parts.constants.len() - 1
        });
        self.op(Opcode::Const).emit(index as u32)
    }

    pub fn checkpoint(self) -> Self {
        self.op(Opcode::Checkpoint)
    }

    fn var_slot(&mut self, var: VarRef) -> u32 {
        let index = self
            .parts
            .variables
            .iter()
            .position(|v| *v == var)
            .unwrap_or_else(|| {
                self.parts.variables.push(var);
                self.parts.variables.len() - 1
            });
        index as u32
    }

    fn list_slot(&mut self, list: VarRef) -> u32 {
        let index = self
            .parts
            .lists
            .iter()
            .position(|l| *l == list)
            .unwrap_or_else(|| {
                self.parts.lists.push(list);
                self.parts.lists.len() - 1
            });
        index as u32
    }

    pub fn set_var(mut self, var: VarRef) -> Self {
        let slot = self.var_slot(var);
        self.op(Opcode::SetVar).emit(slot)
    }

    pub fn change_var(mut self, var: VarRef) -> Self {
        let slot = self.var_slot(var);
        self.op(Opcode::ChangeVar).emit(slot)
    }

    pub fn read_var(mut self, var: VarRef) -> Self {
        let slot = self.var_slot(var);
        self.op(Opcode::ReadVar).emit(slot)
    }

    /// Emit a list opcode (`READ_LIST`, `LIST_APPEND`, ...) on `list`.
    pub fn list_op(mut self, opcode: Opcode, list: VarRef) -> Self {
        let slot = self.list_slot(list);
        self.op(opcode).emit(slot)
    }

    /// Call a native block with the top `argc` registers as inputs. Inputs
    /// are preceded by a checkpoint so a retrying block re-evaluates them;
    /// emit the checkpoint before pushing the inputs.
    pub fn exec(mut self, function: BlockFn, argc: u32) -> Self {
        let index = self
            .parts
            .functions
            .iter()
            .position(|f| *f as usize == function as usize)
            .unwrap_or_else(|| {
                self.parts.functions.push(function);
                self.parts.functions.len() - 1
            });
        self.op(Opcode::Exec).emit(index as u32).emit(argc)
    }

    /// Call procedure `index` with the arguments pushed since
    /// `INIT_PROCEDURE`.
    pub fn call(self, index: u32) -> Self {
        self.op(Opcode::CallProcedure).emit(index)
    }

    pub fn read_arg(self, index: u32) -> Self {
        self.op(Opcode::ReadArg).emit(index)
    }

    /// Start assembling a procedure body. Instructions go to the procedure
    /// until [`end_procedure`](Self::end_procedure).
    pub fn begin_procedure(mut self, warp: bool) -> Self {
        self.procedure = Some(Procedure {
            bytecode: Vec::new(),
            warp,
        });
        self
    }

    /// Finish the current procedure. Procedures are numbered in the order
    /// they are finished.
    pub fn end_procedure(mut self) -> Self {
        if let Some(mut procedure) = self.procedure.take() {
            procedure.bytecode.push(Opcode::Halt.into());
            self.parts.procedures.push(procedure);
        }
        self
    }

    /// Append `HALT` and validate.
    pub fn build(self) -> Result<Script, ScriptError> {
        let mut builder = self.end_procedure();
        builder.parts.bytecode.push(Opcode::Halt.into());
        Script::new(builder.parts)
    }

    /// The parts assembled so far, without a trailing `HALT`.
    pub fn into_parts(self) -> ScriptParts {
        self.end_procedure().parts
    }
}
