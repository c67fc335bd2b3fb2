//! Pre-assembled projects in JSON.
//!
//! A bundle lists targets with their state and scripts written as
//! instruction lists. Names are resolved when the bundle is compiled:
//! variables and lists against the owning target first, then the stage;
//! `exec` names and hats through the engine's block registry.
//!
//! ```json
//! {
//!   "broadcasts": ["go"],
//!   "targets": [
//!     { "name": "Stage", "stage": true, "variables": { "score": 0 } },
//!     { "name": "Cat", "x": 10, "costumes": ["a", "b"],
//!       "scripts": [
//!         { "hat": "event_whenflagclicked",
//!           "code": [ {"const": 5}, {"op": "CHANGE_VAR", "var": "score"},
//!                     "CHECKPOINT", {"const": 10}, {"exec": "motion_movesteps", "argc": 1} ] }
//!       ] }
//!   ],
//!   "monitors": [ { "name": "score", "target": "Stage", "code": [ {"op": "READ_VAR", "var": "score"} ] } ]
//! }
//! ```

use crate::assembler::ScriptBuilder;
use crate::compiler::{CompileUnit, HatSpec, ScriptCompiler};
use crate::engine::Engine;
use crate::error::{BundleError, EngineError};
use crate::script::{Script, VarRef};
use crate::target::{Target, TargetId};
use serde::Deserialize;
use stagehand_core::{Opcode, Value};
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

/// One bytecode instruction in source form.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Instruction {
    /// An opcode without operands, by mnemonic.
    Op(String),
    Const {
        #[serde(rename = "const")]
        value: Value,
    },
    Exec {
        exec: String,
        argc: u32,
    },
    Var {
        op: String,
        var: String,
    },
    List {
        op: String,
        list: String,
    },
    Call {
        call: u32,
    },
    Arg {
        arg: u32,
    },
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProcedureSource {
    pub warp: bool,
    pub code: Vec<Instruction>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ScriptSource {
    /// Hat block opcode, e.g. `event_whenflagclicked`.
    pub hat: Option<String>,
    /// Broadcast, key or backdrop name the hat listens for.
    pub field: Option<String>,
    pub predicate: Option<Vec<Instruction>>,
    pub code: Vec<Instruction>,
    pub procedures: Vec<ProcedureSource>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TargetSource {
    pub name: String,
    pub stage: bool,
    pub variables: BTreeMap<String, Value>,
    pub lists: BTreeMap<String, Vec<Value>>,
    pub costumes: Vec<String>,
    pub costume: usize,
    pub x: f64,
    pub y: f64,
    pub direction: f64,
    pub size: f64,
    pub visible: bool,
    pub draggable: bool,
    pub scripts: Vec<ScriptSource>,
}

impl Default for TargetSource {
    fn default() -> Self {
        Self {
            name: String::new(),
            stage: false,
            variables: BTreeMap::new(),
            lists: BTreeMap::new(),
            costumes: Vec::new(),
            costume: 0,
            x: 0.0,
            y: 0.0,
            direction: 90.0,
            size: 100.0,
            visible: true,
            draggable: false,
            scripts: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitorSource {
    pub name: String,
    pub target: String,
    pub code: Vec<Instruction>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ScriptBundle {
    pub broadcasts: Vec<String>,
    pub targets: Vec<TargetSource>,
    pub monitors: Vec<MonitorSource>,
}

impl ScriptBundle {
    pub fn from_json(text: &str) -> Result<Self, BundleError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, BundleError> {
        let text = std::fs::read_to_string(path).map_err(|source| BundleError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }
}

impl TargetSource {
    fn to_target(&self) -> Target {
        let mut target = if self.stage {
            Target::stage()
        } else {
            Target::sprite(self.name.clone())
        };
        target.name = self.name.clone();
        for (name, value) in &self.variables {
            target = target.with_variable(name.clone(), value.clone());
        }
        for (name, items) in &self.lists {
            target = target.with_list(name.clone(), items.clone());
        }
        target = target.with_costumes(self.costumes.iter().cloned());
        target.costume = self.costume.min(self.costumes.len().saturating_sub(1));
        if let Some(sprite) = target.sprite_state_mut() {
            sprite.x = self.x;
            sprite.y = self.y;
            sprite.direction = self.direction;
            sprite.size = self.size;
            sprite.visible = self.visible;
            sprite.draggable = self.draggable;
        }
        target
    }
}

/// Result of assembling one instruction list.
enum Assembled {
    Script(Script),
    Unsupported(Vec<String>),
}

/// Assembles instruction lists for one target.
struct Assembler<'a> {
    engine: &'a Engine,
    target: TargetId,
    target_name: &'a str,
    unsupported: Vec<String>,
}

impl<'a> Assembler<'a> {
    fn var_ref(&self, name: &str, list: bool) -> Result<VarRef, BundleError> {
        let find = |t: &Target| {
            if list {
                t.find_list(name)
            } else {
                t.find_variable(name)
            }
        };
        if let Some(i) = self.engine.target(self.target).and_then(|t| find(t)) {
            return Ok(VarRef::Local(i));
        }
        if let Some(i) = self.engine.stage().and_then(|t| find(t)) {
            return Ok(VarRef::Stage(i));
        }
        let (target, name) = (self.target_name.to_string(), name.to_string());
        Err(if list {
            BundleError::UnknownList { target, name }
        } else {
            BundleError::UnknownVariable { target, name }
        })
    }

    fn opcode(name: &str) -> Result<Opcode, BundleError> {
        Opcode::from_str(name).map_err(|_| BundleError::UnknownOpcode(name.to_string()))
    }

    fn emit(
        &mut self,
        mut builder: ScriptBuilder,
        code: &[Instruction],
    ) -> Result<ScriptBuilder, BundleError> {
        for instruction in code {
            builder = match instruction {
                Instruction::Op(name) => {
                    let op = Self::opcode(name)?;
                    if op.operand_count() != 0 {
                        return Err(BundleError::OperandMismatch {
                            op: name.clone(),
                            operand: "missing",
                        });
                    }
                    builder.op(op)
                }
                Instruction::Const { value } => builder.constant(value.clone()),
                Instruction::Exec { exec, argc } => match self.engine.resolve_block(exec) {
                    Some(function) => builder.exec(function, *argc),
                    None => {
                        if !self.unsupported.contains(exec) {
                            self.unsupported.push(exec.clone());
                        }
                        builder
                    }
                },
                Instruction::Var { op, var } => {
                    let opcode = Self::opcode(op)?;
                    if !opcode.takes_variable() {
                        return Err(BundleError::OperandMismatch {
                            op: op.clone(),
                            operand: "variable",
                        });
                    }
                    let var = self.var_ref(var, false)?;
                    match opcode {
                        Opcode::SetVar => builder.set_var(var),
                        Opcode::ChangeVar => builder.change_var(var),
                        _ => builder.read_var(var),
                    }
                }
                Instruction::List { op, list } => {
                    let opcode = Self::opcode(op)?;
                    if !opcode.takes_list() {
                        return Err(BundleError::OperandMismatch {
                            op: op.clone(),
                            operand: "list",
                        });
                    }
                    let list = self.var_ref(list, true)?;
                    builder.list_op(opcode, list)
                }
                Instruction::Call { call } => builder.call(*call),
                Instruction::Arg { arg } => builder.read_arg(*arg),
            };
        }
        Ok(builder)
    }

    fn assemble(
        &mut self,
        index: usize,
        code: &[Instruction],
        procedures: &[ProcedureSource],
    ) -> Result<Assembled, BundleError> {
        self.unsupported.clear();
        let mut builder = self.emit(ScriptBuilder::new(), code)?;
        for procedure in procedures {
            builder = self.emit(builder.begin_procedure(procedure.warp), &procedure.code)?;
            builder = builder.end_procedure();
        }
        if !self.unsupported.is_empty() {
            return Ok(Assembled::Unsupported(std::mem::take(&mut self.unsupported)));
        }
        let script = builder.build().map_err(|source| BundleError::Script {
            target: self.target_name.to_string(),
            index,
            source,
        })?;
        Ok(Assembled::Script(script))
    }
}

impl ScriptCompiler for ScriptBundle {
    fn compile(&self, engine: &mut Engine) -> Result<Vec<CompileUnit>, EngineError> {
        if !self.targets.iter().any(|t| t.stage) {
            return Err(BundleError::MissingStage.into());
        }
        for name in &self.broadcasts {
            engine.add_broadcast(name.clone());
        }
        let ids: Vec<TargetId> = self
            .targets
            .iter()
            .map(|source| engine.add_target(source.to_target()))
            .collect();

        let mut units = Vec::new();
        for (source, &target) in self.targets.iter().zip(&ids) {
            let mut assembler = Assembler {
                engine: &*engine,
                target,
                target_name: &source.name,
                unsupported: Vec::new(),
            };
            for (index, script) in source.scripts.iter().enumerate() {
                let hat = match &script.hat {
                    Some(name) => match engine.resolve_hat(name) {
                        Some(hat) => Some(hat),
                        None => {
                            units.push(CompileUnit::Unsupported {
                                target,
                                opcodes: vec![name.clone()],
                            });
                            continue;
                        }
                    },
                    None => None,
                };
                let predicate = match &script.predicate {
                    Some(code) => match assembler.assemble(index, code, &[])? {
                        Assembled::Script(s) => Some(s),
                        Assembled::Unsupported(opcodes) => {
                            units.push(CompileUnit::Unsupported { target, opcodes });
                            continue;
                        }
                    },
                    None => None,
                };
                match assembler.assemble(index, &script.code, &script.procedures)? {
                    Assembled::Script(compiled) => units.push(CompileUnit::Script {
                        target,
                        hat: hat.map(|hat| HatSpec {
                            hat,
                            field: script.field.clone(),
                            predicate,
                        }),
                        script: compiled,
                    }),
                    Assembled::Unsupported(opcodes) => {
                        units.push(CompileUnit::Unsupported { target, opcodes });
                    }
                }
            }
        }

        for monitor in &self.monitors {
            let target = self
                .targets
                .iter()
                .position(|t| t.name == monitor.target)
                .map(|i| ids[i])
                .ok_or_else(|| BundleError::UnknownTarget(monitor.target.clone()))?;
            let mut assembler = Assembler {
                engine: &*engine,
                target,
                target_name: &monitor.target,
                unsupported: Vec::new(),
            };
            match assembler.assemble(0, &monitor.code, &[])? {
                Assembled::Script(script) => units.push(CompileUnit::Monitor {
                    name: monitor.name.clone(),
                    target,
                    script,
                }),
                Assembled::Unsupported(opcodes) => {
                    units.push(CompileUnit::Unsupported { target, opcodes });
                }
            }
        }
        Ok(units)
    }
}
