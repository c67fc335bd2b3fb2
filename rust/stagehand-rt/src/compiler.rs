//! The boundary between project loaders and the engine.
//!
//! A [`ScriptCompiler`] turns some project description into targets and
//! validated scripts. It adds targets to the engine itself (so it can refer
//! to their ids) and hands back [`CompileUnit`]s, which [`Engine::load`]
//! registers. Scripts that use blocks the engine does not know are reported
//! as [`CompileUnit::Unsupported`] and skipped, never half-loaded.

use crate::engine::{Engine, HatBinding, HatType};
use crate::error::EngineError;
use crate::script::Script;
use crate::target::TargetId;
use tracing::{info, warn};

/// How a compiled script is triggered.
#[derive(Debug)]
pub struct HatSpec {
    pub hat: HatType,
    pub field: Option<String>,
    /// Reporter evaluated each pass for edge-activated hats.
    pub predicate: Option<Script>,
}

#[derive(Debug)]
pub enum CompileUnit {
    Script {
        target: TargetId,
        hat: Option<HatSpec>,
        script: Script,
    },
    Monitor {
        name: String,
        target: TargetId,
        script: Script,
    },
    Unsupported {
        target: TargetId,
        opcodes: Vec<String>,
    },
}

pub trait ScriptCompiler {
    fn compile(&self, engine: &mut Engine) -> Result<Vec<CompileUnit>, EngineError>;
}

/// What [`Engine::load`] registered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadSummary {
    pub targets: usize,
    pub scripts: usize,
    pub monitors: usize,
    pub skipped: usize,
}

impl Engine {
    /// Replace the current project with whatever `compiler` produces.
    pub fn load(&mut self, compiler: &dyn ScriptCompiler) -> Result<LoadSummary, EngineError> {
        self.clear();
        let units = compiler.compile(self)?;
        let mut summary = LoadSummary {
            targets: self.targets().count(),
            ..LoadSummary::default()
        };
        for unit in units {
            match unit {
                CompileUnit::Script {
                    target,
                    hat,
                    script,
                } => {
                    let binding = hat.map(|spec| {
                        let mut binding = HatBinding::new(spec.hat);
                        binding.field = spec.field;
                        if let Some(predicate) = spec.predicate {
                            binding.predicate = Some(self.add_script(target, predicate, None));
                        }
                        binding
                    });
                    self.add_script(target, script, binding);
                    summary.scripts += 1;
                }
                CompileUnit::Monitor {
                    name,
                    target,
                    script,
                } => {
                    self.add_monitor(name, target, script);
                    summary.monitors += 1;
                }
                CompileUnit::Unsupported { target, opcodes } => {
                    warn!(%target, opcodes = ?opcodes, "skipping script with unsupported blocks");
                    for opcode in opcodes {
                        self.record_unsupported(opcode);
                    }
                    summary.skipped += 1;
                }
            }
        }
        info!(
            targets = summary.targets,
            scripts = summary.scripts,
            monitors = summary.monitors,
            skipped = summary.skipped,
            "project loaded"
        );
        Ok(summary)
    }
}
