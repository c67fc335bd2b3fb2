//! Stagehand runtime: a stack-based bytecode VM for block scripts and the
//! frame-budgeted cooperative scheduler that drives it.
//!
//! - [`script`] - validated, shareable compiled scripts
//! - [`vm`] - the interpreter and the native block calling convention
//! - [`thread`] - a script instance bound to a target
//! - [`engine`] - targets, hats, broadcasts, clones, monitors and the
//!   scheduler pass
//! - [`blocks`] - the built-in block library
//! - [`compiler`] / [`bundle`] - loading projects into an engine

pub mod assembler;
pub mod blocks;
pub mod bundle;
pub mod clock;
pub mod compiler;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod script;
pub mod target;
pub mod thread;
pub mod vm;

pub use assembler::ScriptBuilder;
pub use bundle::ScriptBundle;
pub use clock::{Clock, MockClock, SystemClock};
pub use compiler::{CompileUnit, HatSpec, LoadSummary, ScriptCompiler};
pub use config::EngineConfig;
pub use engine::{BroadcastId, Engine, HatBinding, HatType, MonitorId, ScriptId};
pub use error::{BundleError, ConfigError, EngineError, ScriptError};
pub use events::EngineEvent;
pub use script::{Script, ScriptParts, VarRef};
pub use target::{List, Target, TargetId};
pub use thread::{Promise, Thread, ThreadId};
pub use vm::{BlockContext, BlockFn, BlockOutcome, VirtualMachine, Yield};

pub use stagehand_core::{Opcode, Value};
