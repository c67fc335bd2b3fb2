//! Errors raised at the runtime's boundaries.
//!
//! Script execution itself never fails; these cover loading work into an
//! engine: malformed bytecode, configuration files and script bundles.

use crate::script::ChunkRef;
use std::path::PathBuf;
use thiserror::Error;

/// Bytecode rejected by [`Script::new`](crate::script::Script::new).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptError {
    #[error("unknown opcode word {word} at {chunk}:{pos}")]
    UnknownOpcode { chunk: ChunkRef, pos: usize, word: u32 },
    #[error("{opcode} at {chunk}:{pos} is missing operands")]
    TruncatedOperands {
        chunk: ChunkRef,
        pos: usize,
        opcode: &'static str,
    },
    #[error("{opcode} at {chunk}:{pos} refers to {table} entry {index}, but only {len} exist")]
    IndexOutOfRange {
        chunk: ChunkRef,
        pos: usize,
        opcode: &'static str,
        table: &'static str,
        index: usize,
        len: usize,
    },
    #[error("unbalanced {opcode} at {chunk}:{pos}")]
    Unbalanced {
        chunk: ChunkRef,
        pos: usize,
        opcode: &'static str,
    },
    #[error("{opcode} opened at {chunk}:{pos} is never closed")]
    Unterminated {
        chunk: ChunkRef,
        pos: usize,
        opcode: &'static str,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid toml: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid value for '{key}': {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Error)]
pub enum BundleError {
    #[error("cannot read '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid bundle: {0}")]
    Json(#[from] serde_json::Error),
    #[error("bundle has no stage target")]
    MissingStage,
    #[error("unknown target '{0}'")]
    UnknownTarget(String),
    #[error("unknown opcode '{0}'")]
    UnknownOpcode(String),
    #[error("'{op}' cannot be used with a {operand} operand")]
    OperandMismatch { op: String, operand: &'static str },
    #[error("target '{target}' has no variable named '{name}'")]
    UnknownVariable { target: String, name: String },
    #[error("target '{target}' has no list named '{name}'")]
    UnknownList { target: String, name: String },
    #[error("script {index} of '{target}': {source}")]
    Script {
        target: String,
        index: usize,
        source: ScriptError,
    },
}

/// Umbrella error for hosts that drive a whole engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Script(#[from] ScriptError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Bundle(#[from] BundleError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn messages_name_the_location() {
        let err = ScriptError::Unbalanced {
            chunk: ChunkRef::Procedure(2),
            pos: 7,
            opcode: "ENDIF",
        };
        assert_eq!(err.to_string(), "unbalanced ENDIF at procedure 2:7");
    }

    #[test]
    fn bundle_errors_keep_their_cause() {
        let err = BundleError::Script {
            target: "Cat".into(),
            index: 0,
            source: ScriptError::UnknownOpcode {
                chunk: ChunkRef::Main,
                pos: 3,
                word: 999,
            },
        };
        assert!(err.source().is_some());
        let wrapped = EngineError::from(err);
        assert!(wrapped.to_string().starts_with("script 0 of 'Cat'"));
    }
}
