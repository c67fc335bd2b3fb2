//! Compiled scripts.
//!
//! A [`Script`] is immutable once built and shared by every thread running
//! it. Construction validates the bytecode once (opcodes, operand counts,
//! table indices, block nesting) and precomputes a jump table per chunk, so
//! the interpreter can branch in O(1) and index tables without checks.

use crate::error::ScriptError;
use crate::vm::BlockFn;
use stagehand_core::{Opcode, Value};
use std::fmt;

/// Where a variable or list lives relative to the executing target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VarRef {
    /// Index into the executing target's own table (clones have copies).
    Local(usize),
    /// Index into the stage's table.
    Stage(usize),
}

/// Source form of a custom block body.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Procedure {
    pub bytecode: Vec<u32>,
    /// Run without screen refresh: loops inside never yield.
    pub warp: bool,
}

/// Everything a script is assembled from.
#[derive(Clone, Default)]
pub struct ScriptParts {
    pub bytecode: Vec<u32>,
    pub procedures: Vec<Procedure>,
    pub constants: Vec<Value>,
    pub variables: Vec<VarRef>,
    pub lists: Vec<VarRef>,
    pub functions: Vec<BlockFn>,
}

/// Names a bytecode chunk within a script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChunkRef {
    Main,
    Procedure(usize),
}

impl fmt::Display for ChunkRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChunkRef::Main => f.write_str("main"),
            ChunkRef::Procedure(i) => write!(f, "procedure {}", i),
        }
    }
}

/// Validated bytecode plus its jump table.
#[derive(Debug, Clone)]
pub struct Chunk {
    words: Vec<u32>,
    /// Branch target for each control-flow opcode position; unused
    /// elsewhere.
    jumps: Vec<usize>,
    warp: bool,
}

impl Chunk {
    pub fn words(&self) -> &[u32] {
        &self.words
    }

    pub fn is_warp(&self) -> bool {
        self.warp
    }

    pub(crate) fn jump(&self, pos: usize) -> usize {
        self.jumps[pos]
    }
}

pub struct Script {
    main: Chunk,
    procedures: Vec<Chunk>,
    constants: Vec<Value>,
    variables: Vec<VarRef>,
    lists: Vec<VarRef>,
    functions: Vec<BlockFn>,
}

impl Script {
    pub fn new(parts: ScriptParts) -> Result<Script, ScriptError> {
        let tables = Tables {
            constants: parts.constants.len(),
            variables: parts.variables.len(),
            lists: parts.lists.len(),
            functions: parts.functions.len(),
            procedures: parts.procedures.len(),
        };
        let main = analyze(ChunkRef::Main, parts.bytecode, false, &tables)?;
        let procedures = parts
            .procedures
            .into_iter()
            .enumerate()
            .map(|(i, p)| analyze(ChunkRef::Procedure(i), p.bytecode, p.warp, &tables))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Script {
            main,
            procedures,
            constants: parts.constants,
            variables: parts.variables,
            lists: parts.lists,
            functions: parts.functions,
        })
    }

    pub fn bytecode(&self) -> &[u32] {
        self.main.words()
    }

    pub fn chunk(&self, chunk: ChunkRef) -> &Chunk {
        match chunk {
            ChunkRef::Main => &self.main,
            ChunkRef::Procedure(i) => &self.procedures[i],
        }
    }

    pub fn procedure_count(&self) -> usize {
        self.procedures.len()
    }

    pub fn constants(&self) -> &[Value] {
        &self.constants
    }

    pub fn variables(&self) -> &[VarRef] {
        &self.variables
    }

    pub fn lists(&self) -> &[VarRef] {
        &self.lists
    }

    pub(crate) fn constant(&self, index: usize) -> &Value {
        &self.constants[index]
    }

    pub(crate) fn variable(&self, index: usize) -> VarRef {
        self.variables[index]
    }

    pub(crate) fn list(&self, index: usize) -> VarRef {
        self.lists[index]
    }

    pub(crate) fn function(&self, index: usize) -> BlockFn {
        self.functions[index]
    }
}

impl fmt::Debug for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Script")
            .field("words", &self.main.words.len())
            .field("procedures", &self.procedures.len())
            .field("constants", &self.constants)
            .field("variables", &self.variables)
            .field("lists", &self.lists)
            .field("functions", &self.functions.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Validation and jump analysis
// ---------------------------------------------------------------------------

struct Tables {
    constants: usize,
    variables: usize,
    lists: usize,
    functions: usize,
    procedures: usize,
}

/// An open block awaiting its closer.
struct Open {
    opcode: Opcode,
    pos: usize,
    /// `ELSE` of an `IF`, or `BEGIN_UNTIL_LOOP` of an `UNTIL_LOOP`.
    middle: Option<usize>,
}

fn analyze(
    chunk: ChunkRef,
    words: Vec<u32>,
    warp: bool,
    tables: &Tables,
) -> Result<Chunk, ScriptError> {
    let mut jumps = vec![0; words.len()];
    let mut open: Vec<Open> = Vec::new();
    let mut pos = 0;

    while pos < words.len() {
        let word = words[pos];
        let opcode =
            Opcode::from_word(word).ok_or(ScriptError::UnknownOpcode { chunk, pos, word })?;
        let name = opcode.mnemonic();
        let next = pos + 1 + opcode.operand_count();
        if next > words.len() {
            return Err(ScriptError::TruncatedOperands {
                chunk,
                pos,
                opcode: name,
            });
        }
        check_operands(chunk, pos, opcode, &words[pos + 1..next], tables)?;

        let unbalanced = ScriptError::Unbalanced {
            chunk,
            pos,
            opcode: name,
        };
        match opcode {
            Opcode::If | Opcode::ForeverLoop | Opcode::RepeatLoop | Opcode::UntilLoop => {
                open.push(Open {
                    opcode,
                    pos,
                    middle: None,
                });
            }
            Opcode::Else => match open.last_mut() {
                Some(block) if block.opcode == Opcode::If && block.middle.is_none() => {
                    block.middle = Some(pos);
                }
                _ => return Err(unbalanced),
            },
            Opcode::BeginUntilLoop => match open.last_mut() {
                Some(block) if block.opcode == Opcode::UntilLoop && block.middle.is_none() => {
                    block.middle = Some(pos);
                }
                _ => return Err(unbalanced),
            },
            Opcode::EndIf => match open.pop() {
                Some(block) if block.opcode == Opcode::If => {
                    let after = next;
                    match block.middle {
                        Some(else_pos) => {
                            jumps[block.pos] = else_pos + 1;
                            jumps[else_pos] = after;
                        }
                        None => jumps[block.pos] = after,
                    }
                }
                _ => return Err(unbalanced),
            },
            Opcode::LoopEnd => match open.pop() {
                Some(block) if block.opcode.opens_loop() => {
                    jumps[block.pos] = next;
                    jumps[pos] = block.pos + 1;
                    if let Some(begin) = block.middle {
                        jumps[begin] = next;
                    }
                }
                _ => return Err(unbalanced),
            },
            _ => {}
        }
        pos = next;
    }

    if let Some(block) = open.pop() {
        return Err(ScriptError::Unterminated {
            chunk,
            pos: block.pos,
            opcode: block.opcode.mnemonic(),
        });
    }
    Ok(Chunk { words, jumps, warp })
}

fn check_operands(
    chunk: ChunkRef,
    pos: usize,
    opcode: Opcode,
    operands: &[u32],
    tables: &Tables,
) -> Result<(), ScriptError> {
    let (table, len) = match opcode {
        Opcode::Const => ("constant", tables.constants),
        Opcode::Exec => ("function", tables.functions),
        Opcode::CallProcedure => ("procedure", tables.procedures),
        op if op.takes_variable() => ("variable", tables.variables),
        op if op.takes_list() => ("list", tables.lists),
        _ => return Ok(()),
    };
    let index = operands[0] as usize;
    if index >= len {
        return Err(ScriptError::IndexOutOfRange {
            chunk,
            pos,
            opcode: opcode.mnemonic(),
            table,
            index,
            len,
        });
    }
    Ok(())
}
