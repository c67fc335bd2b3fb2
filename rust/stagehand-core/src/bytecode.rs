//! The closed opcode set.
//!
//! Bytecode is a flat `Vec<u32>`: each instruction is an opcode word
//! followed by [`Opcode::operand_count`] operand words (table indices or
//! counts). Operands listed after the mnemonic below are in word order;
//! "pops" lists stack inputs bottom to top.

use strum::{Display, EnumIter, EnumString, FromRepr, IntoStaticStr};

#[repr(u32)]
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, FromRepr, IntoStaticStr,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Opcode {
    // Frame control
    Start = 0,      // entry marker, no-op
    Halt = 1,       // end of chunk; returns from a procedure
    BreakFrame = 2, // yield, deferring the rest of this pass
    Warp = 3,       // run the rest of the current chunk without loop yields

    // Stack
    Const = 4, // c: push constant c
    Null = 5,  // push 0

    // Control flow
    If = 6, // pops [cond]
    Else = 7,
    #[strum(serialize = "ENDIF")]
    EndIf = 8,
    ForeverLoop = 9,
    RepeatLoop = 10, // pops [count]
    RepeatLoopIndex = 11, // push innermost repeat index, 0-based
    #[strum(serialize = "REPEAT_LOOP_INDEX1")]
    RepeatLoopIndex1 = 12, // push innermost repeat index, 1-based
    UntilLoop = 13,
    BeginUntilLoop = 14, // pops [cond]; exits the until loop when true
    LoopEnd = 15,
    Checkpoint = 16,

    // Arithmetic, pops [a, b]
    Add = 17,
    Subtract = 18,
    Multiply = 19,
    Divide = 20,
    Mod = 21,
    Random = 22, // pops [from, to]

    // Math, pops [x]
    Round = 23,
    Abs = 24,
    Floor = 25,
    Ceil = 26,
    Sqrt = 27,
    Sin = 28,
    Cos = 29,
    Tan = 30,
    Asin = 31,
    Acos = 32,
    Atan = 33,
    Ln = 34,
    #[strum(serialize = "LOG10")]
    Log10 = 35,
    Exp = 36,
    #[strum(serialize = "EXP10")]
    Exp10 = 37,

    // Comparison and logic, pops [a, b] (NOT pops [a])
    GreaterThan = 38,
    LessThan = 39,
    Equals = 40,
    And = 41,
    Or = 42,
    Not = 43,

    // Variables
    SetVar = 44,    // v: pops [value]
    ChangeVar = 45, // v: pops [delta]
    ReadVar = 46,   // v

    // Lists
    ReadList = 47,     // l: push contents joined
    ListAppend = 48,   // l: pops [item]
    ListDel = 49,      // l: pops [index]
    ListDelAll = 50,   // l
    ListInsert = 51,   // l: pops [item, index]
    ListReplace = 52,  // l: pops [index, item]
    ListGetItem = 53,  // l: pops [index]
    ListIndexOf = 54,  // l: pops [item]
    ListLength = 55,   // l
    ListContains = 56, // l: pops [item]

    // Strings
    StrConcat = 57,   // pops [a, b]
    StrAt = 58,       // pops [string, index]
    StrLength = 59,   // pops [string]
    StrContains = 60, // pops [haystack, needle]

    // Calls
    Exec = 61,          // f argc: call native function f with argc inputs
    InitProcedure = 62, // open an argument frame
    CallProcedure = 63, // p
    AddArg = 64,        // pops [value] into the open argument frame
    ReadArg = 65,       // i
}

impl Opcode {
    /// Number of operand words following the opcode word.
    pub fn operand_count(self) -> usize {
        match self {
            Opcode::Exec => 2,
            Opcode::Const
            | Opcode::SetVar
            | Opcode::ChangeVar
            | Opcode::ReadVar
            | Opcode::ReadList
            | Opcode::ListAppend
            | Opcode::ListDel
            | Opcode::ListDelAll
            | Opcode::ListInsert
            | Opcode::ListReplace
            | Opcode::ListGetItem
            | Opcode::ListIndexOf
            | Opcode::ListLength
            | Opcode::ListContains
            | Opcode::CallProcedure
            | Opcode::ReadArg => 1,
            _ => 0,
        }
    }

    pub fn from_word(word: u32) -> Option<Opcode> {
        Opcode::from_repr(word)
    }

    pub fn mnemonic(self) -> &'static str {
        self.into()
    }

    /// Whether the opcode opens a loop closed by `LOOP_END`.
    pub fn opens_loop(self) -> bool {
        matches!(
            self,
            Opcode::ForeverLoop | Opcode::RepeatLoop | Opcode::UntilLoop
        )
    }

    /// Whether the single operand indexes the list table.
    pub fn takes_list(self) -> bool {
        matches!(
            self,
            Opcode::ReadList
                | Opcode::ListAppend
                | Opcode::ListDel
                | Opcode::ListDelAll
                | Opcode::ListInsert
                | Opcode::ListReplace
                | Opcode::ListGetItem
                | Opcode::ListIndexOf
                | Opcode::ListLength
                | Opcode::ListContains
        )
    }

    /// Whether the single operand indexes the variable table.
    pub fn takes_variable(self) -> bool {
        matches!(self, Opcode::SetVar | Opcode::ChangeVar | Opcode::ReadVar)
    }
}

impl From<Opcode> for u32 {
    fn from(op: Opcode) -> u32 {
        op as u32
    }
}

/// Render bytecode one instruction per line, e.g. `0003 EXEC 2 1`.
/// Unknown words and truncated operands are shown rather than rejected.
pub fn disassemble(words: &[u32]) -> String {
    let mut out = String::new();
    let mut pos = 0;
    while pos < words.len() {
        let word = words[pos];
        match Opcode::from_word(word) {
            Some(op) => {
                out.push_str(&format!("{:04} {}", pos, op));
                for operand in words.iter().skip(pos + 1).take(op.operand_count()) {
                    out.push_str(&format!(" {}", operand));
                }
                pos += 1 + op.operand_count();
            }
            None => {
                out.push_str(&format!("{:04} ?{}", pos, word));
                pos += 1;
            }
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn words_match_declaration_order() {
        for (i, op) in Opcode::iter().enumerate() {
            assert_eq!(u32::from(op), i as u32, "{} out of sequence", op);
            assert_eq!(Opcode::from_word(i as u32), Some(op));
        }
        assert_eq!(Opcode::from_word(Opcode::iter().count() as u32), None);
    }

    #[test]
    fn mnemonics() {
        assert_eq!(Opcode::EndIf.to_string(), "ENDIF");
        assert_eq!(Opcode::RepeatLoopIndex1.mnemonic(), "REPEAT_LOOP_INDEX1");
        assert_eq!(Opcode::BeginUntilLoop.to_string(), "BEGIN_UNTIL_LOOP");
        assert_eq!(Opcode::from_str("LIST_GET_ITEM"), Ok(Opcode::ListGetItem));
        assert_eq!(Opcode::from_str("LOG10"), Ok(Opcode::Log10));
        assert!(Opcode::from_str("NOPE").is_err());
        for op in Opcode::iter() {
            assert_eq!(Opcode::from_str(op.mnemonic()), Ok(op));
        }
    }

    #[test]
    fn operand_counts() {
        assert_eq!(Opcode::Exec.operand_count(), 2);
        assert_eq!(Opcode::Const.operand_count(), 1);
        assert_eq!(Opcode::ListLength.operand_count(), 1);
        assert_eq!(Opcode::Add.operand_count(), 0);
        assert!(Opcode::iter()
            .filter(|op| op.takes_list() || op.takes_variable())
            .all(|op| op.operand_count() == 1));
    }

    #[test]
    fn disassembly() {
        let words = [
            Opcode::Start as u32,
            Opcode::Const as u32,
            0,
            Opcode::Exec as u32,
            3,
            1,
            999,
            Opcode::Halt as u32,
        ];
        let text = disassemble(&words);
        assert_eq!(
            text,
            "0000 START\n0001 CONST 0\n0003 EXEC 3 1\n0006 ?999\n0007 HALT\n"
        );
    }
}
