//! Math, string and list operations for the VM.

use super::VirtualMachine;
use crate::engine::Engine;
use crate::script::VarRef;
use crate::target::ListIndex;
use stagehand_core::{Opcode, Value};

/// Trig results are rounded to this many decimal places so that, e.g.,
/// `sin(180)` is exactly 0.
const TRIG_PRECISION: f64 = 1e10;

fn round_trig(x: f64) -> f64 {
    (x * TRIG_PRECISION).round() / TRIG_PRECISION
}

/// Single-argument math operators. Angles are in degrees.
pub(super) fn math(opcode: Opcode, x: &Value) -> Value {
    let n = x.to_double();
    let result = match opcode {
        // Half-up rounding: -2.5 rounds to -2.
        Opcode::Round => (n + 0.5).floor(),
        Opcode::Abs => n.abs(),
        Opcode::Floor => n.floor(),
        Opcode::Ceil => n.ceil(),
        Opcode::Sqrt => n.sqrt(),
        Opcode::Sin => round_trig(n.to_radians().sin()),
        Opcode::Cos => round_trig(n.to_radians().cos()),
        Opcode::Tan => tan_degrees(n),
        Opcode::Asin => n.asin().to_degrees(),
        Opcode::Acos => n.acos().to_degrees(),
        Opcode::Atan => n.atan().to_degrees(),
        Opcode::Ln => n.ln(),
        Opcode::Log10 => n.log10(),
        Opcode::Exp => n.exp(),
        Opcode::Exp10 => 10f64.powf(n),
        _ => return x.clone(),
    };
    Value::from(result)
}

fn tan_degrees(n: f64) -> f64 {
    let angle = n % 360.0;
    if angle == 90.0 || angle == -270.0 {
        f64::INFINITY
    } else if angle == -90.0 || angle == 270.0 {
        f64::NEG_INFINITY
    } else {
        round_trig(n.to_radians().tan())
    }
}

/// The 1-based `index`th character of `text`, or `""`.
pub(super) fn letter_of(text: &Value, index: &Value) -> Value {
    let n = index.to_double().floor();
    if n < 1.0 {
        return Value::String(String::new());
    }
    text.to_string()
        .chars()
        .nth(n as usize - 1)
        .map_or_else(|| Value::String(String::new()), |c| Value::from(c.to_string()))
}

pub(super) fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

impl VirtualMachine {
    /// Execute a list opcode against `list` as seen from the VM's target.
    /// A list that does not resolve behaves as empty and ignores writes.
    pub(super) fn list_op(&mut self, engine: &mut Engine, opcode: Opcode, list: VarRef) {
        let target = self.target;
        let len = engine.list(target, list).map_or(0, |l| l.len());
        match opcode {
            Opcode::ReadList => {
                let joined = engine.list(target, list).map(|l| l.joined()).unwrap_or_default();
                self.push(Value::from(joined));
            }
            Opcode::ListAppend => {
                let item = self.pop();
                if let Some(l) = engine.list_mut(target, list) {
                    l.append(item);
                }
            }
            Opcode::ListDel => {
                let index = self.pop();
                let index = ListIndex::resolve(&index, len, |n| engine.random_index(n));
                if let Some(l) = engine.list_mut(target, list) {
                    l.delete(index);
                }
            }
            Opcode::ListDelAll => {
                if let Some(l) = engine.list_mut(target, list) {
                    l.clear();
                }
            }
            Opcode::ListInsert => {
                let (item, index) = self.pop2();
                let index = ListIndex::resolve(&index, len + 1, |n| engine.random_index(n));
                if let Some(l) = engine.list_mut(target, list) {
                    l.insert(index, item);
                }
            }
            Opcode::ListReplace => {
                let (index, item) = self.pop2();
                let index = ListIndex::resolve(&index, len, |n| engine.random_index(n));
                if let Some(l) = engine.list_mut(target, list) {
                    l.replace(index, item);
                }
            }
            Opcode::ListGetItem => {
                let index = self.pop();
                let index = ListIndex::resolve(&index, len, |n| engine.random_index(n));
                let item = engine
                    .list(target, list)
                    .map_or_else(|| Value::String(String::new()), |l| l.get(index));
                self.push(item);
            }
            Opcode::ListIndexOf => {
                let item = self.pop();
                let position = engine.list(target, list).map_or(0, |l| l.index_of(&item));
                self.push(Value::from(position));
            }
            Opcode::ListLength => self.push(Value::from(len)),
            Opcode::ListContains => {
                let item = self.pop();
                let found = engine.list(target, list).is_some_and(|l| l.contains(&item));
                self.push(Value::Bool(found));
            }
            _ => {}
        }
    }
}
