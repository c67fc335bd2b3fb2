//! Core data types for the stagehand block-script runtime.
//!
//! This crate has no runtime behaviour of its own. It defines the dynamic
//! [`Value`] with its coercion rules, the `#[repr(C)]` wire layout used to
//! exchange values with natively compiled block code, and the closed
//! [`Opcode`] set that scripts are assembled from.

pub mod bytecode;
pub mod value;
pub mod wire;

pub use bytecode::Opcode;
pub use value::{parse_number, Value, ValueType};
pub use wire::{ValueData, WireType};
