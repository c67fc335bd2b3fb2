//! Native block library.
//!
//! Blocks are grouped into sections, each of which registers its functions
//! and hats under their block opcode names (`motion_movesteps`,
//! `event_whenflagclicked`, ...). Compilers resolve names through the
//! engine's [`BlockRegistry`] and emit `EXEC` with the function pointer.

mod control;
mod data;
mod events;
mod looks;
mod motion;
mod sensing;

pub use control::ControlSection;
pub use data::DataSection;
pub use events::EventsSection;
pub use looks::LooksSection;
pub use motion::MotionSection;
pub use sensing::SensingSection;

use crate::engine::HatType;
use crate::vm::BlockFn;
use std::collections::HashMap;

/// A named group of blocks.
pub trait BlockSection {
    fn name(&self) -> &'static str;
    fn register_blocks(&self, registry: &mut BlockRegistry);
}

/// Opcode name to implementation.
#[derive(Debug, Default, Clone)]
pub struct BlockRegistry {
    functions: HashMap<String, BlockFn>,
    hats: HashMap<String, HatType>,
}

impl BlockRegistry {
    /// Register a block. A later registration under the same name wins.
    pub fn add_block(&mut self, opcode: impl Into<String>, function: BlockFn) {
        self.functions.insert(opcode.into(), function);
    }

    pub fn add_hat(&mut self, opcode: impl Into<String>, hat: HatType) {
        self.hats.insert(opcode.into(), hat);
    }

    pub fn resolve_block(&self, opcode: &str) -> Option<BlockFn> {
        self.functions.get(opcode).copied()
    }

    pub fn resolve_hat(&self, opcode: &str) -> Option<HatType> {
        self.hats.get(opcode).copied()
    }

    pub fn block_count(&self) -> usize {
        self.functions.len()
    }

    pub fn hat_count(&self) -> usize {
        self.hats.len()
    }

    /// Registered block names, sorted.
    pub fn block_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Every section the engine registers on construction.
pub fn builtin_sections() -> Vec<Box<dyn BlockSection>> {
    vec![
        Box::new(ControlSection),
        Box::new(EventsSection),
        Box::new(SensingSection),
        Box::new(MotionSection),
        Box::new(LooksSection),
        Box::new(DataSection),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_register_blocks_and_hats() {
        let mut registry = BlockRegistry::default();
        for section in builtin_sections() {
            section.register_blocks(&mut registry);
        }
        assert!(registry.resolve_block("control_wait").is_some());
        assert!(registry.resolve_block("motion_movesteps").is_some());
        assert!(registry.resolve_block("no_such_block").is_none());
        assert_eq!(
            registry.resolve_hat("event_whenflagclicked"),
            Some(HatType::GreenFlag)
        );
        assert_eq!(
            registry.resolve_hat("control_start_as_clone"),
            Some(HatType::CloneInit)
        );
        let names = registry.block_names();
        assert!(names.windows(2).all(|w| w[0] <= w[1]));
    }
}
