//! Monitor visibility for variables and lists. Reads and writes themselves
//! are VM opcodes.

use super::{BlockRegistry, BlockSection};
use crate::vm::{BlockContext, BlockOutcome};

pub struct DataSection;

impl BlockSection for DataSection {
    fn name(&self) -> &'static str {
        "data"
    }

    fn register_blocks(&self, registry: &mut BlockRegistry) {
        registry.add_block("data_showvariable", show_monitor);
        registry.add_block("data_hidevariable", hide_monitor);
        registry.add_block("data_showlist", show_monitor);
        registry.add_block("data_hidelist", hide_monitor);
    }
}

fn set_monitor(ctx: &mut BlockContext<'_>, visible: bool) -> BlockOutcome {
    let name = ctx.input(0).to_string();
    if let Some(id) = ctx.engine_ref().find_monitor(&name) {
        ctx.engine().set_monitor_visible(id, visible);
    }
    BlockOutcome::Done
}

fn show_monitor(ctx: &mut BlockContext<'_>) -> BlockOutcome {
    set_monitor(ctx, true)
}

fn hide_monitor(ctx: &mut BlockContext<'_>) -> BlockOutcome {
    set_monitor(ctx, false)
}
