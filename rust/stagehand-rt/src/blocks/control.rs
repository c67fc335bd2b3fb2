//! Waiting, stopping and cloning.

use super::{BlockRegistry, BlockSection};
use crate::engine::HatType;
use crate::vm::{BlockContext, BlockOutcome, Yield};
use std::time::Duration;

pub struct ControlSection;

impl BlockSection for ControlSection {
    fn name(&self) -> &'static str {
        "control"
    }

    fn register_blocks(&self, registry: &mut BlockRegistry) {
        registry.add_block("control_wait", wait);
        registry.add_block("control_wait_until", wait_until);
        registry.add_block("control_stop", stop);
        registry.add_block("control_create_clone_of", create_clone_of);
        registry.add_block("control_delete_this_clone", delete_this_clone);
        registry.add_hat("control_start_as_clone", HatType::CloneInit);
    }
}

/// `wait (seconds)`. The first call arms the thread's timer; the block is
/// retried from its checkpoint each pass until the deadline passes.
fn wait(ctx: &mut BlockContext<'_>) -> BlockOutcome {
    let now = ctx.engine_ref().now();
    match ctx.timer() {
        None => {
            let seconds = ctx.input(0).to_double().max(0.0);
            let delay = Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX);
            ctx.set_timer(now.checked_add(delay).unwrap_or(Duration::MAX));
            ctx.engine().request_redraw();
            BlockOutcome::Yield(Yield::RETRY)
        }
        Some(deadline) if now >= deadline => {
            ctx.clear_timer();
            BlockOutcome::Done
        }
        Some(_) => BlockOutcome::Yield(Yield::RETRY),
    }
}

/// `wait until <condition>`, re-evaluated once per pass.
fn wait_until(ctx: &mut BlockContext<'_>) -> BlockOutcome {
    if ctx.input(0).to_bool() {
        BlockOutcome::Done
    } else {
        BlockOutcome::Yield(Yield::RETRY)
    }
}

fn stop(ctx: &mut BlockContext<'_>) -> BlockOutcome {
    let option = ctx.input(0).to_string();
    match option.as_str() {
        "all" => {
            ctx.engine().stop();
            BlockOutcome::Finish
        }
        "other scripts in sprite" | "other scripts in stage" => {
            let (target, thread) = (ctx.target_id(), ctx.thread());
            ctx.engine().stop_other_threads(target, thread);
            BlockOutcome::Done
        }
        _ => BlockOutcome::Finish,
    }
}

/// `create clone of (sprite)`; `_myself_` clones the executing target.
fn create_clone_of(ctx: &mut BlockContext<'_>) -> BlockOutcome {
    let name = ctx.input(0).to_string();
    let source = if name == "_myself_" {
        Some(ctx.target_id())
    } else {
        ctx.engine_ref().find_target(&name)
    };
    if let Some(source) = source {
        ctx.engine().create_clone(source);
    }
    BlockOutcome::Done
}

fn delete_this_clone(ctx: &mut BlockContext<'_>) -> BlockOutcome {
    let target = ctx.target_id();
    if ctx.target().is_some_and(|t| t.is_clone()) {
        ctx.engine().delete_clone(target);
        return BlockOutcome::Finish;
    }
    BlockOutcome::Done
}
