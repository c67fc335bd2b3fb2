//! Visibility, costumes, backdrops, layering and size.

use super::{BlockRegistry, BlockSection};
use crate::vm::{BlockContext, BlockOutcome};
use stagehand_core::Value;

const MIN_SIZE: f64 = 5.0;
const MAX_SIZE: f64 = 500.0;

pub struct LooksSection;

impl BlockSection for LooksSection {
    fn name(&self) -> &'static str {
        "looks"
    }

    fn register_blocks(&self, registry: &mut BlockRegistry) {
        registry.add_block("looks_show", show);
        registry.add_block("looks_hide", hide);
        registry.add_block("looks_switchcostumeto", switch_costume_to);
        registry.add_block("looks_nextcostume", next_costume);
        registry.add_block("looks_costumenumbername", costume_number_name);
        registry.add_block("looks_switchbackdropto", switch_backdrop_to);
        registry.add_block("looks_nextbackdrop", next_backdrop);
        registry.add_block("looks_backdropnumbername", backdrop_number_name);
        registry.add_block("looks_gotofrontback", go_to_front_back);
        registry.add_block("looks_setsizeto", set_size_to);
        registry.add_block("looks_changesizeby", change_size_by);
        registry.add_block("looks_size", size);
    }
}

fn set_visible(ctx: &mut BlockContext<'_>, visible: bool) -> BlockOutcome {
    if let Some(sprite) = ctx.sprite_mut() {
        sprite.visible = visible;
        ctx.engine().request_redraw();
    }
    BlockOutcome::Done
}

fn show(ctx: &mut BlockContext<'_>) -> BlockOutcome {
    set_visible(ctx, true)
}

fn hide(ctx: &mut BlockContext<'_>) -> BlockOutcome {
    set_visible(ctx, false)
}

fn switch_costume_to(ctx: &mut BlockContext<'_>) -> BlockOutcome {
    let costume = ctx.input(0).clone();
    let changed = ctx.target_mut().is_some_and(|t| t.set_costume(&costume));
    if changed {
        ctx.engine().request_redraw();
    }
    BlockOutcome::Done
}

fn next_costume(ctx: &mut BlockContext<'_>) -> BlockOutcome {
    let next = ctx.target().map(|t| Value::from(t.costume + 2));
    if let Some(next) = next {
        if ctx.target_mut().is_some_and(|t| t.set_costume(&next)) {
            ctx.engine().request_redraw();
        }
    }
    BlockOutcome::Done
}

/// `number` reports the 1-based costume number, anything else its name.
fn costume_number_name(ctx: &mut BlockContext<'_>) -> BlockOutcome {
    let want_number = ctx.input(0).to_string() == "number";
    let Some(target) = ctx.target() else {
        return BlockOutcome::Value(Value::default());
    };
    if want_number {
        Value::from(target.costume + 1).into()
    } else {
        Value::String(target.costume_name().unwrap_or_default().to_string()).into()
    }
}

fn switch_backdrop_to(ctx: &mut BlockContext<'_>) -> BlockOutcome {
    let backdrop = ctx.input(0).clone();
    ctx.engine().set_backdrop(&backdrop);
    BlockOutcome::Done
}

fn next_backdrop(ctx: &mut BlockContext<'_>) -> BlockOutcome {
    let next = ctx.engine_ref().stage().map(|s| Value::from(s.costume + 2));
    if let Some(next) = next {
        ctx.engine().set_backdrop(&next);
    }
    BlockOutcome::Done
}

fn backdrop_number_name(ctx: &mut BlockContext<'_>) -> BlockOutcome {
    let want_number = ctx.input(0).to_string() == "number";
    let Some(stage) = ctx.engine_ref().stage() else {
        return BlockOutcome::Value(Value::default());
    };
    if want_number {
        Value::from(stage.costume + 1).into()
    } else {
        Value::String(stage.costume_name().unwrap_or_default().to_string()).into()
    }
}

fn go_to_front_back(ctx: &mut BlockContext<'_>) -> BlockOutcome {
    let front = ctx.input(0).to_string() != "back";
    let target = ctx.target_id();
    ctx.engine().move_to_layer_edge(target, front);
    ctx.engine().request_redraw();
    BlockOutcome::Done
}

fn resize(ctx: &mut BlockContext<'_>, update: impl FnOnce(f64) -> f64) -> BlockOutcome {
    if let Some(sprite) = ctx.sprite_mut() {
        let size = update(sprite.size);
        if size.is_finite() {
            sprite.size = size.clamp(MIN_SIZE, MAX_SIZE);
        }
        ctx.engine().request_redraw();
    }
    BlockOutcome::Done
}

fn set_size_to(ctx: &mut BlockContext<'_>) -> BlockOutcome {
    let size = ctx.input(0).to_double();
    resize(ctx, |_| size)
}

fn change_size_by(ctx: &mut BlockContext<'_>) -> BlockOutcome {
    let delta = ctx.input(0).to_double();
    resize(ctx, |size| size + delta)
}

fn size(ctx: &mut BlockContext<'_>) -> BlockOutcome {
    let size = ctx
        .target()
        .and_then(|t| t.sprite_state())
        .map_or(100.0, |s| s.size.round());
    Value::from(size).into()
}
