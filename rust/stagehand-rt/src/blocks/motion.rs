//! Sprite position and direction. Every block is a no-op on the stage.
//! Positions are fenced to the stage rectangle.

use super::{BlockRegistry, BlockSection};
use crate::target::SpriteState;
use crate::vm::{BlockContext, BlockOutcome};
use stagehand_core::Value;

pub struct MotionSection;

impl BlockSection for MotionSection {
    fn name(&self) -> &'static str {
        "motion"
    }

    fn register_blocks(&self, registry: &mut BlockRegistry) {
        registry.add_block("motion_movesteps", move_steps);
        registry.add_block("motion_gotoxy", go_to_xy);
        registry.add_block("motion_changexby", change_x_by);
        registry.add_block("motion_setx", set_x);
        registry.add_block("motion_changeyby", change_y_by);
        registry.add_block("motion_sety", set_y);
        registry.add_block("motion_turnright", turn_right);
        registry.add_block("motion_turnleft", turn_left);
        registry.add_block("motion_pointindirection", point_in_direction);
        registry.add_block("motion_xposition", x_position);
        registry.add_block("motion_yposition", y_position);
        registry.add_block("motion_direction", direction);
    }
}

/// Wrap to (-180, 180].
pub(crate) fn wrap_direction(degrees: f64) -> f64 {
    let wrapped = (degrees + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped == -180.0 {
        180.0
    } else {
        wrapped
    }
}

/// Snap values within 1e-9 of an integer, hiding float noise from trig.
fn limit_precision(n: f64) -> f64 {
    let rounded = n.round();
    if (n - rounded).abs() < 1e-9 {
        rounded
    } else {
        n
    }
}

/// Apply `update` to the sprite's position, fence the result and request a
/// redraw if the sprite is visible.
fn move_sprite(ctx: &mut BlockContext<'_>, update: impl FnOnce(&mut SpriteState)) -> BlockOutcome {
    let half_width = ctx.engine_ref().config().stage_width / 2.0;
    let half_height = ctx.engine_ref().config().stage_height / 2.0;
    let Some(sprite) = ctx.sprite_mut() else {
        return BlockOutcome::Done;
    };
    update(sprite);
    sprite.x = sprite.x.clamp(-half_width, half_width);
    sprite.y = sprite.y.clamp(-half_height, half_height);
    let visible = sprite.visible;
    if visible {
        ctx.engine().request_redraw();
    }
    BlockOutcome::Done
}

fn finite(value: &Value) -> f64 {
    let n = value.to_double();
    if n.is_finite() {
        n
    } else {
        0.0
    }
}

fn move_steps(ctx: &mut BlockContext<'_>) -> BlockOutcome {
    let steps = finite(ctx.input(0));
    move_sprite(ctx, |s| {
        let radians = (90.0 - s.direction).to_radians();
        s.x += steps * radians.cos();
        s.y += steps * radians.sin();
    })
}

fn go_to_xy(ctx: &mut BlockContext<'_>) -> BlockOutcome {
    let (x, y) = (finite(ctx.input(0)), finite(ctx.input(1)));
    move_sprite(ctx, |s| {
        s.x = x;
        s.y = y;
    })
}

fn change_x_by(ctx: &mut BlockContext<'_>) -> BlockOutcome {
    let dx = finite(ctx.input(0));
    move_sprite(ctx, |s| s.x += dx)
}

fn set_x(ctx: &mut BlockContext<'_>) -> BlockOutcome {
    let x = finite(ctx.input(0));
    move_sprite(ctx, |s| s.x = x)
}

fn change_y_by(ctx: &mut BlockContext<'_>) -> BlockOutcome {
    let dy = finite(ctx.input(0));
    move_sprite(ctx, |s| s.y += dy)
}

fn set_y(ctx: &mut BlockContext<'_>) -> BlockOutcome {
    let y = finite(ctx.input(0));
    move_sprite(ctx, |s| s.y = y)
}

fn turn_right(ctx: &mut BlockContext<'_>) -> BlockOutcome {
    let degrees = finite(ctx.input(0));
    move_sprite(ctx, |s| s.direction = wrap_direction(s.direction + degrees))
}

fn turn_left(ctx: &mut BlockContext<'_>) -> BlockOutcome {
    let degrees = finite(ctx.input(0));
    move_sprite(ctx, |s| s.direction = wrap_direction(s.direction - degrees))
}

fn point_in_direction(ctx: &mut BlockContext<'_>) -> BlockOutcome {
    let degrees = finite(ctx.input(0));
    move_sprite(ctx, |s| s.direction = wrap_direction(degrees))
}

fn sprite_reporter(ctx: &BlockContext<'_>, read: impl FnOnce(&SpriteState) -> f64) -> BlockOutcome {
    let value = ctx
        .target()
        .and_then(|t| t.sprite_state())
        .map_or(0.0, |s| limit_precision(read(s)));
    Value::from(value).into()
}

fn x_position(ctx: &mut BlockContext<'_>) -> BlockOutcome {
    sprite_reporter(ctx, |s| s.x)
}

fn y_position(ctx: &mut BlockContext<'_>) -> BlockOutcome {
    sprite_reporter(ctx, |s| s.y)
}

fn direction(ctx: &mut BlockContext<'_>) -> BlockOutcome {
    sprite_reporter(ctx, |s| s.direction)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directions_wrap() {
        assert_eq!(wrap_direction(90.0), 90.0);
        assert_eq!(wrap_direction(270.0), -90.0);
        assert_eq!(wrap_direction(-180.0), 180.0);
        assert_eq!(wrap_direction(540.0), 180.0);
        assert_eq!(wrap_direction(-190.0), 170.0);
    }

    #[test]
    fn precision_snaps_near_integers() {
        assert_eq!(limit_precision(9.999_999_999_9), 10.0);
        assert_eq!(limit_precision(0.5), 0.5);
    }
}
