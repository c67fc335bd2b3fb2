use super::{BlockRegistry, BlockSection};
use crate::vm::{BlockContext, BlockOutcome, Yield};
use stagehand_core::Value;

pub struct SensingSection;

impl BlockSection for SensingSection {
    fn name(&self) -> &'static str {
        "sensing"
    }

    fn register_blocks(&self, registry: &mut BlockRegistry) {
        registry.add_block("sensing_askandwait", ask_and_wait);
        registry.add_block("sensing_answer", answer);
        registry.add_block("sensing_timer", timer);
        registry.add_block("sensing_resettimer", reset_timer);
        registry.add_block("sensing_keypressed", key_pressed);
    }
}

fn ask_and_wait(ctx: &mut BlockContext<'_>) -> BlockOutcome {
    let question = ctx.input(0).to_string();
    let thread = ctx.thread();
    let promise = ctx.engine().ask(question, thread);
    ctx.set_promise(promise);
    BlockOutcome::Yield(Yield::NEXT_PASS)
}

fn answer(ctx: &mut BlockContext<'_>) -> BlockOutcome {
    Value::from(ctx.engine_ref().last_answer()).into()
}

fn timer(ctx: &mut BlockContext<'_>) -> BlockOutcome {
    Value::from(ctx.engine_ref().timer()).into()
}

fn reset_timer(ctx: &mut BlockContext<'_>) -> BlockOutcome {
    ctx.engine().reset_timer();
    BlockOutcome::Done
}

fn key_pressed(ctx: &mut BlockContext<'_>) -> BlockOutcome {
    let key = ctx.input(0).to_string();
    Value::Bool(ctx.engine_ref().is_key_down(&key)).into()
}
