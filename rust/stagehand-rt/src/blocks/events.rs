//! Event hats and broadcasting.

use super::{BlockRegistry, BlockSection};
use crate::engine::HatType;
use crate::vm::{BlockContext, BlockOutcome, Yield};

pub struct EventsSection;

impl BlockSection for EventsSection {
    fn name(&self) -> &'static str {
        "events"
    }

    fn register_blocks(&self, registry: &mut BlockRegistry) {
        registry.add_hat("event_whenflagclicked", HatType::GreenFlag);
        registry.add_hat("event_whenbroadcastreceived", HatType::BroadcastReceived);
        registry.add_hat("event_whenbackdropswitchesto", HatType::BackdropChanged);
        registry.add_hat("event_whenkeypressed", HatType::KeyPressed);
        registry.add_hat("event_whenthisspriteclicked", HatType::TargetClicked);
        registry.add_hat("event_whenstageclicked", HatType::TargetClicked);
        registry.add_hat("event_whentouchingobject", HatType::WhenTouchingObject);
        registry.add_hat("event_whengreaterthan", HatType::WhenGreaterThan);

        registry.add_block("event_broadcast", broadcast);
        registry.add_block("event_broadcastandwait", broadcast_and_wait);
    }
}

fn broadcast(ctx: &mut BlockContext<'_>) -> BlockOutcome {
    let name = ctx.input(0).to_string();
    ctx.engine().broadcast_by_name(&name);
    BlockOutcome::Done
}

/// Sleeps on a promise until every receiver has finished; execution then
/// continues after this block.
fn broadcast_and_wait(ctx: &mut BlockContext<'_>) -> BlockOutcome {
    let name = ctx.input(0).to_string();
    let thread = ctx.thread();
    let promise = ctx.engine().broadcast_and_wait(&name, thread);
    ctx.set_promise(promise);
    BlockOutcome::Yield(Yield::NEXT_PASS)
}
