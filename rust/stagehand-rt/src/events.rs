//! Engine notifications for hosts.
//!
//! Renderers and UIs subscribe with [`Engine::subscribe`](crate::Engine::subscribe)
//! and drain the receiver whenever convenient. Each occurrence is delivered
//! once to every live subscriber; receivers that have been dropped are
//! pruned on the next send.

use crate::engine::MonitorId;
use crate::target::TargetId;
use crate::thread::ThreadId;
use crossbeam_channel::{unbounded, Receiver, Sender};

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// A scheduler pass finished; the host may redraw.
    AboutToRender,
    ThreadAboutToStop { thread: ThreadId, target: TargetId },
    /// Every thread was stopped and all clones deleted.
    Stopped,
    MonitorAdded(MonitorId),
    MonitorRemoved(MonitorId),
    QuestionAsked(String),
    QuestionAborted,
    QuestionAnswered(String),
}

#[derive(Debug, Default)]
pub(crate) struct EventBus {
    subscribers: Vec<Sender<EngineEvent>>,
}

impl EventBus {
    pub(crate) fn subscribe(&mut self) -> Receiver<EngineEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.push(tx);
        rx
    }

    pub(crate) fn emit(&mut self, event: EngineEvent) {
        if self.subscribers.is_empty() {
            return;
        }
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub(crate) fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}
