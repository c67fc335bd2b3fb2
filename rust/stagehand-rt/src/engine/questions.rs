//! The ask-and-wait queue. Only the question at the front is shown; later
//! askers wait their turn.

use super::Engine;
use crate::events::EngineEvent;
use crate::thread::{Promise, ThreadId};
use tracing::debug;

#[derive(Debug)]
pub(crate) struct Question {
    text: String,
    asker: ThreadId,
    promise: Promise,
}

impl Engine {
    /// Queue a question for `asker`. The promise resolves when it is
    /// answered.
    pub fn ask(&mut self, text: impl Into<String>, asker: ThreadId) -> Promise {
        let promise = Promise::new();
        let text = text.into();
        let first = self.questions.is_empty();
        self.questions.push_back(Question {
            text: text.clone(),
            asker,
            promise: promise.clone(),
        });
        if first {
            self.emit(EngineEvent::QuestionAsked(text));
        }
        promise
    }

    /// The question currently on screen.
    pub fn current_question(&self) -> Option<&str> {
        self.questions.front().map(|q| q.text.as_str())
    }

    /// Answer the question on screen and show the next one. Ignored when
    /// nothing is being asked.
    pub fn answer(&mut self, text: impl Into<String>) {
        let Some(question) = self.questions.pop_front() else {
            return;
        };
        let text = text.into();
        debug!(asker = %question.asker, "question answered");
        self.answer = text.clone();
        if !question.promise.is_resolved() {
            question.promise.resolve();
        }
        self.emit(EngineEvent::QuestionAnswered(text));
        self.show_next_question();
    }

    /// The most recent answer.
    pub fn last_answer(&self) -> &str {
        &self.answer
    }

    /// Drop every question asked by `asker`. If it was on screen, emit
    /// [`EngineEvent::QuestionAborted`] and show the next.
    pub(crate) fn abort_question(&mut self, asker: ThreadId) {
        let Some(front) = self.questions.front() else {
            return;
        };
        let on_screen = front.asker == asker;
        self.questions.retain(|q| q.asker != asker);
        if on_screen {
            self.emit(EngineEvent::QuestionAborted);
            self.show_next_question();
        }
    }

    fn show_next_question(&mut self) {
        if let Some(next) = self.questions.front() {
            let text = next.text.clone();
            self.emit(EngineEvent::QuestionAsked(text));
        }
    }
}
