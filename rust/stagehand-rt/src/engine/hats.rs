//! Hat dispatch: starting scripts in response to events.

use super::{Engine, ScriptId};
use crate::target::TargetId;
use crate::thread::{Thread, ThreadId};
use crate::vm::VirtualMachine;
use std::sync::Arc;
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};
use tracing::trace;

/// Events a script can be attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum HatType {
    GreenFlag,
    BroadcastReceived,
    BackdropChanged,
    CloneInit,
    KeyPressed,
    TargetClicked,
    /// Edge-activated: fires when its predicate becomes true.
    WhenTouchingObject,
    /// Edge-activated: fires when its predicate becomes true.
    WhenGreaterThan,
}

impl HatType {
    /// Firing again while the script runs restarts it instead of being
    /// ignored.
    pub fn restarts_existing(self) -> bool {
        matches!(
            self,
            HatType::GreenFlag
                | HatType::BroadcastReceived
                | HatType::BackdropChanged
                | HatType::TargetClicked
        )
    }

    pub fn is_edge_activated(self) -> bool {
        matches!(self, HatType::WhenTouchingObject | HatType::WhenGreaterThan)
    }
}

/// How a script is attached to its hat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HatBinding {
    pub hat: HatType,
    /// Broadcast name, key name or backdrop name the hat listens for.
    pub field: Option<String>,
    /// Reporter script evaluated each pass for edge-activated hats.
    pub predicate: Option<ScriptId>,
}

impl HatBinding {
    pub fn new(hat: HatType) -> Self {
        Self {
            hat,
            field: None,
            predicate: None,
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn with_predicate(mut self, predicate: ScriptId) -> Self {
        self.predicate = Some(predicate);
        self
    }

    /// Case-insensitive match of the hat's field against an event field. A
    /// hat without a field matches everything.
    pub fn matches_field(&self, field: &str) -> bool {
        self.field
            .as_deref()
            .map_or(true, |own| own.to_lowercase() == field.to_lowercase())
    }
}

impl Engine {
    /// Start every script attached to `hat` whose field matches, on every
    /// target (clones included), foreground first. Returns the threads
    /// started or restarted.
    pub fn start_hats(&mut self, hat: HatType, field: Option<&str>) -> Vec<ThreadId> {
        self.start_hats_on(hat, field, None)
    }

    pub(crate) fn start_hats_on(
        &mut self,
        hat: HatType,
        field: Option<&str>,
        only: Option<TargetId>,
    ) -> Vec<ThreadId> {
        let mut pairs = Vec::new();
        for &target in self.layers.iter().rev() {
            if only.is_some_and(|o| o != target) {
                continue;
            }
            let Some(root) = self.target(target).map(|t| t.root()) else {
                continue;
            };
            let Some(scripts) = self.hat_scripts.get(&(hat, root)) else {
                continue;
            };
            for &script in scripts {
                let matches = field.map_or(true, |f| {
                    self.script_hat(script).is_some_and(|b| b.matches_field(f))
                });
                if matches {
                    pairs.push((script, target));
                }
            }
        }

        let mut started = Vec::new();
        for (script, target) in pairs {
            let id = if hat.restarts_existing() {
                self.restart_or_start(script, target)
            } else if self.has_unfinished_thread(script, target) {
                None
            } else {
                self.push_thread(script, target)
            };
            if let Some(id) = id {
                trace!(%hat, %script, %target, thread = %id, "hat fired");
                started.push(id);
            }
        }
        started
    }

    /// Whether an unfinished thread for `(script, target)` exists, counting
    /// the one executing now.
    pub(crate) fn has_unfinished_thread(&self, script: ScriptId, target: TargetId) -> bool {
        if self
            .active
            .as_ref()
            .is_some_and(|a| a.script == script && a.target == target && !a.stopping)
        {
            return true;
        }
        self.threads()
            .any(|t| t.script() == script && t.target() == target && !t.is_finished())
    }

    /// Replace a running thread for the pair in place, keeping its position
    /// in the list, or append a new one.
    fn restart_or_start(&mut self, script: ScriptId, target: TargetId) -> Option<ThreadId> {
        let code = Arc::clone(self.script(script)?);

        if let Some(active) = self
            .active
            .as_mut()
            .filter(|a| a.script == script && a.target == target)
        {
            if let Some(pending) = &active.replacement {
                return Some(pending.id());
            }
            let fresh = Thread::new(script, code, target);
            let id = fresh.id();
            active.stopping = true;
            active.replacement = Some(fresh);
            return Some(id);
        }

        let index = self.threads.iter().position(|slot| {
            slot.as_ref().is_some_and(|t| {
                t.script() == script && t.target() == target && !t.is_finished()
            })
        });
        match index {
            Some(index) => {
                let fresh = Thread::new(script, code, target);
                let id = fresh.id();
                if let Some(mut old) = self.threads[index].replace(fresh) {
                    old.kill();
                    self.signal_stopped(&mut old);
                }
                Some(id)
            }
            None => self.push_thread(script, target),
        }
    }

    /// Evaluate every edge-activated predicate once and start scripts whose
    /// value went from false to true since the last pass. A pair seen for the
    /// first time counts as previously false.
    pub(crate) fn check_edge_hats(&mut self) {
        let mut candidates = Vec::new();
        for &target in self.layers.iter().rev() {
            let Some(t) = self.target(target) else {
                continue;
            };
            if t.is_clone() && !t.sprite_state().is_some_and(|s| s.visible) {
                continue;
            }
            let root = t.root();
            for hat in HatType::iter().filter(|h| h.is_edge_activated()) {
                if let Some(scripts) = self.hat_scripts.get(&(hat, root)) {
                    candidates.extend(scripts.iter().map(|&s| (s, target)));
                }
            }
        }

        for (script, target) in candidates {
            let predicate = self.script_hat(script).and_then(|b| b.predicate);
            let value = match predicate {
                Some(predicate) => self.evaluate_script(predicate, target),
                None => false,
            };
            let previous = self.edge_values.insert((script, target), value);
            let rising = value && !previous.unwrap_or(false);
            if rising && !self.has_unfinished_thread(script, target) {
                trace!(%script, %target, "edge hat fired");
                self.push_thread(script, target);
            }
        }
    }

    /// Run a reporter script to completion on `target` and return its truth
    /// value.
    pub(crate) fn evaluate_script(&mut self, script: ScriptId, target: TargetId) -> bool {
        let Some(code) = self.script(script).cloned() else {
            return false;
        };
        let mut vm = VirtualMachine::new(code, script, target);
        vm.evaluate(self, ThreadId::next()).to_bool()
    }
}
