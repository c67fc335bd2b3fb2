//! Monitors: reporter scripts whose values are shown to the user and
//! refreshed at the end of every pass.

use super::{Engine, ScriptId};
use crate::events::EngineEvent;
use crate::script::Script;
use crate::target::TargetId;
use crate::thread::ThreadId;
use crate::vm::VirtualMachine;
use stagehand_core::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MonitorId(pub u32);

#[derive(Debug, Clone)]
pub struct Monitor {
    id: MonitorId,
    pub name: String,
    pub target: TargetId,
    script: ScriptId,
    pub visible: bool,
    value: Value,
}

impl Monitor {
    pub fn id(&self) -> MonitorId {
        self.id
    }

    pub fn script(&self) -> ScriptId {
        self.script
    }

    /// Value as of the last refresh.
    pub fn value(&self) -> &Value {
        &self.value
    }
}

impl Engine {
    /// Add a visible monitor that evaluates `script` on `target`.
    pub fn add_monitor(
        &mut self,
        name: impl Into<String>,
        target: TargetId,
        script: Script,
    ) -> MonitorId {
        let script = self.add_script(target, script, None);
        let id = MonitorId(self.next_monitor);
        self.next_monitor += 1;
        self.monitors.push(Monitor {
            id,
            name: name.into(),
            target,
            script,
            visible: true,
            value: Value::default(),
        });
        self.emit(EngineEvent::MonitorAdded(id));
        id
    }

    /// Remove a monitor and unregister its reporter script.
    pub fn remove_monitor(&mut self, id: MonitorId) -> bool {
        let Some(i) = self.monitors.iter().position(|m| m.id == id) else {
            return false;
        };
        let monitor = self.monitors.remove(i);
        self.remove_script(monitor.script);
        self.emit(EngineEvent::MonitorRemoved(id));
        true
    }

    pub fn set_monitor_visible(&mut self, id: MonitorId, visible: bool) -> bool {
        match self.monitors.iter_mut().find(|m| m.id == id) {
            Some(monitor) => {
                monitor.visible = visible;
                true
            }
            None => false,
        }
    }

    pub fn find_monitor(&self, name: &str) -> Option<MonitorId> {
        self.monitors.iter().find(|m| m.name == name).map(|m| m.id)
    }

    pub fn monitor(&self, id: MonitorId) -> Option<&Monitor> {
        self.monitors.iter().find(|m| m.id == id)
    }

    pub fn monitors(&self) -> &[Monitor] {
        &self.monitors
    }

    /// Re-evaluate every visible monitor whose target still exists.
    pub fn update_monitors(&mut self) {
        for i in 0..self.monitors.len() {
            let (visible, target, script) = {
                let m = &self.monitors[i];
                (m.visible, m.target, m.script)
            };
            if !visible || self.target(target).is_none() {
                continue;
            }
            let Some(code) = self.script(script).cloned() else {
                continue;
            };
            let mut vm = VirtualMachine::new(code, script, target);
            let value = vm.evaluate(self, ThreadId::next());
            if let Some(m) = self.monitors.get_mut(i) {
                m.value = value;
            }
        }
    }
}
