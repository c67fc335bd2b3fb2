//! Sprite clones.

use super::{Engine, HatType};
use crate::target::TargetId;
use tracing::debug;

impl Engine {
    /// Clone `source`, placing the copy directly behind it, and start the
    /// clone's "when I start as a clone" scripts. Refused for the stage and
    /// when the clone limit has been reached.
    pub fn create_clone(&mut self, source: TargetId) -> Option<TargetId> {
        let limit = self.config.clone_limit;
        if limit >= 0 && self.clone_count as i64 >= limit {
            debug!(%source, limit, "clone limit reached");
            return None;
        }
        let original = self.target(source)?;
        if original.is_stage() {
            return None;
        }
        let root = original.root();
        let mut copy = original.clone();
        if let Some(state) = copy.sprite_state_mut() {
            state.clone_of = Some(root);
        }
        let id = self.place_target(copy);
        let below = self
            .layers
            .iter()
            .position(|t| *t == source)
            .unwrap_or(self.layers.len());
        self.layers.insert(below, id);
        self.clone_count += 1;
        debug!(clone = %id, %source, count = self.clone_count, "clone created");

        self.start_hats_on(HatType::CloneInit, None, Some(id));
        Some(id)
    }

    /// Delete a clone: stop its threads and remove it from the layer list.
    /// Originals cannot be deleted. Returns whether anything was removed.
    pub fn delete_clone(&mut self, id: TargetId) -> bool {
        if !self.target(id).is_some_and(|t| t.is_clone()) {
            return false;
        }
        self.stop_target_threads(id);
        self.layers.retain(|t| *t != id);
        self.edge_values.retain(|(_, target), _| *target != id);
        self.take_target(id);
        self.clone_count = self.clone_count.saturating_sub(1);
        debug!(clone = %id, count = self.clone_count, "clone deleted");
        true
    }

    pub fn delete_all_clones(&mut self) {
        let clones: Vec<TargetId> = self
            .targets()
            .filter(|t| t.is_clone())
            .map(|t| t.id())
            .collect();
        for id in clones {
            self.delete_clone(id);
        }
    }

    /// Number of live clones.
    pub fn clone_count(&self) -> usize {
        self.clone_count
    }
}
