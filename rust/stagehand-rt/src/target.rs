//! Targets: the stage and the sprites (including clones) that own scripts,
//! variables and lists.

use serde::{Deserialize, Serialize};
use stagehand_core::Value;
use std::fmt;

/// Handle to a target in the engine's arena.
///
/// Slots vacated by deleted clones are reused; the generation is bumped each
/// time, so a handle to a deleted clone never resolves to its successor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TargetId {
    index: u32,
    generation: u32,
}

impl TargetId {
    pub(crate) const UNASSIGNED: TargetId = TargetId::new(u32::MAX, 0);

    pub(crate) const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    pub fn index(self) -> usize {
        self.index as usize
    }

    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.generation == 0 {
            write!(f, "target:{}", self.index)
        } else {
            write!(f, "target:{}#{}", self.index, self.generation)
        }
    }
}

// ---------------------------------------------------------------------------
// Variables and lists
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub value: Value,
}

/// A resolved list position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListIndex {
    /// Zero-based position.
    At(usize),
    /// The `all` keyword (only meaningful for delete).
    All,
    Invalid,
}

impl ListIndex {
    /// Resolve a 1-based index value against a list of `len` items.
    ///
    /// `last` is `len`, `random`/`any` call `pick(len)` which must return a
    /// zero-based position below `len`, `all` is [`ListIndex::All`]. Numbers
    /// are floored; anything outside `1..=len` is invalid.
    pub fn resolve(index: &Value, len: usize, pick: impl FnOnce(usize) -> usize) -> ListIndex {
        if let Value::String(keyword) = index {
            return match keyword.as_str() {
                "last" if len > 0 => ListIndex::At(len - 1),
                "random" | "any" if len > 0 => ListIndex::At(pick(len).min(len - 1)),
                "all" => ListIndex::All,
                _ => ListIndex::Invalid,
            };
        }
        let n = index.to_double().floor();
        if n >= 1.0 && n <= len as f64 {
            ListIndex::At(n as usize - 1)
        } else {
            ListIndex::Invalid
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct List {
    pub name: String,
    items: Vec<Value>,
}

impl List {
    /// Lists silently refuse to grow past this many items.
    pub const MAX_LEN: usize = 200_000;

    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            items: Vec::new(),
        }
    }

    pub fn with_items(name: impl Into<String>, items: Vec<Value>) -> Self {
        let mut items = items;
        items.truncate(Self::MAX_LEN);
        Self {
            name: name.into(),
            items,
        }
    }

    pub fn items(&self) -> &[Value] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn append(&mut self, item: Value) {
        if self.items.len() < Self::MAX_LEN {
            self.items.push(item);
        }
    }

    pub fn delete(&mut self, index: ListIndex) {
        match index {
            ListIndex::At(i) if i < self.items.len() => {
                self.items.remove(i);
            }
            ListIndex::All => self.items.clear(),
            _ => {}
        }
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Insert before zero-based position `index`; `len()` appends.
    pub fn insert(&mut self, index: ListIndex, item: Value) {
        if self.items.len() >= Self::MAX_LEN {
            return;
        }
        if let ListIndex::At(i) = index {
            if i <= self.items.len() {
                self.items.insert(i, item);
            }
        }
    }

    pub fn replace(&mut self, index: ListIndex, item: Value) {
        if let ListIndex::At(i) = index {
            if let Some(slot) = self.items.get_mut(i) {
                *slot = item;
            }
        }
    }

    /// Item at `index`, or the empty string.
    pub fn get(&self, index: ListIndex) -> Value {
        match index {
            ListIndex::At(i) => self
                .items
                .get(i)
                .cloned()
                .unwrap_or_else(|| Value::String(String::new())),
            _ => Value::String(String::new()),
        }
    }

    /// 1-based position of the first equal item, or 0.
    pub fn index_of(&self, item: &Value) -> usize {
        self.items
            .iter()
            .position(|x| x.equals(item))
            .map_or(0, |i| i + 1)
    }

    pub fn contains(&self, item: &Value) -> bool {
        self.items.iter().any(|x| x.equals(item))
    }

    /// The list as one string: items are concatenated directly when every
    /// item is a single character, otherwise separated by spaces.
    pub fn joined(&self) -> String {
        let parts: Vec<String> = self.items.iter().map(Value::to_string).collect();
        let separator = if parts.iter().all(|p| p.chars().count() == 1) {
            ""
        } else {
            " "
        };
        parts.join(separator)
    }
}

// ---------------------------------------------------------------------------
// Target
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct SpriteState {
    pub x: f64,
    pub y: f64,
    pub direction: f64,
    pub size: f64,
    pub visible: bool,
    pub draggable: bool,
    /// The original sprite this clone was made from.
    pub clone_of: Option<TargetId>,
}

impl Default for SpriteState {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            direction: 90.0,
            size: 100.0,
            visible: true,
            draggable: false,
            clone_of: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TargetKind {
    Stage,
    Sprite(SpriteState),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    pub(crate) id: TargetId,
    pub name: String,
    pub kind: TargetKind,
    pub variables: Vec<Variable>,
    pub lists: Vec<List>,
    /// Costume names (backdrops for the stage).
    pub costumes: Vec<String>,
    pub costume: usize,
}

impl Target {
    pub fn stage() -> Self {
        Self::new("Stage", TargetKind::Stage)
    }

    pub fn sprite(name: impl Into<String>) -> Self {
        Self::new(name, TargetKind::Sprite(SpriteState::default()))
    }

    fn new(name: impl Into<String>, kind: TargetKind) -> Self {
        Self {
            id: TargetId::UNASSIGNED,
            name: name.into(),
            kind,
            variables: Vec::new(),
            lists: Vec::new(),
            costumes: Vec::new(),
            costume: 0,
        }
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.variables.push(Variable {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    pub fn with_list(mut self, name: impl Into<String>, items: Vec<Value>) -> Self {
        self.lists.push(List::with_items(name, items));
        self
    }

    pub fn with_costumes<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.costumes = names.into_iter().map(Into::into).collect();
        self
    }

    /// Assigned when the target is added to an engine.
    pub fn id(&self) -> TargetId {
        self.id
    }

    pub fn is_stage(&self) -> bool {
        matches!(self.kind, TargetKind::Stage)
    }

    pub fn is_clone(&self) -> bool {
        self.sprite_state().is_some_and(|s| s.clone_of.is_some())
    }

    /// The target whose scripts this one runs: the original for a clone,
    /// itself otherwise.
    pub fn root(&self) -> TargetId {
        self.sprite_state().and_then(|s| s.clone_of).unwrap_or(self.id)
    }

    pub fn sprite_state(&self) -> Option<&SpriteState> {
        match &self.kind {
            TargetKind::Sprite(state) => Some(state),
            TargetKind::Stage => None,
        }
    }

    pub fn sprite_state_mut(&mut self) -> Option<&mut SpriteState> {
        match &mut self.kind {
            TargetKind::Sprite(state) => Some(state),
            TargetKind::Stage => None,
        }
    }

    pub fn find_variable(&self, name: &str) -> Option<usize> {
        self.variables.iter().position(|v| v.name == name)
    }

    pub fn find_list(&self, name: &str) -> Option<usize> {
        self.lists.iter().position(|l| l.name == name)
    }

    pub fn costume_name(&self) -> Option<&str> {
        self.costumes.get(self.costume).map(String::as_str)
    }

    /// Select a costume by name, or by 1-based number (wrapping). Returns
    /// whether anything matched.
    pub fn set_costume(&mut self, costume: &Value) -> bool {
        if self.costumes.is_empty() {
            return false;
        }
        let name = costume.to_string();
        if let Some(i) = self.costumes.iter().position(|c| *c == name) {
            self.costume = i;
            return true;
        }
        if costume.is_valid_number() && !costume.is_string() {
            let n = self.costumes.len() as i64;
            let index = (costume.to_double().round() as i64 - 1).rem_euclid(n);
            self.costume = index as usize;
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(items: &[&str]) -> List {
        List::with_items("l", items.iter().map(|s| Value::from(*s)).collect())
    }

    #[test]
    fn index_keywords() {
        let pick_second = |_: usize| 1;
        assert_eq!(ListIndex::resolve(&Value::from("last"), 3, pick_second), ListIndex::At(2));
        assert_eq!(ListIndex::resolve(&Value::from("random"), 3, pick_second), ListIndex::At(1));
        assert_eq!(ListIndex::resolve(&Value::from("any"), 0, pick_second), ListIndex::Invalid);
        assert_eq!(ListIndex::resolve(&Value::from("all"), 3, pick_second), ListIndex::All);
        assert_eq!(ListIndex::resolve(&Value::from(2.7), 3, pick_second), ListIndex::At(1));
        assert_eq!(ListIndex::resolve(&Value::from(0), 3, pick_second), ListIndex::Invalid);
        assert_eq!(ListIndex::resolve(&Value::from(4), 3, pick_second), ListIndex::Invalid);
        assert_eq!(ListIndex::resolve(&Value::Infinity, 3, pick_second), ListIndex::Invalid);
    }

    #[test]
    fn out_of_range_is_harmless() {
        let mut l = list(&["a", "b"]);
        l.delete(ListIndex::Invalid);
        l.replace(ListIndex::At(5), Value::from("z"));
        l.insert(ListIndex::At(9), Value::from("z"));
        assert_eq!(l.len(), 2);
        assert_eq!(l.get(ListIndex::At(7)).to_string(), "");
    }

    #[test]
    fn join_rule() {
        assert_eq!(list(&["a", "b", "c"]).joined(), "abc");
        assert_eq!(list(&["ab", "c"]).joined(), "ab c");
        assert_eq!(list(&["1", "2"]).joined(), "12");
        assert_eq!(list(&[]).joined(), "");
    }

    #[test]
    fn search_is_case_insensitive() {
        let l = list(&["Apple", "pear"]);
        assert_eq!(l.index_of(&Value::from("apple")), 1);
        assert_eq!(l.index_of(&Value::from("plum")), 0);
        assert!(l.contains(&Value::from("PEAR")));
    }

    #[test]
    fn length_cap() {
        let mut l = List::with_items("big", vec![Value::from(0); List::MAX_LEN]);
        l.append(Value::from(1));
        l.insert(ListIndex::At(0), Value::from(1));
        assert_eq!(l.len(), List::MAX_LEN);
    }

    #[test]
    fn costume_selection() {
        let mut cat = Target::sprite("Cat").with_costumes(["a", "b", "c"]);
        assert!(cat.set_costume(&Value::from("c")));
        assert_eq!(cat.costume, 2);
        assert!(cat.set_costume(&Value::from(4)));
        assert_eq!(cat.costume_name(), Some("a"));
        assert!(!cat.set_costume(&Value::from("zebra")));
    }

    #[test]
    fn clones_report_their_root() {
        let mut cat = Target::sprite("Cat");
        cat.id = TargetId::new(1, 0);
        assert_eq!(cat.root(), TargetId::new(1, 0));
        let mut clone = cat.clone();
        clone.id = TargetId::new(4, 0);
        if let Some(state) = clone.sprite_state_mut() {
            state.clone_of = Some(TargetId::new(1, 0));
        }
        assert!(clone.is_clone());
        assert_eq!(clone.root(), TargetId::new(1, 0));
        assert!(!Target::stage().is_clone());
    }

    #[test]
    fn sprite_constructor_and_state_accessor() {
        let mut cat = Target::sprite("Cat");
        assert_eq!(cat.sprite_state().map(|s| s.direction), Some(90.0));
        if let Some(state) = cat.sprite_state_mut() {
            state.x = 12.0;
        }
        assert_eq!(cat.sprite_state().map(|s| s.x), Some(12.0));
        assert!(Target::stage().sprite_state().is_none());
    }

    #[test]
    fn ids_show_their_generation_once_reused() {
        assert_eq!(TargetId::new(3, 0).to_string(), "target:3");
        assert_eq!(TargetId::new(3, 2).to_string(), "target:3#2");
        assert_ne!(TargetId::new(3, 0), TargetId::new(3, 1));
    }
}
