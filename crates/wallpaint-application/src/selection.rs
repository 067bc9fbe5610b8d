use std::collections::BTreeSet;
use wallpaint_core::wall::{WallId, WallInfo};

/// The set of walls the user wants painted.
///
/// The selection is always a subset of the current detection's wall ids.
/// Before the first `initialize_from` the domain is empty, so every
/// mutation is a no-op.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionModel {
    domain: BTreeSet<WallId>,
    selected: BTreeSet<WallId>,
}

impl SelectionModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the domain with the ids of `walls` and selects all of them.
    pub fn initialize_from(&mut self, walls: &[WallInfo]) {
        self.domain = walls.iter().map(|wall| wall.id).collect();
        self.selected = self.domain.clone();
    }

    /// Flips membership of `id`. Ids outside the domain are ignored.
    ///
    /// Returns whether the selection changed.
    pub fn toggle(&mut self, id: WallId) -> bool {
        if !self.domain.contains(&id) {
            tracing::debug!("[Selection] Ignoring toggle of unknown wall {}", id);
            return false;
        }
        if !self.selected.remove(&id) {
            self.selected.insert(id);
        }
        true
    }

    pub fn select_all(&mut self) -> bool {
        if self.selected == self.domain {
            return false;
        }
        self.selected = self.domain.clone();
        true
    }

    pub fn select_none(&mut self) -> bool {
        if self.selected.is_empty() {
            return false;
        }
        self.selected.clear();
        true
    }

    /// Forgets the domain entirely (upload or reset).
    pub fn clear(&mut self) {
        self.domain.clear();
        self.selected.clear();
    }

    pub fn selected(&self) -> &BTreeSet<WallId> {
        &self.selected
    }

    pub fn domain(&self) -> &BTreeSet<WallId> {
        &self.domain
    }
}
