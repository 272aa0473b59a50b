//! The entity store: the current snapshot and the visible set derived from it.

use crate::entity::{Entity, Snapshot};
use crate::reassembly::CompletedUpdate;
use geo::{BoundingRect, MultiPoint, Point, Rect};
use std::sync::Arc;
use tracing::debug;

// ============================================================================
// VISIBLE SET
// ============================================================================

/// An ordered view into one snapshot.
///
/// Holds the snapshot it was computed from, so a visible set never mixes
/// entities from two different updates.
#[derive(Debug, Clone)]
pub struct VisibleSet {
    snapshot: Arc<Snapshot>,
    indices: Vec<usize>,
}

impl VisibleSet {
    pub fn new(snapshot: Arc<Snapshot>, indices: Vec<usize>) -> Self {
        debug_assert!(indices.iter().all(|&i| i < snapshot.len()));
        Self { snapshot, indices }
    }

    /// Every entity of the snapshot, in snapshot order.
    pub fn all(snapshot: Arc<Snapshot>) -> Self {
        let indices = (0..snapshot.len()).collect();
        Self { snapshot, indices }
    }

    pub fn empty() -> Self {
        Self::all(Arc::new(Snapshot::empty()))
    }

    pub fn snapshot(&self) -> &Arc<Snapshot> {
        &self.snapshot
    }

    /// Snapshot indices in visible order.
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn get(&self, position: usize) -> Option<&Entity> {
        self.indices
            .get(position)
            .and_then(|&i| self.snapshot.get(i))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity> + '_ {
        self.indices.iter().filter_map(|&i| self.snapshot.get(i))
    }

    /// Entities that can be placed on the map, in visible order.
    pub fn mappable(&self) -> impl Iterator<Item = &Entity> + '_ {
        self.iter().filter(|e| e.is_mappable())
    }

    pub fn mappable_count(&self) -> usize {
        self.mappable().count()
    }

    /// Bounding box of all mappable entities (x = longitude, y = latitude).
    pub fn bounds(&self) -> Option<Rect<f64>> {
        let points: MultiPoint<f64> = self
            .mappable()
            .filter_map(|e| e.position)
            .map(|p| Point::from(p.to_coord()))
            .collect();
        points.bounding_rect()
    }

    /// Distinct line labels in first-occurrence order.
    pub fn distinct_lines(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        self.iter()
            .filter_map(|e| e.line.as_ref())
            .filter(|line| seen.insert(line.as_str()))
            .cloned()
            .collect()
    }
}

// ============================================================================
// ENTITY STORE
// ============================================================================

/// Summary counts over the current snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub generation: u64,
    pub total: usize,
    pub positioned: usize,
    pub unidentified: usize,
    pub duplicates_merged: usize,
    pub visible: usize,
}

/// Owns the single current snapshot.
///
/// Replacement is a pointer swap: readers holding the previous `Arc` keep a
/// consistent view until they drop it.
#[derive(Debug)]
pub struct EntityStore {
    current: Arc<Snapshot>,
    visible: VisibleSet,
}

impl Default for EntityStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityStore {
    pub fn new() -> Self {
        let current = Arc::new(Snapshot::empty());
        Self {
            visible: VisibleSet::all(Arc::clone(&current)),
            current,
        }
    }

    /// Atomically installs a new snapshot built from `entities`.
    ///
    /// The visible set is reset to the whole snapshot until the filter
    /// engine recomputes it.
    pub fn replace_snapshot(&mut self, entities: impl IntoIterator<Item = Entity>) -> Arc<Snapshot> {
        let generation = self.current.generation() + 1;
        let snapshot = Arc::new(Snapshot::from_entities(generation, entities));
        debug!(
            generation,
            entities = snapshot.len(),
            duplicates = snapshot.duplicates_merged(),
            "Snapshot replaced"
        );
        self.current = Arc::clone(&snapshot);
        self.visible = VisibleSet::all(Arc::clone(&snapshot));
        snapshot
    }

    /// Installs the snapshot carried by a reassembled update.
    pub fn apply_update(&mut self, update: &CompletedUpdate) -> Arc<Snapshot> {
        self.replace_snapshot(update.records.iter().map(Entity::from_raw))
    }

    /// The latest complete snapshot.
    pub fn current(&self) -> &Arc<Snapshot> {
        &self.current
    }

    pub fn set_visible(&mut self, visible: VisibleSet) {
        self.visible = visible;
    }

    pub fn visible(&self) -> &VisibleSet {
        &self.visible
    }

    /// Line labels of the visible set, for the itinerary overlay.
    pub fn distinct_visible_lines(&self) -> Vec<String> {
        self.visible.distinct_lines()
    }

    pub fn stats(&self) -> StoreStats {
        let entities = self.current.entities();
        StoreStats {
            generation: self.current.generation(),
            total: entities.len(),
            positioned: entities.iter().filter(|e| e.is_positioned()).count(),
            unidentified: entities.iter().filter(|e| e.id.is_none()).count(),
            duplicates_merged: self.current.duplicates_merged(),
            visible: self.visible.len(),
        }
    }
}
