//! The cluster engine: groups visible vehicles by screen-space proximity.
//!
//! Clustering is greedy and runs in visible-set order, so the same input at
//! the same zoom always yields the same tree:
//!
//! ```text
//!   for each mappable entity p (visible order):
//!     1. nearest multi-member group within radius  -> join it
//!     2. else nearest lone point within radius     -> pair up into a group
//!     3. else                                      -> stay a lone point
//!   ties break toward the older group
//! ```
//!
//! Candidate groups are pruned with an H3 index whose cells are at least as
//! large as the cluster radius on the ground, queried with a 2-ring. When no
//! resolution is coarse enough (very low zoom) every group is a candidate.

use crate::entity::{Entity, Position, PLACEHOLDER};
use crate::projection::{self, LatLngBounds};
use crate::store::VisibleSet;
use geo::{BoundingRect, Centroid, MultiPoint, Point};
use h3o::{CellIndex, LatLng, Resolution};
use nalgebra::{Point2, Vector2};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::debug;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Zoom-dependent clustering policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClusterPolicy {
    /// Maximum pixel distance at which a point joins a group
    pub radius_px: u32,

    /// Clustering stops at this zoom and above
    pub disable_at_zoom: u8,
}

impl ClusterPolicy {
    /// Three-tier policy keyed on zoom.
    pub fn for_zoom(zoom: u8) -> Self {
        match zoom {
            z if z >= 15 => Self {
                radius_px: 40,
                disable_at_zoom: z,
            },
            12..=14 => Self {
                radius_px: 60,
                disable_at_zoom: 16,
            },
            _ => Self {
                radius_px: 80,
                disable_at_zoom: 14,
            },
        }
    }

    pub fn clusters_at(&self, zoom: u8) -> bool {
        zoom < self.disable_at_zoom
    }
}

/// Cluster engine configuration.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// Members listed by a cluster summary (default: 20)
    pub summary_limit: usize,

    /// H3 ring size queried for candidate groups (default: 2)
    pub candidate_ring: u32,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            summary_limit: 20,
            candidate_ring: 2,
        }
    }
}

// ============================================================================
// CLUSTER TREE
// ============================================================================

/// Cluster badge size class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterBadge {
    Small,
    Medium,
    Large,
}

impl ClusterBadge {
    pub fn for_count(count: usize) -> Self {
        match count {
            0..=10 => ClusterBadge::Small,
            11..=100 => ClusterBadge::Medium,
            _ => ClusterBadge::Large,
        }
    }
}

/// A single mapped vehicle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Leaf {
    /// Position of the entity in its snapshot
    pub snapshot_index: usize,
    pub entity: Entity,
    pub position: Position,
}

/// A group of nearby vehicles.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cluster {
    /// Members in insertion order
    pub members: Vec<Leaf>,
    pub centroid: Position,
    pub bounds: LatLngBounds,
    pub badge: ClusterBadge,
}

impl Cluster {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// One top-level node of the tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClusterNode {
    Leaf(Leaf),
    Cluster(Cluster),
}

impl ClusterNode {
    pub fn member_count(&self) -> usize {
        match self {
            ClusterNode::Leaf(_) => 1,
            ClusterNode::Cluster(c) => c.len(),
        }
    }

    pub fn leaves(&self) -> &[Leaf] {
        match self {
            ClusterNode::Leaf(leaf) => std::slice::from_ref(leaf),
            ClusterNode::Cluster(c) => &c.members,
        }
    }

    /// Where the node is drawn.
    pub fn position(&self) -> Position {
        match self {
            ClusterNode::Leaf(leaf) => leaf.position,
            ClusterNode::Cluster(c) => c.centroid,
        }
    }
}

/// Result of one reclustering pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterTree {
    pub zoom: u8,
    pub policy: ClusterPolicy,

    /// False when clustering was off (toggle or zoom threshold)
    pub clustered: bool,

    /// Top-level nodes in first-member order
    pub nodes: Vec<ClusterNode>,

    /// Bounds of every member; `None` for an empty tree
    pub bounds: Option<LatLngBounds>,

    pub member_count: usize,
}

impl ClusterTree {
    pub fn empty(zoom: u8) -> Self {
        Self {
            zoom,
            policy: ClusterPolicy::for_zoom(zoom),
            clustered: false,
            nodes: Vec::new(),
            bounds: None,
            member_count: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn clusters(&self) -> impl Iterator<Item = (usize, &Cluster)> + '_ {
        self.nodes.iter().enumerate().filter_map(|(i, n)| match n {
            ClusterNode::Cluster(c) => Some((i, c)),
            ClusterNode::Leaf(_) => None,
        })
    }

    pub fn individual_points(&self) -> impl Iterator<Item = &Leaf> + '_ {
        self.nodes.iter().filter_map(|n| match n {
            ClusterNode::Leaf(leaf) => Some(leaf),
            ClusterNode::Cluster(_) => None,
        })
    }

    pub fn cluster_count(&self) -> usize {
        self.clusters().count()
    }

    /// Member snapshot indices per top-level node.
    pub fn partition(&self) -> Vec<Vec<usize>> {
        self.nodes
            .iter()
            .map(|n| n.leaves().iter().map(|l| l.snapshot_index).collect())
            .collect()
    }

    /// Summarizes the cluster at `node`, listing at most `limit` members.
    pub fn summary(&self, node: usize, limit: usize) -> Option<ClusterSummary> {
        match self.nodes.get(node)? {
            ClusterNode::Cluster(c) => Some(ClusterSummary::of(c, limit)),
            ClusterNode::Leaf(_) => None,
        }
    }
}

/// Popup content for one cluster.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterSummary {
    pub total: usize,

    /// Distinct line labels among the listed members
    pub lines: Vec<String>,

    pub members: Vec<MemberSummary>,

    /// More members exist than were listed
    pub truncated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemberSummary {
    pub id: String,
    pub line: String,
    pub speed: f64,
}

impl ClusterSummary {
    fn of(cluster: &Cluster, limit: usize) -> Self {
        let mut seen = HashSet::new();
        let mut lines = Vec::new();
        let members: Vec<MemberSummary> = cluster
            .members
            .iter()
            .take(limit)
            .map(|leaf| {
                let line = leaf.entity.line_or_placeholder().to_string();
                if seen.insert(line.clone()) {
                    lines.push(line.clone());
                }
                MemberSummary {
                    id: leaf.entity.id_or_placeholder().to_string(),
                    line,
                    speed: leaf.entity.speed,
                }
            })
            .collect();

        Self {
            total: cluster.len(),
            lines,
            members,
            truncated: cluster.len() > limit,
        }
    }

    /// Line labels joined for display; placeholder when none are known.
    pub fn lines_label(&self) -> String {
        if self.lines.is_empty() {
            PLACEHOLDER.to_string()
        } else {
            self.lines.join(", ")
        }
    }
}

// ============================================================================
// GROUPING STATE
// ============================================================================

struct Group {
    members: Vec<usize>,
    pixel_sum: Vector2<f64>,
    centroid_px: Point2<f64>,
    cell: Option<CellIndex>,
}

impl Group {
    fn single(member: usize, px: Point2<f64>, cell: Option<CellIndex>) -> Self {
        Self {
            members: vec![member],
            pixel_sum: px.coords,
            centroid_px: px,
            cell,
        }
    }

    fn add(&mut self, member: usize, px: Point2<f64>) {
        self.members.push(member);
        self.pixel_sum += px.coords;
        self.centroid_px = projection::pixel_mean(&self.pixel_sum, self.members.len());
    }
}

/// Candidate index: H3 cell of each group's centroid.
struct GroupIndex {
    resolution: Option<Resolution>,
    ring: u32,
    cells: HashMap<CellIndex, HashSet<usize>>,
}

impl GroupIndex {
    /// Finest resolution whose average edge is at least `radius_m`.
    fn new(radius_m: f64, ring: u32) -> Self {
        let resolution = (0u8..=15)
            .rev()
            .filter_map(|r| Resolution::try_from(r).ok())
            .find(|r| r.edge_length_m() >= radius_m);
        Self {
            resolution,
            ring,
            cells: HashMap::new(),
        }
    }

    fn cell_of(&self, position: Position) -> Option<CellIndex> {
        let resolution = self.resolution?;
        let latlng = LatLng::new(position.lat, position.lon).ok()?;
        Some(latlng.to_cell(resolution))
    }

    fn insert(&mut self, cell: Option<CellIndex>, group: usize) {
        if let Some(cell) = cell {
            self.cells.entry(cell).or_insert_with(HashSet::new).insert(group);
        }
    }

    fn remove(&mut self, cell: Option<CellIndex>, group: usize) {
        let Some(cell) = cell else { return };
        if let Some(set) = self.cells.get_mut(&cell) {
            set.remove(&group);
            if set.is_empty() {
                self.cells.remove(&cell);
            }
        }
    }

    fn reindex(&mut self, group: usize, old: Option<CellIndex>, new: Option<CellIndex>) {
        if old != new {
            self.remove(old, group);
            self.insert(new, group);
        }
    }

    /// Candidate group ids near `cell`, or `None` when pruning is off.
    fn candidates(&self, cell: Option<CellIndex>) -> Option<Vec<usize>> {
        let cell = cell?;
        let mut found: Vec<usize> = cell
            .grid_disk_safe(self.ring)
            .filter_map(|c| self.cells.get(&c))
            .flat_map(|set| set.iter().copied())
            .collect();
        found.sort_unstable();
        Some(found)
    }
}

// ============================================================================
// CLUSTER ENGINE
// ============================================================================

/// Builds cluster trees from visible sets.
#[derive(Debug, Clone)]
pub struct ClusterEngine {
    config: ClusterConfig,
    enabled: bool,
}

impl Default for ClusterEngine {
    fn default() -> Self {
        Self::new(ClusterConfig::default())
    }
}

impl ClusterEngine {
    pub fn new(config: ClusterConfig) -> Self {
        Self {
            config,
            enabled: true,
        }
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    /// Operator toggle; when off every point is a top-level leaf.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Recomputes the tree for the visible set at `zoom`.
    pub fn recluster(&self, visible: &VisibleSet, zoom: u8) -> ClusterTree {
        let leaves: Vec<Leaf> = visible
            .indices()
            .iter()
            .filter_map(|&i| {
                let entity = visible.snapshot().get(i)?;
                if !entity.is_mappable() {
                    return None;
                }
                Some(Leaf {
                    snapshot_index: i,
                    position: entity.position?,
                    entity: entity.clone(),
                })
            })
            .collect();

        self.recluster_leaves(leaves, zoom)
    }

    fn recluster_leaves(&self, leaves: Vec<Leaf>, zoom: u8) -> ClusterTree {
        let policy = ClusterPolicy::for_zoom(zoom);
        if leaves.is_empty() {
            return ClusterTree::empty(zoom);
        }

        let bounds = bounds_of(leaves.iter().map(|l| l.position));
        let member_count = leaves.len();
        let clustered = self.enabled && policy.clusters_at(zoom);

        let nodes = if clustered {
            let groups = self.group(&leaves, zoom, policy);
            assemble(leaves, groups)
        } else {
            leaves.into_iter().map(ClusterNode::Leaf).collect()
        };

        let tree = ClusterTree {
            zoom,
            policy,
            clustered,
            nodes,
            bounds,
            member_count,
        };
        debug!(
            zoom,
            members = tree.member_count,
            nodes = tree.nodes.len(),
            clusters = tree.cluster_count(),
            clustered,
            "Reclustered"
        );
        tree
    }

    fn group(&self, leaves: &[Leaf], zoom: u8, policy: ClusterPolicy) -> Vec<Group> {
        let zoom_f = f64::from(zoom);
        let radius = f64::from(policy.radius_px);
        let radius_m = radius * projection::meters_per_pixel(zoom_f);
        let mut index = GroupIndex::new(radius_m, self.config.candidate_ring);
        let mut groups: Vec<Group> = Vec::new();

        for (member, leaf) in leaves.iter().enumerate() {
            let px = projection::project(leaf.position, zoom_f);
            let cell = index.cell_of(leaf.position);
            let candidates = index.candidates(cell);

            let nearest = |want_multi: bool| -> Option<usize> {
                let mut best: Option<(usize, f64)> = None;
                let mut consider = |g: usize| {
                    let group = &groups[g];
                    if (group.members.len() > 1) != want_multi {
                        return;
                    }
                    let d = projection::pixel_distance(&group.centroid_px, &px);
                    if d > radius {
                        return;
                    }
                    // Candidates are visited in ascending id order
                    if best.map_or(true, |(_, bd)| d < bd) {
                        best = Some((g, d));
                    }
                };
                match &candidates {
                    Some(ids) => ids.iter().copied().for_each(&mut consider),
                    None => (0..groups.len()).for_each(&mut consider),
                }
                best.map(|(g, _)| g)
            };

            let target = nearest(true).or_else(|| nearest(false));

            match target {
                Some(g) => {
                    let old_cell = groups[g].cell;
                    groups[g].add(member, px);
                    let centroid = projection::unproject(groups[g].centroid_px, zoom_f);
                    let new_cell = index.cell_of(centroid).or(old_cell);
                    groups[g].cell = new_cell;
                    index.reindex(g, old_cell, new_cell);
                }
                None => {
                    let g = groups.len();
                    groups.push(Group::single(member, px, cell));
                    index.insert(cell, g);
                }
            }
        }

        groups
    }
}

/// Turns groups into nodes, ordered by each group's first member.
fn assemble(leaves: Vec<Leaf>, groups: Vec<Group>) -> Vec<ClusterNode> {
    let mut slots: Vec<Option<Leaf>> = leaves.into_iter().map(Some).collect();
    let mut ordered: Vec<Group> = groups;
    ordered.sort_by_key(|g| g.members[0]);

    ordered
        .into_iter()
        .filter_map(|group| {
            let members: Vec<Leaf> = group
                .members
                .iter()
                .filter_map(|&m| slots.get_mut(m).and_then(Option::take))
                .collect();

            match members.len() {
                0 => None,
                1 => members.into_iter().next().map(ClusterNode::Leaf),
                _ => {
                    let points: MultiPoint<f64> = members
                        .iter()
                        .map(|l| Point::from(l.position.to_coord()))
                        .collect();
                    let centroid = points.centroid()?;
                    let bounds = points.bounding_rect()?;
                    Some(ClusterNode::Cluster(Cluster {
                        badge: ClusterBadge::for_count(members.len()),
                        centroid: Position::from_coord(centroid.0),
                        bounds: LatLngBounds::from_rect(bounds),
                        members,
                    }))
                }
            }
        })
        .collect()
}

fn bounds_of(positions: impl Iterator<Item = Position>) -> Option<LatLngBounds> {
    let points: MultiPoint<f64> = positions.map(|p| Point::from(p.to_coord())).collect();
    points.bounding_rect().map(LatLngBounds::from_rect)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Snapshot;
    use approx::assert_relative_eq;
    use proptest::prelude::*;
    use std::sync::Arc;

    fn entity(id: &str, line: &str, lat: f64, lon: f64) -> Entity {
        Entity {
            id: Some(id.to_string()),
            line: Some(line.to_string()),
            position: Position::new(lat, lon),
            speed: 0.0,
            last_seen: None,
        }
    }

    fn visible(entities: Vec<Entity>) -> VisibleSet {
        VisibleSet::all(Arc::new(Snapshot::from_entities(1, entities)))
    }

    /// Reference grouping without spatial pruning.
    fn brute_force(visible: &VisibleSet, zoom: u8) -> Vec<Vec<usize>> {
        let leaves: Vec<Leaf> = visible
            .indices()
            .iter()
            .filter_map(|&i| {
                let e = visible.snapshot().get(i)?;
                e.is_mappable().then(|| Leaf {
                    snapshot_index: i,
                    position: e.position.unwrap(),
                    entity: e.clone(),
                })
            })
            .collect();
        let policy = ClusterPolicy::for_zoom(zoom);
        let radius = f64::from(policy.radius_px);
        let zoom_f = f64::from(zoom);
        // Greedy pass over all groups, mirroring the engine rules
        let mut groups: Vec<Group> = Vec::new();
        for (member, leaf) in leaves.iter().enumerate() {
            let px = projection::project(leaf.position, zoom_f);
            let pick = |multi: bool| {
                groups
                    .iter()
                    .enumerate()
                    .filter(|(_, g)| (g.members.len() > 1) == multi)
                    .map(|(i, g)| (i, projection::pixel_distance(&g.centroid_px, &px)))
                    .filter(|(_, d)| *d <= radius)
                    .fold(None, |best: Option<(usize, f64)>, (i, d)| match best {
                        Some((_, bd)) if bd <= d => best,
                        _ => Some((i, d)),
                    })
                    .map(|(i, _)| i)
            };
            match pick(true).or_else(|| pick(false)) {
                Some(g) => groups[g].add(member, px),
                None => groups.push(Group::single(member, px, None)),
            }
        }
        assemble(leaves, groups)
            .iter()
            .map(|n| n.leaves().iter().map(|l| l.snapshot_index).collect())
            .collect()
    }

    #[test]
    fn test_policy_tiers_are_exact() {
        assert_eq!(
            ClusterPolicy::for_zoom(15),
            ClusterPolicy { radius_px: 40, disable_at_zoom: 15 }
        );
        assert_eq!(
            ClusterPolicy::for_zoom(17),
            ClusterPolicy { radius_px: 40, disable_at_zoom: 17 }
        );
        assert_eq!(
            ClusterPolicy::for_zoom(14),
            ClusterPolicy { radius_px: 60, disable_at_zoom: 16 }
        );
        assert_eq!(
            ClusterPolicy::for_zoom(12),
            ClusterPolicy { radius_px: 60, disable_at_zoom: 16 }
        );
        assert_eq!(
            ClusterPolicy::for_zoom(11),
            ClusterPolicy { radius_px: 80, disable_at_zoom: 14 }
        );
        assert_eq!(
            ClusterPolicy::for_zoom(0),
            ClusterPolicy { radius_px: 80, disable_at_zoom: 14 }
        );
    }

    #[test]
    fn test_badge_thresholds() {
        assert_eq!(ClusterBadge::for_count(2), ClusterBadge::Small);
        assert_eq!(ClusterBadge::for_count(10), ClusterBadge::Small);
        assert_eq!(ClusterBadge::for_count(11), ClusterBadge::Medium);
        assert_eq!(ClusterBadge::for_count(100), ClusterBadge::Medium);
        assert_eq!(ClusterBadge::for_count(101), ClusterBadge::Large);
    }

    #[test]
    fn test_empty_input_yields_empty_tree() {
        let engine = ClusterEngine::default();
        let tree = engine.recluster(&VisibleSet::empty(), 12);
        assert!(tree.is_empty());
        assert!(tree.bounds.is_none());
        assert_eq!(tree.member_count, 0);
    }

    #[test]
    fn test_nearby_points_cluster_distant_points_do_not() {
        let engine = ClusterEngine::default();
        let set = visible(vec![
            entity("a", "101", -22.9000, -43.2000),
            entity("b", "101", -22.9005, -43.2005),
            entity("c", "232", -22.9010, -43.2000),
            entity("far", "999", -23.5500, -46.6300),
        ]);

        let tree = engine.recluster(&set, 12);
        assert!(tree.clustered);
        assert_eq!(tree.member_count, 4);
        assert_eq!(tree.partition(), vec![vec![0, 1, 2], vec![3]]);

        let (_, cluster) = tree.clusters().next().unwrap();
        assert_eq!(cluster.badge, ClusterBadge::Small);
        assert_relative_eq!(cluster.centroid.lat, -22.9005, epsilon = 1e-9);
        assert_eq!(tree.individual_points().count(), 1);
    }

    #[test]
    fn test_high_zoom_disables_clustering() {
        let engine = ClusterEngine::default();
        let set = visible(vec![
            entity("a", "1", -22.9000, -43.2000),
            entity("b", "1", -22.9000, -43.2000),
        ]);

        for zoom in [15u8, 16, 18] {
            let tree = engine.recluster(&set, zoom);
            assert!(!tree.clustered, "zoom {}", zoom);
            assert_eq!(tree.nodes.len(), 2);
        }
        // 14 still clusters (threshold 16)
        assert_eq!(engine.recluster(&set, 14).nodes.len(), 1);
    }

    #[test]
    fn test_toggle_off_makes_every_point_a_leaf() {
        let mut engine = ClusterEngine::default();
        engine.set_enabled(false);
        let set = visible(vec![
            entity("a", "1", -22.9, -43.2),
            entity("b", "1", -22.9, -43.2),
        ]);
        let tree = engine.recluster(&set, 10);
        assert!(!tree.clustered);
        assert_eq!(tree.cluster_count(), 0);
        assert_eq!(tree.individual_points().count(), 2);
    }

    #[test]
    fn test_unpositioned_and_unidentified_are_excluded() {
        let engine = ClusterEngine::default();
        let mut anonymous = entity("x", "1", -22.9, -43.2);
        anonymous.id = None;
        let mut lost = entity("lost", "1", 0.0, 0.0);
        lost.position = None;

        let set = visible(vec![entity("a", "1", -22.9, -43.2), anonymous, lost]);
        let tree = engine.recluster(&set, 12);

        assert_eq!(tree.member_count, 1);
        assert_eq!(tree.partition(), vec![vec![0]]);
    }

    #[test]
    fn test_every_positioned_entity_in_exactly_one_node() {
        let engine = ClusterEngine::default();
        let entities: Vec<Entity> = (0..200)
            .map(|i| {
                let f = i as f64;
                entity(&format!("v{}", i), "1", -22.9 + (f * 0.37).sin() * 0.05, -43.2 + (f * 0.11).cos() * 0.05)
            })
            .collect();
        let set = visible(entities);
        let tree = engine.recluster(&set, 13);

        let mut seen: Vec<usize> = tree.partition().into_iter().flatten().collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..200).collect::<Vec<_>>());
    }

    #[test]
    fn test_summary_truncates_at_limit() {
        let engine = ClusterEngine::default();
        let entities: Vec<Entity> = (0..25)
            .map(|i| {
                let line = if i % 2 == 0 { "101" } else { "232" };
                entity(&format!("v{:02}", i), line, -22.9, -43.2)
            })
            .collect();
        let tree = engine.recluster(&visible(entities), 10);

        let summary = tree.summary(0, 20).unwrap();
        assert_eq!(summary.total, 25);
        assert_eq!(summary.members.len(), 20);
        assert!(summary.truncated);
        assert_eq!(summary.members[0].id, "v00");
        assert_eq!(summary.lines, vec!["101", "232"]);
        assert_eq!(summary.lines_label(), "101, 232");
    }

    #[test]
    fn test_summary_of_leaf_is_none() {
        let engine = ClusterEngine::default();
        let tree = engine.recluster(&visible(vec![entity("a", "1", -22.9, -43.2)]), 12);
        assert!(tree.summary(0, 20).is_none());
        assert!(tree.summary(7, 20).is_none());
    }

    #[test]
    fn test_recluster_is_deterministic() {
        let engine = ClusterEngine::default();
        let entities: Vec<Entity> = (0..150)
            .map(|i| {
                let f = i as f64;
                entity(&format!("v{}", i), "1", -22.9 + (f * 1.3).sin() * 0.2, -43.2 + (f * 0.7).cos() * 0.2)
            })
            .collect();
        let set = visible(entities);
        for zoom in [8u8, 11, 12, 13] {
            assert_eq!(engine.recluster(&set, zoom), engine.recluster(&set, zoom));
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        /// Spatial pruning never changes the grouping.
        #[test]
        fn test_pruned_grouping_matches_brute_force(
            coords in prop::collection::vec((-0.3f64..0.3, -0.3f64..0.3), 1..80),
            zoom in 6u8..14,
        ) {
            let engine = ClusterEngine::default();
            let entities: Vec<Entity> = coords
                .iter()
                .enumerate()
                .map(|(i, (dlat, dlon))| entity(&format!("v{}", i), "1", -22.9 + dlat, -43.2 + dlon))
                .collect();
            let set = visible(entities);

            let tree = engine.recluster(&set, zoom);
            prop_assert_eq!(tree.partition(), brute_force(&set, zoom));
        }
    }
}
