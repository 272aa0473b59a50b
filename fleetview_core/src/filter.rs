//! Filtering, sorting and pagination of a snapshot.
//!
//! The engine is declarative: it holds a [`FilterSpec`] and an optional
//! [`SortSpec`], and [`FilterEngine::recompute`] derives a fresh
//! [`VisibleSet`] from any snapshot. Recomputing twice yields the same set.

use crate::entity::{Entity, Snapshot};
use crate::store::VisibleSet;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::ops::Range;
use std::sync::Arc;

// ============================================================================
// FILTER SPEC
// ============================================================================

/// Case-insensitive substring filters over line labels and identifiers.
///
/// Each list is an OR; the two lists are combined with AND. An empty list
/// matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSpec {
    /// Lowercased line-label substrings
    pub lines: Vec<String>,

    /// Lowercased identifier substrings
    pub ids: Vec<String>,
}

impl FilterSpec {
    pub fn new<L, I>(lines: L, ids: I) -> Self
    where
        L: IntoIterator,
        L::Item: AsRef<str>,
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        Self {
            lines: normalize_terms(lines),
            ids: normalize_terms(ids),
        }
    }

    /// Parses comma-separated operator input for both fields.
    pub fn parse(line_input: &str, id_input: &str) -> Self {
        Self::new(line_input.split(','), id_input.split(','))
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty() && self.ids.is_empty()
    }

    pub fn matches(&self, entity: &Entity) -> bool {
        matches_any(&self.lines, entity.line.as_deref())
            && matches_any(&self.ids, entity.id.as_deref())
    }
}

fn normalize_terms<T>(terms: T) -> Vec<String>
where
    T: IntoIterator,
    T::Item: AsRef<str>,
{
    terms
        .into_iter()
        .map(|t| t.as_ref().trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

fn matches_any(terms: &[String], value: Option<&str>) -> bool {
    if terms.is_empty() {
        return true;
    }
    match value {
        Some(value) => {
            let value = value.to_lowercase();
            terms.iter().any(|t| value.contains(t.as_str()))
        }
        None => false,
    }
}

// ============================================================================
// SORT SPEC
// ============================================================================

/// Sortable listing columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortColumn {
    Identifier,
    Line,
    Latitude,
    Longitude,
    Speed,
    LastSeen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn flipped(self) -> Self {
        match self {
            SortDirection::Ascending => SortDirection::Descending,
            SortDirection::Descending => SortDirection::Ascending,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub column: SortColumn,
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn ascending(column: SortColumn) -> Self {
        Self {
            column,
            direction: SortDirection::Ascending,
        }
    }

    /// Orders two entities. Missing values sort last in either direction.
    pub fn compare(&self, a: &Entity, b: &Entity) -> Ordering {
        let ordering = match self.column {
            SortColumn::Identifier => compare_present(a.id.as_ref(), b.id.as_ref(), Ord::cmp),
            SortColumn::Line => compare_present(a.line.as_ref(), b.line.as_ref(), Ord::cmp),
            SortColumn::Latitude => compare_present(
                a.position.map(|p| p.lat),
                b.position.map(|p| p.lat),
                f64::total_cmp,
            ),
            SortColumn::Longitude => compare_present(
                a.position.map(|p| p.lon),
                b.position.map(|p| p.lon),
                f64::total_cmp,
            ),
            SortColumn::Speed => Presence::Both(a.speed.total_cmp(&b.speed)),
            SortColumn::LastSeen => compare_present(a.last_seen, b.last_seen, Ord::cmp),
        };

        match ordering {
            Presence::Both(ord) => match self.direction {
                SortDirection::Ascending => ord,
                SortDirection::Descending => ord.reverse(),
            },
            Presence::Partial(ord) => ord,
        }
    }
}

enum Presence {
    /// Both values present: direction applies
    Both(Ordering),
    /// At least one missing: absent goes last regardless of direction
    Partial(Ordering),
}

fn compare_present<T, F>(a: Option<T>, b: Option<T>, cmp: F) -> Presence
where
    F: Fn(&T, &T) -> Ordering,
{
    match (a, b) {
        (Some(a), Some(b)) => Presence::Both(cmp(&a, &b)),
        (Some(_), None) => Presence::Partial(Ordering::Less),
        (None, Some(_)) => Presence::Partial(Ordering::Greater),
        (None, None) => Presence::Partial(Ordering::Equal),
    }
}

// ============================================================================
// PAGINATION
// ============================================================================

/// One page of a visible set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// 1-based page number; 0 when there are no pages
    pub number: usize,

    /// Total number of pages; 0 for an empty set
    pub page_count: usize,

    /// Indices into the visible set covered by this page
    pub range: Range<usize>,
}

impl Page {
    pub fn is_empty(&self) -> bool {
        self.page_count == 0
    }

    pub fn has_previous(&self) -> bool {
        self.number > 1
    }

    pub fn has_next(&self) -> bool {
        self.number < self.page_count
    }
}

/// Computes a clamped page window over `count` items.
///
/// `page_number` is clamped into `[1, page_count]`; a page size of 0 is
/// treated as 1. An empty set yields the "no pages" state.
pub fn page(count: usize, page_number: usize, page_size: usize) -> Page {
    let size = page_size.max(1);
    let page_count = count.div_ceil(size);

    if page_count == 0 {
        return Page {
            number: 0,
            page_count: 0,
            range: 0..0,
        };
    }

    let number = page_number.clamp(1, page_count);
    let start = (number - 1) * size;
    let end = (start + size).min(count);

    Page {
        number,
        page_count,
        range: start..end,
    }
}

/// Current-page cursor of the tabular listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pagination {
    pub page_size: usize,
    pub current: usize,
}

impl Pagination {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size,
            current: 1,
        }
    }

    pub fn reset(&mut self) {
        self.current = 1;
    }

    /// Resolves the cursor against the current visible count, clamping it.
    pub fn window(&mut self, count: usize) -> Page {
        let window = page(count, self.current, self.page_size);
        self.current = window.number.max(1);
        window
    }

    pub fn next(&mut self, count: usize) -> Page {
        self.current = self.current.saturating_add(1);
        self.window(count)
    }

    pub fn previous(&mut self, count: usize) -> Page {
        self.current = self.current.saturating_sub(1).max(1);
        self.window(count)
    }
}

// ============================================================================
// FILTER ENGINE
// ============================================================================

/// Derives visible sets from snapshots.
#[derive(Debug, Clone, Default)]
pub struct FilterEngine {
    filter: FilterSpec,
    sort: Option<SortSpec>,
}

impl FilterEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_filter(&mut self, filter: FilterSpec) {
        self.filter = filter;
    }

    pub fn filter(&self) -> &FilterSpec {
        &self.filter
    }

    /// Sets or clears the sort order. `None` keeps snapshot order.
    pub fn set_sort(&mut self, sort: Option<SortSpec>) {
        self.sort = sort;
    }

    pub fn sort(&self) -> Option<SortSpec> {
        self.sort
    }

    /// Sorting the current column again flips direction; a new column
    /// starts ascending.
    pub fn toggle_sort(&mut self, column: SortColumn) -> SortSpec {
        let next = match self.sort {
            Some(current) if current.column == column => SortSpec {
                column,
                direction: current.direction.flipped(),
            },
            _ => SortSpec::ascending(column),
        };
        self.sort = Some(next);
        next
    }

    /// Filters then stably sorts the snapshot.
    pub fn recompute(&self, snapshot: &Arc<Snapshot>) -> VisibleSet {
        let entities = snapshot.entities();
        let mut indices: Vec<usize> = entities
            .iter()
            .enumerate()
            .filter(|(_, e)| self.filter.matches(e))
            .map(|(i, _)| i)
            .collect();

        if let Some(sort) = self.sort {
            indices.sort_by(|&a, &b| sort.compare(&entities[a], &entities[b]));
        }

        VisibleSet::new(Arc::clone(snapshot), indices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Position;
    use chrono::NaiveDate;

    fn entity(id: &str, line: &str, speed: f64) -> Entity {
        Entity {
            id: Some(id.to_string()),
            line: Some(line.to_string()),
            position: Position::new(-22.9, -43.2),
            speed,
            last_seen: None,
        }
    }

    fn snapshot(entities: Vec<Entity>) -> Arc<Snapshot> {
        Arc::new(Snapshot::from_entities(1, entities))
    }

    fn ids(visible: &VisibleSet) -> Vec<String> {
        visible.iter().map(|e| e.id_or_placeholder().to_string()).collect()
    }

    #[test]
    fn test_line_filter_selects_matching_entities() {
        let snap = snapshot(vec![
            entity("A1", "101", 10.0),
            entity("A2", "232", 10.0),
            entity("A3", "101", 10.0),
        ]);
        let mut engine = FilterEngine::new();
        engine.set_filter(FilterSpec::new(["101"], Vec::<String>::new()));

        let visible = engine.recompute(&snap);
        assert_eq!(ids(&visible), vec!["A1", "A3"]);
    }

    #[test]
    fn test_filter_is_case_insensitive_substring() {
        let snap = snapshot(vec![entity("B27012", "SP-101", 0.0), entity("C1", "232", 0.0)]);
        let mut engine = FilterEngine::new();
        engine.set_filter(FilterSpec::parse(" sp ,, ", ""));
        assert_eq!(ids(&engine.recompute(&snap)), vec!["B27012"]);

        engine.set_filter(FilterSpec::parse("", "b27"));
        assert_eq!(ids(&engine.recompute(&snap)), vec!["B27012"]);
    }

    #[test]
    fn test_filter_lists_are_and_combined() {
        let snap = snapshot(vec![
            entity("A1", "101", 0.0),
            entity("B1", "101", 0.0),
            entity("A2", "232", 0.0),
        ]);
        let mut engine = FilterEngine::new();
        engine.set_filter(FilterSpec::parse("101, 999", "a"));
        assert_eq!(ids(&engine.recompute(&snap)), vec!["A1"]);
    }

    #[test]
    fn test_missing_line_fails_line_filter() {
        let mut no_line = entity("A1", "x", 0.0);
        no_line.line = None;
        let snap = snapshot(vec![no_line]);

        let mut engine = FilterEngine::new();
        assert_eq!(engine.recompute(&snap).len(), 1);

        engine.set_filter(FilterSpec::parse("x", ""));
        assert!(engine.recompute(&snap).is_empty());
    }

    #[test]
    fn test_recompute_is_idempotent() {
        let snap = snapshot(vec![
            entity("C", "1", 3.0),
            entity("A", "1", 1.0),
            entity("B", "2", 2.0),
        ]);
        let mut engine = FilterEngine::new();
        engine.toggle_sort(SortColumn::Speed);

        let first = engine.recompute(&snap);
        let second = engine.recompute(&snap);
        assert_eq!(first.indices(), second.indices());
        assert_eq!(ids(&first), vec!["A", "B", "C"]);
    }

    #[test]
    fn test_toggle_sort_flips_direction() {
        let snap = snapshot(vec![entity("B", "1", 0.0), entity("A", "1", 0.0)]);
        let mut engine = FilterEngine::new();

        let spec = engine.toggle_sort(SortColumn::Identifier);
        assert_eq!(spec.direction, SortDirection::Ascending);
        assert_eq!(ids(&engine.recompute(&snap)), vec!["A", "B"]);

        let spec = engine.toggle_sort(SortColumn::Identifier);
        assert_eq!(spec.direction, SortDirection::Descending);
        assert_eq!(ids(&engine.recompute(&snap)), vec!["B", "A"]);

        let spec = engine.toggle_sort(SortColumn::Line);
        assert_eq!(spec.direction, SortDirection::Ascending);
    }

    #[test]
    fn test_sort_is_stable() {
        let snap = snapshot(vec![
            entity("first", "1", 5.0),
            entity("second", "1", 5.0),
            entity("third", "1", 1.0),
        ]);
        let mut engine = FilterEngine::new();
        engine.set_sort(Some(SortSpec::ascending(SortColumn::Speed)));
        assert_eq!(ids(&engine.recompute(&snap)), vec!["third", "first", "second"]);
    }

    #[test]
    fn test_missing_values_sort_last_both_directions() {
        let stamp = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        let mut early = entity("early", "1", 0.0);
        early.last_seen = Some(stamp);
        let mut late = entity("late", "1", 0.0);
        late.last_seen = Some(stamp + chrono::Duration::minutes(5));
        let unknown = entity("unknown", "1", 0.0);

        let snap = snapshot(vec![unknown, late, early]);
        let mut engine = FilterEngine::new();

        engine.toggle_sort(SortColumn::LastSeen);
        assert_eq!(ids(&engine.recompute(&snap)), vec!["early", "late", "unknown"]);

        engine.toggle_sort(SortColumn::LastSeen);
        assert_eq!(ids(&engine.recompute(&snap)), vec!["late", "early", "unknown"]);
    }

    #[test]
    fn test_page_clamps_and_handles_empty() {
        let empty = page(0, 3, 50);
        assert_eq!(empty.number, 0);
        assert_eq!(empty.page_count, 0);
        assert_eq!(empty.range, 0..0);
        assert!(empty.is_empty());

        let p = page(120, 1, 50);
        assert_eq!((p.number, p.page_count, p.range.clone()), (1, 3, 0..50));

        let last = page(120, 99, 50);
        assert_eq!((last.number, last.range.clone()), (3, 100..120));
        assert!(!last.has_next());
        assert!(last.has_previous());

        let zeroth = page(120, 0, 50);
        assert_eq!(zeroth.number, 1);
    }

    #[test]
    fn test_page_size_zero_treated_as_one() {
        let p = page(3, 2, 0);
        assert_eq!(p.page_count, 3);
        assert_eq!(p.range, 1..2);
    }

    #[test]
    fn test_pagination_cursor() {
        let mut cursor = Pagination::new(10);
        assert_eq!(cursor.next(25).number, 2);
        assert_eq!(cursor.next(25).number, 3);
        assert_eq!(cursor.next(25).number, 3);
        assert_eq!(cursor.previous(25).number, 2);

        // Shrinking the set clamps the cursor
        assert_eq!(cursor.window(5).number, 1);
        cursor.reset();
        assert_eq!(cursor.current, 1);
    }

    proptest::proptest! {
        #[test]
        fn test_page_range_always_in_bounds(
            count in 0usize..500,
            number in 0usize..50,
            size in 0usize..80,
        ) {
            let p = page(count, number, size);
            proptest::prop_assert!(p.range.start <= p.range.end);
            proptest::prop_assert!(p.range.end <= count);
            if count > 0 {
                proptest::prop_assert!(p.number >= 1 && p.number <= p.page_count);
                proptest::prop_assert!(!p.range.is_empty());
            }
        }
    }
}
