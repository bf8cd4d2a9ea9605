//! Quadtree spatial index over particle hit boxes.
//!
//! Each node holds up to `capacity` entries. Once full it subdivides (once)
//! into four equal quadrants in NE, NW, SE, SW order, and later entries
//! descend into the first quadrant whose boundary contains them. Entries that
//! straddle quadrant lines stay in the parent. Every entry lives in exactly
//! one node.
//!
//! Particles move every frame, so the index is rebuilt wholesale rather than
//! maintained incrementally.

use ciallo_common::Rect;

/// Entries per node before subdividing.
pub const DEFAULT_NODE_CAPACITY: usize = 4;

/// Maximum subdivision depth.
pub const DEFAULT_MAX_DEPTH: usize = 10;

/// Statistics about a spatial index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexStats {
    /// Total number of nodes in the tree.
    pub node_count: usize,
    /// Total number of entries stored.
    pub entry_count: usize,
    /// Maximum depth of the tree.
    pub max_depth: usize,
    /// Number of leaf nodes.
    pub leaf_count: usize,
}

/// Quadtree node.
pub struct SpatialIndex<T> {
    /// Region covered by this node.
    boundary: Rect,
    /// Entries held before subdividing.
    capacity: usize,
    /// Maximum tree depth.
    max_depth: usize,
    /// Current depth (0 = root).
    depth: usize,
    /// Entries stored in this node.
    entries: Vec<(Rect, T)>,
    /// Child nodes (NE, NW, SE, SW).
    children: Option<Box<[SpatialIndex<T>; 4]>>,
}

impl<T> SpatialIndex<T> {
    /// Creates an empty index covering `boundary`.
    #[must_use]
    pub fn new(boundary: Rect, capacity: usize) -> Self {
        Self::with_depth(boundary, capacity.max(1), DEFAULT_MAX_DEPTH, 0)
    }

    fn with_depth(boundary: Rect, capacity: usize, max_depth: usize, depth: usize) -> Self {
        Self {
            boundary,
            capacity,
            max_depth,
            depth,
            entries: Vec::new(),
            children: None,
        }
    }

    /// Region covered by this node.
    #[must_use]
    pub const fn boundary(&self) -> &Rect {
        &self.boundary
    }

    /// Inserts an entry.
    ///
    /// Returns `false` if `rect` is not inside the boundary.
    pub fn insert(&mut self, rect: Rect, value: T) -> bool {
        if !self.boundary.contains(&rect) {
            return false;
        }

        if self.children.is_none() {
            if self.entries.len() < self.capacity || self.depth >= self.max_depth {
                self.entries.push((rect, value));
                return true;
            }
            self.subdivide();
        }

        if let Some(children) = &mut self.children {
            if let Some(child) = children.iter_mut().find(|c| c.boundary.contains(&rect)) {
                return child.insert(rect, value);
            }
        }

        // Straddles a quadrant line
        self.entries.push((rect, value));
        true
    }

    /// Splits this node into four equal quadrants.
    fn subdivide(&mut self) {
        let half_w = self.boundary.width / 2.0;
        let half_h = self.boundary.height / 2.0;
        let x = self.boundary.x;
        let y = self.boundary.y;
        let (capacity, max_depth, depth) = (self.capacity, self.max_depth, self.depth + 1);
        let child = |bx: f32, by: f32| {
            Self::with_depth(Rect::new(bx, by, half_w, half_h), capacity, max_depth, depth)
        };

        self.children = Some(Box::new([
            // NE
            child(x + half_w, y),
            // NW
            child(x, y),
            // SE
            child(x + half_w, y + half_h),
            // SW
            child(x, y + half_h),
        ]));
    }

    /// Returns every entry whose rect intersects `range`.
    #[must_use]
    pub fn query(&self, range: Rect) -> Vec<&T> {
        let mut result = Vec::new();
        self.query_internal(&range, &mut result);
        result
    }

    fn query_internal<'a>(&'a self, range: &Rect, result: &mut Vec<&'a T>) {
        if !self.boundary.intersects(range) {
            return;
        }

        for (rect, value) in &self.entries {
            if rect.intersects(range) {
                result.push(value);
            }
        }

        if let Some(children) = &self.children {
            for child in children.iter() {
                child.query_internal(range, result);
            }
        }
    }

    /// Removes the first entry stored with exactly `rect`.
    pub fn delete(&mut self, rect: &Rect) -> bool {
        self.delete_where(rect, |_| true)
    }

    fn delete_where<F>(&mut self, rect: &Rect, matches: F) -> bool
    where
        F: Fn(&T) -> bool + Copy,
    {
        if !self.boundary.contains(rect) {
            return false;
        }

        if let Some(pos) = self.entries.iter().position(|(r, v)| r == rect && matches(v)) {
            self.entries.remove(pos);
            return true;
        }

        match &mut self.children {
            Some(children) => children.iter_mut().any(|c| c.delete_where(rect, matches)),
            None => false,
        }
    }

    /// Total entries in this node and all descendants.
    #[must_use]
    pub fn total_len(&self) -> usize {
        let below: usize = self
            .children
            .as_ref()
            .map_or(0, |children| children.iter().map(SpatialIndex::total_len).sum());
        self.entries.len() + below
    }

    /// Returns true if the index holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total_len() == 0
    }

    /// Returns true if this node has subdivided.
    #[must_use]
    pub fn has_children(&self) -> bool {
        self.children.is_some()
    }

    /// Removes every entry and collapses the tree.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.children = None;
    }

    /// Returns statistics about the tree.
    #[must_use]
    pub fn stats(&self) -> IndexStats {
        let mut stats = IndexStats::default();
        self.collect_stats(&mut stats);
        stats
    }

    fn collect_stats(&self, stats: &mut IndexStats) {
        stats.node_count += 1;
        stats.entry_count += self.entries.len();
        stats.max_depth = stats.max_depth.max(self.depth);

        if let Some(children) = &self.children {
            for child in children.iter() {
                child.collect_stats(stats);
            }
        } else {
            stats.leaf_count += 1;
        }
    }
}

impl<T: PartialEq> SpatialIndex<T> {
    /// Removes the entry stored with exactly `rect` and `value`.
    pub fn delete_entry(&mut self, rect: &Rect, value: &T) -> bool {
        self.delete_where(rect, |v| v == value)
    }
}

impl<T> std::fmt::Debug for SpatialIndex<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpatialIndex")
            .field("boundary", &self.boundary)
            .field("depth", &self.depth)
            .field("entries", &self.entries.len())
            .field("has_children", &self.children.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> SpatialIndex<u32> {
        SpatialIndex::new(Rect::new(0.0, 0.0, 1000.0, 1000.0), DEFAULT_NODE_CAPACITY)
    }

    #[test]
    fn test_insert_outside_boundary() {
        let mut tree = SpatialIndex::new(Rect::new(0.0, 0.0, 100.0, 100.0), 4);
        assert!(!tree.insert(Rect::new(200.0, 200.0, 10.0, 10.0), "outside"));
        assert!(!tree.insert(Rect::new(95.0, 95.0, 10.0, 10.0), "straddles edge"));
        assert!(tree.is_empty());
    }

    #[test]
    fn test_subdivides_after_capacity() {
        let mut tree = tree();
        for i in 0..4 {
            tree.insert(Rect::new(10.0 + i as f32 * 20.0, 10.0, 5.0, 5.0), i);
        }
        assert!(!tree.has_children());

        tree.insert(Rect::new(10.0, 10.0, 5.0, 5.0), 4);
        assert!(tree.has_children());
        assert_eq!(tree.total_len(), 5);
        assert_eq!(tree.entries.len(), 4);
    }

    #[test]
    fn test_child_boundaries_quarter_parent() {
        let mut tree = tree();
        for i in 0..5 {
            tree.insert(Rect::new(1.0, 1.0, 1.0, 1.0), i);
        }
        let children = tree.children.as_ref().expect("subdivided");
        let expected = [
            Rect::new(500.0, 0.0, 500.0, 500.0),
            Rect::new(0.0, 0.0, 500.0, 500.0),
            Rect::new(500.0, 500.0, 500.0, 500.0),
            Rect::new(0.0, 500.0, 500.0, 500.0),
        ];
        for (child, rect) in children.iter().zip(expected) {
            assert_eq!(*child.boundary(), rect);
        }
        // The fifth entry lands in NW, the first quadrant containing it
        assert_eq!(children[1].total_len(), 1);
    }

    #[test]
    fn test_straddling_entry_stays_in_parent() {
        let mut tree = tree();
        for i in 0..4 {
            tree.insert(Rect::new(10.0, 10.0, 5.0, 5.0), i);
        }
        tree.insert(Rect::new(450.0, 450.0, 100.0, 100.0), 99);
        assert!(tree.has_children());
        assert_eq!(tree.entries.len(), 5);

        let found = tree.query(Rect::point(500.0, 500.0));
        assert_eq!(found, vec![&99]);
    }

    #[test]
    fn test_query_only_matching() {
        let mut tree = tree();
        tree.insert(Rect::new(100.0, 100.0, 10.0, 10.0), 1);
        tree.insert(Rect::new(500.0, 500.0, 10.0, 10.0), 2);
        tree.insert(Rect::new(900.0, 900.0, 10.0, 10.0), 3);

        assert_eq!(tree.query(Rect::new(0.0, 0.0, 200.0, 200.0)), vec![&1]);
        assert_eq!(tree.query(Rect::new(0.0, 0.0, 1000.0, 1000.0)).len(), 3);
        assert!(tree.query(Rect::new(300.0, 300.0, 10.0, 10.0)).is_empty());
    }

    #[test]
    fn test_query_finds_deep_entries() {
        let mut tree = tree();
        for i in 0..200u32 {
            let x = (i % 20) as f32 * 50.0;
            let y = (i / 20) as f32 * 100.0;
            assert!(tree.insert(Rect::new(x, y, 10.0, 10.0), i));
        }
        let stats = tree.stats();
        assert_eq!(stats.entry_count, 200);
        assert!(stats.max_depth > 1);

        for i in 0..200u32 {
            let x = (i % 20) as f32 * 50.0 + 5.0;
            let y = (i / 20) as f32 * 100.0 + 5.0;
            assert_eq!(tree.query(Rect::point(x, y)), vec![&i]);
        }
    }

    #[test]
    fn test_delete() {
        let mut tree = tree();
        let a = Rect::new(100.0, 100.0, 10.0, 10.0);
        let b = Rect::new(700.0, 700.0, 10.0, 10.0);
        for i in 0..6 {
            tree.insert(a, i);
        }
        tree.insert(b, 42);

        assert!(tree.delete_entry(&b, &42));
        assert!(!tree.delete_entry(&b, &42));
        assert!(tree.delete(&a));
        assert_eq!(tree.total_len(), 5);
        assert!(!tree.delete(&Rect::new(5000.0, 0.0, 1.0, 1.0)));
    }

    #[test]
    fn test_identical_entries_stop_at_max_depth() {
        let mut tree = tree();
        for i in 0..100 {
            assert!(tree.insert(Rect::new(10.0, 10.0, 1.0, 1.0), i));
        }
        let stats = tree.stats();
        assert_eq!(stats.entry_count, 100);
        assert!(stats.max_depth <= DEFAULT_MAX_DEPTH);
    }

    #[test]
    fn test_clear() {
        let mut tree = tree();
        for i in 0..10 {
            tree.insert(Rect::new(i as f32 * 50.0, i as f32 * 50.0, 10.0, 10.0), i);
        }
        tree.clear();
        assert!(tree.is_empty());
        assert!(!tree.has_children());
    }
}
