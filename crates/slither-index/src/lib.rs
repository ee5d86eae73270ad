//! Toroidal spatial indexing for arena entities.
//!
//! The arena is a torus: both axes wrap, so a region query near an edge must
//! enumerate buckets wrapped to the far edge. The index stores whole entries
//! in uniform-grid buckets with a cell side of one world unit; region queries
//! return a superset of the requested disk and callers re-test with unwrapped
//! squared distances.

use thiserror::Error;

/// Errors emitted by the spatial map.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Indicates configuration values that cannot be used (e.g., non-positive world size).
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

/// Implemented by anything the map can bucket by position.
pub trait SpatialItem {
    /// World-space position of the item. Canonicalised on insertion.
    fn position(&self) -> (f32, f32);
}

/// Uniform-grid bucket index over a toroidal world.
///
/// Cell side is one world unit, so the grid is `ceil(width) x ceil(height)`
/// cells. Buckets are dense: every cell owns a `Vec` reserved to
/// `reserve_per_cell`, which keeps insertion allocation-free in the common
/// case. Element order within a cell is insertion order but callers must not
/// rely on it.
#[derive(Debug, Clone)]
pub struct SpatialMap<T> {
    width: f32,
    height: f32,
    cells_x: i32,
    cells_y: i32,
    buckets: Vec<Vec<T>>,
    len: usize,
}

// Keep the grid addressable with i32 cell mathematics.
const MAX_CELLS_PER_AXIS: f32 = 1_048_576.0;

// Buckets are dense; refuse worlds whose grid would not fit in memory.
const MAX_TOTAL_CELLS: usize = 16_777_216;

impl<T: SpatialItem> SpatialMap<T> {
    /// Create a map covering a `width x height` torus.
    pub fn new(width: f32, height: f32, reserve_per_cell: usize) -> Result<Self, IndexError> {
        if !width.is_finite() || !height.is_finite() || width <= 0.0 || height <= 0.0 {
            return Err(IndexError::InvalidConfig(
                "world dimensions must be positive and finite",
            ));
        }
        let cells_x = Self::cells_for_dimension(width)?;
        let cells_y = Self::cells_for_dimension(height)?;
        let cell_count = (cells_x as usize) * (cells_y as usize);
        if cell_count > MAX_TOTAL_CELLS {
            return Err(IndexError::InvalidConfig("world dimension too large"));
        }
        let buckets = (0..cell_count)
            .map(|_| Vec::with_capacity(reserve_per_cell))
            .collect();
        Ok(Self {
            width,
            height,
            cells_x,
            cells_y,
            buckets,
            len: 0,
        })
    }

    #[allow(clippy::cast_possible_truncation)]
    fn cells_for_dimension(dimension: f32) -> Result<i32, IndexError> {
        let raw = dimension.ceil().max(1.0);
        if raw > MAX_CELLS_PER_AXIS {
            return Err(IndexError::InvalidConfig("world dimension too large"));
        }
        Ok(raw as i32)
    }

    /// Number of stored elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true when no elements are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Grid extent in cells, `(columns, rows)`.
    #[must_use]
    pub const fn cell_counts(&self) -> (i32, i32) {
        (self.cells_x, self.cells_y)
    }

    #[inline]
    const fn wrap_cell(value: i32, max: i32) -> i32 {
        ((value % max) + max) % max
    }

    #[inline]
    #[allow(clippy::cast_possible_truncation)]
    fn cell_from_point(&self, x: f32, y: f32) -> (i32, i32) {
        // rem_euclid canonicalises arbitrary inputs; the extra wrap guards the
        // float edge case where a tiny negative rounds up to the full extent.
        let cx = Self::wrap_cell(x.rem_euclid(self.width).floor() as i32, self.cells_x);
        let cy = Self::wrap_cell(y.rem_euclid(self.height).floor() as i32, self.cells_y);
        (cx, cy)
    }

    #[inline]
    #[allow(clippy::cast_sign_loss)]
    const fn bucket_index(&self, cx: i32, cy: i32) -> usize {
        // wrap_cell guarantees 0 <= cx < cells_x and 0 <= cy < cells_y
        (cy as usize) * (self.cells_x as usize) + (cx as usize)
    }

    /// Insert an element into the bucket of its (canonicalised) position.
    pub fn insert(&mut self, item: T) {
        let (x, y) = item.position();
        let (cx, cy) = self.cell_from_point(x, y);
        let index = self.bucket_index(cx, cy);
        self.buckets[index].push(item);
        self.len += 1;
    }

    /// Discard all entries, retaining bucket capacity.
    pub fn clear(&mut self) {
        for bucket in &mut self.buckets {
            bucket.clear();
        }
        self.len = 0;
    }

    /// Remove every element matching the predicate, returning how many were removed.
    pub fn erase_if(&mut self, mut pred: impl FnMut(&T) -> bool) -> usize {
        let before = self.len;
        let mut remaining = 0;
        for bucket in &mut self.buckets {
            bucket.retain(|item| !pred(item));
            remaining += bucket.len();
        }
        self.len = remaining;
        before - remaining
    }

    /// Iterate over all stored elements in bucket-major order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.buckets.iter().flat_map(|bucket| bucket.iter())
    }

    /// Visit every stored element mutably.
    pub fn for_each_mut(&mut self, mut visitor: impl FnMut(&mut T)) {
        for bucket in &mut self.buckets {
            for item in bucket {
                visitor(item);
            }
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn region_span(&self, center: (f32, f32), radius: f32) -> Option<(i32, i32, i32, i32)> {
        if !(radius >= 0.0) || !center.0.is_finite() || !center.1.is_finite() {
            return None;
        }
        let (cx, cy) = self.cell_from_point(center.0, center.1);
        let cell_radius = radius.ceil().min(MAX_CELLS_PER_AXIS) as i32;
        // Clamp the span to the grid extent so a disk wider than the world
        // never enumerates the same bucket twice.
        let span_x = (2 * cell_radius + 1).min(self.cells_x);
        let span_y = (2 * cell_radius + 1).min(self.cells_y);
        Some((cx - cell_radius, cy - cell_radius, span_x, span_y))
    }

    /// Visit every element whose cell overlaps the disk of `radius` around
    /// `center`, wrapping around the torus. The visited set is a superset of
    /// the disk; callers must re-test distances after unwrapping.
    pub fn for_each_in_region(&self, center: (f32, f32), radius: f32, mut visitor: impl FnMut(&T)) {
        let Some((start_x, start_y, span_x, span_y)) = self.region_span(center, radius) else {
            return;
        };
        for dy in 0..span_y {
            let cy = Self::wrap_cell(start_y + dy, self.cells_y);
            for dx in 0..span_x {
                let cx = Self::wrap_cell(start_x + dx, self.cells_x);
                for item in &self.buckets[self.bucket_index(cx, cy)] {
                    visitor(item);
                }
            }
        }
    }

    /// Mutable counterpart of [`Self::for_each_in_region`].
    pub fn for_each_in_region_mut(
        &mut self,
        center: (f32, f32),
        radius: f32,
        mut visitor: impl FnMut(&mut T),
    ) {
        let Some((start_x, start_y, span_x, span_y)) = self.region_span(center, radius) else {
            return;
        };
        for dy in 0..span_y {
            let cy = Self::wrap_cell(start_y + dy, self.cells_y);
            for dx in 0..span_x {
                let cx = Self::wrap_cell(start_x + dx, self.cells_x);
                let index = self.bucket_index(cx, cy);
                for item in &mut self.buckets[index] {
                    visitor(item);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Marker {
        x: f32,
        y: f32,
        tag: u32,
    }

    impl SpatialItem for Marker {
        fn position(&self) -> (f32, f32) {
            (self.x, self.y)
        }
    }

    fn marker(x: f32, y: f32, tag: u32) -> Marker {
        Marker { x, y, tag }
    }

    fn collect_region(map: &SpatialMap<Marker>, center: (f32, f32), radius: f32) -> Vec<u32> {
        let mut tags = Vec::new();
        map.for_each_in_region(center, radius, |item| tags.push(item.tag));
        tags.sort_unstable();
        tags
    }

    #[test]
    fn rejects_bad_dimensions() {
        assert!(SpatialMap::<Marker>::new(0.0, 10.0, 4).is_err());
        assert!(SpatialMap::<Marker>::new(10.0, -1.0, 4).is_err());
        assert!(SpatialMap::<Marker>::new(f32::NAN, 10.0, 4).is_err());
    }

    #[test]
    fn insert_and_query() {
        let mut map = SpatialMap::new(60.0, 60.0, 4).expect("map");
        map.insert(marker(10.2, 20.7, 1));
        map.insert(marker(40.0, 40.0, 2));
        assert_eq!(map.len(), 2);

        assert_eq!(collect_region(&map, (10.0, 20.0), 2.0), vec![1]);
        assert_eq!(collect_region(&map, (30.0, 30.0), 60.0), vec![1, 2]);
    }

    #[test]
    fn canonicalises_positions_on_insert() {
        let mut map = SpatialMap::new(60.0, 60.0, 4).expect("map");
        map.insert(marker(-0.5, 65.0, 7));
        // -0.5 wraps to 59.5, 65.0 wraps to 5.0
        assert_eq!(collect_region(&map, (59.5, 5.0), 1.0), vec![7]);
    }

    #[test]
    fn region_wraps_around_the_seam() {
        let mut map = SpatialMap::new(60.0, 60.0, 4).expect("map");
        map.insert(marker(59.5, 30.0, 1));
        map.insert(marker(0.5, 30.0, 2));
        map.insert(marker(30.0, 0.2, 3));

        assert_eq!(collect_region(&map, (0.0, 30.0), 2.0), vec![1, 2]);
        assert_eq!(collect_region(&map, (59.8, 30.0), 2.0), vec![1, 2]);
        assert_eq!(collect_region(&map, (30.0, 59.5), 2.0), vec![3]);
    }

    #[test]
    fn oversized_region_visits_each_bucket_once() {
        let mut map = SpatialMap::new(4.0, 4.0, 2).expect("map");
        for i in 0..8 {
            map.insert(marker(i as f32 * 0.5, (i % 4) as f32, i));
        }
        // A disk wider than the world must enumerate everything exactly once.
        let tags = collect_region(&map, (2.0, 2.0), 100.0);
        assert_eq!(tags, (0..8).collect::<Vec<_>>());
    }

    #[test]
    fn erase_if_removes_and_recounts() {
        let mut map = SpatialMap::new(20.0, 20.0, 4).expect("map");
        for i in 0..10 {
            map.insert(marker(i as f32, i as f32, i));
        }
        let removed = map.erase_if(|item| item.tag % 2 == 0);
        assert_eq!(removed, 5);
        assert_eq!(map.len(), 5);
        assert!(map.iter().all(|item| item.tag % 2 == 1));
    }

    #[test]
    fn clear_empties_the_map() {
        let mut map = SpatialMap::new(20.0, 20.0, 4).expect("map");
        map.insert(marker(1.0, 1.0, 1));
        map.clear();
        assert!(map.is_empty());
        assert!(collect_region(&map, (1.0, 1.0), 5.0).is_empty());
    }

    #[test]
    fn mutable_region_visit_can_mark_items() {
        let mut map = SpatialMap::new(20.0, 20.0, 4).expect("map");
        map.insert(marker(5.0, 5.0, 0));
        map.insert(marker(15.0, 15.0, 0));
        map.for_each_in_region_mut((5.0, 5.0), 1.5, |item| item.tag = 9);
        let tags: Vec<u32> = map.iter().map(|item| item.tag).collect();
        assert!(tags.contains(&9));
        assert!(tags.contains(&0));
    }
}
