//! R-tree point index over pixel coordinates

use crate::types::PixelCoord;
use rstar::{PointDistance, RTree, RTreeObject, AABB};
use std::fmt;

/// Point stored in the tree together with its position in the build list
#[derive(Debug, Clone, Copy)]
struct IndexedPoint {
    coord: PixelCoord,
    index: usize,
}

impl IndexedPoint {
    fn position(&self) -> [f64; 2] {
        [self.coord.row as f64, self.coord.col as f64]
    }
}

impl RTreeObject for IndexedPoint {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.position())
    }
}

impl PointDistance for IndexedPoint {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let [r, c] = self.position();
        let dr = r - point[0];
        let dc = c - point[1];
        dr * dr + dc * dc
    }
}

/// Neighbour returned by a point index query
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbour {
    /// Index into the point list the index was built from
    pub index: usize,
    pub coord: PixelCoord,
    /// Euclidean distance in pixels
    pub distance: f64,
}

/// Spatial index bulk-loaded once over a fixed point set
#[derive(Clone)]
pub struct PointIndex {
    points: Vec<PixelCoord>,
    tree: RTree<IndexedPoint>,
}

impl PointIndex {
    pub fn build(points: Vec<PixelCoord>) -> Self {
        let entries: Vec<IndexedPoint> = points
            .iter()
            .enumerate()
            .map(|(index, &coord)| IndexedPoint { coord, index })
            .collect();
        let tree = RTree::bulk_load(entries);
        log::debug!("Built R-tree over {} points", points.len());
        Self { points, tree }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[PixelCoord] {
        &self.points
    }

    /// The `k` nearest points to `query`, closest first
    ///
    /// Ties are broken by the point's index in the build list.
    pub fn nearest(&self, query: PixelCoord, k: usize) -> Vec<Neighbour> {
        self.nearest_within(query, k, f64::INFINITY)
    }

    /// The `k` nearest points no farther than `max_distance`
    pub fn nearest_within(&self, query: PixelCoord, k: usize, max_distance: f64) -> Vec<Neighbour> {
        if k == 0 {
            return Vec::new();
        }
        let max_sq = max_distance * max_distance;
        let target = [query.row as f64, query.col as f64];

        // Distances arrive in non-decreasing order; keep every point tied with the k-th
        let mut found: Vec<(f64, usize)> = Vec::with_capacity(k);
        for (entry, dist_sq) in self.tree.nearest_neighbor_iter_with_distance_2(&target) {
            if dist_sq > max_sq || (found.len() >= k && dist_sq > found[k - 1].0) {
                break;
            }
            found.push((dist_sq, entry.index));
        }
        found.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        found.truncate(k);

        found
            .into_iter()
            .map(|(dist_sq, index)| Neighbour {
                index,
                coord: self.points[index],
                distance: dist_sq.sqrt(),
            })
            .collect()
    }
}

impl fmt::Debug for PointIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PointIndex").field("points", &self.points.len()).finish()
    }
}
