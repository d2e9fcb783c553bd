//! Spatial clustering: merge nearby detections belonging to one
//! physical change event.
//!
//! A single crack or collapse often fragments into several disjoint
//! regions after masking; counting each fragment separately would
//! inflate the change count fed to risk assessment. Density-based
//! clustering over centroids fuses them: a detection with at least
//! `min_samples` neighbours (itself included) within `eps` seeds a
//! cluster, density-connected seeds merge, and everything else passes
//! through untouched as the noise label, kept individually.
//!
//! The output is always a partition of the input: every input detection
//! appears in exactly one output entry, never duplicated or dropped.

use rstar::RTree;
use rstar::primitives::GeomWithData;

use crate::config::DetectorConfig;
use crate::types::Detection;

type IndexedCentroid = GeomWithData<[f64; 2], usize>;

/// Cluster detections by centroid density.
///
/// Returns the input unchanged when fewer than two detections survive
/// region extraction.
#[must_use]
pub fn cluster_detections(detections: Vec<Detection>, config: &DetectorConfig) -> Vec<Detection> {
    if detections.len() < 2 {
        return detections;
    }

    let eps_sq = config.cluster_eps * config.cluster_eps;
    let tree = RTree::bulk_load(
        detections
            .iter()
            .enumerate()
            .map(|(i, d)| IndexedCentroid::new([d.centroid.x, d.centroid.y], i))
            .collect(),
    );

    // Neighbour sets include the query point itself.
    let neighbours: Vec<Vec<usize>> = detections
        .iter()
        .map(|d| {
            tree.locate_within_distance([d.centroid.x, d.centroid.y], eps_sq)
                .map(|p| p.data)
                .collect()
        })
        .collect();
    let core: Vec<bool> = neighbours
        .iter()
        .map(|n| n.len() >= config.cluster_min_samples)
        .collect();

    // Density-connect core detections with union-find.
    let mut forest = UnionFind::new(detections.len());
    for (i, neighbour_set) in neighbours.iter().enumerate() {
        if !core[i] {
            continue;
        }
        for &j in neighbour_set {
            if core[j] {
                forest.union(i, j);
            }
        }
    }

    // Gather cluster members, keyed by representative.
    let mut members: Vec<Vec<usize>> = vec![Vec::new(); detections.len()];
    for i in 0..detections.len() {
        if core[i] {
            members[forest.find(i)].push(i);
        }
    }

    // Emit in order of first appearance; non-core detections pass
    // through individually.
    let mut output = Vec::new();
    for (i, detection) in detections.iter().enumerate() {
        if !core[i] {
            output.push(detection.clone());
            continue;
        }
        let root = forest.find(i);
        let cluster = &members[root];
        if cluster.first() != Some(&i) {
            // Already emitted with its cluster.
            continue;
        }
        if cluster.len() == 1 {
            output.push(detection.clone());
        } else {
            output.push(merge(cluster.iter().map(|&j| &detections[j])));
        }
    }
    output
}

/// Fuse cluster members into one detection: union bounding box, summed
/// area, mean confidence.
fn merge<'a>(mut cluster: impl Iterator<Item = &'a Detection>) -> Detection {
    // Callers guarantee at least two members.
    let first = match cluster.next() {
        Some(d) => d.clone(),
        None => unreachable!("merge called with empty cluster"),
    };
    let mut bbox = first.bbox;
    let mut area = first.area;
    let mut confidence_sum = first.confidence;
    let mut count = 1u32;

    for detection in cluster {
        bbox = bbox.union(&detection.bbox);
        area += detection.area;
        confidence_sum += detection.confidence;
        count += 1;
    }

    let width = f64::from(bbox.width);
    let height = f64::from(bbox.height);
    Detection {
        bbox,
        area,
        confidence: confidence_sum / f64::from(count),
        aspect_ratio: width / height,
        extent: area / (width * height),
        centroid: bbox.center(),
        merged_count: count,
    }
}

/// Minimal union-find with path halving.
struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
        }
    }

    fn find(&mut self, mut i: usize) -> usize {
        while self.parent[i] != i {
            self.parent[i] = self.parent[self.parent[i]];
            i = self.parent[i];
        }
        i
    }

    fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra != rb {
            // Attach the larger root index under the smaller so cluster
            // representatives stay stable across input orderings.
            let (low, high) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[high] = low;
        }
    }
}
