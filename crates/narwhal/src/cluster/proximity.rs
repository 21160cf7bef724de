use super::{ClusterParams, Clusterer};
use crate::geometry::Position;
use std::collections::VecDeque;

/// Density clustering over shortest (wrap-aware) distances.
///
/// A point with at least `min_cluster_size` points (itself included) within `neighbor_distance`
/// is a core point. Clusters grow outward from core points and absorb border points; everything
/// else is noise and left unclustered. Output order follows input order.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProximityClusterer;

impl ProximityClusterer {
    pub fn new() -> Self {
        Self
    }
}

fn neighbors(points: &[(impl Sized, Position)], params: &ClusterParams) -> Vec<Vec<usize>> {
    let n = points.len();
    let mut out = vec![Vec::new(); n];
    for i in 0..n {
        for j in (i + 1)..n {
            let d = params.geometry.distance(&points[i].1, &points[j].1);
            if d.length <= params.neighbor_distance {
                out[i].push(j);
                out[j].push(i);
            }
        }
    }
    out
}

impl<K: Clone + Send> Clusterer<K> for ProximityClusterer {
    fn cluster(&mut self, points: &[(K, Position)], params: &ClusterParams) -> Vec<Vec<K>> {
        let min_size = params.min_cluster_size.max(1);
        let adjacency = neighbors(points, params);
        let is_core = |i: usize| adjacency[i].len() + 1 >= min_size;

        let mut label: Vec<Option<usize>> = vec![None; points.len()];
        let mut groups: Vec<Vec<usize>> = Vec::new();
        let mut queue = VecDeque::new();

        for seed in 0..points.len() {
            if label[seed].is_some() || !is_core(seed) {
                continue;
            }
            let id = groups.len();
            let mut members = vec![seed];
            label[seed] = Some(id);
            queue.push_back(seed);
            while let Some(i) = queue.pop_front() {
                if !is_core(i) {
                    continue;
                }
                for &j in &adjacency[i] {
                    if label[j].is_none() {
                        label[j] = Some(id);
                        members.push(j);
                        queue.push_back(j);
                    }
                }
            }
            groups.push(members);
        }

        groups
            .into_iter()
            .filter(|g| g.len() >= min_size)
            .map(|g| g.into_iter().map(|i| points[i].0.clone()).collect())
            .collect()
    }
}
