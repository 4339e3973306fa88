use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::cancel::CancelToken;
use crate::error::Result;
use crate::geometry::Point;
use crate::ir::{Graph, PositionTable, SizeTable};
use crate::rng::Rng;

use super::{LayoutAlgorithm, LayoutState, Topology, commit_centers, initial_centers, pinned_mask};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IsomParams {
    pub width: f64,
    pub height: f64,
    pub max_epoch: usize,
    /// Epochs between two radius decrements.
    pub radius_constant_time: usize,
    pub initial_radius: usize,
    pub min_radius: usize,
    pub initial_adaption: f64,
    pub min_adaption: f64,
    pub cooling_factor: f64,
    pub seed: u64,
}

impl Default for IsomParams {
    fn default() -> Self {
        Self {
            width: 300.0,
            height: 300.0,
            max_epoch: 2000,
            radius_constant_time: 100,
            initial_radius: 5,
            min_radius: 1,
            initial_adaption: 0.9,
            min_adaption: 0.0,
            cooling_factor: 2.0,
            seed: 0,
        }
    }
}

/// Inverted self-organising map: random stimuli drag the closest vertex and
/// its graph neighbourhood toward them.
#[derive(Debug, Clone)]
pub struct IsomLayout {
    state: LayoutState,
    params: IsomParams,
}

impl IsomLayout {
    pub fn new(positions: Option<PositionTable>, sizes: Option<SizeTable>, params: IsomParams) -> Self {
        Self {
            state: LayoutState::new(positions, sizes),
            params,
        }
    }
}

impl LayoutAlgorithm for IsomLayout {
    fn name(&self) -> &'static str {
        "isom"
    }

    fn state(&self) -> &LayoutState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut LayoutState {
        &mut self.state
    }

    fn supports_object_freeze(&self) -> bool {
        true
    }

    fn compute(&mut self, graph: &Graph, cancel: &CancelToken) -> Result<()> {
        let topo = Topology::new(graph);
        let n = topo.len();
        if n == 0 {
            return Ok(());
        }
        let params = &self.params;
        let mut rng = Rng::new(params.seed);
        let mut centers = initial_centers(
            &self.state,
            &topo,
            &mut rng,
            Point::ORIGIN,
            params.width,
            params.height,
        );
        let pinned = pinned_mask(&self.state, &topo, true);

        let mut radius = params.initial_radius;
        let mut adaption = params.initial_adaption;
        let mut hops = vec![usize::MAX; n];
        let mut queue = VecDeque::new();
        for epoch in 1..=params.max_epoch {
            cancel.check()?;
            let stimulus = Point::new(rng.range(0.0, params.width), rng.range(0.0, params.height));
            let Some(winner) = (0..n).min_by(|&a, &b| {
                centers[a]
                    .distance(stimulus)
                    .total_cmp(&centers[b].distance(stimulus))
            }) else {
                break;
            };

            hops.iter_mut().for_each(|h| *h = usize::MAX);
            hops[winner] = 0;
            queue.clear();
            queue.push_back(winner);
            while let Some(v) = queue.pop_front() {
                let d = hops[v];
                if !pinned[v] {
                    let factor = adaption / 2f64.powi(d as i32);
                    let pull = (stimulus - centers[v]) * factor;
                    centers[v] += pull;
                }
                if d < radius {
                    for &next in &topo.adjacent[v] {
                        if hops[next] == usize::MAX {
                            hops[next] = d + 1;
                            queue.push_back(next);
                        }
                    }
                }
            }

            let progress = epoch as f64 / params.max_epoch as f64;
            adaption = params
                .min_adaption
                .max((-params.cooling_factor * progress).exp() * params.initial_adaption);
            if radius > params.min_radius
                && params.radius_constant_time > 0
                && epoch % params.radius_constant_time == 0
            {
                radius -= 1;
            }
        }

        commit_centers(&mut self.state, &topo, &centers);
        log::debug!("isom layout: {} vertices over {} epochs", n, params.max_epoch);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::VertexId;
    use crate::layout::test_support::*;

    #[test]
    fn stays_near_the_area_and_is_reproducible() {
        let graph = graph_with_edges(6, &[(1, 2), (2, 3), (3, 4), (4, 5), (5, 6)]);
        let run = || {
            let mut layout = IsomLayout::new(None, None, IsomParams::default());
            layout.compute(&graph, &CancelToken::none()).unwrap();
            layout.take_positions()
        };
        let first = run();
        assert_eq!(first, run());
        // every move is a convex step toward a stimulus inside the area
        for p in first.values() {
            assert!((0.0..=300.0).contains(&p.x) && (0.0..=300.0).contains(&p.y));
        }
        assert_ne!(first[&VertexId(1)], first[&VertexId(6)]);
    }
}
