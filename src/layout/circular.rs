use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::cancel::CancelToken;
use crate::error::Result;
use crate::geometry::Point;
use crate::ir::{Graph, PositionTable, SizeTable};

use super::{LayoutAlgorithm, LayoutState, Topology, commit_centers};

/// Radius used when every vertex is sizeless.
const MIN_RADIUS: f64 = 1.0;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CircularParams {
    pub seed: u64,
}

/// Places vertices evenly around a circle sized by their total footprint.
#[derive(Debug, Clone)]
pub struct CircularLayout {
    state: LayoutState,
}

impl CircularLayout {
    pub fn new(
        positions: Option<PositionTable>,
        sizes: Option<SizeTable>,
        _params: CircularParams,
    ) -> Self {
        Self {
            state: LayoutState::new(positions, sizes),
        }
    }
}

impl LayoutAlgorithm for CircularLayout {
    fn name(&self) -> &'static str {
        "circular"
    }

    fn state(&self) -> &LayoutState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut LayoutState {
        &mut self.state
    }

    fn need_vertex_sizes(&self) -> bool {
        true
    }

    fn compute(&mut self, graph: &Graph, cancel: &CancelToken) -> Result<()> {
        let topo = Topology::new(graph);
        if topo.is_empty() {
            return Ok(());
        }
        cancel.check()?;

        let half: Vec<f64> = topo
            .ids
            .iter()
            .map(|&id| self.state.size_of(id).diagonal() * 0.5)
            .collect();
        let perimeter: f64 = half.iter().map(|h| h * 2.0).sum();
        let mut radius = perimeter / (2.0 * PI);

        if radius > MIN_RADIUS {
            // angular share of each vertex on the first-guess circle, then
            // rescale so the shares add up to a full turn
            let total: f64 = half
                .iter()
                .map(|h| 2.0 * (h * 0.5 / radius).min(1.0).asin() * 2.0)
                .sum();
            if total > 0.0 {
                radius *= total / (2.0 * PI);
            }
        } else {
            radius = MIN_RADIUS.max(topo.len() as f64);
        }

        let mut centers = Vec::with_capacity(topo.len());
        let mut angle = -PI;
        let equal_share = 2.0 * PI / topo.len() as f64;
        for h in &half {
            let a = if perimeter > 0.0 {
                (h * 0.5 / radius).min(1.0).asin() * 2.0
            } else {
                equal_share * 0.5
            };
            angle += a;
            centers.push(Point::new(
                angle.cos() * radius + radius,
                angle.sin() * radius + radius,
            ));
            angle += a;
        }

        commit_centers(&mut self.state, &topo, &centers);
        log::debug!("circular layout: {} vertices, radius {:.1}", topo.len(), radius);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Size;
    use crate::ir::VertexId;
    use crate::layout::test_support::*;

    #[test]
    fn vertices_sit_on_one_circle() {
        let graph = graph_with_edges(6, &[(1, 2)]);
        let sizes = uniform_sizes(&graph, 30.0, 20.0);
        let mut layout = CircularLayout::new(None, Some(sizes), CircularParams::default());
        layout.compute(&graph, &CancelToken::none()).unwrap();
        let centers: Vec<Point> = graph
            .vertex_ids()
            .map(|id| layout.positions()[&id] + Size::new(30.0, 20.0).half())
            .collect();
        // equal footprints get equal angular shares, so neighbouring chords match
        let chord = centers[0].distance(centers[1]);
        assert!(chord > 30.0);
        for pair in centers.windows(2) {
            assert!((pair[0].distance(pair[1]) - chord).abs() < 1e-6);
        }
    }

    #[test]
    fn sizeless_vertices_stay_finite_and_distinct() {
        let graph = graph_with_edges(3, &[]);
        let mut layout = CircularLayout::new(None, None, CircularParams::default());
        layout.compute(&graph, &CancelToken::none()).unwrap();
        assert!(all_finite(layout.positions()));
        assert_ne!(layout.positions()[&VertexId(1)], layout.positions()[&VertexId(2)]);
    }
}
