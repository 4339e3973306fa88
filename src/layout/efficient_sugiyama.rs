use serde::{Deserialize, Serialize};

use crate::cancel::CancelToken;
use crate::error::Result;
use crate::geometry::Point;
use crate::ir::{Direction, EdgeRoutes, Graph, PositionTable, SizeTable};

use super::layered::{
    LayeredGraph, chain_routes, finish, greedy_reversed_edges, layer_centers, longest_path_ranks,
    median_ordering, node_extents, priority_coordinates, width_capped_ranks,
};
use super::{LayoutAlgorithm, LayoutState, Topology};

/// Which side the priority placement packs toward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PositionMode {
    /// Mean of the left and right placements.
    #[default]
    Average,
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LayeredEdgeRouting {
    /// Straight segments through the dummy vertices.
    #[default]
    Traditional,
    /// Horizontal jogs halfway between layers.
    Orthogonal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EfficientSugiyamaParams {
    pub layer_gap: f64,
    pub vertex_gap: f64,
    pub max_sweeps: usize,
    pub direction: Direction,
    pub position_mode: PositionMode,
    /// Cap every layer at `ceil(sqrt(n))` vertices, trading height for width.
    pub optimize_width: bool,
    pub edge_routing: LayeredEdgeRouting,
    pub seed: u64,
}

impl Default for EfficientSugiyamaParams {
    fn default() -> Self {
        Self {
            layer_gap: 15.0,
            vertex_gap: 15.0,
            max_sweeps: 8,
            direction: Direction::TopDown,
            position_mode: PositionMode::Average,
            optimize_width: false,
            edge_routing: LayeredEdgeRouting::Traditional,
            seed: 0,
        }
    }
}

/// Layered drawing with greedy cycle removal, median/transpose ordering and
/// priority-method coordinates.
#[derive(Debug, Clone)]
pub struct EfficientSugiyamaLayout {
    state: LayoutState,
    params: EfficientSugiyamaParams,
    routes: EdgeRoutes,
}

impl EfficientSugiyamaLayout {
    pub fn new(
        positions: Option<PositionTable>,
        sizes: Option<SizeTable>,
        params: EfficientSugiyamaParams,
    ) -> Self {
        Self {
            state: LayoutState::new(positions, sizes),
            params,
            routes: EdgeRoutes::new(),
        }
    }
}

impl LayoutAlgorithm for EfficientSugiyamaLayout {
    fn name(&self) -> &'static str {
        "efficient-sugiyama"
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

    fn edge_routes(&self) -> Option<&EdgeRoutes> {
        Some(&self.routes)
    }

    fn compute(&mut self, graph: &Graph, cancel: &CancelToken) -> Result<()> {
        let topo = Topology::new(graph);
        if topo.is_empty() {
            return Ok(());
        }
        let params = &self.params;
        let reversed = greedy_reversed_edges(&topo);
        let dag: Vec<(usize, usize)> = topo
            .edges
            .iter()
            .zip(&reversed)
            .map(|(e, &r)| if r { (e.target, e.source) } else { (e.source, e.target) })
            .collect();
        let ranks = if params.optimize_width {
            let cap = (topo.len() as f64).sqrt().ceil() as usize;
            width_capped_ranks(topo.len(), &dag, cap)
        } else {
            longest_path_ranks(topo.len(), &dag)
        };
        let mut lg = LayeredGraph::build(&topo, &reversed, ranks);
        cancel.check()?;

        let crossings = median_ordering(&mut lg, params.max_sweeps, cancel)?;
        let extents = node_extents(&lg, &topo, &self.state, params.direction);
        let layers = layer_centers(&lg, &extents, params.layer_gap);
        let xs = match params.position_mode {
            PositionMode::Left => priority_coordinates(&lg, &extents, params.vertex_gap, false),
            PositionMode::Right => priority_coordinates(&lg, &extents, params.vertex_gap, true),
            PositionMode::Average => {
                let left = priority_coordinates(&lg, &extents, params.vertex_gap, false);
                let right = priority_coordinates(&lg, &extents, params.vertex_gap, true);
                left.iter().zip(&right).map(|(l, r)| (l + r) / 2.0).collect()
            }
        };
        cancel.check()?;

        let centers: Vec<Point> = (0..lg.node_count())
            .map(|v| Point::new(xs[v], layers[lg.rank[v]].0))
            .collect();
        let orthogonal = params.edge_routing == LayeredEdgeRouting::Orthogonal;
        let routes = chain_routes(&lg, &centers, &layers, orthogonal);
        let (positions, routes) = finish(&lg, &topo, &self.state, &centers, routes, params.direction);

        self.state.positions.extend(positions);
        self.routes = routes;
        log::debug!(
            "efficient sugiyama layout: {} vertices, {} layers, {} crossings",
            topo.len(),
            lg.layers.len(),
            crossings
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::VertexId;
    use crate::layout::test_support::*;

    fn run(graph: &Graph, params: EfficientSugiyamaParams) -> EfficientSugiyamaLayout {
        let sizes = uniform_sizes(graph, 30.0, 20.0);
        let mut layout = EfficientSugiyamaLayout::new(None, Some(sizes), params);
        layout.compute(graph, &CancelToken::none()).unwrap();
        layout
    }

    #[test]
    fn orthogonal_routes_only_turn_at_right_angles() {
        let graph = graph_with_edges(5, &[(1, 2), (1, 3), (1, 4), (2, 5), (1, 5)]);
        let params = EfficientSugiyamaParams {
            edge_routing: LayeredEdgeRouting::Orthogonal,
            ..EfficientSugiyamaParams::default()
        };
        let layout = run(&graph, params);
        let routes = layout.edge_routes().unwrap();
        assert!(!routes.is_empty());
        for points in routes.values() {
            for seg in points.windows(2) {
                let straight = (seg[0].x - seg[1].x).abs() < 1e-9 || (seg[0].y - seg[1].y).abs() < 1e-9;
                assert!(straight, "diagonal segment {seg:?}");
            }
        }
    }

    #[test]
    fn width_optimisation_caps_layer_size() {
        let edges: Vec<(u64, u64)> = (2..=10).map(|t| (1, t)).collect();
        let graph = graph_with_edges(10, &edges);
        let params = EfficientSugiyamaParams {
            optimize_width: true,
            ..EfficientSugiyamaParams::default()
        };
        let layout = run(&graph, params);
        let mut rows: Vec<f64> = layout.positions().values().map(|p| p.y).collect();
        rows.sort_by(f64::total_cmp);
        rows.dedup_by(|a, b| (*a - *b).abs() < 1e-9);
        // one root row plus at least three rows of at most four leaves
        assert!(rows.len() >= 4);
    }

    #[test]
    fn every_mode_separates_vertices() {
        let graph = graph_with_edges(6, &[(1, 3), (1, 4), (2, 4), (2, 5), (3, 6), (5, 6), (6, 1)]);
        for mode in [PositionMode::Average, PositionMode::Left, PositionMode::Right] {
            let params = EfficientSugiyamaParams {
                position_mode: mode,
                direction: Direction::RightLeft,
                ..EfficientSugiyamaParams::default()
            };
            let layout = run(&graph, params);
            let sizes = uniform_sizes(&graph, 30.0, 20.0);
            let all = rects(layout.positions(), &sizes);
            for (i, (_, a)) in all.iter().enumerate() {
                for (_, b) in &all[i + 1..] {
                    assert!(!a.intersects(b), "{mode:?}");
                }
            }
            assert_eq!(layout.positions().len(), 6);
            assert!(layout.positions().contains_key(&VertexId(6)));
        }
    }
}
