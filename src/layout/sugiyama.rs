use serde::{Deserialize, Serialize};

use crate::cancel::CancelToken;
use crate::error::Result;
use crate::geometry::Point;
use crate::ir::{Direction, EdgeRoutes, Graph, PositionTable, SizeTable};

use super::layered::{
    LayeredGraph, barycenter_ordering, chain_routes, dfs_reversed_edges, finish, layer_centers,
    longest_path_ranks, node_extents, pulled_coordinates,
};
use super::{LayoutAlgorithm, LayoutState, Topology};

/// Rounds of neighbour pulling during coordinate assignment.
const PULL_ROUNDS: usize = 4;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SugiyamaParams {
    pub layer_gap: f64,
    pub vertex_gap: f64,
    /// Upper bound on crossing-reduction sweeps.
    pub max_sweeps: usize,
    pub direction: Direction,
    pub seed: u64,
}

impl Default for SugiyamaParams {
    fn default() -> Self {
        Self {
            layer_gap: 15.0,
            vertex_gap: 15.0,
            max_sweeps: 8,
            direction: Direction::TopDown,
            seed: 0,
        }
    }
}

/// Classic layered drawing: DFS cycle breaking, longest-path layers,
/// barycentre ordering and neighbour-pulled coordinates.
#[derive(Debug, Clone)]
pub struct SugiyamaLayout {
    state: LayoutState,
    params: SugiyamaParams,
    routes: EdgeRoutes,
    crossings: Option<u64>,
}

impl SugiyamaLayout {
    pub fn new(
        positions: Option<PositionTable>,
        sizes: Option<SizeTable>,
        params: SugiyamaParams,
    ) -> Self {
        Self {
            state: LayoutState::new(positions, sizes),
            params,
            routes: EdgeRoutes::new(),
            crossings: None,
        }
    }

    /// Crossings left after ordering, from the last successful compute.
    pub fn crossings(&self) -> Option<u64> {
        self.crossings
    }
}

impl LayoutAlgorithm for SugiyamaLayout {
    fn name(&self) -> &'static str {
        "sugiyama"
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
        let reversed = dfs_reversed_edges(&topo);
        let dag: Vec<(usize, usize)> = topo
            .edges
            .iter()
            .zip(&reversed)
            .map(|(e, &r)| if r { (e.target, e.source) } else { (e.source, e.target) })
            .collect();
        let ranks = longest_path_ranks(topo.len(), &dag);
        let mut lg = LayeredGraph::build(&topo, &reversed, ranks);
        cancel.check()?;

        let crossings = barycenter_ordering(&mut lg, self.params.max_sweeps, cancel)?;
        let extents = node_extents(&lg, &topo, &self.state, self.params.direction);
        let layers = layer_centers(&lg, &extents, self.params.layer_gap);
        let xs = pulled_coordinates(&lg, &extents, self.params.vertex_gap, PULL_ROUNDS);
        cancel.check()?;

        let centers: Vec<Point> = (0..lg.node_count())
            .map(|v| Point::new(xs[v], layers[lg.rank[v]].0))
            .collect();
        let routes = chain_routes(&lg, &centers, &layers, false);
        let (positions, routes) = finish(
            &lg,
            &topo,
            &self.state,
            &centers,
            routes,
            self.params.direction,
        );

        self.state.positions.extend(positions);
        self.routes = routes;
        self.crossings = Some(crossings);
        log::debug!(
            "sugiyama layout: {} vertices, {} layers, {} dummies, {} crossings",
            topo.len(),
            lg.layers.len(),
            lg.node_count() - lg.real,
            crossings
        );
        Ok(())
    }
}
