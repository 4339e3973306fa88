//! Layout algorithm family.
//!
//! Every algorithm implements [`LayoutAlgorithm`] independently and owns its
//! own [`LayoutState`] (position and size tables). Positions are the top-left
//! corner of a vertex footprint; algorithms that reason about centres convert
//! with the vertex size, which is zero when no size table was supplied.

mod balloon;
mod circular;
mod efficient_sugiyama;
mod force;
mod grouped;
mod isom;
mod kk;
pub(crate) mod layered;
mod linlog;
mod random;
mod sugiyama;
mod tree;

pub use balloon::{BalloonTreeLayout, BalloonTreeParams};
pub use circular::{CircularLayout, CircularParams};
pub use efficient_sugiyama::{
    EfficientSugiyamaLayout, EfficientSugiyamaParams, LayeredEdgeRouting, PositionMode,
};
pub use force::{BoundedFrParams, CoolingFunction, FreeFrParams, FrLayout, FrParams};
pub use grouped::{GroupParams, GroupedLayout, GroupingParams};
pub use isom::{IsomLayout, IsomParams};
pub use kk::{KkLayout, KkParams};
pub use layered::count_bilayer_crossings;
pub use linlog::{LinLogLayout, LinLogParams};
pub use random::{RandomLayout, RandomParams};
pub use sugiyama::{SugiyamaLayout, SugiyamaParams};
pub use tree::{SimpleTreeLayout, SimpleTreeParams, SpanningTreeKind};

use std::collections::{HashMap, HashSet, VecDeque};

use crate::cancel::CancelToken;
use crate::error::Result;
use crate::geometry::{Point, Size, Vector};
use crate::ir::{EdgeId, EdgeRoutes, Graph, PositionTable, SizeTable, VertexId};
use crate::rng::Rng;

/// Position and size tables owned by one algorithm instance.
#[derive(Debug, Clone, Default)]
pub struct LayoutState {
    pub positions: PositionTable,
    pub sizes: SizeTable,
}

impl LayoutState {
    pub fn new(positions: Option<PositionTable>, sizes: Option<SizeTable>) -> Self {
        Self {
            positions: positions.unwrap_or_default(),
            sizes: sizes.unwrap_or_default(),
        }
    }

    pub fn size_of(&self, id: VertexId) -> Size {
        self.sizes.get(&id).copied().unwrap_or(Size::ZERO)
    }

    /// Centre of a seeded vertex, if it has a position.
    pub fn center_of(&self, id: VertexId) -> Option<Point> {
        self.positions
            .get(&id)
            .map(|p| *p + self.size_of(id).half())
    }

    pub fn set_center(&mut self, id: VertexId, center: Point) {
        let half = self.size_of(id).half();
        self.positions.insert(id, center - half);
    }
}

/// Common contract of every layout algorithm.
pub trait LayoutAlgorithm: Send {
    fn name(&self) -> &'static str;

    fn state(&self) -> &LayoutState;

    fn state_mut(&mut self) -> &mut LayoutState;

    /// Runs the algorithm over `graph`; on success [`positions`](Self::positions)
    /// holds a position for every processed vertex. On error the position table
    /// is left as it was before the call.
    fn compute(&mut self, graph: &Graph, cancel: &CancelToken) -> Result<()>;

    fn need_vertex_sizes(&self) -> bool {
        false
    }

    /// Whether vertices in [`ProcessingMode::Freeze`](crate::ir::ProcessingMode)
    /// keep their seeded position.
    fn supports_object_freeze(&self) -> bool {
        false
    }

    /// Bend points produced by the layout itself, when it routes its own edges.
    fn edge_routes(&self) -> Option<&EdgeRoutes> {
        None
    }

    fn positions(&self) -> &PositionTable {
        &self.state().positions
    }

    fn set_positions(&mut self, positions: PositionTable) {
        self.state_mut().positions = positions;
    }

    fn take_positions(&mut self) -> PositionTable {
        std::mem::take(&mut self.state_mut().positions)
    }

    fn sizes(&self) -> &SizeTable {
        &self.state().sizes
    }

    fn set_sizes(&mut self, sizes: SizeTable) {
        self.state_mut().sizes = sizes;
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct TopoEdge {
    pub id: EdgeId,
    pub source: usize,
    pub target: usize,
    pub weight: f64,
}

/// Index-based view of the processed part of a graph.
///
/// Excluded vertices and edges touching them are dropped, self-loops are kept
/// out of the adjacency lists.
#[derive(Debug, Clone, Default)]
pub(crate) struct Topology {
    pub ids: Vec<VertexId>,
    pub index: HashMap<VertexId, usize>,
    pub frozen: Vec<bool>,
    pub edges: Vec<TopoEdge>,
    pub out: Vec<Vec<usize>>,
    pub inc: Vec<Vec<usize>>,
    pub adjacent: Vec<Vec<usize>>,
}

impl Topology {
    pub fn new(graph: &Graph) -> Self {
        let mut topo = Topology::default();
        for vertex in graph.vertices() {
            if vertex.is_excluded() {
                continue;
            }
            topo.index.insert(vertex.id, topo.ids.len());
            topo.ids.push(vertex.id);
            topo.frozen.push(vertex.is_frozen());
        }
        let n = topo.ids.len();
        topo.out = vec![Vec::new(); n];
        topo.inc = vec![Vec::new(); n];
        topo.adjacent = vec![Vec::new(); n];
        let mut seen: HashSet<(usize, usize)> = HashSet::new();
        for edge in graph.edges() {
            let (Some(&s), Some(&t)) = (topo.index.get(&edge.source), topo.index.get(&edge.target))
            else {
                continue;
            };
            if s == t {
                continue;
            }
            topo.edges.push(TopoEdge {
                id: edge.id,
                source: s,
                target: t,
                weight: edge.weight,
            });
            topo.out[s].push(t);
            topo.inc[t].push(s);
            let key = (s.min(t), s.max(t));
            if seen.insert(key) {
                topo.adjacent[s].push(t);
                topo.adjacent[t].push(s);
            }
        }
        topo
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Unweighted shortest-path distances over the undirected adjacency;
    /// `usize::MAX` marks unreachable pairs.
    pub fn all_pairs_distances(&self) -> Vec<Vec<usize>> {
        let n = self.len();
        let mut dist = vec![vec![usize::MAX; n]; n];
        for (start, row) in dist.iter_mut().enumerate() {
            row[start] = 0;
            let mut queue = VecDeque::from([start]);
            while let Some(cur) = queue.pop_front() {
                let d = row[cur];
                for &next in &self.adjacent[cur] {
                    if row[next] == usize::MAX {
                        row[next] = d + 1;
                        queue.push_back(next);
                    }
                }
            }
        }
        dist
    }
}

/// Working centres for an iterative algorithm: seeded vertices keep their
/// centre, the rest get a random spot inside `width` x `height` shifted by `origin`.
pub(crate) fn initial_centers(
    state: &LayoutState,
    topo: &Topology,
    rng: &mut Rng,
    origin: Point,
    width: f64,
    height: f64,
) -> Vec<Point> {
    topo.ids
        .iter()
        .map(|&id| {
            state.center_of(id).unwrap_or_else(|| {
                Point::new(
                    origin.x + rng.range(0.0, width),
                    origin.y + rng.range(0.0, height),
                )
            })
        })
        .collect()
}

/// Vertices that must not move: frozen and already positioned.
pub(crate) fn pinned_mask(state: &LayoutState, topo: &Topology, honor_freeze: bool) -> Vec<bool> {
    topo.ids
        .iter()
        .enumerate()
        .map(|(idx, id)| honor_freeze && topo.frozen[idx] && state.positions.contains_key(id))
        .collect()
}

/// Writes centres back as top-left positions. Non-finite coordinates are a
/// contract violation downstream, so they fall back to the origin.
pub(crate) fn commit_centers(state: &mut LayoutState, topo: &Topology, centers: &[Point]) {
    for (idx, &id) in topo.ids.iter().enumerate() {
        let mut c = centers[idx];
        if !c.is_finite() {
            log::warn!("vertex {id} produced a non-finite position; resetting to origin");
            c = Point::ORIGIN;
        }
        state.set_center(id, c);
    }
}

/// Shifts every position so the smallest x and y become `border`.
pub(crate) fn normalize_positions(positions: &mut PositionTable, border: f64) {
    let min_x = positions.values().map(|p| p.x).fold(f64::INFINITY, f64::min);
    let min_y = positions.values().map(|p| p.y).fold(f64::INFINITY, f64::min);
    if !min_x.is_finite() || !min_y.is_finite() {
        return;
    }
    let shift = Vector::new(border - min_x, border - min_y);
    for p in positions.values_mut() {
        *p += shift;
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::geometry::Rect;
    use crate::ir::Vertex;

    pub fn graph_with_edges(n: u64, edges: &[(u64, u64)]) -> Graph {
        let mut graph = Graph::with_vertices(n);
        for &(s, t) in edges {
            graph.add_edge(VertexId(s), VertexId(t)).unwrap();
        }
        graph
    }

    pub fn uniform_sizes(graph: &Graph, w: f64, h: f64) -> SizeTable {
        graph.vertex_ids().map(|id| (id, Size::new(w, h))).collect()
    }

    pub fn rects(positions: &PositionTable, sizes: &SizeTable) -> Vec<(VertexId, Rect)> {
        positions
            .iter()
            .map(|(id, p)| (*id, Rect::from_point_size(*p, sizes[id])))
            .collect()
    }

    pub fn all_finite(positions: &PositionTable) -> bool {
        positions.values().all(|p| p.is_finite())
    }

    pub fn excluded_vertex_graph() -> Graph {
        let mut graph = graph_with_edges(3, &[(1, 2), (2, 3)]);
        graph
            .add_vertex(Vertex::new(4).with_processing(crate::ir::ProcessingMode::Exclude))
            .unwrap();
        graph.add_edge(VertexId(4), VertexId(1)).unwrap();
        graph
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn topology_skips_excluded_vertices_and_self_loops() {
        let mut graph = excluded_vertex_graph();
        graph.add_edge(VertexId(2), VertexId(2)).unwrap();
        let topo = Topology::new(&graph);
        assert_eq!(topo.len(), 3);
        assert_eq!(topo.edges.len(), 2);
        assert!(topo.adjacent[1].contains(&0) && topo.adjacent[1].contains(&2));
    }

    #[test]
    fn distances_mark_unreachable_pairs() {
        let graph = graph_with_edges(4, &[(1, 2), (2, 3)]);
        let dist = Topology::new(&graph).all_pairs_distances();
        assert_eq!(dist[0][2], 2);
        assert_eq!(dist[2][0], 2);
        assert_eq!(dist[0][3], usize::MAX);
    }

    #[test]
    fn normalize_moves_minimum_to_border() {
        let mut positions = PositionTable::new();
        positions.insert(VertexId(1), Point::new(-5.0, 10.0));
        positions.insert(VertexId(2), Point::new(3.0, -2.0));
        normalize_positions(&mut positions, 0.0);
        assert_eq!(positions[&VertexId(1)], Point::new(0.0, 12.0));
        assert_eq!(positions[&VertexId(2)], Point::new(8.0, 0.0));
    }
}
