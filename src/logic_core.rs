//! Orchestration of the layout, overlap removal and edge routing stages.

use crate::cancel::CancelToken;
use crate::error::{ArrangeError, Result};
use crate::factory::{
    LayoutParams, OverlapParams, RoutingParams, create_edge_routing, create_layout,
    create_overlap_removal, needs_edge_routing, needs_overlap_removal, needs_sizes,
};
use crate::geometry::{Point, Rect, Size};
use crate::ir::{EdgeId, EdgeRoutes, Graph, PositionTable, RectTable, SizeTable, Vertex, VertexId};
use crate::layout::LayoutAlgorithm;
use crate::overlap::OverlapRemovalAlgorithm;
use crate::routing::{EdgeRoutingAlgorithm, edges_affected_by};

/// Result of a full [`LogicCore::compute`] run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArrangeOutcome {
    pub positions: PositionTable,
    pub routes: EdgeRoutes,
    /// Displacement cost of the overlap removal stage, when it ran.
    pub overlap_cost: Option<f64>,
}

/// Runs the three stages in order and keeps their instances for incremental
/// updates afterwards.
///
/// `layout_params: None` means the caller supplies every position itself.
/// `overlap_params` or `routing_params` set to `None` disables that stage.
/// The `external_*` slots take precedence over the factory-built algorithms.
#[derive(Default)]
pub struct LogicCore {
    pub layout_params: Option<LayoutParams>,
    pub overlap_params: Option<OverlapParams>,
    pub routing_params: Option<RoutingParams>,
    pub external_layout: Option<Box<dyn LayoutAlgorithm>>,
    pub external_overlap: Option<Box<dyn OverlapRemovalAlgorithm<VertexId>>>,
    pub external_routing: Option<Box<dyn EdgeRoutingAlgorithm>>,
    layout: Option<Box<dyn LayoutAlgorithm>>,
    router: Option<Box<dyn EdgeRoutingAlgorithm>>,
    sizes: SizeTable,
    outcome: ArrangeOutcome,
}

impl LogicCore {
    pub fn new(
        layout_params: Option<LayoutParams>,
        overlap_params: Option<OverlapParams>,
        routing_params: Option<RoutingParams>,
    ) -> Self {
        Self {
            layout_params,
            overlap_params,
            routing_params,
            ..Self::default()
        }
    }

    /// Last committed outcome.
    pub fn outcome(&self) -> &ArrangeOutcome {
        &self.outcome
    }

    pub fn positions(&self) -> &PositionTable {
        &self.outcome.positions
    }

    /// Whether the size table passed to [`compute`](Self::compute) is read.
    pub fn are_vertex_sizes_needed(&self) -> bool {
        let layout_needs = match (&self.external_layout, &self.layout_params) {
            (Some(external), _) => external.need_vertex_sizes(),
            (None, Some(params)) => needs_sizes(params.kind()),
            (None, None) => false,
        };
        layout_needs || self.is_overlap_removal_needed() || self.is_edge_routing_needed()
    }

    pub fn is_overlap_removal_needed(&self) -> bool {
        let configured = self.external_overlap.is_some() || self.overlap_params.is_some();
        let layout_wants = match (&self.external_layout, &self.layout_params) {
            (None, Some(params)) => needs_overlap_removal(params.kind()),
            _ => true,
        };
        configured && layout_wants
    }

    pub fn is_edge_routing_needed(&self) -> bool {
        let configured = self.external_routing.is_some() || self.routing_params.is_some();
        let layout_wants = match (&self.external_layout, &self.layout_params) {
            (None, Some(params)) => needs_edge_routing(params.kind()),
            _ => true,
        };
        configured && layout_wants
    }

    /// Full pipeline. Edge routes are also written into
    /// [`Edge::routing_points`](crate::ir::Edge). A failed or cancelled run
    /// leaves the previous outcome in place.
    pub fn compute(
        &mut self,
        graph: &mut Graph,
        sizes: &SizeTable,
        seed_positions: Option<PositionTable>,
        cancel: &CancelToken,
    ) -> Result<ArrangeOutcome> {
        graph.validate()?;

        // ── Layout ───────────────────────────────────────────────────
        let mut created_layout = None;
        let (mut positions, layout_routes) = if let Some(layout) = self.external_layout.as_mut() {
            run_layout(layout.as_mut(), graph, sizes, seed_positions, cancel)?
        } else if let Some(params) = &self.layout_params {
            let mut layout = create_layout(
                params.kind(),
                seed_positions,
                Some(sizes.clone()),
                Some(params.clone()),
            )?;
            let result = run_layout(layout.as_mut(), graph, sizes, None, cancel)?;
            created_layout = Some(layout);
            result
        } else {
            log::debug!("custom layout: using caller positions");
            (seed_positions.unwrap_or_default(), None)
        };

        for vertex in graph.vertices().iter().filter(|v| !v.is_excluded()) {
            if !positions.contains_key(&vertex.id) {
                return Err(ArrangeError::MissingVertex(vertex.id));
            }
        }

        // ── Overlap removal ──────────────────────────────────────────
        let mut overlap_cost = None;
        if self.is_overlap_removal_needed() {
            let rects: RectTable = graph
                .vertices()
                .iter()
                .filter(|v| !v.is_excluded())
                .filter_map(|v| {
                    let p = positions.get(&v.id)?;
                    let size = sizes.get(&v.id).copied().unwrap_or(Size::ZERO);
                    Some((v.id, Rect::from_point_size(*p, size)))
                })
                .collect();
            let mut created;
            let algorithm: &mut dyn OverlapRemovalAlgorithm<VertexId> =
                if let Some(external) = self.external_overlap.as_mut() {
                    external.set_rectangles(rects);
                    external.as_mut()
                } else {
                    let params = self.overlap_params.clone().unwrap_or_default();
                    created = create_overlap_removal(params.kind(), rects, Some(params))?;
                    created.as_mut()
                };
            algorithm.compute(cancel)?;
            for (id, rect) in algorithm.rectangles() {
                positions.insert(*id, rect.top_left());
            }
            overlap_cost = Some(algorithm.cost());
            log::debug!("overlap removal done, cost {:.2}", algorithm.cost());
        }

        // ── Edge routing ─────────────────────────────────────────────
        let mut created_router = None;
        let routes = if let Some(routes) = layout_routes {
            log::debug!("using {} layout-provided edge routes", routes.len());
            routes
        } else if self.is_edge_routing_needed() {
            let router: &mut dyn EdgeRoutingAlgorithm =
                if let Some(external) = self.external_routing.as_mut() {
                    external.set_positions(positions.clone());
                    external.set_sizes(sizes.clone());
                    external.as_mut()
                } else {
                    let params = self.routing_params.clone().unwrap_or_default();
                    let router = create_edge_routing(
                        params.kind(),
                        Some(positions.clone()),
                        Some(sizes.clone()),
                        Some(params),
                    )?;
                    created_router.insert(router).as_mut()
                };
            router.compute(graph, cancel)?;
            log::debug!("{} routed {} edges", router.name(), router.edge_routes().len());
            router.edge_routes().clone()
        } else {
            EdgeRoutes::new()
        };

        // ── Commit ───────────────────────────────────────────────────
        for edge in graph.edges_mut() {
            edge.routing_points = routes.get(&edge.id).cloned();
        }
        // instances from earlier runs go stale once another stage produced the tables
        self.layout = created_layout;
        self.router = created_router;
        if let Some(layout) = self.active_layout() {
            layout.set_positions(positions.clone());
        }
        self.sizes = sizes.clone();
        self.outcome = ArrangeOutcome {
            positions,
            routes,
            overlap_cost,
        };
        log::debug!(
            "arranged {} vertices, {} routed edges",
            self.outcome.positions.len(),
            self.outcome.routes.len()
        );
        Ok(self.outcome.clone())
    }

    fn active_layout(&mut self) -> Option<&mut Box<dyn LayoutAlgorithm>> {
        if self.external_layout.is_some() {
            self.external_layout.as_mut()
        } else {
            self.layout.as_mut()
        }
    }

    fn active_router(&mut self) -> Option<&mut Box<dyn EdgeRoutingAlgorithm>> {
        if !self.is_edge_routing_needed() {
            return None;
        }
        if self.external_routing.is_some() {
            self.external_routing.as_mut()
        } else {
            self.router.as_mut()
        }
    }

    fn sync_routes(&mut self, graph: &mut Graph, edges: &[EdgeId]) {
        let Some(router) = self.active_router() else {
            return;
        };
        let fresh: Vec<(EdgeId, Option<Vec<Point>>)> = edges
            .iter()
            .map(|id| (*id, router.edge_routes().get(id).cloned()))
            .collect();
        for (id, route) in fresh {
            match &route {
                Some(points) => {
                    self.outcome.routes.insert(id, points.clone());
                }
                None => {
                    self.outcome.routes.remove(&id);
                }
            }
            if let Some(edge) = graph.edge_mut(id) {
                edge.routing_points = route;
            }
        }
    }

    /// Inserts a vertex at `position` without recomputing the layout.
    pub fn add_single_vertex(
        &mut self,
        graph: &mut Graph,
        vertex: Vertex,
        position: Point,
        size: Size,
    ) -> Result<VertexId> {
        let id = graph.add_vertex(vertex)?;
        self.outcome.positions.insert(id, position);
        self.sizes.insert(id, size);
        if let Some(layout) = self.active_layout() {
            let mut positions = layout.take_positions();
            positions.insert(id, position);
            layout.set_positions(positions);
        }
        if let Some(router) = self.active_router() {
            router.update_vertex_data(id, position, size);
        }
        Ok(id)
    }

    /// Removes a vertex and its edges from the graph and every stage table.
    pub fn remove_single_vertex(&mut self, graph: &mut Graph, id: VertexId) -> Result<()> {
        let (_, removed) = graph.remove_vertex(id).ok_or(ArrangeError::MissingVertex(id))?;
        self.outcome.positions.remove(&id);
        self.sizes.remove(&id);
        for edge in &removed {
            self.outcome.routes.remove(&edge.id);
        }
        if let Some(layout) = self.active_layout() {
            let mut positions = layout.take_positions();
            positions.remove(&id);
            layout.set_positions(positions);
        }
        if let Some(router) = self.active_router() {
            router.remove_vertex(id);
            for edge in &removed {
                router.remove_edge(edge.id);
            }
        }
        Ok(())
    }

    /// Adds an edge and routes it alone when routing is active. The graph is
    /// left untouched when routing the new edge fails.
    pub fn add_single_edge(
        &mut self,
        graph: &mut Graph,
        source: VertexId,
        target: VertexId,
    ) -> Result<EdgeId> {
        let id = graph.add_edge(source, target)?;
        if let Some(router) = self.active_router()
            && let Err(err) = router.compute_single(graph, id)
        {
            router.remove_edge(id);
            graph.remove_edge(id);
            return Err(err);
        }
        self.sync_routes(graph, &[id]);
        Ok(id)
    }

    pub fn remove_single_edge(&mut self, graph: &mut Graph, id: EdgeId) -> Result<()> {
        graph.remove_edge(id).ok_or(ArrangeError::MissingEdge(id))?;
        self.outcome.routes.remove(&id);
        if let Some(router) = self.active_router() {
            router.remove_edge(id);
        }
        Ok(())
    }

    /// Re-routes only the edges a moved vertex can influence: its own edges
    /// and those crossing its old or new footprint.
    pub fn compute_edge_routes_by_vertex(
        &mut self,
        graph: &mut Graph,
        vertex: VertexId,
        position: Option<Point>,
        size: Option<Size>,
    ) -> Result<Vec<EdgeId>> {
        if !graph.contains_vertex(vertex) {
            return Err(ArrangeError::MissingVertex(vertex));
        }
        let old_position = self.outcome.positions.get(&vertex).copied();
        let old_size = self.sizes.get(&vertex).copied().unwrap_or(Size::ZERO);
        let new_position = position
            .or(old_position)
            .ok_or(ArrangeError::MissingVertex(vertex))?;
        let new_size = size.unwrap_or(old_size);
        self.outcome.positions.insert(vertex, new_position);
        self.sizes.insert(vertex, new_size);

        let graph_view: &Graph = graph;
        let Some(router) = self.active_router() else {
            return Ok(Vec::new());
        };
        let mut affected = match old_position {
            Some(p) => {
                edges_affected_by(graph_view, router.as_ref(), vertex, Rect::from_point_size(p, old_size))
            }
            None => Vec::new(),
        };
        router.update_vertex_data(vertex, new_position, new_size);
        let footprint = Rect::from_point_size(new_position, new_size);
        for id in edges_affected_by(graph_view, router.as_ref(), vertex, footprint) {
            if !affected.contains(&id) {
                affected.push(id);
            }
        }
        for id in &affected {
            router.compute_single(graph_view, *id)?;
        }
        self.sync_routes(graph, &affected);
        log::debug!("vertex {vertex} moved; re-routed {} edges", affected.len());
        Ok(affected)
    }

    /// Drops every stage instance and the committed outcome.
    pub fn clear(&mut self) {
        self.layout = None;
        self.router = None;
        self.sizes.clear();
        self.outcome = ArrangeOutcome::default();
    }
}

fn run_layout(
    layout: &mut dyn LayoutAlgorithm,
    graph: &Graph,
    sizes: &SizeTable,
    seed_positions: Option<PositionTable>,
    cancel: &CancelToken,
) -> Result<(PositionTable, Option<EdgeRoutes>)> {
    if let Some(seed) = seed_positions {
        layout.set_positions(seed);
    }
    if layout.need_vertex_sizes() {
        layout.set_sizes(sizes.clone());
    }
    layout.compute(graph, cancel)?;
    log::debug!("{} layout placed {} vertices", layout.name(), layout.positions().len());
    Ok((layout.positions().clone(), layout.edge_routes().cloned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::{LayoutKind, OverlapKind, RoutingKind};
    use crate::layout::{RandomParams, SimpleTreeParams};

    fn chain(n: u64) -> Graph {
        let mut graph = Graph::with_vertices(n);
        for id in 1..n {
            graph.add_edge(VertexId(id), VertexId(id + 1)).unwrap();
        }
        graph
    }

    fn boxes(graph: &Graph) -> SizeTable {
        graph.vertex_ids().map(|id| (id, Size::new(20.0, 20.0))).collect()
    }

    fn full_core(kind: LayoutKind) -> LogicCore {
        LogicCore::new(
            Some(LayoutParams::default_for(kind)),
            Some(OverlapParams::default_for(OverlapKind::Fsa)),
            Some(RoutingParams::default_for(RoutingKind::SimpleEr)),
        )
    }

    #[test]
    fn stage_selection_follows_the_layout_kind() {
        let core = full_core(LayoutKind::Sugiyama);
        assert!(!core.is_overlap_removal_needed());
        assert!(!core.is_edge_routing_needed());
        assert!(core.are_vertex_sizes_needed());

        let core = full_core(LayoutKind::Fr);
        assert!(core.is_overlap_removal_needed());
        assert!(core.is_edge_routing_needed());

        let core = LogicCore::new(Some(LayoutParams::default_for(LayoutKind::Kk)), None, None);
        assert!(!core.is_overlap_removal_needed());
        assert!(!core.are_vertex_sizes_needed());
    }

    #[test]
    fn layered_routes_reach_the_edges() {
        let mut graph = chain(3);
        let long = graph.add_edge(VertexId(1), VertexId(3)).unwrap();
        let sizes = boxes(&graph);
        let mut core = full_core(LayoutKind::Sugiyama);
        let outcome = core.compute(&mut graph, &sizes, None, &CancelToken::none()).unwrap();
        assert!(outcome.overlap_cost.is_none());
        assert!(outcome.routes.contains_key(&long));
        assert_eq!(graph.edge(long).unwrap().routing_points.as_ref(), outcome.routes.get(&long));
    }

    #[test]
    fn custom_layout_requires_every_position() {
        let mut graph = chain(2);
        let mut core = LogicCore::new(None, None, None);
        let seed: PositionTable = [(VertexId(1), Point::ORIGIN)].into_iter().collect();
        let err = core
            .compute(&mut graph, &SizeTable::new(), Some(seed), &CancelToken::none())
            .unwrap_err();
        assert_eq!(err, ArrangeError::MissingVertex(VertexId(2)));
        assert!(core.positions().is_empty());
    }

    #[test]
    fn cancelled_run_keeps_previous_outcome() {
        let mut graph = chain(4);
        let sizes = boxes(&graph);
        let mut core = full_core(LayoutKind::Fr);
        let first = core.compute(&mut graph, &sizes, None, &CancelToken::none()).unwrap();

        let cancel = CancelToken::new();
        cancel.cancel();
        let err = core.compute(&mut graph, &sizes, None, &cancel).unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(core.outcome(), &first);
    }

    #[test]
    fn incremental_hooks_keep_tables_in_sync() {
        let mut graph = Graph::with_vertices(2);
        let sizes = boxes(&graph);
        let seed: PositionTable = [
            (VertexId(1), Point::new(0.0, 0.0)),
            (VertexId(2), Point::new(200.0, 0.0)),
        ]
        .into_iter()
        .collect();
        let mut core = LogicCore::new(None, None, Some(RoutingParams::default()));
        core.compute(&mut graph, &sizes, Some(seed), &CancelToken::none()).unwrap();

        // a vertex dropped between the two endpoints bends the new edge
        let blocker = core
            .add_single_vertex(&mut graph, Vertex::new(3), Point::new(100.0, 0.0), Size::new(20.0, 20.0))
            .unwrap();
        let edge = core.add_single_edge(&mut graph, VertexId(1), VertexId(2)).unwrap();
        assert!(core.outcome().routes.contains_key(&edge));
        assert!(graph.edge(edge).unwrap().routing_points.is_some());

        // moving it away straightens the edge again
        let affected = core
            .compute_edge_routes_by_vertex(&mut graph, blocker, Some(Point::new(100.0, 400.0)), None)
            .unwrap();
        assert_eq!(affected, vec![edge]);
        assert!(!core.outcome().routes.contains_key(&edge));
        assert!(graph.edge(edge).unwrap().routing_points.is_none());

        core.remove_single_vertex(&mut graph, VertexId(2)).unwrap();
        assert!(graph.edge(edge).is_none());
        assert!(!core.positions().contains_key(&VertexId(2)));
        assert_eq!(
            core.remove_single_edge(&mut graph, edge),
            Err(ArrangeError::MissingEdge(edge))
        );
    }

    #[test]
    fn external_layout_bypasses_the_factory() {
        let mut graph = chain(3);
        let sizes = boxes(&graph);
        let mut core = LogicCore::new(Some(LayoutParams::default_for(LayoutKind::Kk)), None, None);
        let tree = create_layout(
            LayoutKind::Tree,
            None,
            None,
            Some(LayoutParams::Tree(SimpleTreeParams::default())),
        )
        .unwrap();
        core.external_layout = Some(tree);
        let outcome = core.compute(&mut graph, &sizes, None, &CancelToken::none()).unwrap();
        let p = &outcome.positions;
        assert!(p[&VertexId(2)].y > p[&VertexId(1)].y);
        assert!(p[&VertexId(3)].y > p[&VertexId(2)].y);
    }

    #[test]
    fn random_layout_with_seed_is_reproducible() {
        let params = LayoutParams::Random(RandomParams {
            seed: 42,
            ..RandomParams::default()
        });
        let run = || {
            let mut graph = chain(6);
            let sizes = boxes(&graph);
            let mut core = LogicCore::new(Some(params.clone()), Some(OverlapParams::default()), None);
            core.compute(&mut graph, &sizes, None, &CancelToken::none()).unwrap()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn failed_edge_insert_leaves_the_graph_alone() {
        let mut graph = Graph::with_vertices(2);
        let sizes = boxes(&graph);
        let seed: PositionTable = [
            (VertexId(1), Point::new(0.0, 0.0)),
            (VertexId(2), Point::new(200.0, 0.0)),
        ]
        .into_iter()
        .collect();
        let mut core = LogicCore::new(None, None, Some(RoutingParams::default()));
        core.compute(&mut graph, &sizes, Some(seed), &CancelToken::none()).unwrap();

        // known to the graph but never handed to the router
        let stray = graph.add_vertex(Vertex::new(3)).unwrap();
        let err = core.add_single_edge(&mut graph, VertexId(1), stray).unwrap_err();
        assert_eq!(err, ArrangeError::MissingVertex(stray));
        assert_eq!(graph.edge_count(), 0);
        assert!(core.outcome().routes.is_empty());

        let edge = core.add_single_edge(&mut graph, VertexId(1), VertexId(2)).unwrap();
        assert_eq!(graph.edge_count(), 1);
        assert!(graph.edge(edge).is_some());
    }

    #[test]
    fn external_layout_replaces_the_factory_instance() {
        let mut graph = chain(3);
        let sizes = boxes(&graph);
        let mut core = LogicCore::new(Some(LayoutParams::default_for(LayoutKind::Kk)), None, None);
        core.compute(&mut graph, &sizes, None, &CancelToken::none()).unwrap();
        assert!(core.layout.is_some());

        core.external_layout = Some(create_layout(LayoutKind::Tree, None, None, None).unwrap());
        core.compute(&mut graph, &sizes, None, &CancelToken::none()).unwrap();
        assert!(core.layout.is_none());

        let id = core
            .add_single_vertex(&mut graph, Vertex::new(9), Point::new(50.0, 50.0), Size::new(20.0, 20.0))
            .unwrap();
        let external = core.external_layout.as_ref().unwrap();
        assert_eq!(external.positions().get(&id), Some(&Point::new(50.0, 50.0)));
        assert_eq!(external.positions(), core.positions());
    }
}
