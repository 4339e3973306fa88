use graph_arrange::factory::needs_edge_routing;
use graph_arrange::layout::{
    CircularLayout, CircularParams, GroupParams, GroupedLayout, GroupingParams, SimpleTreeLayout,
    SimpleTreeParams,
};
use graph_arrange::overlap::{Fsa, OverlapRemovalParams};
use graph_arrange::routing::{SimpleEdgeRouting, SimpleErParams};
use graph_arrange::{
    CancelToken, EdgeRoutingAlgorithm, Graph, LayoutAlgorithm, LayoutKind, LayoutParams,
    LogicCore, OverlapParams, OverlapRemovalAlgorithm, Point, PositionTable, Rect, RectTable,
    RoutingParams, Size, SizeTable, Vertex, VertexId, create_layout,
};

const TOLERANCE: f64 = 1e-3;

fn diamond() -> Graph {
    let mut graph = Graph::with_vertices(4);
    for (s, t) in [(1, 2), (1, 3), (2, 4), (3, 4)] {
        graph
            .add_edge(VertexId(s), VertexId(t))
            .expect("diamond edge");
    }
    graph
}

fn uniform_sizes(graph: &Graph, size: Size) -> SizeTable {
    graph.vertex_ids().map(|id| (id, size)).collect()
}

fn rects_of(positions: &PositionTable, sizes: &SizeTable) -> Vec<(VertexId, Rect)> {
    positions
        .iter()
        .map(|(id, p)| (*id, Rect::from_point_size(*p, sizes[id])))
        .collect()
}

/// Shrinks the gap margin a little so float round-off in the scans is not
/// reported as an overlap.
fn assert_gap_respected(rects: &[(VertexId, Rect)], h_gap: f64, v_gap: f64) {
    let dx = (h_gap / 2.0 - TOLERANCE).max(0.0);
    let dy = (v_gap / 2.0 - TOLERANCE).max(0.0);
    for (i, (a_id, a)) in rects.iter().enumerate() {
        for (b_id, b) in &rects[i + 1..] {
            assert!(
                !a.inflate(dx, dy).intersects(&b.inflate(dx, dy)),
                "{a_id} and {b_id} are closer than the gap: {a:?} {b:?}"
            );
        }
    }
}

fn segment_crosses(rect: &Rect, a: Point, b: Point) -> bool {
    const STEPS: usize = 400;
    (0..=STEPS).any(|i| {
        let t = i as f64 / STEPS as f64;
        let p = Point::new(a.x + (b.x - a.x) * t, a.y + (b.y - a.y) * t);
        rect.contains(p)
    })
}

#[test]
fn seeded_layouts_are_reproducible() {
    let graph = diamond();
    let sizes = uniform_sizes(&graph, Size::new(30.0, 20.0));
    for kind in LayoutKind::ALL {
        let mut params = LayoutParams::default_for(kind);
        params.set_seed(42);
        let run = || {
            let mut layout = create_layout(kind, None, Some(sizes.clone()), Some(params.clone()))
                .expect("layout builds");
            layout
                .compute(&graph, &CancelToken::none())
                .expect("layout computes");
            layout.take_positions()
        };
        assert_eq!(run(), run(), "{kind} is not deterministic");
    }
}

#[test]
fn fr_then_fsa_separates_coincident_vertices() {
    let mut graph = diamond();
    let sizes: SizeTable = [
        (VertexId(1), Size::new(40.0, 20.0)),
        (VertexId(2), Size::new(60.0, 30.0)),
        (VertexId(3), Size::new(25.0, 25.0)),
        (VertexId(4), Size::new(80.0, 15.0)),
    ]
    .into_iter()
    .collect();
    let origin: PositionTable = graph.vertex_ids().map(|id| (id, Point::new(0.0, 0.0))).collect();

    let mut core = LogicCore::new(
        Some(LayoutParams::default_for(LayoutKind::Fr)),
        Some(OverlapParams::Fsa(OverlapRemovalParams {
            horizontal_gap: 10.0,
            vertical_gap: 10.0,
        })),
        None,
    );
    let outcome = core
        .compute(&mut graph, &sizes, Some(origin), &CancelToken::none())
        .expect("pipeline runs");

    assert_eq!(outcome.positions.len(), 4);
    assert!(outcome.overlap_cost.is_some());
    for p in outcome.positions.values() {
        assert!(p.is_finite());
    }
    assert!(
        outcome.positions.values().all(|p| *p != Point::new(0.0, 0.0)),
        "coincident vertices were not spread out"
    );
    assert_gap_respected(&rects_of(&outcome.positions, &sizes), 10.0, 10.0);
}

#[test]
fn fsa_keeps_the_requested_gap_on_random_piles() {
    let mut rects = RectTable::new();
    for i in 0..24u64 {
        let x = (i * 37 % 11) as f64 * 6.0;
        let y = (i * 53 % 7) as f64 * 5.0;
        let size = Size::new(20.0 + (i % 5) as f64 * 7.0, 10.0 + (i % 3) as f64 * 9.0);
        rects.insert(VertexId(i + 1), Rect::from_point_size(Point::new(x, y), size));
    }
    let mut fsa = Fsa::new(
        rects,
        OverlapRemovalParams {
            horizontal_gap: 8.0,
            vertical_gap: 4.0,
        },
    );
    fsa.compute(&CancelToken::none()).expect("fsa runs");
    let out: Vec<(VertexId, Rect)> = fsa.rectangles().iter().map(|(k, r)| (*k, *r)).collect();
    assert_eq!(out.len(), 24);
    assert_gap_respected(&out, 8.0, 4.0);
    assert!(fsa.cost() > 0.0);
}

#[test]
fn fsa_on_nothing_costs_nothing() {
    let mut fsa: Fsa<VertexId> = Fsa::new(RectTable::new(), OverlapRemovalParams::default());
    fsa.compute(&CancelToken::none()).expect("empty input is fine");
    assert!(fsa.rectangles().is_empty());
    assert_eq!(fsa.cost(), 0.0);
}

#[test]
fn unobstructed_edges_get_no_route() {
    let mut graph = Graph::with_vertices(3);
    let ab = graph.add_edge(VertexId(1), VertexId(2)).expect("edge");
    let bc = graph.add_edge(VertexId(2), VertexId(3)).expect("edge");
    let positions: PositionTable = [
        (VertexId(1), Point::new(0.0, 0.0)),
        (VertexId(2), Point::new(200.0, 0.0)),
        (VertexId(3), Point::new(200.0, 200.0)),
    ]
    .into_iter()
    .collect();
    let sizes = uniform_sizes(&graph, Size::new(20.0, 20.0));
    let mut router = SimpleEdgeRouting::new(Some(positions), Some(sizes), SimpleErParams::default());
    router.compute(&graph, &CancelToken::none()).expect("routes");
    assert!(router.edge_routes().get(&ab).is_none());
    assert!(router.edge_routes().get(&bc).is_none());
}

#[test]
fn blocked_edge_bends_around_the_obstacle() {
    let mut graph = Graph::with_vertices(3);
    let ac = graph.add_edge(VertexId(1), VertexId(3)).expect("edge");
    let positions: PositionTable = [
        (VertexId(1), Point::new(0.0, 0.0)),
        (VertexId(2), Point::new(100.0, -10.0)),
        (VertexId(3), Point::new(300.0, 0.0)),
    ]
    .into_iter()
    .collect();
    let sizes: SizeTable = [
        (VertexId(1), Size::new(20.0, 20.0)),
        (VertexId(2), Size::new(40.0, 40.0)),
        (VertexId(3), Size::new(20.0, 20.0)),
    ]
    .into_iter()
    .collect();
    let obstacle = Rect::from_point_size(positions[&VertexId(2)], sizes[&VertexId(2)]);

    let mut core = LogicCore::new(None, None, Some(RoutingParams::default()));
    let outcome = core
        .compute(&mut graph, &sizes, Some(positions), &CancelToken::none())
        .expect("pipeline runs");

    let route = outcome.routes.get(&ac).expect("edge is routed");
    assert!(route.len() >= 3, "route {route:?} has no bend");
    for pair in route.windows(2) {
        assert!(
            !segment_crosses(&obstacle, pair[0], pair[1]),
            "segment {pair:?} cuts through the obstacle"
        );
    }
    let stored = graph.edge(ac).and_then(|e| e.routing_points.clone());
    assert_eq!(stored.as_ref(), Some(route));
}

#[test]
fn self_loops_have_no_route() {
    let mut graph = Graph::with_vertices(2);
    let looped = graph.add_edge(VertexId(1), VertexId(1)).expect("self loop");
    let sizes = uniform_sizes(&graph, Size::new(30.0, 30.0));
    let mut core = LogicCore::new(
        Some(LayoutParams::default_for(LayoutKind::Circular)),
        None,
        Some(RoutingParams::default()),
    );
    core.compute(&mut graph, &sizes, None, &CancelToken::none())
        .expect("pipeline runs");
    assert!(core.is_edge_routing_needed());
    assert!(core.outcome().routes.get(&looped).is_none());
    assert!(graph.edge(looped).expect("edge").routing_points.is_none());
}

#[test]
fn tree_layers_follow_bfs_depth() {
    let mut graph = Graph::with_vertices(7);
    let edges = [(1, 2), (1, 3), (2, 4), (2, 5), (3, 6), (6, 7)];
    for (s, t) in edges {
        graph.add_edge(VertexId(s), VertexId(t)).expect("edge");
    }
    let sizes = uniform_sizes(&graph, Size::new(30.0, 20.0));
    let mut tree = SimpleTreeLayout::new(None, Some(sizes.clone()), SimpleTreeParams::default());
    tree.compute(&graph, &CancelToken::none()).expect("tree computes");

    let expected = [(1, 0), (2, 1), (3, 1), (4, 2), (5, 2), (6, 2), (7, 3)];
    for (id, depth) in expected {
        assert_eq!(tree.vertex_layer(VertexId(id)), Some(depth), "vertex {id}");
    }

    let rects = rects_of(tree.positions(), &sizes);
    for (i, (a_id, a)) in rects.iter().enumerate() {
        for (b_id, b) in &rects[i + 1..] {
            if tree.vertex_layer(*a_id) == tree.vertex_layer(*b_id) {
                assert!(!a.intersects(b), "{a_id} overlaps {b_id} in its layer");
            }
        }
    }
}

#[test]
fn grouped_vertices_stay_in_their_zones() {
    let mut graph = Graph::new();
    for id in 1..=4 {
        graph
            .add_vertex(Vertex::new(id).with_group(1))
            .expect("vertex");
    }
    for id in 5..=8 {
        graph
            .add_vertex(Vertex::new(id).with_group(2))
            .expect("vertex");
    }
    for (s, t) in [(1, 2), (2, 3), (3, 4), (5, 6), (6, 7), (7, 8), (4, 5)] {
        graph.add_edge(VertexId(s), VertexId(t)).expect("edge");
    }
    let sizes = uniform_sizes(&graph, Size::new(20.0, 20.0));
    let left_zone = Rect::new(0.0, 0.0, 1000.0, 1000.0);
    let right_zone = Rect::new(5000.0, 0.0, 1000.0, 1000.0);
    let groups = vec![
        GroupParams::new(
            1,
            Box::new(CircularLayout::new(None, None, CircularParams::default())),
        )
        .with_zone(left_zone),
        GroupParams::new(
            2,
            Box::new(CircularLayout::new(None, None, CircularParams::default())),
        )
        .with_zone(right_zone),
    ];
    let mut layout = GroupedLayout::new(None, Some(sizes), groups, GroupingParams::default());
    layout
        .compute(&graph, &CancelToken::none())
        .expect("grouped layout computes");

    let positions = layout.positions();
    assert_eq!(positions.len(), 8);
    for id in 1..=4 {
        let p = positions[&VertexId(id)];
        assert!(p.x >= left_zone.left() - TOLERANCE && p.x < right_zone.left());
        assert!(p.y >= left_zone.top() - TOLERANCE);
    }
    for id in 5..=8 {
        let p = positions[&VertexId(id)];
        assert!(p.x >= right_zone.left() - TOLERANCE);
        assert!(p.y >= right_zone.top() - TOLERANCE);
    }
}

#[test]
fn layered_kinds_bring_their_own_routes() {
    let mut graph = diamond();
    graph.add_edge(VertexId(1), VertexId(4)).expect("long edge");
    let sizes = uniform_sizes(&graph, Size::new(30.0, 20.0));
    for kind in [LayoutKind::Sugiyama, LayoutKind::EfficientSugiyama] {
        assert!(!needs_edge_routing(kind));
        let mut core = LogicCore::new(
            Some(LayoutParams::default_for(kind)),
            Some(OverlapParams::default()),
            Some(RoutingParams::default()),
        );
        assert!(!core.is_overlap_removal_needed());
        let outcome = core
            .compute(&mut graph, &sizes, None, &CancelToken::none())
            .expect("pipeline runs");
        assert_eq!(outcome.positions.len(), 4);
        assert!(outcome.overlap_cost.is_none(), "{kind} ran overlap removal");
    }
}
