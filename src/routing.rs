//! Obstacle-avoiding edge routing.
//!
//! [`SimpleEdgeRouting`] walks each edge from source centre to target centre.
//! Whenever the current straight segment enters another vertex footprint it
//! backs off from the entry point and side-steps perpendicular to the segment
//! until it finds a waypoint that clears the obstacle. The search is greedy
//! and bounded; an obstacle that cannot be cleared within the attempt budget
//! is dropped and the straight segment is accepted.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::cancel::CancelToken;
use crate::error::{ArrangeError, Result};
use crate::geometry::{EPSILON, Point, Rect, Size, Vector};
use crate::ir::{Edge, EdgeId, EdgeRoutes, Graph, PositionTable, SizeTable, VertexId};

/// Side-step attempts per obstacle before the straight segment is accepted.
pub const MAX_ROUTE_ATTEMPTS: usize = 300;

pub trait EdgeRoutingAlgorithm: Send {
    fn name(&self) -> &'static str;

    /// Routes every edge of `graph`. On error the previous routes are kept.
    fn compute(&mut self, graph: &Graph, cancel: &CancelToken) -> Result<()>;

    /// Recomputes the route of one edge against the current tables.
    fn compute_single(&mut self, graph: &Graph, edge: EdgeId) -> Result<()>;

    /// Records a moved or resized vertex without recomputing anything.
    fn update_vertex_data(&mut self, vertex: VertexId, position: Point, size: Size);

    fn remove_vertex(&mut self, vertex: VertexId);

    fn remove_edge(&mut self, edge: EdgeId);

    fn positions(&self) -> &PositionTable;

    fn set_positions(&mut self, positions: PositionTable);

    fn sizes(&self) -> &SizeTable;

    fn set_sizes(&mut self, sizes: SizeTable);

    /// Routes with at least one bend; edges without an entry render straight.
    fn edge_routes(&self) -> &EdgeRoutes;

    fn area_rectangle(&self) -> Option<Rect>;

    fn set_area_rectangle(&mut self, area: Option<Rect>);
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimpleErParams {
    /// Distance between consecutive side-step candidates.
    pub side_step: f64,
    /// How far to retreat from the obstacle entry point before side-stepping.
    pub back_step: f64,
    /// Padding added around every vertex footprint.
    pub vertex_margin: f64,
    pub max_attempts: usize,
}

impl Default for SimpleErParams {
    fn default() -> Self {
        Self {
            side_step: 5.0,
            back_step: 10.0,
            vertex_margin: 5.0,
            max_attempts: MAX_ROUTE_ATTEMPTS,
        }
    }
}

// ── Clipping ─────────────────────────────────────────────────────────

const LEFT: u8 = 1;
const RIGHT: u8 = 2;
const TOP: u8 = 4;
const BOTTOM: u8 = 8;

fn outcode(r: &Rect, p: Point) -> u8 {
    let mut code = 0;
    if p.x < r.left() {
        code |= LEFT;
    } else if p.x > r.right() {
        code |= RIGHT;
    }
    if p.y < r.top() {
        code |= TOP;
    } else if p.y > r.bottom() {
        code |= BOTTOM;
    }
    code
}

/// Cohen-Sutherland clip: the point where segment `a -> b` first enters `r`.
pub(crate) fn clip_entry(r: &Rect, a: Point, b: Point) -> Option<Point> {
    let (mut p0, mut p1) = (a, b);
    let (mut c0, mut c1) = (outcode(r, p0), outcode(r, p1));
    // each round moves one endpoint onto a rectangle edge
    for _ in 0..8 {
        if c0 | c1 == 0 {
            return Some(p0);
        }
        if c0 & c1 != 0 {
            return None;
        }
        let out = if c0 != 0 { c0 } else { c1 };
        let (dx, dy) = (p1.x - p0.x, p1.y - p0.y);
        let p = if out & TOP != 0 {
            Point::new(p0.x + dx * (r.top() - p0.y) / dy, r.top())
        } else if out & BOTTOM != 0 {
            Point::new(p0.x + dx * (r.bottom() - p0.y) / dy, r.bottom())
        } else if out & RIGHT != 0 {
            Point::new(r.right(), p0.y + dy * (r.right() - p0.x) / dx)
        } else {
            Point::new(r.left(), p0.y + dy * (r.left() - p0.x) / dx)
        };
        if out == c0 {
            p0 = p;
            c0 = outcode(r, p0);
        } else {
            p1 = p;
            c1 = outcode(r, p1);
        }
    }
    None
}

pub(crate) fn segment_hits(r: &Rect, a: Point, b: Point) -> bool {
    clip_entry(r, a, b).is_some()
}

/// Retreat from `hit` toward `from` by `distance` on each axis, never past `from`.
fn drawback_point(from: Point, hit: Point, distance: f64) -> Point {
    let axis = |start: f64, at: f64| {
        if (start - at).abs() < distance {
            start
        } else if start < at {
            at - distance
        } else {
            at + distance
        }
    };
    Point::new(axis(from.x, hit.x), axis(from.y, hit.y))
}

// ── Router ───────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Obstacle {
    id: VertexId,
    rect: Rect,
}

/// Greedy side-stepping router.
#[derive(Debug, Clone, Default)]
pub struct SimpleEdgeRouting {
    positions: PositionTable,
    sizes: SizeTable,
    routes: EdgeRoutes,
    area: Option<Rect>,
    params: SimpleErParams,
}

impl SimpleEdgeRouting {
    pub fn new(
        positions: Option<PositionTable>,
        sizes: Option<SizeTable>,
        params: SimpleErParams,
    ) -> Self {
        Self {
            positions: positions.unwrap_or_default(),
            sizes: sizes.unwrap_or_default(),
            routes: EdgeRoutes::new(),
            area: None,
            params,
        }
    }

    fn size_of(&self, id: VertexId) -> Size {
        self.sizes.get(&id).copied().unwrap_or(Size::ZERO)
    }

    fn center_of(&self, id: VertexId) -> Result<Point> {
        self.positions
            .get(&id)
            .map(|p| *p + self.size_of(id).half())
            .ok_or(ArrangeError::MissingVertex(id))
    }

    fn obstacles(&self, graph: &Graph) -> Vec<Obstacle> {
        let margin = self.params.vertex_margin;
        graph
            .vertices()
            .iter()
            .filter(|v| !v.is_excluded())
            .filter_map(|v| {
                let p = self.positions.get(&v.id)?;
                let rect = Rect::from_point_size(*p, self.size_of(v.id)).inflate(margin, margin);
                (!rect.is_empty()).then_some(Obstacle { id: v.id, rect })
            })
            .collect()
    }

    fn routable(graph: &Graph, edge: &Edge) -> bool {
        let excluded = |id| graph.vertex(id).is_none_or(|v| v.is_excluded());
        !edge.is_self_loop() && !excluded(edge.source) && !excluded(edge.target)
    }

    /// Bend points for one edge, or `None` when the straight line is clear.
    fn route_edge(
        &self,
        edge: &Edge,
        obstacles: &[Obstacle],
        cancel: &CancelToken,
    ) -> Result<Option<Vec<Point>>> {
        let start = self.center_of(edge.source)?;
        let end = self.center_of(edge.target)?;
        if start.distance(end) < EPSILON {
            return Ok(None);
        }
        let others: Vec<Obstacle> = obstacles
            .iter()
            .filter(|o| o.id != edge.source && o.id != edge.target)
            .cloned()
            .collect();
        // a footprint holding an endpoint cannot be avoided
        let mut remaining: Vec<&Obstacle> = others
            .iter()
            .filter(|o| !o.rect.contains(start) && !o.rect.contains(end))
            .collect();

        let mut points = vec![start];
        let mut drawback = self.params.back_step;
        let mut spent = 0usize;
        loop {
            cancel.check()?;
            let Some(&current) = points.last() else {
                break;
            };
            let hit = remaining
                .iter()
                .enumerate()
                .filter_map(|(idx, o)| clip_entry(&o.rect, current, end).map(|p| (idx, p)))
                .min_by(|a, b| current.distance(a.1).total_cmp(&current.distance(b.1)));
            let Some((idx, entry)) = hit else {
                break;
            };

            let rect = remaining[idx].rect;
            match self.side_step(current, entry, end, &rect, &others, drawback, &mut spent, cancel)? {
                Step::Found(waypoint) => {
                    points.push(waypoint);
                    remaining.swap_remove(idx);
                    drawback = self.params.back_step;
                    spent = 0;
                }
                Step::BothBlocked => drawback += self.params.back_step,
                Step::Exhausted => {
                    log::warn!(
                        "edge {}: no detour around vertex {} after {} attempts; keeping straight segment",
                        edge.id,
                        remaining[idx].id,
                        spent
                    );
                    remaining.swap_remove(idx);
                    drawback = self.params.back_step;
                    spent = 0;
                }
            }
        }

        points.push(end);
        Ok((points.len() > 2).then_some(points))
    }

    /// Searches alternating sides of the segment for a waypoint clearing `rect`.
    #[allow(clippy::too_many_arguments)]
    fn side_step(
        &self,
        current: Point,
        entry: Point,
        end: Point,
        rect: &Rect,
        obstacles: &[Obstacle],
        drawback: f64,
        spent: &mut usize,
        cancel: &CancelToken,
    ) -> Result<Step> {
        let main = end - current;
        let length = main.length();
        if length < EPSILON || *spent >= self.params.max_attempts {
            return Ok(Step::Exhausted);
        }
        let normal = Vector::new(main.y / length, -main.x / length);
        let anchor = drawback_point(current, entry, drawback);

        let mut blocked: Option<bool> = None;
        let mut round = 0usize;
        while *spent < self.params.max_attempts {
            cancel.check()?;
            *spent += 1;
            let flip = match blocked {
                Some(side) => !side,
                None => round % 2 == 1,
            };
            let distance = self.params.side_step * (round / 2 + 1) as f64;
            round += 1;
            let sign = if flip { 1.0 } else { -1.0 };
            let candidate = anchor + normal * (sign * distance);

            let inside_vertex = obstacles.iter().any(|o| o.rect.contains(candidate));
            let outside_area = self.area.is_some_and(|a| !a.contains(candidate));
            if inside_vertex || outside_area {
                match blocked {
                    None => {
                        blocked = Some(flip);
                        continue;
                    }
                    Some(_) => return Ok(Step::BothBlocked),
                }
            }
            if segment_hits(rect, candidate, end) || segment_hits(rect, current, candidate) {
                continue;
            }
            return Ok(Step::Found(candidate));
        }
        Ok(Step::Exhausted)
    }
}

enum Step {
    Found(Point),
    BothBlocked,
    Exhausted,
}

impl EdgeRoutingAlgorithm for SimpleEdgeRouting {
    fn name(&self) -> &'static str {
        "simple-er"
    }

    fn compute(&mut self, graph: &Graph, cancel: &CancelToken) -> Result<()> {
        let obstacles = self.obstacles(graph);
        let mut routes = BTreeMap::new();
        for edge in graph.edges() {
            if !Self::routable(graph, edge) {
                continue;
            }
            if let Some(points) = self.route_edge(edge, &obstacles, cancel)? {
                routes.insert(edge.id, points);
            }
        }
        log::debug!(
            "simple edge routing: {} of {} edges bent around {} obstacles",
            routes.len(),
            graph.edge_count(),
            obstacles.len()
        );
        self.routes = routes;
        Ok(())
    }

    fn compute_single(&mut self, graph: &Graph, edge: EdgeId) -> Result<()> {
        let item = graph.edge(edge).ok_or(ArrangeError::MissingEdge(edge))?;
        if !Self::routable(graph, item) {
            self.routes.remove(&edge);
            return Ok(());
        }
        let obstacles = self.obstacles(graph);
        match self.route_edge(item, &obstacles, &CancelToken::none())? {
            Some(points) => {
                self.routes.insert(edge, points);
            }
            None => {
                self.routes.remove(&edge);
            }
        }
        Ok(())
    }

    fn update_vertex_data(&mut self, vertex: VertexId, position: Point, size: Size) {
        self.positions.insert(vertex, position);
        self.sizes.insert(vertex, size);
    }

    fn remove_vertex(&mut self, vertex: VertexId) {
        self.positions.remove(&vertex);
        self.sizes.remove(&vertex);
    }

    fn remove_edge(&mut self, edge: EdgeId) {
        self.routes.remove(&edge);
    }

    fn positions(&self) -> &PositionTable {
        &self.positions
    }

    fn set_positions(&mut self, positions: PositionTable) {
        self.positions = positions;
    }

    fn sizes(&self) -> &SizeTable {
        &self.sizes
    }

    fn set_sizes(&mut self, sizes: SizeTable) {
        self.sizes = sizes;
    }

    fn edge_routes(&self) -> &EdgeRoutes {
        &self.routes
    }

    fn area_rectangle(&self) -> Option<Rect> {
        self.area
    }

    fn set_area_rectangle(&mut self, area: Option<Rect>) {
        self.area = area;
    }
}

/// Edges whose route may change when `vertex` moves: its own edges plus any
/// edge whose straight line or current polyline crosses `footprint`.
pub(crate) fn edges_affected_by(
    graph: &Graph,
    router: &dyn EdgeRoutingAlgorithm,
    vertex: VertexId,
    footprint: Rect,
) -> Vec<EdgeId> {
    let center = |id: VertexId| {
        let size = router.sizes().get(&id).copied().unwrap_or(Size::ZERO);
        router.positions().get(&id).map(|p| *p + size.half())
    };
    graph
        .edges()
        .iter()
        .filter(|edge| {
            if edge.touches(vertex) {
                return true;
            }
            let straight = match (center(edge.source), center(edge.target)) {
                (Some(a), Some(b)) => segment_hits(&footprint, a, b),
                _ => false,
            };
            straight
                || router
                    .edge_routes()
                    .get(&edge.id)
                    .is_some_and(|points| points.windows(2).any(|s| segment_hits(&footprint, s[0], s[1])))
        })
        .map(|edge| edge.id)
        .collect()
}
