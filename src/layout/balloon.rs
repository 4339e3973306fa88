use std::collections::HashSet;
use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::cancel::CancelToken;
use crate::error::{ArrangeError, Result};
use crate::geometry::{Point, Rect, Vector, bounding_rect};
use crate::ir::{Graph, PositionTable, SizeTable, VertexId};

use super::{LayoutAlgorithm, LayoutState, Topology, normalize_positions};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BalloonTreeParams {
    /// Smallest radius a leaf balloon may have.
    pub min_radius: f64,
    /// Margin around the drawing and between disconnected components.
    pub border: f64,
    /// Root of the first balloon; the vertex with the lowest in-degree when unset.
    pub root: Option<VertexId>,
    pub seed: u64,
}

impl Default for BalloonTreeParams {
    fn default() -> Self {
        Self {
            min_radius: 2.0,
            border: 20.0,
            root: None,
            seed: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Balloon {
    /// Largest child radius.
    d: f64,
    /// Radius of the balloon around this subtree.
    r: f64,
    /// Angular width claimed by this subtree at its parent.
    a: f64,
    /// Scale applied to child angles when they overflow a half turn.
    c: f64,
    /// Spare angle spread evenly between children.
    f: f64,
}

/// Radial tree drawing: every subtree sits in its own circle around the parent.
#[derive(Debug, Clone)]
pub struct BalloonTreeLayout {
    state: LayoutState,
    params: BalloonTreeParams,
}

impl BalloonTreeLayout {
    pub fn new(
        positions: Option<PositionTable>,
        sizes: Option<SizeTable>,
        params: BalloonTreeParams,
    ) -> Self {
        Self {
            state: LayoutState::new(positions, sizes),
            params,
        }
    }
}

struct Walker<'a> {
    topo: &'a Topology,
    min_radius: f64,
    data: Vec<Balloon>,
    visited: HashSet<usize>,
    centers: Vec<Option<Point>>,
}

/// Radii grow geometrically with depth; capping them keeps deep chains finite.
const MAX_RADIUS: f64 = 1e9;

#[derive(Debug, Clone, Copy)]
struct RadiusFrame {
    v: usize,
    cursor: usize,
    /// Largest child radius seen so far.
    d: f64,
    /// Sum of child angles so far.
    s: f64,
}

#[derive(Debug, Clone, Copy)]
struct PlaceFrame {
    v: usize,
    cursor: usize,
    at: Point,
    /// Angle of the last placed child.
    p: f64,
    /// Half-width of the last placed child.
    pr: f64,
}

impl Walker<'_> {
    /// Postorder pass computing subtree radii.
    fn first_walk(&mut self, root: usize) {
        let topo = self.topo;
        self.visited.insert(root);
        let mut stack = vec![RadiusFrame {
            v: root,
            cursor: 0,
            d: 0.0,
            s: 0.0,
        }];
        while let Some(frame) = stack.last_mut() {
            if let Some(&child) = topo.out[frame.v].get(frame.cursor) {
                frame.cursor += 1;
                if self.visited.insert(child) {
                    stack.push(RadiusFrame {
                        v: child,
                        cursor: 0,
                        d: 0.0,
                        s: 0.0,
                    });
                }
                continue;
            }
            let Some(done) = stack.pop() else { break };
            let node = &mut self.data[done.v];
            node.d = done.d;
            if done.s > PI {
                node.c = PI / done.s;
                node.f = 0.0;
            } else {
                node.c = 1.0;
                node.f = PI - done.s;
            }
            node.r = (done.d.max(self.min_radius) + 2.0 * done.d).min(MAX_RADIUS);

            if let Some(parent) = stack.last_mut() {
                let child_r = node.r;
                parent.d = parent.d.max(child_r);
                let a = (child_r / (parent.d + child_r)).atan();
                node.a = a;
                parent.s += a;
            }
        }
    }

    /// Preorder pass placing each child on its parent's ring.
    fn second_walk(&mut self, root: usize, at: Point, scale: f64, theta: f64) {
        let topo = self.topo;
        let mut stack = vec![self.enter(root, at, theta)];
        while let Some(frame) = stack.last_mut() {
            let Some(&child) = topo.out[frame.v].get(frame.cursor) else {
                stack.pop();
                continue;
            };
            frame.cursor += 1;
            if self.visited.contains(&child) {
                continue;
            }
            let node = self.data[frame.v];
            let degree = topo.out[frame.v].len();
            let fs = node.f / degree as f64;
            let aa = node.c * self.data[child].a;
            let t = aa.tan();
            let rr = node.d * t / (1.0 - t);
            frame.p += frame.pr + aa + fs;
            let reach = scale * rr + scale * node.d;
            let next = frame.at + Vector::new(reach * frame.p.cos(), reach * frame.p.sin());
            frame.pr = aa;
            let p = frame.p;
            let entered = self.enter(child, next, p);
            stack.push(entered);
        }
    }

    fn enter(&mut self, v: usize, at: Point, theta: f64) -> PlaceFrame {
        self.centers[v] = Some(at);
        self.visited.insert(v);
        PlaceFrame {
            v,
            cursor: 0,
            at,
            p: theta + PI,
            pr: 0.0,
        }
    }
}

impl LayoutAlgorithm for BalloonTreeLayout {
    fn name(&self) -> &'static str {
        "balloon-tree"
    }

    fn state(&self) -> &LayoutState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut LayoutState {
        &mut self.state
    }

    fn compute(&mut self, graph: &Graph, cancel: &CancelToken) -> Result<()> {
        let topo = Topology::new(graph);
        if topo.is_empty() {
            return Ok(());
        }
        let mut order: Vec<usize> = (0..topo.len()).collect();
        order.sort_by_key(|&v| topo.inc[v].len());
        if let Some(root) = self.params.root {
            let Some(&idx) = topo.index.get(&root) else {
                return Err(ArrangeError::MissingVertex(root));
            };
            order.retain(|&v| v != idx);
            order.insert(0, idx);
        }

        let mut walker = Walker {
            topo: &topo,
            min_radius: self.params.min_radius,
            data: vec![Balloon::default(); topo.len()],
            visited: HashSet::new(),
            centers: vec![None; topo.len()],
        };

        let border = self.params.border;
        let mut positions = PositionTable::new();
        let mut cursor_x = border;
        let mut components = 0usize;
        for &root in &order {
            if walker.centers[root].is_some() {
                continue;
            }
            cancel.check()?;
            // earlier components are off limits to both walks
            let placed: HashSet<usize> = (0..topo.len())
                .filter(|&v| walker.centers[v].is_some())
                .collect();
            walker.visited = placed.clone();
            walker.first_walk(root);
            walker.visited = placed;
            walker.second_walk(root, Point::ORIGIN, 1.0, 0.0);

            let members: Vec<usize> = walker
                .visited
                .iter()
                .copied()
                .filter(|v| !positions.contains_key(&topo.ids[*v]))
                .collect();
            let footprints: Vec<(VertexId, Rect)> = members
                .iter()
                .filter_map(|&v| {
                    let id = topo.ids[v];
                    let size = self.state.size_of(id);
                    walker.centers[v].map(|c| (id, Rect::from_point_size(c - size.half(), size)))
                })
                .collect();
            let Some(bounds) = bounding_rect(footprints.iter().map(|(_, r)| r)) else {
                continue;
            };
            let shift = Vector::new(cursor_x - bounds.left(), border - bounds.top());
            for (id, rect) in &footprints {
                positions.insert(*id, rect.top_left() + shift);
            }
            cursor_x += bounds.width + border;
            components += 1;
        }
        normalize_positions(&mut positions, border);

        self.state.positions.extend(positions);
        log::debug!(
            "balloon tree layout: {} vertices in {} components",
            topo.len(),
            components
        );
        Ok(())
    }
}
