use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::cancel::CancelToken;
use crate::error::Result;
use crate::geometry::{Point, Size};
use crate::ir::{Direction, Graph, PositionTable, SizeTable, VertexId};

use super::{LayoutAlgorithm, LayoutState, Topology, normalize_positions};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SpanningTreeKind {
    #[default]
    Bfs,
    Dfs,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimpleTreeParams {
    pub direction: Direction,
    /// Gap between consecutive layers.
    pub layer_gap: f64,
    /// Gap between neighbours inside a layer.
    pub vertex_gap: f64,
    pub spanning_tree: SpanningTreeKind,
    pub seed: u64,
}

impl Default for SimpleTreeParams {
    fn default() -> Self {
        Self {
            direction: Direction::TopDown,
            layer_gap: 10.0,
            vertex_gap: 10.0,
            spanning_tree: SpanningTreeKind::Bfs,
            seed: 0,
        }
    }
}

/// Children lists of a spanning forest over the directed edges.
///
/// Roots are tried in ascending in-degree order so sources come first.
pub(crate) fn spanning_forest(topo: &Topology, kind: SpanningTreeKind) -> (Vec<usize>, Vec<Vec<usize>>) {
    let n = topo.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by_key(|&v| topo.inc[v].len());

    let mut children = vec![Vec::new(); n];
    let mut visited = vec![false; n];
    for &root in &order {
        if visited[root] {
            continue;
        }
        visited[root] = true;
        match kind {
            SpanningTreeKind::Bfs => {
                let mut queue = VecDeque::from([root]);
                while let Some(cur) = queue.pop_front() {
                    for &next in &topo.out[cur] {
                        if !visited[next] {
                            visited[next] = true;
                            children[cur].push(next);
                            queue.push_back(next);
                        }
                    }
                }
            }
            SpanningTreeKind::Dfs => {
                let mut stack: Vec<(usize, usize)> = vec![(root, 0)];
                while let Some((cur, cursor)) = stack.pop() {
                    if let Some(&next) = topo.out[cur].get(cursor) {
                        stack.push((cur, cursor + 1));
                        if !visited[next] {
                            visited[next] = true;
                            children[cur].push(next);
                            stack.push((next, 0));
                        }
                    }
                }
            }
        }
    }
    (order, children)
}

#[derive(Debug, Default)]
struct Layer {
    size: f64,
    next_position: f64,
    last_translate: f64,
    vertices: Vec<usize>,
}

#[derive(Debug, Clone, Copy)]
struct Placement {
    parent: Option<usize>,
    translate: f64,
    position: f64,
}

/// Layered drawing of a spanning tree; parents are centred over their children.
#[derive(Debug, Clone)]
pub struct SimpleTreeLayout {
    state: LayoutState,
    params: SimpleTreeParams,
    layers: HashMap<VertexId, usize>,
}

impl SimpleTreeLayout {
    pub fn new(
        positions: Option<PositionTable>,
        sizes: Option<SizeTable>,
        params: SimpleTreeParams,
    ) -> Self {
        Self {
            state: LayoutState::new(positions, sizes),
            params,
            layers: HashMap::new(),
        }
    }

    /// Tree depth assigned to a vertex by the last successful compute.
    pub fn vertex_layer(&self, id: VertexId) -> Option<usize> {
        self.layers.get(&id).copied()
    }
}

struct TreeBuilder<'a> {
    children: &'a [Vec<usize>],
    sizes: &'a [Size],
    layer_gap: f64,
    vertex_gap: f64,
    layers: Vec<Layer>,
    data: Vec<Option<Placement>>,
}

/// A vertex whose children are still being placed.
#[derive(Debug)]
struct Frame {
    v: usize,
    level: usize,
    cursor: usize,
    placement: Placement,
    min_child: f64,
    max_child: f64,
}

impl TreeBuilder<'_> {
    /// Places the subtree under `root` unless `root` was already placed.
    ///
    /// Post-order walk on an explicit stack so depth is bounded by memory, not
    /// by the thread stack.
    fn place(&mut self, root: usize) {
        if self.data[root].is_some() {
            return;
        }
        let children = self.children;
        let mut stack = vec![self.enter(root, None, 0)];
        while let Some(frame) = stack.last_mut() {
            if let Some(&child) = children[frame.v].get(frame.cursor) {
                frame.cursor += 1;
                if self.data[child].is_none() {
                    let (parent, level) = (frame.v, frame.level + 1);
                    let next = self.enter(child, Some(parent), level);
                    stack.push(next);
                }
                continue;
            }
            let Some(done) = stack.pop() else { break };
            let position = self.leave(done);
            if let Some(parent) = stack.last_mut() {
                parent.min_child = parent.min_child.min(position);
                parent.max_child = parent.max_child.max(position);
            }
        }
    }

    fn enter(&mut self, v: usize, parent: Option<usize>, level: usize) -> Frame {
        while level >= self.layers.len() {
            self.layers.push(Layer::default());
        }
        let size = self.sizes[v];
        let placement = Placement {
            parent,
            translate: 0.0,
            position: 0.0,
        };
        self.data[v] = Some(placement);

        self.layers[level].next_position += size.width / 2.0;
        if level > 0 {
            let carried = self.layers[level - 1].last_translate;
            self.layers[level].next_position += carried;
            self.layers[level - 1].last_translate = 0.0;
        }
        let layer = &mut self.layers[level];
        layer.size = layer.size.max(size.height + self.layer_gap);
        layer.vertices.push(v);
        Frame {
            v,
            level,
            cursor: 0,
            placement,
            min_child: f64::MAX,
            max_child: f64::MIN,
        }
    }

    /// Centres `v` over its placed children and returns its in-layer position.
    fn leave(&mut self, frame: Frame) -> f64 {
        let Frame {
            v,
            level,
            mut placement,
            min_child,
            max_child,
            ..
        } = frame;
        let layer = &mut self.layers[level];
        if self.children[v].is_empty() {
            placement.position = layer.next_position;
        } else {
            placement.position = if min_child != f64::MAX {
                (min_child + max_child) / 2.0
            } else {
                layer.next_position
            };
            placement.translate = (layer.next_position - placement.position).max(0.0);
            layer.last_translate = placement.translate;
            placement.position += placement.translate;
            layer.next_position = placement.position;
        }
        layer.next_position += self.sizes[v].width / 2.0 + self.vertex_gap;
        self.data[v] = Some(placement);
        placement.position
    }
}

impl LayoutAlgorithm for SimpleTreeLayout {
    fn name(&self) -> &'static str {
        "simple-tree"
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
        let direction = self.params.direction;
        let swap = direction.is_horizontal();
        let sizes: Vec<Size> = topo
            .ids
            .iter()
            .map(|&id| {
                let s = self.state.size_of(id);
                if swap { s.transposed() } else { s }
            })
            .collect();

        let (order, children) = spanning_forest(&topo, self.params.spanning_tree);
        let mut has_parent = vec![false; topo.len()];
        for kids in &children {
            for &k in kids {
                has_parent[k] = true;
            }
        }

        let mut builder = TreeBuilder {
            children: &children,
            sizes: &sizes,
            layer_gap: self.params.layer_gap,
            vertex_gap: self.params.vertex_gap,
            layers: Vec::new(),
            data: vec![None; topo.len()],
        };
        for &root in order.iter().filter(|&&v| !has_parent[v]) {
            cancel.check()?;
            builder.place(root);
        }
        for &v in &order {
            builder.place(v);
        }

        let sign = if direction.is_reversed() { -1.0 } else { 1.0 };
        let mut positions = PositionTable::new();
        let mut layer_of = HashMap::new();
        let mut layer_offset = 0.0;
        let TreeBuilder { layers, mut data, .. } = builder;
        for (level, layer) in layers.iter().enumerate() {
            cancel.check()?;
            for &v in &layer.vertices {
                let Some(mut d) = data[v] else { continue };
                if let Some(parent) = d.parent
                    && let Some(pd) = data[parent]
                {
                    d.position += pd.translate;
                    d.translate += pd.translate;
                }
                data[v] = Some(d);
                let size = sizes[v];
                let across = sign * (layer_offset + size.height / 2.0);
                let center = if swap {
                    Point::new(across, d.position)
                } else {
                    Point::new(d.position, across)
                };
                let id = topo.ids[v];
                positions.insert(id, center - self.state.size_of(id).half());
                layer_of.insert(id, level);
            }
            layer_offset += layer.size;
        }
        normalize_positions(&mut positions, 0.0);

        self.state.positions.extend(positions);
        self.layers = layer_of;
        log::debug!(
            "simple tree layout: {} vertices in {} layers",
            topo.len(),
            layers.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::test_support::*;

    fn sample_tree() -> Graph {
        graph_with_edges(7, &[(1, 2), (1, 3), (2, 4), (2, 5), (3, 6), (3, 7)])
    }

    fn run(graph: &Graph, params: SimpleTreeParams) -> SimpleTreeLayout {
        let sizes = uniform_sizes(graph, 20.0, 10.0);
        let mut layout = SimpleTreeLayout::new(None, Some(sizes), params);
        layout.compute(graph, &CancelToken::none()).unwrap();
        layout
    }

    #[test]
    fn layer_matches_tree_depth() {
        let graph = sample_tree();
        let layout = run(&graph, SimpleTreeParams::default());
        let depth = [0, 1, 1, 2, 2, 2, 2];
        for (idx, d) in depth.iter().enumerate() {
            let id = VertexId(idx as u64 + 1);
            assert_eq!(layout.vertex_layer(id), Some(*d));
            // layer pitch is height + layer gap
            assert!((layout.positions()[&id].y - *d as f64 * 20.0).abs() < 1e-9);
        }
    }

    #[test]
    fn siblings_do_not_overlap_and_parents_are_centred() {
        let graph = sample_tree();
        let layout = run(&graph, SimpleTreeParams::default());
        let p = layout.positions();
        let leaves: Vec<f64> = [4, 5, 6, 7].iter().map(|&i| p[&VertexId(i)].x).collect();
        for pair in leaves.windows(2) {
            assert!(pair[1] - pair[0] >= 20.0 + 10.0 - 1e-9);
        }
        let mid = (p[&VertexId(4)].x + p[&VertexId(5)].x) / 2.0;
        assert!((p[&VertexId(2)].x - mid).abs() < 1e-9);
        assert!(p.values().all(|q| q.x >= 0.0 && q.y >= 0.0));
    }

    #[test]
    fn left_right_swaps_axes() {
        let graph = sample_tree();
        let params = SimpleTreeParams {
            direction: Direction::LeftRight,
            spanning_tree: SpanningTreeKind::Dfs,
            ..SimpleTreeParams::default()
        };
        let layout = run(&graph, params);
        let p = layout.positions();
        assert!(p[&VertexId(2)].x > p[&VertexId(1)].x);
        assert!(p[&VertexId(4)].x > p[&VertexId(2)].x);
        assert_eq!(p[&VertexId(4)].x, p[&VertexId(7)].x);
    }

    #[test]
    fn bottom_up_puts_root_last() {
        let graph = sample_tree();
        let params = SimpleTreeParams {
            direction: Direction::BottomUp,
            ..SimpleTreeParams::default()
        };
        let layout = run(&graph, params);
        let p = layout.positions();
        assert!(p[&VertexId(1)].y > p[&VertexId(2)].y);
        assert!(p.values().all(|q| q.y >= 0.0));
    }

    #[test]
    fn deep_chain_is_laid_out_without_recursion() {
        let n = 20_000;
        let edges: Vec<(u64, u64)> = (1..n).map(|i| (i, i + 1)).collect();
        let graph = graph_with_edges(n, &edges);
        let layout = run(&graph, SimpleTreeParams::default());
        assert_eq!(layout.positions().len(), n as usize);
        assert_eq!(layout.vertex_layer(VertexId(n)), Some(n as usize - 1));
        let first = layout.positions()[&VertexId(1)];
        let last = layout.positions()[&VertexId(n)];
        assert_eq!(first.x, last.x);
        assert!(last.y > first.y);
    }
}
