//! Shared machinery of the layered (Sugiyama-style) layouts: cycle breaking,
//! ranking, dummy chains for long edges, crossing reduction and coordinate
//! assignment. Everything works in top-down coordinates (breadth along x,
//! layers along y) and is rotated into the requested direction at the end.

use std::collections::VecDeque;

use crate::cancel::CancelToken;
use crate::error::Result;
use crate::geometry::{EPSILON, Point, Size, Vector};
use crate::ir::{Direction, EdgeId, EdgeRoutes, PositionTable};

use super::{LayoutState, Topology};

// ── Cycle breaking ─────────────────────────────────────────────────

/// Marks DFS back edges; reversing them leaves an acyclic graph.
pub(crate) fn dfs_reversed_edges(topo: &Topology) -> Vec<bool> {
    let n = topo.len();
    let mut out_edges: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (idx, e) in topo.edges.iter().enumerate() {
        out_edges[e.source].push(idx);
    }
    // 0 = unvisited, 1 = on stack, 2 = done
    let mut mark = vec![0u8; n];
    let mut reversed = vec![false; topo.edges.len()];
    for root in 0..n {
        if mark[root] != 0 {
            continue;
        }
        mark[root] = 1;
        let mut stack: Vec<(usize, usize)> = vec![(root, 0)];
        while let Some(top) = stack.last_mut() {
            let v = top.0;
            if let Some(&edge) = out_edges[v].get(top.1) {
                top.1 += 1;
                let next = topo.edges[edge].target;
                match mark[next] {
                    0 => {
                        mark[next] = 1;
                        stack.push((next, 0));
                    }
                    1 => reversed[edge] = true,
                    _ => {}
                }
            } else {
                mark[v] = 2;
                stack.pop();
            }
        }
    }
    reversed
}

/// Eades-Lin-Smyth greedy ordering: sinks go to the back, sources to the
/// front, otherwise the vertex with the largest out-minus-in degree. Edges
/// pointing backwards in that order are reversed.
pub(crate) fn greedy_reversed_edges(topo: &Topology) -> Vec<bool> {
    let n = topo.len();
    let mut removed = vec![false; n];
    let mut out_deg: Vec<usize> = vec![0; n];
    let mut in_deg: Vec<usize> = vec![0; n];
    for e in &topo.edges {
        out_deg[e.source] += 1;
        in_deg[e.target] += 1;
    }
    let mut front: Vec<usize> = Vec::with_capacity(n);
    let mut back: Vec<usize> = Vec::new();
    let mut remaining = n;

    let drop_vertex = |v: usize,
                           removed: &mut Vec<bool>,
                           out_deg: &mut Vec<usize>,
                           in_deg: &mut Vec<usize>| {
        removed[v] = true;
        for e in &topo.edges {
            if e.source == v && !removed[e.target] {
                in_deg[e.target] -= 1;
            }
            if e.target == v && !removed[e.source] {
                out_deg[e.source] -= 1;
            }
        }
    };

    while remaining > 0 {
        let mut progressed = true;
        while progressed {
            progressed = false;
            for v in 0..n {
                if !removed[v] && out_deg[v] == 0 {
                    back.push(v);
                    drop_vertex(v, &mut removed, &mut out_deg, &mut in_deg);
                    remaining -= 1;
                    progressed = true;
                }
            }
            for v in 0..n {
                if !removed[v] && in_deg[v] == 0 {
                    front.push(v);
                    drop_vertex(v, &mut removed, &mut out_deg, &mut in_deg);
                    remaining -= 1;
                    progressed = true;
                }
            }
        }
        if remaining == 0 {
            break;
        }
        let pick = (0..n)
            .filter(|&v| !removed[v])
            .max_by_key(|&v| (out_deg[v] as i64 - in_deg[v] as i64, std::cmp::Reverse(v)));
        if let Some(v) = pick {
            front.push(v);
            drop_vertex(v, &mut removed, &mut out_deg, &mut in_deg);
            remaining -= 1;
        }
    }
    back.reverse();
    front.extend(back);

    let mut order = vec![0usize; n];
    for (slot, &v) in front.iter().enumerate() {
        order[v] = slot;
    }
    topo.edges
        .iter()
        .map(|e| order[e.source] > order[e.target])
        .collect()
}

// ── Ranking ────────────────────────────────────────────────────────

fn topological_order(n: usize, edges: &[(usize, usize)]) -> Vec<usize> {
    let mut indeg = vec![0usize; n];
    let mut succ: Vec<Vec<usize>> = vec![Vec::new(); n];
    for &(s, t) in edges {
        indeg[t] += 1;
        succ[s].push(t);
    }
    let mut queue: VecDeque<usize> = (0..n).filter(|&v| indeg[v] == 0).collect();
    let mut order = Vec::with_capacity(n);
    while let Some(v) = queue.pop_front() {
        order.push(v);
        for &t in &succ[v] {
            indeg[t] -= 1;
            if indeg[t] == 0 {
                queue.push_back(t);
            }
        }
    }
    order
}

/// Longest path from the sources; every edge spans at least one rank.
pub(crate) fn longest_path_ranks(n: usize, edges: &[(usize, usize)]) -> Vec<usize> {
    let mut rank = vec![0usize; n];
    let mut incoming: Vec<Vec<usize>> = vec![Vec::new(); n];
    for &(s, t) in edges {
        incoming[t].push(s);
    }
    for v in topological_order(n, edges) {
        rank[v] = incoming[v].iter().map(|&s| rank[s] + 1).max().unwrap_or(0);
    }
    rank
}

/// Like [`longest_path_ranks`] but a rank holds at most `cap` real vertices;
/// overflowing vertices move down to the next rank with room.
pub(crate) fn width_capped_ranks(n: usize, edges: &[(usize, usize)], cap: usize) -> Vec<usize> {
    let cap = cap.max(1);
    let mut rank = vec![0usize; n];
    let mut incoming: Vec<Vec<usize>> = vec![Vec::new(); n];
    for &(s, t) in edges {
        incoming[t].push(s);
    }
    let mut fill: Vec<usize> = Vec::new();
    for v in topological_order(n, edges) {
        let mut r = incoming[v].iter().map(|&s| rank[s] + 1).max().unwrap_or(0);
        loop {
            if fill.len() <= r {
                fill.resize(r + 1, 0);
            }
            if fill[r] < cap {
                break;
            }
            r += 1;
        }
        fill[r] += 1;
        rank[v] = r;
    }
    rank
}

// ── Layered graph ──────────────────────────────────────────────────

/// One original edge as a path through consecutive layers.
#[derive(Debug, Clone)]
pub(crate) struct Chain {
    pub edge: EdgeId,
    /// Upper end first; includes both real endpoints.
    pub nodes: Vec<usize>,
    pub reversed: bool,
}

/// Real vertices keep their topology index; dummies are appended after them.
#[derive(Debug, Clone)]
pub(crate) struct LayeredGraph {
    pub real: usize,
    pub rank: Vec<usize>,
    pub layers: Vec<Vec<usize>>,
    pub upper: Vec<Vec<usize>>,
    pub lower: Vec<Vec<usize>>,
    pub chains: Vec<Chain>,
}

impl LayeredGraph {
    pub fn build(topo: &Topology, reversed: &[bool], ranks: Vec<usize>) -> Self {
        let real = topo.len();
        let mut rank = ranks;
        let mut upper: Vec<Vec<usize>> = vec![Vec::new(); real];
        let mut lower: Vec<Vec<usize>> = vec![Vec::new(); real];
        let mut chains = Vec::with_capacity(topo.edges.len());
        for (idx, e) in topo.edges.iter().enumerate() {
            let flip = reversed.get(idx).copied().unwrap_or(false);
            let (s, t) = if flip { (e.target, e.source) } else { (e.source, e.target) };
            if rank[t] <= rank[s] {
                continue;
            }
            let mut nodes = vec![s];
            for r in (rank[s] + 1)..rank[t] {
                rank.push(r);
                upper.push(Vec::new());
                lower.push(Vec::new());
                nodes.push(rank.len() - 1);
            }
            nodes.push(t);
            for pair in nodes.windows(2) {
                lower[pair[0]].push(pair[1]);
                upper[pair[1]].push(pair[0]);
            }
            chains.push(Chain {
                edge: e.id,
                nodes,
                reversed: flip,
            });
        }
        let depth = rank.iter().max().map_or(0, |r| r + 1);
        let mut layers = vec![Vec::new(); depth];
        for (v, &r) in rank.iter().enumerate() {
            layers[r].push(v);
        }
        Self {
            real,
            rank,
            layers,
            upper,
            lower,
            chains,
        }
    }

    pub fn node_count(&self) -> usize {
        self.rank.len()
    }

    pub fn is_dummy(&self, v: usize) -> bool {
        v >= self.real
    }

    /// Index of every node inside its layer.
    pub fn positions(&self) -> Vec<usize> {
        let mut pos = vec![0; self.node_count()];
        for layer in &self.layers {
            for (i, &v) in layer.iter().enumerate() {
                pos[v] = i;
            }
        }
        pos
    }

    /// Crossings between layer `r` and `r + 1`.
    pub fn crossings_below(&self, r: usize, pos: &[usize]) -> u64 {
        let Some(next) = self.layers.get(r + 1) else {
            return 0;
        };
        let pairs: Vec<(usize, usize)> = self.layers[r]
            .iter()
            .flat_map(|&u| self.lower[u].iter().map(move |&l| (pos[u], pos[l])))
            .collect();
        count_bilayer_crossings(next.len(), &pairs)
    }

    pub fn crossings(&self) -> u64 {
        let pos = self.positions();
        (0..self.layers.len().saturating_sub(1))
            .map(|r| self.crossings_below(r, &pos))
            .sum()
    }
}

/// Number of crossings between two layers.
///
/// `edges` are `(upper position, lower position)` pairs; `lower_len` is the
/// number of slots in the lower layer. The pairs are radix sorted and
/// inversions among lower positions are counted with an accumulator tree
/// (Barth, Jünger and Mutzel), in `O(|E| log |lower|)`.
pub fn count_bilayer_crossings(lower_len: usize, edges: &[(usize, usize)]) -> u64 {
    if edges.len() < 2 {
        return 0;
    }
    let lower_len = lower_len.max(edges.iter().map(|&(_, l)| l + 1).max().unwrap_or(0));
    let upper_len = edges.iter().map(|&(u, _)| u + 1).max().unwrap_or(0);

    // two stable counting sorts give lexicographic (upper, lower) order
    let by_lower = counting_sort(edges, lower_len, |e| e.1);
    let sorted = counting_sort(&by_lower, upper_len, |e| e.0);

    let mut first = 1usize;
    while first < lower_len {
        first *= 2;
    }
    let mut tree = vec![0u64; 2 * first - 1];
    let first = first - 1;
    let mut crossings = 0u64;
    for &(_, lower) in &sorted {
        let mut index = lower + first;
        tree[index] += 1;
        while index > 0 {
            if index % 2 == 1 {
                crossings += tree[index + 1];
            }
            index = (index - 1) / 2;
            tree[index] += 1;
        }
    }
    crossings
}

fn counting_sort(
    edges: &[(usize, usize)],
    buckets: usize,
    key: impl Fn(&(usize, usize)) -> usize,
) -> Vec<(usize, usize)> {
    let mut count = vec![0usize; buckets + 1];
    for e in edges {
        count[key(e) + 1] += 1;
    }
    for i in 1..count.len() {
        count[i] += count[i - 1];
    }
    let mut out = vec![(0, 0); edges.len()];
    for e in edges {
        let slot = &mut count[key(e)];
        out[*slot] = *e;
        *slot += 1;
    }
    out
}

// ── Crossing reduction ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Upper,
    Lower,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Key {
    Barycenter,
    Median,
}

fn median_value(mut p: Vec<f64>) -> Option<f64> {
    if p.is_empty() {
        return None;
    }
    p.sort_by(f64::total_cmp);
    let m = p.len() / 2;
    if p.len() % 2 == 1 {
        return Some(p[m]);
    }
    if p.len() == 2 {
        return Some((p[0] + p[1]) / 2.0);
    }
    let left = p[m - 1] - p[0];
    let right = p[p.len() - 1] - p[m];
    if left + right <= 0.0 {
        Some((p[m - 1] + p[m]) / 2.0)
    } else {
        Some((p[m - 1] * right + p[m] * left) / (left + right))
    }
}

fn reorder_layer(lg: &mut LayeredGraph, r: usize, side: Side, key: Key) {
    let pos = lg.positions();
    let mut keyed: Vec<(f64, usize)> = lg.layers[r]
        .iter()
        .enumerate()
        .map(|(i, &v)| {
            let neighbours = match side {
                Side::Upper => &lg.upper[v],
                Side::Lower => &lg.lower[v],
            };
            let values: Vec<f64> = neighbours.iter().map(|&u| pos[u] as f64).collect();
            let value = match key {
                Key::Barycenter if !values.is_empty() => {
                    Some(values.iter().sum::<f64>() / values.len() as f64)
                }
                Key::Barycenter => None,
                Key::Median => median_value(values),
            };
            // vertices without neighbours on that side hold their slot
            (value.unwrap_or(i as f64), v)
        })
        .collect();
    keyed.sort_by(|a, b| a.0.total_cmp(&b.0));
    lg.layers[r] = keyed.into_iter().map(|(_, v)| v).collect();
}

fn sweep(lg: &mut LayeredGraph, key: Key) {
    let depth = lg.layers.len();
    for r in 1..depth {
        reorder_layer(lg, r, Side::Upper, key);
    }
    for r in (0..depth.saturating_sub(1)).rev() {
        reorder_layer(lg, r, Side::Lower, key);
    }
}

/// Alternating barycentre sweeps; keeps the ordering with the fewest crossings.
pub(crate) fn barycenter_ordering(
    lg: &mut LayeredGraph,
    max_sweeps: usize,
    cancel: &CancelToken,
) -> Result<u64> {
    reduce_crossings(lg, max_sweeps, cancel, Key::Barycenter, false)
}

/// Weighted-median sweeps followed by adjacent transpositions.
pub(crate) fn median_ordering(
    lg: &mut LayeredGraph,
    max_sweeps: usize,
    cancel: &CancelToken,
) -> Result<u64> {
    reduce_crossings(lg, max_sweeps, cancel, Key::Median, true)
}

fn reduce_crossings(
    lg: &mut LayeredGraph,
    max_sweeps: usize,
    cancel: &CancelToken,
    key: Key,
    transpose_layers: bool,
) -> Result<u64> {
    let mut best = lg.layers.clone();
    let mut best_crossings = lg.crossings();
    for round in 0..max_sweeps {
        if best_crossings == 0 {
            break;
        }
        cancel.check()?;
        sweep(lg, key);
        if transpose_layers {
            transpose(lg);
        }
        let crossings = lg.crossings();
        log::trace!("crossing reduction round {round}: {crossings} crossings");
        if crossings < best_crossings {
            best_crossings = crossings;
            best = lg.layers.clone();
        }
    }
    lg.layers = best;
    Ok(best_crossings)
}

/// Crossings among the edges of `u` and `v` when `u` sits left of `v`.
fn pair_crossings(lg: &LayeredGraph, pos: &[usize], u: usize, v: usize) -> usize {
    let mut count = 0;
    for lists in [(&lg.upper[u], &lg.upper[v]), (&lg.lower[u], &lg.lower[v])] {
        for &a in lists.0 {
            for &b in lists.1 {
                if pos[a] > pos[b] {
                    count += 1;
                }
            }
        }
    }
    count
}

fn transpose(lg: &mut LayeredGraph) {
    for r in 0..lg.layers.len() {
        let pos = lg.positions();
        let limit = lg.layers[r].len();
        for _ in 0..limit {
            let mut improved = false;
            for i in 0..lg.layers[r].len().saturating_sub(1) {
                let (u, v) = (lg.layers[r][i], lg.layers[r][i + 1]);
                if pair_crossings(lg, &pos, u, v) > pair_crossings(lg, &pos, v, u) {
                    lg.layers[r].swap(i, i + 1);
                    improved = true;
                }
            }
            if !improved {
                break;
            }
        }
    }
}

// ── Coordinates ────────────────────────────────────────────────────

/// Breadth of each node along its layer and depth across it, in top-down terms.
pub(crate) fn node_extents(
    lg: &LayeredGraph,
    topo: &Topology,
    state: &LayoutState,
    direction: Direction,
) -> Vec<Size> {
    (0..lg.node_count())
        .map(|v| {
            if lg.is_dummy(v) {
                return Size::ZERO;
            }
            let size = state.size_of(topo.ids[v]);
            if direction.is_horizontal() { size.transposed() } else { size }
        })
        .collect()
}

/// Centre line of every layer; consecutive layers are `layer_gap` apart.
pub(crate) fn layer_centers(lg: &LayeredGraph, extents: &[Size], layer_gap: f64) -> Vec<(f64, f64)> {
    let mut out = Vec::with_capacity(lg.layers.len());
    let mut offset = 0.0;
    for layer in &lg.layers {
        let depth = layer.iter().map(|&v| extents[v].height).fold(0.0, f64::max);
        out.push((offset + depth / 2.0, depth / 2.0));
        offset += depth + layer_gap;
    }
    out
}

fn separation(extents: &[Size], a: usize, b: usize, gap: f64) -> f64 {
    (extents[a].width + extents[b].width) / 2.0 + gap
}

fn packed(layers: &[Vec<usize>], extents: &[Size], gap: f64, xs: &mut [f64]) {
    for layer in layers {
        let mut cursor = 0.0;
        for (i, &v) in layer.iter().enumerate() {
            if i > 0 {
                cursor += separation(extents, layer[i - 1], v, gap);
            }
            xs[v] = cursor;
        }
    }
}

/// Packed layers nudged toward the mean of their neighbours, alternating
/// downward and upward passes.
pub(crate) fn pulled_coordinates(
    lg: &LayeredGraph,
    extents: &[Size],
    gap: f64,
    rounds: usize,
) -> Vec<f64> {
    let mut xs = vec![0.0; lg.node_count()];
    packed(&lg.layers, extents, gap, &mut xs);
    let depth = lg.layers.len();
    for _ in 0..rounds {
        for r in 1..depth {
            pull_layer(lg, r, Side::Upper, extents, gap, &mut xs);
        }
        for r in (0..depth.saturating_sub(1)).rev() {
            pull_layer(lg, r, Side::Lower, extents, gap, &mut xs);
        }
    }
    xs
}

fn pull_layer(lg: &LayeredGraph, r: usize, side: Side, extents: &[Size], gap: f64, xs: &mut [f64]) {
    let layer = &lg.layers[r];
    let desired: Vec<f64> = layer
        .iter()
        .map(|&v| {
            let neighbours = match side {
                Side::Upper => &lg.upper[v],
                Side::Lower => &lg.lower[v],
            };
            if neighbours.is_empty() {
                xs[v]
            } else {
                neighbours.iter().map(|&u| xs[u]).sum::<f64>() / neighbours.len() as f64
            }
        })
        .collect();
    for (i, &v) in layer.iter().enumerate() {
        xs[v] = if i == 0 {
            desired[i]
        } else {
            desired[i].max(xs[layer[i - 1]] + separation(extents, layer[i - 1], v, gap))
        };
    }
    for i in (0..layer.len().saturating_sub(1)).rev() {
        let (v, next) = (layer[i], layer[i + 1]);
        xs[v] = xs[v].min(xs[next] - separation(extents, v, next, gap));
    }
}

/// Priority method: per layer, vertices with more connections toward the
/// reference layer (dummies first) claim their barycentre; lower-priority
/// neighbours are pushed aside. `mirror` runs the same placement on
/// reversed layer orders, which packs toward the other side.
pub(crate) fn priority_coordinates(
    lg: &LayeredGraph,
    extents: &[Size],
    gap: f64,
    mirror: bool,
) -> Vec<f64> {
    let layers: Vec<Vec<usize>> = if mirror {
        lg.layers
            .iter()
            .map(|l| l.iter().rev().copied().collect())
            .collect()
    } else {
        lg.layers.clone()
    };
    let mut xs = vec![0.0; lg.node_count()];
    packed(&layers, extents, gap, &mut xs);
    let depth = layers.len();
    let passes = (1..depth)
        .map(|r| (r, Side::Upper))
        .chain((0..depth.saturating_sub(1)).rev().map(|r| (r, Side::Lower)))
        .chain((1..depth).map(|r| (r, Side::Upper)));
    for (r, side) in passes {
        priority_pass(lg, &layers[r], side, extents, gap, &mut xs);
    }
    if mirror {
        xs.iter_mut().for_each(|x| *x = -*x);
    }
    xs
}

fn priority_pass(
    lg: &LayeredGraph,
    layer: &[usize],
    side: Side,
    extents: &[Size],
    gap: f64,
    xs: &mut [f64],
) {
    let neighbours = |v: usize| match side {
        Side::Upper => &lg.upper[v],
        Side::Lower => &lg.lower[v],
    };
    let mut order: Vec<usize> = (0..layer.len()).collect();
    order.sort_by_key(|&i| {
        let v = layer[i];
        let priority = if lg.is_dummy(v) { usize::MAX } else { neighbours(v).len() };
        std::cmp::Reverse(priority)
    });
    let mut fixed = vec![false; layer.len()];
    let sep = |i: usize| separation(extents, layer[i], layer[i + 1], gap);

    for k in order {
        let v = layer[k];
        let nbrs = neighbours(v);
        if !nbrs.is_empty() {
            let target = nbrs.iter().map(|&u| xs[u]).sum::<f64>() / nbrs.len() as f64;
            if target > xs[v] {
                // room up to the first fixed vertex on the right
                let mut limit = f64::INFINITY;
                let mut span = 0.0;
                for j in (k + 1)..layer.len() {
                    span += sep(j - 1);
                    if fixed[j] {
                        limit = xs[layer[j]] - span;
                        break;
                    }
                }
                xs[v] = xs[v].max(target.min(limit));
                for j in (k + 1)..layer.len() {
                    let min_x = xs[layer[j - 1]] + sep(j - 1);
                    if xs[layer[j]] >= min_x {
                        break;
                    }
                    xs[layer[j]] = min_x;
                }
            } else if target < xs[v] {
                let mut limit = f64::NEG_INFINITY;
                let mut span = 0.0;
                for j in (0..k).rev() {
                    span += sep(j);
                    if fixed[j] {
                        limit = xs[layer[j]] + span;
                        break;
                    }
                }
                xs[v] = xs[v].min(target.max(limit));
                for j in (0..k).rev() {
                    let max_x = xs[layer[j + 1]] - sep(j);
                    if xs[layer[j]] <= max_x {
                        break;
                    }
                    xs[layer[j]] = max_x;
                }
            }
        }
        fixed[k] = true;
    }
}

// ── Output ─────────────────────────────────────────────────────────

/// Bend points for every chain that has any, in top-down coordinates.
/// Routes start at the original source and include both endpoints.
pub(crate) fn chain_routes(
    lg: &LayeredGraph,
    centers: &[Point],
    layers: &[(f64, f64)],
    orthogonal: bool,
) -> Vec<(EdgeId, Vec<Point>)> {
    let mut routes = Vec::new();
    for chain in &lg.chains {
        let mut points = vec![centers[chain.nodes[0]]];
        for pair in chain.nodes.windows(2) {
            let (a, b) = (centers[pair[0]], centers[pair[1]]);
            if orthogonal && (a.x - b.x).abs() > EPSILON {
                let (upper_mid, upper_half) = layers[lg.rank[pair[0]]];
                let (lower_mid, lower_half) = layers[lg.rank[pair[1]]];
                let y = ((upper_mid + upper_half) + (lower_mid - lower_half)) / 2.0;
                points.push(Point::new(a.x, y));
                points.push(Point::new(b.x, y));
            }
            points.push(b);
        }
        if points.len() > 2 {
            if chain.reversed {
                points.reverse();
            }
            routes.push((chain.edge, points));
        }
    }
    routes
}

/// Rotates a top-down point into `direction`.
pub(crate) fn orient(p: Point, direction: Direction) -> Point {
    match direction {
        Direction::TopDown => p,
        Direction::BottomUp => Point::new(p.x, -p.y),
        Direction::LeftRight => Point::new(p.y, p.x),
        Direction::RightLeft => Point::new(-p.y, p.x),
    }
}

/// Orients real-vertex centres and routes, converts centres to top-left
/// positions and shifts everything so the drawing starts at the origin.
pub(crate) fn finish(
    lg: &LayeredGraph,
    topo: &Topology,
    state: &LayoutState,
    centers: &[Point],
    routes: Vec<(EdgeId, Vec<Point>)>,
    direction: Direction,
) -> (PositionTable, EdgeRoutes) {
    let mut positions = PositionTable::new();
    for v in 0..lg.real {
        let id = topo.ids[v];
        let center = orient(centers[v], direction);
        positions.insert(id, center - state.size_of(id).half());
    }
    let min_x = positions.values().map(|p| p.x).fold(f64::INFINITY, f64::min);
    let min_y = positions.values().map(|p| p.y).fold(f64::INFINITY, f64::min);
    let shift = if min_x.is_finite() && min_y.is_finite() {
        Vector::new(-min_x, -min_y)
    } else {
        Vector::ZERO
    };
    for p in positions.values_mut() {
        *p += shift;
    }
    let routes = routes
        .into_iter()
        .map(|(id, pts)| {
            let pts = pts
                .into_iter()
                .map(|p| orient(p, direction) + shift)
                .collect();
            (id, pts)
        })
        .collect();
    (positions, routes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::test_support::*;
    use crate::rng::Rng;

    fn naive_crossings(edges: &[(usize, usize)]) -> u64 {
        let mut count = 0;
        for (i, a) in edges.iter().enumerate() {
            for b in &edges[i + 1..] {
                if (a.0 < b.0 && a.1 > b.1) || (a.0 > b.0 && a.1 < b.1) {
                    count += 1;
                }
            }
        }
        count
    }

    #[test]
    fn accumulator_tree_matches_naive_count() {
        let mut rng = Rng::new(99);
        for round in 0..40 {
            let upper = 1 + rng.below(9);
            let lower = 1 + rng.below(9);
            let count = rng.below(30);
            let edges: Vec<(usize, usize)> = (0..count)
                .map(|_| (rng.below(upper), rng.below(lower)))
                .collect();
            assert_eq!(
                count_bilayer_crossings(lower, &edges),
                naive_crossings(&edges),
                "round {round}: {edges:?}"
            );
        }
    }

    #[test]
    fn twisted_pair_crosses_once() {
        assert_eq!(count_bilayer_crossings(2, &[(0, 1), (1, 0)]), 1);
        assert_eq!(count_bilayer_crossings(2, &[(0, 0), (1, 1)]), 0);
        // shared endpoints never cross
        assert_eq!(count_bilayer_crossings(2, &[(0, 0), (0, 1), (1, 1)]), 0);
        assert_eq!(count_bilayer_crossings(0, &[]), 0);
    }

    fn is_acyclic(topo: &Topology, reversed: &[bool]) -> bool {
        let edges: Vec<(usize, usize)> = topo
            .edges
            .iter()
            .zip(reversed)
            .map(|(e, &r)| if r { (e.target, e.source) } else { (e.source, e.target) })
            .collect();
        topological_order(topo.len(), &edges).len() == topo.len()
    }

    #[test]
    fn both_cycle_breakers_leave_a_dag() {
        let graph = graph_with_edges(5, &[(1, 2), (2, 3), (3, 1), (3, 4), (4, 5), (5, 3), (2, 1)]);
        let topo = Topology::new(&graph);
        assert!(is_acyclic(&topo, &dfs_reversed_edges(&topo)));
        assert!(is_acyclic(&topo, &greedy_reversed_edges(&topo)));
    }

    #[test]
    fn width_cap_limits_layer_population() {
        let edges: Vec<(usize, usize)> = (1..7).map(|t| (0, t)).collect();
        let ranks = width_capped_ranks(7, &edges, 3);
        assert_eq!(ranks[0], 0);
        for r in 1..=2 {
            assert_eq!(ranks.iter().filter(|&&x| x == r).count(), 3);
        }
        assert_eq!(longest_path_ranks(7, &edges).iter().max(), Some(&1));
    }

    #[test]
    fn long_edges_get_dummy_chains() {
        let graph = graph_with_edges(3, &[(1, 2), (2, 3), (1, 3)]);
        let topo = Topology::new(&graph);
        let edges: Vec<(usize, usize)> = topo.edges.iter().map(|e| (e.source, e.target)).collect();
        let ranks = longest_path_ranks(topo.len(), &edges);
        let lg = LayeredGraph::build(&topo, &[false; 3], ranks);
        assert_eq!(lg.node_count(), 4);
        assert_eq!(lg.chains[2].nodes, vec![0, 3, 2]);
        assert_eq!(lg.layers[1], vec![1, 3]);
    }

    #[test]
    fn sweeps_untangle_a_twisted_bipartite_graph() {
        // 1->5, 2->4, 3->6 in index order crosses once
        let graph = graph_with_edges(6, &[(1, 5), (2, 4), (3, 6)]);
        let topo = Topology::new(&graph);
        let edges: Vec<(usize, usize)> = topo.edges.iter().map(|e| (e.source, e.target)).collect();
        let mut lg = LayeredGraph::build(&topo, &[false; 3], longest_path_ranks(6, &edges));
        assert_eq!(lg.crossings(), 1);
        let remaining = barycenter_ordering(&mut lg, 4, &CancelToken::none()).unwrap();
        assert_eq!(remaining, 0);
        assert_eq!(lg.crossings(), 0);
    }

    #[test]
    fn priority_placement_keeps_separation() {
        let graph = graph_with_edges(5, &[(1, 3), (1, 4), (2, 4), (2, 5)]);
        let topo = Topology::new(&graph);
        let edges: Vec<(usize, usize)> = topo.edges.iter().map(|e| (e.source, e.target)).collect();
        let lg = LayeredGraph::build(&topo, &[false; 4], longest_path_ranks(5, &edges));
        let extents = vec![Size::new(20.0, 10.0); lg.node_count()];
        for mirror in [false, true] {
            let xs = priority_coordinates(&lg, &extents, 5.0, mirror);
            for layer in &lg.layers {
                for pair in layer.windows(2) {
                    assert!(xs[pair[1]] - xs[pair[0]] >= 25.0 - 1e-9);
                }
            }
        }
        let xs = pulled_coordinates(&lg, &extents, 5.0, 3);
        for layer in &lg.layers {
            for pair in layer.windows(2) {
                assert!(xs[pair[1]] - xs[pair[0]] >= 25.0 - 1e-9);
            }
        }
    }
}
