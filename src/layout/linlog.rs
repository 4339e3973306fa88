use serde::{Deserialize, Serialize};

use crate::cancel::CancelToken;
use crate::error::Result;
use crate::geometry::{EPSILON, Point, Vector};
use crate::ir::{Graph, PositionTable, SizeTable};
use crate::rng::Rng;

use super::{LayoutAlgorithm, LayoutState, Topology, commit_centers, initial_centers, pinned_mask};

/// Deeper cells collapse into one bucket so coincident vertices terminate.
const MAX_DEPTH: usize = 20;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinLogParams {
    pub attraction_exponent: f64,
    /// 0 gives logarithmic repulsion.
    pub repulsive_exponent: f64,
    pub gravitation_multiplier: f64,
    pub iteration_count: usize,
    pub seed: u64,
}

impl Default for LinLogParams {
    fn default() -> Self {
        Self {
            attraction_exponent: 1.0,
            repulsive_exponent: 0.0,
            gravitation_multiplier: 0.1,
            iteration_count: 100,
            seed: 0,
        }
    }
}

/// Noack's LinLog energy model minimised with a Barnes-Hut quadtree.
#[derive(Debug, Clone)]
pub struct LinLogLayout {
    state: LayoutState,
    params: LinLogParams,
}

impl LinLogLayout {
    pub fn new(
        positions: Option<PositionTable>,
        sizes: Option<SizeTable>,
        params: LinLogParams,
    ) -> Self {
        Self {
            state: LayoutState::new(positions, sizes),
            params,
        }
    }
}

// ── Barnes-Hut quadtree ────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Cell {
    Leaf(usize),
    Internal([Option<usize>; 4]),
    Bucket(Vec<usize>),
}

#[derive(Debug, Clone)]
struct QuadNode {
    min: Point,
    max: Point,
    /// Barycentre of the contained vertices.
    position: Point,
    weight: f64,
    cell: Cell,
}

impl QuadNode {
    fn width(&self) -> f64 {
        (self.max.x - self.min.x).max(self.max.y - self.min.y)
    }

    fn mid(&self) -> Point {
        Point::new((self.min.x + self.max.x) / 2.0, (self.min.y + self.max.y) / 2.0)
    }

    fn quadrant(&self, p: Point) -> usize {
        let mid = self.mid();
        usize::from(p.x > mid.x) + 2 * usize::from(p.y > mid.y)
    }

    fn sub_box(&self, quadrant: usize) -> (Point, Point) {
        let mid = self.mid();
        let (x0, x1) = if quadrant & 1 == 0 { (self.min.x, mid.x) } else { (mid.x, self.max.x) };
        let (y0, y1) = if quadrant & 2 == 0 { (self.min.y, mid.y) } else { (mid.y, self.max.y) };
        (Point::new(x0, y0), Point::new(x1, y1))
    }
}

#[derive(Debug, Default)]
struct QuadTree {
    nodes: Vec<QuadNode>,
    root: Option<usize>,
}

impl QuadTree {
    fn build(positions: &[Point], weights: &[f64]) -> Self {
        let mut tree = QuadTree::default();
        if positions.is_empty() {
            return tree;
        }
        let mut min = positions[0];
        let mut max = positions[0];
        for p in positions {
            min = Point::new(min.x.min(p.x), min.y.min(p.y));
            max = Point::new(max.x.max(p.x), max.y.max(p.y));
        }
        for (i, (&p, &w)) in positions.iter().zip(weights).enumerate() {
            if w <= 0.0 {
                continue;
            }
            match tree.root {
                None => tree.root = Some(tree.leaf(i, p, w, min, max)),
                Some(root) => tree.insert(root, i, p, w, 0),
            }
        }
        tree
    }

    fn width(&self) -> f64 {
        self.root.map_or(0.0, |r| self.nodes[r].width())
    }

    fn leaf(&mut self, index: usize, p: Point, weight: f64, min: Point, max: Point) -> usize {
        self.nodes.push(QuadNode {
            min,
            max,
            position: p,
            weight,
            cell: Cell::Leaf(index),
        });
        self.nodes.len() - 1
    }

    fn insert(&mut self, node: usize, index: usize, p: Point, weight: f64, depth: usize) {
        let (old_pos, old_weight) = (self.nodes[node].position, self.nodes[node].weight);
        if let Cell::Leaf(existing) = self.nodes[node].cell {
            if depth >= MAX_DEPTH {
                self.nodes[node].cell = Cell::Bucket(vec![existing]);
            } else {
                self.nodes[node].cell = Cell::Internal([None; 4]);
                self.insert_child(node, existing, old_pos, old_weight, depth);
            }
        }
        let total = old_weight + weight;
        let n = &mut self.nodes[node];
        n.position = Point::new(
            (old_pos.x * old_weight + p.x * weight) / total,
            (old_pos.y * old_weight + p.y * weight) / total,
        );
        n.weight = total;
        let descend = match &mut n.cell {
            Cell::Bucket(members) => {
                members.push(index);
                false
            }
            Cell::Internal(_) => true,
            Cell::Leaf(_) => false,
        };
        if descend {
            self.insert_child(node, index, p, weight, depth);
        }
    }

    fn insert_child(&mut self, node: usize, index: usize, p: Point, weight: f64, depth: usize) {
        let quadrant = self.nodes[node].quadrant(p);
        let Cell::Internal(children) = self.nodes[node].cell else {
            return;
        };
        match children[quadrant] {
            Some(child) => self.insert(child, index, p, weight, depth + 1),
            None => {
                let (min, max) = self.nodes[node].sub_box(quadrant);
                let child = self.leaf(index, p, weight, min, max);
                if let Cell::Internal(children) = &mut self.nodes[node].cell {
                    children[quadrant] = Some(child);
                }
            }
        }
    }

    /// Removes vertex `index` last inserted at `p`; true when `node` became empty.
    fn remove(&mut self, node: usize, index: usize, p: Point, weight: f64) -> bool {
        let n = &mut self.nodes[node];
        let remaining = n.weight - weight;
        if remaining <= EPSILON {
            n.weight = 0.0;
            return true;
        }
        n.position = Point::new(
            (n.position.x * n.weight - p.x * weight) / remaining,
            (n.position.y * n.weight - p.y * weight) / remaining,
        );
        n.weight = remaining;
        let quadrant = n.quadrant(p);
        let child = match &mut n.cell {
            Cell::Leaf(_) => return true,
            Cell::Bucket(members) => {
                members.retain(|&m| m != index);
                return members.is_empty();
            }
            Cell::Internal(children) => children[quadrant],
        };
        if let Some(child) = child
            && self.remove(child, index, p, weight)
            && let Cell::Internal(children) = &mut self.nodes[node].cell
        {
            children[quadrant] = None;
        }
        false
    }

    fn move_vertex(&mut self, index: usize, from: Point, to: Point, weight: f64) {
        let Some(root) = self.root else { return };
        if self.remove(root, index, from, weight) {
            let (min, max) = (self.nodes[root].min, self.nodes[root].max);
            self.root = Some(self.leaf(index, to, weight, min, max));
        } else {
            self.insert(root, index, to, weight, 0);
        }
    }
}

// ── Energy model ───────────────────────────────────────────────────

struct Model {
    /// Per-vertex neighbour lists with accumulated edge weights.
    attraction: Vec<Vec<(usize, f64)>>,
    repulsion_weight: Vec<f64>,
    attr_exp: f64,
    repu_exp: f64,
    repulsion_multiplier: f64,
    gravitation_multiplier: f64,
    barycenter: Point,
}

impl Model {
    fn new(topo: &Topology, params: &LinLogParams) -> Self {
        let n = topo.len();
        let mut attraction: Vec<Vec<(usize, f64)>> = vec![Vec::new(); n];
        for edge in &topo.edges {
            for (a, b) in [(edge.source, edge.target), (edge.target, edge.source)] {
                match attraction[a].iter_mut().find(|(j, _)| *j == b) {
                    Some((_, w)) => *w += edge.weight,
                    None => attraction[a].push((b, edge.weight)),
                }
            }
        }
        let repulsion_weight: Vec<f64> = attraction
            .iter()
            .map(|list| list.iter().map(|(_, w)| w).sum::<f64>().max(1.0))
            .collect();
        let mut model = Self {
            attraction,
            repulsion_weight,
            attr_exp: params.attraction_exponent,
            repu_exp: params.repulsive_exponent,
            repulsion_multiplier: 1.0,
            gravitation_multiplier: params.gravitation_multiplier,
            barycenter: Point::ORIGIN,
        };
        model.repulsion_multiplier = model.compute_repulsion_multiplier();
        model
    }

    fn compute_repulsion_multiplier(&self) -> f64 {
        let attr_sum: f64 = self.attraction.iter().flatten().map(|(_, w)| w).sum();
        let repu_sum: f64 = self.repulsion_weight.iter().sum();
        if repu_sum > 0.0 && attr_sum > 0.0 {
            attr_sum / (repu_sum * repu_sum) * repu_sum.powf(0.5 * (self.attr_exp - self.repu_exp))
        } else {
            1.0
        }
    }

    fn update_barycenter(&mut self, centers: &[Point]) {
        let mut sum = Vector::ZERO;
        let mut total = 0.0;
        for (p, w) in centers.iter().zip(&self.repulsion_weight) {
            sum += p.to_vector() * *w;
            total += w;
        }
        if total > 0.0 {
            let c = sum / total;
            self.barycenter = Point::new(c.x, c.y);
        }
    }

    fn power_energy(dist: f64, exponent: f64) -> f64 {
        if exponent == 0.0 {
            dist.ln()
        } else {
            dist.powf(exponent) / exponent
        }
    }

    fn energy(&self, tree: &QuadTree, centers: &[Point], v: usize) -> f64 {
        let repulsion = tree
            .root
            .map_or(0.0, |root| self.repulsion_energy(tree, root, centers, v));
        repulsion + self.attraction_energy(centers, v) + self.gravitation_energy(centers, v)
    }

    fn repulsion_energy(&self, tree: &QuadTree, node: usize, centers: &[Point], v: usize) -> f64 {
        let cell = &tree.nodes[node];
        if matches!(cell.cell, Cell::Leaf(i) if i == v) {
            return 0.0;
        }
        let dist = centers[v].distance(cell.position);
        if let Cell::Internal(children) = &cell.cell
            && dist < 2.0 * cell.width()
        {
            return children
                .iter()
                .flatten()
                .map(|&c| self.repulsion_energy(tree, c, centers, v))
                .sum();
        }
        if dist < EPSILON {
            return 0.0;
        }
        -self.repulsion_multiplier
            * self.repulsion_weight[v]
            * cell.weight
            * Self::power_energy(dist, self.repu_exp)
    }

    fn attraction_energy(&self, centers: &[Point], v: usize) -> f64 {
        self.attraction[v]
            .iter()
            .filter_map(|&(j, w)| {
                let dist = centers[v].distance(centers[j]);
                (dist >= EPSILON).then(|| w * Self::power_energy(dist, self.attr_exp))
            })
            .sum()
    }

    fn gravitation_energy(&self, centers: &[Point], v: usize) -> f64 {
        let dist = centers[v].distance(self.barycenter);
        let scale = self.gravitation_multiplier * self.repulsion_multiplier * self.repulsion_weight[v];
        if self.attr_exp == 0.0 {
            scale * dist
        } else {
            scale * dist.powf(self.attr_exp) / self.attr_exp
        }
    }

    /// Approximate Newton direction for vertex `v`.
    fn direction(&self, tree: &QuadTree, centers: &[Point], v: usize) -> Vector {
        let mut dir = Vector::ZERO;
        let mut dir2 = 0.0;
        if let Some(root) = tree.root {
            dir2 += self.add_repulsion(tree, root, centers, v, &mut dir);
        }
        dir2 += self.add_attraction(centers, v, &mut dir);
        dir2 += self.add_gravitation(centers, v, &mut dir);
        if dir2.abs() < EPSILON {
            return Vector::ZERO;
        }
        dir = dir / dir2;
        let cap = tree.width() / 8.0;
        let length = dir.length();
        if cap > 0.0 && length > cap {
            dir = dir / (length / cap);
        }
        dir
    }

    fn add_repulsion(
        &self,
        tree: &QuadTree,
        node: usize,
        centers: &[Point],
        v: usize,
        dir: &mut Vector,
    ) -> f64 {
        let cell = &tree.nodes[node];
        if matches!(cell.cell, Cell::Leaf(i) if i == v) {
            return 0.0;
        }
        let dist = centers[v].distance(cell.position);
        if let Cell::Internal(children) = &cell.cell
            && dist < cell.width()
        {
            return children
                .iter()
                .flatten()
                .map(|&c| self.add_repulsion(tree, c, centers, v, dir))
                .sum();
        }
        if dist < EPSILON {
            return 0.0;
        }
        let tmp = self.repulsion_multiplier
            * self.repulsion_weight[v]
            * cell.weight
            * dist.powf(self.repu_exp - 2.0);
        *dir -= (cell.position - centers[v]) * tmp;
        tmp * (self.repu_exp - 1.0).abs()
    }

    fn add_attraction(&self, centers: &[Point], v: usize, dir: &mut Vector) -> f64 {
        let mut dir2 = 0.0;
        for &(j, w) in &self.attraction[v] {
            let dist = centers[v].distance(centers[j]);
            if dist < EPSILON {
                continue;
            }
            let tmp = w * dist.powf(self.attr_exp - 2.0);
            dir2 += tmp * (self.attr_exp - 1.0).abs();
            *dir += (centers[j] - centers[v]) * tmp;
        }
        dir2
    }

    fn add_gravitation(&self, centers: &[Point], v: usize, dir: &mut Vector) -> f64 {
        let pull = self.barycenter - centers[v];
        let dist = pull.length();
        if dist < EPSILON {
            return 0.0;
        }
        let tmp = self.gravitation_multiplier
            * self.repulsion_multiplier
            * self.repulsion_weight[v].max(1.0)
            * dist.powf(self.attr_exp - 2.0);
        *dir += pull * tmp;
        tmp * (self.attr_exp - 1.0).abs()
    }
}

impl LayoutAlgorithm for LinLogLayout {
    fn name(&self) -> &'static str {
        "linlog"
    }

    fn state(&self) -> &LayoutState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut LayoutState {
        &mut self.state
    }

    fn supports_object_freeze(&self) -> bool {
        true
    }

    fn compute(&mut self, graph: &Graph, cancel: &CancelToken) -> Result<()> {
        let topo = Topology::new(graph);
        let n = topo.len();
        if n == 0 {
            return Ok(());
        }
        let params = self.params.clone();
        let mut rng = Rng::new(params.seed);
        let span = (n as f64).sqrt() * 10.0;
        let mut centers = initial_centers(&self.state, &topo, &mut rng, Point::ORIGIN, span, span);
        let pinned = pinned_mask(&self.state, &topo, true);
        let mut model = Model::new(&topo, &params);

        let iterations = params.iteration_count;
        let final_attr = params.attraction_exponent;
        let final_repu = params.repulsive_exponent;
        for step in 1..=iterations {
            cancel.check()?;
            model.update_barycenter(&centers);
            let mut tree = QuadTree::build(&centers, &model.repulsion_weight);

            // start from a smoother model and anneal toward the requested exponents
            model.attr_exp = final_attr;
            model.repu_exp = final_repu;
            if iterations >= 50 && final_repu < 1.0 {
                let progress = step as f64 / iterations as f64;
                let slack = 1.0 - final_repu;
                if progress <= 0.6 {
                    model.attr_exp += 1.1 * slack;
                    model.repu_exp += 0.9 * slack;
                } else if progress <= 0.9 {
                    let fade = (0.9 - progress) / 0.3;
                    model.attr_exp += 1.1 * slack * fade;
                    model.repu_exp += 0.9 * slack * fade;
                }
            }

            for v in 0..n {
                if pinned[v] {
                    continue;
                }
                let origin = centers[v];
                let mut best_energy = model.energy(&tree, &centers, v);
                let dir = model.direction(&tree, &centers, v) / 32.0;
                let mut best_multiple = 0u32;

                let mut multiple = 32u32;
                while multiple >= 1 && best_multiple == 0 {
                    centers[v] = origin + dir * f64::from(multiple);
                    let energy = model.energy(&tree, &centers, v);
                    if energy < best_energy {
                        best_energy = energy;
                        best_multiple = multiple;
                    }
                    multiple /= 2;
                }
                let mut multiple = 64u32;
                while multiple <= 128 && best_multiple == multiple / 2 {
                    centers[v] = origin + dir * f64::from(multiple);
                    let energy = model.energy(&tree, &centers, v);
                    if energy < best_energy {
                        best_energy = energy;
                        best_multiple = multiple;
                    }
                    multiple *= 2;
                }

                centers[v] = origin + dir * f64::from(best_multiple);
                if !centers[v].is_finite() {
                    centers[v] = origin;
                } else if best_multiple > 0 {
                    tree.move_vertex(v, origin, centers[v], model.repulsion_weight[v]);
                }
            }
            log::trace!("linlog step {step}/{iterations}");
        }

        commit_centers(&mut self.state, &topo, &centers);
        log::debug!("linlog layout: {} vertices, {} edges", n, topo.edges.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::VertexId;
    use crate::layout::test_support::*;

    #[test]
    fn clusters_sit_closer_than_strangers() {
        // two triangles joined by a single bridge edge
        let graph = graph_with_edges(
            6,
            &[(1, 2), (2, 3), (3, 1), (4, 5), (5, 6), (6, 4), (3, 4)],
        );
        let mut layout = LinLogLayout::new(None, None, LinLogParams::default());
        layout.compute(&graph, &CancelToken::none()).unwrap();
        let p = layout.positions();
        assert!(all_finite(p));
        let inside = p[&VertexId(1)].distance(p[&VertexId(2)]);
        let across = p[&VertexId(1)].distance(p[&VertexId(6)]);
        assert!(across > inside);
    }

    #[test]
    fn quadtree_tracks_total_weight_through_moves() {
        let centers = vec![Point::new(0.0, 0.0), Point::new(4.0, 4.0), Point::new(4.0, 4.0)];
        let mut tree = QuadTree::build(&centers, &[1.0, 2.0, 1.0]);
        let root = tree.root.unwrap();
        assert_eq!(tree.nodes[root].weight, 4.0);
        tree.move_vertex(0, Point::new(0.0, 0.0), Point::new(4.0, 0.0), 1.0);
        let root = tree.root.unwrap();
        assert!((tree.nodes[root].weight - 4.0).abs() < 1e-9);
        let bary = tree.nodes[root].position;
        assert!((bary.x - 4.0).abs() < 1e-9 && (bary.y - 3.0).abs() < 1e-9);
    }

    #[test]
    fn single_vertex_is_stable() {
        let graph = graph_with_edges(1, &[]);
        let mut layout = LinLogLayout::new(None, None, LinLogParams::default());
        layout.compute(&graph, &CancelToken::none()).unwrap();
        assert!(all_finite(layout.positions()));
    }
}
