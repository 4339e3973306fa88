use serde::{Deserialize, Serialize};

use crate::cancel::CancelToken;
use crate::error::Result;
use crate::geometry::{EPSILON, Point, Vector};
use crate::ir::{Graph, PositionTable, SizeTable};
use crate::rng::Rng;

use super::{LayoutAlgorithm, LayoutState, Topology, commit_centers, initial_centers, pinned_mask};

/// Newton-Raphson steps spent on the chosen vertex per iteration.
const NEWTON_STEPS: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KkParams {
    pub max_iterations: usize,
    /// Spring strength numerator.
    pub k: f64,
    pub width: f64,
    pub height: f64,
    /// Scales the ideal length of one graph-distance unit.
    pub length_factor: f64,
    /// Ideal distance between disconnected vertices, as a share of the diameter.
    pub disconnected_multiplier: f64,
    /// Re-centre the drawing on the area after each iteration.
    pub adjust_for_gravity: bool,
    /// Try swapping vertex pairs once the gradient flattens.
    pub exchange_vertices: bool,
    pub seed: u64,
}

impl Default for KkParams {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            k: 1.0,
            width: 300.0,
            height: 300.0,
            length_factor: 1.0,
            disconnected_multiplier: 0.5,
            adjust_for_gravity: false,
            exchange_vertices: false,
            seed: 0,
        }
    }
}

/// Kamada-Kawai stress layout: springs whose rest length follows graph distance.
#[derive(Debug, Clone)]
pub struct KkLayout {
    state: LayoutState,
    params: KkParams,
}

impl KkLayout {
    pub fn new(positions: Option<PositionTable>, sizes: Option<SizeTable>, params: KkParams) -> Self {
        Self {
            state: LayoutState::new(positions, sizes),
            params,
        }
    }
}

struct Springs {
    length: Vec<Vec<f64>>,
    strength: Vec<Vec<f64>>,
}

impl Springs {
    fn new(topo: &Topology, params: &KkParams) -> Self {
        let n = topo.len();
        let hops = topo.all_pairs_distances();
        let diameter = hops
            .iter()
            .flatten()
            .filter(|&&d| d != usize::MAX)
            .max()
            .copied()
            .unwrap_or(0)
            .max(1) as f64;
        let unit = params.width.min(params.height) / diameter * params.length_factor;
        let mut length = vec![vec![0.0; n]; n];
        let mut strength = vec![vec![0.0; n]; n];
        for i in 0..n {
            for j in 0..n {
                if i == j {
                    continue;
                }
                let d = if hops[i][j] == usize::MAX {
                    diameter * params.disconnected_multiplier
                } else {
                    hops[i][j] as f64
                };
                let d = d.max(EPSILON);
                length[i][j] = unit * d;
                strength[i][j] = params.k / (d * d);
            }
        }
        Self { length, strength }
    }

    /// Partial derivatives of the energy with respect to vertex `m`.
    fn gradient(&self, centers: &[Point], m: usize) -> Vector {
        let mut g = Vector::ZERO;
        for i in 0..centers.len() {
            if i == m {
                continue;
            }
            let delta = centers[m] - centers[i];
            let d = delta.length();
            if d < EPSILON {
                continue;
            }
            let k = self.strength[m][i];
            let l = self.length[m][i];
            g += (delta - delta * (l / d)) * k;
        }
        g
    }

    /// One Newton-Raphson step for vertex `m`; `None` on a singular Hessian.
    fn newton_step(&self, centers: &[Point], m: usize, g: Vector) -> Option<Vector> {
        let (mut dxx, mut dxy, mut dyy) = (0.0, 0.0, 0.0);
        for i in 0..centers.len() {
            if i == m {
                continue;
            }
            let delta = centers[m] - centers[i];
            let d = delta.length();
            if d < EPSILON {
                continue;
            }
            let k = self.strength[m][i];
            let l = self.length[m][i];
            let d3 = d * d * d;
            dxx += k * (1.0 - l * delta.y * delta.y / d3);
            dxy += k * l * delta.x * delta.y / d3;
            dyy += k * (1.0 - l * delta.x * delta.x / d3);
        }
        let det = dxx * dyy - dxy * dxy;
        if det.abs() < EPSILON {
            return None;
        }
        Some(Vector::new(
            (-g.x * dyy + g.y * dxy) / det,
            (-g.y * dxx + g.x * dxy) / det,
        ))
    }

    fn vertex_energy(&self, centers: &[Point], m: usize) -> f64 {
        (0..centers.len())
            .filter(|&i| i != m)
            .map(|i| {
                let stretch = centers[m].distance(centers[i]) - self.length[m][i];
                0.5 * self.strength[m][i] * stretch * stretch
            })
            .sum()
    }
}

/// Nudges vertices that share a centre; zero distances carry no gradient.
fn separate_coincident(centers: &mut [Point], pinned: &[bool], rng: &mut Rng) {
    for i in 0..centers.len() {
        for j in 0..i {
            if !pinned[i] && centers[i].distance(centers[j]) < EPSILON {
                centers[i] += Vector::new(rng.range(-1.0, 1.0), rng.range(-1.0, 1.0));
            }
        }
    }
}

impl LayoutAlgorithm for KkLayout {
    fn name(&self) -> &'static str {
        "kk"
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
        let params = &self.params;
        let mut rng = Rng::new(params.seed);
        let mut centers = initial_centers(
            &self.state,
            &topo,
            &mut rng,
            Point::ORIGIN,
            params.width,
            params.height,
        );
        let pinned = pinned_mask(&self.state, &topo, true);
        separate_coincident(&mut centers, &pinned, &mut rng);
        let springs = Springs::new(&topo, params);

        for iteration in 0..params.max_iterations {
            cancel.check()?;
            let mut worst: Option<(usize, f64)> = None;
            for m in 0..n {
                if pinned[m] {
                    continue;
                }
                let magnitude = springs.gradient(&centers, m).length();
                if worst.is_none_or(|(_, best)| magnitude > best) {
                    worst = Some((m, magnitude));
                }
            }
            let Some((pm, magnitude)) = worst else { break };

            for _ in 0..NEWTON_STEPS {
                let g = springs.gradient(&centers, pm);
                if g.length() < EPSILON {
                    break;
                }
                let Some(step) = springs.newton_step(&centers, pm, g) else {
                    break;
                };
                centers[pm] += step;
                if step.length() < EPSILON {
                    break;
                }
            }

            if params.adjust_for_gravity {
                let free: Vec<usize> = (0..n).filter(|&v| !pinned[v]).collect();
                if !free.is_empty() {
                    let sum = free.iter().fold(Vector::ZERO, |acc, &v| acc + centers[v].to_vector());
                    let centroid = sum / free.len() as f64;
                    let shift = Vector::new(params.width / 2.0, params.height / 2.0) - centroid;
                    for &v in &free {
                        centers[v] += shift;
                    }
                }
            }

            if params.exchange_vertices && magnitude < 1.0 {
                exchange_pass(&springs, &mut centers, &pinned);
            }
            log::trace!("kk iteration {iteration}: moved vertex {pm}, gradient {magnitude:.4}");
        }

        commit_centers(&mut self.state, &topo, &centers);
        log::debug!("kk layout: {} vertices", n);
        Ok(())
    }
}

/// Swaps vertex pairs whenever that lowers the total spring energy.
fn exchange_pass(springs: &Springs, centers: &mut [Point], pinned: &[bool]) {
    let n = centers.len();
    for i in 0..n {
        for j in (i + 1)..n {
            if pinned[i] || pinned[j] {
                continue;
            }
            let before = springs.vertex_energy(centers, i) + springs.vertex_energy(centers, j);
            centers.swap(i, j);
            let after = springs.vertex_energy(centers, i) + springs.vertex_energy(centers, j);
            if after >= before {
                centers.swap(i, j);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::VertexId;
    use crate::layout::test_support::*;

    #[test]
    fn path_distances_grow_along_the_path() {
        let graph = graph_with_edges(4, &[(1, 2), (2, 3), (3, 4)]);
        let mut layout = KkLayout::new(None, None, KkParams::default());
        layout.compute(&graph, &CancelToken::none()).unwrap();
        let p = layout.positions();
        assert!(all_finite(p));
        let near = p[&VertexId(1)].distance(p[&VertexId(2)]);
        let far = p[&VertexId(1)].distance(p[&VertexId(4)]);
        assert!(far > near);
    }

    #[test]
    fn handles_disconnected_and_coincident_input() {
        let graph = graph_with_edges(4, &[(1, 2)]);
        let seeds: PositionTable = graph.vertex_ids().map(|id| (id, Point::ORIGIN)).collect();
        let params = KkParams {
            adjust_for_gravity: true,
            exchange_vertices: true,
            ..KkParams::default()
        };
        let mut layout = KkLayout::new(Some(seeds), None, params);
        layout.compute(&graph, &CancelToken::none()).unwrap();
        assert!(all_finite(layout.positions()));
        assert_eq!(layout.positions().len(), 4);
    }

    #[test]
    fn deterministic_for_a_seed() {
        let graph = graph_with_edges(5, &[(1, 2), (2, 3), (3, 1), (4, 5)]);
        let run = || {
            let mut layout = KkLayout::new(None, None, KkParams { seed: 5, ..KkParams::default() });
            layout.compute(&graph, &CancelToken::none()).unwrap();
            layout.take_positions()
        };
        assert_eq!(run(), run());
    }
}
