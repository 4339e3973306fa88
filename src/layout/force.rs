use serde::{Deserialize, Serialize};

use crate::cancel::CancelToken;
use crate::error::Result;
use crate::geometry::{EPSILON, Point, Vector};
use crate::ir::{Graph, PositionTable, SizeTable};
use crate::rng::Rng;

use super::{LayoutAlgorithm, LayoutState, Topology, commit_centers, initial_centers, pinned_mask};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CoolingFunction {
    Linear,
    #[default]
    Exponential,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FreeFrParams {
    /// Preferred edge length; sets the force constant directly.
    pub ideal_edge_length: f64,
    pub attraction_multiplier: f64,
    pub repulsive_multiplier: f64,
    pub iteration_limit: usize,
    /// Exponential cooling factor per iteration.
    pub lambda: f64,
    pub cooling: CoolingFunction,
    pub seed: u64,
}

impl Default for FreeFrParams {
    fn default() -> Self {
        Self {
            ideal_edge_length: 10.0,
            attraction_multiplier: 1.2,
            repulsive_multiplier: 0.6,
            iteration_limit: 200,
            lambda: 0.95,
            cooling: CoolingFunction::Exponential,
            seed: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoundedFrParams {
    /// Drawing area; centres are clamped into `[0, width] x [0, height]`.
    pub width: f64,
    pub height: f64,
    pub attraction_multiplier: f64,
    pub repulsive_multiplier: f64,
    pub iteration_limit: usize,
    pub lambda: f64,
    pub cooling: CoolingFunction,
    pub seed: u64,
}

impl Default for BoundedFrParams {
    fn default() -> Self {
        Self {
            width: 1000.0,
            height: 1000.0,
            attraction_multiplier: 1.2,
            repulsive_multiplier: 0.6,
            iteration_limit: 200,
            lambda: 0.95,
            cooling: CoolingFunction::Exponential,
            seed: 0,
        }
    }
}

/// Either flavour of Fruchterman-Reingold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum FrParams {
    Free(FreeFrParams),
    Bounded(BoundedFrParams),
}

impl Default for FrParams {
    fn default() -> Self {
        Self::Free(FreeFrParams::default())
    }
}

impl From<FreeFrParams> for FrParams {
    fn from(params: FreeFrParams) -> Self {
        Self::Free(params)
    }
}

impl From<BoundedFrParams> for FrParams {
    fn from(params: BoundedFrParams) -> Self {
        Self::Bounded(params)
    }
}

// ── Derived simulation constants ───────────────────────────────────

struct Schedule {
    k: f64,
    initial_temperature: f64,
    attraction: f64,
    repulsion: f64,
    iteration_limit: usize,
    lambda: f64,
    cooling: CoolingFunction,
    bounds: Option<(f64, f64)>,
    seed: u64,
}

impl Schedule {
    fn new(params: &FrParams, n: usize) -> Self {
        let n = n.max(1) as f64;
        let (k, initial_temperature, attr, rep, limit, lambda, cooling, bounds, seed) = match params {
            FrParams::Free(p) => {
                let k = p.ideal_edge_length;
                (
                    k,
                    (k * k * n).sqrt(),
                    p.attraction_multiplier,
                    p.repulsive_multiplier,
                    p.iteration_limit,
                    p.lambda,
                    p.cooling,
                    None,
                    p.seed,
                )
            }
            FrParams::Bounded(p) => (
                (p.width * p.height / n).sqrt(),
                p.width.min(p.height) / 10.0,
                p.attraction_multiplier,
                p.repulsive_multiplier,
                p.iteration_limit,
                p.lambda,
                p.cooling,
                Some((p.width, p.height)),
                p.seed,
            ),
        };
        Self {
            k,
            initial_temperature,
            attraction: k * attr,
            repulsion: (k * rep).powi(2),
            iteration_limit: limit,
            lambda,
            cooling,
            bounds,
            seed,
        }
    }

    fn temperature(&self, current: f64, iteration: usize) -> f64 {
        match self.cooling {
            CoolingFunction::Linear => {
                self.initial_temperature
                    * (1.0 - iteration as f64 / self.iteration_limit.max(1) as f64)
            }
            CoolingFunction::Exponential => current * self.lambda,
        }
    }
}

/// Fruchterman-Reingold spring embedder, free or bounded to a rectangle.
#[derive(Debug, Clone)]
pub struct FrLayout {
    state: LayoutState,
    params: FrParams,
}

impl FrLayout {
    pub fn new(
        positions: Option<PositionTable>,
        sizes: Option<SizeTable>,
        params: impl Into<FrParams>,
    ) -> Self {
        Self {
            state: LayoutState::new(positions, sizes),
            params: params.into(),
        }
    }

    pub fn params(&self) -> &FrParams {
        &self.params
    }
}

/// Unit direction from `from` to `to`; coincident points get a seeded random one.
fn separation(from: Point, to: Point, rng: &mut Rng) -> (Vector, f64) {
    let delta = to - from;
    let length = delta.length();
    if length > EPSILON {
        return (delta / length, length);
    }
    let angle = rng.range(0.0, std::f64::consts::TAU);
    (Vector::new(angle.cos(), angle.sin()), EPSILON)
}

impl LayoutAlgorithm for FrLayout {
    fn name(&self) -> &'static str {
        match self.params {
            FrParams::Free(_) => "fr",
            FrParams::Bounded(_) => "bounded-fr",
        }
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
        let schedule = Schedule::new(&self.params, n);
        let mut rng = Rng::new(schedule.seed);
        let (span_w, span_h) = schedule
            .bounds
            .unwrap_or_else(|| (schedule.k * (n as f64).sqrt(), schedule.k * (n as f64).sqrt()));
        let mut centers = initial_centers(&self.state, &topo, &mut rng, Point::ORIGIN, span_w, span_h);
        let pinned = pinned_mask(&self.state, &topo, true);

        let mut temperature = schedule.initial_temperature;
        let mut forces = vec![Vector::ZERO; n];
        for iteration in 0..schedule.iteration_limit {
            cancel.check()?;
            forces.iter_mut().for_each(|f| *f = Vector::ZERO);

            for v in 0..n {
                for u in 0..n {
                    if u == v {
                        continue;
                    }
                    let (dir, length) = separation(centers[u], centers[v], &mut rng);
                    forces[v] += dir * (schedule.repulsion / length);
                }
            }
            for edge in &topo.edges {
                let (dir, length) = separation(centers[edge.target], centers[edge.source], &mut rng);
                let pull = dir * (length * length / schedule.attraction);
                forces[edge.source] -= pull;
                forces[edge.target] += pull;
            }

            for v in 0..n {
                if pinned[v] {
                    continue;
                }
                let length = forces[v].length();
                if length > EPSILON {
                    centers[v] += forces[v] / length * length.min(temperature);
                }
                if let Some((w, h)) = schedule.bounds {
                    centers[v].x = centers[v].x.clamp(0.0, w);
                    centers[v].y = centers[v].y.clamp(0.0, h);
                }
            }
            temperature = schedule.temperature(temperature, iteration + 1);
            log::trace!("fr iteration {iteration}: temperature {temperature:.3}");
        }

        commit_centers(&mut self.state, &topo, &centers);
        log::debug!("{} layout: {} vertices, {} edges", self.name(), n, topo.edges.len());
        Ok(())
    }
}
