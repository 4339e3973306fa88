use serde::{Deserialize, Serialize};

use crate::cancel::CancelToken;
use crate::error::Result;
use crate::geometry::{Point, Rect};
use crate::ir::{Graph, PositionTable, SizeTable};
use crate::rng::Rng;

use super::{LayoutAlgorithm, LayoutState, Topology, pinned_mask};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RandomParams {
    /// Area the vertices are scattered over.
    pub bounds: Rect,
    pub seed: u64,
}

impl Default for RandomParams {
    fn default() -> Self {
        Self {
            bounds: Rect::new(0.0, 0.0, 2000.0, 2000.0),
            seed: 0,
        }
    }
}

/// Uniformly random placement inside a bounding rectangle.
#[derive(Debug, Clone)]
pub struct RandomLayout {
    state: LayoutState,
    params: RandomParams,
}

impl RandomLayout {
    pub fn new(
        positions: Option<PositionTable>,
        sizes: Option<SizeTable>,
        params: RandomParams,
    ) -> Self {
        Self {
            state: LayoutState::new(positions, sizes),
            params,
        }
    }
}

impl LayoutAlgorithm for RandomLayout {
    fn name(&self) -> &'static str {
        "random"
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

    fn supports_object_freeze(&self) -> bool {
        true
    }

    fn compute(&mut self, graph: &Graph, cancel: &CancelToken) -> Result<()> {
        let topo = Topology::new(graph);
        let pinned = pinned_mask(&self.state, &topo, true);
        let mut rng = Rng::new(self.params.seed);
        let bounds = self.params.bounds;
        let mut placed = Vec::with_capacity(topo.len());
        for (idx, &id) in topo.ids.iter().enumerate() {
            cancel.check()?;
            if pinned[idx] {
                continue;
            }
            let size = self.state.size_of(id);
            let x = rng.range(bounds.left(), (bounds.right() - size.width).max(bounds.left()));
            let y = rng.range(bounds.top(), (bounds.bottom() - size.height).max(bounds.top()));
            placed.push((id, Point::new(x, y)));
        }
        self.state.positions.extend(placed);
        log::debug!("random layout placed {} vertices", topo.len());
        Ok(())
    }
}
