use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::cancel::CancelToken;
use crate::error::{ArrangeError, Result};
use crate::geometry::{Rect, Vector, bounding_rect};
use crate::ir::{Graph, PositionTable, RectTable, SizeTable, VertexId};
use crate::overlap::{Fsa, OverlapRemovalAlgorithm, OverlapRemovalParams};

use super::{LayoutAlgorithm, LayoutState};

/// One group of a [`GroupedLayout`].
pub struct GroupParams {
    pub group_id: i32,
    /// Area the group is placed into.
    pub zone_rectangle: Option<Rect>,
    pub layout: Option<Box<dyn LayoutAlgorithm>>,
    /// The nested layout already places its output inside the zone.
    pub is_algorithm_bounded: bool,
}

impl GroupParams {
    pub fn new(group_id: i32, layout: Box<dyn LayoutAlgorithm>) -> Self {
        Self {
            group_id,
            zone_rectangle: None,
            layout: Some(layout),
            is_algorithm_bounded: false,
        }
    }

    pub fn with_zone(mut self, zone: Rect) -> Self {
        self.zone_rectangle = Some(zone);
        self
    }

    pub fn bounded(mut self) -> Self {
        self.is_algorithm_bounded = true;
        self
    }
}

impl fmt::Debug for GroupParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupParams")
            .field("group_id", &self.group_id)
            .field("zone_rectangle", &self.zone_rectangle)
            .field("layout", &self.layout.as_ref().map(|l| l.name()))
            .field("is_algorithm_bounded", &self.is_algorithm_bounded)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupingParams {
    /// Run overlap removal over the group bounding boxes afterwards.
    pub arrange_groups: bool,
    pub overlap: OverlapRemovalParams,
    /// Lay out groups from the highest id down.
    pub descending_order: bool,
}

impl Default for GroupingParams {
    fn default() -> Self {
        Self {
            arrange_groups: false,
            overlap: OverlapRemovalParams::default(),
            descending_order: true,
        }
    }
}

/// Composite layout delegating each vertex group to its own algorithm.
#[derive(Debug)]
pub struct GroupedLayout {
    state: LayoutState,
    groups: Vec<GroupParams>,
    params: GroupingParams,
    group_rects: RectTable<i32>,
}

impl GroupedLayout {
    pub fn new(
        positions: Option<PositionTable>,
        sizes: Option<SizeTable>,
        groups: Vec<GroupParams>,
        params: GroupingParams,
    ) -> Self {
        Self {
            state: LayoutState::new(positions, sizes),
            groups,
            params,
            group_rects: RectTable::new(),
        }
    }

    /// Bounding box of every laid out group, from the last successful compute.
    pub fn group_rectangles(&self) -> &RectTable<i32> {
        &self.group_rects
    }

    fn validate(&self, graph: &Graph) -> Result<()> {
        if self.groups.is_empty() {
            return Err(ArrangeError::config("grouped layout needs at least one group"));
        }
        let mut seen = HashSet::new();
        for group in &self.groups {
            let id = group.group_id;
            if !seen.insert(id) {
                return Err(ArrangeError::config(format!("group {id} is configured twice")));
            }
            if group.layout.is_none() {
                return Err(ArrangeError::config(format!("group {id} has no layout algorithm")));
            }
            match group.zone_rectangle {
                Some(zone) if zone.is_empty() => {
                    return Err(ArrangeError::config(format!("group {id} has an empty zone rectangle")));
                }
                None if group.is_algorithm_bounded => {
                    return Err(ArrangeError::config(format!(
                        "group {id} uses a bounded layout but has no zone rectangle"
                    )));
                }
                _ => {}
            }
        }
        if let Some(stray) = graph
            .vertices()
            .iter()
            .find(|v| !v.is_excluded() && !seen.contains(&v.group_id))
        {
            return Err(ArrangeError::config(format!(
                "vertex {} belongs to group {} which has no parameters",
                stray.id, stray.group_id
            )));
        }
        Ok(())
    }

    fn footprint(&self, positions: &PositionTable, ids: &[VertexId]) -> Option<Rect> {
        let rects: Vec<Rect> = ids
            .iter()
            .filter_map(|id| {
                positions
                    .get(id)
                    .map(|p| Rect::from_point_size(*p, self.state.size_of(*id)))
            })
            .collect();
        bounding_rect(&rects)
    }
}

impl LayoutAlgorithm for GroupedLayout {
    fn name(&self) -> &'static str {
        "grouped"
    }

    fn state(&self) -> &LayoutState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut LayoutState {
        &mut self.state
    }

    fn need_vertex_sizes(&self) -> bool {
        self.params.arrange_groups
            || self
                .groups
                .iter()
                .any(|g| g.layout.as_ref().is_some_and(|l| l.need_vertex_sizes()))
    }

    fn compute(&mut self, graph: &Graph, cancel: &CancelToken) -> Result<()> {
        self.validate(graph)?;

        let mut order: Vec<usize> = (0..self.groups.len()).collect();
        order.sort_by_key(|&i| self.groups[i].group_id);
        if self.params.descending_order {
            order.reverse();
        }

        let mut placed = PositionTable::new();
        let mut members: BTreeMap<i32, Vec<VertexId>> = BTreeMap::new();
        for idx in order {
            cancel.check()?;
            let group_id = self.groups[idx].group_id;
            let ids: Vec<VertexId> = graph
                .vertices()
                .iter()
                .filter(|v| !v.is_excluded() && v.group_id == group_id)
                .map(|v| v.id)
                .collect();
            if ids.is_empty() {
                log::debug!("group {group_id} has no vertices");
                continue;
            }
            let sub = graph.induced_subgraph(&ids);
            let seed: PositionTable = ids
                .iter()
                .filter_map(|id| self.state.positions.get(id).map(|p| (*id, *p)))
                .collect();
            let sizes: SizeTable = ids
                .iter()
                .filter_map(|id| self.state.sizes.get(id).map(|s| (*id, *s)))
                .collect();

            let group = &mut self.groups[idx];
            let Some(layout) = group.layout.as_mut() else {
                return Err(ArrangeError::config(format!("group {group_id} has no layout algorithm")));
            };
            layout.set_positions(seed);
            if layout.need_vertex_sizes() {
                layout.set_sizes(sizes);
            }
            layout.compute(&sub, cancel)?;
            let mut result = layout.take_positions();

            if let Some(zone) = group.zone_rectangle
                && !group.is_algorithm_bounded
            {
                let min_x = result.values().map(|p| p.x).fold(f64::INFINITY, f64::min);
                let min_y = result.values().map(|p| p.y).fold(f64::INFINITY, f64::min);
                if min_x.is_finite() && min_y.is_finite() {
                    let shift = Vector::new(zone.x - min_x, zone.y - min_y);
                    for p in result.values_mut() {
                        *p += shift;
                    }
                }
            }
            log::trace!("group {group_id}: {} vertices via {}", result.len(), layout.name());
            placed.extend(result);
            members.insert(group_id, ids);
        }

        let mut group_rects = RectTable::new();
        for (group_id, ids) in &members {
            if let Some(rect) = self.footprint(&placed, ids) {
                group_rects.insert(*group_id, rect);
            }
        }

        if self.params.arrange_groups && group_rects.len() > 1 {
            let mut fsa = Fsa::new(group_rects.clone(), self.params.overlap.clone());
            fsa.compute(cancel)?;
            let arranged = fsa.take_rectangles();
            for (group_id, after) in &arranged {
                let Some(before) = group_rects.get(group_id) else {
                    continue;
                };
                let delta = after.top_left() - before.top_left();
                for id in members.get(group_id).into_iter().flatten() {
                    if let Some(p) = placed.get_mut(id) {
                        *p += delta;
                    }
                }
            }
            group_rects = arranged;
        }

        self.state.positions.extend(placed);
        self.group_rects = group_rects;
        log::debug!(
            "grouped layout: {} groups, {} vertices",
            self.group_rects.len(),
            members.values().map(Vec::len).sum::<usize>()
        );
        Ok(())
    }
}
