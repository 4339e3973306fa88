//! Overlap removal with the Force Scan Algorithm.
//!
//! Rectangles are padded by half the configured gap on every side, swept
//! along x and then y while accumulating the displacement each one needs,
//! and finally unpadded. FSA is greedy, so the scan is repeated a few times
//! and any overlap that survives is cleared by a deterministic axis sweep.

use serde::{Deserialize, Serialize};

use crate::cancel::CancelToken;
use crate::error::Result;
use crate::geometry::{EPSILON, Point, Rect, Vector};
use crate::ir::RectTable;

/// Offset applied to rectangles that share a centre before a vertical scan.
const NUDGE: f64 = 0.0001;
/// Full FSA scans before falling back to the sweep.
const MAX_SCANS: usize = 4;
/// Overlap smaller than this along either axis counts as touching.
const TOUCH_TOLERANCE: f64 = 1e-6;

pub trait OverlapRemovalAlgorithm<K>: Send {
    fn rectangles(&self) -> &RectTable<K>;

    fn set_rectangles(&mut self, rectangles: RectTable<K>);

    fn take_rectangles(&mut self) -> RectTable<K>;

    /// Moves the rectangles until none overlap. On error the table is unchanged.
    fn compute(&mut self, cancel: &CancelToken) -> Result<()>;

    /// Sum of squared displacements of the last compute.
    fn cost(&self) -> f64;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlapRemovalParams {
    pub horizontal_gap: f64,
    pub vertical_gap: f64,
}

impl Default for OverlapRemovalParams {
    fn default() -> Self {
        Self {
            horizontal_gap: 10.0,
            vertical_gap: 10.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OneWayFsaWay {
    #[default]
    Horizontal,
    Vertical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OneWayFsaParams {
    pub horizontal_gap: f64,
    pub vertical_gap: f64,
    pub way: OneWayFsaWay,
}

impl Default for OneWayFsaParams {
    fn default() -> Self {
        Self {
            horizontal_gap: 10.0,
            vertical_gap: 10.0,
            way: OneWayFsaWay::Horizontal,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    X,
    Y,
}

impl Axis {
    fn of(self, v: Vector) -> f64 {
        match self {
            Axis::X => v.x,
            Axis::Y => v.y,
        }
    }

    fn center(self, r: &Rect) -> f64 {
        let c = r.center();
        match self {
            Axis::X => c.x,
            Axis::Y => c.y,
        }
    }

    fn start(self, r: &Rect) -> f64 {
        match self {
            Axis::X => r.x,
            Axis::Y => r.y,
        }
    }

    fn set_start(self, r: &mut Rect, value: f64) {
        match self {
            Axis::X => r.x = value,
            Axis::Y => r.y = value,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Wrapped<K> {
    key: K,
    rect: Rect,
}

/// Displacement `vj` needs to stop touching `vi`, along the axis the pair
/// is more aligned on.
fn force(vi: &Rect, vj: &Rect) -> Vector {
    let d = vj.center() - vi.center();
    let (adx, ady) = (d.x.abs(), d.y.abs());
    if adx < EPSILON && ady < EPSILON {
        return Vector::ZERO;
    }
    let width_sum = vi.width + vj.width;
    let height_sum = vi.height + vj.height;
    let slope_limit = if width_sum > EPSILON {
        height_sum / width_sum
    } else {
        f64::INFINITY
    };
    if adx >= EPSILON {
        let slope = d.y / d.x;
        if slope > -slope_limit && slope <= slope_limit {
            let fx = d.x.signum() * (width_sum / 2.0 - adx);
            return Vector::new(fx, fx * slope);
        }
        let fy = d.y.signum() * (height_sum / 2.0 - ady);
        let fx = if slope.abs() < EPSILON { 0.0 } else { fy / slope };
        return Vector::new(fx, fy);
    }
    Vector::new(0.0, d.y.signum() * (height_sum / 2.0 - ady))
}

/// Positive displacement resolving an actual intersection, zero otherwise.
fn force2(vi: &Rect, vj: &Rect) -> Vector {
    if !vi.intersects(vj) {
        return Vector::ZERO;
    }
    let d = vj.center() - vi.center();
    let mut fx = (vi.width + vj.width) / 2.0 - d.x;
    let fy = (vi.height + vj.height) / 2.0 - d.y;
    if fx > fy && d.y.abs() > EPSILON {
        fx = fy * d.x / d.y;
    }
    Vector::new(fx.max(0.0), fy.max(0.0))
}

/// One FSA scan along `axis`.
fn improved_scan<K>(items: &mut [Wrapped<K>], axis: Axis) {
    let n = items.len();
    if n == 0 {
        return;
    }
    items.sort_by(|a, b| axis.center(&a.rect).total_cmp(&axis.center(&b.rect)));

    let origin = axis.center(&items[0].rect);
    let mut lmin = 0usize;
    let mut sigma = 0.0;
    let mut gamma = vec![0.0; n];
    let mut target = vec![0.0; n];
    let mut i = 0;
    while i < n {
        let shared = axis.center(&items[i].rect);
        let mut k = i;
        while k + 1 < n && axis.center(&items[k + 1].rect) == shared {
            k += 1;
        }
        if axis == Axis::Y {
            for z in (i + 1)..=k {
                items[z].rect.y += (z - i) as f64 * NUDGE;
            }
        }

        let mut g: f64 = 0.0;
        if axis.center(&items[k].rect) > origin {
            for m in i..=k {
                let mut needed: f64 = 0.0;
                for j in 0..i {
                    let f = match axis {
                        Axis::X => force(&items[j].rect, &items[m].rect),
                        Axis::Y => force2(&items[j].rect, &items[m].rect),
                    };
                    needed = needed.max(axis.of(f) + gamma[j]);
                }
                let start = axis.start(&items[m].rect);
                let claim = if start + needed < axis.start(&items[lmin].rect) {
                    sigma
                } else {
                    needed
                };
                g = g.max(claim);
            }
        }

        for m in i..=k {
            gamma[m] = g;
            let start = axis.start(&items[m].rect);
            target[m] = start + g;
            if start < axis.start(&items[lmin].rect) {
                lmin = m;
            }
        }

        let mut delta: f64 = 0.0;
        for m in i..=k {
            for j in (k + 1)..n {
                delta = delta.max(axis.of(force(&items[m].rect, &items[j].rect)));
            }
        }
        sigma += delta;
        i = k + 1;
    }

    for (item, &value) in items.iter_mut().zip(&target) {
        axis.set_start(&mut item.rect, value);
    }
}

fn overlapping(a: &Rect, b: &Rect) -> bool {
    let w = a.right().min(b.right()) - a.left().max(b.left());
    let h = a.bottom().min(b.bottom()) - a.top().max(b.top());
    w > TOUCH_TOLERANCE && h > TOUCH_TOLERANCE
}

fn any_overlap<K>(items: &[Wrapped<K>]) -> bool {
    items
        .iter()
        .enumerate()
        .any(|(i, a)| items[i + 1..].iter().any(|b| overlapping(&a.rect, &b.rect)))
}

/// Pushes each rectangle right or down past every earlier one it overlaps.
/// Every push lands on an edge of an earlier rectangle and only grows the
/// coordinates, so the loop ends.
fn sweep_apart<K>(items: &mut [Wrapped<K>], allow_x: bool, allow_y: bool) {
    items.sort_by(|a, b| {
        a.rect
            .left()
            .total_cmp(&b.rect.left())
            .then(a.rect.top().total_cmp(&b.rect.top()))
    });
    for i in 1..items.len() {
        loop {
            let current = items[i].rect;
            let Some(blocker) = items[..i].iter().find(|o| overlapping(&current, &o.rect)) else {
                break;
            };
            let dx = blocker.rect.right() - current.left();
            let dy = blocker.rect.bottom() - current.top();
            let push = match (allow_x, allow_y) {
                (true, true) if dy < dx => Vector::new(0.0, dy),
                (true, _) => Vector::new(dx, 0.0),
                _ => Vector::new(0.0, dy),
            };
            items[i].rect = current.offset(push);
        }
    }
}

/// Runs the scans and returns the unpadded rectangles with their cost.
fn remove_overlaps<K: Ord + Copy>(
    rectangles: &RectTable<K>,
    horizontal_gap: f64,
    vertical_gap: f64,
    axes: &[Axis],
    cancel: &CancelToken,
) -> Result<(RectTable<K>, f64)> {
    let (hx, hy) = (horizontal_gap / 2.0, vertical_gap / 2.0);
    let mut items: Vec<Wrapped<K>> = rectangles
        .iter()
        .map(|(key, rect)| Wrapped {
            key: *key,
            rect: rect.inflate(hx, hy),
        })
        .collect();

    let mut scans = 0;
    while scans < MAX_SCANS && any_overlap(&items) {
        cancel.check()?;
        for &axis in axes {
            improved_scan(&mut items, axis);
        }
        scans += 1;
    }
    if any_overlap(&items) {
        log::warn!(
            "force scan left overlaps after {scans} scans; sweeping {} rectangles apart",
            items.len()
        );
        cancel.check()?;
        sweep_apart(&mut items, axes.contains(&Axis::X), axes.contains(&Axis::Y));
    }

    let mut cost = 0.0;
    let mut out = RectTable::new();
    for item in items {
        let rect = item.rect.inflate(-hx, -hy);
        if let Some(before) = rectangles.get(&item.key) {
            let moved: Vector = rect.top_left() - Point::new(before.x, before.y);
            cost += moved.length_squared();
        }
        out.insert(item.key, rect);
    }
    log::debug!("overlap removal: {} rectangles, {scans} scans, cost {cost:.2}", out.len());
    Ok((out, cost))
}

/// Force Scan Algorithm resolving overlaps along both axes.
#[derive(Debug, Clone)]
pub struct Fsa<K> {
    rectangles: RectTable<K>,
    params: OverlapRemovalParams,
    cost: f64,
}

impl<K: Ord + Copy> Fsa<K> {
    pub fn new(rectangles: RectTable<K>, params: OverlapRemovalParams) -> Self {
        Self {
            rectangles,
            params,
            cost: 0.0,
        }
    }
}

impl<K: Ord + Copy + Send> OverlapRemovalAlgorithm<K> for Fsa<K> {
    fn rectangles(&self) -> &RectTable<K> {
        &self.rectangles
    }

    fn set_rectangles(&mut self, rectangles: RectTable<K>) {
        self.rectangles = rectangles;
    }

    fn take_rectangles(&mut self) -> RectTable<K> {
        std::mem::take(&mut self.rectangles)
    }

    fn compute(&mut self, cancel: &CancelToken) -> Result<()> {
        if self.rectangles.is_empty() {
            self.cost = 0.0;
            return Ok(());
        }
        let (rects, cost) = remove_overlaps(
            &self.rectangles,
            self.params.horizontal_gap,
            self.params.vertical_gap,
            &[Axis::X, Axis::Y],
            cancel,
        )?;
        self.rectangles = rects;
        self.cost = cost;
        Ok(())
    }

    fn cost(&self) -> f64 {
        self.cost
    }
}

/// FSA restricted to one axis; rectangles never move along the other.
#[derive(Debug, Clone)]
pub struct OneWayFsa<K> {
    rectangles: RectTable<K>,
    params: OneWayFsaParams,
    cost: f64,
}

impl<K: Ord + Copy> OneWayFsa<K> {
    pub fn new(rectangles: RectTable<K>, params: OneWayFsaParams) -> Self {
        Self {
            rectangles,
            params,
            cost: 0.0,
        }
    }
}

impl<K: Ord + Copy + Send> OverlapRemovalAlgorithm<K> for OneWayFsa<K> {
    fn rectangles(&self) -> &RectTable<K> {
        &self.rectangles
    }

    fn set_rectangles(&mut self, rectangles: RectTable<K>) {
        self.rectangles = rectangles;
    }

    fn take_rectangles(&mut self) -> RectTable<K> {
        std::mem::take(&mut self.rectangles)
    }

    fn compute(&mut self, cancel: &CancelToken) -> Result<()> {
        if self.rectangles.is_empty() {
            self.cost = 0.0;
            return Ok(());
        }
        let axis = match self.params.way {
            OneWayFsaWay::Horizontal => Axis::X,
            OneWayFsaWay::Vertical => Axis::Y,
        };
        let (mut rects, cost) = remove_overlaps(
            &self.rectangles,
            self.params.horizontal_gap,
            self.params.vertical_gap,
            &[axis],
            cancel,
        )?;
        // the vertical scan nudges shared centres; undo it on the fixed axis
        for (key, rect) in rects.iter_mut() {
            if let Some(before) = self.rectangles.get(key) {
                match axis {
                    Axis::X => rect.y = before.y,
                    Axis::Y => rect.x = before.x,
                }
            }
        }
        self.rectangles = rects;
        self.cost = cost;
        Ok(())
    }

    fn cost(&self) -> f64 {
        self.cost
    }
}
