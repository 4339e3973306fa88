//! Mapping from algorithm kinds and parameter values to ready instances.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ArrangeError, Result};
use crate::ir::{PositionTable, RectTable, SizeTable, VertexId};
use crate::layout::{
    BalloonTreeLayout, BalloonTreeParams, BoundedFrParams, CircularLayout, CircularParams,
    EfficientSugiyamaLayout, EfficientSugiyamaParams, FrLayout, FreeFrParams, IsomLayout,
    IsomParams, KkLayout, KkParams, LayoutAlgorithm, LinLogLayout, LinLogParams, RandomLayout,
    RandomParams, SimpleTreeLayout, SimpleTreeParams, SugiyamaLayout, SugiyamaParams,
};
use crate::overlap::{
    Fsa, OneWayFsa, OneWayFsaParams, OverlapRemovalAlgorithm, OverlapRemovalParams,
};
use crate::routing::{EdgeRoutingAlgorithm, SimpleEdgeRouting, SimpleErParams};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LayoutKind {
    Random,
    Circular,
    Tree,
    BalloonTree,
    Fr,
    BoundedFr,
    Kk,
    Isom,
    #[serde(rename = "linlog")]
    LinLog,
    Sugiyama,
    EfficientSugiyama,
}

impl LayoutKind {
    pub const ALL: [LayoutKind; 11] = [
        LayoutKind::Random,
        LayoutKind::Circular,
        LayoutKind::Tree,
        LayoutKind::BalloonTree,
        LayoutKind::Fr,
        LayoutKind::BoundedFr,
        LayoutKind::Kk,
        LayoutKind::Isom,
        LayoutKind::LinLog,
        LayoutKind::Sugiyama,
        LayoutKind::EfficientSugiyama,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            LayoutKind::Random => "random",
            LayoutKind::Circular => "circular",
            LayoutKind::Tree => "tree",
            LayoutKind::BalloonTree => "balloon-tree",
            LayoutKind::Fr => "fr",
            LayoutKind::BoundedFr => "bounded-fr",
            LayoutKind::Kk => "kk",
            LayoutKind::Isom => "isom",
            LayoutKind::LinLog => "linlog",
            LayoutKind::Sugiyama => "sugiyama",
            LayoutKind::EfficientSugiyama => "efficient-sugiyama",
        }
    }
}

impl fmt::Display for LayoutKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LayoutKind {
    type Err = ArrangeError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        LayoutKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == wanted)
            .ok_or_else(|| ArrangeError::config(format!("unknown layout kind '{s}'")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverlapKind {
    Fsa,
    OneWayFsa,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RoutingKind {
    SimpleEr,
}

/// Parameters of one layout kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum LayoutParams {
    Random(RandomParams),
    Circular(CircularParams),
    Tree(SimpleTreeParams),
    BalloonTree(BalloonTreeParams),
    Fr(FreeFrParams),
    BoundedFr(BoundedFrParams),
    Kk(KkParams),
    Isom(IsomParams),
    #[serde(rename = "linlog")]
    LinLog(LinLogParams),
    Sugiyama(SugiyamaParams),
    EfficientSugiyama(EfficientSugiyamaParams),
}

impl LayoutParams {
    pub fn kind(&self) -> LayoutKind {
        match self {
            LayoutParams::Random(_) => LayoutKind::Random,
            LayoutParams::Circular(_) => LayoutKind::Circular,
            LayoutParams::Tree(_) => LayoutKind::Tree,
            LayoutParams::BalloonTree(_) => LayoutKind::BalloonTree,
            LayoutParams::Fr(_) => LayoutKind::Fr,
            LayoutParams::BoundedFr(_) => LayoutKind::BoundedFr,
            LayoutParams::Kk(_) => LayoutKind::Kk,
            LayoutParams::Isom(_) => LayoutKind::Isom,
            LayoutParams::LinLog(_) => LayoutKind::LinLog,
            LayoutParams::Sugiyama(_) => LayoutKind::Sugiyama,
            LayoutParams::EfficientSugiyama(_) => LayoutKind::EfficientSugiyama,
        }
    }

    pub fn default_for(kind: LayoutKind) -> Self {
        match kind {
            LayoutKind::Random => LayoutParams::Random(RandomParams::default()),
            LayoutKind::Circular => LayoutParams::Circular(CircularParams::default()),
            LayoutKind::Tree => LayoutParams::Tree(SimpleTreeParams::default()),
            LayoutKind::BalloonTree => LayoutParams::BalloonTree(BalloonTreeParams::default()),
            LayoutKind::Fr => LayoutParams::Fr(FreeFrParams::default()),
            LayoutKind::BoundedFr => LayoutParams::BoundedFr(BoundedFrParams::default()),
            LayoutKind::Kk => LayoutParams::Kk(KkParams::default()),
            LayoutKind::Isom => LayoutParams::Isom(IsomParams::default()),
            LayoutKind::LinLog => LayoutParams::LinLog(LinLogParams::default()),
            LayoutKind::Sugiyama => LayoutParams::Sugiyama(SugiyamaParams::default()),
            LayoutKind::EfficientSugiyama => {
                LayoutParams::EfficientSugiyama(EfficientSugiyamaParams::default())
            }
        }
    }

    pub fn seed(&self) -> u64 {
        match self {
            LayoutParams::Random(p) => p.seed,
            LayoutParams::Circular(p) => p.seed,
            LayoutParams::Tree(p) => p.seed,
            LayoutParams::BalloonTree(p) => p.seed,
            LayoutParams::Fr(p) => p.seed,
            LayoutParams::BoundedFr(p) => p.seed,
            LayoutParams::Kk(p) => p.seed,
            LayoutParams::Isom(p) => p.seed,
            LayoutParams::LinLog(p) => p.seed,
            LayoutParams::Sugiyama(p) => p.seed,
            LayoutParams::EfficientSugiyama(p) => p.seed,
        }
    }

    pub fn set_seed(&mut self, seed: u64) {
        match self {
            LayoutParams::Random(p) => p.seed = seed,
            LayoutParams::Circular(p) => p.seed = seed,
            LayoutParams::Tree(p) => p.seed = seed,
            LayoutParams::BalloonTree(p) => p.seed = seed,
            LayoutParams::Fr(p) => p.seed = seed,
            LayoutParams::BoundedFr(p) => p.seed = seed,
            LayoutParams::Kk(p) => p.seed = seed,
            LayoutParams::Isom(p) => p.seed = seed,
            LayoutParams::LinLog(p) => p.seed = seed,
            LayoutParams::Sugiyama(p) => p.seed = seed,
            LayoutParams::EfficientSugiyama(p) => p.seed = seed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum OverlapParams {
    Fsa(OverlapRemovalParams),
    OneWayFsa(OneWayFsaParams),
}

impl OverlapParams {
    pub fn kind(&self) -> OverlapKind {
        match self {
            OverlapParams::Fsa(_) => OverlapKind::Fsa,
            OverlapParams::OneWayFsa(_) => OverlapKind::OneWayFsa,
        }
    }

    pub fn default_for(kind: OverlapKind) -> Self {
        match kind {
            OverlapKind::Fsa => OverlapParams::Fsa(OverlapRemovalParams::default()),
            OverlapKind::OneWayFsa => OverlapParams::OneWayFsa(OneWayFsaParams::default()),
        }
    }
}

impl Default for OverlapParams {
    fn default() -> Self {
        OverlapParams::default_for(OverlapKind::Fsa)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum RoutingParams {
    SimpleEr(SimpleErParams),
}

impl RoutingParams {
    pub fn kind(&self) -> RoutingKind {
        match self {
            RoutingParams::SimpleEr(_) => RoutingKind::SimpleEr,
        }
    }

    pub fn default_for(kind: RoutingKind) -> Self {
        match kind {
            RoutingKind::SimpleEr => RoutingParams::SimpleEr(SimpleErParams::default()),
        }
    }
}

impl Default for RoutingParams {
    fn default() -> Self {
        RoutingParams::default_for(RoutingKind::SimpleEr)
    }
}

/// Layouts that read the size table.
pub fn needs_sizes(kind: LayoutKind) -> bool {
    matches!(
        kind,
        LayoutKind::Random
            | LayoutKind::Circular
            | LayoutKind::Tree
            | LayoutKind::Sugiyama
            | LayoutKind::EfficientSugiyama
    )
}

/// Layouts whose output may overlap.
pub fn needs_overlap_removal(kind: LayoutKind) -> bool {
    matches!(
        kind,
        LayoutKind::Random
            | LayoutKind::Fr
            | LayoutKind::BoundedFr
            | LayoutKind::Kk
            | LayoutKind::Isom
            | LayoutKind::LinLog
    )
}

/// Layered layouts bend their own edges; everything else goes through the router.
pub fn needs_edge_routing(kind: LayoutKind) -> bool {
    !matches!(kind, LayoutKind::Sugiyama | LayoutKind::EfficientSugiyama)
}

fn mismatch(expected: impl fmt::Debug, got: impl fmt::Debug) -> ArrangeError {
    ArrangeError::config(format!("parameters for {got:?} supplied to a {expected:?} algorithm"))
}

/// Builds a layout. Missing parameters fall back to the kind's defaults and
/// sizes are only handed to layouts that read them.
pub fn create_layout(
    kind: LayoutKind,
    positions: Option<PositionTable>,
    sizes: Option<SizeTable>,
    params: Option<LayoutParams>,
) -> Result<Box<dyn LayoutAlgorithm>> {
    let params = params.unwrap_or_else(|| LayoutParams::default_for(kind));
    if params.kind() != kind {
        return Err(mismatch(kind, params.kind()));
    }
    let sizes = if needs_sizes(kind) { sizes } else { None };
    let layout: Box<dyn LayoutAlgorithm> = match params {
        LayoutParams::Random(p) => Box::new(RandomLayout::new(positions, sizes, p)),
        LayoutParams::Circular(p) => Box::new(CircularLayout::new(positions, sizes, p)),
        LayoutParams::Tree(p) => Box::new(SimpleTreeLayout::new(positions, sizes, p)),
        LayoutParams::BalloonTree(p) => Box::new(BalloonTreeLayout::new(positions, sizes, p)),
        LayoutParams::Fr(p) => Box::new(FrLayout::new(positions, sizes, p)),
        LayoutParams::BoundedFr(p) => Box::new(FrLayout::new(positions, sizes, p)),
        LayoutParams::Kk(p) => Box::new(KkLayout::new(positions, sizes, p)),
        LayoutParams::Isom(p) => Box::new(IsomLayout::new(positions, sizes, p)),
        LayoutParams::LinLog(p) => Box::new(LinLogLayout::new(positions, sizes, p)),
        LayoutParams::Sugiyama(p) => Box::new(SugiyamaLayout::new(positions, sizes, p)),
        LayoutParams::EfficientSugiyama(p) => {
            Box::new(EfficientSugiyamaLayout::new(positions, sizes, p))
        }
    };
    Ok(layout)
}

pub fn create_overlap_removal(
    kind: OverlapKind,
    rectangles: RectTable<VertexId>,
    params: Option<OverlapParams>,
) -> Result<Box<dyn OverlapRemovalAlgorithm<VertexId>>> {
    let params = params.unwrap_or_else(|| OverlapParams::default_for(kind));
    if params.kind() != kind {
        return Err(mismatch(kind, params.kind()));
    }
    Ok(match params {
        OverlapParams::Fsa(p) => Box::new(Fsa::new(rectangles, p)),
        OverlapParams::OneWayFsa(p) => Box::new(OneWayFsa::new(rectangles, p)),
    })
}

pub fn create_edge_routing(
    kind: RoutingKind,
    positions: Option<PositionTable>,
    sizes: Option<SizeTable>,
    params: Option<RoutingParams>,
) -> Result<Box<dyn EdgeRoutingAlgorithm>> {
    let params = params.unwrap_or_else(|| RoutingParams::default_for(kind));
    if params.kind() != kind {
        return Err(mismatch(kind, params.kind()));
    }
    Ok(match params {
        RoutingParams::SimpleEr(p) => Box::new(SimpleEdgeRouting::new(positions, sizes, p)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelToken;
    use crate::geometry::{Rect, Size};
    use crate::ir::Graph;

    #[test]
    fn kinds_round_trip_through_strings() {
        for kind in LayoutKind::ALL {
            assert_eq!(kind.as_str().parse::<LayoutKind>().unwrap(), kind);
        }
        assert_eq!("Bounded-FR".parse::<LayoutKind>().unwrap(), LayoutKind::BoundedFr);
        assert!(matches!("spring".parse::<LayoutKind>(), Err(ArrangeError::Config(_))));
    }

    #[test]
    fn every_kind_builds_with_defaults() {
        let graph = Graph::with_vertices(3);
        let sizes: SizeTable = graph.vertex_ids().map(|id| (id, Size::new(10.0, 10.0))).collect();
        for kind in LayoutKind::ALL {
            let mut layout = create_layout(kind, None, Some(sizes.clone()), None).unwrap();
            assert_eq!(layout.need_vertex_sizes(), needs_sizes(kind), "{kind}");
            assert_eq!(layout.sizes().is_empty(), !needs_sizes(kind), "{kind}");
            layout.compute(&graph, &CancelToken::none()).unwrap();
            assert_eq!(layout.positions().len(), 3, "{kind}");
        }
    }

    #[test]
    fn mismatched_parameters_are_rejected() {
        let params = LayoutParams::default_for(LayoutKind::Kk);
        let err = create_layout(LayoutKind::Fr, None, None, Some(params)).err();
        assert!(matches!(err, Some(ArrangeError::Config(_))));

        let overlap = OverlapParams::default_for(OverlapKind::OneWayFsa);
        assert!(create_overlap_removal(OverlapKind::Fsa, RectTable::new(), Some(overlap)).is_err());
    }

    #[test]
    fn layered_kinds_route_their_own_edges() {
        for kind in LayoutKind::ALL {
            let layout = create_layout(kind, None, None, None).unwrap();
            assert_eq!(layout.edge_routes().is_some(), !needs_edge_routing(kind), "{kind}");
        }
    }

    #[test]
    fn parameters_parse_from_tagged_json() {
        let params: LayoutParams =
            serde_json::from_str(r#"{"kind": "bounded-fr", "width": 250, "seed": 9}"#).unwrap();
        match &params {
            LayoutParams::BoundedFr(p) => {
                assert_eq!(p.width, 250.0);
                assert_eq!(p.height, BoundedFrParams::default().height);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(params.seed(), 9);

        let overlap: OverlapParams =
            serde_json::from_str(r#"{"kind": "one-way-fsa", "way": "vertical"}"#).unwrap();
        assert_eq!(overlap.kind(), OverlapKind::OneWayFsa);

        let mut fsa = create_overlap_removal(
            OverlapKind::Fsa,
            [(VertexId(1), Rect::new(0.0, 0.0, 5.0, 5.0))].into_iter().collect(),
            None,
        )
        .unwrap();
        fsa.compute(&CancelToken::none()).unwrap();
        assert_eq!(fsa.rectangles().len(), 1);
    }

    #[test]
    fn cancelled_layouts_keep_their_tables() {
        let mut graph = Graph::with_vertices(4);
        for (s, t) in [(1, 2), (2, 3), (3, 4), (1, 4)] {
            graph.add_edge(VertexId(s), VertexId(t)).unwrap();
        }
        let sizes: SizeTable = graph.vertex_ids().map(|id| (id, Size::new(10.0, 10.0))).collect();
        let seed: PositionTable = graph
            .vertex_ids()
            .map(|id| (id, crate::geometry::Point::new(id.0 as f64 * 7.0, 3.0)))
            .collect();
        let cancel = CancelToken::new();
        cancel.cancel();
        for kind in LayoutKind::ALL {
            let mut layout =
                create_layout(kind, Some(seed.clone()), Some(sizes.clone()), None).unwrap();
            let err = layout.compute(&graph, &cancel).unwrap_err();
            assert!(err.is_cancelled(), "{kind}: {err}");
            assert_eq!(layout.positions(), &seed, "{kind}");
            assert!(layout.edge_routes().is_none_or(|r| r.is_empty()), "{kind}");
        }
    }
}
