//! Graph arrangement: vertex layout, overlap removal and obstacle-avoiding
//! edge routing, sequenced by [`LogicCore`].

pub mod cancel;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod error;
pub mod factory;
pub mod geometry;
pub mod ir;
pub mod layout;
pub mod logic_core;
pub mod overlap;
pub mod rng;
pub mod routing;

pub use cancel::CancelToken;
#[cfg(feature = "cli")]
pub use cli::run;
pub use error::{ArrangeError, Result};
pub use factory::{
    LayoutKind, LayoutParams, OverlapKind, OverlapParams, RoutingKind, RoutingParams,
    create_edge_routing, create_layout, create_overlap_removal,
};
pub use geometry::{Point, Rect, Size, Vector};
pub use ir::{
    Edge, EdgeId, EdgeRoutes, Graph, PositionTable, ProcessingMode, RectTable, SizeTable, Vertex,
    VertexId,
};
pub use layout::LayoutAlgorithm;
pub use logic_core::{ArrangeOutcome, LogicCore};
pub use overlap::OverlapRemovalAlgorithm;
pub use routing::EdgeRoutingAlgorithm;
