use crate::cancel::CancelToken;
use crate::config::{Config, load_config};
use crate::factory::{LayoutKind, LayoutParams};
use crate::geometry::{Point, Size};
use crate::ir::{Edge, EdgeId, Graph, PositionTable, ProcessingMode, SizeTable, Vertex, VertexId};
use crate::logic_core::{ArrangeOutcome, LogicCore};
use anyhow::{Context, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(
    name = "garr",
    version,
    about = "Arrange a graph: layout, overlap removal and edge routing"
)]
pub struct Args {
    /// Input graph JSON or '-' for stdin
    #[arg(short = 'i', long = "input")]
    pub input: Option<PathBuf>,

    /// Output file. Defaults to stdout.
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Config JSON/JSON5 file
    #[arg(short = 'c', long = "configFile")]
    pub config: Option<PathBuf>,

    /// Layout algorithm, overriding the config (e.g. fr, kk, tree, sugiyama)
    #[arg(short = 'l', long = "layout")]
    pub layout: Option<LayoutKind>,

    /// Seed for the layout's random number generator
    #[arg(short = 's', long = "seed")]
    pub seed: Option<u64>,

    /// Skip overlap removal
    #[arg(long = "no-overlap")]
    pub no_overlap: bool,

    /// Skip edge routing
    #[arg(long = "no-routing")]
    pub no_routing: bool,
}

#[derive(Debug, Deserialize)]
struct GraphDocument {
    vertices: Vec<VertexEntry>,
    #[serde(default)]
    edges: Vec<EdgeEntry>,
}

#[derive(Debug, Deserialize)]
struct VertexEntry {
    id: u64,
    #[serde(default)]
    group: i32,
    #[serde(default)]
    processing: ProcessingMode,
    size: Option<Size>,
    position: Option<Point>,
}

#[derive(Debug, Deserialize)]
struct EdgeEntry {
    #[serde(default)]
    id: u64,
    source: u64,
    target: u64,
    #[serde(default = "unit_weight")]
    weight: f64,
}

fn unit_weight() -> f64 {
    1.0
}

#[derive(Debug, Serialize)]
struct ArrangedDocument {
    vertices: Vec<ArrangedVertex>,
    edges: Vec<ArrangedEdge>,
    #[serde(skip_serializing_if = "Option::is_none")]
    overlap_cost: Option<f64>,
}

#[derive(Debug, Serialize)]
struct ArrangedVertex {
    id: VertexId,
    x: f64,
    y: f64,
    width: f64,
    height: f64,
}

#[derive(Debug, Serialize)]
struct ArrangedEdge {
    id: EdgeId,
    source: VertexId,
    target: VertexId,
    #[serde(skip_serializing_if = "Option::is_none")]
    route: Option<Vec<Point>>,
}

/// Input tables decoded from a graph document.
struct Input {
    graph: Graph,
    sizes: SizeTable,
    positions: Option<PositionTable>,
}

fn parse_graph_document(text: &str, default_size: Size) -> Result<Input> {
    let doc: GraphDocument = serde_json::from_str(text).context("invalid graph document")?;
    let mut graph = Graph::new();
    let mut sizes = SizeTable::new();
    let mut positions = PositionTable::new();
    for entry in doc.vertices {
        let vertex = Vertex::new(entry.id)
            .with_group(entry.group)
            .with_processing(entry.processing);
        let id = graph.add_vertex(vertex)?;
        sizes.insert(id, entry.size.unwrap_or(default_size));
        if let Some(p) = entry.position {
            positions.insert(id, p);
        }
    }
    for entry in doc.edges {
        let mut edge = Edge::new(VertexId(entry.source), VertexId(entry.target)).with_weight(entry.weight);
        edge.id = EdgeId(entry.id);
        graph.add_edge_with(edge)?;
    }
    let positions = (!positions.is_empty()).then_some(positions);
    Ok(Input {
        graph,
        sizes,
        positions,
    })
}

fn render_outcome(graph: &Graph, sizes: &SizeTable, outcome: &ArrangeOutcome) -> Result<String> {
    let vertices = outcome
        .positions
        .iter()
        .map(|(id, p)| {
            let size = sizes.get(id).copied().unwrap_or(Size::ZERO);
            ArrangedVertex {
                id: *id,
                x: p.x,
                y: p.y,
                width: size.width,
                height: size.height,
            }
        })
        .collect();
    let edges = graph
        .edges()
        .iter()
        .map(|e| ArrangedEdge {
            id: e.id,
            source: e.source,
            target: e.target,
            route: e.routing_points.clone(),
        })
        .collect();
    let doc = ArrangedDocument {
        vertices,
        edges,
        overlap_cost: outcome.overlap_cost,
    };
    Ok(serde_json::to_string_pretty(&doc)?)
}

fn apply_overrides(config: &mut Config, args: &Args) {
    if let Some(kind) = args.layout {
        let keep = config.layout.as_ref().is_some_and(|p| p.kind() == kind);
        if !keep {
            config.layout = Some(LayoutParams::default_for(kind));
        }
    }
    if let (Some(seed), Some(layout)) = (args.seed, config.layout.as_mut()) {
        layout.set_seed(seed);
    }
    if args.no_overlap {
        config.overlap = None;
    }
    if args.no_routing {
        config.routing = None;
    }
}

pub fn run() -> Result<()> {
    let args = Args::parse();
    let mut config = load_config(args.config.as_deref())?;
    apply_overrides(&mut config, &args);

    let text = read_input(args.input.as_deref())?;
    let Input {
        mut graph,
        sizes,
        positions,
    } = parse_graph_document(&text, config.default_vertex_size)?;
    log::info!(
        "arranging {} vertices and {} edges",
        graph.vertex_count(),
        graph.edge_count()
    );

    let mut core = LogicCore::new(config.layout, config.overlap, config.routing);
    let outcome = core.compute(&mut graph, &sizes, positions, &CancelToken::none())?;
    let json = render_outcome(&graph, &sizes, &outcome)?;
    write_output(&json, args.output.as_deref())
}

fn read_input(path: Option<&Path>) -> Result<String> {
    if let Some(path) = path
        && path != Path::new("-")
    {
        return std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()));
    }
    let mut buf = String::new();
    io::stdin().read_to_string(&mut buf)?;
    Ok(buf)
}

fn write_output(json: &str, path: Option<&Path>) -> Result<()> {
    match path {
        Some(path) => {
            std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
        }
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(json.as_bytes())?;
            stdout.write_all(b"\n")?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::OverlapParams;

    const DOC: &str = r#"{
        "vertices": [
            {"id": 1, "size": {"width": 30, "height": 10}},
            {"id": 2, "position": {"x": 5, "y": 6}},
            {"id": 3, "group": 2, "processing": "exclude"}
        ],
        "edges": [
            {"source": 1, "target": 2},
            {"id": 7, "source": 2, "target": 3, "weight": 2.5}
        ]
    }"#;

    #[test]
    fn graph_documents_decode_with_defaults() {
        let input = parse_graph_document(DOC, Size::new(40.0, 20.0)).unwrap();
        assert_eq!(input.graph.vertex_count(), 3);
        assert_eq!(input.sizes[&VertexId(1)], Size::new(30.0, 10.0));
        assert_eq!(input.sizes[&VertexId(2)], Size::new(40.0, 20.0));
        assert_eq!(input.positions.unwrap()[&VertexId(2)], Point::new(5.0, 6.0));
        assert_eq!(input.graph.edge(EdgeId(7)).unwrap().weight, 2.5);
        assert!(input.graph.vertex(VertexId(3)).unwrap().is_excluded());
    }

    #[test]
    fn bad_documents_are_rejected() {
        let dup = r#"{"vertices": [{"id": 1}, {"id": 1}]}"#;
        assert!(parse_graph_document(dup, Size::ZERO).is_err());
        let dangling = r#"{"vertices": [{"id": 1}], "edges": [{"source": 1, "target": 4}]}"#;
        assert!(parse_graph_document(dangling, Size::ZERO).is_err());
    }

    #[test]
    fn overrides_replace_layout_and_stages() {
        let args = Args::parse_from(["garr", "--layout", "tree", "--seed", "5", "--no-routing"]);
        let mut config = Config::default();
        apply_overrides(&mut config, &args);
        assert_eq!(config.layout.as_ref().map(|l| l.kind()), Some(LayoutKind::Tree));
        assert_eq!(config.layout.map(|l| l.seed()), Some(5));
        assert!(config.routing.is_none());
        assert_eq!(config.overlap, Some(OverlapParams::default()));
    }

    #[test]
    fn outcome_serialises_positions_and_routes() {
        let mut input = parse_graph_document(DOC, Size::new(40.0, 20.0)).unwrap();
        let mut core = LogicCore::new(
            Some(LayoutParams::default_for(LayoutKind::Circular)),
            None,
            None,
        );
        let outcome = core
            .compute(&mut input.graph, &input.sizes, None, &CancelToken::none())
            .unwrap();
        let json = render_outcome(&input.graph, &input.sizes, &outcome).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["vertices"].as_array().unwrap().len(), 2);
        assert_eq!(value["edges"].as_array().unwrap().len(), 2);
        assert!(value.get("overlap_cost").is_none());
    }
}
