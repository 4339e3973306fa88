use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ArrangeError, Result};
use crate::geometry::{Point, Rect, Size};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VertexId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EdgeId(pub u64);

impl fmt::Display for VertexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub type PositionTable = BTreeMap<VertexId, Point>;
pub type SizeTable = BTreeMap<VertexId, Size>;
pub type RectTable<K = VertexId> = BTreeMap<K, Rect>;
pub type EdgeRoutes = BTreeMap<EdgeId, Vec<Point>>;

/// Layout direction for tree and layered algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Direction {
    #[default]
    TopDown,
    BottomUp,
    LeftRight,
    RightLeft,
}

impl Direction {
    /// Layers advance along the x axis.
    pub fn is_horizontal(self) -> bool {
        matches!(self, Self::LeftRight | Self::RightLeft)
    }

    /// Layers advance toward negative coordinates before normalisation.
    pub fn is_reversed(self) -> bool {
        matches!(self, Self::BottomUp | Self::RightLeft)
    }
}

/// How the algorithms treat a vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProcessingMode {
    #[default]
    Default,
    /// Keep the seeded position where the algorithm supports pinning.
    Freeze,
    /// Skip the vertex entirely: no layout, no overlap removal, no routing obstacle.
    Exclude,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    pub id: VertexId,
    #[serde(default)]
    pub group_id: i32,
    #[serde(default)]
    pub processing: ProcessingMode,
}

impl Vertex {
    pub fn new(id: u64) -> Self {
        Self {
            id: VertexId(id),
            group_id: 0,
            processing: ProcessingMode::Default,
        }
    }

    pub fn with_group(mut self, group_id: i32) -> Self {
        self.group_id = group_id;
        self
    }

    pub fn with_processing(mut self, processing: ProcessingMode) -> Self {
        self.processing = processing;
        self
    }

    pub fn is_excluded(&self) -> bool {
        self.processing == ProcessingMode::Exclude
    }

    pub fn is_frozen(&self) -> bool {
        self.processing == ProcessingMode::Freeze
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub source: VertexId,
    pub target: VertexId,
    pub weight: f64,
    pub source_connection_point: Option<u32>,
    pub target_connection_point: Option<u32>,
    /// Routed path including both endpoints; `None` renders as a straight line.
    pub routing_points: Option<Vec<Point>>,
}

impl Edge {
    pub fn new(source: VertexId, target: VertexId) -> Self {
        Self {
            id: EdgeId(0),
            source,
            target,
            weight: 1.0,
            source_connection_point: None,
            target_connection_point: None,
            routing_points: None,
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn is_self_loop(&self) -> bool {
        self.source == self.target
    }

    pub fn touches(&self, vertex: VertexId) -> bool {
        self.source == vertex || self.target == vertex
    }
}

/// Directed graph of uniquely identified vertices.
///
/// Vertices keep insertion order, which is the deterministic iteration order
/// every algorithm relies on.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    vertices: Vec<Vertex>,
    index: HashMap<VertexId, usize>,
    edges: Vec<Edge>,
    edge_index: HashMap<EdgeId, usize>,
    next_edge_id: u64,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_vertex(&mut self, vertex: Vertex) -> Result<VertexId> {
        if vertex.id.0 == 0 {
            return Err(ArrangeError::UnassignedVertexId);
        }
        if self.index.contains_key(&vertex.id) {
            return Err(ArrangeError::DuplicateVertex(vertex.id));
        }
        let id = vertex.id;
        self.index.insert(id, self.vertices.len());
        self.vertices.push(vertex);
        Ok(id)
    }

    /// Adds vertices `1..=count` with default settings.
    pub fn with_vertices(count: u64) -> Self {
        let mut graph = Self::new();
        for id in 1..=count {
            graph.vertices.push(Vertex::new(id));
            graph.index.insert(VertexId(id), (id - 1) as usize);
        }
        graph
    }

    pub fn add_edge(&mut self, source: VertexId, target: VertexId) -> Result<EdgeId> {
        self.add_edge_with(Edge::new(source, target))
    }

    /// Inserts a fully specified edge. An id of 0 is replaced by a fresh one.
    pub fn add_edge_with(&mut self, mut edge: Edge) -> Result<EdgeId> {
        for endpoint in [edge.source, edge.target] {
            if !self.index.contains_key(&endpoint) {
                return Err(ArrangeError::MissingVertex(endpoint));
            }
        }
        if edge.id.0 == 0 {
            loop {
                self.next_edge_id += 1;
                let candidate = EdgeId(self.next_edge_id);
                if !self.edge_index.contains_key(&candidate) {
                    edge.id = candidate;
                    break;
                }
            }
        } else if self.edge_index.contains_key(&edge.id) {
            return Err(ArrangeError::DuplicateEdge(edge.id));
        }
        let id = edge.id;
        self.edge_index.insert(id, self.edges.len());
        self.edges.push(edge);
        Ok(id)
    }

    /// Removes a vertex together with its incident edges.
    pub fn remove_vertex(&mut self, id: VertexId) -> Option<(Vertex, Vec<Edge>)> {
        let pos = self.index.remove(&id)?;
        let vertex = self.vertices.remove(pos);
        for idx in self.index.values_mut() {
            if *idx > pos {
                *idx -= 1;
            }
        }
        let (removed, kept): (Vec<Edge>, Vec<Edge>) =
            self.edges.drain(..).partition(|e| e.touches(id));
        self.edges = kept;
        self.reindex_edges();
        Some((vertex, removed))
    }

    pub fn remove_edge(&mut self, id: EdgeId) -> Option<Edge> {
        let pos = self.edge_index.remove(&id)?;
        let edge = self.edges.remove(pos);
        self.reindex_edges();
        Some(edge)
    }

    fn reindex_edges(&mut self) {
        self.edge_index = self
            .edges
            .iter()
            .enumerate()
            .map(|(idx, e)| (e.id, idx))
            .collect();
    }

    pub fn vertex(&self, id: VertexId) -> Option<&Vertex> {
        self.index.get(&id).map(|&idx| &self.vertices[idx])
    }

    pub fn vertex_mut(&mut self, id: VertexId) -> Option<&mut Vertex> {
        self.index.get(&id).map(|&idx| &mut self.vertices[idx])
    }

    pub fn contains_vertex(&self, id: VertexId) -> bool {
        self.index.contains_key(&id)
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub fn vertex_ids(&self) -> impl Iterator<Item = VertexId> + '_ {
        self.vertices.iter().map(|v| v.id)
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn edge(&self, id: EdgeId) -> Option<&Edge> {
        self.edge_index.get(&id).map(|&idx| &self.edges[idx])
    }

    pub fn edge_mut(&mut self, id: EdgeId) -> Option<&mut Edge> {
        self.edge_index.get(&id).map(|&idx| &mut self.edges[idx])
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn edges_mut(&mut self) -> impl Iterator<Item = &mut Edge> {
        self.edges.iter_mut()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn out_edges(&self, id: VertexId) -> impl Iterator<Item = &Edge> {
        self.edges.iter().filter(move |e| e.source == id)
    }

    pub fn in_edges(&self, id: VertexId) -> impl Iterator<Item = &Edge> {
        self.edges.iter().filter(move |e| e.target == id)
    }

    pub fn incident_edges(&self, id: VertexId) -> impl Iterator<Item = &Edge> {
        self.edges.iter().filter(move |e| e.touches(id))
    }

    /// Distinct vertices sharing an edge with `id`, in either direction.
    pub fn neighbors(&self, id: VertexId) -> Vec<VertexId> {
        let mut out: Vec<VertexId> = Vec::new();
        for edge in self.incident_edges(id) {
            let other = if edge.source == id { edge.target } else { edge.source };
            if other != id && !out.contains(&other) {
                out.push(other);
            }
        }
        out
    }

    pub fn out_degree(&self, id: VertexId) -> usize {
        self.out_edges(id).count()
    }

    pub fn in_degree(&self, id: VertexId) -> usize {
        self.in_edges(id).count()
    }

    /// Every edge endpoint must be a vertex of this graph.
    pub fn validate(&self) -> Result<()> {
        for edge in &self.edges {
            for endpoint in [edge.source, edge.target] {
                if !self.index.contains_key(&endpoint) {
                    return Err(ArrangeError::MissingVertex(endpoint));
                }
            }
        }
        Ok(())
    }

    /// Subgraph over `ids` keeping only edges with both endpoints inside.
    /// Vertex and edge ids are preserved.
    pub fn induced_subgraph(&self, ids: &[VertexId]) -> Graph {
        let mut sub = Graph::new();
        for id in ids {
            if let Some(vertex) = self.vertex(*id)
                && !sub.contains_vertex(*id)
            {
                sub.index.insert(*id, sub.vertices.len());
                sub.vertices.push(vertex.clone());
            }
        }
        for edge in &self.edges {
            if sub.contains_vertex(edge.source) && sub.contains_vertex(edge.target) {
                sub.edge_index.insert(edge.id, sub.edges.len());
                sub.edges.push(edge.clone());
            }
        }
        sub.next_edge_id = self.next_edge_id;
        sub
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_duplicate_and_unassigned_ids() {
        let mut graph = Graph::new();
        graph.add_vertex(Vertex::new(1)).unwrap();
        assert_eq!(
            graph.add_vertex(Vertex::new(1)),
            Err(ArrangeError::DuplicateVertex(VertexId(1)))
        );
        assert_eq!(
            graph.add_vertex(Vertex::new(0)),
            Err(ArrangeError::UnassignedVertexId)
        );
    }

    #[test]
    fn edges_require_known_endpoints() {
        let mut graph = Graph::with_vertices(2);
        let e = graph.add_edge(VertexId(1), VertexId(2)).unwrap();
        assert_eq!(graph.edge(e).unwrap().weight, 1.0);
        assert_eq!(
            graph.add_edge(VertexId(1), VertexId(9)),
            Err(ArrangeError::MissingVertex(VertexId(9)))
        );
    }

    #[test]
    fn removing_vertex_drops_incident_edges() {
        let mut graph = Graph::with_vertices(3);
        graph.add_edge(VertexId(1), VertexId(2)).unwrap();
        let keep = graph.add_edge(VertexId(1), VertexId(3)).unwrap();
        let (_, removed) = graph.remove_vertex(VertexId(2)).unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(graph.edge_count(), 1);
        assert!(graph.edge(keep).is_some());
        assert!(graph.vertex(VertexId(3)).is_some());
    }

    #[test]
    fn induced_subgraph_keeps_internal_edges_only() {
        let mut graph = Graph::with_vertices(4);
        graph.add_edge(VertexId(1), VertexId(2)).unwrap();
        graph.add_edge(VertexId(2), VertexId(3)).unwrap();
        graph.add_edge(VertexId(3), VertexId(4)).unwrap();
        let sub = graph.induced_subgraph(&[VertexId(1), VertexId(2), VertexId(4)]);
        assert_eq!(sub.vertex_count(), 3);
        assert_eq!(sub.edge_count(), 1);
        assert_eq!(sub.edges()[0].source, VertexId(1));
    }

    #[test]
    fn neighbors_ignore_direction_and_loops() {
        let mut graph = Graph::with_vertices(3);
        graph.add_edge(VertexId(1), VertexId(2)).unwrap();
        graph.add_edge(VertexId(3), VertexId(1)).unwrap();
        graph.add_edge(VertexId(2), VertexId(1)).unwrap();
        graph.add_edge(VertexId(1), VertexId(1)).unwrap();
        assert_eq!(graph.neighbors(VertexId(1)), vec![VertexId(2), VertexId(3)]);
    }
}
