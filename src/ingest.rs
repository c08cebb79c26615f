//! Batch ingest of a full graph payload
//!
//! Writes every node, then every edge, then the snapshot. Each entity commits
//! on its own, so a failure part-way leaves earlier entities in place.

use serde::Serialize;
use serde_json::Value;
use crate::{Error, Result};
use crate::record::{as_object, first_text_field};
use crate::storage::GraphStore;

/// Outcome of [`ingest_graph`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    /// Node records written (including ones that already existed)
    pub nodes: usize,
    /// Edge records written (including ones that already existed)
    pub edges: usize,
    /// Distinct node ids touched
    pub distinct_nodes: usize,
    /// Distinct edge ids touched
    pub distinct_edges: usize,
}

impl std::fmt::Display for IngestReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Ingest Summary:")?;
        writeln!(f, "  Node records: {} ({} distinct)", self.nodes, self.distinct_nodes)?;
        writeln!(f, "  Edge records: {} ({} distinct)", self.edges, self.distinct_edges)
    }
}

/// Store a `{nodes, edges}` payload and snapshot it.
///
/// Node categories come from `entity_type`, then `category`, then
/// `default_category`.
pub fn ingest_graph(store: &GraphStore, payload: &Value, default_category: &str) -> Result<IngestReport> {
    let map = as_object(payload, "graph payload")?;
    let nodes = list_field(map.get("nodes"), "nodes")?;
    let edges = list_field(map.get("edges"), "edges")?;

    tracing::info!("Ingesting {} nodes and {} edges", nodes.len(), edges.len());

    let mut report = IngestReport::default();
    let mut node_ids = Vec::with_capacity(nodes.len());
    for node in nodes {
        let category = node
            .as_object()
            .and_then(|obj| first_text_field(obj, &["entity_type", "category"]))
            .unwrap_or_else(|| default_category.to_string());
        node_ids.push(store.resolve_or_create_node(node, &category)?);
        report.nodes += 1;
    }

    let mut edge_ids = Vec::with_capacity(edges.len());
    for edge in edges {
        edge_ids.push(store.resolve_or_create_edge(edge)?);
        report.edges += 1;
    }

    node_ids.sort_unstable();
    node_ids.dedup();
    edge_ids.sort_unstable();
    edge_ids.dedup();
    report.distinct_nodes = node_ids.len();
    report.distinct_edges = edge_ids.len();

    store.store_snapshot(payload)?;
    tracing::info!(
        "Ingest complete: {} distinct nodes, {} distinct edges",
        report.distinct_nodes,
        report.distinct_edges
    );
    Ok(report)
}

fn list_field<'a>(value: Option<&'a Value>, name: &str) -> Result<&'a [Value]> {
    match value {
        None | Some(Value::Null) => Ok(&[]),
        Some(Value::Array(items)) => Ok(items),
        Some(_) => Err(Error::invalid(format!("graph payload `{}` must be a list", name))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn biology() -> Value {
        json!({
            "graph_id": "demo-biology",
            "nodes": [
                {"id": "cell", "name": "Cell", "entity_type": "Structure"},
                {"id": "nucleus", "name": "Nucleus", "entity_type": "Structure"},
                {"id": "dna", "name": "DNA", "category": "Molecule"},
                {"id": "mitosis", "name": "Mitosis"}
            ],
            "edges": [
                {"id": "e1", "source": "nucleus", "target": "cell", "relationship_type": "part_of"},
                {"id": "e2", "source": "dna", "target": "nucleus", "relationship_type": "part_of"},
                {"id": "e3", "source": "cell", "target": "mitosis", "relationship_type": "enables"}
            ]
        })
    }

    #[test]
    fn test_ingest_full_graph() {
        let store = GraphStore::open_in_memory().unwrap();
        let report = ingest_graph(&store, &biology(), "Concept").unwrap();

        assert_eq!(report.nodes, 4);
        assert_eq!(report.edges, 3);
        assert_eq!(report.distinct_nodes, 4);
        assert_eq!(report.distinct_edges, 3);

        assert_eq!(store.node_by_external_id("dna").unwrap().unwrap().category, "Molecule");
        assert_eq!(store.node_by_external_id("mitosis").unwrap().unwrap().category, "Concept");

        let stats = store.stats().unwrap();
        assert_eq!(stats.categories, 3);
        assert_eq!(stats.predicates, 2);
        assert_eq!(stats.snapshots, 1);

        let snapshot = store.latest_snapshot().unwrap().unwrap();
        assert_eq!(snapshot.payload_value().unwrap(), biology());
    }

    #[test]
    fn test_ingest_twice_is_idempotent() {
        let store = GraphStore::open_in_memory().unwrap();
        ingest_graph(&store, &biology(), "Concept").unwrap();
        let before = store.stats().unwrap();
        ingest_graph(&store, &biology(), "Concept").unwrap();
        assert_eq!(store.stats().unwrap(), before);
    }

    #[test]
    fn test_partial_failure_keeps_committed_entities() {
        let store = GraphStore::open_in_memory().unwrap();
        let payload = json!({
            "nodes": [{"id": "a"}, {"id": "b"}],
            "edges": [
                {"subject": "a", "predicate": "causes", "object": "b"},
                {"subject": "a", "predicate": "causes", "object": "missing"}
            ]
        });

        let err = ingest_graph(&store, &payload, "Concept").unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));

        let stats = store.stats().unwrap();
        assert_eq!(stats.nodes, 2);
        assert_eq!(stats.edges, 1);
        assert_eq!(stats.snapshots, 0);
    }

    #[test]
    fn test_payload_shape_checked() {
        let store = GraphStore::open_in_memory().unwrap();
        assert!(matches!(
            ingest_graph(&store, &json!({"nodes": {"id": "a"}}), "Concept"),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            ingest_graph(&store, &json!([]), "Concept"),
            Err(Error::InvalidArgument(_))
        ));

        let report = ingest_graph(&store, &json!({}), "Concept").unwrap();
        assert_eq!(report, IngestReport::default());
        assert_eq!(store.stats().unwrap().snapshots, 1);
    }
}
