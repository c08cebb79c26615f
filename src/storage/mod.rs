//! Storage Layer - SQLite-backed persistence
//!
//! System of record is SQLite with tables:
//! - categories(category_name) and predicates(predicate_name) - controlled vocabularies
//! - nodes(external_id, node_name, category_id, description, raw_json)
//! - node_aliases(node_id, alias)
//! - edges(subject_node_id, predicate_id, object_node_id, description, evidence, edge_json)
//! - graph_snapshot(snapshot_json, created_at) - a single replaceable row

pub mod schema;
pub mod sqlite;

pub use schema::initialize;
pub use sqlite::{DbStats, GraphStore, DEFAULT_BUSY_TIMEOUT};
