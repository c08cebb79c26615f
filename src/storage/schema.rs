//! Database schema definitions

use rusqlite::Connection;
use crate::Result;

/// SQL to create the categories table (node type vocabulary)
pub const CREATE_CATEGORIES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS categories (
    category_id INTEGER PRIMARY KEY,
    category_name TEXT UNIQUE NOT NULL
)
"#;

/// SQL to create the predicates table (edge type vocabulary, stored upper-case)
pub const CREATE_PREDICATES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS predicates (
    predicate_id INTEGER PRIMARY KEY,
    predicate_name TEXT UNIQUE NOT NULL
)
"#;

/// SQL to create the nodes table
pub const CREATE_NODES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS nodes (
    node_id INTEGER PRIMARY KEY,
    external_id TEXT UNIQUE NOT NULL,
    node_name TEXT NOT NULL,
    category_id INTEGER NOT NULL,
    description TEXT,
    raw_json TEXT NOT NULL,
    FOREIGN KEY (category_id) REFERENCES categories(category_id)
)
"#;

/// SQL to create the edges table
/// The (subject, predicate, object) triple is the identity of an edge
pub const CREATE_EDGES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS edges (
    edge_id INTEGER PRIMARY KEY,
    subject_node_id INTEGER NOT NULL,
    object_node_id INTEGER NOT NULL,
    predicate_id INTEGER NOT NULL,
    description TEXT,
    evidence TEXT,
    edge_json TEXT NOT NULL,
    FOREIGN KEY (subject_node_id) REFERENCES nodes(node_id),
    FOREIGN KEY (object_node_id) REFERENCES nodes(node_id),
    FOREIGN KEY (predicate_id) REFERENCES predicates(predicate_id),
    UNIQUE(subject_node_id, predicate_id, object_node_id)
)
"#;

/// SQL to create the node_aliases table
pub const CREATE_NODE_ALIASES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS node_aliases (
    node_id INTEGER NOT NULL,
    alias TEXT NOT NULL,
    FOREIGN KEY (node_id) REFERENCES nodes(node_id) ON DELETE CASCADE,
    UNIQUE(node_id, alias)
)
"#;

/// SQL to create the graph_snapshot table
/// Holds at most one row; each store replaces it
pub const CREATE_GRAPH_SNAPSHOT_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS graph_snapshot (
    snapshot_id INTEGER PRIMARY KEY CHECK (snapshot_id = 1),
    snapshot_json TEXT NOT NULL,
    created_at TEXT NOT NULL
)
"#;

/// SQL to create indexes
pub const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_nodes_category ON nodes(category_id)",
    "CREATE INDEX IF NOT EXISTS idx_nodes_name ON nodes(node_name)",
    "CREATE INDEX IF NOT EXISTS idx_edges_subject ON edges(subject_node_id)",
    "CREATE INDEX IF NOT EXISTS idx_edges_object ON edges(object_node_id)",
    "CREATE INDEX IF NOT EXISTS idx_edges_predicate ON edges(predicate_id)",
    "CREATE INDEX IF NOT EXISTS idx_node_aliases_alias ON node_aliases(alias)",
];

/// Every table the store owns, in creation order
pub const TABLES: &[&str] = &[
    "categories",
    "predicates",
    "nodes",
    "edges",
    "node_aliases",
    "graph_snapshot",
];

/// All schema creation statements
pub fn all_schema_statements() -> Vec<&'static str> {
    let mut stmts = vec![
        CREATE_CATEGORIES_TABLE,
        CREATE_PREDICATES_TABLE,
        CREATE_NODES_TABLE,
        CREATE_EDGES_TABLE,
        CREATE_NODE_ALIASES_TABLE,
        CREATE_GRAPH_SNAPSHOT_TABLE,
    ];
    stmts.extend(CREATE_INDEXES.iter().copied());
    stmts
}

/// Create every table and index if absent and turn on foreign-key
/// enforcement for this connection. Safe to call repeatedly.
pub fn initialize(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "foreign_keys", true)?;
    for stmt in all_schema_statements() {
        conn.execute(stmt, [])?;
    }
    tracing::debug!("Schema ready ({} tables)", TABLES.len());
    Ok(())
}
