//! SQLite storage implementation

use std::path::Path;
use std::time::Duration;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Params, Transaction, TransactionBehavior};
use serde::Serialize;
use serde_json::Value;
use crate::{Error, Result};
use crate::canonical::to_canonical_json;
use crate::record::{EdgeFields, GraphSnapshot, NodeEdges, NodeFields, StoredEdge, StoredNode};
use super::schema;

/// How long a writer waits on a locked database before giving up
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(10);

const NODE_COLUMNS: &str =
    "n.node_id, n.external_id, n.node_name, c.category_name, n.description, n.raw_json";

const EDGE_SELECT: &str = r#"
    SELECT e.edge_id, s.external_id, p.predicate_name, o.external_id, e.description, e.evidence, e.edge_json
    FROM edges e
    JOIN nodes s ON s.node_id = e.subject_node_id
    JOIN nodes o ON o.node_id = e.object_node_id
    JOIN predicates p ON p.predicate_id = e.predicate_id
"#;

/// SQLite-backed storage for the knowledge graph
pub struct GraphStore {
    conn: Connection,
}

impl GraphStore {
    /// Open a database file (creates if doesn't exist)
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_timeout(path, DEFAULT_BUSY_TIMEOUT)
    }

    /// Open a database file, waiting up to `busy_timeout` for other writers
    pub fn open_with_timeout(path: &Path, busy_timeout: Duration) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        // WAL lets readers proceed while another process holds the write lock
        let mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        tracing::debug!("Opened {} (journal_mode={})", path.display(), mode);
        Self::from_connection(conn)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    /// Wrap an existing connection, applying the schema to it
    pub fn from_connection(conn: Connection) -> Result<Self> {
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }

    /// Borrow the underlying connection for ad-hoc reads
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Each public write runs in its own immediate transaction so racing
    /// writers queue on the lock instead of failing on upgrade.
    fn unit_of_work(&self) -> Result<Transaction<'_>> {
        Ok(Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?)
    }

    // ========== Lexicon Operations ==========

    /// Get or create a category. The name is trimmed but keeps its case.
    pub fn resolve_or_create_category(&self, name: &str) -> Result<i64> {
        let tx = self.unit_of_work()?;
        let id = category_id_in(&tx, name)?;
        tx.commit()?;
        Ok(id)
    }

    /// Get or create a predicate. The name is trimmed and upper-cased.
    pub fn resolve_or_create_predicate(&self, name: &str) -> Result<i64> {
        let tx = self.unit_of_work()?;
        let id = predicate_id_in(&tx, name)?;
        tx.commit()?;
        Ok(id)
    }

    /// Stored name of a category
    pub fn category_name(&self, id: i64) -> Result<Option<String>> {
        self.conn
            .query_row("SELECT category_name FROM categories WHERE category_id = ?1", [id], |row| row.get(0))
            .optional()
            .map_err(Into::into)
    }

    /// Stored name of a predicate
    pub fn predicate_name(&self, id: i64) -> Result<Option<String>> {
        self.conn
            .query_row("SELECT predicate_name FROM predicates WHERE predicate_id = ?1", [id], |row| row.get(0))
            .optional()
            .map_err(Into::into)
    }

    // ========== Node Operations ==========

    /// Get or create a node keyed on the record's `id`.
    ///
    /// The first write wins: a later call with the same `id` returns the
    /// existing node and leaves its name, category and payload untouched.
    /// Aliases from every call are added to the node.
    pub fn resolve_or_create_node(&self, record: &Value, category_name: &str) -> Result<i64> {
        let fields = NodeFields::extract(record)?;
        let raw_json = to_canonical_json(record)?;

        let tx = self.unit_of_work()?;
        let category_id = category_id_in(&tx, category_name)?;
        let node_id = insert_then_lookup(
            &tx,
            r#"
            INSERT INTO nodes (external_id, node_name, category_id, description, raw_json)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(external_id) DO NOTHING
            "#,
            params![fields.external_id, fields.name, category_id, fields.description, raw_json],
            "SELECT node_id FROM nodes WHERE external_id = ?1",
            [&fields.external_id],
            &format!("node {:?}", fields.external_id),
        )?;

        for alias in &fields.aliases {
            tx.execute(
                "INSERT INTO node_aliases (node_id, alias) VALUES (?1, ?2) ON CONFLICT(node_id, alias) DO NOTHING",
                params![node_id, alias],
            )
            .map_err(|e| Error::from_write(e, &format!("alias {:?} of node {}", alias, node_id)))?;
        }

        tx.commit()?;
        tracing::debug!("Resolved node {} -> {}", fields.external_id, node_id);
        Ok(node_id)
    }

    /// Get a node by its external identifier
    pub fn node_by_external_id(&self, external_id: &str) -> Result<Option<StoredNode>> {
        let sql = format!(
            "SELECT {} FROM nodes n JOIN categories c ON c.category_id = n.category_id WHERE n.external_id = ?1",
            NODE_COLUMNS
        );
        self.conn
            .query_row(&sql, [external_id.trim()], row_to_node)
            .optional()
            .map_err(Into::into)
    }

    /// Aliases recorded for a node, sorted
    pub fn node_aliases(&self, node_id: i64) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT alias FROM node_aliases WHERE node_id = ?1 ORDER BY alias")?;
        let aliases = stmt
            .query_map([node_id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(aliases)
    }

    /// Search nodes by case-insensitive substring of name, description or alias
    pub fn search_nodes(&self, query: &str, limit: usize) -> Result<Vec<StoredNode>> {
        let query = query.trim();
        if query.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let pattern = format!("%{}%", escape_like(query));

        let sql = format!(
            r#"
            SELECT DISTINCT {}
            FROM nodes n
            JOIN categories c ON c.category_id = n.category_id
            LEFT JOIN node_aliases a ON a.node_id = n.node_id
            WHERE n.node_name LIKE ?1 ESCAPE '\'
               OR n.description LIKE ?1 ESCAPE '\'
               OR a.alias LIKE ?1 ESCAPE '\'
            ORDER BY n.node_name, n.node_id
            LIMIT ?2
            "#,
            NODE_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let nodes = stmt
            .query_map(params![pattern, limit as i64], row_to_node)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(nodes)
    }

    // ========== Edge Operations ==========

    /// Get or create an edge keyed on (subject, predicate, object).
    ///
    /// Both endpoints must already exist as nodes. Re-inserting the same
    /// triple returns the original edge and keeps its first payload.
    pub fn resolve_or_create_edge(&self, record: &Value) -> Result<i64> {
        let fields = EdgeFields::extract(record)?;
        let edge_json = to_canonical_json(record)?;

        let tx = self.unit_of_work()?;
        let subject_id = node_id_in(&tx, &fields.subject)?
            .ok_or_else(|| Error::not_found("subject node", fields.subject.clone()))?;
        let object_id = node_id_in(&tx, &fields.object)?
            .ok_or_else(|| Error::not_found("object node", fields.object.clone()))?;
        let predicate_id = predicate_id_in(&tx, &fields.predicate)?;

        let edge_id = insert_then_lookup(
            &tx,
            r#"
            INSERT INTO edges (subject_node_id, object_node_id, predicate_id, description, evidence, edge_json)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(subject_node_id, predicate_id, object_node_id) DO NOTHING
            "#,
            params![subject_id, object_id, predicate_id, fields.description, fields.evidence, edge_json],
            "SELECT edge_id FROM edges WHERE subject_node_id = ?1 AND predicate_id = ?2 AND object_node_id = ?3",
            params![subject_id, predicate_id, object_id],
            &format!("edge {} -{}-> {}", fields.subject, fields.predicate, fields.object),
        )?;

        tx.commit()?;
        tracing::debug!(
            "Resolved edge {} -{}-> {} -> {}",
            fields.subject,
            fields.predicate,
            fields.object,
            edge_id
        );
        Ok(edge_id)
    }

    /// Edges into and out of a node
    pub fn node_edges(&self, node_id: i64) -> Result<NodeEdges> {
        Ok(NodeEdges {
            inbound: self.edges_where("e.object_node_id = ?1", node_id)?,
            outbound: self.edges_where("e.subject_node_id = ?1", node_id)?,
        })
    }

    fn edges_where(&self, condition: &str, node_id: i64) -> Result<Vec<StoredEdge>> {
        let sql = format!("{} WHERE {} ORDER BY e.edge_id", EDGE_SELECT, condition);
        let mut stmt = self.conn.prepare(&sql)?;
        let edges = stmt
            .query_map([node_id], row_to_edge)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(edges)
    }

    // ========== Snapshot Operations ==========

    /// Replace the stored graph snapshot with the canonical form of `payload`
    pub fn store_snapshot<T: Serialize + ?Sized>(&self, payload: &T) -> Result<()> {
        let snapshot_json = to_canonical_json(payload)?;
        let created_at = Utc::now().to_rfc3339();

        let tx = self.unit_of_work()?;
        tx.execute(
            "INSERT OR REPLACE INTO graph_snapshot (snapshot_id, snapshot_json, created_at) VALUES (1, ?1, ?2)",
            params![snapshot_json, created_at],
        )
        .map_err(|e| Error::from_write(e, "graph snapshot"))?;
        tx.commit()?;

        tracing::debug!("Stored graph snapshot ({} bytes)", snapshot_json.len());
        Ok(())
    }

    /// The most recently stored snapshot, if any
    pub fn latest_snapshot(&self) -> Result<Option<GraphSnapshot>> {
        self.conn
            .query_row(
                "SELECT snapshot_json, created_at FROM graph_snapshot WHERE snapshot_id = 1",
                [],
                |row| {
                    let payload: String = row.get(0)?;
                    let created_str: String = row.get(1)?;
                    let created_at = DateTime::parse_from_rfc3339(&created_str)
                        .map_err(|e| {
                            rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
                        })?
                        .with_timezone(&Utc);
                    Ok(GraphSnapshot { payload, created_at })
                },
            )
            .optional()
            .map_err(Into::into)
    }

    // ========== Statistics ==========

    fn count_rows(&self, table: &str) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<DbStats> {
        Ok(DbStats {
            categories: self.count_rows("categories")?,
            predicates: self.count_rows("predicates")?,
            nodes: self.count_rows("nodes")?,
            aliases: self.count_rows("node_aliases")?,
            edges: self.count_rows("edges")?,
            snapshots: self.count_rows("graph_snapshot")?,
        })
    }
}

fn category_id_in(conn: &Connection, name: &str) -> Result<i64> {
    let normalized = name.trim();
    if normalized.is_empty() {
        return Err(Error::invalid("category name is required"));
    }
    insert_then_lookup(
        conn,
        "INSERT INTO categories (category_name) VALUES (?1) ON CONFLICT(category_name) DO NOTHING",
        [normalized],
        "SELECT category_id FROM categories WHERE category_name = ?1",
        [normalized],
        &format!("category {:?}", normalized),
    )
}

fn predicate_id_in(conn: &Connection, name: &str) -> Result<i64> {
    let normalized = name.trim().to_uppercase();
    if normalized.is_empty() {
        return Err(Error::invalid("predicate name is required"));
    }
    insert_then_lookup(
        conn,
        "INSERT INTO predicates (predicate_name) VALUES (?1) ON CONFLICT(predicate_name) DO NOTHING",
        [&normalized],
        "SELECT predicate_id FROM predicates WHERE predicate_name = ?1",
        [&normalized],
        &format!("predicate {:?}", normalized),
    )
}

fn node_id_in(conn: &Connection, external_id: &str) -> Result<Option<i64>> {
    conn.query_row("SELECT node_id FROM nodes WHERE external_id = ?1", [external_id], |row| row.get(0))
        .optional()
        .map_err(Into::into)
}

/// Insert-or-noop followed by a lookup on the unique key. Concurrent callers
/// converge on the same row without the insert reporting its own outcome.
fn insert_then_lookup(
    conn: &Connection,
    insert: &str,
    insert_params: impl Params,
    lookup: &str,
    lookup_params: impl Params,
    what: &str,
) -> Result<i64> {
    conn.execute(insert, insert_params)
        .map_err(|e| Error::from_write(e, what))?;
    conn.query_row(lookup, lookup_params, |row| row.get(0))
        .optional()?
        .ok_or_else(|| Error::IntegrityViolation(format!("{} missing after insert", what)))
}

fn escape_like(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len());
    for ch in query.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

fn row_to_node(row: &rusqlite::Row) -> rusqlite::Result<StoredNode> {
    Ok(StoredNode {
        id: row.get(0)?,
        external_id: row.get(1)?,
        name: row.get(2)?,
        category: row.get(3)?,
        description: row.get(4)?,
        raw_json: row.get(5)?,
    })
}

fn row_to_edge(row: &rusqlite::Row) -> rusqlite::Result<StoredEdge> {
    Ok(StoredEdge {
        id: row.get(0)?,
        subject: row.get(1)?,
        predicate: row.get(2)?,
        object: row.get(3)?,
        description: row.get(4)?,
        evidence: row.get(5)?,
        edge_json: row.get(6)?,
    })
}

/// Database statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DbStats {
    pub categories: usize,
    pub predicates: usize,
    pub nodes: usize,
    pub aliases: usize,
    pub edges: usize,
    pub snapshots: usize,
}

impl DbStats {
    /// Label/value pairs in display order
    pub fn rows(&self) -> Vec<(&'static str, usize)> {
        vec![
            ("Categories", self.categories),
            ("Predicates", self.predicates),
            ("Nodes", self.nodes),
            ("Aliases", self.aliases),
            ("Edges", self.edges),
            ("Snapshots", self.snapshots),
        ]
    }
}

impl std::fmt::Display for DbStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Database Statistics:")?;
        for (label, value) in self.rows() {
            writeln!(f, "  {}: {}", label, value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cell() -> Value {
        json!({
            "id": "n1",
            "name": "Cell",
            "description": "Basic biological unit",
            "aliases": ["Biological cell", "cell"]
        })
    }

    fn nucleus() -> Value {
        json!({"id": "n2", "name": "Nucleus", "description": "Membrane bound organelle"})
    }

    fn alias_count(store: &GraphStore, node_id: i64) -> i64 {
        store
            .connection()
            .query_row("SELECT COUNT(*) FROM node_aliases WHERE node_id = ?1", [node_id], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn test_category_trims_but_keeps_case() {
        let store = GraphStore::open_in_memory().unwrap();

        let id = store.resolve_or_create_category(" Concept ").unwrap();
        assert!(id > 0);
        assert_eq!(store.resolve_or_create_category("Concept").unwrap(), id);
        assert_eq!(store.resolve_or_create_category("\tConcept\n").unwrap(), id);
        assert_eq!(store.category_name(id).unwrap().as_deref(), Some("Concept"));

        let upper = store.resolve_or_create_category("CONCEPT").unwrap();
        assert_ne!(upper, id);
    }

    #[test]
    fn test_predicate_upper_cased() {
        let store = GraphStore::open_in_memory().unwrap();

        let id = store.resolve_or_create_predicate("related_to").unwrap();
        assert_eq!(store.resolve_or_create_predicate(" RELATED_TO ").unwrap(), id);
        assert_eq!(store.resolve_or_create_predicate("Related_To").unwrap(), id);
        assert_eq!(store.predicate_name(id).unwrap().as_deref(), Some("RELATED_TO"));
    }

    #[test]
    fn test_blank_vocabulary_rejected() {
        let store = GraphStore::open_in_memory().unwrap();
        assert!(matches!(store.resolve_or_create_category("   "), Err(Error::InvalidArgument(_))));
        assert!(matches!(store.resolve_or_create_predicate(""), Err(Error::InvalidArgument(_))));
        assert_eq!(store.stats().unwrap(), DbStats::default());
    }

    #[test]
    fn test_node_scenario_with_aliases() {
        let store = GraphStore::open_in_memory().unwrap();

        let s_id = store.resolve_or_create_node(&cell(), "CONCEPT").unwrap();
        let o_id = store.resolve_or_create_node(&nucleus(), "CONCEPT").unwrap();
        assert!(s_id > 0 && o_id > 0);
        assert_ne!(s_id, o_id);
        assert_eq!(alias_count(&store, s_id), 2);
        assert_eq!(alias_count(&store, o_id), 0);

        let node = store.node_by_external_id("n1").unwrap().unwrap();
        assert_eq!(node.id, s_id);
        assert_eq!(node.name, "Cell");
        assert_eq!(node.category, "CONCEPT");
        assert_eq!(node.description.as_deref(), Some("Basic biological unit"));
        let payload: Value = serde_json::from_str(&node.raw_json).unwrap();
        assert_eq!(payload, cell());
    }

    #[test]
    fn test_node_first_write_wins() {
        let store = GraphStore::open_in_memory().unwrap();

        let first = store.resolve_or_create_node(&cell(), "Concept").unwrap();
        let second = store
            .resolve_or_create_node(&json!({"id": " n1 ", "name": "Renamed", "extra": 1}), "Structure")
            .unwrap();
        assert_eq!(first, second);

        let node = store.node_by_external_id("n1").unwrap().unwrap();
        assert_eq!(node.name, "Cell");
        assert_eq!(node.category, "Concept");
        assert_eq!(node.raw_json, to_canonical_json(&cell()).unwrap());
        assert_eq!(store.stats().unwrap().nodes, 1);
    }

    #[test]
    fn test_node_payload_is_canonical() {
        let store = GraphStore::open_in_memory().unwrap();
        store
            .resolve_or_create_node(&json!({"name": "Zelle", "id": "n9", "note": "Größe"}), "Concept")
            .unwrap();
        let node = store.node_by_external_id("n9").unwrap().unwrap();
        assert_eq!(node.raw_json, r#"{"id": "n9", "name": "Zelle", "note": "Gr\u00f6\u00dfe"}"#);
    }

    #[test]
    fn test_name_defaults_to_external_id() {
        let store = GraphStore::open_in_memory().unwrap();
        store.resolve_or_create_node(&json!({"id": "n3"}), "Concept").unwrap();
        store.resolve_or_create_node(&json!({"id": "n4", "name": "  "}), "Concept").unwrap();
        assert_eq!(store.node_by_external_id("n3").unwrap().unwrap().name, "n3");
        assert_eq!(store.node_by_external_id("n4").unwrap().unwrap().name, "n4");
    }

    #[test]
    fn test_node_requires_id_and_category() {
        let store = GraphStore::open_in_memory().unwrap();
        assert!(matches!(
            store.resolve_or_create_node(&json!({"id": "  ", "name": "x"}), "Concept"),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            store.resolve_or_create_node(&json!({"id": "n1"}), " "),
            Err(Error::InvalidArgument(_))
        ));
        assert_eq!(store.stats().unwrap().nodes, 0);
    }

    #[test]
    fn test_aliases_deduplicated_per_node() {
        let store = GraphStore::open_in_memory().unwrap();
        let id = store
            .resolve_or_create_node(&json!({"id": "n1", "aliases": ["cell", " cell ", "", "Cell"]}), "Concept")
            .unwrap();
        store
            .resolve_or_create_node(&json!({"id": "n1", "aliases": ["cell", "unit"]}), "Concept")
            .unwrap();
        assert_eq!(store.node_aliases(id).unwrap(), vec!["Cell", "cell", "unit"]);

        // Aliases are not globally unique
        let other = store
            .resolve_or_create_node(&json!({"id": "n2", "aliases": ["cell"]}), "Concept")
            .unwrap();
        assert_eq!(store.node_aliases(other).unwrap(), vec!["cell"]);
    }

    #[test]
    fn test_edge_scenario_idempotent() {
        let store = GraphStore::open_in_memory().unwrap();
        store.resolve_or_create_node(&cell(), "CONCEPT").unwrap();
        store.resolve_or_create_node(&nucleus(), "CONCEPT").unwrap();

        let rel = json!({"subject": "n1", "predicate": "part_of", "object": "n2", "source": "textbook"});
        let edge_id = store.resolve_or_create_edge(&rel).unwrap();
        assert!(edge_id > 0);
        assert_eq!(store.resolve_or_create_edge(&rel).unwrap(), edge_id);

        let count: i64 = store
            .connection()
            .query_row("SELECT COUNT(*) FROM edges", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);

        let edge_json: String = store
            .connection()
            .query_row("SELECT edge_json FROM edges WHERE edge_id = ?1", [edge_id], |row| row.get(0))
            .unwrap();
        let stored: Value = serde_json::from_str(&edge_json).unwrap();
        assert_eq!(stored["predicate"], "part_of");
    }

    #[test]
    fn test_edge_first_write_wins() {
        let store = GraphStore::open_in_memory().unwrap();
        store.resolve_or_create_node(&cell(), "Concept").unwrap();
        store.resolve_or_create_node(&nucleus(), "Concept").unwrap();

        let first = store
            .resolve_or_create_edge(&json!({"subject": "n1", "predicate": "part_of", "object": "n2", "evidence": "p. 4"}))
            .unwrap();
        let second = store
            .resolve_or_create_edge(&json!({"subject": "n1", "predicate": "PART_OF", "object": "n2", "evidence": "p. 9"}))
            .unwrap();
        assert_eq!(first, second);

        let subject = store.node_by_external_id("n1").unwrap().unwrap();
        let edges = store.node_edges(subject.id).unwrap();
        assert_eq!(edges.outbound.len(), 1);
        assert!(edges.inbound.is_empty());
        assert_eq!(edges.outbound[0].evidence.as_deref(), Some("p. 4"));
        assert_eq!(edges.outbound[0].predicate, "PART_OF");
        assert_eq!(edges.outbound[0].object, "n2");
    }

    #[test]
    fn test_edge_direction_matters() {
        let store = GraphStore::open_in_memory().unwrap();
        store.resolve_or_create_node(&cell(), "Concept").unwrap();
        store.resolve_or_create_node(&nucleus(), "Concept").unwrap();

        let forward = store
            .resolve_or_create_edge(&json!({"subject": "n1", "predicate": "related_to", "object": "n2"}))
            .unwrap();
        let backward = store
            .resolve_or_create_edge(&json!({"subject": "n2", "predicate": "related_to", "object": "n1"}))
            .unwrap();
        assert_ne!(forward, backward);
        assert_eq!(store.stats().unwrap().edges, 2);
    }

    #[test]
    fn test_edge_unknown_endpoint() {
        let store = GraphStore::open_in_memory().unwrap();
        store.resolve_or_create_node(&cell(), "Concept").unwrap();

        let err = store
            .resolve_or_create_edge(&json!({"subject": "n1", "predicate": "part_of", "object": "ghost"}))
            .unwrap_err();
        match err {
            Error::NotFound { entity, key } => {
                assert_eq!(entity, "object node");
                assert_eq!(key, "ghost");
            }
            other => panic!("unexpected error: {other}"),
        }

        let err = store
            .resolve_or_create_edge(&json!({"subject": "ghost", "predicate": "part_of", "object": "n1"}))
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { entity: "subject node", .. }));

        // Neither a node nor a predicate was created implicitly
        let stats = store.stats().unwrap();
        assert_eq!(stats.nodes, 1);
        assert_eq!(stats.predicates, 0);
        assert_eq!(stats.edges, 0);
    }

    #[test]
    fn test_edge_missing_fields() {
        let store = GraphStore::open_in_memory().unwrap();
        let err = store.resolve_or_create_edge(&json!({"subject": "n1", "object": "n2"}));
        assert!(matches!(err, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_edge_provenance_source_is_not_a_subject() {
        let store = GraphStore::open_in_memory().unwrap();
        store.resolve_or_create_node(&cell(), "Concept").unwrap();
        store.resolve_or_create_node(&nucleus(), "Concept").unwrap();

        let err = store
            .resolve_or_create_edge(&json!({"source": "textbook", "predicate": "part_of", "object": "n2"}))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)), "{err:?}");
        assert_eq!(store.stats().unwrap().edges, 0);
    }

    #[test]
    fn test_constraint_failure_is_integrity_violation() {
        let store = GraphStore::open_in_memory().unwrap();

        // Foreign keys are on, so a dangling category id is rejected
        let raw = store
            .connection()
            .execute(
                "INSERT INTO nodes (external_id, node_name, category_id, raw_json) VALUES ('n1', 'Cell', 999, '{}')",
                [],
            )
            .unwrap_err();
        let err = Error::from_write(raw, "node \"n1\"");
        match err {
            Error::IntegrityViolation(message) => assert!(message.starts_with("node \"n1\"")),
            other => panic!("unexpected error: {other:?}"),
        }

        let raw = store
            .connection()
            .execute("INSERT INTO no_such_table (x) VALUES (1)", [])
            .unwrap_err();
        assert!(matches!(Error::from_write(raw, "anything"), Error::Storage(_)));
    }

    #[test]
    fn test_insert_then_lookup_failures() {
        let store = GraphStore::open_in_memory().unwrap();

        // ON CONFLICT DO NOTHING does not swallow foreign-key failures
        let err = insert_then_lookup(
            store.connection(),
            "INSERT INTO nodes (external_id, node_name, category_id, raw_json) VALUES (?1, ?1, 999, '{}') \
             ON CONFLICT(external_id) DO NOTHING",
            ["n1"],
            "SELECT node_id FROM nodes WHERE external_id = ?1",
            ["n1"],
            "node \"n1\"",
        )
        .unwrap_err();
        assert!(matches!(err, Error::IntegrityViolation(_)), "{err:?}");

        let err = insert_then_lookup(
            store.connection(),
            "INSERT INTO categories (category_name) VALUES (?1) ON CONFLICT(category_name) DO NOTHING",
            ["Concept"],
            "SELECT category_id FROM categories WHERE category_name = ?1",
            ["Structure"],
            "category \"Structure\"",
        )
        .unwrap_err();
        match err {
            Error::IntegrityViolation(message) => assert!(message.contains("missing after insert")),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(store.stats().unwrap().nodes, 0);
    }

    #[test]
    fn test_snapshot_replaced_not_merged() {
        let store = GraphStore::open_in_memory().unwrap();
        assert!(store.latest_snapshot().unwrap().is_none());

        let full = json!({"nodes": [cell(), nucleus()], "edges": []});
        store.store_snapshot(&full).unwrap();
        let partial = json!({"nodes": [cell()], "edges": []});
        store.store_snapshot(&partial).unwrap();

        let snapshot = store.latest_snapshot().unwrap().unwrap();
        assert_eq!(snapshot.payload, to_canonical_json(&partial).unwrap());
        assert_eq!(snapshot.payload_value().unwrap(), partial);
        assert_eq!(store.stats().unwrap().snapshots, 1);
    }

    #[test]
    fn test_search_nodes() {
        let store = GraphStore::open_in_memory().unwrap();
        store.resolve_or_create_node(&cell(), "Concept").unwrap();
        store.resolve_or_create_node(&nucleus(), "Structure").unwrap();
        store
            .resolve_or_create_node(&json!({"id": "n5", "name": "100% pure_water"}), "Molecule")
            .unwrap();

        let by_name: Vec<String> = store
            .search_nodes("NUCLE", 10)
            .unwrap()
            .into_iter()
            .map(|n| n.external_id)
            .collect();
        assert_eq!(by_name, vec!["n2"]);

        let by_alias = store.search_nodes("biological CELL", 10).unwrap();
        assert_eq!(by_alias.len(), 1);
        assert_eq!(by_alias[0].external_id, "n1");

        // One row per node even when name and several aliases all match
        let hits = store.search_nodes("cell", 10).unwrap();
        assert_eq!(hits.len(), 1);

        let by_description = store.search_nodes("organelle", 10).unwrap();
        assert_eq!(by_description[0].external_id, "n2");

        assert_eq!(store.search_nodes("0%", 10).unwrap().len(), 1);
        assert_eq!(store.search_nodes("e_w", 10).unwrap().len(), 1);
        assert!(store.search_nodes("x_", 10).unwrap().is_empty());
        assert!(store.search_nodes("   ", 10).unwrap().is_empty());
        assert_eq!(store.search_nodes("e", 1).unwrap().len(), 1);
    }

    #[test]
    fn test_stats_display() {
        let store = GraphStore::open_in_memory().unwrap();
        store.resolve_or_create_node(&cell(), "Concept").unwrap();
        let text = store.stats().unwrap().to_string();
        assert!(text.contains("Nodes: 1"));
        assert!(text.contains("Aliases: 2"));
    }
}
