//! Terminal output for the CLI

use owo_colors::{OwoColorize, Style};
use std::sync::OnceLock;
use tabled::{settings::Style as TableStyle, Table, Tabled};
use crate::record::{StoredEdge, StoredNode};
use crate::storage::DbStats;

static THEME: OnceLock<Theme> = OnceLock::new();

#[derive(Debug, Clone)]
pub struct Theme {
    pub header: Style,
    pub success: Style,
    pub error: Style,
    pub warn: Style,
    pub dim: Style,
}

impl Theme {
    /// Colors only when stdout is a terminal
    pub fn detect() -> Self {
        if console::Term::stdout().is_term() {
            Self {
                header: Style::new().cyan().bold(),
                success: Style::new().green().bold(),
                error: Style::new().red().bold(),
                warn: Style::new().yellow().bold(),
                dim: Style::new().white().dimmed(),
            }
        } else {
            Self {
                header: Style::new(),
                success: Style::new(),
                error: Style::new(),
                warn: Style::new(),
                dim: Style::new(),
            }
        }
    }
}

pub fn theme() -> &'static Theme {
    THEME.get_or_init(Theme::detect)
}

pub fn section(title: &str) {
    println!();
    println!("━{}━", title.style(theme().header.clone()));
}

pub fn success(label: &str) {
    println!("✅ {}", label.style(theme().success.clone()));
}

pub fn warn(label: &str) {
    eprintln!("⚠️ {}", label.style(theme().warn.clone()));
}

pub fn error(label: &str) {
    eprintln!("❌ {}", label.style(theme().error.clone()));
}

pub fn info(label: &str, value: &str) {
    println!("ℹ️ {}: {}", label.style(theme().dim.clone()), value);
}

#[derive(Tabled)]
struct MetricRow {
    #[tabled(rename = "Metric")]
    metric: &'static str,
    #[tabled(rename = "Value")]
    value: usize,
}

pub fn stats_table(stats: &DbStats) -> String {
    let rows: Vec<MetricRow> = stats
        .rows()
        .into_iter()
        .map(|(metric, value)| MetricRow { metric, value })
        .collect();
    Table::new(rows).with(TableStyle::rounded()).to_string()
}

#[derive(Tabled)]
struct NodeRow {
    #[tabled(rename = "ID")]
    external_id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Category")]
    category: String,
}

pub fn nodes_table(nodes: &[StoredNode]) -> String {
    let rows: Vec<NodeRow> = nodes
        .iter()
        .map(|n| NodeRow {
            external_id: n.external_id.clone(),
            name: n.name.clone(),
            category: n.category.clone(),
        })
        .collect();
    Table::new(rows).with(TableStyle::rounded()).to_string()
}

#[derive(Tabled)]
struct EdgeRow {
    #[tabled(rename = "Subject")]
    subject: String,
    #[tabled(rename = "Predicate")]
    predicate: String,
    #[tabled(rename = "Object")]
    object: String,
}

pub fn edges_table(edges: &[StoredEdge]) -> String {
    let rows: Vec<EdgeRow> = edges
        .iter()
        .map(|e| EdgeRow {
            subject: e.subject.clone(),
            predicate: e.predicate.clone(),
            object: e.object.clone(),
        })
        .collect();
    Table::new(rows).with(TableStyle::rounded()).to_string()
}
