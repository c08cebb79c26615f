use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use crate::extraction::{Clock, DynExtractionTracker, ExtractionTracker};
use crate::storage::GraphStore;

pub mod routes;

/// Server state
pub struct AppState {
    pub store: Mutex<GraphStore>,
    pub tracker: Mutex<DynExtractionTracker>,
    /// The only graph id this server answers for
    pub graph_id: String,
}

impl AppState {
    pub fn new<C: Clock + 'static>(
        store: GraphStore,
        tracker: ExtractionTracker<C>,
        graph_id: impl Into<String>,
    ) -> Self {
        Self {
            store: Mutex::new(store),
            tracker: Mutex::new(tracker.boxed()),
            graph_id: graph_id.into(),
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/extract", post(routes::extract))
        .route("/graph/{graph_id}", get(routes::get_graph))
        .route("/node/{graph_id}/{node_id}", get(routes::get_node))
        .route("/search/{graph_id}", get(routes::search))
        .route("/stats", get(routes::get_stats))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn start_server(port: u16, state: AppState) -> anyhow::Result<()> {
    let graph_id = state.graph_id.clone();
    let app = router(Arc::new(state));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Starting server on {} (graph {})", addr, graph_id);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
