use crate::backends::{http_client, BackendClients};
use crate::config::Config;
use crate::error::{GatewayError, Result, ValidationError};
use crate::http::signals::{shutdown_signal, SignalHandler};
use crate::http::types::{
    BackendPresence, ErrorResponse, ErrorType, HealthResponse, StatsResponse,
};
use crate::retrieval::{QueryOrchestrator, QueryRequest, QueryResponse, QuerySettings, RerankEngine};
use crate::trust::{trust_gate, ClientAddress, TrustConfig};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{middleware, Extension, Json, Router};
use chrono::{DateTime, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;

/// Shared, read-only state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: QueryOrchestrator,
    pub trust: Arc<TrustConfig>,
    pub started_at: DateTime<Utc>,
    pub prometheus: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(orchestrator: QueryOrchestrator, trust: TrustConfig) -> Self {
        Self {
            orchestrator,
            trust: Arc::new(trust),
            started_at: Utc::now(),
            prometheus: None,
        }
    }

    pub fn with_prometheus(mut self, handle: PrometheusHandle) -> Self {
        self.prometheus = Some(handle);
        self
    }
}

/// Build the gateway router with the trust gate applied to every route
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .route("/query", post(query))
        .route("/admin/stats", get(stats))
        .route("/metrics", get(render_metrics))
        .layer(middleware::from_fn_with_state(state.trust.clone(), trust_gate))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { ok: true })
}

async fn query(
    State(state): State<AppState>,
    client: Option<Extension<ClientAddress>>,
    payload: std::result::Result<Json<QueryRequest>, JsonRejection>,
) -> std::result::Result<Json<QueryResponse>, (StatusCode, Json<ErrorResponse>)> {
    let Json(req) = payload.map_err(|rejection| {
        metrics::counter!("gateway_query_failure", "err" => "validation").increment(1);
        let mut err = ErrorResponse::new("invalid request body", ErrorType::Validation);
        err.fields = vec![ValidationError::new("body", rejection.body_text())];
        <(StatusCode, Json<ErrorResponse>)>::from(err)
    })?;

    if let Some(Extension(client)) = client {
        tracing::debug!(client = %client.effective, "Query received");
    }

    state
        .orchestrator
        .handle(req)
        .await
        .map(Json)
        .map_err(|e| ErrorResponse::from(e).into())
}

async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let reranker = state.orchestrator.reranker();
    let backends = state.orchestrator.backends();

    Json(StatsResponse {
        rerank_enabled: state.orchestrator.settings().rerank_by_default,
        rerank_model: reranker.model_id().to_string(),
        rerank_loaded: reranker.is_loaded(),
        rerank_state: reranker.phase().as_str(),
        backends: BackendPresence {
            vector: backends.vector.is_some(),
            lexical: backends.lexical.is_some(),
            graph: backends.graph.is_some(),
            embedder: backends.embedder.is_some(),
        },
        started_at: state.started_at,
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn render_metrics(State(state): State<AppState>) -> Response {
    match &state.prometheus {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Build every component from configuration and serve until a shutdown signal
pub async fn run(config: Config) -> Result<()> {
    let prometheus = crate::prometheus::install_recorder(config.query.max_k)
        .map_err(|e| GatewayError::Metrics(e.to_string()))?;

    let http = http_client(config.backends.timeout_ms)?;
    let backends = BackendClients::from_config(&config.backends, http);

    let reranker = RerankEngine::new(
        config.rerank.model.clone(),
        Duration::from_millis(config.rerank.timeout_ms),
    );
    if config.rerank.enable {
        reranker.preload();
    }

    let trust = TrustConfig::from_settings(&config.trust).map_err(|e| {
        GatewayError::InvalidConfigValue {
            path: "trust.trusted_proxy_cidrs".to_string(),
            message: e.to_string(),
        }
    })?;

    tracing::info!(
        vector = backends.vector.is_some(),
        lexical = backends.lexical.is_some(),
        graph = backends.graph.is_some(),
        embedder = backends.embedder.is_some(),
        rerank_enabled = config.rerank.enable,
        rerank_model = %config.rerank.model,
        trusted_networks = trust.trusted_proxy_networks.len(),
        "Gateway configured"
    );

    let orchestrator = QueryOrchestrator::new(backends, reranker, QuerySettings::from_config(&config));
    let state = AppState::new(orchestrator, trust).with_prometheus(prometheus);
    let app = router(state);

    let host = config.server.host.as_str();
    let listener = tokio::net::TcpListener::bind((host, config.server.port))
        .await
        .map_err(|e| GatewayError::Io {
            source: e,
            context: format!("Failed to bind {}:{}", host, config.server.port),
        })?;
    let signals = SignalHandler::new()?;

    let local_addr = listener.local_addr().map_err(|e| GatewayError::Io {
        source: e,
        context: "Failed to read listener address".to_string(),
    })?;
    tracing::info!("Starting HTTP server: {}", local_addr);
    tracing::info!("Ready");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    // Wait until all requests are finished to shut down
    .with_graceful_shutdown(shutdown_signal(signals))
    .await
    .map_err(|e| GatewayError::Server(e.to_string()))?;

    // Dropping the router drops the backend clients and their connection pool
    tracing::info!("Server stopped");
    Ok(())
}
