use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use shiftwise_core::domain::recommendation::Recommendation;
use shiftwise_core::domain::workflow::ApprovalWorkflowEntry;
use shiftwise_core::engine::{
    Decision, EngineConfig, EngineError, RecommendationStats, ShiftEngine,
};
use shiftwise_core::storage::postgres::PgStore;
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = shiftwise_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();
    let pool: Option<PgPool> = match settings.require_database_url() {
        Ok(db_url) => match sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await
        {
            Ok(pool) => match shiftwise_core::storage::migrate(&pool).await {
                Ok(()) => Some(pool),
                Err(e) => {
                    sentry_anyhow::capture_anyhow(&e);
                    tracing::error!(error = %e, "db migrations failed; starting API in degraded mode");
                    None
                }
            },
            Err(e) => {
                let err = anyhow::Error::new(e);
                sentry_anyhow::capture_anyhow(&err);
                tracing::error!(error = %err, "db connect failed; starting API in degraded mode");
                None
            }
        },
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %e, "DATABASE_URL missing; starting API in degraded mode");
            None
        }
    };

    let rewards = shiftwise_core::rewards::from_settings(&settings)?;
    let engine = pool.map(|pool| {
        let store = Arc::new(PgStore::new(pool));
        Arc::new(ShiftEngine::new(
            store.clone(),
            store.clone(),
            store,
            rewards,
            EngineConfig::from_env(),
        ))
    });

    let state = AppState { engine };

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route(
            "/users/:user_id/recommendations/generate",
            post(generate_for_user),
        )
        .route("/users/:user_id/recommendations", get(list_user_recommendations))
        .route(
            "/companies/:company_id/recommendations",
            get(list_company_recommendations),
        )
        .route(
            "/companies/:company_id/recommendations/stats",
            get(company_stats),
        )
        .route("/recommendations/:id/decision", post(decide))
        .route("/recommendations/:id/implemented", post(mark_implemented))
        .route("/recommendations/:id/workflow", get(workflow_history))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Debug, Clone)]
struct AppState {
    engine: Option<Arc<ShiftEngine>>,
}

impl AppState {
    fn engine(&self) -> Result<&ShiftEngine, StatusCode> {
        self.engine.as_deref().ok_or(StatusCode::SERVICE_UNAVAILABLE)
    }
}

fn status_for(err: EngineError) -> StatusCode {
    match err {
        EngineError::NotFound { .. } => StatusCode::NOT_FOUND,
        EngineError::NoPriceData => StatusCode::UNPROCESSABLE_ENTITY,
        EngineError::InvalidHourSlot(_) => StatusCode::UNPROCESSABLE_ENTITY,
        EngineError::InvalidTransition { .. } => StatusCode::CONFLICT,
        EngineError::Storage(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %e, "storage error");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

#[derive(Debug, Serialize)]
struct GenerateResponse {
    user_id: Uuid,
    created: Vec<Recommendation>,
}

async fn generate_for_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<GenerateResponse>, StatusCode> {
    let created = state
        .engine()?
        .run_for_user(user_id, chrono::Utc::now())
        .await
        .map_err(status_for)?;

    Ok(Json(GenerateResponse { user_id, created }))
}

#[derive(Debug, Deserialize)]
struct UserRecommendationsQuery {
    #[serde(default)]
    today: bool,
}

async fn list_user_recommendations(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Query(query): Query<UserRecommendationsQuery>,
) -> Result<Json<Vec<Recommendation>>, StatusCode> {
    let today = query.today.then(chrono::Utc::now);
    let rows = state
        .engine()?
        .user_recommendations(user_id, today)
        .await
        .map_err(status_for)?;
    Ok(Json(rows))
}

async fn list_company_recommendations(
    State(state): State<AppState>,
    Path(company_id): Path<Uuid>,
) -> Result<Json<Vec<Recommendation>>, StatusCode> {
    let rows = state
        .engine()?
        .company_recommendations(company_id)
        .await
        .map_err(status_for)?;
    Ok(Json(rows))
}

async fn company_stats(
    State(state): State<AppState>,
    Path(company_id): Path<Uuid>,
) -> Result<Json<RecommendationStats>, StatusCode> {
    let stats = state
        .engine()?
        .stats(company_id)
        .await
        .map_err(status_for)?;
    Ok(Json(stats))
}

async fn decide(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(decision): Json<Decision>,
) -> Result<Json<Recommendation>, StatusCode> {
    let rec = state
        .engine()?
        .decide(id, decision, chrono::Utc::now())
        .await
        .map_err(status_for)?;
    Ok(Json(rec))
}

#[derive(Debug, Deserialize)]
struct ImplementedBody {
    #[serde(default)]
    notes: Option<String>,
}

async fn mark_implemented(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Option<Json<ImplementedBody>>,
) -> Result<Json<Recommendation>, StatusCode> {
    let notes = body.and_then(|Json(b)| b.notes);
    let rec = state
        .engine()?
        .mark_implemented(id, notes, chrono::Utc::now())
        .await
        .map_err(status_for)?;
    Ok(Json(rec))
}

async fn workflow_history(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<ApprovalWorkflowEntry>>, StatusCode> {
    let rows = state
        .engine()?
        .workflow_history(id)
        .await
        .map_err(status_for)?;
    Ok(Json(rows))
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_sentry(settings: &shiftwise_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
