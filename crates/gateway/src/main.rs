//! ThesisForge API Gateway
//!
//! The main entry point for all external API requests.
//! Handles:
//! - Authentication and just-in-time user provisioning
//! - Rate limiting
//! - Request routing to the collaboration services
//! - Observability (logging, metrics)

mod extract;
mod handlers;
mod middleware;
mod state;

use anyhow::Context;
use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, post, put},
    Router,
};
use chrono::Utc;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thesisforge_common::{
    config::{AppConfig, ObservabilityConfig, StoreBackend},
    db::{DbPool, DocumentStore, MemoryStore, Repository},
    errors::AppError,
    events::BroadcastEvents,
    metrics,
    presence::PresenceTracker,
};
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::middleware::rate_limit::{rate_limit_middleware, RateLimit};
pub use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load().context("failed to load configuration")?;

    init_tracing(&config.observability);
    info!("Starting ThesisForge API Gateway v{}", thesisforge_common::VERSION);

    // Initialize metrics
    if config.observability.metrics_port != 0 {
        let addr = SocketAddr::from(([0, 0, 0, 0], config.observability.metrics_port));
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .set_buckets(metrics::LATENCY_BUCKETS)?
            .install()?;
        info!("Metrics exporter listening on {}", addr);
    }
    metrics::register_metrics();

    let jwt_secret = config
        .auth
        .jwt_secret
        .clone()
        .ok_or_else(|| AppError::Configuration {
            message: "auth.jwt_secret must be set".to_string(),
        })?;

    let store = open_store(&config).await?;
    let config = Arc::new(config);
    let state = AppState::new(config.clone(), store, &jwt_secret);

    spawn_event_logger(&state.events);
    spawn_presence_sweeper(
        state.presence.clone(),
        Duration::from_secs(config.presence.sweep_interval_secs.max(1)),
    );

    // Build the router
    let app = create_router(state);

    // Start the server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(observability: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&observability.log_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if observability.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn open_store(config: &AppConfig) -> Result<Arc<dyn DocumentStore>, AppError> {
    match config.database.backend {
        StoreBackend::Postgres => {
            info!("Connecting to database...");
            let pool = DbPool::new(&config.database).await?;
            if config.database.run_migrations {
                pool.migrate().await?;
            }
            Ok(Arc::new(Repository::new(pool)))
        }
        StoreBackend::Memory => {
            warn!("Using the in-memory store; data is lost on shutdown");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

/// Logs every collaboration event; stands in for a notification service
fn spawn_event_logger(events: &BroadcastEvents) {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => info!(
                    target: "events",
                    kind = event.kind(),
                    document_id = %event.document_id(),
                    payload = %serde_json::to_string(&event).unwrap_or_default(),
                    "Collaboration event"
                ),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event logger lagged behind")
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}

fn spawn_presence_sweeper(presence: PresenceTracker, every: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            let purged = presence.purge_idle(Utc::now());
            if purged > 0 {
                debug!(purged, "Purged idle presence entries");
            }
            metrics::record_presence(presence.total_active());
        }
    });
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    use handlers::{admin, collaborators, documents, health, presence};

    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    // API routes
    let mut api_routes = Router::new()
        // Health endpoints (no auth)
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))

        // Document endpoints
        .route("/documents", post(documents::create_document))
        .route(
            "/documents/{id}",
            get(documents::get_document).delete(documents::delete_document),
        )
        .route("/documents/{id}/status", post(documents::change_status))

        // Collaborator endpoints
        .route(
            "/documents/{id}/collaborators",
            get(collaborators::list_collaborators).post(collaborators::add_collaborator),
        )
        .route(
            "/documents/{id}/collaborators/{cid}",
            delete(collaborators::remove_collaborator),
        )
        .route(
            "/documents/{id}/collaborators/{cid}/permission",
            put(collaborators::update_permission),
        )
        .route(
            "/documents/{id}/collaborators/{cid}/role",
            put(collaborators::update_role),
        )
        .route(
            "/documents/{id}/collaborators/{cid}/promote",
            post(collaborators::promote),
        )

        // Presence endpoints
        .route(
            "/documents/{id}/presence",
            get(presence::list_present)
                .post(presence::heartbeat)
                .delete(presence::leave),
        )

        // Operator endpoints
        .route(
            "/admin/migrations/collaborators",
            post(admin::migrate_collaborators),
        )
        .route_layer(from_fn(middleware::metrics::track_metrics));

    let limits = &state.config.rate_limit;
    if limits.enabled {
        api_routes = api_routes.layer(from_fn_with_state(
            RateLimit::new(limits.requests_per_second, limits.burst),
            rate_limit_middleware,
        ));
    }

    // Compose the app
    Router::new()
        .nest("/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(request_id)
        .layer(propagate_id)
        .with_state(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::{header, Method, Request, StatusCode},
    };
    use serde_json::{json, Value};
    use thesisforge_common::domain::{User, UserRole};
    use tower::ServiceExt;

    struct TestApp {
        state: AppState,
        router: Router,
    }

    fn test_app() -> TestApp {
        let mut config = AppConfig::default();
        config.database.backend = StoreBackend::Memory;
        config.rate_limit.enabled = false;
        let state = AppState::new(Arc::new(config), Arc::new(MemoryStore::new()), "test-secret");
        TestApp {
            router: create_router(state.clone()),
            state,
        }
    }

    impl TestApp {
        fn token(&self, user: &User) -> String {
            self.state.jwt.generate_token(user).unwrap()
        }

        async fn call(
            &self,
            method: Method,
            uri: &str,
            user: Option<&User>,
            body: Option<Value>,
        ) -> (StatusCode, Value) {
            let mut request = Request::builder().method(method).uri(uri);
            if let Some(user) = user {
                request = request.header(header::AUTHORIZATION, format!("Bearer {}", self.token(user)));
            }
            let request = match body {
                Some(body) => request
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
                None => request.body(Body::empty()).unwrap(),
            };

            let response = self.router.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
            (status, value)
        }
    }

    #[tokio::test]
    async fn test_health() {
        let app = test_app();
        let (status, body) = app.call(Method::GET, "/v1/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");

        let (status, body) = app.call(Method::GET, "/v1/ready", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["checks"]["database"]["status"], "up");
    }

    #[tokio::test]
    async fn test_missing_token_is_unauthorized() {
        let app = test_app();
        let uri = format!("/v1/documents/{}", uuid::Uuid::new_v4());
        let (status, body) = app.call(Method::GET, &uri, None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn test_document_workflow_over_http() {
        let app = test_app();
        let student = User::new("ada@uni.edu", "Ada", &[UserRole::Student]);
        let advisor = User::new("prof@uni.edu", "Prof", &[UserRole::Advisor]);
        app.state.store.upsert_user(&advisor).await.unwrap();

        let (status, body) = app
            .call(
                Method::POST,
                "/v1/documents",
                Some(&student),
                Some(json!({ "title": "On Types", "advisor_email": "prof@uni.edu" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["status"], "DRAFT");
        assert_eq!(body["allowed_transitions"], json!(["SUBMITTED"]));
        let id = body["id"].as_str().unwrap().to_string();

        // the student was provisioned from the token
        assert!(app.state.store.find_user(student.id).await.unwrap().is_some());

        let (status, body) = app
            .call(
                Method::POST,
                &format!("/v1/documents/{id}/status"),
                Some(&student),
                Some(json!({ "status": "FINALIZED" })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "INVALID_TRANSITION");

        let (status, _) = app
            .call(
                Method::POST,
                &format!("/v1/documents/{id}/status"),
                Some(&student),
                Some(json!({ "status": "SUBMITTED" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = app
            .call(
                Method::POST,
                &format!("/v1/documents/{id}/status"),
                Some(&advisor),
                Some(json!({ "status": "REVISION", "reason": "Cite the prior art" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "REVISION");
        assert_eq!(body["rejection_reason"], "Cite the prior art");
    }

    #[tokio::test]
    async fn test_collaborator_endpoints() {
        let app = test_app();
        let student = User::new("ada@uni.edu", "Ada", &[UserRole::Student]);
        let reviewer = User::new("rev@uni.edu", "Rev", &[UserRole::Advisor]);
        app.state.store.upsert_user(&reviewer).await.unwrap();

        let (_, body) = app
            .call(
                Method::POST,
                "/v1/documents",
                Some(&student),
                Some(json!({ "title": "On Types" })),
            )
            .await;
        let id = body["id"].as_str().unwrap().to_string();

        let (status, body) = app
            .call(
                Method::POST,
                &format!("/v1/documents/{id}/collaborators"),
                Some(&student),
                Some(json!({
                    "email": "rev@uni.edu",
                    "role": "REVIEWER",
                    "permission": "FULL_ACCESS"
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let cid = body["id"].as_str().unwrap().to_string();

        // full access lets the reviewer manage but never edit
        let (status, body) = app
            .call(Method::GET, &format!("/v1/documents/{id}"), Some(&reviewer), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["capabilities"]["can_edit"], false);
        assert_eq!(body["capabilities"]["can_manage_collaborators"], true);

        let (status, body) = app
            .call(
                Method::POST,
                &format!("/v1/documents/{id}/collaborators/{cid}/promote"),
                Some(&student),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "BUSINESS_RULE_VIOLATION");

        let (status, _) = app
            .call(
                Method::DELETE,
                &format!("/v1/documents/{id}/collaborators/{cid}?reason=rotation"),
                Some(&student),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = app
            .call(Method::GET, &format!("/v1/documents/{id}"), Some(&reviewer), None)
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"]["code"], "PERMISSION_DENIED");

        let (status, body) = app
            .call(
                Method::GET,
                &format!("/v1/documents/{id}/collaborators?include_removed=true"),
                Some(&student),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["collaborators"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_presence_and_admin_migration() {
        let app = test_app();
        let student = User::new("ada@uni.edu", "Ada", &[UserRole::Student]);
        let admin = User::new("root@uni.edu", "Root", &[UserRole::Admin]);

        let (_, body) = app
            .call(
                Method::POST,
                "/v1/documents",
                Some(&student),
                Some(json!({ "title": "On Types" })),
            )
            .await;
        let id = body["id"].as_str().unwrap().to_string();

        let (status, body) = app
            .call(Method::POST, &format!("/v1/documents/{id}/presence"), Some(&student), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["users"].as_array().unwrap().len(), 1);

        let (status, _) = app
            .call(Method::DELETE, &format!("/v1/documents/{id}/presence"), Some(&student), None)
            .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, body) = app
            .call(Method::GET, &format!("/v1/documents/{id}/presence"), Some(&student), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["users"].as_array().unwrap().is_empty());

        let (status, _) = app
            .call(Method::POST, "/v1/admin/migrations/collaborators", Some(&student), None)
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = app
            .call(Method::POST, "/v1/admin/migrations/collaborators", Some(&admin), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["documents_scanned"], 0);
    }

    #[tokio::test]
    async fn test_unknown_names_use_error_envelope() {
        let app = test_app();
        let student = User::new("ada@uni.edu", "Ada", &[UserRole::Student]);

        let (_, body) = app
            .call(
                Method::POST,
                "/v1/documents",
                Some(&student),
                Some(json!({ "title": "On Types" })),
            )
            .await;
        let id = body["id"].as_str().unwrap().to_string();

        let (status, body) = app
            .call(
                Method::POST,
                &format!("/v1/documents/{id}/status"),
                Some(&student),
                Some(json!({ "status": "ARCHIVED" })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "INVALID_TRANSITION");

        let (status, body) = app
            .call(
                Method::POST,
                &format!("/v1/documents/{id}/collaborators"),
                Some(&student),
                Some(json!({
                    "email": "rev@uni.edu",
                    "role": "OWNER",
                    "permission": "FULL_ACCESS"
                })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

        let (status, body) = app
            .call(
                Method::POST,
                "/v1/documents",
                Some(&student),
                Some(json!({ "name": "missing title" })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

        // the document is untouched
        let (_, body) = app
            .call(Method::GET, &format!("/v1/documents/{id}"), Some(&student), None)
            .await;
        assert_eq!(body["status"], "DRAFT");
    }
}
