//! Shared application state

use axum::extract::FromRef;
use std::sync::Arc;

use thesisforge_common::{
    audit::TracingAuditSink,
    auth::JwtManager,
    authz::Authorizer,
    config::AppConfig,
    db::DocumentStore,
    events::BroadcastEvents,
    lifecycle::LifecycleService,
    migration::MigrationService,
    presence::PresenceTracker,
    registry::CollaboratorService,
};

/// Capacity of the collaboration event channel
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn DocumentStore>,
    pub jwt: Arc<JwtManager>,
    pub authz: Authorizer,
    pub documents: LifecycleService,
    pub collaborators: CollaboratorService,
    pub migrations: Arc<MigrationService>,
    pub presence: PresenceTracker,
    pub events: BroadcastEvents,
}

impl AppState {
    pub fn new(config: Arc<AppConfig>, store: Arc<dyn DocumentStore>, jwt_secret: &str) -> Self {
        let jwt = Arc::new(JwtManager::new(jwt_secret, config.auth.jwt_expiration_secs));
        let authz = Authorizer::new(Arc::new(TracingAuditSink));
        let events = BroadcastEvents::new(EVENT_CHANNEL_CAPACITY);
        let sink = Arc::new(events.clone());

        Self {
            documents: LifecycleService::new(store.clone(), authz.clone(), sink.clone()),
            collaborators: CollaboratorService::new(
                store.clone(),
                authz.clone(),
                sink,
                config.collaboration,
            ),
            migrations: Arc::new(MigrationService::new(store.clone())),
            presence: PresenceTracker::new(config.presence_idle_timeout()),
            config,
            store,
            jwt,
            authz,
            events,
        }
    }
}

impl FromRef<AppState> for Arc<JwtManager> {
    fn from_ref(state: &AppState) -> Self {
        state.jwt.clone()
    }
}
