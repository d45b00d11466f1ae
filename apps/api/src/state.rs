use crate::config::Config;
use crate::policy::service::PolicyService;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Store and notifier are injected behind the service at startup.
    pub service: PolicyService,
    pub config: Config,
}
