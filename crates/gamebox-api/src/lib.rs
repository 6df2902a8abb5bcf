//! gamebox-api — REST API for Gamebox.
//!
//! Provides axum route handlers for the pod lifecycle and for
//! administration of accounts, templates, and allocations. Every response
//! uses the envelope in [`envelope`].
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/api/{uid}?token=` | Get the caller's pod for a template |
//! | POST | `/api/{uid}?token=` | Create the caller's pod |
//! | DELETE | `/api/{uid}?token=` | Delete the caller's pod |
//! | GET | `/healthz` | Liveness probe |
//! | * | `/admin/...` | Administration, see [`admin`] |

pub mod admin;
pub mod envelope;
pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::middleware;
use axum::routing::{delete, get, post, put};

use gamebox_orchestrator::Orchestrator;

pub use envelope::{ApiError, ApiResult, Envelope};

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<Orchestrator>,
    /// Bearer token for `/admin`; admin routes are closed when unset.
    pub admin_token: Option<String>,
}

impl ApiState {
    pub fn new(orchestrator: Arc<Orchestrator>, admin_token: Option<String>) -> Self {
        Self {
            orchestrator,
            admin_token: admin_token.filter(|t| !t.is_empty()),
        }
    }
}

/// Build the complete API router (pod routes, admin routes, health).
pub fn build_router(state: ApiState) -> Router {
    let pod_routes = Router::new().route(
        "/{uid}",
        get(handlers::get_pod)
            .post(handlers::create_pod)
            .delete(handlers::delete_pod),
    );

    let admin_routes = Router::new()
        .route(
            "/accounts",
            get(admin::list_accounts).post(admin::create_account),
        )
        .route("/accounts/batch", post(admin::batch_create_accounts))
        .route("/accounts/{id}", delete(admin::delete_account))
        .route(
            "/templates",
            get(admin::list_templates).post(admin::create_template),
        )
        .route(
            "/templates/{id}",
            put(admin::update_template).delete(admin::delete_template),
        )
        .route("/allocations", get(admin::list_allocations))
        .route("/allocations/{id}", delete(admin::delete_allocation))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            admin::require_admin,
        ));

    Router::new()
        .nest("/api", pod_routes)
        .nest("/admin", admin_routes)
        .route("/healthz", get(handlers::healthz))
        .with_state(state)
}
