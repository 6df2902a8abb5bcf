//! Pod routes: `GET|POST|DELETE /api/{uid}?token=...`.
//!
//! Each handler resolves the caller's account from the token and the
//! template from the uid, then delegates to the orchestrator. Mutating
//! operations run on their own task so a dropped connection cannot stop
//! them halfway.

use std::future::Future;

use axum::extract::{Path, Query, State};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use gamebox_orchestrator::{OrchestratorError, Teardown};
use gamebox_state::*;

use crate::ApiState;
use crate::envelope::{ApiError, ApiResult, CODE_INTERNAL, Envelope};

#[derive(Debug, Default, Deserialize)]
pub struct TokenQuery {
    pub token: Option<String>,
}

/// Client-facing view of an allocation.
#[derive(Debug, Serialize)]
pub struct PodInfo {
    pub name: String,
    pub address: String,
    pub created_at: u64,
    pub expires_at: u64,
}

impl From<Allocation> for PodInfo {
    fn from(allocation: Allocation) -> Self {
        Self {
            name: allocation.name,
            address: allocation.address,
            created_at: allocation.created_at,
            expires_at: allocation.expires_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TeardownSummary {
    pub allocation_id: AllocationId,
    /// One `"<kind>: <error>"` entry per failed cluster deletion.
    pub cluster_failures: Vec<String>,
}

impl From<Teardown> for TeardownSummary {
    fn from(teardown: Teardown) -> Self {
        Self {
            allocation_id: teardown.allocation_id,
            cluster_failures: teardown
                .cluster_failures
                .iter()
                .map(|(kind, e)| format!("{kind}: {e}"))
                .collect(),
        }
    }
}

pub(crate) fn resolve_account(state: &ApiState, token: Option<&str>) -> Result<Account, ApiError> {
    let token = token.filter(|t| !t.is_empty()).ok_or_else(invalid_token)?;
    state
        .orchestrator
        .stores()
        .accounts
        .get_account_by_token(token)?
        .ok_or_else(invalid_token)
}

pub(crate) fn resolve_template(state: &ApiState, uid: &str) -> Result<Template, ApiError> {
    state
        .orchestrator
        .stores()
        .templates
        .get_template_by_uid(uid)?
        .ok_or_else(|| ApiError::not_found("environment not found"))
}

/// Run `op` to completion on a spawned task and wait for its result.
///
/// Axum drops the handler future when the client goes away; the spawned
/// task keeps running regardless, so cluster and record steps are never
/// cut off between awaits.
pub(crate) async fn detached<T, F>(op: F) -> Result<T, ApiError>
where
    F: Future<Output = Result<T, OrchestratorError>> + Send + 'static,
    T: Send + 'static,
{
    match tokio::spawn(op).await {
        Ok(result) => Ok(result?),
        Err(e) => {
            error!(error = %e, "orchestrator task did not complete");
            Err(ApiError::new(CODE_INTERNAL, "internal error"))
        }
    }
}

fn invalid_token() -> ApiError {
    ApiError::not_found("token is invalid")
}

/// GET /api/{uid}
pub async fn get_pod(
    State(state): State<ApiState>,
    Path(uid): Path<String>,
    Query(query): Query<TokenQuery>,
) -> ApiResult<PodInfo> {
    let account = resolve_account(&state, query.token.as_deref())?;
    let template = resolve_template(&state, &uid)?;
    let allocation = state.orchestrator.get(&account, &template)?;
    Ok(Envelope::ok(allocation.into()))
}

/// POST /api/{uid}
pub async fn create_pod(
    State(state): State<ApiState>,
    Path(uid): Path<String>,
    Query(query): Query<TokenQuery>,
) -> ApiResult<PodInfo> {
    let account = resolve_account(&state, query.token.as_deref())?;
    let template = resolve_template(&state, &uid)?;
    debug!(account_id = account.id, %uid, "pod create requested");
    let orchestrator = state.orchestrator.clone();
    let allocation =
        detached(async move { orchestrator.create(&account, &template).await }).await?;
    Ok(Envelope::ok(allocation.into()))
}

/// DELETE /api/{uid}
pub async fn delete_pod(
    State(state): State<ApiState>,
    Path(uid): Path<String>,
    Query(query): Query<TokenQuery>,
) -> ApiResult<TeardownSummary> {
    let account = resolve_account(&state, query.token.as_deref())?;
    let template = resolve_template(&state, &uid)?;
    debug!(account_id = account.id, %uid, "pod delete requested");
    let orchestrator = state.orchestrator.clone();
    let teardown =
        detached(async move { orchestrator.delete(&account, &template).await }).await?;
    Ok(Envelope::ok(teardown.into()))
}

/// GET /healthz
pub async fn healthz() -> ApiResult<&'static str> {
    Ok(Envelope::ok("ok"))
}
