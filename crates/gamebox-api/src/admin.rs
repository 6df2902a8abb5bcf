//! Admin routes under `/admin`, guarded by a bearer token.
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/admin/accounts` | List live accounts |
//! | POST | `/admin/accounts` | Create an account |
//! | POST | `/admin/accounts/batch` | Create several accounts atomically |
//! | DELETE | `/admin/accounts/{id}` | Soft-delete an account |
//! | GET | `/admin/templates` | List live templates |
//! | POST | `/admin/templates` | Create a template |
//! | PUT | `/admin/templates/{id}` | Replace a template's definition |
//! | DELETE | `/admin/templates/{id}` | Soft-delete a template |
//! | GET | `/admin/allocations` | List live allocations with owners |
//! | DELETE | `/admin/allocations/{id}` | Force teardown of an allocation |

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use gamebox_orchestrator::{AllocationView, hydrate};
use gamebox_state::*;

use crate::ApiState;
use crate::envelope::{ApiError, ApiResult, Envelope};
use crate::handlers::{TeardownSummary, detached};

/// Rejects requests whose bearer token does not match the configured admin
/// token. With no admin token configured, every admin request is rejected.
pub async fn require_admin(State(state): State<ApiState>, req: Request, next: Next) -> Response {
    let presented = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    let authorized = match (state.admin_token.as_deref(), presented) {
        (Some(expected), Some(presented)) => tokens_match(expected, presented),
        _ => false,
    };

    if authorized {
        next.run(req).await
    } else {
        warn!(path = %req.uri().path(), "admin request rejected");
        ApiError::unauthorized().into_response()
    }
}

/// Compare tokens in time independent of where they first differ. Both sides
/// are hashed to equal-length digests, so the length of the expected token
/// does not leak either.
fn tokens_match(expected: &str, presented: &str) -> bool {
    let expected = Sha256::digest(expected.as_bytes());
    let presented = Sha256::digest(presented.as_bytes());
    expected
        .iter()
        .zip(presented.iter())
        .fold(0u8, |diff, (a, b)| diff | (a ^ b))
        == 0
}

fn parse_id(raw: &str) -> Result<u64, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::bad_request(format!("invalid id: {raw}")))
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(v)| v)
        .map_err(|e| ApiError::bad_request(e.body_text()))
}

// ── Accounts ───────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateAccount {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct BatchCreateAccounts {
    pub tokens: Vec<String>,
}

/// GET /admin/accounts
pub async fn list_accounts(State(state): State<ApiState>) -> ApiResult<Vec<Account>> {
    Ok(Envelope::ok(state.orchestrator.stores().accounts.list_accounts()?))
}

/// POST /admin/accounts
pub async fn create_account(
    State(state): State<ApiState>,
    payload: Result<Json<CreateAccount>, JsonRejection>,
) -> ApiResult<Account> {
    let req = body(payload)?;
    let account = state.orchestrator.stores().accounts.create_account(&req.token)?;
    info!(account_id = account.id, domain = %account.domain, "account created");
    Ok(Envelope::ok(account))
}

/// POST /admin/accounts/batch
pub async fn batch_create_accounts(
    State(state): State<ApiState>,
    payload: Result<Json<BatchCreateAccounts>, JsonRejection>,
) -> ApiResult<Vec<Account>> {
    let req = body(payload)?;
    let accounts = state
        .orchestrator
        .stores()
        .accounts
        .batch_create_accounts(&req.tokens)?;
    info!(count = accounts.len(), "accounts created");
    Ok(Envelope::ok(accounts))
}

/// DELETE /admin/accounts/{id}
pub async fn delete_account(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResult<AccountId> {
    let id = parse_id(&id)?;
    if !state.orchestrator.stores().accounts.delete_account(id)? {
        return Err(ApiError::not_found(format!("account {id} not found")));
    }
    info!(account_id = id, "account deleted");
    Ok(Envelope::ok(id))
}

// ── Templates ──────────────────────────────────────────────────

/// GET /admin/templates
pub async fn list_templates(State(state): State<ApiState>) -> ApiResult<Vec<Template>> {
    Ok(Envelope::ok(state.orchestrator.stores().templates.list_templates()?))
}

/// POST /admin/templates
pub async fn create_template(
    State(state): State<ApiState>,
    payload: Result<Json<TemplateDraft>, JsonRejection>,
) -> ApiResult<Template> {
    let draft = body(payload)?;
    let template = state.orchestrator.stores().templates.create_template(&draft)?;
    info!(template_id = template.id, uid = %template.uid, "template created");
    Ok(Envelope::ok(template))
}

/// PUT /admin/templates/{id}
pub async fn update_template(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    payload: Result<Json<TemplateDraft>, JsonRejection>,
) -> ApiResult<Template> {
    let id = parse_id(&id)?;
    let draft = body(payload)?;
    let template = state
        .orchestrator
        .stores()
        .templates
        .update_template(id, &draft)?;
    info!(template_id = id, "template updated");
    Ok(Envelope::ok(template))
}

/// DELETE /admin/templates/{id}
pub async fn delete_template(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResult<TemplateId> {
    let id = parse_id(&id)?;
    if !state.orchestrator.stores().templates.delete_template(id)? {
        return Err(ApiError::not_found(format!("template {id} not found")));
    }
    info!(template_id = id, "template deleted");
    Ok(Envelope::ok(id))
}

// ── Allocations ────────────────────────────────────────────────

/// GET /admin/allocations
pub async fn list_allocations(State(state): State<ApiState>) -> ApiResult<Vec<AllocationView>> {
    let stores = state.orchestrator.stores();
    let allocations = stores.allocations.list_allocations()?;
    let views = hydrate(allocations, stores.accounts.as_ref(), stores.templates.as_ref())?;
    Ok(Envelope::ok(views))
}

/// DELETE /admin/allocations/{id}
pub async fn delete_allocation(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResult<TeardownSummary> {
    let id = parse_id(&id)?;
    let orchestrator = state.orchestrator.clone();
    let teardown = detached(async move { orchestrator.delete_by_id(id).await }).await?;
    Ok(Envelope::ok(teardown.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_comparison() {
        assert!(tokens_match("admin-secret", "admin-secret"));
        assert!(!tokens_match("admin-secret", "admin-secreT"));
        assert!(!tokens_match("admin-secret", "admin"));
        assert!(!tokens_match("admin-secret", "admin-secret-and-more"));
        assert!(!tokens_match("admin-secret", ""));
    }
}
