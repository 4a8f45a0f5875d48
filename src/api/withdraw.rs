use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::Serialize;
use std::str::FromStr;
use std::sync::Arc;

use super::{AppState, GAINID_HEADER};
use crate::domain::{GainId, OutboundEvent, WithdrawPayload, WithdrawalRecord};
use crate::error::AppError;
use crate::notify::CollectingResponder;
use crate::orchestration::WithdrawalState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawResponse {
    pub attempt_id: Option<String>,
    pub state: WithdrawalState,
    pub events: Vec<OutboundEvent>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalsResponse {
    pub withdrawals: Vec<WithdrawalRecord>,
}

fn caller(headers: &HeaderMap) -> Option<GainId> {
    headers
        .get(GAINID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| GainId::from_str(s).ok())
}

/// Submit a gift card withdrawal.
///
/// Outcomes travel as events in the body; the status is 200 for every
/// handled request, including refusals. A body that is not a JSON object
/// counts as a missing payload.
pub async fn post_giftcard(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Json<WithdrawResponse> {
    let account = caller(&headers);
    let payload = serde_json::from_slice::<Option<WithdrawPayload>>(&body)
        .ok()
        .flatten();

    let responder = Arc::new(CollectingResponder::new());
    let report = state
        .orchestrator
        .handle(account, payload, responder.clone())
        .await;

    Json(WithdrawResponse {
        attempt_id: report.attempt_id.as_ref().map(|id| id.to_string()),
        state: report.state(),
        events: responder.take(),
    })
}

/// The caller's withdrawal records, newest first.
pub async fn get_withdrawals(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<WithdrawalsResponse>, AppError> {
    let account = caller(&headers)
        .ok_or_else(|| AppError::Unauthorized(format!("missing {} header", GAINID_HEADER)))?;
    let withdrawals = state.repo.withdrawals_for(&account).await?;
    Ok(Json(WithdrawalsResponse { withdrawals }))
}
