//! Promo code batches, claims and redemption.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use database::promo_code::{self, ClaimedCode, NewBatch};
use database::{ClaimStrategy, PromoCode, PromoCodeBatch};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::auth::AuthUser;
use crate::error::{ApiError, Result};
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    #[serde(flatten)]
    pub batch: PromoCodeBatch,
    pub unused_count: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CodesQuery {
    pub unused_only: bool,
}

/// Claim request. `codeType` is `random` (default), `sequential` or
/// `specific`, the last requiring `code`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClaimRequest {
    pub code_type: Option<String>,
    pub code: Option<String>,
    pub used_by: Option<String>,
}

impl ClaimRequest {
    fn strategy(&self) -> Result<ClaimStrategy> {
        match self.code_type.as_deref().unwrap_or("random") {
            "random" => Ok(ClaimStrategy::Random),
            "sequential" => Ok(ClaimStrategy::Sequential),
            "specific" => match self.code.as_deref().map(str::trim) {
                Some(code) if !code.is_empty() => Ok(ClaimStrategy::Specific(code.to_string())),
                _ => Err(ApiError::BadRequest(
                    "code is required when codeType is specific".to_string(),
                )),
            },
            other => Err(ApiError::BadRequest(format!("unknown codeType: {other}"))),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedeemRequest {
    pub code: String,
    #[serde(default)]
    pub used_by: Option<String>,
}

pub async fn list_batches(
    State(state): State<AppState>,
    caller: AuthUser,
) -> Result<Json<Vec<BatchSummary>>> {
    let batches = promo_code::list_batches(state.db.pool(), &caller.owner()).await?;
    let mut summaries = Vec::with_capacity(batches.len());
    for batch in batches {
        let unused_count = promo_code::count_unused(state.db.pool(), &batch.id).await?;
        summaries.push(BatchSummary { batch, unused_count });
    }
    Ok(Json(summaries))
}

pub async fn create_batch(
    State(state): State<AppState>,
    caller: AuthUser,
    Json(request): Json<NewBatch>,
) -> Result<(StatusCode, Json<BatchSummary>)> {
    let batch = promo_code::create_batch(state.db.pool(), &caller.owner(), &request).await?;
    let unused_count = promo_code::count_unused(state.db.pool(), &batch.id).await?;
    info!(batch_id = %batch.id, codes = unused_count, "Created promo code batch");
    Ok((StatusCode::CREATED, Json(BatchSummary { batch, unused_count })))
}

pub async fn list_codes(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<String>,
    Query(query): Query<CodesQuery>,
) -> Result<Json<Vec<PromoCode>>> {
    load_owned(&state, &caller, &id).await?;
    Ok(Json(promo_code::list_codes(state.db.pool(), &id, query.unused_only).await?))
}

/// Claim one code from a batch. Responds 409 once the batch is exhausted.
pub async fn claim(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<String>,
    Json(request): Json<ClaimRequest>,
) -> Result<Json<ClaimedCode>> {
    load_owned(&state, &caller, &id).await?;
    let strategy = request.strategy()?;
    let claimed =
        promo_code::claim_code(state.db.pool(), &id, &strategy, request.used_by.as_deref()).await?;
    Ok(Json(claimed))
}

/// Redeem a code by value, as entered at checkout.
pub async fn redeem(
    State(state): State<AppState>,
    _caller: AuthUser,
    Json(request): Json<RedeemRequest>,
) -> Result<Json<ClaimedCode>> {
    if request.code.trim().is_empty() {
        return Err(ApiError::BadRequest("code is required".to_string()));
    }
    let redeemed =
        promo_code::redeem_code(state.db.pool(), &request.code, request.used_by.as_deref()).await?;
    info!(code = %redeemed.code.code, batch_id = %redeemed.batch.id, "Redeemed promo code");
    Ok(Json(redeemed))
}

async fn load_owned(state: &AppState, caller: &AuthUser, id: &str) -> Result<PromoCodeBatch> {
    let batch = promo_code::get_batch(state.db.pool(), id).await?;
    caller.ensure_access("PromoCodeBatch", id, &batch.user_id, batch.organization_id.as_deref())?;
    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claim_strategy_defaults_to_random() {
        let request = ClaimRequest::default();
        assert_eq!(request.strategy().unwrap(), ClaimStrategy::Random);
    }

    #[test]
    fn specific_claim_needs_a_code() {
        let request = ClaimRequest {
            code_type: Some("specific".into()),
            code: Some("  ".into()),
            used_by: None,
        };
        assert!(matches!(request.strategy(), Err(ApiError::BadRequest(_))));

        let request = ClaimRequest {
            code_type: Some("specific".into()),
            code: Some("SAVE-ABCD1234".into()),
            used_by: None,
        };
        assert_eq!(
            request.strategy().unwrap(),
            ClaimStrategy::Specific("SAVE-ABCD1234".into())
        );
    }

    #[test]
    fn unknown_code_type_is_rejected() {
        let request = ClaimRequest {
            code_type: Some("lottery".into()),
            ..Default::default()
        };
        assert!(matches!(request.strategy(), Err(ApiError::BadRequest(_))));
    }
}
