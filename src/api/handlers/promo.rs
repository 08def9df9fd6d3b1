//! Promo validate and redeem handlers

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::api::error::{with_error_code, ApiError, ErrorCode};
use crate::api::types::{RedeemRequest, RedeemResponse, ValidateRequest, ValidateResponse};
use crate::infra::PromoError;
use crate::server::AppState;

/// POST /api/v1/promo/validate
///
/// Rejections are a normal answer here (`200`, `valid:false`); only
/// malformed input and datastore failures produce an error status.
pub async fn validate_promo(
    State(state): State<AppState>,
    payload: Result<Json<ValidateRequest>, JsonRejection>,
) -> Result<Json<ValidateResponse>, ApiError> {
    let Json(request) = payload?;

    match state
        .service
        .validate(
            &request.code,
            request.user_type,
            &request.country,
            request.user_id,
        )
        .await
    {
        Ok(eligibility) => Ok(Json(ValidateResponse::eligible(eligibility))),
        Err(PromoError::Rejected(rejection)) => Ok(Json(ValidateResponse::rejected(&rejection))),
        Err(err) => Err(err.into()),
    }
}

/// POST /api/v1/promo/redeem
pub async fn redeem_promo(
    State(state): State<AppState>,
    payload: Result<Json<RedeemRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload?;

    match state.service.redeem(&request.code, request.user_id).await {
        Ok(receipt) => Ok(Json(RedeemResponse::redeemed(receipt)).into_response()),
        Err(PromoError::Rejected(rejection)) => {
            let code = ErrorCode::for_rejection(&rejection);
            let body = Json(RedeemResponse::rejected(&rejection));
            Ok(with_error_code(
                (code.http_status(), body).into_response(),
                code,
            ))
        }
        Err(err) => Err(err.into()),
    }
}
