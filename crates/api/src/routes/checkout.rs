//! Checkout route.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use tracing::instrument;

use marketplace_core::UserId;

use crate::error::{AppError, Result, add_breadcrumb};
use crate::middleware::RequireAuth;
use crate::services::checkout::{CheckoutOutcome, CheckoutRequest};
use crate::services::idempotency::{IDEMPOTENCY_KEY_HEADER, IDEMPOTENT_REPLAY_HEADER, IdempotencyKey};
use crate::services::signing::SIGNATURE_HEADER;
use crate::state::AppState;

/// Place an order from the caller's cart.
///
/// POST /checkout
///
/// Requires an `Idempotency-Key` header. The first successful request returns
/// `201`; any retry with the same key returns the identical body with `200`
/// and `X-Idempotent: true`. Both carry `X-Signature`.
#[instrument(skip(state, headers, body), fields(user_id = %user.id, replayed))]
pub async fn checkout(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response> {
    let key = IdempotencyKey::parse(
        headers
            .get(IDEMPOTENCY_KEY_HEADER)
            .and_then(|v| v.to_str().ok()),
    )?;
    let request = parse_body(&body)?;

    let outcome = state.checkout().checkout(user.id, key, request).await?;
    tracing::Span::current().record("replayed", outcome.replayed);
    if !outcome.replayed {
        add_breadcrumb("checkout", "Order placed", None);
    }

    Ok(render(user.id, outcome))
}

fn parse_body(body: &Bytes) -> Result<CheckoutRequest> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(CheckoutRequest::default());
    }
    serde_json::from_slice(body).map_err(|e| AppError::BadRequest(format!("Invalid request body: {e}")))
}

fn render(user_id: UserId, outcome: CheckoutOutcome) -> Response {
    let status = if outcome.replayed {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    let mut response = (
        status,
        [(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))],
        outcome.response.body,
    )
        .into_response();

    let headers = response.headers_mut();
    match HeaderValue::from_str(&outcome.response.signature) {
        Ok(value) => {
            headers.insert(SIGNATURE_HEADER, value);
        }
        Err(e) => tracing::error!(%user_id, error = %e, "Unrepresentable signature header"),
    }
    if outcome.replayed {
        headers.insert(IDEMPOTENT_REPLAY_HEADER, HeaderValue::from_static("true"));
    }
    response
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::services::idempotency::CachedResponse;

    fn outcome(replayed: bool) -> CheckoutOutcome {
        CheckoutOutcome {
            response: CachedResponse {
                body: r#"{"orderId":1}"#.to_string(),
                signature: "ab12".to_string(),
                created_at: Utc::now(),
            },
            replayed,
        }
    }

    #[test]
    fn test_first_response_is_created_and_signed() {
        let response = render(UserId::new(1), outcome(false));
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()[SIGNATURE_HEADER], "ab12");
        assert!(response.headers().get(IDEMPOTENT_REPLAY_HEADER).is_none());
    }

    #[test]
    fn test_replay_is_ok_and_marked() {
        let response = render(UserId::new(1), outcome(true));
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[IDEMPOTENT_REPLAY_HEADER], "true");
    }

    #[test]
    fn test_blank_body_is_empty_request() {
        let request = parse_body(&Bytes::from_static(b"  ")).unwrap();
        assert!(request.shipping_address.is_none());

        let request =
            parse_body(&Bytes::from_static(br#"{"shippingAddress":{"line1":"1 Main St"}}"#))
                .unwrap();
        assert_eq!(request.shipping_address.unwrap().line1, "1 Main St");

        assert!(parse_body(&Bytes::from_static(b"{not json")).is_err());
    }
}
