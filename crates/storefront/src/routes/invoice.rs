//! Invoice email endpoint.

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use serde::Deserialize;
use tracing::instrument;

use ballerz_core::OrderId;

use crate::db::OrderRepository;
use crate::error::{AppError, Result, add_breadcrumb};
use crate::middleware::OptionalAuth;
use crate::models::CurrentUser;
use crate::services::email::EmailError;
use crate::services::invoice::{InvoiceData, render_invoice};
use crate::state::AppState;

/// Body of `POST /api/send-invoice`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceRequest {
    #[serde(default)]
    pub order: Option<InvoiceData>,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub send_to: Option<String>,
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
}

/// Load a stored order for a signed-in owner or an admin.
async fn stored_invoice(
    state: &AppState,
    user: Option<&CurrentUser>,
    order_id: Option<&str>,
) -> Result<Option<(InvoiceData, String)>> {
    let (Some(user), Some(id)) = (user, order_id.and_then(|id| id.parse::<OrderId>().ok()))
    else {
        return Ok(None);
    };

    let Some(order) = OrderRepository::new(state.pool()).get(id).await? else {
        return Ok(None);
    };

    if !user.is_admin() && order.user_email != user.email {
        return Err(AppError::Forbidden("not your order".to_owned()));
    }

    let recipient = order.invoice_recipient().to_owned();
    Ok(Some((InvoiceData::from(&order), recipient)))
}

/// Email an order invoice as a PDF attachment.
///
/// The order comes from the request body. A signed-in user may instead
/// send only `orderId` to use a stored order they own (any order, for
/// admins). The recipient is `sendTo`, falling back to the order's
/// customer email.
#[instrument(skip(state, user, body))]
pub async fn send_invoice(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
    body: std::result::Result<Json<InvoiceRequest>, JsonRejection>,
) -> Result<Json<serde_json::Value>> {
    let Json(request) = body.map_err(|rejection| {
        tracing::debug!(error = %rejection, "Unreadable invoice request");
        AppError::BadRequest("Invalid request body".to_owned())
    })?;

    let order_id = non_blank(request.order_id.as_deref());
    let send_to = non_blank(request.send_to.as_deref());

    let (mut data, fallback_recipient) = match request.order {
        Some(order) => {
            let recipient = non_blank(order.customer.as_ref().and_then(|c| c.email.as_deref()));
            (order, recipient)
        }
        None => match stored_invoice(&state, user.as_ref(), order_id.as_deref()).await? {
            Some((order, recipient)) => (order, Some(recipient)),
            None => (InvoiceData::default(), None),
        },
    };

    let Some(recipient) = send_to.or(fallback_recipient) else {
        return Err(AppError::BadRequest("No recipient".to_owned()));
    };
    data.check_limits()?;

    let mailer = state.mailer().ok_or(EmailError::NotConfigured)?;

    if order_id.is_some() {
        data.id.clone_from(&order_id);
    }
    let pdf = render_invoice(&data)?;
    let reference = data.reference().to_owned();

    add_breadcrumb("invoice", "Invoice requested", Some(&[("order_id", reference.as_str())]));
    mailer.send_invoice(&recipient, &reference, pdf).await?;

    Ok(Json(serde_json::json!({ "ok": true })))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::{
        Router,
        body::Body,
        http::{Request, StatusCode, header},
        routing::post,
    };
    use tower::ServiceExt;

    use super::*;
    use crate::routes::test_support::{body_json, memory_session_layer, test_state};

    fn router() -> Router {
        Router::new()
            .route("/api/send-invoice", post(send_invoice))
            .layer(memory_session_layer())
            .with_state(test_state())
    }

    fn request(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/send-invoice")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_owned()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_no_recipient() {
        let response = router()
            .oneshot(request(r#"{"order": {"items": []}, "orderId": "A1"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await,
            serde_json::json!({ "error": "No recipient" })
        );
    }

    #[tokio::test]
    async fn test_recipient_checked_before_configuration() {
        let response = router().oneshot(request("{}")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_customer_email_is_recipient_when_unconfigured() {
        let response = router()
            .oneshot(request(
                r#"{"order": {"customer": {"email": "fan@example.com"}, "items": []}, "orderId": "A1"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_json(response).await,
            serde_json::json!({ "error": "Email not configured" })
        );
    }

    #[tokio::test]
    async fn test_send_to_without_order_when_unconfigured() {
        let response = router()
            .oneshot(request(r#"{"orderId": "A1", "sendTo": "fan@example.com"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_firestore_timestamp_is_accepted() {
        let response = router()
            .oneshot(request(
                r#"{"order": {"createdAt": {"seconds": 1760608800, "nanoseconds": 0}, "status": "Shipped",
                    "customer": {"email": "fan@example.com"}, "items": []}, "orderId": "A1"}"#,
            ))
            .await
            .unwrap();

        // Parsed and past validation: only the missing mail transport stops it.
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_json(response).await,
            serde_json::json!({ "error": "Email not configured" })
        );
    }

    #[tokio::test]
    async fn test_out_of_range_amounts_rejected() {
        let response = router()
            .oneshot(request(
                r#"{"order": {"customer": {"email": "fan@example.com"}, "items": [
                    {"ID": "1", "Quantity": 3, "product": {"Description": "X", "Price": "79228162514264337593543950335"}}
                ]}, "orderId": "A1"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await,
            serde_json::json!({ "error": "Order line out of range" })
        );
    }

    #[test]
    fn test_non_blank() {
        assert_eq!(non_blank(Some("  ")), None);
        assert_eq!(non_blank(Some(" a@b.in ")).as_deref(), Some("a@b.in"));
        assert_eq!(non_blank(None), None);
    }
}
