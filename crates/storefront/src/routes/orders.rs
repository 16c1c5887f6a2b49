//! Checkout and order management.
//!
//! Customers turn their stored cart into an order; administrators list
//! every order and move it through its statuses.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Deserialize;
use tracing::instrument;

use ballerz_core::{CatalogItem, CustomerDetails, NewOrder, Order, OrderError, OrderId, OrderStatus};

use crate::db::{CartRepository, OrderRepository, RepositoryError};
use crate::error::{AppError, Result, add_breadcrumb};
use crate::filters;
use crate::middleware::{RequireAdmin, RequireAuth};
use crate::models::CurrentUser;
use crate::state::AppState;

/// Body of `POST /checkout`.
#[derive(Debug, Default, Deserialize)]
pub struct CheckoutRequest {
    #[serde(default)]
    pub customer: Option<CustomerDetails>,
}

/// Body of `POST /api/orders/{id}/status`.
#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: String,
}

/// Order management page template.
#[derive(Template, WebTemplate)]
#[template(path = "order_management.html")]
pub struct OrderManagementTemplate {
    pub user: Option<CurrentUser>,
    pub orders: Vec<Order>,
    pub statuses: [OrderStatus; 5],
}

/// Inventory page template.
#[derive(Template, WebTemplate)]
#[template(path = "inventory.html")]
pub struct InventoryTemplate {
    pub user: Option<CurrentUser>,
    pub items: Vec<CatalogItem>,
}

/// Place an order from the signed-in user's cart.
///
/// The cart is priced against the current catalog and stored as an order
/// with status `placed`. The priced lines leave the cart in the same
/// transaction; if the cart changed after it was priced, the checkout is
/// refused with 409 and nothing is written.
#[instrument(skip(state, user, request), fields(user_id = %user.id))]
pub async fn checkout(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Json(request): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<Order>)> {
    let stored = CartRepository::new(state.pool()).list(&user.email).await?;
    let lines: Vec<_> = stored.iter().map(|line| line.item.clone()).collect();

    let ids: Vec<_> = lines.iter().map(|line| line.item_id.clone()).collect();
    let catalog = state.catalog().lookup(&ids).await?;

    let new_order = NewOrder::from_cart(user.email.clone(), &lines, &catalog, request.customer)?;
    let order = OrderRepository::new(state.pool())
        .place(&new_order, &stored)
        .await
        .map_err(|e| match e {
            RepositoryError::Conflict(_) => AppError::Order(OrderError::CartChanged),
            other => other.into(),
        })?;
    state.cart_events().publish(&user.email);

    add_breadcrumb("order", "Order placed", Some(&[("order_id", order.id.to_string().as_str())]));
    tracing::info!(order_id = %order.id, total = %order.total, "Order placed");

    Ok((StatusCode::CREATED, Json(order)))
}

/// The signed-in user's orders, newest first.
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn my_orders(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<Vec<Order>>> {
    let orders = OrderRepository::new(state.pool())
        .list_for_user(&user.email)
        .await?;
    Ok(Json(orders))
}

/// Display every order with a status picker.
#[instrument(skip(state, admin))]
pub async fn management_page(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
) -> Result<OrderManagementTemplate> {
    let orders = OrderRepository::new(state.pool()).list_all().await?;

    Ok(OrderManagementTemplate {
        user: Some(admin),
        orders,
        statuses: OrderStatus::ALL,
    })
}

/// Every order as JSON, newest first.
#[instrument(skip(state, _admin))]
pub async fn list_all(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
) -> Result<Json<Vec<Order>>> {
    Ok(Json(OrderRepository::new(state.pool()).list_all().await?))
}

/// Set an order's status. Any status may be chosen, including an earlier
/// one to correct a mistake.
#[instrument(skip(state, admin), fields(admin_id = %admin.id))]
pub async fn update_status(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<String>,
    Json(request): Json<StatusRequest>,
) -> Result<Json<Order>> {
    let status = parse_status(&request.status)?;
    let id: OrderId = id
        .parse()
        .map_err(|_| AppError::NotFound("order".to_owned()))?;

    let order = OrderRepository::new(state.pool())
        .update_status(id, status)
        .await
        .map_err(|e| match e {
            RepositoryError::NotFound => AppError::NotFound("order".to_owned()),
            other => AppError::Database(other),
        })?;

    tracing::info!(order_id = %order.id, status = %status, "Order status updated");
    Ok(Json(order))
}

fn parse_status(raw: &str) -> Result<OrderStatus> {
    raw.parse()
        .map_err(|_| AppError::BadRequest(format!("Unknown status: {}", raw.trim())))
}

/// Display the catalog as an admin table.
#[instrument(skip(state, admin))]
pub async fn inventory_page(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
) -> Result<InventoryTemplate> {
    let items = state.catalog().all().await?;

    Ok(InventoryTemplate {
        user: Some(admin),
        items: items.as_ref().clone(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use axum::{
        Router,
        body::Body,
        http::{Request, header},
        routing::{get, post},
    };
    use chrono::Utc;
    use tower::ServiceExt;

    use ballerz_core::{Email, ItemId, Money, OrderLine, ProductSnapshot, Size};

    use super::*;
    use crate::routes::test_support::{body_json, memory_session_layer, test_state};

    fn router() -> Router {
        Router::new()
            .route("/checkout", post(checkout))
            .route("/api/orders", get(list_all))
            .route("/api/orders/{id}/status", post(update_status))
            .route("/order-management", get(management_page))
            .layer(memory_session_layer())
            .with_state(test_state())
    }

    #[test]
    fn test_parse_status() {
        assert_eq!(parse_status("shipped").unwrap(), OrderStatus::Shipped);
        assert_eq!(
            parse_status("out for delivery").unwrap(),
            OrderStatus::OutForDelivery
        );
        assert!(matches!(parse_status("lost"), Err(AppError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_checkout_requires_sign_in() {
        let response = router()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/checkout")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();

        // Not under /api/, so anonymous visitors are sent to the login page.
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/auth/login");
    }

    #[tokio::test]
    async fn test_admin_api_rejects_anonymous() {
        let response = router()
            .oneshot(
                Request::builder()
                    .uri("/api/orders")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["error"], "Sign in required");
    }

    #[tokio::test]
    async fn test_management_page_redirects_anonymous() {
        let response = router()
            .oneshot(
                Request::builder()
                    .uri("/order-management")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
    }

    #[test]
    fn test_management_page_renders_orders() {
        let order = Order {
            id: "5f0c2d1e-aaaa-bbbb-cccc-1234567890ab".parse().unwrap(),
            user_email: Email::parse("fan@example.com").unwrap(),
            items: vec![OrderLine {
                item_id: ItemId::from("7"),
                quantity: 2,
                size: Some(Size::L),
                customization_text: Some("MESSI 10".to_owned()),
                surcharge: Money::from_rupees(100),
                product: Some(ProductSnapshot {
                    description: "Argentina Home".to_owned(),
                    category: "Football".to_owned(),
                    price: Money::from_rupees(1499),
                    image: None,
                }),
            }],
            total: Money::from_rupees(3198),
            status: OrderStatus::Shipped,
            customer: None,
            created_at: Utc::now(),
        };

        let html = OrderManagementTemplate {
            user: None,
            orders: vec![order],
            statuses: OrderStatus::ALL,
        }
        .render()
        .unwrap();

        assert!(html.contains("567890AB"));
        assert!(html.contains("Argentina Home"));
        assert!(html.contains("MESSI 10"));
        assert!(html.contains("Out for delivery"));
    }
}
