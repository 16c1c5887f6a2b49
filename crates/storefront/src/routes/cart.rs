//! Cart route handlers.
//!
//! The same JSON API serves guests and signed-in users. A guest's cart is
//! read from the `guest_cart` cookie and every mutation answers with a
//! `Set-Cookie` carrying the updated cart. A signed-in user's cart lives in
//! the database, and `/api/cart/events` streams a fresh snapshot after each
//! change.

use std::convert::Infallible;

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Json,
    extract::State,
    http::{HeaderMap, header},
    response::{
        AppendHeaders, IntoResponse, Response, Sse,
        sse::{Event, KeepAlive},
    },
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tracing::instrument;

use ballerz_core::{
    CatalogItem, Customization, Email, ItemId, LineItem, MAX_LINE_QUANTITY, MAX_SURCHARGE, Money,
    Size,
};

use crate::db::CartRepository;
use crate::error::{AppError, Result, add_breadcrumb};
use crate::filters;
use crate::middleware::{OptionalAuth, RequireAuth};
use crate::models::CurrentUser;
use crate::services::cart::{ActiveCart, CartEntry, CartError, CartView, LineSelector};
use crate::services::guest_cookie::{self, GuestCookieError};
use crate::state::AppState;

// =============================================================================
// Request / Response Types
// =============================================================================

const fn one() -> u32 {
    1
}

/// Personalisation sent with an add request.
#[derive(Debug, Deserialize)]
pub struct CustomizationInput {
    pub text: String,
    #[serde(default)]
    pub price: Money,
}

/// Body of `POST /api/cart/add`.
#[derive(Debug, Deserialize)]
pub struct AddRequest {
    pub id: ItemId,
    #[serde(default = "one")]
    pub quantity: u32,
    #[serde(default)]
    pub size: Option<Size>,
    #[serde(default)]
    pub customization: Option<CustomizationInput>,
}

/// Body of `POST /api/cart/quantity`.
#[derive(Debug, Deserialize)]
pub struct QuantityRequest {
    pub line: LineSelector,
    pub delta: i64,
}

/// Body of `POST /api/cart/set-quantity`.
#[derive(Debug, Deserialize)]
pub struct SetQuantityRequest {
    pub line: LineSelector,
    pub quantity: u32,
}

/// Body of `POST /api/cart/size`.
#[derive(Debug, Deserialize)]
pub struct SizeRequest {
    pub line: LineSelector,
    pub size: Size,
}

/// Body of `POST /api/cart/remove`.
#[derive(Debug, Deserialize)]
pub struct RemoveRequest {
    pub line: LineSelector,
}

/// Cart contents returned after a mutation.
///
/// Lines are not resolved against the catalog; clients that need prices
/// fetch `/api/cart`.
#[derive(Debug, Serialize)]
pub struct CartSnapshot {
    pub item_count: u32,
    pub lines: Vec<CartEntry>,
}

impl CartSnapshot {
    fn from_entries(lines: Vec<CartEntry>) -> Self {
        let item_count = lines
            .iter()
            .fold(0u32, |acc, entry| acc.saturating_add(entry.item.quantity));
        Self { item_count, lines }
    }
}

/// Response of `GET /api/cart/count`.
#[derive(Debug, Serialize)]
pub struct CountResponse {
    pub count: u32,
}

/// Cart page template.
#[derive(Template, WebTemplate)]
#[template(path = "cart.html")]
pub struct CartPageTemplate {
    pub user: Option<CurrentUser>,
    pub cart: CartView,
    pub suggestions: Vec<CatalogItem>,
    pub sizes: [Size; 4],
}

// =============================================================================
// Helpers
// =============================================================================

/// The cart behind this request: the user's stored cart when signed in,
/// otherwise the guest cookie.
fn active_cart<'a>(
    state: &'a AppState,
    user: Option<&CurrentUser>,
    headers: &HeaderMap,
) -> ActiveCart<'a> {
    match user {
        Some(user) => ActiveCart::Stored {
            owner: user.email.clone(),
            repo: CartRepository::new(state.pool()),
            events: state.cart_events(),
        },
        None => ActiveCart::Guest(guest_cookie::read(headers)),
    }
}

/// Answer a mutation with the cart snapshot, writing the guest cookie back
/// when the cart is a guest cart.
async fn mutation_response(state: &AppState, cart: &ActiveCart<'_>) -> Result<Response> {
    let snapshot = CartSnapshot::from_entries(cart.entries().await?);

    let cookie = cart
        .guest()
        .map(|guest| guest_cookie::write(guest, state.config().guest_cart_days))
        .transpose()
        .map_err(|e| match e {
            GuestCookieError::TooLarge(size) => {
                tracing::debug!(size, "Guest cart cookie over the size limit");
                AppError::Cart(CartError::GuestCartFull)
            }
            GuestCookieError::Encode(e) => AppError::Internal(e.to_string()),
        })?;

    Ok((
        AppendHeaders(cookie.map(|value| (header::SET_COOKIE, value))),
        Json(snapshot),
    )
        .into_response())
}

fn check_quantity(quantity: u32) -> Result<()> {
    if quantity > MAX_LINE_QUANTITY {
        return Err(AppError::BadRequest(format!(
            "Quantity cannot be more than {MAX_LINE_QUANTITY}"
        )));
    }
    Ok(())
}

async fn load_view(state: &AppState, cart: &ActiveCart<'_>) -> Result<CartView> {
    let entries = cart.entries().await?;
    Ok(CartView::load(&entries, state.catalog()).await?)
}

// =============================================================================
// Pages
// =============================================================================

/// Display the cart page.
#[instrument(skip(state, user, headers))]
pub async fn show(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
    headers: HeaderMap,
) -> Result<CartPageTemplate> {
    let cart = active_cart(&state, user.as_ref(), &headers);
    let view = load_view(&state, &cart).await?;
    let suggestions = state.catalog().suggestions(&view.item_ids()).await?;

    Ok(CartPageTemplate {
        user,
        cart: view,
        suggestions,
        sizes: Size::ALL,
    })
}

// =============================================================================
// JSON API
// =============================================================================

/// Full cart with catalog data and totals.
#[instrument(skip(state, user, headers))]
pub async fn view(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
    headers: HeaderMap,
) -> Result<Json<CartView>> {
    let cart = active_cart(&state, user.as_ref(), &headers);
    Ok(Json(load_view(&state, &cart).await?))
}

/// Number of pieces in the cart.
#[instrument(skip(state, user, headers))]
pub async fn count(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
    headers: HeaderMap,
) -> Result<Json<CountResponse>> {
    let cart = active_cart(&state, user.as_ref(), &headers);
    Ok(Json(CountResponse {
        count: cart.count().await?,
    }))
}

/// Add an item. Adding an `(item, size)` already in the cart increases its
/// quantity.
#[instrument(skip(state, user, headers))]
pub async fn add(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
    headers: HeaderMap,
    Json(request): Json<AddRequest>,
) -> Result<Response> {
    if request.quantity == 0 {
        return Err(AppError::BadRequest("Quantity must be at least 1".to_owned()));
    }
    check_quantity(request.quantity)?;
    if let Some(custom) = &request.customization
        && !custom.price.is_within(MAX_SURCHARGE)
    {
        return Err(AppError::BadRequest(format!(
            "Customization price must be between {} and {MAX_SURCHARGE}",
            Money::ZERO
        )));
    }

    let known = state.catalog().lookup(std::slice::from_ref(&request.id)).await?;
    if !known.contains_key(&request.id) {
        return Err(CartError::UnknownItem(request.id).into());
    }

    let mut line = LineItem::new(
        request.id,
        request.quantity,
        Some(request.size.unwrap_or_default()),
    )
    .added_at(Utc::now());
    if let Some(custom) = request.customization {
        line = line.with_customization(Customization {
            text: custom.text,
            surcharge: custom.price,
        });
    }

    add_breadcrumb("cart", "Added item", Some(&[("item_id", line.item_id.as_str())]));

    let mut cart = active_cart(&state, user.as_ref(), &headers);
    let quantity = cart.add(line).await?;
    tracing::debug!(quantity, "Cart line updated");

    mutation_response(&state, &cart).await
}

/// Change a line's quantity by a signed delta. Lines reaching zero are
/// removed.
#[instrument(skip(state, user, headers))]
pub async fn change_quantity(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
    headers: HeaderMap,
    Json(request): Json<QuantityRequest>,
) -> Result<Response> {
    let mut cart = active_cart(&state, user.as_ref(), &headers);
    cart.change_quantity(&request.line, request.delta).await?;
    mutation_response(&state, &cart).await
}

/// Set a line's quantity. Zero removes the line.
#[instrument(skip(state, user, headers))]
pub async fn set_quantity(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
    headers: HeaderMap,
    Json(request): Json<SetQuantityRequest>,
) -> Result<Response> {
    check_quantity(request.quantity)?;
    let mut cart = active_cart(&state, user.as_ref(), &headers);
    cart.set_quantity(&request.line, request.quantity).await?;
    mutation_response(&state, &cart).await
}

/// Move a line to another size, merging with a line already in that size.
#[instrument(skip(state, user, headers))]
pub async fn change_size(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
    headers: HeaderMap,
    Json(request): Json<SizeRequest>,
) -> Result<Response> {
    let mut cart = active_cart(&state, user.as_ref(), &headers);
    cart.change_size(&request.line, Some(request.size)).await?;
    mutation_response(&state, &cart).await
}

/// Remove a line.
#[instrument(skip(state, user, headers))]
pub async fn remove(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
    headers: HeaderMap,
    Json(request): Json<RemoveRequest>,
) -> Result<Response> {
    let mut cart = active_cart(&state, user.as_ref(), &headers);
    cart.remove(&request.line).await?;
    mutation_response(&state, &cart).await
}

/// Live cart snapshots for the signed-in user.
///
/// Sends the current cart on connect, then a new snapshot whenever the
/// cart changes. A subscriber that falls behind skips the missed
/// notifications and receives one fresh snapshot.
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn events(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Sse<impl futures::Stream<Item = std::result::Result<Event, Infallible>>> {
    let mut changes = state.cart_events().subscribe();
    let owner = user.email;

    let stream = async_stream::stream! {
        if let Some(event) = snapshot_event(&state, &owner).await {
            yield Ok(event);
        }

        loop {
            match changes.recv().await {
                Ok(change) if change.owner == owner => {}
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Cart subscriber lagged, resyncing");
                }
                Err(RecvError::Closed) => break,
            }

            if let Some(event) = snapshot_event(&state, &owner).await {
                yield Ok(event);
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn snapshot_event(state: &AppState, owner: &Email) -> Option<Event> {
    let cart = ActiveCart::Stored {
        owner: owner.clone(),
        repo: CartRepository::new(state.pool()),
        events: state.cart_events(),
    };

    let view = match load_view(state, &cart).await {
        Ok(view) => view,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to load cart for live update");
            return None;
        }
    };

    match Event::default().event("cart").json_data(&view) {
        Ok(event) => Some(event),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to encode cart event");
            None
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use axum::{
        Router,
        body::Body,
        http::{Request, StatusCode},
        routing::{get, post},
    };
    use ballerz_core::GuestCart;
    use tower::ServiceExt;

    use super::*;
    use crate::routes::test_support::{body_json, test_state};

    fn router() -> Router {
        Router::new()
            .route("/api/cart/count", get(count))
            .route("/api/cart/add", post(add))
            .route("/api/cart/quantity", post(change_quantity))
            .route("/api/cart/set-quantity", post(set_quantity))
            .route("/api/cart/size", post(change_size))
            .route("/api/cart/remove", post(remove))
            .route("/api/cart/events", get(events))
            .layer(crate::routes::test_support::memory_session_layer())
            .with_state(test_state())
    }

    fn cookie_for(lines: Vec<LineItem>) -> String {
        let set_cookie = guest_cookie::write(&GuestCart::from_lines(lines), 30).unwrap();
        set_cookie.split(';').next().unwrap().to_owned()
    }

    fn post_json(uri: &str, cookie: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::COOKIE, cookie)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_owned()))
            .unwrap()
    }

    fn returned_cart(response: &Response) -> GuestCart {
        let mut headers = HeaderMap::new();
        let set_cookie = response.headers().get(header::SET_COOKIE).unwrap();
        let pair = set_cookie.to_str().unwrap().split(';').next().unwrap();
        headers.insert(header::COOKIE, pair.parse().unwrap());
        guest_cookie::read(&headers)
    }

    #[tokio::test]
    async fn test_guest_count_reads_cookie() {
        let cookie = cookie_for(vec![
            LineItem::new("1", 2, Some(Size::M)),
            LineItem::new("2", 1, Some(Size::L)),
        ]);

        let response = router()
            .oneshot(
                Request::builder()
                    .uri("/api/cart/count")
                    .header(header::COOKIE, cookie)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["count"], 3);
    }

    #[tokio::test]
    async fn test_guest_quantity_change_writes_cookie() {
        let cookie = cookie_for(vec![LineItem::new("A", 2, Some(Size::M))]);

        let response = router()
            .oneshot(post_json(
                "/api/cart/quantity",
                &cookie,
                r#"{"line": {"id": "A", "size": "M"}, "delta": 1}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let cart = returned_cart(&response);
        assert_eq!(cart.lines().len(), 1);
        assert_eq!(cart.lines()[0].quantity, 3);

        let body = body_json(response).await;
        assert_eq!(body["item_count"], 3);
        assert_eq!(body["lines"][0]["ID"], "A");
        assert_eq!(body["lines"][0]["Size"], "M");
    }

    #[tokio::test]
    async fn test_guest_remove_last_line_clears_cookie() {
        let cookie = cookie_for(vec![LineItem::new("A", 1, Some(Size::S))]);

        let response = router()
            .oneshot(post_json(
                "/api/cart/remove",
                &cookie,
                r#"{"line": {"id": "A", "size": "S"}}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let set_cookie = response.headers().get(header::SET_COOKIE).unwrap();
        assert!(set_cookie.to_str().unwrap().contains("Max-Age=0"));
        assert_eq!(body_json(response).await["item_count"], 0);
    }

    #[tokio::test]
    async fn test_guest_size_change_merges_lines() {
        let cookie = cookie_for(vec![
            LineItem::new("A", 2, Some(Size::S)),
            LineItem::new("A", 1, Some(Size::M)),
        ]);

        let response = router()
            .oneshot(post_json(
                "/api/cart/size",
                &cookie,
                r#"{"line": {"id": "A", "size": "S"}, "size": "M"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let cart = returned_cart(&response);
        assert_eq!(cart.lines().len(), 1);
        assert_eq!(cart.lines()[0].quantity, 3);
        assert_eq!(cart.lines()[0].size, Some(Size::M));
    }

    #[tokio::test]
    async fn test_guest_set_quantity_missing_line() {
        let response = router()
            .oneshot(post_json(
                "/api/cart/set-quantity",
                "",
                r#"{"line": {"id": "A", "size": "S"}, "quantity": 4}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_guest_line_id_rejected() {
        let cookie = cookie_for(vec![LineItem::new("A", 1, Some(Size::S))]);
        let response = router()
            .oneshot(post_json(
                "/api/cart/remove",
                &cookie,
                r#"{"line": {"line_id": 3}}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_add_rejects_out_of_range_values() {
        for body in [
            r#"{"id": "1", "quantity": 100000}"#,
            r#"{"id": "1", "customization": {"text": "X", "price": "79228162514264337593543950335"}}"#,
            r#"{"id": "1", "customization": {"text": "X", "price": -5}}"#,
        ] {
            let response = router()
                .oneshot(post_json("/api/cart/add", "", body))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{body}");
            assert!(response.headers().get(header::SET_COOKIE).is_none());
        }
    }

    #[tokio::test]
    async fn test_set_quantity_above_cap_rejected() {
        let cookie = cookie_for(vec![LineItem::new("A", 1, Some(Size::S))]);
        let response = router()
            .oneshot(post_json(
                "/api/cart/set-quantity",
                &cookie,
                r#"{"line": {"id": "A", "size": "S"}, "quantity": 2147483647}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_crafted_cookie_amounts_do_not_break_count() {
        let json = r#"[{"ID":"1","Quantity":99999999999,"isCustomized":true,"customPrice":"79228162514264337593543950335"}]"#;
        let cookie = format!("guest_cart={}", urlencoding::encode(json));

        let response = router()
            .oneshot(
                Request::builder()
                    .uri("/api/cart/count")
                    .header(header::COOKIE, cookie)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["count"], MAX_LINE_QUANTITY);
    }

    #[tokio::test]
    async fn test_events_require_sign_in() {
        let response = router()
            .oneshot(
                Request::builder()
                    .uri("/api/cart/events")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_snapshot_counts_pieces() {
        let snapshot = CartSnapshot::from_entries(vec![
            CartEntry {
                line_id: None,
                item: LineItem::new("A", 2, Some(Size::S)),
            },
            CartEntry {
                line_id: None,
                item: LineItem::new("B", 5, None),
            },
        ]);
        assert_eq!(snapshot.item_count, 7);
    }
}
