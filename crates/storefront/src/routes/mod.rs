//! HTTP route handlers for the storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET  /                       - Home page (categories, optional search)
//! GET  /shop                   - Shop listing (?category=&search=&sort=)
//! GET  /product/{description}  - Product detail
//! GET  /faq                    - FAQ and contact form
//!
//! # Cart (guest cookie or signed-in database cart)
//! GET  /cart                   - Cart page
//! GET  /api/cart               - Cart with catalog data and totals
//! GET  /api/cart/count         - Number of pieces
//! GET  /api/cart/events        - Live cart snapshots (SSE, signed in)
//! POST /api/cart/add           - Add an item
//! POST /api/cart/quantity      - Change a line's quantity by a delta
//! POST /api/cart/set-quantity  - Set a line's quantity
//! POST /api/cart/size          - Move a line to another size
//! POST /api/cart/remove        - Remove a line
//! GET  /api/catalog            - Catalog listing as JSON
//!
//! # Orders
//! POST /checkout               - Place an order from the cart
//! GET  /api/orders/mine        - The signed-in user's orders
//!
//! # Admin
//! GET  /order-management       - Order management page
//! GET  /inventory              - Catalog table
//! GET  /api/orders             - Every order as JSON
//! POST /api/orders/{id}/status - Set an order's status
//!
//! # Mail
//! POST /api/send-contact       - Relay a contact form message
//! POST /api/send-invoice       - Email an order invoice (PDF)
//!
//! # Auth
//! GET  /auth/login             - Login page
//! POST /auth/login             - Login action
//! GET  /auth/register          - Register page
//! POST /auth/register          - Register action
//! POST /auth/logout            - Logout action
//! ```

pub mod auth;
pub mod cart;
pub mod contact;
pub mod invoice;
pub mod orders;
pub mod shop;

use axum::{
    Router,
    routing::{get, post},
};

use crate::middleware::{api_rate_limiter, auth_rate_limiter, mail_rate_limiter};
use crate::state::AppState;

/// Create the auth routes router.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/login", get(auth::login_page).post(auth::login))
        .route("/register", get(auth::register_page).post(auth::register))
        .route("/logout", post(auth::logout))
}

/// Create the catalog page routes router.
pub fn shop_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(shop::home))
        .route("/shop", get(shop::shop))
        .route("/product/{description}", get(shop::product))
        .route("/faq", get(contact::faq))
        .route("/cart", get(cart::show))
}

/// Create the cart API routes router.
pub fn cart_api_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::view))
        .route("/count", get(cart::count))
        .route("/events", get(cart::events))
        .route("/add", post(cart::add))
        .route("/quantity", post(cart::change_quantity))
        .route("/set-quantity", post(cart::set_quantity))
        .route("/size", post(cart::change_size))
        .route("/remove", post(cart::remove))
}

/// Create the checkout and order routes router.
pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/checkout", post(orders::checkout))
        .route("/api/orders/mine", get(orders::my_orders))
        .route("/api/catalog", get(shop::catalog_json))
}

/// Create the admin routes router.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/order-management", get(orders::management_page))
        .route("/inventory", get(orders::inventory_page))
        .route("/api/orders", get(orders::list_all))
        .route("/api/orders/{id}/status", post(orders::update_status))
}

/// Create the mail routes router.
pub fn mail_routes() -> Router<AppState> {
    Router::new()
        .route("/api/send-contact", post(contact::send_contact))
        .route("/api/send-invoice", post(invoice::send_invoice))
}

/// Create all routes for the storefront.
///
/// Rate limiters key on the client address, so the server must be started
/// with connect info (see `main`).
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(shop_routes())
        .nest("/api/cart", cart_api_routes().layer(api_rate_limiter()))
        .merge(order_routes().layer(api_rate_limiter()))
        .merge(admin_routes())
        .merge(mail_routes().layer(mail_rate_limiter()))
        .nest("/auth", auth_routes().layer(auth_rate_limiter()))
        .fallback(shop::not_found)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod test_support {
    //! Shared fixtures for handler tests.

    use axum::response::Response;
    use sqlx::postgres::PgPoolOptions;
    use tower_sessions::{MemoryStore, SessionManagerLayer};

    use crate::config::tests::test_config;
    use crate::middleware::session::session_layer;
    use crate::state::AppState;

    /// State whose pool never connects unless a handler touches the
    /// database. Must be called inside a Tokio runtime.
    pub(crate) fn test_state() -> AppState {
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://localhost/ballerz_test")
            .unwrap();
        AppState::new(test_config(), pool).unwrap()
    }

    /// Session layer backed by memory.
    pub(crate) fn memory_session_layer() -> SessionManagerLayer<MemoryStore> {
        session_layer(MemoryStore::default(), &test_config())
    }

    /// Read a response body as JSON.
    pub(crate) async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }
}
