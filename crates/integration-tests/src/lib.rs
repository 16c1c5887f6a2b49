//! Integration tests for Ballerz.
//!
//! # Running Tests
//!
//! ```bash
//! # Migrate and seed a database, then start the storefront
//! cargo run -p ballerz-cli -- migrate
//! cargo run -p ballerz-cli -- seed catalog data/catalog.json
//! cargo run -p ballerz-storefront
//!
//! # Run the ignored tests against it
//! cargo test -p ballerz-integration-tests -- --ignored
//! ```
//!
//! `STOREFRONT_BASE_URL` points the tests at the server (default
//! `http://localhost:3000`). Admin tests also need
//! `STOREFRONT_DATABASE_URL` to promote their test account.

use reqwest::Client;
use serde_json::Value;
use sqlx::PgPool;

/// Base URL of the running storefront.
#[must_use]
pub fn base_url() -> String {
    std::env::var("STOREFRONT_BASE_URL").unwrap_or_else(|_| "http://localhost:3000".to_owned())
}

/// Client that keeps cookies between requests, like a browser.
///
/// # Panics
///
/// Panics if the client cannot be built.
#[must_use]
pub fn browser() -> Client {
    Client::builder()
        .cookie_store(true)
        .build()
        .expect("Failed to create HTTP client")
}

/// An address no other test run will have registered.
#[must_use]
pub fn unique_email() -> String {
    format!("it-{}@example.com", uuid::Uuid::new_v4().simple())
}

/// Register and sign in `email` on `client`.
///
/// # Panics
///
/// Panics if the request fails or the server does not redirect home.
pub async fn register(client: &Client, email: &str) {
    let response = client
        .post(format!("{}/auth/register", base_url()))
        .form(&[
            ("email", email),
            ("password", "correct-horse-battery"),
            ("password_confirm", "correct-horse-battery"),
        ])
        .send()
        .await
        .expect("Failed to register");

    assert!(response.status().is_success());
    assert_eq!(response.url().path(), "/");
}

/// The first item of the seeded catalog.
///
/// # Panics
///
/// Panics if the catalog cannot be fetched or is empty.
pub async fn first_catalog_item(client: &Client) -> Value {
    let items: Vec<Value> = client
        .get(format!("{}/api/catalog", base_url()))
        .send()
        .await
        .expect("Failed to fetch catalog")
        .json()
        .await
        .expect("Catalog is not JSON");

    items
        .into_iter()
        .next()
        .expect("Catalog is empty; seed it before running integration tests")
}

/// Connect to the storefront database.
///
/// # Panics
///
/// Panics if `STOREFRONT_DATABASE_URL` is unset or unreachable.
pub async fn database() -> PgPool {
    let url = std::env::var("STOREFRONT_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .expect("STOREFRONT_DATABASE_URL not set");
    PgPool::connect(&url).await.expect("Failed to connect to database")
}

/// Give `email` the admin role.
///
/// # Panics
///
/// Panics if the update fails.
pub async fn promote_to_admin(pool: &PgPool, email: &str) {
    sqlx::query("UPDATE users SET role = 'admin' WHERE email = $1")
        .bind(email)
        .execute(pool)
        .await
        .expect("Failed to promote user");
}
