//! Checkout and order management against a running storefront.
//!
//! These tests require:
//! - A migrated and seeded `PostgreSQL` database
//! - The storefront running (cargo run -p ballerz-storefront)
//! - `STOREFRONT_DATABASE_URL` for the admin tests
//!
//! Run with: cargo test -p ballerz-integration-tests -- --ignored

use ballerz_integration_tests::{
    base_url, browser, database, first_catalog_item, promote_to_admin, register, unique_email,
};
use reqwest::StatusCode;
use serde_json::{Value, json};

async fn place_order(client: &reqwest::Client) -> Value {
    let item = first_catalog_item(client).await;
    client
        .post(format!("{}/api/cart/add", base_url()))
        .json(&json!({
            "id": item["id"],
            "quantity": 2,
            "size": "XL",
            "customization": { "text": "KOHLI 18", "price": 100 }
        }))
        .send()
        .await
        .expect("Failed to add to cart");

    let resp = client
        .post(format!("{}/checkout", base_url()))
        .json(&json!({ "customer": { "name": "Test Fan", "email": "fan@example.com" } }))
        .send()
        .await
        .expect("Failed to check out");
    assert_eq!(resp.status(), StatusCode::CREATED);
    resp.json().await.expect("Order is not JSON")
}

#[tokio::test]
#[ignore = "Requires running storefront and seeded database"]
async fn test_checkout_snapshots_cart_and_empties_it() {
    let client = browser();
    register(&client, &unique_email()).await;

    let order = place_order(&client).await;
    assert_eq!(order["status"], "placed");
    assert_eq!(order["items"][0]["Quantity"], 2);
    assert_eq!(order["items"][0]["customizationText"], "KOHLI 18");
    assert!(order["items"][0]["product"]["Description"].is_string());

    let count: Value = client
        .get(format!("{}/api/cart/count", base_url()))
        .send()
        .await
        .expect("Failed to fetch count")
        .json()
        .await
        .expect("Count is not JSON");
    assert_eq!(count["count"], 0);

    let mine: Vec<Value> = client
        .get(format!("{}/api/orders/mine", base_url()))
        .send()
        .await
        .expect("Failed to list orders")
        .json()
        .await
        .expect("Orders are not JSON");
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0]["id"], order["id"]);
}

#[tokio::test]
#[ignore = "Requires running storefront and seeded database"]
async fn test_empty_cart_checkout_is_rejected() {
    let client = browser();
    register(&client, &unique_email()).await;

    let resp = client
        .post(format!("{}/checkout", base_url()))
        .json(&json!({}))
        .send()
        .await
        .expect("Failed to check out");

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
#[ignore = "Requires running storefront, seeded database and STOREFRONT_DATABASE_URL"]
async fn test_admin_updates_order_status() {
    let customer = browser();
    register(&customer, &unique_email()).await;
    let order = place_order(&customer).await;
    let order_id = order["id"].as_str().expect("order id");

    // Customers cannot manage orders.
    let resp = customer
        .post(format!("{}/api/orders/{order_id}/status", base_url()))
        .json(&json!({ "status": "shipped" }))
        .send()
        .await
        .expect("Failed to update status");
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let admin_email = unique_email();
    let pool = database().await;
    let admin = browser();
    register(&admin, &admin_email).await;
    promote_to_admin(&pool, &admin_email).await;
    // The role is read at sign-in, so sign in again.
    admin
        .post(format!("{}/auth/logout", base_url()))
        .send()
        .await
        .expect("Failed to sign out");
    admin
        .post(format!("{}/auth/login", base_url()))
        .form(&[("email", admin_email.as_str()), ("password", "correct-horse-battery")])
        .send()
        .await
        .expect("Failed to sign in");

    let resp = admin
        .post(format!("{}/api/orders/{order_id}/status", base_url()))
        .json(&json!({ "status": "Out_For_Delivery" }))
        .send()
        .await
        .expect("Failed to update status");
    assert_eq!(resp.status(), StatusCode::OK);
    let updated: Value = resp.json().await.expect("Order is not JSON");
    assert_eq!(updated["status"], "out for delivery");

    let resp = admin
        .post(format!("{}/api/orders/{order_id}/status", base_url()))
        .json(&json!({ "status": "lost" }))
        .send()
        .await
        .expect("Failed to update status");
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
#[ignore = "Requires running storefront"]
async fn test_send_contact_requires_all_fields() {
    let resp = browser()
        .post(format!("{}/api/send-contact", base_url()))
        .json(&json!({ "name": "Asha", "email": "asha@example.com" }))
        .send()
        .await
        .expect("Failed to send contact");

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.expect("Error is not JSON");
    assert_eq!(body["error"], "Missing fields");
}

#[tokio::test]
#[ignore = "Requires running storefront and seeded database"]
async fn test_lines_added_during_checkout_are_not_lost() {
    let client = browser();
    register(&client, &unique_email()).await;
    let item = first_catalog_item(&client).await;

    let add = |size: &'static str| {
        let client = client.clone();
        let id = item["id"].clone();
        async move {
            client
                .post(format!("{}/api/cart/add", base_url()))
                .json(&json!({ "id": id, "quantity": 1, "size": size }))
                .send()
                .await
                .expect("Failed to add to cart")
                .status()
        }
    };

    let mut added = 0_u64;
    for _ in 0..10 {
        assert_eq!(add("S").await, StatusCode::OK);
        added += 1;

        let checkout = client
            .post(format!("{}/checkout", base_url()))
            .json(&json!({ "customer": { "email": "fan@example.com" } }))
            .send();
        let (checkout, racing_add) = tokio::join!(checkout, add("M"));

        let status = checkout.expect("Failed to check out").status();
        assert!(
            status == StatusCode::CREATED || status == StatusCode::CONFLICT,
            "unexpected checkout status {status}"
        );
        if racing_add == StatusCode::OK {
            added += 1;
        }
    }

    let ordered: u64 = client
        .get(format!("{}/api/orders/mine", base_url()))
        .send()
        .await
        .expect("Failed to list orders")
        .json::<Vec<Value>>()
        .await
        .expect("Orders are not JSON")
        .iter()
        .flat_map(|order| order["items"].as_array().cloned().unwrap_or_default())
        .map(|line| line["Quantity"].as_u64().unwrap_or(0))
        .sum();

    let in_cart = client
        .get(format!("{}/api/cart/count", base_url()))
        .send()
        .await
        .expect("Failed to fetch count")
        .json::<Value>()
        .await
        .expect("Count is not JSON")["count"]
        .as_u64()
        .unwrap_or(0);

    assert_eq!(ordered + in_cart, added);
}
