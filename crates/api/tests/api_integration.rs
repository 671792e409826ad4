//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};

use api::auth::{Claims, Role, TokenType};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::Utc;
use common::UserId;
use domain::{Listing, ListingDraft, ListingStatus, LoginMethod, Money, TransactionStatus};
use jsonwebtoken::{EncodingKey, Header};
use metrics_exporter_prometheus::PrometheusHandle;
use purchase::{InMemoryPaymentGateway, PaymentGateway, PurchaseConfig};
use store::{InMemoryStore, ListingStore, TransactionStore};
use tower::ServiceExt;

const SECRET: &[u8] = b"integration-secret";

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

struct TestApp {
    app: axum::Router,
    store: InMemoryStore,
    gateway: InMemoryPaymentGateway,
}

fn setup() -> TestApp {
    let store = InMemoryStore::new();
    let gateway = InMemoryPaymentGateway::new();
    let state = api::AppState::new(
        Arc::new(store.clone()) as Arc<dyn ListingStore>,
        Arc::new(store.clone()) as Arc<dyn TransactionStore>,
        Arc::new(gateway.clone()) as Arc<dyn PaymentGateway>,
        PurchaseConfig::default(),
        SECRET,
    );
    TestApp {
        app: api::create_app(state, get_metrics_handle()),
        store,
        gateway,
    }
}

fn token_for(user: UserId, role: Role, token_type: TokenType) -> String {
    let claims = Claims {
        sub: user.as_uuid(),
        email: format!("{user}@example.com"),
        role,
        token_type,
        exp: Utc::now().timestamp() + 3600,
    };
    jsonwebtoken::encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET))
        .unwrap()
}

fn user_token(user: UserId) -> String {
    token_for(user, Role::User, TokenType::Access)
}

fn seller_token(user: UserId) -> String {
    token_for(user, Role::VerifiedSeller, TokenType::Access)
}

async fn seed_listing(store: &InMemoryStore, seller: UserId, price: i64, title: &str) -> Listing {
    let listing = Listing::new(
        seller,
        ListingDraft {
            game_id: 1,
            title: title.to_string(),
            description: None,
            price: Money::from_units(price),
            login_method: LoginMethod::Moonton,
            details: serde_json::json!({}),
            images: vec!["https://cdn.example.com/1.png".to_string()],
        },
        Utc::now(),
    );
    store.insert(listing.clone()).await.unwrap();
    listing
}

async fn send(
    app: &axum::Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_string(&json).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null)
    };
    (status, json)
}

fn listing_body() -> serde_json::Value {
    serde_json::json!({
        "game_id": 1,
        "title": "Mythic Glory account, 120 heroes",
        "description": "All heroes unlocked",
        "price": "125000",
        "login_method": "moonton",
        "details": { "rank": "Mythic Glory" },
        "images": ["https://cdn.example.com/1.png"]
    })
}

#[tokio::test]
async fn test_health_check() {
    let t = setup();
    let (status, json) = send(&t.app, "GET", "/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_verified_seller_creates_listing() {
    let t = setup();
    let seller = UserId::new();

    let (status, json) = send(
        &t.app,
        "POST",
        "/listings",
        Some(&seller_token(seller)),
        Some(listing_body()),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["success"], true);
    assert_eq!(json["data"]["status"], "active");
    assert_eq!(json["data"]["price"], "125000");
    assert_eq!(json["data"]["seller_id"], seller.to_string());

    let (status, json) = send(
        &t.app,
        "GET",
        &format!("/listings/{}", json["data"]["id"].as_str().unwrap()),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["title"], "Mythic Glory account, 120 heroes");
}

#[tokio::test]
async fn test_listing_creation_requires_verified_seller() {
    let t = setup();

    let (status, _) = send(&t.app, "POST", "/listings", None, Some(listing_body())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(
        &t.app,
        "POST",
        "/listings",
        Some(&user_token(UserId::new())),
        Some(listing_body()),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_invalid_listing_is_bad_request() {
    let t = setup();
    let mut body = listing_body();
    body["price"] = serde_json::json!("999");

    let (status, json) = send(
        &t.app,
        "POST",
        "/listings",
        Some(&seller_token(UserId::new())),
        Some(body),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("price"));
}

#[tokio::test]
async fn test_list_listings_paginates_active_only() {
    let t = setup();
    let seller = UserId::new();
    for n in 0..3 {
        seed_listing(&t.store, seller, 10000 + n, &format!("Epic account number {n}")).await;
    }
    let sold = seed_listing(&t.store, seller, 50000, "Legend account already sold").await;
    t.store.try_reserve_from(sold.id, ListingStatus::Active).await.unwrap();

    let (status, json) = send(
        &t.app,
        "GET",
        "/listings?limit=2&sort=price_asc",
        None,
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let listings = json["data"]["listings"].as_array().unwrap();
    assert_eq!(listings.len(), 2);
    assert_eq!(listings[0]["price"], "10000");
    assert_eq!(json["data"]["pagination"]["total"], 3);
    assert_eq!(json["data"]["pagination"]["total_pages"], 2);

    let (_, json) = send(&t.app, "GET", "/listings?search=NUMBER%202", None, None).await;
    assert_eq!(json["data"]["pagination"]["total"], 1);

    let (status, _) = send(&t.app, "GET", "/listings?limit=500", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_get_listing_errors() {
    let t = setup();

    let (status, _) = send(&t.app, "GET", "/listings/not-a-uuid", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &t.app,
        "GET",
        &format!("/listings/{}", common::ListingId::new()),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_purchase_creates_invoice() {
    let t = setup();
    let listing = seed_listing(&t.store, UserId::new(), 125000, "Mythic Glory account").await;
    let buyer = UserId::new();

    let (status, json) = send(
        &t.app,
        "POST",
        "/transactions/purchase",
        Some(&user_token(buyer)),
        Some(serde_json::json!({ "listing_id": listing.id.to_string() })),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["success"], true);
    let payment_url = json["data"]["payment_url"].as_str().unwrap();
    assert!(payment_url.starts_with("https://checkout.xendit.co/web/"));
    assert!(json["data"]["expires_at"].is_string());

    let stored = ListingStore::get_by_id(&t.store, listing.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, ListingStatus::Sold);

    let transaction_id = json["data"]["transaction_id"].as_str().unwrap().to_string();
    let (status, json) = send(
        &t.app,
        "GET",
        &format!("/transactions/{transaction_id}"),
        Some(&user_token(buyer)),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["status"], "pending");
    assert_eq!(json["data"]["fees"]["total_buyer_paid"], "131250");
    assert_eq!(json["data"]["fees"]["seller_received"], "123000");
}

#[tokio::test]
async fn test_purchase_requires_access_token() {
    let t = setup();
    let listing = seed_listing(&t.store, UserId::new(), 125000, "Mythic Glory account").await;
    let body = serde_json::json!({ "listing_id": listing.id.to_string() });

    let (status, _) = send(&t.app, "POST", "/transactions/purchase", None, Some(body.clone())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let refresh = token_for(UserId::new(), Role::User, TokenType::Refresh);
    let (status, _) = send(
        &t.app,
        "POST",
        "/transactions/purchase",
        Some(&refresh),
        Some(body.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(
        &t.app,
        "POST",
        "/transactions/purchase",
        Some("not.a.jwt"),
        Some(body),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_self_purchase_is_forbidden() {
    let t = setup();
    let seller = UserId::new();
    let listing = seed_listing(&t.store, seller, 125000, "Mythic Glory account").await;

    let (status, _) = send(
        &t.app,
        "POST",
        "/transactions/purchase",
        Some(&seller_token(seller)),
        Some(serde_json::json!({ "listing_id": listing.id.to_string() })),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(t.store.transaction_count_for(listing.id).await, 0);
}

#[tokio::test]
async fn test_second_buyer_gets_conflict() {
    let t = setup();
    let listing = seed_listing(&t.store, UserId::new(), 125000, "Mythic Glory account").await;
    let body = serde_json::json!({ "listing_id": listing.id.to_string() });

    let (first, _) = send(
        &t.app,
        "POST",
        "/transactions/purchase",
        Some(&user_token(UserId::new())),
        Some(body.clone()),
    )
    .await;
    let (second, json) = send(
        &t.app,
        "POST",
        "/transactions/purchase",
        Some(&user_token(UserId::new())),
        Some(body),
    )
    .await;

    assert_eq!(first, StatusCode::CREATED);
    assert_eq!(second, StatusCode::CONFLICT);
    assert!(json["error"].as_str().unwrap().contains("no longer available"));
}

#[tokio::test]
async fn test_unknown_listing_is_conflict() {
    let t = setup();

    let (status, _) = send(
        &t.app,
        "POST",
        "/transactions/purchase",
        Some(&user_token(UserId::new())),
        Some(serde_json::json!({ "listing_id": common::ListingId::new().to_string() })),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_gateway_failure_is_failed_dependency() {
    let t = setup();
    let listing = seed_listing(&t.store, UserId::new(), 125000, "Mythic Glory account").await;
    t.gateway.set_fail_on_create(true).await;

    let (status, json) = send(
        &t.app,
        "POST",
        "/transactions/purchase",
        Some(&user_token(UserId::new())),
        Some(serde_json::json!({ "listing_id": listing.id.to_string() })),
    )
    .await;

    assert_eq!(status, StatusCode::FAILED_DEPENDENCY);
    assert!(!json["error"].as_str().unwrap().contains("declined"));

    let stored = ListingStore::get_by_id(&t.store, listing.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, ListingStatus::Active);
    let transactions = t.store.transactions_for(listing.id).await;
    assert_eq!(transactions[0].status, TransactionStatus::Failed);
}

#[tokio::test]
async fn test_store_failure_is_generic_internal_error() {
    let t = setup();
    let listing = seed_listing(&t.store, UserId::new(), 125000, "Mythic Glory account").await;
    t.store.set_fail_on_create_transaction(true);

    let (status, json) = send(
        &t.app,
        "POST",
        "/transactions/purchase",
        Some(&user_token(UserId::new())),
        Some(serde_json::json!({ "listing_id": listing.id.to_string() })),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["error"], "internal server error");
    let stored = ListingStore::get_by_id(&t.store, listing.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, ListingStatus::Active);
}

#[tokio::test]
async fn test_transaction_visible_to_parties_only() {
    let t = setup();
    let seller = UserId::new();
    let buyer = UserId::new();
    let listing = seed_listing(&t.store, seller, 125000, "Mythic Glory account").await;

    let (_, json) = send(
        &t.app,
        "POST",
        "/transactions/purchase",
        Some(&user_token(buyer)),
        Some(serde_json::json!({ "listing_id": listing.id.to_string() })),
    )
    .await;
    let uri = format!(
        "/transactions/{}",
        json["data"]["transaction_id"].as_str().unwrap()
    );

    let (status, _) = send(&t.app, "GET", &uri, Some(&seller_token(seller)), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&t.app, "GET", &uri, Some(&user_token(UserId::new())), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&t.app, "GET", &uri, None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_malformed_purchase_body_is_bad_request() {
    let t = setup();

    let (status, _) = send(
        &t.app,
        "POST",
        "/transactions/purchase",
        Some(&user_token(UserId::new())),
        Some(serde_json::json!({ "listing": "x" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &t.app,
        "POST",
        "/transactions/purchase",
        Some(&user_token(UserId::new())),
        Some(serde_json::json!({ "listing_id": "not-a-uuid" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let t = setup();
    let listing = seed_listing(&t.store, UserId::new(), 125000, "Mythic Glory account").await;
    send(
        &t.app,
        "POST",
        "/transactions/purchase",
        Some(&user_token(UserId::new())),
        Some(serde_json::json!({ "listing_id": listing.id.to_string() })),
    )
    .await;

    let response = t
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("purchase_attempts_total"));
}
