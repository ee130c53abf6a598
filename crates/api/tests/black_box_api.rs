use chrono::{Duration as ChronoDuration, Utc};
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde_json::json;

use campusmarket_auth::{JwtClaims, Role};
use campusmarket_core::UserId;

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn(jwt_secret: &str) -> Self {
        // Build app (same router as prod), but bind to an ephemeral port.
        let app = campusmarket_api::app::build_app(jwt_secret.to_string()).await;
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn mint_jwt(jwt_secret: &str, sub: UserId, roles: Vec<Role>, name: &str) -> String {
    let now = Utc::now();
    let claims = JwtClaims {
        sub,
        roles,
        name: Some(name.to_string()),
        issued_at: now,
        expires_at: now + ChronoDuration::minutes(10),
    };

    jsonwebtoken::encode(
        &jsonwebtoken::Header::new(jsonwebtoken::Algorithm::HS256),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(jwt_secret.as_bytes()),
    )
    .expect("failed to encode jwt")
}

fn listing_form(name: &str, price_cents: u64, image_names: &[&str]) -> Form {
    let mut form = Form::new()
        .text("name", name.to_string())
        .text("price_cents", price_cents.to_string())
        .text("shipping_method", "express")
        .text("shipping_time_hours", "24");
    for image in image_names {
        form = form.part(
            "images",
            Part::bytes(vec![0xAB; 64]).file_name(image.to_string()),
        );
    }
    form
}

const SECRET: &str = "test-secret";

#[tokio::test]
async fn health_is_public_but_everything_else_needs_a_token() {
    let server = TestServer::spawn(SECRET).await;
    let client = reqwest::Client::new();

    let res = client
        .get(format!("{}/health", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .get(format!("{}/requests", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client
        .get(format!("{}/requests", server.base_url))
        .bearer_auth(mint_jwt("wrong-secret", UserId::new(), vec![Role::member()], "Eve"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn full_listing_lifecycle() {
    let server = TestServer::spawn(SECRET).await;
    let client = reqwest::Client::new();
    let seller = mint_jwt(SECRET, UserId::new(), vec![Role::member()], "Sam");
    let admin = mint_jwt(SECRET, UserId::new(), vec![Role::admin()], "Ada");

    // Submit a new listing with two images.
    let res = client
        .post(format!("{}/requests", server.base_url))
        .bearer_auth(&seller)
        .multipart(listing_form("Desk Lamp", 2990, &["a.jpg", "b.png"]))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let created: serde_json::Value = res.json().await.unwrap();
    assert_eq!(created["status"], "pending");
    let request_id = created["id"].as_str().unwrap().to_string();

    // The seller sees their own pending request with staged images.
    let res = client
        .get(format!("{}/requests", server.base_url))
        .bearer_auth(&seller)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let listed: serde_json::Value = res.json().await.unwrap();
    let items = listed["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["id"], request_id.as_str());
    assert_eq!(items[0]["images"].as_array().unwrap().len(), 2);
    assert_eq!(items[0]["images"][0]["is_main"], true);
    assert_eq!(items[0]["requester"]["display_name"], "Sam");

    // No products yet.
    let res = client
        .get(format!("{}/products", server.base_url))
        .bearer_auth(&seller)
        .send()
        .await
        .unwrap();
    let products: serde_json::Value = res.json().await.unwrap();
    assert!(products["items"].as_array().unwrap().is_empty());

    // Admin approves: a product materializes with both images attached.
    let res = client
        .post(format!("{}/requests/{}/approve", server.base_url, request_id))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let approved: serde_json::Value = res.json().await.unwrap();
    assert_eq!(approved["outcome"], "approved");
    assert!(approved["message"].as_str().unwrap().contains("Desk Lamp"));
    let product_id = approved["product_id"].as_str().unwrap().to_string();

    let res = client
        .get(format!("{}/products/{}", server.base_url, product_id))
        .bearer_auth(&seller)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let product: serde_json::Value = res.json().await.unwrap();
    assert_eq!(product["name"], "Desk Lamp");
    assert_eq!(product["price_cents"], 2990);
    assert_eq!(product["images"].as_array().unwrap().len(), 2);

    // A second approval is the reported no-op path, not an error.
    let res = client
        .post(format!("{}/requests/{}/approve", server.base_url, request_id))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let repeat: serde_json::Value = res.json().await.unwrap();
    assert_eq!(repeat["outcome"], "already_processed");
}

#[tokio::test]
async fn members_cannot_moderate() {
    let server = TestServer::spawn(SECRET).await;
    let client = reqwest::Client::new();
    let seller = mint_jwt(SECRET, UserId::new(), vec![Role::member()], "Sam");

    let res = client
        .post(format!("{}/requests", server.base_url))
        .bearer_auth(&seller)
        .multipart(listing_form("Desk Lamp", 2990, &["a.jpg"]))
        .send()
        .await
        .unwrap();
    let request_id = res.json::<serde_json::Value>().await.unwrap()["id"]
        .as_str()
        .unwrap()
        .to_string();

    let res = client
        .post(format!("{}/requests/{}/approve", server.base_url, request_id))
        .bearer_auth(&seller)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = client
        .post(format!("{}/requests/{}/reject", server.base_url, request_id))
        .bearer_auth(&seller)
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn rejection_keeps_the_catalog_empty_and_the_comment_verbatim() {
    let server = TestServer::spawn(SECRET).await;
    let client = reqwest::Client::new();
    let seller = mint_jwt(SECRET, UserId::new(), vec![Role::member()], "Sam");
    let admin = mint_jwt(SECRET, UserId::new(), vec![Role::admin()], "Ada");

    let res = client
        .post(format!("{}/requests", server.base_url))
        .bearer_auth(&seller)
        .multipart(listing_form("Desk Lamp", 2990, &["a.jpg"]))
        .send()
        .await
        .unwrap();
    let request_id = res.json::<serde_json::Value>().await.unwrap()["id"]
        .as_str()
        .unwrap()
        .to_string();

    let res = client
        .post(format!("{}/requests/{}/reject", server.base_url, request_id))
        .bearer_auth(&admin)
        .json(&json!({ "review_comment": "blurry photos" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(
        res.json::<serde_json::Value>().await.unwrap()["outcome"],
        "rejected"
    );

    let res = client
        .get(format!("{}/requests/{}", server.base_url, request_id))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    let detail: serde_json::Value = res.json().await.unwrap();
    assert_eq!(detail["status"], "rejected");
    assert_eq!(detail["review_comment"], "blurry photos");
    assert_eq!(detail["reviewer"]["display_name"], "Ada");

    let res = client
        .get(format!("{}/products", server.base_url))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    let products: serde_json::Value = res.json().await.unwrap();
    assert!(products["items"].as_array().unwrap().is_empty());

    // Repeat rejection reports the no-op path.
    let res = client
        .post(format!("{}/requests/{}/reject", server.base_url, request_id))
        .bearer_auth(&admin)
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(
        res.json::<serde_json::Value>().await.unwrap()["outcome"],
        "already_processed"
    );
}

#[tokio::test]
async fn oversubmitted_image_count_is_a_validation_error() {
    let server = TestServer::spawn(SECRET).await;
    let client = reqwest::Client::new();
    let seller = mint_jwt(SECRET, UserId::new(), vec![Role::member()], "Sam");

    let images = ["1.jpg", "2.jpg", "3.jpg", "4.jpg", "5.jpg", "6.jpg"];
    let res = client
        .post(format!("{}/requests", server.base_url))
        .bearer_auth(&seller)
        .multipart(listing_form("Desk Lamp", 2990, &images))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    // Nothing was created.
    let res = client
        .get(format!("{}/requests", server.base_url))
        .bearer_auth(&seller)
        .send()
        .await
        .unwrap();
    let listed: serde_json::Value = res.json().await.unwrap();
    assert!(listed["items"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn deleting_a_request_removes_it() {
    let server = TestServer::spawn(SECRET).await;
    let client = reqwest::Client::new();
    let seller = mint_jwt(SECRET, UserId::new(), vec![Role::member()], "Sam");
    let admin = mint_jwt(SECRET, UserId::new(), vec![Role::admin()], "Ada");

    let res = client
        .post(format!("{}/requests", server.base_url))
        .bearer_auth(&seller)
        .multipart(listing_form("Desk Lamp", 2990, &["a.jpg"]))
        .send()
        .await
        .unwrap();
    let request_id = res.json::<serde_json::Value>().await.unwrap()["id"]
        .as_str()
        .unwrap()
        .to_string();

    let res = client
        .post(format!("{}/requests/{}/delete", server.base_url, request_id))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .get(format!("{}/requests/{}", server.base_url, request_id))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn whoami_reflects_the_token() {
    let server = TestServer::spawn(SECRET).await;
    let client = reqwest::Client::new();
    let user_id = UserId::new();
    let token = mint_jwt(SECRET, user_id, vec![Role::admin()], "Ada");

    let res = client
        .get(format!("{}/whoami", server.base_url))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["user_id"], user_id.to_string());
    assert_eq!(body["roles"][0], "admin");
    assert_eq!(body["display_name"], "Ada");
}
