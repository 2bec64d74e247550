use std::net::SocketAddr;

use reqwest::{Client, StatusCode};
use serde_json::{Value, json};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use visitlog::audit::FieldMappings;
use visitlog::config::Config;

/// A running test server instance with a dedicated test database.
pub struct TestApp {
    pub addr: SocketAddr,
    pub pool: PgPool,
    pub client: Client,
    pub db_name: String,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn register(&self, email: &str, password: &str, name: &str) -> (Value, StatusCode) {
        let resp = self
            .client
            .post(self.url("/api/v1/auth/register"))
            .json(&json!({ "email": email, "password": password, "name": name }))
            .send()
            .await
            .expect("register request failed");
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(json!(null));
        (body, status)
    }

    pub async fn login(&self, email: &str, password: &str) -> (Value, StatusCode) {
        let resp = self
            .client
            .post(self.url("/api/v1/auth/login"))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .expect("login request failed");
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(json!(null));
        (body, status)
    }

    /// Register the bootstrap admin, return its access token.
    pub async fn bootstrap(&self) -> String {
        let (body, status) = self.register("admin@test.com", "password123", "Admin").await;
        assert_eq!(status, StatusCode::OK, "bootstrap register failed: {body}");
        body["accessToken"].as_str().unwrap().to_string()
    }

    /// Create a technician through the admin API and log in as them.
    pub async fn technician(&self, admin_token: &str) -> String {
        let (body, status) = self
            .post_auth(
                "/api/v1/users",
                admin_token,
                &json!({
                    "email": "tech@test.com",
                    "password": "password123",
                    "name": "Tech",
                    "role": "technician"
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "create technician failed: {body}");

        let (body, status) = self.login("tech@test.com", "password123").await;
        assert_eq!(status, StatusCode::OK, "technician login failed: {body}");
        body["accessToken"].as_str().unwrap().to_string()
    }

    /// Create an order with one visit per `(visit_id, fields)` pair.
    pub async fn create_order(&self, token: &str, order_id: &str, visits: &[(&str, Value)]) -> Value {
        let visits: Vec<Value> = visits
            .iter()
            .map(|(id, fields)| {
                let mut visit = fields.clone();
                visit["id"] = json!(id);
                visit
            })
            .collect();
        let (body, status) = self
            .post_auth(
                "/api/v1/orders",
                token,
                &json!({ "id": order_id, "data": { "clientName": "Jan Kowalski" }, "visits": visits }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "create order failed: {body}");
        body
    }

    /// Total number of audit entries matching a query string.
    pub async fn log_total(&self, token: &str, query: &str) -> i64 {
        let (body, status) = self
            .get_auth(&format!("/api/v1/audit-logs?{query}"), token)
            .await;
        assert_eq!(status, StatusCode::OK, "audit query failed: {body}");
        body["pagination"]["total"].as_i64().unwrap()
    }

    pub async fn get_auth(&self, path: &str, token: &str) -> (Value, StatusCode) {
        let resp = self
            .client
            .get(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .expect("get request failed");
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(json!(null));
        (body, status)
    }

    pub async fn post_auth(&self, path: &str, token: &str, body: &Value) -> (Value, StatusCode) {
        let resp = self
            .client
            .post(self.url(path))
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .expect("post request failed");
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(json!(null));
        (body, status)
    }

    pub async fn patch_auth(&self, path: &str, token: &str, body: &Value) -> (Value, StatusCode) {
        let resp = self
            .client
            .patch(self.url(path))
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .expect("patch request failed");
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(json!(null));
        (body, status)
    }
}

fn admin_url(base_url: &str) -> String {
    base_url
        .rsplit_once('/')
        .map(|(base, _)| format!("{base}/postgres"))
        .unwrap_or_else(|| base_url.to_string())
}

/// Spawn a test app with a fresh temporary database.
pub async fn spawn_app() -> TestApp {
    let _ = dotenvy::dotenv();

    let base_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for tests");

    let db_name = format!("visitlog_test_{}", Uuid::now_v7().simple());

    let admin_pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&admin_url(&base_url))
        .await
        .expect("Failed to connect to postgres for test DB creation");

    sqlx::query(&format!("CREATE DATABASE \"{db_name}\""))
        .execute(&admin_pool)
        .await
        .expect("Failed to create test database");

    admin_pool.close().await;

    let test_url = base_url
        .rsplit_once('/')
        .map(|(base, _)| format!("{base}/{db_name}"))
        .unwrap_or_else(|| base_url.clone());

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&test_url)
        .await
        .expect("Failed to connect to test database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations on test database");

    let config = Config {
        database_url: test_url,
        jwt_secret: "test-jwt-secret-that-is-long-enough".to_string(),
        host: "127.0.0.1".parse().unwrap(),
        port: 0, // unused, we bind to random port
        trusted_proxies: vec![],
        log_level: "warn".to_string(),
        field_mappings: None,
        max_write_attempts: 50,
        max_page_size: 500,
    };

    let app = visitlog::build_app(pool.clone(), config, FieldMappings::with_defaults());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind to random port");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .expect("Server failed");
    });

    TestApp {
        addr,
        pool,
        client: Client::new(),
        db_name,
    }
}

/// Drop the test database after tests complete.
pub async fn cleanup(app: TestApp) {
    let db_name = app.db_name.clone();
    app.pool.close().await;

    let base_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for tests");
    let admin_pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&admin_url(&base_url))
        .await
        .expect("Failed to connect for cleanup");

    let _ = sqlx::query(&format!("DROP DATABASE IF EXISTS \"{db_name}\" WITH (FORCE)"))
        .execute(&admin_pool)
        .await;

    admin_pool.close().await;
}
