/// End-to-end tests driving the HTTP router against an in-memory store
use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use jsonwebtoken::{encode, EncodingKey, Header};
use lectern::{
    auth::Claims,
    config::{AccessConfig, AuthConfig, LoggingConfig, ServerConfig, ServiceConfig, StorageConfig},
    server::build_router,
    store::MemoryStore,
    AppContext,
};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tower::ServiceExt;

const SECRET: &str = "integration-secret-0123456789abcdef";

fn config() -> ServerConfig {
    ServerConfig {
        service: ServiceConfig {
            hostname: "127.0.0.1".to_string(),
            port: 0,
            version: "test".to_string(),
        },
        storage: StorageConfig {
            data_directory: PathBuf::from("./data"),
            database: PathBuf::from("./data/lectern.sqlite"),
            max_connections: 1,
        },
        authentication: AuthConfig {
            jwt_secret: SECRET.to_string(),
            admin_ids: vec!["root".to_string()],
        },
        access: AccessConfig { fail_open: true },
        logging: LoggingConfig {
            level: "info".to_string(),
            json: false,
        },
    }
}

fn token(sub: &str, role: Option<&str>) -> String {
    let claims = Claims {
        sub: sub.to_string(),
        role: role.map(str::to_string),
        exp: (chrono::Utc::now().timestamp() + 3600) as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

async fn app() -> (Router, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    store.add_chapter("ch1").await;
    store.add_course("c1", Some("ch1"), true, 100).await;
    store.add_course("c2", None, true, 100).await;
    store.link_course_to_chapter("ch1", "c2").await;
    store.add_course("free", None, true, 0).await;
    store.add_lesson("l1", Some("c1"), Some(2), None).await;

    let ctx = AppContext::with_store(config(), store.clone());
    (build_router(ctx), store)
}

async fn call(app: &Router, method: &str, uri: &str, bearer: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(bearer) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", bearer));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

#[tokio::test]
async fn test_health_is_public() {
    let (app, _) = app().await;
    let (status, body) = call(&app, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_content_requires_token() {
    let (app, _) = app().await;
    let (status, body) = call(&app, "GET", "/api/content/lesson/l1/access", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "AuthenticationRequired");
}

#[tokio::test]
async fn test_view_limit_grants_exactly_n_opens() {
    let (app, store) = app().await;
    let learner = token("learner-1", None);
    let signals = json!({ "user_agent": "Mozilla/5.0 (X11; Linux x86_64) Firefox/128.0" });

    for _ in 0..2 {
        let (status, body) = call(&app, "POST", "/api/content/lesson/l1/open", Some(&learner), Some(signals.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["allowed"], true);
    }

    let (status, body) = call(&app, "POST", "/api/content/lesson/l1/open", Some(&learner), Some(signals)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["allowed"], false);
    assert_eq!(body["decision"]["canView"], false);
    assert_eq!(store.event_count().await, 2);

    let (_, body) = call(&app, "GET", "/api/content/lesson/l1/access", Some(&learner), None).await;
    assert_eq!(body["viewCount"], 2);
    assert_eq!(body["allowed"], false);

    // Another learner has their own history
    let other = token("learner-2", None);
    let (_, body) = call(&app, "GET", "/api/content/lesson/l1/access", Some(&other), None).await;
    assert_eq!(body["allowed"], true);
}

#[tokio::test]
async fn test_unknown_content_kind_is_rejected() {
    let (app, _) = app().await;
    let learner = token("learner-1", None);
    let (status, _) = call(&app, "GET", "/api/content/video/v1/access", Some(&learner), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_paid_chapter_invoice_enrolls_member_courses() {
    let (app, store) = app().await;
    let teacher = token("teacher-1", Some("teacher"));

    let (status, invoice) = call(
        &app,
        "POST",
        "/api/invoices",
        Some(&teacher),
        Some(json!({
            "learner_id": "learner-1",
            "item_id": "ch1",
            "item_type": "chapter",
            "total_price": 200,
            "payment_type": "cash"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(invoice["status"], "pending");
    assert_eq!(invoice["instructor_id"], "teacher-1");
    let id = invoice["id"].as_str().unwrap().to_string();

    let (status, change) = call(
        &app,
        "POST",
        &format!("/api/invoices/{}/status", id),
        Some(&teacher),
        Some(json!({ "status": "paid" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(change["invoice"]["status"], "paid");
    assert_eq!(change["provisioning"]["result"], "granted");
    assert!(change["warnings"].as_array().unwrap().is_empty());

    let courses: Vec<String> = store
        .enrollments_for("learner-1")
        .await
        .into_iter()
        .map(|e| e.course_id)
        .collect();
    assert_eq!(courses, vec!["c1".to_string(), "c2".to_string()]);
    assert_eq!(store.chapter_enrollments_for("learner-1").await.len(), 1);

    // Cancelling a paid invoice is not a valid transition
    let (status, body) = call(
        &app,
        "POST",
        &format!("/api/invoices/{}/status", id),
        Some(&teacher),
        Some(json!({ "status": "cancelled" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "InvalidTransition");
}

#[tokio::test]
async fn test_teachers_only_see_their_invoices() {
    let (app, _) = app().await;
    let owner = token("teacher-1", Some("teacher"));
    let stranger = token("teacher-2", Some("teacher"));
    let admin = token("root", None);

    let (_, invoice) = call(
        &app,
        "POST",
        "/api/invoices",
        Some(&owner),
        Some(json!({
            "learner_id": "learner-1",
            "item_id": "c1",
            "item_type": "course",
            "total_price": 100,
            "payment_type": "card"
        })),
    )
    .await;
    let id = invoice["id"].as_str().unwrap().to_string();

    let (status, _) = call(&app, "GET", &format!("/api/invoices/{}", id), Some(&stranger), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, list) = call(&app, "GET", "/api/invoices", Some(&stranger), None).await;
    assert!(list["invoices"].as_array().unwrap().is_empty());

    let (status, fetched) = call(&app, "GET", &format!("/api/invoices/{}", id), Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["invoice_number"], invoice["invoice_number"]);

    let (_, list) = call(&app, "GET", "/api/invoices?status=pending", Some(&owner), None).await;
    assert_eq!(list["invoices"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_learners_cannot_manage_invoices() {
    let (app, _) = app().await;
    let learner = token("learner-1", None);
    let (status, body) = call(&app, "GET", "/api/invoices", Some(&learner), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "Forbidden");
}

#[tokio::test]
async fn test_wallet_top_up_applies_once() {
    let (app, _) = app().await;
    let admin = token("root", None);
    let learner = token("learner-1", None);

    let (_, invoice) = call(
        &app,
        "POST",
        "/api/invoices",
        Some(&admin),
        Some(json!({
            "learner_id": "learner-1",
            "instructor_id": "teacher-1",
            "item_id": "credit-pack-50",
            "item_type": "credits",
            "total_price": 50,
            "payment_type": "card",
            "credits_amount": 50
        })),
    )
    .await;
    let id = invoice["id"].as_str().unwrap().to_string();

    for _ in 0..2 {
        let (status, _) = call(
            &app,
            "POST",
            &format!("/api/invoices/{}/status", id),
            Some(&admin),
            Some(json!({ "status": "paid" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, wallet) = call(&app, "GET", "/api/wallet", Some(&learner), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(wallet["credits"], 50);
    assert_eq!(wallet["ai_minutes"], 0);
}

#[tokio::test]
async fn test_manual_grant_and_self_enroll() {
    let (app, store) = app().await;
    let teacher = token("teacher-1", Some("teacher"));
    let learner = token("learner-1", None);

    let (status, result) = call(
        &app,
        "POST",
        "/api/enrollments/grant",
        Some(&teacher),
        Some(json!({ "learner_id": "learner-1", "item_id": "l1", "item_type": "lesson" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result["success"], true);

    let (_, result) = call(
        &app,
        "POST",
        "/api/enrollments/grant",
        Some(&teacher),
        Some(json!({ "learner_id": "learner-1", "item_id": "credits", "item_type": "credits" })),
    )
    .await;
    assert_eq!(result["success"], false);

    let (status, grant) = call(&app, "POST", "/api/courses/free/enroll", Some(&learner), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(grant["status"], "enrolled");

    let (status, _) = call(&app, "POST", "/api/courses/c2/enroll", Some(&learner), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let courses: Vec<String> = store
        .enrollments_for("learner-1")
        .await
        .into_iter()
        .map(|e| e.course_id)
        .collect();
    assert_eq!(courses, vec!["c1".to_string(), "free".to_string()]);
}

#[tokio::test]
async fn test_unknown_route_is_json_404() {
    let (app, _) = app().await;
    let (status, body) = call(&app, "GET", "/nope", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "NotFound");
}
