//! Integration tests for the card platform API
//!
//! These tests drive the full router against a temporary database:
//! - Card ownership and device-based access
//! - Share link creation, viewing and deletion
//! - Admin batch generation and link moderation
//! - The NFC claim page flow

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tempfile::NamedTempFile;
use tower::ServiceExt;

use cardfolio::config::Config;
use cardfolio::database::{init_db, AppState};
use cardfolio::model::Role;
use cardfolio::route::create_app;

/// Helper function to create a test application with a temporary database
fn setup_test_app() -> (Router, AppState, NamedTempFile) {
    let temp_db = NamedTempFile::new().expect("Failed to create temp file");
    let db_path = temp_db.path().to_str().unwrap();

    let db = init_db(db_path).expect("Failed to initialize test database");
    let state = AppState::new(db, Config::default());
    let app = create_app(state.clone());

    (app, state, temp_db)
}

/// Sends a request and returns the status and JSON body (`Null` when empty)
async fn call(
    app: &Router,
    method: &str,
    uri: &str,
    cookie: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header("cookie", cookie);
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("Failed to read response body")
        .to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("Failed to parse JSON")
    };
    (status, json)
}

/// Registers a user and returns its session cookie
async fn sign_up(app: &Router, username: &str) -> String {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/register")
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({
                        "username": username,
                        "email": format!("{}@example.com", username),
                        "password": "correct-horse"
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    session_cookie(&response)
}

fn session_cookie(response: &axum::response::Response) -> String {
    response
        .headers()
        .get("set-cookie")
        .expect("session cookie")
        .to_str()
        .unwrap()
        .split(';')
        .next()
        .unwrap()
        .to_string()
}

/// Seeds an admin account directly and logs it in
async fn admin_session(app: &Router, state: &AppState) -> String {
    state
        .users
        .create("root", "root@example.com", "admin-password", Role::Admin)
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/login")
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({ "username": "root", "password": "admin-password" }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    session_cookie(&response)
}

fn sample_card() -> Value {
    json!({
        "firstName": "Jane",
        "lastName": "Doe",
        "jobTitle": "Engineer",
        "company": "Acme",
        "email": "jane@acme.test",
        "website": "https://acme.test",
        "bio": "Builds things.",
        "socialMedia": [{ "platform": "GitHub", "url": "https://github.com/jane" }],
        "template": "Modern"
    })
}

async fn create_card(app: &Router, cookie: &str) -> u64 {
    let (status, body) = call(
        app,
        "POST",
        "/api/business-cards",
        Some(cookie),
        Some(sample_card()),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["id"].as_u64().unwrap()
}

#[tokio::test]
async fn test_create_link_and_view_counts() {
    let (app, _state, _temp_db) = setup_test_app();
    let cookie = sign_up(&app, "jane").await;
    let card_id = create_card(&app, &cookie).await;

    let (status, link) = call(
        &app,
        "POST",
        "/api/public-links",
        Some(&cookie),
        Some(json!({ "businessCardId": card_id, "uniqueSlug": "jane-doe" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(link["uniqueSlug"], "jane-doe");
    assert_eq!(link["isActive"], true);
    assert_eq!(link["isPreGenerated"], false);
    assert_eq!(link["viewCount"], 0);
    assert_eq!(link["url"], "http://localhost:8080/card/jane-doe");

    for _ in 0..3 {
        let (status, card) = call(&app, "GET", "/api/public-links/jane-doe", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(card["firstName"], "Jane");
        assert_eq!(card["template"], "Modern");
        assert!(card.get("deviceId").is_none());
        assert!(card.get("userId").is_none());
    }

    let uri = format!("/api/public-links/by-card/{}", card_id);
    let (status, links) = call(&app, "GET", &uri, Some(&cookie), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(links.as_array().unwrap().len(), 1);
    assert_eq!(links[0]["viewCount"], 3);
}

#[tokio::test]
async fn test_create_link_duplicate_slug() {
    let (app, _state, _temp_db) = setup_test_app();
    let cookie = sign_up(&app, "jane").await;
    let card_id = create_card(&app, &cookie).await;
    let payload = json!({ "businessCardId": card_id, "uniqueSlug": "taken" });

    let (status, _) = call(
        &app,
        "POST",
        "/api/public-links",
        Some(&cookie),
        Some(payload.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = call(
        &app,
        "POST",
        "/api/public-links",
        Some(&cookie),
        Some(payload),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "slug_conflict");
}

#[tokio::test]
async fn test_create_link_random_slug() {
    let (app, _state, _temp_db) = setup_test_app();
    let cookie = sign_up(&app, "jane").await;
    let card_id = create_card(&app, &cookie).await;

    let (status, link) = call(
        &app,
        "POST",
        "/api/public-links",
        Some(&cookie),
        Some(json!({ "businessCardId": card_id, "uniqueSlug": "" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(link["uniqueSlug"].as_str().unwrap().len(), 10);
}

#[tokio::test]
async fn test_create_link_requires_card_owner() {
    let (app, _state, _temp_db) = setup_test_app();
    let owner = sign_up(&app, "owner").await;
    let intruder = sign_up(&app, "intruder").await;
    let card_id = create_card(&app, &owner).await;
    let payload = json!({ "businessCardId": card_id });

    let (status, _) = call(&app, "POST", "/api/public-links", None, Some(payload.clone())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = call(
        &app,
        "POST",
        "/api/public-links",
        Some(&intruder),
        Some(payload),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "forbidden");
}

#[tokio::test]
async fn test_view_unknown_slug() {
    let (app, _state, _temp_db) = setup_test_app();

    let (status, body) = call(&app, "GET", "/api/public-links/nonexistent", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "not_found");
}

#[tokio::test]
async fn test_delete_card_cascades_to_links() {
    let (app, _state, _temp_db) = setup_test_app();
    let cookie = sign_up(&app, "jane").await;
    let card_id = create_card(&app, &cookie).await;

    for slug in ["first-link", "second-link"] {
        let (status, _) = call(
            &app,
            "POST",
            "/api/public-links",
            Some(&cookie),
            Some(json!({ "businessCardId": card_id, "uniqueSlug": slug })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let uri = format!("/api/business-cards/{}", card_id);
    let (status, _) = call(&app, "DELETE", &uri, Some(&cookie), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    for slug in ["first-link", "second-link"] {
        let uri = format!("/api/public-links/{}", slug);
        let (status, _) = call(&app, "GET", &uri, None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}

#[tokio::test]
async fn test_owner_deletes_link() {
    let (app, _state, _temp_db) = setup_test_app();
    let cookie = sign_up(&app, "jane").await;
    let card_id = create_card(&app, &cookie).await;

    let (_, link) = call(
        &app,
        "POST",
        "/api/public-links",
        Some(&cookie),
        Some(json!({ "businessCardId": card_id, "uniqueSlug": "short-lived" })),
    )
    .await;

    let uri = format!("/api/public-links/{}", link["id"]);
    let (status, _) = call(&app, "DELETE", &uri, Some(&cookie), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = call(&app, "GET", "/api/public-links/short-lived", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_card_update_validation_and_access() {
    let (app, _state, _temp_db) = setup_test_app();
    let owner = sign_up(&app, "owner").await;
    let other = sign_up(&app, "other").await;
    let card_id = create_card(&app, &owner).await;
    let uri = format!("/api/business-cards/{}", card_id);

    let (status, body) = call(
        &app,
        "PUT",
        &uri,
        Some(&owner),
        Some(json!({ "bio": "x".repeat(201) })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_argument");

    let (status, _) = call(
        &app,
        "PUT",
        &uri,
        Some(&other),
        Some(json!({ "company": "Evil" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, card) = call(
        &app,
        "PUT",
        &uri,
        Some(&owner),
        Some(json!({ "company": "Globex", "phone": "" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(card["company"], "Globex");
    assert_eq!(card["firstName"], "Jane");
    assert!(card["phone"].is_null());
}

#[tokio::test]
async fn test_auto_save_by_device() {
    let (app, _state, _temp_db) = setup_test_app();

    let (status, _) = call(
        &app,
        "POST",
        "/api/business-cards/auto-save",
        None,
        Some(json!({ "firstName": "Anon" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, card) = call(
        &app,
        "POST",
        "/api/business-cards/auto-save",
        None,
        Some(json!({ "deviceId": "device-123", "firstName": "Anon" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(card["template"], "Classic");
    let card_id = card["id"].as_u64().unwrap();

    let (status, card) = call(
        &app,
        "POST",
        "/api/business-cards/auto-save",
        None,
        Some(json!({ "deviceId": "device-123", "company": "Initech" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(card["id"].as_u64().unwrap(), card_id);
    assert_eq!(card["firstName"], "Anon");
    assert_eq!(card["company"], "Initech");

    let (status, card) = call(
        &app,
        "GET",
        "/api/business-cards?deviceId=device-123",
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(card["id"].as_u64().unwrap(), card_id);

    let uri = format!("/api/business-cards/{}", card_id);
    let (status, _) = call(&app, "GET", &uri, None, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let uri = format!("/api/business-cards/{}?deviceId=device-123", card_id);
    let (status, _) = call(&app, "GET", &uri, None, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_device_id_does_not_unlock_owned_card() {
    let (app, _state, _temp_db) = setup_test_app();
    let owner = sign_up(&app, "owner").await;

    let mut payload = sample_card();
    payload["deviceId"] = json!("dev-owned");
    let (status, card) = call(
        &app,
        "POST",
        "/api/business-cards",
        Some(&owner),
        Some(payload),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let card_id = card["id"].as_u64().unwrap();

    let (status, body) = call(
        &app,
        "POST",
        "/api/business-cards/auto-save",
        None,
        Some(json!({ "deviceId": "dev-owned", "firstName": "Hijacked" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "unauthorized");

    let intruder = sign_up(&app, "intruder").await;
    let (status, _) = call(
        &app,
        "POST",
        "/api/business-cards/auto-save",
        Some(&intruder),
        Some(json!({ "deviceId": "dev-owned", "firstName": "Hijacked" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let uri = "/api/business-cards?deviceId=dev-owned";
    let (status, _) = call(&app, "GET", uri, None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, card) = call(&app, "GET", uri, Some(&owner), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(card["id"].as_u64().unwrap(), card_id);
    assert_eq!(card["firstName"], "Jane");

    let (status, card) = call(
        &app,
        "POST",
        "/api/business-cards/auto-save",
        Some(&owner),
        Some(json!({ "deviceId": "dev-owned", "company": "Globex" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(card["id"].as_u64().unwrap(), card_id);
    assert_eq!(card["firstName"], "Jane");
    assert_eq!(card["company"], "Globex");
}

#[tokio::test]
async fn test_batch_generate_bounds_and_shape() {
    let (app, state, _temp_db) = setup_test_app();
    let admin = admin_session(&app, &state).await;

    for count in [-5i64, 0, 1001, 10_000_000_000] {
        let (status, body) = call(
            &app,
            "POST",
            "/api/admin/generate-links",
            Some(&admin),
            Some(json!({ "count": count })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "invalid_argument");
    }

    let (status, body) = call(
        &app,
        "POST",
        "/api/admin/generate-links",
        Some(&admin),
        Some(json!({ "count": 10, "prefix": "conf" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let slugs = body["slugs"].as_array().unwrap();
    assert_eq!(slugs.len(), 10);
    for slug in slugs {
        let slug = slug.as_str().unwrap();
        let suffix = slug.strip_prefix("conf-").expect("prefixed slug");
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_alphanumeric()));
    }
    for link in body["links"].as_array().unwrap() {
        assert!(link["businessCardId"].is_null());
        assert_eq!(link["isPreGenerated"], true);
        assert_eq!(link["isClaimed"], false);
    }

    let (status, unassigned) = call(
        &app,
        "GET",
        "/api/admin/unassigned-links",
        Some(&admin),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(unassigned.as_array().unwrap().len(), 10);
}

#[tokio::test]
async fn test_admin_routes_are_guarded() {
    let (app, _state, _temp_db) = setup_test_app();
    let user = sign_up(&app, "regular").await;
    let payload = json!({ "count": 1 });

    let (status, _) = call(
        &app,
        "POST",
        "/api/admin/generate-links",
        None,
        Some(payload.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = call(
        &app,
        "POST",
        "/api/admin/generate-links",
        Some(&user),
        Some(payload),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = call(&app, "GET", "/api/admin/users", Some(&user), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_claim_flow_with_template() {
    let (app, state, _temp_db) = setup_test_app();
    let admin = admin_session(&app, &state).await;

    let (status, template) = call(
        &app,
        "POST",
        "/api/admin/template-cards",
        Some(&admin),
        Some(sample_card()),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(template["isTemplate"], true);

    let (_, batch) = call(
        &app,
        "POST",
        "/api/admin/generate-links",
        Some(&admin),
        Some(json!({ "count": 1, "prefix": "evt", "templateId": template["id"] })),
    )
    .await;
    let slug = batch["slugs"][0].as_str().unwrap().to_string();
    let status_uri = format!("/api/nfc-links/{}", slug);
    let claim_uri = format!("/api/nfc-links/{}/claim", slug);

    let (status, info) = call(&app, "GET", &status_uri, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(info["isClaimed"], false);
    assert_eq!(info["isPreGenerated"], true);
    assert_eq!(info["templateCard"]["company"], "Acme");

    let view_uri = format!("/api/public-links/{}", slug);
    let (status, _) = call(&app, "GET", &view_uri, None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call(&app, "POST", &claim_uri, None, Some(json!({}))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let claimant = sign_up(&app, "claimant").await;
    let (status, claimed) = call(&app, "POST", &claim_uri, Some(&claimant), Some(json!({}))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(claimed["link"]["isClaimed"], true);
    assert_eq!(claimed["card"]["company"], "Acme");
    assert_eq!(claimed["card"]["isTemplate"], false);
    assert_ne!(claimed["businessCardId"], template["id"]);

    let (status, card) = call(&app, "GET", &view_uri, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(card["id"], claimed["businessCardId"]);

    let rival = sign_up(&app, "rival").await;
    let (status, body) = call(&app, "POST", &claim_uri, Some(&rival), Some(json!({}))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "already_claimed");

    let (_, info) = call(&app, "GET", &status_uri, None, None).await;
    assert_eq!(info["isClaimed"], true);
}

#[tokio::test]
async fn test_deactivated_link_is_hidden() {
    let (app, state, _temp_db) = setup_test_app();
    let admin = admin_session(&app, &state).await;

    let (_, batch) = call(
        &app,
        "POST",
        "/api/admin/generate-links",
        Some(&admin),
        Some(json!({ "count": 1 })),
    )
    .await;
    let link_id = batch["links"][0]["id"].as_u64().unwrap();
    let slug = batch["slugs"][0].as_str().unwrap().to_string();

    let uri = format!("/api/admin/public-links/{}", link_id);
    let (status, link) = call(
        &app,
        "PATCH",
        &uri,
        Some(&admin),
        Some(json!({ "isActive": false })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(link["isActive"], false);

    let (status, body) = call(&app, "GET", &format!("/api/nfc-links/{}", slug), None, None).await;
    assert_eq!(status, StatusCode::GONE);
    assert_eq!(body["code"], "link_inactive");

    let (status, _) = call(&app, "GET", &format!("/api/public-links/{}", slug), None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let claimant = sign_up(&app, "claimant").await;
    let (status, body) = call(
        &app,
        "POST",
        &format!("/api/nfc-links/{}/claim", slug),
        Some(&claimant),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::GONE);
    assert_eq!(body["code"], "link_inactive");

    let (_, unassigned) = call(
        &app,
        "GET",
        "/api/admin/unassigned-links",
        Some(&admin),
        None,
    )
    .await;
    assert!(unassigned.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_ad_hoc_link_is_not_claimable() {
    let (app, _state, _temp_db) = setup_test_app();
    let cookie = sign_up(&app, "jane").await;
    let card_id = create_card(&app, &cookie).await;
    call(
        &app,
        "POST",
        "/api/public-links",
        Some(&cookie),
        Some(json!({ "businessCardId": card_id, "uniqueSlug": "mine" })),
    )
    .await;

    let (status, body) = call(&app, "POST", "/api/nfc-links/mine/claim", Some(&cookie), None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "not_claimable");

    let (status, body) = call(
        &app,
        "POST",
        "/api/nfc-links/missing/claim",
        Some(&cookie),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "not_found");
}

#[tokio::test]
async fn test_admin_deletes_user_with_cards() {
    let (app, state, _temp_db) = setup_test_app();
    let admin = admin_session(&app, &state).await;
    let cookie = sign_up(&app, "leaving").await;
    let card_id = create_card(&app, &cookie).await;
    call(
        &app,
        "POST",
        "/api/public-links",
        Some(&cookie),
        Some(json!({ "businessCardId": card_id, "uniqueSlug": "bye" })),
    )
    .await;

    let (_, me) = call(&app, "GET", "/api/user", Some(&cookie), None).await;
    let uri = format!("/api/admin/users/{}", me["id"]);
    let (status, _) = call(&app, "DELETE", &uri, Some(&admin), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = call(&app, "GET", "/api/public-links/bye", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = call(&app, "GET", "/api/user", Some(&cookie), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(state.cards.list_all().await.unwrap().is_empty());
}
