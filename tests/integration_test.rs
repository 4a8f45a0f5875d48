use axum::http::StatusCode;
use cashout::api::{self, AppState};
use cashout::config::{Config, WithdrawConfig};
use cashout::db::{init_db, EarningSource};
use cashout::engine::messages;
use cashout::fulfillment::MockFulfillment;
use cashout::orchestration::{Collaborators, WithdrawalOrchestrator};
use cashout::{GainId, Repository, SqliteLedger};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::util::ServiceExt;

struct TestApp {
    router: axum::Router,
    repo: Arc<Repository>,
    ledger: Arc<SqliteLedger>,
    _temp_dir: TempDir,
}

async fn setup_test_app(vendor: MockFulfillment) -> TestApp {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir
        .path()
        .join("test.db")
        .to_string_lossy()
        .to_string();

    let pool = init_db(&db_path).await.expect("init_db failed");
    let repo = Arc::new(Repository::new(pool.clone()));
    let ledger = Arc::new(SqliteLedger::new(pool));

    let config = Config {
        port: 0,
        database_path: db_path,
        giftcard_api_url: "http://example.invalid".to_string(),
        giftcard_api_key: None,
        withdraw: WithdrawConfig {
            retry_base_delay: Duration::from_millis(1),
            fulfillment_timeout: Duration::from_millis(200),
            ..Default::default()
        },
    };

    let orchestrator = Arc::new(WithdrawalOrchestrator::new(
        Collaborators {
            standing: repo.clone(),
            earnings: repo.clone(),
            ledger: ledger.clone(),
            records: repo.clone(),
            fulfillment: Arc::new(vendor),
            notifications: repo.clone(),
        },
        config.withdraw.clone(),
    ));
    let state = AppState::new(repo.clone(), config, orchestrator);

    TestApp {
        router: api::create_router(state),
        repo,
        ledger,
        _temp_dir: temp_dir,
    }
}

async fn seed_account(app: &TestApp, id: &str, balance: i64, earned: i64) -> GainId {
    let account = GainId::new(id.to_string());
    app.ledger.open_account(&account, balance).await.unwrap();
    app.repo
        .record_earning(&account, EarningSource::Video, earned)
        .await
        .unwrap();
    account
}

fn withdraw_request(gainid: Option<&str>, body: &str) -> axum::http::Request<axum::body::Body> {
    let mut builder = axum::http::Request::builder()
        .method("POST")
        .uri("/v1/withdrawals/giftcard")
        .header("content-type", "application/json");
    if let Some(id) = gainid {
        builder = builder.header("x-gainid", id);
    }
    builder.body(axum::body::Body::from(body.to_string())).unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = setup_test_app(MockFulfillment::new()).await;

    let request = axum::http::Request::builder()
        .method("GET")
        .uri("/health")
        .body(axum::body::Body::empty())
        .unwrap();

    let response = app.router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "ok");
}

#[tokio::test]
async fn test_ready_endpoint_checks_database() {
    let app = setup_test_app(MockFulfillment::new()).await;

    let request = axum::http::Request::builder()
        .method("GET")
        .uri("/ready")
        .body(axum::body::Body::empty())
        .unwrap();

    let response = app.router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "ready");
}

#[tokio::test]
async fn test_withdraw_pending_over_http() {
    let app = setup_test_app(MockFulfillment::new()).await;
    seed_account(&app, "http-user", 500, 250).await;

    let response = app
        .router
        .clone()
        .oneshot(withdraw_request(
            Some("http-user"),
            r#"{"type":"Steam","coinAmount":"100","requestId":"r-1"}"#,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["state"], "pending_approval");
    assert_eq!(body["attemptId"].as_str().map(str::len), Some(32));

    let events = body["events"].as_array().unwrap();
    assert_eq!(events[0], json!({"event": "withdrawalPending", "payload": {"coins": 100}}));
    assert_eq!(events[1]["event"], "withdrawFeedback");
    assert_eq!(events[1]["payload"]["message"], messages::PENDING_REVIEW);
    assert_eq!(events[1]["payload"]["category"], "Steam");
    assert_eq!(events[2], json!({"event": "balanceUpdate", "payload": {"balance": 400}}));

    let request = axum::http::Request::builder()
        .method("GET")
        .uri("/v1/withdrawals")
        .header("x-gainid", "http-user")
        .body(axum::body::Body::empty())
        .unwrap();
    let response = app.router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    let withdrawals = body["withdrawals"].as_array().unwrap();
    assert_eq!(withdrawals.len(), 1);
    assert_eq!(withdrawals[0]["status"], "pending");
    assert_eq!(withdrawals[0]["coinAmount"], 100);
    assert_eq!(withdrawals[0]["countryCode"], "WW");
}

#[tokio::test]
async fn test_withdraw_without_identity_is_refused() {
    let app = setup_test_app(MockFulfillment::new()).await;

    let response = app
        .router
        .oneshot(withdraw_request(None, r#"{"type":"Visa","coinAmount":100}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["state"], "rejected");
    assert!(body["attemptId"].is_null());
    assert_eq!(body["events"][0]["payload"]["message"], messages::NOT_AUTHORIZED);
}

#[tokio::test]
async fn test_malformed_body_reports_unknown_error() {
    let app = setup_test_app(MockFulfillment::new()).await;
    seed_account(&app, "http-user", 500, 250).await;

    for body in ["", "null", "not json", "42"] {
        let response = app
            .router
            .clone()
            .oneshot(withdraw_request(Some("http-user"), body))
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["events"][0]["payload"]["message"], messages::UNKNOWN, "body {:?}", body);
    }

    assert_eq!(app.ledger.movements(&GainId::new("http-user".into())).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_mistyped_card_or_country_asks_for_refresh() {
    let app = setup_test_app(MockFulfillment::new()).await;
    seed_account(&app, "http-user", 500, 250).await;

    for body in [
        r#"{"type":5,"coinAmount":100}"#,
        r#"{"type":"Steam","coinAmount":100,"countryCode":7}"#,
    ] {
        let response = app
            .router
            .clone()
            .oneshot(withdraw_request(Some("http-user"), body))
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["state"], "rejected");
        assert_eq!(json["events"][0]["payload"]["message"], messages::REFRESH, "body {:?}", body);
    }

    assert_eq!(app.ledger.movements(&GainId::new("http-user".into())).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_completed_withdrawal_exposes_code_to_owner_only() {
    let app = setup_test_app(MockFulfillment::new().issuing("CODE-123")).await;
    let account = seed_account(&app, "verified-user", 500, 250).await;
    app.repo.set_identity_verified(&account, true).await.unwrap();

    let response = app
        .router
        .clone()
        .oneshot(withdraw_request(
            Some("verified-user"),
            r#"{"type":"Amazon","coinAmount":200,"countryCode":"US"}"#,
        ))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["state"], "completed");
    assert_eq!(body["events"][0], json!({"event": "withdrawalSuccess", "payload": {"coins": 200}}));

    let request = axum::http::Request::builder()
        .method("GET")
        .uri("/v1/withdrawals")
        .header("x-gainid", "verified-user")
        .body(axum::body::Body::empty())
        .unwrap();
    let body = body_json(app.router.clone().oneshot(request).await.unwrap()).await;
    assert_eq!(body["withdrawals"][0]["cardCode"], "CODE-123");
    assert_eq!(body["withdrawals"][0]["countryCode"], "US");

    let request = axum::http::Request::builder()
        .method("GET")
        .uri("/v1/withdrawals")
        .header("x-gainid", "someone-else")
        .body(axum::body::Body::empty())
        .unwrap();
    let body = body_json(app.router.oneshot(request).await.unwrap()).await;
    assert!(body["withdrawals"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_list_withdrawals_requires_identity() {
    let app = setup_test_app(MockFulfillment::new()).await;

    let request = axum::http::Request::builder()
        .method("GET")
        .uri("/v1/withdrawals")
        .body(axum::body::Body::empty())
        .unwrap();
    let response = app.router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(body_json(response).await["error"].is_string());
}
