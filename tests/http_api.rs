use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode};
use lims_approval::api::{AppState, build_router};
use lims_approval::config::AppConfig;
use lims_approval::service::PendingScope;
use lims_approval::store::SledRepository;
use serde_json::{Value, json};
use tower::util::ServiceExt;

fn test_config() -> AppConfig {
    AppConfig {
        rust_env: "test".to_string(),
        api_host: "127.0.0.1".to_string(),
        api_port: 0,
        db_path: "unused".to_string(),
        max_conflict_retries: 8,
        pending_scope: PendingScope::All,
        default_page_size: 10,
        max_page_size: 50,
    }
}

fn app_with(config: AppConfig) -> Router {
    let repo = SledRepository::temporary().unwrap();
    build_router(AppState::new(config, repo))
}

fn app() -> Router {
    app_with(test_config())
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    headers: &[(&str, &str)],
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    for (k, v) in headers {
        builder = builder.header(*k, *v);
    }
    let req = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let res = app.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

async fn create_entrustment_flow(app: &Router) -> u64 {
    let (status, body) = send(
        app,
        Method::POST,
        "/approval/flow",
        &[],
        Some(json!({
            "flow": {"name": "entrustment-approval", "code": "ENT", "business_type": "entrustment"},
            "nodes": [
                {"nodeName": "Dept Head", "approverType": "dept", "approverIds": "3"},
                {"name": "QA Manager", "approver_type": "role", "approver_ids": [5]}
            ]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    body["data"]["flow"]["id"].as_u64().unwrap()
}

#[tokio::test]
async fn health_reports_env() {
    let (status, body) = send(&app(), Method::GET, "/health", &[], None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["env"], "test");
}

#[tokio::test]
async fn full_approval_over_http() {
    let app = app();
    create_entrustment_flow(&app).await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/approval/start",
        &[],
        Some(json!({
            "businessType": "entrustment",
            "businessId": 42,
            "businessNo": "WT20240101001",
            "initiatorId": 7,
            "initiatorName": "Alice"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["code"], "OK");
    assert_eq!(body["data"]["status"], "pending");
    assert_eq!(body["data"]["current_node_order"], 1);
    let record_id = body["data"]["id"].as_u64().unwrap();

    // approver identity from gateway headers
    let (status, body) = send(
        &app,
        Method::POST,
        "/approval/do",
        &[("x-user-id", "9"), ("x-user-name", "Bob")],
        Some(json!({"recordId": record_id, "action": "approve", "comment": "ok"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["current_node_order"], 2);

    let (status, body) = send(
        &app,
        Method::POST,
        "/approval/do",
        &[],
        Some(json!({
            "record_id": record_id,
            "approver_id": 11,
            "approver_name": "Carol",
            "action": "approve"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["status"], "approved");

    let (status, body) = send(
        &app,
        Method::GET,
        &format!("/approval/record/{record_id}"),
        &[],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let logs = body["data"]["logs"].as_array().unwrap();
    let trail: Vec<_> = logs
        .iter()
        .map(|l| (l["action"].as_str().unwrap(), l["approver_name"].as_str().unwrap()))
        .collect();
    assert_eq!(
        trail,
        vec![("submit", "Alice"), ("approve", "Bob"), ("approve", "Carol")]
    );

    let (status, body) = send(
        &app,
        Method::POST,
        "/approval/do",
        &[("x-user-id", "9")],
        Some(json!({"recordId": record_id, "action": "reject"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "RECORD_ALREADY_CLOSED");
    assert!(body["data"].is_null());
}

#[tokio::test]
async fn start_without_flow_is_unprocessable() {
    let (status, body) = send(
        &app(),
        Method::POST,
        "/approval/start",
        &[("x-user-id", "7"), ("x-user-name", "Alice")],
        Some(json!({"businessType": "contract", "businessId": 1, "businessNo": "HT1"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "FLOW_NOT_CONFIGURED");
}

#[tokio::test]
async fn unknown_action_and_missing_actor_are_rejected() {
    let app = app();
    let (status, body) = send(
        &app,
        Method::POST,
        "/approval/do",
        &[("x-user-id", "9")],
        Some(json!({"recordId": 1, "action": "escalate"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_ACTION");

    let (status, body) = send(
        &app,
        Method::POST,
        "/approval/do",
        &[],
        Some(json!({"recordId": 1, "action": "approve"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "ACTOR_UNRESOLVED");

    let (status, body) = send(
        &app,
        Method::GET,
        "/approval/record/999",
        &[],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "RECORD_NOT_FOUND");
}

#[tokio::test]
async fn flow_admin_endpoints() {
    let app = app();
    let flow_id = create_entrustment_flow(&app).await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/approval/flow",
        &[],
        Some(json!({
            "flow": {"name": "second", "code": "ENT2", "business_type": "entrustment"},
            "nodes": []
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "DUPLICATE_ENABLED_FLOW");

    let (status, body) = send(
        &app,
        Method::PUT,
        &format!("/approval/flow/{flow_id}"),
        &[],
        Some(json!({
            "flow": {"name": "entrustment-approval", "code": "ENT", "business_type": "entrustment"},
            "nodes": [{"name": "Director", "approver_type": "user", "approver_ids": "1"}]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let (_, body) = send(&app, Method::GET, &format!("/approval/flow/{flow_id}"), &[], None).await;
    let nodes = body["data"]["nodes"].as_array().unwrap();
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0]["name"], "Director");
    assert_eq!(nodes[0]["order"], 1);
    assert_eq!(nodes[0]["approver_type"], "user");

    let (status, body) = send(
        &app,
        Method::PUT,
        &format!("/approval/flow/{flow_id}/status?enabled=false"),
        &[],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["enabled"], false);

    let (status, body) = send(
        &app,
        Method::POST,
        "/approval/flow",
        &[],
        Some(json!({
            "flow": {"name": "bad", "code": "B", "business_type": "bad"},
            "nodes": [{"name": "x", "approver_type": "group", "approver_ids": "1"}]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_SELECTOR");

    let (status, _) = send(&app, Method::DELETE, &format!("/approval/flow/{flow_id}"), &[], None).await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = send(&app, Method::GET, "/approval/flow/list", &[], None).await;
    assert!(body["data"].as_array().unwrap().is_empty());

    let (status, body) = send(&app, Method::GET, &format!("/approval/flow/{flow_id}"), &[], None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "FLOW_NOT_FOUND");
}

#[tokio::test]
async fn cancel_and_paged_queries() {
    let app = app_with(AppConfig {
        default_page_size: 2,
        ..test_config()
    });
    create_entrustment_flow(&app).await;

    let mut ids = Vec::new();
    for n in 0..3 {
        let (_, body) = send(
            &app,
            Method::POST,
            "/approval/start",
            &[("x-user-id", "7"), ("x-user-name", "Alice")],
            Some(json!({"businessType": "entrustment", "businessId": n, "businessNo": format!("WT{n}")})),
        )
        .await;
        ids.push(body["data"]["id"].as_u64().unwrap());
    }

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/approval/record/{}/cancel", ids[0]),
        &[],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "cancelled");

    let (_, body) = send(&app, Method::GET, "/approval/initiated?userId=7", &[], None).await;
    assert_eq!(body["data"]["total"], 3);
    assert_eq!(body["data"]["size"], 2);
    let page: Vec<_> = body["data"]["records"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["id"].as_u64().unwrap())
        .collect();
    assert_eq!(page, vec![ids[2], ids[1]]);

    let (_, body) = send(
        &app,
        Method::GET,
        "/approval/pending?current=1&size=500",
        &[("x-user-id", "9")],
        None,
    )
    .await;
    assert_eq!(body["data"]["total"], 2);
    assert_eq!(body["data"]["size"], 50);

    let (status, body) = send(&app, Method::GET, "/approval/pending", &[], None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "ACTOR_UNRESOLVED");
}

#[tokio::test]
async fn eligible_scope_uses_header_roles() {
    let app = app_with(AppConfig {
        pending_scope: PendingScope::Eligible,
        ..test_config()
    });
    create_entrustment_flow(&app).await;
    send(
        &app,
        Method::POST,
        "/approval/start",
        &[("x-user-id", "7"), ("x-user-name", "Alice")],
        Some(json!({"businessType": "entrustment", "businessId": 1, "businessNo": "WT1"})),
    )
    .await;

    let (_, body) = send(
        &app,
        Method::GET,
        "/approval/pending",
        &[("x-user-id", "9"), ("x-user-dept", "3")],
        None,
    )
    .await;
    assert_eq!(body["data"]["total"], 1);

    let (_, body) = send(
        &app,
        Method::GET,
        "/approval/pending",
        &[("x-user-id", "11"), ("x-user-roles", "5")],
        None,
    )
    .await;
    assert_eq!(body["data"]["total"], 0);
}
