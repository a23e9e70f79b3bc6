use std::sync::{Arc, Mutex};

use axum::{extract::State, http::StatusCode as AxumStatus, routing::post, Json, Router};
use reqwest::StatusCode;
use serde_json::{json, Value};

use carlot_infra::AppConfig;

const PUBLIC_HOST: &str = "http://sales.test";

/// Fake payment provider: records every request and answers with a fresh payment id,
/// or with a 500 when `failing` is set.
#[derive(Clone, Default)]
struct FakeProvider {
    requests: Arc<Mutex<Vec<Value>>>,
    failing: bool,
}

async fn create_payment(State(provider): State<FakeProvider>, Json(body): Json<Value>) -> axum::response::Response {
    use axum::response::IntoResponse;

    if provider.failing {
        return (AxumStatus::INTERNAL_SERVER_ERROR, "provider down").into_response();
    }
    let mut requests = provider.requests.lock().unwrap();
    requests.push(body.clone());
    let payment_id = format!("pay_{}", requests.len());
    Json(json!({
        "payment_id": payment_id,
        "webhook_url": body["webhook_url"],
        "status": body["status"],
        "amount": body["amount"],
    }))
    .into_response()
}

struct Spawned {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl Drop for Spawned {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn spawn_router(app: Router) -> Spawned {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind ephemeral port");
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    Spawned {
        base_url: format!("http://{}", addr),
        handle,
    }
}

struct TestServer {
    base_url: String,
    provider: FakeProvider,
    _api: Spawned,
    _provider: Spawned,
}

impl TestServer {
    async fn spawn(failing_provider: bool) -> Self {
        let provider = FakeProvider {
            failing: failing_provider,
            ..FakeProvider::default()
        };
        let provider_srv = spawn_router(
            Router::new()
                .route("/payments", post(create_payment))
                .with_state(provider.clone()),
        )
        .await;

        let payments_host = provider_srv.base_url.clone();
        let config = AppConfig::from_lookup(|key| match key {
            "VEHICLE_PLATFORM_PAYMENTS_HOST" => Some(payments_host.clone()),
            "VEHICLE_PLATFORM_SALES_HOST" => Some(PUBLIC_HOST.to_string()),
            _ => None,
        })
        .unwrap();

        // Same router as prod, bound to an ephemeral port.
        let services = carlot_api::app::services::build_services(&config).await.unwrap();
        let api = spawn_router(carlot_api::app::build_app(Arc::new(services))).await;

        Self {
            base_url: api.base_url.clone(),
            provider,
            _api: api,
            _provider: provider_srv,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn provider_requests(&self) -> Vec<Value> {
        self.provider.requests.lock().unwrap().clone()
    }
}

async fn create_vehicle(client: &reqwest::Client, srv: &TestServer, brand: &str, price: f64) -> Value {
    let res = client
        .post(srv.url("/vehicles"))
        .json(&json!({
            "brand": brand,
            "model": "Hatch",
            "year": 2018,
            "color": "white",
            "price": price,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    res.json().await.unwrap()
}

async fn webhook(client: &reqwest::Client, srv: &TestServer, payment_id: &str, status: &str) -> reqwest::Response {
    client
        .post(srv.url("/sales/webhook"))
        .json(&json!({"payment_id": payment_id, "status": status}))
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn health_is_public() {
    let srv = TestServer::spawn(false).await;
    let res = reqwest::get(srv.url("/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn purchase_and_reconciliation_lifecycle() {
    let srv = TestServer::spawn(false).await;
    let client = reqwest::Client::new();

    let vehicle = create_vehicle(&client, &srv, "Fiat", 20000.0).await;
    let id = vehicle["vehicle_id"].as_str().unwrap().to_string();

    // Purchase
    let res = client
        .post(srv.url(&format!("/vehicles/{id}/buy")))
        .json(&json!({"buyer_document_number": "B1"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let bought: Value = res.json().await.unwrap();
    assert_eq!(bought["vehicle_id"], vehicle["vehicle_id"]);

    let requests = srv.provider_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0]["amount"], json!(20000.0));
    assert_eq!(requests[0]["status"], "APPROVED");
    assert_eq!(requests[0]["webhook_url"], format!("{PUBLIC_HOST}/sales/webhook"));

    // Second purchase while pending
    let res = client
        .post(srv.url(&format!("/vehicles/{id}/buy")))
        .json(&json!({"buyer_document_number": "B2"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "already_sold");
    assert_eq!(srv.provider_requests().len(), 1);

    // Pending sale is listed
    let pending: Vec<Value> = client
        .get(srv.url("/sales?status=PENDING"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0]["payment_id"], "pay_1");
    assert!(pending[0]["sold_at"].is_null());

    // Not sold until approved
    let sold: Vec<Value> = client
        .get(srv.url("/vehicles?is_sold=true"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(sold.is_empty());

    // Approval
    assert_eq!(webhook(&client, &srv, "pay_1", "APPROVED").await.status(), StatusCode::NO_CONTENT);
    let sales: Vec<Value> = client.get(srv.url("/sales")).send().await.unwrap().json().await.unwrap();
    assert_eq!(sales[0]["status"], "APPROVED");
    let sold_at = sales[0]["sold_at"].as_str().unwrap().to_string();

    let sold: Vec<Value> = client
        .get(srv.url("/vehicles?is_sold=true"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(sold.len(), 1);
    assert_eq!(sold[0]["vehicle_id"], vehicle["vehicle_id"]);

    // Late cancel and redelivery are no-ops
    assert_eq!(webhook(&client, &srv, "pay_1", "CANCELED").await.status(), StatusCode::NO_CONTENT);
    assert_eq!(webhook(&client, &srv, "pay_1", "APPROVED").await.status(), StatusCode::NO_CONTENT);
    let sales: Vec<Value> = client.get(srv.url("/sales")).send().await.unwrap().json().await.unwrap();
    assert_eq!(sales[0]["status"], "APPROVED");
    assert_eq!(sales[0]["sold_at"].as_str().unwrap(), sold_at);
}

#[tokio::test]
async fn webhook_rejects_unknown_payment_and_status() {
    let srv = TestServer::spawn(false).await;
    let client = reqwest::Client::new();

    let res = webhook(&client, &srv, "pay_unknown", "APPROVED").await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = webhook(&client, &srv, "pay_unknown", "PAID").await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "invalid_status");

    let res = client.get(srv.url("/sales?status=approved")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn provider_failure_is_bad_gateway_and_writes_nothing() {
    let srv = TestServer::spawn(true).await;
    let client = reqwest::Client::new();

    let vehicle = create_vehicle(&client, &srv, "Renault", 9000.0).await;
    let id = vehicle["vehicle_id"].as_str().unwrap();

    let res = client
        .post(srv.url(&format!("/vehicles/{id}/buy")))
        .json(&json!({"buyer_document_number": "B1"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);

    let sales: Vec<Value> = client.get(srv.url("/sales")).send().await.unwrap().json().await.unwrap();
    assert!(sales.is_empty());
}

#[tokio::test]
async fn catalog_validation_lookup_and_patch() {
    let srv = TestServer::spawn(false).await;
    let client = reqwest::Client::new();

    let res = client
        .post(srv.url("/vehicles"))
        .json(&json!({"brand": "VW", "model": "Gol", "year": 1700, "color": "red", "price": 100.0}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = client.get(srv.url("/vehicles/not-a-uuid")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = client
        .get(srv.url("/vehicles/01890a5d-ac96-774b-bcce-b302099a8057"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let cheap = create_vehicle(&client, &srv, "Kia", 8000.0).await;
    let dear = create_vehicle(&client, &srv, "BMW", 80000.0).await;
    let dear_id = dear["vehicle_id"].as_str().unwrap();

    let res = client
        .patch(srv.url(&format!("/vehicles/{dear_id}")))
        .json(&json!({"price": 5000.0}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let patched: Value = res.json().await.unwrap();
    assert_eq!(patched["price"], json!(5000.0));
    assert_eq!(patched["brand"], "BMW");

    let all: Vec<Value> = client.get(srv.url("/vehicles")).send().await.unwrap().json().await.unwrap();
    let ids: Vec<&Value> = all.iter().map(|v| &v["vehicle_id"]).collect();
    assert_eq!(ids, vec![&dear["vehicle_id"], &cheap["vehicle_id"]]);

    let res = client.get(srv.url("/vehicles?is_sold=maybe")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}
