//! End-to-end tests of the config service: HTTP surface, override store,
//! update channel, and redacted views, driven through registered routes.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::{Method, Request, Response, StatusCode};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time::timeout;

use sentinel_common::config::{Overrider, Schema, SectionConfig, SectionSpec};
use sentinel_common::storage::{MemStorage, StorageService};
use sentinel_core::service::http::{HttpService, Route, RouteError};
use sentinel_core::service::store::{OverrideStore, StoreError, OVERRIDES_NAMESPACE};
use sentinel_core::service::{
    AdapterError, AuditAction, ConfigService, ConfigUpdate, Updatable, UpdateDispatcher,
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct SectionA {
    #[serde(rename = "option-1")]
    option_1: String,
}

impl SectionConfig for SectionA {}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct SectionB {
    #[serde(rename = "option-2")]
    option_2: String,
    password: String,
}

impl SectionConfig for SectionB {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct HandlerConfig {
    name: String,
    url: String,
    timeout_secs: u64,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            url: String::new(),
            timeout_secs: 30,
        }
    }
}

impl SectionConfig for HandlerConfig {}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TestConfig {
    #[serde(rename = "section-a")]
    section_a: SectionA,
    #[serde(rename = "section-b")]
    section_b: SectionB,
    handlers: Vec<HandlerConfig>,
}

fn test_config() -> TestConfig {
    TestConfig {
        section_a: SectionA {
            option_1: "o1".into(),
        },
        section_b: SectionB {
            option_2: "o2".into(),
            password: String::new(),
        },
        handlers: vec![HandlerConfig {
            name: "ops".into(),
            url: "http://ops".into(),
            timeout_secs: 10,
        }],
    }
}

fn schema() -> Schema {
    Schema::new(vec![
        SectionSpec::singleton::<SectionA>("section-a"),
        SectionSpec::singleton::<SectionB>("section-b").redact(&["password"]),
        SectionSpec::list::<HandlerConfig>("handlers", "name"),
    ])
}

/// Route registry standing in for the HTTP daemon.
#[derive(Default)]
struct TestRouter {
    routes: RwLock<Vec<Route>>,
}

impl HttpService for TestRouter {
    fn add_routes(&self, routes: Vec<Route>) -> Result<(), RouteError> {
        self.routes.write().extend(routes);
        Ok(())
    }

    fn del_routes(&self, routes: &[Route]) {
        self.routes.write().retain(|held| {
            !routes
                .iter()
                .any(|r| r.name == held.name && r.method == held.method && r.pattern == held.pattern)
        });
    }
}

impl TestRouter {
    async fn request(&self, method: Method, path: &str, body: &str) -> Response<Bytes> {
        let handler = {
            let routes = self.routes.read();
            routes
                .iter()
                .find(|r| r.method == method && r.pattern == path)
                .or_else(|| {
                    routes.iter().find(|r| {
                        r.method == method
                            && r.pattern.ends_with('/')
                            && path.starts_with(r.pattern)
                    })
                })
                .map(|r| Arc::clone(&r.handler))
        };
        let handler = handler.unwrap_or_else(|| panic!("no route for {method} {path}"));
        let request = Request::builder()
            .method(method)
            .uri(path)
            .body(Bytes::from(body.to_string()))
            .unwrap();
        handler.handle(request).await
    }
}

struct Fixture {
    service: ConfigService,
    router: Arc<TestRouter>,
    storage: Arc<MemStorage>,
    updates: mpsc::Receiver<ConfigUpdate>,
}

fn open_service() -> Fixture {
    let storage = Arc::new(MemStorage::new());
    let router = Arc::new(TestRouter::default());
    let overrider = Overrider::new(&test_config(), schema()).unwrap();
    let service = ConfigService::new(
        overrider,
        Arc::clone(&storage) as Arc<dyn StorageService>,
        Arc::clone(&router) as Arc<dyn HttpService>,
    );
    let updates = service.open().unwrap();
    Fixture {
        service,
        router,
        storage,
        updates,
    }
}

impl Fixture {
    async fn post(&self, path: &str, body: &str) -> Response<Bytes> {
        self.router.request(Method::POST, path, body).await
    }

    async fn get(&self, path: &str) -> (StatusCode, Value) {
        let response = self.router.request(Method::GET, path, "").await;
        let status = response.status();
        let body: Value = serde_json::from_slice(response.body()).unwrap();
        (status, body)
    }

    async fn next_update(&mut self) -> ConfigUpdate {
        timeout(Duration::from_secs(1), self.updates.recv())
            .await
            .expect("timed out waiting for config update")
            .expect("update channel closed")
    }

    fn store(&self) -> OverrideStore {
        OverrideStore::new(self.storage.store(OVERRIDES_NAMESPACE))
    }
}

async fn assert_error(response: Response<Bytes>, status: StatusCode) {
    assert_eq!(response.status(), status, "body: {:?}", response.body());
    let body: Value = serde_json::from_slice(response.body()).unwrap();
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_update_section_publishes_resolved_config() {
    let mut fx = open_service();

    let response = fx
        .post("/config/section-a", r#"{"set":{"option-1": "new-o1"}}"#)
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let update = fx.next_update().await;
    assert_eq!(update.name, "section-a");
    assert_eq!(update.new_config, vec![json!({"option-1": "new-o1"})]);
}

#[tokio::test]
async fn test_get_config_returns_every_section() {
    let fx = open_service();

    let (status, body) = fx.get("/config").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "section-a": {"option-1": "o1"},
            "section-b": {"option-2": "o2", "password": false},
            "handlers": {
                "ops": {"name": "ops", "url": "http://ops", "timeout_secs": 10},
            },
        })
    );
}

#[tokio::test]
async fn test_get_config_reflects_overrides() {
    let mut fx = open_service();
    fx.post("/config/section-a", r#"{"set":{"option-1": "new-o1"}}"#)
        .await;
    fx.next_update().await;

    let (_, body) = fx.get("/config").await;
    assert_eq!(body["section-a"], json!({"option-1": "new-o1"}));
    // Other sections keep their originals.
    assert_eq!(body["section-b"]["option-2"], "o2");
}

#[tokio::test]
async fn test_delete_restores_original_value() {
    let mut fx = open_service();
    fx.post("/config/section-a", r#"{"set":{"option-1": "new-o1"}}"#)
        .await;
    fx.next_update().await;

    let response = fx
        .post("/config/section-a", r#"{"delete":["option-1"]}"#)
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let update = fx.next_update().await;
    assert_eq!(update.new_config, vec![json!({"option-1": "o1"})]);

    let (_, body) = fx.get("/config").await;
    assert_eq!(body["section-a"]["option-1"], "o1");

    // The record is retained as {id, {}} rather than deleted.
    let record = fx.store().get("section-a").unwrap();
    assert!(record.overrides.is_empty());
}

#[tokio::test]
async fn test_redacted_option_never_leaks() {
    let mut fx = open_service();
    let response = fx
        .post("/config/section-b", r#"{"set":{"password": "secret"}}"#)
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    // The channel carries the real value for the subscribing service.
    let update = fx.next_update().await;
    assert_eq!(update.new_config[0]["password"], "secret");

    // The inspection surface only learns that it was set.
    let (_, body) = fx.get("/config").await;
    assert_eq!(body["section-b"]["password"], json!(true));
    assert_eq!(body["section-b"]["option-2"], "o2");
    assert!(!body.to_string().contains("secret"));
}

#[tokio::test]
async fn test_delete_after_set_in_one_request_is_net_removal() {
    let mut fx = open_service();
    fx.post("/config/section-a", r#"{"set":{"option-1": "new-o1"}}"#)
        .await;
    fx.next_update().await;

    let response = fx
        .post(
            "/config/section-a",
            r#"{"set":{"option-1":"deleted"},"delete":["option-1"]}"#,
        )
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    fx.next_update().await;

    let (_, body) = fx.get("/config").await;
    assert_eq!(body["section-a"]["option-1"], "o1");
}

#[tokio::test]
async fn test_unknown_option_is_rejected_and_store_unchanged() {
    let fx = open_service();
    let response = fx
        .post("/config/section-a", r#"{"set":{"option-nonexistent": 1}}"#)
        .await;
    assert_error(response, StatusCode::BAD_REQUEST).await;

    assert!(matches!(
        fx.store().get("section-a"),
        Err(StoreError::NoOverrideExists(_))
    ));
    let (_, body) = fx.get("/config").await;
    assert_eq!(body["section-a"]["option-1"], "o1");
}

#[tokio::test]
async fn test_client_errors_are_400() {
    let fx = open_service();

    // Unknown section.
    let response = fx.post("/config/nope", r#"{"set":{"a": 1}}"#).await;
    assert_error(response, StatusCode::BAD_REQUEST).await;

    // Malformed JSON body.
    let response = fx.post("/config/section-a", "{not json").await;
    assert_error(response, StatusCode::BAD_REQUEST).await;

    // Empty action.
    let response = fx.post("/config/section-a", "{}").await;
    assert_error(response, StatusCode::BAD_REQUEST).await;

    // Missing section name.
    let response = fx.post("/config/", r#"{"set":{"a": 1}}"#).await;
    assert_error(response, StatusCode::BAD_REQUEST).await;

    // Too many path segments.
    let response = fx.post("/config/a/b/c", r#"{"set":{"a": 1}}"#).await;
    assert_error(response, StatusCode::BAD_REQUEST).await;

    // Element path into a singleton section.
    let response = fx
        .post("/config/section-a/x", r#"{"set":{"option-1": "v"}}"#)
        .await;
    assert_error(response, StatusCode::BAD_REQUEST).await;

    // List section without an element path.
    let response = fx
        .post("/config/handlers", r#"{"set":{"url": "http://x"}}"#)
        .await;
    assert_error(response, StatusCode::BAD_REQUEST).await;

    // Coercion failure.
    let response = fx
        .post("/config/section-a", r#"{"set":{"option-1": 42}}"#)
        .await;
    assert_error(response, StatusCode::BAD_REQUEST).await;

    // Unknown section on GET.
    let (status, body) = fx.get("/config/nope").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_get_single_section_and_element() {
    let fx = open_service();

    let (status, body) = fx.get("/config/section-b").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"option-2": "o2", "password": false}));

    let (status, body) = fx.get("/config/handlers/ops").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["url"], "http://ops");

    let (status, _) = fx.get("/config/handlers/ghost").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_element_create_update_remove() {
    let mut fx = open_service();

    // Create at the section path, id from the element-key option.
    let response = fx
        .post(
            "/config/handlers",
            r#"{"create": true, "set":{"name": "sec", "url": "http://sec"}}"#,
        )
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let update = fx.next_update().await;
    assert_eq!(update.name, "handlers");
    // The full resolved element list, ordered by id.
    assert_eq!(update.new_config.len(), 2);
    assert_eq!(update.new_config[0]["name"], "ops");
    assert_eq!(update.new_config[1]["name"], "sec");
    // Created elements are seeded from the section defaults.
    assert_eq!(update.new_config[1]["timeout_secs"], 30);

    // Update the created element through its element path.
    let response = fx
        .post("/config/handlers/sec", r#"{"set":{"url": "http://sec2"}}"#)
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let update = fx.next_update().await;
    assert_eq!(update.new_config[1]["url"], "http://sec2");

    let (_, body) = fx.get("/config/handlers").await;
    assert_eq!(body["sec"]["url"], "http://sec2");

    // Remove it again.
    let response = fx
        .post("/config/handlers/sec", r#"{"remove": true}"#)
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let update = fx.next_update().await;
    assert_eq!(update.new_config.len(), 1);
    assert_eq!(update.new_config[0]["name"], "ops");

    let (_, body) = fx.get("/config/handlers").await;
    assert!(body.get("sec").is_none());
}

#[tokio::test]
async fn test_create_at_element_path_uses_path_id() {
    let mut fx = open_service();

    let response = fx
        .post("/config/handlers/extra", r#"{"create": true}"#)
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let update = fx.next_update().await;
    assert_eq!(update.new_config[0]["name"], "extra");
    assert_eq!(update.new_config[0]["timeout_secs"], 30);

    // A mismatched element-key option is rejected.
    let response = fx
        .post(
            "/config/handlers/one",
            r#"{"create": true, "set":{"name": "two"}}"#,
        )
        .await;
    assert_error(response, StatusCode::BAD_REQUEST).await;
}

#[tokio::test]
async fn test_element_key_cannot_change_after_create() {
    let mut fx = open_service();
    fx.post("/config/handlers/sec", r#"{"create": true}"#).await;
    fx.next_update().await;

    let response = fx
        .post("/config/handlers/sec", r#"{"set":{"name": "renamed"}}"#)
        .await;
    assert_error(response, StatusCode::BAD_REQUEST).await;
}

#[tokio::test]
async fn test_removing_original_element_is_not_durable() {
    let mut fx = open_service();

    // The element comes from the original tree, so the removal only
    // reaches the published snapshot; the next resolve restores it.
    let response = fx.post("/config/handlers/ops", r#"{"remove": true}"#).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let update = fx.next_update().await;
    assert!(update.new_config.is_empty());

    let (_, body) = fx.get("/config/handlers").await;
    assert_eq!(body["ops"]["url"], "http://ops");

    // Removing something that exists nowhere is a client error.
    let response = fx
        .post("/config/handlers/ghost", r#"{"remove": true}"#)
        .await;
    assert_error(response, StatusCode::BAD_REQUEST).await;
}

#[tokio::test]
async fn test_overrides_survive_service_reopen() {
    let mut fx = open_service();
    fx.post("/config/section-a", r#"{"set":{"option-1": "durable"}}"#)
        .await;
    fx.next_update().await;
    fx.service.close();

    // A new service instance over the same storage sees the override.
    let router = Arc::new(TestRouter::default());
    let service = ConfigService::new(
        Overrider::new(&test_config(), schema()).unwrap(),
        Arc::clone(&fx.storage) as Arc<dyn StorageService>,
        Arc::clone(&router) as Arc<dyn HttpService>,
    );
    let _updates = service.open().unwrap();
    let response = router.request(Method::GET, "/config", "").await;
    let body: Value = serde_json::from_slice(response.body()).unwrap();
    assert_eq!(body["section-a"]["option-1"], "durable");
}

#[tokio::test]
async fn test_close_rejects_further_updates() {
    let fx = open_service();
    // Hold the POST handler across close; the daemon normally deregisters
    // it, but an in-flight request can still reach it.
    let handler = {
        let routes = fx.router.routes.read();
        routes
            .iter()
            .find(|r| r.method == Method::POST)
            .map(|r| Arc::clone(&r.handler))
            .unwrap()
    };
    fx.service.close();
    assert!(fx.router.routes.read().is_empty());

    let request = Request::builder()
        .method(Method::POST)
        .uri("/config/section-a")
        .body(Bytes::from(r#"{"set":{"option-1": "x"}}"#.to_string()))
        .unwrap();
    let response = handler.handle(request).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_close_signals_subscribers() {
    let mut fx = open_service();
    fx.service.close();
    assert!(fx.updates.recv().await.is_none());
}

#[tokio::test]
async fn test_audit_trail_records_actions_not_values() {
    let mut fx = open_service();
    fx.post("/config/section-b", r#"{"set":{"password": "secret"}}"#)
        .await;
    fx.next_update().await;
    fx.post("/config/handlers/sec", r#"{"create": true}"#).await;
    fx.next_update().await;
    fx.post("/config/handlers/sec", r#"{"remove": true}"#).await;
    fx.next_update().await;

    let log = fx.service.audit_log();
    let actions: Vec<AuditAction> = log.iter().map(|e| e.action).collect();
    assert_eq!(
        actions,
        vec![AuditAction::Update, AuditAction::Create, AuditAction::Remove]
    );
    assert_eq!(log[0].id, "section-b");
    assert_eq!(log[0].set, vec!["password"]);
    assert!(!serde_json::to_string(&log).unwrap().contains("secret"));
}

#[tokio::test]
async fn test_updates_for_one_section_arrive_in_order() {
    let mut fx = open_service();
    for value in ["a", "b", "c"] {
        let body = format!(r#"{{"set":{{"option-1": "{value}"}}}}"#);
        let response = fx.post("/config/section-a", &body).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }
    for expected in ["a", "b", "c"] {
        let update = fx.next_update().await;
        assert_eq!(update.new_config[0]["option-1"], expected);
    }
}

/// Subscribing service with the standard shape: config behind a
/// readers-writer lock, replaced wholesale by `update`.
struct SectionAService {
    config: RwLock<SectionA>,
}

impl Updatable for SectionAService {
    fn update(&self, new_config: Vec<Value>) -> Result<(), AdapterError> {
        if new_config.len() != 1 {
            return Err(AdapterError::UnexpectedCount(new_config.len()));
        }
        let config: SectionA = serde_json::from_value(new_config[0].clone())
            .map_err(|e| AdapterError::TypeMismatch(e.to_string()))?;
        *self.config.write() = config;
        Ok(())
    }
}

#[tokio::test]
async fn test_dispatcher_feeds_subscribing_service() {
    let fx = open_service();
    let subscriber = Arc::new(SectionAService {
        config: RwLock::new(SectionA::default()),
    });

    let mut dispatcher = UpdateDispatcher::new();
    dispatcher.register("section-a", Arc::clone(&subscriber) as Arc<dyn Updatable>);
    let Fixture {
        service,
        router,
        updates,
        ..
    } = fx;
    let handle = dispatcher.run(updates);

    let response = router
        .request(
            Method::POST,
            "/config/section-a",
            r#"{"set":{"option-1": "live"}}"#,
        )
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    // Closing the service closes the channel and stops the dispatcher.
    service.close();
    timeout(Duration::from_secs(1), handle)
        .await
        .expect("dispatcher did not stop")
        .unwrap();

    assert_eq!(subscriber.config.read().option_1, "live");
}
