//! The config service: runtime configuration over HTTP.
//!
//! The service owns the wiring between four collaborators: the override
//! engine (resolution), the override store (durability), the HTTP daemon
//! (management surface), and the update channel (live reconfiguration).
//!
//! # Request flow
//!
//! ```text
//! POST /config/<section>[/<element>]
//!   decode action ─► merge into record (in memory) ─► dry-run resolve
//!   ─► persist record ─► re-resolve section ─► publish ─► 204
//! ```
//!
//! A resolve failure leaves the store untouched; only the publish can fail
//! after a persist, leaving the store ahead of subscribers until the next
//! successful request. Records are never rolled back.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use dashmap::DashMap;
use http::{Method, Request, Response, StatusCode};
use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use sentinel_common::config::{Element, Override, OverrideError, Overrider};
use sentinel_common::storage::StorageService;

use super::errors::ServiceError;
use super::http::{error_response, json_response, no_content, HttpService, Route, RouteHandler};
use super::store::{OverrideRecord, OverrideStore, StoreError, OVERRIDES_NAMESPACE};
use super::types::{AuditAction, AuditEntry, ConfigUpdate, UpdateAction};

const CONFIG_PATH: &str = "/config";
const CONFIG_PATH_ANCHORED: &str = "/config/";

/// Updates buffered between a slow subscriber and the POST handlers.
pub const UPDATE_CHANNEL_CAPACITY: usize = 64;

const MAX_AUDIT_ENTRIES: usize = 1000;

/// Exposes the configuration tree over the management API and publishes
/// resolved values to subscribing services.
pub struct ConfigService {
    shared: Arc<Shared>,
    storage: Arc<dyn StorageService>,
    http: Arc<dyn HttpService>,
    routes: Mutex<Vec<Route>>,
}

impl ConfigService {
    pub fn new(
        overrider: Overrider,
        storage: Arc<dyn StorageService>,
        http: Arc<dyn HttpService>,
    ) -> Self {
        let element_keys = overrider.element_keys();
        Self {
            shared: Arc::new(Shared {
                overrider,
                element_keys,
                overrides: RwLock::new(None),
                updates: RwLock::new(None),
                section_locks: DashMap::new(),
                audit: RwLock::new(Vec::new()),
            }),
            storage,
            http,
            routes: Mutex::new(Vec::new()),
        }
    }

    /// Open the store namespace, create the update channel, and register
    /// the API routes, in that order. The returned receiver is the only
    /// consumer of published updates.
    pub fn open(&self) -> Result<mpsc::Receiver<ConfigUpdate>, ServiceError> {
        let kv = self.storage.store(OVERRIDES_NAMESPACE);
        *self.shared.overrides.write() = Some(OverrideStore::new(kv));

        let (tx, rx) = mpsc::channel(UPDATE_CHANNEL_CAPACITY);
        *self.shared.updates.write() = Some(tx);

        let routes = vec![
            Route {
                name: "config",
                method: Method::GET,
                pattern: CONFIG_PATH,
                handler: Arc::new(GetConfigHandler {
                    shared: Arc::clone(&self.shared),
                }),
            },
            Route {
                name: "config",
                method: Method::GET,
                pattern: CONFIG_PATH_ANCHORED,
                handler: Arc::new(GetConfigHandler {
                    shared: Arc::clone(&self.shared),
                }),
            },
            Route {
                name: "config",
                method: Method::POST,
                pattern: CONFIG_PATH_ANCHORED,
                handler: Arc::new(UpdateSectionHandler {
                    shared: Arc::clone(&self.shared),
                }),
            },
        ];
        self.http
            .add_routes(routes.clone())
            .map_err(|e| ServiceError::Routes(e.to_string()))?;
        *self.routes.lock() = routes;

        info!("config service opened");
        Ok(rx)
    }

    /// Close the update channel (signaling subscribers to stop) and
    /// deregister the routes. Sends after close are rejected.
    pub fn close(&self) {
        *self.shared.updates.write() = None;
        let routes = std::mem::take(&mut *self.routes.lock());
        if !routes.is_empty() {
            self.http.del_routes(&routes);
        }
        *self.shared.overrides.write() = None;
        info!("config service closed");
    }

    /// Copy of the audit trail, oldest first.
    pub fn audit_log(&self) -> Vec<AuditEntry> {
        self.shared.audit.read().clone()
    }
}

struct Shared {
    overrider: Overrider,
    element_keys: BTreeMap<String, String>,
    overrides: RwLock<Option<OverrideStore>>,
    updates: RwLock<Option<mpsc::Sender<ConfigUpdate>>>,
    section_locks: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
    audit: RwLock<Vec<AuditEntry>>,
}

impl Shared {
    fn overrides_handle(&self) -> Result<OverrideStore, ServiceError> {
        self.overrides.read().clone().ok_or(ServiceError::NotOpen)
    }

    /// Lock serializing the (store-write, resolve, publish) triple for one
    /// section. Element paths share their section's lock.
    fn section_lock(&self, section: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.section_locks
            .entry(section.to_string())
            .or_default()
            .clone()
    }

    fn element_key(&self, section: &str) -> Result<&str, ServiceError> {
        self.element_keys
            .get(section)
            .map(String::as_str)
            .ok_or_else(|| OverrideError::UnknownSection(section.to_string()).into())
    }

    /// Apply one update action and return the section update to publish.
    fn apply_update(
        &self,
        section: &str,
        element: Option<&str>,
        action: &UpdateAction,
    ) -> Result<ConfigUpdate, ServiceError> {
        action.validate()?;
        let store = self.overrides_handle()?;
        let key = self.element_key(section)?.to_string();
        let is_list = !key.is_empty();

        if !is_list && element.is_some() {
            return Err(ServiceError::InvalidRequest(format!(
                "section {section} has no elements"
            )));
        }

        if action.remove {
            return self.apply_remove(&store, section, element);
        }

        let id = match (action.create, element) {
            (true, _) => {
                if !is_list {
                    return Err(ServiceError::InvalidRequest(format!(
                        "cannot create elements in singleton section {section}"
                    )));
                }
                let from_set = action.set.get(&key).and_then(Value::as_str);
                let element_id = match (element, from_set) {
                    (Some(path), Some(set)) if path != set => {
                        return Err(ServiceError::InvalidRequest(format!(
                            "element key option {key} does not match the path element"
                        )));
                    }
                    (Some(path), _) => path.to_string(),
                    (None, Some(set)) => set.to_string(),
                    (None, None) => {
                        return Err(ServiceError::InvalidRequest(format!(
                            "create requires the element key option {key}"
                        )));
                    }
                };
                format!("{section}/{element_id}")
            }
            (false, Some(element)) => {
                if action.set.contains_key(&key) {
                    return Err(ServiceError::InvalidRequest(format!(
                        "cannot override element key {key}"
                    )));
                }
                format!("{section}/{element}")
            }
            (false, None) => {
                if is_list {
                    return Err(ServiceError::InvalidRequest(format!(
                        "section {section} requires an element path"
                    )));
                }
                section.to_string()
            }
        };

        let mut record = match store.get(&id) {
            Ok(record) => record,
            Err(StoreError::NoOverrideExists(_)) => OverrideRecord::new(&id),
            Err(e) => return Err(e.into()),
        };
        if action.create {
            record.create = true;
            let (_, element_id) = split_id(&id);
            record.overrides.insert(
                key.clone(),
                Value::String(element_id.unwrap_or_default().to_string()),
            );
        }
        for (name, value) in &action.set {
            record.overrides.insert(name.clone(), value.clone());
        }
        for name in &action.delete {
            record.overrides.remove(name);
        }

        // Dry-run: a resolve failure must leave the store untouched.
        let request = self.record_to_request(&record).ok_or_else(|| {
            ServiceError::Override(OverrideError::UnknownSection(section.to_string()))
        })?;
        self.overrider.apply(&request)?;

        debug!(id = %record.id, "setting override");
        store.set(&record)?;
        self.audit(AuditEntry {
            timestamp: Utc::now(),
            id: record.id.clone(),
            action: if action.create {
                AuditAction::Create
            } else {
                AuditAction::Update
            },
            set: action.set.keys().cloned().collect(),
            deleted: action.delete.clone(),
        });

        let requests = self.section_requests(&store, section, None)?;
        let snapshot = self.overrider.apply_all(&requests)?;
        Ok(update_for(section, snapshot))
    }

    /// Remove a list element: drop its record, and splice it out of the
    /// published snapshot when it exists in the original tree. Elements
    /// from the original tree reappear on the next resolve — override
    /// records are the only durable state.
    fn apply_remove(
        &self,
        store: &OverrideStore,
        section: &str,
        element: Option<&str>,
    ) -> Result<ConfigUpdate, ServiceError> {
        let element = element.ok_or_else(|| {
            ServiceError::InvalidRequest("remove requires an element path".into())
        })?;
        let id = format!("{section}/{element}");

        let existed = match store.get(&id) {
            Ok(_) => true,
            Err(StoreError::NoOverrideExists(_)) => false,
            Err(e) => return Err(e.into()),
        };
        let in_original = self.overrider.has_element(section, element)?;
        if !existed && !in_original {
            return Err(OverrideError::UnknownElement {
                section: section.to_string(),
                element: element.to_string(),
            }
            .into());
        }

        let mut requests = self.section_requests(store, section, Some(&id))?;
        if in_original {
            requests.push(Override::remove_element(section, element));
        }
        let snapshot = self.overrider.apply_all(&requests)?;

        store.delete(&id)?;
        self.audit(AuditEntry {
            timestamp: Utc::now(),
            id,
            action: AuditAction::Remove,
            set: Vec::new(),
            deleted: Vec::new(),
        });
        Ok(update_for(section, snapshot))
    }

    /// Point-in-time resolved snapshot of every declared section.
    fn resolved_snapshot(&self) -> Result<BTreeMap<String, Vec<Element>>, ServiceError> {
        let store = self.overrides_handle()?;
        let mut requests = Vec::new();
        for record in store.list()? {
            match self.record_to_request(&record) {
                Some(request) => requests.push(request),
                None => warn!(id = %record.id, "skipping override record with unknown section"),
            }
        }
        Ok(self.overrider.apply_all(&requests)?)
    }

    /// Fully redacted nested view: `{section: {option: value}}` for
    /// singletons, `{section: {element-id: {option: value}}}` for lists.
    fn render_config(&self) -> Result<Map<String, Value>, ServiceError> {
        let snapshot = self.resolved_snapshot()?;
        let mut rendered = Map::new();
        for (name, elements) in snapshot {
            let is_list = self
                .element_keys
                .get(&name)
                .map(|key| !key.is_empty())
                .unwrap_or(false);
            if is_list {
                let mut by_id = Map::new();
                for element in elements {
                    let id = element.element_id().unwrap_or_default().to_string();
                    by_id.insert(id, Value::Object(element.redacted()));
                }
                rendered.insert(name, Value::Object(by_id));
            } else {
                let options = elements
                    .first()
                    .map(Element::redacted)
                    .unwrap_or_default();
                rendered.insert(name, Value::Object(options));
            }
        }
        Ok(rendered)
    }

    /// All stored requests for one section, optionally excluding one id.
    fn section_requests(
        &self,
        store: &OverrideStore,
        section: &str,
        exclude: Option<&str>,
    ) -> Result<Vec<Override>, ServiceError> {
        let mut requests = Vec::new();
        for record in store.list()? {
            if Some(record.id.as_str()) == exclude {
                continue;
            }
            let (record_section, _) = split_id(&record.id);
            if record_section != section {
                continue;
            }
            if let Some(request) = self.record_to_request(&record) {
                requests.push(request);
            }
        }
        Ok(requests)
    }

    /// Translate a stored record into an engine request. Records created
    /// at runtime re-create their element; the element id then comes from
    /// the element-key option they carry.
    fn record_to_request(&self, record: &OverrideRecord) -> Option<Override> {
        let (section, element) = split_id(&record.id);
        if !self.element_keys.contains_key(section) {
            return None;
        }
        Some(Override {
            section: section.to_string(),
            element: if record.create {
                String::new()
            } else {
                element.unwrap_or_default().to_string()
            },
            options: record.overrides.clone(),
            create: record.create,
            delete: false,
        })
    }

    async fn publish(&self, update: ConfigUpdate) -> Result<(), ServiceError> {
        let sender = self.updates.read().clone().ok_or(ServiceError::NotOpen)?;
        debug!(section = %update.name, "publishing config update");
        sender
            .send(update)
            .await
            .map_err(|_| ServiceError::ChannelClosed)
    }

    fn audit(&self, entry: AuditEntry) {
        let mut log = self.audit.write();
        log.push(entry);
        if log.len() > MAX_AUDIT_ENTRIES {
            let drain = log.len() - MAX_AUDIT_ENTRIES;
            log.drain(0..drain);
        }
    }
}

fn update_for(section: &str, mut snapshot: BTreeMap<String, Vec<Element>>) -> ConfigUpdate {
    let elements = snapshot.remove(section).unwrap_or_default();
    ConfigUpdate {
        name: section.to_string(),
        new_config: elements.into_iter().map(Element::into_value).collect(),
    }
}

fn split_id(id: &str) -> (&str, Option<&str>) {
    match id.split_once('/') {
        Some((section, element)) => (section, Some(element)),
        None => (id, None),
    }
}

/// `/config[/<section>[/<element>]]` into its segments.
fn parse_path(path: &str) -> Result<(Option<String>, Option<String>), ServiceError> {
    let rest = path.strip_prefix(CONFIG_PATH).unwrap_or(path);
    let rest = rest.trim_matches('/');
    if rest.is_empty() {
        return Ok((None, None));
    }
    let mut parts = rest.split('/');
    let section = parts.next().unwrap_or_default().to_string();
    let element = parts.next().map(str::to_string);
    if parts.next().is_some() {
        return Err(ServiceError::InvalidRequest(format!(
            "invalid config path {path}"
        )));
    }
    Ok((Some(section), element))
}

struct GetConfigHandler {
    shared: Arc<Shared>,
}

#[async_trait]
impl RouteHandler for GetConfigHandler {
    async fn handle(&self, request: Request<Bytes>) -> Response<Bytes> {
        let (section, element) = match parse_path(request.uri().path()) {
            Ok(parsed) => parsed,
            Err(e) => return error_response(e.status(), &e.to_string()),
        };
        let mut rendered = match self.shared.render_config() {
            Ok(rendered) => rendered,
            Err(e) => return error_response(e.status(), &e.to_string()),
        };

        let section = match section {
            None => return json_response(StatusCode::OK, &rendered),
            Some(section) => section,
        };
        let section_view = match rendered.remove(&section) {
            Some(view) => view,
            None => {
                let e = ServiceError::Override(OverrideError::UnknownSection(section));
                return error_response(e.status(), &e.to_string());
            }
        };
        match element {
            None => json_response(StatusCode::OK, &section_view),
            Some(element) => match section_view.get(&element) {
                Some(view) => json_response(StatusCode::OK, view),
                None => {
                    let e = ServiceError::Override(OverrideError::UnknownElement {
                        section,
                        element,
                    });
                    error_response(e.status(), &e.to_string())
                }
            },
        }
    }
}

struct UpdateSectionHandler {
    shared: Arc<Shared>,
}

#[async_trait]
impl RouteHandler for UpdateSectionHandler {
    async fn handle(&self, request: Request<Bytes>) -> Response<Bytes> {
        let (section, element) = match parse_path(request.uri().path()) {
            Ok(parsed) => parsed,
            Err(e) => return error_response(e.status(), &e.to_string()),
        };
        let section = match section {
            Some(section) => section,
            None => {
                return error_response(StatusCode::BAD_REQUEST, "must provide section name");
            }
        };
        let action: UpdateAction = match serde_json::from_slice(request.body()) {
            Ok(action) => action,
            Err(e) => {
                let e = ServiceError::Decode(e.to_string());
                return error_response(e.status(), &e.to_string());
            }
        };

        // Updates to the same section must not interleave their store
        // write with each other's publish.
        let lock = self.shared.section_lock(&section);
        let _guard = lock.lock().await;

        let update = match self
            .shared
            .apply_update(&section, element.as_deref(), &action)
        {
            Ok(update) => update,
            Err(e) => return error_response(e.status(), &e.to_string()),
        };
        match self.shared.publish(update).await {
            Ok(()) => no_content(),
            Err(e) => error_response(e.status(), &e.to_string()),
        }
    }
}
