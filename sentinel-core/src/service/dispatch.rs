//! Delivery of published configuration updates to running services.
//!
//! Each subscribing service exposes an [`Updatable`] hook. The dispatcher
//! owns the receiving end of the config service's update channel and hands
//! every message to the service registered for its section. The channel
//! closing (service shutdown) stops the dispatcher task.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::types::ConfigUpdate;

/// Reasons a service can reject a configuration update.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("expected a single config object, got {0}")]
    UnexpectedCount(usize),

    #[error("config type mismatch: {0}")]
    TypeMismatch(String),

    #[error("update rejected: {0}")]
    Rejected(String),
}

/// A service that reconfigures itself at runtime.
///
/// `update` replaces the service's configuration and returns; it must be
/// idempotent and must never block on the network. Singleton sections
/// receive exactly one value; list-valued sections receive the full
/// resolved element list. Services validate the dynamic shape by decoding
/// the values and reject mismatches.
pub trait Updatable: Send + Sync {
    fn update(&self, new_config: Vec<Value>) -> Result<(), AdapterError>;
}

/// Routes [`ConfigUpdate`]s to the services that own each section.
#[derive(Default)]
pub struct UpdateDispatcher {
    services: HashMap<String, Arc<dyn Updatable>>,
}

impl UpdateDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the service owning `section`.
    pub fn register(&mut self, section: impl Into<String>, service: Arc<dyn Updatable>) {
        self.services.insert(section.into(), service);
    }

    /// Drain the update channel until it closes.
    pub fn run(self, mut updates: mpsc::Receiver<ConfigUpdate>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(update) = updates.recv().await {
                match self.services.get(&update.name) {
                    Some(service) => match service.update(update.new_config) {
                        Ok(()) => debug!(section = %update.name, "applied config update"),
                        Err(e) => {
                            error!(section = %update.name, error = %e, "service rejected config update")
                        }
                    },
                    None => debug!(section = %update.name, "no service registered for section"),
                }
            }
            info!("config update channel closed, stopping dispatcher");
        })
    }
}
