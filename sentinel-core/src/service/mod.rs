pub mod config;
pub mod dispatch;
pub mod errors;
pub mod http;
pub mod store;
pub mod types;

// Re-export main interfaces
pub use config::ConfigService;
pub use dispatch::{AdapterError, Updatable, UpdateDispatcher};
pub use errors::ServiceError;
pub use http::{HttpService, Route, RouteHandler};
pub use store::{OverrideRecord, OverrideStore, StoreError};
pub use types::*;
