//! Runtime configuration engine for the sentinel server.
//!
//! The engine takes a statically-declared configuration tree, applies
//! user-supplied overrides on top of it, and hands the resolved values back
//! to the running services. The tree itself is an ordinary Rust struct with
//! serde derives; the engine interprets exactly two levels of it:
//!
//! - *Section level*: top-level fields declared in a [`Schema`]. A section
//!   is either a single nested struct (singleton) or a `Vec` of structs
//!   keyed by one string field (list-valued).
//! - *Option level*: the fields of each section struct, named by their
//!   serde names (the same names the on-disk TOML file uses).
//!
//! Deeper nesting is carried along untouched.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        Override Flow                             │
//! │                                                                  │
//! │  Typed tree        JSON working copy          Resolved section   │
//! │  (immutable)  ───► (cloned per call,    ───►  (typed again via   │
//! │                     walked + coerced)          serde decode)     │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use serde::{Deserialize, Serialize};
//! use sentinel_common::config::{Override, Overrider, Schema, SectionConfig, SectionSpec};
//!
//! #[derive(Debug, Clone, Default, Serialize, Deserialize)]
//! struct SlackConfig {
//!     channel: String,
//!     token: String,
//! }
//!
//! impl SectionConfig for SlackConfig {}
//!
//! #[derive(Debug, Serialize, Deserialize)]
//! struct ServerConfig {
//!     slack: SlackConfig,
//! }
//!
//! let config = ServerConfig {
//!     slack: SlackConfig { channel: "#alerts".into(), token: "secret".into() },
//! };
//! let schema = Schema::new(vec![
//!     SectionSpec::singleton::<SlackConfig>("slack").redact(&["token"]),
//! ]);
//! let overrider = Overrider::new(&config, schema).unwrap();
//!
//! let resolved = overrider
//!     .apply(&Override::section("slack").set("channel", "#ops"))
//!     .unwrap()
//!     .unwrap();
//! assert_eq!(resolved.value()["channel"], "#ops");
//! // The original tree is untouched.
//! assert_eq!(overrider.sections().unwrap()["slack"][0].value()["channel"], "#alerts");
//! ```

pub mod coerce;
pub mod errors;
pub mod loader;
mod redact;
pub mod schema;
mod walk;

mod overrider;

pub use coerce::{coerce, CoerceError};
pub use errors::OverrideError;
pub use loader::{load_file, LoadError};
pub use overrider::{Element, Override, Overrider};
pub use schema::{Schema, SectionConfig, SectionSpec, ValidationError};
