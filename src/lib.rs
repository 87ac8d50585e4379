//! MockPlug
//!
//! A deterministic HTTP request mocking registry. Requests are reduced to a
//! fingerprint that ignores query-parameter order, header order and any
//! parameters or headers you declare as noise; canned responses are keyed by
//! that fingerprint, and every lookup is recorded for later verification.
//!
//! # Features
//!
//! - **Order-independent matching**: query parameters and headers are sorted before hashing
//! - **Ignore-lists**: drop auth tokens, cache-busters and trace headers from the fingerprint
//! - **Call ledger**: verify a request happened, that any did, or that every mock was used
//! - **Transport interception**: [`MockTransport`] answers from the registry before a real transport
//!
//! # Example
//!
//! ```
//! use mockplug::MockRegistry;
//! use serde_json::json;
//! use std::collections::HashMap;
//!
//! let registry = MockRegistry::new();
//! registry.ignore_query_param("authtoken");
//! registry
//!     .register("GET", "http://api.example.com/pages?id=5&view=full", &HashMap::new(), json!({"title": "Home"}))
//!     .unwrap();
//!
//! let response = registry
//!     .lookup("GET", "http://api.example.com/pages?view=full&authtoken=x&id=5", &HashMap::new())
//!     .unwrap()
//!     .expect("mock matched");
//! assert_eq!(response.body["title"], "Home");
//! assert!(registry.verify_all_called());
//! ```

pub mod config;
pub mod error;
pub mod fingerprint;
pub mod registry;
pub mod response;
pub mod transport;

pub use config::MockPlugConfig;
pub use error::MockPlugError;
pub use fingerprint::Fingerprint;
pub use registry::{MockRegistry, RegistryStats};
pub use response::{MockResponse, TransportMeta};
pub use transport::{MockTransport, PlugRequest, PlugResponse, Transport};
