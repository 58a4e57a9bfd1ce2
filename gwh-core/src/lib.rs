//! Core engine for the generic admission webhook: a typed expression
//! language over JSON documents, a JSON-Patch builder that extends RFC 6902
//! with evaluated values and per-element repetition, and the compiler that
//! turns a `GenericWebhookConfig` YAML document into an immutable rule tree.
//!
//! # Example
//!
//! ```
//! use serde_json::json;
//!
//! let manifest = gwh_core::config::from_yaml(r#"
//! apiVersion: generic-webhook/v1beta1
//! kind: GenericWebhookConfig
//! webhooks:
//!   - name: deny-big-deployments
//!     path: /deployments
//!     actions:
//!       - condition: ".spec.replicas > 10"
//!         accept: false
//! "#).unwrap();
//!
//! let deployment = json!({"spec": {"replicas": 50}});
//! let (accept, patch) = manifest.webhooks()[0].process(&deployment).unwrap();
//! assert!(!accept);
//! assert!(patch.0.is_empty());
//! ```

pub mod admission;

pub mod config;
pub use config::Dialect;

pub mod error;
pub use error::{EvalError, ParseError};

pub mod expr;

pub mod operators;
pub use operators::Operator;

pub mod patch;
pub use patch::PatchOp;

pub mod path;
pub use path::Path;

pub mod value;
pub use value::Contexts;

pub mod webhook;
pub use webhook::{Action, Manifest, Webhook};
