//! Resource abstraction layer
//!
//! This module stands in for the resource schema library: it knows which
//! resource kinds exist, which attributes they expose, and how a finished
//! graph is serialized.
//!
//! # Architecture
//!
//! - [`registry`] - Loads and caches kind definitions from embedded JSON
//! - [`value`] - Symbolic property values and deploy-time tokens
//! - [`template`] - The resource graph, identifier allocation, rendering
//!
//! # Kind Definitions
//!
//! Kinds are defined in JSON files under `src/resources/`:
//! - `apigateway.json` - REST and WebSocket API Gateway kinds
//! - `lambda.json` - Functions and invoke permissions
//! - `iam.json` - Execution roles
//! - `storage.json` - Buckets, log groups, SNS
//!
//! # Example
//!
//! ```
//! use sls_compose::props;
//! use sls_compose::resource::{Template, REST_API};
//!
//! let mut template = Template::new();
//! let api = template.add("Api", REST_API, props! { "Name" => "dev-svc" }, vec![]).unwrap();
//! assert!(api.attr("RootResourceId").is_ok());
//! ```

pub mod registry;
pub mod template;
pub mod value;

pub use registry::*;
pub use template::{Output, OutputFormat, ResourceRecord, ResourceRef, Template};
pub use value::{Props, Pseudo, Value};
