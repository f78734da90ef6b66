//! sls-compose
//!
//! Composes declarative serverless service descriptions (REST paths,
//! methods, WebSocket routes, SNS subscriptions) into a fully wired
//! CloudFormation resource graph.

pub mod compose;
pub mod declaration;
pub mod error;
pub mod resource;

pub use compose::{Composition, ServerlessDecl};
pub use declaration::ServiceFile;
pub use error::{ComposeError, DeclarationError, InvariantViolation, Result};
pub use resource::{OutputFormat, Template};
