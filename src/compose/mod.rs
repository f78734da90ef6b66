//! Topology composer
//!
//! Turns a service declaration into a wired resource graph.
//!
//! # Architecture
//!
//! - [`ident`] - Stable and volatile logical identifiers
//! - [`modification`] - Caller hooks on every synthesized node
//! - [`path`] / [`method`] - REST resource trees, methods, CORS
//! - [`deps`] - Deployment dependency collection
//! - [`shared`] - Role, WebSocket API and authorizer shared across functions
//! - [`http`], [`websocket`], [`sns`] - Per-function event topologies
//! - [`function`], [`serverless`] - Function and service entry points
//!
//! # Example
//!
//! ```
//! use sls_compose::compose::{FunctionDecl, HttpDecl, Method, PathDecl, ServerlessDecl};
//!
//! # fn main() -> sls_compose::Result<()> {
//! let function = FunctionDecl::from_bucket("api", "code/api.zip", "index.handler", "nodejs18.x")?
//!     .http(HttpDecl::new().cors(true).path(PathDecl::parse("/users/{id}")?.method(Method::Get)?));
//! let composition = ServerlessDecl::new("users").function(function)?.build()?;
//! assert!(composition.template.get("MethodusersIdVarGET").is_some());
//! # Ok(())
//! # }
//! ```

pub mod deps;
pub mod function;
pub mod http;
pub mod ident;
pub mod method;
pub mod modification;
pub mod path;
pub mod serverless;
pub mod shared;
pub mod sns;
pub mod websocket;

pub use function::{FunctionCode, FunctionDecl, RoleBinding, ServerlessFunction};
pub use http::{BasePathMappingDecl, Http, HttpDecl};
pub use ident::{SequentialSuffix, UuidSuffix, VolatileIdSource};
pub use method::{AuthDescriptor, CorsConfig, Method, MethodDecl, MethodNode};
pub use modification::{Modification, OptionalModification, Outcome};
pub use path::{PathDecl, PathNode, PathSegment, PathSpec};
pub use serverless::{Composition, DeploymentBucket, PrivateConfig, Serverless, ServerlessDecl};
pub use shared::{AuthorizerProps, SharedState};
pub use sns::{Sns, SnsDecl};
pub use websocket::{RouteDecl, WebSocket, WebSocketDecl};

use crate::props;
use crate::resource::{Pseudo, Value};

const POLICY_VERSION: &str = "2012-10-17";

/// API Gateway invocation URI for a Lambda function
pub(crate) fn lambda_invocation_uri(lambda_arn: &Value) -> Value {
    Value::from("arn:")
        + Pseudo::Partition
        + ":apigateway:"
        + Pseudo::Region
        + ":lambda:path/2015-03-31/functions/"
        + lambda_arn
        + "/invocations"
}

/// `arn:<partition>:execute-api:<region>:<account>:` followed by `rest`
pub(crate) fn execute_api_arn(rest: impl Into<Value>) -> Value {
    Value::from("arn:")
        + Pseudo::Partition
        + ":execute-api:"
        + Pseudo::Region
        + ":"
        + Pseudo::AccountId
        + ":"
        + rest
}

pub(crate) fn policy_document(statements: Vec<Value>) -> Value {
    Value::map(props! {
        "Version" => POLICY_VERSION,
        "Statement" => statements,
    })
}
