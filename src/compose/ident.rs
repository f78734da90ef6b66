//! Identifier Allocation
//!
//! Logical identifiers are derived from a fixed per-kind prefix plus a
//! normalized rendering of the path (and verb, for methods), so repeated
//! builds of the same declaration produce the same identifiers. Deployments
//! are the exception: they take a volatile suffix so every build replaces
//! them.

use super::path::PathSegment;
use crate::resource::Template;
use uuid::Uuid;

/// Fixed identifier prefix per synthesized kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdPrefix {
    RestApi,
    Resource,
    Method,
    Deployment,
    RestAuthorizer,
    BasePathMapping,
    ApiPermission,
    WebsocketApi,
    WebsocketIntegration,
    WebsocketRoute,
    WebsocketAuthorizer,
    WebsocketDeployment,
    WebsocketStage,
    WebsocketPermission,
    LogGroup,
    Function,
    Role,
    DeploymentBucket,
    SnsTopic,
    SnsPermission,
    SnsSubscription,
}

impl IdPrefix {
    pub fn as_str(self) -> &'static str {
        match self {
            IdPrefix::RestApi => "ApiGatewayRestApi",
            IdPrefix::Resource => "ApiGatewayResource",
            IdPrefix::Method => "Method",
            IdPrefix::Deployment => "ApiDeployment",
            IdPrefix::RestAuthorizer => "ApiGatewayAuthorizer",
            IdPrefix::BasePathMapping => "ApiGatewayBasePathMapping",
            IdPrefix::ApiPermission => "LambdaPermissionApiGateway",
            IdPrefix::WebsocketApi => "WebsocketApi",
            IdPrefix::WebsocketIntegration => "WebsocketIntegration",
            IdPrefix::WebsocketRoute => "WebsocketRoute",
            IdPrefix::WebsocketAuthorizer => "WebsocketAuthorizer",
            IdPrefix::WebsocketDeployment => "WebsocketsDeployment",
            IdPrefix::WebsocketStage => "WebsocketStage",
            IdPrefix::WebsocketPermission => "LambdaPermissionWebsocket",
            IdPrefix::LogGroup => "LogGroup",
            IdPrefix::Function => "Function",
            IdPrefix::Role => "IamRoleLambdaExecution",
            IdPrefix::DeploymentBucket => "ServerlessDeploymentBucket",
            IdPrefix::SnsTopic => "SnsTopic",
            IdPrefix::SnsPermission => "LambdaPermissionSns",
            IdPrefix::SnsSubscription => "SnsSubscription",
        }
    }
}

/// Deterministic identifier for `(prefix, context)`, unique within the template
pub fn allocate(template: &Template, prefix: IdPrefix, context: &str) -> String {
    template.allocate_logical_name(&format!("{}{}", prefix.as_str(), context))
}

/// Identifier that changes on every build
pub fn allocate_volatile(
    template: &Template,
    prefix: IdPrefix,
    source: &mut dyn VolatileIdSource,
) -> String {
    loop {
        let candidate = format!("{}{}", prefix.as_str(), source.next_suffix());
        if template.get(&candidate).is_none() {
            return candidate;
        }
        tracing::warn!("volatile identifier collision: {}", candidate);
    }
}

/// Source of suffixes for identifiers that must change between builds
pub trait VolatileIdSource {
    fn next_suffix(&mut self) -> String;
}

/// Random v4 uuid with hyphens removed
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidSuffix;

impl VolatileIdSource for UuidSuffix {
    fn next_suffix(&mut self) -> String {
        Uuid::new_v4().simple().to_string()
    }
}

/// Counter-based suffixes for reproducible output
#[derive(Debug, Default, Clone)]
pub struct SequentialSuffix {
    next: u64,
}

impl SequentialSuffix {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VolatileIdSource for SequentialSuffix {
    fn next_suffix(&mut self) -> String {
        self.next += 1;
        format!("{:08}", self.next)
    }
}

/// Readable rendering of one segment: literals keep their alphanumerics,
/// parameters become `<Name>Var`
pub fn normalize_segment(segment: &PathSegment) -> String {
    match segment {
        PathSegment::Literal(part) => part.chars().filter(char::is_ascii_alphanumeric).collect(),
        PathSegment::Parameter(name) => {
            let cleaned: String = name.chars().filter(char::is_ascii_alphanumeric).collect();
            format!("{}Var", capitalize(&cleaned))
        }
    }
}

/// Normalized name of a whole segment chain
pub fn normalized_name<'a>(segments: impl IntoIterator<Item = &'a PathSegment>) -> String {
    segments.into_iter().map(normalize_segment).collect()
}

/// `my-function_2` -> `Myfunction`
pub fn normalize_function_id(id: &str) -> String {
    let letters: String = id.chars().filter(char::is_ascii_alphabetic).collect();
    capitalize(&letters)
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}
