//! Resource Kind Registry - Load resource kind definitions from JSON
//!
//! This module loads all resource kind definitions from embedded JSON files
//! and provides lookup functions for the template graph and the composer.

use serde::Deserialize;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Embedded kind JSON files (compiled into the binary)
const KIND_FILES: &[&str] = &[
    include_str!("../resources/apigateway.json"),
    include_str!("../resources/lambda.json"),
    include_str!("../resources/iam.json"),
    include_str!("../resources/storage.json"),
];

pub const REST_API: &str = "AWS::ApiGateway::RestApi";
pub const REST_RESOURCE: &str = "AWS::ApiGateway::Resource";
pub const REST_METHOD: &str = "AWS::ApiGateway::Method";
pub const REST_DEPLOYMENT: &str = "AWS::ApiGateway::Deployment";
pub const REST_AUTHORIZER: &str = "AWS::ApiGateway::Authorizer";
pub const BASE_PATH_MAPPING: &str = "AWS::ApiGateway::BasePathMapping";
pub const WEBSOCKET_API: &str = "AWS::ApiGatewayV2::Api";
pub const WEBSOCKET_INTEGRATION: &str = "AWS::ApiGatewayV2::Integration";
pub const WEBSOCKET_ROUTE: &str = "AWS::ApiGatewayV2::Route";
pub const WEBSOCKET_AUTHORIZER: &str = "AWS::ApiGatewayV2::Authorizer";
pub const WEBSOCKET_DEPLOYMENT: &str = "AWS::ApiGatewayV2::Deployment";
pub const WEBSOCKET_STAGE: &str = "AWS::ApiGatewayV2::Stage";
pub const LAMBDA_FUNCTION: &str = "AWS::Lambda::Function";
pub const LAMBDA_PERMISSION: &str = "AWS::Lambda::Permission";
pub const IAM_ROLE: &str = "AWS::IAM::Role";
pub const S3_BUCKET: &str = "AWS::S3::Bucket";
pub const LOG_GROUP: &str = "AWS::Logs::LogGroup";
pub const SNS_TOPIC: &str = "AWS::SNS::Topic";
pub const SNS_SUBSCRIPTION: &str = "AWS::SNS::Subscription";

/// Resource kind definition from JSON
#[derive(Debug, Clone, Deserialize)]
pub struct KindDef {
    pub display_name: String,
    pub service: String,
    /// Attributes readable through `Fn::GetAtt`
    #[serde(default)]
    pub attributes: Vec<String>,
    /// Properties every record of this kind must carry
    #[serde(default)]
    pub required: Vec<String>,
}

impl KindDef {
    pub fn supports_attribute(&self, attribute: &str) -> bool {
        self.attributes.iter().any(|a| a == attribute)
    }
}

/// Root structure of resources/*.json
#[derive(Debug, Clone, Deserialize)]
pub struct KindConfig {
    #[serde(default)]
    pub kinds: HashMap<String, KindDef>,
}

/// Global registry loaded from JSON
static REGISTRY: OnceLock<KindConfig> = OnceLock::new();

/// Get the kind registry (loads from embedded JSON on first access)
pub fn get_registry() -> &'static KindConfig {
    REGISTRY.get_or_init(|| {
        let mut final_config = KindConfig {
            kinds: HashMap::new(),
        };

        for content in KIND_FILES {
            let partial: KindConfig = serde_json::from_str(content)
                .unwrap_or_else(|e| panic!("Failed to parse embedded kind JSON: {}", e));
            final_config.kinds.extend(partial.kinds);
        }

        final_config
    })
}

/// Get a kind definition by its type tag
pub fn get_kind(tag: &str) -> Option<&'static KindDef> {
    get_registry().kinds.get(tag)
}

/// Get all kind tags, sorted
pub fn get_all_kind_tags() -> Vec<&'static str> {
    let mut tags: Vec<_> = get_registry().kinds.keys().map(|s| s.as_str()).collect();
    tags.sort_unstable();
    tags
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_loads_successfully() {
        let registry = get_registry();
        assert!(!registry.kinds.is_empty(), "Registry should have kinds");
    }

    #[test]
    fn test_every_declared_constant_is_registered() {
        for tag in [
            REST_API,
            REST_RESOURCE,
            REST_METHOD,
            REST_DEPLOYMENT,
            REST_AUTHORIZER,
            BASE_PATH_MAPPING,
            WEBSOCKET_API,
            WEBSOCKET_INTEGRATION,
            WEBSOCKET_ROUTE,
            WEBSOCKET_AUTHORIZER,
            WEBSOCKET_DEPLOYMENT,
            WEBSOCKET_STAGE,
            LAMBDA_FUNCTION,
            LAMBDA_PERMISSION,
            IAM_ROLE,
            S3_BUCKET,
            LOG_GROUP,
            SNS_TOPIC,
            SNS_SUBSCRIPTION,
        ] {
            assert!(get_kind(tag).is_some(), "{} should be registered", tag);
        }
    }

    #[test]
    fn test_rest_api_exposes_root_resource() {
        let kind = get_kind(REST_API).unwrap();
        assert_eq!(kind.service, "apigateway");
        assert!(kind.supports_attribute("RootResourceId"));
        assert!(!kind.supports_attribute("Arn"));
    }

    #[test]
    fn test_get_all_kind_tags_sorted() {
        let tags = get_all_kind_tags();
        let mut sorted = tags.clone();
        sorted.sort_unstable();
        assert_eq!(tags, sorted);
        assert!(tags.contains(&LAMBDA_FUNCTION));
    }
}
