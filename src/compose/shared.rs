//! Shared resources
//!
//! Nodes created once per service or per API and referenced by several
//! functions: the execution role, the WebSocket API and its authorizers.

use super::function::ServerlessFunction;
use super::ident::{self, IdPrefix};
use super::modification::{Modification, OptionalModification};
use super::{lambda_invocation_uri, policy_document};
use crate::error::Result;
use crate::props;
use crate::resource::{
    Props, Pseudo, ResourceRef, Template, Value, IAM_ROLE, WEBSOCKET_API, WEBSOCKET_AUTHORIZER,
};

const VPC_EXECUTION_POLICY: &str = ":iam::aws:policy/service-role/AWSLambdaVPCAccessExecutionRole";
const DEFAULT_AUTHORIZER_TTL: i64 = 300;
const REST_IDENTITY_SOURCE: &str = "method.request.header.Authorization";
const WEBSOCKET_IDENTITY_SOURCE: &str = "route.request.querystring.Authorizer";

/// Lifecycle of a shared node
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SharedState {
    #[default]
    Unrequested,
    Requested,
    Materialized(ResourceRef),
    /// The caller's slot declined the node
    Suppressed,
    /// Materialized, then removed because nothing referenced it
    Retracted,
}

// =============================================================================
// Execution role
// =============================================================================

/// Properties of a Lambda execution role; `function_id` narrows the log
/// permissions and role name to one function
pub fn role_props(service_name: &str, stage: &str, function_id: Option<&str>) -> Props {
    let log_group = match function_id {
        Some(id) => format!("{}-{}-{}", service_name, stage, id),
        None => format!("{}-{}-*", service_name, stage),
    };
    let log_resource = Value::from("arn:")
        + Pseudo::Partition
        + ":logs:"
        + Pseudo::Region
        + ":"
        + Pseudo::AccountId
        + format!(":log-group:/aws/lambda/{}:*", log_group);
    let role_name = match function_id {
        Some(id) => Value::from(format!("{}-{}-{}-", service_name, stage, id)) + Pseudo::Region + "-lambdaRole",
        None => Value::from(format!("{}-{}-", service_name, stage)) + Pseudo::Region + "-lambdaRole",
    };

    props! {
        "AssumeRolePolicyDocument" => policy_document(vec![Value::map(props! {
            "Effect" => "Allow",
            "Principal" => props! { "Service" => Value::list(["lambda.amazonaws.com"]) },
            "Action" => Value::list(["sts:AssumeRole"]),
        })]),
        "Policies" => Value::list([props! {
            "PolicyName" => format!("{}-{}-lambda", stage, service_name),
            "PolicyDocument" => policy_document(vec![
                Value::map(props! {
                    "Effect" => "Allow",
                    "Action" => Value::list(["logs:CreateLogStream"]),
                    "Resource" => Value::list([log_resource.clone()]),
                }),
                Value::map(props! {
                    "Effect" => "Allow",
                    "Action" => Value::list(["logs:PutLogEvents"]),
                    "Resource" => Value::list([log_resource + ":*"]),
                }),
            ]),
        }]),
        "Path" => "/",
        "RoleName" => role_name,
        "ManagedPolicyArns" => Value::list([Value::from("arn:") + Pseudo::Partition + VPC_EXECUTION_POLICY]),
    }
}

/// The service-wide execution role
#[derive(Debug, Default)]
pub struct SharedRole {
    state: SharedState,
}

impl SharedRole {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &SharedState {
        &self.state
    }

    /// The role record, while materialized
    pub fn get(&self) -> Option<&ResourceRef> {
        match &self.state {
            SharedState::Materialized(role) => Some(role),
            _ => None,
        }
    }

    /// Emit the role unless the slot declines it. Only the first call has
    /// any effect.
    pub fn materialize(
        &mut self,
        template: &mut Template,
        service_name: &str,
        stage: &str,
        slot: &mut OptionalModification<Props>,
    ) -> Result<Option<&ResourceRef>> {
        if self.state != SharedState::Unrequested {
            return Ok(self.get());
        }
        self.state = SharedState::Requested;
        match slot.resolve(true, role_props(service_name, stage, None)) {
            Some(properties) => {
                let logical = ident::allocate(template, IdPrefix::Role, "");
                let role = template.add(logical, IAM_ROLE, properties, vec![])?;
                tracing::info!("shared role materialized: {}", role.logical_name);
                self.state = SharedState::Materialized(role);
            }
            None => {
                tracing::info!("shared role suppressed");
                self.state = SharedState::Suppressed;
            }
        }
        Ok(self.get())
    }

    /// Remove the role from the template when no function references it
    pub fn retract_if_unused(
        &mut self,
        template: &mut Template,
        functions: &[ServerlessFunction],
    ) -> bool {
        let Some(role) = self.get() else {
            return false;
        };
        if shared_role_references(role, functions) > 0 {
            return false;
        }
        tracing::info!("shared role retracted: {}", role.logical_name);
        template.remove(&role.logical_name);
        self.state = SharedState::Retracted;
        true
    }
}

/// Number of functions bound to `role`
pub fn shared_role_references(role: &ResourceRef, functions: &[ServerlessFunction]) -> usize {
    functions
        .iter()
        .filter(|f| f.shared_role() == Some(role))
        .count()
}

// =============================================================================
// Authorizers
// =============================================================================

/// Proposal handed to authorizer slots
#[derive(Debug, Clone, PartialEq)]
pub struct AuthorizerProps {
    pub result_ttl: i64,
    pub provider_arns: Vec<Value>,
    pub identity_source: Value,
}

impl AuthorizerProps {
    /// Header-based identity, for REST APIs
    pub fn rest(provider_arn: Value) -> Self {
        Self {
            result_ttl: DEFAULT_AUTHORIZER_TTL,
            provider_arns: vec![provider_arn],
            identity_source: Value::str(REST_IDENTITY_SOURCE),
        }
    }

    /// Query-string identity, for WebSocket APIs
    pub fn websocket(provider_arn: Value) -> Self {
        Self {
            result_ttl: DEFAULT_AUTHORIZER_TTL,
            provider_arns: vec![provider_arn],
            identity_source: Value::str(WEBSOCKET_IDENTITY_SOURCE),
        }
    }

    /// Invocation URI of the first provider
    pub fn authorizer_uri(&self) -> Value {
        match self.provider_arns.first() {
            Some(arn) => lambda_invocation_uri(arn),
            None => Value::str(""),
        }
    }
}

// =============================================================================
// WebSocket API
// =============================================================================

/// The service's WebSocket API, created on first access
#[derive(Debug)]
pub struct LazyWebSocketApi {
    state: SharedState,
    slot: Modification<Props>,
    authorizers: Vec<(Value, ResourceRef)>,
}

impl LazyWebSocketApi {
    pub fn new(slot: Modification<Props>) -> Self {
        Self {
            state: SharedState::Unrequested,
            slot,
            authorizers: Vec::new(),
        }
    }

    pub fn state(&self) -> &SharedState {
        &self.state
    }

    pub fn get(&self) -> Option<&ResourceRef> {
        match &self.state {
            SharedState::Materialized(api) => Some(api),
            _ => None,
        }
    }

    /// The API record, creating it on the first call
    pub fn get_or_create(
        &mut self,
        template: &mut Template,
        service_name: &str,
        stage: &str,
    ) -> Result<ResourceRef> {
        if let SharedState::Materialized(api) = &self.state {
            return Ok(api.clone());
        }
        self.state = SharedState::Requested;
        let proposed = props! {
            "Name" => format!("{}-{}-websockets", stage, service_name),
            "ProtocolType" => "WEBSOCKET",
            "RouteSelectionExpression" => "$request.body.action",
        };
        let properties = self.slot.apply(proposed);
        let logical = ident::allocate(template, IdPrefix::WebsocketApi, "");
        let api = template.add(logical, WEBSOCKET_API, properties, vec![])?;
        template.output(
            "WebsocketEndpoint",
            "URL of the websocket API",
            Value::from("wss://")
                + api.reference()
                + ".execute-api."
                + Pseudo::Region
                + "."
                + Pseudo::UrlSuffix
                + format!("/{}", stage),
        )?;
        tracing::info!("websocket api materialized: {}", api.logical_name);
        self.state = SharedState::Materialized(api.clone());
        Ok(api)
    }

    /// Authorizer on the shared API for `provider_arn`, created for the
    /// first function supplying that ARN and reused afterwards. `None` when
    /// the slot suppresses it.
    pub fn authorizer_for(
        &mut self,
        template: &mut Template,
        api: &ResourceRef,
        provider_arn: &Value,
        service_name: &str,
        slot: &mut OptionalModification<AuthorizerProps>,
    ) -> Result<Option<ResourceRef>> {
        if let Some((_, existing)) = self.authorizers.iter().find(|(arn, _)| arn == provider_arn) {
            tracing::debug!("reusing websocket authorizer {}", existing.logical_name);
            return Ok(Some(existing.clone()));
        }
        let Some(auth) = slot.resolve(true, AuthorizerProps::websocket(provider_arn.clone())) else {
            return Ok(None);
        };
        let name = match self.authorizers.len() {
            0 => format!("websocket-auth-{}", service_name),
            n => format!("websocket-auth-{}-{}", service_name, n + 1),
        };
        let properties = props! {
            "ApiId" => api.reference(),
            "AuthorizerType" => "REQUEST",
            "IdentitySource" => Value::list([auth.identity_source.clone()]),
            "AuthorizerUri" => auth.authorizer_uri(),
            "AuthorizerResultTtlInSeconds" => auth.result_ttl,
            "Name" => name,
        };
        let logical = ident::allocate(template, IdPrefix::WebsocketAuthorizer, "");
        let authorizer = template.add(logical, WEBSOCKET_AUTHORIZER, properties, vec![])?;
        self.authorizers.push((provider_arn.clone(), authorizer.clone()));
        Ok(Some(authorizer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_materializes_once() {
        let mut template = Template::new();
        let mut role = SharedRole::new();
        let mut slot = OptionalModification::new();
        let first = role
            .materialize(&mut template, "svc", "dev", &mut slot)
            .unwrap()
            .cloned();
        let second = role
            .materialize(&mut template, "svc", "dev", &mut slot)
            .unwrap()
            .cloned();
        assert_eq!(first, second);
        assert_eq!(template.of_kind(IAM_ROLE).count(), 1);
        assert!(matches!(role.state(), SharedState::Materialized(_)));
    }

    #[test]
    fn test_role_suppressed_by_slot() {
        let mut template = Template::new();
        let mut role = SharedRole::new();
        let mut slot = OptionalModification::new();
        slot.remove();
        assert!(role
            .materialize(&mut template, "svc", "dev", &mut slot)
            .unwrap()
            .is_none());
        assert_eq!(role.state(), &SharedState::Suppressed);
        assert!(template.is_empty());
    }

    #[test]
    fn test_unused_role_retracted() {
        let mut template = Template::new();
        let mut role = SharedRole::new();
        let mut slot = OptionalModification::new();
        role.materialize(&mut template, "svc", "dev", &mut slot).unwrap();
        assert!(role.retract_if_unused(&mut template, &[]));
        assert_eq!(role.state(), &SharedState::Retracted);
        assert_eq!(template.of_kind(IAM_ROLE).count(), 0);
    }

    #[test]
    fn test_role_props_shape() {
        let props = role_props("svc", "dev", None);
        assert_eq!(props["Path"], Value::str("/"));
        let policies = props["Policies"].as_list().unwrap();
        assert_eq!(
            policies[0].get("PolicyName"),
            Some(&Value::str("dev-svc-lambda"))
        );
        let private = role_props("svc", "dev", Some("fn"));
        assert_ne!(private["RoleName"], props["RoleName"]);
    }

    #[test]
    fn test_websocket_api_created_once() {
        let mut template = Template::new();
        let mut api = LazyWebSocketApi::new(Modification::new());
        assert_eq!(api.state(), &SharedState::Unrequested);
        let first = api.get_or_create(&mut template, "svc", "dev").unwrap();
        let second = api.get_or_create(&mut template, "svc", "dev").unwrap();
        let third = api.get_or_create(&mut template, "svc", "dev").unwrap();
        assert_eq!(first, second);
        assert_eq!(second, third);
        assert_eq!(template.of_kind(WEBSOCKET_API).count(), 1);
        assert!(template.has_output("WebsocketEndpoint"));
    }

    #[test]
    fn test_websocket_api_slot_applied_on_creation() {
        let mut template = Template::new();
        let mut api = LazyWebSocketApi::new(Modification::with(|mut props: Props| {
            props.insert("Name".into(), Value::str("custom"));
            props
        }));
        let created = api.get_or_create(&mut template, "svc", "dev").unwrap();
        assert_eq!(
            template.get(&created.logical_name).unwrap().properties["Name"],
            Value::str("custom")
        );
    }

    #[test]
    fn test_websocket_authorizer_reused_per_arn() {
        let mut template = Template::new();
        let mut shared = LazyWebSocketApi::new(Modification::new());
        let api = shared.get_or_create(&mut template, "svc", "dev").unwrap();
        let arn = Value::str("arn:aws:lambda:auth");
        let other = Value::str("arn:aws:lambda:other");
        let a = shared
            .authorizer_for(&mut template, &api, &arn, "svc", &mut OptionalModification::new())
            .unwrap()
            .unwrap();
        let b = shared
            .authorizer_for(&mut template, &api, &arn, "svc", &mut OptionalModification::new())
            .unwrap()
            .unwrap();
        let c = shared
            .authorizer_for(&mut template, &api, &other, "svc", &mut OptionalModification::new())
            .unwrap()
            .unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(template.of_kind(WEBSOCKET_AUTHORIZER).count(), 2);
        let record = template.get(&a.logical_name).unwrap();
        assert_eq!(
            record.properties["IdentitySource"],
            Value::list(["route.request.querystring.Authorizer"])
        );
        assert_eq!(record.properties["AuthorizerResultTtlInSeconds"], Value::Int(300));
    }
}
