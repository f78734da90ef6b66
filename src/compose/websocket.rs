//! WebSocket topology
//!
//! Every function with WebSocket routes plugs into the service's single
//! WebSocket API through its own integration, permission, routes,
//! deployment and stage.

use super::function::FunctionContext;
use super::ident::{self, IdPrefix, VolatileIdSource};
use super::lambda_invocation_uri;
use super::modification::{Modification, OptionalModification};
use super::shared::{AuthorizerProps, LazyWebSocketApi};
use crate::error::Result;
use crate::props;
use crate::resource::{
    Props, Pseudo, ResourceRef, Template, Value, LAMBDA_PERMISSION, WEBSOCKET_DEPLOYMENT,
    WEBSOCKET_INTEGRATION, WEBSOCKET_ROUTE, WEBSOCKET_STAGE,
};

/// One route key handled by the function
#[derive(Debug)]
pub struct RouteDecl {
    route_key: String,
    authorized: bool,
    modification: Modification<Props>,
}

impl RouteDecl {
    pub fn new(route_key: impl Into<String>) -> Self {
        Self {
            route_key: route_key.into(),
            authorized: true,
            modification: Modification::new(),
        }
    }

    pub fn route_key(&self) -> &str {
        &self.route_key
    }

    /// Skip the API's authorizer for this route
    pub fn without_authorization(mut self) -> Self {
        self.authorized = false;
        self
    }

    pub fn modify(mut self, hook: impl FnOnce(Props) -> Props + 'static) -> Self {
        self.modification.replace(hook);
        self
    }
}

impl From<&str> for RouteDecl {
    fn from(route_key: &str) -> Self {
        RouteDecl::new(route_key)
    }
}

/// WebSocket event source of one function
#[derive(Debug, Default)]
pub struct WebSocketDecl {
    authorizer_arn: Option<Value>,
    routes: Vec<RouteDecl>,
    integration: Modification<Props>,
    permission: Modification<Props>,
    deployment: Modification<Props>,
    stage: Modification<Props>,
    authorizer: OptionalModification<AuthorizerProps>,
}

impl WebSocketDecl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn authorizer_arn(mut self, arn: impl Into<Value>) -> Self {
        self.authorizer_arn = Some(arn.into());
        self
    }

    pub fn route(mut self, route: impl Into<RouteDecl>) -> Self {
        self.routes.push(route.into());
        self
    }

    pub fn modify_integration(mut self, hook: impl FnOnce(Props) -> Props + 'static) -> Self {
        self.integration.replace(hook);
        self
    }

    pub fn modify_permission(mut self, hook: impl FnOnce(Props) -> Props + 'static) -> Self {
        self.permission.replace(hook);
        self
    }

    pub fn modify_deployment(mut self, hook: impl FnOnce(Props) -> Props + 'static) -> Self {
        self.deployment.replace(hook);
        self
    }

    pub fn modify_stage(mut self, hook: impl FnOnce(Props) -> Props + 'static) -> Self {
        self.stage.replace(hook);
        self
    }

    pub fn authorizer_slot(&mut self) -> &mut OptionalModification<AuthorizerProps> {
        &mut self.authorizer
    }

    pub(crate) fn build(
        mut self,
        template: &mut Template,
        ctx: &FunctionContext<'_>,
        shared: &mut LazyWebSocketApi,
        ids: &mut dyn VolatileIdSource,
    ) -> Result<WebSocket> {
        let api = shared.get_or_create(template, ctx.service_name, ctx.stage)?;
        let api_id = api.reference();

        let properties = self.integration.apply(props! {
            "ApiId" => &api_id,
            "IntegrationType" => "AWS_PROXY",
            "IntegrationUri" => lambda_invocation_uri(ctx.lambda_arn),
        });
        let logical = ident::allocate(template, IdPrefix::WebsocketIntegration, ctx.normalized_id);
        let integration = template.add(logical, WEBSOCKET_INTEGRATION, properties, vec![])?;

        let authorizer = match &self.authorizer_arn {
            Some(arn) => shared.authorizer_for(template, &api, arn, ctx.service_name, &mut self.authorizer)?,
            None => None,
        };

        let properties = self.permission.apply(props! {
            "Action" => "lambda:InvokeFunction",
            "FunctionName" => ctx.lambda_arn,
            "Principal" => Value::from("apigateway.") + Pseudo::UrlSuffix,
        });
        let logical = ident::allocate(template, IdPrefix::WebsocketPermission, ctx.normalized_id);
        let permission = template.add(
            logical,
            LAMBDA_PERMISSION,
            properties,
            vec![ctx.function.logical_name.clone(), api.logical_name.clone()],
        )?;

        let target = Value::from("integrations/") + integration.reference();
        let mut routes = Vec::with_capacity(self.routes.len());
        for mut route in std::mem::take(&mut self.routes) {
            let mut proposed = props! {
                "ApiId" => &api_id,
                "RouteKey" => route.route_key.as_str(),
                "Target" => &target,
            };
            match authorizer.as_ref().filter(|_| route.authorized) {
                Some(authorizer) => {
                    proposed.insert("AuthorizationType".into(), Value::str("CUSTOM"));
                    proposed.insert("AuthorizerId".into(), authorizer.reference());
                }
                None => {
                    proposed.insert("AuthorizationType".into(), Value::str("NONE"));
                }
            }
            let properties = route.modification.apply(proposed);
            let context = format!("{}{}", ctx.normalized_id, route_name(&route.route_key));
            let logical = ident::allocate(template, IdPrefix::WebsocketRoute, &context);
            let resource = template.add(logical, WEBSOCKET_ROUTE, properties, vec![])?;
            tracing::debug!("route {} -> {}", route.route_key, resource.logical_name);
            routes.push(resource);
        }

        let logical = ident::allocate_volatile(template, IdPrefix::WebsocketDeployment, ids);
        let properties = self.deployment.apply(props! { "ApiId" => &api_id });
        let depends_on = routes.iter().map(|r| r.logical_name.clone()).collect();
        let deployment = template.add(logical, WEBSOCKET_DEPLOYMENT, properties, depends_on)?;

        let properties = self.stage.apply(props! {
            "ApiId" => &api_id,
            "DeploymentId" => deployment.reference(),
            "StageName" => ctx.stage,
        });
        let logical = ident::allocate(template, IdPrefix::WebsocketStage, ctx.normalized_id);
        let stage = template.add(logical, WEBSOCKET_STAGE, properties, vec![])?;

        Ok(WebSocket {
            api,
            integration,
            permission,
            authorizer,
            routes,
            deployment,
            stage,
        })
    }
}

/// `$connect` -> `Connect`, `send-message` -> `Sendmessage`
fn route_name(route_key: &str) -> String {
    let cleaned: String = route_key.chars().filter(char::is_ascii_alphanumeric).collect();
    let mut chars = cleaned.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

/// Emitted WebSocket topology
#[derive(Debug, Clone)]
pub struct WebSocket {
    /// The shared API
    pub api: ResourceRef,
    pub integration: ResourceRef,
    pub permission: ResourceRef,
    pub authorizer: Option<ResourceRef>,
    pub routes: Vec<ResourceRef>,
    pub deployment: ResourceRef,
    pub stage: ResourceRef,
}
