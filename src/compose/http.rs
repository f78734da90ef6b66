//! REST topology
//!
//! One REST API per function: the API itself, an optional token
//! authorizer, the merged path tree, a deployment depending on every
//! method, an optional base path mapping and the invoke permission.

use super::deps::{collect_method_ids, verify_exhaustive};
use super::function::FunctionContext;
use super::ident::{self, IdPrefix, VolatileIdSource};
use super::method::{AuthDescriptor, CorsConfig};
use super::modification::{Modification, OptionalModification};
use super::path::{build_tree, PathContext, PathDecl, PathNode, PathTree};
use super::shared::AuthorizerProps;
use super::{execute_api_arn, lambda_invocation_uri, policy_document};
use crate::error::Result;
use crate::props;
use crate::resource::{
    Props, Pseudo, ResourceRef, Template, Value, BASE_PATH_MAPPING, LAMBDA_PERMISSION, REST_API,
    REST_AUTHORIZER, REST_DEPLOYMENT,
};

const ENDPOINT_OUTPUT: &str = "ServiceEndpoint";

/// Custom domain mapping for the API's stage
#[derive(Debug)]
pub struct BasePathMappingDecl {
    domain: Value,
    base_path: Option<Value>,
    modification: Modification<Props>,
}

impl BasePathMappingDecl {
    pub fn new(domain: impl Into<Value>) -> Self {
        Self {
            domain: domain.into(),
            base_path: None,
            modification: Modification::new(),
        }
    }

    pub fn base_path(mut self, base_path: impl Into<Value>) -> Self {
        self.base_path = Some(base_path.into());
        self
    }

    pub fn modify(mut self, hook: impl FnOnce(Props) -> Props + 'static) -> Self {
        self.modification.replace(hook);
        self
    }
}

/// HTTP event source of one function
#[derive(Debug, Default)]
pub struct HttpDecl {
    cors: Option<CorsConfig>,
    vpc_endpoint: Option<Value>,
    authorizer_arn: Option<Value>,
    paths: Vec<PathDecl>,
    base_path_mapping: Option<BasePathMappingDecl>,
    rest_api: Modification<Props>,
    deployment: Modification<Props>,
    permission: Modification<Props>,
    authorizer: OptionalModification<AuthorizerProps>,
}

impl HttpDecl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Synthesize preflight methods with the default headers
    pub fn cors(mut self, enabled: bool) -> Self {
        self.cors = enabled.then(CorsConfig::default);
        self
    }

    pub fn cors_config(mut self, config: CorsConfig) -> Self {
        self.cors = Some(config);
        self
    }

    /// Make the API private to a VPC endpoint
    pub fn vpc_endpoint(mut self, endpoint: impl Into<Value>) -> Self {
        self.vpc_endpoint = Some(endpoint.into());
        self
    }

    pub fn authorizer_arn(mut self, arn: impl Into<Value>) -> Self {
        self.authorizer_arn = Some(arn.into());
        self
    }

    pub fn path(mut self, path: PathDecl) -> Self {
        self.paths.push(path);
        self
    }

    pub fn base_path_mapping(mut self, mapping: BasePathMappingDecl) -> Self {
        self.base_path_mapping = Some(mapping);
        self
    }

    pub fn modify_rest_api(mut self, hook: impl FnOnce(Props) -> Props + 'static) -> Self {
        self.rest_api.replace(hook);
        self
    }

    pub fn modify_deployment(mut self, hook: impl FnOnce(Props) -> Props + 'static) -> Self {
        self.deployment.replace(hook);
        self
    }

    pub fn modify_permission(mut self, hook: impl FnOnce(Props) -> Props + 'static) -> Self {
        self.permission.replace(hook);
        self
    }

    pub fn authorizer_slot(&mut self) -> &mut OptionalModification<AuthorizerProps> {
        &mut self.authorizer
    }

    pub(crate) fn build(
        mut self,
        template: &mut Template,
        ctx: &FunctionContext<'_>,
        ids: &mut dyn VolatileIdSource,
    ) -> Result<Http> {
        let rest_api = self.build_rest_api(template, ctx)?;

        let output = if template.has_output(ENDPOINT_OUTPUT) {
            template.allocate_output_name(&format!("{}{}", ENDPOINT_OUTPUT, ctx.normalized_id))
        } else {
            ENDPOINT_OUTPUT.to_string()
        };
        template.output(
            output,
            "URL of the service",
            Value::from("https://")
                + rest_api.reference()
                + ".execute-api."
                + Pseudo::Region
                + "."
                + Pseudo::UrlSuffix
                + format!("/{}", ctx.stage),
        )?;

        let authorizer = match self.authorizer_arn.take() {
            Some(arn) => self.build_authorizer(template, ctx, &rest_api, arn)?,
            None => None,
        };
        let auth = authorizer.as_ref().map(AuthDescriptor::custom);

        let integration_uri = lambda_invocation_uri(ctx.lambda_arn);
        let path_ctx = PathContext {
            rest_api: &rest_api,
            integration_uri: &integration_uri,
            cors: self.cors.as_ref(),
            auth: auth.as_ref(),
        };
        let tree = PathTree::from_decls(std::mem::take(&mut self.paths))?;
        let paths = build_tree(template, &path_ctx, tree)?;

        let method_ids = collect_method_ids(&paths);
        let method_count = method_ids.len();
        let logical = ident::allocate_volatile(template, IdPrefix::Deployment, ids);
        verify_exhaustive(template, &rest_api, &logical, &method_ids)?;
        let properties = self.deployment.apply(props! {
            "RestApiId" => rest_api.reference(),
            "StageName" => ctx.stage,
        });
        let deployment = template.add(logical, REST_DEPLOYMENT, properties, method_ids)?;
        tracing::debug!(
            "deployment {} depends on {} methods",
            deployment.logical_name,
            method_count
        );

        let base_path_mapping = match self.base_path_mapping.take() {
            Some(mapping) => Some(build_base_path_mapping(
                template,
                ctx,
                &rest_api,
                &deployment,
                mapping,
            )?),
            None => None,
        };

        let properties = self.permission.apply(props! {
            "Action" => "lambda:InvokeFunction",
            "FunctionName" => ctx.lambda_arn,
            "Principal" => Value::from("apigateway.") + Pseudo::UrlSuffix,
            "SourceArn" => execute_api_arn(rest_api.reference() + "/*/*"),
        });
        let logical = ident::allocate(template, IdPrefix::ApiPermission, ctx.normalized_id);
        let permission = template.add(logical, LAMBDA_PERMISSION, properties, vec![])?;

        Ok(Http {
            rest_api,
            authorizer,
            paths,
            deployment,
            base_path_mapping,
            permission,
        })
    }

    fn build_rest_api(&mut self, template: &mut Template, ctx: &FunctionContext<'_>) -> Result<ResourceRef> {
        let mut proposed = props! {
            "Name" => format!("{}-{}", ctx.stage, ctx.service_name),
        };
        if let Some(endpoint) = &self.vpc_endpoint {
            proposed.insert(
                "EndpointConfiguration".into(),
                Value::map(props! { "Types" => Value::list(["PRIVATE"]) }),
            );
            proposed.insert(
                "Policy".into(),
                policy_document(vec![Value::map(props! {
                    "Effect" => "Allow",
                    "Principal" => "*",
                    "Action" => Value::list(["execute-api:Invoke"]),
                    "Resource" => Value::list([execute_api_arn("*")]),
                    "Condition" => props! {
                        "StringEquals" => props! {
                            "aws:sourceVpce" => Value::list([endpoint]),
                        },
                    },
                })]),
            );
        }
        let properties = self.rest_api.apply(proposed);
        let logical = ident::allocate(template, IdPrefix::RestApi, "");
        template.add(logical, REST_API, properties, vec![])
    }

    fn build_authorizer(
        &mut self,
        template: &mut Template,
        ctx: &FunctionContext<'_>,
        rest_api: &ResourceRef,
        arn: Value,
    ) -> Result<Option<ResourceRef>> {
        let Some(auth) = self.authorizer.resolve(true, AuthorizerProps::rest(arn)) else {
            tracing::debug!("rest authorizer suppressed for {}", ctx.function_id);
            return Ok(None);
        };
        let properties = props! {
            "Name" => format!("{}-{}-{}-authorizer", ctx.stage, ctx.service_name, ctx.function_id),
            "RestApiId" => rest_api.reference(),
            "Type" => "TOKEN",
            "IdentitySource" => auth.identity_source.clone(),
            "AuthorizerUri" => auth.authorizer_uri(),
            "AuthorizerResultTtlInSeconds" => auth.result_ttl,
        };
        let logical = ident::allocate(template, IdPrefix::RestAuthorizer, ctx.normalized_id);
        Ok(Some(template.add(logical, REST_AUTHORIZER, properties, vec![])?))
    }
}

fn build_base_path_mapping(
    template: &mut Template,
    ctx: &FunctionContext<'_>,
    rest_api: &ResourceRef,
    deployment: &ResourceRef,
    mut mapping: BasePathMappingDecl,
) -> Result<ResourceRef> {
    let mut proposed = props! {
        "DomainName" => mapping.domain,
        "RestApiId" => rest_api.reference(),
        "Stage" => ctx.stage,
    };
    if let Some(base_path) = mapping.base_path {
        proposed.insert("BasePath".into(), base_path);
    }
    let properties = mapping.modification.apply(proposed);
    let logical = ident::allocate(template, IdPrefix::BasePathMapping, ctx.normalized_id);
    template.add(
        logical,
        BASE_PATH_MAPPING,
        properties,
        vec![deployment.logical_name.clone()],
    )
}

/// Emitted REST topology
#[derive(Debug, Clone)]
pub struct Http {
    pub rest_api: ResourceRef,
    pub authorizer: Option<ResourceRef>,
    /// The API root node
    pub paths: PathNode,
    pub deployment: ResourceRef,
    pub base_path_mapping: Option<ResourceRef>,
    pub permission: ResourceRef,
}
