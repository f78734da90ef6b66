//! Serverless functions
//!
//! A function owns its log group, its execution role binding, the Lambda
//! function record and every event topology attached to it.

use super::http::{Http, HttpDecl};
use super::ident::{self, IdPrefix, VolatileIdSource};
use super::modification::{Modification, OptionalModification};
use super::serverless::PrivateConfig;
use super::shared::{role_props, LazyWebSocketApi};
use super::sns::{Sns, SnsDecl};
use super::websocket::{WebSocket, WebSocketDecl};
use crate::error::{DeclarationError, Result};
use crate::props;
use crate::resource::{Props, ResourceRef, Template, Value, IAM_ROLE, LAMBDA_FUNCTION, LOG_GROUP};

const PRIVATE_ROLE: &str = "a private role";
const ROLE_ARN: &str = "an existing role ARN";

/// What the event topologies of one function need to know about it
pub struct FunctionContext<'a> {
    pub service_name: &'a str,
    pub stage: &'a str,
    pub function_id: &'a str,
    /// Identifier fragment derived from `function_id`
    pub normalized_id: &'a str,
    pub function: &'a ResourceRef,
    pub lambda_arn: &'a Value,
}

/// Service-level state a function build reads and advances
pub(crate) struct ServiceEnv<'a> {
    pub service_name: &'a str,
    pub stage: &'a str,
    pub bucket: &'a Value,
    pub shared_role: Option<&'a ResourceRef>,
    pub private_config: Option<&'a PrivateConfig>,
    pub websocket: &'a mut LazyWebSocketApi,
    pub ids: &'a mut dyn VolatileIdSource,
}

/// Location of the deployment package
#[derive(Debug, Clone, PartialEq)]
pub enum FunctionCode {
    /// Object key in the deployment bucket
    Bucket(Value),
    /// Inline source
    Inline(Value),
}

/// The execution role a function ended up with
#[derive(Debug, Clone, PartialEq)]
pub enum RoleBinding {
    Shared(ResourceRef),
    Private(ResourceRef),
    Existing(Value),
}

impl RoleBinding {
    /// Value for the function's `Role` property
    pub fn arn(&self) -> Result<Value> {
        match self {
            RoleBinding::Shared(role) | RoleBinding::Private(role) => role.attr("Arn"),
            RoleBinding::Existing(arn) => Ok(arn.clone()),
        }
    }

    fn logical_name(&self) -> Option<&str> {
        match self {
            RoleBinding::Shared(role) | RoleBinding::Private(role) => Some(&role.logical_name),
            RoleBinding::Existing(_) => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
enum VpcChoice {
    #[default]
    Inherit,
    Override(PrivateConfig),
    Disabled,
}

/// Declaration of one function
#[derive(Debug)]
pub struct FunctionDecl {
    id: String,
    normalized_id: String,
    handler: Value,
    runtime: Value,
    code: FunctionCode,
    role_arn: Option<Value>,
    private_role: OptionalModification<Props>,
    vpc: VpcChoice,
    log_group: Modification<Props>,
    function: Modification<Props>,
    http: Option<HttpDecl>,
    websocket: Option<WebSocketDecl>,
    sns: Vec<SnsDecl>,
}

impl FunctionDecl {
    fn new(
        id: &str,
        code: FunctionCode,
        handler: impl Into<Value>,
        runtime: impl Into<Value>,
    ) -> std::result::Result<Self, DeclarationError> {
        let normalized_id = ident::normalize_function_id(id);
        if normalized_id.is_empty() {
            return Err(DeclarationError::InvalidFunctionId(id.to_string()));
        }
        Ok(Self {
            id: id.to_string(),
            normalized_id,
            handler: handler.into(),
            runtime: runtime.into(),
            code,
            role_arn: None,
            private_role: OptionalModification::new(),
            vpc: VpcChoice::Inherit,
            log_group: Modification::new(),
            function: Modification::new(),
            http: None,
            websocket: None,
            sns: Vec::new(),
        })
    }

    /// Function whose package is stored under `key` in the deployment bucket
    pub fn from_bucket(
        id: &str,
        key: impl Into<Value>,
        handler: impl Into<Value>,
        runtime: impl Into<Value>,
    ) -> std::result::Result<Self, DeclarationError> {
        Self::new(id, FunctionCode::Bucket(key.into()), handler, runtime)
    }

    /// Function with inline source code
    pub fn inline(
        id: &str,
        code: impl Into<Value>,
        handler: impl Into<Value>,
        runtime: impl Into<Value>,
    ) -> std::result::Result<Self, DeclarationError> {
        Self::new(id, FunctionCode::Inline(code.into()), handler, runtime)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Use a role managed outside the service
    pub fn role_arn(mut self, arn: impl Into<Value>) -> std::result::Result<Self, DeclarationError> {
        if self.private_role.explicit_presence() == Some(true) {
            return Err(self.role_conflict(PRIVATE_ROLE, ROLE_ARN));
        }
        if self.role_arn.is_some() {
            return Err(self.role_conflict(ROLE_ARN, ROLE_ARN));
        }
        self.role_arn = Some(arn.into());
        Ok(self)
    }

    /// Give the function its own role instead of the shared one
    pub fn private_role(mut self) -> std::result::Result<Self, DeclarationError> {
        if self.role_arn.is_some() {
            return Err(self.role_conflict(ROLE_ARN, PRIVATE_ROLE));
        }
        self.private_role.keep();
        Ok(self)
    }

    /// Private role with rewritten properties
    pub fn modify_private_role(
        mut self,
        hook: impl FnOnce(Props) -> Props + 'static,
    ) -> std::result::Result<Self, DeclarationError> {
        if self.role_arn.is_some() {
            return Err(self.role_conflict(ROLE_ARN, PRIVATE_ROLE));
        }
        self.private_role.modify(hook);
        Ok(self)
    }

    /// Full access to the private role slot. Its default presence is
    /// "only when the shared role is unavailable".
    pub fn private_role_slot(&mut self) -> &mut OptionalModification<Props> {
        &mut self.private_role
    }

    /// Override the service-wide VPC configuration
    pub fn private_config(mut self, config: PrivateConfig) -> Self {
        self.vpc = VpcChoice::Override(config);
        self
    }

    /// Run outside any VPC even if the service has a configuration
    pub fn without_private_config(mut self) -> Self {
        self.vpc = VpcChoice::Disabled;
        self
    }

    pub fn modify_log_group(mut self, hook: impl FnOnce(Props) -> Props + 'static) -> Self {
        self.log_group.replace(hook);
        self
    }

    pub fn modify_function(mut self, hook: impl FnOnce(Props) -> Props + 'static) -> Self {
        self.function.replace(hook);
        self
    }

    pub fn http(mut self, http: HttpDecl) -> Self {
        self.http = Some(http);
        self
    }

    pub fn websocket(mut self, websocket: WebSocketDecl) -> Self {
        self.websocket = Some(websocket);
        self
    }

    pub fn sns(mut self, sns: SnsDecl) -> Self {
        self.sns.push(sns);
        self
    }

    fn role_conflict(&self, first: &'static str, second: &'static str) -> DeclarationError {
        DeclarationError::ConflictingRole {
            function: self.id.clone(),
            first,
            second,
        }
    }

    pub(crate) fn build(mut self, template: &mut Template, env: &mut ServiceEnv<'_>) -> Result<ServerlessFunction> {
        let properties = self.log_group.apply(props! {
            "LogGroupName" => format!("/aws/lambda/{}-{}-{}", env.service_name, env.stage, self.id),
        });
        let logical = ident::allocate(template, IdPrefix::LogGroup, &self.normalized_id);
        let log_group = template.add(logical, LOG_GROUP, properties, vec![])?;

        let role = self.resolve_role(template, env)?;

        let code = match &self.code {
            FunctionCode::Bucket(key) => props! { "S3Bucket" => env.bucket, "S3Key" => key },
            FunctionCode::Inline(source) => props! { "ZipFile" => source },
        };
        let mut proposed = props! {
            "Code" => code,
            "Handler" => &self.handler,
            "Role" => role.arn()?,
            "Runtime" => &self.runtime,
        };
        let vpc = match &self.vpc {
            VpcChoice::Inherit => env.private_config,
            VpcChoice::Override(config) => Some(config),
            VpcChoice::Disabled => None,
        };
        if let Some(config) = vpc {
            proposed.insert(
                "VpcConfig".into(),
                Value::map(props! {
                    "SecurityGroupIds" => &config.security_group_ids,
                    "SubnetIds" => &config.subnet_ids,
                }),
            );
        }
        let properties = self.function.apply(proposed);
        let depends_on = std::iter::once(log_group.logical_name.clone())
            .chain(role.logical_name().map(str::to_string))
            .collect();
        let logical = ident::allocate(template, IdPrefix::Function, &self.normalized_id);
        let function = template.add(logical, LAMBDA_FUNCTION, properties, depends_on)?;
        tracing::info!("function {} -> {}", self.id, function.logical_name);

        let lambda_arn = function.attr("Arn")?;
        let ctx = FunctionContext {
            service_name: env.service_name,
            stage: env.stage,
            function_id: &self.id,
            normalized_id: &self.normalized_id,
            function: &function,
            lambda_arn: &lambda_arn,
        };
        let http = match self.http.take() {
            Some(decl) => Some(decl.build(template, &ctx, &mut *env.ids)?),
            None => None,
        };
        let websocket = match self.websocket.take() {
            Some(decl) => Some(decl.build(template, &ctx, &mut *env.websocket, &mut *env.ids)?),
            None => None,
        };
        let sns = std::mem::take(&mut self.sns)
            .into_iter()
            .map(|decl| decl.build(template, &ctx))
            .collect::<Result<Vec<_>>>()?;

        Ok(ServerlessFunction {
            id: self.id,
            log_group,
            role,
            function,
            http,
            websocket,
            sns,
        })
    }

    /// Existing ARN first, then the private slot, then the shared role
    fn resolve_role(&mut self, template: &mut Template, env: &ServiceEnv<'_>) -> Result<RoleBinding> {
        if let Some(arn) = self.role_arn.take() {
            return Ok(RoleBinding::Existing(arn));
        }
        let proposed = role_props(env.service_name, env.stage, Some(&self.id));
        if let Some(properties) = self.private_role.resolve(env.shared_role.is_none(), proposed) {
            let logical = ident::allocate(template, IdPrefix::Role, &self.normalized_id);
            let role = template.add(logical, IAM_ROLE, properties, vec![])?;
            tracing::debug!("private role {} for {}", role.logical_name, self.id);
            return Ok(RoleBinding::Private(role));
        }
        match env.shared_role {
            Some(role) => Ok(RoleBinding::Shared(role.clone())),
            None => Err(DeclarationError::MissingRole(self.id.clone()).into()),
        }
    }
}

/// Emitted function with everything attached to it
#[derive(Debug, Clone)]
pub struct ServerlessFunction {
    pub id: String,
    pub log_group: ResourceRef,
    pub role: RoleBinding,
    pub function: ResourceRef,
    pub http: Option<Http>,
    pub websocket: Option<WebSocket>,
    pub sns: Vec<Sns>,
}

impl ServerlessFunction {
    pub fn shared_role(&self) -> Option<&ResourceRef> {
        match &self.role {
            RoleBinding::Shared(role) => Some(role),
            _ => None,
        }
    }

    pub fn uses_shared_role(&self) -> bool {
        self.shared_role().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::ident::SequentialSuffix;
    use crate::error::ComposeError;

    struct Fixture {
        template: Template,
        shared: Option<ResourceRef>,
        websocket: LazyWebSocketApi,
        ids: SequentialSuffix,
        bucket: Value,
    }

    impl Fixture {
        fn new(with_shared_role: bool) -> Self {
            let mut template = Template::new();
            let shared = with_shared_role.then(|| {
                template
                    .add("IamRoleLambdaExecution", IAM_ROLE, role_props("svc", "dev", None), vec![])
                    .unwrap()
            });
            Self {
                template,
                shared,
                websocket: LazyWebSocketApi::new(Modification::new()),
                ids: SequentialSuffix::new(),
                bucket: Value::Ref("ServerlessDeploymentBucket".into()),
            }
        }

        fn build(&mut self, decl: FunctionDecl, private_config: Option<&PrivateConfig>) -> Result<ServerlessFunction> {
            let mut env = ServiceEnv {
                service_name: "svc",
                stage: "dev",
                bucket: &self.bucket,
                shared_role: self.shared.as_ref(),
                private_config,
                websocket: &mut self.websocket,
                ids: &mut self.ids,
            };
            decl.build(&mut self.template, &mut env)
        }
    }

    #[test]
    fn test_id_without_letters_rejected() {
        let err = FunctionDecl::from_bucket("123-", "key", "h", "r").unwrap_err();
        assert_eq!(err, DeclarationError::InvalidFunctionId("123-".into()));
        assert!(FunctionDecl::from_bucket("", "key", "h", "r").is_err());
    }

    #[test]
    fn test_bucket_code_and_log_group() {
        let mut fixture = Fixture::new(true);
        let built = fixture
            .build(FunctionDecl::from_bucket("my-api", "code.zip", "index.handler", "nodejs18.x").unwrap(), None)
            .unwrap();
        assert_eq!(built.function.logical_name, "FunctionMyapi");
        assert_eq!(built.log_group.logical_name, "LogGroupMyapi");
        let log_group = fixture.template.get("LogGroupMyapi").unwrap();
        assert_eq!(
            log_group.properties["LogGroupName"],
            Value::str("/aws/lambda/svc-dev-my-api")
        );
        let function = fixture.template.get("FunctionMyapi").unwrap();
        assert_eq!(
            function.properties["Code"].get("S3Key"),
            Some(&Value::str("code.zip"))
        );
        assert_eq!(
            function.depends_on,
            vec!["LogGroupMyapi".to_string(), "IamRoleLambdaExecution".to_string()]
        );
        assert!(built.uses_shared_role());
    }

    #[test]
    fn test_inline_code() {
        let mut fixture = Fixture::new(true);
        fixture
            .build(FunctionDecl::inline("fn", "exports.handler = 1", "index.handler", "nodejs18.x").unwrap(), None)
            .unwrap();
        let function = fixture.template.get("FunctionFn").unwrap();
        assert_eq!(
            function.properties["Code"].get("ZipFile"),
            Some(&Value::str("exports.handler = 1"))
        );
        assert!(function.properties["Code"].get("S3Bucket").is_none());
    }

    #[test]
    fn test_private_role_replaces_shared() {
        let mut fixture = Fixture::new(true);
        let built = fixture
            .build(FunctionDecl::from_bucket("worker", "k", "h", "r").unwrap().private_role().unwrap(), None)
            .unwrap();
        let RoleBinding::Private(role) = &built.role else {
            panic!("expected private role");
        };
        assert_eq!(role.logical_name, "IamRoleLambdaExecutionWorker");
        assert!(!built.uses_shared_role());
    }

    #[test]
    fn test_existing_role_arn() {
        let mut fixture = Fixture::new(true);
        let built = fixture
            .build(FunctionDecl::from_bucket("worker", "k", "h", "r").unwrap().role_arn("arn:aws:iam::1:role/x").unwrap(), None)
            .unwrap();
        assert_eq!(built.role, RoleBinding::Existing(Value::str("arn:aws:iam::1:role/x")));
        let function = fixture.template.get(&built.function.logical_name).unwrap();
        assert_eq!(function.depends_on, vec!["LogGroupWorker".to_string()]);
    }

    #[test]
    fn test_conflicting_role_sources_rejected() {
        let err = FunctionDecl::from_bucket("worker", "k", "h", "r")
            .unwrap()
            .private_role()
            .unwrap()
            .role_arn("arn")
            .unwrap_err();
        assert!(matches!(err, DeclarationError::ConflictingRole { .. }));
        let err = FunctionDecl::from_bucket("worker", "k", "h", "r")
            .unwrap()
            .role_arn("arn")
            .unwrap()
            .modify_private_role(|p| p)
            .unwrap_err();
        assert!(matches!(err, DeclarationError::ConflictingRole { .. }));
    }

    #[test]
    fn test_falls_back_to_private_role_without_shared() {
        let mut fixture = Fixture::new(false);
        let built = fixture
            .build(FunctionDecl::from_bucket("worker", "k", "h", "r").unwrap(), None)
            .unwrap();
        assert!(matches!(built.role, RoleBinding::Private(_)));
    }

    #[test]
    fn test_missing_role_when_everything_removed() {
        let mut fixture = Fixture::new(false);
        let mut decl = FunctionDecl::from_bucket("worker", "k", "h", "r").unwrap();
        decl.private_role_slot().remove();
        let err = fixture.build(decl, None).unwrap_err();
        assert!(matches!(
            err,
            ComposeError::Declaration(DeclarationError::MissingRole(_))
        ));
    }

    #[test]
    fn test_vpc_inherit_override_disable() {
        let service = PrivateConfig::new(Value::list(["sg-service"]), Value::list(["subnet-a"]));
        let own = PrivateConfig::new(Value::list(["sg-own"]), Value::list(["subnet-b"]));
        let mut fixture = Fixture::new(true);
        fixture
            .build(FunctionDecl::from_bucket("a", "k", "h", "r").unwrap(), Some(&service))
            .unwrap();
        fixture
            .build(FunctionDecl::from_bucket("b", "k", "h", "r").unwrap().private_config(own), Some(&service))
            .unwrap();
        fixture
            .build(FunctionDecl::from_bucket("c", "k", "h", "r").unwrap().without_private_config(), Some(&service))
            .unwrap();
        let vpc = |logical: &str| {
            fixture
                .template
                .get(logical)
                .unwrap()
                .properties
                .get("VpcConfig")
                .and_then(|v| v.get("SecurityGroupIds"))
                .cloned()
        };
        assert_eq!(vpc("FunctionA"), Some(Value::list(["sg-service"])));
        assert_eq!(vpc("FunctionB"), Some(Value::list(["sg-own"])));
        assert_eq!(vpc("FunctionC"), None);
    }
}
