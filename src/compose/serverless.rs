//! Service entry point
//!
//! [`ServerlessDecl`] collects the service-wide settings and function
//! declarations; [`ServerlessDecl::build`] runs one sequential build pass
//! and returns the finished template.
//!
//! The shared execution role is built in two phases: it is materialized
//! before any function resolves, and removed again afterwards when no
//! function ended up bound to it.

use super::function::{FunctionDecl, ServerlessFunction, ServiceEnv};
use super::ident::{self, IdPrefix, UuidSuffix, VolatileIdSource};
use super::modification::{Modification, OptionalModification};
use super::shared::{LazyWebSocketApi, SharedRole, SharedState};
use crate::error::{DeclarationError, Result};
use crate::props;
use crate::resource::{OutputFormat, Props, ResourceRef, Template, Value, S3_BUCKET};

const DEFAULT_STAGE: &str = "dev";

/// VPC placement of functions
#[derive(Debug, Clone, PartialEq)]
pub struct PrivateConfig {
    pub security_group_ids: Value,
    pub subnet_ids: Value,
}

impl PrivateConfig {
    pub fn new(security_group_ids: impl Into<Value>, subnet_ids: impl Into<Value>) -> Self {
        Self {
            security_group_ids: security_group_ids.into(),
            subnet_ids: subnet_ids.into(),
        }
    }
}

/// Bucket holding function packages
#[derive(Debug)]
pub enum DeploymentBucket {
    Create(Modification<Props>),
    /// Name of a bucket managed elsewhere
    Existing(Value),
}

impl Default for DeploymentBucket {
    fn default() -> Self {
        DeploymentBucket::Create(Modification::new())
    }
}

/// Declaration of a whole service
#[derive(Debug)]
pub struct ServerlessDecl {
    service_name: String,
    stage: String,
    private_config: Option<PrivateConfig>,
    bucket: DeploymentBucket,
    shared_role: OptionalModification<Props>,
    websocket_api: Modification<Props>,
    functions: Vec<FunctionDecl>,
}

impl ServerlessDecl {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            stage: DEFAULT_STAGE.to_string(),
            private_config: None,
            bucket: DeploymentBucket::default(),
            shared_role: OptionalModification::new(),
            websocket_api: Modification::new(),
            functions: Vec::new(),
        }
    }

    pub fn stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = stage.into();
        self
    }

    /// VPC configuration inherited by every function
    pub fn private_config(mut self, config: PrivateConfig) -> Self {
        self.private_config = Some(config);
        self
    }

    pub fn deployment_bucket(mut self, bucket: DeploymentBucket) -> Self {
        self.bucket = bucket;
        self
    }

    pub fn existing_deployment_bucket(self, name: impl Into<Value>) -> Self {
        self.deployment_bucket(DeploymentBucket::Existing(name.into()))
    }

    pub fn modify_deployment_bucket(self, hook: impl FnOnce(Props) -> Props + 'static) -> Self {
        self.deployment_bucket(DeploymentBucket::Create(Modification::with(hook)))
    }

    /// Never emit the shared role; every function needs its own
    pub fn without_shared_role(mut self) -> Self {
        self.shared_role.remove();
        self
    }

    pub fn modify_shared_role(mut self, hook: impl FnOnce(Props) -> Props + 'static) -> Self {
        self.shared_role.modify(hook);
        self
    }

    pub fn shared_role_slot(&mut self) -> &mut OptionalModification<Props> {
        &mut self.shared_role
    }

    /// Rewrite the WebSocket API, if any function creates it
    pub fn modify_websocket_api(mut self, hook: impl FnOnce(Props) -> Props + 'static) -> Self {
        self.websocket_api.replace(hook);
        self
    }

    pub fn function(mut self, function: FunctionDecl) -> std::result::Result<Self, DeclarationError> {
        if self.functions.iter().any(|f| f.id() == function.id()) {
            return Err(DeclarationError::DuplicateFunction(function.id().to_string()));
        }
        self.functions.push(function);
        Ok(self)
    }

    /// Build with random deployment suffixes
    pub fn build(self) -> Result<Composition> {
        self.build_with(&mut UuidSuffix)
    }

    /// Build with deployment suffixes drawn from `ids`
    pub fn build_with(self, ids: &mut dyn VolatileIdSource) -> Result<Composition> {
        let ServerlessDecl {
            service_name,
            stage,
            private_config,
            bucket,
            mut shared_role,
            websocket_api,
            functions,
        } = self;
        if service_name.trim().is_empty() {
            return Err(DeclarationError::InvalidField {
                field: "service".into(),
                reason: "must not be empty".into(),
            }
            .into());
        }
        tracing::info!(
            "composing service {} ({}) with {} functions",
            service_name,
            stage,
            functions.len()
        );

        let mut template = Template::new();
        let (bucket_resource, bucket_name) = match bucket {
            DeploymentBucket::Create(mut modification) => {
                let properties = modification.apply(props! {});
                let logical = ident::allocate(&template, IdPrefix::DeploymentBucket, "");
                let resource = template.add(logical, S3_BUCKET, properties, vec![])?;
                let name = resource.reference();
                (Some(resource), name)
            }
            DeploymentBucket::Existing(name) => (None, name),
        };

        let mut role = SharedRole::new();
        let shared = role
            .materialize(&mut template, &service_name, &stage, &mut shared_role)?
            .cloned();

        let mut websocket = LazyWebSocketApi::new(websocket_api);
        let mut env = ServiceEnv {
            service_name: &service_name,
            stage: &stage,
            bucket: &bucket_name,
            shared_role: shared.as_ref(),
            private_config: private_config.as_ref(),
            websocket: &mut websocket,
            ids,
        };
        let functions = functions
            .into_iter()
            .map(|decl| decl.build(&mut template, &mut env))
            .collect::<Result<Vec<_>>>()?;

        role.retract_if_unused(&mut template, &functions);

        let serverless = Serverless {
            service_name,
            stage,
            deployment_bucket: bucket_name,
            bucket: bucket_resource,
            shared_role: role.state().clone(),
            websocket_api: websocket.get().cloned(),
            functions,
        };
        Ok(Composition {
            template,
            serverless,
        })
    }
}

/// Summary of a built service
#[derive(Debug, Clone)]
pub struct Serverless {
    pub service_name: String,
    pub stage: String,
    /// Bucket name token used by function code locations
    pub deployment_bucket: Value,
    /// `None` for an existing bucket
    pub bucket: Option<ResourceRef>,
    pub shared_role: SharedState,
    pub websocket_api: Option<ResourceRef>,
    pub functions: Vec<ServerlessFunction>,
}

impl Serverless {
    pub fn function(&self, id: &str) -> Option<&ServerlessFunction> {
        self.functions.iter().find(|f| f.id == id)
    }
}

/// Result of one build pass
#[derive(Debug, Clone)]
pub struct Composition {
    pub template: Template,
    pub serverless: Serverless,
}

impl Composition {
    pub fn render(&self, format: OutputFormat) -> Result<String> {
        self.template.render(format)
    }
}
