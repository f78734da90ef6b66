//! Declaration files
//!
//! YAML or JSON description of a service, converted into the builder API.
//! JSON is read through the YAML parser.

use crate::compose::{
    BasePathMappingDecl, FunctionDecl, HttpDecl, Method, PathDecl, PrivateConfig, RouteDecl,
    ServerlessDecl, SnsDecl, WebSocketDecl,
};
use crate::error::{DeclarationError, Result};
use crate::resource::Value;
use serde::{Deserialize, Serialize};

const SHARED_ROLE: &str = "shared";
const PRIVATE_ROLE: &str = "private";

fn default_true() -> bool {
    true
}

/// Top-level document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ServiceFile {
    pub service: String,
    #[serde(default)]
    pub stage: Option<String>,
    /// Existing bucket name; a bucket is created when absent
    #[serde(default)]
    pub deployment_bucket: Option<String>,
    #[serde(default)]
    pub private_config: Option<PrivateConfigFile>,
    /// `false` suppresses the shared execution role
    #[serde(default = "default_true")]
    pub shared_role: bool,
    #[serde(default)]
    pub functions: Vec<FunctionFile>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PrivateConfigFile {
    pub security_group_ids: Vec<String>,
    pub subnet_ids: Vec<String>,
}

impl From<PrivateConfigFile> for PrivateConfig {
    fn from(file: PrivateConfigFile) -> Self {
        PrivateConfig::new(
            Value::list(file.security_group_ids),
            Value::list(file.subnet_ids),
        )
    }
}

/// A function's VPC setting: a configuration, or `false` to opt out
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FunctionPrivateConfig {
    Enabled(bool),
    Config(PrivateConfigFile),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FunctionFile {
    pub id: String,
    pub handler: String,
    pub runtime: String,
    #[serde(default)]
    pub code_key: Option<String>,
    /// Inline source
    #[serde(default)]
    pub code: Option<String>,
    /// `shared`, `private` or a role ARN
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub private_config: Option<FunctionPrivateConfig>,
    #[serde(default)]
    pub http: Option<HttpFile>,
    #[serde(default)]
    pub websocket: Option<WebSocketFile>,
    #[serde(default)]
    pub sns: Vec<SnsFile>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct HttpFile {
    #[serde(default)]
    pub cors: bool,
    #[serde(default)]
    pub authorizer_arn: Option<String>,
    #[serde(default)]
    pub vpc_endpoint: Option<String>,
    #[serde(default)]
    pub base_path_mapping: Option<BasePathMappingFile>,
    #[serde(default)]
    pub paths: Vec<PathFile>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BasePathMappingFile {
    pub domain: String,
    #[serde(default)]
    pub base_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PathFile {
    pub path: String,
    #[serde(default)]
    pub methods: Vec<String>,
    /// Overrides the API's CORS setting for this path
    #[serde(default)]
    pub cors: Option<bool>,
    #[serde(default)]
    pub paths: Vec<PathFile>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct WebSocketFile {
    #[serde(default)]
    pub authorizer_arn: Option<String>,
    #[serde(default)]
    pub routes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SnsFile {
    /// Existing topic; a topic is created when absent
    #[serde(default)]
    pub topic_arn: Option<String>,
}

impl ServiceFile {
    /// Parse YAML or JSON
    pub fn parse(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn into_declaration(self) -> std::result::Result<ServerlessDecl, DeclarationError> {
        let mut decl = ServerlessDecl::new(self.service);
        if let Some(stage) = self.stage {
            decl = decl.stage(stage);
        }
        if let Some(bucket) = self.deployment_bucket {
            decl = decl.existing_deployment_bucket(bucket);
        }
        if let Some(config) = self.private_config {
            decl = decl.private_config(config.into());
        }
        if !self.shared_role {
            decl = decl.without_shared_role();
        }
        for function in self.functions {
            decl = decl.function(function.into_declaration()?)?;
        }
        Ok(decl)
    }
}

impl FunctionFile {
    pub fn into_declaration(self) -> std::result::Result<FunctionDecl, DeclarationError> {
        let mut decl = match (self.code_key, self.code) {
            (Some(key), None) => FunctionDecl::from_bucket(&self.id, key, self.handler, self.runtime)?,
            (None, Some(code)) => FunctionDecl::inline(&self.id, code, self.handler, self.runtime)?,
            (Some(_), Some(_)) => {
                return Err(DeclarationError::ConflictingCode {
                    function: self.id,
                    first: "codeKey",
                    second: "code",
                })
            }
            (None, None) => return Err(DeclarationError::MissingCode(self.id)),
        };

        decl = match self.role.as_deref() {
            None | Some(SHARED_ROLE) => decl,
            Some(PRIVATE_ROLE) => decl.private_role()?,
            Some(arn) if arn.starts_with("arn:") => decl.role_arn(arn)?,
            Some(other) => {
                return Err(DeclarationError::InvalidField {
                    field: format!("functions.{}.role", self.id),
                    reason: format!("expected 'shared', 'private' or a role ARN, got '{}'", other),
                })
            }
        };

        decl = match self.private_config {
            None | Some(FunctionPrivateConfig::Enabled(true)) => decl,
            Some(FunctionPrivateConfig::Enabled(false)) => decl.without_private_config(),
            Some(FunctionPrivateConfig::Config(config)) => decl.private_config(config.into()),
        };

        if let Some(http) = self.http {
            decl = decl.http(http.into_declaration()?);
        }
        if let Some(websocket) = self.websocket {
            decl = decl.websocket(websocket.into_declaration());
        }
        for sns in self.sns {
            decl = decl.sns(match sns.topic_arn {
                Some(arn) => SnsDecl::existing(arn),
                None => SnsDecl::new(),
            });
        }
        Ok(decl)
    }
}

impl HttpFile {
    pub fn into_declaration(self) -> std::result::Result<HttpDecl, DeclarationError> {
        let mut decl = HttpDecl::new().cors(self.cors);
        if let Some(arn) = self.authorizer_arn {
            decl = decl.authorizer_arn(arn);
        }
        if let Some(endpoint) = self.vpc_endpoint {
            decl = decl.vpc_endpoint(endpoint);
        }
        if let Some(mapping) = self.base_path_mapping {
            let mut mapping_decl = BasePathMappingDecl::new(mapping.domain);
            if let Some(base_path) = mapping.base_path {
                mapping_decl = mapping_decl.base_path(base_path);
            }
            decl = decl.base_path_mapping(mapping_decl);
        }
        for path in self.paths {
            decl = decl.path(path.into_declaration()?);
        }
        Ok(decl)
    }
}

impl PathFile {
    pub fn into_declaration(self) -> std::result::Result<PathDecl, DeclarationError> {
        let mut decl = PathDecl::parse(&self.path)?;
        for method in &self.methods {
            decl = decl.method(method.parse::<Method>()?)?;
        }
        if let Some(cors) = self.cors {
            decl = decl.with_cors(cors);
        }
        for child in self.paths {
            decl = decl.path(child.into_declaration()?);
        }
        Ok(decl)
    }
}

impl WebSocketFile {
    pub fn into_declaration(self) -> WebSocketDecl {
        let mut decl = WebSocketDecl::new();
        if let Some(arn) = self.authorizer_arn {
            decl = decl.authorizer_arn(arn);
        }
        for route in self.routes {
            decl = decl.route(RouteDecl::new(route));
        }
        decl
    }
}
