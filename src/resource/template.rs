//! Template Graph
//!
//! The resource graph being assembled by one build: logical identifiers
//! mapped to records, plus named outputs. Records are checked against the
//! kind registry as they are added.

use super::registry::get_kind;
use super::value::{Props, Value};
use crate::error::{ComposeError, InvariantViolation, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;

const FORMAT_VERSION: &str = "2010-09-09";

/// One resource in the graph
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceRecord {
    pub kind: String,
    pub properties: Props,
    pub depends_on: Vec<String>,
}

/// Handle to a resource that has been added to the template
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceRef {
    pub logical_name: String,
    pub kind: String,
}

impl ResourceRef {
    /// `Ref` token for this resource
    pub fn reference(&self) -> Value {
        Value::Ref(self.logical_name.clone())
    }

    /// `Fn::GetAtt` token, checked against the kind's attributes
    pub fn attr(&self, attribute: &str) -> Result<Value> {
        let supported = get_kind(&self.kind)
            .map(|k| k.supports_attribute(attribute))
            .unwrap_or(false);
        if !supported {
            return Err(InvariantViolation::UnknownAttribute {
                logical: self.logical_name.clone(),
                kind: self.kind.clone(),
                attribute: attribute.to_string(),
            }
            .into());
        }
        Ok(Value::GetAtt {
            logical: self.logical_name.clone(),
            attribute: attribute.to_string(),
        })
    }
}

/// Named template output
#[derive(Debug, Clone, PartialEq)]
pub struct Output {
    pub description: String,
    pub value: Value,
}

/// Document format for rendering
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Json,
    Yaml,
}

#[derive(Debug, Clone, Default)]
pub struct Template {
    resources: BTreeMap<String, ResourceRecord>,
    outputs: BTreeMap<String, Output>,
}

impl Template {
    pub fn new() -> Self {
        Self::default()
    }

    /// First free identifier: `base`, then `base2`, `base3`, ...
    pub fn allocate_logical_name(&self, base: &str) -> String {
        if !self.resources.contains_key(base) {
            return base.to_string();
        }
        (2..)
            .map(|n| format!("{}{}", base, n))
            .find(|candidate| !self.resources.contains_key(candidate))
            .unwrap_or_else(|| base.to_string())
    }

    /// Add a record under an identifier that must not be taken yet
    pub fn add(
        &mut self,
        logical_name: impl Into<String>,
        kind: &str,
        properties: Props,
        depends_on: Vec<String>,
    ) -> Result<ResourceRef> {
        let logical_name = logical_name.into();
        let Some(kind_def) = get_kind(kind) else {
            return Err(InvariantViolation::UnknownKind(kind.to_string()).into());
        };
        if self.resources.contains_key(&logical_name) {
            return Err(InvariantViolation::DuplicateLogicalName(logical_name).into());
        }
        if let Some(missing) = kind_def
            .required
            .iter()
            .find(|p| !properties.contains_key(p.as_str()))
        {
            return Err(ComposeError::MissingProperty {
                logical: logical_name,
                kind: kind.to_string(),
                property: missing.clone(),
            });
        }

        tracing::debug!("add resource: {} ({})", logical_name, kind);
        self.resources.insert(
            logical_name.clone(),
            ResourceRecord {
                kind: kind.to_string(),
                properties,
                depends_on,
            },
        );
        Ok(ResourceRef {
            logical_name,
            kind: kind.to_string(),
        })
    }

    /// Drop a record; returns it if it existed
    pub fn remove(&mut self, logical_name: &str) -> Option<ResourceRecord> {
        tracing::debug!("remove resource: {}", logical_name);
        self.resources.remove(logical_name)
    }

    /// First free output name: `base`, then `base2`, `base3`, ...
    pub fn allocate_output_name(&self, base: &str) -> String {
        if !self.outputs.contains_key(base) {
            return base.to_string();
        }
        (2..)
            .map(|n| format!("{}{}", base, n))
            .find(|candidate| !self.outputs.contains_key(candidate))
            .unwrap_or_else(|| base.to_string())
    }

    /// Declare an output under a name that must not be taken yet
    pub fn output(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        value: Value,
    ) -> Result<()> {
        let name = name.into();
        if self.outputs.contains_key(&name) {
            return Err(InvariantViolation::DuplicateOutput(name).into());
        }
        self.outputs.insert(
            name,
            Output {
                description: description.into(),
                value,
            },
        );
        Ok(())
    }

    pub fn has_output(&self, name: &str) -> bool {
        self.outputs.contains_key(name)
    }

    pub fn get(&self, logical_name: &str) -> Option<&ResourceRecord> {
        self.resources.get(logical_name)
    }

    pub fn get_output(&self, name: &str) -> Option<&Output> {
        self.outputs.get(name)
    }

    pub fn resources(&self) -> impl Iterator<Item = (&String, &ResourceRecord)> {
        self.resources.iter()
    }

    /// All records of one kind, in identifier order
    pub fn of_kind<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = (&'a String, &'a ResourceRecord)> + 'a {
        self.resources.iter().filter(move |(_, r)| r.kind == kind)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// CloudFormation document shape
    pub fn to_document(&self) -> serde_json::Value {
        let resources: serde_json::Map<String, serde_json::Value> = self
            .resources
            .iter()
            .map(|(name, record)| {
                let mut entry = serde_json::Map::new();
                entry.insert("Type".into(), json!(record.kind));
                if !record.properties.is_empty() {
                    entry.insert(
                        "Properties".into(),
                        Value::Map(record.properties.clone()).to_json(),
                    );
                }
                if !record.depends_on.is_empty() {
                    entry.insert("DependsOn".into(), json!(record.depends_on));
                }
                (name.clone(), serde_json::Value::Object(entry))
            })
            .collect();

        let mut document = json!({
            "AWSTemplateFormatVersion": FORMAT_VERSION,
            "Resources": resources,
        });
        if !self.outputs.is_empty() {
            let outputs: serde_json::Map<String, serde_json::Value> = self
                .outputs
                .iter()
                .map(|(name, output)| {
                    (
                        name.clone(),
                        json!({ "Description": output.description, "Value": output.value.to_json() }),
                    )
                })
                .collect();
            document["Outputs"] = serde_json::Value::Object(outputs);
        }
        document
    }

    pub fn render(&self, format: OutputFormat) -> Result<String> {
        let document = self.to_document();
        let rendered = match format {
            OutputFormat::Json => serde_json::to_string_pretty(&document)?,
            OutputFormat::Yaml => serde_yaml::to_string(&document)?,
        };
        Ok(rendered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::props;
    use crate::resource::registry::{IAM_ROLE, LOG_GROUP, REST_API};

    #[test]
    fn test_allocate_logical_name_skips_taken() {
        let mut template = Template::new();
        assert_eq!(template.allocate_logical_name("LogGroup"), "LogGroup");
        template.add("LogGroup", LOG_GROUP, props! {}, vec![]).unwrap();
        assert_eq!(template.allocate_logical_name("LogGroup"), "LogGroup2");
        template.add("LogGroup2", LOG_GROUP, props! {}, vec![]).unwrap();
        assert_eq!(template.allocate_logical_name("LogGroup"), "LogGroup3");
    }

    #[test]
    fn test_duplicate_add_is_invariant_violation() {
        let mut template = Template::new();
        template.add("Logs", LOG_GROUP, props! {}, vec![]).unwrap();
        let err = template.add("Logs", LOG_GROUP, props! {}, vec![]).unwrap_err();
        assert!(matches!(
            err,
            ComposeError::Invariant(InvariantViolation::DuplicateLogicalName(_))
        ));
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let mut template = Template::new();
        let err = template
            .add("Thing", "AWS::Nope::Thing", props! {}, vec![])
            .unwrap_err();
        assert!(matches!(
            err,
            ComposeError::Invariant(InvariantViolation::UnknownKind(_))
        ));
    }

    #[test]
    fn test_missing_required_property() {
        let mut template = Template::new();
        let err = template.add("Role", IAM_ROLE, props! {}, vec![]).unwrap_err();
        assert!(matches!(err, ComposeError::MissingProperty { .. }));
    }

    #[test]
    fn test_attr_checked_against_kind() {
        let mut template = Template::new();
        let api = template
            .add("Api", REST_API, props! { "Name" => "dev-svc" }, vec![])
            .unwrap();
        assert!(api.attr("RootResourceId").is_ok());
        assert!(api.attr("Arn").is_err());
    }

    #[test]
    fn test_document_shape() {
        let mut template = Template::new();
        template
            .add("Api", REST_API, props! { "Name" => "dev-svc" }, vec!["Logs".into()])
            .unwrap();
        template
            .output("ServiceEndpoint", "URL of the service", Value::str("x"))
            .unwrap();
        let document = template.to_document();
        assert_eq!(document["AWSTemplateFormatVersion"], "2010-09-09");
        assert_eq!(document["Resources"]["Api"]["Type"], REST_API);
        assert_eq!(document["Resources"]["Api"]["Properties"]["Name"], "dev-svc");
        assert_eq!(document["Resources"]["Api"]["DependsOn"][0], "Logs");
        assert_eq!(document["Outputs"]["ServiceEndpoint"]["Value"], "x");
    }

    #[test]
    fn test_duplicate_output_rejected() {
        let mut template = Template::new();
        template.output("ServiceEndpoint", "first", Value::str("a")).unwrap();
        let err = template
            .output("ServiceEndpoint", "second", Value::str("b"))
            .unwrap_err();
        assert!(matches!(
            err,
            ComposeError::Invariant(InvariantViolation::DuplicateOutput(_))
        ));
        assert_eq!(template.get_output("ServiceEndpoint").unwrap().value, Value::str("a"));
        assert_eq!(template.allocate_output_name("ServiceEndpoint"), "ServiceEndpoint2");
    }

    #[test]
    fn test_render_yaml() {
        let mut template = Template::new();
        template
            .add("Api", REST_API, props! { "Name" => "dev-svc" }, vec![])
            .unwrap();
        let yaml = template.render(OutputFormat::Yaml).unwrap();
        assert!(yaml.contains("AWS::ApiGateway::RestApi"));
    }
}
