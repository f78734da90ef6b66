//! Symbolic Values
//!
//! Property values emitted into the template. Anything only known at deploy
//! time (references, attributes, pseudo parameters) stays an opaque token;
//! the composer concatenates and nests tokens but never evaluates them.

use serde::{Serialize, Serializer};
use serde_json::json;
use std::collections::BTreeMap;
use std::ops::Add;

/// Property bag of a single resource record
pub type Props = BTreeMap<String, Value>;

/// Build a [`Props`] bag from `"Key" => value` pairs
#[macro_export]
macro_rules! props {
    () => { $crate::resource::Props::new() };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut props = $crate::resource::Props::new();
        $( props.insert(String::from($key), $crate::resource::Value::from($value)); )+
        props
    }};
}

/// Pseudo parameters supplied by the deployment engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pseudo {
    AccountId,
    Partition,
    Region,
    UrlSuffix,
}

impl Pseudo {
    pub fn as_str(self) -> &'static str {
        match self {
            Pseudo::AccountId => "AWS::AccountId",
            Pseudo::Partition => "AWS::Partition",
            Pseudo::Region => "AWS::Region",
            Pseudo::UrlSuffix => "AWS::URLSuffix",
        }
    }
}

/// A template value: literal data or a deploy-time token
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Str(String),
    Int(i64),
    Bool(bool),
    List(Vec<Value>),
    Map(Props),
    /// Reference to another resource's logical identifier
    Ref(String),
    /// Attribute of another resource
    GetAtt { logical: String, attribute: String },
    Pseudo(Pseudo),
    /// String concatenation of the parts, evaluated at deploy time
    Join(Vec<Value>),
}

impl Value {
    pub fn str(value: impl Into<String>) -> Self {
        Value::Str(value.into())
    }

    pub fn list<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Value>,
    {
        Value::List(items.into_iter().map(Into::into).collect())
    }

    pub fn map(props: Props) -> Self {
        Value::Map(props)
    }

    /// Literal string content, if this value is fully known
    pub fn as_literal(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Props> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    /// Look up a nested map entry
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map()?.get(key)
    }

    /// Render into the CloudFormation JSON shape
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Str(s) => json!(s),
            Value::Int(i) => json!(i),
            Value::Bool(b) => json!(b),
            Value::List(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Map(props) => serde_json::Value::Object(
                props
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            Value::Ref(logical) => json!({ "Ref": logical }),
            Value::GetAtt { logical, attribute } => {
                json!({ "Fn::GetAtt": [logical, attribute] })
            }
            Value::Pseudo(p) => json!({ "Ref": p.as_str() }),
            Value::Join(parts) => {
                let parts: Vec<_> = parts.iter().map(Value::to_json).collect();
                json!({ "Fn::Join": ["", parts] })
            }
        }
    }

    fn into_parts(self) -> Vec<Value> {
        match self {
            Value::Join(parts) => parts,
            other => vec![other],
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<T: Into<Value>> Add<T> for Value {
    type Output = Value;

    fn add(self, rhs: T) -> Value {
        let mut parts = self.into_parts();
        for part in rhs.into().into_parts() {
            if let (Some(Value::Str(prev)), Value::Str(next)) = (parts.last_mut(), &part) {
                prev.push_str(next);
                continue;
            }
            parts.push(part);
        }
        parts.retain(|p| !matches!(p, Value::Str(s) if s.is_empty()));
        match parts.len() {
            0 => Value::Str(String::new()),
            1 => parts.remove(0),
            _ => Value::Join(parts),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

impl From<&String> for Value {
    fn from(value: &String) -> Self {
        Value::Str(value.clone())
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<Pseudo> for Value {
    fn from(value: Pseudo) -> Self {
        Value::Pseudo(value)
    }
}

impl From<Props> for Value {
    fn from(value: Props) -> Self {
        Value::Map(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::List(value)
    }
}

impl From<&Value> for Value {
    fn from(value: &Value) -> Self {
        value.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concat_merges_adjacent_literals() {
        let value = Value::from("arn:") + "aws" + ":logs";
        assert_eq!(value, Value::str("arn:aws:logs"));
    }

    #[test]
    fn test_concat_with_token_builds_join() {
        let value = Value::from("arn:") + Pseudo::Partition + ":iam::" + Pseudo::AccountId;
        assert_eq!(
            value,
            Value::Join(vec![
                Value::str("arn:"),
                Value::Pseudo(Pseudo::Partition),
                Value::str(":iam::"),
                Value::Pseudo(Pseudo::AccountId),
            ])
        );
    }

    #[test]
    fn test_concat_flattens_nested_joins() {
        let left = Value::from("a") + Pseudo::Region;
        let right = Value::from("b") + Pseudo::UrlSuffix;
        let joined = left + right;
        let Value::Join(parts) = joined else {
            panic!("expected join");
        };
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[2], Value::str("b"));
    }

    #[test]
    fn test_tokens_render_as_intrinsics() {
        assert_eq!(Value::Ref("Api".into()).to_json(), json!({"Ref": "Api"}));
        assert_eq!(
            Value::GetAtt {
                logical: "Api".into(),
                attribute: "RootResourceId".into()
            }
            .to_json(),
            json!({"Fn::GetAtt": ["Api", "RootResourceId"]})
        );
        assert_eq!(
            (Value::from("x.") + Pseudo::UrlSuffix).to_json(),
            json!({"Fn::Join": ["", ["x.", {"Ref": "AWS::URLSuffix"}]]})
        );
    }

    #[test]
    fn test_props_macro() {
        let props = props! { "Name" => "api", "Ttl" => 300i64 };
        assert_eq!(props.get("Name"), Some(&Value::str("api")));
        assert_eq!(props.get("Ttl"), Some(&Value::Int(300)));
    }
}
