//! Method & CORS synthesis
//!
//! Declared verbs become proxy-integrated `AWS::ApiGateway::Method` records.
//! When CORS is on for a path node, one mocked OPTIONS method is added whose
//! allowed-methods header aggregates the verbs declared on that same node.

use super::ident::{self, IdPrefix};
use super::modification::{Modification, OptionalModification};
use super::path::PathContext;
use crate::error::{DeclarationError, Result};
use crate::props;
use crate::resource::{Props, ResourceRef, Template, Value, REST_METHOD};
use std::fmt;
use std::str::FromStr;

const DEFAULT_CORS_ORIGIN: &str = "'*'";
const DEFAULT_CORS_HEADERS: &str =
    "'Content-Type,X-Amz-Date,Authorization,X-Api-Key,X-Amz-Security-Token,X-Amz-User-Agent'";
const DEFAULT_CORS_CREDENTIALS: &str = "'false'";

const HEADER_ORIGIN: &str = "method.response.header.Access-Control-Allow-Origin";
const HEADER_HEADERS: &str = "method.response.header.Access-Control-Allow-Headers";
const HEADER_METHODS: &str = "method.response.header.Access-Control-Allow-Methods";
const HEADER_CREDENTIALS: &str = "method.response.header.Access-Control-Allow-Credentials";

const ORIGIN_TEMPLATE: &str = "#set($origin = $input.params(\"Origin\"))\n#if($origin == \"\") #set($origin = $input.params(\"origin\")) #end\n#if($origin == \"*\") #set($context.responseOverride.header.Access-Control-Allow-Origin = $origin) #end";

/// HTTP verbs accepted by API Gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Any,
    Connect,
    Delete,
    Get,
    Head,
    Options,
    Patch,
    Post,
    Put,
    Trace,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Any => "ANY",
            Method::Connect => "CONNECT",
            Method::Delete => "DELETE",
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
            Method::Patch => "PATCH",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Trace => "TRACE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = DeclarationError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ANY" => Ok(Method::Any),
            "CONNECT" => Ok(Method::Connect),
            "DELETE" => Ok(Method::Delete),
            "GET" => Ok(Method::Get),
            "HEAD" => Ok(Method::Head),
            "OPTIONS" => Ok(Method::Options),
            "PATCH" => Ok(Method::Patch),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "TRACE" => Ok(Method::Trace),
            _ => Err(DeclarationError::UnknownMethod(s.to_string())),
        }
    }
}

/// Header values of the synthesized preflight response
#[derive(Debug, Clone, PartialEq)]
pub struct CorsConfig {
    pub origin: Value,
    pub headers: Value,
    pub credentials: Value,
    /// Filled with the node's verb aggregate before the slot sees it
    pub methods: Value,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            origin: Value::str(DEFAULT_CORS_ORIGIN),
            headers: Value::str(DEFAULT_CORS_HEADERS),
            credentials: Value::str(DEFAULT_CORS_CREDENTIALS),
            methods: Value::str("'*'"),
        }
    }
}

/// Authorization applied to methods under an API with an authorizer
#[derive(Debug, Clone, PartialEq)]
pub struct AuthDescriptor {
    pub auth_type: Value,
    pub authorizer_id: Value,
}

impl AuthDescriptor {
    pub fn custom(authorizer: &ResourceRef) -> Self {
        Self {
            auth_type: Value::str("CUSTOM"),
            authorizer_id: authorizer.reference(),
        }
    }
}

/// A declared verb on a path
#[derive(Debug)]
pub struct MethodDecl {
    verb: Method,
    authorized: bool,
    modification: Modification<Props>,
}

impl MethodDecl {
    pub fn new(verb: Method) -> Self {
        Self {
            verb,
            authorized: true,
            modification: Modification::new(),
        }
    }

    pub fn verb(&self) -> Method {
        self.verb
    }

    /// Skip the API's authorizer for this method
    pub fn without_authorization(mut self) -> Self {
        self.authorized = false;
        self
    }

    pub fn modify(mut self, hook: impl FnOnce(Props) -> Props + 'static) -> Self {
        self.modification.replace(hook);
        self
    }
}

impl From<Method> for MethodDecl {
    fn from(verb: Method) -> Self {
        MethodDecl::new(verb)
    }
}

/// An emitted method record
#[derive(Debug, Clone, PartialEq)]
pub struct MethodNode {
    pub logical_name: String,
    pub verb: Method,
    /// True for the CORS preflight method
    pub synthesized: bool,
}

/// Where methods of one path node attach
pub struct AttachPoint<'a> {
    pub terminal: &'a Value,
    pub normalized_name: &'a str,
    pub path: &'a str,
}

/// Emit declared methods, then the CORS method when requested
pub fn attach(
    template: &mut Template,
    ctx: &PathContext<'_>,
    at: &AttachPoint<'_>,
    methods: Vec<MethodDecl>,
    cors_default: bool,
    mut cors_slot: OptionalModification<CorsConfig>,
) -> Result<(Vec<MethodNode>, Option<MethodNode>)> {
    let cors_wanted = cors_slot.explicit_presence().unwrap_or(cors_default);
    if cors_wanted && methods.iter().any(|m| m.verb == Method::Options) {
        return Err(DeclarationError::CorsMethodConflict {
            path: at.path.to_string(),
        }
        .into());
    }

    let mut nodes = Vec::with_capacity(methods.len());
    for mut decl in methods {
        let auth = ctx.auth.filter(|_| decl.authorized);
        let proposed = method_props(ctx, at.terminal, decl.verb, auth);
        let properties = decl.modification.apply(proposed);
        let logical = ident::allocate(
            template,
            IdPrefix::Method,
            &format!("{}{}", at.normalized_name, decl.verb),
        );
        template.add(logical.clone(), REST_METHOD, properties, vec![])?;
        tracing::debug!("method {} {} -> {}", decl.verb, at.path, logical);
        nodes.push(MethodNode {
            logical_name: logical,
            verb: decl.verb,
            synthesized: false,
        });
    }

    // Sibling set is final here; aggregate from the emitted records so
    // method hooks that rewrite HttpMethod are reflected
    let verbs: Vec<Value> = nodes
        .iter()
        .filter_map(|n| template.get(&n.logical_name))
        .filter_map(|r| r.properties.get("HttpMethod").cloned())
        .collect();
    let base = ctx.cors.cloned().unwrap_or_default();
    let proposed = CorsConfig {
        methods: cors_aggregate(&verbs),
        ..base
    };

    let cors_method = match cors_slot.resolve(cors_default, proposed) {
        None => None,
        Some(config) => {
            let logical = ident::allocate(
                template,
                IdPrefix::Method,
                &format!("{}{}", at.normalized_name, Method::Options),
            );
            template.add(
                logical.clone(),
                REST_METHOD,
                cors_props(ctx, at.terminal, &config),
                vec![],
            )?;
            tracing::debug!("cors method {} -> {}", at.path, logical);
            Some(MethodNode {
                logical_name: logical,
                verb: Method::Options,
                synthesized: true,
            })
        }
    };

    Ok((nodes, cors_method))
}

/// Concrete verbs a preflight advertises for a declared `ANY`
const ANY_VERBS: [Method; 6] = [
    Method::Delete,
    Method::Get,
    Method::Head,
    Method::Patch,
    Method::Post,
    Method::Put,
];

/// Quoted, comma-joined verb list: `'GET,POST'`, or `''` when empty.
/// `ANY` is not a browser verb and expands to [`ANY_VERBS`].
pub fn cors_aggregate(verbs: &[Value]) -> Value {
    let mut expanded: Vec<Value> = Vec::with_capacity(verbs.len());
    for verb in verbs {
        let concrete = if verb.as_literal() == Some(Method::Any.as_str()) {
            ANY_VERBS.iter().map(|m| Value::str(m.as_str())).collect()
        } else {
            vec![verb.clone()]
        };
        for verb in concrete {
            if !expanded.contains(&verb) {
                expanded.push(verb);
            }
        }
    }
    let verbs = expanded.as_slice();
    if verbs.is_empty() {
        return Value::str("''");
    }
    if let Some(literals) = verbs.iter().map(Value::as_literal).collect::<Option<Vec<_>>>() {
        return Value::str(format!("'{}'", literals.join(",")));
    }
    let mut joined = Value::str("'");
    for (i, verb) in verbs.iter().enumerate() {
        if i > 0 {
            joined = joined + ",";
        }
        joined = joined + verb;
    }
    joined + "'"
}

fn method_props(
    ctx: &PathContext<'_>,
    terminal: &Value,
    verb: Method,
    auth: Option<&AuthDescriptor>,
) -> Props {
    let mut properties = props! {
        "HttpMethod" => verb.as_str(),
        "ResourceId" => terminal,
        "RestApiId" => ctx.rest_api.reference(),
        "ApiKeyRequired" => false,
        "RequestParameters" => props! {},
        "MethodResponses" => Value::List(vec![]),
        "AuthorizationType" => "NONE",
        "Integration" => props! {
            "IntegrationHttpMethod" => "POST",
            "Type" => "AWS_PROXY",
            "Uri" => ctx.integration_uri,
        },
    };
    if let Some(auth) = auth {
        properties.insert("AuthorizationType".into(), auth.auth_type.clone());
        properties.insert("AuthorizerId".into(), auth.authorizer_id.clone());
    }
    properties
}

fn cors_props(ctx: &PathContext<'_>, terminal: &Value, config: &CorsConfig) -> Props {
    props! {
        "HttpMethod" => Method::Options.as_str(),
        "ResourceId" => terminal,
        "RestApiId" => ctx.rest_api.reference(),
        "AuthorizationType" => "NONE",
        "RequestParameters" => props! {},
        "MethodResponses" => Value::list([props! {
            "StatusCode" => "200",
            "ResponseParameters" => props! {
                HEADER_ORIGIN => true,
                HEADER_HEADERS => true,
                HEADER_METHODS => true,
                HEADER_CREDENTIALS => true,
            },
            "ResponseModels" => props! {},
        }]),
        "Integration" => props! {
            "Type" => "MOCK",
            "RequestTemplates" => props! { "application/json" => "{statusCode:200}" },
            "ContentHandling" => "CONVERT_TO_TEXT",
            "IntegrationResponses" => Value::list([props! {
                "StatusCode" => "200",
                "ResponseParameters" => props! {
                    HEADER_ORIGIN => &config.origin,
                    HEADER_HEADERS => &config.headers,
                    HEADER_METHODS => &config.methods,
                    HEADER_CREDENTIALS => &config.credentials,
                },
                "ResponseTemplates" => props! { "application/json" => ORIGIN_TEMPLATE },
            }]),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::modification::Outcome;
    use crate::resource::{REST_API, REST_AUTHORIZER};

    struct Fixture {
        template: Template,
        api: ResourceRef,
        uri: Value,
        terminal: Value,
    }

    fn fixture() -> Fixture {
        let mut template = Template::new();
        let api = template
            .add("Api", REST_API, props! { "Name" => "dev-svc" }, vec![])
            .unwrap();
        Fixture {
            template,
            terminal: api.attr("RootResourceId").unwrap(),
            api,
            uri: Value::str("uri"),
        }
    }

    fn run(
        f: &mut Fixture,
        methods: Vec<MethodDecl>,
        cors: Option<&CorsConfig>,
        auth: Option<&AuthDescriptor>,
        slot: OptionalModification<CorsConfig>,
    ) -> Result<(Vec<MethodNode>, Option<MethodNode>)> {
        let ctx = PathContext {
            rest_api: &f.api,
            integration_uri: &f.uri,
            cors,
            auth,
        };
        let at = AttachPoint {
            terminal: &f.terminal,
            normalized_name: "abc",
            path: "/abc",
        };
        attach(&mut f.template, &ctx, &at, methods, cors.is_some(), slot)
    }

    fn allow_methods(template: &Template, logical: &str) -> Value {
        let record = template.get(logical).unwrap();
        record.properties["Integration"].get("IntegrationResponses").unwrap().as_list().unwrap()[0]
            .get("ResponseParameters")
            .unwrap()
            .get(HEADER_METHODS)
            .unwrap()
            .clone()
    }

    #[test]
    fn test_parse_method_case_insensitive() {
        assert_eq!("get".parse::<Method>().unwrap(), Method::Get);
        assert_eq!("Post".parse::<Method>().unwrap(), Method::Post);
        assert!(matches!(
            "FETCH".parse::<Method>(),
            Err(DeclarationError::UnknownMethod(_))
        ));
    }

    #[test]
    fn test_declared_method_is_proxy_integration() {
        let mut f = fixture();
        let (nodes, cors) = run(&mut f, vec![Method::Get.into()], None, None, Default::default()).unwrap();
        assert!(cors.is_none());
        let record = f.template.get(&nodes[0].logical_name).unwrap();
        assert_eq!(nodes[0].logical_name, "MethodabcGET");
        assert_eq!(record.properties["AuthorizationType"], Value::str("NONE"));
        assert_eq!(
            record.properties["Integration"].get("Type"),
            Some(&Value::str("AWS_PROXY"))
        );
        assert_eq!(record.properties["Integration"].get("Uri"), Some(&Value::str("uri")));
    }

    #[test]
    fn test_cors_aggregates_sibling_verbs() {
        let mut f = fixture();
        let base = CorsConfig::default();
        let (nodes, cors) = run(
            &mut f,
            vec![Method::Get.into(), Method::Post.into()],
            Some(&base),
            None,
            Default::default(),
        )
        .unwrap();
        assert_eq!(nodes.len(), 2);
        let cors = cors.unwrap();
        assert!(cors.synthesized);
        assert_eq!(cors.logical_name, "MethodabcOPTIONS");
        assert_eq!(allow_methods(&f.template, &cors.logical_name), Value::str("'GET,POST'"));
        let record = f.template.get(&cors.logical_name).unwrap();
        assert_eq!(record.properties["Integration"].get("Type"), Some(&Value::str("MOCK")));
    }

    #[test]
    fn test_cors_with_no_methods_has_empty_aggregate() {
        let mut f = fixture();
        let base = CorsConfig::default();
        let (nodes, cors) = run(&mut f, vec![], Some(&base), None, Default::default()).unwrap();
        assert!(nodes.is_empty());
        assert_eq!(allow_methods(&f.template, &cors.unwrap().logical_name), Value::str("''"));
    }

    #[test]
    fn test_cors_suppressed_keeps_declared_methods() {
        let mut f = fixture();
        let base = CorsConfig::default();
        let mut slot = OptionalModification::new();
        slot.decide(|_| Outcome::Absent);
        let (nodes, cors) = run(&mut f, vec![Method::Get.into()], Some(&base), None, slot).unwrap();
        assert!(cors.is_none());
        assert_eq!(nodes.len(), 1);
        assert_eq!(f.template.of_kind(REST_METHOD).count(), 1);
    }

    #[test]
    fn test_cors_kept_without_api_default() {
        let mut f = fixture();
        let mut slot = OptionalModification::new();
        slot.keep();
        let (_, cors) = run(&mut f, vec![Method::Put.into()], None, None, slot).unwrap();
        assert_eq!(allow_methods(&f.template, &cors.unwrap().logical_name), Value::str("'PUT'"));
    }

    #[test]
    fn test_cors_modify_overrides_origin() {
        let mut f = fixture();
        let base = CorsConfig::default();
        let mut slot = OptionalModification::new();
        slot.modify(|config: CorsConfig| CorsConfig {
            origin: Value::str("'https://example.com'"),
            ..config
        });
        let (_, cors) = run(&mut f, vec![Method::Get.into()], Some(&base), None, slot).unwrap();
        let record = f.template.get(&cors.unwrap().logical_name).unwrap();
        let params = record.properties["Integration"].get("IntegrationResponses").unwrap().as_list().unwrap()[0]
            .get("ResponseParameters")
            .unwrap()
            .clone();
        assert_eq!(params.get(HEADER_ORIGIN), Some(&Value::str("'https://example.com'")));
        assert_eq!(params.get(HEADER_METHODS), Some(&Value::str("'GET'")));
    }

    #[test]
    fn test_declared_options_conflicts_with_cors() {
        let mut f = fixture();
        let base = CorsConfig::default();
        let err = run(&mut f, vec![Method::Options.into()], Some(&base), None, Default::default())
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::ComposeError::Declaration(DeclarationError::CorsMethodConflict { .. })
        ));
    }

    #[test]
    fn test_declared_options_conflicts_despite_absent_decision() {
        let mut f = fixture();
        let base = CorsConfig::default();
        let mut slot = OptionalModification::new();
        slot.decide(|_| Outcome::Absent);
        let err = run(&mut f, vec![Method::Options.into()], Some(&base), None, slot).unwrap_err();
        assert!(matches!(
            err,
            crate::error::ComposeError::Declaration(DeclarationError::CorsMethodConflict { .. })
        ));

        let mut slot = OptionalModification::new();
        slot.remove();
        let (nodes, cors) = run(&mut f, vec![Method::Options.into()], Some(&base), None, slot).unwrap();
        assert!(cors.is_none());
        assert_eq!(nodes[0].verb, Method::Options);
    }

    #[test]
    fn test_authorizer_applied_unless_opted_out() {
        let mut f = fixture();
        let authorizer = f
            .template
            .add(
                "Auth",
                REST_AUTHORIZER,
                props! { "Name" => "a", "RestApiId" => "x", "Type" => "TOKEN" },
                vec![],
            )
            .unwrap();
        let auth = AuthDescriptor::custom(&authorizer);
        let (nodes, _) = run(
            &mut f,
            vec![
                Method::Get.into(),
                MethodDecl::new(Method::Post).without_authorization(),
            ],
            None,
            Some(&auth),
            Default::default(),
        )
        .unwrap();
        let get = f.template.get(&nodes[0].logical_name).unwrap();
        let post = f.template.get(&nodes[1].logical_name).unwrap();
        assert_eq!(get.properties["AuthorizationType"], Value::str("CUSTOM"));
        assert_eq!(get.properties["AuthorizerId"], Value::Ref("Auth".into()));
        assert_eq!(post.properties["AuthorizationType"], Value::str("NONE"));
        assert!(!post.properties.contains_key("AuthorizerId"));
    }

    #[test]
    fn test_aggregate_expands_any() {
        let verbs = vec![Value::str("GET"), Value::str("ANY")];
        assert_eq!(
            cors_aggregate(&verbs),
            Value::str("'GET,DELETE,HEAD,PATCH,POST,PUT'")
        );
    }

    #[test]
    fn test_declared_any_preflight_lists_concrete_verbs() {
        let mut f = fixture();
        let base = CorsConfig::default();
        let (_, cors) = run(&mut f, vec![Method::Any.into()], Some(&base), None, Default::default()).unwrap();
        assert_eq!(
            allow_methods(&f.template, &cors.unwrap().logical_name),
            Value::str("'DELETE,GET,HEAD,PATCH,POST,PUT'")
        );
    }

    #[test]
    fn test_aggregate_with_token_verb() {
        let verbs = vec![Value::str("GET"), Value::Ref("Verb".into())];
        assert_eq!(
            cors_aggregate(&verbs),
            Value::Join(vec![
                Value::str("'GET,"),
                Value::Ref("Verb".into()),
                Value::str("'"),
            ])
        );
    }
}
