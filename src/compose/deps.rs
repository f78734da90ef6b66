//! Dependency Collection
//!
//! The deployment of a REST API must depend on every method under it,
//! including nested and synthesized ones, or it can be created before the
//! routes it is supposed to publish.

use super::path::PathNode;
use crate::error::{InvariantViolation, Result};
use crate::resource::{ResourceRef, Template, REST_METHOD};
use std::collections::HashSet;

/// Every method identifier in the subtree, depth-first, declared methods
/// before the node's CORS method
pub fn collect_method_ids(root: &PathNode) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut ids = Vec::new();
    root.walk(&mut |node| {
        for method in node.methods.iter().chain(node.cors_method.iter()) {
            if seen.insert(method.logical_name.as_str()) {
                ids.push(method.logical_name.clone());
            }
        }
    });
    ids
}

/// Abort if any method attached to `rest_api` is missing from `collected`
pub fn verify_exhaustive(
    template: &Template,
    rest_api: &ResourceRef,
    deployment: &str,
    collected: &[String],
) -> Result<()> {
    let api = rest_api.reference();
    let collected: HashSet<&str> = collected.iter().map(String::as_str).collect();
    for (logical, record) in template.of_kind(REST_METHOD) {
        if record.properties.get("RestApiId") != Some(&api) {
            continue;
        }
        if !collected.contains(logical.as_str()) {
            tracing::error!("deployment {} misses method {}", deployment, logical);
            return Err(InvariantViolation::MissingDependency {
                deployment: deployment.to_string(),
                method: logical.clone(),
            }
            .into());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::method::Method;
    use crate::compose::path::{build_tree, PathContext, PathDecl, PathTree};
    use crate::error::ComposeError;
    use crate::props;
    use crate::resource::{Value, REST_API};

    fn three_levels(template: &mut Template, api: &ResourceRef) -> PathNode {
        let uri = Value::str("uri");
        let ctx = PathContext {
            rest_api: api,
            integration_uri: &uri,
            cors: None,
            auth: None,
        };
        let decl = PathDecl::parse("/a")
            .unwrap()
            .method(Method::Get)
            .unwrap()
            .path(
                PathDecl::parse("b")
                    .unwrap()
                    .method(Method::Post)
                    .unwrap()
                    .path(
                        PathDecl::parse("c")
                            .unwrap()
                            .method(Method::Put)
                            .unwrap()
                            .method(Method::Delete)
                            .unwrap()
                            .with_cors(true),
                    ),
            );
        let tree = PathTree::from_decls(vec![decl]).unwrap();
        build_tree(template, &ctx, tree).unwrap()
    }

    #[test]
    fn test_collects_every_level_and_cors() {
        let mut template = Template::new();
        let api = template
            .add("Api", REST_API, props! { "Name" => "dev-svc" }, vec![])
            .unwrap();
        let root = three_levels(&mut template, &api);
        let ids = collect_method_ids(&root);
        assert_eq!(ids.len(), 5);
        assert_eq!(ids.len(), template.of_kind(REST_METHOD).count());
        assert_eq!(
            ids,
            vec![
                "MethodaGET",
                "MethodabPOST",
                "MethodabcPUT",
                "MethodabcDELETE",
                "MethodabcOPTIONS"
            ]
        );
        assert!(verify_exhaustive(&template, &api, "Deployment", &ids).is_ok());
    }

    #[test]
    fn test_missing_method_is_invariant_violation() {
        let mut template = Template::new();
        let api = template
            .add("Api", REST_API, props! { "Name" => "dev-svc" }, vec![])
            .unwrap();
        let root = three_levels(&mut template, &api);
        let mut ids = collect_method_ids(&root);
        ids.pop();
        let err = verify_exhaustive(&template, &api, "Deployment", &ids).unwrap_err();
        assert!(matches!(
            err,
            ComposeError::Invariant(InvariantViolation::MissingDependency { .. })
        ));
    }
}
