//! Path Resource Trees
//!
//! Path declarations are merged into a segment trie per REST API, then
//! emitted depth-first. Each trie node becomes one `AWS::ApiGateway::Resource`
//! rooted at its parent; methods attach to the node's terminal resource,
//! which for the root path is the API's root resource itself.

use super::ident::{self, IdPrefix};
use super::method::{self, AuthDescriptor, CorsConfig, MethodDecl, MethodNode};
use super::modification::{Modification, OptionalModification};
use crate::error::{DeclarationError, Result};
use crate::props;
use crate::resource::{Props, ResourceRef, Template, Value, REST_RESOURCE};
use std::fmt;
use std::str::FromStr;

/// One path segment
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    Literal(String),
    /// Rendered as `{name}`
    Parameter(String),
}

impl PathSegment {
    /// Value of the resource's `PathPart`
    pub fn path_part(&self) -> String {
        match self {
            PathSegment::Literal(part) => part.clone(),
            PathSegment::Parameter(name) => format!("{{{}}}", name),
        }
    }

    fn parse(raw: &str, path: &str) -> std::result::Result<Self, DeclarationError> {
        let malformed = |reason: &str| DeclarationError::MalformedPath {
            path: path.to_string(),
            reason: reason.to_string(),
        };

        if raw.is_empty() {
            return Err(malformed("empty segment"));
        }
        if let Some(inner) = raw.strip_prefix('{').and_then(|r| r.strip_suffix('}')) {
            let name = inner.strip_suffix('+').unwrap_or(inner);
            if name.is_empty() {
                return Err(malformed("empty parameter name"));
            }
            if !name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
            {
                return Err(malformed("parameter names may only contain alphanumerics, '_', '-' and '.'"));
            }
            return Ok(PathSegment::Parameter(inner.to_string()));
        }
        if raw.contains('{') || raw.contains('}') {
            return Err(malformed("unbalanced braces"));
        }
        Ok(PathSegment::Literal(raw.to_string()))
    }
}

/// Ordered path segments; empty for the API root
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct PathSpec {
    segments: Vec<PathSegment>,
}

impl PathSpec {
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse `/abc/{id}/def`; `""` and `"/"` are the root
    pub fn parse(path: &str) -> std::result::Result<Self, DeclarationError> {
        let trimmed = path.strip_prefix('/').unwrap_or(path);
        if trimmed.is_empty() {
            return Ok(Self::root());
        }
        let segments = trimmed
            .split('/')
            .map(|raw| PathSegment::parse(raw, path))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn normalized_name(&self) -> String {
        ident::normalized_name(&self.segments)
    }
}

impl FromStr for PathSpec {
    type Err = DeclarationError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        PathSpec::parse(s)
    }
}

impl fmt::Display for PathSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return write!(f, "/");
        }
        for segment in &self.segments {
            write!(f, "/{}", segment.path_part())?;
        }
        Ok(())
    }
}

/// A declared path with its methods and nested paths
#[derive(Debug, Default)]
pub struct PathDecl {
    spec: PathSpec,
    methods: Vec<MethodDecl>,
    children: Vec<PathDecl>,
    resources: Vec<(usize, Modification<Props>)>,
    cors: OptionalModification<CorsConfig>,
}

impl PathDecl {
    pub fn new(spec: PathSpec) -> Self {
        Self {
            spec,
            ..Self::default()
        }
    }

    pub fn parse(path: &str) -> std::result::Result<Self, DeclarationError> {
        Ok(Self::new(PathSpec::parse(path)?))
    }

    pub fn spec(&self) -> &PathSpec {
        &self.spec
    }

    /// Declare a method on this path's terminal resource
    pub fn method(mut self, method: impl Into<MethodDecl>) -> std::result::Result<Self, DeclarationError> {
        let method = method.into();
        if self.methods.iter().any(|m| m.verb() == method.verb()) {
            return Err(DeclarationError::DuplicateMethod {
                path: self.spec.to_string(),
                verb: method.verb().to_string(),
            });
        }
        self.methods.push(method);
        Ok(self)
    }

    /// Nest a path under this path's terminal resource
    pub fn path(mut self, child: PathDecl) -> Self {
        self.children.push(child);
        self
    }

    /// Rewrite the resource emitted for the first segment equal to `part`
    pub fn modify_resource(
        mut self,
        part: &str,
        hook: impl FnOnce(Props) -> Props + 'static,
    ) -> std::result::Result<Self, DeclarationError> {
        let Some(index) = self
            .spec
            .segments()
            .iter()
            .position(|s| s.path_part() == part)
        else {
            return Err(DeclarationError::UnknownSlot {
                path: self.spec.to_string(),
                segment: part.to_string(),
            });
        };
        if self.resources.iter().any(|(i, _)| *i == index) {
            return Err(DeclarationError::DuplicateResourceModification {
                path: self.spec.to_string(),
            });
        }
        self.resources.push((index, Modification::with(hook)));
        Ok(self)
    }

    /// Force CORS on or off for this path, overriding the API default
    pub fn with_cors(mut self, enabled: bool) -> Self {
        if enabled {
            self.cors.keep();
        } else {
            self.cors.remove();
        }
        self
    }

    /// Full access to this path's CORS slot.
    ///
    /// A declared OPTIONS method conflicts with CORS whenever CORS is on by
    /// presence (API default, `keep` or `modify`), even if a `decide` hook
    /// later returns [`Outcome::Absent`](super::modification::Outcome).
    /// Call `remove` to declare OPTIONS yourself.
    pub fn cors_slot(&mut self) -> &mut OptionalModification<CorsConfig> {
        &mut self.cors
    }
}

// =============================================================================
// Segment trie
// =============================================================================

#[derive(Debug, Default)]
struct TrieNode {
    segment: Option<PathSegment>,
    resource: Option<Modification<Props>>,
    methods: Vec<MethodDecl>,
    terminal: bool,
    cors: Option<OptionalModification<CorsConfig>>,
    children: Vec<TrieNode>,
}

impl TrieNode {
    fn child_mut(&mut self, segment: &PathSegment) -> &mut TrieNode {
        let index = match self
            .children
            .iter()
            .position(|c| c.segment.as_ref() == Some(segment))
        {
            Some(index) => index,
            None => {
                self.children.push(TrieNode {
                    segment: Some(segment.clone()),
                    ..TrieNode::default()
                });
                self.children.len() - 1
            }
        };
        &mut self.children[index]
    }
}

/// All path declarations of one REST API, merged by segment
#[derive(Debug, Default)]
pub struct PathTree {
    root: TrieNode,
}

impl PathTree {
    pub fn from_decls(decls: Vec<PathDecl>) -> std::result::Result<Self, DeclarationError> {
        let mut tree = PathTree::default();
        for decl in decls {
            Self::insert(&mut tree.root, decl, "")?;
        }
        Ok(tree)
    }

    fn insert(
        node: &mut TrieNode,
        decl: PathDecl,
        prefix: &str,
    ) -> std::result::Result<(), DeclarationError> {
        let PathDecl {
            spec,
            methods,
            children,
            mut resources,
            cors,
        } = decl;

        let mut current = node;
        let mut path = prefix.to_string();
        for (index, segment) in spec.segments().iter().enumerate() {
            path.push('/');
            path.push_str(&segment.path_part());
            current = current.child_mut(segment);
            if let Some(pos) = resources.iter().position(|(i, _)| *i == index) {
                let (_, modification) = resources.swap_remove(pos);
                if current.resource.is_some() {
                    return Err(DeclarationError::DuplicateResourceModification { path });
                }
                current.resource = Some(modification);
            }
        }
        let display = if path.is_empty() { "/".to_string() } else { path.clone() };

        current.terminal = true;
        for method in methods {
            if current.methods.iter().any(|m| m.verb() == method.verb()) {
                return Err(DeclarationError::DuplicateMethod {
                    path: display,
                    verb: method.verb().to_string(),
                });
            }
            current.methods.push(method);
        }
        if cors.is_customized() {
            match current.cors.as_mut() {
                Some(existing) => {
                    if !existing.merge(cors) {
                        return Err(DeclarationError::DuplicateCorsModification { path: display });
                    }
                }
                None => current.cors = Some(cors),
            }
        }
        for child in children {
            Self::insert(current, child, &path)?;
        }
        Ok(())
    }
}

// =============================================================================
// Emission
// =============================================================================

/// Everything a path node needs from its enclosing REST API
pub struct PathContext<'a> {
    pub rest_api: &'a ResourceRef,
    pub integration_uri: &'a Value,
    /// Base CORS config when the API requests CORS
    pub cors: Option<&'a CorsConfig>,
    pub auth: Option<&'a AuthDescriptor>,
}

/// One emitted trie node
#[derive(Debug, Clone)]
pub struct PathNode {
    /// Full path from the API root, e.g. `/abc/{id}`
    pub path: String,
    pub normalized_name: String,
    /// `None` for the API root
    pub resource: Option<ResourceRef>,
    /// Resource id token methods at this node attach to
    pub terminal: Value,
    pub methods: Vec<MethodNode>,
    pub cors_method: Option<MethodNode>,
    pub children: Vec<PathNode>,
}

impl PathNode {
    /// Resource records in this subtree, keyed by their path
    pub fn resources_by_path(&self) -> Vec<(&str, &ResourceRef)> {
        let mut out = Vec::new();
        self.walk(&mut |node| {
            if let Some(resource) = &node.resource {
                out.push((node.path.as_str(), resource));
            }
        });
        out
    }

    /// Find a node by its full path
    pub fn find(&self, path: &str) -> Option<&PathNode> {
        if self.path == path {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(path))
    }

    /// Pre-order traversal
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a PathNode)) {
        visit(self);
        for child in &self.children {
            child.walk(visit);
        }
    }
}

/// Emit the whole tree; the returned node is the API root
pub fn build_tree(template: &mut Template, ctx: &PathContext<'_>, tree: PathTree) -> Result<PathNode> {
    let root_id = ctx.rest_api.attr("RootResourceId")?;
    emit_node(template, ctx, tree.root, root_id, "", "")
}

fn emit_node(
    template: &mut Template,
    ctx: &PathContext<'_>,
    node: TrieNode,
    parent: Value,
    parent_name: &str,
    parent_path: &str,
) -> Result<PathNode> {
    let TrieNode {
        segment,
        resource,
        methods,
        terminal,
        cors,
        children,
    } = node;

    let (path, normalized_name, resource_ref, terminal_id) = match segment {
        None => ("/".to_string(), String::new(), None, parent),
        Some(segment) => {
            let path = format!("{}/{}", parent_path, segment.path_part());
            let normalized_name = format!("{}{}", parent_name, ident::normalize_segment(&segment));
            let proposed = props! {
                "ParentId" => parent,
                "PathPart" => segment.path_part(),
                "RestApiId" => ctx.rest_api.reference(),
            };
            let properties = match resource {
                Some(mut modification) => modification.apply(proposed),
                None => proposed,
            };
            let logical = ident::allocate(template, IdPrefix::Resource, &normalized_name);
            let resource_ref = template.add(logical, REST_RESOURCE, properties, vec![])?;
            tracing::debug!("path resource {} -> {}", path, resource_ref.logical_name);
            let terminal_id = resource_ref.reference();
            (path, normalized_name, Some(resource_ref), terminal_id)
        }
    };

    let cors_requested = terminal && ctx.cors.is_some();
    let (methods, cors_method) = method::attach(
        template,
        ctx,
        &method::AttachPoint {
            terminal: &terminal_id,
            normalized_name: &normalized_name,
            path: &path,
        },
        methods,
        cors_requested,
        cors.unwrap_or_default(),
    )?;

    let child_prefix = if path == "/" { "" } else { path.as_str() };
    let children = children
        .into_iter()
        .map(|child| {
            emit_node(
                template,
                ctx,
                child,
                terminal_id.clone(),
                &normalized_name,
                child_prefix,
            )
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(PathNode {
        path,
        normalized_name,
        resource: resource_ref,
        terminal: terminal_id,
        methods,
        cors_method,
        children,
    })
}
