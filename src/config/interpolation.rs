//! `${name}` placeholder interpolation.
//!
//! # Rules
//! - `${a.b}` names a node by dotted path from the root of the tree
//! - A string that is exactly one placeholder takes the referent's value with
//!   its type: numbers stay numbers, mappings are copied whole
//! - Placeholders embedded in longer text are spliced in as scalar text
//! - A whole placeholder whose referent holds a `_target_` is left in place;
//!   the instantiator resolves it to the shared constructed object
//!
//! # Termination
//! Referents are settled depth first, so a copied subtree never carries an
//! unresolved placeholder. A node reached again while it is still being
//! settled, including an ancestor of the placeholder itself, fails with
//! [`ConfigError::CyclicPlaceholder`]. Each hop of a reference chain counts
//! as one pass, and a chain longer than the pass bound fails the same way.

use std::collections::{HashMap, HashSet};

use crate::config::loader::ConfigError;
use crate::config::node::{ConfigNode, ConfigPath, Scalar};

/// Pass bound used when the launcher settings do not override it.
pub const DEFAULT_MAX_PASSES: usize = 32;

const OPEN: &str = "${";
const CLOSE: char = '}';

/// Resolve every placeholder in `tree`.
pub fn interpolate(tree: &ConfigNode, max_passes: usize) -> Result<ConfigNode, ConfigError> {
    let mut resolver = Resolver::new(tree, max_passes.max(1));
    let resolved = resolver.resolve(tree, &ConfigPath::root())?;
    tracing::debug!(references = resolver.followed, "interpolation converged");
    Ok(resolved)
}

/// True if `s` contains at least one `${`.
pub fn has_placeholder(s: &str) -> bool {
    s.contains(OPEN)
}

/// The referenced name when `s` is exactly one placeholder.
pub fn whole_placeholder(s: &str) -> Option<&str> {
    let name = s.strip_prefix(OPEN)?.strip_suffix(CLOSE)?.trim();
    if name.is_empty() || name.contains(OPEN) || name.contains(CLOSE) {
        return None;
    }
    Some(name)
}

#[derive(Debug, PartialEq)]
enum Segment<'a> {
    Text(&'a str),
    Placeholder(&'a str),
}

fn parse_segments(s: &str) -> Result<Vec<Segment<'_>>, String> {
    let mut segments = Vec::new();
    let mut rest = s;

    while let Some(start) = rest.find(OPEN) {
        if start > 0 {
            segments.push(Segment::Text(&rest[..start]));
        }
        let after = &rest[start + OPEN.len()..];
        let end = after
            .find(CLOSE)
            .ok_or_else(|| format!("unterminated placeholder in `{s}`"))?;
        let name = after[..end].trim();
        if name.is_empty() {
            return Err(format!("empty placeholder in `{s}`"));
        }
        if name.contains(OPEN) {
            return Err(format!("nested placeholders are not supported in `{s}`"));
        }
        segments.push(Segment::Placeholder(name));
        rest = &after[end + 1..];
    }
    if !rest.is_empty() {
        segments.push(Segment::Text(rest));
    }
    Ok(segments)
}

/// Depth-first settling of the tree rooted at `root`.
struct Resolver<'a> {
    root: &'a ConfigNode,
    max_depth: usize,
    settled: HashMap<ConfigPath, ConfigNode>,
    visiting: HashSet<ConfigPath>,
    chain: Vec<(ConfigPath, String)>,
    followed: usize,
}

impl<'a> Resolver<'a> {
    fn new(root: &'a ConfigNode, max_depth: usize) -> Self {
        Self {
            root,
            max_depth,
            settled: HashMap::new(),
            visiting: HashSet::new(),
            chain: Vec::new(),
            followed: 0,
        }
    }

    /// Settled value of `node`, which sits at `path` in the source tree.
    fn resolve(&mut self, node: &ConfigNode, path: &ConfigPath) -> Result<ConfigNode, ConfigError> {
        if let Some(done) = self.settled.get(path) {
            return Ok(done.clone());
        }
        if !self.visiting.insert(path.clone()) {
            return Err(self.cycle(path));
        }

        let resolved = match node {
            ConfigNode::Scalar(Scalar::String(s)) if has_placeholder(s) => {
                self.resolve_string(s, path)?
            }
            ConfigNode::Scalar(_) => node.clone(),
            ConfigNode::Sequence(items) => {
                let mut out = Vec::with_capacity(items.len());
                for (idx, item) in items.iter().enumerate() {
                    out.push(self.resolve(item, &path.index(idx))?);
                }
                ConfigNode::Sequence(out)
            }
            ConfigNode::Mapping(map) => {
                let mut out = map.clone();
                for (key, value) in out.iter_mut() {
                    *value = self.resolve(value, &path.child(key))?;
                }
                ConfigNode::Mapping(out)
            }
        };

        self.visiting.remove(path);
        self.settled.insert(path.clone(), resolved.clone());
        Ok(resolved)
    }

    fn resolve_string(&mut self, s: &str, path: &ConfigPath) -> Result<ConfigNode, ConfigError> {
        if let Some(name) = whole_placeholder(s) {
            if self.is_component(name) {
                return Ok(ConfigNode::string(s));
            }
            // A deferred alias comes back as its own placeholder string.
            return self.follow(name, path);
        }

        let segments = parse_segments(s).map_err(|reason| ConfigError::Interpolation {
            path: path.clone(),
            reason,
        })?;

        let mut out = String::with_capacity(s.len());
        for segment in segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Placeholder(name) => {
                    if self.is_component(name) {
                        return Err(embedded_component(path, name));
                    }
                    match self.follow(name, path)? {
                        ConfigNode::Scalar(Scalar::String(inner)) if has_placeholder(&inner) => {
                            return Err(embedded_component(path, name));
                        }
                        ConfigNode::Scalar(scalar) => out.push_str(&scalar.to_string()),
                        other => {
                            return Err(ConfigError::Interpolation {
                                path: path.clone(),
                                reason: format!(
                                    "`${{{name}}}` is a {} and cannot be embedded in text",
                                    other.kind()
                                ),
                            });
                        }
                    }
                }
            }
        }
        Ok(ConfigNode::string(out))
    }

    /// True when the source node named `name` holds a `_target_`.
    fn is_component(&self, name: &str) -> bool {
        self.root.lookup(name).is_some_and(ConfigNode::contains_target)
    }

    /// Settled value of the referent `name`, for a placeholder at `path`.
    fn follow(&mut self, name: &str, path: &ConfigPath) -> Result<ConfigNode, ConfigError> {
        if self.chain.len() >= self.max_depth {
            return Err(ConfigError::CyclicPlaceholder {
                path: path.clone(),
                placeholder: name.to_string(),
            });
        }
        self.followed += 1;
        self.chain.push((path.clone(), name.to_string()));
        let found = self.settled_at(&ConfigPath::parse(name));
        self.chain.pop();

        found?.ok_or_else(|| ConfigError::UnresolvedPlaceholder {
            path: path.clone(),
            placeholder: name.to_string(),
        })
    }

    /// Walk `target` from the root, settling any placeholder met on the way.
    fn settled_at(&mut self, target: &ConfigPath) -> Result<Option<ConfigNode>, ConfigError> {
        let root = self.root;
        let mut node = root;
        for (depth, segment) in target.segments().iter().enumerate() {
            if matches!(node, ConfigNode::Scalar(Scalar::String(s)) if has_placeholder(s)) {
                let (prefix, rest) = target.split_at(depth);
                let settled = self.resolve(node, &prefix)?;
                return Ok(settled.get_path(&rest).cloned());
            }
            node = match node {
                ConfigNode::Mapping(m) => match m.get(segment) {
                    Some(child) => child,
                    None => return Ok(None),
                },
                ConfigNode::Sequence(items) => {
                    match segment.parse::<usize>().ok().and_then(|idx| items.get(idx)) {
                        Some(child) => child,
                        None => return Ok(None),
                    }
                }
                ConfigNode::Scalar(_) => return Ok(None),
            };
        }
        self.resolve(node, target).map(Some)
    }

    fn cycle(&self, path: &ConfigPath) -> ConfigError {
        let (path, placeholder) = self
            .chain
            .last()
            .cloned()
            .unwrap_or_else(|| (path.clone(), path.to_string()));
        ConfigError::CyclicPlaceholder { path, placeholder }
    }
}

fn embedded_component(path: &ConfigPath, name: &str) -> ConfigError {
    ConfigError::Interpolation {
        path: path.clone(),
        reason: format!("`${{{name}}}` is a component and cannot be embedded in text"),
    }
}
