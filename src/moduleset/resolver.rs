// src/moduleset/resolver.rs

//! Dependency ordering
//!
//! Depth-first walk from each seed emitting modules in post-order, so every
//! hard dependency precedes its dependents. Edges of a node are visited as
//! dependencies, then suggests (when enabled), then after edges, each group
//! in declaration order.
//!
//! Modules reached only through an `after` edge are flagged; the caller
//! drops flagged modules unless afters were requested. Reaching a flagged
//! module again through any other edge (or naming it as a seed) clears the
//! flag on it and on everything it pulled in.

use super::ModuleSet;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Edge {
    Dependency,
    Suggests,
    After,
}

/// Skip list entries: literal names and shell-style patterns
///
/// Patterns never skip the exempt modules (the configured `modules` and
/// their hard dependencies), so `skip = ["*"]` restricts a build to those.
#[derive(Debug)]
pub(crate) struct SkipMatcher {
    literals: HashSet<String>,
    patterns: Vec<glob::Pattern>,
    exempt: HashSet<String>,
}

impl SkipMatcher {
    pub(crate) fn new(skip: &[String], exempt: &[String]) -> Self {
        let mut literals = HashSet::new();
        let mut patterns = Vec::new();
        for entry in skip {
            let is_pattern = entry.contains(['*', '?', '[']);
            match glob::Pattern::new(entry) {
                Ok(pattern) if is_pattern => patterns.push(pattern),
                _ => {
                    literals.insert(entry.clone());
                }
            }
        }
        Self {
            literals,
            patterns,
            exempt: exempt.iter().cloned().collect(),
        }
    }

    pub(crate) fn matches(&self, name: &str) -> bool {
        if self.literals.contains(name) {
            return true;
        }
        !self.exempt.contains(name) && self.patterns.iter().any(|p| p.matches(name))
    }
}

pub(crate) struct Resolution {
    /// Package indices in build order with their after-only flag
    pub(crate) order: Vec<(usize, bool)>,
    /// Hard dependencies on modules the catalog does not know
    pub(crate) warnings: Vec<String>,
    /// Hard dependency cycles, as `a -> b -> a` paths
    pub(crate) cycles: Vec<String>,
}

pub(crate) struct Resolver<'a> {
    set: &'a ModuleSet,
    skip: &'a SkipMatcher,
    include_suggests: bool,
    order: Vec<usize>,
    /// Resolved modules mapped to their after-only flag
    after_only: HashMap<usize, bool>,
    /// Current DFS path
    seen: Vec<usize>,
    warnings: Vec<String>,
    cycles: Vec<String>,
}

impl<'a> Resolver<'a> {
    pub(crate) fn new(set: &'a ModuleSet, skip: &'a SkipMatcher, include_suggests: bool) -> Self {
        Self {
            set,
            skip,
            include_suggests,
            order: Vec::new(),
            after_only: HashMap::new(),
            seen: Vec::new(),
            warnings: Vec::new(),
            cycles: Vec::new(),
        }
    }

    pub(crate) fn resolve(mut self, seeds: &[usize]) -> Resolution {
        for &seed in seeds {
            if self.after_only.contains_key(&seed) {
                self.unflag(seed);
            } else {
                self.visit(seed, false);
            }
        }
        let order = self
            .order
            .iter()
            .map(|idx| (*idx, self.after_only[idx]))
            .collect();
        Resolution {
            order,
            warnings: self.warnings,
            cycles: self.cycles,
        }
    }

    fn edges(&self, node: usize) -> Vec<(&'a str, Edge)> {
        let set: &'a ModuleSet = self.set;
        let pkg = set.package_at(node);
        let mut edges: Vec<(&'a str, Edge)> = pkg
            .dependencies
            .iter()
            .map(|d| (d.as_str(), Edge::Dependency))
            .collect();
        if self.include_suggests {
            edges.extend(pkg.suggests.iter().map(|d| (d.as_str(), Edge::Suggests)));
        }
        edges.extend(pkg.after.iter().map(|d| (d.as_str(), Edge::After)));
        edges
    }

    fn visit(&mut self, node: usize, after: bool) {
        self.seen.push(node);

        for (name, kind) in self.edges(node) {
            let edge_after = after || kind == Edge::After;
            let Some(target) = self.set.index_of(name) else {
                if kind == Edge::Dependency {
                    self.warnings.push(format!(
                        "{} has a dependency on unknown \"{}\" module",
                        self.set.package_at(node).name,
                        name
                    ));
                }
                continue;
            };
            if self.skip.matches(name) {
                continue;
            }

            if let Some(&flagged) = self.after_only.get(&target) {
                if flagged && !edge_after {
                    self.unflag(target);
                }
                continue;
            }

            if let Some(pos) = self.seen.iter().position(|&s| s == target) {
                if kind == Edge::Dependency {
                    let mut path: Vec<&str> = self.seen[pos..]
                        .iter()
                        .map(|&idx| self.set.package_at(idx).name.as_str())
                        .collect();
                    path.push(name);
                    self.cycles.push(format!(
                        "Circular dependencies detected: {}",
                        path.join(" -> ")
                    ));
                }
                continue;
            }

            self.visit(target, edge_after);
        }

        self.seen.pop();
        self.order.push(node);
        self.after_only.insert(node, after);
    }

    /// Clear the after-only flag of a module and of what it pulled in
    fn unflag(&mut self, node: usize) {
        if self.after_only.insert(node, false) != Some(true) {
            return;
        }
        for (name, kind) in self.edges(node) {
            if kind == Edge::After {
                continue;
            }
            if let Some(target) = self.set.index_of(name) {
                if self.after_only.get(&target) == Some(&true) {
                    self.unflag(target);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skip_matcher() {
        let matcher = SkipMatcher::new(
            &["gtk-doc".to_string(), "b*".to_string()],
            &["baz".to_string()],
        );
        assert!(matcher.matches("gtk-doc"));
        assert!(matcher.matches("bar"));
        assert!(!matcher.matches("baz"));
        assert!(!matcher.matches("foo"));
    }

    #[test]
    fn test_literal_skip_beats_configured() {
        let matcher = SkipMatcher::new(&["foo".to_string()], &["foo".to_string()]);
        assert!(matcher.matches("foo"));
    }
}
