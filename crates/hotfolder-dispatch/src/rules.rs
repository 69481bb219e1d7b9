//! Rule table resolved from the validated configuration.
//!
//! # Design
//! - Built once at startup; shared read-only as `Arc<RuleSet>`.
//! - Rules iterate in rule-name order so dispatch logs are deterministic.

use std::fmt;
use std::path::PathBuf;

use hotfolder_config::ValidatedConfig;

use crate::error::{DispatchError, DispatchResult};
use crate::model::Rule;

/// Immutable, ordered collection of rules.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    /// Wrap already-built rules, keeping their order.
    #[must_use]
    pub const fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    /// Expand every rule's group and directory names into a [`Rule`].
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::UnresolvedReference`] when a rule names a
    /// table entry that does not exist, and [`DispatchError::InvalidInput`]
    /// when a resolved rule ends up without formats, sources or destinations.
    pub fn from_config(config: &ValidatedConfig) -> DispatchResult<Self> {
        let mut rules = Vec::with_capacity(config.rules().len());
        for (name, spec) in config.rules() {
            let mut formats = Vec::new();
            for group in &spec.formats {
                let extensions = config
                    .formats()
                    .get(group)
                    .ok_or_else(|| unresolved(name, "format", group))?;
                formats.extend(extensions.iter().cloned());
            }
            let sources = resolve_paths(name, "source", &spec.sources, |key| {
                config.sources().get(key).cloned()
            })?;
            let destinations = resolve_paths(name, "destination", &spec.destinations, |key| {
                config.destinations().get(key).cloned()
            })?;
            rules.push(Rule::new(name.clone(), formats, sources, destinations)?);
        }
        Ok(Self { rules })
    }

    /// Iterate rules in order.
    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter()
    }

    /// Number of rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the table holds no rule.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl<'a> IntoIterator for &'a RuleSet {
    type Item = &'a Rule;
    type IntoIter = std::slice::Iter<'a, Rule>;

    fn into_iter(self) -> Self::IntoIter {
        self.rules.iter()
    }
}

fn resolve_paths(
    rule: &str,
    kind: &'static str,
    names: &[String],
    lookup: impl Fn(&str) -> Option<PathBuf>,
) -> DispatchResult<Vec<PathBuf>> {
    names
        .iter()
        .map(|name| lookup(name).ok_or_else(|| unresolved(rule, kind, name)))
        .collect()
}

fn unresolved(rule: &str, kind: &'static str, name: &str) -> DispatchError {
    DispatchError::UnresolvedReference {
        rule: rule.to_string(),
        kind,
        name: name.to_string(),
    }
}

impl fmt::Display for RuleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for rule in &self.rules {
            let formats: Vec<_> = rule.formats().iter().map(String::as_str).collect();
            writeln!(f, "{} [{}]", rule.name(), formats.join(", "))?;
            for source in rule.sources() {
                writeln!(f, "  from {}", source.display())?;
            }
            for destination in rule.destinations() {
                writeln!(f, "  to   {}", destination.display())?;
            }
        }
        Ok(())
    }
}
