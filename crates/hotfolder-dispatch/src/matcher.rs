//! Rule matching strategy.
//!
//! # Design
//! - Matching is a pure decision over current filesystem state; it never mutates anything.
//! - The extension check short-circuits before any filesystem probe.
//! - The membership probe races with concurrent deletes; the executor tolerates that
//!   by failing the affected stage.

use crate::model::{FileTask, Rule};

/// Decides whether a rule applies to a file.
pub trait RuleMatcher: Send + Sync {
    /// Whether `rule` applies to `task`.
    fn matches(&self, task: &FileTask, rule: &Rule) -> bool;
}

/// Default strategy: the extension must be accepted and a file with the same
/// name must exist directly inside one of the rule's sources.
#[derive(Debug, Clone, Copy, Default)]
pub struct SourceMembershipMatcher;

impl RuleMatcher for SourceMembershipMatcher {
    fn matches(&self, task: &FileTask, rule: &Rule) -> bool {
        if !rule.accepts_extension(task.extension()) {
            return false;
        }
        rule.sources()
            .iter()
            .any(|source| source.join(task.file_name()).try_exists().unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;

    type TestResult<T> = anyhow::Result<T>;

    fn rule_for(source: PathBuf) -> TestResult<Rule> {
        Ok(Rule::new(
            "R1",
            ["csv"],
            [source],
            [PathBuf::from("/unused")],
        )?)
    }

    #[test]
    fn extension_and_membership_both_required() -> TestResult<()> {
        let temp = tempfile::tempdir()?;
        let source = temp.path().join("in1");
        fs::create_dir(&source)?;
        let rule = rule_for(source.clone())?;

        let csv = source.join("DATA.CSV");
        fs::write(&csv, b"a,b")?;
        assert!(SourceMembershipMatcher.matches(&FileTask::new(&csv)?, &rule));

        let txt = source.join("notes.txt");
        fs::write(&txt, b"hello")?;
        assert!(!SourceMembershipMatcher.matches(&FileTask::new(&txt)?, &rule));
        Ok(())
    }

    #[test]
    fn files_outside_the_rule_sources_do_not_match() -> TestResult<()> {
        let temp = tempfile::tempdir()?;
        let source = temp.path().join("in1");
        let other = temp.path().join("in2");
        fs::create_dir(&source)?;
        fs::create_dir(&other)?;
        let rule = rule_for(source)?;

        let foreign = other.join("data.csv");
        fs::write(&foreign, b"a,b")?;
        assert!(!SourceMembershipMatcher.matches(&FileTask::new(&foreign)?, &rule));
        Ok(())
    }

    #[test]
    fn nested_files_are_not_members() -> TestResult<()> {
        let temp = tempfile::tempdir()?;
        let source = temp.path().join("in1");
        let nested = source.join("sub");
        fs::create_dir_all(&nested)?;
        let rule = rule_for(source)?;

        let deep = nested.join("data.csv");
        fs::write(&deep, b"a,b")?;
        assert!(!SourceMembershipMatcher.matches(&FileTask::new(&deep)?, &rule));
        Ok(())
    }
}
