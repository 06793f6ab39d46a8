//! Grouping and matching of fallback rules.
//!
//! Rules are grouped by source cluster/workspace so that each source is
//! listed once per cycle. Within a group, job-specific rules are consulted
//! before generic ones.

use std::collections::BTreeMap;

use crate::model::{FallbackRule, JobRun};

/// Identifies a source location: one cluster/workspace pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SourceKey {
    pub cluster_id: String,
    pub workspace_id: String,
}

impl SourceKey {
    pub fn of(rule: &FallbackRule) -> Self {
        Self {
            cluster_id: rule.source.cluster_id.clone(),
            workspace_id: rule.source.workspace_id.clone(),
        }
    }
}

impl std::fmt::Display for SourceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.cluster_id, self.workspace_id)
    }
}

/// All rules for one source, split by precedence.
///
/// Both lists keep the order in which the rule store returned the rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleGroup {
    pub source: SourceKey,

    /// Rules scoped to a single job (higher precedence).
    pub job_specific: Vec<FallbackRule>,

    /// Rules applying to every job in the source.
    pub generic: Vec<FallbackRule>,
}

impl RuleGroup {
    pub fn new(source: SourceKey) -> Self {
        Self {
            source,
            job_specific: Vec::new(),
            generic: Vec::new(),
        }
    }

    /// Add a rule to the list matching its scope.
    pub fn push(&mut self, rule: FallbackRule) {
        if rule.is_generic() {
            self.generic.push(rule);
        } else {
            self.job_specific.push(rule);
        }
    }

    /// Total number of rules in the group.
    pub fn len(&self) -> usize {
        self.job_specific.len() + self.generic.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolve the rule governing `run`. See [`match_rule`].
    pub fn match_run(&self, run: &JobRun) -> Option<&FallbackRule> {
        match_rule(run, self)
    }
}

/// Partition rules by source cluster/workspace.
pub fn group_rules<I>(rules: I) -> BTreeMap<SourceKey, RuleGroup>
where
    I: IntoIterator<Item = FallbackRule>,
{
    let mut groups: BTreeMap<SourceKey, RuleGroup> = BTreeMap::new();

    for rule in rules {
        let key = SourceKey::of(&rule);
        groups
            .entry(key.clone())
            .or_insert_with(|| RuleGroup::new(key))
            .push(rule);
    }

    groups
}

/// Resolve which rule in `group` governs `run`.
///
/// The first job-specific rule whose job id equals the run's application id
/// wins. Otherwise the first generic rule applies, if there is one. Several
/// generic rules for one source should not exist; if they do, the first is
/// used.
pub fn match_rule<'a>(run: &JobRun, group: &'a RuleGroup) -> Option<&'a FallbackRule> {
    group
        .job_specific
        .iter()
        .find(|rule| rule.scoped_job_id() == Some(run.application_id.as_str()))
        .or_else(|| group.generic.first())
}
