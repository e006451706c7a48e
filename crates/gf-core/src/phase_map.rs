//! Phase → agent-role resolution.
//!
//! The table is static by default and can be overridden per phase from
//! configuration. Resolution never falls back to another agent: a phase with
//! no mapped role is a configuration error.

use std::collections::BTreeMap;

use crate::config::ConfigError;
use crate::types::{AgentRole, PhaseType};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseAgentMap {
    entries: BTreeMap<PhaseType, AgentRole>,
}

impl Default for PhaseAgentMap {
    fn default() -> Self {
        let entries = BTreeMap::from([
            (PhaseType::Spec, AgentRole::SpecWriter),
            (PhaseType::Plan, AgentRole::Planner),
            (PhaseType::Code, AgentRole::Coder),
            (PhaseType::Qa, AgentRole::Qa),
            (PhaseType::Review, AgentRole::QaReviewer),
        ]);
        Self { entries }
    }
}

impl PhaseAgentMap {
    /// An empty table. Every lookup fails until entries are inserted.
    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// The default table with `overrides` applied on top, validated.
    pub fn with_overrides<I>(overrides: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (PhaseType, AgentRole)>,
    {
        let mut map = Self::default();
        for (phase, role) in overrides {
            map.entries.insert(phase, role);
        }
        map.validate()?;
        Ok(map)
    }

    pub fn insert(&mut self, phase: PhaseType, role: AgentRole) {
        self.entries.insert(phase, role);
    }

    pub fn remove(&mut self, phase: PhaseType) -> Option<AgentRole> {
        self.entries.remove(&phase)
    }

    /// Role responsible for `phase`.
    pub fn resolve(&self, phase: PhaseType) -> Result<AgentRole, ConfigError> {
        self.entries
            .get(&phase)
            .copied()
            .ok_or_else(|| ConfigError::UnmappedPhase(phase.to_string()))
    }

    /// All phases `role` is responsible for, in canonical order.
    pub fn phases_for(&self, role: AgentRole) -> Vec<PhaseType> {
        self.entries
            .iter()
            .filter(|(_, r)| **r == role)
            .map(|(p, _)| *p)
            .collect()
    }

    /// Distinct roles referenced by the table, in phase order.
    pub fn roles(&self) -> Vec<AgentRole> {
        let mut roles: Vec<AgentRole> = Vec::new();
        for role in self.entries.values() {
            if !roles.contains(role) {
                roles.push(*role);
            }
        }
        roles
    }

    pub fn iter(&self) -> impl Iterator<Item = (PhaseType, AgentRole)> + '_ {
        self.entries.iter().map(|(p, r)| (*p, *r))
    }

    /// A role may own several phases only if those phases are adjacent in
    /// canonical order.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for role in self.roles() {
            let indices: Vec<usize> = self.phases_for(role).iter().map(|p| p.index()).collect();
            let contiguous = indices.windows(2).all(|w| w[1] == w[0] + 1);
            if !contiguous {
                return Err(ConfigError::Validation(format!(
                    "phase_agents: role '{role}' is mapped to non-adjacent phases"
                )));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_resolves_every_phase() {
        let map = PhaseAgentMap::default();
        assert_eq!(map.resolve(PhaseType::Spec).unwrap(), AgentRole::SpecWriter);
        assert_eq!(map.resolve(PhaseType::Code).unwrap(), AgentRole::Coder);
        assert_eq!(map.resolve(PhaseType::Review).unwrap(), AgentRole::QaReviewer);
        assert!(map.validate().is_ok());
    }

    #[test]
    fn unmapped_phase_is_an_error() {
        let mut map = PhaseAgentMap::default();
        map.remove(PhaseType::Qa);
        let err = map.resolve(PhaseType::Qa).unwrap_err();
        assert!(matches!(err, ConfigError::UnmappedPhase(ref p) if p == "qa"));
    }

    #[test]
    fn adjacent_reuse_is_allowed() {
        let map = PhaseAgentMap::with_overrides([(PhaseType::Review, AgentRole::Qa)]).unwrap();
        assert_eq!(map.phases_for(AgentRole::Qa), vec![PhaseType::Qa, PhaseType::Review]);
    }

    #[test]
    fn non_adjacent_reuse_is_rejected() {
        let res = PhaseAgentMap::with_overrides([(PhaseType::Review, AgentRole::Coder)]);
        assert!(matches!(res, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn roles_are_distinct_and_ordered() {
        let map = PhaseAgentMap::default();
        assert_eq!(
            map.roles(),
            vec![
                AgentRole::SpecWriter,
                AgentRole::Planner,
                AgentRole::Coder,
                AgentRole::Qa,
                AgentRole::QaReviewer
            ]
        );
    }
}
