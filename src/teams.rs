//! Team membership and subsystem responsibilities.

use indexmap::IndexMap;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::config::{ConfigError, ConfigWarning, TeamEntry};
use crate::identity::AliasTable;
use crate::subsystem::SubsystemMapper;

/// A team after member normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Team {
    pub id: String,
    pub name: String,
    pub description: String,
    pub members: BTreeSet<String>,
}

/// Lookup from developers to teams and from subsystems to responsible teams.
#[derive(Debug, Clone, Default)]
pub struct TeamDirectory {
    teams: BTreeMap<String, Team>,
    /// developer slug -> team ids
    membership: BTreeMap<String, BTreeSet<String>>,
    /// subsystem -> team ids
    responsibilities: BTreeMap<String, BTreeSet<String>>,
}

impl TeamDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `teams.json` and `team_subsystem_responsibilities.json`.
    ///
    /// Members listed under an alias are normalized to their canonical slug.
    /// Responsibilities naming an unknown team are errors; naming a subsystem
    /// no repository declares is only a warning.
    pub fn build(
        teams: &IndexMap<String, TeamEntry>,
        responsibilities: &IndexMap<String, Vec<String>>,
        identities: &AliasTable,
        mapper: &SubsystemMapper,
    ) -> Result<(Self, Vec<ConfigWarning>), Vec<ConfigError>> {
        let mut directory = TeamDirectory::new();
        let mut warnings = Vec::new();
        let mut errors = Vec::new();

        for (id, entry) in teams {
            let mut members = BTreeSet::new();
            for member in &entry.members {
                let member = member.trim();
                if member.is_empty() {
                    continue;
                }
                let canonical = match identities.canonical_of(member) {
                    Some(canonical) if canonical != member => {
                        warnings.push(ConfigWarning::MemberIsAlias {
                            team: id.clone(),
                            member: member.to_string(),
                            canonical: canonical.to_string(),
                        });
                        canonical.to_string()
                    }
                    _ => member.to_string(),
                };
                directory
                    .membership
                    .entry(canonical.clone())
                    .or_default()
                    .insert(id.clone());
                members.insert(canonical);
            }
            let name = if entry.name.trim().is_empty() {
                id.clone()
            } else {
                entry.name.clone()
            };
            directory.teams.insert(
                id.clone(),
                Team {
                    id: id.clone(),
                    name,
                    description: entry.description.clone(),
                    members,
                },
            );
        }

        let known_subsystems = mapper.configured_subsystems();
        for (team, subsystems) in responsibilities {
            if !directory.teams.contains_key(team) {
                errors.push(ConfigError::UnknownTeam { team: team.clone() });
                continue;
            }
            for subsystem in subsystems {
                if !known_subsystems.contains(subsystem) {
                    warnings.push(ConfigWarning::UnknownSubsystem {
                        team: team.clone(),
                        subsystem: subsystem.clone(),
                    });
                }
                directory
                    .responsibilities
                    .entry(subsystem.clone())
                    .or_default()
                    .insert(team.clone());
            }
        }

        if errors.is_empty() {
            Ok((directory, warnings))
        } else {
            Err(errors)
        }
    }

    /// Teams a developer belongs to; empty when none.
    pub fn teams_of(&self, developer: &str) -> impl Iterator<Item = &str> {
        self.membership
            .get(developer)
            .into_iter()
            .flat_map(|ids| ids.iter().map(String::as_str))
    }

    /// Teams responsible for a subsystem.
    pub fn responsible_teams(&self, subsystem: &str) -> Vec<String> {
        self.responsibilities
            .get(subsystem)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn team(&self, id: &str) -> Option<&Team> {
        self.teams.get(id)
    }

    pub fn teams(&self) -> impl Iterator<Item = &Team> {
        self.teams.values()
    }

    pub fn len(&self) -> usize {
        self.teams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.teams.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::IgnoreList;

    fn team(members: &[&str]) -> TeamEntry {
        TeamEntry {
            name: String::new(),
            description: String::new(),
            members: members.iter().map(|m| m.to_string()).collect(),
        }
    }

    fn alias_table() -> AliasTable {
        let aliases: IndexMap<String, Vec<String>> = [(
            "jdoe".to_string(),
            vec!["john.doe@x.com".to_string(), "J. Doe <j@x.com>".to_string()],
        )]
        .into_iter()
        .collect();
        AliasTable::build(&aliases, IgnoreList::default()).unwrap()
    }

    #[test]
    fn test_members_and_responsibilities() {
        let teams: IndexMap<String, TeamEntry> = [
            ("payments".to_string(), team(&["jdoe", "ann"])),
            ("platform".to_string(), team(&["ann"])),
        ]
        .into_iter()
        .collect();
        let resp: IndexMap<String, Vec<String>> =
            [("payments".to_string(), vec!["billing".to_string()])]
                .into_iter()
                .collect();

        let (dir, warnings) =
            TeamDirectory::build(&teams, &resp, &alias_table(), &SubsystemMapper::new()).unwrap();
        let ann: Vec<&str> = dir.teams_of("ann").collect();
        assert_eq!(ann, vec!["payments", "platform"]);
        assert_eq!(dir.teams_of("nobody").count(), 0);
        assert_eq!(dir.responsible_teams("billing"), vec!["payments"]);
        assert_eq!(dir.team("payments").unwrap().name, "payments");
        // billing is not declared by any repository
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn test_alias_members_are_normalized() {
        let teams: IndexMap<String, TeamEntry> =
            [("payments".to_string(), team(&["john.doe@x.com"]))]
                .into_iter()
                .collect();
        let (dir, warnings) = TeamDirectory::build(
            &teams,
            &IndexMap::new(),
            &alias_table(),
            &SubsystemMapper::new(),
        )
        .unwrap();
        assert_eq!(dir.teams_of("jdoe").collect::<Vec<_>>(), vec!["payments"]);
        assert!(matches!(warnings[0], ConfigWarning::MemberIsAlias { .. }));
    }

    #[test]
    fn test_unknown_team_in_responsibilities_is_an_error() {
        let resp: IndexMap<String, Vec<String>> =
            [("ghosts".to_string(), vec!["billing".to_string()])]
                .into_iter()
                .collect();
        let errors = TeamDirectory::build(
            &IndexMap::new(),
            &resp,
            &AliasTable::default(),
            &SubsystemMapper::new(),
        )
        .unwrap_err();
        assert!(matches!(errors[0], ConfigError::UnknownTeam { .. }));
    }
}
