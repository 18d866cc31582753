use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Access level on a threat model, ordered from weakest to strongest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Reader,
    Writer,
    Owner,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Reader => write!(f, "reader"),
            Role::Writer => write!(f, "writer"),
            Role::Owner => write!(f, "owner"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleGrant {
    pub subject: String,
    pub role: Role,
}

/// The parent resource of a diagram, as far as the collaboration core needs it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreatModel {
    pub id: Uuid,
    pub name: String,
    pub owner: String,
    #[serde(default)]
    pub authorization: Vec<RoleGrant>,
    #[serde(default)]
    pub diagram_ids: Vec<Uuid>,
}

impl ThreatModel {
    pub fn new(name: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            owner: owner.into(),
            authorization: Vec::new(),
            diagram_ids: Vec::new(),
        }
    }

    pub fn grant(mut self, subject: impl Into<String>, role: Role) -> Self {
        self.authorization.push(RoleGrant {
            subject: subject.into(),
            role,
        });
        self
    }

    /// Strongest role the user holds, the owner always holds `Owner`
    pub fn role_of(&self, user_id: &str) -> Option<Role> {
        if self.owner == user_id {
            return Some(Role::Owner);
        }
        self.authorization
            .iter()
            .filter(|grant| grant.subject == user_id)
            .map(|grant| grant.role)
            .max()
    }

    pub fn contains_diagram(&self, diagram_id: Uuid) -> bool {
        self.diagram_ids.contains(&diagram_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_outranks_grants() {
        let tm = ThreatModel::new("tm", "alice").grant("alice", Role::Reader);
        assert_eq!(tm.role_of("alice"), Some(Role::Owner));
    }

    #[test]
    fn strongest_grant_wins() {
        let tm = ThreatModel::new("tm", "alice")
            .grant("bob", Role::Reader)
            .grant("bob", Role::Writer);
        assert_eq!(tm.role_of("bob"), Some(Role::Writer));
        assert_eq!(tm.role_of("carol"), None);
        assert!(Role::Reader < Role::Writer && Role::Writer < Role::Owner);
    }
}
