//! Group based authorization of command invocations.

use crate::commands::CommandDescriptor;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Group whose members may run the admin-only builtins.
pub const ADMIN_GROUP: &str = "admin";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthStrategy {
    /// Anyone may run the command.
    #[default]
    Any,
    /// Only members of one of the command's allowed groups.
    AllowedGroup,
}

/// Static group → members mapping loaded from configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Groups {
    groups: BTreeMap<String, Vec<String>>,
}

impl Groups {
    pub fn new(groups: BTreeMap<String, Vec<String>>) -> Self {
        Self { groups }
    }

    /// Every configured group with its members, ordered by group name.
    pub fn get_groups(&self) -> &BTreeMap<String, Vec<String>> {
        &self.groups
    }

    pub fn is_member(&self, user: &str, group: &str) -> bool {
        self.groups
            .get(group)
            .is_some_and(|members| members.iter().any(|m| m == user))
    }

    /// Whether `user` may run the command described by `descriptor`.
    pub fn is_allowed(&self, user: &str, descriptor: &CommandDescriptor) -> bool {
        match descriptor.auth_strategy {
            AuthStrategy::Any => true,
            AuthStrategy::AllowedGroup => descriptor
                .allowed_groups
                .iter()
                .any(|group| self.is_member(user, group)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn groups() -> Groups {
        Groups::new(BTreeMap::from([
            (ADMIN_GROUP.to_string(), vec!["admin_user".to_string()]),
            (
                "other".to_string(),
                vec!["user_one".to_string(), "user_two".to_string()],
            ),
        ]))
    }

    fn descriptor(strategy: AuthStrategy, allowed: &[&str]) -> CommandDescriptor {
        CommandDescriptor {
            auth_strategy: strategy,
            allowed_groups: allowed.iter().map(ToString::to_string).collect(),
            ..CommandDescriptor::new("cmd", "help")
        }
    }

    #[test]
    fn any_allows_unknown_users() {
        let groups = groups();
        assert!(groups.is_allowed("nobody", &descriptor(AuthStrategy::Any, &[])));
    }

    #[test]
    fn allowed_group_requires_membership() {
        let groups = groups();
        let admin_only = descriptor(AuthStrategy::AllowedGroup, &[ADMIN_GROUP]);
        assert!(groups.is_allowed("admin_user", &admin_only));
        assert!(!groups.is_allowed("user_one", &admin_only));
    }

    #[test]
    fn any_listed_group_is_enough() {
        let groups = groups();
        let either = descriptor(AuthStrategy::AllowedGroup, &[ADMIN_GROUP, "other"]);
        assert!(groups.is_allowed("user_two", &either));
        assert!(groups.is_allowed("admin_user", &either));
        assert!(!groups.is_allowed("stranger", &either));
    }

    #[test]
    fn allowed_group_with_no_groups_denies() {
        let groups = groups();
        assert!(!groups.is_allowed(
            "admin_user",
            &descriptor(AuthStrategy::AllowedGroup, &[])
        ));
    }

    #[test]
    fn unknown_group_denies() {
        let groups = groups();
        assert!(!groups.is_allowed(
            "admin_user",
            &descriptor(AuthStrategy::AllowedGroup, &["missing"])
        ));
    }
}
