//! Group metadata, membership, and lifecycle.

use std::collections::{BTreeSet, HashMap};

use chrono::Utc;
use tracing::info;

use causerie_shared::error::{ChatError, Result};
use causerie_shared::types::{Actor, Group, GroupId, GroupSettings, UserId};

/// Maps group identifiers to metadata; the authorization gate for every
/// group-scoped mutation elsewhere.
///
/// Invariant: `admin_ids ⊆ member_ids`. Groups are never deleted.
#[derive(Debug, Default)]
pub struct GroupRegistry {
    groups: HashMap<GroupId, Group>,
    // Creation order, for `groups_for` listings.
    order: Vec<GroupId>,
}

impl GroupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &GroupId) -> Result<&Group> {
        self.groups
            .get(id)
            .ok_or_else(|| ChatError::NotFound(format!("group {id}")))
    }

    /// Create a group; the creator becomes its sole member and admin.
    pub fn create(
        &mut self,
        name: &str,
        description: &str,
        creator: &Actor,
        settings: GroupSettings,
    ) -> Result<Group> {
        self.insert(GroupId::random(), name, description, creator, settings, false)
    }

    /// Seed a default group at startup. New users are auto-enrolled into
    /// every default group.
    pub fn bootstrap_default(&mut self, id: GroupId, name: &str, creator: &Actor) -> Result<Group> {
        self.insert(id, name, "", creator, GroupSettings::default(), true)
    }

    fn insert(
        &mut self,
        id: GroupId,
        name: &str,
        description: &str,
        creator: &Actor,
        settings: GroupSettings,
        is_default: bool,
    ) -> Result<Group> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ChatError::Malformed("empty group name".to_string()));
        }
        if self
            .groups
            .values()
            .any(|g| g.name.eq_ignore_ascii_case(name))
        {
            return Err(ChatError::DuplicateName(name.to_string()));
        }

        let group = Group {
            id: id.clone(),
            name: name.to_string(),
            description: description.to_string(),
            member_ids: BTreeSet::from([creator.id.clone()]),
            admin_ids: BTreeSet::from([creator.id.clone()]),
            is_default,
            settings,
            created_at: Utc::now(),
        };

        info!(group = %id, name = %name, creator = %creator.id, "Created group");
        self.groups.insert(id.clone(), group.clone());
        self.order.push(id);
        Ok(group)
    }

    /// Add a user to a group. Requires the acting user to be a group admin
    /// (or superAdmin); enforces the member cap.
    pub fn add_member(&mut self, group_id: &GroupId, user_id: &UserId, actor: &Actor) -> Result<()> {
        if !self.is_admin_of(group_id, actor) {
            return Err(ChatError::PermissionDenied);
        }
        let group = self
            .groups
            .get_mut(group_id)
            .ok_or_else(|| ChatError::NotFound(format!("group {group_id}")))?;

        if group.member_ids.contains(user_id) {
            return Err(ChatError::AlreadyMember);
        }
        if group.settings.max_members > 0 && group.member_ids.len() >= group.settings.max_members {
            return Err(ChatError::GroupFull);
        }

        group.member_ids.insert(user_id.clone());
        info!(group = %group_id, user = %user_id, by = %actor.id, "Added group member");
        Ok(())
    }

    /// Promote an existing member to group admin.
    pub fn promote_to_admin(
        &mut self,
        group_id: &GroupId,
        user_id: &UserId,
        actor: &Actor,
    ) -> Result<()> {
        if !self.is_admin_of(group_id, actor) {
            return Err(ChatError::PermissionDenied);
        }
        let group = self
            .groups
            .get_mut(group_id)
            .ok_or_else(|| ChatError::NotFound(format!("group {group_id}")))?;

        if !group.member_ids.contains(user_id) {
            return Err(ChatError::NotAMember);
        }

        group.admin_ids.insert(user_id.clone());
        info!(group = %group_id, user = %user_id, by = %actor.id, "Promoted group admin");
        Ok(())
    }

    /// Enroll a user into every default group (used on account creation).
    pub fn enroll_in_defaults(&mut self, user_id: &UserId) -> Vec<GroupId> {
        let mut joined = Vec::new();
        for id in &self.order {
            if let Some(group) = self.groups.get_mut(id) {
                if group.is_default && group.member_ids.insert(user_id.clone()) {
                    joined.push(id.clone());
                }
            }
        }
        joined
    }

    /// All groups the user belongs to, in creation order.
    pub fn groups_for(&self, user_id: &UserId) -> Vec<&Group> {
        self.order
            .iter()
            .filter_map(|id| self.groups.get(id))
            .filter(|g| g.member_ids.contains(user_id))
            .collect()
    }

    pub fn is_member(&self, group_id: &GroupId, user_id: &UserId) -> bool {
        self.groups
            .get(group_id)
            .is_some_and(|g| g.member_ids.contains(user_id))
    }

    /// True when the actor is in the group's admin set or holds superAdmin.
    pub fn is_admin_of(&self, group_id: &GroupId, actor: &Actor) -> bool {
        if actor.role.is_super_admin() {
            return true;
        }
        self.groups
            .get(group_id)
            .is_some_and(|g| g.admin_ids.contains(&actor.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use causerie_shared::types::Role;

    fn actor(name: &str, role: Role) -> Actor {
        Actor {
            id: UserId::new(name),
            role,
        }
    }

    fn registry_with_group() -> (GroupRegistry, GroupId) {
        let mut registry = GroupRegistry::new();
        let group = registry
            .create(
                "general",
                "talk about anything",
                &actor("carol", Role::Admin),
                GroupSettings::default(),
            )
            .unwrap();
        (registry, group.id)
    }

    #[test]
    fn test_creator_is_sole_member_and_admin() {
        let (registry, id) = registry_with_group();
        let group = registry.get(&id).unwrap();
        assert_eq!(group.member_ids.len(), 1);
        assert_eq!(group.admin_ids, group.member_ids);
        assert!(registry.is_member(&id, &UserId::new("carol")));
    }

    #[test]
    fn test_duplicate_name_rejected_case_insensitively() {
        let (mut registry, _) = registry_with_group();
        let err = registry
            .create(
                "General",
                "",
                &actor("carol", Role::Admin),
                GroupSettings::default(),
            )
            .unwrap_err();
        assert!(matches!(err, ChatError::DuplicateName(_)));
    }

    #[test]
    fn test_add_member_requires_group_admin() {
        let (mut registry, id) = registry_with_group();
        let outsider = actor("dave", Role::Member);

        assert_eq!(
            registry.add_member(&id, &UserId::new("bob"), &outsider),
            Err(ChatError::PermissionDenied)
        );
        assert!(registry
            .add_member(&id, &UserId::new("bob"), &actor("carol", Role::Admin))
            .is_ok());
        assert!(registry.is_member(&id, &UserId::new("bob")));
    }

    #[test]
    fn test_super_admin_bypasses_admin_set() {
        let (mut registry, id) = registry_with_group();
        let root = actor("root", Role::SuperAdmin);
        assert!(registry.is_admin_of(&id, &root));
        assert!(registry.add_member(&id, &UserId::new("bob"), &root).is_ok());
    }

    #[test]
    fn test_add_member_already_member() {
        let (mut registry, id) = registry_with_group();
        let carol = actor("carol", Role::Admin);
        assert_eq!(
            registry.add_member(&id, &UserId::new("carol"), &carol),
            Err(ChatError::AlreadyMember)
        );
    }

    #[test]
    fn test_group_full() {
        let mut registry = GroupRegistry::new();
        let carol = actor("carol", Role::Admin);
        let group = registry
            .create(
                "tiny",
                "",
                &carol,
                GroupSettings {
                    allow_media: true,
                    max_members: 2,
                },
            )
            .unwrap();

        registry
            .add_member(&group.id, &UserId::new("bob"), &carol)
            .unwrap();
        assert_eq!(
            registry.add_member(&group.id, &UserId::new("eve"), &carol),
            Err(ChatError::GroupFull)
        );
    }

    #[test]
    fn test_promote_requires_membership() {
        let (mut registry, id) = registry_with_group();
        let carol = actor("carol", Role::Admin);
        assert_eq!(
            registry.promote_to_admin(&id, &UserId::new("bob"), &carol),
            Err(ChatError::NotAMember)
        );

        registry
            .add_member(&id, &UserId::new("bob"), &carol)
            .unwrap();
        registry
            .promote_to_admin(&id, &UserId::new("bob"), &carol)
            .unwrap();

        let bob = actor("bob", Role::Member);
        assert!(registry.is_admin_of(&id, &bob));
    }

    #[test]
    fn test_groups_for_in_creation_order() {
        let (mut registry, first) = registry_with_group();
        let carol = actor("carol", Role::Admin);
        let second = registry
            .create("random", "", &carol, GroupSettings::default())
            .unwrap();

        let listed: Vec<_> = registry
            .groups_for(&UserId::new("carol"))
            .into_iter()
            .map(|g| g.id.clone())
            .collect();
        assert_eq!(listed, vec![first, second.id]);
    }

    #[test]
    fn test_enroll_in_defaults() {
        let mut registry = GroupRegistry::new();
        let root = actor("root", Role::SuperAdmin);
        registry
            .bootstrap_default(GroupId("general".to_string()), "General Chat", &root)
            .unwrap();
        registry
            .create("private", "", &root, GroupSettings::default())
            .unwrap();

        let joined = registry.enroll_in_defaults(&UserId::new("alice"));
        assert_eq!(joined, vec![GroupId("general".to_string())]);
        assert!(registry.is_member(&GroupId("general".to_string()), &UserId::new("alice")));
    }
}
