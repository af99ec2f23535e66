use std::collections::BTreeSet;

use crate::protocol::{Action, InboundFrame, MemberId};

/// Membership of the group this run joined, as last told by the coordinator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupMembership {
    /// This run's own member ID; known once the group result ID arrived
    pub member_id: Option<MemberId>,
    pub group_result_id: Option<String>,
    /// Every member of the group
    pub members: BTreeSet<MemberId>,
    /// Members whose group channel is currently open
    pub open_channels: BTreeSet<MemberId>,
    /// The group accepts no new members
    pub fixed: bool,
}

impl GroupMembership {
    pub fn has_joined(&self) -> bool {
        self.group_result_id.is_some()
    }

    pub fn is_self(&self, member: &str) -> bool {
        self.member_id.as_deref() == Some(member)
    }

    /// Whether the group has `max` members or more. Unlimited groups never
    /// reach their maximum.
    pub fn is_max_active_member_reached(&self, max: Option<usize>) -> bool {
        max.is_some_and(|max| self.members.len() >= max)
    }

    pub fn is_max_active_member_open(&self, max: Option<usize>) -> bool {
        max.is_some_and(|max| self.open_channels.len() >= max)
    }

    /// Every member has an open group channel.
    pub fn all_channels_open(&self) -> bool {
        self.members.len() == self.open_channels.len()
    }

    /// Applies the group variables a frame carries. Lists replace the
    /// current sets wholesale.
    pub(crate) fn update_vars(&mut self, frame: &InboundFrame, own_member_id: &str) {
        if let Some(group_result_id) = &frame.group_result_id {
            self.group_result_id = Some(group_result_id.clone());
            self.member_id = Some(own_member_id.to_string());
        }
        if let Some(members) = &frame.members {
            self.members = members.iter().cloned().collect();
        }
        if let Some(channels) = &frame.channels {
            self.open_channels = channels.iter().cloned().collect();
        }
    }

    /// Applies a member event.
    pub(crate) fn apply_event(&mut self, action: Action, member: &str) {
        match action {
            Action::Joined => {
                self.members.insert(member.to_string());
            }
            Action::Opened => {
                self.members.insert(member.to_string());
                self.open_channels.insert(member.to_string());
            }
            Action::Closed => {
                self.open_channels.remove(member);
            }
            Action::Left => {
                self.members.remove(member);
                self.open_channels.remove(member);
            }
            _ => {}
        }
    }

    pub(crate) fn clear(&mut self) {
        *self = GroupMembership::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(list: &[&str]) -> BTreeSet<MemberId> {
        list.iter().map(|id| id.to_string()).collect()
    }

    #[test]
    fn test_update_vars_sets_identity_and_lists() {
        let mut membership = GroupMembership::default();
        let frame = InboundFrame::parse(
            r#"{"groupResultId":3,"members":["42","7"],"channels":["42"]}"#,
        )
        .unwrap();
        membership.update_vars(&frame, "42");

        assert!(membership.has_joined());
        assert!(membership.is_self("42"));
        assert_eq!(membership.members, ids(&["42", "7"]));
        assert_eq!(membership.open_channels, ids(&["42"]));
        assert!(!membership.all_channels_open());
    }

    #[test]
    fn test_member_events() {
        let mut membership = GroupMembership::default();
        membership.apply_event(Action::Joined, "7");
        assert_eq!(membership.members, ids(&["7"]));
        membership.apply_event(Action::Opened, "7");
        assert_eq!(membership.open_channels, ids(&["7"]));
        assert!(membership.all_channels_open());
        membership.apply_event(Action::Closed, "7");
        assert!(membership.open_channels.is_empty());
        assert_eq!(membership.members, ids(&["7"]));
        membership.apply_event(Action::Left, "7");
        assert!(membership.members.is_empty());
    }

    #[test]
    fn test_max_active_members() {
        let mut membership = GroupMembership::default();
        membership.members = ids(&["1", "2"]);
        membership.open_channels = ids(&["1"]);
        assert!(membership.is_max_active_member_reached(Some(2)));
        assert!(!membership.is_max_active_member_open(Some(2)));
        assert!(!membership.is_max_active_member_reached(None));
    }

    #[test]
    fn test_clear_resets_everything() {
        let mut membership = GroupMembership {
            member_id: Some("1".to_string()),
            group_result_id: Some("9".to_string()),
            members: ids(&["1"]),
            open_channels: ids(&["1"]),
            fixed: true,
        };
        membership.clear();
        assert_eq!(membership, GroupMembership::default());
    }
}
