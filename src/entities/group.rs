// 👥 Group Entity
//
// A group owns an ordered sequence of members. Insertion order is the
// rotation order, so position is assigned once at join time and never
// rewritten.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::user::User;

// ============================================================================
// MEMBER
// ============================================================================

/// A user seen through one group's membership sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    /// 0-based slot in the rotation
    pub position: usize,

    #[serde(flatten)]
    pub user: User,
}

impl Member {
    pub fn user_id(&self) -> i64 {
        self.user.id
    }

    pub fn username(&self) -> &str {
        &self.user.username
    }
}

// ============================================================================
// GROUP ENTITY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: i64,
    pub name: String,
    pub created_by_id: i64,
    pub created_at: DateTime<Utc>,

    /// Ordered by `position`
    #[serde(default)]
    pub members: Vec<Member>,
}

impl Group {
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn has_member(&self, user_id: i64) -> bool {
        self.members.iter().any(|m| m.user.id == user_id)
    }

    /// Position of a user in the rotation, if they belong to the group
    pub fn position_of(&self, user_id: i64) -> Option<usize> {
        self.members.iter().position(|m| m.user.id == user_id)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewGroup {
    pub name: String,
    pub created_by_id: i64,
}

impl NewGroup {
    pub fn new(name: &str, created_by_id: i64) -> Self {
        NewGroup {
            name: name.trim().to_string(),
            created_by_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(position: usize, id: i64, name: &str) -> Member {
        Member {
            position,
            user: User {
                id,
                email: format!("{}@example.com", name),
                username: name.to_string(),
                hashed_password: String::new(),
                is_active: true,
                created_at: Utc::now(),
            },
        }
    }

    #[test]
    fn test_position_lookup() {
        let group = Group {
            id: 1,
            name: "Friday".to_string(),
            created_by_id: 10,
            created_at: Utc::now(),
            members: vec![member(0, 10, "ana"), member(1, 20, "ben")],
        };

        assert_eq!(group.member_count(), 2);
        assert_eq!(group.position_of(20), Some(1));
        assert_eq!(group.position_of(99), None);
        assert!(group.has_member(10));
        assert!(!group.has_member(30));
    }

    #[test]
    fn test_member_serializes_flat() {
        let json = serde_json::to_value(member(2, 30, "cleo")).unwrap();

        assert_eq!(json["id"], 30);
        assert_eq!(json["position"], 2);
        assert_eq!(json["username"], "cleo");
    }
}
