use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;

/// Immutable view of which nodes and users are metered.
#[derive(Debug, Default)]
pub struct MembershipSnapshot {
    nodes: Arc<HashSet<String>>,
    users: HashSet<String>,
}

impl MembershipSnapshot {
    pub fn is_node_metered(&self, tag: &str) -> bool {
        self.nodes.contains(tag)
    }

    pub fn is_user_metered(&self, user: &str) -> bool {
        self.users.contains(user)
    }

    pub fn users(&self) -> &HashSet<String> {
        &self.users
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

/// Publishes [`MembershipSnapshot`]s.
///
/// The node set is fixed at construction. Replacing the user set builds a
/// complete new snapshot and swaps the handle, so a reader holding a
/// snapshot never sees node and user sets from different generations.
#[derive(Debug)]
pub struct Membership {
    current: RwLock<Arc<MembershipSnapshot>>,
}

impl Membership {
    pub fn new<I, S>(node_tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let snapshot = MembershipSnapshot {
            nodes: Arc::new(node_tags.into_iter().map(Into::into).collect()),
            users: HashSet::new(),
        };
        Self {
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    pub fn snapshot(&self) -> Arc<MembershipSnapshot> {
        self.current.read().clone()
    }

    pub fn replace_users<I, S>(&self, users: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let users: HashSet<String> = users.into_iter().map(Into::into).collect();
        let mut current = self.current.write();
        *current = Arc::new(MembershipSnapshot {
            nodes: current.nodes.clone(),
            users,
        });
    }

    pub fn is_node_metered(&self, tag: &str) -> bool {
        self.snapshot().is_node_metered(tag)
    }

    pub fn is_user_metered(&self, user: &str) -> bool {
        self.snapshot().is_user_metered(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_tags_are_fixed() {
        let membership = Membership::new(["in-ss", "in-vmess"]);
        assert!(membership.is_node_metered("in-ss"));
        assert!(membership.is_node_metered("in-vmess"));
        assert!(!membership.is_node_metered("direct"));

        membership.replace_users(["alice"]);
        assert!(membership.is_node_metered("in-ss"));
    }

    #[test]
    fn replace_users_swaps_whole_set() {
        let membership = Membership::new(["in-ss"]);
        assert!(!membership.is_user_metered("alice"));

        membership.replace_users(["alice", "bob"]);
        assert!(membership.is_user_metered("alice"));
        assert!(membership.is_user_metered("bob"));

        membership.replace_users(["bob"]);
        assert!(!membership.is_user_metered("alice"));
        assert!(membership.is_user_metered("bob"));

        membership.replace_users(Vec::<String>::new());
        assert!(!membership.is_user_metered("bob"));
    }

    #[test]
    fn held_snapshot_is_unaffected_by_replacement() {
        let membership = Membership::new(["in-ss"]);
        membership.replace_users(["alice"]);
        let before = membership.snapshot();

        membership.replace_users(["bob"]);
        assert!(before.is_user_metered("alice"));
        assert!(!before.is_user_metered("bob"));
        assert!(membership.snapshot().is_user_metered("bob"));
    }

    #[test]
    fn replacing_with_same_set_is_idempotent() {
        let membership = Membership::new(["in-ss"]);
        membership.replace_users(["alice"]);
        membership.replace_users(["alice"]);
        assert!(membership.is_user_metered("alice"));
        assert_eq!(membership.snapshot().users().len(), 1);
    }
}
