/// Routing facts about an accepted connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InboundMetadata {
    /// Tag of the node that accepted the connection.
    pub inbound: String,
    /// Authenticated user, if the node identified one.
    pub user: Option<String>,
}

impl InboundMetadata {
    pub fn new(inbound: impl Into<String>, user: Option<String>) -> Self {
        Self {
            inbound: inbound.into(),
            user: user.filter(|user| !user.is_empty()),
        }
    }

    /// The authenticated user; an empty name counts as anonymous even when
    /// the struct was built without [`InboundMetadata::new`].
    pub fn user(&self) -> Option<&str> {
        self.user.as_deref().filter(|user| !user.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_user_means_anonymous() {
        let metadata = InboundMetadata::new("in-ss", Some(String::new()));
        assert_eq!(metadata.user(), None);

        let metadata = InboundMetadata::new("in-ss", Some("alice".to_string()));
        assert_eq!(metadata.user(), Some("alice"));
    }

    #[test]
    fn empty_user_in_literal_means_anonymous() {
        let metadata = InboundMetadata {
            inbound: "in-ss".to_string(),
            user: Some(String::new()),
        };
        assert_eq!(metadata.user(), None);
    }
}
