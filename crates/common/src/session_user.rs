//! The `user@container` routing string sent as the transport user name.

use std::fmt;

/// Stands in for "whatever the container's default user is".
pub const DEFAULT_USER_MARKER: &str = "[default]";
pub const DEFAULT_CONTAINER: &str = "default";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionUser {
    /// `None` selects the container's default user.
    pub user: Option<String>,
    pub container: String,
}

impl Default for SessionUser {
    fn default() -> Self {
        Self {
            user: None,
            container: DEFAULT_CONTAINER.to_string(),
        }
    }
}

impl SessionUser {
    /// Parse a routing string. This never fails: empty parts fall back to the
    /// defaults so manual clients can connect with any user name.
    pub fn parse(raw: &str) -> Self {
        let (user, container) = match raw.rsplit_once('@') {
            Some((user, container)) => (user, container),
            None => (raw, ""),
        };
        let user = match user.trim() {
            "" | DEFAULT_USER_MARKER => None,
            name => Some(name.to_string()),
        };
        let container = match container.trim() {
            "" => DEFAULT_CONTAINER.to_string(),
            name => name.to_string(),
        };
        Self { user, container }
    }

    pub fn with_user(mut self, user: Option<String>) -> Self {
        if let Some(user) = user {
            self.user = Some(user);
        }
        self
    }

    pub fn with_container(mut self, container: Option<String>) -> Self {
        if let Some(container) = container {
            self.container = container;
        }
        self
    }
}

impl fmt::Display for SessionUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let user = self.user.as_deref().unwrap_or(DEFAULT_USER_MARKER);
        write!(f, "{}@{}", user, self.container)
    }
}
