use crate::config::UserConfig;
use crate::error::{ProxyError, Result};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, instrument};
use traffic::TrafficManager;

/// A user known to the proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub username: String,
    pub secret: String,
}

/// In-memory user store.
///
/// Every successful mutation republishes the full username set as the
/// metered user set of the traffic manager.
pub struct UserManager {
    users: RwLock<BTreeMap<String, String>>,
    traffic: Arc<TrafficManager>,
}

impl UserManager {
    pub fn new(users: &[UserConfig], traffic: Arc<TrafficManager>) -> Self {
        let users: BTreeMap<String, String> = users
            .iter()
            .map(|user| (user.username.clone(), user.secret.clone()))
            .collect();
        traffic.update_metered_users(users.keys().cloned());
        info!("Loaded {} user(s)", users.len());
        Self {
            users: RwLock::new(users),
            traffic,
        }
    }

    /// All users ordered by username.
    pub fn list(&self) -> Vec<User> {
        self.users
            .read()
            .iter()
            .map(|(username, secret)| User {
                username: username.clone(),
                secret: secret.clone(),
            })
            .collect()
    }

    pub fn get(&self, username: &str) -> Option<String> {
        self.users.read().get(username).cloned()
    }

    pub fn authenticate(&self, username: &str, secret: &str) -> bool {
        self.users
            .read()
            .get(username)
            .is_some_and(|expected| expected == secret)
    }

    #[instrument(skip(self, secret))]
    pub fn add(&self, username: &str, secret: &str) -> Result<()> {
        validate_username(username)?;
        let mut users = self.users.write();
        if users.contains_key(username) {
            return Err(ProxyError::UserExists(username.to_string()));
        }
        users.insert(username.to_string(), secret.to_string());
        self.publish(&users);
        info!("User {} added", username);
        Ok(())
    }

    #[instrument(skip(self, secret))]
    pub fn update(&self, username: &str, secret: &str) -> Result<()> {
        let mut users = self.users.write();
        let entry = users
            .get_mut(username)
            .ok_or_else(|| ProxyError::UserNotFound(username.to_string()))?;
        *entry = secret.to_string();
        self.publish(&users);
        info!("User {} updated", username);
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn delete(&self, username: &str) -> Result<()> {
        let mut users = self.users.write();
        if users.remove(username).is_none() {
            return Err(ProxyError::UserNotFound(username.to_string()));
        }
        self.publish(&users);
        info!("User {} deleted", username);
        Ok(())
    }

    // Published while the write lock is held so the metered set follows
    // mutations in the order they were applied.
    fn publish(&self, users: &BTreeMap<String, String>) {
        self.traffic.update_metered_users(users.keys().cloned());
    }
}

fn validate_username(username: &str) -> Result<()> {
    if username.is_empty() {
        return Err(ProxyError::InvalidUser("username is empty".to_string()));
    }
    if username.chars().any(char::is_whitespace) {
        return Err(ProxyError::InvalidUser(format!(
            "username contains whitespace: {:?}",
            username
        )));
    }
    Ok(())
}
