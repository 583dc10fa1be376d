use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserConfig {
    pub username: String,

    /// Pre-shared secret presented by the client when opening a tunnel
    pub secret: String,
}
