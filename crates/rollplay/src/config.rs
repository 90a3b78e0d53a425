//! Server settings.

/// Settings for a [`RollplayServer`](crate::RollplayServer).
///
/// Usually set through [`RollplayServerBuilder`](crate::RollplayServerBuilder).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address the WebSocket listener binds to.
    pub bind_addr: String,
    /// Path prefix in front of `/{userId}/{sessionId}`.
    pub route_prefix: String,
    /// Name given to characters created without one.
    pub default_character_name: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            route_prefix: "/api/connect".to_string(),
            default_character_name: "Dovakin".to_string(),
        }
    }
}
