//! Runtime configuration for the game server.

use shared::{ConfigError, GameConfig};
use std::time::Duration;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:12345";
pub const DEFAULT_SHAPE_LIFETIME: Duration = Duration::from_millis(2000);
pub const DEFAULT_MAX_PLAYERS: usize = 64;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the TCP listener binds to
    pub bind_addr: String,
    /// How long a shape stays clickable before it expires
    pub shape_lifetime: Duration,
    /// Connections beyond this many active sessions are refused
    pub max_players: usize,
    pub game: GameConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            shape_lifetime: DEFAULT_SHAPE_LIFETIME,
            max_players: DEFAULT_MAX_PLAYERS,
            game: GameConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.game.validate()
    }
}
