use anyhow::Result;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub command_prefix: String,

    // Lavalink
    pub lavalink_host: String,
    pub lavalink_port: u16,
    pub lavalink_password: String,
    pub lavalink_secure: bool,
    pub search_prefix: String,
    pub node_reconnect_secs: u64,

    // Audio
    pub default_volume: u8,

    // Política de comandos
    pub allow_bot_commands: bool,
    pub target_mentioned_user: bool,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            // Discord (TOKEN es el nombre heredado del despliegue original)
            discord_token: std::env::var("DISCORD_TOKEN").or_else(|_| std::env::var("TOKEN"))?,
            command_prefix: std::env::var("PREFIX").unwrap_or_else(|_| "!".to_string()),

            // Lavalink
            lavalink_host: std::env::var("LAVALINK_HOST")
                .unwrap_or_else(|_| "localhost".to_string()),
            lavalink_port: std::env::var("LAVALINK_PORT")
                .unwrap_or_else(|_| "2333".to_string())
                .parse()?,
            lavalink_password: std::env::var("LAVALINK_PASSWORD")
                .unwrap_or_else(|_| "youshallnotpass".to_string()),
            lavalink_secure: std::env::var("LAVALINK_SECURE")
                .unwrap_or_else(|_| "false".to_string())
                .parse()?,
            search_prefix: std::env::var("SEARCH_PREFIX")
                .unwrap_or_else(|_| "ytsearch".to_string()),
            node_reconnect_secs: std::env::var("NODE_RECONNECT_SECS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()?,

            // Audio
            default_volume: std::env::var("DEFAULT_VOLUME")
                .unwrap_or_else(|_| "100".to_string())
                .parse()?,

            // Política
            allow_bot_commands: std::env::var("ALLOW_BOT_COMMANDS")
                .unwrap_or_else(|_| "true".to_string())
                .parse()?,
            target_mentioned_user: std::env::var("TARGET_MENTIONED_USER")
                .unwrap_or_else(|_| "true".to_string())
                .parse()?,
        };

        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Token, prefix and node host must not be empty
    /// - Default volume must be between 0 and 100
    /// - Node port must not be 0
    pub fn validate(&self) -> Result<()> {
        if self.discord_token.trim().is_empty() {
            anyhow::bail!("Discord token must not be empty");
        }

        if self.command_prefix.trim().is_empty() {
            anyhow::bail!("Command prefix must not be empty");
        }

        if self.lavalink_host.trim().is_empty() {
            anyhow::bail!("Lavalink host must not be empty");
        }

        if self.lavalink_port == 0 {
            anyhow::bail!("Lavalink port must be greater than 0");
        }

        if self.default_volume > 100 {
            anyhow::bail!("Default volume must be between 0 and 100, got: {}", self.default_volume);
        }

        Ok(())
    }

    /// Base URL for the node's REST API.
    pub fn lavalink_rest_url(&self) -> String {
        let scheme = if self.lavalink_secure { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.lavalink_host, self.lavalink_port)
    }

    /// URL of the node's event websocket.
    pub fn lavalink_ws_url(&self) -> String {
        let scheme = if self.lavalink_secure { "wss" } else { "ws" };
        format!("{}://{}:{}/v4/websocket", scheme, self.lavalink_host, self.lavalink_port)
    }

    pub fn node_reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.node_reconnect_secs)
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Excludes the bot token and the node password.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: prefix '{}'\n  \
            Lavalink: {} (search: {}, reconnect {}s)\n  \
            Audio: {}% default volume\n  \
            Policy: bot authors={}, mentioned target={}",
            self.command_prefix,
            self.lavalink_rest_url(),
            self.search_prefix,
            self.node_reconnect_secs,
            self.default_volume,
            self.allow_bot_commands,
            self.target_mentioned_user,
        )
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (el token no tiene default)
            discord_token: String::new(),
            command_prefix: "!".to_string(),

            lavalink_host: "localhost".to_string(),
            lavalink_port: 2333,
            lavalink_password: "youshallnotpass".to_string(),
            lavalink_secure: false,
            search_prefix: "ytsearch".to_string(),
            node_reconnect_secs: 5,

            default_volume: 100,

            allow_bot_commands: true,
            target_mentioned_user: true,
        }
    }
}
