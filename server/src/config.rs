use typetype_shared::words::WordBank;
use typetype_shared::GameConfig;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: String,
    /// Authoritative simulation rate per active room
    pub tick_rate_hz: u32,
    /// Fixed seed for room codes and launch angles; random when unset
    pub rng_seed: Option<u64>,
    pub max_connections: usize,
    /// Larger client frames close the connection
    pub max_message_bytes: usize,
    /// Unparseable frames tolerated before the connection is closed
    pub max_parse_errors: u32,
    /// CORS origins; empty means permissive
    pub allowed_origins: Vec<String>,
    pub game: GameConfig,
    pub words: WordBank,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:3001".to_string(),
            tick_rate_hz: 20,
            rng_seed: None,
            max_connections: 1000,
            max_message_bytes: 1024,
            max_parse_errors: 5,
            allowed_origins: vec![],
            game: GameConfig::default(),
            words: WordBank::default(),
        }
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, String> {
    value
        .trim()
        .parse()
        .map_err(|_| format!("{} has an invalid value: {:?}", key, value))
}

impl ServerConfig {
    /// Defaults overridden by process environment variables.
    pub fn from_env() -> Result<Self, String> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `get` returns for each known key:
    /// `BIND_ADDR`, `PORT`, `TICK_RATE_HZ`, `RNG_SEED`, `MAX_CONNECTIONS`,
    /// `CLIENT_URL` (comma separated origins), `GAME_CONFIG` and `WORD_LIST`
    /// (paths to JSON files).
    pub fn from_vars(get: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let mut config = ServerConfig::default();

        let host = get("BIND_ADDR").unwrap_or_else(|| "0.0.0.0".to_string());
        let port: u16 = match get("PORT") {
            Some(v) => parse_var("PORT", &v)?,
            None => 3001,
        };
        config.listen_addr = format!("{}:{}", host, port);

        if let Some(v) = get("TICK_RATE_HZ") {
            config.tick_rate_hz = parse_var("TICK_RATE_HZ", &v)?;
        }
        if let Some(v) = get("RNG_SEED") {
            config.rng_seed = Some(parse_var("RNG_SEED", &v)?);
        }
        if let Some(v) = get("MAX_CONNECTIONS") {
            config.max_connections = parse_var("MAX_CONNECTIONS", &v)?;
        }
        if let Some(v) = get("CLIENT_URL") {
            config.allowed_origins = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(path) = get("GAME_CONFIG") {
            let json = std::fs::read_to_string(&path)
                .map_err(|e| format!("cannot read GAME_CONFIG {}: {}", path, e))?;
            config.game = GameConfig::from_json(&json)
                .map_err(|e| format!("invalid GAME_CONFIG {}: {}", path, e))?;
        }
        if let Some(path) = get("WORD_LIST") {
            let json = std::fs::read_to_string(&path)
                .map_err(|e| format!("cannot read WORD_LIST {}: {}", path, e))?;
            config.words =
                WordBank::from_json(&json).map_err(|e| format!("invalid WORD_LIST {}: {}", path, e))?;
        }

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.tick_rate_hz == 0 || self.tick_rate_hz > 240 {
            return Err("tick_rate_hz must be in 1..=240".to_string());
        }
        if self.max_connections == 0 {
            return Err("max_connections must be > 0".to_string());
        }
        if self.max_message_bytes < 64 {
            return Err("max_message_bytes must be >= 64".to_string());
        }
        self.game.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn default_server_config_is_valid() {
        assert!(ServerConfig::default().validate().is_ok());
    }

    #[test]
    fn empty_environment_gives_defaults() {
        let config = ServerConfig::from_vars(vars(&[])).unwrap();
        assert_eq!(config.listen_addr, "0.0.0.0:3001");
        assert_eq!(config.tick_rate_hz, 20);
        assert!(config.rng_seed.is_none());
        assert!(config.allowed_origins.is_empty());
    }

    #[test]
    fn environment_overrides_defaults() {
        let config = ServerConfig::from_vars(vars(&[
            ("PORT", "4000"),
            ("BIND_ADDR", "127.0.0.1"),
            ("TICK_RATE_HZ", "30"),
            ("RNG_SEED", "42"),
            ("CLIENT_URL", "http://localhost:3000, https://typetype.example"),
        ]))
        .unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:4000");
        assert_eq!(config.tick_rate_hz, 30);
        assert_eq!(config.rng_seed, Some(42));
        assert_eq!(
            config.allowed_origins,
            vec!["http://localhost:3000", "https://typetype.example"]
        );
    }

    #[test]
    fn malformed_port_is_an_error() {
        let err = ServerConfig::from_vars(vars(&[("PORT", "threethousand")])).unwrap_err();
        assert!(err.contains("PORT"));
    }

    #[test]
    fn missing_game_config_file_is_an_error() {
        let result = ServerConfig::from_vars(vars(&[("GAME_CONFIG", "/nonexistent/game.json")]));
        assert!(result.is_err());
    }

    #[test]
    fn zero_tick_rate_invalid() {
        let config = ServerConfig {
            tick_rate_hz: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
