/// Server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub port: u16,
    pub max_send_queue: usize,
    /// Origins accepted at WebSocket upgrade time. Empty means any origin.
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            max_send_queue: 256,
            allowed_origins: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Read configuration from the environment: `PORT`, `ALLOWED_ORIGINS`
    /// (comma-separated).
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            port: parse_port(std::env::var("PORT").ok()).unwrap_or(defaults.port),
            max_send_queue: defaults.max_send_queue,
            allowed_origins: parse_origins(
                &std::env::var("ALLOWED_ORIGINS").unwrap_or_default(),
            ),
        }
    }
}

fn parse_port(raw: Option<String>) -> Option<u16> {
    raw.and_then(|p| p.trim().parse().ok())
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|o| o.trim().to_string())
        .filter(|o| !o.is_empty())
        .collect()
}
