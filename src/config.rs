// ⚙️ Configuration - Command line flags with environment fallbacks

use clap::Parser;
use std::path::PathBuf;

/// RPN calculator HTTP server
#[derive(Debug, Clone, Parser)]
#[command(author, version, about, long_about = None)]
pub struct ServerConfig {
    /// Host address to bind to
    #[arg(short = 'H', long, env = "RPN_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "RPN_PORT", default_value_t = 8000)]
    pub port: u16,

    /// SQLite database holding the calculation history
    #[arg(short, long, env = "RPN_DATABASE", default_value = "database.db")]
    pub database: PathBuf,

    /// Allowed CORS origin (repeat for several)
    #[arg(
        long = "cors-origin",
        env = "RPN_CORS_ORIGINS",
        value_delimiter = ',',
        default_value = "http://localhost:4040"
    )]
    pub cors_origins: Vec<String>,

    /// Log level (error, warn, info, debug, trace); RUST_LOG overrides it
    #[arg(short, long, env = "RPN_LOG", default_value = "info")]
    pub log_level: String,
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            database: PathBuf::from("database.db"),
            cors_origins: vec!["http://localhost:4040".to_string()],
            log_level: "info".to_string(),
        }
    }
}
