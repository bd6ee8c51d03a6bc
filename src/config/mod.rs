use once_cell::sync::Lazy;
use std::env;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: Environment,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub security: SecurityConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct SecurityConfig {
    pub access_token_secret: String,
    pub refresh_token_secret: String,
    pub access_token_ttl_mins: i64,
    pub refresh_token_ttl_days: i64,
    /// Refresh cookie carries the Secure attribute. Off in development so
    /// plain-http local clients still receive the cookie.
    pub cookie_secure: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backend: StoreBackend,
    pub upload_dir: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    pub fn is_development(&self) -> bool {
        self.environment == Environment::Development
    }

    fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = env::var("HELPDESK_PORT").or_else(|_| env::var("PORT")) {
            self.server.port = v.parse().unwrap_or(self.server.port);
        }
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Ok(v) = env::var("DATABASE_CONNECT_TIMEOUT_SECS") {
            self.database.connect_timeout_secs =
                v.parse().unwrap_or(self.database.connect_timeout_secs);
        }
        if let Ok(v) = env::var("JWT_ACCESS_SECRET") {
            self.security.access_token_secret = v;
        }
        if let Ok(v) = env::var("JWT_REFRESH_SECRET") {
            self.security.refresh_token_secret = v;
        }
        if let Ok(v) = env::var("ACCESS_TOKEN_TTL_MINS") {
            self.security.access_token_ttl_mins =
                v.parse().unwrap_or(self.security.access_token_ttl_mins);
        }
        if let Ok(v) = env::var("REFRESH_TOKEN_TTL_DAYS") {
            self.security.refresh_token_ttl_days =
                v.parse().unwrap_or(self.security.refresh_token_ttl_days);
        }
        if let Ok(v) = env::var("HELPDESK_STORE") {
            self.storage.backend = match v.as_str() {
                "memory" => StoreBackend::Memory,
                _ => StoreBackend::Postgres,
            };
        }
        if let Ok(v) = env::var("HELPDESK_UPLOAD_DIR") {
            self.storage.upload_dir = v;
        }
        self
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            server: ServerConfig { port: 3000 },
            database: DatabaseConfig {
                max_connections: 10,
                connect_timeout_secs: 30,
            },
            security: SecurityConfig {
                access_token_secret: "dev-access-secret".to_string(),
                refresh_token_secret: "dev-refresh-secret".to_string(),
                access_token_ttl_mins: 15,
                refresh_token_ttl_days: 7,
                cookie_secure: false,
            },
            storage: StorageConfig {
                backend: StoreBackend::Memory,
                upload_dir: "uploads".to_string(),
            },
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            server: ServerConfig { port: 3000 },
            database: DatabaseConfig {
                max_connections: 20,
                connect_timeout_secs: 10,
            },
            security: SecurityConfig {
                access_token_secret: String::new(),
                refresh_token_secret: String::new(),
                access_token_ttl_mins: 15,
                refresh_token_ttl_days: 7,
                cookie_secure: true,
            },
            storage: StorageConfig {
                backend: StoreBackend::Postgres,
                upload_dir: "uploads".to_string(),
            },
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            server: ServerConfig { port: 3000 },
            database: DatabaseConfig {
                max_connections: 50,
                connect_timeout_secs: 5,
            },
            security: SecurityConfig {
                // Secrets must come from the environment in production; the
                // auth layer refuses to sign with an empty secret.
                access_token_secret: String::new(),
                refresh_token_secret: String::new(),
                access_token_ttl_mins: 15,
                refresh_token_ttl_days: 7,
                cookie_secure: true,
            },
            storage: StorageConfig {
                backend: StoreBackend::Postgres,
                upload_dir: "uploads".to_string(),
            },
        }
    }
}

// Global singleton config, initialized once at startup.
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

pub fn config() -> &'static AppConfig {
    &CONFIG
}
