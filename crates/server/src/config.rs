use config::ConfigError;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

const ENV_PREFIX: &str = "FINES_";

#[derive(Deserialize, Clone, Debug)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub comments: CommentSettings,
}

#[derive(Deserialize, Clone, Debug)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub cors_origins: String,
    // 上游网关写入的可信用户 id 头
    pub user_header: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct DatabaseSettings {
    pub url: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct CommentSettings {
    pub request_timeout_secs: u64,
    pub recent_limit: i64,
    pub list_limit: i64,
    pub sse_keep_alive_secs: u64,
}

impl CommentSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn sse_keep_alive(&self) -> Duration {
        Duration::from_secs(self.sse_keep_alive_secs)
    }
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());
        Self::build(&run_mode, collect_env_vars(std::env::vars()))
    }

    fn build(run_mode: &str, env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let env_json = serde_json::to_string(&env_map)
            .map_err(|e| ConfigError::Message(format!("Invalid environment: {}", e)))?;

        let s = config::Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3000)?
            .set_default("server.cors_origins", "*")?
            .set_default("server.user_header", "x-user-id")?
            .set_default("database.url", "sqlite://data/fines.db")?
            .set_default("comments.request_timeout_secs", 30)?
            .set_default("comments.recent_limit", 10)?
            .set_default("comments.list_limit", 100)?
            .set_default("comments.sse_keep_alive_secs", 15)?
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::File::with_name(&format!("config.{}", run_mode)).required(false))
            .add_source(config::File::from_str(&env_json, config::FileFormat::Json))
            .build()?;

        s.try_deserialize()
    }
}

fn collect_env_vars(vars: impl Iterator<Item = (String, String)>) -> HashMap<String, String> {
    vars.filter(|(k, _)| k.starts_with(ENV_PREFIX))
        .map(|(k, v)| {
            let new_key = k
                .trim_start_matches(ENV_PREFIX)
                .replace("__", ".")
                .to_lowercase();
            (new_key, v)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::build("test", HashMap::new()).unwrap();
        assert_eq!(settings.server.port, 3000);
        assert_eq!(settings.server.user_header, "x-user-id");
        assert_eq!(settings.comments.request_timeout(), Duration::from_secs(30));
        assert_eq!(settings.comments.recent_limit, 10);
    }

    #[test]
    fn test_env_overrides() {
        let vars = vec![
            ("FINES_SERVER__PORT".to_string(), "8080".to_string()),
            ("FINES_COMMENTS__LIST_LIMIT".to_string(), "25".to_string()),
            ("OTHER_SERVER__PORT".to_string(), "1".to_string()),
        ];
        let env_map = collect_env_vars(vars.into_iter());
        assert_eq!(env_map.get("server.port").map(String::as_str), Some("8080"));
        assert_eq!(env_map.len(), 2);

        let settings = Settings::build("test", env_map).unwrap();
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.comments.list_limit, 25);
    }
}
