//! Environment-prefixed collection naming.
//!
//! Development and production data share one database. Every collection name
//! in development carries a `dev_` prefix; production names are bare.

use serde::{Deserialize, Serialize};

/// Deployment environment, selecting the collection prefix.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    #[default]
    Production,
}

impl Environment {
    /// Read `APP_ENV`; anything other than a development alias is production.
    pub fn from_env() -> Self {
        std::env::var("APP_ENV")
            .map(|v| Self::parse(&v))
            .unwrap_or_default()
    }

    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "dev" | "development" | "local" => Environment::Development,
            _ => Environment::Production,
        }
    }

    /// Prefix prepended to every collection name.
    pub fn prefix(&self) -> &'static str {
        match self {
            Environment::Development => "dev_",
            Environment::Production => "",
        }
    }

    /// Fully qualified collection name.
    pub fn collection(&self, name: &str) -> String {
        format!("{}{}", self.prefix(), name)
    }
}

/// Resolved collection (table) names for one environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collections {
    pub users: String,
    pub memories: String,
    pub events: String,
    pub effects: String,
    pub user_stats: String,
    pub app_stats: String,
    pub job_stats: String,
    pub job_history: String,
}

impl Collections {
    pub fn for_env(env: Environment) -> Self {
        Self {
            users: env.collection("users"),
            memories: env.collection("memories"),
            events: env.collection("events"),
            effects: env.collection("effects"),
            user_stats: env.collection("user_stats"),
            app_stats: env.collection("app_stats"),
            job_stats: env.collection("job_stats"),
            job_history: env.collection("job_history"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_development_aliases() {
        assert_eq!(Environment::parse("dev"), Environment::Development);
        assert_eq!(Environment::parse("Development"), Environment::Development);
        assert_eq!(Environment::parse(" local "), Environment::Development);
    }

    #[test]
    fn test_parse_defaults_to_production() {
        assert_eq!(Environment::parse("production"), Environment::Production);
        assert_eq!(Environment::parse(""), Environment::Production);
        assert_eq!(Environment::parse("staging"), Environment::Production);
    }

    #[test]
    fn test_collection_prefix() {
        assert_eq!(Environment::Development.collection("users"), "dev_users");
        assert_eq!(Environment::Production.collection("users"), "users");
    }

    #[test]
    fn test_collections_for_env() {
        let dev = Collections::for_env(Environment::Development);
        assert_eq!(dev.job_history, "dev_job_history");
        assert_eq!(dev.memories, "dev_memories");

        let prod = Collections::for_env(Environment::Production);
        assert_eq!(prod.job_stats, "job_stats");
    }
}
