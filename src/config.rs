// ============================================================================
// CONFIGURATION
// ============================================================================
//
// Every setting comes from the environment (.env is loaded by main via dotenv).
//
//   DATA_BACKEND                   postgres (default) | memory
//   DATABASE_URL                   required when DATA_BACKEND=postgres
//   RUN_MIGRATIONS                 true (default) | false
//   HOST / PORT                    127.0.0.1 / 8080
//   JWT_SECRET                     session token secret
//   JWT_TTL_HOURS                  24
//   ATTENDANCE_UTC_OFFSET_MINUTES  0 (UTC); timezone of the attendance day
//   SEED_ADMIN_EMAIL / SEED_ADMIN_PASSWORD   optional SuperAdmin bootstrap
//
// ============================================================================

use chrono::FixedOffset;
use std::env;

const DEFAULT_JWT_SECRET: &str = "default-insecure-key-change-this";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone)]
pub struct SeedAdmin {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub backend: DataBackend,
    pub database_url: Option<String>,
    pub run_migrations: bool,
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
    pub jwt_ttl_hours: i64,
    pub attendance_offset: FixedOffset,
    pub seed_admin: Option<SeedAdmin>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup (the environment in production).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let backend = match lookup("DATA_BACKEND").as_deref() {
            None | Some("postgres") => DataBackend::Postgres,
            Some("memory") => DataBackend::Memory,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "DATA_BACKEND",
                    value: other.to_string(),
                })
            }
        };

        let database_url = lookup("DATABASE_URL");
        if backend == DataBackend::Postgres && database_url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }

        let run_migrations = parse_or("RUN_MIGRATIONS", &lookup, true)?;
        let host = lookup("HOST").unwrap_or_else(|| "127.0.0.1".to_string());
        let port = parse_or("PORT", &lookup, 8080u16)?;

        let jwt_secret = lookup("JWT_SECRET").unwrap_or_else(|| {
            tracing::warn!("JWT_SECRET not set, using the default (INSECURE)");
            DEFAULT_JWT_SECRET.to_string()
        });
        let jwt_ttl_hours = parse_or("JWT_TTL_HOURS", &lookup, 24i64)?;
        if jwt_ttl_hours <= 0 {
            return Err(ConfigError::Invalid {
                key: "JWT_TTL_HOURS",
                value: jwt_ttl_hours.to_string(),
            });
        }

        let offset_minutes = parse_or("ATTENDANCE_UTC_OFFSET_MINUTES", &lookup, 0i32)?;
        let attendance_offset =
            FixedOffset::east_opt(offset_minutes * 60).ok_or_else(|| ConfigError::Invalid {
                key: "ATTENDANCE_UTC_OFFSET_MINUTES",
                value: offset_minutes.to_string(),
            })?;

        let seed_admin = match (lookup("SEED_ADMIN_EMAIL"), lookup("SEED_ADMIN_PASSWORD")) {
            (Some(email), Some(password)) => Some(SeedAdmin { email, password }),
            (Some(_), None) => return Err(ConfigError::Missing("SEED_ADMIN_PASSWORD")),
            _ => None,
        };

        Ok(Self {
            backend,
            database_url,
            run_migrations,
            host,
            port,
            jwt_secret,
            jwt_ttl_hours,
            attendance_offset,
            seed_admin,
        })
    }
}

fn parse_or<T, F>(key: &'static str, lookup: &F, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn postgres_requires_database_url() {
        let result = AppConfig::from_lookup(lookup_from(&[]));
        assert!(matches!(result, Err(ConfigError::Missing("DATABASE_URL"))));
    }

    #[test]
    fn memory_backend_uses_defaults() {
        let config = AppConfig::from_lookup(lookup_from(&[("DATA_BACKEND", "memory")])).unwrap();
        assert_eq!(config.backend, DataBackend::Memory);
        assert_eq!(config.port, 8080);
        assert_eq!(config.jwt_ttl_hours, 24);
        assert_eq!(config.attendance_offset.local_minus_utc(), 0);
        assert!(config.seed_admin.is_none());
    }

    #[test]
    fn reads_attendance_offset_in_minutes() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("DATA_BACKEND", "memory"),
            ("ATTENDANCE_UTC_OFFSET_MINUTES", "-300"),
        ]))
        .unwrap();
        assert_eq!(config.attendance_offset.local_minus_utc(), -300 * 60);
    }

    #[test]
    fn rejects_unknown_backend_and_bad_numbers() {
        assert!(matches!(
            AppConfig::from_lookup(lookup_from(&[("DATA_BACKEND", "sqlite")])),
            Err(ConfigError::Invalid { key: "DATA_BACKEND", .. })
        ));
        assert!(matches!(
            AppConfig::from_lookup(lookup_from(&[("DATA_BACKEND", "memory"), ("PORT", "http")])),
            Err(ConfigError::Invalid { key: "PORT", .. })
        ));
    }

    #[test]
    fn seed_admin_needs_both_values() {
        assert!(matches!(
            AppConfig::from_lookup(lookup_from(&[
                ("DATA_BACKEND", "memory"),
                ("SEED_ADMIN_EMAIL", "admin@construccion.com"),
            ])),
            Err(ConfigError::Missing("SEED_ADMIN_PASSWORD"))
        ));
    }
}
