//! Runtime configuration: engine settings plus browser and batch options,
//! loaded from a JSON file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use stockcheck_engine::{EngineConfig, RetryPolicy};

/// Env var naming the config file.
pub const CONFIG_ENV: &str = "STOCKCHECK_CONFIG";

/// Config file looked for in the working directory.
pub const LOCAL_CONFIG: &str = "stockcheck.json";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub engine: EngineConfig,
    pub retry: RetryPolicy,
    /// Concurrent pages, each checking its own share of the batch.
    pub workers: usize,
    pub headless: bool,
    pub chromium_path: Option<PathBuf>,
    /// Persistent browser profile, for sessions that need a prior login.
    pub profile_dir: Option<PathBuf>,
    /// Lower-cased body-text markers of a bot-challenge page.
    pub challenge_markers: Vec<String>,
    /// `name=value; name2=value2` cookie header installed before navigating.
    pub cookie: Option<String>,
    /// Domain the cookie header is installed for.
    pub cookie_domain: String,
    /// JSONL log of every outcome. `None` uses `~/.stockcheck/results.jsonl`.
    pub result_log: Option<PathBuf>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            retry: RetryPolicy::default(),
            workers: 1,
            headless: true,
            chromium_path: None,
            profile_dir: None,
            challenge_markers: vec![
                "pardon our interruption".into(),
                "captcha".into(),
                "ebay-static-captcha".into(),
            ],
            cookie: None,
            cookie_domain: ".ebay.co.uk".into(),
            result_log: None,
        }
    }
}

impl RuntimeConfig {
    /// Read and validate a config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load from the first config path that exists, or defaults when none does.
    pub fn load(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>), ConfigError> {
        match resolve_config_path(explicit, |k| std::env::var(k), dirs::home_dir()) {
            Some(path) => Ok((Self::from_file(&path)?, Some(path))),
            None => Ok((Self::default(), None)),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Invalid {
                field: "workers",
                reason: "must be at least 1".into(),
            });
        }
        if self.engine.match_rules.is_empty() {
            return Err(ConfigError::Invalid {
                field: "engine.match_rules",
                reason: "at least one rule is required".into(),
            });
        }
        if self.engine.timings.navigation_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "engine.timings.navigation_timeout_ms",
                reason: "must be positive".into(),
            });
        }
        Ok(())
    }

    /// Where outcomes are appended.
    pub fn result_log_path(&self) -> PathBuf {
        self.result_log
            .clone()
            .unwrap_or_else(|| state_dir().join("results.jsonl"))
    }
}

/// `~/.stockcheck`, or `/tmp/.stockcheck` without a home directory.
pub fn state_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(".stockcheck")
}

/// Pick the config file: explicit flag, then `STOCKCHECK_CONFIG`, then
/// `./stockcheck.json`, then `~/.stockcheck/config.json`.
///
/// An explicit path or env value is returned even if the file is missing so
/// the read error surfaces; the implicit locations must exist.
pub fn resolve_config_path<F>(
    explicit: Option<&Path>,
    lookup: F,
    home: Option<PathBuf>,
) -> Option<PathBuf>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Ok(value) = lookup(CONFIG_ENV) {
        if !value.trim().is_empty() {
            return Some(PathBuf::from(value.trim()));
        }
    }
    let local = PathBuf::from(LOCAL_CONFIG);
    if local.exists() {
        return Some(local);
    }
    home.map(|h| h.join(".stockcheck").join("config.json"))
        .filter(|p| p.exists())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::env::VarError;

    fn lookup_from_map(
        map: HashMap<&'static str, &'static str>,
    ) -> impl Fn(&str) -> Result<String, VarError> {
        move |key| {
            map.get(key)
                .map(|v| (*v).to_string())
                .ok_or(VarError::NotPresent)
        }
    }

    #[test]
    fn test_explicit_path_wins() {
        let env = lookup_from_map(HashMap::from([(CONFIG_ENV, "/etc/stockcheck.json")]));
        let path = resolve_config_path(Some(Path::new("mine.json")), env, None);
        assert_eq!(path, Some(PathBuf::from("mine.json")));
    }

    #[test]
    fn test_env_var_before_home() {
        let home = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(home.path().join(".stockcheck")).unwrap();
        std::fs::write(home.path().join(".stockcheck/config.json"), "{}").unwrap();

        let env = lookup_from_map(HashMap::from([(CONFIG_ENV, "/etc/stockcheck.json")]));
        let path = resolve_config_path(None, env, Some(home.path().to_path_buf()));
        assert_eq!(path, Some(PathBuf::from("/etc/stockcheck.json")));
    }

    #[test]
    fn test_home_config_used_when_present() {
        let home = tempfile::tempdir().unwrap();
        let env = lookup_from_map(HashMap::new());
        assert_eq!(
            resolve_config_path(None, &env, Some(home.path().to_path_buf())),
            None
        );

        std::fs::create_dir_all(home.path().join(".stockcheck")).unwrap();
        std::fs::write(home.path().join(".stockcheck/config.json"), "{}").unwrap();
        assert_eq!(
            resolve_config_path(None, &env, Some(home.path().to_path_buf())),
            Some(home.path().join(".stockcheck/config.json"))
        );
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stockcheck.json");
        std::fs::write(
            &path,
            r#"{
                "workers": 3,
                "retry": { "max_retries": 4 },
                "engine": { "availability": { "strict": true } }
            }"#,
        )
        .unwrap();

        let cfg = RuntimeConfig::from_file(&path).unwrap();
        assert_eq!(cfg.workers, 3);
        assert_eq!(cfg.retry.max_retries, 4);
        assert_eq!(cfg.retry.delay_ms, RetryPolicy::default().delay_ms);
        assert!(cfg.engine.availability.strict);
        assert!(cfg.headless);
        assert_eq!(cfg.challenge_markers.len(), 3);
    }

    #[test]
    fn test_zero_workers_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, r#"{ "workers": 0 }"#).unwrap();
        let err = RuntimeConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "workers", .. }));
    }

    #[test]
    fn test_malformed_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = RuntimeConfig::from_file(&path).unwrap_err();
        assert!(err.to_string().contains("broken.json"));
    }
}
