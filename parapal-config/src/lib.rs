use std::env;
use std::path::PathBuf;

use thiserror::Error;

pub const DEFAULT_ENDPOINT_ENV_KEY: &str = "PARAPAL_GRADER_URL";
pub const DEFAULT_TOKEN_ENV_KEY: &str = "PARAPAL_ID_TOKEN";
pub const DEFAULT_HOME_ENV_KEY: &str = "PARAPAL_HOME";
pub const DEFAULT_SESSION_ID: &str = "parapal";
pub const DEFAULT_RUBRIC_INSTRUCTION: &str =
    "Grade on clarity, organization, grammar, and argument strength from 1–5.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraderConfig {
    pub endpoint: String,
    pub token_env_key: String,
    pub default_rubric: String,
    pub store_dir: PathBuf,
    pub session_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GraderConfigOverrides {
    pub endpoint: Option<String>,
    pub endpoint_env_key: Option<String>,
    pub token_env_key: Option<String>,
    pub store_dir: Option<PathBuf>,
    pub session_id: Option<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("environment variable '{0}' is not set")]
    MissingEnvVar(String),
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

pub fn load_grader_config() -> Result<GraderConfig, ConfigError> {
    load_grader_config_with(GraderConfigOverrides::default())
}

pub fn load_grader_config_with(
    overrides: GraderConfigOverrides,
) -> Result<GraderConfig, ConfigError> {
    let endpoint = match overrides.endpoint {
        Some(endpoint) => endpoint,
        None => {
            let key = overrides
                .endpoint_env_key
                .unwrap_or_else(|| DEFAULT_ENDPOINT_ENV_KEY.to_string());
            env::var(&key).map_err(|_| ConfigError::MissingEnvVar(key.clone()))?
        }
    };
    let endpoint = endpoint.trim().to_string();
    if endpoint.is_empty() {
        return Err(ConfigError::InvalidValue {
            field: "endpoint".to_string(),
            reason: "cannot be blank".to_string(),
        });
    }

    Ok(GraderConfig {
        endpoint,
        token_env_key: overrides
            .token_env_key
            .unwrap_or_else(|| DEFAULT_TOKEN_ENV_KEY.to_string()),
        default_rubric: DEFAULT_RUBRIC_INSTRUCTION.to_string(),
        store_dir: overrides.store_dir.unwrap_or_else(default_store_dir),
        session_id: overrides
            .session_id
            .unwrap_or_else(|| DEFAULT_SESSION_ID.to_string()),
    })
}

pub fn default_store_dir() -> PathBuf {
    if let Some(home) = env::var(DEFAULT_HOME_ENV_KEY)
        .ok()
        .filter(|value| !value.trim().is_empty())
    {
        return PathBuf::from(home);
    }
    env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(".parapal")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_endpoint_from_custom_env_key() {
        let key = "PARAPAL_CONFIG_TEST_URL";
        // SAFETY: test process owns this env var namespace.
        unsafe { env::set_var(key, "  https://grader.example.com/prod/grade  "); }

        let cfg = load_grader_config_with(GraderConfigOverrides {
            endpoint_env_key: Some(key.to_string()),
            store_dir: Some(PathBuf::from("/tmp/parapal-test")),
            ..GraderConfigOverrides::default()
        })
        .expect("load config");

        assert_eq!(cfg.endpoint, "https://grader.example.com/prod/grade");
        assert_eq!(cfg.token_env_key, DEFAULT_TOKEN_ENV_KEY);
        assert_eq!(cfg.default_rubric, DEFAULT_RUBRIC_INSTRUCTION);
        assert_eq!(cfg.store_dir, PathBuf::from("/tmp/parapal-test"));
        assert_eq!(cfg.session_id, DEFAULT_SESSION_ID);

        // SAFETY: test process owns this env var namespace.
        unsafe { env::remove_var(key); }
    }

    #[test]
    fn missing_endpoint_env_var_is_reported_by_name() {
        let err = load_grader_config_with(GraderConfigOverrides {
            endpoint_env_key: Some("PARAPAL_CONFIG_TEST_UNSET".to_string()),
            ..GraderConfigOverrides::default()
        })
        .expect_err("missing env var should fail");
        assert!(matches!(err, ConfigError::MissingEnvVar(ref key) if key == "PARAPAL_CONFIG_TEST_UNSET"));
    }

    #[test]
    fn blank_endpoint_override_is_rejected() {
        let err = load_grader_config_with(GraderConfigOverrides {
            endpoint: Some("   ".to_string()),
            ..GraderConfigOverrides::default()
        })
        .expect_err("blank endpoint should fail");
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }
}
