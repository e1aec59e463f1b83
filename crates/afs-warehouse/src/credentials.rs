//! Snowflake connection parameters
//!
//! Environment variables take precedence. When `SNOWFLAKE_ACCOUNT`,
//! `SNOWFLAKE_USER` and `SNOWFLAKE_PASSWORD` are not all set, the
//! `afs_poc_snowflake` profile of dbt's `profiles.yml` is used instead.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// dbt profile read when the environment is incomplete
pub const DEFAULT_PROFILE: &str = "afs_poc_snowflake";

pub const ENV_ACCOUNT: &str = "SNOWFLAKE_ACCOUNT";
pub const ENV_USER: &str = "SNOWFLAKE_USER";
pub const ENV_PASSWORD: &str = "SNOWFLAKE_PASSWORD";
pub const ENV_DATABASE: &str = "SNOWFLAKE_DATABASE";
pub const ENV_SCHEMA: &str = "SNOWFLAKE_SCHEMA";
pub const ENV_WAREHOUSE: &str = "SNOWFLAKE_WAREHOUSE";
pub const ENV_ROLE: &str = "SNOWFLAKE_ROLE";
pub const ENV_PROFILES_DIR: &str = "DBT_PROFILES_DIR";

const DEFAULT_DATABASE: &str = "DEMO";
const DEFAULT_SCHEMA: &str = "AFS_POC";
const DEFAULT_WAREHOUSE: &str = "COMPUTE_WH";
const DEFAULT_TARGET: &str = "dev";

/// Resolved connection parameters; empty optional values are `None`
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    pub account: String,
    pub user: String,
    pub password: String,
    pub database: Option<String>,
    pub schema: Option<String>,
    pub warehouse: Option<String>,
    pub role: Option<String>,
}

impl fmt::Debug for ConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionParams")
            .field("account", &self.account)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .field("schema", &self.schema)
            .field("warehouse", &self.warehouse)
            .field("role", &self.role)
            .finish()
    }
}

/// Where the parameters came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamSource {
    Environment,
    DbtProfile(PathBuf),
}

impl fmt::Display for ParamSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamSource::Environment => write!(f, "environment"),
            ParamSource::DbtProfile(path) => write!(f, "dbt profile {}", path.display()),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct DbtProfile {
    #[serde(default)]
    target: Option<String>,

    #[serde(default)]
    outputs: HashMap<String, DbtTarget>,
}

#[derive(Debug, Default, Deserialize)]
struct DbtTarget {
    #[serde(default)]
    account: Option<String>,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    password: Option<String>,
    #[serde(default)]
    database: Option<String>,
    #[serde(default)]
    schema: Option<String>,
    #[serde(default)]
    warehouse: Option<String>,
    #[serde(default)]
    role: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl ConnectionParams {
    /// Build from environment-style lookups; `None` unless account, user and password are all set
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let account = non_empty(lookup(ENV_ACCOUNT))?;
        let user = non_empty(lookup(ENV_USER))?;
        let password = non_empty(lookup(ENV_PASSWORD))?;

        Some(Self {
            account,
            user,
            password,
            database: Some(non_empty(lookup(ENV_DATABASE)).unwrap_or_else(|| DEFAULT_DATABASE.to_string())),
            schema: Some(non_empty(lookup(ENV_SCHEMA)).unwrap_or_else(|| DEFAULT_SCHEMA.to_string())),
            warehouse: Some(non_empty(lookup(ENV_WAREHOUSE)).unwrap_or_else(|| DEFAULT_WAREHOUSE.to_string())),
            role: non_empty(lookup(ENV_ROLE)),
        })
    }

    /// Build from the process environment
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read a profile from a dbt `profiles.yml`
    ///
    /// Returns `Ok(None)` when the file, the profile or its selected target is
    /// missing, or when the target lacks account, user or password.
    pub fn from_dbt_profiles(path: &Path, profile: &str) -> Result<Option<Self>, CredentialError> {
        if !path.exists() {
            return Ok(None);
        }

        let contents = std::fs::read_to_string(path)
            .map_err(|e| CredentialError::ProfileError(format!("{}: {}", path.display(), e)))?;

        Self::from_dbt_profiles_str(&contents, profile)
    }

    /// Parse a profile out of `profiles.yml` contents
    pub fn from_dbt_profiles_str(yaml: &str, profile: &str) -> Result<Option<Self>, CredentialError> {
        let profiles: HashMap<String, serde_yaml::Value> = serde_yaml::from_str::<Option<_>>(yaml)
            .map_err(|e| CredentialError::ProfileError(e.to_string()))?
            .unwrap_or_default();

        let Some(raw) = profiles.get(profile) else {
            return Ok(None);
        };

        let profile: DbtProfile = serde_yaml::from_value(raw.clone())
            .map_err(|e| CredentialError::ProfileError(e.to_string()))?;

        let target_name = profile.target.as_deref().unwrap_or(DEFAULT_TARGET);
        let Some(target) = profile.outputs.get(target_name) else {
            return Ok(None);
        };

        let field = |value: &Option<String>| non_empty(value.as_deref().map(render_env_vars));
        let with_default = |value: &Option<String>, default: &str| {
            non_empty(Some(field(value).unwrap_or_else(|| default.to_string())))
        };

        let (Some(account), Some(user), Some(password)) =
            (field(&target.account), field(&target.user), field(&target.password))
        else {
            return Ok(None);
        };

        Ok(Some(Self {
            account,
            user,
            password,
            database: with_default(&target.database, DEFAULT_DATABASE),
            schema: with_default(&target.schema, DEFAULT_SCHEMA),
            warehouse: with_default(&target.warehouse, DEFAULT_WAREHOUSE),
            role: field(&target.role),
        }))
    }

    /// Environment first, then the dbt profile
    ///
    /// An unreadable profiles file is logged and treated as absent.
    pub fn resolve_with(
        lookup: impl Fn(&str) -> Option<String>,
        profiles_path: &Path,
        profile: &str,
    ) -> Result<(Self, ParamSource), CredentialError> {
        if let Some(params) = Self::from_lookup(&lookup) {
            return Ok((params, ParamSource::Environment));
        }

        match Self::from_dbt_profiles(profiles_path, profile) {
            Ok(Some(params)) => return Ok((params, ParamSource::DbtProfile(profiles_path.to_path_buf()))),
            Ok(None) => {}
            Err(e) => tracing::warn!("Could not read dbt profiles: {}", e),
        }

        Err(CredentialError::NotFound {
            profiles_path: profiles_path.to_path_buf(),
            profile: profile.to_string(),
        })
    }

    /// Resolve from the process environment and the default profiles location
    pub fn resolve(profiles_dir: Option<&Path>) -> Result<(Self, ParamSource), CredentialError> {
        let path = profiles_path(profiles_dir, |key| std::env::var(key).ok());
        Self::resolve_with(|key| std::env::var(key).ok(), &path, DEFAULT_PROFILE)
    }
}

/// Location of `profiles.yml`: explicit dir, then `DBT_PROFILES_DIR`, then `~/.dbt`
pub fn profiles_path(explicit: Option<&Path>, lookup: impl Fn(&str) -> Option<String>) -> PathBuf {
    let dir = explicit
        .map(Path::to_path_buf)
        .or_else(|| non_empty(lookup(ENV_PROFILES_DIR)).map(PathBuf::from))
        .or_else(|| dirs::home_dir().map(|home| home.join(".dbt")))
        .unwrap_or_else(|| PathBuf::from(".dbt"));

    dir.join("profiles.yml")
}

static ENV_VAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\{\{\s*env_var\(\s*['"]([^'"]+)['"]\s*(?:,\s*['"]([^'"]*)['"]\s*)?\)\s*\}\}"#)
        .expect("valid env_var regex")
});

/// Expand dbt's `{{ env_var('NAME') }}` / `{{ env_var('NAME', 'default') }}`
fn render_env_vars(value: &str) -> String {
    ENV_VAR
        .replace_all(value, |caps: &Captures| {
            std::env::var(&caps[1])
                .ok()
                .or_else(|| caps.get(2).map(|m| m.as_str().to_string()))
                .unwrap_or_default()
        })
        .into_owned()
}

/// Credential error types
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error(
        "No Snowflake credentials found. Set SNOWFLAKE_ACCOUNT / SNOWFLAKE_USER / SNOWFLAKE_PASSWORD, \
         or configure the '{profile}' profile in {}", .profiles_path.display()
    )]
    NotFound { profiles_path: PathBuf, profile: String },

    #[error("Invalid dbt profile: {0}")]
    ProfileError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const PROFILES: &str = r#"
config:
  send_anonymous_usage_stats: false

afs_poc_snowflake:
  target: prod
  outputs:
    dev:
      type: snowflake
      account: dev-account
      user: dev-user
      password: dev-pass
    prod:
      type: snowflake
      account: prod-account
      user: prod-user
      password: prod-pass
      warehouse: ANALYTICS_WH
      role: ANALYST
      threads: 4
"#;

    #[test]
    fn env_requires_all_three() {
        assert!(ConnectionParams::from_lookup(env(&[(ENV_ACCOUNT, "a"), (ENV_USER, "u")])).is_none());
        assert!(ConnectionParams::from_lookup(env(&[
            (ENV_ACCOUNT, "a"),
            (ENV_USER, "u"),
            (ENV_PASSWORD, ""),
        ]))
        .is_none());
    }

    #[test]
    fn env_defaults() {
        let params = ConnectionParams::from_lookup(env(&[
            (ENV_ACCOUNT, "a"),
            (ENV_USER, "u"),
            (ENV_PASSWORD, "p"),
            (ENV_DATABASE, ""),
        ]))
        .unwrap();

        assert_eq!(params.database.as_deref(), Some("DEMO"));
        assert_eq!(params.schema.as_deref(), Some("AFS_POC"));
        assert_eq!(params.warehouse.as_deref(), Some("COMPUTE_WH"));
        assert_eq!(params.role, None);
    }

    #[test]
    fn profile_uses_selected_target() {
        let params = ConnectionParams::from_dbt_profiles_str(PROFILES, DEFAULT_PROFILE)
            .unwrap()
            .unwrap();

        assert_eq!(params.account, "prod-account");
        assert_eq!(params.warehouse.as_deref(), Some("ANALYTICS_WH"));
        assert_eq!(params.role.as_deref(), Some("ANALYST"));
        assert_eq!(params.database.as_deref(), Some("DEMO"));
    }

    #[test]
    fn profile_target_defaults_to_dev() {
        let yaml = PROFILES.replace("  target: prod\n", "");
        let params = ConnectionParams::from_dbt_profiles_str(&yaml, DEFAULT_PROFILE)
            .unwrap()
            .unwrap();
        assert_eq!(params.account, "dev-account");
    }

    #[test]
    fn missing_profile_or_target() {
        assert!(ConnectionParams::from_dbt_profiles_str(PROFILES, "other").unwrap().is_none());

        let yaml = PROFILES.replace("target: prod", "target: staging");
        assert!(ConnectionParams::from_dbt_profiles_str(&yaml, DEFAULT_PROFILE).unwrap().is_none());
    }

    #[test]
    fn env_var_templates_are_expanded() {
        let yaml = r#"
afs_poc_snowflake:
  outputs:
    dev:
      account: acct
      user: someone
      password: "{{ env_var('AFS_TEST_UNSET_PASSWORD_VAR', 'fallback') }}"
"#;
        let params = ConnectionParams::from_dbt_profiles_str(yaml, DEFAULT_PROFILE)
            .unwrap()
            .unwrap();
        assert_eq!(params.password, "fallback");
    }

    #[test]
    fn environment_wins_over_profile() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profiles.yml");
        std::fs::write(&path, PROFILES).unwrap();

        let lookup = env(&[(ENV_ACCOUNT, "env-account"), (ENV_USER, "u"), (ENV_PASSWORD, "p")]);
        let (params, source) = ConnectionParams::resolve_with(lookup, &path, DEFAULT_PROFILE).unwrap();
        assert_eq!(params.account, "env-account");
        assert_eq!(source, ParamSource::Environment);

        let (params, source) = ConnectionParams::resolve_with(env(&[]), &path, DEFAULT_PROFILE).unwrap();
        assert_eq!(params.account, "prod-account");
        assert_eq!(source, ParamSource::DbtProfile(path.clone()));
    }

    #[test]
    fn nothing_configured() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profiles.yml");
        let err = ConnectionParams::resolve_with(env(&[]), &path, DEFAULT_PROFILE).unwrap_err();
        assert!(matches!(err, CredentialError::NotFound { .. }));
    }

    #[test]
    fn profiles_path_precedence() {
        let explicit = profiles_path(Some(Path::new("/etc/dbt")), env(&[(ENV_PROFILES_DIR, "/opt/dbt")]));
        assert_eq!(explicit, PathBuf::from("/etc/dbt/profiles.yml"));

        let from_env = profiles_path(None, env(&[(ENV_PROFILES_DIR, "/opt/dbt")]));
        assert_eq!(from_env, PathBuf::from("/opt/dbt/profiles.yml"));
    }

    #[test]
    fn debug_redacts_password() {
        let params = ConnectionParams::from_lookup(env(&[
            (ENV_ACCOUNT, "a"),
            (ENV_USER, "u"),
            (ENV_PASSWORD, "hunter2"),
        ]))
        .unwrap();
        assert!(!format!("{:?}", params).contains("hunter2"));
    }
}
