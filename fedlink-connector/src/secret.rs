//! Credential values that may come from the environment.
//!
//! ```json
//! "hunter2"
//! {"env_var": "REDIS_PASSWORD"}
//! {"env_var": "REDIS_PASSWORD", "default_val": ""}
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{ConnectorError, Result};

#[derive(Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum SecretValue {
    Inline(String),
    Env {
        env_var: String,
        #[serde(default)]
        default_val: Option<String>,
    },
}

impl SecretValue {
    pub fn inline(value: impl Into<String>) -> Self {
        Self::Inline(value.into())
    }

    pub fn from_env(var: impl Into<String>) -> Self {
        Self::Env {
            env_var: var.into(),
            default_val: None,
        }
    }

    /// Resolve to the actual secret.
    pub fn resolve(&self) -> Result<String> {
        match self {
            Self::Inline(value) => Ok(value.clone()),
            Self::Env {
                env_var,
                default_val,
            } => match std::env::var(env_var) {
                Ok(value) => Ok(value),
                Err(_) => default_val.clone().ok_or_else(|| {
                    ConnectorError::config(format!(
                        "environment variable '{}' not set and no default provided",
                        env_var
                    ))
                }),
            },
        }
    }
}

// Never print the inline secret.
impl std::fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Inline(_) => f.write_str("SecretValue::Inline(***)"),
            Self::Env { env_var, .. } => write!(f, "SecretValue::Env({})", env_var),
        }
    }
}

impl From<&str> for SecretValue {
    fn from(s: &str) -> Self {
        Self::Inline(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_forms() {
        let v: SecretValue = serde_json::from_str(r#""pw""#).unwrap();
        assert_eq!(v.resolve().unwrap(), "pw");

        let v: SecretValue =
            serde_json::from_str(r#"{"env_var": "FEDLINK_TEST_UNSET_VAR", "default_val": "d"}"#)
                .unwrap();
        assert_eq!(v.resolve().unwrap(), "d");

        let v = SecretValue::from_env("FEDLINK_TEST_UNSET_VAR");
        assert!(matches!(v.resolve(), Err(ConnectorError::Config(_))));
    }

    #[test]
    fn test_debug_redacts() {
        let v = SecretValue::inline("hunter2");
        assert!(!format!("{:?}", v).contains("hunter2"));
    }
}
