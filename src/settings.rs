use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::PathBuf,
    sync::{RwLock, RwLockReadGuard},
    time::Duration,
};
use uuid::Uuid;

const DEFAULT_SERVER: &str = "http://127.0.0.1:8000";
const DEFAULT_IDENTITY_FILE: &str = "fallwatch-identity.json";
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Process-level settings for an engine embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub server_url: String,
    pub identity_path: PathBuf,
    pub debug: bool,
    /// Overrides the remembered operator name.
    pub operator_name: Option<String>,
    /// Displace another active operator without asking.
    pub auto_takeover: bool,
    /// Arm as soon as the session is active.
    pub arm_on_start: bool,
    pub connect_timeout: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER.into(),
            identity_path: PathBuf::from(DEFAULT_IDENTITY_FILE),
            debug: false,
            operator_name: None,
            auto_takeover: false,
            arm_on_start: false,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl EngineSettings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        Self {
            server_url: read("FALLWATCH_SERVER").unwrap_or(defaults.server_url),
            identity_path: read("FALLWATCH_IDENTITY")
                .map(PathBuf::from)
                .unwrap_or(defaults.identity_path),
            debug: read("FALLWATCH_DEBUG").map(|v| is_truthy(&v)).unwrap_or(false),
            operator_name: read("FALLWATCH_OPERATOR"),
            auto_takeover: read("FALLWATCH_TAKEOVER")
                .map(|v| is_truthy(&v))
                .unwrap_or(false),
            arm_on_start: read("FALLWATCH_ARM").map(|v| is_truthy(&v)).unwrap_or(false),
            connect_timeout: defaults.connect_timeout,
        }
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
struct Identity {
    token: String,
    operator_name: String,
}

/// Session token and last operator name, kept across restarts.
pub struct IdentityStore {
    path: PathBuf,
    data: RwLock<Identity>,
}

impl IdentityStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read identity from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_default()
        } else {
            Identity::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, Identity> {
        self.data.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The stored token, minting and persisting one on first use.
    pub fn ensure_token(&self) -> Result<String> {
        {
            let identity = self.read();
            if !identity.token.is_empty() {
                return Ok(identity.token.clone());
            }
        }

        let mut guard = self
            .data
            .write()
            .map_err(|_| anyhow!("identity store lock poisoned"))?;
        if guard.token.is_empty() {
            guard.token = Uuid::new_v4().to_string();
            self.persist(&guard)?;
        }
        Ok(guard.token.clone())
    }

    pub fn operator_name(&self) -> Option<String> {
        let name = self.read().operator_name.trim().to_string();
        (!name.is_empty()).then_some(name)
    }

    pub fn remember_name(&self, name: &str) -> Result<()> {
        let mut guard = self
            .data
            .write()
            .map_err(|_| anyhow!("identity store lock poisoned"))?;
        guard.operator_name = name.trim().to_string();
        self.persist(&guard)
    }

    fn persist(&self, data: &Identity) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write identity to {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn settings_read_environment_with_defaults() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("FALLWATCH_SERVER", "http://appliance.local:8000"),
            ("FALLWATCH_TAKEOVER", "yes"),
            ("FALLWATCH_OPERATOR", "  "),
        ]);
        let settings = EngineSettings::from_lookup(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(settings.server_url, "http://appliance.local:8000");
        assert!(settings.auto_takeover);
        assert!(!settings.debug);
        assert_eq!(settings.operator_name, None);
        assert_eq!(settings.identity_path, PathBuf::from(DEFAULT_IDENTITY_FILE));
    }

    #[test]
    fn token_is_stable_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identity.json");

        let store = IdentityStore::new(path.clone()).unwrap();
        let token = store.ensure_token().unwrap();
        assert_eq!(store.ensure_token().unwrap(), token);
        store.remember_name(" Bob ").unwrap();

        let reopened = IdentityStore::new(path).unwrap();
        assert_eq!(reopened.ensure_token().unwrap(), token);
        assert_eq!(reopened.operator_name().as_deref(), Some("Bob"));
    }

    #[test]
    fn corrupt_identity_file_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identity.json");
        fs::write(&path, "{not json").unwrap();

        let store = IdentityStore::new(path).unwrap();
        assert_eq!(store.operator_name(), None);
        assert_eq!(store.ensure_token().unwrap().len(), 36);
    }
}
