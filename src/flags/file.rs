//! File-backed flag definitions and targeting.
//!
//! Flags are read from a YAML document and evaluated in-process. Each flag
//! has a fallthrough value and an ordered list of targets; the first target
//! whose attributes all equal the evaluation context wins.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::evaluator::{FlagContext, FlagError, FlagEvaluator};
use crate::error::{Result, ScoopError};

/// A complete set of flag definitions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlagSet {
    /// Map of flag key to definition
    #[serde(default)]
    pub flags: HashMap<String, FlagDefinition>,
}

/// Definition of a single flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlagDefinition {
    /// Whether targeting is active. When off, `off_value` is served.
    #[serde(default = "default_on")]
    pub on: bool,
    /// Value served while the flag is off
    #[serde(default)]
    pub off_value: Option<Value>,
    /// Value served when no target matches
    #[serde(default)]
    pub fallthrough: Option<Value>,
    /// Ordered targeting rules
    #[serde(default)]
    pub targets: Vec<FlagTarget>,
}

fn default_on() -> bool {
    true
}

/// A targeting rule. Unset attributes match anything.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlagTarget {
    /// Context key to match
    #[serde(default)]
    pub key: Option<String>,
    /// Client address to match
    #[serde(default)]
    pub client_address: Option<String>,
    /// Value served on match
    pub value: Value,
}

impl FlagTarget {
    fn matches(&self, context: &FlagContext) -> bool {
        let key_matches = self.key.as_ref().map_or(true, |k| *k == context.key);
        let addr_matches = self
            .client_address
            .as_ref()
            .map_or(true, |a| *a == context.client_address);
        key_matches && addr_matches
    }
}

impl FlagDefinition {
    /// Evaluate this flag for a context.
    pub fn evaluate(&self, context: &FlagContext) -> Option<&Value> {
        if !self.on {
            return self.off_value.as_ref();
        }

        self.targets
            .iter()
            .find(|target| target.matches(context))
            .map(|target| &target.value)
            .or(self.fallthrough.as_ref())
    }
}

impl FlagSet {
    /// Load flag definitions from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading flag definitions");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load flag definitions from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| ScoopError::Flags(format!("Failed to parse flag definitions: {}", e)))
    }

    pub fn get(&self, flag_key: &str) -> Option<&FlagDefinition> {
        self.flags.get(flag_key)
    }
}

/// Flag evaluator serving definitions from a YAML file.
pub struct FileFlagEvaluator {
    /// Source file, if the definitions came from disk.
    path: Option<PathBuf>,
    /// Current definitions.
    flags: RwLock<FlagSet>,
}

impl FileFlagEvaluator {
    /// An evaluator with no flags; every lookup is unavailable.
    pub fn empty() -> Self {
        Self::with_flags(FlagSet::default())
    }

    pub fn with_flags(flags: FlagSet) -> Self {
        Self {
            path: None,
            flags: RwLock::new(flags),
        }
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(Self::with_flags(FlagSet::from_yaml(yaml)?))
    }

    /// Load definitions from `path`, remembering it for [`reload`](Self::reload).
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let flags = FlagSet::from_file(&path)?;
        Ok(Self {
            path: Some(path),
            flags: RwLock::new(flags),
        })
    }

    /// Replace the current definitions.
    pub fn set_flags(&self, flags: FlagSet) {
        let mut current = self.flags.write();
        *current = flags;
    }

    /// Re-read the source file. On failure the previous definitions stay.
    pub async fn reload(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let contents = tokio::fs::read_to_string(path).await?;
        let flags = FlagSet::from_yaml(&contents)?;
        debug!(path = %path.display(), count = flags.flags.len(), "Reloaded flag definitions");
        self.set_flags(flags);
        Ok(())
    }

    /// Reload the source file every `interval` for as long as the evaluator lives.
    pub fn spawn_reload(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let evaluator = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(evaluator) = evaluator.upgrade() else {
                    break;
                };
                if let Err(e) = evaluator.reload().await {
                    warn!(error = %e, "Flag reload failed, keeping previous definitions");
                }
            }
        })
    }
}

#[async_trait]
impl FlagEvaluator for FileFlagEvaluator {
    async fn variation(
        &self,
        flag_key: &str,
        context: &FlagContext,
    ) -> std::result::Result<Option<Value>, FlagError> {
        let flags = self.flags.read();
        Ok(flags
            .get(flag_key)
            .and_then(|flag| flag.evaluate(context))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const FLAGS: &str = r#"
flags:
  api-rate-limiter:
    fallthrough: 60
    targets:
      - key: DELETE
        value: 5
      - client_address: 10.0.0.9
        value: 1
      - key: POST
        client_address: 10.0.0.7
        value: 2
  api-write-permission:
    fallthrough: false
    targets:
      - key: 127.0.0.1
        value: true
  maintenance:
    on: false
    off_value: false
    fallthrough: true
  dark-launch:
    on: false
    fallthrough: true
"#;

    fn snapshot(evaluator: &FileFlagEvaluator) -> FlagSet {
        evaluator.flags.read().clone()
    }

    fn evaluator() -> FileFlagEvaluator {
        FileFlagEvaluator::from_yaml(FLAGS).unwrap()
    }

    async fn eval(flag: &str, key: &str, addr: &str) -> Option<Value> {
        evaluator()
            .variation(flag, &FlagContext::new(key, addr))
            .await
            .unwrap()
    }

    #[test]
    fn test_parse_flags() {
        let flags = FlagSet::from_yaml(FLAGS).unwrap();
        assert_eq!(flags.flags.len(), 4);
        assert_eq!(flags.get("api-rate-limiter").unwrap().targets.len(), 3);
        assert!(flags.get("api-write-permission").unwrap().on);
    }

    #[test]
    fn test_parse_invalid_flags() {
        let result = FlagSet::from_yaml("flags:\n  broken:\n    targets: 7\n");
        assert!(matches!(result, Err(ScoopError::Flags(_))));
    }

    #[tokio::test]
    async fn test_fallthrough() {
        assert_eq!(eval("api-rate-limiter", "GET", "1.2.3.4").await, Some(json!(60)));
    }

    #[tokio::test]
    async fn test_target_by_key() {
        assert_eq!(eval("api-rate-limiter", "DELETE", "1.2.3.4").await, Some(json!(5)));
        assert_eq!(eval("api-write-permission", "127.0.0.1", "127.0.0.1").await, Some(json!(true)));
    }

    #[tokio::test]
    async fn test_target_by_address() {
        assert_eq!(eval("api-rate-limiter", "GET", "10.0.0.9").await, Some(json!(1)));
    }

    #[tokio::test]
    async fn test_target_requires_every_attribute() {
        assert_eq!(eval("api-rate-limiter", "POST", "10.0.0.7").await, Some(json!(2)));
        assert_eq!(eval("api-rate-limiter", "PUT", "10.0.0.7").await, Some(json!(60)));
    }

    #[tokio::test]
    async fn test_first_target_wins() {
        // DELETE from 10.0.0.9 matches both the key and the address rule.
        assert_eq!(eval("api-rate-limiter", "DELETE", "10.0.0.9").await, Some(json!(5)));
    }

    #[tokio::test]
    async fn test_off_flag_serves_off_value() {
        assert_eq!(eval("maintenance", "GET", "1.2.3.4").await, Some(json!(false)));
        assert_eq!(eval("dark-launch", "GET", "1.2.3.4").await, None);
    }

    #[tokio::test]
    async fn test_unknown_flag() {
        assert_eq!(eval("nope", "GET", "1.2.3.4").await, None);
        let empty = FileFlagEvaluator::empty();
        let value = empty
            .variation("api-rate-limiter", &FlagContext::new("GET", "1.2.3.4"))
            .await
            .unwrap();
        assert_eq!(value, None);
    }

    #[tokio::test]
    async fn test_set_flags_replaces_definitions() {
        let evaluator = evaluator();
        evaluator.set_flags(FlagSet::from_yaml("flags:\n  api-rate-limiter:\n    fallthrough: 7\n").unwrap());

        let value = evaluator
            .variation("api-rate-limiter", &FlagContext::new("DELETE", "1.2.3.4"))
            .await
            .unwrap();
        assert_eq!(value, Some(json!(7)));
        assert!(snapshot(&evaluator).get("api-write-permission").is_none());
    }

    #[tokio::test]
    async fn test_reload_without_path_is_noop() {
        let evaluator = evaluator();
        assert!(evaluator.reload().await.is_ok());
        assert_eq!(snapshot(&evaluator).flags.len(), 4);
    }

    #[tokio::test]
    async fn test_reload_picks_up_file_changes() {
        let path = std::env::temp_dir().join(format!("scoop-flags-{}.yaml", uuid::Uuid::new_v4()));
        std::fs::write(&path, "flags:\n  api-rate-limiter:\n    fallthrough: 10\n").unwrap();

        let evaluator = FileFlagEvaluator::from_file(&path).unwrap();
        std::fs::write(&path, "flags:\n  api-rate-limiter:\n    fallthrough: 20\n").unwrap();
        evaluator.reload().await.unwrap();
        let flag = snapshot(&evaluator).get("api-rate-limiter").cloned().unwrap();
        assert_eq!(flag.fallthrough, Some(json!(20)));

        // A broken file keeps the previous definitions.
        std::fs::write(&path, "flags: [").unwrap();
        assert!(evaluator.reload().await.is_err());
        let flag = snapshot(&evaluator).get("api-rate-limiter").cloned().unwrap();
        assert_eq!(flag.fallthrough, Some(json!(20)));

        std::fs::remove_file(&path).unwrap();
    }

    #[tokio::test]
    async fn test_background_reload_serves_new_definitions() {
        let path = std::env::temp_dir().join(format!("scoop-flags-{}.yaml", uuid::Uuid::new_v4()));
        std::fs::write(&path, "flags:\n  api-rate-limiter:\n    fallthrough: 10\n").unwrap();

        let evaluator = Arc::new(FileFlagEvaluator::from_file(&path).unwrap());
        let reloader = evaluator.spawn_reload(Duration::from_millis(20));
        std::fs::write(&path, "flags:\n  api-rate-limiter:\n    fallthrough: 30\n").unwrap();

        let context = FlagContext::new("GET", "1.2.3.4");
        let mut served = None;
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            served = evaluator.variation("api-rate-limiter", &context).await.unwrap();
            if served == Some(json!(30)) {
                break;
            }
        }
        assert_eq!(served, Some(json!(30)));

        reloader.abort();
        std::fs::remove_file(&path).unwrap();
    }
}
