mod agent;
mod context;
mod credentials;
mod providers;
mod server;
mod worker;

pub use agent::*;
pub use context::*;
pub use credentials::*;
pub use providers::*;
pub use server::*;
pub use worker::*;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub credentials: CredentialConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub context: ContextConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub stt: SttConfig,
    #[serde(default)]
    pub tts: TtsConfig,
}

impl Config {
    /// Load from a YAML file. A missing file yields the built-in defaults so
    /// dev setups can run with zero configuration.
    pub fn load(path: &std::path::Path) -> crate::Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(raw) => serde_yaml::from_str(&raw)
                .map_err(|e| crate::Error::InvalidInput(format!("config {}: {e}", path.display()))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "config file not found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert_eq!(config.credentials.max_meetings_per_key, 2);
        assert_eq!(config.context.l0_max_turns, 50);
        assert_eq!(config.agent.planning_max_retry, 3);
        assert_eq!(config.worker.ttl_seconds_after_finished, 300);
    }

    #[test]
    fn partial_yaml_overlays_defaults() {
        let raw = "credentials:\n  total_keys: 5\ncontext:\n  l0_max_turns: 10\n";
        let config: Config = serde_yaml::from_str(raw).unwrap();
        assert_eq!(config.credentials.total_keys, 5);
        assert_eq!(config.credentials.max_meetings_per_key, 2);
        assert_eq!(config.context.l0_max_turns, 10);
        assert_eq!(config.agent.wake_word, "부덕아");
    }
}
