use serde::{Deserialize, Serialize};

/// STT credential pool sizing.
///
/// Capacity is `total_keys × max_meetings_per_key`. Every assignment carries
/// a TTL longer than any expected meeting so a crashed worker cannot pin a
/// slot forever.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialConfig {
    /// Number of provider credentials available, indexed `[0, total_keys)`.
    #[serde(default = "d_total_keys")]
    pub total_keys: usize,
    /// Concurrent meetings allowed per credential.
    #[serde(default = "d_max_meetings_per_key")]
    pub max_meetings_per_key: usize,
    /// Assignment TTL in seconds.
    #[serde(default = "d_assignment_ttl_secs")]
    pub assignment_ttl_secs: u64,
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            total_keys: d_total_keys(),
            max_meetings_per_key: d_max_meetings_per_key(),
            assignment_ttl_secs: d_assignment_ttl_secs(),
        }
    }
}

fn d_total_keys() -> usize {
    3
}

fn d_max_meetings_per_key() -> usize {
    2
}

fn d_assignment_ttl_secs() -> u64 {
    4 * 60 * 60
}
