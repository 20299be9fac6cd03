//! STT credential pool.
//!
//! Maps `meeting_id → credential_index` with a per-credential concurrency
//! cap and a TTL on every assignment, so a crashed worker cannot pin a slot
//! forever. All operations sweep expired entries first and run under one
//! mutex, which makes them atomic for a single controller process; the
//! shape matches a shared-store (scripted) implementation one-to-one.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use cf_domain::config::CredentialConfig;
use cf_domain::error::{Error, Result};

#[derive(Debug, Clone, Serialize)]
pub struct CredentialStatus {
    pub index: usize,
    pub meetings: usize,
    pub available: usize,
}

#[derive(Debug, Clone)]
struct Assignment {
    index: usize,
    expires_at: DateTime<Utc>,
}

pub struct CredentialPool {
    total_keys: usize,
    max_meetings_per_key: usize,
    ttl: Duration,
    assignments: Mutex<HashMap<String, Assignment>>,
}

impl CredentialPool {
    pub fn new(config: &CredentialConfig) -> Self {
        Self {
            total_keys: config.total_keys,
            max_meetings_per_key: config.max_meetings_per_key,
            ttl: Duration::seconds(config.assignment_ttl_secs as i64),
            assignments: Mutex::new(HashMap::new()),
        }
    }

    /// Assign the least-loaded credential (ties: lowest index). Idempotent:
    /// a meeting that already holds one gets the same index back.
    pub fn allocate(&self, meeting_id: &str) -> Result<usize> {
        self.allocate_at(meeting_id, Utc::now())
    }

    /// Remove the assignment. Returns whether one was live.
    pub fn release(&self, meeting_id: &str) -> bool {
        self.release_at(meeting_id, Utc::now())
    }

    pub fn index_for(&self, meeting_id: &str) -> Option<usize> {
        let mut assignments = self.assignments.lock();
        Self::sweep(&mut assignments, Utc::now());
        assignments.get(meeting_id).map(|a| a.index)
    }

    pub fn status(&self) -> Vec<CredentialStatus> {
        let mut assignments = self.assignments.lock();
        Self::sweep(&mut assignments, Utc::now());
        let counts = Self::counts(&assignments, self.total_keys);
        counts
            .into_iter()
            .enumerate()
            .map(|(index, meetings)| CredentialStatus {
                index,
                meetings,
                available: self.max_meetings_per_key.saturating_sub(meetings),
            })
            .collect()
    }

    // ── Clock-injected internals (exercised directly by tests) ─────

    fn allocate_at(&self, meeting_id: &str, now: DateTime<Utc>) -> Result<usize> {
        let mut assignments = self.assignments.lock();
        Self::sweep(&mut assignments, now);

        if let Some(existing) = assignments.get(meeting_id) {
            return Ok(existing.index);
        }

        let counts = Self::counts(&assignments, self.total_keys);
        let best = counts
            .iter()
            .enumerate()
            .filter(|(_, count)| **count < self.max_meetings_per_key)
            .min_by_key(|(index, count)| (**count, *index))
            .map(|(index, _)| index);

        let Some(index) = best else {
            tracing::warn!(meeting_id, "credential pool exhausted");
            return Err(Error::QuotaExhausted);
        };

        assignments.insert(
            meeting_id.to_string(),
            Assignment {
                index,
                expires_at: now + self.ttl,
            },
        );
        tracing::info!(meeting_id, credential_index = index, "credential allocated");
        Ok(index)
    }

    fn release_at(&self, meeting_id: &str, now: DateTime<Utc>) -> bool {
        let mut assignments = self.assignments.lock();
        Self::sweep(&mut assignments, now);
        let released = assignments.remove(meeting_id).is_some();
        if released {
            tracing::info!(meeting_id, "credential released");
        }
        released
    }

    fn sweep(assignments: &mut HashMap<String, Assignment>, now: DateTime<Utc>) {
        assignments.retain(|_, a| a.expires_at > now);
    }

    fn counts(assignments: &HashMap<String, Assignment>, total_keys: usize) -> Vec<usize> {
        let mut counts = vec![0usize; total_keys];
        for assignment in assignments.values() {
            if assignment.index < total_keys {
                counts[assignment.index] += 1;
            }
        }
        counts
    }
}
