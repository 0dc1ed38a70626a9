use serde::{Deserialize, Serialize};

/// Tuning for the mint orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// How long an orchestration owns a record before another caller may
    /// resume it (seconds). Must exceed the longest confirmation wait.
    #[serde(default = "default_lease_ttl_secs")]
    pub lease_ttl_secs: u64,
    /// Fractional digits allowed in fiat amounts (2 for cents, 0 for whole units).
    #[serde(default = "default_fiat_minor_units")]
    pub fiat_minor_units: u32,
    /// How long a request waits for another reference to finish with the
    /// same recipient's escrow before giving up (milliseconds).
    #[serde(default = "default_escrow_wait_ms")]
    pub escrow_wait_ms: u64,
    #[serde(default = "default_escrow_poll_ms")]
    pub escrow_poll_ms: u64,
}

fn default_lease_ttl_secs() -> u64 {
    900
}
fn default_fiat_minor_units() -> u32 {
    2
}
fn default_escrow_wait_ms() -> u64 {
    60_000
}
fn default_escrow_poll_ms() -> u64 {
    250
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            lease_ttl_secs: default_lease_ttl_secs(),
            fiat_minor_units: default_fiat_minor_units(),
            escrow_wait_ms: default_escrow_wait_ms(),
            escrow_poll_ms: default_escrow_poll_ms(),
        }
    }
}

impl OrchestratorConfig {
    /// Lease duration, capped at one year.
    pub fn lease_ttl(&self) -> chrono::Duration {
        const MAX_LEASE_SECS: u64 = 365 * 24 * 3600;
        chrono::Duration::seconds(self.lease_ttl_secs.min(MAX_LEASE_SECS) as i64)
    }

    /// Escrow wait, kept under half the lease so a waiting record never
    /// outlives its own lease.
    pub fn escrow_wait(&self) -> std::time::Duration {
        let half_lease_ms = self.lease_ttl().num_milliseconds().max(0) as u64 / 2;
        std::time::Duration::from_millis(self.escrow_wait_ms.min(half_lease_ms))
    }

    pub fn escrow_poll(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.escrow_poll_ms.max(1))
    }
}
