use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Degraded,
}

/// Reachability of each image tier, computed per request and never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthStatus {
    pub status: HealthState,
    pub r2: bool,
    pub cache: bool,
    pub local: bool,
    pub message: String,
}

impl HealthStatus {
    /// The memory cache is optional, so only the two storage tiers decide the status.
    pub fn from_tiers(r2: bool, cache: bool, local: bool) -> HealthStatus {
        let (status, message) = match (r2, local) {
            (true, true) => (HealthState::Healthy, "All image tiers are reachable".to_string()),
            (true, false) => (
                HealthState::Degraded,
                "Local fallback is unavailable; serving from R2 only".to_string(),
            ),
            (false, true) => (
                HealthState::Degraded,
                "R2 is unreachable; serving from local fallback".to_string(),
            ),
            (false, false) => (
                HealthState::Degraded,
                "No image tier is reachable".to_string(),
            ),
        };
        HealthStatus { status, r2, cache, local, message }
    }
}
