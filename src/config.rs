use crate::statement::ConsistencyLevel;

/// Runtime configuration for a unit-of-work context.
///
/// All defaults are explicit: per-call consistency levels override
/// `default_consistency`, and there is no ambient session state.
#[derive(Debug, Clone)]
pub struct UowConfig {
    /// Consistency applied when a save call does not supply its own level.
    pub default_consistency: ConsistencyLevel,
    /// Keyspace used to qualify tables registered without an explicit one.
    pub default_keyspace: Option<String>,
    /// Forces the literal `BEGIN .. APPLY BATCH` script encoding even when
    /// the execution layer supports structured batches. Keeps the emitted
    /// CQL text reproducible for compatibility testing.
    pub force_legacy_batch: bool,
}

impl Default for UowConfig {
    fn default() -> Self {
        Self {
            default_consistency: ConsistencyLevel::Quorum,
            default_keyspace: None,
            force_legacy_batch: false,
        }
    }
}

impl UowConfig {
    pub fn with_default_consistency(mut self, consistency: ConsistencyLevel) -> Self {
        self.default_consistency = consistency;
        self
    }

    pub fn with_default_keyspace(mut self, keyspace: impl Into<String>) -> Self {
        self.default_keyspace = Some(keyspace.into());
        self
    }

    pub fn with_force_legacy_batch(mut self, force: bool) -> Self {
        self.force_legacy_batch = force;
        self
    }
}
