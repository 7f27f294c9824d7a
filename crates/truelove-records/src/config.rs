//! Service configuration.

/// Tunables for the record services.
#[derive(Debug, Clone)]
pub struct RecordsConfig {
    /// How many free tokens `assign` tries to claim before giving up
    /// when other callers keep winning the race (default: 3).
    pub claim_attempts: u32,
    /// How many sequential codes `assign` tries to mint when the
    /// computed code is already taken (default: 3).
    pub mint_attempts: u32,
}

impl Default for RecordsConfig {
    fn default() -> Self {
        Self {
            claim_attempts: 3,
            mint_attempts: 3,
        }
    }
}
