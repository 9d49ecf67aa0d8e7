//! Reparent Configuration

use std::time::Duration;

/// Default deadline for redirecting one replica.
pub const DEFAULT_REDIRECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Knobs shared by every reparent a coordinator runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReparentConfig {
    /// Deadline for each replica during quorum redirect
    pub redirect_timeout: Duration,

    /// Force flag passed to the retirer when scrapping the failed master
    pub scrap_force: bool,
}

impl Default for ReparentConfig {
    fn default() -> Self {
        Self {
            redirect_timeout: DEFAULT_REDIRECT_TIMEOUT,
            scrap_force: false,
        }
    }
}

impl ReparentConfig {
    pub fn with_redirect_timeout(mut self, timeout: Duration) -> Self {
        self.redirect_timeout = timeout;
        self
    }

    pub fn with_scrap_force(mut self, force: bool) -> Self {
        self.scrap_force = force;
        self
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.redirect_timeout.is_zero() {
            return Err("redirect_timeout must be greater than zero".to_string());
        }
        Ok(())
    }
}
