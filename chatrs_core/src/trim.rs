//! History trimming configuration.

use serde::{Deserialize, Serialize};

use crate::Role;

/// Which end of the history survives trimming.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TrimStrategy {
    /// Keep the most recent messages.
    #[default]
    Last,
}

/// Token budget and rules applied to the history before each model call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrimConfig {
    /// Maximum tokens the trimmed history may use
    #[serde(default = "TrimConfig::default_max_tokens")]
    pub max_tokens: usize,
    #[serde(default)]
    pub strategy: TrimStrategy,
    /// Keep a leading system message regardless of budget
    #[serde(default = "TrimConfig::default_true")]
    pub include_system: bool,
    /// Allow cutting the oldest retained message down to fit
    #[serde(default)]
    pub allow_partial: bool,
    /// Role the retained conversation must open with
    #[serde(default = "TrimConfig::default_start_on")]
    pub start_on: Option<Role>,
}

impl Default for TrimConfig {
    fn default() -> Self {
        Self {
            max_tokens: Self::default_max_tokens(),
            strategy: TrimStrategy::Last,
            include_system: true,
            allow_partial: false,
            start_on: Self::default_start_on(),
        }
    }
}

impl TrimConfig {
    const fn default_max_tokens() -> usize {
        1024
    }

    const fn default_true() -> bool {
        true
    }

    const fn default_start_on() -> Option<Role> {
        Some(Role::Human)
    }

    #[must_use]
    pub const fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    #[must_use]
    pub const fn include_system(mut self, include: bool) -> Self {
        self.include_system = include;
        self
    }

    #[must_use]
    pub const fn allow_partial(mut self, allow: bool) -> Self {
        self.allow_partial = allow;
        self
    }

    #[must_use]
    pub const fn start_on(mut self, role: Option<Role>) -> Self {
        self.start_on = role;
        self
    }
}
