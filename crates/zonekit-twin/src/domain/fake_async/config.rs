//! Fake Async Configuration

use serde::{Deserialize, Serialize};

/// Default number of rounds `drain_all` may take
pub const DEFAULT_FLUSH_LIMIT: usize = 20;

/// Delay given to animation-frame callbacks (about 60 fps)
pub const DEFAULT_ANIMATION_FRAME_MS: u64 = 16;

/// Sources that cannot be simulated and are refused by default
pub const DEFAULT_REJECTED_SOURCES: &[&str] = &["XMLHttpRequest.send"];

/// Labels that schedule animation-frame callbacks
pub const ANIMATION_FRAME_SOURCES: &[&str] = &[
    "requestAnimationFrame",
    "webkitRequestAnimationFrame",
    "mozRequestAnimationFrame",
];

/// Errors raised while loading a configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The JSON document could not be decoded
    #[error("Invalid fake async config: {0}")]
    Parse(#[from] serde_json::Error),

    /// `flush_limit` must allow at least one round
    #[error("flush_limit must be at least 1")]
    ZeroFlushLimit,
}

/// Behavior knobs for one fake-async activation
///
/// Missing fields fall back to their defaults when deserializing.
///
/// ```rust
/// use zonekit_twin::FakeAsyncConfig;
///
/// let config = FakeAsyncConfig::from_json(r#"{ "flush_on_exit": true }"#).unwrap();
/// assert!(config.flush_on_exit);
/// assert_eq!(config.flush_limit, 20);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FakeAsyncConfig {
    /// Default `max_rounds` for `drain_all` and for flushing on exit
    pub flush_limit: usize,
    /// Drain all timers before the leak check on exit
    pub flush_on_exit: bool,
    /// Delay for animation-frame sources
    pub animation_frame_ms: u64,
    /// Count animation frames as leaked work
    pub track_animation_frames: bool,
    /// Labels refused inside the window
    pub rejected_sources: Vec<String>,
}

impl FakeAsyncConfig {
    /// Configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON document and validate it
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration is usable
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.flush_limit == 0 {
            return Err(ConfigError::ZeroFlushLimit);
        }
        Ok(())
    }

    /// Set the flush limit
    pub fn with_flush_limit(mut self, limit: usize) -> Self {
        self.flush_limit = limit;
        self
    }

    /// Drain all timers before the leak check
    pub fn with_flush_on_exit(mut self, flush: bool) -> Self {
        self.flush_on_exit = flush;
        self
    }

    /// Set the animation-frame delay
    pub fn with_animation_frame_ms(mut self, ms: u64) -> Self {
        self.animation_frame_ms = ms;
        self
    }

    /// Count animation frames as leaked work
    pub fn with_tracked_animation_frames(mut self, track: bool) -> Self {
        self.track_animation_frames = track;
        self
    }

    /// Refuse one more source label
    pub fn reject_source(mut self, label: impl Into<String>) -> Self {
        self.rejected_sources.push(label.into());
        self
    }

    /// Check if `label` is refused
    pub fn is_rejected(&self, label: &str) -> bool {
        self.rejected_sources.iter().any(|source| source == label)
    }

    /// Check if `label` schedules an animation frame
    pub fn is_animation_frame(label: &str) -> bool {
        ANIMATION_FRAME_SOURCES.contains(&label)
    }
}

impl Default for FakeAsyncConfig {
    fn default() -> Self {
        Self {
            flush_limit: DEFAULT_FLUSH_LIMIT,
            flush_on_exit: false,
            animation_frame_ms: DEFAULT_ANIMATION_FRAME_MS,
            track_animation_frames: false,
            rejected_sources: DEFAULT_REJECTED_SOURCES
                .iter()
                .map(|source| source.to_string())
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = FakeAsyncConfig::default();
        assert_eq!(config.flush_limit, 20);
        assert!(!config.flush_on_exit);
        assert_eq!(config.animation_frame_ms, 16);
        assert!(!config.track_animation_frames);
        assert!(config.is_rejected("XMLHttpRequest.send"));
        assert!(!config.is_rejected("setTimeout"));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config =
            FakeAsyncConfig::from_json(r#"{ "flush_limit": 50, "rejected_sources": [] }"#).unwrap();
        assert_eq!(config.flush_limit, 50);
        assert!(config.rejected_sources.is_empty());
        assert_eq!(config.animation_frame_ms, 16);
    }

    #[test]
    fn test_zero_flush_limit_rejected() {
        let err = FakeAsyncConfig::from_json(r#"{ "flush_limit": 0 }"#).unwrap_err();
        assert!(matches!(err, ConfigError::ZeroFlushLimit));
    }

    #[test]
    fn test_malformed_json() {
        let err = FakeAsyncConfig::from_json("{ flush_limit: ").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_builder_and_round_trip() {
        let config = FakeAsyncConfig::new()
            .with_flush_limit(5)
            .with_flush_on_exit(true)
            .with_tracked_animation_frames(true)
            .reject_source("fetch");
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(FakeAsyncConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn test_animation_frame_sources() {
        assert!(FakeAsyncConfig::is_animation_frame("requestAnimationFrame"));
        assert!(FakeAsyncConfig::is_animation_frame("mozRequestAnimationFrame"));
        assert!(!FakeAsyncConfig::is_animation_frame("setTimeout"));
    }
}
