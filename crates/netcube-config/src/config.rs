//! Configuration structs with sensible defaults and RON persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// File name used inside the config directory.
const CONFIG_FILE: &str = "config.ron";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Move history depth.
    pub history: HistoryConfig,
    /// Force model for the predicted body.
    pub movement: MovementConfig,
    /// Correction smoothing.
    pub smoothing: SmoothingConfig,
    /// Ping, clock sync, and prediction window settings.
    pub network: NetworkConfig,
    /// Headless simulation (demo binary) settings.
    pub simulation: SimulationConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// Move history ring buffers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HistoryConfig {
    /// Number of moves each ring buffer retains.
    pub capacity: usize,
    /// Also keep the sparse buffer of input-changing moves.
    pub use_important_moves: bool,
}

/// Force model shared by client prediction and the authority.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MovementConfig {
    /// Acceleration per held direction, in m/s².
    pub force_strength: f32,
    /// Linear damping coefficient applied by the reference body (1/s).
    pub linear_damping: f32,
}

/// Blending of the rendered state toward the simulated state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SmoothingConfig {
    /// Steady-state blend factor per tick.
    pub default_blend_rate: f32,
    /// Blend factor installed right after a visible correction.
    pub correction_blend_rate: f32,
    /// Position delta (m) above which a correction counts as visible.
    pub position_threshold: f32,
    /// Quaternion component-difference norm above which a correction counts as visible.
    pub rotation_threshold: f32,
}

/// Which estimator turns round-trip samples into an exact ping.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum PingEstimatorConfig {
    /// Exponentially weighted moving average.
    Exponential {
        /// Weight of the newest sample, in `(0, 1]`.
        alpha: f32,
    },
    /// Plain mean over the last `window` samples.
    MovingAverage {
        /// Number of samples averaged.
        window: usize,
    },
}

/// Ping measurement, clock synchronisation, and prediction window settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    /// Seconds between ping bounces sent by a client.
    pub ping_interval_secs: f32,
    /// Milliseconds subtracted from the exact ping before computing prediction time.
    pub prediction_fudge_factor_ms: f32,
    /// Prediction window a client asks the authority for (ms).
    pub desired_prediction_ping_ms: f32,
    /// Upper bound the authority grants for any prediction window (ms).
    pub server_max_prediction_ping_ms: f32,
    /// Ping estimator.
    pub ping_estimator: PingEstimatorConfig,
}

/// Settings for the headless client/authority simulation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimulationConfig {
    /// Fixed tick rate of both peers (Hz).
    pub tick_rate_hz: u32,
    /// How long to simulate, in seconds.
    pub duration_secs: f32,
    /// One-way link latency (ms).
    pub latency_ms: u32,
    /// Maximum random deviation added to the latency (ms).
    pub jitter_ms: u32,
    /// Probability that an unreliable datagram is dropped.
    pub packet_loss: f32,
    /// Seed for link loss/jitter and the scripted input.
    pub seed: u64,
    /// Ticks between scripted input changes.
    pub input_change_interval_ticks: u32,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
}

// --- Default implementations ---

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            use_important_moves: true,
        }
    }
}

impl Default for MovementConfig {
    fn default() -> Self {
        Self {
            force_strength: 15.0,
            linear_damping: 1.0,
        }
    }
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            default_blend_rate: 0.25,
            correction_blend_rate: 0.1,
            position_threshold: 0.1,
            rotation_threshold: 0.1,
        }
    }
}

impl Default for PingEstimatorConfig {
    fn default() -> Self {
        Self::Exponential { alpha: 0.25 }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            ping_interval_secs: 0.5,
            prediction_fudge_factor_ms: 15.0,
            desired_prediction_ping_ms: 120.0,
            server_max_prediction_ping_ms: 160.0,
            ping_estimator: PingEstimatorConfig::default(),
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: 60,
            duration_secs: 10.0,
            latency_ms: 80,
            jitter_ms: 10,
            packet_loss: 0.05,
            seed: 42,
            input_change_interval_ticks: 30,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Platform config directory for netcube (`<config_dir>/netcube`), falling
/// back to the working directory when the platform has none.
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join("netcube"))
        .unwrap_or_else(|| PathBuf::from("."))
}

// --- Load / Save / Reload / Validate ---

impl Config {
    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE);

        if config_path.exists() {
            let config = Self::read(&config_path)?;
            config.validate()?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::Write)?;

        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);
        let serialized = ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::Serialize)?;

        std::fs::write(config_dir.join(CONFIG_FILE), serialized).map_err(ConfigError::Write)
    }

    /// Hot-reload: returns `Some(new_config)` if the file changed, `None` otherwise.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let new_config = Self::read(&config_dir.join(CONFIG_FILE))?;
        new_config.validate()?;

        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }

    /// Rejects values the simulation cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field, reason| Err(ConfigError::InvalidValue { field, reason });

        if self.history.capacity == 0 {
            return invalid("history.capacity", "must be at least 1");
        }
        if !(self.smoothing.default_blend_rate > 0.0 && self.smoothing.default_blend_rate <= 1.0) {
            return invalid("smoothing.default_blend_rate", "must be in (0, 1]");
        }
        if !(self.smoothing.correction_blend_rate > 0.0
            && self.smoothing.correction_blend_rate <= 1.0)
        {
            return invalid("smoothing.correction_blend_rate", "must be in (0, 1]");
        }
        match self.network.ping_estimator {
            PingEstimatorConfig::Exponential { alpha } if !(alpha > 0.0 && alpha <= 1.0) => {
                return invalid("network.ping_estimator.alpha", "must be in (0, 1]");
            }
            PingEstimatorConfig::MovingAverage { window: 0 } => {
                return invalid("network.ping_estimator.window", "must be at least 1");
            }
            _ => {}
        }
        if self.simulation.tick_rate_hz == 0 {
            return invalid("simulation.tick_rate_hz", "must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.simulation.packet_loss) {
            return invalid("simulation.packet_loss", "must be in [0, 1]");
        }
        Ok(())
    }

    fn read(config_path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(config_path).map_err(ConfigError::Read)?;
        ron::from_str(&contents).map_err(ConfigError::Parse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_serializes() {
        let config = Config::default();
        let ron_str =
            ron::ser::to_string_pretty(&config, ron::ser::PrettyConfig::new().depth_limit(3))
                .unwrap();
        assert!(ron_str.contains("capacity: 100"));
        assert!(ron_str.contains("ping_interval_secs: 0.5"));
    }

    #[test]
    fn test_defaults_match_reference_values() {
        let config = Config::default();
        assert_eq!(config.history.capacity, 100);
        assert_eq!(config.smoothing.default_blend_rate, 0.25);
        assert_eq!(config.smoothing.correction_blend_rate, 0.1);
        assert_eq!(config.network.server_max_prediction_ping_ms, 160.0);
        assert_eq!(config.network.prediction_fudge_factor_ms, 15.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_section_uses_default() {
        let config: Config = ron::from_str("(history: (capacity: 32))").unwrap();
        assert_eq!(config.history.capacity, 32);
        assert!(config.history.use_important_moves);
        assert_eq!(config.smoothing, SmoothingConfig::default());
    }

    #[test]
    fn test_extra_field_ignored() {
        let result: Result<Config, _> = ron::from_str("(future_setting: true)");
        assert!(result.is_ok());
    }

    #[test]
    fn test_moving_average_estimator_parses() {
        let config: Config =
            ron::from_str("(network: (ping_estimator: MovingAverage(window: 8)))").unwrap();
        assert_eq!(
            config.network.ping_estimator,
            PingEstimatorConfig::MovingAverage { window: 8 }
        );
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.history.capacity = 64;
        config.simulation.latency_ms = 150;

        config.save(dir.path()).unwrap();
        let loaded = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, loaded);
    }

    #[test]
    fn test_load_creates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, Config::default());
        assert!(dir.path().join("config.ron").exists());
    }

    #[test]
    fn test_reload_detects_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();

        let mut modified = config.clone();
        modified.movement.force_strength = 30.0;
        modified.save(dir.path()).unwrap();

        let reloaded = config.reload(dir.path()).unwrap();
        assert_eq!(reloaded.unwrap().movement.force_strength, 30.0);
    }

    #[test]
    fn test_reload_no_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();

        assert!(config.reload(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_invalid_ron_produces_error() {
        let result: Result<Config, _> = ron::from_str("{{not valid}}");
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let mut config = Config::default();
        config.history.capacity = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue {
                field: "history.capacity",
                ..
            })
        ));
    }

    #[test]
    fn test_out_of_range_loss_rejected_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.simulation.packet_loss = 1.5;
        config.save(dir.path()).unwrap();

        let result = Config::load_or_create(dir.path());
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_default_config_dir_ends_with_netcube() {
        let dir = default_config_dir();
        assert!(dir.ends_with("netcube") || dir == PathBuf::from("."));
    }
}
