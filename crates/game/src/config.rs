//! Simulation configuration. Loaded from `sim.ron` when present.

use serde::{Deserialize, Serialize};

use crate::env::DEFAULT_FRAMESKIP;
use crate::map::NUM_MAPS;
use crate::MAX_DRONES;

/// Host-facing environment settings. Loaded from `sim.ron` in the current
/// directory; every field falls back to a sensible default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    /// Drones in the arena (2..=4).
    #[serde(default = "default_num_drones")]
    pub num_drones: usize,
    /// How many of them are agent-controlled; the rest idle or run a
    /// scripted policy supplied by the host.
    #[serde(default = "default_num_agents")]
    pub num_agents: usize,
    #[serde(default)]
    pub map_index: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Decode the discrete action layout instead of the continuous one.
    #[serde(default)]
    pub discrete_actions: bool,
    /// More solver substeps for accuracy over throughput.
    #[serde(default)]
    pub eval_mode: bool,
    /// Training episodes randomize the default weapon a quarter of the
    /// time.
    #[serde(default = "default_true")]
    pub training_mode: bool,
    /// Physics frames per `step` call.
    #[serde(default = "default_frameskip")]
    pub frameskip: u32,
}

fn default_num_drones() -> usize {
    2
}
fn default_num_agents() -> usize {
    2
}
fn default_seed() -> u64 {
    1
}
fn default_true() -> bool {
    true
}
fn default_frameskip() -> u32 {
    DEFAULT_FRAMESKIP
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            num_drones: default_num_drones(),
            num_agents: default_num_agents(),
            map_index: 0,
            seed: default_seed(),
            discrete_actions: false,
            eval_mode: false,
            training_mode: default_true(),
            frameskip: default_frameskip(),
        }
    }
}

impl SimConfig {
    /// Load config from `sim.ron`. Missing or invalid files fall back to
    /// the defaults.
    pub fn load() -> Self {
        let path = config_path();
        if let Ok(data) = std::fs::read_to_string(&path) {
            match ron::from_str::<Self>(&data) {
                Ok(config) => return config.validated(),
                Err(e) => log::warn!("Invalid config at {path:?}: {e}, using defaults"),
            }
        }
        Self::default()
    }

    /// Save current config to `sim.ron`. Logs on error.
    pub fn save(&self) {
        let path = config_path();
        if let Ok(s) = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default()) {
            if let Err(e) = std::fs::write(&path, s) {
                log::warn!("Could not write config to {path:?}: {e}");
            }
        }
    }

    fn validated(self) -> Self {
        let mut config = self;
        config.num_drones = config.num_drones.clamp(1, MAX_DRONES);
        config.num_agents = config.num_agents.clamp(1, config.num_drones);
        config.map_index = config.map_index.min(NUM_MAPS - 1);
        config.frameskip = config.frameskip.max(1);
        config
    }
}

fn config_path() -> std::path::PathBuf {
    std::env::current_dir()
        .unwrap_or_else(|_| std::path::PathBuf::from("."))
        .join("sim.ron")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = SimConfig::default();
        assert!(config.num_agents <= config.num_drones);
        assert!(config.num_drones <= MAX_DRONES);
        assert!(config.map_index < NUM_MAPS);
    }

    #[test]
    fn ron_roundtrip() {
        let config = SimConfig {
            num_drones: 4,
            num_agents: 3,
            map_index: 2,
            seed: 99,
            discrete_actions: true,
            eval_mode: true,
            training_mode: false,
            frameskip: 4,
        };
        let text = ron::to_string(&config).unwrap();
        let back: SimConfig = ron::from_str(&text).unwrap();
        assert_eq!(back.num_drones, 4);
        assert_eq!(back.num_agents, 3);
        assert_eq!(back.seed, 99);
        assert!(back.discrete_actions);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let back: SimConfig = ron::from_str("(num_drones: 3)").unwrap();
        assert_eq!(back.num_drones, 3);
        assert_eq!(back.num_agents, default_num_agents());
        assert_eq!(back.frameskip, DEFAULT_FRAMESKIP);
    }
}
