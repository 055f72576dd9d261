use crate::telemetry::logging;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Per-player and per-claim limits, supplied once at startup (or on reload)
/// and read-only to the claims engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_plots_per_player: usize,
    pub max_chunks_per_plot: usize,
    pub max_total_chunks_per_player: usize,
    pub max_trusted_players_per_claim: usize,
    pub max_groups_per_player: usize,
    pub max_members_per_group: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        LimitsConfig {
            max_plots_per_player: 10,
            max_chunks_per_plot: 25,
            max_total_chunks_per_player: 100,
            max_trusted_players_per_claim: 16,
            max_groups_per_player: 4,
            max_members_per_group: 32,
        }
    }
}

impl LimitsConfig {
    pub fn load(path: &Path) -> Result<Self, String> {
        let data = std::fs::read_to_string(path)
            .map_err(|err| format!("failed to read limits {}: {}", path.display(), err))?;
        let config: LimitsConfig = serde_yaml::from_str(&data)
            .map_err(|err| format!("failed to parse limits {}: {}", path.display(), err))?;
        Ok(config.clamped())
    }

    /// A limit below 1 would make every claim or trust operation fail
    /// permanently; clamp to 1 and keep running, with the clamp on record.
    pub fn clamped(mut self) -> Self {
        let clamp = |label: &str, value: &mut usize| {
            if *value < 1 {
                logging::log_error(&format!("limits: {} was {}, clamped to 1", label, value));
                *value = 1;
            }
        };
        clamp("max_plots_per_player", &mut self.max_plots_per_player);
        clamp("max_chunks_per_plot", &mut self.max_chunks_per_plot);
        clamp(
            "max_total_chunks_per_player",
            &mut self.max_total_chunks_per_player,
        );
        clamp(
            "max_trusted_players_per_claim",
            &mut self.max_trusted_players_per_claim,
        );
        clamp("max_groups_per_player", &mut self.max_groups_per_player);
        clamp("max_members_per_group", &mut self.max_members_per_group);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let limits = LimitsConfig::default();
        assert_eq!(limits.max_chunks_per_plot, 25);
        assert_eq!(limits.max_plots_per_player, 10);
    }

    #[test]
    fn zero_limits_are_clamped() {
        let limits = LimitsConfig {
            max_chunks_per_plot: 0,
            max_plots_per_player: 0,
            ..LimitsConfig::default()
        }
        .clamped();
        assert_eq!(limits.max_chunks_per_plot, 1);
        assert_eq!(limits.max_plots_per_player, 1);
        assert_eq!(limits.max_members_per_group, 32);
    }

    #[test]
    fn loads_partial_yaml() {
        let path = std::env::temp_dir().join(format!(
            "plotguard-limits-{}.yml",
            std::process::id()
        ));
        std::fs::write(&path, "max_chunks_per_plot: 9\n").unwrap();

        let limits = LimitsConfig::load(&path).unwrap();
        assert_eq!(limits.max_chunks_per_plot, 9);
        assert_eq!(limits.max_plots_per_player, 10);
    }

    #[test]
    fn load_rejects_bad_yaml() {
        let path = std::env::temp_dir().join(format!(
            "plotguard-limits-bad-{}.yml",
            std::process::id()
        ));
        std::fs::write(&path, "max_chunks_per_plot: [nonsense\n").unwrap();
        assert!(LimitsConfig::load(&path).is_err());
    }
}
