//! Seed roster loading.
//!
//! The default roster is baked into the binary at compile time via
//! [`include_str!`]. Setting `PARKING_WATCH_SEED` to a file path replaces it
//! at runtime. All times in a seed are relative to the provisioning instant
//! so that a freshly started dashboard always shows recent history.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Environment variable that points at an alternative seed TOML file.
pub const SEED_PATH_ENV: &str = "PARKING_WATCH_SEED";

/// Seed roster embedded at compile time.
pub const DEFAULT_SEED_TOML: &str = include_str!("../seed/default.toml");

/// Rule version stamped on lots that do not declare one.
pub const DEFAULT_RULE_VERSION: &str = "v1.0";

/// Errors that can occur while loading or validating a seed.
#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    /// The TOML document is malformed or missing required fields.
    #[error("Seed parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// The seed file could not be read.
    #[error("Failed to read seed file {}: {source}", path.display())]
    Io {
        /// Path that was being read.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The seed parsed but violates a roster constraint.
    #[error("Invalid seed: {message}")]
    Invalid {
        /// Description of what went wrong.
        message: String,
    },
}

/// A complete provisioned roster.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SeedDefinition {
    /// Lots to provision.
    #[serde(default)]
    pub lots: Vec<LotSeed>,
    /// Historical and in-progress violations.
    #[serde(default)]
    pub violations: Vec<ViolationSeed>,
}

/// One provisioned lot.
#[derive(Debug, Clone, Deserialize)]
pub struct LotSeed {
    /// Unique identifier (e.g., `"lot-001"`).
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Contractor operating the lot.
    pub contractor: String,
    /// Contractual vehicle limit. Must be positive.
    pub allowed_capacity: u32,
    /// Vehicle count at provisioning time.
    #[serde(default)]
    pub current_count: u32,
    /// Penalty per excess vehicle per hour.
    pub penalty_rate_per_hour: f64,
    /// Grace period before enforcement. Absent means none.
    #[serde(default)]
    pub grace_period_minutes: Option<u32>,
    /// Contract rule version.
    #[serde(default = "default_rule_version")]
    pub rule_version: String,
    /// Latitude (WGS84).
    #[serde(default)]
    pub latitude: f64,
    /// Longitude (WGS84).
    #[serde(default)]
    pub longitude: f64,
    /// How long before provisioning the lot was created.
    #[serde(default)]
    pub provisioned_days_ago: u32,
    /// Camera credited on generated evidence.
    #[serde(default)]
    pub camera_id: Option<String>,
}

/// One seeded violation. Resolved when `duration_minutes` is set.
#[derive(Debug, Clone, Deserialize)]
pub struct ViolationSeed {
    /// Unique identifier.
    pub id: String,
    /// Owning lot.
    pub lot_id: String,
    /// Minutes before provisioning that the breach began.
    pub started_minutes_ago: u32,
    /// Highest count observed during the violation.
    pub peak_count: u32,
    /// Length of a resolved violation. `None` means still active.
    #[serde(default)]
    pub duration_minutes: Option<u32>,
    /// Rule version override. Defaults to the lot's version.
    #[serde(default)]
    pub rule_version: Option<String>,
    /// Number of evidence captures to generate, one every 15 minutes.
    #[serde(default)]
    pub evidence_count: u32,
}

fn default_rule_version() -> String {
    DEFAULT_RULE_VERSION.to_string()
}

/// Parses a [`SeedDefinition`] from a TOML string.
///
/// # Errors
///
/// Returns [`SeedError::Parse`] if the TOML is malformed or missing
/// required fields.
pub fn parse_seed_toml(toml_str: &str) -> Result<SeedDefinition, SeedError> {
    Ok(toml::de::from_str(toml_str)?)
}

/// Returns the embedded default roster.
///
/// # Errors
///
/// Returns [`SeedError::Parse`] if the embedded TOML is malformed.
pub fn default_seed() -> Result<SeedDefinition, SeedError> {
    parse_seed_toml(DEFAULT_SEED_TOML)
}

/// Reads and parses a seed file.
///
/// # Errors
///
/// Returns [`SeedError`] if the file cannot be read or parsed.
pub fn load_seed_file(path: &Path) -> Result<SeedDefinition, SeedError> {
    let contents = std::fs::read_to_string(path).map_err(|source| SeedError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_seed_toml(&contents)
}

/// Loads the seed named by `PARKING_WATCH_SEED`, falling back to the
/// embedded default.
///
/// # Errors
///
/// Returns [`SeedError`] if the configured file cannot be read or parsed.
pub fn load_seed_from_env() -> Result<SeedDefinition, SeedError> {
    match std::env::var(SEED_PATH_ENV) {
        Ok(path) if !path.trim().is_empty() => {
            log::info!("Loading seed roster from {path}");
            load_seed_file(Path::new(path.trim()))
        }
        _ => {
            log::debug!("Using embedded seed roster");
            default_seed()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_default_seed() {
        let seed = default_seed().unwrap();
        assert_eq!(seed.lots.len(), 5);
        assert_eq!(seed.violations.len(), 8);
    }

    #[test]
    fn lot_ids_are_unique() {
        let seed = default_seed().unwrap();
        let mut ids: Vec<&str> = seed.lots.iter().map(|l| l.id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), seed.lots.len());
    }

    #[test]
    fn optional_fields_default() {
        let seed = parse_seed_toml(
            r#"
            [[lots]]
            id = "a"
            name = "A"
            contractor = "Acme"
            allowed_capacity = 10
            penalty_rate_per_hour = 5.0
            "#,
        )
        .unwrap();

        let lot = &seed.lots[0];
        assert_eq!(lot.current_count, 0);
        assert_eq!(lot.grace_period_minutes, None);
        assert_eq!(lot.rule_version, DEFAULT_RULE_VERSION);
        assert!(seed.violations.is_empty());
    }

    #[test]
    fn missing_required_field_is_a_parse_error() {
        let err = parse_seed_toml(
            r#"
            [[lots]]
            id = "a"
            name = "A"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, SeedError::Parse(_)));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = load_seed_file(Path::new("/nonexistent/parking-watch-seed.toml")).unwrap_err();
        assert!(matches!(err, SeedError::Io { .. }));
        assert!(
            err.to_string()
                .starts_with("Failed to read seed file /nonexistent/parking-watch-seed.toml: ")
        );
    }
}
