use crate::models::error::BenchError;
use crate::models::settings::RunSettings;
use log::debug;
use std::fs;
use std::path::Path;

/// Upper bound on config file size; anything larger is rejected outright.
const MAX_CONFIG_SIZE: u64 = 10 * 1024 * 1024;

/// Loads a run configuration from a JSON file.
///
/// The file must hold a top-level object with the scheduling keys
/// (`concurency`, `totalRequest`, `duration`, `output`) and exactly one
/// protocol key (`http` or `smtp`). The protocol key selects which adapter
/// and collector pair the runner is built with.
///
/// Returns [`BenchError::Config`] with a readable message for a missing,
/// oversized or malformed file. The loaded settings are not yet validated;
/// callers follow up with [`crate::config::validation::validate`].
///
/// # Examples
///
/// ```rust,no_run
/// use netbench::config::settings::load_settings;
/// use std::path::Path;
///
/// let settings = load_settings(Path::new("./config.json"))?;
/// println!("protocol: {}", settings.protocol.name());
/// # Ok::<(), netbench::models::error::BenchError>(())
/// ```
pub fn load_settings(path: &Path) -> Result<RunSettings, BenchError> {
    debug!("loading configuration from {}", path.display());

    let metadata = fs::metadata(path).map_err(|e| BenchError::Config {
        message: format!("cannot read config file '{}': {}", path.display(), e),
    })?;
    if metadata.len() > MAX_CONFIG_SIZE {
        return Err(BenchError::Config {
            message: format!(
                "config file too large: {} bytes (max: {} bytes)",
                metadata.len(),
                MAX_CONFIG_SIZE
            ),
        });
    }

    let raw = fs::read_to_string(path).map_err(|e| BenchError::Config {
        message: format!("cannot read config file '{}': {}", path.display(), e),
    })?;

    let settings: RunSettings = serde_json::from_str(&raw).map_err(|e| BenchError::Config {
        message: format!("invalid JSON in '{}': {}", path.display(), e),
    })?;

    debug!(
        "loaded {} configuration (concurrency {}, total {}, duration {:?})",
        settings.protocol.name(),
        settings.concurrency,
        settings.total_requests,
        settings.duration
    );

    Ok(settings)
}
