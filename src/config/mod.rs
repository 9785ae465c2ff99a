pub mod model;
pub mod resolve;
pub mod services;
pub mod validate;

use std::path::Path;

use model::CortexConfig;

/// Load a config file, returning the parsed config and its raw source (kept
/// for diagnostics).
pub fn load_config(path: &Path) -> anyhow::Result<(CortexConfig, String)> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read config file {}: {}", path.display(), e))?;
    let config: CortexConfig = toml::from_str(&content)
        .map_err(|e| anyhow::anyhow!("Failed to parse config file {}: {}", path.display(), e))?;
    Ok((config, content))
}

/// Load a config and fail with a readable list if validation finds problems.
pub fn load_validated(path: &Path) -> anyhow::Result<CortexConfig> {
    let (config, source) = load_config(path)?;
    let filename = path
        .file_name()
        .map(|f| f.to_string_lossy().to_string())
        .unwrap_or_else(|| resolve::CONFIG_FILENAME.to_string());

    if let Err(errors) = validate::validate(&config, &source, &filename) {
        let mut msg = String::from("Configuration errors:\n");
        for err in &errors {
            msg.push_str(&format!("  - {}\n", err));
        }
        msg.push_str("\nRun `cortex validate` for details.");
        anyhow::bail!("{}", msg);
    }
    Ok(config)
}
