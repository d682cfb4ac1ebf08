//! CLI configuration

use crate::Cli;
use fruitscan_classifiers::ClassifierConfig;
use std::path::Path;

/// Load the classifier configuration and apply CLI overrides
pub fn load(config_path: &Path, cli: &Cli) -> anyhow::Result<ClassifierConfig> {
    // Missing file means defaults
    let mut config = ClassifierConfig::load_or_default(config_path)?;

    if let Some(dir) = &cli.models_dir {
        config.models_dir = dir.clone();
    }

    if let Some(device) = cli.device {
        config.device = device;
    }

    Ok(config)
}
