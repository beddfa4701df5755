pub mod analyze;
pub mod cleanup;

use crate::InputArgs;
use anyhow::{bail, Context, Result};
use model_prune::{
    analyze, load_tables_dir, structural_protection, Analysis, AnalysisInput, CleanupMode, ModelScanConfig,
    ModelSnapshot, PruneConfig, ProtectionSources,
};
use std::path::Path;

/// Config file (if any), then command-line overrides, then validation.
pub fn load_config(inputs: &InputArgs, mode: Option<CleanupMode>) -> Result<PruneConfig> {
    let mut config = match &inputs.config {
        Some(path) => {
            if !path.is_file() {
                bail!("Config file not found: {}", path.display());
            }
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config: {}", path.display()))?;
            PruneConfig::from_json_str(&text)
                .with_context(|| format!("Invalid config: {}", path.display()))?
        }
        None => PruneConfig::default(),
    };
    if let Some(schema) = &inputs.schema {
        config.schema = schema.clone();
    }
    if let Some(mode) = mode {
        config.cleanup_mode = mode;
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

pub fn run_analysis(inputs: &InputArgs, config: &PruneConfig) -> Result<Analysis> {
    let sources = ProtectionSources {
        columns: inputs.views.clone(),
        tables: inputs.security.clone(),
        access_control: inputs.access_control.clone(),
    };
    let input = AnalysisInput::load(&inputs.usage, &inputs.catalog, &sources).context("Failed to load inputs")?;
    analyze(&input, config).context("Failed to resolve catalog identifiers")
}

pub fn scan_model(tables_dir: &Path, config: &PruneConfig) -> Result<ModelSnapshot> {
    load_tables_dir(tables_dir, &ModelScanConfig::from(config))
        .with_context(|| format!("Failed to scan model tables: {}", tables_dir.display()))
}

/// Keeps removable columns the model still depends on out of every output.
pub fn protect_model_dependencies(
    analysis: &mut Analysis,
    snapshot: &ModelSnapshot,
    config: &PruneConfig,
) -> Result<()> {
    let protected = structural_protection(&analysis.decisions, snapshot, config)
        .context("Cannot compute model dependencies")?;
    analysis.apply_structural_protection(&protected, config);
    Ok(())
}

pub fn write_outputs(inputs: &InputArgs, analysis: &Analysis) -> Result<()> {
    model_prune::write_analysis(&inputs.out, analysis)
        .with_context(|| format!("Failed to write outputs to {}", inputs.out.display()))?;
    Ok(())
}
