//! Shared components for CLI commands
//!
//! Logging, layered configuration, input discovery and the registries every
//! command builds from the configuration.

use crate::cli::args::CommonArgs;
use crate::compositing::Toolbox;
use crate::config::CompositorConfig;
use crate::constants::OBJECT_FILE_EXTENSION;
use crate::quality::QualityRegistry;
use crate::registry::AreaRegistry;
use anyhow::{Context, Result};
use indexmap::IndexSet;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Set up structured logging on stderr
pub fn setup_logging(args: &CommonArgs) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let log_level = args.get_log_level();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("radar_compositor={}", log_level)));

    if args.quiet {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_level(true)
                    .with_writer(std::io::stderr)
                    .compact(),
            )
            .try_init()
            .context("Failed to initialize logging")?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_level(true)
                    .with_timer(fmt::time::uptime())
                    .with_writer(std::io::stderr),
            )
            .try_init()
            .context("Failed to initialize logging")?;
    }

    debug!("Logging initialized at level: {}", log_level);
    Ok(())
}

/// Load configuration using the layered approach (file -> env); flags are
/// applied by the caller
pub fn load_configuration(args: &CommonArgs) -> Result<CompositorConfig> {
    info!("Loading configuration");

    if let Some(path) = &args.config_file {
        if !path.exists() {
            anyhow::bail!("Config file does not exist: {}", path.display());
        }
    }
    let mut config = CompositorConfig::load_layered(args.config_file.as_deref())
        .context("Failed to load configuration")?;
    if let Some(registry) = &args.registry {
        config.registry = Some(registry.clone());
    }
    Ok(config)
}

/// Area registry named by the configuration, or one holding only the
/// built-in projections
pub fn load_registry(config: &CompositorConfig) -> Result<AreaRegistry> {
    match &config.registry {
        Some(path) => AreaRegistry::load(path)
            .with_context(|| format!("Failed to load area registry {}", path.display())),
        None => {
            warn!("No area registry configured, only best-fit areas are available");
            Ok(AreaRegistry::new())
        }
    }
}

pub fn build_toolbox(config: &CompositorConfig, registry: AreaRegistry, quantity: &str) -> Arc<Toolbox> {
    let quality = QualityRegistry::with_builtin_detectors(quantity, config.detector_threshold);
    Arc::new(Toolbox::new(Arc::new(registry), Arc::new(quality)))
}

/// Expand inputs into object files.
///
/// Directories are searched recursively for object files, anything holding
/// glob characters is treated as a pattern, and every other input is taken
/// as a file path. Duplicates are dropped, first occurrence wins.
pub fn discover_inputs(inputs: &[String]) -> Result<Vec<PathBuf>> {
    let mut files = IndexSet::new();

    for input in inputs {
        let path = Path::new(input);
        if path.is_dir() {
            let mut found: Vec<PathBuf> = WalkDir::new(path)
                .follow_links(false)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .map(|e| e.into_path())
                .filter(|p| p.extension().and_then(|s| s.to_str()) == Some(OBJECT_FILE_EXTENSION))
                .collect();
            found.sort();
            debug!("Found {} files in {}", found.len(), path.display());
            files.extend(found);
        } else if input.contains(['*', '?', '[']) {
            let entries =
                glob::glob(input).with_context(|| format!("Invalid glob pattern '{}'", input))?;
            for entry in entries {
                match entry {
                    Ok(path) if path.is_file() => {
                        files.insert(path);
                    }
                    Ok(_) => {}
                    Err(e) => warn!("Skipping unreadable match of '{}': {}", input, e),
                }
            }
        } else {
            files.insert(path.to_path_buf());
        }
    }

    info!("Discovered {} input files", files.len());
    Ok(files.into_iter().collect())
}

/// Progress bar for tile processing; hidden when progress is not shown
pub fn create_progress_bar(show: bool, message: &str) -> ProgressBar {
    if !show {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(0);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .map(|style| style.progress_chars("#>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb.set_message(message.to_string());
    pb
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, "{}").unwrap();
    }

    #[test]
    fn test_discover_directories_patterns_and_files() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        touch(&root.join("scans/b.json"));
        touch(&root.join("scans/nested/a.json"));
        touch(&root.join("scans/notes.txt"));
        touch(&root.join("loose/c.json"));
        touch(&root.join("loose/d.json"));

        let inputs = vec![
            root.join("scans").to_string_lossy().to_string(),
            root.join("loose/*.json").to_string_lossy().to_string(),
            root.join("loose/c.json").to_string_lossy().to_string(),
        ];
        let files = discover_inputs(&inputs).unwrap();

        assert_eq!(
            files,
            vec![
                root.join("scans/b.json"),
                root.join("scans/nested/a.json"),
                root.join("loose/c.json"),
                root.join("loose/d.json"),
            ]
        );
    }

    #[test]
    fn test_missing_file_is_kept_for_the_fetch_to_skip() {
        let files = discover_inputs(&["/no/such/file.json".to_string()]).unwrap();
        assert_eq!(files, vec![PathBuf::from("/no/such/file.json")]);
    }

    #[test]
    fn test_registry_defaults_to_builtin_projections() {
        let registry = load_registry(&CompositorConfig::default()).unwrap();
        assert_eq!(registry.areas().count(), 0);
        assert!(registry.projection("gmaps").is_ok());
    }
}
