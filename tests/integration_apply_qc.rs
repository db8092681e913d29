//! Integration tests for single-file quality control and configuration
//!
//! Quality controls volumes written to disk and feeds the result into a
//! tiled request, the way operational chains qualify volumes upstream.

mod common;

use common::{registry, write_polar};
use radar_compositor::compositing::{AreaTarget, CompositeRequest, Toolbox};
use radar_compositor::config::env;
use radar_compositor::constants::{attributes, quality_fields};
use radar_compositor::io::read_object;
use radar_compositor::models::{AttributeValue, QualityControlMode};
use radar_compositor::quality::{
    ApplyQualityRequest, DetectorSelection, QualityApplier, QualityRegistry,
};
use radar_compositor::tiling::PrestageMode;
use radar_compositor::{CompositorConfig, SystemProfile, TiledCompositor};
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::TempDir;

#[test]
fn test_apply_file_writes_quality_fields() {
    let temp_dir = TempDir::new().unwrap();
    let input = write_polar(temp_dir.path(), "pvol", common::volume("NOD:sella", 13.0, 58.0));
    let output = temp_dir.path().join("qc.json");
    let registry = QualityRegistry::with_builtin_detectors("DBZH", 10.0);
    let selection = DetectorSelection::new();

    let applied = QualityApplier::new(&registry, &selection)
        .apply_file(
            &input,
            &output,
            &ApplyQualityRequest::new(&["threshold"]).with_qc_mode(QualityControlMode::Analyze),
        )
        .unwrap()
        .expect("Volume is not malfunctioning");

    assert_eq!(applied.detectors, vec!["threshold"]);
    let written = read_object(&output).unwrap().into_polar().unwrap();
    assert_eq!(written.scans().len(), 2);
    for scan in written.scans() {
        assert!(scan.quality_field(quality_fields::THRESHOLD).is_some());
    }
}

#[test]
fn test_malfunctioning_volume_is_not_written() {
    let temp_dir = TempDir::new().unwrap();
    let mut volume = common::volume("NOD:sella", 13.0, 58.0);
    volume
        .attributes_mut()
        .insert(attributes::HOW_MALFUNC.into(), AttributeValue::from("True"));
    let input = write_polar(temp_dir.path(), "pvol", volume);
    let output = temp_dir.path().join("qc.json");
    let registry = QualityRegistry::with_builtin_detectors("DBZH", 10.0);
    let selection = DetectorSelection::new();

    let applied = QualityApplier::new(&registry, &selection)
        .apply_file(
            &input,
            &output,
            &ApplyQualityRequest::new(&["threshold"]).with_remove_malfunc(true),
        )
        .unwrap();

    assert!(applied.is_none());
    assert!(!output.exists());
}

/// Volumes qualified upstream keep their marker through a tiled composite
#[tokio::test]
async fn test_configured_volume_feeds_tiled_composite() {
    let temp_dir = TempDir::new().unwrap();
    let raw = write_polar(temp_dir.path(), "raw", common::volume("NOD:semid", 14.0, 56.5));
    let qualified = temp_dir.path().join("qualified.json");
    let quality = QualityRegistry::with_builtin_detectors("DBZH", 10.0);
    let selection = DetectorSelection::new().with_node("default", &["threshold"]);

    let applied = QualityApplier::new(&quality, &selection)
        .apply_file(
            &raw,
            &qualified,
            &ApplyQualityRequest::new(&["nimbus-configured-qc"]),
        )
        .unwrap()
        .unwrap();
    assert_eq!(applied.detectors[1..], ["threshold".to_string()]);
    assert!(applied.detectors[0].starts_with("nimbus-qc"));

    let toolbox = Arc::new(Toolbox::new(Arc::new(registry()), Arc::new(quality)));
    let options = CompositorConfig::default()
        .with_scratch_dir(temp_dir.path().join("scratch"))
        .tiling_options(&SystemProfile::detect());
    let product = TiledCompositor::new(toolbox, CompositeRequest::new())
        .with_options(options)
        .generate(&[qualified], None, None, &AreaTarget::Registered("swe".into()))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(product.attribute(attributes::HOW_NODES), Some("semid"));
}

#[test]
fn test_layered_configuration() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.yaml");
    std::fs::write(
        &config_path,
        "tile_workers: 4\nqc_workers: 2\npreprocess_qc: true\nmp_process_qc: true\ndetector_selection:\n  default: [threshold]\n",
    )
    .unwrap();

    let mut config = CompositorConfig::load(&config_path).unwrap();
    let overrides = HashMap::from([(env::TILE_WORKERS, "8")]);
    config
        .apply_env_with(|key| overrides.get(key).map(|v| v.to_string()))
        .unwrap();
    config.validate().unwrap();

    assert_eq!(config.tile_workers, Some(8));
    assert_eq!(config.qc_workers, 2);
    assert_eq!(
        config.detector_selection.detectors_for("anything"),
        Some(&["threshold".to_string()][..])
    );

    let options = config.tiling_options(&SystemProfile {
        cpu_cores: 16,
        performance_cores: 16,
    });
    assert_eq!(options.tile_workers, Some(8));
    assert_eq!(options.cores, 16);
    assert_eq!(
        options.prestage,
        PrestageMode::Pooled {
            workers: 2,
            split_evenly: false
        }
    );
}
