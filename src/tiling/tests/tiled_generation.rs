//! Tiled generation compared with single-area generation

use super::{options, split_registry, three_radars, toolbox, write_scan};
use crate::compositing::{AreaTarget, CompositeRequest, Compositor};
use crate::constants::{attributes, quality_fields};
use crate::models::fixtures;
use crate::tiling::{PrestageMode, TiledCompositor};
use tempfile::TempDir;

#[tokio::test]
async fn test_two_tiles_match_untiled_raster() {
    let temp_dir = TempDir::new().unwrap();
    let scratch_root = temp_dir.path().join("scratch");
    let files = three_radars(temp_dir.path());
    let (registry, area) = split_registry();
    let toolbox = toolbox(registry);
    let request = CompositeRequest::new().with_detectors(&["distance"]);

    let untiled = Compositor::new(&toolbox, &request)
        .generate(&files, None, None, &AreaTarget::Definition(area.clone()))
        .unwrap()
        .unwrap();

    let (tiled, stats) = TiledCompositor::new(toolbox.clone(), request.clone())
        .with_options(options(&scratch_root))
        .generate_detailed(&files, None, None, &AreaTarget::Registered("swe".into()))
        .await
        .unwrap();
    let tiled = tiled.unwrap();

    assert_eq!(stats.tiles, 2);
    assert_eq!(stats.tiles_rendered, 2);
    assert!(stats.is_complete());

    assert_eq!(tiled.area, area);
    assert_eq!(
        tiled.parameter("DBZH").unwrap().data,
        untiled.parameter("DBZH").unwrap().data
    );
    assert_eq!(
        tiled.quality_field(quality_fields::DISTANCE).unwrap().data,
        untiled.quality_field(quality_fields::DISTANCE).unwrap().data
    );
    assert_eq!(tiled.source, "ORG:82,CMT:swe");
}

#[tokio::test]
async fn test_task_tags_are_deduplicated_across_tiles() {
    let temp_dir = TempDir::new().unwrap();
    let files = three_radars(temp_dir.path());
    let (registry, _) = split_registry();
    let request = CompositeRequest::new().with_detectors(&["distance", "radar-index"]);

    let product = TiledCompositor::new(toolbox(registry), request)
        .with_options(options(&temp_dir.path().join("scratch")))
        .generate(&files, None, None, &AreaTarget::Registered("swe".into()))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(
        product.attribute(attributes::HOW_NODES),
        Some("sewest,semid,seeast")
    );
    assert_eq!(
        product.attribute(attributes::HOW_TASK),
        Some("distance,radar-index")
    );
    assert_eq!(
        product.attribute(attributes::HOW_TASK_ARGS),
        Some("distance_nodes:sewest,semid,seeast;radar-index_nodes:sewest,semid,seeast;")
    );
}

#[tokio::test]
async fn test_single_volume_without_detectors() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("pvol.json");
    crate::io::write_object(
        &path,
        &fixtures::volume("WMO:02606,NOD:seang", 12.5, 56.0, 3).into(),
    )
    .unwrap();
    let (registry, _) = split_registry();

    let product = TiledCompositor::new(toolbox(registry), CompositeRequest::new())
        .with_options(options(&temp_dir.path().join("scratch")))
        .generate(&[path], None, None, &AreaTarget::Registered("swe".into()))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(product.attribute(attributes::HOW_NODES), Some("seang"));
    assert!(product.attribute(attributes::HOW_TASK).is_none());
    assert!(product.attribute(attributes::HOW_TASK_ARGS).is_none());
}

#[tokio::test]
async fn test_prestaged_requests_match_plain_request() {
    let temp_dir = TempDir::new().unwrap();
    let files = three_radars(temp_dir.path());
    let (registry, _) = split_registry();
    let toolbox = toolbox(registry);
    let request = CompositeRequest::new().with_detectors(&["distance"]);
    let target = AreaTarget::Registered("swe".into());

    let plain = TiledCompositor::new(toolbox.clone(), request.clone())
        .with_options(options(&temp_dir.path().join("plain")))
        .generate(&files, None, None, &target)
        .await
        .unwrap()
        .unwrap();

    for prestage in [
        PrestageMode::InProcess,
        PrestageMode::Pooled {
            workers: 2,
            split_evenly: false,
        },
        PrestageMode::Pooled {
            workers: 3,
            split_evenly: true,
        },
    ] {
        let (product, stats) = TiledCompositor::new(toolbox.clone(), request.clone())
            .with_options(options(&temp_dir.path().join("staged")).with_prestage(prestage))
            .generate_detailed(&files, None, None, &target)
            .await
            .unwrap();
        let product = product.unwrap();

        assert_eq!(stats.prestaged_files, 3, "{:?}", prestage);
        assert_eq!(
            product.parameter("DBZH").unwrap().data,
            plain.parameter("DBZH").unwrap().data
        );
        assert_eq!(
            product.attribute(attributes::HOW_NODES),
            Some("sewest,semid,seeast")
        );
        assert_eq!(product.attribute(attributes::HOW_TASK), Some("distance"));
    }
}

#[tokio::test]
async fn test_empty_tile_gets_fallback_time() {
    let temp_dir = TempDir::new().unwrap();
    // only the western half is covered
    let files = vec![write_scan(
        temp_dir.path(),
        fixtures::scan("NOD:sewest", 12.2, 56.0),
    )];
    let (registry, _) = split_registry();

    let (product, stats) = TiledCompositor::new(toolbox(registry), CompositeRequest::new())
        .with_options(options(&temp_dir.path().join("scratch")))
        .generate_detailed(&files, None, None, &AreaTarget::Registered("swe".into()))
        .await
        .unwrap();
    let product = product.unwrap();

    assert_eq!(stats.tiles_rendered, 1);
    assert_eq!(stats.tiles_empty(), 1);
    assert_eq!(product.date, fixtures::date());
    assert_eq!(product.time, fixtures::time());

    let data = &product.parameter("DBZH").unwrap().data;
    assert_eq!(data[[50, 99]], crate::constants::COMPOSITE_NODATA);
}

#[tokio::test]
async fn test_best_fit_area_is_one_tile() {
    let temp_dir = TempDir::new().unwrap();
    let files = vec![write_scan(
        temp_dir.path(),
        fixtures::scan("NOD:seang", 12.8, 56.4),
    )];
    let (registry, _) = split_registry();

    let (product, stats) = TiledCompositor::new(toolbox(registry), CompositeRequest::new())
        .with_options(options(&temp_dir.path().join("scratch")))
        .generate_detailed(&files, None, None, &AreaTarget::BestFit)
        .await
        .unwrap();

    assert_eq!(stats.tiles, 1);
    let product = product.unwrap();
    assert_eq!(product.area.id, "auto_gmaps_seang");
    assert_eq!(product.area.pcsid.as_deref(), Some("gmaps"));
}

#[tokio::test]
async fn test_radar_index_is_shared_by_tiles() {
    let temp_dir = TempDir::new().unwrap();
    let files = three_radars(temp_dir.path());
    let (registry, area) = split_registry();
    let request = CompositeRequest::new().with_detectors(&["radar-index"]);

    let product = TiledCompositor::new(toolbox(registry), request)
        .with_options(options(&temp_dir.path().join("scratch")))
        .generate(&files, None, None, &AreaTarget::Registered("swe".into()))
        .await
        .unwrap()
        .unwrap();

    let index = product.quality_field(quality_fields::RADAR_INDEX).unwrap();
    let projection = area.projection().unwrap();
    // pixel under the eastern radar, which only contributes to the eastern tile
    let (x, y) = projection.forward(15.9, 55.5);
    let col = ((x - area.extent.llx) / area.xscale) as usize;
    let row = ((area.extent.ury - y) / area.yscale) as usize;
    assert_eq!(index.data[[row, col]], 3.0);

    let (x, y) = projection.forward(12.2, 56.0);
    let col = ((x - area.extent.llx) / area.xscale) as usize;
    let row = ((area.extent.ury - y) / area.yscale) as usize;
    assert_eq!(index.data[[row, col]], 1.0);
}
