use std::cell::RefCell;
use std::sync::Arc;
use std::time::Duration;
use umbra::consts::SHADOW_ALPHA;
use umbra::testing::MemoryTileSource;
use umbra::tile_address::to_tile;
use umbra::{
    EngineKind, EnginePreference, GeoBounds, QualityTier, ServiceOptions, ShadowService,
    SunPosition,
};

fn mont_blanc() -> GeoBounds {
    GeoBounds::new(6.80, 45.88, 6.90, 45.95).unwrap()
}

fn cpu_service(source: MemoryTileSource) -> ShadowService<MemoryTileSource> {
    ShadowService::new(
        source,
        ServiceOptions {
            engine: EnginePreference::Cpu,
            ..ServiceOptions::default()
        },
    )
}

#[tokio::test]
async fn valid_overlay_for_a_small_region() {
    let service = cpu_service(MemoryTileSource::flat(1200.0));
    let bounds = mont_blanc();

    let result = service
        .compute(bounds, SunPosition::new(180.0, 30.0), QualityTier::Low, None, None)
        .await
        .expect("an overlay");

    let top_left = to_tile(bounds.west, bounds.north, 10);
    let bottom_right = to_tile(bounds.east, bounds.south, 10);
    let expected_tiles =
        (bottom_right.x - top_left.x + 1) * (bottom_right.y - top_left.y + 1);

    assert!(result.bounds.contains(&bounds));
    assert_eq!(result.tile_count, expected_tiles as usize);
    assert_eq!(result.quality, QualityTier::Low);
    assert_eq!(result.engine, EngineKind::Cpu);
    assert_eq!((result.width, result.height), (256, 256));

    let image = image::load_from_memory(&result.image).unwrap().to_rgba8();
    assert_eq!(image.dimensions(), (256, 256));
    assert!(image.pixels().all(|p| p.0[3] == 0));
}

#[tokio::test]
async fn a_ridge_shadows_the_terrain_away_from_the_sun() {
    // a 3000 m north-south ridge across columns 200..210 of every tile
    let source = MemoryTileSource::from_fn(|_, col, _| {
        if (200..210).contains(&col) {
            3000.0
        } else {
            500.0
        }
    });
    let service = cpu_service(source);

    let result = service
        .compute(mont_blanc(), SunPosition::new(90.0, 10.0), QualityTier::Low, None, None)
        .await
        .unwrap();
    let image = image::load_from_memory(&result.image).unwrap().to_rgba8();

    // ~2 km west of the ridge
    assert_eq!(image.get_pixel(180, 128).0, [18, 22, 38, SHADOW_ALPHA]);
    // east of the ridge, facing the sun
    assert_eq!(image.get_pixel(230, 128).0[3], 0);
}

#[tokio::test]
async fn nearby_requests_reuse_the_cached_overlay() {
    let service = cpu_service(MemoryTileSource::flat(800.0));

    let first = service
        .compute(mont_blanc(), SunPosition::new(180.0, 30.0), QualityTier::Low, None, None)
        .await
        .unwrap();
    let fetches = service.fetcher().source().fetch_count();

    let second = service
        .compute(
            GeoBounds::new(6.801, 45.881, 6.899, 45.949).unwrap(),
            SunPosition::new(181.0, 31.0),
            QualityTier::Low,
            None,
            None,
        )
        .await
        .unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(service.fetcher().source().fetch_count(), fetches);
    assert_eq!(service.cached_results(), 1);
}

#[tokio::test]
async fn guards_never_touch_the_network() {
    let service = cpu_service(MemoryTileSource::flat(800.0));

    let suns = [
        SunPosition::new(180.0, -5.0),
        SunPosition::new(180.0, 0.0),
        SunPosition::new(180.0, 76.0),
        SunPosition::new(180.0, 90.0),
        SunPosition::new(180.0, f64::NAN),
        SunPosition::new(f64::INFINITY, 30.0),
    ];
    for sun in suns {
        let result = service
            .compute(
                mont_blanc(),
                sun,
                QualityTier::High,
                None,
                None,
            )
            .await;
        assert!(result.is_none());
    }

    assert_eq!(service.fetcher().source().fetch_count(), 0);
    assert_eq!(service.cached_results(), 0);
}

#[tokio::test]
async fn oversized_regions_are_downgraded_or_refused() {
    // terrain rising steeply toward the sun keeps the rays short
    let service = cpu_service(MemoryTileSource::from_fn(|_, col, _| col as f32 * 50.0));

    let downgraded = service
        .compute(
            GeoBounds::new(6.7, 45.8, 7.0, 46.0).unwrap(),
            SunPosition::new(90.0, 30.0),
            QualityTier::High,
            None,
            None,
        )
        .await
        .unwrap();
    assert_eq!(downgraded.quality, QualityTier::Medium);
    assert_eq!(downgraded.tile_count, 16);

    let fetches = service.fetcher().source().fetch_count();
    let refused = service
        .compute(
            GeoBounds::new(0.0, 40.0, 20.0, 50.0).unwrap(),
            SunPosition::new(180.0, 30.0),
            QualityTier::High,
            None,
            None,
        )
        .await;
    assert!(refused.is_none());
    assert_eq!(service.fetcher().source().fetch_count(), fetches);
}

#[tokio::test]
async fn polar_regions_are_planned_from_the_edge_rows() {
    let service = cpu_service(MemoryTileSource::flat(800.0));

    let result = service
        .compute(
            GeoBounds::new(0.0, -90.0, 0.1, -86.0).unwrap(),
            SunPosition::new(180.0, 30.0),
            QualityTier::Low,
            None,
            None,
        )
        .await
        .unwrap();

    assert_eq!(result.tile_count, 1);
    assert_eq!((result.width, result.height), (256, 256));
}

#[tokio::test]
async fn progress_goes_from_half_to_done() {
    let service = cpu_service(MemoryTileSource::flat(800.0));
    let reports = RefCell::new(Vec::new());
    let report = |p: f32| reports.borrow_mut().push(p);

    service
        .compute(
            mont_blanc(),
            SunPosition::new(180.0, 30.0),
            QualityTier::Low,
            Some(&report),
            None,
        )
        .await
        .unwrap();

    let reports = reports.into_inner();
    assert_eq!(reports.first(), Some(&0.5));
    assert_eq!(reports.last(), Some(&1.0));
    assert!(reports.windows(2).all(|w| w[0] <= w[1]));
}

#[tokio::test]
async fn concurrent_requests_share_tile_fetches() {
    let source = MemoryTileSource::flat(800.0).with_delay(Duration::from_millis(20));
    let service = cpu_service(source);

    let (morning, evening) = tokio::join!(
        service.compute(mont_blanc(), SunPosition::new(90.0, 20.0), QualityTier::Low, None, None),
        service.compute(mont_blanc(), SunPosition::new(270.0, 20.0), QualityTier::Low, None, None)
    );

    assert!(morning.is_some());
    assert!(evening.is_some());
    assert_eq!(service.fetcher().source().fetch_count(), 1);
    assert_eq!(service.cached_results(), 2);
}

#[tokio::test]
async fn automatic_engine_choice_always_yields_an_overlay() {
    let service = ShadowService::new(MemoryTileSource::flat(800.0), ServiceOptions::default());

    let result = service
        .compute(mont_blanc(), SunPosition::new(180.0, 30.0), QualityTier::Low, None, None)
        .await
        .unwrap();

    match result.engine {
        // buffered grid: the visible tile plus two tiles on every side
        EngineKind::Gpu => assert_eq!(result.tile_count, 25),
        EngineKind::Cpu => assert_eq!(result.tile_count, 1),
    }
    assert!(result.bounds.contains(&mont_blanc()));
}
