//! Provider registry tests
//!
//! This test suite verifies:
//! - Source-to-provider selection and primary promotion
//! - Greedy computation of the providers a playlist needs
//! - Playlist filtering by provider and media type
//! - Concurrent provider loading through a mocked loader

mod common;

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::{
    Browser, OsFamily, PlatformInfo, PlaylistItem, ProviderFactory, ProviderKind, ProviderLoader,
    Source,
};
use common::{item, youtube_item, Fixture};
use core_playback::providers::builtin_registry;
use core_playback::{PlaybackError, ProviderDescriptor, ProviderRegistry};
use mockall::mock;
use std::sync::Arc;

mock! {
    Loader {}

    #[async_trait]
    impl ProviderLoader for Loader {
        async fn load(&self, kind: &ProviderKind) -> BridgeResult<Arc<dyn ProviderFactory>>;
    }
}

fn flash_desktop() -> PlatformInfo {
    PlatformInfo::default().with_flash_version(32.0)
}

// ============================================================================
// Selection
// ============================================================================

#[test]
fn test_earlier_descriptor_wins() {
    let registry = builtin_registry(&flash_desktop(), None);

    let chosen = registry.choose(&Source::new("clip.mp4")).unwrap();
    assert_eq!(chosen.kind(), &ProviderKind::html5());

    let rtmp = registry.choose(&Source::new("rtmp://live.example.com/app/stream")).unwrap();
    assert_eq!(rtmp.kind(), &ProviderKind::flash());
}

#[test]
fn test_choose_is_stable() {
    let fixture = Fixture::unloaded();
    let sources = [
        Source::new("clip.mp4"),
        Source::new("dQw4w9WgXcQ").with_type("youtube"),
    ];

    for source in &sources {
        let first = fixture.registry.choose(source).unwrap().kind().clone();
        for _ in 0..3 {
            assert_eq!(fixture.registry.choose(source).unwrap().kind(), &first);
        }
    }
    assert!(fixture.registry.choose(&Source::new("archive.zip")).is_none());

    fixture.registry.register_factory(fixture.html5.clone());
    fixture.registry.register_factory(fixture.youtube.clone());
    assert_eq!(
        fixture.registry.choose(&sources[0]).unwrap().kind(),
        &ProviderKind::html5()
    );
    assert_eq!(
        fixture.registry.choose(&sources[1]).unwrap().kind(),
        &ProviderKind::youtube()
    );
}

#[test]
fn test_primary_provider_is_promoted() {
    let registry = builtin_registry(&flash_desktop(), Some(&ProviderKind::flash()));

    assert_eq!(registry.kinds()[0], ProviderKind::flash());
    let chosen = registry.choose(&Source::new("clip.mp4")).unwrap();
    assert_eq!(chosen.kind(), &ProviderKind::flash());
}

#[test]
fn test_hls_needs_native_support_for_html5() {
    let desktop = builtin_registry(&PlatformInfo::default(), None);
    assert!(desktop.choose(&Source::new("live.m3u8")).is_none());

    let ios = builtin_registry(&PlatformInfo::new(OsFamily::Ios { major: 15 }, Browser::Safari), None);
    assert_eq!(
        ios.choose(&Source::new("live.m3u8")).unwrap().kind(),
        &ProviderKind::html5()
    );
}

#[test]
fn test_priority_follows_registration_order() {
    let registry = builtin_registry(&PlatformInfo::default(), None);

    assert_eq!(registry.priority(&ProviderKind::html5()), 3);
    assert_eq!(registry.priority(&ProviderKind::flash()), 2);
    assert_eq!(registry.priority(&ProviderKind::youtube()), 1);
    assert_eq!(registry.priority(&ProviderKind::new("shaka")), i64::MIN);
}

#[test]
fn test_custom_descriptor_is_consulted_in_order() {
    let mut registry = ProviderRegistry::new(Vec::new());
    registry.register(ProviderDescriptor::new(ProviderKind::new("dash"), |source: &Source| {
        source.resolved_type().as_deref() == Some("mpd")
    }));

    assert_eq!(
        registry.choose(&Source::new("manifest.mpd")).unwrap().kind().as_str(),
        "dash"
    );
    assert!(registry.choose(&Source::new("clip.mp4")).is_none());
}

// ============================================================================
// Required Providers
// ============================================================================

#[test]
fn test_required_is_greedy_over_first_sources() {
    let fixture = Fixture::unloaded();
    let playlist = vec![item("a.mp4"), youtube_item("dQw4w9WgXcQ"), item("b.webm")];

    assert_eq!(
        fixture.registry.required(&playlist),
        vec![ProviderKind::html5(), ProviderKind::youtube()]
    );
}

#[test]
fn test_required_ignores_unplayable_items() {
    let fixture = Fixture::unloaded();
    let playlist = vec![item("rtmp://live.example.com/app"), item("a.mp4")];

    assert_eq!(fixture.registry.required(&playlist), vec![ProviderKind::html5()]);
    assert!(fixture.registry.required(&[item("archive.zip")]).is_empty());
}

// ============================================================================
// Filtering
// ============================================================================

#[test]
fn test_filter_keeps_sources_matching_first_choice() {
    let fixture = Fixture::unloaded();
    let mixed = PlaylistItem::new(vec![
        Source::new("high.mp4").with_label("1080p"),
        Source::new("fallback.webm"),
        Source::new("low.mp4").with_label("360p"),
    ]);

    let filtered = fixture.registry.filter_playlist(&[mixed]);
    assert_eq!(filtered.len(), 1);
    let files: Vec<_> = filtered[0].sources.iter().map(|s| s.file.as_str()).collect();
    assert_eq!(files, vec!["high.mp4", "low.mp4"]);
}

#[test]
fn test_filter_drops_items_without_playable_sources() {
    let fixture = Fixture::unloaded();
    let playlist = vec![
        item("rtmp://live.example.com/app"),
        item("a.mp4").with_title("Kept"),
        PlaylistItem::new(Vec::new()),
    ];

    let filtered = fixture.registry.filter_playlist(&playlist);
    assert_eq!(filtered.len(), 1);
    assert_eq!(filtered[0].title.as_deref(), Some("Kept"));
}

// ============================================================================
// Loading
// ============================================================================

#[tokio::test]
async fn test_load_required_registers_and_reports_failures() {
    let fixture = Fixture::unloaded();
    let html5 = fixture.html5.clone();

    let mut loader = MockLoader::new();
    loader
        .expect_load()
        .withf(|kind| kind.as_str() == ProviderKind::HTML5)
        .times(1)
        .returning(move |_| Ok(html5.clone() as Arc<dyn ProviderFactory>));
    loader
        .expect_load()
        .withf(|kind| kind.as_str() == ProviderKind::YOUTUBE)
        .times(1)
        .returning(|_| Err(BridgeError::LoadFailed("iframe api unreachable".to_string())));

    let playlist = vec![item("a.mp4"), youtube_item("dQw4w9WgXcQ")];
    let failures = fixture.registry.load_required(&playlist, &loader).await;

    assert_eq!(failures.len(), 1);
    assert!(matches!(
        &failures[0],
        PlaybackError::ProviderLoadFailed { kind, .. } if *kind == ProviderKind::youtube()
    ));
    assert!(fixture.registry.is_loaded(&ProviderKind::html5()));
    assert!(!fixture.registry.is_loaded(&ProviderKind::youtube()));
}

#[tokio::test]
async fn test_load_required_skips_loaded_providers() {
    let fixture = Fixture::new();

    let mut loader = MockLoader::new();
    loader.expect_load().times(0);

    let failures = fixture
        .registry
        .load_required(&[item("a.mp4"), youtube_item("abc")], &loader)
        .await;
    assert!(failures.is_empty());
}
