//! End-to-end tests for the frame pipeline.
//!
//! Sources are opened through [`TestBackend`], which stands in for the
//! platform: a native engine that emits one frame per chunk, a playback
//! surface that captures bitmaps, and a GPU that records its calls.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;

use fp_common::{
    AudioCodec, AudioTrackInfo, CacheConfig, ConfigurationError, DecodePath, DecodedFrame,
    FrameNumber, PipelineConfig, PipelineError, PrefetchConfig, Rational, SourceConfig, SourceId,
    TexturePoolConfig, VideoCodec, ZeroCopySupport,
};
use fp_decoder::{
    FrameCache, FramePrefetcher, MediaSourceManager, OpenOptions, PrefetchPriority, SourceState,
    TextureImporter,
};
use fp_demux::MediaInput;

use common::{init_tracing, SurfaceMode, TestBackend, TestGpu, TestMedia};

fn input(name: &str) -> MediaInput {
    MediaInput::File(name.into())
}

fn manager_with(
    backend: TestBackend,
    config: SourceConfig,
) -> (Arc<MediaSourceManager>, Arc<TestBackend>) {
    init_tracing();
    let backend = Arc::new(backend);
    let cache = Arc::new(FrameCache::new(&CacheConfig::default()));
    let manager = Arc::new(MediaSourceManager::new(backend.clone(), cache, config));
    (manager, backend)
}

#[tokio::test]
async fn h264_frame_zero_decodes_natively_then_hits_cache() {
    let (manager, backend) = manager_with(
        TestBackend::avc_only().with_media("clip.mp4", TestMedia::h264_1080p30()),
        SourceConfig::default(),
    );
    let id = manager.open(input("clip.mp4"), OpenOptions::default()).await.unwrap();

    let probe = manager.probe_result(&id).unwrap();
    let video = probe.video.unwrap();
    assert_eq!(video.codec, VideoCodec::Avc);
    assert_eq!(video.decode_path, DecodePath::FastNative);
    assert_eq!(manager.decode_path(&id).unwrap(), DecodePath::FastNative);
    assert_eq!(backend.engine.configures.load(Ordering::SeqCst), 1);

    let frame = manager
        .get_video_frame_by_number(&id, FrameNumber(0))
        .await
        .unwrap()
        .expect("frame 0");
    assert_eq!(frame.frame_number, FrameNumber(0));
    assert_eq!(frame.decode_path, DecodePath::FastNative);
    assert!(frame.is_keyframe);
    let decodes = backend.engine.decodes.load(Ordering::SeqCst);
    assert_eq!(decodes, 1);

    let again = manager
        .get_video_frame_by_number(&id, FrameNumber(0))
        .await
        .unwrap()
        .expect("cached frame 0");
    assert!(Arc::ptr_eq(&frame, &again));
    assert_eq!(backend.engine.decodes.load(Ordering::SeqCst), decodes);
    assert_eq!(manager.cache().stats().hits, 1);
}

#[tokio::test]
async fn opening_past_the_limit_closes_the_oldest_source_first() {
    let (manager, backend) = manager_with(
        TestBackend::avc_only()
            .with_media("a.mp4", TestMedia::h264_1080p30())
            .with_media("b.mp4", TestMedia::h264_1080p30()),
        SourceConfig {
            max_concurrent_sources: 1,
            ..Default::default()
        },
    );
    let a = manager.open(input("a.mp4"), OpenOptions::default()).await.unwrap();
    manager
        .get_video_frame_by_number(&a, FrameNumber(3))
        .await
        .unwrap();

    let b = manager.open(input("b.mp4"), OpenOptions::default()).await.unwrap();
    assert_eq!(manager.source_state(&a), Some(SourceState::Closed));
    assert_eq!(manager.source_state(&b), Some(SourceState::Ready));
    assert_eq!(manager.source_ids(), vec![b.clone()]);
    assert_eq!(*backend.revoked.lock(), vec!["a.mp4".to_string()]);
    assert!(!manager.cache().contains(&a, FrameNumber(3)));

    let err = manager
        .get_video_frame_by_number(&a, FrameNumber(0))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::SourceClosed(_)));
}

#[tokio::test]
async fn closing_twice_is_a_no_op() {
    let (manager, backend) = manager_with(
        TestBackend::avc_only().with_media("a.mp4", TestMedia::h264_1080p30()),
        SourceConfig::default(),
    );
    let id = manager.open(input("a.mp4"), OpenOptions::default()).await.unwrap();
    manager.close(&id).await.unwrap();
    manager.close(&id).await.unwrap();
    assert_eq!(backend.revoked.lock().len(), 1);
    assert!(manager.source_ids().is_empty());
}

#[tokio::test]
async fn unsupported_codec_decodes_through_the_playback_surface() {
    let (manager, backend) = manager_with(
        TestBackend::avc_only().with_media("master.mov", TestMedia::prores()),
        SourceConfig::default(),
    );
    let id = manager.open(input("master.mov"), OpenOptions::default()).await.unwrap();
    assert_eq!(manager.decode_path(&id).unwrap(), DecodePath::SoftwareFallback);
    assert!(!manager.is_degraded(&id).unwrap());

    let frame = manager
        .get_video_frame_by_number(&id, FrameNumber(15))
        .await
        .unwrap()
        .expect("captured frame");
    assert_eq!(frame.decode_path, DecodePath::SoftwareFallback);
    assert_eq!((frame.width, frame.height), (4, 4));
    assert_eq!(backend.engine.decodes.load(Ordering::SeqCst), 0);

    let surfaces = backend.surfaces.lock();
    assert_eq!(surfaces.len(), 1);
    assert_eq!(*surfaces[0].seeks.lock(), vec![500.0]);
}

#[tokio::test]
async fn missing_engine_falls_back_to_software() {
    let mut backend = TestBackend::avc_only().with_media("a.mp4", TestMedia::h264_1080p30());
    backend.engine_available = false;
    let (manager, _backend) = manager_with(backend, SourceConfig::default());

    let id = manager.open(input("a.mp4"), OpenOptions::default()).await.unwrap();
    assert_eq!(manager.decode_path(&id).unwrap(), DecodePath::SoftwareFallback);
    let frame = manager
        .get_video_frame_by_number(&id, FrameNumber(0))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(frame.decode_path, DecodePath::SoftwareFallback);
}

#[tokio::test]
async fn unusable_surface_leaves_the_source_degraded_but_capturing() {
    let mut backend = TestBackend::avc_only().with_media("master.mov", TestMedia::prores());
    backend.surface_mode = SurfaceMode::Unavailable;
    let (manager, backend) = manager_with(backend, SourceConfig::default());

    let id = manager.open(input("master.mov"), OpenOptions::default()).await.unwrap();
    assert!(manager.is_degraded(&id).unwrap());
    let frame = manager
        .get_video_frame_by_number(&id, FrameNumber(1))
        .await
        .unwrap();
    assert!(frame.is_some());

    manager.close(&id).await.unwrap();
    assert!(backend.surfaces.lock()[0].closed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn disabled_fallback_rejects_unsupported_codecs() {
    let (manager, _) = manager_with(
        TestBackend::avc_only().with_media("master.mov", TestMedia::prores()),
        SourceConfig {
            allow_software_fallback: false,
            ..Default::default()
        },
    );
    let err = manager
        .open(input("master.mov"), OpenOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Configuration(ConfigurationError::UnsupportedVideo {
            codec: VideoCodec::ProRes,
            ..
        })
    ));
    assert!(manager.source_ids().is_empty());
}

#[tokio::test]
async fn missing_media_surfaces_the_probe_error() {
    let (manager, _) = manager_with(TestBackend::avc_only(), SourceConfig::default());
    let options = OpenOptions {
        id: Some(SourceId::new("ghost")),
        ..Default::default()
    };
    let err = manager.open(input("ghost.mp4"), options).await.unwrap_err();
    assert!(matches!(err, PipelineError::Probe(_)));
    assert_eq!(manager.source_state(&SourceId::new("ghost")), Some(SourceState::Error));
}

#[tokio::test]
async fn eac3_audio_is_not_mistaken_for_ac3() {
    let media = TestMedia {
        audio: Some(AudioTrackInfo {
            codec: fp_common::parse_audio_codec("ec-3"),
            codec_string: "ec-3".into(),
            sample_rate: 48_000,
            channels: 6,
            decode_path: DecodePath::Unsupported,
        }),
        ..TestMedia::h264_1080p30()
    };
    let (manager, _) = manager_with(
        TestBackend::avc_only().with_media("a.mp4", media),
        SourceConfig::default(),
    );
    let id = manager.open(input("a.mp4"), OpenOptions::default()).await.unwrap();

    let audio = manager.probe_result(&id).unwrap().audio.unwrap();
    assert_eq!(audio.codec, AudioCodec::Eac3);
    assert_eq!(audio.decode_path, DecodePath::SoftwareFallback);
    // Audio the fast path cannot take does not drag video off it.
    assert_eq!(manager.decode_path(&id).unwrap(), DecodePath::FastNative);
}

#[tokio::test]
async fn closing_during_a_decode_caches_nothing() {
    let (manager, backend) = manager_with(
        TestBackend::avc_only().with_media("a.mp4", TestMedia::h264_1080p30()),
        SourceConfig::default(),
    );
    backend.engine.hold.store(true, Ordering::SeqCst);
    let id = manager.open(input("a.mp4"), OpenOptions::default()).await.unwrap();

    let pending = {
        let manager = manager.clone();
        let id = id.clone();
        tokio::spawn(async move { manager.get_video_frame_by_number(&id, FrameNumber(5)).await })
    };
    while backend.engine.decodes.load(Ordering::SeqCst) < 6 {
        tokio::task::yield_now().await;
    }

    manager.close(&id).await.unwrap();
    let result = pending.await.unwrap().unwrap();
    assert!(result.is_none());
    assert!(manager.cache().is_empty());
}

#[tokio::test]
async fn prefetcher_warms_the_cache_around_the_playhead() {
    let (manager, _backend) = manager_with(
        TestBackend::avc_only().with_media("a.mp4", TestMedia::h264_1080p30()),
        SourceConfig::default(),
    );
    let id = manager.open(input("a.mp4"), OpenOptions::default()).await.unwrap();
    let prefetcher = FramePrefetcher::new(
        PrefetchConfig {
            ahead_frames: 10,
            behind_frames: 2,
            ..Default::default()
        },
        manager.clone(),
    );

    prefetcher.update_playhead(&id, FrameNumber(0));
    let mut waited = 0;
    while prefetcher.stats().completed < 11 && waited < 400 {
        tokio::time::sleep(Duration::from_millis(5)).await;
        waited += 1;
    }
    for n in 0..=10 {
        assert!(manager.cache().contains(&id, FrameNumber(n)), "frame {n}");
    }
    assert_eq!(prefetcher.stats().failed, 0);

    // Frames already resident are not requested again.
    let requested = prefetcher.stats().requested;
    prefetcher.update_playhead(&id, FrameNumber(1));
    assert_eq!(prefetcher.stats().requested, requested + 1);
}

#[tokio::test]
async fn explicit_request_delivers_through_its_callback() {
    let (manager, _backend) = manager_with(
        TestBackend::avc_only().with_media("a.mp4", TestMedia::h264_1080p30()),
        SourceConfig::default(),
    );
    let id = manager.open(input("a.mp4"), OpenOptions::default()).await.unwrap();
    let prefetcher = FramePrefetcher::new(PrefetchConfig::default(), manager.clone());

    let (tx, rx) = tokio::sync::oneshot::channel();
    prefetcher.request(
        &id,
        FrameNumber(42),
        PrefetchPriority::Critical,
        Some(Box::new(move |frame: Option<Arc<DecodedFrame>>| {
            let _ = tx.send(frame.map(|f| f.frame_number));
        })),
    );
    assert_eq!(rx.await.unwrap(), Some(FrameNumber(42)));
}

#[tokio::test]
async fn decoded_frames_import_into_pooled_textures() {
    let (manager, _backend) = manager_with(
        TestBackend::avc_only()
            .with_media("a.mp4", TestMedia::h264_1080p30())
            .with_media("master.mov", TestMedia::prores()),
        SourceConfig::default(),
    );
    let gpu = Arc::new(TestGpu {
        support: ZeroCopySupport {
            native_frames: false,
            bitmaps: true,
        },
        ..Default::default()
    });
    let importer = TextureImporter::new(gpu.clone(), TexturePoolConfig::default());

    let native = manager.open(input("a.mp4"), OpenOptions::default()).await.unwrap();
    let software = manager
        .open(input("master.mov"), OpenOptions::default())
        .await
        .unwrap();

    let frame = manager
        .get_video_frame_by_number(&native, FrameNumber(0))
        .await
        .unwrap()
        .unwrap();
    let texture = importer.import(&frame).unwrap();
    assert!(texture.owned);
    assert!(!texture.zero_copy);
    importer.release(texture);

    let next = manager
        .get_video_frame_by_number(&native, FrameNumber(1))
        .await
        .unwrap()
        .unwrap();
    let reused = importer.import(&next).unwrap();
    assert!(!reused.owned);

    let captured = manager
        .get_video_frame_by_number(&software, FrameNumber(0))
        .await
        .unwrap()
        .unwrap();
    let bitmap = importer.import(&captured).unwrap();
    assert!(bitmap.zero_copy);

    assert_eq!(
        *gpu.calls.lock(),
        vec![
            "create 8x8 Rgba8".to_string(),
            "upload 256".to_string(),
            "upload 256".to_string(),
            "create 4x4 Rgba8".to_string(),
            "import-bitmap".to_string(),
        ]
    );
}

#[test]
fn pipeline_config_overrides_feed_every_component() {
    let config = PipelineConfig::from_json(
        r#"{ "cache": { "max_size_mb": 1 }, "sources": { "max_concurrent_sources": 2 } }"#,
    )
    .unwrap();
    let cache = FrameCache::new(&config.cache);
    assert_eq!(cache.max_bytes(), 1024 * 1024);
    assert_eq!(config.sources.max_concurrent_sources, 2);
    assert_eq!(config.prefetch.ahead_frames, 30);
    assert_eq!(Rational::FPS_30.frame_duration_ms().round(), 33.0);
}
