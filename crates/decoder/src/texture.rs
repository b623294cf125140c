//! Texture importer: turns decoded frames into GPU textures.
//!
//! Textures are pooled per exact `(width, height, format)` bucket. A texture
//! handed out from the pool comes back with `owned = false`; a freshly
//! created one with `owned = true`. Either way the renderer gives it back
//! through [`TextureImporter::release`], which files it into the pool.
//!
//! Import strategy by payload:
//!
//! | Payload  | Zero-copy supported      | Otherwise                     |
//! |----------|--------------------------|-------------------------------|
//! | `Native` | `import_video_frame`     | `copy_pixels` + upload        |
//! | `Bitmap` | `import_image_bitmap`    | `copy_pixels` + upload        |
//! | `Raw`    | n/a                      | upload (NV12 → RGBA if needed) |
//! | `Empty`  | rejected                 | rejected                      |

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use fp_common::{
    DecodedFrame, FrameNumber, FramePayload, GpuBackend, GpuError, PixelFormat, TextureError,
    TextureHandle, TexturePoolConfig,
};

use crate::convert::nv12_to_rgba;

/// A texture holding one imported frame.
#[derive(Clone, Debug, PartialEq)]
pub struct ImportedTexture {
    pub handle: TextureHandle,
    /// Frame whose pixels the texture holds.
    pub frame_number: FrameNumber,
    pub timestamp_ms: f64,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// `true` when created for this import, `false` when reused from the pool.
    pub owned: bool,
    /// Imported on the GPU without a CPU copy.
    pub zero_copy: bool,
}

/// Snapshot of pool counters.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TexturePoolStats {
    pub pooled: usize,
    pub in_use: usize,
    pub available: usize,
    pub created: u64,
    pub reused: u64,
    pub destroyed: u64,
    pub zero_copy_imports: u64,
    pub copied_imports: u64,
}

type BucketKey = (u32, u32, PixelFormat);

#[derive(Debug)]
struct PooledTexture {
    handle: TextureHandle,
    in_use: bool,
    last_used: Instant,
}

#[derive(Default)]
struct PoolInner {
    buckets: HashMap<BucketKey, Vec<PooledTexture>>,
    created: u64,
    reused: u64,
    destroyed: u64,
    zero_copy_imports: u64,
    copied_imports: u64,
}

/// How pixels get into the texture.
enum Transfer {
    NativeZeroCopy,
    BitmapZeroCopy,
    Upload(Bytes),
}

/// Imports decoded frames into pooled GPU textures.
pub struct TextureImporter {
    gpu: Arc<dyn GpuBackend>,
    config: TexturePoolConfig,
    pool: Mutex<PoolInner>,
}

impl std::fmt::Debug for TextureImporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextureImporter")
            .field("stats", &self.stats())
            .field("config", &self.config)
            .finish()
    }
}

impl TextureImporter {
    pub fn new(gpu: Arc<dyn GpuBackend>, config: TexturePoolConfig) -> Self {
        Self {
            gpu,
            config,
            pool: Mutex::new(PoolInner::default()),
        }
    }

    /// Import a frame into a texture of matching size.
    pub fn import(&self, frame: &DecodedFrame) -> Result<ImportedTexture, TextureError> {
        let (format, transfer) = self.plan(frame)?;
        let zero_copy = !matches!(transfer, Transfer::Upload(_));
        let (handle, owned) = self.acquire(frame.width, frame.height, format)?;
        let texture = ImportedTexture {
            handle,
            frame_number: frame.frame_number,
            timestamp_ms: frame.timestamp_ms,
            width: frame.width,
            height: frame.height,
            format,
            owned,
            zero_copy,
        };

        let result = match (&transfer, &frame.payload) {
            (Transfer::NativeZeroCopy, FramePayload::Native(native)) => {
                self.gpu.import_video_frame(handle, native.as_ref())
            }
            (Transfer::BitmapZeroCopy, FramePayload::Bitmap(bitmap)) => {
                self.gpu.import_image_bitmap(handle, bitmap.as_ref())
            }
            (Transfer::Upload(pixels), _) => self.gpu.upload_pixels(handle, pixels),
            _ => Err(GpuError::ImportFailed("payload changed during import".into())),
        };

        if let Err(e) = result {
            warn!(
                source = %frame.source_id,
                frame = frame.frame_number.0,
                error = %e,
                "Texture import failed"
            );
            self.discard(texture);
            return Err(e.into());
        }

        let mut pool = self.pool.lock();
        if zero_copy {
            pool.zero_copy_imports += 1;
        } else {
            pool.copied_imports += 1;
        }
        Ok(texture)
    }

    /// Decide the texture format and transfer for a frame.
    fn plan(&self, frame: &DecodedFrame) -> Result<(PixelFormat, Transfer), TextureError> {
        let support = self.gpu.zero_copy_support();
        match &frame.payload {
            FramePayload::Native(_) if support.native_frames => {
                Ok((PixelFormat::Rgba8, Transfer::NativeZeroCopy))
            }
            FramePayload::Native(native) => {
                let pixels = native.copy_pixels().map_err(TextureError::Extraction)?;
                self.prepare_upload(frame, native.format(), pixels)
            }
            FramePayload::Bitmap(_) if support.bitmaps => {
                Ok((PixelFormat::Rgba8, Transfer::BitmapZeroCopy))
            }
            FramePayload::Bitmap(bitmap) => {
                let pixels = bitmap.copy_pixels().map_err(TextureError::Extraction)?;
                self.prepare_upload(frame, PixelFormat::Rgba8, pixels)
            }
            FramePayload::Raw(pixels) => self.prepare_upload(frame, frame.format, pixels.clone()),
            FramePayload::Empty => Err(TextureError::UnsupportedPayload(format!(
                "{} frame {} has no pixels",
                frame.source_id, frame.frame_number
            ))),
        }
    }

    fn prepare_upload(
        &self,
        frame: &DecodedFrame,
        format: PixelFormat,
        pixels: Bytes,
    ) -> Result<(PixelFormat, Transfer), TextureError> {
        let expected = format.frame_byte_size(frame.width, frame.height);
        if pixels.len() != expected {
            return Err(TextureError::UnsupportedPayload(format!(
                "{format:?} {}x{} needs {expected} bytes, got {}",
                frame.width,
                frame.height,
                pixels.len()
            )));
        }
        if self.gpu.supports_format(format) {
            return Ok((format, Transfer::Upload(pixels)));
        }
        match format {
            PixelFormat::Nv12 => {
                let rgba = nv12_to_rgba(&pixels, frame.width, frame.height)
                    .map_err(|e| TextureError::Extraction(e.to_string()))?;
                debug!(
                    source = %frame.source_id,
                    frame = frame.frame_number.0,
                    "Converted NV12 to RGBA on the CPU"
                );
                Ok((PixelFormat::Rgba8, Transfer::Upload(Bytes::from(rgba))))
            }
            other => Err(TextureError::UnsupportedPayload(format!(
                "backend cannot sample {other:?}"
            ))),
        }
    }

    /// Take an available pooled texture or create a new one.
    fn acquire(
        &self,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<(TextureHandle, bool), TextureError> {
        {
            let mut pool = self.pool.lock();
            let reused = pool
                .buckets
                .get_mut(&(width, height, format))
                .and_then(|bucket| bucket.iter_mut().find(|t| !t.in_use))
                .map(|texture| {
                    texture.in_use = true;
                    texture.last_used = Instant::now();
                    texture.handle
                });
            if let Some(handle) = reused {
                pool.reused += 1;
                return Ok((handle, false));
            }
        }

        let handle = self.gpu.create_texture(width, height, format)?;
        self.pool.lock().created += 1;
        debug!(width, height, format = ?format, handle = handle.0, "Created texture");
        Ok((handle, true))
    }

    /// Give a texture back after the renderer is done with it.
    pub fn release(&self, texture: ImportedTexture) {
        let key = (texture.width, texture.height, texture.format);
        let now = Instant::now();
        let destroy = {
            let mut pool = self.pool.lock();
            let max = self.config.max_per_bucket;
            let bucket = pool.buckets.entry(key).or_default();

            if let Some(pooled) = bucket.iter_mut().find(|t| t.handle == texture.handle) {
                pooled.in_use = false;
                pooled.last_used = now;
                None
            } else if bucket.len() < max {
                bucket.push(PooledTexture {
                    handle: texture.handle,
                    in_use: false,
                    last_used: now,
                });
                None
            } else {
                let victim = bucket
                    .iter()
                    .enumerate()
                    .filter(|(_, t)| !t.in_use)
                    .min_by_key(|(_, t)| t.last_used)
                    .map(|(index, _)| index);
                match victim {
                    Some(index) => {
                        let evicted = bucket.swap_remove(index);
                        bucket.push(PooledTexture {
                            handle: texture.handle,
                            in_use: false,
                            last_used: now,
                        });
                        Some(evicted.handle)
                    }
                    None => Some(texture.handle),
                }
            }
        };

        if let Some(handle) = destroy {
            self.gpu.destroy_texture(handle);
            self.pool.lock().destroyed += 1;
            debug!(handle = handle.0, "Destroyed texture on release");
        }
    }

    /// Drop a texture whose import failed.
    fn discard(&self, texture: ImportedTexture) {
        if texture.owned {
            self.gpu.destroy_texture(texture.handle);
            self.pool.lock().destroyed += 1;
        } else {
            self.release(texture);
        }
    }

    /// Destroy available textures idle longer than the configured timeout.
    pub fn sweep_idle(&self) -> usize {
        let timeout = self.config.idle_timeout();
        let now = Instant::now();
        let mut victims = Vec::new();
        {
            let mut pool = self.pool.lock();
            for bucket in pool.buckets.values_mut() {
                bucket.retain(|t| {
                    let idle = !t.in_use && now.duration_since(t.last_used) > timeout;
                    if idle {
                        victims.push(t.handle);
                    }
                    !idle
                });
            }
            pool.buckets.retain(|_, bucket| !bucket.is_empty());
            pool.destroyed += victims.len() as u64;
        }
        for handle in &victims {
            self.gpu.destroy_texture(*handle);
        }
        if !victims.is_empty() {
            debug!(destroyed = victims.len(), "Swept idle textures");
        }
        victims.len()
    }

    /// Run [`sweep_idle`](Self::sweep_idle) every `interval` until the
    /// returned token is cancelled.
    pub fn spawn_idle_sweeper(self: &Arc<Self>, interval: Duration) -> CancellationToken {
        let token = CancellationToken::new();
        let importer = Arc::clone(self);
        let stop = token.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = ticker.tick() => {
                        importer.sweep_idle();
                    }
                }
            }
        });
        token
    }

    /// Destroy every available texture. Textures in use are kept.
    pub fn clear_pool(&self) -> usize {
        let mut victims = Vec::new();
        {
            let mut pool = self.pool.lock();
            for bucket in pool.buckets.values_mut() {
                bucket.retain(|t| {
                    if !t.in_use {
                        victims.push(t.handle);
                    }
                    t.in_use
                });
            }
            pool.buckets.retain(|_, bucket| !bucket.is_empty());
            pool.destroyed += victims.len() as u64;
        }
        for handle in &victims {
            self.gpu.destroy_texture(*handle);
        }
        victims.len()
    }

    pub fn stats(&self) -> TexturePoolStats {
        let pool = self.pool.lock();
        let (mut pooled, mut in_use) = (0, 0);
        for texture in pool.buckets.values().flatten() {
            pooled += 1;
            if texture.in_use {
                in_use += 1;
            }
        }
        TexturePoolStats {
            pooled,
            in_use,
            available: pooled - in_use,
            created: pool.created,
            reused: pool.reused,
            destroyed: pool.destroyed,
            zero_copy_imports: pool.zero_copy_imports,
            copied_imports: pool.copied_imports,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fp_common::{Bitmap, DecodePath, NativeFrame, Resolution, SourceId, ZeroCopySupport};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[derive(Default)]
    struct MockGpu {
        next: AtomicU64,
        support: ZeroCopySupport,
        planar: bool,
        fail_upload: bool,
        log: Mutex<Vec<String>>,
    }

    impl GpuBackend for MockGpu {
        fn create_texture(
            &self,
            width: u32,
            height: u32,
            format: PixelFormat,
        ) -> Result<TextureHandle, GpuError> {
            let id = self.next.fetch_add(1, Ordering::SeqCst) + 1;
            self.log.lock().push(format!("create {id} {width}x{height} {format:?}"));
            Ok(TextureHandle(id))
        }

        fn upload_pixels(&self, texture: TextureHandle, pixels: &[u8]) -> Result<(), GpuError> {
            if self.fail_upload {
                return Err(GpuError::UploadFailed("device lost".into()));
            }
            self.log.lock().push(format!("upload {} {}", texture.0, pixels.len()));
            Ok(())
        }

        fn import_video_frame(
            &self,
            texture: TextureHandle,
            _frame: &dyn NativeFrame,
        ) -> Result<(), GpuError> {
            self.log.lock().push(format!("import-native {}", texture.0));
            Ok(())
        }

        fn import_image_bitmap(
            &self,
            texture: TextureHandle,
            _bitmap: &dyn Bitmap,
        ) -> Result<(), GpuError> {
            self.log.lock().push(format!("import-bitmap {}", texture.0));
            Ok(())
        }

        fn destroy_texture(&self, texture: TextureHandle) {
            self.log.lock().push(format!("destroy {}", texture.0));
        }

        fn zero_copy_support(&self) -> ZeroCopySupport {
            self.support
        }

        fn supports_format(&self, format: PixelFormat) -> bool {
            self.planar || !format.is_planar()
        }
    }

    #[derive(Debug)]
    struct Frame;

    impl NativeFrame for Frame {
        fn timestamp_us(&self) -> i64 {
            0
        }

        fn resolution(&self) -> Resolution {
            Resolution::new(2, 2)
        }

        fn format(&self) -> PixelFormat {
            PixelFormat::Nv12
        }

        fn copy_pixels(&self) -> Result<Bytes, String> {
            Ok(Bytes::from(vec![128u8; 6]))
        }
    }

    fn decoded(payload: FramePayload, format: PixelFormat) -> DecodedFrame {
        DecodedFrame {
            source_id: SourceId::new("a"),
            frame_number: FrameNumber(0),
            timestamp_ms: 0.0,
            width: 2,
            height: 2,
            format,
            duration_ms: 33.3,
            is_keyframe: true,
            payload,
            decode_path: DecodePath::FastNative,
        }
    }

    fn rgba() -> DecodedFrame {
        decoded(FramePayload::Raw(Bytes::from(vec![0u8; 16])), PixelFormat::Rgba8)
    }

    fn importer(gpu: MockGpu) -> (TextureImporter, Arc<MockGpu>) {
        let gpu = Arc::new(gpu);
        let importer = TextureImporter::new(gpu.clone(), TexturePoolConfig::default());
        (importer, gpu)
    }

    #[test]
    fn released_texture_is_reused() {
        let (importer, gpu) = importer(MockGpu::default());
        let first = importer.import(&rgba()).unwrap();
        assert!(first.owned);
        importer.release(first.clone());

        let mut later = rgba();
        later.frame_number = FrameNumber(42);
        later.timestamp_ms = 1400.0;
        let second = importer.import(&later).unwrap();
        assert!(!second.owned);
        assert_eq!(second.handle, first.handle);
        assert_eq!(first.frame_number, FrameNumber(0));
        assert_eq!(second.frame_number, FrameNumber(42));
        assert_eq!(second.timestamp_ms, 1400.0);
        assert_eq!(gpu.log.lock().iter().filter(|l| l.starts_with("create")).count(), 1);

        importer.release(second);
        let stats = importer.stats();
        assert_eq!(stats.pooled, 1);
        assert_eq!(stats.available, 1);
        assert_eq!(stats.reused, 1);
    }

    #[test]
    fn zero_copy_native_import() {
        let (importer, gpu) = importer(MockGpu {
            support: ZeroCopySupport {
                native_frames: true,
                bitmaps: false,
            },
            ..Default::default()
        });
        let frame = decoded(FramePayload::Native(Arc::new(Frame)), PixelFormat::Nv12);
        let texture = importer.import(&frame).unwrap();
        assert!(texture.zero_copy);
        assert_eq!(texture.format, PixelFormat::Rgba8);
        assert_eq!(gpu.log.lock().last().unwrap(), "import-native 1");
    }

    #[test]
    fn native_without_zero_copy_is_converted_and_uploaded() {
        let (importer, gpu) = importer(MockGpu::default());
        let frame = decoded(FramePayload::Native(Arc::new(Frame)), PixelFormat::Nv12);
        let texture = importer.import(&frame).unwrap();
        assert!(!texture.zero_copy);
        assert_eq!(texture.format, PixelFormat::Rgba8);
        assert_eq!(gpu.log.lock().last().unwrap(), "upload 1 16");
        assert_eq!(importer.stats().copied_imports, 1);
    }

    #[test]
    fn planar_upload_when_backend_samples_nv12() {
        let (importer, gpu) = importer(MockGpu {
            planar: true,
            ..Default::default()
        });
        let frame = decoded(FramePayload::Raw(Bytes::from(vec![0u8; 6])), PixelFormat::Nv12);
        let texture = importer.import(&frame).unwrap();
        assert_eq!(texture.format, PixelFormat::Nv12);
        assert_eq!(gpu.log.lock().last().unwrap(), "upload 1 6");
    }

    #[test]
    fn empty_and_truncated_payloads_are_rejected() {
        let (importer, gpu) = importer(MockGpu::default());
        let empty = importer.import(&decoded(FramePayload::Empty, PixelFormat::Rgba8));
        assert!(matches!(empty, Err(TextureError::UnsupportedPayload(_))));

        let short = decoded(FramePayload::Raw(Bytes::from(vec![0u8; 5])), PixelFormat::Rgba8);
        assert!(matches!(
            importer.import(&short),
            Err(TextureError::UnsupportedPayload(_))
        ));
        assert!(gpu.log.lock().is_empty());
    }

    #[test]
    fn failed_upload_destroys_the_new_texture() {
        let (importer, gpu) = importer(MockGpu {
            fail_upload: true,
            ..Default::default()
        });
        let err = importer.import(&rgba()).unwrap_err();
        assert!(matches!(err, TextureError::Gpu(GpuError::UploadFailed(_))));
        assert_eq!(*gpu.log.lock(), vec!["create 1 2x2 Rgba8", "destroy 1"]);
        assert_eq!(importer.stats().pooled, 0);
    }

    #[test]
    fn full_bucket_evicts_least_recently_used() {
        let gpu = Arc::new(MockGpu::default());
        let importer = TextureImporter::new(
            gpu.clone(),
            TexturePoolConfig {
                max_per_bucket: 1,
                ..Default::default()
            },
        );
        let a = importer.import(&rgba()).unwrap();
        let b = importer.import(&rgba()).unwrap();
        importer.release(a);
        importer.release(b.clone());

        assert_eq!(gpu.log.lock().last().unwrap(), "destroy 1");
        let c = importer.import(&rgba()).unwrap();
        assert_eq!(c.handle, b.handle);
    }

    #[test]
    fn release_destroys_when_nothing_is_evictable() {
        let gpu = Arc::new(MockGpu::default());
        let importer = TextureImporter::new(
            gpu.clone(),
            TexturePoolConfig {
                max_per_bucket: 1,
                ..Default::default()
            },
        );
        let a = importer.import(&rgba()).unwrap();
        importer.release(a);
        let pooled = importer.import(&rgba()).unwrap();
        let extra = importer.import(&rgba()).unwrap();
        importer.release(extra.clone());

        assert_eq!(gpu.log.lock().last().unwrap(), &format!("destroy {}", extra.handle.0));
        importer.release(pooled);
        assert_eq!(importer.stats().available, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_textures_are_swept() {
        let (importer, gpu) = importer(MockGpu::default());
        let texture = importer.import(&rgba()).unwrap();
        let held = importer.import(&rgba()).unwrap();
        importer.release(texture);

        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(importer.sweep_idle(), 1);
        assert_eq!(gpu.log.lock().last().unwrap(), "destroy 1");
        assert_eq!(importer.stats().in_use, 0);

        importer.release(held);
        assert_eq!(importer.sweep_idle(), 0);
        assert_eq!(importer.clear_pool(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn background_sweeper_runs_until_cancelled() {
        let (importer, _gpu) = importer(MockGpu::default());
        let importer = Arc::new(importer);
        let texture = importer.import(&rgba()).unwrap();
        importer.release(texture);

        let token = importer.spawn_idle_sweeper(Duration::from_secs(10));
        tokio::time::sleep(Duration::from_secs(45)).await;
        assert_eq!(importer.stats().pooled, 0);
        token.cancel();
    }
}
