//! Camera sources and the newest-wins frame hand-off
//!
//! A [`CameraSource`] pushes frames into a [`FrameSlot`] from its own task or
//! thread. The slot holds at most one frame; publishing over an unread frame
//! releases the older one, so the producer never blocks on the scheduler.

use crate::error::CaptureBindingError;
use crate::models::{FrameSample, PixelFormat};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
struct SlotInner {
    frame: Option<FrameSample>,
    closed: bool,
    published: u64,
    replaced: u64,
}

/// Single-frame hand-off between a camera and the scheduler
#[derive(Debug, Default)]
pub struct FrameSlot {
    inner: Mutex<SlotInner>,
    notify: Notify,
}

/// Counters describing slot traffic
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlotStats {
    /// Frames accepted into the slot
    pub published: u64,
    /// Frames overwritten before the consumer took them
    pub replaced: u64,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SlotInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Store `frame` as the newest frame. Returns false once the slot is closed,
    /// in which case the frame is released immediately.
    pub fn publish(&self, frame: FrameSample) -> bool {
        let stale = {
            let mut inner = self.lock();
            if inner.closed {
                drop(inner);
                drop(frame);
                return false;
            }
            inner.published += 1;
            let stale = inner.frame.replace(frame);
            if stale.is_some() {
                inner.replaced += 1;
            }
            stale
        };
        // Release outside the lock so producer callbacks never run under it
        drop(stale);
        self.notify.notify_one();
        true
    }

    /// Wait for the next frame. Returns `None` once the slot is closed.
    pub async fn next(&self) -> Option<FrameSample> {
        loop {
            let notified = self.notify.notified();
            {
                let mut inner = self.lock();
                if inner.closed {
                    return None;
                }
                if let Some(frame) = inner.frame.take() {
                    return Some(frame);
                }
            }
            notified.await;
        }
    }

    /// Close the slot and release any pending frame
    pub fn close(&self) {
        let pending = {
            let mut inner = self.lock();
            inner.closed = true;
            inner.frame.take()
        };
        drop(pending);
        self.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn stats(&self) -> SlotStats {
        let inner = self.lock();
        SlotStats {
            published: inner.published,
            replaced: inner.replaced,
        }
    }
}

/// A source of live frames
#[async_trait]
pub trait CameraSource: Send {
    /// Start delivering frames into `slot`
    async fn bind(&mut self, slot: Arc<FrameSlot>) -> Result<(), CaptureBindingError>;

    /// Stop delivering frames and release the device. Idempotent.
    async fn unbind(&mut self);

    /// Short identifier for diagnostics
    fn name(&self) -> &str;
}

/// Camera fed by hand through a [`ManualFeed`]
pub struct ManualCamera {
    bound: watch::Sender<Option<Arc<FrameSlot>>>,
    bind_failure: Option<String>,
}

/// Producer side of a [`ManualCamera`]
#[derive(Clone)]
pub struct ManualFeed {
    bound: watch::Receiver<Option<Arc<FrameSlot>>>,
}

impl ManualCamera {
    pub fn new() -> (Self, ManualFeed) {
        let (tx, rx) = watch::channel(None);
        (
            Self {
                bound: tx,
                bind_failure: None,
            },
            ManualFeed { bound: rx },
        )
    }

    /// A camera whose bind always fails with `reason`
    pub fn unavailable(reason: impl Into<String>) -> Self {
        let (camera, _feed) = Self::new();
        Self {
            bind_failure: Some(reason.into()),
            ..camera
        }
    }
}

#[async_trait]
impl CameraSource for ManualCamera {
    async fn bind(&mut self, slot: Arc<FrameSlot>) -> Result<(), CaptureBindingError> {
        if let Some(reason) = &self.bind_failure {
            return Err(CaptureBindingError::Unavailable(reason.clone()));
        }
        if self.bound.borrow().is_some() {
            return Err(CaptureBindingError::AlreadyBound);
        }
        self.bound.send_replace(Some(slot));
        Ok(())
    }

    async fn unbind(&mut self) {
        self.bound.send_replace(None);
    }

    fn name(&self) -> &str {
        "manual"
    }
}

impl ManualFeed {
    /// Push a frame. Returns false when the camera is not bound or the slot is closed.
    pub fn push(&self, frame: FrameSample) -> bool {
        let slot = self.bound.borrow().clone();
        match slot {
            Some(slot) => slot.publish(frame),
            None => false,
        }
    }

    pub fn is_bound(&self) -> bool {
        self.bound.borrow().is_some()
    }

    /// Wait until the camera has been bound to a slot.
    /// Returns false if the camera was dropped first.
    pub async fn wait_bound(&self) -> bool {
        let mut rx = self.bound.clone();
        let bound = rx.wait_for(|slot| slot.is_some()).await.is_ok();
        bound
    }

    /// Wait until the camera has been unbound
    pub async fn wait_unbound(&self) {
        let mut rx = self.bound.clone();
        // A dropped camera counts as unbound
        let _ = rx.wait_for(|slot| slot.is_none()).await;
    }
}

/// Decoded still used by [`ReplayCamera`]
#[derive(Debug, Clone)]
struct ReplayFrame {
    width: u32,
    height: u32,
    data: Arc<Vec<u8>>,
}

/// Camera that loops over the images in a directory at a fixed rate
pub struct ReplayCamera {
    dir: PathBuf,
    fps: u32,
    worker: Option<(CancellationToken, JoinHandle<()>)>,
}

impl ReplayCamera {
    pub fn new(dir: impl Into<PathBuf>, fps: u32) -> Self {
        Self {
            dir: dir.into(),
            fps: fps.max(1),
            worker: None,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl CameraSource for ReplayCamera {
    async fn bind(&mut self, slot: Arc<FrameSlot>) -> Result<(), CaptureBindingError> {
        if self.worker.is_some() {
            return Err(CaptureBindingError::AlreadyBound);
        }

        let dir = self.dir.clone();
        let frames = tokio::task::spawn_blocking(move || load_frames(&dir))
            .await
            .map_err(|e| CaptureBindingError::Unavailable(format!("frame decoder failed: {e}")))??;

        info!(
            dir = %self.dir.display(),
            frames = frames.len(),
            fps = self.fps,
            "Replay camera bound"
        );

        let cancel = CancellationToken::new();
        let period = Duration::from_secs_f64(1.0 / self.fps as f64);
        let handle = tokio::spawn(replay_loop(frames, slot, period, cancel.clone()));
        self.worker = Some((cancel, handle));
        Ok(())
    }

    async fn unbind(&mut self) {
        if let Some((cancel, handle)) = self.worker.take() {
            cancel.cancel();
            if let Err(e) = handle.await {
                warn!(error = %e, "Replay camera task ended abnormally");
            }
            debug!(dir = %self.dir.display(), "Replay camera unbound");
        }
    }

    fn name(&self) -> &str {
        "replay"
    }
}

async fn replay_loop(
    frames: Vec<ReplayFrame>,
    slot: Arc<FrameSlot>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    for frame in frames.iter().cycle() {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let sample = FrameSample::new(
                    frame.width,
                    frame.height,
                    PixelFormat::Rgb8,
                    frame.data.as_ref().clone(),
                );
                if !slot.publish(sample) {
                    debug!("Frame slot closed, stopping replay");
                    break;
                }
            }
        }
    }
}

/// Decode every readable image in `dir`, in file-name order
fn load_frames(dir: &Path) -> Result<Vec<ReplayFrame>, CaptureBindingError> {
    let entries = std::fs::read_dir(dir).map_err(|source| CaptureBindingError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect();
    paths.sort();

    let mut frames = Vec::with_capacity(paths.len());
    for path in paths {
        match image::open(&path) {
            Ok(img) => {
                let rgb = img.to_rgb8();
                let (width, height) = rgb.dimensions();
                if width == 0 || height == 0 {
                    continue;
                }
                frames.push(ReplayFrame {
                    width,
                    height,
                    data: Arc::new(rgb.into_raw()),
                });
            }
            Err(e) => debug!(path = %path.display(), error = %e, "Skipping undecodable file"),
        }
    }

    if frames.is_empty() {
        return Err(CaptureBindingError::NoFrames(dir.to_path_buf()));
    }
    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn counted_frame(counter: &Arc<AtomicUsize>) -> FrameSample {
        let counter = counter.clone();
        FrameSample::new(1, 1, PixelFormat::Rgb8, vec![0, 0, 0]).on_release(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test]
    async fn test_slot_keeps_newest_frame() {
        let slot = FrameSlot::new();
        let released = Arc::new(AtomicUsize::new(0));

        let first = FrameSample::new(1, 1, PixelFormat::Luma8, vec![1]);
        let second = FrameSample::new(1, 1, PixelFormat::Luma8, vec![2]);
        let third = counted_frame(&released);
        assert!(slot.publish(first));
        assert!(slot.publish(second));

        let frame = slot.next().await.unwrap();
        assert_eq!(frame.data, vec![2]);
        assert_eq!(
            slot.stats(),
            SlotStats {
                published: 2,
                replaced: 1
            }
        );

        assert!(slot.publish(third));
        slot.close();
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_replaced_frame_is_released() {
        let slot = FrameSlot::new();
        let released = Arc::new(AtomicUsize::new(0));

        slot.publish(counted_frame(&released));
        slot.publish(counted_frame(&released));
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_closed_slot_rejects_and_releases() {
        let slot = FrameSlot::new();
        slot.close();

        let released = Arc::new(AtomicUsize::new(0));
        assert!(!slot.publish(counted_frame(&released)));
        assert_eq!(released.load(Ordering::SeqCst), 1);
        assert!(slot.next().await.is_none());
    }

    #[tokio::test]
    async fn test_next_wakes_on_publish_and_close() {
        let slot = Arc::new(FrameSlot::new());

        let consumer = {
            let slot = slot.clone();
            tokio::spawn(async move { slot.next().await.map(|f| f.data.clone()) })
        };
        tokio::task::yield_now().await;
        slot.publish(FrameSample::new(1, 1, PixelFormat::Luma8, vec![9]));
        assert_eq!(consumer.await.unwrap(), Some(vec![9]));

        let waiter = {
            let slot = slot.clone();
            tokio::spawn(async move { slot.next().await.is_none() })
        };
        tokio::task::yield_now().await;
        slot.close();
        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn test_manual_camera_binding() {
        let (mut camera, feed) = ManualCamera::new();
        assert!(!feed.push(FrameSample::new(1, 1, PixelFormat::Luma8, vec![0])));

        let slot = Arc::new(FrameSlot::new());
        camera.bind(slot.clone()).await.unwrap();
        assert!(feed.wait_bound().await);
        assert!(matches!(
            camera.bind(slot.clone()).await,
            Err(CaptureBindingError::AlreadyBound)
        ));

        assert!(feed.push(FrameSample::new(1, 1, PixelFormat::Luma8, vec![5])));
        assert_eq!(slot.next().await.unwrap().data, vec![5]);

        camera.unbind().await;
        assert!(!feed.is_bound());
    }

    #[tokio::test]
    async fn test_unavailable_camera() {
        let mut camera = ManualCamera::unavailable("permission denied");
        let err = camera.bind(Arc::new(FrameSlot::new())).await.unwrap_err();
        assert!(matches!(err, CaptureBindingError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_replay_camera_empty_dir() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("notes.txt"), "not an image").unwrap();

        let mut camera = ReplayCamera::new(temp_dir.path(), 30);
        let err = camera.bind(Arc::new(FrameSlot::new())).await.unwrap_err();
        assert!(matches!(err, CaptureBindingError::NoFrames(_)));
    }

    #[tokio::test]
    async fn test_replay_camera_missing_dir() {
        let mut camera = ReplayCamera::new("/nonexistent/eyebreak/frames", 30);
        let err = camera.bind(Arc::new(FrameSlot::new())).await.unwrap_err();
        assert!(matches!(err, CaptureBindingError::Io { .. }));
    }

    #[tokio::test]
    async fn test_replay_camera_publishes_decoded_frames() {
        let temp_dir = TempDir::new().unwrap();
        let img = image::RgbImage::from_pixel(8, 6, image::Rgb([10, 20, 30]));
        img.save(temp_dir.path().join("000.png")).unwrap();

        let slot = Arc::new(FrameSlot::new());
        let mut camera = ReplayCamera::new(temp_dir.path(), 50);
        camera.bind(slot.clone()).await.unwrap();

        let frame = slot.next().await.unwrap();
        assert_eq!((frame.width, frame.height), (8, 6));
        assert_eq!(frame.format, PixelFormat::Rgb8);
        assert_eq!(&frame.data[..3], &[10, 20, 30]);

        camera.unbind().await;
        camera.unbind().await;
    }
}
