use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use image::ImageReader;
use thiserror::Error;
use tracing::{debug, warn};

use crate::asset_locator::{validate_asset_locator, AssetLocatorError};

pub const DEFAULT_LOADER_WORKERS: usize = 4;
const NO_LIVE_BATCH: u64 = 0;

/// Decoded RGBA8 image, row-major, no padding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedImage {
    width: u32,
    height: u32,
    rgba: Vec<u8>,
}

impl LoadedImage {
    pub fn from_rgba(width: u32, height: u32, rgba: Vec<u8>) -> Option<Self> {
        let expected = width as usize * height as usize * 4;
        if width == 0 || height == 0 || rgba.len() != expected {
            return None;
        }
        Some(Self {
            width,
            height,
            rgba,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let offset = (y as usize * self.width as usize + x as usize) * 4;
        [
            self.rgba[offset],
            self.rgba[offset + 1],
            self.rgba[offset + 2],
            self.rgba[offset + 3],
        ]
    }
}

#[derive(Debug, Error)]
pub enum AssetLoadError {
    #[error("invalid asset locator: {0}")]
    InvalidLocator(#[from] AssetLocatorError),
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("decoded image at {path} has no pixels")]
    EmptyImage { path: PathBuf },
    #[error("asset loader workers are not running")]
    WorkersGone,
}

pub fn resolve_asset_path(asset_root: &Path, locator: &str) -> Result<PathBuf, AssetLocatorError> {
    validate_asset_locator(locator)?;
    Ok(locator
        .split('/')
        .fold(asset_root.to_path_buf(), |path, segment| path.join(segment)))
}

pub fn load_image_rgba(path: &Path) -> Result<LoadedImage, AssetLoadError> {
    let reader = ImageReader::open(path).map_err(|source| AssetLoadError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let decoded = reader.decode().map_err(|source| AssetLoadError::Decode {
        path: path.to_path_buf(),
        source,
    })?;
    let image = decoded.to_rgba8();
    LoadedImage::from_rgba(image.width(), image.height(), image.into_raw()).ok_or_else(|| {
        AssetLoadError::EmptyImage {
            path: path.to_path_buf(),
        }
    })
}

/// Which lifetime a load belongs to. `Batch` loads are dropped once the
/// loader moves on to another batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadScope {
    Persistent,
    Batch(u64),
}

#[derive(Debug)]
pub struct AssetLoadEvent {
    pub scope: LoadScope,
    pub locator: String,
    pub result: Result<Arc<LoadedImage>, AssetLoadError>,
}

#[derive(Debug)]
struct LoadJob {
    scope: LoadScope,
    locator: String,
}

/// Fixed pool of decode threads. Results come back in completion order and
/// are collected by `drain` on the caller's thread.
pub struct AssetLoader {
    job_sender: Option<Sender<LoadJob>>,
    event_receiver: Receiver<AssetLoadEvent>,
    live_batch: Arc<AtomicU64>,
    workers: Vec<JoinHandle<()>>,
}

impl AssetLoader {
    pub fn new(asset_root: PathBuf, worker_count: usize) -> io::Result<Self> {
        let (job_sender, job_receiver) = mpsc::channel::<LoadJob>();
        let (event_sender, event_receiver) = mpsc::channel::<AssetLoadEvent>();
        let job_receiver = Arc::new(Mutex::new(job_receiver));
        let live_batch = Arc::new(AtomicU64::new(NO_LIVE_BATCH));

        let mut workers = Vec::new();
        for index in 0..worker_count.max(1) {
            let worker = Worker {
                asset_root: asset_root.clone(),
                jobs: Arc::clone(&job_receiver),
                events: event_sender.clone(),
                live_batch: Arc::clone(&live_batch),
            };
            let handle = thread::Builder::new()
                .name(format!("asset-loader-{index}"))
                .spawn(move || worker.run())?;
            workers.push(handle);
        }

        Ok(Self {
            job_sender: Some(job_sender),
            event_receiver,
            live_batch,
            workers,
        })
    }

    /// Makes `batch` the only live batch. Batch ids must be non-zero.
    pub fn begin_batch(&self, batch: u64) {
        debug_assert_ne!(batch, NO_LIVE_BATCH);
        self.live_batch.store(batch, Ordering::SeqCst);
    }

    pub fn retire_batches(&self) {
        self.live_batch.store(NO_LIVE_BATCH, Ordering::SeqCst);
    }

    pub fn is_live(&self, scope: LoadScope) -> bool {
        scope_is_live(scope, self.live_batch.load(Ordering::SeqCst))
    }

    pub fn request(&self, scope: LoadScope, locator: impl Into<String>) -> Result<(), AssetLoadError> {
        let sender = self
            .job_sender
            .as_ref()
            .ok_or(AssetLoadError::WorkersGone)?;
        sender
            .send(LoadJob {
                scope,
                locator: locator.into(),
            })
            .map_err(|_| AssetLoadError::WorkersGone)
    }

    /// Non-blocking. Returns finished loads in completion order, minus any
    /// that belong to a retired batch.
    pub fn drain(&self) -> Vec<AssetLoadEvent> {
        let mut events = Vec::new();
        loop {
            match self.event_receiver.try_recv() {
                Ok(event) => {
                    if self.is_live(event.scope) {
                        events.push(event);
                    } else {
                        debug!(
                            locator = event.locator.as_str(),
                            scope = ?event.scope,
                            "asset_load_discarded_stale"
                        );
                    }
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        events
    }
}

impl Drop for AssetLoader {
    fn drop(&mut self) {
        self.retire_batches();
        self.job_sender = None;
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                warn!("asset loader worker panicked");
            }
        }
    }
}

fn scope_is_live(scope: LoadScope, live_batch: u64) -> bool {
    match scope {
        LoadScope::Persistent => true,
        LoadScope::Batch(batch) => batch != NO_LIVE_BATCH && batch == live_batch,
    }
}

struct Worker {
    asset_root: PathBuf,
    jobs: Arc<Mutex<Receiver<LoadJob>>>,
    events: Sender<AssetLoadEvent>,
    live_batch: Arc<AtomicU64>,
}

impl Worker {
    fn run(self) {
        loop {
            let next = {
                let receiver = match self.jobs.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                receiver.recv()
            };
            let Ok(job) = next else {
                return;
            };

            if !scope_is_live(job.scope, self.live_batch.load(Ordering::SeqCst)) {
                debug!(
                    locator = job.locator.as_str(),
                    scope = ?job.scope,
                    "asset_load_skipped_stale"
                );
                continue;
            }

            let result = resolve_asset_path(&self.asset_root, &job.locator)
                .map_err(AssetLoadError::from)
                .and_then(|path| load_image_rgba(&path))
                .map(Arc::new);
            let event = AssetLoadEvent {
                scope: job.scope,
                locator: job.locator,
                result,
            };
            if self.events.send(event).is_err() {
                return;
            }
        }
    }
}
