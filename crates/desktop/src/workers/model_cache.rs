use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use faceblur_core::detection::infrastructure::haar_cascade::HaarCascade;
use faceblur_core::shared::constants::{CASCADE_MODEL_NAME, CASCADE_MODEL_URL};
use faceblur_core::shared::model_resolver;

type CascadeResult = Result<Arc<HaarCascade>, String>;

/// Resolves and parses the face cascade once, in the background, at startup.
///
/// Workers wait on the slot; the UI peeks at it to report a failure early.
pub struct ModelCache {
    result: Mutex<Option<CascadeResult>>,
    ready: Condvar,
    progress: Mutex<(u64, u64)>,
}

impl ModelCache {
    pub fn new() -> Arc<Self> {
        let cache = Arc::new(Self {
            result: Mutex::new(None),
            ready: Condvar::new(),
            progress: Mutex::new((0, 0)),
        });

        let slot = cache.clone();
        thread::spawn(move || slot.resolve());

        cache
    }

    fn resolve(self: &Arc<Self>) {
        let progress_slot = self.clone();
        let result = model_resolver::resolve(
            CASCADE_MODEL_NAME,
            CASCADE_MODEL_URL,
            &model_resolver::default_bundled_dirs(),
            Some(Box::new(move |downloaded, total| {
                *progress_slot
                    .progress
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner) = (downloaded, total);
            })),
        )
        .map_err(|e| e.to_string())
        .and_then(|path| HaarCascade::load(&path).map_err(|e| e.to_string()))
        .map(Arc::new);

        if let Err(ref e) = result {
            log::error!("Face model unavailable: {e}");
        }
        *self.result.lock().unwrap_or_else(PoisonError::into_inner) = Some(result);
        self.ready.notify_all();
    }

    /// The result, if resolution has finished.
    pub fn peek(&self) -> Option<CascadeResult> {
        self.result
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Blocks until the cascade is ready. Calls `on_progress(downloaded, total)`
    /// while a download is running. Returns early if `cancelled` is set.
    pub fn wait(&self, on_progress: &dyn Fn(u64, u64), cancelled: &AtomicBool) -> CascadeResult {
        let mut guard = self.result.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if cancelled.load(Ordering::Relaxed) {
                return Err("Cancelled".into());
            }
            if let Some(ref result) = *guard {
                return result.clone();
            }
            if let Ok(progress) = self.progress.try_lock() {
                let (dl, total) = *progress;
                if total > 0 {
                    on_progress(dl, total);
                }
            }
            let (new_guard, _) = self
                .ready
                .wait_timeout(guard, Duration::from_millis(100))
                .unwrap_or_else(PoisonError::into_inner);
            guard = new_guard;
        }
    }
}
