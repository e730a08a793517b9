use std::sync::{Mutex, OnceLock};

type DownloadCallback = Box<dyn Fn(u64, u64) + Send + 'static>;

static DOWNLOAD_PROGRESS_CB: OnceLock<Mutex<Option<DownloadCallback>>> = OnceLock::new();

/// Install the process-wide model download progress callback, replacing any
/// previous one.
pub fn set_download_progress_callback(cb: impl Fn(u64, u64) + Send + 'static) {
    let slot = DOWNLOAD_PROGRESS_CB.get_or_init(|| Mutex::new(None));
    if let Ok(mut g) = slot.lock() {
        *g = Some(Box::new(cb));
    }
}

pub fn emit_download_progress(done: u64, total: u64) {
    if let Some(m) = DOWNLOAD_PROGRESS_CB.get() {
        if let Ok(g) = m.lock() {
            if let Some(cb) = &*g {
                cb(done, total);
            }
        }
    }
}
