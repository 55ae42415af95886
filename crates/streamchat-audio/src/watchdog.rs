use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// No-data watchdog for the capture stream. The cpal callback feeds it
/// on every buffer; if nothing arrives within the timeout the capture
/// thread tears the stream down and walks the device candidates again.
#[derive(Clone)]
pub struct WatchdogTimer {
    timeout: Duration,
    last_feed: Arc<RwLock<Option<Instant>>>,
    triggered: Arc<AtomicBool>,
    handle: Arc<RwLock<Option<JoinHandle<()>>>>,
}

impl WatchdogTimer {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            last_feed: Arc::new(RwLock::new(None)),
            triggered: Arc::new(AtomicBool::new(false)),
            handle: Arc::new(RwLock::new(None)),
        }
    }

    pub fn start(&mut self, running: Arc<AtomicBool>) {
        let timeout = self.timeout;
        let last_feed = Arc::clone(&self.last_feed);
        let triggered = Arc::clone(&self.triggered);

        *last_feed.write() = Some(Instant::now());

        let handle = thread::spawn(move || {
            while running.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_secs(1));

                let now = Instant::now();
                let elapsed = last_feed.read().map(|t| now.duration_since(t));
                if let Some(elapsed) = elapsed {
                    if elapsed > timeout && !triggered.load(Ordering::SeqCst) {
                        tracing::error!("Watchdog timeout! No audio data for {:?}", elapsed);
                        triggered.store(true, Ordering::SeqCst);
                    }
                }
            }
        });

        *self.handle.write() = Some(handle);
    }

    pub fn feed(&self) {
        *self.last_feed.write() = Some(Instant::now());
        self.triggered.store(false, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    pub fn stop(&mut self) {
        // Relies on the shared running flag to end the thread; join if present.
        if let Some(handle) = self.handle.write().take() {
            let _ = handle.join();
        }
        self.triggered.store(false, Ordering::SeqCst);
        *self.last_feed.write() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feed_clears_trigger() {
        let wd = WatchdogTimer::new(Duration::from_secs(5));
        wd.triggered.store(true, Ordering::SeqCst);
        wd.feed();
        assert!(!wd.is_triggered());
        assert!(wd.last_feed.read().is_some());
    }
}
