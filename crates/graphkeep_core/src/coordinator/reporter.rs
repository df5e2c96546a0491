//! Debug-build store location reporter.

use log::debug;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::Duration;

/// Logs the store location on a fixed interval until dropped.
pub(crate) struct LocationReporter {
    stop: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl LocationReporter {
    pub(crate) fn start(location: String, interval: Duration) -> Self {
        debug!("event=store_location module=coordinator location={location}");
        let (stop, stopped) = mpsc::channel::<()>();
        let worker = std::thread::Builder::new()
            .name("graphkeep-store-location".to_string())
            .spawn(move || loop {
                match stopped.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        debug!("event=store_location module=coordinator location={location}");
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })
            .ok();
        Self {
            stop: Some(stop),
            worker,
        }
    }
}

impl Drop for LocationReporter {
    fn drop(&mut self) {
        drop(self.stop.take());
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
