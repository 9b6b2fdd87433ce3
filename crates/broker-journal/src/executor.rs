// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mqcore contributors

//! The single-thread write executor.
//!
//! Every physical write and every completion callback for every file owned
//! by a factory runs on this one dedicated thread, so callbacks for a given
//! file are always invoked in submission order. Mirrors the dedicated
//! current-thread tokio runtime this crate's sibling transport uses for its
//! I/O thread, scaled down to a single mpsc command loop instead of a full
//! async transport.

use std::fs::File;
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::{Arc, Mutex as StdMutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::error::JournalError;
use crate::listener::IoCriticalErrorListener;

/// Invoked once a write job completes, with the outcome shared across every
/// coalesced caller as an [`Arc`] since [`std::io::Error`] is not `Clone`.
pub type WriteCallback = Box<dyn FnOnce(Result<(), Arc<JournalError>>) + Send>;

pub(crate) enum Job {
    Write {
        file: Arc<StdMutex<File>>,
        path: PathBuf,
        bytes: Vec<u8>,
        sync: bool,
        callbacks: Vec<WriteCallback>,
    },
    Shutdown,
}

/// Runs [`Job`]s on a dedicated OS thread backed by a single-threaded tokio
/// runtime, so `stop` can still use async-friendly primitives without
/// pulling in a multi-thread pool for what is, physically, one writer.
pub(crate) struct WriteExecutor {
    tx: tokio::sync::mpsc::UnboundedSender<Job>,
    thread: Option<JoinHandle<()>>,
}

impl WriteExecutor {
    pub(crate) fn spawn(critical_listener: Option<Arc<dyn IoCriticalErrorListener>>) -> Self {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

        let thread = thread::Builder::new()
            .name("broker-journal-writer".to_string())
            .spawn(move || Self::run(rx, critical_listener))
            .expect("failed to spawn write executor thread");

        Self {
            tx,
            thread: Some(thread),
        }
    }

    fn run(
        mut rx: tokio::sync::mpsc::UnboundedReceiver<Job>,
        critical_listener: Option<Arc<dyn IoCriticalErrorListener>>,
    ) {
        let rt = match tokio::runtime::Builder::new_current_thread().build() {
            Ok(rt) => rt,
            Err(e) => {
                tracing::error!(error = %e, "failed to build write executor runtime");
                return;
            }
        };

        rt.block_on(async move {
            while let Some(job) = rx.recv().await {
                match job {
                    Job::Write {
                        file,
                        path,
                        bytes,
                        sync,
                        callbacks,
                    } => {
                        let result = Self::perform_write(&file, &bytes, sync);
                        if let Err(e) = &result {
                            if let Some(listener) = &critical_listener {
                                listener.on_io_error(e, "journal write failed", &path);
                            }
                        }
                        let shared = result.map_err(|e| Arc::new(JournalError::Io(e)));
                        for callback in callbacks {
                            callback(shared.clone());
                        }
                    }
                    Job::Shutdown => break,
                }
            }
        });
    }

    pub(crate) fn submit(&self, job: Job) {
        // Send fails only once the executor thread has already exited;
        // there is nothing left to hand the job to.
        let _ = self.tx.send(job);
    }

    /// Request shutdown and wait up to `timeout` for the executor thread to
    /// drain its queue and exit. An overrun is logged, not fatal.
    pub(crate) fn stop(&mut self, timeout: Duration) {
        self.submit(Job::Shutdown);
        let Some(thread) = self.thread.take() else {
            return;
        };
        let (done_tx, done_rx) = std::sync::mpsc::channel();
        thread::spawn(move || {
            let _ = thread.join();
            let _ = done_tx.send(());
        });
        if done_rx.recv_timeout(timeout).is_err() {
            tracing::warn!(?timeout, "write executor did not stop within timeout");
        }
    }

    fn perform_write(
        file: &StdMutex<File>,
        bytes: &[u8],
        sync: bool,
    ) -> Result<(), std::io::Error> {
        let mut guard = match file.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.write_all(bytes)?;
        if sync {
            guard.sync_data()?;
        }
        Ok(())
    }
}

impl Drop for WriteExecutor {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.stop(Duration::from_secs(0));
        }
    }
}
