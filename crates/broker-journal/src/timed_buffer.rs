// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mqcore contributors

//! The write-coalescing buffer attached to a single active file.

use std::fs::File;
use std::path::PathBuf;
use std::sync::{Arc, Mutex as StdMutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::error::JournalError;
use crate::executor::{Job, WriteCallback, WriteExecutor};

/// How often the timer thread wakes to check whether the flush timeout has
/// elapsed. Kept well under any sane `flush_timeout` so the real deadline is
/// never missed by more than this much.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

struct Pending {
    bytes: Vec<u8>,
    callbacks: Vec<WriteCallback>,
    queued_since: Option<Instant>,
}

impl Pending {
    fn new() -> Self {
        Self {
            bytes: Vec::new(),
            callbacks: Vec::new(),
            queued_since: None,
        }
    }

    fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    fn take(&mut self) -> (Vec<u8>, Vec<WriteCallback>) {
        self.queued_since = None;
        (std::mem::take(&mut self.bytes), std::mem::take(&mut self.callbacks))
    }
}

/// Coalesces writes for one active file, flushing when the buffered bytes
/// reach `buffer_size` or `flush_timeout` elapses since the first queued
/// write, whichever comes first.
pub struct TimedBuffer {
    pending: Arc<StdMutex<Pending>>,
    file: Arc<StdMutex<File>>,
    path: PathBuf,
    executor: Arc<WriteExecutor>,
    buffer_size: usize,
    flush_timeout: Duration,
    timer: Option<JoinHandle<()>>,
    shutdown_tx: Option<std::sync::mpsc::Sender<()>>,
}

impl TimedBuffer {
    pub(crate) fn start(
        file: Arc<StdMutex<File>>,
        path: PathBuf,
        executor: Arc<WriteExecutor>,
        buffer_size: usize,
        flush_timeout: Duration,
    ) -> Self {
        let pending = Arc::new(StdMutex::new(Pending::new()));
        let (shutdown_tx, shutdown_rx) = std::sync::mpsc::channel();

        let timer = {
            let pending = Arc::clone(&pending);
            let file = Arc::clone(&file);
            let executor = Arc::clone(&executor);
            let path = path.clone();
            thread::Builder::new()
                .name("broker-journal-timer".to_string())
                .spawn(move || loop {
                    match shutdown_rx.recv_timeout(POLL_INTERVAL) {
                        Ok(()) | Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => return,
                        Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {
                            let mut guard = match pending.lock() {
                                Ok(g) => g,
                                Err(p) => p.into_inner(),
                            };
                            let elapsed = guard
                                .queued_since
                                .map(|since| since.elapsed() >= flush_timeout)
                                .unwrap_or(false);
                            if elapsed && !guard.is_empty() {
                                let (bytes, callbacks) = guard.take();
                                drop(guard);
                                executor.submit(Job::Write {
                                    file: Arc::clone(&file),
                                    path: path.clone(),
                                    bytes,
                                    sync: false,
                                    callbacks,
                                });
                            }
                        }
                    }
                })
                .expect("failed to spawn timed buffer timer thread")
        };

        Self {
            pending,
            file,
            path,
            executor,
            buffer_size,
            flush_timeout,
            timer: Some(timer),
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Enqueue `bytes` with an optional completion `callback`. Flushes
    /// immediately, inline, if this brings the buffer to `buffer_size` or
    /// beyond.
    pub fn enqueue(&self, bytes: Vec<u8>, sync: bool, callback: Option<WriteCallback>) {
        let mut guard = match self.pending.lock() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        };
        if guard.queued_since.is_none() {
            guard.queued_since = Some(Instant::now());
        }
        guard.bytes.extend_from_slice(&bytes);
        if let Some(cb) = callback {
            guard.callbacks.push(cb);
        }

        if guard.bytes.len() >= self.buffer_size {
            let (bytes, callbacks) = guard.take();
            drop(guard);
            self.executor.submit(Job::Write {
                file: Arc::clone(&self.file),
                path: self.path.clone(),
                bytes,
                sync,
                callbacks,
            });
        }
    }

    /// Flush any pending bytes and block until that write has completed.
    /// Used by [`crate::factory`] before detaching this buffer from its
    /// file, so no bytes are lost to a file no longer under coalescing.
    pub fn flush_and_wait(&self) -> Result<(), JournalError> {
        let (bytes, mut callbacks) = {
            let mut guard = match self.pending.lock() {
                Ok(g) => g,
                Err(p) => p.into_inner(),
            };
            if guard.is_empty() {
                return Ok(());
            }
            guard.take()
        };

        let (done_tx, done_rx) = std::sync::mpsc::channel();
        callbacks.push(Box::new(move |result| {
            let _ = done_tx.send(result);
        }));

        self.executor.submit(Job::Write {
            file: Arc::clone(&self.file),
            path: self.path.clone(),
            bytes,
            sync: true,
            callbacks,
        });

        match done_rx.recv() {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(JournalError::Io(std::io::Error::other(e.to_string()))),
            Err(_) => Err(JournalError::Interrupted),
        }
    }

    pub(crate) fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(timer) = self.timer.take() {
            let _ = timer.join();
        }
    }
}

impl Drop for TimedBuffer {
    fn drop(&mut self) {
        self.stop();
    }
}
