// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mqcore contributors

//! The sequential file factory: directory ownership, file lifecycle, and
//! the glue between [`TimedBuffer`]s and the [`WriteExecutor`].

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::path::PathBuf;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use crate::config::JournalConfig;
use crate::error::JournalError;
use crate::executor::{Job, WriteCallback, WriteExecutor};
use crate::listener::IoCriticalErrorListener;
use crate::timed_buffer::TimedBuffer;

/// Capability every sequential-file-backed journal implementation exposes.
///
/// The source models this as a class hierarchy (a base file-factory class
/// with async-callback and NIO-mapped subclasses); here it is a single
/// trait with one concrete implementation ([`BufferedSequentialFileFactory`])
/// rather than a family of backend structs, since this repository only
/// needs the callback-supporting path.
pub trait SequentialFileFactory: Send + Sync {
    /// Create the journal directory and any missing parents.
    fn create_dirs(&self) -> Result<(), JournalError>;

    /// File names in the journal directory ending in `.{extension}`.
    fn list_files(&self, extension: &str) -> Result<Vec<String>, JournalError>;

    /// Open (creating if absent) `name` under the journal directory.
    fn open_file(&self, name: &str) -> Result<(), JournalError>;

    /// Attach a timed, coalescing buffer to an already-open file.
    fn attach_buffer(&self, name: &str) -> Result<(), JournalError>;

    /// Flush and detach `name`'s buffer, if any. Pending bytes are flushed
    /// and awaited before the buffer is detached.
    fn deactivate_buffer(&self, name: &str) -> Result<(), JournalError>;

    /// Write `bytes` to `name`, through its buffer if one is attached.
    fn write(
        &self,
        name: &str,
        bytes: Vec<u8>,
        sync: bool,
        callback: Option<WriteCallback>,
    ) -> Result<(), JournalError>;

    /// Start the write executor (if callbacks are supported) and any
    /// already-attached buffers' timers. Idempotent.
    fn start(&self) -> Result<(), JournalError>;

    /// Stop all buffers and the write executor, awaiting the configured
    /// timeout. Idempotent.
    fn stop(&self) -> Result<(), JournalError>;
}

struct OpenFile {
    file: Arc<StdMutex<File>>,
    buffer: Option<TimedBuffer>,
}

/// The callback-supporting sequential file factory: owns a directory, a
/// single-thread write executor, and zero or more open files each
/// optionally backed by a [`TimedBuffer`].
pub struct BufferedSequentialFileFactory {
    config: JournalConfig,
    critical_listener: Option<Arc<dyn IoCriticalErrorListener>>,
    files: StdMutex<HashMap<String, OpenFile>>,
    executor: StdMutex<Option<Arc<WriteExecutor>>>,
}

impl BufferedSequentialFileFactory {
    /// A new factory over `config`'s directory. Does not touch the
    /// filesystem or start the write executor; call [`create_dirs`] and
    /// [`start`] explicitly.
    ///
    /// [`create_dirs`]: SequentialFileFactory::create_dirs
    /// [`start`]: SequentialFileFactory::start
    pub fn new(
        config: JournalConfig,
        critical_listener: Option<Arc<dyn IoCriticalErrorListener>>,
    ) -> Self {
        Self {
            config,
            critical_listener,
            files: StdMutex::new(HashMap::new()),
            executor: StdMutex::new(None),
        }
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.config.directory().join(name)
    }

    fn executor_handle(&self) -> Result<Arc<WriteExecutor>, JournalError> {
        let guard = match self.executor.lock() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        };
        guard
            .clone()
            .ok_or_else(|| JournalError::Io(std::io::Error::other("write executor not started")))
    }
}

impl SequentialFileFactory for BufferedSequentialFileFactory {
    fn create_dirs(&self) -> Result<(), JournalError> {
        std::fs::create_dir_all(self.config.directory())?;
        Ok(())
    }

    fn list_files(&self, extension: &str) -> Result<Vec<String>, JournalError> {
        let suffix = format!(".{extension}");
        let mut names = Vec::new();
        for entry in std::fs::read_dir(self.config.directory())? {
            let entry = entry?;
            if let Some(name) = entry.file_name().to_str() {
                if name.ends_with(&suffix) {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    fn open_file(&self, name: &str) -> Result<(), JournalError> {
        let path = self.path_for(name);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        let mut files = match self.files.lock() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        };
        files.insert(
            name.to_string(),
            OpenFile {
                file: Arc::new(StdMutex::new(file)),
                buffer: None,
            },
        );
        Ok(())
    }

    fn attach_buffer(&self, name: &str) -> Result<(), JournalError> {
        let executor = self.executor_handle()?;
        let path = self.path_for(name);
        let mut files = match self.files.lock() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        };
        let entry = files
            .get_mut(name)
            .ok_or_else(|| JournalError::UnknownFile(name.to_string()))?;
        entry.buffer = Some(TimedBuffer::start(
            Arc::clone(&entry.file),
            path,
            executor,
            self.config.buffer_size,
            self.config.flush_timeout,
        ));
        Ok(())
    }

    fn deactivate_buffer(&self, name: &str) -> Result<(), JournalError> {
        let mut files = match self.files.lock() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        };
        let entry = files
            .get_mut(name)
            .ok_or_else(|| JournalError::UnknownFile(name.to_string()))?;
        if let Some(mut buffer) = entry.buffer.take() {
            buffer.flush_and_wait()?;
            buffer.stop();
        }
        Ok(())
    }

    fn write(
        &self,
        name: &str,
        bytes: Vec<u8>,
        sync: bool,
        callback: Option<WriteCallback>,
    ) -> Result<(), JournalError> {
        let files = match self.files.lock() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        };
        let entry = files
            .get(name)
            .ok_or_else(|| JournalError::UnknownFile(name.to_string()))?;

        if let Some(buffer) = &entry.buffer {
            buffer.enqueue(bytes, sync, callback);
        } else {
            let executor = self.executor_handle()?;
            let mut callbacks = Vec::new();
            if let Some(cb) = callback {
                callbacks.push(cb);
            }
            executor.submit(Job::Write {
                file: Arc::clone(&entry.file),
                path: self.path_for(name),
                bytes,
                sync,
                callbacks,
            });
        }
        Ok(())
    }

    fn start(&self) -> Result<(), JournalError> {
        let mut guard = match self.executor.lock() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        };
        if guard.is_none() {
            *guard = Some(Arc::new(WriteExecutor::spawn(
                self.critical_listener.clone(),
            )));
            tracing::info!(dir = %self.config.directory().display(), "journal write executor started");
        }
        Ok(())
    }

    fn stop(&self) -> Result<(), JournalError> {
        {
            let mut files = match self.files.lock() {
                Ok(g) => g,
                Err(p) => p.into_inner(),
            };
            for entry in files.values_mut() {
                if let Some(buffer) = &entry.buffer {
                    let _ = buffer.flush_and_wait();
                }
                if let Some(mut buffer) = entry.buffer.take() {
                    buffer.stop();
                }
            }
        }

        let mut guard = match self.executor.lock() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        };
        if let Some(executor) = guard.take() {
            match Arc::try_unwrap(executor) {
                Ok(mut executor) => executor.stop(self.config.stop_timeout),
                Err(executor) => {
                    // Other Arc handles are still live (in-flight buffer
                    // flushes holding a clone); ask it to shut down anyway,
                    // the remaining clones just won't be able to submit
                    // further jobs.
                    executor.submit(Job::Shutdown);
                }
            }
            tracing::info!("journal write executor stopped");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn factory(dir: &std::path::Path) -> BufferedSequentialFileFactory {
        BufferedSequentialFileFactory::new(JournalConfig::new(dir), None)
    }

    #[test]
    fn create_dirs_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let journal_dir = dir.path().join("journal");
        let f = factory(&journal_dir);
        f.create_dirs().unwrap();
        f.create_dirs().unwrap();
        assert!(journal_dir.is_dir());
    }

    #[test]
    fn list_files_filters_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.dat"), b"x").unwrap();
        std::fs::write(dir.path().join("b.dat"), b"y").unwrap();
        std::fs::write(dir.path().join("c.txt"), b"z").unwrap();

        let f = factory(dir.path());
        let mut names = f.list_files("dat").unwrap();
        names.sort();
        assert_eq!(names, vec!["a.dat", "b.dat"]);
    }

    #[test]
    fn write_without_buffer_goes_straight_to_executor() {
        let dir = tempfile::tempdir().unwrap();
        let f = factory(dir.path());
        f.create_dirs().unwrap();
        f.start().unwrap();
        f.open_file("x.journal").unwrap();

        let done = Arc::new(Mutex::new(false));
        let done2 = Arc::clone(&done);
        f.write(
            "x.journal",
            b"hello".to_vec(),
            true,
            Some(Box::new(move |r| {
                assert!(r.is_ok());
                *done2.lock().unwrap() = true;
            })),
        )
        .unwrap();

        for _ in 0..200 {
            if *done.lock().unwrap() {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(*done.lock().unwrap());
        assert_eq!(std::fs::read(dir.path().join("x.journal")).unwrap(), b"hello");
        f.stop().unwrap();
    }

    #[test]
    fn buffered_write_coalesces_until_deactivate() {
        let dir = tempfile::tempdir().unwrap();
        let f = factory(dir.path());
        f.create_dirs().unwrap();
        f.start().unwrap();
        f.open_file("y.journal").unwrap();
        f.attach_buffer("y.journal").unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let calls2 = Arc::clone(&calls);
            f.write(
                "y.journal",
                b"ab".to_vec(),
                false,
                Some(Box::new(move |_| {
                    calls2.fetch_add(1, Ordering::SeqCst);
                })),
            )
            .unwrap();
        }

        f.deactivate_buffer("y.journal").unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(std::fs::read(dir.path().join("y.journal")).unwrap(), b"ababab");
        f.stop().unwrap();
    }

    #[test]
    fn unknown_file_write_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let f = factory(dir.path());
        f.create_dirs().unwrap();
        f.start().unwrap();
        let err = f.write("missing.journal", vec![1], false, None);
        assert!(matches!(err, Err(JournalError::UnknownFile(_))));
    }

    #[test]
    fn stop_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let f = factory(dir.path());
        f.create_dirs().unwrap();
        f.start().unwrap();
        f.stop().unwrap();
        f.stop().unwrap();
    }
}
