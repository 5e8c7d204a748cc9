// SPDX-License-Identifier: Apache-2.0

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{error, info};

/// Sets the pool-wide shutdown flag. Owned by the supervisor alone.
#[derive(Debug, Default)]
pub struct ShutdownTrigger {
    flag: Arc<AtomicBool>,
}

impl ShutdownTrigger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn token(&self) -> ShutdownToken {
        ShutdownToken {
            flag: Arc::clone(&self.flag),
        }
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Read-only view of the shutdown flag handed to each worker.
#[derive(Debug, Clone)]
pub struct ShutdownToken {
    flag: Arc<AtomicBool>,
}

impl ShutdownToken {
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Sleeps up to `duration`, returning early once shutdown is triggered.
    /// Returns whether shutdown was observed.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_triggered() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            thread::sleep((deadline - now).min(Duration::from_millis(50)));
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownCause {
    /// SIGTERM/SIGINT or another external stop request.
    Signal,
    /// A worker thread ended on its own, normally by panicking.
    WorkerExited { worker: String, panicked: bool },
}

impl ShutdownCause {
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Signal => 0,
            Self::WorkerExited { .. } => 1,
        }
    }
}

/// A fixed set of named worker threads sharing one shutdown flag.
pub struct WorkerPool {
    trigger: ShutdownTrigger,
    workers: Vec<(String, JoinHandle<()>)>,
}

impl WorkerPool {
    /// Starts `count` threads named `sqc-worker-{index}`, each running the
    /// body `make_body` builds for it.
    pub fn spawn<F, B>(count: usize, mut make_body: F) -> io::Result<Self>
    where
        F: FnMut(usize, ShutdownToken) -> B,
        B: FnOnce() + Send + 'static,
    {
        let trigger = ShutdownTrigger::new();
        let mut workers = Vec::with_capacity(count);
        for index in 0..count {
            let name = format!("sqc-worker-{index}");
            let body = make_body(index, trigger.token());
            match thread::Builder::new().name(name.clone()).spawn(body) {
                Ok(handle) => workers.push((name, handle)),
                Err(err) => {
                    trigger.trigger();
                    for (_, handle) in workers {
                        let _ = handle.join();
                    }
                    return Err(err);
                }
            }
        }
        Ok(Self { trigger, workers })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Blocks until `external_stop` is set or a worker thread ends, then
    /// shuts the whole pool down and joins every worker.
    pub fn supervise(self, external_stop: &AtomicBool, poll_interval: Duration) -> ShutdownCause {
        let exited = loop {
            if external_stop.load(Ordering::SeqCst) {
                break None;
            }
            if let Some((name, _)) = self.workers.iter().find(|(_, h)| h.is_finished()) {
                break Some(name.clone());
            }
            thread::sleep(poll_interval);
        };

        match &exited {
            None => info!("shutdown requested, waiting for workers to finish"),
            Some(name) => error!(worker = %name, "worker stopped unexpectedly, shutting down"),
        }
        self.trigger.trigger();

        let mut exited_panicked = false;
        for (name, handle) in self.workers {
            let panicked = handle.join().is_err();
            if panicked {
                error!(worker = %name, "worker panicked");
            }
            if exited.as_deref() == Some(name.as_str()) {
                exited_panicked = panicked;
            }
        }
        info!("all workers stopped");

        match exited {
            None => ShutdownCause::Signal,
            Some(worker) => ShutdownCause::WorkerExited {
                worker,
                panicked: exited_panicked,
            },
        }
    }
}
