//! Run group: peer tasks that live and die together.
//!
//! Each registered task pairs an `execute` future with an `interrupt`
//! callback. [`RunGroup::run`] drives every `execute` concurrently. The first
//! one to return (successfully or not) triggers the `interrupt` of every
//! other task exactly once; `run` then waits for all of them to return and
//! reports the result of the task that finished first.
//!
//! `run` consumes the group, so a group is never restarted.

use std::collections::HashMap;
use std::error::Error as StdError;
use std::future::Future;

use futures::future::BoxFuture;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, warn};

/// Boxed error returned by a task's `execute`
pub type TaskError = Box<dyn StdError + Send + Sync + 'static>;

/// Errors reported by [`RunGroup::run`]
#[derive(thiserror::Error, Debug)]
pub enum LifecycleError {
    /// A task's `execute` returned an error
    #[error("task {name} failed: {source}")]
    Task {
        name: &'static str,
        #[source]
        source: TaskError,
    },

    /// A task panicked or was aborted
    #[error("task {name} panicked")]
    Panicked { name: &'static str },
}

type Interrupt = Box<dyn FnOnce(Option<&LifecycleError>) + Send>;

struct Actor {
    name: &'static str,
    execute: BoxFuture<'static, Result<(), TaskError>>,
    interrupt: Interrupt,
}

/// Collection of tasks orchestrated together
#[derive(Default)]
pub struct RunGroup {
    actors: Vec<Actor>,
}

impl RunGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task.
    ///
    /// `interrupt` must make `execute` return promptly; it receives the error
    /// of the task that stopped first, if any.
    pub fn add<F, E, I>(&mut self, name: &'static str, execute: F, interrupt: I)
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<TaskError>,
        I: FnOnce(Option<&LifecycleError>) + Send + 'static,
    {
        self.actors.push(Actor {
            name,
            execute: Box::pin(async move { execute.await.map_err(Into::into) }),
            interrupt: Box::new(interrupt),
        });
    }

    /// Number of registered tasks
    pub fn len(&self) -> usize {
        self.actors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }

    /// Run every task until the first one exits, then interrupt the rest and
    /// wait for them.
    pub async fn run(self) -> Result<(), LifecycleError> {
        if self.actors.is_empty() {
            return Ok(());
        }

        let mut tasks = JoinSet::new();
        let mut interrupts: Vec<Option<Interrupt>> = Vec::new();
        let mut names: Vec<&'static str> = Vec::new();
        // Panicked tasks only report their task id
        let mut indexes = HashMap::new();
        for (index, actor) in self.actors.into_iter().enumerate() {
            let Actor {
                name,
                execute,
                interrupt,
            } = actor;
            interrupts.push(Some(interrupt));
            names.push(name);
            let handle = tasks.spawn(async move { (index, execute.await) }.in_current_span());
            indexes.insert(handle.id(), index);
        }
        debug!(tasks = interrupts.len(), "run group started");

        let name_of = |index: Option<usize>| {
            index
                .and_then(|i| names.get(i))
                .copied()
                .unwrap_or("unknown")
        };

        let (first, cause) = match tasks.join_next().await {
            Some(Ok((index, result))) => {
                let name = name_of(Some(index));
                (Some(index), result.map_err(|source| LifecycleError::Task { name, source }))
            }
            Some(Err(join_err)) => {
                let index = indexes.get(&join_err.id()).copied();
                let name = name_of(index);
                error!(task = name, error = %join_err, "run group task panicked");
                (index, Err(LifecycleError::Panicked { name }))
            }
            None => (None, Ok(())),
        };

        match &cause {
            Ok(()) => info!("run group task exited, interrupting the others"),
            Err(e) => warn!(error = %e, "run group task failed, interrupting the others"),
        }

        for (index, interrupt) in interrupts.iter_mut().enumerate() {
            if Some(index) == first {
                continue;
            }
            if let Some(interrupt) = interrupt.take() {
                debug!(task = name_of(Some(index)), "interrupting task");
                interrupt(cause.as_ref().err());
            }
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, Err(e))) => {
                    let name = name_of(Some(index));
                    warn!(task = name, error = %e, "task returned an error after interrupt");
                }
                Ok((_, Ok(()))) => {}
                Err(join_err) => {
                    let name = name_of(indexes.get(&join_err.id()).copied());
                    error!(task = name, error = %join_err, "task panicked after interrupt");
                }
            }
        }
        debug!("run group stopped");

        cause
    }
}

/// Register a task that waits for SIGINT/SIGTERM.
///
/// Its `execute` returns `Ok(())` both when a signal arrives and when it is
/// interrupted because another task exited first.
pub fn add_signal_handler(group: &mut RunGroup) {
    let exiting = CancellationToken::new();
    let interrupted = exiting.clone();
    group.add(
        "signal",
        async move {
            tokio::select! {
                signal = shutdown_signal() => info!(signal, "signal received"),
                _ = exiting.cancelled() => {}
            }
            Ok::<(), TaskError>(())
        },
        move |_| interrupted.cancel(),
    );
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
///
/// Note: Signal handler setup failures are fatal - the webhook cannot shut
/// down gracefully without them. Using expect() here is intentional.
#[allow(clippy::expect_used)]
async fn shutdown_signal() -> &'static str {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => "SIGINT",
        _ = terminate => "SIGTERM",
    }
}
