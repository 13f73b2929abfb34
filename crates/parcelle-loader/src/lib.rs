//! Progressive loader
//!
//! Generic runner for a set of named zero-argument async tasks. Every task
//! starts in parallel; each one's status transitions independently to
//! success or error as it settles, so consumers can render partial results
//! while slower siblings are still in flight.
//!
//! Teardown is cooperative: [`ProgressiveLoader::abandon`] stops further
//! state writes but does not cancel in-flight work; a late result is simply
//! discarded. The same discard rule applies to results that were superseded
//! by a [`ProgressiveLoader::refresh`] while they were running.

#![warn(unreachable_pub)]
#![allow(missing_docs)]

use dashmap::DashMap;
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Status of one named task.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskState<T> {
    /// Registered, not yet started.
    Pending,
    /// Started, not yet settled.
    Loading,
    /// Settled with a value.
    Success(T),
    /// Settled with an error; any prior value for the key is gone.
    Error(String),
}

impl<T> TaskState<T> {
    /// Whether the task has settled (success or error).
    #[inline]
    #[must_use]
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Success(_) | Self::Error(_))
    }
}

type TaskFn<T> = Arc<dyn Fn() -> BoxFuture<'static, Result<T, String>> + Send + Sync>;

struct Inner<T> {
    tasks: DashMap<String, TaskFn<T>>,
    states: DashMap<String, TaskState<T>>,
    generations: DashMap<String, u64>,
    alive: AtomicBool,
    notify: Notify,
}

/// Concurrent named-task runner with per-task status tracking.
///
/// Cheap to clone; clones share the same task set and state map.
pub struct ProgressiveLoader<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for ProgressiveLoader<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for ProgressiveLoader<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ProgressiveLoader<T>
where
    T: Clone + Send + Sync + 'static,
{
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                tasks: DashMap::new(),
                states: DashMap::new(),
                generations: DashMap::new(),
                alive: AtomicBool::new(true),
                notify: Notify::new(),
            }),
        }
    }

    /// Register a named task. Its status starts as pending until
    /// [`Self::start`] runs it.
    pub fn register<F, Fut>(&self, key: impl Into<String>, task: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, String>> + Send + 'static,
    {
        let key = key.into();
        let boxed: TaskFn<T> = Arc::new(move || {
            let future: BoxFuture<'static, Result<T, String>> = Box::pin(task());
            future
        });
        self.inner.tasks.insert(key.clone(), boxed);
        self.inner.states.insert(key.clone(), TaskState::Pending);
        self.inner.generations.insert(key, 0);
    }

    /// Start every registered task in parallel. All statuses flip to loading
    /// before any task can settle.
    pub fn start(&self) {
        let keys: Vec<String> = self
            .inner
            .tasks
            .iter()
            .map(|entry| entry.key().clone())
            .collect();

        let mut launches = Vec::with_capacity(keys.len());
        for key in keys {
            launches.push(self.prepare_run(&key));
        }
        for launch in launches.into_iter().flatten() {
            launch();
        }
    }

    /// Re-run exactly one task: status back to loading, prior error cleared,
    /// any still-running prior attempt's result discarded.
    ///
    /// Returns false for an unknown key.
    pub fn refresh(&self, key: &str) -> bool {
        match self.prepare_run(key) {
            Some(launch) => {
                launch();
                true
            }
            None => false,
        }
    }

    /// Re-run every registered task.
    pub fn refresh_all(&self) {
        self.start();
    }

    /// Current status of a task.
    #[must_use]
    pub fn state(&self, key: &str) -> Option<TaskState<T>> {
        self.inner.states.get(key).map(|state| state.clone())
    }

    /// True only when every registered task has settled.
    #[must_use]
    pub fn is_all_complete(&self) -> bool {
        !self.inner.states.is_empty()
            && self
                .inner
                .states
                .iter()
                .all(|entry| entry.value().is_settled())
    }

    /// Stop writing state. In-flight work keeps running; its results are
    /// discarded.
    pub fn abandon(&self) {
        self.inner.alive.store(false, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    /// Wait until every task has settled (or the loader is abandoned).
    pub async fn wait_all(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_all_complete() || !self.inner.alive.load(Ordering::SeqCst) {
                return;
            }
            notified.await;
        }
    }

    /// Flip the key to loading and bump its generation; return a closure
    /// that spawns the run. Splitting the two lets [`Self::start`] mark
    /// every task as loading before the first one is actually launched.
    fn prepare_run(&self, key: &str) -> Option<impl FnOnce()> {
        let task = self.inner.tasks.get(key).map(|entry| entry.value().clone())?;

        let generation = {
            let mut entry = self.inner.generations.entry(key.to_string()).or_insert(0);
            *entry += 1;
            *entry
        };
        self.inner
            .states
            .insert(key.to_string(), TaskState::Loading);

        let inner = Arc::clone(&self.inner);
        let key = key.to_string();
        Some(move || {
            tokio::spawn(async move {
                let outcome = (task.as_ref())().await;

                if !inner.alive.load(Ordering::SeqCst) {
                    tracing::debug!(task = %key, "loader abandoned; result discarded");
                    return;
                }
                let current = inner.generations.get(&key).map(|entry| *entry);
                if current != Some(generation) {
                    tracing::debug!(task = %key, "stale task result discarded");
                    return;
                }

                let state = match outcome {
                    Ok(value) => TaskState::Success(value),
                    Err(error) => {
                        tracing::debug!(task = %key, %error, "task settled with error");
                        TaskState::Error(error)
                    }
                };
                inner.states.insert(key, state);
                inner.notify.notify_waiters();
            });
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::sleep;

    async fn settle(loader: &ProgressiveLoader<String>, key: &str) {
        for _ in 0..200 {
            if loader.state(key).is_some_and(|s| s.is_settled()) {
                return;
            }
            sleep(Duration::from_millis(5)).await;
        }
        panic!("task '{key}' never settled");
    }

    #[tokio::test]
    async fn all_tasks_flip_to_loading_before_any_settles() {
        let loader = ProgressiveLoader::<String>::new();
        loader.register("fast", || async { Ok("a".to_string()) });
        loader.register("slow", || async {
            sleep(Duration::from_millis(200)).await;
            Ok("b".to_string())
        });

        loader.start();
        assert_eq!(loader.state("fast"), Some(TaskState::Loading));
        assert_eq!(loader.state("slow"), Some(TaskState::Loading));
    }

    #[tokio::test]
    async fn fast_success_lands_while_slow_failure_is_still_loading() {
        let loader = ProgressiveLoader::<String>::new();
        loader.register("a", || async { Ok("done".to_string()) });
        loader.register("b", || async {
            sleep(Duration::from_millis(300)).await;
            Err("boom".to_string())
        });

        loader.start();
        settle(&loader, "a").await;

        assert_eq!(loader.state("a"), Some(TaskState::Success("done".to_string())));
        assert_eq!(loader.state("b"), Some(TaskState::Loading));
        assert!(!loader.is_all_complete());

        loader.wait_all().await;
        assert_eq!(loader.state("b"), Some(TaskState::Error("boom".to_string())));
        assert!(loader.is_all_complete());
    }

    #[tokio::test]
    async fn refresh_transitions_back_through_loading() {
        let loader = ProgressiveLoader::<String>::new();
        loader.register("b", || async { Err("first failure".to_string()) });

        loader.start();
        loader.wait_all().await;
        assert_eq!(
            loader.state("b"),
            Some(TaskState::Error("first failure".to_string()))
        );

        assert!(loader.refresh("b"));
        // Error cleared immediately, before the new attempt settles.
        let state = loader.state("b").unwrap();
        assert!(matches!(state, TaskState::Loading | TaskState::Error(_)));

        loader.wait_all().await;
        assert!(loader.state("b").unwrap().is_settled());
    }

    #[tokio::test]
    async fn refresh_unknown_key_is_rejected() {
        let loader = ProgressiveLoader::<String>::new();
        loader.register("a", || async { Ok("x".to_string()) });
        assert!(!loader.refresh("missing"));
    }

    #[tokio::test]
    async fn abandoned_loader_discards_results() {
        let loader = ProgressiveLoader::<String>::new();
        loader.register("slow", || async {
            sleep(Duration::from_millis(50)).await;
            Ok("late".to_string())
        });

        loader.start();
        loader.abandon();
        sleep(Duration::from_millis(150)).await;

        assert_eq!(loader.state("slow"), Some(TaskState::Loading));
    }

    #[tokio::test]
    async fn stale_result_after_refresh_is_discarded() {
        let loader = ProgressiveLoader::<String>::new();
        loader.register("t", || async {
            sleep(Duration::from_millis(80)).await;
            Ok("value".to_string())
        });

        loader.start();
        // Supersede the first run before it settles; only the second run's
        // result may land.
        assert!(loader.refresh("t"));
        loader.wait_all().await;

        assert_eq!(loader.state("t"), Some(TaskState::Success("value".to_string())));
        assert!(loader.is_all_complete());
    }

    #[tokio::test]
    async fn empty_loader_is_never_complete() {
        let loader = ProgressiveLoader::<String>::new();
        assert!(!loader.is_all_complete());
    }
}
