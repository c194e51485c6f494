//! # Tixwatch Runtime
//!
//! Runtime implementation for tixwatch screens.
//!
//! This crate provides the [`Store`] that coordinates reducer execution and
//! effect handling.
//!
//! ## Core Components
//!
//! - **Store**: owns a screen's state and executes the effects its reducer returns
//! - **Effect Executor**: runs effect descriptions on tokio and feeds actions back
//! - **Effect Registry**: keyed cancellable effects (subscriptions, countdowns)
//!
//! ## Example
//!
//! ```ignore
//! use tixwatch_runtime::Store;
//!
//! let store = Store::new(initial_state, BookingScreen, environment);
//!
//! // Send an action
//! store.send(BookingScreenAction::Mount).await?;
//!
//! // Read state
//! let view = store.state(|s| s.view.clone()).await;
//! ```

use futures::future::{BoxFuture, join_all};
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tixwatch_core::{Effect, EffectId, Reducer};
use tokio::sync::{RwLock, broadcast};
use tokio::task::{AbortHandle, JoinHandle};

/// Error types for the Store runtime
pub mod error {
    use thiserror::Error;

    /// Errors that can occur during Store operations
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum StoreError {
        /// Store is shutting down and not accepting new actions
        ///
        /// Returned when `send()` is called after `shutdown()` or `close()`.
        #[error("Store is shutting down")]
        ShutdownInProgress,

        /// Shutdown timed out waiting for effects to complete
        #[error("Shutdown timed out with {0} effects still running")]
        ShutdownTimeout(usize),

        /// Timeout waiting for a matching action
        ///
        /// Returned by `send_and_wait_for` when the timeout expires before
        /// a matching action is received.
        #[error("Timeout waiting for action")]
        Timeout,

        /// Action broadcast channel closed
        #[error("Action broadcast channel closed")]
        ChannelClosed,
    }
}

pub use error::StoreError;

/// Decrements the global pending-effect counter when an effect task ends,
/// including when it is aborted.
struct PendingGuard(Arc<AtomicUsize>);

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A running cancellable effect.
struct Registration {
    generation: u64,
    abort: AbortHandle,
}

/// Registry of effects started through [`Effect::Cancellable`].
#[derive(Default)]
struct EffectRegistry {
    next_generation: AtomicU64,
    running: Mutex<HashMap<EffectId, Registration>>,
}

impl EffectRegistry {
    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<EffectId, Registration>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn cancel(&self, id: EffectId) -> bool {
        match self.lock().remove(&id) {
            Some(registration) => {
                registration.abort.abort();
                true
            },
            None => false,
        }
    }

    fn cancel_all(&self) -> usize {
        let drained: Vec<Registration> = self.lock().drain().map(|(_, r)| r).collect();
        for registration in &drained {
            registration.abort.abort();
        }
        drained.len()
    }

    fn finished(&self, id: EffectId, generation: u64) {
        let mut running = self.lock();
        if running.get(&id).is_some_and(|r| r.generation == generation) {
            running.remove(&id);
        }
    }

    fn ids(&self) -> Vec<EffectId> {
        let mut ids: Vec<EffectId> = self.lock().keys().copied().collect();
        ids.sort_by_key(EffectId::as_str);
        ids
    }
}

/// Store module - the runtime coordinator
pub mod store {
    use super::{
        Arc, AtomicBool, AtomicUsize, BoxFuture, Duration, Effect, EffectId, EffectRegistry,
        JoinHandle, Ordering, PendingGuard, Reducer, Registration, RwLock, StoreError,
        StreamExt, broadcast, join_all,
    };

    /// The Store - runtime coordinator for a reducer
    ///
    /// The Store manages:
    /// 1. State (behind `RwLock` for concurrent access)
    /// 2. Reducer (screen logic)
    /// 3. Environment (injected dependencies)
    /// 4. Effect execution (with feedback loop)
    ///
    /// Cloning a Store is cheap; clones share state, registry and broadcast.
    pub struct Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
    {
        state: Arc<RwLock<S>>,
        reducer: Arc<R>,
        environment: Arc<E>,
        registry: Arc<EffectRegistry>,
        shutdown: Arc<AtomicBool>,
        pending_effects: Arc<AtomicUsize>,
        /// Every action produced by an effect is broadcast here before it is
        /// fed back into the reducer.
        action_broadcast: broadcast::Sender<A>,
    }

    impl<S, A, E, R> Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Send + Sync + 'static,
        A: Send + Clone + 'static,
        S: Send + Sync + 'static,
        E: Send + Sync + 'static,
    {
        /// Create a new store with initial state, reducer, and environment
        ///
        /// The action broadcast buffers 64 actions; slower observers lag.
        #[must_use]
        pub fn new(initial_state: S, reducer: R, environment: E) -> Self {
            Self::with_broadcast_capacity(initial_state, reducer, environment, 64)
        }

        /// Create a new Store with custom action broadcast capacity
        #[must_use]
        pub fn with_broadcast_capacity(
            initial_state: S,
            reducer: R,
            environment: E,
            capacity: usize,
        ) -> Self {
            let (action_broadcast, _) = broadcast::channel(capacity);

            Self {
                state: Arc::new(RwLock::new(initial_state)),
                reducer: Arc::new(reducer),
                environment: Arc::new(environment),
                registry: Arc::new(EffectRegistry::default()),
                shutdown: Arc::new(AtomicBool::new(false)),
                pending_effects: Arc::new(AtomicUsize::new(0)),
                action_broadcast,
            }
        }

        /// Send an action to the store
        ///
        /// 1. Acquires write lock on state
        /// 2. Calls reducer with (state, action, environment)
        /// 3. Starts the returned effects; `send()` does not wait for them
        ///
        /// `Cancel` and top-level `Cancellable` effects are applied before
        /// `send()` returns, in the order the reducer returned them, so a
        /// reducer can replace a running effect within a single action.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownInProgress`] if the store is shutting down.
        #[tracing::instrument(skip(self, action), name = "store_send")]
        pub async fn send(&self, action: A) -> Result<(), StoreError> {
            if self.shutdown.load(Ordering::Acquire) {
                tracing::debug!("Rejected action: store is shutting down");
                metrics::counter!("store.shutdown.rejected_actions").increment(1);
                return Err(StoreError::ShutdownInProgress);
            }

            metrics::counter!("store.actions.total").increment(1);

            let effects = {
                let mut state = self.state.write().await;
                self.reducer.reduce(&mut state, action, &self.environment)
            };

            tracing::trace!("Reducer returned {} effects", effects.len());
            for effect in effects {
                self.start(effect);
            }

            Ok(())
        }

        /// Send an action and wait for a matching action produced by effects
        ///
        /// Subscribes to the action broadcast before sending, so a fast effect
        /// cannot slip past.
        ///
        /// # Errors
        ///
        /// - [`StoreError::Timeout`]: no matching action within `timeout`
        /// - [`StoreError::ChannelClosed`]: broadcast closed
        /// - [`StoreError::ShutdownInProgress`]: store is shutting down
        pub async fn send_and_wait_for<F>(
            &self,
            action: A,
            predicate: F,
            timeout: Duration,
        ) -> Result<A, StoreError>
        where
            F: Fn(&A) -> bool,
        {
            let mut rx = self.action_broadcast.subscribe();
            self.send(action).await?;

            tokio::time::timeout(timeout, async {
                loop {
                    match rx.recv().await {
                        Ok(candidate) if predicate(&candidate) => return Ok(candidate),
                        Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {},
                        Err(broadcast::error::RecvError::Closed) => {
                            return Err(StoreError::ChannelClosed);
                        },
                    }
                }
            })
            .await
            .map_err(|_| StoreError::Timeout)?
        }

        /// Observe actions produced by effects
        ///
        /// Each action is broadcast once the reducer has applied it.
        #[must_use]
        pub fn subscribe_actions(&self) -> broadcast::Receiver<A> {
            self.action_broadcast.subscribe()
        }

        /// Read current state via a closure
        pub async fn state<F, T>(&self, f: F) -> T
        where
            F: FnOnce(&S) -> T,
        {
            let state = self.state.read().await;
            f(&state)
        }

        /// Ids of the cancellable effects currently running, sorted by name
        #[must_use]
        pub fn running_effects(&self) -> Vec<EffectId> {
            self.registry.ids()
        }

        /// Number of effect tasks that have not finished yet
        #[must_use]
        pub fn pending_effects(&self) -> usize {
            self.pending_effects.load(Ordering::Acquire)
        }

        /// Stop accepting actions and abort every cancellable effect
        ///
        /// Non-cancellable effects already in flight run to completion but
        /// the actions they produce are discarded.
        pub fn close(&self) {
            self.shutdown.store(true, Ordering::Release);
            let cancelled = self.registry.cancel_all();
            tracing::debug!(cancelled, "Store closed");
        }

        /// Graceful shutdown: close the store, then wait for in-flight effects
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownTimeout`] if effects are still running
        /// when `timeout` elapses.
        pub async fn shutdown(&self, timeout: Duration) -> Result<(), StoreError> {
            tracing::info!("Initiating graceful shutdown");
            metrics::counter!("store.shutdown.initiated").increment(1);
            self.close();

            let start = tokio::time::Instant::now();
            let poll_interval = Duration::from_millis(10);

            loop {
                let pending = self.pending_effects.load(Ordering::Acquire);
                if pending == 0 {
                    tracing::info!("All effects completed, shutdown successful");
                    return Ok(());
                }

                if start.elapsed() >= timeout {
                    tracing::error!(pending_effects = pending, "Shutdown timeout");
                    metrics::counter!("store.shutdown.timeout").increment(1);
                    return Err(StoreError::ShutdownTimeout(pending));
                }

                tokio::time::sleep(poll_interval).await;
            }
        }

        fn start(&self, effect: Effect<A>) {
            match effect {
                Effect::None => {},
                Effect::Cancel(id) => {
                    let cancelled = self.registry.cancel(id);
                    tracing::trace!(effect_id = %id, cancelled, "Effect::Cancel");
                },
                Effect::Cancellable { id, effect } => {
                    // The handle is not awaited; the registry owns the task.
                    drop(self.register(id, *effect));
                },
                other => {
                    drop(self.spawn(self.run(other)));
                },
            }
        }

        fn spawn(&self, task: BoxFuture<'static, ()>) -> JoinHandle<()> {
            self.pending_effects.fetch_add(1, Ordering::SeqCst);
            let guard = PendingGuard(Arc::clone(&self.pending_effects));
            tokio::spawn(async move {
                let _guard = guard;
                task.await;
            })
        }

        fn register(&self, id: EffectId, effect: Effect<A>) -> JoinHandle<()> {
            metrics::counter!("store.effects.registered").increment(1);
            let generation = self.registry.next_generation.fetch_add(1, Ordering::SeqCst);
            let registry = Arc::clone(&self.registry);
            let inner = self.run(effect);

            // Spawn while holding the registry lock so the task cannot finish
            // and deregister before it has been registered.
            let mut running = self.registry.lock();
            let handle = self.spawn(Box::pin(async move {
                inner.await;
                registry.finished(id, generation);
            }));
            let previous = running.insert(
                id,
                Registration {
                    generation,
                    abort: handle.abort_handle(),
                },
            );
            drop(running);

            if let Some(previous) = previous {
                tracing::trace!(effect_id = %id, "Replacing running effect");
                previous.abort.abort();
            }
            handle
        }

        fn run(&self, effect: Effect<A>) -> BoxFuture<'static, ()> {
            let store = self.clone();
            Box::pin(async move {
                match effect {
                    Effect::None => {},
                    Effect::Future(fut) => {
                        if let Some(action) = fut.await {
                            store.feedback(action).await;
                        }
                    },
                    Effect::Delay { duration, action } => {
                        tokio::time::sleep(duration).await;
                        store.feedback(*action).await;
                    },
                    Effect::Stream(mut stream) => {
                        while let Some(action) = stream.next().await {
                            store.feedback(action).await;
                        }
                    },
                    Effect::Parallel(effects) => {
                        join_all(effects.into_iter().map(|e| store.run(e))).await;
                    },
                    Effect::Sequential(effects) => {
                        for effect in effects {
                            store.run(effect).await;
                        }
                    },
                    Effect::Cancellable { id, effect } => {
                        // An aborted registration ends this branch too.
                        let _ = store.register(id, *effect).await;
                    },
                    Effect::Cancel(id) => {
                        store.registry.cancel(id);
                    },
                }
            })
        }

        /// Reduce an effect-produced action, then broadcast it
        ///
        /// Subscribers that read state after receiving the action see it applied.
        async fn feedback(&self, action: A) {
            match self.send(action.clone()).await {
                Ok(()) => {
                    let _ = self.action_broadcast.send(action);
                },
                Err(error) => {
                    tracing::trace!(%error, "Dropped action produced by effect");
                },
            }
        }
    }

    impl<S, A, E, R> Clone for Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
    {
        fn clone(&self) -> Self {
            Self {
                state: Arc::clone(&self.state),
                reducer: Arc::clone(&self.reducer),
                environment: Arc::clone(&self.environment),
                registry: Arc::clone(&self.registry),
                shutdown: Arc::clone(&self.shutdown),
                pending_effects: Arc::clone(&self.pending_effects),
                action_broadcast: self.action_broadcast.clone(),
            }
        }
    }
}

pub use store::Store;
