//! Booking status screen.
//!
//! A reducer that wires one booking's cache entry, its countdown and the
//! action dispatcher together. While mounted it holds two long-running
//! effects: the cache subscription under [`SUBSCRIPTION`] and the countdown
//! under [`COUNTDOWN`]. Each id runs at most one effect, so a new expiry
//! replaces the old timer instead of adding a second one. Unmounting
//! cancels both.

use crate::cache::{CacheSnapshot, FetchOptions};
use crate::countdown::{self, CountdownState};
use crate::dispatcher::{ActionDispatcher, PaymentOutcome};
use crate::error::DispatchError;
use crate::projector::{self, AllowedActions, StatusView, UiState, UserAction};
use crate::queries::BookingCaches;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tixwatch_api::{Amount, BookingId, BookingRecord, CancelReceipt, PaymentMethod, PaymentRecord};
use tixwatch_core::{Clock, Effect, EffectId, Reducer, SmallVec, smallvec};
use tixwatch_runtime::{Store, StoreError};

/// Cache subscription of the mounted booking
pub const SUBSCRIPTION: EffectId = EffectId::new("booking_screen.subscription");

/// Countdown ticks of the mounted booking
pub const COUNTDOWN: EffectId = EffectId::new("booking_screen.countdown");

/// Where the screen wants to go next
#[derive(Clone, Debug, PartialEq)]
pub enum Navigation {
    /// Show the e-wallet QR code
    QrPayment {
        /// Booking being paid
        booking_id: BookingId,
        /// Amount to encode
        amount: Amount,
    },
}

/// Booking screen state
#[derive(Clone, Debug)]
pub struct BookingScreenState {
    /// Booking on screen
    pub booking_id: BookingId,
    /// Latest cache snapshot
    pub snapshot: CacheSnapshot<BookingRecord>,
    /// Latest countdown value
    pub countdown: CountdownState,
    /// Projection of `snapshot` and `countdown`
    pub view: StatusView,
    /// Deadline the running countdown targets
    pub counting_to: Option<DateTime<Utc>>,
    /// Action waiting for the backend
    pub in_flight: Option<UserAction>,
    /// Outcome of the last action, backend messages unchanged
    pub notice: Option<String>,
    /// Pending navigation intent
    pub navigation: Option<Navigation>,
    /// Payment created by the last pay action
    pub last_payment: Option<PaymentRecord>,
    /// Between `Mount` and `Unmount`
    pub mounted: bool,
    /// Invalidation already requested for the current deadline
    pub expiry_sync_requested: bool,
}

impl BookingScreenState {
    /// Unmounted screen for `booking_id`
    #[must_use]
    pub fn new(booking_id: BookingId) -> Self {
        Self {
            booking_id,
            snapshot: CacheSnapshot::empty(),
            countdown: CountdownState::Expired,
            view: StatusView::default(),
            counting_to: None,
            in_flight: None,
            notice: None,
            navigation: None,
            last_payment: None,
            mounted: false,
            expiry_sync_requested: false,
        }
    }

    /// Actions to offer right now
    ///
    /// Empty while an action is in flight, so a second tap cannot submit
    /// the same intent twice.
    #[must_use]
    pub fn available_actions(&self) -> AllowedActions {
        if self.in_flight.is_some() {
            return SmallVec::new();
        }
        self.view.allowed.clone()
    }

    fn reproject(&mut self) {
        self.view = projector::project(&self.snapshot, &self.countdown);
    }
}

/// Booking screen actions
#[derive(Clone, Debug)]
pub enum BookingScreenAction {
    /// Screen became visible
    Mount,
    /// Screen went away
    Unmount,
    /// The cache entry changed
    SnapshotChanged(CacheSnapshot<BookingRecord>),
    /// Countdown tick for the deadline `target`
    Ticked {
        /// Deadline the tick was computed for
        target: DateTime<Utc>,
        /// Time left
        countdown: CountdownState,
    },
    /// Pull to refresh
    RefreshTapped,
    /// Cancel button
    CancelTapped,
    /// Pay button with the chosen method
    PayTapped(PaymentMethod),
    /// Cancel request finished
    CancelFinished(Result<CancelReceipt, DispatchError>),
    /// Payment request finished
    PaymentFinished(Result<PaymentOutcome, DispatchError>),
    /// The navigation intent was acted upon
    NavigationHandled,
}

/// Dependencies of the booking screen
#[derive(Clone)]
pub struct BookingScreenEnvironment {
    /// Shared caches
    pub caches: BookingCaches,
    /// Mutations
    pub dispatcher: ActionDispatcher,
    /// Wall clock for the countdown
    pub clock: Arc<dyn Clock>,
    /// Invalidate the booking once when the local countdown runs out
    pub refetch_on_expiry: bool,
}

impl BookingScreenEnvironment {
    /// Environment over the dispatcher's caches
    #[must_use]
    pub fn new(dispatcher: ActionDispatcher, clock: Arc<dyn Clock>, refetch_on_expiry: bool) -> Self {
        Self {
            caches: dispatcher.caches().clone(),
            dispatcher,
            clock,
            refetch_on_expiry,
        }
    }
}

/// Booking screen reducer
#[derive(Clone, Copy, Debug, Default)]
pub struct BookingScreen;

impl BookingScreen {
    fn mount(
        state: &mut BookingScreenState,
        env: &BookingScreenEnvironment,
    ) -> SmallVec<[Effect<BookingScreenAction>; 4]> {
        if state.mounted {
            return smallvec![Effect::None];
        }
        state.mounted = true;
        tracing::debug!(booking_id = %state.booking_id, "Booking screen mounted");

        let updates = env
            .caches
            .bookings
            .watch(&state.booking_id)
            .map(BookingScreenAction::SnapshotChanged);

        let cache = env.caches.bookings.clone();
        let id = state.booking_id.clone();
        smallvec![
            Effect::Stream(Box::pin(updates)).cancellable(SUBSCRIPTION),
            Effect::Future(Box::pin(async move {
                // Failures reach the screen through the subscription.
                if let Err(error) = cache.get(&id, FetchOptions::default()).await {
                    tracing::debug!(booking_id = %id, %error, "Initial fetch failed");
                }
                None
            })),
        ]
    }

    fn snapshot_changed(
        state: &mut BookingScreenState,
        snapshot: CacheSnapshot<BookingRecord>,
        env: &BookingScreenEnvironment,
    ) -> SmallVec<[Effect<BookingScreenAction>; 4]> {
        if !state.mounted {
            return smallvec![Effect::None];
        }
        let deadline = snapshot.value.as_ref().and_then(BookingRecord::active_expiry);
        state.snapshot = snapshot;

        let mut effects: SmallVec<[Effect<BookingScreenAction>; 4]> = SmallVec::new();
        if deadline != state.counting_to {
            state.counting_to = deadline;
            state.expiry_sync_requested = false;
            state.countdown = CountdownState::at(deadline, env.clock.now());
            effects.push(match deadline {
                Some(target) => {
                    tracing::debug!(booking_id = %state.booking_id, %target, "Countdown (re)started");
                    let ticks = countdown::ticks(Some(target), Arc::clone(&env.clock))
                        .map(move |countdown| BookingScreenAction::Ticked { target, countdown });
                    Effect::Stream(Box::pin(ticks)).cancellable(COUNTDOWN)
                },
                None => Effect::Cancel(COUNTDOWN),
            });
        }

        let before = state.view.state.clone();
        state.reproject();
        if state.view.state != before {
            tracing::info!(
                booking_id = %state.booking_id,
                from = %before,
                to = %state.view.state,
                "Booking view changed"
            );
        }
        effects
    }

    fn ticked(
        state: &mut BookingScreenState,
        target: DateTime<Utc>,
        countdown: CountdownState,
        env: &BookingScreenEnvironment,
    ) -> SmallVec<[Effect<BookingScreenAction>; 4]> {
        if !state.mounted || state.counting_to != Some(target) {
            return smallvec![Effect::None];
        }
        state.countdown = countdown;
        state.reproject();

        let needs_sync = state.view.state == UiState::ExpiredPendingSync
            && env.refetch_on_expiry
            && !state.expiry_sync_requested;
        if !needs_sync {
            return smallvec![Effect::None];
        }

        state.expiry_sync_requested = true;
        tracing::info!(booking_id = %state.booking_id, "Countdown expired, asking the server");
        let cache = env.caches.bookings.clone();
        let id = state.booking_id.clone();
        smallvec![Effect::Future(Box::pin(async move {
            cache.invalidate(&id);
            None
        }))]
    }

    fn start_action(
        state: &mut BookingScreenState,
        action: UserAction,
        env: &BookingScreenEnvironment,
        method: Option<PaymentMethod>,
    ) -> SmallVec<[Effect<BookingScreenAction>; 4]> {
        if !state.available_actions().contains(&action) {
            tracing::debug!(
                booking_id = %state.booking_id,
                ?action,
                in_flight = ?state.in_flight,
                "Ignoring unavailable action"
            );
            return smallvec![Effect::None];
        }
        state.in_flight = Some(action);
        state.notice = None;

        let dispatcher = env.dispatcher.clone();
        let id = state.booking_id.clone();
        let effect = match method {
            Some(method) => Effect::Future(Box::pin(async move {
                Some(BookingScreenAction::PaymentFinished(
                    dispatcher.initiate_payment(&id, method).await,
                ))
            })),
            None => Effect::Future(Box::pin(async move {
                Some(BookingScreenAction::CancelFinished(dispatcher.cancel(&id).await))
            })),
        };
        smallvec![effect]
    }
}

impl Reducer for BookingScreen {
    type State = BookingScreenState;
    type Action = BookingScreenAction;
    type Environment = BookingScreenEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            BookingScreenAction::Mount => Self::mount(state, env),
            BookingScreenAction::Unmount => {
                if !state.mounted {
                    return smallvec![Effect::None];
                }
                state.mounted = false;
                state.counting_to = None;
                tracing::debug!(booking_id = %state.booking_id, "Booking screen unmounted");
                smallvec![Effect::Cancel(SUBSCRIPTION), Effect::Cancel(COUNTDOWN)]
            },
            BookingScreenAction::SnapshotChanged(snapshot) => {
                Self::snapshot_changed(state, snapshot, env)
            },
            BookingScreenAction::Ticked { target, countdown } => {
                Self::ticked(state, target, countdown, env)
            },
            BookingScreenAction::RefreshTapped => {
                if !state.mounted {
                    return smallvec![Effect::None];
                }
                let cache = env.caches.bookings.clone();
                let id = state.booking_id.clone();
                smallvec![Effect::Future(Box::pin(async move {
                    if let Err(error) = cache.refetch(&id).await {
                        tracing::debug!(booking_id = %id, %error, "Refresh failed");
                    }
                    None
                }))]
            },
            BookingScreenAction::CancelTapped => {
                Self::start_action(state, UserAction::Cancel, env, None)
            },
            BookingScreenAction::PayTapped(method) => {
                Self::start_action(state, UserAction::Pay, env, Some(method))
            },
            BookingScreenAction::CancelFinished(result) => {
                state.in_flight = None;
                state.notice = Some(match result {
                    Ok(receipt) => receipt.message,
                    Err(error) => error.to_string(),
                });
                smallvec![Effect::None]
            },
            BookingScreenAction::PaymentFinished(result) => {
                state.in_flight = None;
                match result {
                    Ok(PaymentOutcome::QrPayment { booking_id, amount }) => {
                        state.navigation = Some(Navigation::QrPayment { booking_id, amount });
                    },
                    Ok(PaymentOutcome::Initiated(payment)) => {
                        state.notice = Some(format!("Payment {} is {:?}", payment.id, payment.status));
                        state.last_payment = Some(payment);
                    },
                    Err(error) => state.notice = Some(error.to_string()),
                }
                smallvec![Effect::None]
            },
            BookingScreenAction::NavigationHandled => {
                state.navigation = None;
                smallvec![Effect::None]
            },
        }
    }
}

/// Store running a booking screen
pub type BookingScreenStore =
    Store<BookingScreenState, BookingScreenAction, BookingScreenEnvironment, BookingScreen>;

/// A booking screen that stays mounted for the lifetime of this value
///
/// Dropping it closes the store, which stops the countdown and the cache
/// subscription however the screen goes away.
pub struct MountedScreen {
    store: BookingScreenStore,
}

impl MountedScreen {
    /// Create a store for `booking_id` and mount it
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store rejects the mount.
    pub async fn mount(
        booking_id: BookingId,
        env: BookingScreenEnvironment,
    ) -> Result<Self, StoreError> {
        let store = Store::new(BookingScreenState::new(booking_id), BookingScreen, env);
        store.send(BookingScreenAction::Mount).await?;
        Ok(Self { store })
    }

    /// The underlying store
    #[must_use]
    pub const fn store(&self) -> &BookingScreenStore {
        &self.store
    }

    /// Send an action to the screen
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] after unmount.
    pub async fn send(&self, action: BookingScreenAction) -> Result<(), StoreError> {
        self.store.send(action).await
    }

    /// Current projection
    pub async fn view(&self) -> StatusView {
        self.store.state(|state| state.view.clone()).await
    }

    /// Read the screen state
    pub async fn state<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&BookingScreenState) -> T,
    {
        self.store.state(f).await
    }

    /// Unmount and wait up to `timeout` for in-flight requests
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownTimeout`] if requests are still running.
    pub async fn unmount(self, timeout: Duration) -> Result<(), StoreError> {
        self.store.send(BookingScreenAction::Unmount).await?;
        self.store.shutdown(timeout).await
    }
}

impl Drop for MountedScreen {
    fn drop(&mut self) {
        self.store.close();
    }
}
