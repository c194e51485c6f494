//! End-to-end tests for the booking screen running on a Store
//!
//! A scripted backend, paused tokio time and a wall clock that follows it:
//! countdown ticks, polls and expiry syncs happen exactly when the test
//! advances time.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use std::sync::Arc;
use std::time::Duration;
use tixwatch::projector::UserAction;
use tixwatch::screen::{COUNTDOWN, SUBSCRIPTION};
use tixwatch::{
    ActionDispatcher, BookingCaches, BookingScreenAction, BookingScreenEnvironment, Config,
    MountedScreen, Navigation, SelectionStash, UiState,
};
use tixwatch_api::{ApiError, BookingBackend, BookingId, PaymentMethod};
use tixwatch_testing::helpers::{init_tracing, settle};
use tixwatch_testing::{BackendCall, MockBackend, TokioClock, fixtures};

struct Harness {
    backend: MockBackend,
    caches: BookingCaches,
    env: BookingScreenEnvironment,
}

fn harness(refetch_on_expiry: bool) -> Harness {
    init_tracing();
    let backend = MockBackend::new();
    let shared: Arc<dyn BookingBackend> = Arc::new(backend.clone());
    let caches = BookingCaches::new(Arc::clone(&shared), &Config::default().cache);
    let dispatcher = ActionDispatcher::new(shared, caches.clone(), SelectionStash::new());
    let clock = Arc::new(TokioClock::starting_at(fixtures::epoch()));
    Harness {
        backend,
        caches,
        env: BookingScreenEnvironment::new(dispatcher, clock, refetch_on_expiry),
    }
}

fn id() -> BookingId {
    BookingId::new("b1")
}

fn expiring_in(secs: i64) -> tixwatch_api::BookingRecord {
    fixtures::pending_booking("b1", fixtures::epoch() + chrono::Duration::seconds(secs))
}

async fn advance(secs: u64) {
    tokio::time::sleep(Duration::from_secs(secs)).await;
    settle().await;
}

fn remaining(state: &UiState) -> u64 {
    match state {
        UiState::ActiveCountdown { remaining } => remaining.as_secs(),
        other => panic!("expected an active countdown, got {other}"),
    }
}

#[tokio::test(start_paused = true)]
async fn counts_down_and_polls_while_pending() {
    let h = harness(true);
    h.backend.set_booking(expiring_in(120));

    let screen = MountedScreen::mount(id(), h.env).await.unwrap();
    settle().await;

    let view = screen.view().await;
    assert_eq!(remaining(&view.state), 120);
    assert!(view.allows(UserAction::Cancel));
    assert!(view.allows(UserAction::Pay));
    assert_eq!(screen.store().running_effects(), vec![COUNTDOWN, SUBSCRIPTION]);

    advance(3).await;
    assert_eq!(remaining(&screen.view().await.state), 117);
    assert_eq!(h.backend.booking_fetches(&id()), 1);

    advance(2).await;
    assert_eq!(h.backend.booking_fetches(&id()), 2);
    advance(5).await;
    assert_eq!(h.backend.booking_fetches(&id()), 3);
    assert_eq!(remaining(&screen.view().await.state), 110);
}

#[tokio::test(start_paused = true)]
async fn server_confirmation_stops_countdown_and_polling() {
    let h = harness(true);
    h.backend.push_booking(&id(), Ok(expiring_in(120)));
    h.backend.push_booking(&id(), Ok(fixtures::confirmed_booking("b1")));

    let screen = MountedScreen::mount(id(), h.env).await.unwrap();
    settle().await;
    advance(5).await;

    let view = screen.view().await;
    assert_eq!(view.state, UiState::Confirmed);
    assert!(view.allowed.is_empty());
    assert_eq!(screen.store().running_effects(), vec![SUBSCRIPTION]);

    advance(60).await;
    assert_eq!(h.backend.booking_fetches(&id()), 2);
    assert!(!h.caches.bookings.is_polling(&id()));
}

#[tokio::test(start_paused = true)]
async fn local_expiry_asks_the_server_right_away() {
    let h = harness(true);
    h.backend.push_booking(&id(), Ok(expiring_in(3)));
    h.backend.push_booking(&id(), Ok(fixtures::cancelled_booking("b1")));

    let screen = MountedScreen::mount(id(), h.env).await.unwrap();
    settle().await;
    assert_eq!(remaining(&screen.view().await.state), 3);

    // Expires at t=3, well before the t=5 poll.
    advance(3).await;
    assert_eq!(screen.view().await.state, UiState::Cancelled);
    assert_eq!(h.backend.booking_fetches(&id()), 2);
}

#[tokio::test(start_paused = true)]
async fn local_expiry_waits_for_poll_when_sync_is_off() {
    let h = harness(false);
    h.backend.push_booking(&id(), Ok(expiring_in(3)));
    h.backend.push_booking(&id(), Ok(fixtures::cancelled_booking("b1")));

    let screen = MountedScreen::mount(id(), h.env).await.unwrap();
    settle().await;

    advance(3).await;
    let view = screen.view().await;
    assert_eq!(view.state, UiState::ExpiredPendingSync);
    assert!(view.allowed.is_empty());
    assert_eq!(h.backend.booking_fetches(&id()), 1);

    advance(2).await;
    assert_eq!(screen.view().await.state, UiState::Cancelled);
}

#[tokio::test(start_paused = true)]
async fn new_deadline_restarts_countdown() {
    let h = harness(true);
    h.backend.push_booking(&id(), Ok(expiring_in(60)));
    h.backend.push_booking(&id(), Ok(expiring_in(600)));

    let screen = MountedScreen::mount(id(), h.env).await.unwrap();
    settle().await;
    advance(5).await;

    assert_eq!(remaining(&screen.view().await.state), 595);
    assert_eq!(screen.store().running_effects(), vec![COUNTDOWN, SUBSCRIPTION]);

    advance(1).await;
    assert_eq!(remaining(&screen.view().await.state), 594);
}

#[tokio::test(start_paused = true)]
async fn unmount_releases_timers_and_subscription() {
    let h = harness(true);
    h.backend.set_booking(expiring_in(120));

    let screen = MountedScreen::mount(id(), h.env).await.unwrap();
    settle().await;
    assert_eq!(h.caches.bookings.subscriber_count(&id()), 1);
    assert!(h.caches.bookings.is_polling(&id()));

    screen.unmount(Duration::from_secs(1)).await.unwrap();
    settle().await;

    assert_eq!(h.caches.bookings.subscriber_count(&id()), 0);
    assert!(!h.caches.bookings.is_polling(&id()));
    let fetches = h.backend.booking_fetches(&id());
    advance(60).await;
    assert_eq!(h.backend.booking_fetches(&id()), fetches);
}

#[tokio::test(start_paused = true)]
async fn dropping_the_screen_releases_timers() {
    let h = harness(true);
    h.backend.set_booking(expiring_in(120));

    let screen = MountedScreen::mount(id(), h.env).await.unwrap();
    settle().await;
    drop(screen);
    settle().await;

    assert_eq!(h.caches.bookings.subscriber_count(&id()), 0);
    assert!(!h.caches.bookings.is_polling(&id()));
}

#[tokio::test(start_paused = true)]
async fn missing_booking_shows_error_message() {
    let h = harness(true);

    let screen = MountedScreen::mount(id(), h.env).await.unwrap();
    settle().await;

    assert_eq!(
        screen.view().await.state,
        UiState::Error {
            message: "booking not found".to_string()
        }
    );
}

#[tokio::test(start_paused = true)]
async fn failed_poll_keeps_countdown_running() {
    let h = harness(true);
    h.backend.push_booking(&id(), Ok(expiring_in(120)));
    h.backend
        .push_booking(&id(), Err(ApiError::Network("connection reset".to_string())));

    let screen = MountedScreen::mount(id(), h.env).await.unwrap();
    settle().await;
    advance(5).await;

    let view = screen.view().await;
    assert_eq!(remaining(&view.state), 115);
    assert_eq!(
        view.sync_error,
        Some(ApiError::Network("connection reset".to_string()))
    );
    assert!(view.allows(UserAction::Pay));
}

#[tokio::test(start_paused = true)]
async fn e_wallet_tap_navigates_to_qr_code() {
    let h = harness(true);
    h.backend.set_booking(expiring_in(120));

    let screen = MountedScreen::mount(id(), h.env).await.unwrap();
    settle().await;
    screen
        .send(BookingScreenAction::PayTapped(PaymentMethod::EWallet))
        .await
        .unwrap();
    settle().await;

    let navigation = screen.state(|state| state.navigation.clone()).await;
    assert_eq!(
        navigation,
        Some(Navigation::QrPayment {
            booking_id: id(),
            amount: fixtures::price(),
        })
    );
    assert!(h.backend.initiated().is_empty());

    screen.send(BookingScreenAction::NavigationHandled).await.unwrap();
    assert_eq!(screen.state(|state| state.navigation.clone()).await, None);
}

#[tokio::test(start_paused = true)]
async fn cancel_tap_refreshes_booking() {
    let h = harness(true);
    h.backend.push_booking(&id(), Ok(expiring_in(120)));
    h.backend.push_booking(&id(), Ok(fixtures::cancelled_booking("b1")));

    let screen = MountedScreen::mount(id(), h.env).await.unwrap();
    settle().await;
    screen.send(BookingScreenAction::CancelTapped).await.unwrap();
    settle().await;

    let (state, notice, in_flight) = screen
        .state(|s| (s.view.state.clone(), s.notice.clone(), s.in_flight))
        .await;
    assert_eq!(state, UiState::Cancelled);
    assert_eq!(notice.as_deref(), Some("Booking cancelled successfully"));
    assert_eq!(in_flight, None);
    assert_eq!(h.backend.count(&BackendCall::CancelBooking(id())), 1);
    assert_eq!(h.backend.booking_fetches(&id()), 2);
}

#[tokio::test(start_paused = true)]
async fn double_tap_sends_one_cancel() {
    let h = harness(true);
    h.backend.set_booking(expiring_in(120));

    let screen = MountedScreen::mount(id(), h.env).await.unwrap();
    settle().await;
    screen.send(BookingScreenAction::CancelTapped).await.unwrap();
    screen.send(BookingScreenAction::CancelTapped).await.unwrap();
    settle().await;

    assert_eq!(h.backend.count(&BackendCall::CancelBooking(id())), 1);
}
