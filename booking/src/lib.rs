//! # Tixwatch
//!
//! Booking status polling, countdown and actions for the concert booking
//! platform.
//!
//! A booking screen is assembled from four pieces:
//!
//! - [`cache`]: stale-while-revalidate cache that polls pending bookings and
//!   discards out-of-order responses
//! - [`countdown`]: one-second countdown to the payment deadline
//! - [`projector`]: pure mapping from cache snapshot and countdown to what
//!   the screen shows and which actions it offers
//! - [`dispatcher`]: cancel, pay and submit, invalidating caches on success
//!
//! [`screen::BookingScreen`] composes them as a reducer running on a
//! [`tixwatch_runtime::Store`].
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tixwatch::{ActionDispatcher, BookingCaches, BookingScreenEnvironment, Config, MountedScreen, SelectionStash};
//! use tixwatch_api::{BookingBackend, BookingId};
//! use tixwatch_core::SystemClock;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = Config::from_env();
//! let backend: Arc<dyn BookingBackend> = Arc::new(config.api_client());
//! let caches = BookingCaches::new(Arc::clone(&backend), &config.cache);
//! let dispatcher = ActionDispatcher::new(backend, caches, SelectionStash::new());
//!
//! let env = BookingScreenEnvironment::new(dispatcher, Arc::new(SystemClock), true);
//! let screen = MountedScreen::mount(BookingId::new("42"), env).await?;
//! println!("{}", screen.view().await.state);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod countdown;
pub mod dispatcher;
pub mod error;
pub mod payment;
pub mod projector;
pub mod queries;
pub mod screen;
pub mod selection;

pub use cache::{CacheSnapshot, FetchOptions, Query, QueryCache, StaleTime, Subscription};
pub use config::Config;
pub use countdown::CountdownState;
pub use dispatcher::{ActionDispatcher, PaymentOutcome};
pub use error::{DispatchError, ValidationError};
pub use projector::{StatusView, UiState, UserAction, project};
pub use queries::{BookingCaches, BookingQuery, MyBookingsQuery, PaymentQuery};
pub use screen::{
    BookingScreen, BookingScreenAction, BookingScreenEnvironment, BookingScreenState,
    MountedScreen, Navigation,
};
pub use selection::{ConcertSummary, PendingSelection, SelectionStash};
