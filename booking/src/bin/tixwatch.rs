//! Command line client for the booking and payment services.
//!
//! ```text
//! tixwatch book 11 2=1 3=2 --name "Siti Rahma" --phone 081234567890 \
//!     --email siti@example.com --ktp 3171234567890123
//! tixwatch watch 42            # live status until the booking resolves
//! tixwatch bookings            # my bookings
//! tixwatch cancel 42
//! tixwatch pay 42 e_wallet     # prints the QR payload, nothing is charged
//! tixwatch payment 7
//! ```

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;
use tixwatch::countdown::CountdownState;
use tixwatch::payment::{self, BANK_ACCOUNTS};
use tixwatch::{
    ActionDispatcher, BookingCaches, BookingScreenEnvironment, Config,
    FetchOptions, MountedScreen, PaymentOutcome, SelectionStash, StatusView, UiState,
};
use tixwatch_api::{
    BookingBackend, BookingId, BookingRecord, BuyerInfo, PaymentId, PaymentMethod,
    TicketHolderInfo, TicketQuantity,
};
use tixwatch_core::SystemClock;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "tixwatch", version, about = "Follow and manage concert bookings")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Book tickets for a concert, then follow the new booking
    Book {
        /// Concert id
        concert_id: u64,
        /// Tickets as CLASS_ID=QUANTITY
        #[arg(required = true, value_parser = parse_ticket)]
        tickets: Vec<TicketQuantity>,
        #[command(flatten)]
        buyer: BuyerArgs,
    },

    /// Follow a booking until it is confirmed, cancelled or failed
    Watch {
        /// Booking id
        booking_id: BookingId,
    },

    /// List my bookings
    Bookings,

    /// Cancel a pending booking
    Cancel {
        /// Booking id
        booking_id: BookingId,
    },

    /// Pay for a pending booking
    Pay {
        /// Booking id
        booking_id: BookingId,
        /// credit_card, bank_transfer or e_wallet
        method: PaymentMethod,
    },

    /// Show a payment
    Payment {
        /// Payment id
        payment_id: PaymentId,
    },
}

#[derive(Args)]
struct BuyerArgs {
    /// Buyer full name
    #[arg(long)]
    name: String,
    /// Buyer phone number, 10 to 15 digits
    #[arg(long)]
    phone: String,
    /// Buyer e-mail
    #[arg(long)]
    email: String,
    /// Buyer KTP number, 16 digits
    #[arg(long)]
    ktp: String,
    /// Ticket holder, when not the buyer
    #[arg(long, requires = "holder_ktp")]
    holder_name: Option<String>,
    /// Ticket holder KTP number
    #[arg(long, requires = "holder_name")]
    holder_ktp: Option<String>,
}

impl BuyerArgs {
    fn into_parts(self) -> (BuyerInfo, Option<TicketHolderInfo>) {
        let holder = self
            .holder_name
            .zip(self.holder_ktp)
            .map(|(full_name, ktp_number)| TicketHolderInfo {
                full_name,
                ktp_number,
            });
        let buyer = BuyerInfo {
            full_name: self.name,
            phone_number: self.phone,
            email: self.email,
            ktp_number: self.ktp,
        };
        (buyer, holder)
    }
}

fn parse_ticket(arg: &str) -> Result<TicketQuantity, String> {
    let (class, quantity) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected CLASS_ID=QUANTITY, got {arg:?}"))?;
    Ok(TicketQuantity {
        ticket_class_id: class
            .trim()
            .parse()
            .map_err(|_| format!("invalid ticket class {class:?}"))?,
        quantity: quantity
            .trim()
            .parse()
            .map_err(|_| format!("invalid quantity {quantity:?}"))?,
    })
}

struct App {
    config: Config,
    dispatcher: ActionDispatcher,
}

impl App {
    fn new(config: Config) -> Self {
        let backend: Arc<dyn BookingBackend> = Arc::new(config.api_client());
        let caches = BookingCaches::new(Arc::clone(&backend), &config.cache);
        let dispatcher = ActionDispatcher::new(backend, caches, SelectionStash::new());
        Self { config, dispatcher }
    }

    fn caches(&self) -> &BookingCaches {
        self.dispatcher.caches()
    }

    async fn watch(&self, booking_id: BookingId) -> anyhow::Result<()> {
        let env = BookingScreenEnvironment::new(
            self.dispatcher.clone(),
            Arc::new(SystemClock),
            self.config.screen.refetch_on_expiry,
        );
        let screen = MountedScreen::mount(booking_id.clone(), env).await?;
        let mut actions = screen.store().subscribe_actions();
        let mut last_line = String::new();

        loop {
            let view = screen.view().await;
            let line = render(&view);
            if line != last_line {
                println!("{booking_id}  {line}");
                last_line = line;
            }

            match view.state {
                UiState::Confirmed | UiState::Cancelled | UiState::Failed => break,
                UiState::Error { message } => bail!(message),
                _ => {},
            }

            tokio::select! {
                _ = tokio::signal::ctrl_c() => break,
                received = actions.recv() => {
                    if let Err(tokio::sync::broadcast::error::RecvError::Closed) = received {
                        break;
                    }
                },
            }
        }

        screen.unmount(Duration::from_secs(2)).await?;
        Ok(())
    }

    async fn book(
        &self,
        concert_id: u64,
        tickets: Vec<TicketQuantity>,
        buyer: BuyerArgs,
    ) -> anyhow::Result<()> {
        let concert = self
            .dispatcher
            .select_tickets(concert_id, tickets)
            .await
            .with_context(|| format!("selecting tickets for concert {concert_id}"))?;
        println!(
            "{}  {}",
            concert.name,
            payment::format_idr(concert.total_price)
        );

        let (buyer, holder) = buyer.into_parts();
        let record = self.dispatcher.submit_booking(buyer, holder).await?;
        println!("Booking {} created, {}", record.id, record.status);
        self.watch(record.id).await
    }

    async fn bookings(&self) -> anyhow::Result<()> {
        let bookings = self
            .caches()
            .my_bookings
            .get(&(), FetchOptions::default())
            .await?;
        if bookings.is_empty() {
            println!("No bookings yet");
            return Ok(());
        }
        let now = chrono::Utc::now();
        for booking in &bookings {
            let deadline = booking
                .active_expiry()
                .map(|at| format!("  {} left", CountdownState::at(Some(at), now)))
                .unwrap_or_default();
            println!(
                "{:>8}  {:<10} {:<32} {}{deadline}",
                booking.id.as_str(),
                booking.status,
                booking.concert_name.as_deref().unwrap_or("-"),
                payment::format_idr(booking.total_price),
            );
        }
        Ok(())
    }

    async fn cancel(&self, booking_id: BookingId) -> anyhow::Result<()> {
        self.load(&booking_id).await?;
        let receipt = self.dispatcher.cancel(&booking_id).await?;
        println!("{}", receipt.message);
        Ok(())
    }

    async fn pay(&self, booking_id: BookingId, method: PaymentMethod) -> anyhow::Result<()> {
        match self.dispatcher.initiate_payment(&booking_id, method).await? {
            PaymentOutcome::QrPayment { booking_id, amount } => {
                println!("Scan to pay {}", payment::format_idr(amount));
                println!("{}", payment::qr_payload(&booking_id, amount));
            },
            PaymentOutcome::Initiated(record) => {
                println!(
                    "Payment {} ({}) for {}: {:?}",
                    record.id,
                    record.payment_method,
                    payment::format_idr(record.amount),
                    record.status
                );
                if method == PaymentMethod::BankTransfer {
                    println!("Transfer reference: {}", payment::bank_reference(&booking_id));
                    for (bank, account) in BANK_ACCOUNTS {
                        println!("  {bank:<8} {account}");
                    }
                }
            },
        }
        Ok(())
    }

    async fn payment(&self, payment_id: PaymentId) -> anyhow::Result<()> {
        let record = self
            .caches()
            .payments
            .get(&payment_id, FetchOptions::default())
            .await
            .with_context(|| format!("loading payment {payment_id}"))?;
        println!(
            "Payment {} for booking {}: {} via {}, {:?}",
            record.id,
            record.booking_id,
            payment::format_idr(record.amount),
            record.payment_method,
            record.status
        );
        if !record.transaction_id.is_empty() {
            println!("Transaction {}", record.transaction_id);
        }
        Ok(())
    }

    async fn load(&self, booking_id: &BookingId) -> anyhow::Result<BookingRecord> {
        self.caches()
            .bookings
            .get(booking_id, FetchOptions::default())
            .await
            .with_context(|| format!("loading booking {booking_id}"))
    }
}

fn render(view: &StatusView) -> String {
    let mut line = match &view.state {
        UiState::Loading => "loading...".to_string(),
        UiState::Error { message } => format!("error: {message}"),
        UiState::ActiveCountdown { remaining } => {
            let countdown = CountdownState::Active {
                remaining: *remaining,
            };
            format!("pending, {countdown} left to pay")
        },
        UiState::ExpiredPendingSync => {
            "payment window closed, waiting for the server to cancel".to_string()
        },
        UiState::Confirmed => "confirmed".to_string(),
        UiState::Cancelled => "cancelled".to_string(),
        UiState::Failed => "payment failed".to_string(),
    };
    if let Some(error) = &view.sync_error {
        let _ = write!(line, "  (last refresh failed: {error})");
    }
    line
}

fn init_tracing(default_filter: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env();
    init_tracing(&config.log_level);

    let cli = Cli::parse();
    let app = App::new(config);

    match cli.command {
        Command::Book {
            concert_id,
            tickets,
            buyer,
        } => app.book(concert_id, tickets, buyer).await,
        Command::Watch { booking_id } => app.watch(booking_id).await,
        Command::Bookings => app.bookings().await,
        Command::Cancel { booking_id } => app.cancel(booking_id).await,
        Command::Pay { booking_id, method } => app.pay(booking_id, method).await,
        Command::Payment { payment_id } => app.payment(payment_id).await,
    }
}
