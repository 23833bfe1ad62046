//! Baby Guard CLI - storefront client from the terminal.
//!
//! # Usage
//!
//! ```bash
//! # Log in (password from the prompt flag or BABY_GUARD_PASSWORD)
//! bg auth login -e mona@example.com
//!
//! # Browse and fill the cart
//! bg products list --category toys
//! bg cart add 665f1c0a
//! bg cart dec 665f1c0a
//!
//! # Place the order and enter the OTP interactively
//! bg checkout --city Cairo --street "Nile St" --building 12 --phone 01000000000
//!
//! # Admin content
//! bg admin milestone add --title "First steps" --month 12
//! ```
//!
//! # Environment Variables
//!
//! See `baby_guard_storefront::config` for the full list. `BABY_GUARD_API_URL`
//! is required.

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::sync::Arc;

use baby_guard_storefront::AppState;
use baby_guard_storefront::config::StorefrontConfig;
use baby_guard_storefront::notify::RecordingNotifier;
use baby_guard_storefront::telemetry;
use clap::{Parser, Subcommand};

mod commands;

use commands::CommandError;

#[derive(Parser)]
#[command(name = "bg")]
#[command(author, version, about = "Baby Guard storefront client")]
struct Cli {
    /// Emit JSON log lines (also enabled by `BABY_GUARD_LOG_JSON=1`)
    #[arg(long, global = true)]
    json_log: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign up, log in and out
    Auth {
        #[command(subcommand)]
        action: AuthAction,
    },
    /// Browse the product catalog
    Products {
        #[command(subcommand)]
        action: ProductsAction,
    },
    /// Inspect and edit the pending cart
    Cart {
        #[command(subcommand)]
        action: CartAction,
    },
    /// Place the order and verify the payment code
    Checkout {
        #[arg(long)]
        city: String,
        #[arg(long)]
        street: String,
        #[arg(long)]
        building: String,
        #[arg(long)]
        phone: String,
    },
    /// Enter the payment code for an order that was already placed
    Otp {
        /// Id of the placed cart
        cart_id: String,
    },
    /// Manage milestones, pregnancy tips and quiz questions
    Admin {
        #[command(subcommand)]
        action: AdminAction,
    },
}

#[derive(Subcommand)]
enum AuthAction {
    /// Create an account
    Signup {
        #[arg(short, long)]
        name: String,
        #[arg(short, long)]
        email: String,
        #[arg(short, long)]
        phone: String,
        #[arg(long, env = "BABY_GUARD_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Log in with email and password
    Login {
        #[arg(short, long)]
        email: String,
        #[arg(long, env = "BABY_GUARD_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Forget the stored session and cart
    Logout,
    /// Show the logged-in user's profile
    Me,
}

#[derive(Subcommand)]
enum ProductsAction {
    /// List products
    List {
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        search: Option<String>,
    },
    /// Show one product
    Show { id: String },
}

#[derive(Subcommand)]
enum CartAction {
    /// Show the pending cart
    Show,
    /// Add one unit of a product
    Add { id: String },
    /// Increase a product's quantity by one
    Inc { id: String },
    /// Decrease a product's quantity by one (removes it at zero)
    Dec { id: String },
    /// Remove a product from the cart
    Remove { id: String },
    /// Forget the local cart state without touching the server
    Reset,
    /// Delete the pending cart on the server
    Discard,
}

#[derive(Subcommand)]
enum AdminAction {
    /// Developmental milestones
    Milestone {
        #[command(subcommand)]
        action: MilestoneAction,
    },
    /// Weekly pregnancy tips
    Tip {
        #[command(subcommand)]
        action: TipAction,
    },
    /// Quiz questions
    Questions {
        #[command(subcommand)]
        action: QuestionsAction,
    },
}

#[derive(Subcommand)]
enum MilestoneAction {
    /// Publish a milestone
    Add {
        #[arg(short, long)]
        title: String,
        #[arg(short, long, default_value = "")]
        description: String,
        /// Baby's age in months (0-36)
        #[arg(short, long)]
        month: u8,
    },
}

#[derive(Subcommand)]
enum TipAction {
    /// Publish a pregnancy tip
    Add {
        #[arg(short, long)]
        title: String,
        #[arg(short, long, default_value = "")]
        description: String,
        /// Pregnancy week (1-42)
        #[arg(short, long)]
        week: u8,
    },
}

#[derive(Subcommand)]
enum QuestionsAction {
    /// List quiz questions
    List,
    /// Publish a quiz question
    Add {
        #[arg(short, long)]
        text: String,
        /// Answer option (repeat for each option)
        #[arg(short, long = "option", required = true)]
        options: Vec<String>,
        /// Zero-based index of the correct option
        #[arg(short, long)]
        answer: usize,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match StorefrontConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(1);
        }
    };

    // Sentry must be initialized before the tracing subscriber
    let _sentry_guard = telemetry::init_sentry(&config);
    telemetry::init_tracing(cli.json_log || telemetry::json_logs_from_env());

    let result = run(cli, config).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: StorefrontConfig) -> Result<(), CommandError> {
    let notifier = RecordingNotifier::new();
    let state = AppState::new(config, Arc::new(notifier.clone())).await?;
    state.session().restore().await?;

    let result = dispatch(&state, &notifier, cli.command).await;
    commands::print_notices(&notifier);
    result
}

async fn dispatch(
    state: &AppState,
    notifier: &RecordingNotifier,
    command: Commands,
) -> Result<(), CommandError> {
    match command {
        Commands::Auth { action } => match action {
            AuthAction::Signup {
                name,
                email,
                phone,
                password,
            } => commands::auth::signup(state, name, email, phone, password).await?,
            AuthAction::Login { email, password } => {
                commands::auth::login(state, &email, &password).await?;
            }
            AuthAction::Logout => commands::auth::logout(state).await?,
            AuthAction::Me => commands::auth::me(state).await?,
        },
        Commands::Products { action } => match action {
            ProductsAction::List { category, search } => {
                commands::products::list(state, category, search).await?;
            }
            ProductsAction::Show { id } => commands::products::show(state, &id).await?,
        },
        Commands::Cart { action } => match action {
            CartAction::Show => commands::cart::show(state).await?,
            CartAction::Add { id } => commands::cart::add(state, &id).await?,
            CartAction::Inc { id } => commands::cart::change(state, &id, 1).await?,
            CartAction::Dec { id } => commands::cart::change(state, &id, -1).await?,
            CartAction::Remove { id } => commands::cart::remove(state, &id).await?,
            CartAction::Reset => commands::cart::reset(state).await?,
            CartAction::Discard => commands::cart::discard(state).await?,
        },
        Commands::Checkout {
            city,
            street,
            building,
            phone,
        } => {
            let address = baby_guard_core::Address {
                city,
                street,
                building,
                phone,
            };
            commands::checkout::place(state, notifier, &address).await?;
        }
        Commands::Otp { cart_id } => {
            commands::checkout::resume(state, notifier, cart_id.into()).await?;
        }
        Commands::Admin { action } => match action {
            AdminAction::Milestone {
                action:
                    MilestoneAction::Add {
                        title,
                        description,
                        month,
                    },
            } => commands::admin::add_milestone(state, title, description, month).await?,
            AdminAction::Tip {
                action:
                    TipAction::Add {
                        title,
                        description,
                        week,
                    },
            } => commands::admin::add_tip(state, title, description, week).await?,
            AdminAction::Questions { action } => match action {
                QuestionsAction::List => commands::admin::list_questions(state).await?,
                QuestionsAction::Add {
                    text,
                    options,
                    answer,
                } => commands::admin::add_question(state, text, options, answer).await?,
            },
        },
    }
    Ok(())
}
