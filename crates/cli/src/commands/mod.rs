//! Command implementations.

pub mod admin;
pub mod auth;
pub mod cart;
pub mod checkout;
pub mod products;

use baby_guard_storefront::ClientError;
use baby_guard_storefront::notify::{NoticeLevel, RecordingNotifier};
use baby_guard_storefront::state::StateError;
use thiserror::Error;

/// Errors that can end a command.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The client could not be set up.
    #[error("{0}")]
    State(#[from] StateError),

    /// A storefront operation failed. The user already saw a notice.
    #[error("{0}")]
    Client(#[from] ClientError),

    /// Reading the terminal failed.
    #[error("Terminal I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Print and forget every pending notice. Errors go to stderr.
pub fn print_notices(notifier: &RecordingNotifier) {
    for notice in notifier.drain() {
        match notice.level {
            NoticeLevel::Error => eprintln!("error: {}", notice.message),
            NoticeLevel::Success | NoticeLevel::Info => println!("{}", notice.message),
        }
    }
}
