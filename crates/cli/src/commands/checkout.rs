//! `bg checkout` and `bg otp`: order placement and the interactive OTP prompt.
//!
//! The prompt lives in a [`ViewScope`]; Ctrl+C ends the scope, which
//! abandons any request in flight and stops the resend countdown.

use baby_guard_core::{Address, CartId, OTP_LENGTH};
use baby_guard_storefront::checkout::OtpFlow;
use baby_guard_storefront::notify::RecordingNotifier;
use baby_guard_storefront::view::{Route, ViewScope};
use baby_guard_storefront::{AppState, ClientError};
use tokio::io::{AsyncBufReadExt, BufReader};

use super::{CommandError, print_notices};

pub async fn place(
    state: &AppState,
    notifier: &RecordingNotifier,
    address: &Address,
) -> Result<(), CommandError> {
    state.session().require_login().await?;
    let flow = state.checkout().place_order(address).await?;

    if let Some(summary) = flow.summary() {
        println!(
            "Order {}: {} items, total {}",
            summary.cart_id, summary.item_count, summary.total_price
        );
    }
    prompt(flow, notifier).await
}

pub async fn resume(
    state: &AppState,
    notifier: &RecordingNotifier,
    cart_id: CartId,
) -> Result<(), CommandError> {
    state.session().require_login().await?;
    prompt(state.checkout().otp_flow(cart_id), notifier).await
}

enum Input {
    Resend,
    Cancel,
    Clear,
    Code(String),
}

fn parse_input(line: &str) -> Option<Input> {
    match line.trim().to_ascii_lowercase().as_str() {
        "" => None,
        "resend" | "r" => Some(Input::Resend),
        "cancel" | "c" => Some(Input::Cancel),
        "clear" => Some(Input::Clear),
        _ => Some(Input::Code(line.trim().to_string())),
    }
}

async fn prompt(mut flow: OtpFlow, notifier: &RecordingNotifier) -> Result<(), CommandError> {
    let scope = ViewScope::new();
    let interrupt = scope.token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancel();
        }
    });

    let mut countdown = flow.countdown(&scope);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let token = scope.token();

    loop {
        print_notices(notifier);
        let remaining = *countdown.borrow();
        let resend = if remaining > 0 {
            format!("resend in {remaining}s")
        } else {
            "'resend' for a new code".to_string()
        };
        println!(
            "Code [{}] - type {OTP_LENGTH} digits, {resend}, or 'cancel':",
            flow.display()
        );

        let line = tokio::select! {
            () = token.cancelled() => {
                println!("Interrupted; the order stays pending.");
                return Err(ClientError::Cancelled.into());
            }
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            println!("Input closed; the order stays pending.");
            return Ok(());
        };

        let route = match parse_input(&line) {
            None => continue,
            Some(Input::Clear) => {
                flow.clear();
                continue;
            }
            Some(Input::Resend) => {
                if scope.run(flow.resend()).await.is_ok() {
                    countdown = flow.countdown(&scope);
                }
                continue;
            }
            Some(Input::Cancel) => match scope.run(flow.cancel()).await {
                Ok(route) => route,
                Err(ClientError::Cancelled) => return Err(ClientError::Cancelled.into()),
                Err(_) => continue,
            },
            Some(Input::Code(text)) => {
                if let Err(e) = flow.paste(&text) {
                    eprintln!("error: {e}");
                    continue;
                }
                match scope.run(flow.submit()).await {
                    Ok(route) => route,
                    Err(ClientError::Cancelled) => return Err(ClientError::Cancelled.into()),
                    Err(_) => continue,
                }
            }
        };

        print_notices(notifier);
        match route {
            Route::Login => println!("Please run `bg auth login` and then `bg otp {}`.", flow.cart_id()),
            other => println!("-> {other}"),
        }
        return Ok(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_input_keywords() {
        assert!(matches!(parse_input("  RESEND "), Some(Input::Resend)));
        assert!(matches!(parse_input("c"), Some(Input::Cancel)));
        assert!(matches!(parse_input("clear"), Some(Input::Clear)));
        assert!(parse_input("   ").is_none());
    }

    #[test]
    fn test_parse_input_code_is_trimmed() {
        let Some(Input::Code(code)) = parse_input(" 123 456 ") else {
            panic!("expected a code");
        };
        assert_eq!(code, "123 456");
    }
}
