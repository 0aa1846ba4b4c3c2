//! Turns `TransferEvent`s into terminal output.

use airhop_core::TransferEvent;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tokio::sync::mpsc;

const BAR_TEMPLATE: &str =
    "[{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta}) {msg}";

fn new_bar(total_bytes: u64) -> ProgressBar {
    let bar = ProgressBar::new(total_bytes);
    let style = ProgressStyle::with_template(BAR_TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ");
    bar.set_style(style);
    bar
}

fn new_spinner() -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

/// Message shown on the dial spinner after a failed attempt
fn dial_message(attempt: u32, max_attempts: u32) -> String {
    format!("Receiver not reachable yet, attempt {}/{}", attempt, max_attempts)
}

/// One-off line printed for an event, if it has one.
///
/// Fatal errors are left to the caller, which prints the final error once.
fn event_line(event: &TransferEvent) -> Option<String> {
    match event {
        TransferEvent::Status(message) => Some(message.clone()),
        TransferEvent::NetworkReady { network_name } => {
            Some(format!("Wireless link up on {}", network_name))
        }
        TransferEvent::Connected { peer } => Some(format!("Connected to {}", peer)),
        _ => None,
    }
}

/// Render events until every sender has been dropped.
pub async fn render(mut events: mpsc::Receiver<TransferEvent>) {
    let mut bar: Option<ProgressBar> = None;
    let mut dialing: Option<ProgressBar> = None;

    while let Some(event) = events.recv().await {
        match &event {
            TransferEvent::DialAttempt {
                attempt,
                max_attempts,
                addr,
            } => {
                tracing::debug!("Dial {}/{} to {} failed", attempt, max_attempts, addr);
                dialing
                    .get_or_insert_with(new_spinner)
                    .set_message(dial_message(*attempt, *max_attempts));
                continue;
            }
            TransferEvent::TransferProgress {
                file_name,
                bytes_done,
                total_bytes,
                speed,
                ..
            } => {
                let bar = bar.get_or_insert_with(|| new_bar(*total_bytes));
                bar.set_position(*bytes_done);
                bar.set_message(format!("{} {}", file_name, speed));
                continue;
            }
            _ => {}
        }

        // Any other event ends the dial phase
        if let Some(spinner) = dialing.take() {
            spinner.finish_and_clear();
        }

        match event {
            TransferEvent::TransferCompleted { file_name, bytes } => match bar.take() {
                Some(bar) => bar.finish_with_message(format!("{} done", file_name)),
                None => println!("{} done ({} bytes)", file_name, bytes),
            },
            TransferEvent::Error(_) => {
                if let Some(bar) = bar.take() {
                    bar.abandon();
                }
            }
            other => {
                if let Some(line) = event_line(&other) {
                    match &bar {
                        Some(bar) => bar.println(line),
                        None => println!("{}", line),
                    }
                }
            }
        }
    }

    if let Some(spinner) = dialing {
        spinner.finish_and_clear();
    }
    if let Some(bar) = bar {
        bar.abandon();
    }
}
