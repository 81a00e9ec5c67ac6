use std::io::{self, Write};

use bazar_core::backend::Backend;
use bazar_core::feed::{ConfirmOutcome, FeedController, FeedUpdate, RemoteOutcome};
use bazar_core::models::{ConversationId, FeedEntry};
use bazar_core::realtime::ChannelStatus;
use futures_util::stream::{FuturesUnordered, StreamExt};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};

use crate::cli::Target;
use crate::commands::common::{connect, format_feed_entry, parse_id, Mode};
use crate::error::CliError;

type Feed = FeedController<dyn Backend>;

pub async fn run_chat(
    target: &Target,
    conversation: &str,
    send: Option<&str>,
) -> Result<(), CliError> {
    let conversation: ConversationId = parse_id("conversation", conversation)?;
    let context = connect(target).await?;
    let mut controller = FeedController::open(context.backend, conversation).await?;
    let mut stdout = io::stdout();

    if let Some(text) = send {
        let sent = controller.send(text).await;
        controller.close();
        if let ConfirmOutcome::Replaced(index) | ConfirmOutcome::Inserted(index) = sent? {
            if let Some(entry) = controller.entries().get(index) {
                writeln!(stdout, "{}", format_feed_entry(entry, controller.viewer()))?;
            }
        }
        return Ok(());
    }

    for entry in controller.entries() {
        writeln!(stdout, "{}", format_feed_entry(entry, controller.viewer()))?;
    }
    eprintln!(
        "Chatting via {}. Type a message and press enter; Ctrl-D leaves.",
        context.mode
    );
    if let Some(notice) = live_updates_notice(&context.mode) {
        eprintln!("{notice}");
    }

    let lines = BufReader::new(tokio::io::stdin()).lines();
    let result = chat_loop(&mut controller, lines, &mut stdout).await;
    controller.close();
    result
}

/// Caveat about live delivery for backends whose channel is process-local.
pub fn live_updates_notice(mode: &Mode) -> Option<&'static str> {
    match mode {
        Mode::Local(_) => Some(
            "Note: local mode only shows live messages sent from this process; \
             reopen the chat to see replies from other `bazar` sessions.",
        ),
        Mode::Hosted { .. } => None,
    }
}

/// Drive one chat session until input ends and every send has settled.
///
/// Realtime events, user input and insert completions are handled as they
/// arrive, so a slow send never blocks reading or receiving.
pub async fn chat_loop<R, W>(
    controller: &mut Feed,
    mut lines: Lines<R>,
    out: &mut W,
) -> Result<(), CliError>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut deliveries = FuturesUnordered::new();
    let mut live = true;
    let mut input_open = true;

    while input_open || !deliveries.is_empty() {
        tokio::select! {
            update = controller.next_update(), if live => match update {
                Some(FeedUpdate::Message(RemoteOutcome::Inserted(index))) => {
                    if let Some(entry) = controller.entries().get(index) {
                        writeln!(out, "{}", format_feed_entry(entry, controller.viewer()))?;
                    }
                }
                Some(FeedUpdate::Message(_)) => {}
                Some(FeedUpdate::Status(status)) => writeln!(out, "{}", status_line(&status))?,
                None => {
                    live = false;
                    writeln!(out, "-- realtime channel ended; new messages will not appear --")?;
                }
            },
            Some(delivery) = deliveries.next(), if !deliveries.is_empty() => {
                if let Err(error) = controller.complete(delivery) {
                    writeln!(out, "-- message not sent: {error} --")?;
                }
            },
            line = lines.next_line(), if input_open => match line? {
                Some(text) if text.trim().is_empty() => {}
                Some(text) => match controller.begin_send(&text) {
                    Ok(pending) => {
                        deliveries.push(controller.deliver(&pending));
                        let echo = FeedEntry::Pending(pending);
                        writeln!(out, "{}", format_feed_entry(&echo, controller.viewer()))?;
                    }
                    Err(error) => writeln!(out, "-- {error} --")?,
                },
                None => input_open = false,
            },
            else => break,
        }
    }

    Ok(())
}

fn status_line(status: &ChannelStatus) -> String {
    match status {
        ChannelStatus::Error(reason) => format!("-- {}: {reason} --", status.label()),
        other => format!("-- {} --", other.label()),
    }
}
