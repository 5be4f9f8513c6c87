//! Slash-command workflows. Each produces exactly one reply, including on failure.

use tracing::{info, warn};

use crate::{
    domain::{MessageId, UserId},
    engine::Engine,
    errors::Error,
    formatting::user_mention,
    platform::types::CommandInvocation,
    router::{CommandKind, CrosspostTarget},
    scanner::{HistoryScanner, ScanCursor, StopReason},
};

const PIN_FAILED: &str = "Failed to pin the message. Please check the message ID and try again.";

fn plural(n: u64, one: &str, many: &str) -> String {
    if n == 1 {
        format!("1 {one}")
    } else {
        format!("{n} {many}")
    }
}

fn parse_message_id(raw: Option<&str>) -> Option<MessageId> {
    raw?.trim().parse::<u64>().ok().filter(|id| *id != 0).map(MessageId)
}

impl Engine {
    pub(crate) async fn run_command(&self, kind: CommandKind, inv: &CommandInvocation) -> String {
        info!(command = ?kind, user = %inv.user_id, channel = %inv.channel_id, "command invoked");
        match kind {
            CommandKind::PinMessage => self.pin_message(inv).await,
            CommandKind::MessageCount => self.message_count(inv).await,
            CommandKind::CheckReply => self.check_reply(inv).await,
        }
    }

    async fn pin_message(&self, inv: &CommandInvocation) -> String {
        let Some(id) = parse_message_id(inv.string_option("messageid")) else {
            return PIN_FAILED.to_string();
        };
        let message = match self.platform.fetch_message(inv.channel_id, id).await {
            Ok(m) => m,
            Err(e) => {
                warn!(message = %id, error = %e, "pinmessage fetch failed");
                return PIN_FAILED.to_string();
            }
        };

        match self.crosspost(&message, inv.user_id, CrosspostTarget::Pin).await {
            Ok(channel) => format!("Message pinned successfully to {}.", channel.name),
            Err(Error::NotConfigured(reason)) => {
                warn!(%reason, "pinmessage target unavailable");
                "The pin channel is not configured, so nothing was pinned.".to_string()
            }
            Err(Error::PermissionDenied(_)) => {
                "I'm not allowed to post in the pin channel.".to_string()
            }
            Err(e) => {
                warn!(error = %e, "pinmessage cross-post failed");
                PIN_FAILED.to_string()
            }
        }
    }

    /// Messages the caller sent in this channel since `user` last posted.
    async fn message_count(&self, inv: &CommandInvocation) -> String {
        let Some(boundary) = inv.user_option("user") else {
            return "Please pick the user to count against.".to_string();
        };
        let target: UserId = inv.user_id;
        if boundary == target {
            return "Pick someone other than yourself.".to_string();
        }
        if self.self_id() == Some(boundary) {
            return "I never reply, so there is nothing to count against me.".to_string();
        }

        let report = HistoryScanner::new(self.platform.as_ref())
            .scan(
                inv.channel_id,
                ScanCursor::start(),
                |m| m.author == boundary,
                |m| m.author == target,
            )
            .await;

        match report {
            Ok(r) => {
                let sent = plural(r.tally, "message", "messages");
                match r.stopped_by {
                    StopReason::Boundary => format!(
                        "You have sent {sent} to {} since their last reply.",
                        user_mention(boundary)
                    ),
                    StopReason::StartOfHistory => format!(
                        "{} has not posted in this channel; you have sent {sent} here.",
                        user_mention(boundary)
                    ),
                }
            }
            Err(e) => {
                warn!(error = %e, "messagecount scan failed");
                "Couldn't read this channel's history. Please try again later.".to_string()
            }
        }
    }

    /// Number of replies to a message, counted from the newest message back to it.
    async fn check_reply(&self, inv: &CommandInvocation) -> String {
        let Some(id) = parse_message_id(inv.string_option("messageid")) else {
            return "That is not a valid message ID.".to_string();
        };
        if let Err(e) = self.platform.fetch_message(inv.channel_id, id).await {
            warn!(message = %id, error = %e, "checkreply fetch failed");
            return "Couldn't find that message in this channel.".to_string();
        }

        let report = HistoryScanner::new(self.platform.as_ref())
            .scan(
                inv.channel_id,
                ScanCursor::start(),
                |m| m.id <= id,
                |m| m.reply_to == Some(id),
            )
            .await;

        match report {
            Ok(r) if r.tally == 0 => "That message has no replies yet.".to_string(),
            Ok(r) => format!(
                "That message has been replied to {}.",
                plural(r.tally, "time", "times")
            ),
            Err(e) => {
                warn!(error = %e, "checkreply scan failed");
                "Couldn't read this channel's history. Please try again later.".to_string()
            }
        }
    }
}
