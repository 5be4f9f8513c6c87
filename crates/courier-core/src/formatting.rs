//! Outbound text templates.

use crate::domain::{ChannelId, GuildId, Message, MessageId, UserId};

pub fn user_mention(user: UserId) -> String {
    format!("<@{user}>")
}

pub fn channel_mention(channel: ChannelId) -> String {
    format!("<#{channel}>")
}

/// Canonical deep link to a message. Direct messages have no guild and use `@me`.
pub fn message_link(guild: Option<GuildId>, channel: ChannelId, message: MessageId) -> String {
    let guild = guild
        .map(|g| g.to_string())
        .unwrap_or_else(|| "@me".to_string());
    format!("https://discord.com/channels/{guild}/{channel}/{message}")
}

/// Body of a cross-posted message.
///
/// The two leading mentions (original author, then forwarding user) are what
/// the approval gate reads back when the post is later voted on.
pub fn crosspost_body(message: &Message, sender: UserId) -> String {
    format!(
        "**Message from {}**:\n**Sent over by {}**:\n{}\n{}",
        user_mention(message.author),
        user_mention(sender),
        message.content,
        message_link(message.guild_id, message.channel_id, message.id)
    )
}

/// Opening post of a generated talking-point thread.
pub fn talking_point_body(raised_by: UserId, body: &str, source_link: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        format!("Raised by {}\n{source_link}", user_mention(raised_by))
    } else {
        format!("Raised by {}\n{body}\n{source_link}", user_mention(raised_by))
    }
}

/// Substitute `{channel}` in the configured voice reminder with a channel mention.
pub fn voice_reminder(template: &str, channel: ChannelId) -> String {
    template.replace("{channel}", &channel_mention(channel))
}
