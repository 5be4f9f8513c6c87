//! Conversions between serenity models and the core's platform-neutral types.

use serenity::all::{
    ChannelType, CommandDataOptionValue, CommandInteraction, Reaction, ReactionType,
};

use courier_core::{
    domain::{ChannelId, ChannelKind, GuildId, Message, MessageId, UserId},
    platform::types::{CommandInvocation, CommandOption, CommandOptionValue, ReactionEvent},
};

pub fn dc_channel(id: ChannelId) -> serenity::all::ChannelId {
    serenity::all::ChannelId::new(id.0)
}

pub fn dc_msg_id(id: MessageId) -> serenity::all::MessageId {
    serenity::all::MessageId::new(id.0)
}

pub fn channel_kind(kind: ChannelType) -> ChannelKind {
    match kind {
        ChannelType::Text | ChannelType::News => ChannelKind::Text,
        ChannelType::Voice | ChannelType::Stage => ChannelKind::Voice,
        ChannelType::Forum => ChannelKind::Forum,
        ChannelType::PublicThread | ChannelType::PrivateThread | ChannelType::NewsThread => {
            ChannelKind::Thread
        }
        ChannelType::Private => ChannelKind::Direct,
        _ => ChannelKind::Other,
    }
}

/// Unicode emoji as-is; custom emoji by name.
pub fn emoji_name(emoji: &ReactionType) -> Option<String> {
    match emoji {
        ReactionType::Unicode(s) => Some(s.clone()),
        ReactionType::Custom { name, .. } => name.clone(),
        _ => None,
    }
}

pub fn message_from(m: &serenity::all::Message) -> Message {
    Message {
        id: MessageId(m.id.get()),
        channel_id: ChannelId(m.channel_id.get()),
        guild_id: m.guild_id.map(|g| GuildId(g.get())),
        author: UserId(m.author.id.get()),
        author_is_bot: m.author.bot,
        content: m.content.clone(),
        reply_to: m
            .message_reference
            .as_ref()
            .and_then(|r| r.message_id)
            .map(|id| MessageId(id.get())),
    }
}

/// `None` when the reaction has no user or an unnamed emoji.
pub fn reaction_from(r: &Reaction) -> Option<ReactionEvent> {
    Some(ReactionEvent {
        channel_id: ChannelId(r.channel_id.get()),
        message_id: MessageId(r.message_id.get()),
        user_id: UserId(r.user_id?.get()),
        user_is_bot: r.member.as_ref().is_some_and(|m| m.user.bot),
        emoji: emoji_name(&r.emoji)?,
    })
}

pub fn command_from(cmd: &CommandInteraction) -> CommandInvocation {
    let options = cmd
        .data
        .options
        .iter()
        .filter_map(|o| {
            let value = match &o.value {
                CommandDataOptionValue::String(s) => CommandOptionValue::String(s.clone()),
                CommandDataOptionValue::User(u) => CommandOptionValue::User(UserId(u.get())),
                _ => return None,
            };
            Some(CommandOption {
                name: o.name.clone(),
                value,
            })
        })
        .collect();

    CommandInvocation {
        guild_id: cmd.guild_id.map(|g| GuildId(g.get())),
        channel_id: ChannelId(cmd.channel_id.get()),
        user_id: UserId(cmd.user.id.get()),
        name: cmd.data.name.clone(),
        options,
    }
}
