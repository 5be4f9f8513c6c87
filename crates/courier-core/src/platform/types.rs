use crate::domain::{ChannelId, GuildId, Message, MessageId, UserId};

/// Platform-neutral inbound event.
///
/// Reaction and edit payloads are partial: they identify a message but do not
/// carry it, so the engine fetches the message before classifying.
#[derive(Clone, Debug)]
pub enum IncomingEvent {
    ReactionAdded(ReactionEvent),
    ReactionRemoved(ReactionEvent),
    MessageCreated(Message),
    MessageEdited(MessageEdit),
    VoiceStateChanged(VoiceStateChange),
    CommandInvoked(CommandInvocation),
}

#[derive(Clone, Debug)]
pub struct ReactionEvent {
    pub channel_id: ChannelId,
    pub message_id: MessageId,
    pub user_id: UserId,
    pub user_is_bot: bool,
    /// Unicode emoji, or the custom emoji's name.
    pub emoji: String,
}

#[derive(Clone, Debug)]
pub struct MessageEdit {
    pub channel_id: ChannelId,
    pub message_id: MessageId,
    /// Content before the edit, when the adapter had it cached.
    pub previous_content: Option<String>,
}

#[derive(Clone, Debug)]
pub struct VoiceStateChange {
    pub user_id: UserId,
    pub user_is_bot: bool,
    pub before: Option<ChannelId>,
    pub after: Option<ChannelId>,
}

#[derive(Clone, Debug)]
pub struct CommandInvocation {
    pub guild_id: Option<GuildId>,
    pub channel_id: ChannelId,
    pub user_id: UserId,
    pub name: String,
    pub options: Vec<CommandOption>,
}

#[derive(Clone, Debug)]
pub struct CommandOption {
    pub name: String,
    pub value: CommandOptionValue,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommandOptionValue {
    String(String),
    User(UserId),
}

impl CommandInvocation {
    pub fn string_option(&self, name: &str) -> Option<&str> {
        self.options.iter().find_map(|o| match &o.value {
            CommandOptionValue::String(s) if o.name == name => Some(s.as_str()),
            _ => None,
        })
    }

    pub fn user_option(&self, name: &str) -> Option<UserId> {
        self.options.iter().find_map(|o| match o.value {
            CommandOptionValue::User(u) if o.name == name => Some(u),
            _ => None,
        })
    }
}
