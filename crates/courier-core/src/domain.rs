use chrono::{DateTime, Utc};

/// Milliseconds between the Unix epoch and the platform's snowflake epoch (2015-01-01).
const SNOWFLAKE_EPOCH_MS: u64 = 1_420_070_400_000;

macro_rules! snowflake_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u64);

        impl $name {
            /// Creation time encoded in the snowflake.
            pub fn created_at(self) -> DateTime<Utc> {
                snowflake_timestamp(self.0)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

snowflake_id!(
    /// Platform user id.
    UserId
);
snowflake_id!(
    /// Platform channel id (text, voice, forum, or thread).
    ChannelId
);
snowflake_id!(
    /// Platform guild (server) id.
    GuildId
);
snowflake_id!(
    /// Platform message id.
    MessageId
);

pub fn snowflake_timestamp(id: u64) -> DateTime<Utc> {
    let ms = (id >> 22).saturating_add(SNOWFLAKE_EPOCH_MS);
    DateTime::from_timestamp_millis(ms as i64).unwrap_or_default()
}

/// A stable reference to a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub channel_id: ChannelId,
    pub message_id: MessageId,
}

/// A fully resolved message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub channel_id: ChannelId,
    pub guild_id: Option<GuildId>,
    pub author: UserId,
    pub author_is_bot: bool,
    pub content: String,
    /// Id of the message this one replies to, if any.
    pub reply_to: Option<MessageId>,
}

impl Message {
    pub fn reference(&self) -> MessageRef {
        MessageRef {
            channel_id: self.channel_id,
            message_id: self.id,
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.id.created_at()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelKind {
    Text,
    Voice,
    Forum,
    Thread,
    Direct,
    Other,
}

impl ChannelKind {
    /// Whether messages can be sent into the channel.
    pub fn is_text_based(self) -> bool {
        matches!(
            self,
            ChannelKind::Text | ChannelKind::Voice | ChannelKind::Thread | ChannelKind::Direct
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelInfo {
    pub id: ChannelId,
    pub name: String,
    pub kind: ChannelKind,
}

/// A thread inside a forum-like container.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Thread {
    pub id: ChannelId,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snowflake_decodes_creation_time() {
        // Example id from the platform's documentation.
        let id = MessageId(175_928_847_299_117_063);
        assert_eq!(id.created_at().timestamp_millis(), 1_462_015_105_796);
    }

    #[test]
    fn forum_is_not_text_based() {
        assert!(!ChannelKind::Forum.is_text_based());
        assert!(ChannelKind::Text.is_text_based());
        assert!(ChannelKind::Thread.is_text_based());
    }
}
