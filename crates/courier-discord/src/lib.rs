//! Discord adapter (serenity).
//!
//! This crate implements the `courier-core` ChatPlatform over the Discord REST
//! API and feeds gateway events into the engine.

use std::sync::Arc;

use async_trait::async_trait;

use serenity::{
    all::{Channel, ChannelType, CreateForumPost, CreateMessage, GetMessages, GuildChannel},
    http::Http,
};

pub mod convert;
pub mod router;

use courier_core::{
    domain::{ChannelId, ChannelInfo, ChannelKind, Message, MessageId, MessageRef, Thread},
    errors::Error,
    platform::port::ChatPlatform,
    Result,
};

use crate::convert::{channel_kind, dc_channel, dc_msg_id, message_from};

#[derive(Clone)]
pub struct DiscordPlatform {
    http: Arc<Http>,
}

impl DiscordPlatform {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }

    fn map_err(what: &str, e: serenity::Error) -> Error {
        if let serenity::Error::Http(http_err) = &e {
            match http_err.status_code().map(|s| s.as_u16()) {
                Some(403) => return Error::PermissionDenied(format!("{what}: {e}")),
                Some(404) => return Error::NotFound(what.to_string()),
                _ => {}
            }
        }
        Error::FetchFailed(format!("{what}: {e}"))
    }

    async fn guild_channel(&self, channel: ChannelId) -> Result<GuildChannel> {
        match self
            .http
            .get_channel(dc_channel(channel))
            .await
            .map_err(|e| Self::map_err(&format!("channel {channel}"), e))?
        {
            Channel::Guild(gc) => Ok(gc),
            _ => Err(Error::NotFound(format!("guild channel {channel}"))),
        }
    }
}

fn thread_from(gc: &GuildChannel) -> Thread {
    let id = ChannelId(gc.id.get());
    Thread {
        id,
        title: gc.name.clone(),
        created_at: id.created_at(),
    }
}

#[async_trait]
impl ChatPlatform for DiscordPlatform {
    async fn fetch_message(&self, channel: ChannelId, id: MessageId) -> Result<Message> {
        let msg = dc_channel(channel)
            .message(&*self.http, dc_msg_id(id))
            .await
            .map_err(|e| Self::map_err(&format!("message {id} in {channel}"), e))?;
        Ok(message_from(&msg))
    }

    async fn fetch_messages_page(
        &self,
        channel: ChannelId,
        before: Option<MessageId>,
        limit: u8,
    ) -> Result<Vec<Message>> {
        let mut req = GetMessages::new().limit(limit);
        if let Some(before) = before {
            req = req.before(dc_msg_id(before));
        }
        let page = dc_channel(channel)
            .messages(&*self.http, req)
            .await
            .map_err(|e| Self::map_err(&format!("history of {channel}"), e))?;
        Ok(page.iter().map(message_from).collect())
    }

    async fn channel_info(&self, channel: ChannelId) -> Result<ChannelInfo> {
        let ch = self
            .http
            .get_channel(dc_channel(channel))
            .await
            .map_err(|e| Self::map_err(&format!("channel {channel}"), e))?;
        Ok(match ch {
            Channel::Guild(gc) => ChannelInfo {
                id: channel,
                name: gc.name.clone(),
                kind: channel_kind(gc.kind),
            },
            Channel::Private(_) => ChannelInfo {
                id: channel,
                name: "direct message".to_string(),
                kind: channel_kind(ChannelType::Private),
            },
            _ => ChannelInfo {
                id: channel,
                name: channel.to_string(),
                kind: ChannelKind::Other,
            },
        })
    }

    async fn send_message(&self, channel: ChannelId, text: &str) -> Result<MessageRef> {
        let sent = dc_channel(channel)
            .send_message(&*self.http, CreateMessage::new().content(text))
            .await
            .map_err(|e| Self::map_err(&format!("send to {channel}"), e))?;
        Ok(MessageRef {
            channel_id: channel,
            message_id: MessageId(sent.id.get()),
        })
    }

    async fn delete_message(&self, msg: MessageRef) -> Result<()> {
        dc_channel(msg.channel_id)
            .delete_message(&*self.http, dc_msg_id(msg.message_id))
            .await
            .map_err(|e| Self::map_err(&format!("delete {}", msg.message_id), e))
    }

    async fn create_thread(&self, container: ChannelId, title: &str, body: &str) -> Result<Thread> {
        let post = CreateForumPost::new(title, CreateMessage::new().content(body));
        let gc = dc_channel(container)
            .create_forum_post(&*self.http, post)
            .await
            .map_err(|e| Self::map_err(&format!("forum post in {container}"), e))?;
        Ok(thread_from(&gc))
    }

    async fn list_threads(&self, container: ChannelId, include_archived: bool) -> Result<Vec<Thread>> {
        let forum = self.guild_channel(container).await?;
        let active = forum
            .guild_id
            .get_active_threads(&*self.http)
            .await
            .map_err(|e| Self::map_err(&format!("active threads of {container}"), e))?;

        let mut threads: Vec<Thread> = active
            .threads
            .iter()
            .filter(|t| t.parent_id == Some(forum.id))
            .map(thread_from)
            .collect();

        if include_archived {
            // One page of the most recently archived threads is enough to find
            // the latest sequence number.
            let archived = forum
                .id
                .get_archived_public_threads(&*self.http, None, Some(100))
                .await
                .map_err(|e| Self::map_err(&format!("archived threads of {container}"), e))?;
            threads.extend(archived.threads.iter().map(thread_from));
        }

        threads.sort_by_key(|t| t.id);
        threads.dedup_by_key(|t| t.id);
        Ok(threads)
    }
}
