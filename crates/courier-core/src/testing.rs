//! In-memory ChatPlatform used by the engine's unit tests.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use async_trait::async_trait;

use crate::{
    domain::{ChannelId, ChannelInfo, ChannelKind, GuildId, Message, MessageId, MessageRef, Thread, UserId},
    errors::Error,
    platform::port::ChatPlatform,
    Result,
};

pub const GUILD: GuildId = GuildId(1);

pub fn msg(channel: ChannelId, id: u64, author: UserId, content: &str) -> Message {
    Message {
        id: MessageId(id),
        channel_id: channel,
        guild_id: Some(GUILD),
        author,
        author_is_bot: false,
        content: content.to_string(),
        reply_to: None,
    }
}

#[derive(Default)]
struct Inner {
    /// Newest first per channel.
    history: Mutex<HashMap<ChannelId, Vec<Message>>>,
    channels: Mutex<HashMap<ChannelId, ChannelInfo>>,
    threads: Mutex<Vec<(ChannelId, Thread)>>,
    sends: Mutex<Vec<(ChannelId, String)>>,
    deletes: Mutex<Vec<MessageRef>>,
    page_requests: Mutex<Vec<Option<MessageId>>>,
    next_id: AtomicU64,
    fail_pages_after: Mutex<Option<usize>>,
    pages_served: AtomicUsize,
    fail_sends: AtomicBool,
    deny_deletes: AtomicBool,
}

#[derive(Clone, Default)]
pub struct FakePlatform {
    inner: Arc<Inner>,
}

impl FakePlatform {
    pub fn set_history(&self, channel: ChannelId, mut newest_first: Vec<Message>) {
        newest_first.sort_by(|a, b| b.id.cmp(&a.id));
        self.inner.history.lock().unwrap().insert(channel, newest_first);
    }

    pub fn add_message(&self, message: Message) {
        let mut history = self.inner.history.lock().unwrap();
        let list = history.entry(message.channel_id).or_default();
        list.push(message);
        list.sort_by(|a, b| b.id.cmp(&a.id));
    }

    pub fn add_channel(&self, id: ChannelId, name: &str, kind: ChannelKind) {
        self.inner.channels.lock().unwrap().insert(
            id,
            ChannelInfo {
                id,
                name: name.to_string(),
                kind,
            },
        );
    }

    pub fn add_thread(&self, container: ChannelId, thread: Thread) {
        self.inner.threads.lock().unwrap().push((container, thread));
    }

    pub fn fail_pages_after(&self, pages: usize) {
        *self.inner.fail_pages_after.lock().unwrap() = Some(pages);
    }

    pub fn fail_sends(&self, fail: bool) {
        self.inner.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn deny_deletes(&self, deny: bool) {
        self.inner.deny_deletes.store(deny, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<(ChannelId, String)> {
        self.inner.sends.lock().unwrap().clone()
    }

    pub fn deleted(&self) -> Vec<MessageRef> {
        self.inner.deletes.lock().unwrap().clone()
    }

    pub fn threads_in(&self, container: ChannelId) -> Vec<Thread> {
        self.inner
            .threads
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| *c == container)
            .map(|(_, t)| t.clone())
            .collect()
    }

    pub fn page_requests(&self) -> Vec<Option<MessageId>> {
        self.inner.page_requests.lock().unwrap().clone()
    }

    fn alloc_id(&self) -> u64 {
        // Far above hand-written test ids so allocated messages sort newest.
        1_000_000 + self.inner.next_id.fetch_add(1, Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatPlatform for FakePlatform {
    async fn fetch_message(&self, channel: ChannelId, id: MessageId) -> Result<Message> {
        self.inner
            .history
            .lock()
            .unwrap()
            .get(&channel)
            .and_then(|list| list.iter().find(|m| m.id == id).cloned())
            .ok_or_else(|| Error::NotFound(format!("message {id} in {channel}")))
    }

    async fn fetch_messages_page(
        &self,
        channel: ChannelId,
        before: Option<MessageId>,
        limit: u8,
    ) -> Result<Vec<Message>> {
        self.inner.page_requests.lock().unwrap().push(before);
        let served = self.inner.pages_served.fetch_add(1, Ordering::SeqCst);
        if let Some(limit_pages) = *self.inner.fail_pages_after.lock().unwrap() {
            if served >= limit_pages {
                return Err(Error::FetchFailed("simulated page failure".to_string()));
            }
        }

        let history = self.inner.history.lock().unwrap();
        let list = history.get(&channel).cloned().unwrap_or_default();
        Ok(list
            .into_iter()
            .filter(|m| before.map(|b| m.id < b).unwrap_or(true))
            .take(limit as usize)
            .collect())
    }

    async fn channel_info(&self, channel: ChannelId) -> Result<ChannelInfo> {
        self.inner
            .channels
            .lock()
            .unwrap()
            .get(&channel)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("channel {channel}")))
    }

    async fn send_message(&self, channel: ChannelId, text: &str) -> Result<MessageRef> {
        if self.inner.fail_sends.load(Ordering::SeqCst) {
            return Err(Error::FetchFailed("simulated send failure".to_string()));
        }
        self.inner
            .sends
            .lock()
            .unwrap()
            .push((channel, text.to_string()));
        Ok(MessageRef {
            channel_id: channel,
            message_id: MessageId(self.alloc_id()),
        })
    }

    async fn delete_message(&self, msg: MessageRef) -> Result<()> {
        if self.inner.deny_deletes.load(Ordering::SeqCst) {
            return Err(Error::PermissionDenied("missing manage messages".to_string()));
        }
        self.inner.deletes.lock().unwrap().push(msg);
        Ok(())
    }

    async fn create_thread(&self, container: ChannelId, title: &str, _body: &str) -> Result<Thread> {
        let id = ChannelId(self.alloc_id());
        let thread = Thread {
            id,
            title: title.to_string(),
            created_at: id.created_at(),
        };
        self.add_thread(container, thread.clone());
        Ok(thread)
    }

    async fn list_threads(&self, container: ChannelId, _include_archived: bool) -> Result<Vec<Thread>> {
        Ok(self.threads_in(container))
    }
}
