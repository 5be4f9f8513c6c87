use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use tokio::time::{sleep_until, Instant};

use crate::{
    domain::{ChannelId, ChannelInfo, Message, MessageId, MessageRef, Thread},
    platform::port::ChatPlatform,
    Result,
};

#[derive(Clone, Copy, Debug)]
pub struct ThrottleConfig {
    /// Minimum spacing between any two outbound calls.
    pub global_min_interval: Duration,
    /// Minimum spacing between calls that touch the same channel.
    pub per_channel_min_interval: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            global_min_interval: Duration::from_millis(20),
            per_channel_min_interval: Duration::from_millis(250),
        }
    }
}

/// Earliest start times handed out so far.
#[derive(Debug, Default)]
struct Schedule {
    any: Option<Instant>,
    channels: HashMap<ChannelId, Instant>,
}

/// Hands out start slots that respect both spacing rules at once.
///
/// A slot is booked against the global and the channel timeline in one step,
/// so two callers can never be given the same instant.
#[derive(Debug)]
struct Pacer {
    cfg: ThrottleConfig,
    schedule: Mutex<Schedule>,
}

impl Pacer {
    fn new(cfg: ThrottleConfig) -> Self {
        Self {
            cfg,
            schedule: Mutex::new(Schedule::default()),
        }
    }

    /// Book the next start slot for a call on `channel`.
    fn book(&self, channel: ChannelId, now: Instant) -> Instant {
        let mut sched = self.schedule.lock().unwrap_or_else(|p| p.into_inner());

        let after_any = sched.any.map_or(now, |t| t + self.cfg.global_min_interval);
        let after_channel = sched
            .channels
            .get(&channel)
            .map_or(now, |t| *t + self.cfg.per_channel_min_interval);
        let slot = now.max(after_any).max(after_channel);

        sched.any = Some(slot);
        sched.channels.insert(channel, slot);
        // Channels idle past their interval impose nothing; drop them.
        let idle = self.cfg.per_channel_min_interval;
        sched.channels.retain(|_, t| *t + idle > now);
        slot
    }

    async fn wait_turn(&self, channel: ChannelId) {
        let slot = self.book(channel, Instant::now());
        sleep_until(slot).await;
    }
}

/// ChatPlatform decorator that paces outbound calls.
///
/// Keeps bursts (history scans, several cross-posts at once) under the
/// platform's rate limits. The SDK still handles the hard 429 buckets.
pub struct ThrottledPlatform {
    inner: Arc<dyn ChatPlatform>,
    pacer: Pacer,
}

impl ThrottledPlatform {
    pub fn new(inner: Arc<dyn ChatPlatform>, cfg: ThrottleConfig) -> Self {
        Self {
            inner,
            pacer: Pacer::new(cfg),
        }
    }
}

#[async_trait::async_trait]
impl ChatPlatform for ThrottledPlatform {
    async fn fetch_message(&self, channel: ChannelId, id: MessageId) -> Result<Message> {
        self.pacer.wait_turn(channel).await;
        self.inner.fetch_message(channel, id).await
    }

    async fn fetch_messages_page(
        &self,
        channel: ChannelId,
        before: Option<MessageId>,
        limit: u8,
    ) -> Result<Vec<Message>> {
        self.pacer.wait_turn(channel).await;
        self.inner.fetch_messages_page(channel, before, limit).await
    }

    async fn channel_info(&self, channel: ChannelId) -> Result<ChannelInfo> {
        self.pacer.wait_turn(channel).await;
        self.inner.channel_info(channel).await
    }

    async fn send_message(&self, channel: ChannelId, text: &str) -> Result<MessageRef> {
        self.pacer.wait_turn(channel).await;
        self.inner.send_message(channel, text).await
    }

    async fn delete_message(&self, msg: MessageRef) -> Result<()> {
        self.pacer.wait_turn(msg.channel_id).await;
        self.inner.delete_message(msg).await
    }

    async fn create_thread(&self, container: ChannelId, title: &str, body: &str) -> Result<Thread> {
        self.pacer.wait_turn(container).await;
        self.inner.create_thread(container, title, body).await
    }

    async fn list_threads(&self, container: ChannelId, include_archived: bool) -> Result<Vec<Thread>> {
        self.pacer.wait_turn(container).await;
        self.inner.list_threads(container, include_archived).await
    }
}
