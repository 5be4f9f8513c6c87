use async_trait::async_trait;

use crate::{
    domain::{ChannelId, ChannelInfo, Message, MessageId, MessageRef, Thread},
    Result,
};

/// Platform-imposed ceiling on a single history page.
pub const MAX_PAGE_SIZE: u8 = 100;

/// Request surface of the chat platform.
///
/// Every call is a suspension point. Implementations map "does not exist" to
/// `Error::NotFound`, a rejected request to `Error::PermissionDenied`, and
/// anything else to `Error::FetchFailed`.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    async fn fetch_message(&self, channel: ChannelId, id: MessageId) -> Result<Message>;

    /// Up to `limit` messages strictly older than `before` (or the newest
    /// messages when `before` is `None`), newest first. Empty at the start of
    /// history.
    async fn fetch_messages_page(
        &self,
        channel: ChannelId,
        before: Option<MessageId>,
        limit: u8,
    ) -> Result<Vec<Message>>;

    async fn channel_info(&self, channel: ChannelId) -> Result<ChannelInfo>;

    async fn send_message(&self, channel: ChannelId, text: &str) -> Result<MessageRef>;
    async fn delete_message(&self, msg: MessageRef) -> Result<()>;

    async fn create_thread(&self, container: ChannelId, title: &str, body: &str) -> Result<Thread>;
    async fn list_threads(&self, container: ChannelId, include_archived: bool) -> Result<Vec<Thread>>;
}
