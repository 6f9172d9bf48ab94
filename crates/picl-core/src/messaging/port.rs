use async_trait::async_trait;

use crate::{
    domain::{ChannelId, CommunityId, HistoryEntry, MemberRecord, MessageRef, UserId, UserProfile},
    messaging::types::OutgoingMessage,
    Result,
};

/// Outbound messaging port.
///
/// Discord is the only implementation; the core never touches the SDK directly.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    async fn send_message(&self, channel: ChannelId, msg: OutgoingMessage) -> Result<MessageRef>;

    /// Open (or reuse) a private channel with `user` and send `msg` there.
    async fn send_direct(&self, user: UserId, msg: OutgoingMessage) -> Result<MessageRef>;

    async fn add_reaction(&self, msg: MessageRef, emoji: &str) -> Result<()>;

    /// Resolve a channel from the cache, falling back to a single fetch.
    ///
    /// `Ok(None)` means the platform reported the channel as unknown.
    async fn resolve_channel(&self, channel: ChannelId) -> Result<Option<ChannelId>>;

    /// Resolve a user from the cache, falling back to a single fetch.
    async fn resolve_user(&self, user: UserId) -> Result<Option<UserProfile>>;

    /// Download attachment content by URL.
    async fn download(&self, url: &str) -> Result<Vec<u8>>;
}

/// Community/membership port used by activity seeding and enforcement.
#[async_trait]
pub trait CommunityPort: Send + Sync {
    /// The first community the bot is a member of.
    async fn primary_community(&self) -> Result<Option<CommunityId>>;

    /// Display name of `community`. `Ok(None)` when the platform has none.
    async fn community_name(&self, community: CommunityId) -> Result<Option<String>>;

    async fn can_remove_members(&self, community: CommunityId) -> Result<bool>;

    async fn list_members(&self, community: CommunityId) -> Result<Vec<MemberRecord>>;

    async fn remove_member(&self, community: CommunityId, user: UserId, reason: &str)
        -> Result<()>;

    /// Every text channel, across all communities, the bot may be able to read.
    async fn readable_channels(&self) -> Result<Vec<ChannelId>>;

    /// Up to `limit` most recent messages in `channel`, newest first.
    async fn recent_messages(&self, channel: ChannelId, limit: usize) -> Result<Vec<HistoryEntry>>;
}
