//! Bridges private messages and the moderation channel.
//!
//! A DM is forwarded to the relay channel as an embed; a moderator replying to
//! that embed gets their reply delivered back to the original sender.

use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use crate::{
    domain::{Attachment, ChannelId, MessageId, MessageRef, UserId},
    messaging::{
        port::MessagingPort,
        types::{EmbedCard, EmbedField, OutgoingFile, OutgoingMessage},
    },
    store::BoundedMap,
    utils::truncate_with_marker,
};

pub const DELIVERED_REACTION: &str = "✅";
pub const FAILED_REACTION: &str = "⚠️";

pub const MAX_FORWARD_CHARS: usize = 4000;
pub const MAX_REPLY_CHARS: usize = 1900;
pub const MAX_REPLY_ATTACHMENTS: usize = 5;

const FORWARD_FOOTER: &str = "Reply to this message to respond to the user";

/// An inbound private message.
#[derive(Clone, Debug)]
pub struct DirectMessage {
    pub user_id: UserId,
    pub display_name: String,
    pub content: String,
    pub attachments: Vec<Attachment>,
}

/// A moderator's reply posted in the relay channel.
#[derive(Clone, Debug)]
pub struct RelayReply {
    pub replied_to: MessageId,
    pub content: String,
    pub attachments: Vec<Attachment>,
    /// The moderator's message; receives the outcome reaction.
    pub source: MessageRef,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ForwardOutcome {
    Forwarded(MessageRef),
    Disabled,
    ChannelUnavailable,
    SendFailed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryOutcome {
    NotRelayed,
    UserUnavailable,
    Delivered,
    Failed,
}

pub struct RelayRouter {
    relay_channel: Option<ChannelId>,
    messenger: Arc<dyn MessagingPort>,
    mappings: Mutex<BoundedMap<MessageId, UserId>>,
}

impl RelayRouter {
    pub fn new(
        relay_channel: Option<ChannelId>,
        messenger: Arc<dyn MessagingPort>,
        capacity: usize,
    ) -> Self {
        Self {
            relay_channel,
            messenger,
            mappings: Mutex::new(BoundedMap::new(capacity)),
        }
    }

    pub fn is_relay_channel(&self, channel: ChannelId) -> bool {
        self.relay_channel == Some(channel)
    }

    /// Original sender of a forwarded message, if it is still mapped.
    pub fn sender_of(&self, forwarded: MessageId) -> Option<UserId> {
        self.mappings
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&forwarded)
            .copied()
    }

    pub fn mapping_count(&self) -> usize {
        self.mappings.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Forward a DM to the relay channel. Never fails outward.
    pub async fn on_direct_message(&self, dm: &DirectMessage) -> ForwardOutcome {
        let Some(configured) = self.relay_channel else {
            return ForwardOutcome::Disabled;
        };

        let channel = match self.messenger.resolve_channel(configured).await {
            Ok(Some(c)) => c,
            Ok(None) => {
                debug!(channel = configured.0, "relay channel not found; dropping DM");
                return ForwardOutcome::ChannelUnavailable;
            }
            Err(e) => {
                debug!(channel = configured.0, error = %e, "relay channel lookup failed; dropping DM");
                return ForwardOutcome::ChannelUnavailable;
            }
        };

        match self.messenger.send_message(channel, build_forward(dm)).await {
            Ok(forwarded) => {
                // Registered before returning so a fast moderator reply finds it.
                self.mappings
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .insert(forwarded.message_id, dm.user_id);
                info!(user = dm.user_id.0, forwarded = forwarded.message_id.0, "forwarded DM");
                ForwardOutcome::Forwarded(forwarded)
            }
            Err(e) => {
                warn!(user = dm.user_id.0, error = %e, "failed to forward DM");
                ForwardOutcome::SendFailed
            }
        }
    }

    /// Deliver a moderator's reply to the user behind the forwarded message.
    ///
    /// One delivery attempt per call; the outcome is reported only through a
    /// reaction on the moderator's message.
    pub async fn on_relay_reply(&self, reply: &RelayReply) -> DeliveryOutcome {
        let Some(user) = self.sender_of(reply.replied_to) else {
            return DeliveryOutcome::NotRelayed;
        };

        let target = match self.messenger.resolve_user(user).await {
            Ok(Some(profile)) => profile.user_id,
            Ok(None) => {
                debug!(user = user.0, "relay target no longer exists");
                return DeliveryOutcome::UserUnavailable;
            }
            Err(e) => {
                debug!(user = user.0, error = %e, "relay target lookup failed");
                return DeliveryOutcome::UserUnavailable;
            }
        };

        let mut out = OutgoingMessage::default();
        if !reply.content.trim().is_empty() {
            out.content = Some(truncate_with_marker(&reply.content, MAX_REPLY_CHARS, "…"));
        }
        for att in reply.attachments.iter().take(MAX_REPLY_ATTACHMENTS) {
            match self.messenger.download(&att.url).await {
                Ok(data) => out.files.push(OutgoingFile {
                    filename: att.filename.clone(),
                    data,
                }),
                Err(e) => warn!(file = %att.filename, error = %e, "skipping relay attachment"),
            }
        }

        let (outcome, emoji) = match self.messenger.send_direct(target, out).await {
            Ok(_) => {
                info!(user = target.0, "delivered relay reply");
                (DeliveryOutcome::Delivered, DELIVERED_REACTION)
            }
            Err(e) => {
                warn!(user = target.0, error = %e, "relay reply not delivered");
                (DeliveryOutcome::Failed, FAILED_REACTION)
            }
        };

        if let Err(e) = self.messenger.add_reaction(reply.source, emoji).await {
            debug!(error = %e, "could not mark relay outcome");
        }
        outcome
    }
}

fn build_forward(dm: &DirectMessage) -> OutgoingMessage {
    let description = if dm.content.trim().is_empty() {
        None
    } else {
        Some(truncate_with_marker(&dm.content, MAX_FORWARD_CHARS, "…"))
    };

    let mut fields = Vec::new();
    if !dm.attachments.is_empty() {
        let links = dm
            .attachments
            .iter()
            .map(|a| a.url.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        fields.push(EmbedField {
            name: "Attachments".to_string(),
            // Field values are capped at 1024 by the platform.
            value: truncate_with_marker(&links, 1000, "…"),
        });
    }

    OutgoingMessage {
        embed: Some(EmbedCard {
            author: Some(format!("{} ({})", dm.display_name, dm.user_id.0)),
            description,
            fields,
            footer: Some(FORWARD_FOOTER.to_string()),
        }),
        ..Default::default()
    }
}
