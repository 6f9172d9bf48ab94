use std::sync::Arc;

use serenity::all::Member;
use tracing::debug;

use picl_core::{
    domain::{CommunityId, UserId},
    messaging::types::OutgoingMessage,
    texts,
};

use crate::router::AppState;

pub async fn handle_join(member: Member, state: Arc<AppState>) {
    if member.user.bot {
        return;
    }
    let user = UserId(member.user.id.get());
    let community = CommunityId(member.guild_id.get());
    let rules = state.cfg.rules_channel;

    match state
        .platform
        .welcome_channel(community, state.cfg.welcome_channel)
        .await
    {
        Some(channel) => {
            let text = texts::welcome_in_channel(user, rules);
            if let Err(e) = state
                .messenger
                .send_message(channel, OutgoingMessage::text(text))
                .await
            {
                debug!(channel = channel.0, error = %e, "welcome message not sent");
            }
        }
        None => debug!(community = community.0, "no channel to welcome new member in"),
    }

    let name = match state.community.community_name(community).await {
        Ok(Some(name)) => name,
        Ok(None) => texts::UNNAMED_COMMUNITY.to_string(),
        Err(e) => {
            debug!(community = community.0, error = %e, "community name lookup failed");
            texts::UNNAMED_COMMUNITY.to_string()
        }
    };
    if let Err(e) = state
        .messenger
        .send_direct(user, OutgoingMessage::text(texts::welcome_direct(&name, rules)))
        .await
    {
        debug!(user = user.0, error = %e, "welcome DM not sent");
    }
}
