//! Gateway event handlers.
//!
//! Each handler converts serenity models into core types and calls into
//! `picl-core`. Nothing here surfaces an error to the gateway: failures are
//! logged and swallowed.

use std::sync::Arc;

use serenity::all::{Member, Message};

use crate::router::AppState;

mod commands;
mod community;
mod direct;
mod welcome;

pub async fn handle_message(msg: Message, state: Arc<AppState>) {
    if msg.author.bot {
        return;
    }

    if msg.guild_id.is_none() {
        return direct::handle_direct(msg, state).await;
    }

    community::handle_community(msg, state).await
}

pub async fn handle_member_join(member: Member, state: Arc<AppState>) {
    welcome::handle_join(member, state).await
}
