use std::sync::Arc;

use serenity::all::Message;
use tracing::debug;

use picl_core::{
    domain::{Attachment, UserId},
    relay::DirectMessage,
};

use crate::{display_name, router::AppState};

pub async fn handle_direct(msg: Message, state: Arc<AppState>) {
    let dm = DirectMessage {
        user_id: UserId(msg.author.id.get()),
        display_name: display_name(&msg.author),
        content: msg.content.clone(),
        attachments: msg
            .attachments
            .iter()
            .map(|a| Attachment {
                filename: a.filename.clone(),
                url: a.url.clone(),
            })
            .collect(),
    };

    let outcome = state.relay.on_direct_message(&dm).await;
    debug!(user = dm.user_id.0, ?outcome, "direct message handled");
}
