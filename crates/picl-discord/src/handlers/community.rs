use std::sync::Arc;

use serenity::all::Message;
use tracing::debug;

use picl_core::{
    capture,
    domain::{Attachment, MessageId, UserId},
    messaging::types::OutgoingMessage,
    relay::{DeliveryOutcome, RelayReply},
    texts,
    utils::parse_command,
};

use crate::{message_ref, router::AppState};

use super::commands;

pub async fn handle_community(msg: Message, state: Arc<AppState>) {
    let origin = message_ref(&msg);
    state
        .tracker
        .record_activity(UserId(msg.author.id.get()));

    let replied_to = msg
        .message_reference
        .as_ref()
        .and_then(|r| r.message_id)
        .map(|id| MessageId(id.get()));

    if let Some(replied_to) = replied_to {
        if state.relay.is_relay_channel(origin.channel_id) {
            let reply = RelayReply {
                replied_to,
                content: msg.content.clone(),
                attachments: msg
                    .attachments
                    .iter()
                    .map(|a| Attachment {
                        filename: a.filename.clone(),
                        url: a.url.clone(),
                    })
                    .collect(),
                source: origin,
            };
            let outcome = state.relay.on_relay_reply(&reply).await;
            if outcome != DeliveryOutcome::NotRelayed {
                debug!(?outcome, "relay reply handled");
                return;
            }
        }

        if is_log_request(&state.cfg.command_prefix, &msg.content) && replies_to_bot(&msg, &state)
        {
            capture::reply_with_log(&state.logs, state.messenger.as_ref(), origin, replied_to)
                .await;
            return;
        }
    }

    if texts::is_what(&msg.content)
        && state.platform.parent_category(origin.channel_id).await
            == Some(state.cfg.what_category)
    {
        if let Err(e) = state
            .messenger
            .send_message(origin.channel_id, OutgoingMessage::reply(origin, texts::WHAT_REPLY))
            .await
        {
            debug!(error = %e, "keyword reply not sent");
        }
        return;
    }

    if let Some((name, _args)) = parse_command(&state.cfg.command_prefix, &msg.content) {
        commands::run_command(&state, &msg, &name).await;
    }
}

fn is_log_request(prefix: &str, content: &str) -> bool {
    matches!(parse_command(prefix, content), Some((name, rest)) if name == "log" && rest.is_empty())
}

fn replies_to_bot(msg: &Message, state: &AppState) -> bool {
    msg.referenced_message
        .as_ref()
        .map(|m| UserId(m.author.id.get()) == state.platform.current_user_id())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_request_needs_prefix_and_exact_name() {
        assert!(is_log_request("!", "!log"));
        assert!(is_log_request("!", "  !LOG "));
        assert!(!is_log_request("!", "log"));
        assert!(!is_log_request("!", "!logs"));
        assert!(!is_log_request("!", "!log please"));
        assert!(!is_log_request("?", "!log"));
    }
}
