use std::sync::Arc;

use serenity::all::Message;
use tracing::{debug, info, warn};

use picl_core::{
    capture,
    domain::MessageRef,
    errors::Error,
    messaging::types::{OutgoingFile, OutgoingMessage},
    photos, texts, Result,
};

use crate::{message_ref, router::AppState};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Command {
    Picl,
    Help,
}

impl Command {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "picl" => Some(Self::Picl),
            "help" => Some(Self::Help),
            _ => None,
        }
    }
}

/// Run a command inside its own log capture.
///
/// The bot's reply becomes the key under which the captured log is stored,
/// including when the command failed and only the generic notice was sent.
pub async fn run_command(state: &Arc<AppState>, msg: &Message, name: &str) {
    let Some(command) = Command::parse(name) else {
        return;
    };
    let origin = message_ref(msg);
    let user = msg.author.id.get();

    capture::run_captured(
        &state.logs,
        state.messenger.as_ref(),
        origin.channel_id,
        async {
            info!(?command, user, "command invoked");
            dispatch(state, command, origin).await
        },
    )
    .await;
}

async fn dispatch(state: &AppState, command: Command, origin: MessageRef) -> Result<MessageRef> {
    match command {
        Command::Picl => send_photo(state, origin).await,
        Command::Help => reply_text(state, origin, texts::help(&state.cfg.command_prefix)).await,
    }
}

async fn reply_text(state: &AppState, origin: MessageRef, text: impl Into<String>) -> Result<MessageRef> {
    state
        .messenger
        .send_message(origin.channel_id, OutgoingMessage::text(text))
        .await
}

async fn send_photo(state: &AppState, origin: MessageRef) -> Result<MessageRef> {
    let dir = &state.cfg.photos_dir;
    let chosen = match photos::pick_photo(dir) {
        Ok(Some(p)) => p,
        Ok(None) => {
            debug!(dir = %dir.display(), "photo directory is empty");
            return reply_text(state, origin, texts::NO_PHOTOS).await;
        }
        Err(Error::NotFound(detail)) => {
            debug!(%detail, "photo directory missing");
            return reply_text(state, origin, texts::PHOTOS_DIR_MISSING).await;
        }
        Err(e) => return Err(e),
    };

    debug!(path = %chosen.display(), "picked photo");
    let data = tokio::fs::read(&chosen).await?;
    let filename = chosen
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "picl.png".to_string());

    let upload = OutgoingMessage::default().with_file(OutgoingFile { filename, data });
    match state.messenger.send_message(origin.channel_id, upload).await {
        Ok(sent) => Ok(sent),
        Err(e) => {
            warn!(error = %e, "photo upload failed");
            reply_text(state, origin, texts::PHOTO_SEND_FAILED).await
        }
    }
}
