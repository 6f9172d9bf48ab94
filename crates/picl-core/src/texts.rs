//! Static user-facing texts.

use crate::domain::{ChannelId, UserId};

pub const WHAT_KEYWORD: &str = "what";
pub const WHAT_REPLY: &str = "https://i.ibb.co/ccKSZKwj/image.png";

pub const COMMAND_FAILED: &str = "Something went wrong while running that command.";
pub const NO_LOG_RECORDED: &str = "No log recorded for that message.";

/// Stand-in when a community's name cannot be looked up.
pub const UNNAMED_COMMUNITY: &str = "the server";

pub const PHOTOS_DIR_MISSING: &str = "Photos directory not found.";
pub const NO_PHOTOS: &str = "No images available.";
pub const PHOTO_SEND_FAILED: &str = "Couldn't send image.";

/// In-channel welcome for a new member.
pub fn welcome_in_channel(member: UserId, rules: Option<ChannelId>) -> String {
    let mut out = format!("Welcome to the server, <@{}>! 🎉", member.0);
    if let Some(rules) = rules {
        out.push_str(&format!(" Please read the rules in <#{}>.", rules.0));
    }
    out
}

/// Private welcome sent to a new member.
pub fn welcome_direct(community_name: &str, rules: Option<ChannelId>) -> String {
    let mut out = format!("Hi! Welcome to {community_name}. Glad to have you here.");
    if let Some(rules) = rules {
        out.push_str(&format!(" Start with the rules in <#{}>.", rules.0));
    }
    out.push_str(" Say hello in any channel so we know you're around!");
    out
}

pub fn help(prefix: &str) -> String {
    format!(
        "**Picl commands**\n\
`{prefix}picl` - send a random photo\n\
`{prefix}help` - show this message\n\
Reply `{prefix}log` to one of my command responses to see its diagnostic log.\n\
DM me to reach the moderators."
    )
}

/// Whether `content` triggers the `what` keyword reply.
pub fn is_what(content: &str) -> bool {
    content.trim().to_lowercase() == WHAT_KEYWORD
}
