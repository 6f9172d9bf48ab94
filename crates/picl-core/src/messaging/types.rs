use crate::domain::MessageRef;

/// A message to post.
///
/// Content and embed are both optional; the platform rejects a message with
/// neither content, embed nor files.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub content: Option<String>,
    pub embed: Option<EmbedCard>,
    pub files: Vec<OutgoingFile>,
    pub reply_to: Option<MessageRef>,
}

impl OutgoingMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    pub fn reply(reply_to: MessageRef, content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            reply_to: Some(reply_to),
            ..Default::default()
        }
    }

    pub fn with_file(mut self, file: OutgoingFile) -> Self {
        self.files.push(file);
        self
    }
}

/// Structured card rendered by the platform (Discord embed).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EmbedCard {
    pub author: Option<String>,
    pub description: Option<String>,
    pub fields: Vec<EmbedField>,
    pub footer: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
}

/// File uploaded by content.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutgoingFile {
    pub filename: String,
    pub data: Vec<u8>,
}
