//! Per-invocation log capture.
//!
//! While a command's future is polled inside [`CaptureHandle::scope`], every
//! tracing event emitted on that task is also appended to the invocation's
//! buffer by [`CaptureLayer`]. When the handle is finished (or dropped on an
//! unwinding path) the buffer is stored under the id of the bot's response,
//! where users can later ask for it.

use std::{
    fmt::{self, Write as _},
    future::Future,
    sync::{Arc, Mutex},
};

use tracing::{
    debug, error,
    field::{Field, Visit},
    warn, Event, Subscriber,
};
use tracing_subscriber::{layer::Context, Layer};

use crate::{
    domain::{ChannelId, MessageId, MessageRef},
    messaging::{port::MessagingPort, types::OutgoingMessage},
    store::BoundedMap,
    texts,
    utils::{chunk_chars, tail_chars},
    Result,
};

pub const MAX_LOG_CHARS: usize = 8000;
pub const LOG_CHUNK_CHARS: usize = 1900;

type LineBuffer = Arc<Mutex<Vec<String>>>;
type LogEntries = Arc<Mutex<BoundedMap<MessageId, String>>>;

tokio::task_local! {
    static ACTIVE_CAPTURE: LineBuffer;
}

/// Tracing layer feeding the active capture buffer, if any.
///
/// Events outside any capture scope are ignored here and only reach the
/// other layers.
#[derive(Clone, Copy, Debug, Default)]
pub struct CaptureLayer;

impl<S: Subscriber> Layer<S> for CaptureLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let _ = ACTIVE_CAPTURE.try_with(|buf| {
            let line = format_event(event);
            buf.lock().unwrap_or_else(|e| e.into_inner()).push(line);
        });
    }
}

fn format_event(event: &Event<'_>) -> String {
    let meta = event.metadata();
    let mut visitor = LineVisitor::default();
    event.record(&mut visitor);
    format!(
        "{} {:>5} {}: {}{}",
        chrono::Local::now().format("%H:%M:%S"),
        meta.level(),
        meta.target(),
        visitor.message,
        visitor.fields
    )
}

#[derive(Default)]
struct LineVisitor {
    message: String,
    fields: String,
}

impl Visit for LineVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{value:?}");
        } else {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }
}

/// Store of captured command logs, keyed by response message id.
#[derive(Clone)]
pub struct CommandLogCapture {
    entries: LogEntries,
}

impl CommandLogCapture {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Arc::new(Mutex::new(BoundedMap::new(capacity))),
        }
    }

    /// Open a capture context for one invocation.
    pub fn begin(&self) -> CaptureHandle {
        CaptureHandle {
            lines: Arc::new(Mutex::new(Vec::new())),
            entries: self.entries.clone(),
            response: None,
        }
    }

    /// Close the context and store its log under `response`, if any.
    pub fn end(&self, mut handle: CaptureHandle, response: Option<MessageId>) {
        handle.response = response;
        drop(handle);
    }

    /// The stored log for `response`, split for sequential display.
    ///
    /// `None` means nothing was recorded for that message.
    pub fn retrieve(&self, response: MessageId) -> Option<Vec<String>> {
        let text = self.stored(response)?;
        Some(chunk_chars(&text, LOG_CHUNK_CHARS))
    }

    pub fn stored(&self, response: MessageId) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&response)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One invocation's capture context.
///
/// Storing happens on drop, so the log is kept on every exit path once a
/// response id has been set.
pub struct CaptureHandle {
    lines: LineBuffer,
    entries: LogEntries,
    response: Option<MessageId>,
}

impl CaptureHandle {
    /// Poll `fut` with this context active.
    pub async fn scope<F: Future>(&self, fut: F) -> F::Output {
        ACTIVE_CAPTURE.scope(self.lines.clone(), fut).await
    }

    pub fn set_response(&mut self, response: MessageId) {
        self.response = Some(response);
    }

    /// Snapshot of the lines captured so far.
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        let Some(response) = self.response.take() else {
            return;
        };
        let lines = std::mem::take(&mut *self.lines.lock().unwrap_or_else(|e| e.into_inner()));
        let joined = lines.join("\n");
        let text = tail_chars(&joined, MAX_LOG_CHARS).to_string();
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(response, text);
    }
}

/// Run one command invocation inside a fresh capture.
///
/// `command` yields the bot's response. On `Err` the failure is logged and a
/// generic notice goes to `channel` instead. Whichever message was sent keys
/// the stored log.
pub async fn run_captured<F>(
    logs: &CommandLogCapture,
    messenger: &dyn MessagingPort,
    channel: ChannelId,
    command: F,
) -> Option<MessageRef>
where
    F: Future<Output = Result<MessageRef>>,
{
    let capture = logs.begin();
    let response = capture
        .scope(async {
            match command.await {
                Ok(response) => Some(response),
                Err(e) => {
                    error!(error = ?e, "command failed");
                    match messenger
                        .send_message(channel, OutgoingMessage::text(texts::COMMAND_FAILED))
                        .await
                    {
                        Ok(notice) => Some(notice),
                        Err(e) => {
                            warn!(error = %e, "failure notice not sent");
                            None
                        }
                    }
                }
            }
        })
        .await;
    logs.end(capture, response.map(|r| r.message_id));
    response
}

/// Answer `request`, a reply asking for the log of `response`.
///
/// Sends the stored chunks in order, or a "no log" notice. Returns the number
/// of chunks sent.
pub async fn reply_with_log(
    logs: &CommandLogCapture,
    messenger: &dyn MessagingPort,
    request: MessageRef,
    response: MessageId,
) -> usize {
    let Some(chunks) = logs.retrieve(response) else {
        if let Err(e) = messenger
            .send_message(
                request.channel_id,
                OutgoingMessage::reply(request, texts::NO_LOG_RECORDED),
            )
            .await
        {
            debug!(error = %e, "no-log notice not sent");
        }
        return 0;
    };

    let mut sent = 0;
    for chunk in chunks {
        let text = format!("```\n{chunk}\n```");
        if let Err(e) = messenger
            .send_message(request.channel_id, OutgoingMessage::text(text))
            .await
        {
            debug!(error = %e, "log chunk not sent");
            break;
        }
        sent += 1;
    }
    sent
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{testing::FakePlatform, Error};
    use tracing::info;
    use tracing_subscriber::layer::SubscriberExt;

    fn subscriber() -> tracing::subscriber::DefaultGuard {
        tracing::subscriber::set_default(tracing_subscriber::registry().with(CaptureLayer))
    }

    #[tokio::test]
    async fn captures_only_inside_scope() {
        let _guard = subscriber();
        let logs = CommandLogCapture::new(10);

        let handle = logs.begin();
        assert!(handle.lines().is_empty());

        info!("outside before");
        handle
            .scope(async {
                info!(user = 5, "inside");
                warn!("second");
            })
            .await;
        info!("outside after");

        let lines = handle.lines();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("INFO"));
        assert!(lines[0].contains("inside user=5"));
        assert!(lines[1].contains("WARN"));
        assert!(lines[1].ends_with("second"));

        logs.end(handle, Some(MessageId(1)));
        let stored = logs.stored(MessageId(1)).unwrap();
        assert_eq!(stored.lines().count(), 2);
    }

    #[tokio::test]
    async fn nothing_stored_without_response() {
        let _guard = subscriber();
        let logs = CommandLogCapture::new(10);
        let handle = logs.begin();
        handle.scope(async { info!("work") }).await;
        logs.end(handle, None);
        assert!(logs.is_empty());
        assert!(logs.retrieve(MessageId(1)).is_none());
    }

    #[tokio::test]
    async fn long_log_is_tail_truncated_and_chunked() {
        let logs = CommandLogCapture::new(10);
        let handle = logs.begin();
        {
            let mut lines = handle.lines.lock().unwrap();
            // 90 lines of 99 chars + newline separators = 8999 chars.
            for i in 0..90 {
                lines.push(format!("{:0>99}", i));
            }
        }
        logs.end(handle, Some(MessageId(2)));

        let stored = logs.stored(MessageId(2)).unwrap();
        assert_eq!(stored.chars().count(), MAX_LOG_CHARS);
        assert!(stored.ends_with("89"));

        let chunks = logs.retrieve(MessageId(2)).unwrap();
        assert_eq!(chunks.len(), 5);
        assert!(chunks.iter().all(|c| c.chars().count() <= LOG_CHUNK_CHARS));
        assert_eq!(chunks.concat(), stored);
    }

    #[tokio::test]
    async fn failed_command_stores_log_under_notice() {
        let _guard = subscriber();
        let logs = CommandLogCapture::new(10);
        let platform = FakePlatform::new();

        let response = run_captured(&logs, &platform, ChannelId(9), async {
            info!("about to fail");
            Err(Error::External("boom".to_string()))
        })
        .await
        .unwrap();

        let sent = platform.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, ChannelId(9));
        assert_eq!(sent[0].1.content.as_deref(), Some(texts::COMMAND_FAILED));

        let stored = logs.stored(response.message_id).unwrap();
        assert!(stored.contains("about to fail"));
        assert!(stored.contains("command failed"));
        assert!(stored.contains("boom"));
    }

    #[tokio::test]
    async fn successful_command_stores_log_under_response() {
        let _guard = subscriber();
        let logs = CommandLogCapture::new(10);
        let platform = FakePlatform::new();

        let response = run_captured(&logs, &platform, ChannelId(9), async {
            info!(user = 3, "command invoked");
            platform.send_message(ChannelId(9), OutgoingMessage::text("hi")).await
        })
        .await
        .unwrap();

        assert_eq!(platform.sent.lock().unwrap().len(), 1);
        assert!(logs
            .stored(response.message_id)
            .unwrap()
            .contains("command invoked user=3"));
    }

    #[tokio::test]
    async fn nothing_stored_when_notice_cannot_be_sent() {
        let _guard = subscriber();
        let logs = CommandLogCapture::new(10);
        let platform = FakePlatform::new();
        platform.fail_send_to(ChannelId(9));

        let response = run_captured(&logs, &platform, ChannelId(9), async {
            Err(Error::External("boom".to_string()))
        })
        .await;

        assert!(response.is_none());
        assert!(logs.is_empty());
    }

    #[tokio::test]
    async fn unknown_response_gets_no_log_reply() {
        let logs = CommandLogCapture::new(10);
        let platform = FakePlatform::new();
        let request = MessageRef {
            channel_id: ChannelId(9),
            message_id: MessageId(50),
        };

        let chunks = reply_with_log(&logs, &platform, request, MessageId(404)).await;

        assert_eq!(chunks, 0);
        let sent = platform.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1.content.as_deref(), Some(texts::NO_LOG_RECORDED));
        assert_eq!(sent[0].1.reply_to, Some(request));
    }

    #[tokio::test]
    async fn failed_no_log_reply_is_logged_not_raised() {
        let _guard = subscriber();
        let logs = CommandLogCapture::new(10);
        let platform = FakePlatform::new();
        platform.fail_send_to(ChannelId(9));
        let request = MessageRef {
            channel_id: ChannelId(9),
            message_id: MessageId(50),
        };

        let outer = logs.begin();
        let chunks = outer
            .scope(reply_with_log(&logs, &platform, request, MessageId(404)))
            .await;

        assert_eq!(chunks, 0);
        assert!(platform.sent.lock().unwrap().is_empty());
        assert!(outer
            .lines()
            .iter()
            .any(|l| l.contains("DEBUG") && l.contains("no-log notice not sent")));
    }

    #[tokio::test]
    async fn stored_log_is_replied_in_chunk_order() {
        let logs = CommandLogCapture::new(10);
        let platform = FakePlatform::new();
        let mut handle = logs.begin();
        handle
            .lines
            .lock()
            .unwrap()
            .extend((0..90).map(|i| format!("{:0>99}", i)));
        handle.set_response(MessageId(7));
        drop(handle);

        let request = MessageRef {
            channel_id: ChannelId(9),
            message_id: MessageId(51),
        };
        let chunks = reply_with_log(&logs, &platform, request, MessageId(7)).await;

        assert_eq!(chunks, 5);
        let sent = platform.sent.lock().unwrap();
        let shown: Vec<String> = sent
            .iter()
            .map(|(_, m)| {
                let text = m.content.clone().unwrap();
                text.strip_prefix("```\n")
                    .and_then(|t| t.strip_suffix("\n```"))
                    .unwrap()
                    .to_string()
            })
            .collect();
        assert_eq!(shown.concat(), logs.stored(MessageId(7)).unwrap());
    }

    #[tokio::test]
    async fn panic_after_response_still_stores() {
        let _guard = subscriber();
        let logs = CommandLogCapture::new(10);
        let task_logs = logs.clone();

        let joined = tokio::spawn(async move {
            let mut handle = task_logs.begin();
            handle.set_response(MessageId(4));
            handle
                .scope(async {
                    info!("replied");
                    panic!("handler bug");
                })
                .await;
        })
        .await;

        assert!(joined.is_err());
        assert!(logs.stored(MessageId(4)).unwrap().contains("replied"));
    }

    #[tokio::test]
    async fn store_is_bounded() {
        let logs = CommandLogCapture::new(2);
        for id in 1..=3 {
            let mut h = logs.begin();
            h.set_response(MessageId(id));
            drop(h);
        }
        assert_eq!(logs.len(), 2);
        assert!(logs.stored(MessageId(1)).is_none());
    }
}
