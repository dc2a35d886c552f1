//! Console front-end
//!
//! Prints every rendered message to stdout and appends it to a JSON-lines
//! transcript so a session can be reviewed after the fact.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use netops_chat::MessageSink;
use netops_core::{ChatMessage, EngineError, NoticeLevel, Result, Sender};
use tracing::debug;

pub struct ConsoleSink {
    transcript: Mutex<File>,
    path: PathBuf,
}

impl ConsoleSink {
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| {
                EngineError::config(format!(
                    "Cannot open transcript {}: {}",
                    path.display(),
                    e
                ))
            })?;
        debug!(path = %path.display(), "transcript opened");
        Ok(Self {
            transcript: Mutex::new(file),
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, message: &ChatMessage) -> Result<()> {
        let mut line = serde_json::to_vec(message)?;
        line.push(b'\n');
        let mut file = self
            .transcript
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        file.write_all(&line)
            .map_err(|e| EngineError::internal(format!("transcript write failed: {}", e)))
    }
}

/// One console line for `message`
pub fn render(message: &ChatMessage) -> String {
    let time = message.timestamp.format("%H:%M:%S");
    match message.sender {
        Sender::User => format!("[{}] You: {}", time, message.text),
        Sender::Assistant => format!("[{}] AI: {}", time, message.text),
        Sender::Relay => format!(
            "[{}] {} (Webex): {}",
            time,
            message.person_email.as_deref().unwrap_or("unknown"),
            message.text
        ),
        Sender::System => {
            let tag = match message.level.unwrap_or(NoticeLevel::Info) {
                NoticeLevel::Info => "info",
                NoticeLevel::Success => "ok",
                NoticeLevel::Warning => "warn",
                NoticeLevel::Error => "error",
                NoticeLevel::Cancelled => "cancelled",
            };
            format!("[{}] ({}) {}", time, tag, message.text)
        }
    }
}

#[async_trait]
impl MessageSink for ConsoleSink {
    async fn deliver(&self, message: &ChatMessage) -> Result<()> {
        println!("{}", render(message));
        self.append(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("netops-{}-{}.jsonl", name, std::process::id()))
    }

    #[test]
    fn test_render_by_sender() {
        let notice = ChatMessage::notice(NoticeLevel::Cancelled, "Action 'cycle_port' cancelled by user.");
        assert!(render(&notice).ends_with("(cancelled) Action 'cycle_port' cancelled by user."));

        let relay = ChatMessage::relay("status?", "alice@example.com");
        assert!(render(&relay).ends_with("alice@example.com (Webex): status?"));
    }

    #[tokio::test]
    async fn test_transcript_gets_one_line_per_message() {
        let path = temp_path("transcript");
        let _ = std::fs::remove_file(&path);
        let sink = ConsoleSink::open(&path).unwrap();

        sink.deliver(&ChatMessage::user("hello")).await.unwrap();
        sink.deliver(&ChatMessage::assistant("hi there")).await.unwrap();

        let text = std::fs::read_to_string(sink.path()).unwrap();
        let lines: Vec<ChatMessage> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1].sender, Sender::Assistant);
        let _ = std::fs::remove_file(&path);
    }
}
