//! Notification sink.
//!
//! "Send a message to the user" — fire-and-forget with logged failure. The
//! default sink shells out to a configured command (notify-send,
//! terminal-notifier, a webhook script); tests substitute a recorder.

use std::process::Command;

use crate::types::NotifierConfig;

pub trait Notifier: Send + Sync {
    fn send(&self, title: &str, body: &str) -> Result<(), String>;
}

/// Sink invoking `<command> [args..] <title> <body>`
pub struct CommandNotifier {
    command: String,
    args: Vec<String>,
}

impl CommandNotifier {
    pub fn new(config: &NotifierConfig) -> Self {
        Self {
            command: config.command.clone(),
            args: config.args.clone(),
        }
    }
}

impl Notifier for CommandNotifier {
    fn send(&self, title: &str, body: &str) -> Result<(), String> {
        let status = Command::new(&self.command)
            .args(&self.args)
            .arg(title)
            .arg(body)
            .status()
            .map_err(|e| format!("Failed to run {}: {}", self.command, e))?;

        if status.success() {
            Ok(())
        } else {
            Err(format!("{} exited with {}", self.command, status))
        }
    }
}

/// Send, logging (not propagating) failure.
pub fn send_best_effort(notifier: &dyn Notifier, title: &str, body: &str) {
    if let Err(e) = notifier.send(title, body) {
        log::warn!("Notification '{}' failed: {}", title, e);
    }
}

#[cfg(test)]
pub mod testing {
    use super::Notifier;
    use std::sync::Mutex;

    /// Records every (title, body) it is asked to send.
    #[derive(Default)]
    pub struct RecordingNotifier {
        pub sent: Mutex<Vec<(String, String)>>,
    }

    impl Notifier for RecordingNotifier {
        fn send(&self, title: &str, body: &str) -> Result<(), String> {
            self.sent
                .lock()
                .unwrap()
                .push((title.to_string(), body.to_string()));
            Ok(())
        }
    }

    impl RecordingNotifier {
        pub fn count(&self) -> usize {
            self.sent.lock().unwrap().len()
        }

        pub fn titles(&self) -> Vec<String> {
            self.sent.lock().unwrap().iter().map(|(t, _)| t.clone()).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_notifier_success() {
        let notifier = CommandNotifier::new(&NotifierConfig {
            command: "true".to_string(),
            args: vec![],
        });
        assert!(notifier.send("title", "body").is_ok());
    }

    #[test]
    fn test_command_notifier_failure_is_err() {
        let notifier = CommandNotifier::new(&NotifierConfig {
            command: "false".to_string(),
            args: vec![],
        });
        assert!(notifier.send("title", "body").is_err());
    }

    #[test]
    fn test_send_best_effort_swallows_failure() {
        let notifier = CommandNotifier::new(&NotifierConfig {
            command: "/nonexistent/notifier".to_string(),
            args: vec![],
        });
        // Must not panic or propagate
        send_best_effort(&notifier, "title", "body");
    }
}
