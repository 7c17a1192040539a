//! Popup process controller.
//!
//! Owns at most one live UI process per meeting-group key. An alert either
//! escalates the running popup over its stdin or spawns a fresh one seeded
//! with the full group payload. A failed write to a believed-live process
//! means the channel is broken: the handle is discarded and a replacement
//! spawned immediately. Exit watcher tasks remove handles asynchronously
//! and log abnormal exit codes; they never crash the scheduler.

pub mod protocol;

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::EngineError;
use crate::grouping::group_for_event;
use crate::types::{AlertLevel, CalendarEvent, PopupConfig};
use self::protocol::{encode_line, parse_lifecycle, MeetingSummary, PopupMessage};

type ActiveMap = Arc<Mutex<HashMap<DateTime<Utc>, PopupHandle>>>;

struct PopupHandle {
    /// Correlates log lines across the handle and its watcher task.
    id: Uuid,
    stdin: ChildStdin,
    kill_tx: Option<oneshot::Sender<()>>,
    watcher: JoinHandle<()>,
}

pub struct PopupController {
    command: String,
    args: Vec<String>,
    active: ActiveMap,
}

impl PopupController {
    pub fn new(config: &PopupConfig) -> Self {
        Self {
            command: config.command.clone(),
            args: config.args.clone(),
            active: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Raise an alert for an event at the given threshold level.
    ///
    /// The event's group is recomputed fresh from the full cached set, so
    /// an escalation carries any overlapping meeting discovered since the
    /// group was first displayed.
    pub async fn trigger_alert(
        &self,
        cached: &[CalendarEvent],
        event: &CalendarEvent,
        level: AlertLevel,
    ) {
        let group = group_for_event(cached, event, crate::alerts::group_tolerance());
        let key = group.key;
        let meetings = MeetingSummary::from_group(&group);

        let mut active = self.active.lock().await;

        if let Some(handle) = active.get_mut(&key) {
            let msg = PopupMessage::Escalate {
                alert_level: level,
                meetings: meetings.clone(),
            };
            match write_message(&mut handle.stdin, &msg).await {
                Ok(()) => {
                    log::info!(
                        "Escalated popup {} (group {}) to {} for event {}",
                        handle.id,
                        key,
                        level,
                        event.id
                    );
                    return;
                }
                Err(e) => {
                    log::warn!(
                        "Broken channel to popup {} (group {}): {}; treating as crashed",
                        handle.id,
                        key,
                        e
                    );
                    active.remove(&key);
                }
            }
        }

        let msg = PopupMessage::Show {
            alert_level: level,
            meetings,
        };
        match self.spawn_popup(key, &msg).await {
            Ok(handle) => {
                log::info!(
                    "Spawned popup {} (group {}) at {} for event {}",
                    handle.id,
                    key,
                    level,
                    event.id
                );
                active.insert(key, handle);
            }
            Err(e) => {
                // No retry until the next threshold crossing
                log::error!(
                    "Failed to spawn popup for group {} (event {}, level {}): {}",
                    key,
                    event.id,
                    level,
                    e
                );
            }
        }
    }

    async fn spawn_popup(
        &self,
        key: DateTime<Utc>,
        initial: &PopupMessage,
    ) -> Result<PopupHandle, EngineError> {
        let mut child = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| EngineError::PopupSpawn(e.to_string()))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| EngineError::PopupSpawn("no stdin pipe".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::PopupSpawn("no stdout pipe".to_string()))?;

        write_message(&mut stdin, initial)
            .await
            .map_err(|e| EngineError::PopupSpawn(format!("initial write: {}", e)))?;

        let id = Uuid::new_v4();
        let (kill_tx, kill_rx) = oneshot::channel();
        let watcher = tokio::spawn(watch_popup(
            id,
            key,
            child,
            stdout,
            kill_rx,
            self.active.clone(),
        ));

        Ok(PopupHandle {
            id,
            stdin,
            kill_tx: Some(kill_tx),
            watcher,
        })
    }

    /// Terminate every active popup before the scheduler exits.
    pub async fn shutdown(&self) {
        let handles: Vec<(DateTime<Utc>, PopupHandle)> =
            self.active.lock().await.drain().collect();

        for (key, mut handle) in handles {
            log::info!("Terminating popup {} (group {})", handle.id, key);
            if let Some(kill) = handle.kill_tx.take() {
                let _ = kill.send(());
            }
            let _ = handle.watcher.await;
        }
    }

    /// Number of live popup processes (one per group key).
    pub async fn active_count(&self) -> usize {
        self.active.lock().await.len()
    }
}

async fn write_message(stdin: &mut ChildStdin, msg: &PopupMessage) -> Result<(), String> {
    let line = encode_line(msg).map_err(|e| e.to_string())?;
    stdin
        .write_all(line.as_bytes())
        .await
        .map_err(|e| e.to_string())?;
    stdin.flush().await.map_err(|e| e.to_string())
}

/// Per-child task: drain stdout lifecycle lines, honor the kill signal,
/// then reap the process and drop its handle from the active set.
async fn watch_popup(
    id: Uuid,
    key: DateTime<Utc>,
    mut child: Child,
    stdout: ChildStdout,
    mut kill_rx: oneshot::Receiver<()>,
    active: ActiveMap,
) {
    let mut lines = BufReader::new(stdout).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => match parse_lifecycle(&line) {
                    Some(event) => {
                        log::debug!("Popup {} (group {}) lifecycle: {}", id, key, event.action);
                    }
                    None => {
                        // Malformed lines are dropped, not fatal
                        log::debug!("Popup {} (group {}) sent unparseable line", id, key);
                    }
                },
                Ok(None) | Err(_) => break,
            },
            _ = &mut kill_rx => {
                let _ = child.start_kill();
                break;
            }
        }
    }

    match child.wait().await {
        Ok(status) if status.success() => {
            log::info!("Popup {} (group {}) exited normally", id, key);
        }
        Ok(status) => {
            log::warn!(
                "Popup {} (group {}) exited abnormally: {}",
                id,
                key,
                status
            );
        }
        Err(e) => {
            log::warn!("Failed to reap popup {} (group {}): {}", id, key, e);
        }
    }

    // A replacement may already own this key; only remove our own handle.
    let mut guard = active.lock().await;
    if guard.get(&key).map(|h| h.id) == Some(id) {
        guard.remove(&key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn cat_controller() -> PopupController {
        // `cat` stays alive until stdin closes and echoes lifecycle lines,
        // which the watcher happily drops as unparseable.
        PopupController::new(&PopupConfig {
            command: "cat".to_string(),
            args: vec![],
        })
    }

    fn event_at(id: &str, offset_secs: i64) -> CalendarEvent {
        let start =
            Utc.with_ymd_and_hms(2026, 8, 10, 14, 0, 0).unwrap() + Duration::seconds(offset_secs);
        CalendarEvent {
            id: id.to_string(),
            title: id.to_string(),
            start,
            end: start + Duration::minutes(30),
            attendees: vec![],
            location: None,
            description: None,
            conference: vec![],
            all_day: false,
        }
    }

    #[tokio::test]
    async fn test_escalate_never_spawns_second_process() {
        let controller = cat_controller();
        let event = event_at("e1", 0);
        let cached = vec![event.clone()];

        controller
            .trigger_alert(&cached, &event, AlertLevel::TenMinutes)
            .await;
        assert_eq!(controller.active_count().await, 1);

        // Second crossing escalates over the live channel
        controller
            .trigger_alert(&cached, &event, AlertLevel::FiveMinutes)
            .await;
        assert_eq!(controller.active_count().await, 1);

        controller.shutdown().await;
        assert_eq!(controller.active_count().await, 0);
    }

    #[tokio::test]
    async fn test_overlapping_events_share_one_popup() {
        let controller = cat_controller();
        let a = event_at("a", 0);
        let b = event_at("b", 30); // within grouping tolerance
        let cached = vec![a.clone(), b.clone()];

        controller
            .trigger_alert(&cached, &a, AlertLevel::TenMinutes)
            .await;
        controller
            .trigger_alert(&cached, &b, AlertLevel::TenMinutes)
            .await;
        assert_eq!(controller.active_count().await, 1);

        controller.shutdown().await;
    }

    #[tokio::test]
    async fn test_dead_popup_replaced_exactly_once() {
        // `head -n 1` consumes the initial show message then exits, leaving
        // a dead handle (or an already-reaped one) behind.
        let controller = PopupController::new(&PopupConfig {
            command: "head".to_string(),
            args: vec!["-n".to_string(), "1".to_string()],
        });
        let event = event_at("e1", 0);
        let cached = vec![event.clone()];

        controller
            .trigger_alert(&cached, &event, AlertLevel::TenMinutes)
            .await;
        tokio::time::sleep(std::time::Duration::from_millis(300)).await;

        controller
            .trigger_alert(&cached, &event, AlertLevel::FiveMinutes)
            .await;
        // Exactly one replacement, never two processes for the group
        assert_eq!(controller.active_count().await, 1);

        controller.shutdown().await;
    }

    #[tokio::test]
    async fn test_spawn_failure_is_not_fatal() {
        let controller = PopupController::new(&PopupConfig {
            command: "/nonexistent/vigil-popup".to_string(),
            args: vec![],
        });
        let event = event_at("e1", 0);
        controller
            .trigger_alert(&[event.clone()], &event, AlertLevel::Start)
            .await;
        assert_eq!(controller.active_count().await, 0);
    }

    #[tokio::test]
    async fn test_exit_removes_handle() {
        let controller = PopupController::new(&PopupConfig {
            command: "head".to_string(),
            args: vec!["-n".to_string(), "1".to_string()],
        });
        let event = event_at("e1", 0);
        controller
            .trigger_alert(&[event.clone()], &event, AlertLevel::TenMinutes)
            .await;
        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
        assert_eq!(controller.active_count().await, 0);
    }
}
