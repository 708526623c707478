//! Follow command implementation.

use super::{CliService, ConnectOptions};
use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;
use textsync_engine::{EventKind, OpenTarget, StateChange, SyncEvent};

/// One printed event.
#[derive(Debug, Serialize)]
pub struct EventLine {
    /// Event name.
    pub event: &'static str,
    /// Event details.
    pub detail: Value,
}

impl EventLine {
    /// Summarizes `event` for printing.
    pub fn from_event(event: &SyncEvent) -> Self {
        let detail = match event {
            SyncEvent::Opened { document, session } => json!({
                "documentId": document.id,
                "sessionId": session.id,
                "version": document.current_version,
            }),
            SyncEvent::Loaded {
                document,
                document_source,
                ..
            } => json!({
                "version": document.initial_version,
                "length": document_source.len(),
            }),
            SyncEvent::Sync { steps, document } => json!({
                "steps": steps.len(),
                "version": document.current_version,
            }),
            SyncEvent::Change { document, sessions } => json!({
                "version": document.current_version,
                "sessions": sessions.len(),
            }),
            SyncEvent::StateChange(StateChange::Dirty(dirty)) => json!({ "dirty": dirty }),
            SyncEvent::StateChange(StateChange::InitialLoading(loading)) => {
                json!({ "initialLoading": loading })
            }
            SyncEvent::Save { document, .. } => json!({
                "lastSavedVersion": document.last_saved_version,
            }),
            SyncEvent::Error { error, data } => json!({
                "type": error.to_string(),
                "code": error.code(),
                "retry": data.retry,
                "status": data.status,
            }),
        };
        Self {
            event: event.kind().name(),
            detail,
        }
    }

    /// Formats the line as text or JSON.
    pub fn render(&self, format: &str) -> String {
        match format {
            "json" => serde_json::to_string(self).unwrap_or_default(),
            _ => format!("{:<12} {}", self.event, self.detail),
        }
    }
}

fn print_events(service: &CliService, format: &str) {
    for kind in EventKind::ALL {
        let format = format.to_string();
        service.on(kind, move |event| {
            println!("{}", EventLine::from_event(event).render(&format));
        });
    }
}

/// Runs the follow command.
///
/// Prints every event until interrupted or until `duration` elapses.
pub async fn run(
    connect: &ConnectOptions,
    target: OpenTarget,
    file_path: Option<&str>,
    duration: Option<u64>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let service = connect.service(file_path)?;
    print_events(&service, format);

    service.open(target).await?;
    service.start_sync()?;
    tracing::info!(server = %connect.server, "following document");

    match duration {
        Some(secs) => {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(secs)) => {}
                _ = tokio::signal::ctrl_c() => {}
            }
        }
        None => {
            tokio::signal::ctrl_c().await?;
        }
    }

    service.close().await;
    Ok(())
}
