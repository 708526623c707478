//! Save command implementation.

use super::ConnectOptions;
use std::time::Duration;
use textsync_engine::{EventKind, OpenTarget, SyncEvent};
use tokio::sync::mpsc;

/// Runs the save command.
///
/// Opens a session, asks the server to save and waits up to `wait` for the
/// confirmation. `force` overwrites changes made outside the session.
pub async fn run(
    connect: &ConnectOptions,
    target: OpenTarget,
    file_path: Option<&str>,
    force: bool,
    wait: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    let service = connect.service(file_path)?;
    let (tx, mut rx) = mpsc::unbounded_channel();
    for kind in [EventKind::Save, EventKind::Error] {
        let tx = tx.clone();
        service.on(kind, move |event| {
            let _ = tx.send(event.clone());
        });
    }

    service.open(target).await?;
    service.start_sync()?;
    if force {
        service.force_save();
    } else {
        service.save();
    }

    let outcome = tokio::time::timeout(wait, rx.recv()).await;
    service.close().await;

    match outcome {
        Ok(Some(SyncEvent::Save { document, .. })) => {
            println!("saved version {}", document.last_saved_version);
            Ok(())
        }
        Ok(Some(SyncEvent::Error { error, data })) => match data.outside_change {
            Some(_) => Err(format!("{}: file changed outside the session, use --force", error).into()),
            None => Err(format!("save failed: {}", error).into()),
        },
        // The server had nothing newer to save.
        Ok(_) | Err(_) => {
            println!("nothing to save");
            Ok(())
        }
    }
}
