//! CLI command implementations.

pub mod follow;
pub mod save;

use std::time::Duration;
use textsync_engine::{
    HttpTransport, MemorySurface, OpenTarget, ReqwestClient, SessionOptions, SyncConfig,
    SyncService,
};

/// Service type used by every command.
pub type CliService = SyncService<HttpTransport<ReqwestClient>, MemorySurface>;

/// Connection settings shared by all commands.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Server base URL.
    pub server: String,
    /// Share token for public access.
    pub share_token: Option<String>,
    /// Guest name for public sessions.
    pub guest_name: Option<String>,
    /// Request timeout.
    pub timeout: Duration,
}

impl ConnectOptions {
    /// Builds a service for `file_path` (if any) against the configured server.
    pub fn service(&self, file_path: Option<&str>) -> Result<CliService, Box<dyn std::error::Error>> {
        let config = SyncConfig::new(self.server.clone()).with_timeout(self.timeout);
        let client = ReqwestClient::from_config(&config)?;
        let transport = HttpTransport::new(config.base_url.clone(), client);

        let mut options = SessionOptions::new();
        if let Some(ref token) = self.share_token {
            options = options.with_share_token(token.clone());
            options = match self.guest_name {
                Some(ref name) => options.with_guest_name(name.clone()),
                None => options.with_random_guest_name(),
            };
        }
        if let Some(path) = file_path {
            options = options.with_file_path(path);
        }

        Ok(SyncService::new(
            config,
            options,
            transport,
            std::sync::Arc::new(MemorySurface::new()),
        )?)
    }
}

/// Resolves the file to open.
pub fn target(
    file_id: Option<i64>,
    file_path: Option<String>,
) -> Result<OpenTarget, Box<dyn std::error::Error>> {
    match (file_id, file_path) {
        (Some(id), _) => Ok(OpenTarget::FileId(id)),
        (None, Some(path)) => Ok(OpenTarget::FilePath(path)),
        (None, None) => Err("either --file-id or --file-path is required".into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> ConnectOptions {
        ConnectOptions {
            server: "https://cloud.example.com".into(),
            share_token: None,
            guest_name: None,
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn target_prefers_id() {
        assert_eq!(
            target(Some(3), Some("a.md".into())).unwrap(),
            OpenTarget::FileId(3)
        );
        assert_eq!(
            target(None, Some("a.md".into())).unwrap(),
            OpenTarget::FilePath("a.md".into())
        );
        assert!(target(None, None).is_err());
    }

    #[test]
    fn public_sessions_get_a_guest_name() {
        let mut connect = options();
        connect.share_token = Some("share".into());
        let service = connect.service(Some("notes.md")).unwrap();
        assert!(service.is_public());
        assert!(service.options().guest_name.is_some());
        assert_eq!(service.options().file_path.as_deref(), Some("notes.md"));
    }

    #[test]
    fn user_sessions_have_no_guest_name() {
        let mut connect = options();
        connect.guest_name = Some("ignored".into());
        let service = connect.service(None).unwrap();
        assert!(!service.is_public());
        assert!(service.options().guest_name.is_none());
    }
}
