//! Session endpoints.

use std::fmt;
use std::str::FromStr;

use crate::error::ProtocolError;

/// HTTP method used by an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// GET with query parameters.
    Get,
    /// POST with a JSON body.
    Post,
}

/// The session endpoints, relative to `/apps/text/` (or `/apps/text/public/`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// `POST session/create`
    Create,
    /// `GET session/fetch`
    Fetch,
    /// `POST session/sync`
    Sync,
    /// `POST session/push`
    Push,
    /// `POST session`
    UpdateSession,
    /// `GET session/close`
    Close,
}

impl Endpoint {
    /// All endpoints.
    pub const ALL: [Endpoint; 6] = [
        Endpoint::Create,
        Endpoint::Fetch,
        Endpoint::Sync,
        Endpoint::Push,
        Endpoint::UpdateSession,
        Endpoint::Close,
    ];

    /// Returns the endpoint path.
    pub fn path(self) -> &'static str {
        match self {
            Endpoint::Create => "session/create",
            Endpoint::Fetch => "session/fetch",
            Endpoint::Sync => "session/sync",
            Endpoint::Push => "session/push",
            Endpoint::UpdateSession => "session",
            Endpoint::Close => "session/close",
        }
    }

    /// Returns the HTTP method.
    pub fn method(self) -> Method {
        match self {
            Endpoint::Fetch | Endpoint::Close => Method::Get,
            _ => Method::Post,
        }
    }

    /// Builds the URL path for this endpoint.
    pub fn url_path(self, public: bool) -> String {
        if public {
            format!("/apps/text/public/{}", self.path())
        } else {
            format!("/apps/text/{}", self.path())
        }
    }

    /// Splits a URL path into the endpoint and whether it is public.
    pub fn from_url_path(path: &str) -> Option<(Endpoint, bool)> {
        let (_, rest) = path.split_once("/apps/text/")?;
        let rest = rest.split('?').next().unwrap_or(rest);
        let (public, rest) = match rest.strip_prefix("public/") {
            Some(rest) => (true, rest),
            None => (false, rest),
        };
        rest.parse().ok().map(|endpoint| (endpoint, public))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

impl FromStr for Endpoint {
    type Err = ProtocolError;

    fn from_str(path: &str) -> Result<Self, Self::Err> {
        Endpoint::ALL
            .into_iter()
            .find(|e| e.path() == path)
            .ok_or_else(|| ProtocolError::InvalidField {
                field: "endpoint",
                value: path.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_paths() {
        assert_eq!(Endpoint::Push.url_path(false), "/apps/text/session/push");
        assert_eq!(
            Endpoint::Fetch.url_path(true),
            "/apps/text/public/session/fetch"
        );
        assert_eq!(Endpoint::UpdateSession.url_path(false), "/apps/text/session");
    }

    #[test]
    fn parse_url_paths() {
        assert_eq!(
            Endpoint::from_url_path("https://cloud.example.com/apps/text/public/session/sync"),
            Some((Endpoint::Sync, true))
        );
        assert_eq!(
            Endpoint::from_url_path("/apps/text/session/close?documentId=1"),
            Some((Endpoint::Close, false))
        );
        assert_eq!(Endpoint::from_url_path("/apps/text/steps"), None);
        assert_eq!(Endpoint::from_url_path("/sync/pull"), None);
    }

    #[test]
    fn methods() {
        assert_eq!(Endpoint::Fetch.method(), Method::Get);
        assert_eq!(Endpoint::Close.method(), Method::Get);
        assert_eq!(Endpoint::Create.method(), Method::Post);
    }
}
