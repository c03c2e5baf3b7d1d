//! Pairing handshake plan for Duet.
//!
//! This module provides:
//! - The ordered handshake steps with their progress labels and weights
//! - Route builders for the pairing service and browser pages
//! - Interpretation of the `/hello` reply (version gate, user id)
//!
//! The handshake flow:
//! 1. Client says hello with its version; an out-of-date client is sent to
//!    the update page and stops here
//! 2. The server-issued user id is extracted
//! 3. The browser opens the pairing page for the project
//! 4. The client waits until a partner joins and receives credentials

use collab_types::{HelloResponse, UserId, WireError};
use thiserror::Error;

/// Error type for the pure parts of pairing.
#[derive(Debug, Error)]
pub enum PairingError {
    /// The server says this client is out of date.
    #[error("client version {current} is out of date")]
    UpdateRequired {
        /// Version this client reported.
        current: String,
        /// Newest version, if the server named one.
        latest: Option<String>,
    },
    /// The reply did not carry what the step needs.
    #[error("invalid pairing reply: {0}")]
    InvalidReply(#[from] WireError),
}

/// One step of the pairing handshake, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum HandshakeStep {
    /// `GET /hello/{version}`.
    Authenticate,
    /// Read the user id from the hello reply.
    ExtractUser,
    /// Open the pairing page in the browser.
    OfferPairing,
    /// Long-poll until a partner joins.
    AwaitPartner,
}

impl HandshakeStep {
    /// All steps in the order they must run.
    pub const ORDER: [HandshakeStep; 4] = [
        HandshakeStep::Authenticate,
        HandshakeStep::ExtractUser,
        HandshakeStep::OfferPairing,
        HandshakeStep::AwaitPartner,
    ];

    /// Progress label shown while the step runs, if it starts a new sub-task.
    pub fn label(&self) -> Option<&'static str> {
        match self {
            Self::Authenticate => Some("Authenticating"),
            Self::AwaitPartner => Some("Waiting for pair..."),
            Self::ExtractUser | Self::OfferPairing => None,
        }
    }

    /// Progress units credited once the step completes.
    pub fn weight(&self) -> u32 {
        match self {
            // Hello and user extraction are reported together
            Self::Authenticate => 0,
            Self::ExtractUser | Self::OfferPairing | Self::AwaitPartner => 1,
        }
    }

    /// Sum of all step weights.
    pub fn total_weight() -> u32 {
        Self::ORDER.iter().map(HandshakeStep::weight).sum()
    }
}

/// Route of the capability check.
pub fn hello_path(version: &str) -> String {
    format!("/hello/{}", urlencoding::encode(version))
}

/// Browser page offering the update.
pub fn update_path(version: &str) -> String {
    format!("/update/{}", urlencoding::encode(version))
}

/// Browser page offering to pair `project` for `user`.
pub fn pair_path(project: &str, user: &UserId) -> String {
    format!(
        "/pair/{}/{}",
        urlencoding::encode(project),
        urlencoding::encode(user.as_str())
    )
}

/// Long-poll route resolving once a partner joins.
pub fn await_path(user: &UserId) -> String {
    format!("/await-collaboration/{}", urlencoding::encode(user.as_str()))
}

/// Join a base URL and an absolute path without doubling the slash.
pub fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{}{}", base, path)
    } else {
        format!("{}/{}", base, path)
    }
}

/// Transport URL for an authenticated session: `{ws_base}/{token}`.
pub fn transport_url(ws_base: &str, token: &str) -> String {
    join_url(ws_base, token)
}

/// Interpret a `/hello` reply: gate on the update marker, then extract the
/// user id.
pub fn check_hello(version: &str, hello: &HelloResponse) -> Result<UserId, PairingError> {
    if let Some(marker) = hello.update_marker() {
        return Err(PairingError::UpdateRequired {
            current: version.to_owned(),
            latest: marker.latest,
        });
    }
    Ok(hello.user_id()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steps_are_ordered() {
        let mut sorted = HandshakeStep::ORDER;
        sorted.sort();
        assert_eq!(sorted, HandshakeStep::ORDER);
        assert_eq!(HandshakeStep::total_weight(), 3);
    }

    #[test]
    fn labels_match_progress_text() {
        assert_eq!(HandshakeStep::Authenticate.label(), Some("Authenticating"));
        assert_eq!(
            HandshakeStep::AwaitPartner.label(),
            Some("Waiting for pair...")
        );
        assert_eq!(HandshakeStep::OfferPairing.label(), None);
    }

    #[test]
    fn routes() {
        let user = UserId::new("u1");
        assert_eq!(hello_path("2.0"), "/hello/2.0");
        assert_eq!(update_path("2.0"), "/update/2.0");
        assert_eq!(await_path(&user), "/await-collaboration/u1");
        assert_eq!(pair_path("ps1", &user), "/pair/ps1/u1");
    }

    #[test]
    fn pair_path_encodes_project_name() {
        let user = UserId::new("u1");
        assert_eq!(pair_path("My Project/é", &user), "/pair/My%20Project%2F%C3%A9/u1");
    }

    #[test]
    fn join_url_handles_slashes() {
        assert_eq!(join_url("https://h/", "/hello/1"), "https://h/hello/1");
        assert_eq!(join_url("https://h", "/hello/1"), "https://h/hello/1");
        assert_eq!(transport_url("wss://h:444/", "tok"), "wss://h:444/tok");
    }

    #[test]
    fn hello_without_update_yields_user() {
        let hello = HelloResponse::from_json(r#"{"userid":"u1"}"#).unwrap();
        assert_eq!(check_hello("2.0", &hello).unwrap(), UserId::new("u1"));
    }

    #[test]
    fn hello_with_update_is_rejected() {
        let hello = HelloResponse::from_json(r#"{"userid":"u1","update":"true"}"#).unwrap();
        match check_hello("2.0", &hello) {
            Err(PairingError::UpdateRequired { current, latest }) => {
                assert_eq!(current, "2.0");
                assert_eq!(latest, None);
            }
            other => panic!("expected UpdateRequired, got {:?}", other),
        }
    }

    #[test]
    fn update_takes_precedence_over_missing_user() {
        let hello = HelloResponse::from_json(r#"{"update":"3.0.0"}"#).unwrap();
        assert!(matches!(
            check_hello("2.0", &hello),
            Err(PairingError::UpdateRequired { .. })
        ));
    }

    #[test]
    fn hello_without_user_is_invalid() {
        let hello = HelloResponse::from_json(r#"{"userid":""}"#).unwrap();
        assert!(matches!(
            check_hello("2.0", &hello),
            Err(PairingError::InvalidReply(WireError::MissingField("userid")))
        ));
    }
}
