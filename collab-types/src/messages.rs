//! Pairing-service payloads.
//!
//! Two JSON replies matter to the client: the `/hello/{version}` capability
//! check and the `/await-collaboration/{userid}` pairing result. Both are
//! decoded leniently here and validated before anything downstream sees them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{AuthToken, SessionId, UserId, WireError};

/// Reply to `GET /hello/{clientVersion}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HelloResponse {
    /// Identifier the server assigned to this client.
    #[serde(default)]
    pub userid: Option<String>,
    /// Present when the client is out of date. The server sends either a
    /// boolean-ish marker or the newest released version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update: Option<Value>,
}

/// Details of an update demanded by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateMarker {
    /// Newest version, when the server named one.
    pub latest: Option<String>,
}

impl HelloResponse {
    /// Decode a `/hello` body.
    pub fn from_json(body: &str) -> Result<Self, WireError> {
        serde_json::from_str(body).map_err(WireError::Malformed)
    }

    /// The update marker, if the server demands one.
    ///
    /// `null` and `false` count as absent; any other value forces an update.
    pub fn update_marker(&self) -> Option<UpdateMarker> {
        match self.update.as_ref()? {
            Value::Null | Value::Bool(false) => None,
            Value::String(s) if looks_like_version(s) => Some(UpdateMarker {
                latest: Some(s.clone()),
            }),
            _ => Some(UpdateMarker { latest: None }),
        }
    }

    /// The assigned user id; empty or missing ids are rejected.
    pub fn user_id(&self) -> Result<UserId, WireError> {
        non_empty(self.userid.as_deref(), "userid").map(UserId::new)
    }
}

fn looks_like_version(s: &str) -> bool {
    s.chars().next().is_some_and(|c| c.is_ascii_digit())
}

fn non_empty<'a>(value: Option<&'a str>, field: &'static str) -> Result<&'a str, WireError> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(WireError::MissingField(field)),
    }
}

/// Raw `/await-collaboration` reply, before validation.
///
/// Older servers used `collabid`, `me`, `partner` and `token`; those names
/// are accepted as aliases.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPairing {
    /// Collaboration identifier.
    #[serde(default, alias = "collabid")]
    pub session_id: Option<String>,
    /// This client's user id.
    #[serde(default, alias = "me")]
    pub local_user_id: Option<String>,
    /// The partner's user id.
    #[serde(default, alias = "partner")]
    pub remote_user_id: Option<String>,
    /// Token for the transport URL.
    #[serde(default, alias = "token")]
    pub auth_token: Option<String>,
    /// Optional marker asking the client to update before collaborating.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_required: Option<Value>,
    /// Project the pair agreed on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
}

/// Validated credentials produced by a successful pairing handshake.
///
/// Consumed once to build a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingResult {
    session_id: SessionId,
    local_user_id: UserId,
    remote_user_id: UserId,
    auth_token: AuthToken,
    update_required: bool,
    project: Option<String>,
}

impl PairingResult {
    /// Build a result from already-validated parts.
    pub fn new(
        session_id: SessionId,
        local_user_id: UserId,
        remote_user_id: UserId,
        auth_token: AuthToken,
    ) -> Self {
        Self {
            session_id,
            local_user_id,
            remote_user_id,
            auth_token,
            update_required: false,
            project: None,
        }
    }

    /// Decode and validate an `/await-collaboration` body.
    pub fn from_json(body: &str) -> Result<Self, WireError> {
        let raw: RawPairing = serde_json::from_str(body).map_err(WireError::Malformed)?;
        Self::from_raw(raw)
    }

    /// Validate a raw reply. Every mandatory key must be present and
    /// non-empty, otherwise nothing is returned.
    pub fn from_raw(raw: RawPairing) -> Result<Self, WireError> {
        let session_id = non_empty(raw.session_id.as_deref(), "sessionId")?;
        let local = non_empty(raw.local_user_id.as_deref(), "localUserId")?;
        let remote = non_empty(raw.remote_user_id.as_deref(), "remoteUserId")?;
        let token = non_empty(raw.auth_token.as_deref(), "authToken")?;

        let update_required = !matches!(
            raw.update_required,
            None | Some(Value::Null) | Some(Value::Bool(false))
        );

        Ok(Self {
            session_id: SessionId::new(session_id),
            local_user_id: UserId::new(local),
            remote_user_id: UserId::new(remote),
            auth_token: AuthToken::new(token),
            update_required,
            project: raw.project.filter(|p| !p.is_empty()),
        })
    }

    /// Collaboration identifier.
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// This client's user id.
    pub fn local_user_id(&self) -> &UserId {
        &self.local_user_id
    }

    /// The partner's user id.
    pub fn remote_user_id(&self) -> &UserId {
        &self.remote_user_id
    }

    /// Token for the transport URL.
    pub fn auth_token(&self) -> &AuthToken {
        &self.auth_token
    }

    /// Whether the server flagged this client as needing an update.
    pub fn update_required(&self) -> bool {
        self.update_required
    }

    /// Project the pair agreed on, if the server reported it.
    pub fn project(&self) -> Option<&str> {
        self.project.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hello_without_update_has_no_marker() {
        let hello = HelloResponse::from_json(r#"{"userid":"u1"}"#).unwrap();
        assert!(hello.update_marker().is_none());
        assert_eq!(hello.user_id().unwrap(), UserId::new("u1"));
    }

    #[test]
    fn hello_with_string_true_forces_update() {
        let hello = HelloResponse::from_json(r#"{"userid":"u1","update":"true"}"#).unwrap();
        let marker = hello.update_marker().expect("update marker");
        assert_eq!(marker.latest, None);
    }

    #[test]
    fn hello_with_version_names_latest() {
        let hello = HelloResponse::from_json(r#"{"userid":"u1","update":"2.1.0"}"#).unwrap();
        assert_eq!(
            hello.update_marker(),
            Some(UpdateMarker {
                latest: Some("2.1.0".into())
            })
        );
    }

    #[test]
    fn hello_null_or_false_update_is_absent() {
        let hello = HelloResponse::from_json(r#"{"userid":"u1","update":null}"#).unwrap();
        assert!(hello.update_marker().is_none());
        let hello = HelloResponse::from_json(r#"{"userid":"u1","update":false}"#).unwrap();
        assert!(hello.update_marker().is_none());
    }

    #[test]
    fn hello_without_userid_is_rejected() {
        let hello = HelloResponse::from_json("{}").unwrap();
        assert!(matches!(
            hello.user_id(),
            Err(WireError::MissingField("userid"))
        ));
    }

    #[test]
    fn hello_malformed_json() {
        assert!(matches!(
            HelloResponse::from_json("not json"),
            Err(WireError::Malformed(_))
        ));
    }

    #[test]
    fn pairing_result_from_full_reply() {
        let result = PairingResult::from_json(
            r#"{"sessionId":"s1","localUserId":"u1","remoteUserId":"u2","authToken":"tok"}"#,
        )
        .unwrap();
        assert_eq!(result.session_id().as_str(), "s1");
        assert_eq!(result.local_user_id().as_str(), "u1");
        assert_eq!(result.remote_user_id().as_str(), "u2");
        assert_eq!(result.auth_token().expose(), "tok");
        assert!(!result.update_required());
        assert!(result.project().is_none());
    }

    #[test]
    fn pairing_result_accepts_legacy_names() {
        let result = PairingResult::from_json(
            r#"{"collabid":"c1","me":"alice","partner":"bob","token":"t","project":"ps1"}"#,
        )
        .unwrap();
        assert_eq!(result.session_id().as_str(), "c1");
        assert_eq!(result.local_user_id().as_str(), "alice");
        assert_eq!(result.remote_user_id().as_str(), "bob");
        assert_eq!(result.project(), Some("ps1"));
    }

    #[test]
    fn pairing_result_missing_token_fails_closed() {
        let err = PairingResult::from_json(
            r#"{"sessionId":"s1","localUserId":"u1","remoteUserId":"u2"}"#,
        )
        .unwrap_err();
        assert!(matches!(err, WireError::MissingField("authToken")));
    }

    #[test]
    fn pairing_result_empty_value_fails_closed() {
        let err = PairingResult::from_json(
            r#"{"sessionId":"","localUserId":"u1","remoteUserId":"u2","authToken":"t"}"#,
        )
        .unwrap_err();
        assert!(matches!(err, WireError::MissingField("sessionId")));
    }

    #[test]
    fn pairing_result_update_marker() {
        let result = PairingResult::from_json(
            r#"{"sessionId":"s","localUserId":"a","remoteUserId":"b","authToken":"t","updateRequired":true}"#,
        )
        .unwrap();
        assert!(result.update_required());
    }

    #[test]
    fn pairing_result_debug_hides_token() {
        let result = PairingResult::new(
            SessionId::new("s"),
            UserId::new("a"),
            UserId::new("b"),
            AuthToken::new("hunter2"),
        );
        assert!(!format!("{:?}", result).contains("hunter2"));
    }
}
