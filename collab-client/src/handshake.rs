//! Pairing handshake.
//!
//! Runs the steps of [`HandshakeStep::ORDER`] against a pairing service and
//! a browser. Every network step is [`Cancelable`]; cancelling at any point
//! abandons the remaining steps and no partial credentials are returned.

use collab_core::pairing::{check_hello, join_url, pair_path, update_path};
use collab_core::{HandshakeStep, PairingError};
use collab_types::{PairingResult, UserId};

use crate::browser::{Browser, BrowserError};
use crate::cancel::{Cancelable, ProgressSink};
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::service::{PairingService, ServiceError};

/// Result of a successful handshake.
#[derive(Debug)]
pub struct HandshakeOutcome {
    /// Validated credentials.
    pub result: PairingResult,
    /// Set when the pairing page could not be opened. The partner can still
    /// join with the link shared some other way.
    pub browser_failure: Option<BrowserError>,
}

/// Pairs this client with a partner.
pub struct PairingHandshake<'a> {
    config: &'a ClientConfig,
    service: &'a dyn PairingService,
    browser: &'a dyn Browser,
}

impl<'a> PairingHandshake<'a> {
    /// Create a handshake over the given collaborators.
    pub fn new(
        config: &'a ClientConfig,
        service: &'a dyn PairingService,
        browser: &'a dyn Browser,
    ) -> Self {
        Self {
            config,
            service,
            browser,
        }
    }

    /// Run all steps for `project`.
    ///
    /// Reports [`HandshakeStep::total_weight`] units to `progress` but does
    /// not call `begin`; the caller owns the overall budget.
    pub async fn run(
        &self,
        project: &str,
        progress: &dyn ProgressSink,
    ) -> Result<HandshakeOutcome, ClientError> {
        let version = self.config.client.version.as_str();
        let op = Cancelable::new(progress).with_poll_interval(self.config.poll_interval());

        enter(progress, HandshakeStep::Authenticate);
        let hello = op.run(self.service.hello(version)).await?;
        let user = match check_hello(version, &hello) {
            Ok(user) => user,
            Err(PairingError::UpdateRequired { current, latest }) => {
                return Err(self.demand_update(current, latest));
            }
            Err(PairingError::InvalidReply(e)) => {
                return Err(ClientError::Network(ServiceError::Malformed(e)));
            }
        };
        progress.worked(HandshakeStep::Authenticate.weight());

        enter(progress, HandshakeStep::ExtractUser);
        tracing::debug!(user = %user, "authenticated");
        progress.worked(HandshakeStep::ExtractUser.weight());

        enter(progress, HandshakeStep::OfferPairing);
        if op.is_cancelled() {
            return Err(ClientError::Cancelled);
        }
        let browser_failure = self.offer_pairing(project, &user);
        progress.worked(HandshakeStep::OfferPairing.weight());

        enter(progress, HandshakeStep::AwaitPartner);
        let raw = op.run(self.service.await_collaboration(&user)).await?;
        let result = PairingResult::from_raw(raw).map_err(ClientError::IncompleteCredentials)?;
        if result.update_required() {
            return Err(self.demand_update(version.to_string(), None));
        }
        progress.worked(HandshakeStep::AwaitPartner.weight());

        tracing::info!(
            session = %result.session_id(),
            partner = %result.remote_user_id(),
            "paired"
        );
        Ok(HandshakeOutcome {
            result,
            browser_failure,
        })
    }

    fn offer_pairing(&self, project: &str, user: &UserId) -> Option<BrowserError> {
        let url = join_url(&self.config.server.http_base, &pair_path(project, user));
        match self.browser.open(&url) {
            Ok(()) => None,
            Err(e) => {
                tracing::warn!(error = %e, "could not open pairing page");
                Some(e)
            }
        }
    }

    fn demand_update(&self, version: String, latest: Option<String>) -> ClientError {
        let update_url = join_url(&self.config.server.http_base, &update_path(&version));
        tracing::info!(version = %version, latest = ?latest, "client update required");
        if let Err(e) = self.browser.open(&update_url) {
            tracing::warn!(error = %e, "could not open update page");
        }
        ClientError::VersionMismatch {
            version,
            latest,
            update_url,
        }
    }
}

fn enter(progress: &dyn ProgressSink, step: HandshakeStep) {
    if let Some(label) = step.label() {
        progress.sub_task(label);
    }
}
