//! Hand-off to the system web browser.
//!
//! The pairing and update pages are plain web pages; the client only opens
//! them.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

/// The browser could not be opened.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("could not open {url}: {reason}")]
pub struct BrowserError {
    /// Page that should have opened.
    pub url: String,
    /// Why it did not.
    pub reason: String,
}

/// Opens pages for the user.
pub trait Browser: Send + Sync {
    /// Open `url` in a browser.
    fn open(&self, url: &str) -> Result<(), BrowserError>;
}

/// The platform's default browser.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemBrowser;

impl Browser for SystemBrowser {
    /// Hands the page to the platform launcher without waiting for it.
    fn open(&self, url: &str) -> Result<(), BrowserError> {
        tracing::debug!(url, "opening browser");
        open::that_detached(url).map_err(|e| BrowserError {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }
}

/// Browser double that records pages instead of opening them.
#[derive(Debug, Default, Clone)]
pub struct RecordingBrowser {
    inner: Arc<Mutex<RecordingInner>>,
}

#[derive(Debug, Default)]
struct RecordingInner {
    opened: Vec<String>,
    fail_next: Option<String>,
}

impl RecordingBrowser {
    /// Create a browser that has opened nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pages opened so far.
    pub fn opened(&self) -> Vec<String> {
        self.lock().opened.clone()
    }

    /// Cause the next open to fail with the given reason.
    pub fn fail_next(&self, reason: &str) {
        self.lock().fail_next = Some(reason.to_string());
    }

    fn lock(&self) -> MutexGuard<'_, RecordingInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Browser for RecordingBrowser {
    fn open(&self, url: &str) -> Result<(), BrowserError> {
        let mut inner = self.lock();
        if let Some(reason) = inner.fail_next.take() {
            return Err(BrowserError {
                url: url.to_string(),
                reason,
            });
        }
        inner.opened.push(url.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_pages_in_order() {
        let browser = RecordingBrowser::new();
        browser.open("https://h/pair/p/u1").unwrap();
        browser.open("https://h/update/2.0").unwrap();
        assert_eq!(
            browser.opened(),
            vec!["https://h/pair/p/u1", "https://h/update/2.0"]
        );
    }

    #[test]
    fn forced_failure_is_not_recorded() {
        let browser = RecordingBrowser::new();
        browser.fail_next("no display");

        let err = browser.open("https://h/pair/p/u1").unwrap_err();
        assert_eq!(err.reason, "no display");
        assert!(browser.opened().is_empty());

        browser.open("https://h/pair/p/u1").unwrap();
        assert_eq!(browser.opened().len(), 1);
    }
}
