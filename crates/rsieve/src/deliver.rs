//! Delivery collaborator interface.
//!
//! The result executor hands finished actions to a [`DeliveryTarget`]; the
//! engine itself never stores, forwards or bounces anything.

/// Failure from the delivery backend.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// Retryable (storage busy, SMTP 4xx). The caller should temp-fail the
    /// message rather than lose it.
    #[error("temporary delivery failure: {0}")]
    Temporary(String),
    /// Permanent failure for this action.
    #[error("delivery failed: {0}")]
    Permanent(String),
}

/// An outgoing vacation auto-reply.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VacationResponse<'a> {
    pub reason: &'a str,
    pub subject: Option<&'a str>,
    pub from: Option<&'a str>,
    /// Additional recipient addresses considered "mine" for the reply
    /// check.
    pub addresses: &'a [String],
    pub handle: Option<&'a str>,
    /// Reply throttle in days.
    pub days: u64,
    /// Reason body is a full MIME entity.
    pub mime: bool,
}

/// Where executed actions land.
pub trait DeliveryTarget {
    /// File the message into a folder with the given IMAP flags.
    fn store(&mut self, folder: &str, flags: &[String]) -> Result<(), DeliveryError>;

    /// Forward the message to an SMTP address.
    fn redirect(&mut self, address: &str) -> Result<(), DeliveryError>;

    /// Refuse delivery with an explanation (DSN or protocol reject).
    fn reject(&mut self, reason: &str) -> Result<(), DeliveryError>;

    /// Drop the message silently. Infallible by construction.
    fn discard(&mut self) {}

    /// Send a vacation auto-reply.
    fn vacation(&mut self, response: &VacationResponse<'_>) -> Result<(), DeliveryError> {
        let _ = response;
        Ok(())
    }

    /// Folder used for implicit and explicit keep.
    fn default_folder(&self) -> &str {
        "INBOX"
    }

    /// Postmaster address for generated DSNs.
    fn postmaster_address(&self) -> &str {
        "postmaster"
    }
}
