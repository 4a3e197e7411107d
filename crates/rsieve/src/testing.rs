//! In-memory fakes for exercising the engine without a mail store.

use crate::deliver::{DeliveryError, DeliveryTarget, VacationResponse};
use crate::msg::Message;

/// A message built from literal headers.
#[derive(Clone, Debug, Default)]
pub struct TestMessage {
    headers: Vec<(String, String)>,
    size: u64,
    sender: Option<String>,
    recipient: Option<String>,
}

impl TestMessage {
    #[must_use]
    pub fn new() -> Self {
        Self {
            size: 1024,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    #[must_use]
    pub fn with_size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    #[must_use]
    pub fn with_envelope(mut self, sender: &str, recipient: &str) -> Self {
        self.sender = Some(sender.to_string());
        self.recipient = Some(recipient.to_string());
        self
    }
}

impl Message for TestMessage {
    fn header(&self, name: &str) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn envelope_sender(&self) -> Option<&str> {
        self.sender.as_deref()
    }

    fn envelope_recipient(&self) -> Option<&str> {
        self.recipient.as_deref()
    }
}

/// A delivery target that records everything it is asked to do.
#[derive(Debug, Default)]
pub struct CollectingDelivery {
    pub stored: Vec<(String, Vec<String>)>,
    pub redirected: Vec<String>,
    pub rejected: Vec<String>,
    pub vacations: Vec<String>,
    pub discarded: bool,
    /// Flat call log in execution order.
    pub log: Vec<String>,
    /// When set, every store fails with a copy of this error.
    pub fail_store: Option<DeliveryError>,
    /// When set, every redirect fails with a copy of this error.
    pub fail_redirect: Option<DeliveryError>,
}

fn replay(err: &DeliveryError) -> DeliveryError {
    match err {
        DeliveryError::Temporary(msg) => DeliveryError::Temporary(msg.clone()),
        DeliveryError::Permanent(msg) => DeliveryError::Permanent(msg.clone()),
    }
}

impl DeliveryTarget for CollectingDelivery {
    fn store(&mut self, folder: &str, flags: &[String]) -> Result<(), DeliveryError> {
        if let Some(err) = &self.fail_store {
            return Err(replay(err));
        }
        self.log.push(format!("store {folder}"));
        self.stored.push((folder.to_string(), flags.to_vec()));
        Ok(())
    }

    fn redirect(&mut self, address: &str) -> Result<(), DeliveryError> {
        if let Some(err) = &self.fail_redirect {
            return Err(replay(err));
        }
        self.log.push(format!("redirect {address}"));
        self.redirected.push(address.to_string());
        Ok(())
    }

    fn reject(&mut self, reason: &str) -> Result<(), DeliveryError> {
        self.log.push("reject".to_string());
        self.rejected.push(reason.to_string());
        Ok(())
    }

    fn discard(&mut self) {
        self.log.push("discard".to_string());
        self.discarded = true;
    }

    fn vacation(&mut self, response: &VacationResponse<'_>) -> Result<(), DeliveryError> {
        self.log.push("vacation".to_string());
        self.vacations.push(response.reason.to_string());
        Ok(())
    }
}
