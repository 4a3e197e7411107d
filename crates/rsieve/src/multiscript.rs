//! Sequential execution of several binaries against one message.
//!
//! All scripts share a single result; actions accumulate across scripts
//! and execute once at the end. A script that discards the message or
//! ends in `stop` deactivates the rest of the chain. An optional discard
//! script runs last, only when nothing so far produced a delivery.

use rsieve_binary::Binary;

use crate::Sieve;
use crate::deliver::DeliveryTarget;
use crate::error::ExecStatus;
use crate::msg::Message;
use crate::result::SieveResult;

pub struct Multiscript<'a> {
    sieve: &'a Sieve,
    message: &'a dyn Message,
    result: SieveResult,
    status: ExecStatus,
    active: bool,
    discard_handled: bool,
}

impl<'a> Multiscript<'a> {
    pub(crate) fn new(sieve: &'a Sieve, message: &'a dyn Message) -> Self {
        Self {
            sieve,
            message,
            result: SieveResult::new(sieve.config()),
            status: ExecStatus::Ok,
            active: true,
            discard_handled: false,
        }
    }

    /// Run the next script in the chain. Returns whether the chain is
    /// still active afterwards.
    pub fn run(&mut self, binary: &Binary) -> bool {
        if !self.active {
            return false;
        }
        let (status, stopped) = self.sieve.run_into(binary, self.message, &mut self.result);
        self.status = status;
        if !status.is_ok() || stopped || self.result.has_discard() {
            self.active = false;
        }
        self.active
    }

    #[must_use]
    pub const fn status(&self) -> ExecStatus {
        self.status
    }

    #[must_use]
    pub const fn active(&self) -> bool {
        self.active
    }

    /// Whether the terminal discard script would run: the chain finished
    /// cleanly and nothing produced a delivery.
    #[must_use]
    pub fn will_discard(&self) -> bool {
        self.status.is_ok() && !self.result.has_delivery() && !self.discard_handled
    }

    /// Run the separately compiled discard script, if applicable.
    pub fn run_discard(&mut self, binary: &Binary) {
        if !self.will_discard() {
            return;
        }
        self.discard_handled = true;
        let (status, _) = self.sieve.run_into(binary, self.message, &mut self.result);
        self.status = status;
        self.active = false;
    }

    /// Abort the chain. Nothing has executed yet, so this is a clean
    /// temp-failure unless a previous `finish` already delivered - in
    /// which case the message is preserved via implicit keep.
    pub fn tempfail(self, deliver: &mut dyn DeliveryTarget) -> ExecStatus {
        let mut result = self.result;
        if result.executed() {
            match result.implicit_keep(deliver) {
                ExecStatus::Ok => ExecStatus::Failure,
                ExecStatus::TempFailure => ExecStatus::TempFailure,
                _ => ExecStatus::KeepFailed,
            }
        } else {
            ExecStatus::TempFailure
        }
    }

    /// Execute the accumulated result (with implicit keep) and return the
    /// final status.
    pub fn finish(self, deliver: &mut dyn DeliveryTarget) -> ExecStatus {
        let mut result = self.result;
        match self.status {
            ExecStatus::Ok => result.execute(deliver, true),
            ExecStatus::BinCorrupt => ExecStatus::BinCorrupt,
            status @ (ExecStatus::Failure | ExecStatus::ResourceLimit | ExecStatus::TempFailure) => {
                // Never lose the message on a runtime error.
                match result.implicit_keep(deliver) {
                    ExecStatus::Ok => {
                        if status == ExecStatus::TempFailure {
                            ExecStatus::TempFailure
                        } else {
                            ExecStatus::Failure
                        }
                    }
                    ExecStatus::TempFailure => ExecStatus::TempFailure,
                    _ => ExecStatus::KeepFailed,
                }
            }
            ExecStatus::KeepFailed => ExecStatus::KeepFailed,
        }
    }

    /// Accumulated actions so far (primarily for tests and tracing).
    #[must_use]
    pub fn result(&self) -> &SieveResult {
        &self.result
    }
}
