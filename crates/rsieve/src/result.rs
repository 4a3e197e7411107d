//! The accumulated action set and its execution.
//!
//! Actions append logically: equivalent duplicates collapse, conflicting
//! actions resolve by RFC precedence (a storing action beats `discard`,
//! with a warning) or raise a runtime error (`reject` against delivery).
//! Execution happens in two phases: the explicit actions in a fixed
//! deterministic order, then the implicit keep when nothing stored or
//! discarded the message.

use crate::config::SieveConfig;
use crate::deliver::{DeliveryError, DeliveryTarget, VacationResponse};
use crate::error::{ExecStatus, RuntimeError};

/// One accumulated mail action.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    Keep {
        flags: Vec<String>,
    },
    FileInto {
        folder: String,
        flags: Vec<String>,
        copy: bool,
    },
    Redirect {
        address: String,
        copy: bool,
    },
    Discard,
    Reject {
        reason: String,
    },
    Vacation {
        reason: String,
        subject: Option<String>,
        from: Option<String>,
        addresses: Vec<String>,
        handle: Option<String>,
        days: u64,
        mime: bool,
    },
}

impl Action {
    /// Whether this action resolves the message's fate, cancelling the
    /// implicit keep. `:copy` variants deliberately do not.
    #[must_use]
    pub fn cancels_implicit_keep(&self) -> bool {
        match self {
            Self::Keep { .. } | Self::Discard | Self::Reject { .. } => true,
            Self::FileInto { copy, .. } | Self::Redirect { copy, .. } => !copy,
            Self::Vacation { .. } => false,
        }
    }

    /// Whether this action stores the message somewhere.
    #[must_use]
    pub fn is_storing(&self) -> bool {
        matches!(self, Self::Keep { .. } | Self::FileInto { .. })
    }

    /// Whether this action produces a delivery (store, forward or bounce).
    #[must_use]
    pub fn is_delivery(&self) -> bool {
        matches!(
            self,
            Self::Keep { .. } | Self::FileInto { .. } | Self::Redirect { .. } | Self::Reject { .. }
        )
    }

    fn describe(&self) -> String {
        match self {
            Self::Keep { .. } => "keep".to_string(),
            Self::FileInto { folder, .. } => format!("fileinto \"{folder}\""),
            Self::Redirect { address, .. } => format!("redirect \"{address}\""),
            Self::Discard => "discard".to_string(),
            Self::Reject { .. } => "reject".to_string(),
            Self::Vacation { .. } => "vacation".to_string(),
        }
    }
}

/// The deduplicated, conflict-checked action set of one execution (or of
/// a whole multiscript chain).
pub struct SieveResult {
    actions: Vec<Action>,
    max_redirects: u32,
    max_actions: u32,
    redirect_count: u32,
    /// Flags applied to the implicit keep, maintained by `imap4flags`.
    pub implicit_keep_flags: Vec<String>,
    executed: bool,
    executed_delivery: bool,
}

impl SieveResult {
    #[must_use]
    pub fn new(config: &SieveConfig) -> Self {
        Self {
            actions: Vec::new(),
            max_redirects: config.max_redirects,
            max_actions: config.max_actions,
            redirect_count: 0,
            implicit_keep_flags: Vec::new(),
            executed: false,
            executed_delivery: false,
        }
    }

    #[must_use]
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    /// Whether the implicit keep is still pending.
    #[must_use]
    pub fn implicit_keep_active(&self) -> bool {
        !self.actions.iter().any(Action::cancels_implicit_keep)
    }

    #[must_use]
    pub fn has_discard(&self) -> bool {
        self.actions.iter().any(|a| matches!(a, Action::Discard))
    }

    /// Whether any accumulated action produces a delivery.
    #[must_use]
    pub fn has_delivery(&self) -> bool {
        self.actions.iter().any(Action::is_delivery)
    }

    /// Whether `execute` has run.
    #[must_use]
    pub const fn executed(&self) -> bool {
        self.executed
    }

    /// Whether a delivery-producing action actually executed.
    #[must_use]
    pub const fn executed_delivery(&self) -> bool {
        self.executed_delivery
    }

    // ============= Logical append =============

    /// Append an action, collapsing duplicates and resolving conflicts.
    pub fn add(&mut self, action: Action) -> Result<(), RuntimeError> {
        // Reject is incompatible with anything that delivers the message.
        if matches!(action, Action::Reject { .. }) {
            if let Some(other) = self
                .actions
                .iter()
                .find(|a| a.is_delivery() && !matches!(a, Action::Reject { .. }))
            {
                return Err(RuntimeError::Conflict(format!(
                    "reject cannot be combined with {}",
                    other.describe()
                )));
            }
        }
        if action.is_delivery() && !matches!(action, Action::Reject { .. }) {
            if self.actions.iter().any(|a| matches!(a, Action::Reject { .. })) {
                return Err(RuntimeError::Conflict(format!(
                    "{} cannot be combined with reject",
                    action.describe()
                )));
            }
        }

        // A storing action overrides an earlier discard.
        if action.is_storing() && self.has_discard() {
            tracing::warn!(
                action = %action.describe(),
                "discard overridden by storing action"
            );
            self.actions.retain(|a| !matches!(a, Action::Discard));
        }
        // And a discard after a storing action is ignored.
        if matches!(action, Action::Discard) && self.actions.iter().any(Action::is_storing) {
            tracing::warn!("discard ignored: message is already stored by another action");
            return Ok(());
        }

        match &action {
            Action::Keep { flags } => {
                if let Some(Action::Keep {
                    flags: existing, ..
                }) = self
                    .actions
                    .iter_mut()
                    .find(|a| matches!(a, Action::Keep { .. }))
                {
                    merge_flags(existing, flags);
                    return Ok(());
                }
            }
            Action::FileInto { folder, flags, copy } => {
                if let Some(Action::FileInto {
                    flags: existing,
                    copy: existing_copy,
                    ..
                }) = self.actions.iter_mut().find(
                    |a| matches!(a, Action::FileInto { folder: f, .. } if f == folder),
                ) {
                    merge_flags(existing, flags);
                    // A non-copy store wins over a copy.
                    *existing_copy = *existing_copy && *copy;
                    return Ok(());
                }
            }
            Action::Redirect { address, copy } => {
                if let Some(Action::Redirect {
                    copy: existing_copy,
                    ..
                }) = self.actions.iter_mut().find(
                    |a| matches!(a, Action::Redirect { address: a2, .. } if a2 == address),
                ) {
                    *existing_copy = *existing_copy && *copy;
                    return Ok(());
                }
                if self.redirect_count >= self.max_redirects {
                    return Err(RuntimeError::RedirectLimit(self.max_redirects));
                }
                self.redirect_count += 1;
            }
            Action::Discard => {
                if self.has_discard() {
                    return Ok(());
                }
            }
            Action::Reject { reason } => {
                if let Some(Action::Reject { reason: existing }) = self
                    .actions
                    .iter()
                    .find(|a| matches!(a, Action::Reject { .. }))
                {
                    if existing == reason {
                        return Ok(());
                    }
                    return Err(RuntimeError::Conflict(
                        "multiple reject actions with different reasons".to_string(),
                    ));
                }
            }
            Action::Vacation { .. } => {
                if let Some(existing) = self
                    .actions
                    .iter()
                    .find(|a| matches!(a, Action::Vacation { .. }))
                {
                    if *existing == action {
                        return Ok(());
                    }
                    return Err(RuntimeError::Conflict(
                        "multiple vacation actions in one execution".to_string(),
                    ));
                }
            }
        }

        if self.actions.len() as u32 >= self.max_actions {
            return Err(RuntimeError::ActionLimit(self.max_actions));
        }
        self.actions.push(action);
        Ok(())
    }

    // ============= Execution =============

    /// Phase A, then optionally phase B (implicit keep).
    ///
    /// Actions run in a fixed order regardless of script order: stores,
    /// then redirects, then vacation responses, then discard/reject
    /// terminals. Execution stops at the first delivery failure; the
    /// status reflects how far it got.
    pub fn execute(
        &mut self,
        deliver: &mut dyn DeliveryTarget,
        with_implicit_keep: bool,
    ) -> ExecStatus {
        self.executed = true;
        let plan: Vec<Action> = self
            .actions
            .iter()
            .filter(|a| a.is_storing())
            .chain(
                self.actions
                    .iter()
                    .filter(|a| matches!(a, Action::Redirect { .. })),
            )
            .chain(
                self.actions
                    .iter()
                    .filter(|a| matches!(a, Action::Vacation { .. })),
            )
            .chain(
                self.actions
                    .iter()
                    .filter(|a| matches!(a, Action::Discard | Action::Reject { .. })),
            )
            .cloned()
            .collect();

        let mut ran_any = false;
        for action in &plan {
            tracing::debug!(action = %action.describe(), "executing sieve action");
            let outcome = match action {
                Action::Keep { flags } => {
                    let folder = deliver.default_folder().to_string();
                    deliver.store(&folder, flags)
                }
                Action::FileInto { folder, flags, .. } => deliver.store(folder, flags),
                Action::Redirect { address, .. } => deliver.redirect(address),
                Action::Reject { reason } => deliver.reject(reason),
                Action::Discard => {
                    deliver.discard();
                    Ok(())
                }
                Action::Vacation {
                    reason,
                    subject,
                    from,
                    addresses,
                    handle,
                    days,
                    mime,
                } => deliver.vacation(&VacationResponse {
                    reason,
                    subject: subject.as_deref(),
                    from: from.as_deref(),
                    addresses,
                    handle: handle.as_deref(),
                    days: *days,
                    mime: *mime,
                }),
            };
            match outcome {
                Ok(()) => {
                    ran_any = true;
                    if action.is_delivery() {
                        self.executed_delivery = true;
                    }
                }
                Err(DeliveryError::Temporary(err)) => {
                    tracing::warn!(action = %action.describe(), %err, "sieve action temp-failed");
                    return if ran_any {
                        ExecStatus::Failure
                    } else {
                        ExecStatus::TempFailure
                    };
                }
                Err(DeliveryError::Permanent(err)) => {
                    tracing::error!(action = %action.describe(), %err, "sieve action failed");
                    return ExecStatus::Failure;
                }
            }
        }

        if with_implicit_keep && self.implicit_keep_active() {
            return self.implicit_keep(deliver);
        }

        ExecStatus::Ok
    }

    /// Phase B: store to the default folder. Failure here is the most
    /// severe outcome - the message could not be preserved.
    pub fn implicit_keep(&mut self, deliver: &mut dyn DeliveryTarget) -> ExecStatus {
        self.executed = true;
        let folder = deliver.default_folder().to_string();
        let flags = self.implicit_keep_flags.clone();
        tracing::debug!(folder = %folder, "executing implicit keep");
        match deliver.store(&folder, &flags) {
            Ok(()) => {
                self.executed_delivery = true;
                ExecStatus::Ok
            }
            Err(DeliveryError::Temporary(err)) => {
                tracing::warn!(%err, "implicit keep temp-failed");
                ExecStatus::TempFailure
            }
            Err(DeliveryError::Permanent(err)) => {
                tracing::error!(%err, "implicit keep failed");
                ExecStatus::KeepFailed
            }
        }
    }
}

/// Union of flag sets, preserving first-seen order.
fn merge_flags(existing: &mut Vec<String>, extra: &[String]) {
    for flag in extra {
        if !existing.contains(flag) {
            existing.push(flag.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::CollectingDelivery;

    fn result() -> SieveResult {
        SieveResult::new(&SieveConfig::default())
    }

    fn fileinto(folder: &str) -> Action {
        Action::FileInto {
            folder: folder.into(),
            flags: Vec::new(),
            copy: false,
        }
    }

    #[test]
    fn test_duplicate_fileinto_collapses() {
        let mut r = result();
        r.add(fileinto("X")).unwrap();
        r.add(fileinto("X")).unwrap();
        assert_eq!(r.actions().len(), 1);
        r.add(fileinto("Y")).unwrap();
        assert_eq!(r.actions().len(), 2);
    }

    #[test]
    fn test_discard_loses_to_store() {
        let mut r = result();
        r.add(Action::Discard).unwrap();
        r.add(fileinto("X")).unwrap();
        assert_eq!(r.actions(), &[fileinto("X")]);

        let mut r = result();
        r.add(fileinto("X")).unwrap();
        r.add(Action::Discard).unwrap();
        assert_eq!(r.actions(), &[fileinto("X")]);
    }

    #[test]
    fn test_redirect_cap() {
        let mut r = result();
        for i in 0..4 {
            r.add(Action::Redirect {
                address: format!("a{i}@b"),
                copy: false,
            })
            .unwrap();
        }
        let err = r
            .add(Action::Redirect {
                address: "a4@b".into(),
                copy: false,
            })
            .unwrap_err();
        assert!(matches!(err, RuntimeError::RedirectLimit(4)));
        // Duplicates do not count against the cap.
        r.add(Action::Redirect {
            address: "a0@b".into(),
            copy: false,
        })
        .unwrap();
    }

    #[test]
    fn test_reject_conflicts_with_store() {
        let mut r = result();
        r.add(fileinto("X")).unwrap();
        assert!(matches!(
            r.add(Action::Reject {
                reason: "no".into()
            }),
            Err(RuntimeError::Conflict(_))
        ));
    }

    #[test]
    fn test_implicit_keep_tracking() {
        let mut r = result();
        assert!(r.implicit_keep_active());
        r.add(Action::Vacation {
            reason: "away".into(),
            subject: None,
            from: None,
            addresses: Vec::new(),
            handle: None,
            days: 7,
            mime: false,
        })
        .unwrap();
        assert!(r.implicit_keep_active());
        r.add(Action::FileInto {
            folder: "X".into(),
            flags: Vec::new(),
            copy: true,
        })
        .unwrap();
        // :copy preserves the implicit keep.
        assert!(r.implicit_keep_active());
        r.add(fileinto("X")).unwrap();
        assert!(!r.implicit_keep_active());
    }

    #[test]
    fn test_execute_implicit_keep_when_empty() {
        let mut r = result();
        let mut delivery = CollectingDelivery::default();
        assert_eq!(r.execute(&mut delivery, true), ExecStatus::Ok);
        assert_eq!(delivery.stored, vec![("INBOX".to_string(), Vec::new())]);
    }

    #[test]
    fn test_execute_order() {
        let mut r = result();
        r.add(Action::Redirect {
            address: "a@b".into(),
            copy: false,
        })
        .unwrap();
        r.add(fileinto("X")).unwrap();
        let mut delivery = CollectingDelivery::default();
        assert_eq!(r.execute(&mut delivery, true), ExecStatus::Ok);
        // Stores run before redirects regardless of script order.
        assert_eq!(delivery.log, vec!["store X", "redirect a@b"]);
        assert!(r.executed_delivery());
    }

    #[test]
    fn test_keep_failure_statuses() {
        let mut r = result();
        let mut delivery = CollectingDelivery::default();
        delivery.fail_store = Some(DeliveryError::Permanent("disk on fire".into()));
        assert_eq!(r.implicit_keep(&mut delivery), ExecStatus::KeepFailed);

        let mut r = result();
        let mut delivery = CollectingDelivery::default();
        delivery.fail_store = Some(DeliveryError::Temporary("busy".into()));
        assert_eq!(r.implicit_keep(&mut delivery), ExecStatus::TempFailure);
    }

    #[test]
    fn test_action_limit() {
        let mut config = SieveConfig::default();
        config.max_actions = 2;
        let mut r = SieveResult::new(&config);
        r.add(fileinto("A")).unwrap();
        r.add(fileinto("B")).unwrap();
        assert!(matches!(
            r.add(fileinto("C")),
            Err(RuntimeError::ActionLimit(2))
        ));
    }
}
