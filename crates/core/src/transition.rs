//! Patient status lifecycle.
//!
//! The status graph is fully connected: any status can be reached from any other. What
//! varies per target is the data a transition must carry, and that is described by the
//! [`RULES`] table keyed by `(target, reason)`.
//!
//! Validation is pure ([`StatusTransitionEngine::validate_transition`]) and runs before
//! anything is sent. [`StatusTransitionEngine::execute`] sends the resulting update and
//! then refreshes the directory; local state is never patched optimistically.

use crate::directory::PatientDirectory;
use crate::error::{CoreResult, ValidationError};
use crate::patient::{DischargeReason, Patient, PatientStatus};
use crate::remote::{PatientUpdate, PersistenceService};
use amb_types::NonEmptyText;
use serde::Serialize;
use std::sync::Arc;

// ============================================================================
// Rule table
// ============================================================================

/// Which discharge reasons a rule applies to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReasonKey {
    /// Any reason, or none. The reason is not sent.
    Any,
    /// Exactly this reason, which is sent with the update.
    Is(DischargeReason),
}

/// Whether a transition's notes must, may or will not be sent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NotesRule {
    Required,
    Optional,
    Ignored,
}

/// Accompanying data required for one `(target, reason)` combination.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransitionRule {
    pub target: PatientStatus,
    pub reason: ReasonKey,
    pub notes: NotesRule,
}

impl TransitionRule {
    const fn new(target: PatientStatus, reason: ReasonKey, notes: NotesRule) -> Self {
        Self {
            target,
            reason,
            notes,
        }
    }

    fn matches(&self, target: PatientStatus, reason: Option<DischargeReason>) -> bool {
        self.target == target
            && match self.reason {
                ReasonKey::Any => true,
                ReasonKey::Is(r) => reason == Some(r),
            }
    }
}

/// Every permitted `(target, reason)` combination. A discharge with no matching row is
/// missing its reason.
pub const RULES: &[TransitionRule] = &[
    TransitionRule::new(PatientStatus::InCura, ReasonKey::Any, NotesRule::Ignored),
    TransitionRule::new(
        PatientStatus::Dimesso,
        ReasonKey::Is(DischargeReason::Guarito),
        NotesRule::Optional,
    ),
    TransitionRule::new(
        PatientStatus::Dimesso,
        ReasonKey::Is(DischargeReason::Adi),
        NotesRule::Optional,
    ),
    TransitionRule::new(
        PatientStatus::Dimesso,
        ReasonKey::Is(DischargeReason::Altro),
        NotesRule::Required,
    ),
    TransitionRule::new(PatientStatus::Sospeso, ReasonKey::Any, NotesRule::Required),
];

/// Looks up the rule for a transition, if the combination is permitted.
pub fn rule_for(
    target: PatientStatus,
    reason: Option<DischargeReason>,
) -> Option<&'static TransitionRule> {
    RULES.iter().find(|rule| rule.matches(target, reason))
}

/// The patient field a target's notes are stored in.
const fn notes_field(target: PatientStatus) -> Option<&'static str> {
    match target {
        PatientStatus::InCura => None,
        PatientStatus::Dimesso => Some("discharge_notes"),
        PatientStatus::Sospeso => Some("suspend_notes"),
    }
}

// ============================================================================
// Requests and payloads
// ============================================================================

/// A requested status change, as entered by the user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransitionRequest {
    pub target: PatientStatus,
    pub reason: Option<DischargeReason>,
    pub notes: Option<String>,
}

impl TransitionRequest {
    pub fn to(target: PatientStatus) -> Self {
        Self {
            target,
            reason: None,
            notes: None,
        }
    }

    pub fn with_reason(mut self, reason: DischargeReason) -> Self {
        self.reason = Some(reason);
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// Validated status update body.
///
/// Absent fields are not serialised, so a return to `in_cura` leaves the previous
/// discharge or suspension annotations untouched on the service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StatusUpdate {
    pub status: PatientStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discharge_reason: Option<DischargeReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discharge_notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suspend_notes: Option<String>,
}

// ============================================================================
// Engine
// ============================================================================

pub struct StatusTransitionEngine {
    remote: Arc<dyn PersistenceService>,
}

impl StatusTransitionEngine {
    pub fn new(remote: Arc<dyn PersistenceService>) -> Self {
        Self { remote }
    }

    /// Statuses a patient can be moved to: every status except the current one.
    pub fn offered_targets(current: PatientStatus) -> Vec<PatientStatus> {
        PatientStatus::ALL
            .into_iter()
            .filter(|status| *status != current)
            .collect()
    }

    /// Checks a transition and builds the update to send.
    ///
    /// # Errors
    ///
    /// - [`ValidationError::SameStatus`] if the patient is already in the target status.
    /// - [`ValidationError::MissingField`] naming `discharge_reason` for a discharge
    ///   without a reason, or the notes field when the rule requires notes.
    pub fn validate_transition(
        patient: &Patient,
        request: &TransitionRequest,
    ) -> Result<StatusUpdate, ValidationError> {
        if request.target == patient.status {
            return Err(ValidationError::SameStatus(patient.status));
        }

        let rule = rule_for(request.target, request.reason)
            .ok_or(ValidationError::MissingField("discharge_reason"))?;

        let notes = NonEmptyText::from_optional(request.notes.clone()).map(NonEmptyText::into_inner);
        let notes = match (rule.notes, notes_field(rule.target)) {
            (NotesRule::Ignored, _) | (_, None) => None,
            (NotesRule::Required, Some(field)) => {
                Some(notes.ok_or(ValidationError::MissingField(field))?)
            }
            (NotesRule::Optional, Some(_)) => notes,
        };

        let discharge_reason = match rule.reason {
            ReasonKey::Is(reason) => Some(reason),
            ReasonKey::Any => None,
        };

        Ok(match rule.target {
            PatientStatus::InCura => StatusUpdate {
                status: PatientStatus::InCura,
                discharge_reason: None,
                discharge_notes: None,
                suspend_notes: None,
            },
            PatientStatus::Dimesso => StatusUpdate {
                status: PatientStatus::Dimesso,
                discharge_reason,
                discharge_notes: notes,
                suspend_notes: None,
            },
            PatientStatus::Sospeso => StatusUpdate {
                status: PatientStatus::Sospeso,
                discharge_reason: None,
                discharge_notes: None,
                suspend_notes: notes,
            },
        })
    }

    /// Validates and applies a transition, then refreshes `directory`.
    ///
    /// Nothing is sent if validation fails. If the update succeeds but the refresh does
    /// not, the refresh error is returned and the directory keeps its previous contents.
    pub async fn execute(
        &self,
        patient: &Patient,
        request: &TransitionRequest,
        directory: &mut PatientDirectory,
    ) -> CoreResult<Patient> {
        let update = Self::validate_transition(patient, request)?;

        let updated = self
            .remote
            .update_patient(&patient.id, &PatientUpdate::Status(update))
            .await?;
        tracing::info!(
            patient_id = %patient.id,
            from = %patient.status,
            to = %updated.status,
            "patient status changed"
        );

        directory.refresh().await?;
        Ok(updated)
    }
}
