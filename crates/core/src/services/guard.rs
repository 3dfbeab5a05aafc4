//! Editable-state guard.

use enrollment_common::{AppError, AppResult, TenantScope};
use enrollment_db::{entities::participant, repositories::ParticipantRepository};
use sea_orm::ConnectionTrait;

/// Rejects child mutations unless the participant is a draft.
///
/// Submit, approve and reject do not pass through here; they check their
/// own preconditions in the workflow.
#[derive(Debug, Clone, Copy, Default)]
pub struct EditableStateGuard {
    participants: ParticipantRepository,
}

impl EditableStateGuard {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            participants: ParticipantRepository::new(),
        }
    }

    /// Check a loaded participant.
    pub fn check(participant: &participant::Model, action: impl Into<String>) -> AppResult<()> {
        if participant.status.is_editable() {
            Ok(())
        } else {
            Err(AppError::invalid_state(action.into(), participant.status))
        }
    }

    /// Load and lock a participant for a child mutation, then check it.
    pub async fn load<C: ConnectionTrait>(
        &self,
        conn: &C,
        scope: &TenantScope,
        participant_id: &str,
        action: impl Into<String>,
    ) -> AppResult<participant::Model> {
        let participant = self
            .participants
            .get_for_edit(conn, scope, participant_id)
            .await?;
        Self::check(&participant, action)?;
        Ok(participant)
    }
}
