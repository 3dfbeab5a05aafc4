//! Participant workflow: submit, approve and reject.
//!
//! Each transition is one optimistic update of the root plus one history
//! row, committed together. Nothing here goes through the editable-state
//! guard; the transition table is the precondition.

use chrono::Utc;
use enrollment_common::{AppError, AppResult, TenantScope};
use enrollment_db::{
    entities::{
        participant::{self, ParticipantStatus},
        participant_registration::RegistrationStatus,
        participant_status_history::HistoryEvent,
    },
    repositories::{
        ParticipantRepository, RegistrationRepository, StatusHistoryRepository,
        status_history::NewHistoryEntry,
    },
};
use sea_orm::{ConnectionTrait, Set};
use tracing::info;

use super::transaction::TransactionManager;

/// Shortest accepted rejection reason, after trimming.
pub const MIN_REJECTION_REASON: usize = 10;

/// Longest accepted rejection reason, after trimming.
pub const MAX_REJECTION_REASON: usize = 1000;

/// A workflow action on a participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkflowAction {
    Submit,
    Approve,
    Reject,
}

impl WorkflowAction {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Submit => "submit",
            Self::Approve => "approve",
            Self::Reject => "reject",
        }
    }

    const fn event(self) -> HistoryEvent {
        match self {
            Self::Submit => HistoryEvent::Submitted,
            Self::Approve => HistoryEvent::Approved,
            Self::Reject => HistoryEvent::Rejected,
        }
    }
}

/// Status reached by applying `action` in status `from`.
///
/// ```text
/// DRAFT            --submit-->  PENDING_APPROVAL
/// PENDING_APPROVAL --approve--> APPROVED
/// PENDING_APPROVAL --reject-->  REJECTED
/// ```
pub fn transition(
    from: ParticipantStatus,
    action: WorkflowAction,
) -> AppResult<ParticipantStatus> {
    use ParticipantStatus::{Approved, Draft, PendingApproval, Rejected};

    match (from, action) {
        (Draft, WorkflowAction::Submit) => Ok(PendingApproval),
        (PendingApproval, WorkflowAction::Approve) => Ok(Approved),
        (PendingApproval, WorkflowAction::Reject) => Ok(Rejected),
        _ => Err(AppError::invalid_state(action.as_str(), from)),
    }
}

fn check_reason(reason: &str) -> AppResult<&str> {
    let reason = reason.trim();
    let len = reason.chars().count();
    if len < MIN_REJECTION_REASON {
        return Err(AppError::field(
            "reason",
            "length",
            format!("Rejection reason must be at least {MIN_REJECTION_REASON} characters"),
        ));
    }
    if len > MAX_REJECTION_REASON {
        return Err(AppError::field(
            "reason",
            "length",
            format!("Rejection reason must be at most {MAX_REJECTION_REASON} characters"),
        ));
    }
    Ok(reason)
}

/// Workflow service.
#[derive(Clone)]
pub struct WorkflowService {
    tx: TransactionManager,
    participants: ParticipantRepository,
    history: StatusHistoryRepository,
    registrations: RegistrationRepository,
}

impl WorkflowService {
    #[must_use]
    pub const fn new(tx: TransactionManager) -> Self {
        Self {
            tx,
            participants: ParticipantRepository::new(),
            history: StatusHistoryRepository::new(),
            registrations: RegistrationRepository::new(),
        }
    }

    /// DRAFT to PENDING_APPROVAL.
    pub async fn submit(
        &self,
        scope: &TenantScope,
        participant_id: &str,
        expected_version: i32,
        actor_id: &str,
    ) -> AppResult<participant::Model> {
        let txn = self.tx.begin().await?;
        let updated = self
            .submit_in(&txn, scope, participant_id, expected_version, actor_id)
            .await?;
        self.tx.commit(txn).await?;
        Ok(updated)
    }

    pub async fn submit_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        scope: &TenantScope,
        participant_id: &str,
        expected_version: i32,
        actor_id: &str,
    ) -> AppResult<participant::Model> {
        self.apply(
            conn,
            scope,
            participant_id,
            expected_version,
            actor_id,
            WorkflowAction::Submit,
            None,
        )
        .await
    }

    /// PENDING_APPROVAL to APPROVED.
    pub async fn approve(
        &self,
        scope: &TenantScope,
        participant_id: &str,
        expected_version: i32,
        actor_id: &str,
    ) -> AppResult<participant::Model> {
        let txn = self.tx.begin().await?;
        let updated = self
            .approve_in(&txn, scope, participant_id, expected_version, actor_id)
            .await?;
        self.tx.commit(txn).await?;
        Ok(updated)
    }

    pub async fn approve_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        scope: &TenantScope,
        participant_id: &str,
        expected_version: i32,
        actor_id: &str,
    ) -> AppResult<participant::Model> {
        self.apply(
            conn,
            scope,
            participant_id,
            expected_version,
            actor_id,
            WorkflowAction::Approve,
            None,
        )
        .await
    }

    /// PENDING_APPROVAL to REJECTED, with a reason.
    pub async fn reject(
        &self,
        scope: &TenantScope,
        participant_id: &str,
        expected_version: i32,
        actor_id: &str,
        reason: &str,
    ) -> AppResult<participant::Model> {
        let reason = check_reason(reason)?;
        let txn = self.tx.begin().await?;
        let updated = self
            .reject_in(&txn, scope, participant_id, expected_version, actor_id, reason)
            .await?;
        self.tx.commit(txn).await?;
        Ok(updated)
    }

    pub async fn reject_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        scope: &TenantScope,
        participant_id: &str,
        expected_version: i32,
        actor_id: &str,
        reason: &str,
    ) -> AppResult<participant::Model> {
        let reason = check_reason(reason)?;
        self.apply(
            conn,
            scope,
            participant_id,
            expected_version,
            actor_id,
            WorkflowAction::Reject,
            Some(reason),
        )
        .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn apply<C: ConnectionTrait>(
        &self,
        conn: &C,
        scope: &TenantScope,
        participant_id: &str,
        expected_version: i32,
        actor_id: &str,
        action: WorkflowAction,
        reason: Option<&str>,
    ) -> AppResult<participant::Model> {
        let current = self.participants.get(conn, scope, participant_id).await?;
        let from = current.status;
        let to = transition(from, action)?;

        let now = Utc::now();
        let mut changes = participant::ActiveModel {
            status: Set(to),
            ..Default::default()
        };
        match action {
            WorkflowAction::Submit => {
                changes.submitted_by = Set(Some(actor_id.to_string()));
                changes.submitted_at = Set(Some(now.into()));
            }
            WorkflowAction::Approve => {
                changes.approved_by = Set(Some(actor_id.to_string()));
                changes.approved_at = Set(Some(now.into()));
            }
            WorkflowAction::Reject => {
                changes.rejected_by = Set(Some(actor_id.to_string()));
                changes.rejected_at = Set(Some(now.into()));
                changes.rejection_reason = Set(reason.map(ToString::to_string));
            }
        }

        let updated = self
            .participants
            .update(conn, scope, participant_id, expected_version, changes)
            .await?;

        self.history
            .append(
                conn,
                NewHistoryEntry {
                    participant: &updated,
                    event: action.event(),
                    from_status: Some(from),
                    actor_id,
                    reason,
                },
            )
            .await?;

        let outcome = match action {
            WorkflowAction::Submit => None,
            WorkflowAction::Approve => Some(RegistrationStatus::Approved),
            WorkflowAction::Reject => Some(RegistrationStatus::Rejected),
        };
        if let Some(outcome) = outcome {
            self.registrations
                .close_pending(conn, scope, participant_id, outcome, actor_id)
                .await?;
        }

        info!(
            participant_id = %participant_id,
            tenant_id = %scope.tenant_id,
            from = %from,
            to = %to,
            actor_id = %actor_id,
            action = action.as_str(),
            "Participant status changed"
        );

        Ok(updated)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use enrollment_db::{
        entities::participant_registration,
        test_utils::fixtures,
    };
    use sea_orm::{DatabaseBackend, DatabaseConnection, MockDatabase};
    use std::sync::Arc;

    fn service(db: DatabaseConnection) -> WorkflowService {
        WorkflowService::new(TransactionManager::new(Arc::new(db)))
    }

    /// Statements a service ran, once it is dropped.
    fn statements_of(svc: WorkflowService, db: Arc<DatabaseConnection>) -> Vec<String> {
        drop(svc);
        Arc::try_unwrap(db)
            .unwrap()
            .into_transaction_log()
            .iter()
            .flat_map(|txn| txn.statements().iter().map(|stmt| stmt.sql.clone()))
            .collect()
    }

    fn at(status: ParticipantStatus, version: i32) -> participant::Model {
        let mut p = fixtures::participant("p1", status);
        p.version = version;
        p
    }

    #[test]
    fn test_transition_table() {
        use ParticipantStatus::{Approved, Draft, PendingApproval, Rejected};
        use WorkflowAction::{Approve, Reject, Submit};

        assert_eq!(transition(Draft, Submit).unwrap(), PendingApproval);
        assert_eq!(transition(PendingApproval, Approve).unwrap(), Approved);
        assert_eq!(transition(PendingApproval, Reject).unwrap(), Rejected);

        for (from, action) in [
            (Draft, Approve),
            (Draft, Reject),
            (PendingApproval, Submit),
            (Approved, Submit),
            (Approved, Reject),
            (Rejected, Submit),
            (Rejected, Approve),
        ] {
            assert!(
                matches!(transition(from, action), Err(AppError::InvalidState { .. })),
                "{from} --{}--> should be refused",
                action.as_str()
            );
        }
    }

    #[test]
    fn test_rejection_reason_bounds() {
        assert!(check_reason("   too short ").is_err());
        assert_eq!(
            check_reason("  Missing identity card  ").unwrap(),
            "Missing identity card"
        );
        assert!(check_reason(&"x".repeat(MAX_REJECTION_REASON + 1)).is_err());
    }

    #[tokio::test]
    async fn test_submit_writes_status_and_history() {
        let submitted = at(ParticipantStatus::PendingApproval, 3);
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[at(ParticipantStatus::Draft, 2)]])
            .append_query_results([[submitted.clone()]])
            .append_query_results([[fixtures::history(
                "h2",
                &submitted,
                HistoryEvent::Submitted,
                Some(ParticipantStatus::Draft),
            )]])
            .into_connection();

        let result = service(db)
            .submit(&fixtures::scope(), "p1", 2, "u1")
            .await
            .unwrap();

        assert_eq!(result.status, ParticipantStatus::PendingApproval);
        assert_eq!(result.version, 3);
    }

    #[tokio::test]
    async fn test_submit_with_stale_version_writes_no_history() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[at(ParticipantStatus::Draft, 4)]])
                .append_query_results([Vec::<participant::Model>::new()])
                .into_connection(),
        );
        let svc = WorkflowService::new(TransactionManager::new(db.clone()));

        let result = svc.submit(&fixtures::scope(), "p1", 3, "u1").await;
        assert!(matches!(result, Err(AppError::Conflict(_))));

        let statements = statements_of(svc, db);
        assert!(statements.iter().any(|sql| sql.starts_with("UPDATE")));
        assert!(
            statements
                .iter()
                .all(|sql| !sql.contains("participant_status_history"))
        );
    }

    #[tokio::test]
    async fn test_approve_from_draft_is_invalid_state() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[at(ParticipantStatus::Draft, 1)]])
            .into_connection();

        let result = service(db)
            .approve(&fixtures::scope(), "p1", 1, "checker")
            .await;

        match result {
            Err(AppError::InvalidState { action, status }) => {
                assert_eq!(action, "approve");
                assert_eq!(status, "DRAFT");
            }
            other => panic!("Expected InvalidState, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_approve_closes_pending_registration() {
        let approved = at(ParticipantStatus::Approved, 5);
        let mut closed = fixtures::registration("r1", "p1", "u1", false);
        closed.status = RegistrationStatus::Approved;

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[at(ParticipantStatus::PendingApproval, 4)]])
            .append_query_results([[approved.clone()]])
            .append_query_results([[fixtures::history(
                "h3",
                &approved,
                HistoryEvent::Approved,
                Some(ParticipantStatus::PendingApproval),
            )]])
            .append_query_results([[closed]])
            .into_connection();

        let result = service(db)
            .approve(&fixtures::scope(), "p1", 4, "checker")
            .await
            .unwrap();

        assert_eq!(result.status, ParticipantStatus::Approved);
    }

    #[tokio::test]
    async fn test_reject_without_registration_succeeds() {
        let mut rejected = at(ParticipantStatus::Rejected, 5);
        rejected.rejection_reason = Some("Missing identity card".to_string());

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[at(ParticipantStatus::PendingApproval, 4)]])
            .append_query_results([[rejected.clone()]])
            .append_query_results([[fixtures::history(
                "h3",
                &rejected,
                HistoryEvent::Rejected,
                Some(ParticipantStatus::PendingApproval),
            )]])
            .append_query_results([Vec::<participant_registration::Model>::new()])
            .into_connection();

        let result = service(db)
            .reject(&fixtures::scope(), "p1", 4, "checker", "Missing identity card")
            .await
            .unwrap();

        assert_eq!(result.status, ParticipantStatus::Rejected);
        assert_eq!(result.rejection_reason.as_deref(), Some("Missing identity card"));
    }

    #[tokio::test]
    async fn test_reject_short_reason_never_touches_database() {
        let db = Arc::new(MockDatabase::new(DatabaseBackend::Postgres).into_connection());
        let svc = WorkflowService::new(TransactionManager::new(db.clone()));

        let result = svc
            .reject(&fixtures::scope(), "p1", 4, "checker", "no")
            .await;
        assert!(matches!(result, Err(AppError::Validation(_))));

        assert!(statements_of(svc, db).is_empty());
    }
}
