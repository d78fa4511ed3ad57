//! Applying backend-reported escalation status to local state.

use crate::types::api::EscalationStatusResponse;
use crate::types::{EscalationState, EscalationStatus};

/// Outcome of [`apply_status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StatusUpdate {
    /// Status moved.
    Changed {
        from: EscalationStatus,
        to: EscalationStatus,
    },
    /// Status unchanged; detail fields may have been refreshed.
    Unchanged,
    /// Local state is terminal; nothing was written.
    Rejected { current: EscalationStatus },
}

/// Mirrors the backend's view into `state`.
///
/// Moves outside the documented lifecycle are applied and logged. Once the
/// local status is terminal every write is rejected.
pub(crate) fn apply_status(
    state: &mut EscalationState,
    resp: &EscalationStatusResponse,
) -> StatusUpdate {
    let current = state.status;
    if current.is_terminal() {
        if resp.status != current {
            tracing::warn!(
                %current,
                reported = %resp.status,
                "ignoring escalation update after terminal state"
            );
        }
        return StatusUpdate::Rejected { current };
    }

    if !current.can_transition_to(resp.status) {
        tracing::warn!(
            from = %current,
            to = %resp.status,
            "backend reported an out-of-order escalation transition"
        );
    }

    if let Some(ticket) = &resp.ticket_id {
        state.ticket_id = Some(ticket.clone());
    }
    if resp.estimated_wait_time.is_some() {
        state.estimated_wait_time = resp.estimated_wait_time;
    }
    if resp.assigned_agent.is_some() {
        state.assigned_agent.clone_from(&resp.assigned_agent);
    }
    state.status = resp.status;

    if current == resp.status {
        StatusUpdate::Unchanged
    } else {
        StatusUpdate::Changed {
            from: current,
            to: resp.status,
        }
    }
}

/// User-facing line for a status change.
pub(crate) fn describe(state: &EscalationState) -> String {
    match state.status {
        EscalationStatus::Assigned => match &state.assigned_agent {
            Some(agent) => format!("{agent} has been assigned to your request."),
            None => "An agent has been assigned to your request.".into(),
        },
        EscalationStatus::InProgress => "An agent is now working on your request.".into(),
        EscalationStatus::WaitingCustomer => {
            "The agent is waiting for your reply.".into()
        }
        EscalationStatus::Resolved => "Your support request has been resolved.".into(),
        EscalationStatus::Cancelled => "Your support request was cancelled.".into(),
        EscalationStatus::Pending | EscalationStatus::None => {
            format!("Support request status: {}.", state.status)
        }
    }
}
