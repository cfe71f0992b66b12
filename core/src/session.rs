//! Session lifecycle state machine.
//!
//! ```text
//!             start()                    complete()
//!  [none] ───────────────► in_progress ───────────────► completed
//!                               │
//!                               │ cancel()
//!                               ▼
//!                           cancelled
//! ```
//!
//! There are no implicit transitions. Terminal states are final; a retried
//! terminal command against the same terminal state is a no-op rather than an
//! error so clients can retry after a timeout.

use crate::error::EngineError;
use crate::types::{Session, SessionStatus};

/// A lifecycle command against an existing session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleCommand {
    /// Reconcile and close
    Complete,
    /// Abandon without reconciling
    Cancel,
}

impl LifecycleCommand {
    /// Status this command moves the session into
    #[must_use]
    pub const fn target(&self) -> SessionStatus {
        match self {
            Self::Complete => SessionStatus::Completed,
            Self::Cancel => SessionStatus::Cancelled,
        }
    }
}

/// Decision returned by [`decide`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    /// Perform the transition into the given status
    Apply(SessionStatus),
    /// Session is already in the command's terminal status
    AlreadyDone(SessionStatus),
}

/// Decide what a lifecycle command does to a session.
///
/// # Errors
///
/// Returns [`EngineError::SessionNotActive`] when the session sits in the
/// *other* terminal state (completing a cancelled session or vice versa).
pub fn decide(session: &Session, command: LifecycleCommand) -> Result<Transition, EngineError> {
    let target = command.target();
    match session.status {
        SessionStatus::InProgress => Ok(Transition::Apply(target)),
        status if status == target => Ok(Transition::AlreadyDone(status)),
        status => Err(EngineError::SessionNotActive {
            session_id: session.id,
            status,
        }),
    }
}

/// Require an in-progress session for count writes and previews.
///
/// # Errors
///
/// Returns [`EngineError::SessionNotActive`] for terminal sessions.
pub fn ensure_active(session: &Session) -> Result<(), EngineError> {
    if session.is_active() {
        Ok(())
    } else {
        Err(EngineError::SessionNotActive {
            session_id: session.id,
            status: session.status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ActorId, ModeTag, ZoneId};
    use chrono::Utc;

    fn session(status: SessionStatus) -> Session {
        let mut s = Session::start(
            ActorId::new("sam"),
            ZoneId::new("back-bar"),
            ModeTag::Production,
            Utc::now(),
        );
        s.status = status;
        s
    }

    #[test]
    fn in_progress_accepts_both_commands() {
        let s = session(SessionStatus::InProgress);
        assert_eq!(
            decide(&s, LifecycleCommand::Complete),
            Ok(Transition::Apply(SessionStatus::Completed))
        );
        assert_eq!(
            decide(&s, LifecycleCommand::Cancel),
            Ok(Transition::Apply(SessionStatus::Cancelled))
        );
    }

    #[test]
    fn repeated_terminal_command_is_idempotent() {
        let s = session(SessionStatus::Completed);
        assert_eq!(
            decide(&s, LifecycleCommand::Complete),
            Ok(Transition::AlreadyDone(SessionStatus::Completed))
        );
        let s = session(SessionStatus::Cancelled);
        assert_eq!(
            decide(&s, LifecycleCommand::Cancel),
            Ok(Transition::AlreadyDone(SessionStatus::Cancelled))
        );
    }

    #[test]
    fn crossing_terminal_states_fails() {
        let s = session(SessionStatus::Cancelled);
        assert!(matches!(
            decide(&s, LifecycleCommand::Complete),
            Err(EngineError::SessionNotActive {
                status: SessionStatus::Cancelled,
                ..
            })
        ));
        let s = session(SessionStatus::Completed);
        assert!(decide(&s, LifecycleCommand::Cancel).is_err());
    }

    #[test]
    fn ensure_active_rejects_terminal() {
        assert!(ensure_active(&session(SessionStatus::InProgress)).is_ok());
        assert!(ensure_active(&session(SessionStatus::Completed)).is_err());
    }
}
