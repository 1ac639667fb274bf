//! ---
//! mtwin_section: "01-core-runtime"
//! mtwin_subsection: "module"
//! mtwin_type: "source"
//! mtwin_scope: "code"
//! mtwin_description: "Session lifecycle, tick scheduling, and status surface."
//! mtwin_version: "v0.1.0-prealpha"
//! mtwin_owner: "tbd"
//! ---
//! Session orchestration for the M-TWIN runtime.
//!
//! A [`manager::SessionManager`] owns every simulation session in the
//! process. Each running session drives its own tokio task: strictly
//! sequential component steps inside a tick, wall-clock pacing in HIL mode,
//! and cancellation honored at tick boundaries. Configuration errors
//! surface synchronously from `start`; runtime faults surface through the
//! published status, never by unwinding the background task.

pub mod manager;
pub mod scheduler;
pub mod session;
pub mod status;

use uuid::Uuid;

/// Shared result type for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;

/// Errors surfaced by the session control surface.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The dependency graph or bindings failed validation at start.
    #[error("configuration error: {0}")]
    Configuration(#[from] m_twin_graph::GraphError),
    /// The model snapshot could not be materialized into components.
    #[error("model error: {0}")]
    Model(#[from] m_twin_model::ModelError),
    /// A component failed to advance; the in-progress tick was discarded.
    #[error("component step failed: {0}")]
    Step(#[from] m_twin_model::ComponentStepError),
    /// The referenced session does not exist.
    #[error("session {session} not found")]
    NotFound { session: Uuid },
    /// The requested lifecycle transition is not legal from the current
    /// state.
    #[error("cannot {operation} a session that is {state}")]
    InvalidTransition {
        operation: &'static str,
        state: session::LifecycleState,
    },
}

pub use manager::SessionManager;
pub use session::{LifecycleState, SessionConfig};
pub use status::{BindingStatus, ComponentStatus, SessionStatus};
