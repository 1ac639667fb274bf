//! ---
//! mtwin_section: "03-graph-scheduling"
//! mtwin_subsection: "module"
//! mtwin_type: "source"
//! mtwin_scope: "code"
//! mtwin_description: "Connection graph build, validation, and scheduling order."
//! mtwin_version: "v0.1.0-prealpha"
//! mtwin_owner: "tbd"
//! ---
//! Dependency graph over a model snapshot.
//!
//! [`DependencyGraph::build`] validates the connection and binding
//! invariants at configuration time; [`order::compute_order`] derives the
//! per-session evaluation order. Both fail fast: a session whose graph does
//! not validate never reaches `Running`.

pub mod graph;
pub mod order;

/// Shared result type for graph operations.
pub type Result<T> = std::result::Result<T, GraphError>;

/// Configuration errors detected while building or ordering the dependency
/// graph. All of these are fatal to the `start` attempt that triggered them.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    /// Two components share an id.
    #[error("duplicate component id '{component}'")]
    DuplicateComponent { component: String },
    /// A connection or binding references a component outside the snapshot.
    #[error("unknown component '{component}' referenced by {referrer}")]
    UnknownComponent { component: String, referrer: String },
    /// A connection or binding references a port the kind does not declare.
    #[error("component '{component}' has no {direction} port '{port}'")]
    UnknownPort {
        component: String,
        port: String,
        direction: PortDirection,
    },
    /// Two connections feed the same input port.
    #[error("input port '{component}.{port}' has more than one incoming connection")]
    DuplicateInputWriter { component: String, port: String },
    /// A read binding targets an input port already fed by a connection.
    #[error("read binding targets '{component}.{port}' which is already fed by a connection")]
    BindingShadowsConnection { component: String, port: String },
    /// More than one binding declared for the same port.
    #[error("conflicting bindings declared for port '{component}.{port}'")]
    ConflictingBindings { component: String, port: String },
    /// The connection graph contains a cycle; the members listed are every
    /// component left unordered.
    #[error("dependency cycle involving components: {}", members.join(", "))]
    CycleDetected { members: Vec<String> },
}

/// Port direction used in error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortDirection {
    Input,
    Output,
}

impl std::fmt::Display for PortDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PortDirection::Input => f.write_str("input"),
            PortDirection::Output => f.write_str("output"),
        }
    }
}

pub use graph::DependencyGraph;
pub use order::compute_order;
