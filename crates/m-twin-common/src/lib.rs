//! ---
//! mtwin_section: "01-core-runtime"
//! mtwin_subsection: "module"
//! mtwin_type: "source"
//! mtwin_scope: "code"
//! mtwin_description: "Shared primitives and utilities for the core runtime."
//! mtwin_version: "v0.1.0-prealpha"
//! mtwin_owner: "tbd"
//! ---
//! Core shared primitives for the M-TWIN workspace.
//! This crate exposes configuration loading, logging, and time utilities
//! consumed across the workspace.

pub mod config;
pub mod logging;
pub mod time;

pub use config::{ApiConfig, AppConfig, BridgeKind, LoggingConfig, SessionDefaults, SessionMode};
pub use logging::{init_tracing, LogFormat};
