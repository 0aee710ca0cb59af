//! CLI commands

pub mod template;

// Release lifecycle
pub mod install;
pub mod rollback;
pub mod uninstall;
pub mod upgrade;

// History queries
pub mod history;
pub mod list;
pub mod status;
