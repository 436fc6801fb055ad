//! Process-level infrastructure shared by the workspace: command line and
//! environment configuration, and terminal logging.

pub mod config;
pub mod logging;
