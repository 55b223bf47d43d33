//! Images list view model for Podman's system and per-user engines.
//!
//! - [`state`] holds the view model and its transitions
//! - [`services`] runs image operations and applies vulnerability reports
//! - [`ui`] projects the view model into rows and dialogs
//! - [`docker`] talks to the engines

pub mod docker;
pub mod services;
pub mod state;
pub mod ui;
