//! Application services layer
//!
//! This module contains the async operations that act on the images view model:
//!
//! - `operations` - Pull, remove and force-remove against the engine gateway
//! - `vulnerabilities` - Scan report feed and the subscription that applies it
//! - `notifications` - User-facing failure notifications

mod notifications;
mod operations;
mod vulnerabilities;

#[cfg(test)]
pub(crate) mod testing;

pub use notifications::*;
pub use operations::*;
pub use vulnerabilities::*;
