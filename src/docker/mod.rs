mod client;
mod containers;
mod error;
mod gateway;
mod images;

pub use client::*;
pub use containers::*;
pub use error::*;
pub use gateway::*;
pub use images::*;
