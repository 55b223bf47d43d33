mod delete_flow;
mod images_state;
mod settings;
mod vulnerability;

pub use delete_flow::*;
pub use images_state::*;
pub use settings::*;
pub use vulnerability::*;
