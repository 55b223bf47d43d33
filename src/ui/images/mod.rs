mod rows;
mod view;

pub use rows::*;
pub use view::*;
