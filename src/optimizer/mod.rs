pub mod backend;
pub mod program;
pub mod schedule;
pub mod types;

pub use backend::*;
pub use program::*;
pub use schedule::*;
pub use types::*;
