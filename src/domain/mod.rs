pub mod battery;
pub mod forecast;
pub mod horizon;
pub mod schedule;

pub use battery::*;
pub use forecast::*;
pub use horizon::*;
pub use schedule::*;
