pub mod aligner;
pub mod consumption;
pub mod history;
pub mod source;

pub use aligner::*;
pub use consumption::*;
pub use history::ConsumptionHistory;
pub use source::*;
