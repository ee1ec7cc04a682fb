//! Request and report model.

mod category;
mod outcome;
mod request;

pub use category::Category;
pub use outcome::{CategoryReport, CheckOutcome, CheckReport, CANCELLED_REASON};
pub use request::{CheckRequest, MAX_CANDIDATES_PER_CATEGORY};
