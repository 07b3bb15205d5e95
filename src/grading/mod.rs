pub mod average;
pub mod report_card;
pub mod resolver;

pub use average::*;
pub use report_card::*;
pub use resolver::*;
