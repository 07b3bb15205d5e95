pub mod utils;

mod report_card;
mod resolver;
