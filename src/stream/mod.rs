mod driver;
mod reader;

pub use driver::{run, Analyzer, RunOptions};
pub use reader::{Line, LineReader};
