mod grammar;
mod path;

pub use grammar::{parse_clf_date, parse_log_line};
pub use path::{normalize_path, split_query};
