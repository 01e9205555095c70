pub mod file;
pub mod text;
pub mod time;

pub use file::list_json_files;
pub use text::sanitize_store_key;
pub use time::{format_age, format_timestamp};
