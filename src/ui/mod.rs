pub mod format;
pub mod table;

pub use format::{format_change, format_price, format_volume};
pub use table::{render_snapshot, render_state, render_table};
