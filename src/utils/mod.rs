pub mod formatting;

pub use formatting::{clip, format_bytes, format_duration};
