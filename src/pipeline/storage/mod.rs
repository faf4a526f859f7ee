// Durable relay state: the resume cursor and the rate-limit cooldown boundary

pub mod cursor_store;
pub mod durable_file;

pub use cursor_store::CursorStore;
pub use durable_file::DurableFile;
