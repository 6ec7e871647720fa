pub mod common;
pub mod completions;
pub mod inventory;
pub mod pending;
pub mod records;
pub mod status;
pub mod sync;
pub mod watch;
