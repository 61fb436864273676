pub mod checkpoint;
pub mod common;
pub mod completions;
pub mod conflicts;
pub mod daemon;
pub mod edit;
pub mod list;
pub mod log;
pub mod record;
pub mod retry;
pub mod status;
pub mod sync;
