pub mod errors;
pub mod fs;
pub mod network;
pub mod progress_tracker;
pub mod retry;
