pub mod error;
pub mod log;
pub mod process;
pub mod server;
