pub mod config;
pub mod daemon;
pub mod session;
pub mod storage;
pub mod sync;
