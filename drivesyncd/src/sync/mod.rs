pub mod listener;
pub mod payload;
pub mod scheduler;
pub mod trigger;
