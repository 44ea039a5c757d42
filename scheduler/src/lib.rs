pub mod blocking;
pub mod events;
pub mod frames;
pub mod host;
pub mod job;
pub mod scheduler;
pub mod simulated;
