pub mod batch_trace;
pub mod performance;
