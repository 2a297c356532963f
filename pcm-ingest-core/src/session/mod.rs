pub mod buffer_queue;
pub mod buffers;
pub mod polling;
pub mod signal;
