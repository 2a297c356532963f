pub mod buffer_device;
pub mod capture_sink;
pub mod pcm_stream;
pub mod polling_device;
