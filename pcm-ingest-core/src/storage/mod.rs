pub mod capture_writer;
pub mod metadata;
pub mod raw_stream;
pub mod wave_reader;
pub mod wave_writer;
