pub mod mixer;
pub mod riff_reader;
pub mod wav_format;
