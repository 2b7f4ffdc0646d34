pub mod quality;
pub mod ring_buffer;
pub mod silence;
