pub mod conversion;
pub mod icc;
pub mod metadata;
pub mod scratch;
pub mod streamer;
pub mod upload;
