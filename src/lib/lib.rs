pub mod checksum;
pub mod engine;
pub mod fields;
pub mod fixture;
pub mod frame;
pub mod payload;
pub mod port;
pub mod sink;
