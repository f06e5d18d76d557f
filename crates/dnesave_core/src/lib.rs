pub mod container;
pub mod core_api;
pub mod decoder;
pub mod decompress;
pub mod facts;
pub mod patch;
pub mod property;
pub mod reader;
