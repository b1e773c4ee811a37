pub mod audio;
pub mod color_name;
pub mod config;
pub mod encoding;
pub mod error_codes;
pub mod label;
pub mod naming;
pub mod painter;
pub mod render;
pub mod timeline;
