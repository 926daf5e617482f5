pub mod common;
pub mod token;
pub mod upload;
