pub mod upload;

pub use upload::UploadApi;
