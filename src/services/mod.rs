pub mod classifier;
pub mod exif_service;
pub mod fetch_service;
pub mod image_service;
pub mod session;
