pub mod classifier;
pub mod image;
