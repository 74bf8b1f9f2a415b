pub mod image;
pub mod post;

pub use image::*;
pub use post::*;
