mod image;
pub use image::*;
mod layout;
pub use layout::*;
mod locate;
pub use locate::*;
mod ocr;
pub use ocr::*;
