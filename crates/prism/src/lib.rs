#![doc = env!("CARGO_PKG_DESCRIPTION")]

#[doc(inline)]
pub use prism_image as image;

#[doc(inline)]
pub use prism_imgproc as imgproc;

#[doc(inline)]
pub use prism_engine as engine;

#[doc(inline)]
pub use prism_cache as cache;
