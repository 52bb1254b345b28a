pub mod source;
pub mod sync;

#[cfg(feature = "video-io")]
pub mod opencv;
