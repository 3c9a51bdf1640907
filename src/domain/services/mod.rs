//! Domain services.

mod downsample;

pub use downsample::{sample_size, sampled_dimensions};
