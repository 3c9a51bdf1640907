//! Integer downsample factor for size-aware decoding.

/// Computes the divisor applied to both native dimensions when decoding an
/// image for a `requested_width` x `requested_height` box.
///
/// The factor is 1 unless the image exceeds the box on either axis. Otherwise
/// the dominant orientation picks the axis: landscape images are sized by
/// their height ratio, portrait and square images by their width ratio. The
/// ratio is rounded to the nearest integer and never drops below 1, so images
/// are never upsampled.
#[must_use]
pub fn sample_size(
    native_width: u32,
    native_height: u32,
    requested_width: u32,
    requested_height: u32,
) -> u32 {
    if native_height <= requested_height && native_width <= requested_width {
        return 1;
    }

    let (native, requested) = if native_width > native_height {
        (native_height, requested_height)
    } else {
        (native_width, requested_width)
    };

    if requested == 0 {
        return 1;
    }

    rounded_ratio(native, requested).max(1)
}

/// Dimensions produced by decoding `native` with `factor`.
#[must_use]
pub fn sampled_dimensions(native_width: u32, native_height: u32, factor: u32) -> (u32, u32) {
    let factor = factor.max(1);
    (
        (native_width / factor).max(1),
        (native_height / factor).max(1),
    )
}

/// `round(numerator / denominator)` with halves rounded up.
fn rounded_ratio(numerator: u32, denominator: u32) -> u32 {
    let n = u64::from(numerator);
    let d = u64::from(denominator);
    u32::try_from((2 * n + d) / (2 * d)).unwrap_or(u32::MAX)
}
