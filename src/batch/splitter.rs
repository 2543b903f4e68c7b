use std::ops::Range;

/// Maximum number of object ids sent in one request.
pub const BATCH_LIMIT: usize = 1500;

/// Split `0..len` into contiguous ranges of at most `size` elements, in order.
///
/// `len == 0` yields nothing. A `size` of zero is treated as one.
pub fn chunk_ranges(len: usize, size: usize) -> impl Iterator<Item = Range<usize>> {
    let size = size.max(1);
    (0..len)
        .step_by(size)
        .map(move |start| start..(start + size).min(len))
}
