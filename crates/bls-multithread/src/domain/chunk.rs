//! # Chunking
//!
//! Splits work into as few, as evenly sized chunks as possible.

/// Split `items` into at most `floor(n / min_per_chunk)` chunks, preferring
/// fewer chunks of bigger size. Fewer than two chunks' worth of items yields a
/// single chunk.
///
/// Every chunk except the last holds `ceil(n / chunk_count)` items; the last
/// takes the remainder. Order is kept.
///
/// # Examples
/// - 7 items, min 3 → `[[0, 1, 2, 3], [4, 5, 6]]`
/// - 5 items, min 16 → one chunk of 5
/// - 0 items → no chunks
pub fn chunkify_maximize_chunk_size<T>(items: Vec<T>, min_per_chunk: usize) -> Vec<Vec<T>> {
    if items.is_empty() {
        return Vec::new();
    }

    let min_per_chunk = min_per_chunk.max(1);
    let chunk_count = items.len() / min_per_chunk;
    if chunk_count <= 1 {
        return vec![items];
    }

    let per_chunk = items.len().div_ceil(chunk_count);
    let mut chunks = Vec::with_capacity(chunk_count);
    let mut iter = items.into_iter().peekable();
    while iter.peek().is_some() {
        chunks.push(iter.by_ref().take(per_chunk).collect());
    }
    chunks
}
