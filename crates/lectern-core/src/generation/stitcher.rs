//! Joining per-chunk block lists into one section.

use crate::types::ContentBlock;

/// Length of the longest suffix of `earlier` that equals a prefix of `later`,
/// comparing blocks by kind and whitespace-normalized text.
pub fn overlap_len(earlier: &[ContentBlock], later: &[ContentBlock]) -> usize {
    let max = earlier.len().min(later.len());
    (1..=max)
        .rev()
        .find(|&k| {
            earlier[earlier.len() - k..]
                .iter()
                .zip(&later[..k])
                .all(|(a, b)| a.match_key() == b.match_key())
        })
        .unwrap_or(0)
}

/// Stitch ordered chunk outputs of one section.
///
/// Duplicated boundary blocks are emitted once. When the boundary does not
/// match exactly, the later chunk is kept verbatim. The result depends only on
/// the inputs and their order.
pub fn stitch(chunks: Vec<Vec<ContentBlock>>) -> Vec<ContentBlock> {
    let mut out: Vec<ContentBlock> = Vec::new();
    // The last `previous_len` blocks of `out` always equal the previous chunk.
    let mut previous_len = 0usize;

    for chunk in chunks {
        let skip = overlap_len(&out[out.len() - previous_len..], &chunk);
        previous_len = chunk.len();
        out.extend(chunk.into_iter().skip(skip));
    }
    out
}
