//! Domain generators for property-based testing

use proptest::prelude::*;

// ============================================================================
// Geometry Generators
// ============================================================================

/// Link length in km (0 to 20,000 km)
pub fn distance_km() -> impl Strategy<Value = f64> {
    0.0f64..=20_000.0
}

/// Cartesian position in km within a LEO/MEO shell bounding box
pub fn position_km() -> impl Strategy<Value = [f64; 3]> {
    [-8_000.0f64..=8_000.0, -8_000.0f64..=8_000.0, -8_000.0f64..=8_000.0]
}

// ============================================================================
// Topology Generators
// ============================================================================

/// Loop-free path of `min_len..=max_len` distinct vertices drawn from `0..vertex_count`.
pub fn simple_path(
    vertex_count: usize,
    min_len: usize,
    max_len: usize,
) -> impl Strategy<Value = Vec<usize>> {
    let max_len = max_len.min(vertex_count);
    (min_len..=max_len).prop_flat_map(move |len| {
        Just((0..vertex_count).collect::<Vec<usize>>())
            .prop_shuffle()
            .prop_map(move |ids| ids.into_iter().take(len).collect())
    })
}

/// Unordered endpoint pairs without self-loops (duplicates allowed)
pub fn vertex_pairs(vertex_count: usize, max_pairs: usize) -> impl Strategy<Value = Vec<(usize, usize)>> {
    prop::collection::vec((0..vertex_count, 0..vertex_count), 0..max_pairs)
        .prop_map(|pairs| pairs.into_iter().filter(|(a, b)| a != b).collect())
}
