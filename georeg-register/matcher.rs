use georeg_core::{Descriptor, Match};
use rayon::prelude::*;

/// Hamming distance between two binary descriptors
pub fn hamming(a: &Descriptor, b: &Descriptor) -> u32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x ^ y).count_ones()).sum()
}

/// Index and distance of the nearest descriptor in `set` (non-empty),
/// lowest index on ties so matching stays deterministic.
fn nearest(d: &Descriptor, set: &[Descriptor]) -> (usize, u32) {
    let mut best = (0, hamming(d, &set[0]));
    for (i, cand) in set.iter().enumerate().skip(1) {
        let dist = hamming(d, cand);
        if dist < best.1 {
            best = (i, dist);
        }
    }
    best
}

/// Brute-force Hamming matching with a mutual-nearest-neighbor cross
/// check: (i, j) is kept only when j is i's best match A→B and i is j's
/// best match B→A. Output is sorted best-first (ascending distance).
///
/// Either side empty yields an empty result; the caller decides whether
/// that is "insufficient data".
pub fn match_descriptors(a: &[Descriptor], b: &[Descriptor]) -> Vec<Match> {
    if a.is_empty() || b.is_empty() {
        return Vec::new();
    }

    let forward: Vec<(usize, u32)> = a.par_iter().map(|d| nearest(d, b)).collect();
    let backward: Vec<(usize, u32)> = b.par_iter().map(|d| nearest(d, a)).collect();

    let mut matches: Vec<Match> = forward
        .iter()
        .enumerate()
        .filter_map(|(query, &(train, distance))| {
            (backward[train].0 == query).then_some(Match { query, train, distance })
        })
        .collect();

    matches.sort_by_key(|m| (m.distance, m.query));
    log::debug!("cross-check kept {} of {} candidate matches", matches.len(), a.len());
    matches
}
