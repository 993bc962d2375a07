// ============================================================
// Layer 4 — Train/Validation/Test Splitter
// ============================================================
// Shuffles samples with a seeded RNG and cuts them into
// consecutive parts, one per fraction:
//
//   splits: [0.8, 0.1, 0.1]  →  train | val | test
//
// Image folders are sorted by class on disk, so without the
// shuffle the test split would hold only the last classes.
//
// The RNG is StdRng::seed_from_u64(seed), so the same seed and
// the same input order always give the same split.

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

/// Shuffle `samples` with `seed`, then split them by `fractions`.
///
/// Boundaries are taken from the rounded cumulative fractions, so
/// rounding error never loses or duplicates a sample. When the
/// fractions sum to 1 the last part takes whatever is left; when they
/// sum to less, the remainder is dropped.
///
/// # Example
/// ```ignore
/// let parts = split_by_fractions((0..100).collect(), &[0.8, 0.1, 0.1], 42);
/// // parts[0].len() == 80, parts[1].len() == 10, parts[2].len() == 10
/// ```
pub fn split_by_fractions<T>(mut samples: Vec<T>, fractions: &[f64], seed: u64) -> Vec<Vec<T>> {
    let mut rng = StdRng::seed_from_u64(seed);
    samples.shuffle(&mut rng);

    let total = samples.len();
    let sum: f64 = fractions.iter().sum();

    let mut bounds = Vec::with_capacity(fractions.len());
    let mut cumulative = 0.0;
    for (i, fraction) in fractions.iter().enumerate() {
        cumulative += fraction;
        let is_last = i + 1 == fractions.len();
        let end = if is_last && (sum - 1.0).abs() < 1e-6 {
            total
        } else {
            ((total as f64) * cumulative).round() as usize
        };
        bounds.push(end.min(total));
    }

    // Cut from the back so split_off keeps the earlier parts in place.
    let mut parts = Vec::with_capacity(bounds.len());
    samples.truncate(bounds.last().copied().unwrap_or(0));
    for &start in bounds.iter().rev().skip(1) {
        let start = start.min(samples.len());
        parts.push(samples.split_off(start));
    }
    parts.push(samples);
    parts.reverse();

    tracing::debug!(
        "Dataset split: {:?} of {} samples (seed {})",
        parts.iter().map(Vec::len).collect::<Vec<_>>(),
        total,
        seed,
    );

    parts
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_correct_split_sizes() {
        let items: Vec<usize> = (0..100).collect();
        let parts = split_by_fractions(items, &[0.8, 0.1, 0.1], 42);
        let sizes: Vec<usize> = parts.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![80, 10, 10]);
    }

    #[test]
    fn test_all_items_preserved() {
        // No items should be lost or duplicated by rounding
        let items: Vec<usize> = (0..53).collect();
        let parts = split_by_fractions(items, &[0.7, 0.2, 0.1], 7);
        let mut all: Vec<usize> = parts.into_iter().flatten().collect();
        all.sort_unstable();
        assert_eq!(all, (0..53).collect::<Vec<_>>());
    }

    #[test]
    fn test_same_seed_same_split() {
        let a = split_by_fractions((0..40).collect::<Vec<u32>>(), &[0.5, 0.5], 3);
        let b = split_by_fractions((0..40).collect::<Vec<u32>>(), &[0.5, 0.5], 3);
        assert_eq!(a, b);
        let c = split_by_fractions((0..40).collect::<Vec<u32>>(), &[0.5, 0.5], 4);
        assert_ne!(a, c);
    }

    #[test]
    fn test_fractions_below_one_drop_remainder() {
        let parts = split_by_fractions((0..10).collect::<Vec<u32>>(), &[0.5, 0.2], 1);
        assert_eq!(parts[0].len(), 5);
        assert_eq!(parts[1].len(), 2);
    }

    #[test]
    fn test_empty_dataset() {
        let parts = split_by_fractions(Vec::<usize>::new(), &[0.8, 0.1, 0.1], 42);
        assert_eq!(parts.len(), 3);
        assert!(parts.iter().all(Vec::is_empty));
    }
}
