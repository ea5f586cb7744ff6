// THEORY:
// The text panel allocator decides which tiles stop showing video and host
// editorial text instead: title/author pairs in most modes, single captions in
// pixelation mode. Placement is random (each visit should feel different) but
// bounded by hard exclusion zones and a spacing rule.
//
// Key architectural principles:
// 1.  **Rejection Sampling With a Budget**: candidates are drawn uniformly and
//     rejected against the constraints. After `2 × total` attempts the allocator
//     stops and returns whatever it placed. Placing fewer than requested is a
//     normal outcome, logged but never an error.
// 2.  **Exclusion Zones**: pair titles avoid the top two rows, the last row, the
//     reserved bottom-left tile and the rightmost column (so the author at
//     `title + 1` stays on the same row).
// 3.  **Literal Index Distance**: pairs are kept apart by raw tile-index distance
//     (`max(3, ceil(cols / 3))`), applied to titles and authors independently.

use rand::Rng;
use std::collections::HashSet;

/// How many caption tiles pixelation mode asks for.
pub const PIXELATION_CAPTION_COUNT: usize = 9;
/// The row pixelation captions stay out of.
pub const CAPTION_AVOID_ROW: u32 = 1;

/// A title tile and its author partner, bound to an article.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextPair {
    pub title: usize,
    pub author: usize,
    /// Index of the pair, also the article index in the mode's catalog.
    pub pair_index: usize,
}

/// Minimum raw index distance between accepted pairs.
pub fn min_pair_distance(cols: u32) -> usize {
    3.max(cols.div_ceil(3) as usize)
}

fn bottom_left(total: usize, cols: u32) -> usize {
    let rows = total.div_ceil(cols.max(1) as usize);
    rows.saturating_sub(1) * cols as usize
}

/// Places up to `pair_count` title/author pairs on a grid of `total` tiles.
pub fn select_text_pairs<R: Rng + ?Sized>(total: usize, cols: u32, pair_count: usize, rng: &mut R) -> Vec<TextPair> {
    let mut pairs: Vec<TextPair> = Vec::with_capacity(pair_count);
    if total == 0 || cols == 0 || pair_count == 0 {
        return pairs;
    }

    let cols_usize = cols as usize;
    let last_row = (total - 1) / cols_usize;
    let bottom_left = bottom_left(total, cols);
    let min_distance = min_pair_distance(cols);
    let max_attempts = total * 2;
    let mut used: HashSet<usize> = HashSet::new();
    let mut attempts = 0;

    while pairs.len() < pair_count && attempts < max_attempts {
        attempts += 1;
        let title = rng.gen_range(0..total);
        let row = title / cols_usize;
        let col = title % cols_usize;

        if row <= 1 || row == last_row || title == bottom_left {
            continue;
        }
        if col == cols_usize - 1 || used.contains(&title) {
            continue;
        }

        let author = title + 1;
        if author >= total || used.contains(&author) || author == bottom_left {
            continue;
        }

        let too_close = pairs.iter().any(|existing| {
            title.abs_diff(existing.title) < min_distance || author.abs_diff(existing.author) < min_distance
        });
        if too_close {
            continue;
        }

        used.insert(title);
        used.insert(author);
        pairs.push(TextPair { title, author, pair_index: pairs.len() });
    }

    if pairs.len() < pair_count {
        tracing::warn!(
            placed = pairs.len(),
            requested = pair_count,
            attempts,
            "text pair placement exhausted its attempt budget"
        );
    }
    pairs
}

/// Places up to `count` single caption tiles, skipping `avoid_row` and the
/// bottom-left tile.
pub fn select_single_panels_avoiding_row<R: Rng + ?Sized>(
    total: usize,
    cols: u32,
    count: usize,
    avoid_row: u32,
    rng: &mut R,
) -> Vec<usize> {
    let mut positions = Vec::with_capacity(count);
    if total == 0 || cols == 0 {
        return positions;
    }

    let bottom_left = bottom_left(total, cols);
    let mut used = HashSet::new();
    let max_attempts = total * 2;
    let mut attempts = 0;

    while positions.len() < count && attempts < max_attempts {
        attempts += 1;
        let candidate = rng.gen_range(0..total);
        let row = (candidate / cols as usize) as u32;
        if row == avoid_row || candidate == bottom_left || !used.insert(candidate) {
            continue;
        }
        positions.push(candidate);
    }

    if positions.len() < count {
        tracing::warn!(placed = positions.len(), requested = count, "caption placement exhausted its attempt budget");
    }
    positions
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn minimum_distance_grows_with_width() {
        assert_eq!(min_pair_distance(4), 3);
        assert_eq!(min_pair_distance(9), 3);
        assert_eq!(min_pair_distance(13), 5);
        assert_eq!(min_pair_distance(24), 8);
    }

    #[test]
    fn pairs_are_adjacent_and_numbered() {
        let mut rng = StdRng::seed_from_u64(7);
        let pairs = select_text_pairs(13 * 8, 13, 5, &mut rng);
        assert!(!pairs.is_empty());
        for (i, pair) in pairs.iter().enumerate() {
            assert_eq!(pair.author, pair.title + 1);
            assert_eq!(pair.pair_index, i);
        }
    }

    #[test]
    fn tiny_grid_places_nothing_without_error() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(select_text_pairs(3 * 3, 3, 4, &mut rng).is_empty());
        assert!(select_text_pairs(0, 3, 4, &mut rng).is_empty());
    }

    #[test]
    fn full_hd_pixelation_gets_nine_captions() {
        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let positions = select_single_panels_avoiding_row(13 * 7, 13, PIXELATION_CAPTION_COUNT, 1, &mut rng);
            assert_eq!(positions.len(), 9);
            assert!(positions.iter().all(|p| p / 13 != 1 && *p != 6 * 13));
        }
    }

    proptest! {
        #[test]
        fn pairs_respect_exclusions_and_spacing(
            cols in 2u32..30,
            rows in 1u32..20,
            requested in 0usize..8,
            seed in any::<u64>(),
        ) {
            let total = (cols * rows) as usize;
            let mut rng = StdRng::seed_from_u64(seed);
            let pairs = select_text_pairs(total, cols, requested, &mut rng);
            let min = min_pair_distance(cols);
            let bottom_left = ((rows - 1) * cols) as usize;

            prop_assert!(pairs.len() <= requested);
            let mut seen = HashSet::new();
            for (i, pair) in pairs.iter().enumerate() {
                prop_assert!(pair.title / cols as usize >= 2);
                prop_assert!(pair.title != bottom_left);
                prop_assert!(pair.title % (cols as usize) != cols as usize - 1);
                prop_assert_eq!(pair.author / cols as usize, pair.title / cols as usize);
                prop_assert!(seen.insert(pair.title) && seen.insert(pair.author));
                for other in &pairs[..i] {
                    prop_assert!(pair.title.abs_diff(other.title) >= min);
                    prop_assert!(pair.author.abs_diff(other.author) >= min);
                }
            }
        }

        #[test]
        fn captions_avoid_row_and_reserved_tile(
            cols in 1u32..30,
            rows in 1u32..20,
            seed in any::<u64>(),
        ) {
            let total = (cols * rows) as usize;
            let mut rng = StdRng::seed_from_u64(seed);
            let positions = select_single_panels_avoiding_row(total, cols, PIXELATION_CAPTION_COUNT, 1, &mut rng);
            let unique: HashSet<_> = positions.iter().collect();
            prop_assert_eq!(unique.len(), positions.len());
            for p in positions {
                prop_assert!(p < total);
                prop_assert!(p / cols as usize != 1);
                prop_assert!(p != ((rows - 1) * cols) as usize);
            }
        }
    }
}
