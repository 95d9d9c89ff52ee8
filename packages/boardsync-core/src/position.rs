/// Fractional positions for ordered lists and cards.
///
/// Freshly normalized slots sit `POSITION_GAP` apart so that inserting between
/// two neighbours only needs a midpoint, never a renumbering of the siblings.
/// Positions are plain `f64`; only their relative order matters.

/// Distance between adjacent slots of a normalized list.
pub const POSITION_GAP: f64 = 1024.0;

/// Below this neighbour gap a list is renormalized instead of bisected again.
pub const MIN_POSITION_GAP: f64 = 1e-6;

/// Offset used when the midpoint of two neighbours collides with one of them.
const COLLISION_OFFSET: f64 = 0.5;

/// Position for the zero-based slot `index` of a normalized list.
///
/// Slot 0 is `1024`, slot 1 is `2048`, and so on.
pub fn position_from_index(index: usize) -> f64 {
    (index as f64 + 1.0) * POSITION_GAP
}

/// Position for inserting at a one-based `target` slot among `existing`
/// positions, which must be sorted ascending.
///
/// - before the first item: half the first position, or `first - 1` when the
///   first position is at most 1
/// - between two items: the midpoint, or `previous + 0.5` if the midpoint
///   collides with a neighbour
/// - at or past the end: `last + 1024`
pub fn insert_position(existing: &[f64], target: usize) -> f64 {
    let Some((&first, _)) = existing.split_first() else {
        return position_from_index(0);
    };

    if target <= 1 {
        return if first <= 1.0 { first - 1.0 } else { first / 2.0 };
    }

    if target > existing.len() {
        // target is past the end, so `existing` is non-empty here
        let last = existing[existing.len() - 1];
        return last + POSITION_GAP;
    }

    let previous = existing[target - 2];
    let next = existing[target - 1];
    let midpoint = previous + (next - previous) / 2.0;
    if midpoint <= previous || midpoint >= next {
        previous + COLLISION_OFFSET
    } else {
        midpoint
    }
}

/// True when `positions` are strictly increasing with every gap at least
/// `MIN_POSITION_GAP`.
pub fn is_well_spaced(positions: &[f64]) -> bool {
    positions
        .windows(2)
        .all(|pair| pair[1] - pair[0] >= MIN_POSITION_GAP)
}
