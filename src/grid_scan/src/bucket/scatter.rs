//! Scatter pass of the counting sort.

use rayon::prelude::*;

use super::BIN_SCATTER_KERNEL;
use crate::error::{Result, ScanError};
use crate::runtime::AtomicCounters;
use crate::Point;

const UNFILLED: u32 = u32::MAX;

/// Destination slot of one point: its bin offset plus a rank drawn from the
/// bin's cursor.
#[inline]
pub fn destination(offsets: &[u32], cursor: &AtomicCounters, bin: u32) -> Result<u32> {
    let offset = offsets
        .get(bin as usize)
        .copied()
        .ok_or_else(|| ScanError::DispatchFailure {
            kernel: BIN_SCATTER_KERNEL,
            reason: format!("bin {bin} has no offset ({} bins)", offsets.len()),
        })?;
    let rank = cursor.fetch_add(bin as usize, 1);
    Ok(offset.wrapping_add(rank))
}

/// Move every point to its destination and record where it came from.
///
/// Fails if the buffers disagree in length, two points share a slot or a
/// slot lies past the output.
pub fn place_points(
    points: &[Point],
    destinations: &[u32],
    sorted: &mut [Point],
    source_index: &mut [u32],
) -> Result<()> {
    let n = sorted.len();
    for (argument, len) in [
        ("points", points.len()),
        ("destinations", destinations.len()),
        ("source_index", source_index.len()),
    ] {
        if len != n {
            return Err(ScanError::ArgumentBinding {
                kernel: BIN_SCATTER_KERNEL,
                argument,
                reason: format!("{len} entries for {n} sorted slots"),
            });
        }
    }
    source_index.fill(UNFILLED);

    for (source, &dest) in destinations.iter().enumerate() {
        let slot = source_index
            .get_mut(dest as usize)
            .ok_or_else(|| ScanError::DispatchFailure {
                kernel: BIN_SCATTER_KERNEL,
                reason: format!("point {source} scattered to slot {dest} of {n}"),
            })?;
        if *slot != UNFILLED {
            return Err(ScanError::DispatchFailure {
                kernel: BIN_SCATTER_KERNEL,
                reason: format!("points {} and {source} both scattered to slot {dest}", *slot),
            });
        }
        *slot = source as u32;
    }

    // n distinct destinations below n fill every slot
    sorted
        .par_iter_mut()
        .zip(source_index.par_iter())
        .for_each(|(dst, &src)| *dst = points[src as usize]);

    Ok(())
}

/// Check that `source_index` read back from a device is a permutation.
pub fn check_permutation(source_index: &[u32]) -> Result<()> {
    let n = source_index.len();
    let mut seen = vec![false; n];
    for (slot, &source) in source_index.iter().enumerate() {
        match seen.get_mut(source as usize) {
            Some(flag) if !*flag => *flag = true,
            _ => {
                return Err(ScanError::DispatchFailure {
                    kernel: BIN_SCATTER_KERNEL,
                    reason: format!("slot {slot} holds point {source}, duplicated or out of range"),
                })
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_destination_ranks_within_bin() {
        let offsets = [0, 2, 2, 5];
        let cursor = AtomicCounters::zeroed(4).unwrap();

        assert_eq!(destination(&offsets, &cursor, 1).unwrap(), 2);
        assert_eq!(destination(&offsets, &cursor, 1).unwrap(), 3);
        assert_eq!(destination(&offsets, &cursor, 0).unwrap(), 0);
        assert_eq!(destination(&offsets, &cursor, 3).unwrap(), 5);
        assert!(destination(&offsets, &cursor, 4).is_err());
    }

    #[test]
    fn test_place_points() {
        let points = [[0.1, 0.0, 0.0], [0.2, 0.0, 0.0], [0.3, 0.0, 0.0]];
        let mut sorted = [[0.0; 3]; 3];
        let mut source = [0u32; 3];

        place_points(&points, &[2, 0, 1], &mut sorted, &mut source).unwrap();
        assert_eq!(source, [1, 2, 0]);
        assert_eq!(sorted, [points[1], points[2], points[0]]);
    }

    #[test]
    fn test_place_points_collision() {
        let points = [[0.1, 0.0, 0.0], [0.2, 0.0, 0.0]];
        let mut sorted = [[0.0; 3]; 2];
        let mut source = [0u32; 2];
        let err = place_points(&points, &[1, 1], &mut sorted, &mut source).unwrap_err();
        assert!(matches!(err, ScanError::DispatchFailure { .. }));
    }

    #[test]
    fn test_place_points_out_of_range() {
        let points = [[0.1, 0.0, 0.0]];
        let mut sorted = [[0.0; 3]; 1];
        let mut source = [0u32; 1];
        assert!(place_points(&points, &[3], &mut sorted, &mut source).is_err());
    }

    #[test]
    fn test_place_points_short_destinations() {
        let points = [[0.1, 0.0, 0.0], [0.2, 0.0, 0.0], [0.3, 0.0, 0.0]];
        let mut sorted = [[0.0; 3]; 3];
        let mut source = [0u32; 3];

        let err = place_points(&points, &[1, 0], &mut sorted, &mut source).unwrap_err();
        assert!(matches!(
            err,
            ScanError::ArgumentBinding {
                argument: "destinations",
                ..
            }
        ));
    }

    #[test]
    fn test_place_points_short_source_index() {
        let points = [[0.1, 0.0, 0.0], [0.2, 0.0, 0.0]];
        let mut sorted = [[0.0; 3]; 2];
        let mut source = [0u32; 1];

        let err = place_points(&points, &[1, 0], &mut sorted, &mut source).unwrap_err();
        assert!(matches!(
            err,
            ScanError::ArgumentBinding {
                argument: "source_index",
                ..
            }
        ));
    }

    #[test]
    fn test_check_permutation() {
        assert!(check_permutation(&[2, 0, 1]).is_ok());
        assert!(check_permutation(&[]).is_ok());
        assert!(check_permutation(&[0, 0, 1]).is_err());
        assert!(check_permutation(&[0, 3, 1]).is_err());
    }
}
