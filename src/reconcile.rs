//! series reconciler: aligns two independently sampled device series onto one
//! time axis for charting.
//!
//! the denser series becomes the axis; every axis timestamp is paired with the
//! other series' nearest point by absolute time difference. no interpolation.
//! ties go to the first point encountered, which for ascending input means the
//! earlier one.

use crate::domain::{AlignedPoint, SeriesPoint};
use crate::error::NoDataError;

/// merge two series onto the axis of the longer one (primary wins a tie)
///
/// the output has exactly one row per axis point. if the shorter series is
/// empty its side of every row is `None`; if both are empty there is nothing
/// to draw and `NoDataError` comes back.
pub fn merge_series<T: Clone>(
    primary: &[SeriesPoint<T>],
    secondary: &[SeriesPoint<T>],
) -> Result<Vec<AlignedPoint<T>>, NoDataError> {
    if primary.is_empty() && secondary.is_empty() {
        return Err(NoDataError);
    }

    let primary_is_base = primary.len() >= secondary.len();
    let (base, other) = if primary_is_base {
        (primary, secondary)
    } else {
        (secondary, primary)
    };

    let aligned = base
        .iter()
        .map(|point| {
            let matched = nearest(other, point.timestamp).map(|p| p.value.clone());
            let own = Some(point.value.clone());
            let (primary, secondary) = if primary_is_base { (own, matched) } else { (matched, own) };
            AlignedPoint { timestamp: point.timestamp, primary, secondary }
        })
        .collect();

    Ok(aligned)
}

/// full scan for the point closest to `timestamp`; first minimum wins
fn nearest<T>(series: &[SeriesPoint<T>], timestamp: i64) -> Option<&SeriesPoint<T>> {
    let mut best: Option<(&SeriesPoint<T>, u64)> = None;
    for point in series {
        let distance = point.timestamp.abs_diff(timestamp);
        match best {
            Some((_, best_distance)) if distance >= best_distance => {}
            _ => best = Some((point, distance)),
        }
    }
    best.map(|(point, _)| point)
}
