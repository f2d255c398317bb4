//! Integer-factor resampling between frame grids.
//!
//! Upsampling repeats each source value (zero-order hold). Downsampling
//! aggregates contiguous blocks and requires the caller to pick how: `mean`
//! for probabilities and scores, `max` for logits and saliency. Hops must be
//! related by an exact integer ratio; anything else is an error rather than
//! a silent interpolation.

use ndarray::{Array1, Array2, Axis};

use super::timebase::{CANONICAL_HOP_S, HOP_TOLERANCE};
use super::CoreError;

/// Aggregation used when downsampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Agg {
    Mean,
    Max,
}

/// Validate that `src_hop_s / target_hop_s` is a positive integer within
/// tolerance and return it.
pub fn validate_factor(src_hop_s: f64, target_hop_s: f64) -> Result<usize, CoreError> {
    if src_hop_s <= 0.0 {
        return Err(CoreError::NonPositiveHop(src_hop_s));
    }
    if target_hop_s <= 0.0 {
        return Err(CoreError::NonPositiveHop(target_hop_s));
    }
    let ratio = src_hop_s / target_hop_s;
    let rounded = ratio.round();
    if (ratio - rounded).abs() > HOP_TOLERANCE || rounded < 1.0 {
        return Err(CoreError::NonIntegerRatio {
            src_hop_s,
            target_hop_s,
            ratio,
        });
    }
    Ok(rounded as usize)
}

/// Zero-order-hold upsample of a 1-D array from a coarser to a finer hop.
pub fn upsample_hold_1d(
    values: &Array1<f64>,
    src_hop_s: f64,
    target_hop_s: f64,
) -> Result<Array1<f64>, CoreError> {
    let factor = validate_factor(src_hop_s, target_hop_s)?;
    if factor == 1 {
        return Ok(values.clone());
    }
    let mut out = Array1::zeros(values.len() * factor);
    for (i, &v) in values.iter().enumerate() {
        for k in 0..factor {
            out[i * factor + k] = v;
        }
    }
    Ok(out)
}

/// Zero-order-hold upsample of a 2-D array along the time axis (rows).
pub fn upsample_hold_2d(
    values: &Array2<f64>,
    src_hop_s: f64,
    target_hop_s: f64,
) -> Result<Array2<f64>, CoreError> {
    let factor = validate_factor(src_hop_s, target_hop_s)?;
    if factor == 1 {
        return Ok(values.clone());
    }
    let (t, k) = values.dim();
    let mut out = Array2::zeros((t * factor, k));
    for i in 0..t {
        for rep in 0..factor {
            out.row_mut(i * factor + rep).assign(&values.row(i));
        }
    }
    Ok(out)
}

fn aggregate(block: ndarray::ArrayView1<f64>, agg: Agg) -> f64 {
    match agg {
        Agg::Mean => block.sum() / block.len() as f64,
        Agg::Max => block.iter().copied().fold(f64::NEG_INFINITY, f64::max),
    }
}

/// Downsample a 1-D array by aggregating contiguous blocks.
///
/// The source length must be exactly divisible by the factor.
pub fn downsample_1d(
    values: &Array1<f64>,
    src_hop_s: f64,
    target_hop_s: f64,
    agg: Agg,
) -> Result<Array1<f64>, CoreError> {
    let factor = validate_factor(target_hop_s, src_hop_s)?;
    if factor == 1 {
        return Ok(values.clone());
    }
    if values.len() % factor != 0 {
        return Err(CoreError::NotDivisible {
            len: values.len(),
            factor,
        });
    }
    let new_len = values.len() / factor;
    let mut out = Array1::zeros(new_len);
    for i in 0..new_len {
        out[i] = aggregate(values.slice(ndarray::s![i * factor..(i + 1) * factor]), agg);
    }
    Ok(out)
}

/// Downsample a 2-D array along the time axis by aggregating row blocks.
pub fn downsample_2d(
    values: &Array2<f64>,
    src_hop_s: f64,
    target_hop_s: f64,
    agg: Agg,
) -> Result<Array2<f64>, CoreError> {
    let factor = validate_factor(target_hop_s, src_hop_s)?;
    if factor == 1 {
        return Ok(values.clone());
    }
    let (t, k) = values.dim();
    if t % factor != 0 {
        return Err(CoreError::NotDivisible { len: t, factor });
    }
    let new_len = t / factor;
    let mut out = Array2::zeros((new_len, k));
    for i in 0..new_len {
        let block = values.slice(ndarray::s![i * factor..(i + 1) * factor, ..]);
        for j in 0..k {
            out[[i, j]] = aggregate(block.index_axis(Axis(1), j), agg);
        }
    }
    Ok(out)
}

/// Resample a 1-D array between arbitrary integer-related hops.
///
/// `agg` is required only when the target hop is coarser than the source.
pub fn resample_1d(
    values: &Array1<f64>,
    src_hop_s: f64,
    target_hop_s: f64,
    agg: Option<Agg>,
) -> Result<Array1<f64>, CoreError> {
    if (src_hop_s - target_hop_s).abs() <= HOP_TOLERANCE {
        return Ok(values.clone());
    }
    if src_hop_s > target_hop_s {
        return upsample_hold_1d(values, src_hop_s, target_hop_s);
    }
    let agg = agg.ok_or(CoreError::MissingAggregation)?;
    downsample_1d(values, src_hop_s, target_hop_s, agg)
}

/// Resample a 2-D array between arbitrary integer-related hops.
pub fn resample_2d(
    values: &Array2<f64>,
    src_hop_s: f64,
    target_hop_s: f64,
    agg: Option<Agg>,
) -> Result<Array2<f64>, CoreError> {
    if (src_hop_s - target_hop_s).abs() <= HOP_TOLERANCE {
        return Ok(values.clone());
    }
    if src_hop_s > target_hop_s {
        return upsample_hold_2d(values, src_hop_s, target_hop_s);
    }
    let agg = agg.ok_or(CoreError::MissingAggregation)?;
    downsample_2d(values, src_hop_s, target_hop_s, agg)
}

/// Resample a 1-D array onto the canonical 10 ms grid.
pub fn to_canonical_grid_1d(
    values: &Array1<f64>,
    src_hop_s: f64,
    downsample_agg: Option<Agg>,
) -> Result<Array1<f64>, CoreError> {
    resample_1d(values, src_hop_s, CANONICAL_HOP_S, downsample_agg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, arr2};
    use proptest::prelude::*;

    #[test]
    fn test_validate_factor_exact() {
        assert_eq!(validate_factor(0.02, 0.01).unwrap(), 2);
        assert_eq!(validate_factor(0.01, 0.01).unwrap(), 1);
        assert_eq!(validate_factor(0.03, 0.01).unwrap(), 3);
    }

    #[test]
    fn test_validate_factor_rejects_non_integer() {
        assert!(validate_factor(0.015, 0.01).is_err());
        assert!(validate_factor(0.01, 0.02).is_err()); // ratio < 1
        assert!(validate_factor(-0.01, 0.01).is_err());
    }

    #[test]
    fn test_upsample_repeats_values() {
        let x = arr1(&[1.0, 2.0, 3.0]);
        let up = upsample_hold_1d(&x, 0.02, 0.01).unwrap();
        assert_eq!(up, arr1(&[1.0, 1.0, 2.0, 2.0, 3.0, 3.0]));
    }

    #[test]
    fn test_upsample_2d_repeats_rows() {
        let x = arr2(&[[1.0, 10.0], [2.0, 20.0]]);
        let up = upsample_hold_2d(&x, 0.02, 0.01).unwrap();
        assert_eq!(up, arr2(&[[1.0, 10.0], [1.0, 10.0], [2.0, 20.0], [2.0, 20.0]]));
    }

    #[test]
    fn test_downsample_mean_and_max() {
        let x = arr1(&[1.0, 3.0, 2.0, 6.0]);
        let mean = downsample_1d(&x, 0.01, 0.02, Agg::Mean).unwrap();
        let max = downsample_1d(&x, 0.01, 0.02, Agg::Max).unwrap();
        assert_eq!(mean, arr1(&[2.0, 4.0]));
        assert_eq!(max, arr1(&[3.0, 6.0]));
    }

    #[test]
    fn test_downsample_requires_divisibility() {
        let x = arr1(&[1.0, 2.0, 3.0]);
        let err = downsample_1d(&x, 0.01, 0.02, Agg::Mean);
        assert!(matches!(err, Err(CoreError::NotDivisible { .. })));
    }

    #[test]
    fn test_resample_requires_agg_for_downsampling() {
        let x = arr1(&[1.0, 2.0]);
        assert!(matches!(
            resample_1d(&x, 0.01, 0.02, None),
            Err(CoreError::MissingAggregation)
        ));
    }

    #[test]
    fn test_downsample_2d_columns_independent() {
        let x = arr2(&[[1.0, 0.0], [3.0, 8.0], [5.0, 2.0], [7.0, 4.0]]);
        let mean = downsample_2d(&x, 0.01, 0.02, Agg::Mean).unwrap();
        assert_eq!(mean, arr2(&[[2.0, 4.0], [6.0, 3.0]]));
    }

    #[test]
    fn test_to_canonical_copy_on_same_hop() {
        let x = arr1(&[0.5, 0.25]);
        let out = to_canonical_grid_1d(&x, 0.01, None).unwrap();
        assert_eq!(out, x);
    }

    proptest! {
        // downsample(upsample(x, k), k, mean) == x for finite x
        #[test]
        fn prop_round_trip_mean(
            xs in proptest::collection::vec(-1000.0f64..1000.0, 1..64),
            factor in 2usize..5,
        ) {
            let x = Array1::from_vec(xs);
            let src_hop = CANONICAL_HOP_S * factor as f64;
            let up = upsample_hold_1d(&x, src_hop, CANONICAL_HOP_S).unwrap();
            let down = downsample_1d(&up, CANONICAL_HOP_S, src_hop, Agg::Mean).unwrap();
            for (a, b) in x.iter().zip(down.iter()) {
                prop_assert!((a - b).abs() < 1e-9);
            }
        }

        #[test]
        fn prop_round_trip_max(
            xs in proptest::collection::vec(-1000.0f64..1000.0, 1..64),
            factor in 2usize..5,
        ) {
            let x = Array1::from_vec(xs);
            let src_hop = CANONICAL_HOP_S * factor as f64;
            let up = upsample_hold_1d(&x, src_hop, CANONICAL_HOP_S).unwrap();
            let down = downsample_1d(&up, CANONICAL_HOP_S, src_hop, Agg::Max).unwrap();
            for (a, b) in x.iter().zip(down.iter()) {
                prop_assert!((a - b).abs() < 1e-9);
            }
        }
    }
}
