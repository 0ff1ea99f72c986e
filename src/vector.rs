//! N-dimensional index arithmetic
//!
//! All block geometry is expressed as fixed-length `i64` vectors so that
//! out-of-range and negative intermediate values stay representable and can
//! be rejected by validation instead of wrapping. The linear ordering used
//! throughout the crate is first-axis-fastest: `linear_index` and `lexi`
//! agree on it, which the microblock copy loops rely on.

use crate::error::{BvpError, Result};

fn zip_with<T>(a: &[i64], b: &[i64], op: impl Fn(i64, i64) -> T) -> Result<Vec<T>> {
    if a.len() != b.len() {
        return Err(BvpError::DimensionMismatch(format!(
            "{} vs {}",
            a.len(),
            b.len()
        )));
    }
    Ok(a.iter().zip(b).map(|(&x, &y)| op(x, y)).collect())
}

/// Elementwise sum of two vectors
pub fn add(a: &[i64], b: &[i64]) -> Result<Vec<i64>> {
    zip_with(a, b, |x, y| x + y)
}

/// Elementwise difference of two vectors
pub fn sub(a: &[i64], b: &[i64]) -> Result<Vec<i64>> {
    zip_with(a, b, |x, y| x - y)
}

/// Elementwise product of two vectors
pub fn mul(a: &[i64], b: &[i64]) -> Result<Vec<i64>> {
    zip_with(a, b, |x, y| x * y)
}

/// Elementwise quotient of two vectors
///
/// # Panics
///
/// Panics if any component of `b` is zero.
pub fn div(a: &[i64], b: &[i64]) -> Result<Vec<i64>> {
    zip_with(a, b, |x, y| x / y)
}

/// Elementwise remainder of two vectors
///
/// # Panics
///
/// Panics if any component of `b` is zero.
pub fn rem(a: &[i64], b: &[i64]) -> Result<Vec<i64>> {
    zip_with(a, b, |x, y| x % y)
}

/// Elementwise minimum of two vectors
pub fn min(a: &[i64], b: &[i64]) -> Result<Vec<i64>> {
    zip_with(a, b, |x, y| x.min(y))
}

/// Elementwise maximum of two vectors
pub fn max(a: &[i64], b: &[i64]) -> Result<Vec<i64>> {
    zip_with(a, b, |x, y| x.max(y))
}

/// Elementwise `<` comparison
pub fn lt(a: &[i64], b: &[i64]) -> Result<Vec<bool>> {
    zip_with(a, b, |x, y| x < y)
}

/// Elementwise `>` comparison
pub fn gt(a: &[i64], b: &[i64]) -> Result<Vec<bool>> {
    zip_with(a, b, |x, y| x > y)
}

/// Elementwise `==` comparison
pub fn eq(a: &[i64], b: &[i64]) -> Result<Vec<bool>> {
    zip_with(a, b, |x, y| x == y)
}

/// True if any component is true
pub fn any(a: &[bool]) -> bool {
    a.iter().any(|&x| x)
}

/// True if every component is true
pub fn all(a: &[bool]) -> bool {
    a.iter().all(|&x| x)
}

/// True if no component is true
pub fn none(a: &[bool]) -> bool {
    !any(a)
}

/// Product of all components (1 for the empty vector)
pub fn product(a: &[i64]) -> i64 {
    a.iter().product()
}

/// Linear offset of `index` within a grid of the given `extent`,
/// first axis fastest
pub fn linear_index(index: &[i64], extent: &[i64]) -> Result<i64> {
    if index.len() != extent.len() {
        return Err(BvpError::DimensionMismatch(format!(
            "{} vs {}",
            index.len(),
            extent.len()
        )));
    }
    let mut offset = 0;
    let mut scale = 1;
    for (&i, &e) in index.iter().zip(extent) {
        offset += i * scale;
        scale *= e;
    }
    Ok(offset)
}

/// Iterator over every multi-index in `[0, extent[0]) x ... x [0, extent[N-1])`,
/// visited in the same first-axis-fastest order as `linear_index`
///
/// An extent with any non-positive component describes an empty box and
/// yields nothing.
pub fn lexi(extent: &[i64]) -> Lexi {
    let remaining = if extent.iter().all(|&e| e > 0) {
        product(extent)
    } else {
        0
    };
    Lexi {
        extent: extent.to_vec(),
        current: vec![0; extent.len()],
        remaining,
    }
}

/// Odometer-style multi-index enumerator produced by [`lexi`]
#[derive(Debug, Clone)]
pub struct Lexi {
    extent: Vec<i64>,
    current: Vec<i64>,
    remaining: i64,
}

impl Iterator for Lexi {
    type Item = Vec<i64>;

    fn next(&mut self) -> Option<Vec<i64>> {
        if self.remaining <= 0 {
            return None;
        }
        self.remaining -= 1;
        let out = self.current.clone();
        for (c, &e) in self.current.iter_mut().zip(&self.extent) {
            *c += 1;
            if *c >= e {
                *c = 0;
            } else {
                break;
            }
        }
        Some(out)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.remaining.max(0) as usize;
        (n, Some(n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elementwise_ops() {
        assert_eq!(add(&[1, 2, 3], &[4, 5, 6]).unwrap(), vec![5, 7, 9]);
        assert_eq!(sub(&[4, 5, 6], &[1, 2, 3]).unwrap(), vec![3, 3, 3]);
        assert_eq!(mul(&[2, 3], &[4, 5]).unwrap(), vec![8, 15]);
        assert_eq!(div(&[8, 9], &[2, 3]).unwrap(), vec![4, 3]);
        assert_eq!(rem(&[8, 9], &[3, 3]).unwrap(), vec![2, 0]);
        assert_eq!(min(&[1, 5], &[3, 2]).unwrap(), vec![1, 2]);
        assert_eq!(max(&[1, 5], &[3, 2]).unwrap(), vec![3, 5]);
    }

    #[test]
    fn test_dimension_mismatch() {
        let err = add(&[1, 2], &[1, 2, 3]).unwrap_err();
        assert!(matches!(err, BvpError::DimensionMismatch(_)));
    }

    #[test]
    fn test_comparisons_and_reductions() {
        let below = lt(&[1, 5, 2], &[3, 4, 2]).unwrap();
        assert_eq!(below, vec![true, false, false]);
        assert!(any(&below));
        assert!(!all(&below));
        assert!(!none(&below));
        assert!(all(&eq(&[7, 7], &[7, 7]).unwrap()));
        assert!(none(&gt(&[1, 1], &[2, 2]).unwrap()));
    }

    #[test]
    fn test_product() {
        assert_eq!(product(&[4, 3, 2]), 24);
        assert_eq!(product(&[]), 1);
        assert_eq!(product(&[5, 0]), 0);
    }

    #[test]
    fn test_linear_index_first_axis_fastest() {
        assert_eq!(linear_index(&[0, 0], &[4, 3]).unwrap(), 0);
        assert_eq!(linear_index(&[1, 0], &[4, 3]).unwrap(), 1);
        assert_eq!(linear_index(&[0, 1], &[4, 3]).unwrap(), 4);
        assert_eq!(linear_index(&[1, 2], &[4, 3]).unwrap(), 9);
        assert_eq!(linear_index(&[3, 2], &[4, 3]).unwrap(), 11);
    }

    #[test]
    fn test_lexi_matches_linear_index() {
        let extent = [3, 2, 4];
        let mut counter = 0;
        for index in lexi(&extent) {
            assert_eq!(linear_index(&index, &extent).unwrap(), counter);
            counter += 1;
        }
        assert_eq!(counter, product(&extent));
    }

    #[test]
    fn test_lexi_order() {
        let visited: Vec<Vec<i64>> = lexi(&[2, 2]).collect();
        assert_eq!(
            visited,
            vec![vec![0, 0], vec![1, 0], vec![0, 1], vec![1, 1]]
        );
    }

    #[test]
    fn test_lexi_degenerate_extents() {
        assert_eq!(lexi(&[0, 3]).count(), 0);
        assert_eq!(lexi(&[-2, 3]).count(), 0);
        // a zero-dimensional grid has exactly one point, the empty index
        let empty: Vec<Vec<i64>> = lexi(&[]).collect();
        assert_eq!(empty, vec![Vec::<i64>::new()]);
    }
}
