//! Admissible actuator ranges.

use serde::{Deserialize, Serialize};

/// Closed interval `[lo, hi]` for one control channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub lo: f64,
    pub hi: f64,
}

impl Bounds {
    pub const fn new(lo: f64, hi: f64) -> Self {
        Self { lo, hi }
    }

    /// Symmetric interval `[-limit, limit]`.
    pub const fn symmetric(limit: f64) -> Self {
        Self {
            lo: -limit,
            hi: limit,
        }
    }

    pub fn mid(&self) -> f64 {
        0.5 * (self.lo + self.hi)
    }

    pub fn half_range(&self) -> f64 {
        0.5 * (self.hi - self.lo)
    }

    pub fn clamp(&self, x: f64) -> f64 {
        x.clamp(self.lo, self.hi)
    }

    pub fn contains(&self, x: f64) -> bool {
        (self.lo..=self.hi).contains(&x)
    }

    /// A usable interval is finite with `lo < hi`.
    pub fn is_valid(&self) -> bool {
        self.lo.is_finite() && self.hi.is_finite() && self.lo < self.hi
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_basics() {
        let b = Bounds::new(0.0, 8.0);
        assert_eq!(b.mid(), 4.0);
        assert_eq!(b.half_range(), 4.0);
        assert_eq!(b.clamp(9.5), 8.0);
        assert!(b.contains(0.0));
        assert!(!b.contains(-1e-9));
        assert!(b.is_valid());
        assert!(!Bounds::new(1.0, 1.0).is_valid());
        assert_eq!(Bounds::symmetric(30.0), Bounds::new(-30.0, 30.0));
    }
}
