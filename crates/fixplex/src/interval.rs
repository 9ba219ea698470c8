//! Modular intervals over `Z/2^W`
//!
//! A [`ModInterval`] is the closed-open range `[lo, hi)` of ring elements,
//! possibly wrapping past `2^W - 1`. Membership of `x` is `lo <= x < hi` when
//! `lo < hi`, and `x >= lo || x < hi` otherwise (so `hi == 0` denotes "up to
//! the top of the ring").
//!
//! Two distinguished states exist beyond proper ranges:
//!
//! - the **free** interval `(0, 0)` contains every ring element; it doubles
//!   as the widening target for interval arithmetic that would wrap all the
//!   way around, and
//! - the **empty** interval contains nothing and marks an unsatisfiable
//!   variable.
//!
//! Interval arithmetic here is deliberately over-approximate: `+` is the
//! Minkowski sum widened to free on full wrap, `*` by a scalar widens to free
//! when the scaled length would wrap, and intersection returns the minimal
//! single interval covering the (up to two) arcs common to both operands.
//! Over-approximation is sound for the propagation that consumes it.

use std::fmt;
use std::ops::{Add, Mul, Neg, Sub};

use crate::numeral::Numeral;

/// A closed-open interval `[lo, hi)` on the modular ring, or free, or empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModInterval<N> {
    /// Inclusive lower bound.
    pub lo: N,
    /// Exclusive upper bound.
    pub hi: N,
    emp: bool,
}

impl<N: Numeral> Default for ModInterval<N> {
    fn default() -> Self {
        Self::free()
    }
}

impl<N: Numeral> ModInterval<N> {
    /// The interval containing every ring element.
    pub fn free() -> Self {
        ModInterval { lo: N::ZERO, hi: N::ZERO, emp: false }
    }

    /// The interval containing nothing.
    pub fn empty() -> Self {
        ModInterval { lo: N::ZERO, hi: N::ZERO, emp: true }
    }

    /// Interval from raw bounds. `(0, 0)` is the free sentinel; any other
    /// `lo == hi` pair denotes an empty range.
    pub fn new(lo: N, hi: N) -> Self {
        if lo == hi {
            if lo.is_zero() {
                Self::free()
            } else {
                Self::empty()
            }
        } else {
            ModInterval { lo, hi, emp: false }
        }
    }

    /// Singleton interval `{x}`.
    pub fn fixed(x: N) -> Self {
        ModInterval { lo: x, hi: x.wrapping_add(N::ONE), emp: false }
    }

    /// True iff every ring element is contained.
    #[inline]
    pub fn is_free(&self) -> bool {
        !self.emp && self.lo == self.hi
    }

    /// True iff no ring element is contained.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.emp
    }

    /// True iff exactly one ring element is contained.
    #[inline]
    pub fn is_fixed(&self) -> bool {
        !self.emp && self.lo.wrapping_add(N::ONE) == self.hi
    }

    /// Number of contained elements; `0` encodes the full ring.
    #[inline]
    fn len(&self) -> N {
        self.hi.wrapping_sub(self.lo)
    }

    /// Membership test.
    pub fn contains(&self, x: N) -> bool {
        if self.emp {
            return false;
        }
        if self.lo == self.hi {
            return true; // free
        }
        if self.lo < self.hi {
            self.lo <= x && x < self.hi
        } else {
            x >= self.lo || x < self.hi
        }
    }

    /// `x` if contained, otherwise whichever of `lo` and `hi - 1` is nearer
    /// in wrapping distance.
    pub fn closest_value(&self, x: N) -> N {
        if self.contains(x) || self.emp {
            return x;
        }
        if self.lo.wrapping_sub(x) < x.wrapping_sub(self.hi) {
            self.lo
        } else {
            self.hi.wrapping_sub(N::ONE)
        }
    }

    /// Minimal single interval covering the elements common to both.
    ///
    /// Two arcs on a circle intersect in at most two arcs; when the true
    /// intersection has two components the shorter of the two covering arcs
    /// is returned (an over-approximation, which is sound for bound
    /// tightening).
    pub fn intersect(&self, other: &Self) -> Self {
        if self.emp || other.emp {
            return Self::empty();
        }
        if self.is_free() {
            return *other;
        }
        if other.is_free() {
            return *self;
        }
        let ring = 1u128 << N::WIDTH;
        let a = self.lo.to_u64() as u128;
        let la = self.len().to_u64() as u128;
        let lb = other.len().to_u64() as u128;
        // Work in coordinates relative to `self.lo`; `self` is [0, la).
        let offset = (other.lo.to_u64() as u128 + ring - a) % ring;
        // `other` is [offset, offset + lb), split at the ring boundary.
        let mut pieces: [(u128, u128); 2] = [(0, 0); 2];
        let mut n = 0;
        if offset + lb > ring {
            if offset < la {
                pieces[n] = (offset, la);
                n += 1;
            }
            let low_end = (offset + lb - ring).min(la);
            if low_end > 0 {
                pieces[n] = (0, low_end);
                n += 1;
            }
        } else if offset < la {
            pieces[n] = (offset, (offset + lb).min(la));
            n += 1;
        }
        match n {
            0 => Self::empty(),
            1 => {
                let (s, e) = pieces[0];
                let lo = N::from_u64(((a + s) % ring) as u64);
                let hi = N::from_u64(((a + e) % ring) as u64);
                ModInterval { lo, hi, emp: false }
            }
            _ => {
                // pieces[0] = [s1, la), pieces[1] = [0, e2) with e2 < s1.
                let (s1, e1) = pieces[0];
                let (_, e2) = pieces[1];
                let forward = e1; // [0, e1) relative, i.e. all of `self`
                let wrapped = ring - s1 + e2;
                if forward <= wrapped {
                    *self
                } else {
                    let lo = N::from_u64(((a + s1) % ring) as u64);
                    let hi = N::from_u64(((a + e2) % ring) as u64);
                    ModInterval { lo, hi, emp: false }
                }
            }
        }
    }
}

impl<N: Numeral> Add for ModInterval<N> {
    type Output = Self;

    /// Minkowski sum, widening to free when the summed lengths wrap the
    /// whole ring.
    fn add(self, rhs: Self) -> Self {
        if self.emp || rhs.emp {
            return Self::empty();
        }
        if self.is_free() || rhs.is_free() {
            return Self::free();
        }
        let ring = 1u128 << N::WIDTH;
        let total = self.len().to_u64() as u128 + rhs.len().to_u64() as u128 - 1;
        if total >= ring {
            return Self::free();
        }
        let lo = self.lo.wrapping_add(rhs.lo);
        let hi = lo.wrapping_add(N::from_u64(total as u64)).wrapping_add(N::ONE);
        ModInterval { lo, hi, emp: false }
    }
}

impl<N: Numeral> Neg for ModInterval<N> {
    type Output = Self;

    /// `{-x : x in self}`, i.e. `[1 - hi, 1 - lo)`.
    fn neg(self) -> Self {
        if self.emp || self.is_free() {
            return self;
        }
        ModInterval {
            lo: N::ONE.wrapping_sub(self.hi),
            hi: N::ONE.wrapping_sub(self.lo),
            emp: false,
        }
    }
}

impl<N: Numeral> Sub for ModInterval<N> {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        self + (-rhs)
    }
}

impl<N: Numeral> Mul<N> for ModInterval<N> {
    type Output = Self;

    /// Interval of `c * y` for `y` in `self`.
    ///
    /// The scaled arithmetic progression is covered by the interval hull of
    /// its endpoints as long as its total span stays inside the ring;
    /// otherwise the result widens to free. Multipliers in the upper half of
    /// the ring are treated as negated small multipliers so that e.g.
    /// `* (2^W - 1)` is an exact negation.
    fn mul(self, c: N) -> Self {
        if self.emp {
            return self;
        }
        if c.is_zero() {
            return Self::fixed(N::ZERO);
        }
        if c == N::ONE {
            return self;
        }
        if self.is_free() {
            return Self::free();
        }
        let ring = 1u128 << N::WIDTH;
        let sz = self.len().to_u64() as u128;
        let neg_c = c.wrapping_neg();
        if neg_c < c {
            // c is "negative": the image runs downward from c * lo.
            if neg_c.to_u64() as u128 * sz >= ring {
                return Self::free();
            }
            let top = self.hi.wrapping_sub(N::ONE);
            ModInterval {
                lo: c.wrapping_mul(top),
                hi: c.wrapping_mul(self.lo).wrapping_add(N::ONE),
                emp: false,
            }
        } else {
            if c.to_u64() as u128 * sz >= ring {
                return Self::free();
            }
            let top = self.hi.wrapping_sub(N::ONE);
            ModInterval {
                lo: c.wrapping_mul(self.lo),
                hi: c.wrapping_mul(top).wrapping_add(N::ONE),
                emp: false,
            }
        }
    }
}

impl<N: Numeral> fmt::Display for ModInterval<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.emp {
            write!(f, "[empty]")
        } else if self.is_free() {
            write!(f, "[free]")
        } else {
            write!(f, "[{}, {})", self.lo, self.hi)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type I8 = ModInterval<u8>;
    type I4 = ModInterval<u8>; // width-4 cases expressed at width 8 scale down

    #[test]
    fn membership() {
        let i = I8::new(3, 7);
        assert!(i.contains(3) && i.contains(6));
        assert!(!i.contains(7) && !i.contains(2));

        let wrap = I8::new(250, 3);
        assert!(wrap.contains(250) && wrap.contains(255) && wrap.contains(0) && wrap.contains(2));
        assert!(!wrap.contains(3) && !wrap.contains(100));

        let top = I8::new(10, 0); // [10, 2^8)
        assert!(top.contains(10) && top.contains(255));
        assert!(!top.contains(9) && !top.contains(0));
    }

    #[test]
    fn sentinels() {
        assert!(I8::new(0, 0).is_free());
        assert!(I8::new(5, 5).is_empty());
        assert!(I8::free().contains(77));
        assert!(!I8::empty().contains(0));
        assert!(I8::fixed(255).is_fixed());
        assert_eq!(I8::fixed(255).hi, 0);
    }

    #[test]
    fn intersect_plain() {
        let a = I8::new(3, 10);
        let b = I8::new(7, 20);
        assert_eq!(a.intersect(&b), I8::new(7, 10));
        assert!(a.intersect(&I8::new(10, 20)).is_empty());
        assert_eq!(a.intersect(&I8::free()), a);
        assert!(a.intersect(&I8::empty()).is_empty());
    }

    #[test]
    fn intersect_wrap() {
        // [0,3) with "nonzero" [1,0): drops 0
        assert_eq!(I8::new(0, 3).intersect(&I8::new(1, 0)), I8::new(1, 3));
        // two wrapping intervals share their wrap arc
        assert_eq!(I8::new(250, 2).intersect(&I8::new(251, 2)), I8::new(251, 2));
        // excluding one point each composes
        assert_eq!(I8::new(1, 0).intersect(&I8::new(2, 1)), I8::new(2, 0));
    }

    #[test]
    fn intersect_two_arcs_takes_smaller_hull() {
        // At width 8: [250,2) = {250..255,0,1}, [254,251) = everything
        // except {251,252,253}. Common: {254,255,0,1,250}; the minimal
        // covering arc is [250,2).
        let a = I8::new(250, 2);
        let b = I8::new(254, 251);
        let r = a.intersect(&b);
        assert_eq!(r, I8::new(250, 2));
        for x in [254u8, 255, 0, 1, 250] {
            assert!(r.contains(x));
        }
    }

    #[test]
    fn minkowski_add() {
        assert_eq!(I8::new(1, 3) + I8::new(10, 12), I8::new(11, 14));
        // lengths 200 + 100 wrap the ring entirely
        assert!((I8::new(0, 200) + I8::new(0, 100)).is_free());
        // wrap without widening
        assert_eq!(I8::new(250, 252) + I8::new(10, 11), I8::new(4, 6));
    }

    #[test]
    fn negation() {
        let i = I8::new(3, 7); // {3,4,5,6} -> {250,251,252,253}
        assert_eq!(-i, I8::new(250, 254));
        assert_eq!(-(-i), i);
        assert!((-I8::free()).is_free());
    }

    #[test]
    fn scalar_mul() {
        // {1,2,3} * 3 -> hull [3, 10)
        assert_eq!(I8::new(1, 4) * 3u8, I8::new(3, 10));
        // * -1 is exact negation
        assert_eq!(I8::new(3, 7) * 255u8, -I8::new(3, 7));
        // even multiplier over a long range widens to free
        assert!((I8::new(0, 200) * 2u8).is_free());
        // * 0 pins to {0}
        assert_eq!(I8::new(9, 12) * 0u8, I8::fixed(0));
    }

    #[test]
    fn closest_value_prefers_near_side() {
        let i = I4::new(4, 8);
        assert_eq!(i.closest_value(5), 5);
        assert_eq!(i.closest_value(9), 7);
        assert_eq!(i.closest_value(2), 4);
    }
}
