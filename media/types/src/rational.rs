/*!
    Exact rational numbers for time bases and rates.
*/

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/**
    A rational number kept in lowest terms with a positive denominator.

    Time bases, frame rates and sample rates are all expressed as rationals so
    that timestamps can be converted between clock domains without
    accumulating floating point error.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Rational {
    num: i32,
    den: i32,
}

impl Rational {
    /// Zero, expressed as `0/1`.
    pub const ZERO: Self = Self { num: 0, den: 1 };

    /// One second, expressed as `1/1`.
    pub const ONE: Self = Self { num: 1, den: 1 };

    /**
        Create a rational from a numerator and denominator.

        The sign is moved to the numerator and the pair is reduced by their
        greatest common divisor. Fails with [`Error::InvalidRational`] if the
        denominator is zero or the reduced pair does not fit in `i32`.
    */
    pub fn new(num: i32, den: i32) -> Result<Self> {
        Self::reduce(num as i64, den as i64)
    }

    /**
        Create the integer rational `n/1`.
    */
    pub const fn integer(n: i32) -> Self {
        Self { num: n, den: 1 }
    }

    fn reduce(num: i64, den: i64) -> Result<Self> {
        if den == 0 {
            return Err(Error::InvalidRational { num, den });
        }

        let (num, den) = if den < 0 { (-num, -den) } else { (num, den) };
        let divisor = gcd(num.unsigned_abs(), den.unsigned_abs()) as i64;
        let (num, den) = (num / divisor, den / divisor);

        match (i32::try_from(num), i32::try_from(den)) {
            (Ok(num), Ok(den)) => Ok(Self { num, den }),
            _ => Err(Error::InvalidRational { num, den }),
        }
    }

    pub const fn num(self) -> i32 {
        self.num
    }

    pub const fn den(self) -> i32 {
        self.den
    }

    /**
        Returns true if the rational is strictly greater than zero.

        Only positive rationals are usable as time bases or rates.
    */
    pub const fn is_positive(self) -> bool {
        self.num > 0
    }

    /**
        Returns the reciprocal, e.g. a time base from a frame rate.
    */
    pub fn invert(self) -> Result<Self> {
        Self::reduce(self.den as i64, self.num as i64)
    }

    pub fn to_f64(self) -> f64 {
        self.num as f64 / self.den as f64
    }

    /**
        Multiply an integer duration by this rational, yielding a real value.

        With a time base this converts a tick count into seconds.
    */
    pub fn multiply_by_integer(self, n: i64) -> f64 {
        let scaled = n as i128 * self.num as i128;
        scaled as f64 / self.den as f64
    }

    /**
        Convert `value` expressed in `from` units into `to` units.

        Rounds to the nearest integer, with ties resolved away from zero. Fails
        with [`Error::InvalidRational`] when `to` is zero and with
        [`Error::TimestampOverflow`] when the result does not fit in `i64`.
    */
    pub fn rescale(value: i64, from: Rational, to: Rational) -> Result<i64> {
        if from == to {
            return Ok(value);
        }
        if to.num == 0 {
            return Err(Error::InvalidRational {
                num: to.num as i64,
                den: to.den as i64,
            });
        }

        let mut num = value as i128 * from.num as i128 * to.den as i128;
        let mut den = from.den as i128 * to.num as i128;
        if den < 0 {
            num = -num;
            den = -den;
        }

        let rounded = if num >= 0 {
            (2 * num + den) / (2 * den)
        } else {
            (2 * num - den) / (2 * den)
        };

        i64::try_from(rounded).map_err(|_| Error::TimestampOverflow { value })
    }
}

impl Ord for Rational {
    fn cmp(&self, other: &Self) -> Ordering {
        // Denominators are positive, so cross-multiplying preserves order.
        let lhs = self.num as i64 * other.den as i64;
        let rhs = other.num as i64 * self.den as i64;
        lhs.cmp(&rhs)
    }
}

impl PartialOrd for Rational {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Default for Rational {
    fn default() -> Self {
        Self::ZERO
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

impl FromStr for Rational {
    type Err = Error;

    /**
        Parse `"num/den"` or a bare integer such as `"24"`.
    */
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::invalid_data(format!("invalid rational '{s}'"));

        match s.trim().split_once('/') {
            Some((num, den)) => {
                let num = num.trim().parse().map_err(|_| invalid())?;
                let den = den.trim().parse().map_err(|_| invalid())?;
                Self::new(num, den)
            }
            None => {
                let num = s.trim().parse().map_err(|_| invalid())?;
                Ok(Self::integer(num))
            }
        }
    }
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    // gcd(0, 0) only happens for 0/0, which is rejected before reduction.
    a.max(1)
}
