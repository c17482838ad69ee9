/*!
    Timestamp and duration newtypes.
*/

use std::fmt;

use crate::{Rational, Result};

/**
    A timestamp expressed in ticks of some time base.

    The time base is not stored alongside the value; it is carried by the
    owning frame, packet or stream.
*/
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pts(pub i64);

impl Pts {
    /**
        Convert this timestamp from one time base to another.
    */
    pub fn rescale(self, from: Rational, to: Rational) -> Result<Self> {
        Rational::rescale(self.0, from, to).map(Pts)
    }

    /**
        Timestamp in seconds for the given time base.
    */
    pub fn seconds(self, time_base: Rational) -> f64 {
        time_base.multiply_by_integer(self.0)
    }
}

impl fmt::Display for Pts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/**
    A duration expressed in ticks of some time base.
*/
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MediaDuration(pub i64);

impl MediaDuration {
    pub fn rescale(self, from: Rational, to: Rational) -> Result<Self> {
        Rational::rescale(self.0, from, to).map(MediaDuration)
    }

    pub fn seconds(self, time_base: Rational) -> f64 {
        time_base.multiply_by_integer(self.0)
    }
}
