//! Time as seen by token validation
//!
//! Validation compares token timestamps against "now", so the current time is
//! provided by a [`Clock`] that can be replaced in tests.

use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, SystemTime},
};

use serde::{Deserialize, Serialize};

/// Unix time
///
/// Unix time as represented by the number of seconds elapsed since the
/// beginning of the Unix epoch on 1970/01/01 at 00:00:00 UTC.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize,
)]
#[serde(transparent)]
#[repr(transparent)]
pub struct UnixTime(pub u64);

impl UnixTime {
    /// Converts fractional epoch seconds, truncating toward zero
    ///
    /// Returns `None` for negative, non-finite, or out-of-range values.
    #[must_use]
    pub fn from_secs_f64(secs: f64) -> Option<Self> {
        if secs.is_finite() && secs >= 0.0 && secs < u64::MAX as f64 {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            Some(Self(secs.trunc() as u64))
        } else {
            None
        }
    }

    /// Adds a duration, saturating at the end of representable time
    #[inline]
    #[must_use]
    pub fn saturating_add(self, d: Duration) -> Self {
        Self(self.0.saturating_add(d.as_secs()))
    }

    /// Subtracts a duration, saturating at the Unix epoch
    #[inline]
    #[must_use]
    pub fn saturating_sub(self, d: Duration) -> Self {
        Self(self.0.saturating_sub(d.as_secs()))
    }

    /// The time elapsed since `earlier`, or zero if `earlier` is in the future
    #[inline]
    #[must_use]
    pub fn duration_since(self, earlier: Self) -> Duration {
        Duration::from_secs(self.0.saturating_sub(earlier.0))
    }
}

impl fmt::Display for UnixTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl From<SystemTime> for UnixTime {
    #[inline]
    fn from(t: SystemTime) -> Self {
        // Clocks set before 1970 are treated as the epoch itself.
        let time = t
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();

        UnixTime(time)
    }
}

/// Represents a clock, which can tell the current time
pub trait Clock {
    /// Gets the current time according to this clock
    fn now(&self) -> UnixTime;
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    #[inline]
    fn now(&self) -> UnixTime {
        C::now(self)
    }
}

impl<C: Clock + ?Sized> Clock for &'_ C {
    #[inline]
    fn now(&self) -> UnixTime {
        C::now(self)
    }
}

/// The system clock as provided by `std::time::SystemTime`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct System;

impl Clock for System {
    #[inline]
    fn now(&self) -> UnixTime {
        UnixTime::from(SystemTime::now())
    }
}

/// A manually driven clock
///
/// The time is held atomically so that one clock can be shared (e.g. through
/// an [`Arc`]) between a validator and the test that moves time forward.
#[derive(Debug, Default)]
pub struct TestClock(AtomicU64);

impl Clock for TestClock {
    #[inline]
    fn now(&self) -> UnixTime {
        UnixTime(self.0.load(Ordering::SeqCst))
    }
}

impl TestClock {
    /// Creates a new test clock with the specified time
    #[inline]
    #[must_use]
    pub const fn new(time: UnixTime) -> Self {
        Self(AtomicU64::new(time.0))
    }

    /// Updates the clock's current time to `val`
    pub fn set(&self, val: UnixTime) {
        self.0.store(val.0, Ordering::SeqCst);
    }

    /// Advances the clock's current time by `inc`
    pub fn advance(&self, inc: Duration) {
        self.0.fetch_add(inc.as_secs(), Ordering::SeqCst);
    }
}
