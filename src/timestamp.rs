//! Windows FILETIME timestamps as stored in 7z headers.
//!
//! 7z stores creation, access and modification times as 64-bit counts of
//! 100-nanosecond intervals since January 1, 1601 (UTC).
//!
//! ```rust
//! use archkit::Timestamp;
//! use std::time::SystemTime;
//!
//! let ts = Timestamp::from_filetime(116444736000000000);
//! assert_eq!(ts.as_unix_secs(), 0);
//! assert_eq!(ts.as_system_time(), SystemTime::UNIX_EPOCH);
//! ```

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Difference between the FILETIME and Unix epochs in 100-nanosecond intervals.
const FILETIME_UNIX_DIFF: u64 = 116444736000000000;

/// Number of 100-nanosecond intervals per second.
const INTERVALS_PER_SECOND: u64 = 10_000_000;

/// A timestamp with FILETIME precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp {
    filetime: u64,
}

impl Timestamp {
    /// Creates a timestamp from a raw Windows FILETIME value.
    pub const fn from_filetime(filetime: u64) -> Self {
        Self { filetime }
    }

    /// Returns the raw FILETIME value.
    pub const fn as_filetime(&self) -> u64 {
        self.filetime
    }

    /// Creates a timestamp from Unix seconds; `None` before 1601.
    pub fn from_unix_secs(secs: i64) -> Option<Self> {
        let intervals = i128::from(secs) * i128::from(INTERVALS_PER_SECOND)
            + i128::from(FILETIME_UNIX_DIFF);
        u64::try_from(intervals).ok().map(Self::from_filetime)
    }

    /// Converts a [`SystemTime`], truncating to 100ns precision.
    pub fn from_system_time(time: SystemTime) -> Option<Self> {
        match time.duration_since(UNIX_EPOCH) {
            Ok(after) => {
                let intervals = after.as_nanos() / 100 + u128::from(FILETIME_UNIX_DIFF);
                u64::try_from(intervals).ok().map(Self::from_filetime)
            }
            Err(e) => {
                let before = e.duration().as_nanos().div_ceil(100);
                u64::try_from(u128::from(FILETIME_UNIX_DIFF).checked_sub(before)?)
                    .ok()
                    .map(Self::from_filetime)
            }
        }
    }

    /// Whole seconds since the Unix epoch (floored).
    pub fn as_unix_secs(&self) -> i64 {
        let diff = i128::from(self.filetime) - i128::from(FILETIME_UNIX_DIFF);
        diff.div_euclid(i128::from(INTERVALS_PER_SECOND)) as i64
    }

    /// Converts to a [`SystemTime`].
    pub fn as_system_time(&self) -> SystemTime {
        if self.filetime >= FILETIME_UNIX_DIFF {
            UNIX_EPOCH + Duration::from_nanos((self.filetime - FILETIME_UNIX_DIFF) * 100)
        } else {
            UNIX_EPOCH - Duration::from_nanos((FILETIME_UNIX_DIFF - self.filetime) * 100)
        }
    }
}

impl From<u64> for Timestamp {
    fn from(filetime: u64) -> Self {
        Self::from_filetime(filetime)
    }
}

impl From<Timestamp> for SystemTime {
    fn from(ts: Timestamp) -> Self {
        ts.as_system_time()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unix_epoch() {
        let ts = Timestamp::from_filetime(FILETIME_UNIX_DIFF);
        assert_eq!(ts.as_unix_secs(), 0);
        assert_eq!(ts.as_system_time(), UNIX_EPOCH);
    }

    #[test]
    fn test_from_unix_secs() {
        // 2013-05-14T17:50:19Z
        let ts = Timestamp::from_unix_secs(1_368_553_819).unwrap();
        assert_eq!(ts.as_unix_secs(), 1_368_553_819);
        assert_eq!(Timestamp::from_unix_secs(-20_000_000_000), None);
    }

    #[test]
    fn test_system_time_round_trip_truncates_to_100ns() {
        let time = UNIX_EPOCH + Duration::from_nanos(1_234_567_891);
        let ts = Timestamp::from_system_time(time).unwrap();
        assert_eq!(
            ts.as_system_time(),
            UNIX_EPOCH + Duration::from_nanos(1_234_567_800)
        );
    }

    #[test]
    fn test_before_unix_epoch() {
        let ts = Timestamp::from_filetime(FILETIME_UNIX_DIFF - INTERVALS_PER_SECOND / 2);
        assert_eq!(ts.as_unix_secs(), -1);
        assert!(ts.as_system_time() < UNIX_EPOCH);
    }
}
