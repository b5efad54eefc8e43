//! Deterministic archive writers.
//!
//! Both formats stamp every member with the same timestamp and a fixed mode,
//! write members in a fixed order, and publish through a [`staged::StagedArtifact`]
//! so a failed build never leaves a partial file at the final path.

pub mod sdist;
pub mod staged;
pub mod wheel;

use time::OffsetDateTime;
use zip::DateTime;

use crate::settings::DEFAULT_SOURCE_DATE_EPOCH;

pub use sdist::SdistWriter;
pub use staged::StagedArtifact;
pub use wheel::WheelWriter;

pub(crate) const FILE_MODE: u32 = 0o644;
pub(crate) const EXECUTABLE_MODE: u32 = 0o755;

/// 2107-12-31T23:59:58Z, the latest instant a DOS timestamp can hold.
const MAX_ZIP_EPOCH: u64 = 4_354_819_198;

pub(crate) fn member_mode(executable: bool) -> u32 {
    if executable {
        EXECUTABLE_MODE
    } else {
        FILE_MODE
    }
}

/// Converts epoch seconds to a zip timestamp, clamped to the DOS date range.
pub(crate) fn zip_datetime(epoch: u64) -> DateTime {
    let clamped = epoch.clamp(DEFAULT_SOURCE_DATE_EPOCH, MAX_ZIP_EPOCH);
    let Ok(seconds) = i64::try_from(clamped) else {
        return DateTime::default();
    };
    let Ok(stamp) = OffsetDateTime::from_unix_timestamp(seconds) else {
        return DateTime::default();
    };
    let Ok(year) = u16::try_from(stamp.year()) else {
        return DateTime::default();
    };
    DateTime::from_date_and_time(
        year,
        u8::from(stamp.month()),
        stamp.day(),
        stamp.hour(),
        stamp.minute(),
        stamp.second(),
    )
    .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_epoch_is_the_first_dos_date() {
        let stamp = zip_datetime(DEFAULT_SOURCE_DATE_EPOCH);
        assert_eq!(
            (stamp.year(), stamp.month(), stamp.day(), stamp.hour()),
            (1980, 1, 1, 0)
        );
    }

    #[test]
    fn early_epochs_clamp_to_1980() {
        let stamp = zip_datetime(0);
        assert_eq!((stamp.year(), stamp.month(), stamp.day()), (1980, 1, 1));
    }

    #[test]
    fn source_date_epoch_is_honored() {
        // 2023-11-14T22:13:20Z
        let stamp = zip_datetime(1_700_000_000);
        assert_eq!(
            (stamp.year(), stamp.month(), stamp.day(), stamp.hour(), stamp.minute()),
            (2023, 11, 14, 22, 13)
        );
    }

    #[test]
    fn modes_depend_on_the_executable_bit() {
        assert_eq!(member_mode(false), 0o644);
        assert_eq!(member_mode(true), 0o755);
    }
}
