use std::time::Duration;

use crate::clock;
use crate::DurationSinceUnixEpoch;

/// Trait for types that can be used as a timestamp clock stopped
/// at a given time.
#[allow(clippy::module_name_repetitions)]
pub struct StoppedClock;

/// Errors returned when the stopped clock would move outside the range of a
/// `DurationSinceUnixEpoch`.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    #[error("the stopped clock would overflow")]
    Overflow,
}

#[allow(clippy::module_name_repetitions)]
pub trait Stopped: clock::Time {
    /// It sets the clock to a given time.
    fn local_set(unix_time: &DurationSinceUnixEpoch);

    /// It adds a `Duration` to the clock.
    ///
    /// # Errors
    ///
    /// Will return `Error::Overflow` if the resulting time does not fit.
    fn local_add(duration: &Duration) -> Result<(), Error>;
}

impl clock::Time for clock::Stopped {
    fn now() -> DurationSinceUnixEpoch {
        detail::FIXED_TIME.with(|time| *time.borrow())
    }
}

impl Stopped for clock::Stopped {
    fn local_set(unix_time: &DurationSinceUnixEpoch) {
        detail::FIXED_TIME.with(|time| {
            *time.borrow_mut() = *unix_time;
        });
    }

    fn local_add(duration: &Duration) -> Result<(), Error> {
        detail::FIXED_TIME.with(|time| {
            let time_borrowed = *time.borrow();
            *time.borrow_mut() = time_borrowed.checked_add(*duration).ok_or(Error::Overflow)?;
            Ok(())
        })
    }
}


mod detail {
    use std::cell::RefCell;

    use crate::DurationSinceUnixEpoch;

    #[cfg(not(test))]
    pub fn get_default_fixed_time() -> DurationSinceUnixEpoch {
        use std::sync::OnceLock;
        use std::time::SystemTime;

        static APP_START_TIME: OnceLock<SystemTime> = OnceLock::new();

        APP_START_TIME
            .get_or_init(SystemTime::now)
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
    }

    #[cfg(test)]
    pub fn get_default_fixed_time() -> DurationSinceUnixEpoch {
        DurationSinceUnixEpoch::ZERO
    }

    thread_local!(pub static FIXED_TIME: RefCell<DurationSinceUnixEpoch> = RefCell::new(get_default_fixed_time()));
}
