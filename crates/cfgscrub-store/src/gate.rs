//! Retry-on-absence gate.
//!
//! Upload and convert land on different requests, possibly different
//! processes, and the storage location is only eventually consistent between
//! them. Before a conversion reads its upload the gate polls the primary store
//! on a fixed step schedule, then checks the alternate store once.

use std::time::Duration;

use cfgscrub_domain::{ConvertError, RetrySchedule};

use crate::store::UploadStore;

pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

impl<S: Sleeper + ?Sized> Sleeper for &S {
    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    Primary,
    Alternate,
}

impl Location {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Alternate => "alternate",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    /// Attempt 0 is the initial check; attempts `1..=max_attempts` each sleep
    /// first.
    Polling { attempt: u32 },
    CheckingAlternate,
    Resolved(Location),
    Exhausted,
}

impl GateState {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Resolved(_) | Self::Exhausted)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub location: Location,
    /// Primary checks made, including the initial one.
    pub primary_checks: u32,
    pub waited: Duration,
}

pub struct RetryGate<'a, S> {
    primary: &'a dyn UploadStore,
    alternate: Option<&'a dyn UploadStore>,
    schedule: RetrySchedule,
    sleeper: S,
}

impl<'a, S: Sleeper> RetryGate<'a, S> {
    pub fn new(primary: &'a dyn UploadStore, schedule: RetrySchedule, sleeper: S) -> Self {
        Self {
            primary,
            alternate: None,
            schedule,
            sleeper,
        }
    }

    pub fn with_alternate(mut self, alternate: Option<&'a dyn UploadStore>) -> Self {
        self.alternate = alternate;
        self
    }

    pub fn store(&self, location: Location) -> &'a dyn UploadStore {
        match (location, self.alternate) {
            (Location::Alternate, Some(alt)) => alt,
            _ => self.primary,
        }
    }

    /// One transition. Returns the next state and the time slept getting
    /// there.
    pub fn step(&self, token: &str, state: GateState) -> (GateState, Duration) {
        match state {
            GateState::Polling { attempt } => {
                let mut slept = Duration::ZERO;
                if attempt > 0 {
                    slept = self.schedule.delay_for(attempt);
                    tracing::debug!(token, attempt, delay_ms = slept.as_millis() as u64, "upload not visible yet, waiting");
                    self.sleeper.sleep(slept);
                }
                let next = if self.primary.exists(token) {
                    GateState::Resolved(Location::Primary)
                } else if attempt >= self.schedule.max_attempts {
                    GateState::CheckingAlternate
                } else {
                    GateState::Polling {
                        attempt: attempt + 1,
                    }
                };
                (next, slept)
            }
            GateState::CheckingAlternate => {
                let next = match self.alternate {
                    Some(alt) if alt.exists(token) => GateState::Resolved(Location::Alternate),
                    _ => GateState::Exhausted,
                };
                (next, Duration::ZERO)
            }
            terminal => (terminal, Duration::ZERO),
        }
    }

    pub fn resolve(&self, token: &str) -> Result<Resolution, ConvertError> {
        let mut state = GateState::Polling { attempt: 0 };
        let mut waited = Duration::ZERO;
        let mut primary_checks = 0_u32;

        while !state.is_terminal() {
            if matches!(state, GateState::Polling { .. }) {
                primary_checks += 1;
            }
            let (next, slept) = self.step(token, state);
            waited += slept;
            state = next;
        }

        match state {
            GateState::Resolved(location) => {
                if primary_checks > 1 || location == Location::Alternate {
                    tracing::info!(
                        token,
                        location = location.as_str(),
                        primary_checks,
                        waited_ms = waited.as_millis() as u64,
                        "upload resolved after waiting"
                    );
                }
                Ok(Resolution {
                    location,
                    primary_checks,
                    waited,
                })
            }
            _ => {
                let mut candidates = vec![self.primary.describe(token)];
                if let Some(alt) = self.alternate {
                    candidates.push(alt.describe(token));
                }
                tracing::warn!(token, attempts = self.schedule.max_attempts, "upload never became visible");
                Err(ConvertError::not_found(
                    token,
                    self.schedule.max_attempts,
                    candidates,
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::io;

    use super::*;
    use crate::store::SweepReport;

    struct AppearsAfter {
        checks_before_visible: u32,
        checks: Cell<u32>,
    }

    impl UploadStore for AppearsAfter {
        fn put(&self, _bytes: &[u8], _name: &str) -> io::Result<String> {
            Err(io::Error::other("read-only"))
        }

        fn exists(&self, _token: &str) -> bool {
            let n = self.checks.get() + 1;
            self.checks.set(n);
            n > self.checks_before_visible
        }

        fn get(&self, _token: &str) -> io::Result<Vec<u8>> {
            Ok(Vec::new())
        }

        fn sweep(&self, _max_age: Duration) -> io::Result<SweepReport> {
            Ok(SweepReport::default())
        }

        fn describe(&self, token: &str) -> String {
            format!("mem://{token}")
        }
    }

    #[derive(Default)]
    struct RecordingSleeper {
        slept: RefCell<Vec<Duration>>,
    }

    impl Sleeper for RecordingSleeper {
        fn sleep(&self, duration: Duration) {
            self.slept.borrow_mut().push(duration);
        }
    }

    #[test]
    fn present_upload_resolves_without_sleeping() {
        let store = AppearsAfter {
            checks_before_visible: 0,
            checks: Cell::new(0),
        };
        let sleeper = RecordingSleeper::default();
        let gate = RetryGate::new(&store, RetrySchedule::default(), &sleeper);
        let res = gate.resolve("t").expect("resolved");
        assert_eq!(res.location, Location::Primary);
        assert_eq!(res.primary_checks, 1);
        assert!(sleeper.slept.borrow().is_empty());
    }

    #[test]
    fn upload_appearing_later_resolves_on_the_next_check() {
        for k in 1..=10 {
            let store = AppearsAfter {
                checks_before_visible: k,
                checks: Cell::new(0),
            };
            let sleeper = RecordingSleeper::default();
            let schedule = RetrySchedule::default();
            let gate = RetryGate::new(&store, schedule, &sleeper);
            let res = gate.resolve("t").expect("resolved");
            assert_eq!(res.primary_checks, k + 1);
            assert_eq!(sleeper.slept.borrow().len() as u32, k);
            assert!(res.waited <= schedule.worst_case());
        }
    }
}
