use serde_derive::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Nanoseconds since the unix epoch. Used both for timing and as a unique-enough run identifier.
pub fn epoch_timestamp() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0)
}

#[derive(Error, Debug, PartialEq)]
pub enum TimerError {
    #[error("timer already started")]
    AlreadyStarted,
    #[error("timer not started")]
    NotStarted,
    #[error("timer already stopped")]
    AlreadyStopped,
    #[error("timer not stopped")]
    NotStopped,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone, Copy)]
enum SimpleTimerState {
    NotStarted,
    Started,
    Stopped,
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct SimpleTimer {
    pub name: String,
    state: SimpleTimerState,
    start_time_ns: u128,
    stop_time_ns: u128,
}

impl SimpleTimer {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            state: SimpleTimerState::NotStarted,
            start_time_ns: 0,
            stop_time_ns: 0,
        }
    }

    /// Creates a timer that is already running.
    pub fn start_new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            state: SimpleTimerState::Started,
            start_time_ns: epoch_timestamp(),
            stop_time_ns: 0,
        }
    }

    pub fn start(&mut self) -> Result<(), TimerError> {
        match self.state {
            SimpleTimerState::NotStarted => {
                self.start_time_ns = epoch_timestamp();
                self.state = SimpleTimerState::Started;
                Ok(())
            }
            SimpleTimerState::Started => Err(TimerError::AlreadyStarted),
            SimpleTimerState::Stopped => Err(TimerError::AlreadyStopped),
        }
    }

    pub fn stop(&mut self) -> Result<(), TimerError> {
        match self.state {
            SimpleTimerState::NotStarted => Err(TimerError::NotStarted),
            SimpleTimerState::Started => {
                self.stop_time_ns = epoch_timestamp();
                self.state = SimpleTimerState::Stopped;
                Ok(())
            }
            SimpleTimerState::Stopped => Err(TimerError::AlreadyStopped),
        }
    }

    pub fn get_total_nanoseconds(&self) -> Result<u128, TimerError> {
        match self.state {
            SimpleTimerState::NotStarted => Err(TimerError::NotStarted),
            SimpleTimerState::Started => Err(TimerError::NotStopped),
            // the wall clock can step backwards between start and stop
            SimpleTimerState::Stopped => Ok(self.stop_time_ns.saturating_sub(self.start_time_ns)),
        }
    }

    pub fn get_total_milliseconds(&self) -> Result<u128, TimerError> {
        Ok(self.get_total_nanoseconds()? / 1_000_000)
    }
}

impl fmt::Display for SimpleTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get_total_milliseconds() {
            Ok(total_time) => write!(f, "{}: {} ms", self.name, total_time),
            Err(_) => write!(f, "{}: not in stopped state.", self.name),
        }
    }
}
