//! Injectable time source.

use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

pub trait Clock: Send + Sync {
  fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> DateTime<Utc> { Utc::now() }
}

/// A clock that only moves when told to. Useful for reproducible histories.
#[derive(Debug)]
pub struct ManualClock {
  now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
  pub fn new(start: DateTime<Utc>) -> Self { Self { now: Mutex::new(start) } }

  pub fn set(&self, at: DateTime<Utc>) {
    let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
    *now = at;
  }

  /// Move forward and return the new time.
  pub fn advance(&self, by: Duration) -> DateTime<Utc> {
    let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
    *now += by;
    *now
  }
}

impl Clock for ManualClock {
  fn now(&self) -> DateTime<Utc> {
    *self.now.lock().unwrap_or_else(|e| e.into_inner())
  }
}
