//! `Clock` implementation backed by
//! `SystemTime`.

use crate::ports::clock::Clock;

#[derive(Debug, Default, Clone, Copy)]

pub struct SystemClock;

impl Clock for SystemClock {
  fn now_epoch_ms(&self) -> i64 {
    let now = std::time::SystemTime::now()
      .duration_since(std::time::UNIX_EPOCH)
      .unwrap_or_default();

    now.as_millis() as i64
  }
}
