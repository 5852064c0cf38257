use std::sync::Mutex;

use chrono::{DateTime, Utc};

use crate::cursor::{from_sort_key, sort_key};

/// Issues strictly increasing creation timestamps.
///
/// Cursors compare on the timestamp alone, so two entities sharing a
/// timestamp could straddle a page boundary. Handing out distinct values
/// per process avoids that for everything this service creates.
#[derive(Debug, Default)]
pub struct MonotonicClock {
    last: Mutex<i64>,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> DateTime<Utc> {
        let wall = sort_key(Utc::now());
        let mut last = match self.last.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let next = if wall > *last { wall } else { *last + 1 };
        *last = next;
        from_sort_key(next)
    }
}
