use chrono::{DateTime, Local};

/// Thin wrapper around a captured timestamp, passed to the formatter so
/// call sites never re-read the clock after record construction.
pub struct Timer(DateTime<Local>);

impl std::ops::Deref for Timer {
    type Target = DateTime<Local>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Timer {
    pub(crate) fn new() -> Self {
        Self(Local::now())
    }
}

impl From<DateTime<Local>> for Timer {
    fn from(dt: DateTime<Local>) -> Self {
        Self(dt)
    }
}
