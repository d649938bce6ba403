//! Input and output logs.

mod memory;
mod redis_stream;

pub use self::memory::MemoryStream;
pub use self::redis_stream::{RedisStream, Trim};

use crate::error::Result;
use crate::frame::{Cursor, FrameRecord};

use std::time::Duration;

/// Ordered, appendable log of frame records.
pub trait FrameSource {
    /// Next record strictly after `after`, waiting at most `timeout`.
    fn read_after(
        &mut self,
        after: &Cursor,
        timeout: Duration,
    ) -> Result<Option<(Cursor, Result<FrameRecord>)>>;
}

/// Retention-bounded output log.
pub trait TrackSink {
    /// Appends `{refId, tracking}` and trims the log to `maxlen` entries.
    fn append(&mut self, ref_id: &Cursor, tracking: &str, maxlen: usize) -> Result<Cursor>;

    /// Reachability check done once at startup.
    fn ping(&mut self) -> Result<()>;
}

impl<S: FrameSource + ?Sized> FrameSource for &mut S {
    fn read_after(
        &mut self,
        after: &Cursor,
        timeout: Duration,
    ) -> Result<Option<(Cursor, Result<FrameRecord>)>> {
        (**self).read_after(after, timeout)
    }
}

impl<S: TrackSink + ?Sized> TrackSink for &mut S {
    fn append(&mut self, ref_id: &Cursor, tracking: &str, maxlen: usize) -> Result<Cursor> {
        (**self).append(ref_id, tracking, maxlen)
    }

    fn ping(&mut self) -> Result<()> {
        (**self).ping()
    }
}
