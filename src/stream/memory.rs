use super::{FrameSource, TrackSink};
use crate::circular_queue::CircularQueue;
use crate::error::{Error, Result};
use crate::frame::{Cursor, FrameRecord};

use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct StreamEntry {
    pub id: Cursor,
    pub fields: Vec<(String, Vec<u8>)>,
}

impl StreamEntry {
    pub fn get(&self, field: &str) -> Option<&[u8]> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value.as_slice())
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        std::str::from_utf8(self.get(field)?).ok()
    }
}

/// Process-local stream with Redis stream semantics: entry ids `"<n>-0"`
/// increase monotonically and appends trim the oldest entries first.
#[derive(Debug, Clone)]
pub struct MemoryStream {
    entries: CircularQueue<StreamEntry>,
    seq: u64,
}

impl Default for MemoryStream {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStream {
    pub fn new() -> Self {
        Self {
            entries: CircularQueue::with_capacity(usize::MAX),
            seq: 0,
        }
    }

    pub fn add(&mut self, fields: Vec<(String, Vec<u8>)>) -> Cursor {
        self.seq += 1;
        let id = Cursor::new(format!("{}-0", self.seq));
        self.entries.push(StreamEntry {
            id: id.clone(),
            fields,
        });

        id
    }

    /// Appends a frame record the way the capture side writes it.
    pub fn add_frame(&mut self, frame_id: u64, image: Vec<u8>) -> Cursor {
        self.add(vec![
            ("frameId".to_string(), frame_id.to_string().into_bytes()),
            ("image".to_string(), image),
        ])
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Oldest first.
    pub fn entries(&self) -> impl Iterator<Item = &StreamEntry> {
        self.entries.iter()
    }
}

impl FrameSource for MemoryStream {
    fn read_after(
        &mut self,
        after: &Cursor,
        _timeout: Duration,
    ) -> Result<Option<(Cursor, Result<FrameRecord>)>> {
        if after.parts().is_none() {
            return Err(Error::MalformedRecord(format!("invalid cursor `{}`", after)));
        }

        let next = self
            .entries
            .iter()
            .find(|entry| entry.id.partial_cmp(after) == Some(std::cmp::Ordering::Greater));

        Ok(next.map(|entry| {
            let record = FrameRecord::from_fields(
                entry.get("frameId"),
                entry.get("image").map(<[u8]>::to_vec),
            );
            (entry.id.clone(), record)
        }))
    }
}

impl TrackSink for MemoryStream {
    fn append(&mut self, ref_id: &Cursor, tracking: &str, maxlen: usize) -> Result<Cursor> {
        self.entries.set_capacity(maxlen);

        Ok(self.add(vec![
            ("refId".to_string(), ref_id.as_str().as_bytes().to_vec()),
            ("tracking".to_string(), tracking.as_bytes().to_vec()),
        ]))
    }

    fn ping(&mut self) -> Result<()> {
        Ok(())
    }
}
