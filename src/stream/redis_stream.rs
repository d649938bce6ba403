use super::{FrameSource, TrackSink};
use crate::error::{Error, Result};
use crate::frame::{Cursor, FrameRecord};

use ::redis::streams::{StreamMaxlen, StreamReadOptions, StreamReadReply};
use ::redis::{Client, Commands, Connection, ConnectionLike, RedisResult};
use std::time::Duration;

/// How `XADD` trims the output stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Trim {
    /// `MAXLEN = n`, the stream never exceeds `n` entries.
    #[default]
    Exact,
    /// `MAXLEN ~ n`, Redis may keep a few more entries.
    Approximate,
}

/// Redis client bound to an input and an output stream key.
///
/// The connection is dropped after a transport failure and re-established
/// on the next command.
pub struct RedisStream {
    client: Client,
    conn: Option<Connection>,
    input_key: String,
    output_key: String,
    trim: Trim,
}

impl RedisStream {
    /// Connects eagerly, so an unreachable server fails here.
    pub fn connect(url: &str, input_key: &str, output_key: &str, trim: Trim) -> Result<Self> {
        let client = Client::open(url)?;
        let conn = client.get_connection()?;

        Ok(Self {
            client,
            conn: Some(conn),
            input_key: input_key.to_string(),
            output_key: output_key.to_string(),
            trim,
        })
    }

    #[inline]
    pub fn is_connected(&self) -> bool {
        self.conn.as_ref().map_or(false, |conn| conn.is_open())
    }

    fn connection<'a>(
        client: &Client,
        slot: &'a mut Option<Connection>,
    ) -> Result<&'a mut Connection> {
        if !slot.as_ref().map_or(false, |conn| conn.is_open()) {
            *slot = None;
            tracing::info!("reconnecting to Redis");
            *slot = Some(client.get_connection()?);
        }

        slot.as_mut()
            .ok_or_else(|| Error::Transport("no Redis connection".into()))
    }

    fn settle<T>(slot: &mut Option<Connection>, result: RedisResult<T>) -> Result<T> {
        result.map_err(|err| {
            let err = Error::from(err);
            if err.is_transport() {
                *slot = None;
            }
            err
        })
    }
}

impl FrameSource for RedisStream {
    fn read_after(
        &mut self,
        after: &Cursor,
        timeout: Duration,
    ) -> Result<Option<(Cursor, Result<FrameRecord>)>> {
        let mut opts = StreamReadOptions::default().count(1);
        // BLOCK 0 waits forever, a zero timeout polls instead
        if !timeout.is_zero() {
            opts = opts.block(timeout.as_millis().max(1) as usize);
        }

        let conn = Self::connection(&self.client, &mut self.conn)?;
        let result = conn.xread_options(&[&self.input_key], &[after.as_str()], &opts);
        let reply: Option<StreamReadReply> = Self::settle(&mut self.conn, result)?;

        let entry = reply
            .into_iter()
            .flat_map(|reply| reply.keys)
            .flat_map(|key| key.ids)
            .next();

        Ok(entry.map(|entry| {
            let frame_id: Option<Vec<u8>> = entry.get("frameId");
            let record = FrameRecord::from_fields(frame_id.as_deref(), entry.get("image"));
            (Cursor::new(entry.id), record)
        }))
    }
}

impl TrackSink for RedisStream {
    fn append(&mut self, ref_id: &Cursor, tracking: &str, maxlen: usize) -> Result<Cursor> {
        let maxlen = match self.trim {
            Trim::Exact => StreamMaxlen::Equals(maxlen),
            Trim::Approximate => StreamMaxlen::Approx(maxlen),
        };

        let conn = Self::connection(&self.client, &mut self.conn)?;
        let result = conn.xadd_maxlen(
            &self.output_key,
            maxlen,
            "*",
            &[("refId", ref_id.as_str()), ("tracking", tracking)],
        );
        let id: String = Self::settle(&mut self.conn, result)?;

        Ok(Cursor::new(id))
    }

    fn ping(&mut self) -> Result<()> {
        let conn = Self::connection(&self.client, &mut self.conn)?;
        let result = ::redis::cmd("PING").query(conn);
        let pong: String = Self::settle(&mut self.conn, result)?;

        if pong == "PONG" {
            Ok(())
        } else {
            Err(Error::Transport(format!("unexpected PING reply `{}`", pong)))
        }
    }
}
