use crate::error::{Error, Result};

use std::cmp::Ordering;
use std::fmt;

/// Position in an append-only stream, `"<millis>-<seq>"`. The origin `"0"`
/// precedes every entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Cursor(String);

impl Cursor {
    pub fn origin() -> Self {
        Cursor("0".to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Cursor(id.into())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric `(millis, seq)` form; a bare number has sequence 0.
    pub fn parts(&self) -> Option<(u64, u64)> {
        match self.0.split_once('-') {
            Some((ms, seq)) => Some((ms.parse().ok()?, seq.parse().ok()?)),
            None => Some((self.0.parse().ok()?, 0)),
        }
    }
}

impl Default for Cursor {
    fn default() -> Self {
        Self::origin()
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialOrd for Cursor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.parts()?.cmp(&other.parts()?))
    }
}

/// Undecoded record read from the input log.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameRecord {
    pub frame_id: u64,
    pub image: Vec<u8>,
}

impl FrameRecord {
    /// Parses the `frameId` text field.
    pub fn from_fields(frame_id: Option<&[u8]>, image: Option<Vec<u8>>) -> Result<Self> {
        let frame_id = frame_id.ok_or_else(|| Error::MalformedRecord("missing frameId".into()))?;
        let frame_id = std::str::from_utf8(frame_id)
            .ok()
            .and_then(|text| text.trim().parse().ok())
            .ok_or_else(|| {
                Error::MalformedRecord(format!(
                    "frameId is not an integer: {:?}",
                    String::from_utf8_lossy(frame_id)
                ))
            })?;
        let image = image.ok_or_else(|| Error::MalformedRecord("missing image".into()))?;

        Ok(Self { frame_id, image })
    }

    /// Stream restart marker.
    #[inline]
    pub fn is_restart(&self) -> bool {
        self.frame_id == 0
    }

    pub fn decode(&self) -> Result<Frame> {
        let image = image::load_from_memory(&self.image)?;

        Ok(Frame {
            frame_id: self.frame_id,
            dims: (image.width(), image.height()),
            image,
        })
    }
}

/// Decoded frame handed to models.
pub struct Frame {
    pub frame_id: u64,
    pub dims: (u32, u32),
    pub image: image::DynamicImage,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbImage::new(width, height);
        let mut buf = std::io::Cursor::new(Vec::new());
        img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    #[test]
    fn cursor_ordering() {
        assert!(Cursor::origin() < Cursor::new("1-0"));
        assert!(Cursor::new("5-1") < Cursor::new("5-2"));
        assert!(Cursor::new("10-0") > Cursor::new("9-99"));
        assert_eq!(Cursor::new("abc").partial_cmp(&Cursor::origin()), None);
    }

    #[test]
    fn parses_frame_fields() {
        let rec = FrameRecord::from_fields(Some(&b"42"[..]), Some(vec![1, 2])).unwrap();
        assert_eq!(rec.frame_id, 42);
        assert!(!rec.is_restart());

        let rec = FrameRecord::from_fields(Some(&b"0"[..]), Some(vec![])).unwrap();
        assert!(rec.is_restart());
    }

    #[test]
    fn rejects_bad_frame_fields() {
        assert!(matches!(
            FrameRecord::from_fields(Some(&b"x1"[..]), Some(vec![])),
            Err(Error::MalformedRecord(_))
        ));
        assert!(matches!(
            FrameRecord::from_fields(None, Some(vec![])),
            Err(Error::MalformedRecord(_))
        ));
        assert!(matches!(
            FrameRecord::from_fields(Some(&b"1"[..]), None),
            Err(Error::MalformedRecord(_))
        ));
    }

    #[test]
    fn decodes_png_payload() {
        let rec = FrameRecord {
            frame_id: 3,
            image: png(8, 6),
        };
        let frame = rec.decode().unwrap();
        assert_eq!(frame.frame_id, 3);
        assert_eq!(frame.dims, (8, 6));
    }

    #[test]
    fn garbage_payload_fails_decode() {
        let rec = FrameRecord {
            frame_id: 1,
            image: vec![0, 1, 2, 3],
        };
        assert!(matches!(rec.decode(), Err(Error::ImageDecode(_))));
    }
}
