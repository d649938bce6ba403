use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Redis Error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Transport Error: {0}")]
    Transport(String),

    #[error("Not supported bbox shape: (N, {0})")]
    UnsupportedBoxShape(usize),

    #[error("Not supported mask shape: {0}")]
    UnsupportedMaskShape(String),

    #[error("Mask results require an explicit mask shape")]
    MissingMaskShape,

    #[error("Field `{field}` has {got} entries, expected {expected}")]
    LengthMismatch {
        field: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("Consistency score is undefined for an empty reference track set")]
    EmptyReference,

    #[error("Frame {got} stepped after frame {last}")]
    FrameOrder { last: u64, got: u64 },

    #[error("Track set with {0} boxes carries no identities")]
    MissingIdentities(usize),

    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    #[error("Image decode Error: {0}")]
    ImageDecode(#[from] image::ImageError),

    #[error("Json Error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Failures of the input/output logs themselves, as opposed to bad data.
    pub fn is_transport(&self) -> bool {
        match self {
            Error::Transport(_) => true,
            Error::Redis(err) => {
                err.is_io_error()
                    || err.is_connection_dropped()
                    || err.is_connection_refusal()
                    || err.is_timeout()
                    || matches!(
                        err.kind(),
                        redis::ErrorKind::BusyLoadingError | redis::ErrorKind::TryAgain
                    )
            }
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_classification() {
        assert!(Error::Transport("gone".into()).is_transport());
        assert!(!Error::EmptyReference.is_transport());
        assert!(!Error::UnsupportedBoxShape(7).is_transport());

        let io = redis::RedisError::from(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "reset",
        ));
        assert!(Error::Redis(io).is_transport());

        let loading = redis::RedisError::from((redis::ErrorKind::BusyLoadingError, "loading"));
        assert!(Error::Redis(loading).is_transport());

        let wrong_type = redis::RedisError::from((redis::ErrorKind::TypeError, "bad reply"));
        assert!(!Error::Redis(wrong_type).is_transport());
    }

    #[test]
    fn shape_error_names_the_width() {
        assert_eq!(
            Error::UnsupportedBoxShape(7).to_string(),
            "Not supported bbox shape: (N, 7)"
        );
    }
}
