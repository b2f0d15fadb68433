use thiserror::Error;

#[derive(Error, Debug)]
pub enum StompError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid UTF-8 in frame: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Malformed header line: {0}")]
    MalformedHeader(String),

    #[error("Invalid escape sequence \\{0} in header")]
    InvalidEscape(char),

    #[error("Invalid content-length: {0}")]
    InvalidContentLength(String),

    #[error("Frame body is not NUL-terminated")]
    MissingNul,

    #[error("Frame of {len} bytes exceeds the {max} byte limit")]
    FrameTooLarge { len: usize, max: usize },

    #[error("Invalid heart-beat header: {0}")]
    InvalidHeartBeat(String),
}
