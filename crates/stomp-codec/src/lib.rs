//! STOMP 1.2 framing.
//!
//! Frames are modelled by [`Frame`] and moved on and off the wire by [`StompCodec`],
//! a `tokio_util` codec. Heart-beat EOLs between frames decode as
//! [`StompItem::Heartbeat`].

pub mod codec;
pub mod error;
pub mod frame;

pub use crate::{
    codec::{HEARTBEAT, StompCodec, StompItem},
    error::StompError,
    frame::{Command, Frame, HeartBeat},
};
use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

pub fn encode_frame(frame: Frame) -> Result<BytesMut, StompError> {
    let mut codec = StompCodec::default();
    let mut dst = BytesMut::new();
    codec.encode(frame, &mut dst)?;
    Ok(dst)
}

pub fn decode_item(src: &mut BytesMut) -> Result<Option<StompItem>, StompError> {
    let mut codec = StompCodec::default();
    codec.decode(src)
}
