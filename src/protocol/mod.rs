//! Protocol module - wire format, framing, and frame types.
//!
//! This module implements the binary framing used on the IPC socket:
//! - 8-byte header encoding/decoding
//! - Frame reader for bodies that arrive across several ticks
//! - Frame struct with typed accessors

mod frame;
mod frame_reader;
mod wire_format;

pub use frame::Frame;
pub use frame_reader::FrameReader;
pub(crate) use wire_format::finish_frame;
pub use wire_format::{
    encode_frame, Header, Opcode, HEADER_SIZE, MAX_FRAME_SIZE, MAX_PAYLOAD_SIZE, RPC_VERSION,
};
