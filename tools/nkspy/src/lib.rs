//! Host-side utilities for nanok scheduling traces.
//!
//! The target drains its trace ring buffer over whatever link the board
//! has. This crate splits the byte stream back into HDLC frames, checks
//! them, and turns them into typed events that frontends can print or
//! forward.

mod decoder;
mod formatter;
mod interpreter;

pub use decoder::{DecodeError, HdlcDecoder, TraceFrame};
pub use formatter::RecordFormatter;
pub use interpreter::{Event, FrameInterpreter, TraceRecord};
