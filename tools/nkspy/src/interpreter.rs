use nanok_trace::{RecordKind, SwapReason, NONE};
use serde::Serialize;

use crate::TraceFrame;

/// A decoded scheduling event. Context references are arena slot indices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    Swap { from: u8, to: u8, reason: &'static str },
    Preempt { from: u8, to: u8 },
    Ready { ctx: u8, priority: u8 },
    Block { ctx: u8 },
    TaskSet { ctx: Option<u8> },
    Create { ctx: u8, priority: u8, flags: u16 },
    Terminate { ctx: u8 },
    IsrEnter { nesting: u8 },
    IsrExit { nesting: u8, switched: bool },
    Idle,
    Latency { max: u32, min: u32, samples: u32 },
    Fatal { reason: &'static str },
    TargetInfo {
        version: String,
        little_endian: bool,
        word_size: u8,
        max_contexts: u8,
        target: String,
    },
    /// Unknown kind or a payload that does not match its kind
    Raw { kind: u8, payload: Vec<u8> },
}

impl Event {
    pub fn kind(&self) -> Option<RecordKind> {
        Some(match self {
            Event::Swap { .. } => RecordKind::Swap,
            Event::Preempt { .. } => RecordKind::Preempt,
            Event::Ready { .. } => RecordKind::Ready,
            Event::Block { .. } => RecordKind::Block,
            Event::TaskSet { .. } => RecordKind::TaskSet,
            Event::Create { .. } => RecordKind::Create,
            Event::Terminate { .. } => RecordKind::Terminate,
            Event::IsrEnter { .. } => RecordKind::IsrEnter,
            Event::IsrExit { .. } => RecordKind::IsrExit,
            Event::Idle => RecordKind::Idle,
            Event::Latency { .. } => RecordKind::Latency,
            Event::Fatal { .. } => RecordKind::Fatal,
            Event::TargetInfo { .. } => RecordKind::TargetInfo,
            Event::Raw { kind, .. } => return RecordKind::from_u8(*kind),
        })
    }
}

/// One frame, interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceRecord {
    pub seq: u8,
    pub timestamp: u32,
    /// Frames the target dropped right before this one
    #[serde(skip_serializing_if = "is_zero")]
    pub lost: u8,
    #[serde(flatten)]
    pub event: Event,
}

fn is_zero(n: &u8) -> bool {
    *n == 0
}

/// Turns frames into events and keeps track of sequence gaps.
#[derive(Debug, Default)]
pub struct FrameInterpreter {
    next_seq: Option<u8>,
    lost: u64,
    running: Option<u8>,
}

impl FrameInterpreter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn interpret(&mut self, frame: &TraceFrame) -> TraceRecord {
        let event = decode(frame.kind, &frame.payload);

        let lost = match self.next_seq {
            // a target reset restarts the sequence
            _ if matches!(event, Event::TargetInfo { .. }) => 0,
            Some(expected) => frame.seq.wrapping_sub(expected),
            None => 0,
        };
        self.lost += u64::from(lost);
        self.next_seq = Some(frame.seq.wrapping_add(1));

        match &event {
            Event::Swap { to, .. } | Event::Preempt { to, .. } => self.running = Some(*to),
            Event::TargetInfo { .. } => self.running = None,
            _ => {}
        }

        TraceRecord {
            seq: frame.seq,
            timestamp: frame.timestamp,
            lost,
            event,
        }
    }

    /// Frames lost since the stream started
    pub fn lost(&self) -> u64 {
        self.lost
    }

    /// Context that was switched in last
    pub fn running(&self) -> Option<u8> {
        self.running
    }
}

fn decode(kind: u8, payload: &[u8]) -> Event {
    let raw = || Event::Raw {
        kind,
        payload: payload.to_vec(),
    };
    let Some(record) = RecordKind::from_u8(kind) else {
        return raw();
    };
    let mut cur = Cursor::new(payload);

    let event = match record {
        RecordKind::Swap => (|| {
            let (from, to, reason) = (cur.read_u8()?, cur.read_u8()?, cur.read_u8()?);
            let reason = SwapReason::from_u8(reason).map_or("unknown", SwapReason::name);
            Some(Event::Swap { from, to, reason })
        })(),
        RecordKind::Preempt => (|| {
            Some(Event::Preempt { from: cur.read_u8()?, to: cur.read_u8()? })
        })(),
        RecordKind::Ready => (|| {
            Some(Event::Ready { ctx: cur.read_u8()?, priority: cur.read_u8()? })
        })(),
        RecordKind::Block => cur.read_u8().map(|ctx| Event::Block { ctx }),
        RecordKind::TaskSet => cur.read_u8().map(|ctx| Event::TaskSet {
            ctx: (ctx != NONE).then_some(ctx),
        }),
        RecordKind::Create => (|| {
            Some(Event::Create {
                ctx: cur.read_u8()?,
                priority: cur.read_u8()?,
                flags: cur.read_u16()?,
            })
        })(),
        RecordKind::Terminate => cur.read_u8().map(|ctx| Event::Terminate { ctx }),
        RecordKind::IsrEnter => cur.read_u8().map(|nesting| Event::IsrEnter { nesting }),
        RecordKind::IsrExit => (|| {
            Some(Event::IsrExit { nesting: cur.read_u8()?, switched: cur.read_u8()? != 0 })
        })(),
        RecordKind::Idle => Some(Event::Idle),
        RecordKind::Latency => (|| {
            Some(Event::Latency {
                max: cur.read_u32()?,
                min: cur.read_u32()?,
                samples: cur.read_u32()?,
            })
        })(),
        RecordKind::Fatal => cur.read_u8().map(|code| Event::Fatal { reason: fatal_reason(code) }),
        RecordKind::TargetInfo => (|| {
            Some(Event::TargetInfo {
                version: cur.read_c_string()?,
                little_endian: cur.read_u8()? == 0,
                word_size: cur.read_u8()?,
                max_contexts: cur.read_u8()?,
                target: cur.read_c_string()?,
            })
        })(),
    };
    event.unwrap_or_else(raw)
}

fn fatal_reason(code: u8) -> &'static str {
    match code {
        0 => "contract violation",
        1 => "essential context terminated",
        2 => "CPU exception",
        3 => "spurious interrupt",
        4 => "context entry returned",
        _ => "unknown",
    }
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn read_bytes(&mut self, count: usize) -> Option<&'a [u8]> {
        let slice = self.data.get(self.pos..self.pos + count)?;
        self.pos += count;
        Some(slice)
    }

    fn read_u8(&mut self) -> Option<u8> {
        self.read_bytes(1).map(|b| b[0])
    }

    fn read_u16(&mut self) -> Option<u16> {
        self.read_bytes(2).map(|b| u16::from_le_bytes([b[0], b[1]]))
    }

    fn read_u32(&mut self) -> Option<u32> {
        self.read_bytes(4)
            .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn read_c_string(&mut self) -> Option<String> {
        let remaining = self.data.get(self.pos..)?;
        let end = remaining.iter().position(|&b| b == 0)?;
        self.pos += end + 1;
        Some(String::from_utf8_lossy(&remaining[..end]).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(seq: u8, kind: RecordKind, payload: &[u8]) -> TraceFrame {
        TraceFrame {
            seq,
            kind: kind as u8,
            timestamp: 100,
            payload: payload.to_vec(),
        }
    }

    #[test]
    fn decodes_swap() {
        let mut interp = FrameInterpreter::new();
        let rec = interp.interpret(&frame(0, RecordKind::Swap, &[0, 3, 1]));
        assert_eq!(rec.event, Event::Swap { from: 0, to: 3, reason: "block" });
        assert_eq!(interp.running(), Some(3));
    }

    #[test]
    fn short_payload_falls_back_to_raw() {
        let mut interp = FrameInterpreter::new();
        let rec = interp.interpret(&frame(0, RecordKind::Create, &[2, 4]));
        assert_eq!(
            rec.event,
            Event::Raw { kind: RecordKind::Create as u8, payload: vec![2, 4] }
        );
        assert_eq!(rec.event.kind(), Some(RecordKind::Create));
    }

    #[test]
    fn task_slot_can_be_emptied() {
        let mut interp = FrameInterpreter::new();
        let rec = interp.interpret(&frame(0, RecordKind::TaskSet, &[NONE]));
        assert_eq!(rec.event, Event::TaskSet { ctx: None });
    }

    #[test]
    fn sequence_gaps_count_as_lost() {
        let mut interp = FrameInterpreter::new();
        interp.interpret(&frame(254, RecordKind::Idle, &[]));
        let rec = interp.interpret(&frame(2, RecordKind::Idle, &[]));
        assert_eq!(rec.lost, 3);
        assert_eq!(interp.lost(), 3);

        // target info restarts the count
        let rec = interp.interpret(&frame(0, RecordKind::TargetInfo, b"0.1.0\0\0\x04\x10host\0"));
        assert_eq!(rec.lost, 0);
        assert_eq!(interp.running(), None);
    }
}
