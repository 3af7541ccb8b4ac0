//! Trace ring buffer with HDLC framing.
//!
//! Frame layout before byte stuffing:
//! `seq, kind, ts[0..4], payload.., checksum` followed by an unstuffed
//! `FLAG`. The checksum is the complement of the byte sum of everything
//! between the flags.

use crate::record::RecordKind;

/// HDLC protocol constants
pub mod hdlc {
    /// HDLC flag byte (frame delimiter)
    pub const FLAG: u8 = 0x7E;
    /// HDLC escape byte
    pub const ESC: u8 = 0x7D;
    /// XOR mask for escaped bytes
    pub const ESC_XOR: u8 = 0x20;
}

/// Largest payload a single record may carry
pub const MAX_PAYLOAD: usize = 48;

/// Worst case: every byte stuffed, plus the closing flag
const MAX_FRAME: usize = 2 * (2 + 4 + MAX_PAYLOAD + 1) + 1;

pub struct TraceBuffer<const N: usize> {
    /// Ring buffer storage
    data: [u8; N],
    /// Write index (head)
    head: usize,
    /// Read index (tail)
    tail: usize,
    /// Number of bytes in buffer
    used: usize,
    /// Sequence number, advanced for dropped frames too so the host sees
    /// the gap
    sequence: u8,
    /// One bit per record kind
    filter: u64,
    /// Frames that did not fit
    dropped: u32,
}

impl<const N: usize> TraceBuffer<N> {
    pub const fn new() -> Self {
        Self {
            data: [0; N],
            head: 0,
            tail: 0,
            used: 0,
            sequence: 0,
            filter: u64::MAX,
            dropped: 0,
        }
    }

    /// Empty the buffer and reset sequence, filter and drop count
    pub fn init(&mut self) {
        self.head = 0;
        self.tail = 0;
        self.used = 0;
        self.sequence = 0;
        self.filter = u64::MAX;
        self.dropped = 0;
    }

    pub fn set_filter(&mut self, kind: RecordKind, enable: bool) {
        if enable {
            self.filter |= kind.mask();
        } else {
            self.filter &= !kind.mask();
        }
    }

    pub fn set_filter_mask(&mut self, mask: u64) {
        self.filter = mask;
    }

    pub fn passes(&self, kind: RecordKind) -> bool {
        kind.is_non_maskable() || self.filter & kind.mask() != 0
    }

    /// Frame and store one record. Returns false if it was filtered out or
    /// did not fit.
    pub fn record(&mut self, kind: RecordKind, timestamp: u32, payload: &[u8]) -> bool {
        if !self.passes(kind) {
            return false;
        }
        if payload.len() > MAX_PAYLOAD {
            self.drop_frame();
            return false;
        }

        let mut frame = heapless::Vec::<u8, MAX_FRAME>::new();
        let ts = timestamp.to_le_bytes();

        let mut checksum = self.sequence.wrapping_add(kind as u8);
        for &byte in ts.iter().chain(payload) {
            checksum = checksum.wrapping_add(byte);
        }
        checksum = !checksum;

        stuff(&mut frame, self.sequence);
        stuff(&mut frame, kind as u8);
        for &byte in ts.iter().chain(payload) {
            stuff(&mut frame, byte);
        }
        stuff(&mut frame, checksum);
        let _ = frame.push(hdlc::FLAG);

        // whole frames only: a torn frame would desynchronize the host
        if frame.len() > self.free() {
            self.drop_frame();
            return false;
        }
        for &byte in frame.iter() {
            self.write_byte(byte);
        }
        self.sequence = self.sequence.wrapping_add(1);
        true
    }

    /// Non-maskable record describing the target
    pub fn target_info(&mut self, version: &str, target: &str, max_contexts: u8) -> bool {
        let mut payload = heapless::Vec::<u8, MAX_PAYLOAD>::new();
        let word = core::mem::size_of::<usize>() as u8;
        let endianness = if cfg!(target_endian = "little") { 0 } else { 1 };

        let fits = push_str(&mut payload, version)
            && payload.push(endianness).is_ok()
            && payload.push(word).is_ok()
            && payload.push(max_contexts).is_ok()
            && push_str(&mut payload, target);
        if !fits {
            self.drop_frame();
            return false;
        }
        self.record(RecordKind::TargetInfo, 0, &payload)
    }

    /// Read available bytes from buffer
    pub fn read(&mut self, buf: &mut [u8]) -> usize {
        let mut n = 0;
        while n < buf.len() && self.used > 0 {
            buf[n] = self.data[self.tail];
            self.tail = (self.tail + 1) % N;
            self.used -= 1;
            n += 1;
        }
        n
    }

    /// Get number of bytes available to read
    pub fn available(&self) -> usize {
        self.used
    }

    pub fn free(&self) -> usize {
        N - self.used
    }

    pub fn dropped(&self) -> u32 {
        self.dropped
    }

    pub fn sequence(&self) -> u8 {
        self.sequence
    }

    fn drop_frame(&mut self) {
        self.dropped = self.dropped.saturating_add(1);
        self.sequence = self.sequence.wrapping_add(1);
    }

    fn write_byte(&mut self, byte: u8) {
        self.data[self.head] = byte;
        self.head = (self.head + 1) % N;
        self.used += 1;
    }
}

impl<const N: usize> Default for TraceBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

fn stuff(frame: &mut heapless::Vec<u8, MAX_FRAME>, byte: u8) {
    if byte == hdlc::FLAG || byte == hdlc::ESC {
        let _ = frame.push(hdlc::ESC);
        let _ = frame.push(byte ^ hdlc::ESC_XOR);
    } else {
        let _ = frame.push(byte);
    }
}

fn push_str(out: &mut heapless::Vec<u8, MAX_PAYLOAD>, s: &str) -> bool {
    out.extend_from_slice(s.as_bytes()).is_ok() && out.push(0).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain<const N: usize>(buf: &mut TraceBuffer<N>) -> heapless::Vec<u8, N> {
        let mut out = [0u8; N];
        let n = buf.read(&mut out);
        heapless::Vec::from_slice(&out[..n]).unwrap()
    }

    #[test]
    fn frame_layout_and_checksum() {
        let mut buf: TraceBuffer<64> = TraceBuffer::new();
        assert!(buf.record(RecordKind::Block, 0x0403_0201, &[5]));

        let bytes = drain(&mut buf);
        let sum = 0u8
            .wrapping_add(RecordKind::Block as u8)
            .wrapping_add(1 + 2 + 3 + 4 + 5);
        assert_eq!(
            bytes.as_slice(),
            &[0, RecordKind::Block as u8, 1, 2, 3, 4, 5, !sum, hdlc::FLAG]
        );
        assert_eq!(buf.sequence(), 1);
    }

    #[test]
    fn flag_and_escape_bytes_are_stuffed() {
        let mut buf: TraceBuffer<64> = TraceBuffer::new();
        assert!(buf.record(RecordKind::Ready, 0, &[hdlc::FLAG, hdlc::ESC]));

        let bytes = drain(&mut buf);
        let body = &bytes[..bytes.len() - 1];
        assert!(!body.contains(&hdlc::FLAG));
        assert!(bytes
            .windows(2)
            .any(|w| w == [hdlc::ESC, hdlc::FLAG ^ hdlc::ESC_XOR]));
        assert!(bytes
            .windows(2)
            .any(|w| w == [hdlc::ESC, hdlc::ESC ^ hdlc::ESC_XOR]));
        assert_eq!(bytes.last(), Some(&hdlc::FLAG));
    }

    #[test]
    fn filtered_kind_is_skipped_but_non_maskable_passes() {
        let mut buf: TraceBuffer<128> = TraceBuffer::new();
        buf.set_filter_mask(0);
        assert!(!buf.record(RecordKind::Swap, 0, &[1, 2, 0]));
        assert_eq!(buf.available(), 0);
        assert_eq!(buf.dropped(), 0);

        assert!(buf.target_info("0.1.0", "sim", 16));
        assert!(buf.available() > 0);

        buf.set_filter(RecordKind::Swap, true);
        assert!(buf.passes(RecordKind::Swap));
        assert!(!buf.passes(RecordKind::Ready));
    }

    #[test]
    fn full_buffer_drops_whole_frames() {
        let mut buf: TraceBuffer<16> = TraceBuffer::new();
        assert!(buf.record(RecordKind::Idle, 0, &[]));
        let first = buf.available();
        assert_eq!(first, 8);

        assert!(!buf.record(RecordKind::Latency, 0, &[0; 12]));
        assert_eq!(buf.available(), first);
        assert_eq!(buf.dropped(), 1);
        // the gap shows up in the sequence numbers
        assert_eq!(buf.sequence(), 2);
    }

    #[test]
    fn reads_wrap_around_the_ring() {
        let mut buf: TraceBuffer<12> = TraceBuffer::new();
        let mut out = [0u8; 12];
        for _ in 0..5 {
            assert!(buf.record(RecordKind::Idle, 0, &[]));
            assert_eq!(buf.read(&mut out), 8);
            assert_eq!(out[7], hdlc::FLAG);
        }
        assert_eq!(buf.available(), 0);
    }
}
