use crate::EngineError;
use cache_utils::CACHE_LINE_LEN;
use core::ops::Range;
use core::ptr;

/// Size of the array the victim is allowed to read.
pub const LEGITIMATE_LEN: usize = 160;
/// Logical size checked by the victim.
pub const LEGITIMATE_BOUND: usize = 16;

pub const DEFAULT_SECRET: &str = "The Magic Words are Squeamish Ossifrage.";

#[repr(align(64))]
#[derive(Debug)]
struct Bound(usize);

/// The victim's data: a legitimate array, a line of padding, then the secret.
///
/// Everything lives in one allocation, so every read the victim can make,
/// architectural or transient, stays inside it. Only the logical bound is
/// violated. The bound has a line to itself so it can be flushed alone.
#[derive(Debug)]
pub struct VictimMemory {
    bytes: Box<[u8]>,
    bound: Box<Bound>,
    secret_offset: usize,
    secret_len: usize,
}

impl VictimMemory {
    pub fn new(secret: &[u8]) -> Result<Self, EngineError> {
        if secret.is_empty() {
            return Err(EngineError::EmptySecret);
        }
        let secret_offset = LEGITIMATE_LEN.next_multiple_of(CACHE_LINE_LEN) + CACHE_LINE_LEN;
        let mut bytes = vec![0u8; secret_offset + secret.len()];
        for (i, b) in bytes[..LEGITIMATE_BOUND].iter_mut().enumerate() {
            *b = i as u8 + 1;
        }
        bytes[secret_offset..].copy_from_slice(secret);
        Ok(VictimMemory {
            bytes: bytes.into_boxed_slice(),
            bound: Box::new(Bound(LEGITIMATE_BOUND)),
            secret_offset,
            secret_len: secret.len(),
        })
    }

    /// Read from memory every time, the victim flushes it beforehand.
    pub fn bound(&self) -> usize {
        unsafe { ptr::read_volatile(&self.bound.0) }
    }

    pub fn bound_ptr(&self) -> *const u8 {
        &self.bound.0 as *const usize as *const u8
    }

    pub fn legitimate(&self, index: usize) -> u8 {
        self.bytes[index % LEGITIMATE_LEN]
    }

    /// Any byte of the allocation, regardless of the bound.
    pub fn byte(&self, index: usize) -> Option<u8> {
        self.bytes.get(index).copied()
    }

    pub(crate) fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn secret_offset(&self) -> usize {
        self.secret_offset
    }

    pub fn secret(&self) -> &[u8] {
        &self.bytes[self.secret_offset..]
    }

    pub fn secret_len(&self) -> usize {
        self.secret_len
    }

    /// Out-of-bounds offsets of the secret bytes, in order.
    pub fn target_offsets(&self) -> Range<usize> {
        self.secret_offset..self.secret_offset + self.secret_len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout() {
        let memory = VictimMemory::new(b"AB").unwrap();
        assert_eq!(memory.bound(), LEGITIMATE_BOUND);
        assert_eq!(memory.legitimate(0), 1);
        assert_eq!(memory.legitimate(15), 16);
        assert_eq!(memory.legitimate(16), 0);
        assert!(memory.secret_offset() >= LEGITIMATE_LEN + CACHE_LINE_LEN);
        assert_eq!(memory.secret(), b"AB");
        let offsets: Vec<usize> = memory.target_offsets().collect();
        assert_eq!(offsets, vec![memory.secret_offset(), memory.secret_offset() + 1]);
        assert_eq!(memory.byte(memory.secret_offset() + 1), Some(b'B'));
        assert_eq!(memory.byte(memory.secret_offset() + 2), None);
    }

    #[test]
    fn bound_has_its_own_line() {
        let memory = VictimMemory::new(b"x").unwrap();
        assert_eq!(memory.bound_ptr() as usize % CACHE_LINE_LEN, 0);
    }

    #[test]
    fn empty_secret() {
        assert!(matches!(VictimMemory::new(b""), Err(EngineError::EmptySecret)));
    }
}
