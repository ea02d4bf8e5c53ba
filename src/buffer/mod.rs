//! Bufferizable containers.
//!
//! A bufferizable value can be flattened into a contiguous byte buffer and rebuilt from one,
//! either by copying ([`Bufferizable::debufferize`]) or by aliasing the buffer
//! ([`Bufferizable::attach`]) until [`Bufferizable::detach`] is called.
//!
//! # Wire layout
//!
//! - Every value starts at an 8-byte aligned offset.
//! - A [`BVector`] writes its element count as a native-endian `u32`, padded to 8 bytes,
//!   followed by the element payloads produced by its [`Codec`].
//! - Per-element codecs align each element boundary to 8 bytes but never pad after the last
//!   element, so nested values do not waste space.
//!
//! # Errors
//!
//! The only failure the wire contract knows is "the buffer is too small". It is reported as
//! [`SmallBuffer`], which maps to the raw [`SMALL_BUFFER`] sentinel for hosts that speak
//! plain byte counts.

mod bvector;
mod codec;

use std::fmt;

use plain::Plain;

pub use bvector::BVector;
pub(crate) use bvector::{bufferize_items, debufferize_items, items_bufferized_size};
pub use codec::{Codec, ObjectCodec, PlainCodec, StrCodec};

/// Raw sentinel returned in place of a byte count when a buffer is too small.
pub const SMALL_BUFFER: u32 = u32::MAX;

/// Alignment of every value boundary inside a buffer.
pub const ALIGNMENT: u32 = 8;

/// The buffer handed to a bufferize/debufferize/attach call was too small.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SmallBuffer;

impl fmt::Display for SmallBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "buffer too small")
    }
}

impl std::error::Error for SmallBuffer {}

pub type BufResult<T> = Result<T, SmallBuffer>;

/// Collapse a byte-count result into the raw representation used across a C-style boundary.
pub fn into_raw(result: BufResult<u32>) -> u32 {
    result.unwrap_or(SMALL_BUFFER)
}

/// Expand a raw byte count back into a result.
pub fn from_raw(raw: u32) -> BufResult<u32> {
    if raw == SMALL_BUFFER {
        Err(SmallBuffer)
    } else {
        Ok(raw)
    }
}

/// Round `size` up to the next multiple of [`ALIGNMENT`].
#[inline]
pub const fn align(size: u32) -> u32 {
    align_to(size, ALIGNMENT)
}

/// Round `size` up to the next multiple of `to`.
#[inline]
pub const fn align_to(size: u32, to: u32) -> u32 {
    size.div_ceil(to) * to
}

/// Usable capacity of a buffer, as seen by the wire format.
///
/// Buffers larger than the format can address are clamped just below the sentinel.
#[inline]
pub(crate) fn capacity(buf: &[u8]) -> u32 {
    buf.len().min((SMALL_BUFFER - 1) as usize) as u32
}

/// Copy the bytes of a `#[repr(C)]` wire struct to the start of `buf`.
pub(crate) fn write_plain<T: Plain>(raw: &T, buf: &mut [u8]) -> BufResult<u32> {
    // SAFETY: Plain types have no padding-dependent or pointer-carrying state.
    let bytes = unsafe { plain::as_bytes(raw) };
    if (capacity(buf) as usize) < bytes.len() {
        return Err(SmallBuffer);
    }
    buf[..bytes.len()].copy_from_slice(bytes);
    Ok(bytes.len() as u32)
}

/// Read a `#[repr(C)]` wire struct from the start of `buf`.
pub(crate) fn read_plain<T: Plain + Default>(buf: &[u8]) -> BufResult<T> {
    let mut raw = T::default();
    plain::copy_from_bytes(&mut raw, buf).map_err(|_| SmallBuffer)?;
    Ok(raw)
}

/// Serialization contract shared by containers and records.
///
/// The lifetime `'a` is the lifetime of buffers that [`attach`](Bufferizable::attach) may alias.
pub trait Bufferizable<'a> {
    /// Number of bytes [`bufferize`](Bufferizable::bufferize) will report.
    fn bufferized_size(&self) -> u32;

    /// Write `self` into `buf`, returning the number of bytes used.
    ///
    /// Nothing is written when `buf` is too small.
    fn bufferize(&self, buf: &mut [u8]) -> BufResult<u32>;

    /// Replace the contents of `self` with an owned copy of the value stored in `buf`.
    fn debufferize(&mut self, buf: &[u8]) -> BufResult<u32>;

    /// Like [`debufferize`](Bufferizable::debufferize), but may keep referring to `buf` until
    /// [`detach`](Bufferizable::detach) is called. Values without borrowed storage just copy.
    fn attach(&mut self, buf: &'a [u8]) -> BufResult<u32> {
        self.debufferize(buf)
    }

    /// Stop referring to the buffer passed to [`attach`](Bufferizable::attach), copying
    /// whatever is still borrowed.
    fn detach(&mut self) {}
}

/// Heap buffer whose first byte is 8-byte aligned.
///
/// Plain codecs can only alias a buffer without copying when it is aligned for the element
/// type, which `Vec<u8>` does not guarantee.
#[derive(Clone, Debug, Default)]
pub struct AlignedBuf {
    words: Vec<u64>,
    len: usize,
}

impl AlignedBuf {
    /// Zero-filled buffer of `len` bytes.
    pub fn zeroed(len: usize) -> Self {
        Self {
            words: vec![0; len.div_ceil(ALIGNMENT as usize)],
            len,
        }
    }

    /// Buffer sized for `value`, with `value` already bufferized into it.
    pub fn bufferized<'b, T: Bufferizable<'b> + ?Sized>(value: &T) -> BufResult<Self> {
        let mut buf = Self::zeroed(value.bufferized_size() as usize);
        let used = value.bufferize(buf.as_mut_slice())?;
        buf.len = used as usize;
        Ok(buf)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: u64 has no padding and every byte pattern is valid.
        let bytes = unsafe { plain::as_bytes(self.words.as_slice()) };
        &bytes[..self.len]
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: u64 is Plain, any byte pattern written through the slice is a valid u64.
        let bytes = unsafe { plain::as_mut_bytes(self.words.as_mut_slice()) };
        &mut bytes[..self.len]
    }
}
