//! Per-element bufferization strategies used by [`BVector`](super::BVector).

use std::borrow::Cow;
use std::marker::PhantomData;
use std::mem;

use plain::Plain;
use tracing::debug;

use super::{align, capacity, BufResult, Bufferizable, SmallBuffer, ALIGNMENT, SMALL_BUFFER};

/// Strategy that bufferizes a run of `count` elements.
///
/// Element boundaries are 8-byte aligned, except that nothing is padded after the last
/// element. The byte counts returned never include trailing padding.
pub trait Codec<'a> {
    type Item: Clone + 'a;

    fn bufferized_size(items: &[Self::Item]) -> u32;

    fn bufferize(items: &[Self::Item], buf: &mut [u8]) -> BufResult<u32>;

    /// Decode `count` elements into owned storage.
    fn debufferize(count: usize, buf: &[u8]) -> BufResult<(Vec<Self::Item>, u32)>;

    /// Decode `count` elements, borrowing from `buf` where the element type allows it.
    fn attach(count: usize, buf: &'a [u8]) -> BufResult<(Cow<'a, [Self::Item]>, u32)>;

    /// Turn everything [`attach`](Codec::attach) borrowed into owned data.
    fn detach(items: &mut Cow<'a, [Self::Item]>);
}

/// Offset of the element following the one that ended at `end`.
#[inline]
fn next_offset(end: u32, index: usize, count: usize) -> u32 {
    if index + 1 != count {
        align(end)
    } else {
        end
    }
}

/// Total size of elements of the given sizes, or `SmallBuffer` if it does not fit the format.
fn checked_total(sizes: impl ExactSizeIterator<Item = u64>) -> BufResult<u32> {
    let count = sizes.len();
    let mut total = 0u64;
    for (i, size) in sizes.enumerate() {
        let end = total.checked_add(size).ok_or(SmallBuffer)?;
        total = if i + 1 != count {
            end.checked_next_multiple_of(u64::from(ALIGNMENT))
                .ok_or(SmallBuffer)?
        } else {
            end
        };
    }
    u32::try_from(total).map_err(|_| SmallBuffer)
}

fn zero_pad(buf: &mut [u8], from: u32, to: u32) {
    buf[from as usize..to as usize].fill(0);
}

/// Flat elements copied byte for byte, like integers or `#[repr(C)]` structs without pointers.
///
/// Elements are packed back to back with no alignment between them. [`attach`](Codec::attach)
/// aliases the buffer without copying when it is aligned for `T`.
pub struct PlainCodec<T>(PhantomData<T>);

impl<T> PlainCodec<T> {
    fn payload_len(count: usize) -> BufResult<u32> {
        count
            .checked_mul(mem::size_of::<T>())
            .and_then(|len| u32::try_from(len).ok())
            .ok_or(SmallBuffer)
    }
}

impl<'a, T> Codec<'a> for PlainCodec<T>
where
    T: Plain + Copy + Default + 'a,
{
    type Item = T;

    fn bufferized_size(items: &[T]) -> u32 {
        Self::payload_len(items.len()).unwrap_or(SMALL_BUFFER)
    }

    fn bufferize(items: &[T], buf: &mut [u8]) -> BufResult<u32> {
        let len = Self::payload_len(items.len())?;
        if len > capacity(buf) {
            return Err(SmallBuffer);
        }
        // SAFETY: T is Plain, so its bytes carry no pointers and no invalid states.
        let bytes = unsafe { plain::as_bytes(items) };
        buf[..len as usize].copy_from_slice(bytes);
        Ok(len)
    }

    fn debufferize(count: usize, buf: &[u8]) -> BufResult<(Vec<T>, u32)> {
        let len = Self::payload_len(count)?;
        if len > capacity(buf) {
            return Err(SmallBuffer);
        }
        let mut items = vec![T::default(); count];
        plain::copy_from_bytes(items.as_mut_slice(), &buf[..len as usize])
            .map_err(|_| SmallBuffer)?;
        Ok((items, len))
    }

    fn attach(count: usize, buf: &'a [u8]) -> BufResult<(Cow<'a, [T]>, u32)> {
        let len = Self::payload_len(count)?;
        if len > capacity(buf) {
            return Err(SmallBuffer);
        }
        match plain::slice_from_bytes_len::<T>(&buf[..len as usize], count) {
            Ok(items) => Ok((Cow::Borrowed(items), len)),
            Err(e) => {
                debug!("Cannot alias buffer ({e:?}), copying {count} elements instead");
                let (items, len) = Self::debufferize(count, buf)?;
                Ok((Cow::Owned(items), len))
            }
        }
    }

    fn detach(items: &mut Cow<'a, [T]>) {
        items.to_mut();
    }
}

/// Strings, each stored as a `u32` length (including a trailing NUL) followed by the bytes and
/// the NUL.
///
/// Attached strings borrow from the buffer; invalid UTF-8 is decoded lossily into an owned
/// string.
pub struct StrCodec;

impl StrCodec {
    const LEN_FIELD: u32 = mem::size_of::<u32>() as u32;

    /// Bytes taken by a string of `len` bytes: length field, text and NUL.
    fn element_size(len: usize) -> u64 {
        u64::from(Self::LEN_FIELD) + len as u64 + 1
    }

    fn payload_size(lens: impl ExactSizeIterator<Item = usize>) -> BufResult<u32> {
        checked_total(lens.map(Self::element_size))
    }

    /// Locate the string starting at `off`, returning its bytes without the NUL and the offset
    /// just past it.
    fn read_at(buf: &[u8], off: u32) -> BufResult<(&[u8], u32)> {
        let cap = capacity(buf);
        if cap < off.saturating_add(Self::LEN_FIELD) {
            return Err(SmallBuffer);
        }
        let start = off as usize;
        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&buf[start..start + 4]);
        let len = u32::from_ne_bytes(len_bytes);
        let end = off
            .checked_add(Self::LEN_FIELD)
            .and_then(|v| v.checked_add(len))
            .ok_or(SmallBuffer)?;
        if cap < end {
            return Err(SmallBuffer);
        }
        let text_start = start + Self::LEN_FIELD as usize;
        let text_end = text_start + len.saturating_sub(1) as usize;
        Ok((&buf[text_start..text_end], end))
    }
}

impl<'a> Codec<'a> for StrCodec {
    type Item = Cow<'a, str>;

    fn bufferized_size(items: &[Cow<'a, str>]) -> u32 {
        Self::payload_size(items.iter().map(|s| s.len())).unwrap_or(SMALL_BUFFER)
    }

    fn bufferize(items: &[Cow<'a, str>], buf: &mut [u8]) -> BufResult<u32> {
        if Self::payload_size(items.iter().map(|s| s.len()))? > capacity(buf) {
            return Err(SmallBuffer);
        }
        // The total fits in u32, so every offset and length below does too.
        let mut off = 0u32;
        for (i, s) in items.iter().enumerate() {
            let start = off as usize;
            let len = u32::try_from(s.len() + 1).map_err(|_| SmallBuffer)?;
            buf[start..start + 4].copy_from_slice(&len.to_ne_bytes());
            let text = start + 4;
            buf[text..text + s.len()].copy_from_slice(s.as_bytes());
            buf[text + s.len()] = 0;
            let end = off + Self::LEN_FIELD + len;
            off = next_offset(end, i, items.len());
            zero_pad(buf, end, off);
        }
        Ok(off)
    }

    fn debufferize(count: usize, buf: &[u8]) -> BufResult<(Vec<Cow<'a, str>>, u32)> {
        let mut items = Vec::with_capacity(count.min(buf.len()));
        let mut off = 0u32;
        for i in 0..count {
            let (text, end) = Self::read_at(buf, off)?;
            items.push(Cow::Owned(String::from_utf8_lossy(text).into_owned()));
            off = next_offset(end, i, count);
        }
        Ok((items, off))
    }

    fn attach(count: usize, buf: &'a [u8]) -> BufResult<(Cow<'a, [Cow<'a, str>]>, u32)> {
        let mut items = Vec::with_capacity(count.min(buf.len()));
        let mut off = 0u32;
        for i in 0..count {
            let (text, end) = Self::read_at(buf, off)?;
            items.push(String::from_utf8_lossy(text));
            off = next_offset(end, i, count);
        }
        Ok((Cow::Owned(items), off))
    }

    fn detach(items: &mut Cow<'a, [Cow<'a, str>]>) {
        for s in items.to_mut() {
            s.to_mut();
        }
    }
}

/// Elements that are themselves [`Bufferizable`], bufferized one after another.
pub struct ObjectCodec<T>(PhantomData<T>);

impl<'a, T: Bufferizable<'a>> ObjectCodec<T> {
    fn payload_size(items: &[T]) -> BufResult<u32> {
        checked_total(items.iter().map(|item| u64::from(item.bufferized_size())))
    }
}

impl<'a, T> Codec<'a> for ObjectCodec<T>
where
    T: Bufferizable<'a> + Clone + Default + 'a,
{
    type Item = T;

    fn bufferized_size(items: &[T]) -> u32 {
        Self::payload_size(items).unwrap_or(SMALL_BUFFER)
    }

    fn bufferize(items: &[T], buf: &mut [u8]) -> BufResult<u32> {
        if Self::payload_size(items)? > capacity(buf) {
            return Err(SmallBuffer);
        }
        let mut off = 0u32;
        for (i, item) in items.iter().enumerate() {
            let end = off + item.bufferize(&mut buf[off as usize..])?;
            off = next_offset(end, i, items.len());
            zero_pad(buf, end, off);
        }
        Ok(off)
    }

    fn debufferize(count: usize, buf: &[u8]) -> BufResult<(Vec<T>, u32)> {
        let mut items = Vec::with_capacity(count.min(buf.len()));
        let mut off = 0u32;
        for i in 0..count {
            if off > capacity(buf) {
                return Err(SmallBuffer);
            }
            let mut item = T::default();
            let end = off + item.debufferize(&buf[off as usize..])?;
            items.push(item);
            off = next_offset(end, i, count);
        }
        Ok((items, off))
    }

    fn attach(count: usize, buf: &'a [u8]) -> BufResult<(Cow<'a, [T]>, u32)> {
        let mut items = Vec::with_capacity(count.min(buf.len()));
        let mut off = 0u32;
        for i in 0..count {
            if off > capacity(buf) {
                return Err(SmallBuffer);
            }
            let mut item = T::default();
            let end = off + item.attach(&buf[off as usize..])?;
            items.push(item);
            off = next_offset(end, i, count);
        }
        Ok((Cow::Owned(items), off))
    }

    fn detach(items: &mut Cow<'a, [T]>) {
        for item in items.to_mut() {
            item.detach();
        }
    }
}
