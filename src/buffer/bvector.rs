use std::borrow::Cow;
use std::fmt;
use std::marker::PhantomData;
use std::ops::Deref;

use super::{align, capacity, BufResult, Bufferizable, Codec, SmallBuffer, ALIGNMENT, SMALL_BUFFER};

/// Bytes taken by the element count at the start of a bufferized vector.
const HEADER_SIZE: u32 = align(std::mem::size_of::<u32>() as u32);

/// Growable array that can be bufferized, with elements encoded by `C`.
///
/// After [`attach`](Bufferizable::attach) the vector may alias the buffer it was attached to;
/// the borrow checker keeps it from outliving that buffer. Mutating an attached vector is a
/// contract violation and panics; call [`detach`](Bufferizable::detach) first.
pub struct BVector<'a, C: Codec<'a>> {
    items: Cow<'a, [C::Item]>,
    attached: bool,
    _codec: PhantomData<C>,
}

impl<'a, C: Codec<'a>> BVector<'a, C> {
    pub fn new() -> Self {
        Self::from(Vec::new())
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self::from(Vec::with_capacity(capacity))
    }

    pub fn count(&self) -> usize {
        self.items.len()
    }

    /// Allocated capacity, at least [`count`](Self::count).
    pub fn capacity(&self) -> usize {
        match &self.items {
            Cow::Borrowed(items) => items.len(),
            Cow::Owned(items) => items.capacity(),
        }
    }

    /// True between [`attach`](Bufferizable::attach) and [`detach`](Bufferizable::detach).
    pub fn is_attached(&self) -> bool {
        self.attached
    }

    /// True when the element storage itself aliases a buffer.
    pub fn is_borrowed(&self) -> bool {
        matches!(self.items, Cow::Borrowed(_))
    }

    pub fn as_slice(&self) -> &[C::Item] {
        &self.items
    }

    pub fn as_mut_slice(&mut self) -> &mut [C::Item] {
        self.owned_mut()
    }

    pub fn push(&mut self, item: C::Item) -> &mut C::Item {
        let items = self.owned_mut();
        items.push(item);
        let last = items.len() - 1;
        &mut items[last]
    }

    pub fn pop(&mut self) -> Option<C::Item> {
        self.owned_mut().pop()
    }

    pub fn reserve(&mut self, additional: usize) {
        self.owned_mut().reserve(additional);
    }

    /// Drop all elements, keeping the allocation.
    pub fn erase(&mut self) {
        self.owned_mut().clear();
    }

    /// Drop all elements and the allocation, returning to the state of [`new`](Self::new).
    pub fn release(&mut self) {
        self.items = Cow::Owned(Vec::new());
        self.attached = false;
    }

    pub fn contains(&self, item: &C::Item) -> bool
    where
        C::Item: PartialEq,
    {
        self.items.contains(item)
    }

    pub fn into_vec(self) -> Vec<C::Item> {
        self.items.into_owned()
    }

    fn owned_mut(&mut self) -> &mut Vec<C::Item> {
        assert!(
            !self.attached,
            "BVector mutated while attached to a buffer"
        );
        self.items.to_mut()
    }
}

/// Size of `items` bufferized as a [`BVector`] with codec `C`.
pub(crate) fn items_bufferized_size<'a, C: Codec<'a>>(items: &[C::Item]) -> u32 {
    C::bufferized_size(items)
        .checked_add(HEADER_SIZE)
        .and_then(|size| size.checked_next_multiple_of(ALIGNMENT))
        .unwrap_or(SMALL_BUFFER)
}

/// Bufferize `items` with the same layout as a [`BVector`] holding them.
pub(crate) fn bufferize_items<'a, C: Codec<'a>>(
    items: &[C::Item],
    buf: &mut [u8],
) -> BufResult<u32> {
    let size = items_bufferized_size::<C>(items);
    if capacity(buf) < size {
        return Err(SmallBuffer);
    }
    let count = items.len() as u32;
    buf[..4].copy_from_slice(&count.to_ne_bytes());
    buf[4..HEADER_SIZE as usize].fill(0);
    let end = HEADER_SIZE + C::bufferize(items, &mut buf[HEADER_SIZE as usize..])?;
    buf[end as usize..size as usize].fill(0);
    Ok(align(end))
}

/// Owned copy of the elements of a bufferized [`BVector`].
pub(crate) fn debufferize_items<'a, C: Codec<'a>>(buf: &[u8]) -> BufResult<(Vec<C::Item>, u32)> {
    let count = read_count(buf)?;
    let (items, used) = C::debufferize(count, &buf[HEADER_SIZE as usize..])?;
    Ok((items, align(HEADER_SIZE + used)))
}

impl<'a, C: Codec<'a>> Bufferizable<'a> for BVector<'a, C> {
    fn bufferized_size(&self) -> u32 {
        items_bufferized_size::<C>(&self.items)
    }

    fn bufferize(&self, buf: &mut [u8]) -> BufResult<u32> {
        bufferize_items::<C>(&self.items, buf)
    }

    fn debufferize(&mut self, buf: &[u8]) -> BufResult<u32> {
        let (items, used) = debufferize_items::<C>(buf)?;
        self.items = Cow::Owned(items);
        self.attached = false;
        Ok(used)
    }

    fn attach(&mut self, buf: &'a [u8]) -> BufResult<u32> {
        let count = read_count(buf)?;
        let (items, used) = C::attach(count, &buf[HEADER_SIZE as usize..])?;
        self.items = items;
        self.attached = true;
        Ok(align(HEADER_SIZE + used))
    }

    fn detach(&mut self) {
        if self.attached {
            C::detach(&mut self.items);
            self.attached = false;
        }
    }
}

fn read_count(buf: &[u8]) -> BufResult<usize> {
    if capacity(buf) < HEADER_SIZE {
        return Err(SmallBuffer);
    }
    let mut count = [0u8; 4];
    count.copy_from_slice(&buf[..4]);
    Ok(u32::from_ne_bytes(count) as usize)
}

impl<'a, C: Codec<'a>> Default for BVector<'a, C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, C: Codec<'a>> Clone for BVector<'a, C> {
    fn clone(&self) -> Self {
        Self {
            items: self.items.clone(),
            attached: self.attached,
            _codec: PhantomData,
        }
    }
}

impl<'a, C: Codec<'a>> fmt::Debug for BVector<'a, C>
where
    C::Item: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BVector")
            .field("items", &&*self.items)
            .field("attached", &self.attached)
            .finish()
    }
}

impl<'a, C: Codec<'a>> PartialEq for BVector<'a, C>
where
    C::Item: PartialEq,
{
    fn eq(&self, other: &Self) -> bool {
        *self.items == *other.items
    }
}

impl<'a, C: Codec<'a>> Deref for BVector<'a, C> {
    type Target = [C::Item];

    fn deref(&self) -> &[C::Item] {
        &self.items
    }
}

impl<'a, C: Codec<'a>> From<Vec<C::Item>> for BVector<'a, C> {
    fn from(items: Vec<C::Item>) -> Self {
        Self {
            items: Cow::Owned(items),
            attached: false,
            _codec: PhantomData,
        }
    }
}

impl<'a, C: Codec<'a>> FromIterator<C::Item> for BVector<'a, C> {
    fn from_iter<I: IntoIterator<Item = C::Item>>(iter: I) -> Self {
        Self::from(iter.into_iter().collect::<Vec<_>>())
    }
}

impl<'a, 'v, C: Codec<'a>> IntoIterator for &'v BVector<'a, C> {
    type Item = &'v C::Item;
    type IntoIter = std::slice::Iter<'v, C::Item>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{AlignedBuf, ObjectCodec, PlainCodec, StrCodec};

    type Ids<'a> = BVector<'a, PlainCodec<u32>>;
    type Names<'a> = BVector<'a, StrCodec>;
    type Nested<'a> = BVector<'a, ObjectCodec<Names<'a>>>;

    #[test]
    fn test_layout() {
        let ids: Ids = vec![7, 8, 9].into();
        // 8 byte header, 12 bytes of payload, padded to 24
        assert_eq!(ids.bufferized_size(), 24);

        let mut buf = vec![0xffu8; 24];
        assert_eq!(ids.bufferize(&mut buf), Ok(24));
        assert_eq!(&buf[0..4], &3u32.to_ne_bytes());
        assert_eq!(&buf[4..8], &[0; 4]);
        assert_eq!(&buf[8..12], &7u32.to_ne_bytes());
        assert_eq!(&buf[20..24], &[0; 4]);
    }

    #[test]
    fn test_empty_vector() {
        let ids = Ids::new();
        assert_eq!(ids.bufferized_size(), 8);
        let buf = AlignedBuf::bufferized(&ids).unwrap();

        let mut decoded = Ids::from(vec![1, 2]);
        assert_eq!(decoded.debufferize(buf.as_slice()), Ok(8));
        assert!(decoded.is_empty());
    }

    #[test]
    fn test_small_buffer_writes_nothing() {
        let names: Names = vec![Cow::from("MPI_COMM_WORLD"), Cow::from("row")].into();
        let size = names.bufferized_size() as usize;

        let mut buf = vec![0x55u8; size - 1];
        assert_eq!(names.bufferize(&mut buf), Err(SmallBuffer));
        assert!(buf.iter().all(|b| *b == 0x55));

        let mut buf = vec![0u8; size];
        assert_eq!(names.bufferize(&mut buf), Ok(size as u32));
    }

    #[test]
    fn test_debufferize_short_buffer() {
        let ids: Ids = vec![1, 2, 3, 4].into();
        let buf = AlignedBuf::bufferized(&ids).unwrap();

        let mut decoded = Ids::new();
        assert_eq!(decoded.debufferize(&buf.as_slice()[..4]), Err(SmallBuffer));
        assert_eq!(decoded.debufferize(&buf.as_slice()[..16]), Err(SmallBuffer));
        assert!(decoded.is_empty());
    }

    #[test]
    fn test_attach_is_zero_copy() {
        let ids: Ids = vec![10, 20, 30].into();
        let buf = AlignedBuf::bufferized(&ids).unwrap();

        let mut view = Ids::new();
        assert_eq!(view.attach(buf.as_slice()), Ok(24));
        assert!(view.is_attached());
        assert!(view.is_borrowed());
        assert_eq!(view.as_ptr() as usize, buf.as_slice()[8..].as_ptr() as usize);
        assert_eq!(view, ids);

        view.detach();
        assert!(!view.is_attached());
        assert!(!view.is_borrowed());
        view.push(40);
        assert_eq!(&*view, &[10, 20, 30, 40]);
    }

    #[test]
    #[should_panic(expected = "attached")]
    fn test_mutating_attached_vector_panics() {
        let ids: Ids = vec![1].into();
        let buf = AlignedBuf::bufferized(&ids).unwrap();
        let mut view = Ids::new();
        view.attach(buf.as_slice()).unwrap();
        view.push(2);
    }

    #[test]
    fn test_nested_vectors() {
        let nested: Nested = vec![
            Names::from(vec![Cow::from("a"), Cow::from("bcd")]),
            Names::new(),
            Names::from(vec![Cow::from("efghijklmnop")]),
        ]
        .into();
        let buf = AlignedBuf::bufferized(&nested).unwrap();
        assert_eq!(buf.len() as u32, nested.bufferized_size());

        let mut copy = Nested::new();
        copy.debufferize(buf.as_slice()).unwrap();
        assert_eq!(copy, nested);

        let mut view = Nested::new();
        view.attach(buf.as_slice()).unwrap();
        assert!(view[0].is_attached());
        assert!(matches!(view[2][0], Cow::Borrowed(_)));
        view.detach();
        assert!(!view[0].is_attached());
        assert!(matches!(view[2][0], Cow::Owned(_)));
        assert_eq!(view, nested);
    }

    #[test]
    fn test_nested_element_offsets_are_aligned() {
        let nested: Nested = vec![
            Names::from(vec![Cow::from("x")]),
            Names::from(vec![Cow::from("yy")]),
        ]
        .into();
        let buf = AlignedBuf::bufferized(&nested).unwrap();
        let bytes = buf.as_slice();

        // first inner vector starts after the outer header, the second at an aligned offset
        let first = nested[0].bufferized_size() as usize;
        assert_eq!(&bytes[8..12], &1u32.to_ne_bytes());
        assert_eq!((8 + first) % 8, 0);
        assert_eq!(&bytes[8 + first..12 + first], &1u32.to_ne_bytes());
    }

    #[test]
    fn test_release_and_erase() {
        let mut ids: Ids = Ids::with_capacity(16);
        ids.push(1);
        ids.push(2);
        assert!(ids.contains(&2));
        assert_eq!(ids.pop(), Some(2));

        ids.erase();
        assert_eq!(ids.count(), 0);
        assert!(ids.capacity() >= 16);

        ids.release();
        assert_eq!(ids.capacity(), 0);
    }
}
