//! Fixed pool of reusable code-sequence buffers.
//!
//! Code sequences never live on the heap: a sequence is a pool entry, and
//! the [`CodeHandle`] naming it travels through the message bus. Exactly
//! one owner holds a live handle at a time; sending a `Message::Code`
//! transfers ownership, and the receiver releases the entry with [`free`].
//!
//! The whole pool sits inside one critical-section mutex. On dual-core
//! parts the critical-section implementation is a spinlock plus IRQ
//! disable, which covers both the interrupt-context and cross-core
//! allocation paths with a single mechanism.
//!
//! [`free`]: CodePool::free

use core::cell::RefCell;

use critical_section::Mutex;
use heapless::Vec;

use crate::types::CodeSource;

/// Entries in the default pool
pub const CODE_POOL_SIZE: usize = 8;
/// Maximum elements one sequence can hold
pub const MAX_CODE_LEN: usize = 128;

/// A code sequence copied out of the pool
pub type CodeElements = Vec<i32, MAX_CODE_LEN>;

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum PoolError {
    /// No free entry. Callers treat this as fatal: blocking or silently
    /// truncating here would corrupt real-time key timing.
    Exhausted,
    /// Handle does not name a live entry (already freed or recycled)
    StaleHandle,
}

/// Names one live pool entry. The generation counter catches use of a
/// handle whose entry has been freed and recycled.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct CodeHandle {
    index: u8,
    generation: u16,
}

impl CodeHandle {
    pub const fn index(&self) -> usize {
        self.index as usize
    }
}

struct Entry<const L: usize> {
    free: bool,
    generation: u16,
    next_free: Option<u8>,
    source: CodeSource,
    seq: Vec<i32, L>,
}

struct PoolInner<const N: usize, const L: usize> {
    entries: [Entry<L>; N],
    free_head: Option<u8>,
    live: usize,
}

impl<const N: usize, const L: usize> PoolInner<N, L> {
    fn entry(&mut self, h: CodeHandle) -> Result<&mut Entry<L>, PoolError> {
        let e = self
            .entries
            .get_mut(h.index())
            .ok_or(PoolError::StaleHandle)?;
        if e.free || e.generation != h.generation {
            return Err(PoolError::StaleHandle);
        }
        Ok(e)
    }
}

/// Arena of code-sequence buffers with free-list allocation and O(1) free
pub struct CodePool<const N: usize = CODE_POOL_SIZE, const L: usize = MAX_CODE_LEN> {
    inner: Mutex<RefCell<PoolInner<N, L>>>,
}

impl<const N: usize, const L: usize> CodePool<N, L> {
    pub fn new() -> Self {
        let entries: [Entry<L>; N] = core::array::from_fn(|i| Entry {
            free: true,
            generation: 0,
            next_free: if i + 1 < N { Some(i as u8 + 1) } else { None },
            source: CodeSource::LocalUi,
            seq: Vec::new(),
        });
        Self {
            inner: Mutex::new(RefCell::new(PoolInner {
                entries,
                free_head: if N > 0 { Some(0) } else { None },
                live: 0,
            })),
        }
    }

    /// Take a free entry and copy `data` into it (truncated at capacity)
    pub fn alloc(&self, source: CodeSource, data: &[i32]) -> Result<CodeHandle, PoolError> {
        critical_section::with(|cs| {
            let mut guard = self.inner.borrow_ref_mut(cs);
            let inner = &mut *guard;
            let idx = inner.free_head.ok_or(PoolError::Exhausted)?;
            let e = &mut inner.entries[idx as usize];
            inner.free_head = e.next_free.take();
            e.free = false;
            e.generation = e.generation.wrapping_add(1);
            e.source = source;
            e.seq.clear();
            let take = data.len().min(L);
            e.seq.extend_from_slice(&data[..take]).ok();
            let h = CodeHandle {
                index: idx,
                generation: e.generation,
            };
            inner.live += 1;
            Ok(h)
        })
    }

    /// Copy more elements onto a live sequence, silently truncating overflow
    pub fn append(&self, h: CodeHandle, data: &[i32]) -> Result<(), PoolError> {
        critical_section::with(|cs| {
            let mut inner = self.inner.borrow_ref_mut(cs);
            let e = inner.entry(h)?;
            let room = L - e.seq.len();
            let take = data.len().min(room);
            e.seq.extend_from_slice(&data[..take]).ok();
            Ok(())
        })
    }

    /// Allocate a new entry holding a duplicate of `h`
    pub fn copy(&self, h: CodeHandle) -> Result<CodeHandle, PoolError> {
        let (source, data) = self.snapshot(h)?;
        self.alloc(source, &data)
    }

    /// Release a live entry; the caller relinquishes all further access
    pub fn free(&self, h: CodeHandle) -> Result<(), PoolError> {
        critical_section::with(|cs| {
            let mut guard = self.inner.borrow_ref_mut(cs);
            let inner = &mut *guard;
            let head = inner.free_head;
            let e = inner.entry(h)?;
            e.free = true;
            e.seq.clear();
            e.next_free = head;
            inner.free_head = Some(h.index);
            inner.live -= 1;
            Ok(())
        })
    }

    /// Copy a live sequence out of the pool
    pub fn snapshot(&self, h: CodeHandle) -> Result<(CodeSource, CodeElements), PoolError> {
        critical_section::with(|cs| {
            let mut inner = self.inner.borrow_ref_mut(cs);
            let e = inner.entry(h)?;
            let mut out = CodeElements::new();
            out.extend_from_slice(&e.seq[..e.seq.len().min(MAX_CODE_LEN)])
                .ok();
            Ok((e.source, out))
        })
    }

    /// Element count of a live sequence
    pub fn len(&self, h: CodeHandle) -> Result<usize, PoolError> {
        critical_section::with(|cs| Ok(self.inner.borrow_ref_mut(cs).entry(h)?.seq.len()))
    }

    /// Live (allocated) entry count
    pub fn live(&self) -> usize {
        critical_section::with(|cs| self.inner.borrow_ref_mut(cs).live)
    }
}

impl<const N: usize, const L: usize> Default for CodePool<N, L> {
    fn default() -> Self {
        Self::new()
    }
}
