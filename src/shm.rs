//! Frequency table in a `MAP_SHARED | MAP_ANONYMOUS` mapping, shared by a
//! parent and the worker processes it forks.
//!
//! # Layout
//!
//! ```text
//! +----------------------+--------+--------+-----+--------------------+
//! | Header (128 bytes)   | Slot 0 | Slot 1 | ... | Slot capacity - 1  |
//! +----------------------+--------+--------+-----+--------------------+
//! ```
//!
//! The header holds a process-shared robust mutex, the number of used slots,
//! a counter of entries that did not fit and a counter of lock recoveries.
//! Slots are appended and never removed. A fresh anonymous mapping is
//! zero-filled, which is an empty table.
//!
//! Every write happens while holding the mutex, through a
//! [`SharedTableGuard`]. If a holder dies, the next `lock` gets `EOWNERDEAD`,
//! marks the mutex consistent again and counts the recovery. Slots below
//! `len` are only ever published whole, so a dead holder can at worst leave
//! some of its counts unmerged.

use log::warn;
use nix::errno::Errno;
use nix::sys::mman::{mmap_anonymous, munmap, MapFlags, ProtFlags};
use simple_error::{bail, try_with};
use std::cell::UnsafeCell;
use std::mem::{self, MaybeUninit};
use std::num::NonZeroUsize;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::MAX_TOKEN_LEN;
use crate::corpus::Token;
use crate::result::Result;
use crate::table::{FrequencyEntry, FrequencyTable};

const HEADER_SIZE: usize = 128;

#[repr(C)]
struct Header {
    mutex: UnsafeCell<libc::pthread_mutex_t>,
    len: AtomicU64,
    dropped: AtomicU64,
    recovered: AtomicU64,
}

#[repr(C)]
#[derive(Clone, Copy)]
struct Slot {
    first_seen: u64,
    count: i32,
    len: u8,
    bytes: [u8; MAX_TOKEN_LEN],
}

const _: () = assert!(mem::size_of::<Header>() <= HEADER_SIZE);
const _: () = assert!(HEADER_SIZE % mem::align_of::<Slot>() == 0);
const _: () = assert!(MAX_TOKEN_LEN <= u8::MAX as usize);

impl Slot {
    fn token(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    fn fill(&mut self, entry: &FrequencyEntry) {
        let bytes = entry.token.as_bytes();
        let n = bytes.len().min(MAX_TOKEN_LEN);
        self.bytes[..n].copy_from_slice(&bytes[..n]);
        self.len = n as u8;
        self.count = entry.count;
        self.first_seen = entry.first_seen as u64;
    }

    fn to_entry(&self) -> FrequencyEntry {
        FrequencyEntry::new(Token::new(self.token()), self.count, self.first_seen as usize)
    }
}

pub struct SharedTable {
    base: NonNull<u8>,
    size: usize,
    capacity: usize,
}

impl SharedTable {
    /// Maps a table with room for `capacity` distinct tokens (at least one).
    pub fn new(capacity: usize) -> Result<SharedTable> {
        let capacity = capacity.max(1);
        let size = match capacity
            .checked_mul(mem::size_of::<Slot>())
            .and_then(|s| s.checked_add(HEADER_SIZE))
            .and_then(NonZeroUsize::new)
        {
            Some(size) => size,
            None => bail!("shared table of {} entries is too large", capacity),
        };

        let base = try_with!(
            unsafe {
                mmap_anonymous(
                    None,
                    size,
                    ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                    MapFlags::MAP_SHARED | MapFlags::MAP_NORESERVE,
                )
            },
            "failed to map shared table of {} bytes",
            size
        );

        let table = SharedTable {
            base: base.cast::<u8>(),
            size: size.get(),
            capacity,
        };
        try_with!(table.init_mutex(), "failed to set up shared table lock");
        Ok(table)
    }

    fn init_mutex(&self) -> std::result::Result<(), Errno> {
        let mut attr = MaybeUninit::<libc::pthread_mutexattr_t>::uninit();
        // SAFETY: attr is initialised by pthread_mutexattr_init before any
        // other use and destroyed before returning. The mutex lives in the
        // mapping, which no other process can see yet.
        unsafe {
            check(libc::pthread_mutexattr_init(attr.as_mut_ptr()))?;
            let res = check(libc::pthread_mutexattr_setpshared(
                attr.as_mut_ptr(),
                libc::PTHREAD_PROCESS_SHARED,
            ))
            .and_then(|_| {
                check(libc::pthread_mutexattr_setrobust(
                    attr.as_mut_ptr(),
                    libc::PTHREAD_MUTEX_ROBUST,
                ))
            })
            .and_then(|_| check(libc::pthread_mutex_init(self.mutex(), attr.as_ptr())));
            libc::pthread_mutexattr_destroy(attr.as_mut_ptr());
            res
        }
    }

    #[inline]
    fn header(&self) -> &Header {
        // SAFETY: the mapping is at least HEADER_SIZE bytes, page aligned and
        // lives as long as self.
        unsafe { &*(self.base.as_ptr() as *const Header) }
    }

    #[inline]
    fn mutex(&self) -> *mut libc::pthread_mutex_t {
        self.header().mutex.get()
    }

    #[inline]
    fn slots(&self) -> *mut Slot {
        unsafe { self.base.as_ptr().add(HEADER_SIZE) as *mut Slot }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.header().len.load(Ordering::Acquire) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries that were rejected because the table was full.
    pub fn dropped(&self) -> u64 {
        self.header().dropped.load(Ordering::Acquire)
    }

    /// How often a holder died with the lock taken and the lock was
    /// recovered by the next caller.
    pub fn recovered(&self) -> u64 {
        self.header().recovered.load(Ordering::Acquire)
    }

    /// Blocks until the caller holds the table lock.
    pub fn lock(&self) -> Result<SharedTableGuard<'_>> {
        let mutex = self.mutex();
        // SAFETY: the mutex was initialised in new and outlives self.
        match unsafe { libc::pthread_mutex_lock(mutex) } {
            0 => {}
            libc::EOWNERDEAD => {
                try_with!(
                    check(unsafe { libc::pthread_mutex_consistent(mutex) }),
                    "failed to recover shared table lock"
                );
                self.header().recovered.fetch_add(1, Ordering::AcqRel);
                warn!("previous shared table lock holder died, lock recovered");
            }
            rc => bail!("failed to lock shared table: {}", Errno::from_raw(rc)),
        }
        Ok(SharedTableGuard { table: self })
    }

    /// Copies the current contents into a private table, in slot order.
    pub fn snapshot(&self) -> Result<FrequencyTable> {
        let guard = self.lock()?;
        Ok(guard.to_table())
    }
}

impl Drop for SharedTable {
    fn drop(&mut self) {
        // forked children leave through _exit and never get here
        unsafe {
            libc::pthread_mutex_destroy(self.mutex());
            let _ = munmap(self.base.cast(), self.size);
        }
    }
}

fn check(rc: libc::c_int) -> std::result::Result<(), Errno> {
    if rc == 0 {
        Ok(())
    } else {
        Err(Errno::from_raw(rc))
    }
}

/// Exclusive access to a [`SharedTable`]; the lock is released on drop.
pub struct SharedTableGuard<'a> {
    table: &'a SharedTable,
}

impl SharedTableGuard<'_> {
    fn slot(&mut self, i: usize) -> &mut Slot {
        debug_assert!(i < self.table.capacity);
        // SAFETY: i is in bounds and holding the lock makes this the only
        // live reference into the slot array.
        unsafe { &mut *self.table.slots().add(i) }
    }

    /// Folds `local` into the shared table: counts of tokens already present
    /// are added to, the rest are appended in `local`'s order. Returns how
    /// many entries were dropped because the table was full.
    pub fn merge(&mut self, local: &FrequencyTable) -> u64 {
        let table = self.table;
        let header = table.header();
        let mut len = header.len.load(Ordering::Relaxed) as usize;
        let mut found = vec![false; local.len()];

        for i in 0..len {
            let slot = self.slot(i);
            if let Some(j) = local.position(slot.token()) {
                let entry = &local.entries()[j];
                slot.count = slot.count.saturating_add(entry.count);
                slot.first_seen = slot.first_seen.min(entry.first_seen as u64);
                found[j] = true;
            }
        }

        let mut dropped = 0;
        for (j, entry) in local.entries().iter().enumerate() {
            if found[j] {
                continue;
            }
            if len == table.capacity {
                dropped += 1;
                continue;
            }
            self.slot(len).fill(entry);
            len += 1;
        }

        header.len.store(len as u64, Ordering::Release);
        if dropped > 0 {
            header.dropped.fetch_add(dropped, Ordering::AcqRel);
        }
        dropped
    }

    pub fn to_table(&self) -> FrequencyTable {
        let len = self.table.header().len.load(Ordering::Relaxed) as usize;
        // SAFETY: slots below len are initialised and the lock is held.
        let slots = unsafe { std::slice::from_raw_parts(self.table.slots() as *const Slot, len) };
        let mut table = FrequencyTable::with_capacity(len);
        for slot in slots {
            table.absorb(slot.to_entry());
        }
        table
    }
}

impl Drop for SharedTableGuard<'_> {
    fn drop(&mut self) {
        // SAFETY: the guard only exists while the caller holds the mutex.
        unsafe {
            libc::pthread_mutex_unlock(self.table.mutex());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::Corpus;
    use std::sync::Arc;

    fn local(text: &str, offset: usize) -> FrequencyTable {
        let corpus = Corpus::from_bytes(text.as_bytes());
        FrequencyTable::aggregate(corpus.tokens(), offset)
    }

    #[test]
    fn fresh_table_is_empty() {
        let table = SharedTable::new(0).unwrap();
        assert_eq!(table.capacity(), 1);
        assert!(table.is_empty());
        assert_eq!(table.dropped(), 0);
        assert_eq!(table.recovered(), 0);
        assert!(table.snapshot().unwrap().is_empty());
    }

    #[test]
    fn merge_is_find_or_append() {
        let table = SharedTable::new(16).unwrap();
        assert_eq!(table.lock().unwrap().merge(&local("a b a", 10)), 0);
        assert_eq!(table.lock().unwrap().merge(&local("c a b", 0)), 0);

        let snapshot = table.snapshot().unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(snapshot.count("a"), 3);
        assert_eq!(snapshot.count("b"), 2);
        assert_eq!(snapshot.count("c"), 1);
        assert_eq!(snapshot.get(b"a").unwrap().first_seen, 1);
        let order: Vec<String> = snapshot.entries().iter().map(|e| e.token.to_string()).collect();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn overflow_is_counted_not_hidden() {
        let table = SharedTable::new(2).unwrap();
        assert_eq!(table.lock().unwrap().merge(&local("x y z x", 0)), 1);
        assert_eq!(table.len(), 2);
        assert_eq!(table.dropped(), 1);
        // existing tokens still merge once full
        assert_eq!(table.lock().unwrap().merge(&local("y y", 4)), 0);
        assert_eq!(table.snapshot().unwrap().count("y"), 3);
    }

    #[test]
    fn keeps_full_length_tokens() {
        let word = "w".repeat(MAX_TOKEN_LEN);
        let table = SharedTable::new(4).unwrap();
        table.lock().unwrap().merge(&local(&word, 0));
        let snapshot = table.snapshot().unwrap();
        assert_eq!(snapshot.entries()[0].token.len(), MAX_TOKEN_LEN);
        assert_eq!(snapshot.count(&word), 1);
    }

    #[test]
    fn merged_counts_saturate() {
        let table = SharedTable::new(4).unwrap();
        let mut big = FrequencyTable::new();
        big.absorb(FrequencyEntry::new(Token::from("n"), i32::MAX - 3, 0));
        table.lock().unwrap().merge(&big);
        table.lock().unwrap().merge(&local("n n n n n", 1));
        assert_eq!(table.snapshot().unwrap().count("n"), i32::MAX);
    }

    struct Shared(SharedTable);
    // the table is only written under its own lock
    unsafe impl Send for Shared {}
    unsafe impl Sync for Shared {}

    #[test]
    fn lock_serialises_concurrent_merges() {
        let table = Arc::new(Shared(SharedTable::new(64).unwrap()));
        let workers: Vec<_> = (0..8)
            .map(|_| {
                let table = Arc::clone(&table);
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        table.0.lock().unwrap().merge(&local("p q r s p", 0));
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        let snapshot = table.0.snapshot().unwrap();
        assert_eq!(snapshot.len(), 4);
        assert_eq!(snapshot.count("p"), 2 * 8 * 200);
        assert_eq!(snapshot.count("s"), 8 * 200);
    }
}
