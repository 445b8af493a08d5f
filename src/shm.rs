//! Fixed-layout mmap'd shared-memory region (C1, §4.1).
//!
//! One contiguous, byte-exact record: the ticker lattice followed by the
//! index vector. The writer's pointer is the only mutable view; readers
//! attach read-only and tolerate torn reads of individual `f64`s (§9).

use std::fs::OpenOptions;
use std::path::Path;

use anyhow::{Context, Result};
use memmap2::MmapMut;

use crate::exchange::{ExchangeId, NUM_EXCHANGES};
use crate::lattice::{PriceIndex, TickerData, MAX_SYMBOLS};

/// The full shared-memory record, row-major.
#[repr(C)]
pub struct Shm {
    pub tickers: [[TickerData; MAX_SYMBOLS]; NUM_EXCHANGES],
    pub indices: [PriceIndex; MAX_SYMBOLS],
}

/// An mmap'd [`Shm`] region with single-writer-per-cell discipline.
///
/// No internal synchronization: every write is an aligned `f64`/`i32`
/// store, so a concurrent reader observes either the old or the new
/// value, never a splice, on any 64-bit target (§9).
pub struct SharedRegion {
    _mmap: MmapMut,
    ptr: *mut Shm,
}

// SAFETY: `ptr` points into `_mmap`, which outlives every derived reference;
// writes are partitioned by (exchange, slot) ownership as documented at
// each call site, matching the single-writer-per-cell discipline in §4.2.
unsafe impl Send for SharedRegion {}
unsafe impl Sync for SharedRegion {}

impl SharedRegion {
    /// Opens (creating if needed), truncates to `sizeof(Shm)`, and maps
    /// the backing file. Tickers and indices are NaN-initialized (§4.7 step 2).
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)
            .with_context(|| format!("failed to open shm file {}", path.display()))?;

        let size = std::mem::size_of::<Shm>() as u64;
        file.set_len(size)
            .with_context(|| format!("failed to truncate shm file to {size} bytes"))?;

        let mut mmap = unsafe {
            MmapMut::map_mut(&file).with_context(|| "failed to mmap shm file")?
        };

        let ptr = mmap.as_mut_ptr() as *mut Shm;
        let region = Self { _mmap: mmap, ptr };
        region.init_nan();
        Ok(region)
    }

    fn init_nan(&self) {
        unsafe {
            for row in (*self.ptr).tickers.iter_mut() {
                for cell in row.iter_mut() {
                    *cell = TickerData::NAN;
                }
            }
            for idx in (*self.ptr).indices.iter_mut() {
                *idx = PriceIndex::EMPTY;
            }
        }
    }

    /// Writes a lattice cell. Caller must be the single session owning
    /// `(exchange, slot)`.
    #[inline]
    pub fn write_ticker(&self, exchange: ExchangeId, slot: usize, data: TickerData) {
        unsafe {
            (*self.ptr).tickers[exchange.ordinal()][slot] = data;
        }
    }

    #[inline]
    pub fn read_ticker(&self, exchange: ExchangeId, slot: usize) -> TickerData {
        unsafe { (*self.ptr).tickers[exchange.ordinal()][slot] }
    }

    /// Writes an index slot. Caller must be the index engine (the sole writer).
    #[inline]
    pub fn write_index(&self, slot: usize, index: PriceIndex) {
        unsafe {
            (*self.ptr).indices[slot] = index;
        }
    }

    #[inline]
    pub fn read_index(&self, slot: usize) -> PriceIndex {
        unsafe { (*self.ptr).indices[slot] }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_initializes_all_cells_to_nan() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shm.data");
        let region = SharedRegion::create(&path).unwrap();

        for ex in ExchangeId::ALL {
            let t = region.read_ticker(ex, 0);
            assert!(t.bid.is_nan());
        }
        let idx = region.read_index(0);
        assert!(idx.val.is_nan());
    }

    #[test]
    fn file_is_truncated_to_exact_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shm.data");
        let _region = SharedRegion::create(&path).unwrap();
        let meta = std::fs::metadata(&path).unwrap();
        assert_eq!(meta.len(), std::mem::size_of::<Shm>() as u64);
    }

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shm.data");
        let region = SharedRegion::create(&path).unwrap();

        let data = TickerData {
            bid: 60000.0,
            ask: 60001.0,
            bid_qty: 1.0,
            ask_qty: 2.0,
        };
        region.write_ticker(ExchangeId::Binance, 3, data);
        let read = region.read_ticker(ExchangeId::Binance, 3);
        assert_eq!(read.bid, 60000.0);
        assert_eq!(read.ask_qty, 2.0);

        // A different exchange's slot 3 is unaffected (single-writer-per-cell).
        let other = region.read_ticker(ExchangeId::Okx, 3);
        assert!(other.bid.is_nan());
    }
}
