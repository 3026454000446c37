// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! An emulated device backing for exercising drivers without hardware.
//!
//! The driver sees an [`EmulatedBar`] through [`DeviceRegisterIo`]. The test
//! harness standing in for the device gets a [`BarPeer`] over the same register
//! cells, which can observe driver stores through a write hook and post values
//! back without triggering that hook.

use crate::DeviceBacking;
use crate::DeviceRegisterIo;
use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

/// Called with `(offset, value)` after every driver-side register store.
pub type WriteHook = Box<dyn Fn(usize, u64) + Send + Sync>;

struct RegisterSpace {
    words: Vec<AtomicU64>,
    write_hook: RwLock<Option<WriteHook>>,
}

impl RegisterSpace {
    fn new(len: usize) -> Self {
        Self {
            words: (0..len.div_ceil(8)).map(|_| AtomicU64::new(0)).collect(),
            write_hook: RwLock::new(None),
        }
    }

    /// Returns the cell backing `offset` and the bit shift of the access
    /// within it.
    fn cell(&self, offset: usize, width: usize) -> (&AtomicU64, u32) {
        assert!(
            offset.is_multiple_of(width),
            "unaligned register access at {offset:#x}"
        );
        let cell = self
            .words
            .get(offset / 8)
            .unwrap_or_else(|| panic!("register offset {offset:#x} out of range"));
        (cell, ((offset % 8) * 8) as u32)
    }

    fn read_u64(&self, offset: usize) -> u64 {
        self.cell(offset, 8).0.load(Ordering::SeqCst)
    }

    fn write_u64(&self, offset: usize, data: u64) {
        self.cell(offset, 8).0.store(data, Ordering::SeqCst);
    }

    fn read_u32(&self, offset: usize) -> u32 {
        let (cell, shift) = self.cell(offset, 4);
        (cell.load(Ordering::SeqCst) >> shift) as u32
    }

    fn write_u32(&self, offset: usize, data: u32) {
        let (cell, shift) = self.cell(offset, 4);
        let mask = 0xffff_ffff_u64 << shift;
        let _ = cell.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| {
            Some((v & !mask) | ((data as u64) << shift))
        });
    }

    fn notify(&self, offset: usize, data: u64) {
        if let Some(hook) = &*self.write_hook.read() {
            hook(offset, data);
        }
    }
}

/// A device whose BAR0 is backed by plain memory.
pub struct EmulatedDevice {
    id: String,
    bar0: Arc<RegisterSpace>,
}

impl EmulatedDevice {
    /// Creates a device with a BAR0 of `bar0_len` bytes, zero initialized.
    pub fn new(id: &str, bar0_len: usize) -> Self {
        Self {
            id: id.to_owned(),
            bar0: Arc::new(RegisterSpace::new(bar0_len)),
        }
    }

    /// Returns the device-side view of BAR0.
    pub fn peer(&self) -> BarPeer {
        BarPeer(self.bar0.clone())
    }
}

impl DeviceBacking for EmulatedDevice {
    type Registers = EmulatedBar;

    fn id(&self) -> &str {
        &self.id
    }

    fn map_bar(&mut self, n: u8) -> anyhow::Result<Self::Registers> {
        if n != 0 {
            anyhow::bail!("bar {n} is not implemented by {}", self.id);
        }
        Ok(EmulatedBar(self.bar0.clone()))
    }
}

/// The driver-side view of an emulated BAR.
#[derive(Clone)]
pub struct EmulatedBar(Arc<RegisterSpace>);

impl DeviceRegisterIo for EmulatedBar {
    fn len(&self) -> usize {
        self.0.words.len() * 8
    }

    fn read_u32(&self, offset: usize) -> u32 {
        self.0.read_u32(offset)
    }

    fn read_u64(&self, offset: usize) -> u64 {
        self.0.read_u64(offset)
    }

    fn write_u32(&self, offset: usize, data: u32) {
        self.0.write_u32(offset, data);
        self.0.notify(offset, data.into());
    }

    fn write_u64(&self, offset: usize, data: u64) {
        self.0.write_u64(offset, data);
        self.0.notify(offset, data);
    }
}

/// The device-side view of an emulated BAR.
///
/// Stores through the peer never reach the write hook.
#[derive(Clone)]
pub struct BarPeer(Arc<RegisterSpace>);

impl BarPeer {
    /// Installs the hook called after each driver store, replacing any
    /// previous hook.
    ///
    /// The hook runs on the storing thread and must not call back into
    /// [`BarPeer::set_write_hook`].
    pub fn set_write_hook(&self, hook: impl Fn(usize, u64) + Send + Sync + 'static) {
        *self.0.write_hook.write() = Some(Box::new(hook));
    }

    /// Removes the write hook.
    pub fn clear_write_hook(&self) {
        *self.0.write_hook.write() = None;
    }

    /// Reads a 64-bit register.
    pub fn read_u64(&self, offset: usize) -> u64 {
        self.0.read_u64(offset)
    }

    /// Writes a 64-bit register.
    pub fn write_u64(&self, offset: usize, data: u64) {
        self.0.write_u64(offset, data);
    }
}
