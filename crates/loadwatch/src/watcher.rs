//! Polling watchers over single values in target memory

use std::fmt::Debug;

use crate::error::Result;
use crate::memory::ReadMemory;

/// Fixed-width integer that can be decoded from target memory
pub trait MemoryValue: Copy + PartialEq + Debug {
    const SIZE: usize;

    fn from_le_slice(bytes: &[u8]) -> Self;
}

macro_rules! impl_memory_value {
    ($($ty:ty),*) => {
        $(
            impl MemoryValue for $ty {
                const SIZE: usize = std::mem::size_of::<$ty>();

                fn from_le_slice(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(&bytes[..Self::SIZE]);
                    <$ty>::from_le_bytes(raw)
                }
            }
        )*
    };
}

impl_memory_value!(u8, i8, u16, i16, u32, i32);

/// A change between two consecutive observations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition<T> {
    pub old: T,
    pub new: T,
}

/// Last observed value at one address
///
/// The first successful read only records the value; each later read that
/// differs from the stored value is reported exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedValue<T> {
    address: u32,
    current: Option<T>,
}

impl<T: MemoryValue> WatchedValue<T> {
    pub fn new(address: u32) -> Self {
        Self {
            address,
            current: None,
        }
    }

    pub fn address(&self) -> u32 {
        self.address
    }

    /// Last observed value, `None` before the first read
    pub fn current(&self) -> Option<T> {
        self.current
    }

    /// Read the value and report a transition if it changed
    pub fn update<R>(&mut self, reader: &R) -> Result<Option<Transition<T>>>
    where
        R: ReadMemory + ?Sized,
    {
        let bytes = reader.read_bytes(self.address, T::SIZE)?;
        let value = T::from_le_slice(&bytes);
        let previous = self.current.replace(value);
        Ok(match previous {
            Some(old) if old != value => Some(Transition { old, new: value }),
            _ => None,
        })
    }
}

/// Watchers keyed by `K`, polled together in insertion order
#[derive(Debug, Clone)]
pub struct WatcherList<K, T> {
    entries: Vec<(K, WatchedValue<T>)>,
}

impl<K: Copy + PartialEq, T: MemoryValue> WatcherList<K, T> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn add(&mut self, key: K, address: u32) {
        self.entries.push((key, WatchedValue::new(address)));
    }

    pub fn get(&self, key: K) -> Option<&WatchedValue<T>> {
        self.entries
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, watcher)| watcher)
    }

    /// Poll every watcher, invoking `on_change` for each transition in order
    ///
    /// Stops at the first read failure.
    pub fn update_all<R, F>(&mut self, reader: &R, mut on_change: F) -> Result<()>
    where
        R: ReadMemory + ?Sized,
        F: FnMut(K, Transition<T>),
    {
        for (key, watcher) in &mut self.entries {
            if let Some(transition) = watcher.update(reader)? {
                on_change(*key, transition);
            }
        }
        Ok(())
    }
}

impl<K: Copy + PartialEq, T: MemoryValue> Default for WatcherList<K, T> {
    fn default() -> Self {
        Self::new()
    }
}
