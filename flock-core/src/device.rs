//! Compute device: typed buffers and work-group dispatch.
//!
//! Kernels run over the device's own rayon pool. A dispatch launches
//! `ceil(len / WORKGROUP_SIZE)` work groups; each work item owns exactly one
//! output element and may only read the buffers the kernel captured. When
//! `dispatch` returns every write is visible, which is the phase barrier.

use std::sync::atomic::{AtomicU64, Ordering};

use bytemuck::Pod;
use rayon::prelude::*;

use crate::error::{DispatchError, FlockError};

/// Work items per work group.
pub const WORKGROUP_SIZE: usize = 256;

/// A fixed-length typed buffer living on the compute device
#[derive(Debug)]
pub struct DeviceBuffer<T: Pod> {
    label: &'static str,
    data: Vec<T>,
    len: usize,
    released: bool,
}

impl<T: Pod> DeviceBuffer<T> {
    /// Element count the buffer was allocated with.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    pub fn size_bytes(&self) -> usize {
        self.len * std::mem::size_of::<T>()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Raw bytes, laid out as a shader would see them.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.data)
    }

    fn check_len(&self, actual: usize) -> Result<(), FlockError> {
        if self.released {
            return Err(DispatchError::DeviceReleased.into());
        }
        if actual != self.len {
            return Err(FlockError::SizeMismatch {
                what: self.label,
                expected: self.len,
                actual,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Counters {
    dispatches: AtomicU64,
    workgroups: AtomicU64,
    barriers: AtomicU64,
    bytes_uploaded: AtomicU64,
    bytes_downloaded: AtomicU64,
    allocated_bytes: AtomicU64,
}

/// Snapshot of device activity counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceStats {
    pub dispatches: u64,
    pub workgroups: u64,
    pub barriers: u64,
    pub bytes_uploaded: u64,
    pub bytes_downloaded: u64,
    /// Bytes held by buffers that have not been freed.
    pub allocated_bytes: u64,
}

/// The data-parallel device all phases run on
pub struct ComputeDevice {
    pool: rayon::ThreadPool,
    counters: Counters,
}

impl ComputeDevice {
    pub fn new(worker_threads: Option<usize>) -> Result<Self, FlockError> {
        let mut builder =
            rayon::ThreadPoolBuilder::new().thread_name(|i| format!("flock-device-{i}"));
        if let Some(n) = worker_threads {
            builder = builder.num_threads(n);
        }
        let pool = builder
            .build()
            .map_err(|e| FlockError::DeviceCreation(e.to_string()))?;

        log::debug!(
            "Compute device ready with {} worker threads",
            pool.current_num_threads()
        );

        Ok(Self {
            pool,
            counters: Counters::default(),
        })
    }

    pub fn worker_threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Allocate a zero-initialised buffer of `len` elements.
    pub fn allocate<T: Pod>(&self, label: &'static str, len: usize) -> DeviceBuffer<T> {
        let buffer = DeviceBuffer {
            label,
            data: vec![T::zeroed(); len],
            len,
            released: false,
        };
        self.counters
            .allocated_bytes
            .fetch_add(buffer.size_bytes() as u64, Ordering::Relaxed);
        log::trace!("Allocated `{}` ({} bytes)", label, buffer.size_bytes());
        buffer
    }

    /// Release a buffer. Releasing twice is a no-op.
    pub fn free<T: Pod>(&self, buffer: &mut DeviceBuffer<T>) {
        if buffer.released {
            return;
        }
        self.counters
            .allocated_bytes
            .fetch_sub(buffer.size_bytes() as u64, Ordering::Relaxed);
        buffer.data = Vec::new();
        buffer.released = true;
        log::trace!("Released `{}`", buffer.label);
    }

    /// Copy host data into a device buffer. The lengths must match exactly.
    pub fn upload<T: Pod>(&self, buffer: &mut DeviceBuffer<T>, src: &[T]) -> Result<(), FlockError> {
        buffer.check_len(src.len())?;
        buffer.data.copy_from_slice(src);
        self.counters
            .bytes_uploaded
            .fetch_add(buffer.size_bytes() as u64, Ordering::Relaxed);
        Ok(())
    }

    /// Copy a device buffer back into host memory.
    pub fn download<T: Pod>(&self, buffer: &DeviceBuffer<T>, dst: &mut [T]) -> Result<(), FlockError> {
        buffer.check_len(dst.len())?;
        dst.copy_from_slice(&buffer.data);
        self.counters
            .bytes_downloaded
            .fetch_add(buffer.size_bytes() as u64, Ordering::Relaxed);
        Ok(())
    }

    /// Run `kernel` once per element of `out`, grouped into work groups.
    ///
    /// The kernel receives the global work item index and the element it
    /// owns. The first error reported by any work item aborts the dispatch;
    /// elements already written are left in an unspecified state.
    pub fn dispatch<T, F>(&self, label: &str, out: &mut [T], kernel: F) -> Result<(), DispatchError>
    where
        T: Send,
        F: Fn(usize, &mut T) -> Result<(), DispatchError> + Sync,
    {
        let groups = out.len().div_ceil(WORKGROUP_SIZE);
        log::trace!("Dispatch `{}`: {} work groups", label, groups);

        let result = self.pool.install(|| {
            out.par_chunks_mut(WORKGROUP_SIZE)
                .enumerate()
                .try_for_each(|(group, items)| {
                    let base = group * WORKGROUP_SIZE;
                    items
                        .iter_mut()
                        .enumerate()
                        .try_for_each(|(local, item)| kernel(base + local, item))
                })
        });

        self.counters.dispatches.fetch_add(1, Ordering::Relaxed);
        self.counters
            .workgroups
            .fetch_add(groups as u64, Ordering::Relaxed);
        result
    }

    /// Record a full device barrier between two phases.
    pub fn barrier(&self) {
        self.counters.barriers.fetch_add(1, Ordering::SeqCst);
    }

    pub fn stats(&self) -> DeviceStats {
        DeviceStats {
            dispatches: self.counters.dispatches.load(Ordering::Relaxed),
            workgroups: self.counters.workgroups.load(Ordering::Relaxed),
            barriers: self.counters.barriers.load(Ordering::SeqCst),
            bytes_uploaded: self.counters.bytes_uploaded.load(Ordering::Relaxed),
            bytes_downloaded: self.counters.bytes_downloaded.load(Ordering::Relaxed),
            allocated_bytes: self.counters.allocated_bytes.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device() -> ComputeDevice {
        ComputeDevice::new(Some(2)).unwrap()
    }

    #[test]
    fn test_dispatch_visits_every_index_once() {
        let device = device();
        let mut out = vec![0u32; WORKGROUP_SIZE * 2 + 7];
        device
            .dispatch("index", &mut out, |i, item| {
                *item = i as u32;
                Ok(())
            })
            .unwrap();

        assert!(out.iter().enumerate().all(|(i, &v)| v == i as u32));
        let stats = device.stats();
        assert_eq!(stats.dispatches, 1);
        assert_eq!(stats.workgroups, 3);
    }

    #[test]
    fn test_dispatch_propagates_work_item_error() {
        let device = device();
        let mut out = vec![0.0f32; 10];
        let err = device
            .dispatch("fail", &mut out, |i, _| {
                if i == 4 {
                    Err(DispatchError::NonFinite {
                        phase: crate::kernels::Phase::Force,
                        index: i,
                    })
                } else {
                    Ok(())
                }
            })
            .unwrap_err();
        assert!(matches!(err, DispatchError::NonFinite { index: 4, .. }));
    }

    #[test]
    fn test_upload_rejects_wrong_length() {
        let device = device();
        let mut buffer = device.allocate::<f32>("scratch", 4);
        let err = device.upload(&mut buffer, &[1.0, 2.0]).unwrap_err();
        assert_eq!(
            err,
            FlockError::SizeMismatch {
                what: "scratch",
                expected: 4,
                actual: 2
            }
        );
    }

    #[test]
    fn test_upload_download_counts_bytes() {
        let device = device();
        let mut buffer = device.allocate::<f32>("scratch", 4);
        device.upload(&mut buffer, &[1.0, 2.0, 3.0, 4.0]).unwrap();
        let mut back = [0.0f32; 4];
        device.download(&buffer, &mut back).unwrap();

        assert_eq!(back, [1.0, 2.0, 3.0, 4.0]);
        let stats = device.stats();
        assert_eq!(stats.bytes_uploaded, 16);
        assert_eq!(stats.bytes_downloaded, 16);
    }

    #[test]
    fn test_free_is_idempotent_and_tracks_allocation() {
        let device = device();
        let mut buffer = device.allocate::<u32>("ids", 8);
        assert_eq!(device.stats().allocated_bytes, 32);

        device.free(&mut buffer);
        device.free(&mut buffer);

        assert!(buffer.is_released());
        assert_eq!(device.stats().allocated_bytes, 0);
        assert_eq!(
            device.upload(&mut buffer, &[0; 8]),
            Err(FlockError::Dispatch(DispatchError::DeviceReleased))
        );
    }
}
