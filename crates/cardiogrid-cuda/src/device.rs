//! CUDA device management.

use std::sync::Arc;

use cudarc::driver::{CudaContext, CudaModule, CudaSlice, CudaStream, DeviceRepr, ValidAsZeroBits};
use cudarc::nvrtc::Ptx;

use cardiogrid_core::{CardioError, Result};

/// Environment variable selecting the CUDA device ordinal.
///
/// Unset means "first available" (ordinal 0).
pub const DEVICE_ENV_VAR: &str = "CARDIOGRID_DEVICE";

/// Wrapper around a cudarc context with cardiogrid utilities.
///
/// All work is driven through the context's default stream, a single
/// in-order queue: kernel launches are serialized by enqueue order and
/// buffer reads block the host until the queue has caught up.
pub struct GpuDevice {
    inner: Arc<CudaContext>,
    stream: Arc<CudaStream>,
    ordinal: usize,
    name: String,
}

impl GpuDevice {
    /// Acquire the device with the given ordinal.
    pub fn new(ordinal: usize) -> Result<Self> {
        let inner = CudaContext::new(ordinal).map_err(|e| {
            CardioError::device(format!("Failed to acquire CUDA device {ordinal}: {e}"))
        })?;
        let name = inner
            .name()
            .map_err(|e| CardioError::device(format!("Failed to get device name: {e}")))?;
        let stream = inner.default_stream();

        tracing::info!("Using device: {name}");

        Ok(Self {
            inner,
            stream,
            ordinal,
            name,
        })
    }

    /// Acquire the device selected by [`DEVICE_ENV_VAR`], else the first one.
    pub fn from_env() -> Result<Self> {
        match std::env::var(DEVICE_ENV_VAR) {
            Ok(value) => {
                let ordinal = value.trim().parse::<usize>().map_err(|_| {
                    CardioError::config(format!(
                        "{DEVICE_ENV_VAR} must be a device ordinal, got {value:?}"
                    ))
                })?;
                Self::new(ordinal)
            }
            Err(_) => Self::new(0),
        }
    }

    /// Device ordinal.
    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    /// Device name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The underlying cudarc context.
    pub fn inner(&self) -> &Arc<CudaContext> {
        &self.inner
    }

    /// The in-order command stream.
    pub fn stream(&self) -> &Arc<CudaStream> {
        &self.stream
    }

    /// Load a compiled program, making its kernels available.
    pub fn load_module(&self, ptx: Ptx) -> Result<Arc<CudaModule>> {
        self.inner
            .load_module(ptx)
            .map_err(|e| CardioError::device(format!("Failed to load program: {e}")))
    }

    /// Allocate a zero-initialized device buffer of `len` elements.
    pub fn alloc_zeros<T: DeviceRepr + ValidAsZeroBits>(&self, len: usize) -> Result<CudaSlice<T>> {
        self.stream.alloc_zeros::<T>(len).map_err(|e| {
            CardioError::device(format!(
                "Failed to allocate device buffer of {len} elements: {e}"
            ))
        })
    }

    /// Copy host data into an existing device buffer.
    pub fn upload<T: DeviceRepr>(&self, src: &[T], dst: &mut CudaSlice<T>) -> Result<()> {
        self.stream
            .memcpy_htod(src, dst)
            .map_err(|e| CardioError::transfer(format!("Host to device copy failed: {e}")))
    }

    /// Copy a device buffer back to host memory, blocking until complete.
    pub fn download<T: DeviceRepr>(&self, src: &CudaSlice<T>, dst: &mut [T]) -> Result<()> {
        self.stream
            .memcpy_dtoh(src, dst)
            .map_err(|e| CardioError::transfer(format!("Device to host copy failed: {e}")))?;
        self.synchronize()
    }

    /// Wait for all queued device work to finish.
    pub fn synchronize(&self) -> Result<()> {
        self.stream
            .synchronize()
            .map_err(|e| CardioError::device(format!("Synchronize failed: {e}")))
    }
}

impl Clone for GpuDevice {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            stream: Arc::clone(&self.stream),
            ordinal: self.ordinal,
            name: self.name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[ignore] // Requires CUDA hardware
    fn test_device_acquisition() {
        let device = GpuDevice::new(0).unwrap();
        assert_eq!(device.ordinal(), 0);
        assert!(!device.name().is_empty());
    }

    #[test]
    #[ignore] // Requires CUDA hardware
    fn test_round_trip_transfer() {
        let device = GpuDevice::new(0).unwrap();
        let data = vec![1.0f32, 2.0, 3.0, 4.0];
        let mut buf = device.alloc_zeros::<f32>(data.len()).unwrap();
        device.upload(&data, &mut buf).unwrap();
        let mut back = vec![0.0f32; data.len()];
        device.download(&buf, &mut back).unwrap();
        assert_eq!(data, back);
    }
}
