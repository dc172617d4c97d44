//! OpenCL derivation back-end.
//!
//! The device receives only the 32-byte base scalar; work item i computes
//! (base+i)·G and writes the raw 64-byte coordinate pair into a contiguous
//! buffer. The host re-tags the uncompressed serialization on read-back.
//! Back-ends are only handed to producers after passing the self-test in
//! [`crate::derive::self_test`].

use crate::derive::{Batch, DerivationBackend, DeriveError, MAX_GRID_BITS};
use keyscout_crypto::pubkey::tag_coordinates;
use keyscout_types::Scalar;
use log::info;
use ocl::{Buffer, Context, Device, Kernel, MemFlags, Platform, Program, Queue};

static KERNEL_SRC: &str = include_str!("kernels/secp256k1_grid.cl");

/// One enumerated OpenCL device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub index: usize,
    pub platform: String,
    pub name: String,
    pub vendor: String,
    pub version: String,
    pub max_work_group_size: usize,
}

fn all_devices() -> Result<Vec<(Platform, Device)>, DeriveError> {
    let mut out = Vec::new();
    for platform in Platform::list() {
        let devices = Device::list_all(platform)
            .map_err(|e| DeriveError::Device(e.to_string()))?;
        for device in devices {
            out.push((platform, device));
        }
    }
    Ok(out)
}

/// Enumerate every device across every platform, in stable index order.
/// This index is what producer configurations select by.
pub fn enumerate_devices() -> Result<Vec<DeviceInfo>, DeriveError> {
    let mut out = Vec::new();
    for (index, (platform, device)) in all_devices()?.into_iter().enumerate() {
        out.push(DeviceInfo {
            index,
            platform: platform.name().unwrap_or_else(|_| "unknown".to_string()),
            name: device.name().unwrap_or_else(|_| "unknown".to_string()),
            vendor: device.vendor().unwrap_or_else(|_| "unknown".to_string()),
            version: device
                .version()
                .map(|v| v.to_string())
                .unwrap_or_else(|_| "unknown".to_string()),
            max_work_group_size: device.max_wg_size().unwrap_or(0),
        });
    }
    Ok(out)
}

/// An exclusive context + queue on one device. One instance per producer.
pub struct GpuBackend {
    name: String,
    queue: Queue,
    program: Program,
    base_buffer: Buffer<u8>,
}

impl GpuBackend {
    pub fn new(device_index: usize, grid_bits: u32) -> Result<Self, DeriveError> {
        if grid_bits > MAX_GRID_BITS {
            return Err(DeriveError::GridTooWide(grid_bits));
        }

        let devices = all_devices()?;
        let (platform, device) = devices.get(device_index).ok_or_else(|| {
            DeriveError::Device(format!(
                "device index {} out of range ({} devices available)",
                device_index,
                devices.len()
            ))
        })?;

        let context = Context::builder()
            .platform(*platform)
            .devices(*device)
            .build()
            .map_err(|e| DeriveError::Device(e.to_string()))?;

        let program = Program::builder()
            .devices(*device)
            .src(KERNEL_SRC)
            .build(&context)
            .map_err(|e| DeriveError::Device(e.to_string()))?;

        let queue = Queue::new(&context, *device, None)
            .map_err(|e| DeriveError::Device(e.to_string()))?;

        let base_buffer = Buffer::<u8>::builder()
            .queue(queue.clone())
            .flags(MemFlags::new().read_only())
            .len(32)
            .build()
            .map_err(|e| DeriveError::Device(e.to_string()))?;

        let name = format!(
            "opencl:{}",
            device.name().unwrap_or_else(|_| "unknown".to_string())
        );
        info!("{} ready ({} grid bits)", name, grid_bits);

        Ok(Self {
            name,
            queue,
            program,
            base_buffer,
        })
    }
}

impl DerivationBackend for GpuBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn derive_batch(&mut self, base: Scalar, bits: u32) -> Result<Batch, DeriveError> {
        if bits > MAX_GRID_BITS {
            return Err(DeriveError::GridTooWide(bits));
        }
        let count = 1usize << bits;

        self.base_buffer
            .write(&base.as_bytes()[..])
            .enq()
            .map_err(|e| DeriveError::Device(e.to_string()))?;

        let out_buffer = Buffer::<u8>::builder()
            .queue(self.queue.clone())
            .flags(MemFlags::new().write_only())
            .len(count * 64)
            .build()
            .map_err(|e| DeriveError::Device(e.to_string()))?;

        let kernel = Kernel::builder()
            .program(&self.program)
            .name("derive_grid")
            .queue(self.queue.clone())
            .global_work_size(count)
            .arg(&self.base_buffer)
            .arg(&out_buffer)
            .build()
            .map_err(|e| DeriveError::Device(e.to_string()))?;

        // Safety: the kernel writes only inside out_buffer, which is sized
        // for the full grid.
        unsafe {
            kernel
                .enq()
                .map_err(|e| DeriveError::Device(e.to_string()))?;
        }

        let mut raw = vec![0u8; count * 64];
        out_buffer
            .read(&mut raw)
            .enq()
            .map_err(|e| DeriveError::Device(e.to_string()))?;

        let points = raw.chunks_exact(64).map(tag_coordinates).collect();
        Ok(Batch::grid(base, points))
    }
}
