//! `OpenCLInfo`: list the available OpenCL platforms and devices.

#[cfg(feature = "opencl")]
pub fn run() -> anyhow::Result<()> {
    let devices = keyscout_engine::gpu::enumerate_devices()
        .map_err(|e| anyhow::anyhow!("device enumeration failed: {}", e))?;
    if devices.is_empty() {
        println!("No OpenCL devices found.");
        return Ok(());
    }
    for device in devices {
        println!(
            "[{}] {} — {} ({}, {}; max work group {})",
            device.index,
            device.name,
            device.platform,
            device.vendor,
            device.version,
            device.max_work_group_size
        );
    }
    Ok(())
}

#[cfg(not(feature = "opencl"))]
pub fn run() -> anyhow::Result<()> {
    anyhow::bail!("this build has no OpenCL support (rebuild with --features opencl)")
}
