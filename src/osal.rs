//! Operating System Abstraction Layer (OSAL) for the OpenCAPI NPU core
//!
//! This module provides platform-agnostic abstractions for the firmware
//! services the bring-up code depends on: time and delays, the physical
//! address map, XIVE interrupt allocation, I2C, NVRAM and the OBUS PHY
//! procedures. Register access itself goes through [`ScomBus`] and [`Mmio`],
//! which every platform must also provide.

use alloc::string::String;

use crate::brick::BrickIndex;
use crate::config::PlatformOcapi;
use crate::registers::{Mmio, ScomBus};

/// Physical address type
pub type PhysAddr = u64;

/// Time type for timestamps
pub type TimeStamp = u64;

/// Error types for OSAL operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsalError {
    OutOfMemory,
    InvalidParameter,
    TimeoutError,
    DeviceError,
    NotSupported,
}

/// Regions of the chip physical map used by the NPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhysMapKind {
    /// PHY register windows, index 0 and 1.
    NpuPhy,
    /// Global NPU register window.
    NpuRegs,
    /// Per-stack generation-id (config space) window.
    NpuGenid,
    /// Per-brick AFU MMIO window.
    NpuOcapiMmio,
}

/// What a PHY procedure needs to know about the brick it runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhyTarget {
    pub chip_id: u32,
    pub index: BrickIndex,
    pub pl_xscom_base: u64,
    pub lane_mask: u32,
}

/// OSAL trait for platform-specific implementations
pub trait Osal: ScomBus + Mmio {
    /// Get current timestamp in microseconds
    fn get_time_us(&self) -> TimeStamp;

    /// Sleep for specified microseconds
    fn udelay(&self, us: u32);

    /// Sleep for specified milliseconds
    fn msleep(&self, ms: u32);

    /// Check if timeout occurred
    fn timeout_check(&self, start_time: TimeStamp, timeout_us: u32) -> bool {
        let elapsed = self.get_time_us().saturating_sub(start_time);
        elapsed >= timeout_us as u64
    }

    /// Platform wiring of the OpenCAPI slots.
    fn ocapi(&self) -> &PlatformOcapi;

    /// Look up a window of the chip physical map, returning `(addr, size)`.
    fn phys_map_get(
        &self,
        chip_id: u32,
        kind: PhysMapKind,
        index: u32,
    ) -> Result<(PhysAddr, u64), OsalError>;

    /// EC level of the first chip when it is a Nimbus, `None` otherwise.
    fn nimbus_ec_level(&self) -> Option<u8>;

    /// Allocate `count` IPIs aligned to `align`, returning the first one.
    fn xive_alloc_ipi_irqs(&self, chip_id: u32, count: u32, align: u32) -> Option<u32>;

    fn xive_register_ipi_source(&self, base: u32, count: u32);

    /// Trigger page MMIO address of an IPI.
    fn xive_trigger_port(&self, irq: u32) -> PhysAddr;

    /// Phandle of the interrupt source controller, when the platform has one.
    fn ics_phandle(&self) -> Option<u32> {
        None
    }

    /// SMBUS write on an I2C port, with a `offset_bytes`-wide register offset.
    #[allow(clippy::too_many_arguments)]
    fn i2c_smbus_write(
        &self,
        port_id: u32,
        dev_addr: u8,
        offset: u32,
        offset_bytes: u8,
        data: &[u8],
        timeout_ms: u32,
    ) -> Result<(), OsalError>;

    fn nvram_query(&self, key: &str) -> Option<String>;

    fn disable_fast_reboot(&self, reason: &str);

    fn phy_setup(&self, phy: &PhyTarget) -> Result<(), OsalError>;

    /// Nudge the receive lanes before an ODL training attempt.
    fn phy_bump_ui_lane(&self, phy: &PhyTarget);

    /// Put the PHY in PRBS31 pattern generation instead of training.
    fn phy_prbs31(&self, phy: &PhyTarget);

    /// Whether an OS-supplied physical address may be dereferenced.
    fn opal_addr_valid(&self, addr: PhysAddr) -> bool;
}
