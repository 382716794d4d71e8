//! NPU instances and their OpenCAPI bricks.

use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, Ordering};

use crate::brick::BrickIndex;
use crate::dt::NodeId;
use crate::lock::Lock;
use crate::osal::PhyTarget;

/// Bricks addressable by index in the per-NPU caches.
pub const NPU2_MAX_BRICKS: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceType {
    OpenCapi,
}

/// A window programmed into the NPU for a brick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Npu2Bar {
    pub base: u64,
    pub size: u64,
}

/// Bring-up progress of a brick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    /// Register-plane bring-up failed before training.
    ConfigFailed,
    /// Training skipped per NVRAM (`None` or PRBS31).
    Untrained,
    Trained,
    TrainingFailed,
}

#[derive(Debug)]
pub struct OcapiDevice {
    pub index: BrickIndex,
    pub ty: DeviceType,
    /// `ibm,npu-link-opencapi` node describing the link.
    pub dt_node: NodeId,
    /// PHB node published for the brick.
    pub phb_node: Option<NodeId>,
    pub link_speed: u64,
    pub lane_mask: u32,
    pub pl_xscom_base: u64,
    pub i2c_port_id: Option<u32>,
    pub bdfn: u32,
    /// `[0]` AFU MMIO window, `[1]` GENID (config space) window.
    pub bars: [Npu2Bar; 2],
    pub status: LinkStatus,
}

impl OcapiDevice {
    pub fn new(index: BrickIndex, dt_node: NodeId) -> Self {
        Self {
            index,
            ty: DeviceType::OpenCapi,
            dt_node,
            phb_node: None,
            link_speed: 0,
            lane_mask: 0,
            pl_xscom_base: 0,
            i2c_port_id: None,
            bdfn: 0,
            bars: [Npu2Bar::default(); 2],
            status: LinkStatus::Untrained,
        }
    }

    pub fn phy_target(&self, chip_id: u32) -> PhyTarget {
        PhyTarget {
            chip_id,
            index: self.index,
            pl_xscom_base: self.pl_xscom_base,
            lane_mask: self.lane_mask,
        }
    }

    /// Base of the brick's config-space back-door.
    pub fn genid_base(&self) -> u64 {
        self.bars[1].base + self.index.genid_offset()
    }
}

/// One NPU running OpenCAPI.
#[derive(Debug)]
pub struct Npu2 {
    pub chip_id: u32,
    pub npu_index: u32,
    pub xscom_base: u64,
    /// Global MMIO register window.
    pub regs: u64,
    pub mm_base: u64,
    pub mm_size: u64,
    pub total_devices: u32,
    pub irq_base: Option<u32>,
    pub dt_node: NodeId,
    pub devices: Vec<OcapiDevice>,
    pub(crate) bdf2pe_cache: [AtomicU64; NPU2_MAX_BRICKS],
    /// Serializes OS calls touching this NPU's registers.
    pub lock: Lock,
}

impl Npu2 {
    pub fn new(chip_id: u32, npu_index: u32, xscom_base: u64, regs: u64, dt_node: NodeId) -> Self {
        Self {
            chip_id,
            npu_index,
            xscom_base,
            regs,
            mm_base: 0,
            mm_size: 0,
            total_devices: 0,
            irq_base: None,
            dt_node,
            devices: Vec::new(),
            bdf2pe_cache: Default::default(),
            lock: Lock::new(),
        }
    }

    /// Last BDF-to-PE map value written for a brick.
    pub fn bdf2pe(&self, index: BrickIndex) -> u64 {
        self.bdf2pe_cache[index as usize].load(Ordering::SeqCst)
    }

    pub(crate) fn set_bdf2pe(&self, index: BrickIndex, val: u64) {
        self.bdf2pe_cache[index as usize].store(val, Ordering::SeqCst);
    }
}
