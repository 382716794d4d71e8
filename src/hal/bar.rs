//! BAR programming.
//!
//! Every BAR of a stack is replicated into the four SM blocks; the CQ picks
//! whichever SM handles a request.

use super::HardwareLayer;
use crate::brick::{Block, Stack};
use crate::device::{Npu2Bar, OcapiDevice};
use crate::err::OcapiError;
use crate::osal::{Osal, PhysMapKind};
use crate::registers::consts::*;
use crate::registers::cq::{CQ_CTL_MISC_MMIOPA, GENID_BAR, NTL_BAR, PHY_BAR};
use crate::registers::{encode, reg_offset};

/// Layout of a BAR register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarKind {
    Phy,
    Ntl,
    Genid,
}

/// log2 of a window size in 64K units.
fn size_code(size: u64) -> u64 {
    (size >> 16).checked_ilog2().unwrap_or(0) as u64
}

impl BarKind {
    pub fn encode(self, addr: u64, size: u64) -> u64 {
        match self {
            BarKind::Phy => encode(PHY_BAR::ENABLE::SET + PHY_BAR::ADDR.val(addr >> 21)),
            BarKind::Ntl => encode(
                NTL_BAR::ENABLE::SET
                    + NTL_BAR::ADDR.val(addr >> 16)
                    + NTL_BAR::SIZE.val(size_code(size)),
            ),
            BarKind::Genid => encode(GENID_BAR::ENABLE::SET + GENID_BAR::ADDR.val(addr >> 16)),
        }
    }
}

impl<O: Osal> HardwareLayer<'_, O> {
    /// Writes a BAR into SM0..SM3 of `stack`.
    pub fn write_bar(
        &self,
        kind: BarKind,
        stack: Stack,
        offset: u64,
        addr: u64,
        size: u64,
    ) -> Result<(), OcapiError> {
        let val = kind.encode(addr, size);
        for sm in Block::SM {
            let reg = reg_offset(stack, sm, offset);
            self.write(reg, val)?;
            debug!("OCAPI: Setting BAR {:x} to {:x}", reg, val);
        }
        Ok(())
    }

    /// Global MMIO window: both PHY register windows and the NPU register
    /// window. Returns the NPU register window.
    pub fn setup_global_mmio_bar(&self) -> Result<(u64, u64), OcapiError> {
        let chip = self.chip_id();
        for (phy, stack) in [(0, Stack::Stck2), (1, Stack::Stck1)] {
            let (addr, size) = self.osal.phys_map_get(chip, PhysMapKind::NpuPhy, phy)?;
            self.write_bar(BarKind::Phy, stack, NPU2_PHY_BAR, addr, size)?;
        }
        let (addr, size) = self.osal.phys_map_get(chip, PhysMapKind::NpuRegs, 0)?;
        self.write_bar(BarKind::Phy, Stack::Stck0, NPU2_PHY_BAR, addr, size)?;
        Ok((addr, size))
    }

    /// AFU MMIO window of a brick, mirrored into the NTL BAR and the CQ's
    /// MMIO PA config.
    pub fn setup_afu_mmio_bars(&self, dev: &mut OcapiDevice) -> Result<(), OcapiError> {
        let index = dev.index;
        let (addr, size) = self.osal.phys_map_get(
            self.chip_id(),
            PhysMapKind::NpuOcapiMmio,
            index.value(),
        )?;
        debug!(
            "OCAPI: Link {}: Setup AFU MMIO BARs {:x} + {:x}",
            index.value(),
            addr,
            size
        );
        let (ntl, mmiopa) = if index.is_otl1() {
            (NPU2_NTL1_BAR, NPU2_CQ_CTL_MISC_MMIOPA1_CONFIG)
        } else {
            (NPU2_NTL0_BAR, NPU2_CQ_CTL_MISC_MMIOPA0_CONFIG)
        };
        self.write_bar(BarKind::Ntl, index.stack(), ntl, addr, size)?;
        self.write(
            reg_offset(index.stack(), Block::Ctl, mmiopa),
            encode(
                CQ_CTL_MISC_MMIOPA::ADDR.val(addr >> 16)
                    + CQ_CTL_MISC_MMIOPA::SIZE.val(size_code(size)),
            ),
        )?;
        dev.bars[0] = Npu2Bar { base: addr, size };
        Ok(())
    }

    /// GENID window of the brick's stack, which carries its config space.
    pub fn setup_afu_config_bars(&self, dev: &mut OcapiDevice) -> Result<(), OcapiError> {
        let index = dev.index;
        let (addr, size) = self.osal.phys_map_get(
            self.chip_id(),
            PhysMapKind::NpuGenid,
            index.stack_num(),
        )?;
        debug!(
            "OCAPI: Link {}: Setup AFU Config BARs {:x} + {:x}",
            index.value(),
            addr,
            size
        );
        self.write_bar(BarKind::Genid, index.stack(), NPU2_GENID_BAR, addr, size)?;
        dev.bars[1] = Npu2Bar { base: addr, size };
        Ok(())
    }
}
