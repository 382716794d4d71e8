use super::HardwareLayer;
use crate::brick::{Block, Stack};
use crate::config::NPU_IRQ_LEVELS;
use crate::device::Npu2;
use crate::err::OcapiError;
use crate::osal::Osal;
use crate::registers::consts::*;
use crate::registers::misc::*;
use crate::registers::reg_offset;

impl<O: Osal> HardwareLayer<'_, O> {
    /// Allocates the NPU's interrupt block and routes translation faults
    /// of every brick to it.
    pub fn setup_irq(&self, npu: &mut Npu2) -> Result<(), OcapiError> {
        let base = self
            .osal
            .xive_alloc_ipi_irqs(self.chip_id(), NPU_IRQ_LEVELS, 64)
            .ok_or_else(|| {
                error!("OCAPI: Couldn't allocate interrupts for NPU");
                OcapiError::ResourceExhausted
            })?;
        npu.irq_base = Some(base);

        self.osal.xive_register_ipi_source(base, NPU_IRQ_LEVELS);
        let mmio_addr = self.osal.xive_trigger_port(base);
        debug!("OCAPI: NPU base irq {} @{:x}", base, mmio_addr);
        self.write(
            reg_offset(Stack::Misc, Block::Misc, NPU2_MISC_IRQ_BASE),
            (mmio_addr & NPU2_MISC_IRQ_BASE_MASK) << 13,
        )?;

        // 64K pages, two per interrupt
        self.modify(
            reg_offset(Stack::Misc, Block::Misc, NPU2_MISC_CFG),
            MISC_CFG::IPI_PS::SET + MISC_CFG::IPI_OS::CLEAR,
        )?;

        self.modify(
            reg_offset(Stack::Misc, Block::Misc, NPU2_MISC_IRQ_ENABLE2),
            MISC_IRQ_ENABLE2::XSL_BRICKS.val(0xf),
        )?;

        self.mask_nvlink_fir()
    }

    /// NVLink stall/no-stall signals mean something else in OpenCAPI mode:
    /// mask them and keep them from freezing, fencing or interrupting.
    fn mask_nvlink_fir(&self) -> Result<(), OcapiError> {
        self.xscom_modify(
            self.scom_base() + NPU2_MISC_FIR_MASK1,
            MISC_NVLINK_DL::STALL_NOSTALL.val(0xfff),
        )?;
        for reg in [
            NPU2_MISC_FREEZE_ENABLE1,
            NPU2_MISC_FENCE_ENABLE1,
            NPU2_MISC_IRQ_ENABLE1,
        ] {
            self.modify(
                reg_offset(Stack::Misc, Block::Misc, reg),
                MISC_NVLINK_DL::STALL_NOSTALL.val(0),
            )?;
        }
        Ok(())
    }
}
