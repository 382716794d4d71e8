//! Per-brick register-plane bring-up.

use tock_registers::LocalRegisterCopy;

use super::HardwareLayer;
use crate::brick::{Block, BrickIndex, Odl, Stack};
use crate::config::CQ_CTL_STATUS_TIMEOUT_MS;
use crate::err::OcapiError;
use crate::osal::Osal;
use crate::registers::consts::*;
use crate::registers::cq::*;
use crate::registers::misc::MISC_OPTICAL_IO_CFG0;
use crate::registers::obus::*;
use crate::registers::otl::OTL_CONFIG0;
use crate::registers::xsl::{XSL_WRAP_CFG, XTS_CFG, XTS_CFG2};
use crate::registers::{ScomValue, encode, reg_offset};

/// Fence state of a brick, as requested in FENCE_CONTROL and reported in
/// CQ_CTL_STATUS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FenceState {
    Unfenced = 0b00,
    Requested = 0b01,
    HalfFenced = 0b10,
    Fenced = 0b11,
}

impl<O: Osal> HardwareLayer<'_, O> {
    /// Runs the register bring-up of one brick, in hardware order.
    pub fn brick_config(&self, index: BrickIndex) -> Result<(), OcapiError> {
        self.disable_nvlink(index)?;
        self.set_transport_mux_controls(index)?;
        self.enable_odl_phy_mux(index)?;
        self.disable_alink_fp()?;
        self.enable_xsl_clocks(index)?;
        self.set_npcq_config(index)?;
        self.enable_xsl_xts_interfaces(index)?;
        self.enable_sm_allocation(index)?;
        self.enable_pb_snooping(index)
    }

    fn disable_nvlink(&self, index: BrickIndex) -> Result<(), OcapiError> {
        let reg = index.obus_phy_config_reg();
        debug!("OCAPI: Link {}: Disabling NVLink on OBUS", index.value());
        self.xscom_modify(
            reg,
            OBUS_IOOL_PHY_CONFIG::NV0_NPU_ENABLED::CLEAR
                + OBUS_IOOL_PHY_CONFIG::NV1_NPU_ENABLED::CLEAR
                + OBUS_IOOL_PHY_CONFIG::NV2_NPU_ENABLED::CLEAR,
        )?;
        Ok(())
    }

    fn set_transport_mux_controls(&self, index: BrickIndex) -> Result<(), OcapiError> {
        debug!("OCAPI: Link {}: Setting transport mux controls", index.value());
        let addr = reg_offset(Stack::Misc, Block::Misc, NPU2_MISC_OPTICAL_IO_CFG0);
        let mut reg: ScomValue<MISC_OPTICAL_IO_CFG0::Register> =
            LocalRegisterCopy::new(self.read(addr)?);
        let ndlmux = reg.read(MISC_OPTICAL_IO_CFG0::NDLMUX_BRK0TO2);
        let ocmux01 = reg.read(MISC_OPTICAL_IO_CFG0::OCMUX_BRK0TO1);
        let ocmux45 = reg.read(MISC_OPTICAL_IO_CFG0::OCMUX_BRK4TO5);
        match index {
            BrickIndex::Brick2 => reg.modify(
                MISC_OPTICAL_IO_CFG0::NDLMUX_BRK0TO2.val(ndlmux & !0b100)
                    + MISC_OPTICAL_IO_CFG0::OCMUX_BRK0TO1.val(ocmux01 | 0b10),
            ),
            BrickIndex::Brick3 => reg.modify(
                MISC_OPTICAL_IO_CFG0::NDLMUX_BRK0TO2.val(ndlmux & !0b010)
                    + MISC_OPTICAL_IO_CFG0::OCMUX_BRK0TO1.val(ocmux01 | 0b01),
            ),
            BrickIndex::Brick4 => {
                reg.modify(MISC_OPTICAL_IO_CFG0::OCMUX_BRK4TO5.val(ocmux45 | 0b10))
            }
            BrickIndex::Brick5 => {
                reg.modify(MISC_OPTICAL_IO_CFG0::OCMUX_BRK4TO5.val(ocmux45 | 0b01))
            }
        }
        self.write(addr, reg.get())?;

        // Bricks 4 and 5 also need the PowerBus mux pointed at the NPU
        let mut pb: ScomValue<PU_IOE_PB_MISC_CFG::Register> =
            LocalRegisterCopy::new(self.xscom_read(PU_IOE_PB_MISC_CFG)?);
        match index {
            BrickIndex::Brick4 => pb.modify(PU_IOE_PB_MISC_CFG::SEL_04_NPU_NOT_PB::SET),
            BrickIndex::Brick5 => pb.modify(PU_IOE_PB_MISC_CFG::SEL_05_NPU_NOT_PB::SET),
            _ => {}
        }
        self.xscom_write(PU_IOE_PB_MISC_CFG, pb.get())
    }

    fn enable_odl_phy_mux(&self, index: BrickIndex) -> Result<(), OcapiError> {
        debug!("OCAPI: Link {}: Enabling ODL to PHY MUXes", index.value());
        let addr = index.obus_phy_config_reg();
        let mut reg: ScomValue<OBUS_IOOL_PHY_CONFIG::Register> =
            LocalRegisterCopy::new(self.xscom_read(addr)?);
        match index.odl() {
            Odl::Odl0 => reg.modify(OBUS_IOOL_PHY_CONFIG::ODL0_ENABLED::SET),
            Odl::Odl1 => reg.modify(OBUS_IOOL_PHY_CONFIG::ODL1_ENABLED::SET),
        }
        if self.osal.ocapi().odl_phy_swap {
            reg.modify(OBUS_IOOL_PHY_CONFIG::ODL_PHY_SWAP::SET);
        } else {
            reg.modify(OBUS_IOOL_PHY_CONFIG::ODL_PHY_SWAP::CLEAR);
        }
        reg.modify(
            OBUS_IOOL_PHY_CONFIG::LINK0_OLL_ENABLED::CLEAR
                + OBUS_IOOL_PHY_CONFIG::LINK1_OLL_ENABLED::CLEAR,
        );
        self.xscom_write(addr, reg.get())
    }

    fn disable_alink_fp(&self) -> Result<(), OcapiError> {
        debug!("OCAPI: Disabling A-Link framer/parser");
        let val = encode(
            PU_IOE_PB_FP_CFG::FP0_FMR_DISABLE::SET
                + PU_IOE_PB_FP_CFG::FP0_PRS_DISABLE::SET
                + PU_IOE_PB_FP_CFG::FP1_FMR_DISABLE::SET
                + PU_IOE_PB_FP_CFG::FP1_PRS_DISABLE::SET,
        );
        for reg in [
            PU_IOE_PB_FP01_CFG,
            PU_IOE_PB_FP23_CFG,
            PU_IOE_PB_FP45_CFG,
            PU_IOE_PB_FP67_CFG,
        ] {
            self.xscom_write(reg, val)?;
        }
        Ok(())
    }

    fn enable_xsl_clocks(&self, index: BrickIndex) -> Result<(), OcapiError> {
        debug!("OCAPI: Link {}: Enable XSL clocks", index.value());
        self.write(
            reg_offset(index.stack(), Block::Xsl, NPU2_XSL_WRAP_CFG),
            encode(XSL_WRAP_CFG::XSLO_CLOCK_ENABLE::SET),
        )
    }

    fn set_npcq_config(&self, index: BrickIndex) -> Result<(), OcapiError> {
        let stack = index.stack();
        debug!("OCAPI: Link {}: Set NPCQ Config", index.value());

        // Enable the OTL before lifting the fence
        self.write(
            reg_offset(stack, index.block(), NPU2_OTL_CONFIG0),
            encode(OTL_CONFIG0::EN::SET),
        )?;

        self.set_fence_control(index, FenceState::Requested)?;

        let otl_en = if index.is_otl1() {
            CQ_CTL_MISC_CFG::CONFIG_OTL1_ENABLE::SET
        } else {
            CQ_CTL_MISC_CFG::CONFIG_OTL0_ENABLE::SET
        };
        self.modify(
            reg_offset(stack, Block::Ctl, NPU2_CQ_CTL_MISC_CFG),
            CQ_CTL_MISC_CFG::CONFIG_OCAPI_MODE::SET + otl_en,
        )?;

        self.set_fence_control(index, FenceState::Fenced)?;
        self.set_fence_control(index, FenceState::HalfFenced)?;

        self.modify(
            reg_offset(stack, Block::Dat, NPU2_CQ_DAT_MISC_CFG),
            CQ_DAT_MISC_CFG::CONFIG_OCAPI_MODE::SET,
        )?;

        for sm in Block::SM {
            self.modify(
                reg_offset(stack, sm, NPU2_CQ_SM_MISC_CFG0),
                CQ_SM_MISC_CFG0::CONFIG_OCAPI_MODE::SET,
            )?;
        }
        Ok(())
    }

    fn enable_xsl_xts_interfaces(&self, index: BrickIndex) -> Result<(), OcapiError> {
        debug!("OCAPI: Link {}: Enable XSL-XTS interfaces", index.value());
        self.modify(
            reg_offset(Stack::Misc, Block::Xts, NPU2_XTS_CFG),
            XTS_CFG::OPENCAPI::SET,
        )?;
        let ena = match index.stack() {
            Stack::Stck2 => XTS_CFG2::XSL2_ENA::SET,
            _ => XTS_CFG2::XSL1_ENA::SET,
        };
        self.modify(reg_offset(Stack::Misc, Block::Xts, NPU2_XTS_CFG2), ena)?;
        Ok(())
    }

    fn enable_sm_allocation(&self, index: BrickIndex) -> Result<(), OcapiError> {
        debug!("OCAPI: Link {}: Setting SM allocation", index.value());
        for sm in Block::SM {
            self.modify(
                reg_offset(index.stack(), sm, NPU2_LOW_WATER_MARKS),
                LOW_WATER_MARKS::ENABLE_MACHINE_ALLOC::SET,
            )?;
        }
        Ok(())
    }

    fn enable_pb_snooping(&self, index: BrickIndex) -> Result<(), OcapiError> {
        debug!("OCAPI: Link {}: Enable PowerBus snooping", index.value());
        for sm in Block::SM {
            self.modify(
                reg_offset(index.stack(), sm, NPU2_CQ_SM_MISC_CFG0),
                CQ_SM_MISC_CFG0::CONFIG_ENABLE_PBUS::SET,
            )?;
        }
        Ok(())
    }

    /// Requests a fence state for a brick and waits for the CQ to report
    /// it, for at most [`CQ_CTL_STATUS_TIMEOUT_MS`].
    pub fn set_fence_control(&self, index: BrickIndex, state: FenceState) -> Result<(), OcapiError> {
        let stack = index.stack();
        let (control, status_field) = if index.is_otl1() {
            (NPU2_CQ_CTL_FENCE_CONTROL_1, CQ_CTL_STATUS::BRK1_AM_FENCED)
        } else {
            (NPU2_CQ_CTL_FENCE_CONTROL_0, CQ_CTL_STATUS::BRK0_AM_FENCED)
        };
        let expected = state as u64;

        self.write(
            reg_offset(stack, Block::Ctl, control),
            encode(CQ_CTL_FENCE_CONTROL::REQUEST_FENCE.val(expected)),
        )?;

        let status_reg = reg_offset(stack, Block::Ctl, NPU2_CQ_CTL_STATUS);
        let start = self.osal.get_time_us();
        loop {
            let got = status_field.read(self.read(status_reg)?);
            if got == expected {
                return Ok(());
            }
            if self
                .osal
                .timeout_check(start, (CQ_CTL_STATUS_TIMEOUT_MS * 1000) as u32)
            {
                error!(
                    "OCAPI: Fence status for brick {} stuck: expected 0x{:x}, got 0x{:x}",
                    index.value(),
                    expected,
                    got
                );
                return Err(OcapiError::Hardware);
            }
            self.osal.msleep(1);
        }
    }
}
