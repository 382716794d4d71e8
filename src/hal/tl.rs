//! OpenCAPI transaction layer: static OTL setup and template programming.

use tock_registers::LocalRegisterCopy;

use super::HardwareLayer;
use crate::brick::BrickIndex;
use crate::config::{TL_MAX_TEMPLATE, TL_RATE_BUF_SIZE};
use crate::err::OcapiError;
use crate::osal::Osal;
use crate::registers::consts::*;
use crate::registers::otl::*;
use crate::registers::{ScomValue, encode, reg_offset};

/// Whether template `templ` is set in the capability bitmap.
pub fn is_template_supported(templ: u32, capabilities: u64) -> bool {
    templ <= TL_MAX_TEMPLATE && capabilities & (1u64 << templ) != 0
}

/// Rate of template `templ` in a TL rate buffer.
///
/// The buffer holds one nibble per template, template 63 first: byte 0
/// high nibble is template 63, byte 31 low nibble is template 0.
pub fn get_template_rate(templ: u32, rate_buf: &[u8; TL_RATE_BUF_SIZE]) -> u8 {
    let idx = (TL_MAX_TEMPLATE - templ) as usize;
    let shift = 4 * (1 - idx % 2);
    (rate_buf[idx / 2] >> shift) & 0xf
}

impl<O: Osal> HardwareLayer<'_, O> {
    /// Static transaction-layer setup of a brick.
    pub fn tl_config(&self, index: BrickIndex) -> Result<(), OcapiError> {
        let stack = index.stack();
        let block = index.block();
        debug!("OCAPI: Link {}: TL configuration", index.value());

        self.write(
            reg_offset(stack, block, NPU2_OTL_CONFIG0),
            encode(
                OTL_CONFIG0::EN::SET
                    + OTL_CONFIG0::BLOCK_PE_HANDLE::SET
                    + OTL_CONFIG0::BRICKID.val(index.brick_id())
                    + OTL_CONFIG0::ERAT_HASH_0.val(0b011001)
                    + OTL_CONFIG0::ERAT_HASH_1.val(0b000111)
                    + OTL_CONFIG0::ERAT_HASH_2.val(0b101100)
                    + OTL_CONFIG0::ERAT_HASH_3.val(0b100110),
            ),
        )?;

        // Template 0 only, at the slowest rate, until the OS negotiates
        self.write(
            reg_offset(stack, block, NPU2_OTL_CONFIG1),
            encode(
                OTL_CONFIG1::TX_TEMP0_RATE.val(0b1111)
                    + OTL_CONFIG1::TX_DRDY_WAIT.val(0b001)
                    + OTL_CONFIG1::TX_CRET_FREQ.val(0b001)
                    + OTL_CONFIG1::TX_AGE_FREQ.val(0b11000)
                    + OTL_CONFIG1::TX_RS2_HPWAIT.val(0b011011)
                    + OTL_CONFIG1::TX_RQ4_HPWAIT.val(0b011011)
                    + OTL_CONFIG1::TX_RQ6_HPWAIT.val(0b011011),
            ),
        )?;

        self.write(
            reg_offset(stack, block, NPU2_OTL_TLX_CREDITS),
            encode(
                OTL_TLX_CREDITS::VC0_CREDITS.val(0x40)
                    + OTL_TLX_CREDITS::VC3_CREDITS.val(0x40)
                    + OTL_TLX_CREDITS::DCP0_CREDITS.val(0x80)
                    + OTL_TLX_CREDITS::DCP1_CREDITS.val(0x80),
            ),
        )
    }

    /// Programs template enables and rates into OTL_CONFIG1. Returns the
    /// value written.
    pub fn program_templates(
        &self,
        index: BrickIndex,
        capabilities: u64,
        rate_buf: &[u8; TL_RATE_BUF_SIZE],
    ) -> Result<u64, OcapiError> {
        let addr = reg_offset(index.stack(), index.block(), NPU2_OTL_CONFIG1);
        let mut reg: ScomValue<OTL_CONFIG1::Register> = LocalRegisterCopy::new(self.read(addr)?);

        // Template 2 enable is left as found.
        reg.modify(OTL_CONFIG1::TX_TEMP1_EN::CLEAR + OTL_CONFIG1::TX_TEMP3_EN::CLEAR);

        for templ in 0..4u32 {
            let i = templ as usize;
            if let Some(en) = TX_TEMPLATE_EN[i] {
                if is_template_supported(templ, capabilities) {
                    reg.modify(en.val(1));
                }
            }
            let rate = get_template_rate(templ, rate_buf);
            reg.modify(TX_TEMPLATE_RATE[i].val(rate as u64));
        }
        self.write(addr, reg.get())?;
        Ok(reg.get())
    }

    /// Lets the OTL start sending once the link is trained.
    pub fn otl_enable_tx(&self, index: BrickIndex) -> Result<(), OcapiError> {
        let stack = index.stack();
        let block = index.block();
        self.write(
            reg_offset(stack, block, NPU2_OTL_CONFIG2),
            encode(OTL_CONFIG2::TX_SEND_EN::SET),
        )?;
        let credits = self.read(reg_offset(stack, block, NPU2_OTL_VC_CREDITS))?;
        debug!("OCAPI: Link {}: credit counter: {:016x}", index.value(), credits);
        Ok(())
    }
}
