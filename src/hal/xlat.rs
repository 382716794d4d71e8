use super::HardwareLayer;
use crate::brick::{Block, BrickIndex};
use crate::err::OcapiError;
use crate::osal::Osal;
use crate::registers::consts::*;
use crate::registers::xsl::{PSL_SCNTL_A0, XSL_GP};
use crate::registers::{encode, reg_offset};

impl<O: Osal> HardwareLayer<'_, O> {
    /// Sets up the XSL for multi-AFU translation, with the DD2.0/DD2.1
    /// workarounds applied on Nimbus.
    pub fn address_translation_config(&self, index: BrickIndex) -> Result<(), OcapiError> {
        let stack = index.stack();
        debug!("OCAPI: Link {}: Address translation configuration", index.value());

        self.modify(
            reg_offset(stack, Block::Xsl, NPU2_XSL_PSL_SCNTL_A0),
            PSL_SCNTL_A0::MULTI_AFU_DIAL::SET,
        )?;

        let ec = self.osal.nimbus_ec_level();
        if ec == Some(0x20) {
            // DD2.0: bloom filter must be off, behind the GP unlock key
            let gp = reg_offset(stack, Block::Xsl, NPU2_XSL_GP);
            let val = self.read(gp)?;
            self.write(gp, NPU2_XSL_GP_UNLOCK)?;
            self.write(gp, val & !encode(XSL_GP::BLOOM_FILTER_ENABLE::SET))?;
        }
        if matches!(ec, Some(0x20) | Some(0x21)) {
            self.write(
                reg_offset(stack, Block::Xsl, NPU2_XSL_DEF),
                NPU2_XSL_DEF_EOA_FIX,
            )?;
        }
        Ok(())
    }
}
