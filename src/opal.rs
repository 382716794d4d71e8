//! OS-visible control surface.
//!
//! The OS drives an OpenCAPI link through three NPU-specific calls (SPA
//! setup, SPA cache invalidation and TL negotiation) plus the generic PCI
//! calls a PHB answers. Arguments are checked before the NPU lock is taken;
//! register work happens under it.

use tock_registers::LocalRegisterCopy;

use crate::Npu2Ocapi;
use crate::brick::Block;
use crate::config::{MAX_PE_HANDLE, TL_RATE_BUF_SIZE};
use crate::err::{OPAL_PARAMETER, OPAL_SUCCESS, OcapiError, opal_rc};
use crate::hal::is_template_supported;
use crate::lock::CpuHandle;
use crate::osal::Osal;
use crate::phb::PeMapping;
use crate::registers::consts::*;
use crate::registers::otl::OTL_CONFIG0;
use crate::registers::xsl::{PSL_LLCMD, PSL_SPAP};
use crate::registers::{ScomValue, encode, reg_offset};

pub const OPAL_NPU_SPA_SETUP: u64 = 159;
pub const OPAL_NPU_SPA_CLEAR_CACHE: u64 = 160;
pub const OPAL_NPU_TL_SET: u64 = 161;

/// Polls of the cache-invalidate busy bit, 200us apart.
const SPA_CLEAR_CACHE_RETRIES: u32 = 5;
const SPA_CLEAR_CACHE_POLL_US: u32 = 200;

/// One OS call, with its raw arguments.
#[derive(Debug)]
pub enum OpalCall<'a> {
    SpaSetup {
        phb_id: u64,
        bdfn: u32,
        addr: u64,
        pe_mask: u64,
    },
    SpaClearCache {
        phb_id: u64,
        bdfn: u32,
        pe_handle: u64,
    },
    TlSet {
        phb_id: u64,
        bdfn: u32,
        capabilities: u64,
        rate_phys: u64,
        rate_sz: u32,
    },
    SetPe {
        phb_id: u64,
        mapping: PeMapping,
    },
    PciConfigRead8 {
        phb_id: u64,
        bdfn: u32,
        offset: u32,
        data: &'a mut u8,
    },
    PciConfigRead16 {
        phb_id: u64,
        bdfn: u32,
        offset: u32,
        data: &'a mut u16,
    },
    PciConfigRead32 {
        phb_id: u64,
        bdfn: u32,
        offset: u32,
        data: &'a mut u32,
    },
    PciConfigWrite8 {
        phb_id: u64,
        bdfn: u32,
        offset: u32,
        data: u8,
    },
    PciConfigWrite16 {
        phb_id: u64,
        bdfn: u32,
        offset: u32,
        data: u16,
    },
    PciConfigWrite32 {
        phb_id: u64,
        bdfn: u32,
        offset: u32,
        data: u32,
    },
}

impl OpalCall<'_> {
    /// OPAL token of the NPU-specific calls.
    pub fn token(&self) -> Option<u64> {
        match self {
            OpalCall::SpaSetup { .. } => Some(OPAL_NPU_SPA_SETUP),
            OpalCall::SpaClearCache { .. } => Some(OPAL_NPU_SPA_CLEAR_CACHE),
            OpalCall::TlSet { .. } => Some(OPAL_NPU_TL_SET),
            _ => None,
        }
    }
}

impl<O: Osal> Npu2Ocapi<O> {
    /// Installs (non-zero `addr`) or removes (zero `addr`) the Shared
    /// Process Area of a link and sets the PASID to PE-handle mask.
    pub fn spa_setup(
        &self,
        cpu: &CpuHandle<'_>,
        phb_id: u64,
        _bdfn: u32,
        addr: u64,
        pe_mask: u64,
    ) -> Result<(), OcapiError> {
        let (_, ctx) = self.phb_ctx(phb_id)?;
        if addr & 0xfff != 0 || pe_mask > 15 {
            return Err(OcapiError::InvalidParameter);
        }

        let index = ctx.dev.index;
        let stack = index.stack();
        let spap = if index.is_otl1() {
            NPU2_XSL_PSL_SPAP_A1
        } else {
            NPU2_XSL_PSL_SPAP_A0
        };
        let spap_reg = reg_offset(stack, Block::Xsl, spap);
        let hal = ctx.hal();

        let _guard = cpu.lock_guard(&ctx.npu.lock);
        let cur: ScomValue<PSL_SPAP::Register> = LocalRegisterCopy::new(hal.read(spap_reg)?);
        if (addr != 0) == cur.is_set(PSL_SPAP::EN) {
            return Err(OcapiError::Busy);
        }
        let val = if addr != 0 {
            addr | encode(PSL_SPAP::EN::SET)
        } else {
            0
        };
        hal.write(spap_reg, val)?;

        hal.modify(
            reg_offset(stack, index.block(), NPU2_OTL_CONFIG0),
            OTL_CONFIG0::PE_MASK.val(pe_mask),
        )?;
        Ok(())
    }

    /// Invalidates the XSL's cached copy of a process element.
    pub fn spa_clear_cache(
        &self,
        cpu: &CpuHandle<'_>,
        phb_id: u64,
        _bdfn: u32,
        pe_handle: u64,
    ) -> Result<(), OcapiError> {
        let (_, ctx) = self.phb_ctx(phb_id)?;
        if pe_handle > MAX_PE_HANDLE {
            return Err(OcapiError::InvalidParameter);
        }

        let index = ctx.dev.index;
        let llcmd = reg_offset(index.stack(), Block::Xsl, NPU2_XSL_PSL_LLCMD_A0);
        let hal = ctx.hal();
        let busy = |v: u64| PSL_LLCMD::BUSY.is_set(v);

        let _guard = cpu.lock_guard(&ctx.npu.lock);
        if busy(hal.read(llcmd)?) {
            return Err(OcapiError::Busy);
        }

        let cmd = PSL_LLCMD::PE_HANDLE.val(pe_handle) + PSL_LLCMD::CMD_INVALIDATE::SET;
        let cmd = if index.is_otl1() {
            cmd + PSL_LLCMD::OTL1::SET
        } else {
            cmd
        };
        hal.write(llcmd, encode(cmd))?;

        for _ in 0..SPA_CLEAR_CACHE_RETRIES {
            if !busy(hal.read(llcmd)?) {
                return Ok(());
            }
            self.osal.udelay(SPA_CLEAR_CACHE_POLL_US);
        }
        Err(OcapiError::Hardware)
    }

    /// Programs the TL templates the device can receive and the rate at
    /// which each may be sent.
    pub fn tl_set(
        &self,
        cpu: &CpuHandle<'_>,
        phb_id: u64,
        bdfn: u32,
        capabilities: u64,
        rate: &[u8],
    ) -> Result<(), OcapiError> {
        let (_, ctx) = self.phb_ctx(phb_id)?;
        let rate: &[u8; TL_RATE_BUF_SIZE] = rate
            .try_into()
            .map_err(|_| OcapiError::InvalidParameter)?;
        // template 0 is mandatory
        if !is_template_supported(0, capabilities) {
            return Err(OcapiError::InvalidParameter);
        }

        let hal = ctx.hal();
        let _guard = cpu.lock_guard(&ctx.npu.lock);
        let reg = hal.program_templates(ctx.dev.index, capabilities, rate)?;
        debug!(
            "OCAPI: Link {:x}:{:x}, TL conf1 register set to {:x}",
            phb_id, bdfn, reg
        );
        Ok(())
    }

    fn read_rate_buf(&self, rate_phys: u64, rate_sz: u32) -> Result<[u8; TL_RATE_BUF_SIZE], OcapiError> {
        if !self.osal.opal_addr_valid(rate_phys) || rate_sz as usize != TL_RATE_BUF_SIZE {
            return Err(OcapiError::InvalidParameter);
        }
        let mut buf = [0u8; TL_RATE_BUF_SIZE];
        for (i, b) in buf.iter_mut().enumerate() {
            *b = self.osal.in_8(rate_phys + i as u64);
        }
        Ok(buf)
    }

    /// Integer-returning OS call entry. Config reads leave all ones in
    /// `data` when they fail.
    pub fn opal_call(&self, cpu: &CpuHandle<'_>, call: OpalCall<'_>) -> i64 {
        match call {
            OpalCall::SpaSetup {
                phb_id,
                bdfn,
                addr,
                pe_mask,
            } => opal_rc(self.spa_setup(cpu, phb_id, bdfn, addr, pe_mask)),
            OpalCall::SpaClearCache {
                phb_id,
                bdfn,
                pe_handle,
            } => opal_rc(self.spa_clear_cache(cpu, phb_id, bdfn, pe_handle)),
            OpalCall::TlSet {
                phb_id,
                bdfn,
                capabilities,
                rate_phys,
                rate_sz,
            } => {
                if self.phb(phb_id).is_none() {
                    return OPAL_PARAMETER;
                }
                opal_rc(
                    self.read_rate_buf(rate_phys, rate_sz)
                        .and_then(|buf| self.tl_set(cpu, phb_id, bdfn, capabilities, &buf)),
                )
            }
            OpalCall::SetPe { phb_id, mapping } => opal_rc(self.set_pe(cpu, phb_id, &mapping)),
            OpalCall::PciConfigRead8 {
                phb_id,
                bdfn,
                offset,
                data,
            } => {
                *data = u8::MAX;
                match self.cfg_read8(phb_id, bdfn, offset) {
                    Ok(v) => {
                        *data = v;
                        OPAL_SUCCESS
                    }
                    Err(e) => e.opal_rc(),
                }
            }
            OpalCall::PciConfigRead16 {
                phb_id,
                bdfn,
                offset,
                data,
            } => {
                *data = u16::MAX;
                match self.cfg_read16(phb_id, bdfn, offset) {
                    Ok(v) => {
                        *data = v;
                        OPAL_SUCCESS
                    }
                    Err(e) => e.opal_rc(),
                }
            }
            OpalCall::PciConfigRead32 {
                phb_id,
                bdfn,
                offset,
                data,
            } => {
                *data = u32::MAX;
                match self.cfg_read32(phb_id, bdfn, offset) {
                    Ok(v) => {
                        *data = v;
                        OPAL_SUCCESS
                    }
                    Err(e) => e.opal_rc(),
                }
            }
            OpalCall::PciConfigWrite8 {
                phb_id,
                bdfn,
                offset,
                data,
            } => opal_rc(self.cfg_write8(phb_id, bdfn, offset, data)),
            OpalCall::PciConfigWrite16 {
                phb_id,
                bdfn,
                offset,
                data,
            } => opal_rc(self.cfg_write16(phb_id, bdfn, offset, data)),
            OpalCall::PciConfigWrite32 {
                phb_id,
                bdfn,
                offset,
                data,
            } => opal_rc(self.cfg_write32(phb_id, bdfn, offset, data)),
        }
    }
}
