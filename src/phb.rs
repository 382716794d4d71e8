//! OpenCAPI PHBs.
//!
//! Each trained (or deliberately untrained) brick is published to the OS as
//! a PHB of its own. The host dispatches through [`PhbOps`]: only the
//! operations an OpenCAPI link can honour are populated, everything else is
//! `None` and reported as unsupported.
//!
//! Config space of the AFU is reached through the GENID window of the
//! brick's stack: the config address goes into the first doubleword and the
//! payload is read or written 128 bytes further in.

use alloc::vec::Vec;

use crate::Npu2Ocapi;
use crate::brick::{Block, Stack};
use crate::config::MAX_PE_NUM;
use crate::device::{Npu2, OcapiDevice};
use crate::dt::{DeviceTree, NodeId, hi32, lo32};
use crate::err::OcapiError;
use crate::hal::HardwareLayer;
use crate::lock::CpuHandle;
use crate::osal::Osal;
use crate::registers::consts::*;
use crate::registers::cq::CQ_CTL_CONFIG_ADDR;
use crate::registers::misc::MISC_BRICK_BDF2PE_MAP;
use crate::registers::{encode, reg_offset};

pub const OPAL_PCI_BUS_ALL: u8 = 7;
pub const OPAL_COMPARE_RID_DEVICE_NUMBER: u8 = 1;
pub const OPAL_COMPARE_RID_FUNCTION_NUMBER: u8 = 1;

pub const OPAL_UNMAP_PE: u8 = 0;
pub const OPAL_MAP_PE: u8 = 1;

pub const OPAL_EEH_STOPPED_NOT_FROZEN: u8 = 0;
pub const OPAL_EEH_NO_ERROR: u16 = 0;

/// Offset of the config data window from the config address register.
const CFG_DATA_OFFSET: u64 = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhbType {
    Npu2Opencapi,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeAction {
    Unmap,
    Map,
}

impl TryFrom<u8> for PeAction {
    type Error = OcapiError;

    fn try_from(action: u8) -> Result<Self, Self::Error> {
        match action {
            OPAL_UNMAP_PE => Ok(PeAction::Unmap),
            OPAL_MAP_PE => Ok(PeAction::Map),
            _ => Err(OcapiError::InvalidParameter),
        }
    }
}

/// Arguments of a PE map request, as passed by the OS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeMapping {
    pub pe_num: u64,
    pub bdfn: u64,
    pub bcompare: u8,
    pub dcompare: u8,
    pub fcompare: u8,
    pub action: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreezeStatus {
    pub freeze_state: u8,
    pub pci_error_type: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemWindow {
    pub window_type: u16,
    pub window_num: u16,
    pub addr: u64,
    pub pci_addr: u64,
    pub size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmaWindow {
    pub pe_num: u64,
    pub window_id: u16,
    pub tce_levels: u16,
    pub tce_table_addr: u64,
    pub tce_table_size: u64,
    pub tce_page_size: u64,
}

/// What an operation sees of the PHB it runs on.
pub struct PhbCtx<'a, O> {
    pub osal: &'a O,
    pub npu: &'a Npu2,
    pub dev: &'a OcapiDevice,
}

impl<'a, O: Osal> PhbCtx<'a, O> {
    pub fn hal(&self) -> HardwareLayer<'a, O> {
        HardwareLayer::new(self.osal, self.npu.chip_id, self.npu.xscom_base)
    }
}

pub type CfgReadFn<O, T> = fn(&PhbCtx<'_, O>, u32, u32) -> Result<T, OcapiError>;
pub type CfgWriteFn<O, T> = fn(&PhbCtx<'_, O>, u32, u32, T) -> Result<(), OcapiError>;

/// PHB operation table.
pub struct PhbOps<O> {
    pub cfg_read8: Option<CfgReadFn<O, u8>>,
    pub cfg_read16: Option<CfgReadFn<O, u16>>,
    pub cfg_read32: Option<CfgReadFn<O, u32>>,
    pub cfg_write8: Option<CfgWriteFn<O, u8>>,
    pub cfg_write16: Option<CfgWriteFn<O, u16>>,
    pub cfg_write32: Option<CfgWriteFn<O, u32>>,
    pub set_pe: Option<fn(&PhbCtx<'_, O>, &CpuHandle<'_>, &PeMapping) -> Result<(), OcapiError>>,
    pub phb_final_fixup: Option<fn(&PhbCtx<'_, O>, &mut DeviceTree, NodeId)>,
    pub ioda_reset: Option<fn(&PhbCtx<'_, O>, bool) -> Result<(), OcapiError>>,
    pub eeh_freeze_status: Option<fn(&PhbCtx<'_, O>, u64) -> Result<FreezeStatus, OcapiError>>,
    pub choose_bus: Option<fn(&PhbCtx<'_, O>, u32, u8) -> Result<u8, OcapiError>>,
    pub device_init: Option<fn(&PhbCtx<'_, O>, u32) -> Result<(), OcapiError>>,
    pub set_phb_mem_window: Option<fn(&PhbCtx<'_, O>, &MemWindow) -> Result<(), OcapiError>>,
    pub map_pe_dma_window: Option<fn(&PhbCtx<'_, O>, &DmaWindow) -> Result<(), OcapiError>>,
    pub eeh_freeze_clear: Option<fn(&PhbCtx<'_, O>, u64, u64) -> Result<(), OcapiError>>,
    pub get_diag_data2: Option<fn(&PhbCtx<'_, O>, &mut [u8]) -> Result<(), OcapiError>>,
    pub tce_kill: Option<fn(&PhbCtx<'_, O>, u32, u64, u64, u32) -> Result<(), OcapiError>>,
}

impl<O> Clone for PhbOps<O> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<O> Copy for PhbOps<O> {}

impl<O: Osal> PhbOps<O> {
    pub fn opencapi() -> Self {
        Self {
            cfg_read8: Some(cfg_read8::<O>),
            cfg_read16: Some(cfg_read16::<O>),
            cfg_read32: Some(cfg_read32::<O>),
            cfg_write8: Some(cfg_write8::<O>),
            cfg_write16: Some(cfg_write16::<O>),
            cfg_write32: Some(cfg_write32::<O>),
            set_pe: Some(set_pe::<O>),
            phb_final_fixup: Some(final_fixup::<O>),
            ioda_reset: Some(ioda_reset::<O>),
            eeh_freeze_status: Some(eeh_freeze_status::<O>),
            choose_bus: None,
            device_init: None,
            set_phb_mem_window: None,
            map_pe_dma_window: None,
            eeh_freeze_clear: None,
            get_diag_data2: None,
            tce_kill: None,
        }
    }
}

/// Slot operation table.
pub struct SlotOps<O> {
    pub get_presence_state: Option<fn(&PhbCtx<'_, O>) -> Result<u8, OcapiError>>,
    pub get_link_state: Option<fn(&PhbCtx<'_, O>) -> Result<u8, OcapiError>>,
    pub get_power_state: Option<fn(&PhbCtx<'_, O>) -> Result<u8, OcapiError>>,
    pub get_attention_state: Option<fn(&PhbCtx<'_, O>) -> Result<u8, OcapiError>>,
    pub get_latch_state: Option<fn(&PhbCtx<'_, O>) -> Result<u8, OcapiError>>,
    pub set_power_state: Option<fn(&PhbCtx<'_, O>, u8) -> Result<(), OcapiError>>,
    pub set_attention_state: Option<fn(&PhbCtx<'_, O>, u8) -> Result<(), OcapiError>>,
}

impl<O> Clone for SlotOps<O> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<O> Copy for SlotOps<O> {}

impl<O: Osal> SlotOps<O> {
    pub fn opencapi() -> Self {
        Self {
            get_presence_state: None,
            get_link_state: Some(get_link_state::<O>),
            get_power_state: None,
            get_attention_state: None,
            get_latch_state: None,
            set_power_state: None,
            set_attention_state: None,
        }
    }
}

pub struct OcapiPhb<O> {
    pub opal_id: u64,
    pub phb_type: PhbType,
    pub dt_node: NodeId,
    pub scan_map: u32,
    pub ops: PhbOps<O>,
    pub slot: Option<SlotOps<O>>,
    pub(crate) npu: usize,
    pub(crate) dev: usize,
}

fn pcicfg_window<O: Osal>(
    ctx: &PhbCtx<'_, O>,
    bdfn: u32,
    offset: u32,
    size: u32,
) -> Result<u64, OcapiError> {
    if offset > 0xfff || offset & (size - 1) != 0 {
        return Err(OcapiError::InvalidParameter);
    }
    let genid_base = ctx.dev.genid_base();
    let cfg_addr = encode(
        CQ_CTL_CONFIG_ADDR::ENABLE::SET
            + CQ_CTL_CONFIG_ADDR::BDFN.val(bdfn as u64)
            + CQ_CTL_CONFIG_ADDR::REGISTER_NUMBER.val((offset & !3) as u64),
    );
    ctx.osal.out_be64(genid_base, cfg_addr);
    ctx.osal.sync();
    Ok(genid_base + CFG_DATA_OFFSET)
}

fn cfg_read8<O: Osal>(ctx: &PhbCtx<'_, O>, bdfn: u32, offset: u32) -> Result<u8, OcapiError> {
    let data = pcicfg_window(ctx, bdfn, offset, 1)?;
    Ok(ctx.osal.in_8(data + (offset & 3) as u64))
}

fn cfg_read16<O: Osal>(ctx: &PhbCtx<'_, O>, bdfn: u32, offset: u32) -> Result<u16, OcapiError> {
    let data = pcicfg_window(ctx, bdfn, offset, 2)?;
    Ok(ctx.osal.in_le16(data + (offset & 2) as u64))
}

fn cfg_read32<O: Osal>(ctx: &PhbCtx<'_, O>, bdfn: u32, offset: u32) -> Result<u32, OcapiError> {
    let data = pcicfg_window(ctx, bdfn, offset, 4)?;
    Ok(ctx.osal.in_le32(data))
}

fn cfg_write8<O: Osal>(
    ctx: &PhbCtx<'_, O>,
    bdfn: u32,
    offset: u32,
    val: u8,
) -> Result<(), OcapiError> {
    let data = pcicfg_window(ctx, bdfn, offset, 1)?;
    ctx.osal.out_8(data + (offset & 3) as u64, val);
    Ok(())
}

fn cfg_write16<O: Osal>(
    ctx: &PhbCtx<'_, O>,
    bdfn: u32,
    offset: u32,
    val: u16,
) -> Result<(), OcapiError> {
    let data = pcicfg_window(ctx, bdfn, offset, 2)?;
    ctx.osal.out_le16(data + (offset & 2) as u64, val);
    Ok(())
}

fn cfg_write32<O: Osal>(
    ctx: &PhbCtx<'_, O>,
    bdfn: u32,
    offset: u32,
    val: u32,
) -> Result<(), OcapiError> {
    let data = pcicfg_window(ctx, bdfn, offset, 4)?;
    ctx.osal.out_le32(data, val);
    Ok(())
}

fn set_pe<O: Osal>(ctx: &PhbCtx<'_, O>, cpu: &CpuHandle<'_>, pe: &PeMapping) -> Result<(), OcapiError> {
    let action = PeAction::try_from(pe.action)?;
    if pe.pe_num >= MAX_PE_NUM || pe.bdfn >> 8 != 0 {
        return Err(OcapiError::InvalidParameter);
    }
    if pe.bcompare != OPAL_PCI_BUS_ALL
        || pe.dcompare != OPAL_COMPARE_RID_DEVICE_NUMBER
        || pe.fcompare != OPAL_COMPARE_RID_FUNCTION_NUMBER
    {
        return Err(OcapiError::Unsupported);
    }

    let index = ctx.dev.index;
    let val = encode(
        MISC_BRICK_BDF2PE_MAP::ENABLE::SET
            + MISC_BRICK_BDF2PE_MAP::PE.val(pe.pe_num)
            + MISC_BRICK_BDF2PE_MAP::BDF.val(ctx.dev.bdfn as u64),
    );
    let reg = reg_offset(
        Stack::Misc,
        Block::Misc,
        NPU2_MISC_BRICK0_BDF2PE_MAP0 + index.value() as u64 * NPU2_MISC_BRICK_BDF2PE_STRIDE,
    );
    debug!("OCAPI: Link {}: {:?} PE {}", index.value(), action, pe.pe_num);

    let _guard = cpu.lock_guard(&ctx.npu.lock);
    ctx.npu.set_bdf2pe(index, val);
    ctx.hal().write(reg, val)
}

/// Publishes the translation-fault IRQ and OSL fault registers on every
/// device found below the PHB, at any depth.
fn final_fixup<O: Osal>(ctx: &PhbCtx<'_, O>, dt: &mut DeviceTree, phb_node: NodeId) {
    let Some(irq_base) = ctx.npu.irq_base else {
        return;
    };
    let index = ctx.dev.index;
    let irq = index.xsl_irq(irq_base);
    let stacku = index.stack_upper();
    let block = index.block();

    let mmio: Vec<u32> = [
        NPU2_OTL_OSL_DSISR,
        NPU2_OTL_OSL_DAR,
        NPU2_OTL_OSL_TFC,
        NPU2_OTL_OSL_PEHANDLE,
    ]
    .iter()
    .flat_map(|&off| {
        let addr = ctx.npu.regs + reg_offset(stacku, block, off);
        [hi32(addr), lo32(addr)]
    })
    .collect();

    for dev in dt.descendants(phb_node) {
        debug!("OCAPI: Adding XSL IRQ {} and MMIO to {}", irq, dt.path(dev));
        dt.add_property_cells(dev, "ibm,opal-xsl-irq", &[irq]);
        dt.add_property_cells(dev, "ibm,opal-xsl-mmio", &mmio);
    }
}

fn ioda_reset<O: Osal>(_ctx: &PhbCtx<'_, O>, _purge: bool) -> Result<(), OcapiError> {
    Ok(())
}

fn eeh_freeze_status<O: Osal>(_ctx: &PhbCtx<'_, O>, _pe_num: u64) -> Result<FreezeStatus, OcapiError> {
    Ok(FreezeStatus {
        freeze_state: OPAL_EEH_STOPPED_NOT_FROZEN,
        pci_error_type: OPAL_EEH_NO_ERROR,
    })
}

fn get_link_state<O: Osal>(ctx: &PhbCtx<'_, O>) -> Result<u8, OcapiError> {
    let width = ctx.hal().link_width(ctx.dev.index).map_err(|e| {
        error!("OCAPI: Link {}: invalid link width", ctx.dev.index.value());
        e
    })?;
    Ok(width.lanes())
}

impl<O: Osal> Npu2Ocapi<O> {
    pub fn phb(&self, opal_id: u64) -> Option<&OcapiPhb<O>> {
        self.phbs.iter().find(|p| p.opal_id == opal_id)
    }

    pub(crate) fn phb_ctx(&self, opal_id: u64) -> Result<(&OcapiPhb<O>, PhbCtx<'_, O>), OcapiError> {
        let phb = self.phb(opal_id).ok_or(OcapiError::InvalidParameter)?;
        let npu = self.npus.get(phb.npu).ok_or(OcapiError::InvalidParameter)?;
        let dev = npu.devices.get(phb.dev).ok_or(OcapiError::InvalidParameter)?;
        Ok((
            phb,
            PhbCtx {
                osal: &self.osal,
                npu,
                dev,
            },
        ))
    }

    pub fn cfg_read8(&self, phb_id: u64, bdfn: u32, offset: u32) -> Result<u8, OcapiError> {
        let (phb, ctx) = self.phb_ctx(phb_id)?;
        let op = phb.ops.cfg_read8.ok_or(OcapiError::Unsupported)?;
        op(&ctx, bdfn, offset)
    }

    pub fn cfg_read16(&self, phb_id: u64, bdfn: u32, offset: u32) -> Result<u16, OcapiError> {
        let (phb, ctx) = self.phb_ctx(phb_id)?;
        let op = phb.ops.cfg_read16.ok_or(OcapiError::Unsupported)?;
        op(&ctx, bdfn, offset)
    }

    pub fn cfg_read32(&self, phb_id: u64, bdfn: u32, offset: u32) -> Result<u32, OcapiError> {
        let (phb, ctx) = self.phb_ctx(phb_id)?;
        let op = phb.ops.cfg_read32.ok_or(OcapiError::Unsupported)?;
        op(&ctx, bdfn, offset)
    }

    pub fn cfg_write8(&self, phb_id: u64, bdfn: u32, offset: u32, val: u8) -> Result<(), OcapiError> {
        let (phb, ctx) = self.phb_ctx(phb_id)?;
        let op = phb.ops.cfg_write8.ok_or(OcapiError::Unsupported)?;
        op(&ctx, bdfn, offset, val)
    }

    pub fn cfg_write16(&self, phb_id: u64, bdfn: u32, offset: u32, val: u16) -> Result<(), OcapiError> {
        let (phb, ctx) = self.phb_ctx(phb_id)?;
        let op = phb.ops.cfg_write16.ok_or(OcapiError::Unsupported)?;
        op(&ctx, bdfn, offset, val)
    }

    pub fn cfg_write32(&self, phb_id: u64, bdfn: u32, offset: u32, val: u32) -> Result<(), OcapiError> {
        let (phb, ctx) = self.phb_ctx(phb_id)?;
        let op = phb.ops.cfg_write32.ok_or(OcapiError::Unsupported)?;
        op(&ctx, bdfn, offset, val)
    }

    /// Maps (or unmaps) the brick's BDF to a PE.
    pub fn set_pe(&self, cpu: &CpuHandle<'_>, phb_id: u64, pe: &PeMapping) -> Result<(), OcapiError> {
        let (phb, ctx) = self.phb_ctx(phb_id)?;
        let op = phb.ops.set_pe.ok_or(OcapiError::Unsupported)?;
        op(&ctx, cpu, pe)
    }

    pub fn ioda_reset(&self, phb_id: u64, purge: bool) -> Result<(), OcapiError> {
        let (phb, ctx) = self.phb_ctx(phb_id)?;
        let op = phb.ops.ioda_reset.ok_or(OcapiError::Unsupported)?;
        op(&ctx, purge)
    }

    pub fn eeh_freeze_status(&self, phb_id: u64, pe_num: u64) -> Result<FreezeStatus, OcapiError> {
        let (phb, ctx) = self.phb_ctx(phb_id)?;
        let op = phb.ops.eeh_freeze_status.ok_or(OcapiError::Unsupported)?;
        op(&ctx, pe_num)
    }

    pub fn eeh_freeze_clear(&self, phb_id: u64, pe_num: u64, opt: u64) -> Result<(), OcapiError> {
        let (phb, ctx) = self.phb_ctx(phb_id)?;
        let op = phb.ops.eeh_freeze_clear.ok_or(OcapiError::Unsupported)?;
        op(&ctx, pe_num, opt)
    }

    pub fn device_init(&self, phb_id: u64, bdfn: u32) -> Result<(), OcapiError> {
        let (phb, ctx) = self.phb_ctx(phb_id)?;
        let op = phb.ops.device_init.ok_or(OcapiError::Unsupported)?;
        op(&ctx, bdfn)
    }

    pub fn set_phb_mem_window(&self, phb_id: u64, window: &MemWindow) -> Result<(), OcapiError> {
        let (phb, ctx) = self.phb_ctx(phb_id)?;
        let op = phb.ops.set_phb_mem_window.ok_or(OcapiError::Unsupported)?;
        op(&ctx, window)
    }

    pub fn map_pe_dma_window(&self, phb_id: u64, window: &DmaWindow) -> Result<(), OcapiError> {
        let (phb, ctx) = self.phb_ctx(phb_id)?;
        let op = phb.ops.map_pe_dma_window.ok_or(OcapiError::Unsupported)?;
        op(&ctx, window)
    }

    pub fn get_diag_data2(&self, phb_id: u64, buf: &mut [u8]) -> Result<(), OcapiError> {
        let (phb, ctx) = self.phb_ctx(phb_id)?;
        let op = phb.ops.get_diag_data2.ok_or(OcapiError::Unsupported)?;
        op(&ctx, buf)
    }

    /// Link width of the PHB's slot, in lanes.
    pub fn slot_link_state(&self, phb_id: u64) -> Result<u8, OcapiError> {
        let (phb, ctx) = self.phb_ctx(phb_id)?;
        let op = phb
            .slot
            .and_then(|s| s.get_link_state)
            .ok_or(OcapiError::Unsupported)?;
        op(&ctx)
    }

    /// Runs the final fixup of every registered PHB once the PCI devices
    /// below them are in the tree.
    pub fn final_fixup(&self, dt: &mut DeviceTree) {
        for phb in &self.phbs {
            let Some(op) = phb.ops.phb_final_fixup else {
                continue;
            };
            if let Ok((_, ctx)) = self.phb_ctx(phb.opal_id) {
                op(&ctx, dt, phb.dt_node);
            }
        }
    }
}
