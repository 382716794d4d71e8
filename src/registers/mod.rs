//! Register plane of the POWER9 NPU.
//!
//! The NPU is reached two ways: chip-level XSCOM registers (OBUS, PowerBus
//! and the NPU's own FIR/indirect window) through [`ScomBus`], and the
//! NPU-internal register space through the indirect address/data pair exposed
//! by [`Npu2Scom`]. Config space and OS-visible windows are plain MMIO through
//! [`Mmio`].
//!
//! Register fields are described with [`tock_registers`] bitfields over
//! `u64`. The hardware documents bits MSB-first (PPC numbering); every
//! `OFFSET` below is the LSB offset `63 - last_ppc_bit`.

use core::ptr;

use tock_registers::fields::FieldValue;
use tock_registers::{LocalRegisterCopy, RegisterLongName};

use crate::brick::{Block, Stack};
use crate::err::OcapiError;
use crate::osal::OsalError;

pub mod consts;
pub mod cq;
pub mod misc;
pub mod obus;
pub mod otl;
pub mod xsl;

use consts::{NPU2_MISC_SCOM_IND_SCOM_ADDR, NPU2_MISC_SCOM_IND_SCOM_DATA};

/// In-register copy of a 64-bit SCOM value.
pub type ScomValue<R> = LocalRegisterCopy<u64, R>;

/// Materializes a field value into a raw register word.
pub fn encode<R: RegisterLongName>(fv: FieldValue<u64, R>) -> u64 {
    let mut v: ScomValue<R> = LocalRegisterCopy::new(0);
    v.write(fv);
    v.get()
}

/// Address of an NPU-internal register: `stack << 20 | block << 16 | offset`.
pub const fn reg_offset(stack: Stack, block: Block, offset: u64) -> u64 {
    (stack.value() << 20) | (block.value() << 16) | offset
}

/// Chip XSCOM access.
pub trait ScomBus {
    fn xscom_read(&self, chip_id: u32, addr: u64) -> Result<u64, OsalError>;
    fn xscom_write(&self, chip_id: u32, addr: u64, val: u64) -> Result<(), OsalError>;
}

/// Physical MMIO access.
pub trait Mmio {
    fn in_8(&self, addr: u64) -> u8;
    fn out_8(&self, addr: u64, val: u8);
    fn in_le16(&self, addr: u64) -> u16;
    fn out_le16(&self, addr: u64, val: u16);
    fn in_le32(&self, addr: u64) -> u32;
    fn out_le32(&self, addr: u64, val: u32);
    fn in_be64(&self, addr: u64) -> u64;
    fn out_be64(&self, addr: u64, val: u64);

    /// Orders prior MMIO stores before subsequent accesses.
    fn sync(&self) {
        core::sync::atomic::fence(core::sync::atomic::Ordering::SeqCst);
    }
}

/// [`Mmio`] over identity-mapped physical memory.
pub struct RawMmio;

impl Mmio for RawMmio {
    fn in_8(&self, addr: u64) -> u8 {
        unsafe { ptr::read_volatile(addr as *const u8) }
    }

    fn out_8(&self, addr: u64, val: u8) {
        unsafe { ptr::write_volatile(addr as *mut u8, val) }
    }

    fn in_le16(&self, addr: u64) -> u16 {
        u16::from_le(unsafe { ptr::read_volatile(addr as *const u16) })
    }

    fn out_le16(&self, addr: u64, val: u16) {
        unsafe { ptr::write_volatile(addr as *mut u16, val.to_le()) }
    }

    fn in_le32(&self, addr: u64) -> u32 {
        u32::from_le(unsafe { ptr::read_volatile(addr as *const u32) })
    }

    fn out_le32(&self, addr: u64, val: u32) {
        unsafe { ptr::write_volatile(addr as *mut u32, val.to_le()) }
    }

    fn in_be64(&self, addr: u64) -> u64 {
        u64::from_be(unsafe { ptr::read_volatile(addr as *const u64) })
    }

    fn out_be64(&self, addr: u64, val: u64) {
        unsafe { ptr::write_volatile(addr as *mut u64, val.to_be()) }
    }
}

tock_registers::register_bitfields! {u64,
    pub MISC_DA [
        ADDR OFFSET(40) NUMBITS(24) [],
        LEN OFFSET(38) NUMBITS(2) [
            Len4B = 2,
            Len8B = 3
        ]
    ]
}

/// Width of an indirect access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataLen {
    Len4B,
    Len8B,
}

/// Indirect accessor for the NPU-internal register space of one NPU.
pub struct Npu2Scom<'a, S: ScomBus + ?Sized> {
    bus: &'a S,
    chip_id: u32,
    scom_base: u64,
}

impl<'a, S: ScomBus + ?Sized> Npu2Scom<'a, S> {
    pub fn new(bus: &'a S, chip_id: u32, scom_base: u64) -> Self {
        Self {
            bus,
            chip_id,
            scom_base,
        }
    }

    fn set_addr(&self, reg: u64, len: DataLen) -> Result<(), OcapiError> {
        let len = match len {
            DataLen::Len4B => MISC_DA::LEN::Len4B,
            DataLen::Len8B => MISC_DA::LEN::Len8B,
        };
        let word = encode(MISC_DA::ADDR.val(reg) + len);
        self.bus
            .xscom_write(
                self.chip_id,
                self.scom_base + NPU2_MISC_SCOM_IND_SCOM_ADDR,
                word,
            )
            .map_err(|_| OcapiError::Hardware)
    }

    pub fn read(&self, reg: u64, len: DataLen) -> Result<u64, OcapiError> {
        self.set_addr(reg, len)?;
        self.bus
            .xscom_read(self.chip_id, self.scom_base + NPU2_MISC_SCOM_IND_SCOM_DATA)
            .map_err(|_| OcapiError::Hardware)
    }

    pub fn write(&self, reg: u64, len: DataLen, val: u64) -> Result<(), OcapiError> {
        self.set_addr(reg, len)?;
        self.bus
            .xscom_write(
                self.chip_id,
                self.scom_base + NPU2_MISC_SCOM_IND_SCOM_DATA,
                val,
            )
            .map_err(|_| OcapiError::Hardware)
    }
}
