//! Hardware abstraction layer for NPU OpenCAPI bring-up
//!
//! This module implements the register-level procedures run on an NPU: the
//! per-brick bring-up pipeline, transaction-layer and address-translation
//! configuration, BAR programming, interrupt setup and the ODL training
//! driver. Every procedure is a method on [`HardwareLayer`], which binds a
//! platform to one NPU's XSCOM base.

use tock_registers::fields::FieldValue;
use tock_registers::{LocalRegisterCopy, RegisterLongName};

use crate::err::OcapiError;
use crate::osal::Osal;
use crate::registers::{DataLen, Npu2Scom, ScomValue};

mod bar;
mod bringup;
mod irq;
mod tl;
mod xlat;

pub use bar::BarKind;
pub use bringup::FenceState;
pub use tl::{get_template_rate, is_template_supported};

/// Hardware abstraction layer implementation
pub struct HardwareLayer<'a, O: Osal> {
    pub osal: &'a O,
    chip_id: u32,
    scom_base: u64,
    scom: Npu2Scom<'a, O>,
}

impl<'a, O: Osal> HardwareLayer<'a, O> {
    pub fn new(osal: &'a O, chip_id: u32, scom_base: u64) -> Self {
        Self {
            osal,
            chip_id,
            scom_base,
            scom: Npu2Scom::new(osal, chip_id, scom_base),
        }
    }

    pub fn chip_id(&self) -> u32 {
        self.chip_id
    }

    pub fn scom_base(&self) -> u64 {
        self.scom_base
    }

    /// Reads an NPU-internal register.
    pub fn read(&self, reg: u64) -> Result<u64, OcapiError> {
        self.scom.read(reg, DataLen::Len8B)
    }

    /// Writes an NPU-internal register.
    pub fn write(&self, reg: u64, val: u64) -> Result<(), OcapiError> {
        self.scom.write(reg, DataLen::Len8B, val)
    }

    /// Read-modify-write of an NPU-internal register. Returns the value
    /// written.
    pub fn modify<R: RegisterLongName>(
        &self,
        reg: u64,
        fv: FieldValue<u64, R>,
    ) -> Result<u64, OcapiError> {
        let mut v: ScomValue<R> = LocalRegisterCopy::new(self.read(reg)?);
        v.modify(fv);
        self.write(reg, v.get())?;
        Ok(v.get())
    }

    pub fn xscom_read(&self, addr: u64) -> Result<u64, OcapiError> {
        Ok(self.osal.xscom_read(self.chip_id, addr)?)
    }

    pub fn xscom_write(&self, addr: u64, val: u64) -> Result<(), OcapiError> {
        Ok(self.osal.xscom_write(self.chip_id, addr, val)?)
    }

    pub fn xscom_modify<R: RegisterLongName>(
        &self,
        addr: u64,
        fv: FieldValue<u64, R>,
    ) -> Result<u64, OcapiError> {
        let mut v: ScomValue<R> = LocalRegisterCopy::new(self.xscom_read(addr)?);
        v.modify(fv);
        self.xscom_write(addr, v.get())?;
        Ok(v.get())
    }
}
