//! ODL link training.
//!
//! A training attempt resets the ODL, pulses the device reset over I2C,
//! sends pattern A, nudges the PHY lanes and then starts training, polling
//! the ODL state machine until it reports trained or the attempt times out.

use tock_registers::LocalRegisterCopy;

use crate::brick::BrickIndex;
use crate::config::{LINK_TRAINING_RETRIES, OCAPI_I2C_DEV_ADDR, OCAPI_I2C_TIMEOUT_MS, ODL_TRAIN_TIMEOUT_MS};
use crate::device::OcapiDevice;
use crate::err::OcapiError;
use crate::hal::HardwareLayer;
use crate::osal::Osal;
use crate::registers::ScomValue;
use crate::registers::obus::{OB_ODL_CONFIG, OB_ODL_STATUS};

/// Negotiated width of a trained link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkWidth {
    X4,
    X8,
}

impl LinkWidth {
    pub const fn lanes(self) -> u8 {
        match self {
            LinkWidth::X4 => 4,
            LinkWidth::X8 => 8,
        }
    }
}

impl<O: Osal> HardwareLayer<'_, O> {
    pub fn odl_status(&self, index: BrickIndex) -> Result<u64, OcapiError> {
        self.xscom_read(index.odl_status_reg())
    }

    /// Width the ODL trained at.
    pub fn link_width(&self, index: BrickIndex) -> Result<LinkWidth, OcapiError> {
        let status: ScomValue<OB_ODL_STATUS::Register> =
            LocalRegisterCopy::new(self.odl_status(index)?);
        match status.read_as_enum(OB_ODL_STATUS::TRAINED_MODE) {
            Some(OB_ODL_STATUS::TRAINED_MODE::Value::X4) => Ok(LinkWidth::X4),
            Some(OB_ODL_STATUS::TRAINED_MODE::Value::X8) => Ok(LinkWidth::X8),
            None => Err(OcapiError::Hardware),
        }
    }

    /// Pulses the OpenCAPI device reset through the platform's I2C
    /// expander.
    pub fn reset_ocapi_device(&self, dev: &OcapiDevice) -> Result<(), OcapiError> {
        let ocapi = self.osal.ocapi();
        let data = dev.index.reset_data(ocapi);
        let port = dev.i2c_port_id.ok_or(OcapiError::InvalidParameter)?;

        for (i, (&offset, &byte)) in ocapi.i2c_offset.iter().zip(data.iter()).enumerate() {
            self.osal
                .i2c_smbus_write(
                    port,
                    OCAPI_I2C_DEV_ADDR,
                    offset,
                    1,
                    &[byte],
                    OCAPI_I2C_TIMEOUT_MS,
                )
                .map_err(|e| {
                    error!("OCAPI: Error writing I2C reset signal: {:?}", e);
                    OcapiError::Hardware
                })?;
            if i != 0 {
                self.osal.msleep(5);
            }
        }
        Ok(())
    }

    /// One training attempt.
    pub fn odl_train(&self, dev: &OcapiDevice) -> Result<(), OcapiError> {
        let index = dev.index;
        let config = index.odl_config_reg();
        debug!("OCAPI: Link {}: Training ODL", index.value());

        let mut reg: ScomValue<OB_ODL_CONFIG::Register> = LocalRegisterCopy::new(0);
        reg.write(
            OB_ODL_CONFIG::RESET::SET
                + OB_ODL_CONFIG::VERSION.val(0b000001)
                + OB_ODL_CONFIG::TRAIN_MODE::Auto
                + OB_ODL_CONFIG::SUPPORTED_MODES.val(0b0010)
                + OB_ODL_CONFIG::X4_BACKOFF_ENABLE::SET
                + OB_ODL_CONFIG::PHY_CNTR_LIMIT.val(0b1111)
                + OB_ODL_CONFIG::DEBUG_ENABLE::SET
                + OB_ODL_CONFIG::FWD_PROGRESS_TIMER.val(0b0110),
        );
        self.xscom_write(config, reg.get())?;

        reg.modify(OB_ODL_CONFIG::RESET::CLEAR);
        self.xscom_write(config, reg.get())?;

        self.reset_ocapi_device(dev)?;

        reg.modify(OB_ODL_CONFIG::TRAIN_MODE::PatternA);
        self.xscom_write(config, reg.get())?;
        self.osal.msleep(5);

        self.osal.phy_bump_ui_lane(&dev.phy_target(self.chip_id()));

        reg.modify(OB_ODL_CONFIG::TRAIN_MODE::Start);
        self.xscom_write(config, reg.get())?;

        let start = self.osal.get_time_us();
        loop {
            let status: ScomValue<OB_ODL_STATUS::Register> =
                LocalRegisterCopy::new(self.odl_status(index)?);
            if status.matches_all(OB_ODL_STATUS::TRAINING_STATE_MACHINE::Trained) {
                info!(
                    "OCAPI: Link {} on chip {} trained in {}ms",
                    index.value(),
                    self.chip_id(),
                    (self.osal.get_time_us() - start) / 1000
                );
                return Ok(());
            }
            if self
                .osal
                .timeout_check(start, (ODL_TRAIN_TIMEOUT_MS * 1000) as u32)
            {
                info!(
                    "OCAPI: Link {} on chip {} failed to train, retrying",
                    index.value(),
                    self.chip_id()
                );
                info!("OCAPI: Link status: {:016x}", status.get());
                return Err(OcapiError::Hardware);
            }
            self.osal.msleep(1);
        }
    }

    /// Trains a link, retrying up to [`LINK_TRAINING_RETRIES`] times.
    pub fn train_link(&self, dev: &OcapiDevice) -> Result<(), OcapiError> {
        let mut rc = Err(OcapiError::Hardware);
        for _ in 0..LINK_TRAINING_RETRIES {
            rc = self.odl_train(dev);
            if rc.is_ok() {
                return rc;
            }
        }
        error!(
            "OCAPI: Link {} on chip {} failed to train",
            dev.index.value(),
            self.chip_id()
        );
        if let Ok(status) = self.odl_status(dev.index) {
            error!("OCAPI: Final link status: {:016x}", status);
        }
        rc
    }
}
