//! Platform configuration for OpenCAPI slots.
//!
//! Each supported board wires the OpenCAPI connectors to a specific I2C
//! engine/port and uses its own reset and ODL-select sequences; those values
//! live here alongside the fixed bring-up constants.

pub const LINK_TRAINING_RETRIES: u32 = 5;
pub const ODL_TRAIN_TIMEOUT_MS: u64 = 3000;
pub const CQ_CTL_STATUS_TIMEOUT_MS: u64 = 10;

pub const NPU_IRQ_LEVELS: u32 = 35;
pub const NPU_IRQ_LEVELS_XSL: u32 = 23;

pub const MAX_PE_HANDLE: u64 = (1 << 15) - 1;
pub const MAX_PE_NUM: u64 = 16;

pub const TL_MAX_TEMPLATE: u32 = 63;
pub const TL_RATE_BUF_SIZE: usize = 32;

pub const LOCK_TIMEOUT_MS: u64 = 5000;

/// Slave address of the OpenCAPI reset/ODL-select expander.
pub const OCAPI_I2C_DEV_ADDR: u8 = 0x20;
pub const OCAPI_I2C_TIMEOUT_MS: u32 = 120;

pub const NVRAM_TRAINING_KEY: &str = "opencapi-link-training";

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum OcapiPlatformType {
    Zaius,
}

/// Board description of the OpenCAPI slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformOcapi {
    pub i2c_engine: u8,
    pub i2c_port: u8,
    /// Expander register written at each step of the device reset.
    pub i2c_offset: [u32; 3],
    /// Reset sequence data for bricks attached to ODL0.
    pub i2c_odl0_data: [u8; 3],
    /// Reset sequence data for bricks attached to ODL1.
    pub i2c_odl1_data: [u8; 3],
    pub odl_phy_swap: bool,
}

impl PlatformOcapi {
    pub fn new(ty: OcapiPlatformType) -> Self {
        match ty {
            OcapiPlatformType::Zaius => Self::new_zaius(),
        }
    }

    fn new_zaius() -> Self {
        Self {
            i2c_engine: 1,
            i2c_port: 4,
            i2c_offset: [0x3, 0x1, 0x1],
            i2c_odl0_data: [0xFD, 0xFD, 0xFF],
            i2c_odl1_data: [0xBF, 0xBF, 0xFF],
            odl_phy_swap: true,
        }
    }
}

/// Link training behaviour selected through NVRAM.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum TrainingMode {
    #[default]
    Default,
    Prbs31,
    None,
}

impl TrainingMode {
    /// Parses the NVRAM value; unknown strings fall back to normal training.
    pub fn from_nvram(value: Option<&str>) -> Self {
        match value {
            None => TrainingMode::Default,
            Some("prbs31") => TrainingMode::Prbs31,
            Some("none") => TrainingMode::None,
            Some(other) => {
                warn!(
                    "OCAPI: invalid value '{}' for NVRAM setting '{}', ignoring",
                    other, NVRAM_TRAINING_KEY
                );
                TrainingMode::Default
            }
        }
    }
}
