use crate::osal::OsalError;

pub const OPAL_SUCCESS: i64 = 0;
pub const OPAL_PARAMETER: i64 = -1;
pub const OPAL_BUSY: i64 = -2;
pub const OPAL_HARDWARE: i64 = -6;
pub const OPAL_UNSUPPORTED: i64 = -7;
pub const OPAL_RESOURCE: i64 = -10;

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OcapiError {
    #[error("invalid parameter")]
    InvalidParameter,
    #[error("operation not supported")]
    Unsupported,
    #[error("hardware busy")]
    Busy,
    #[error("hardware access failed")]
    Hardware,
    #[error("resource exhausted")]
    ResourceExhausted,
}

impl OcapiError {
    /// OPAL return code reported to the OS for this error.
    pub const fn opal_rc(self) -> i64 {
        match self {
            OcapiError::InvalidParameter => OPAL_PARAMETER,
            OcapiError::Unsupported => OPAL_UNSUPPORTED,
            OcapiError::Busy => OPAL_BUSY,
            OcapiError::Hardware => OPAL_HARDWARE,
            OcapiError::ResourceExhausted => OPAL_RESOURCE,
        }
    }
}

impl From<OsalError> for OcapiError {
    fn from(err: OsalError) -> Self {
        match err {
            OsalError::OutOfMemory => OcapiError::ResourceExhausted,
            OsalError::InvalidParameter => OcapiError::InvalidParameter,
            OsalError::NotSupported => OcapiError::Unsupported,
            OsalError::TimeoutError | OsalError::DeviceError => OcapiError::Hardware,
        }
    }
}

/// Folds a control-surface result into an OPAL return code.
pub fn opal_rc(res: Result<(), OcapiError>) -> i64 {
    match res {
        Ok(()) => OPAL_SUCCESS,
        Err(e) => e.opal_rc(),
    }
}
