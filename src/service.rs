//! Caller-facing ringtone request handling.
//!
//! Registering a finished file as the device ringtone is platform work done
//! behind [`RingtoneRegistrar`]; this module only sequences permission check,
//! trim and registration, and maps failures to stable codes.

use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt;
use std::path::PathBuf;

use crate::error::ErrorKind;
use crate::media::TrimResult;
use crate::pipeline::{TrimConfig, TrimRequest};
use crate::worker::spawn_trim;

/// Failures of the registration collaborator, kept apart from trim failures.
#[derive(Debug)]
pub enum RegistrationError {
    /// The process may not change system settings.
    PermissionDenied,

    /// The media store refused the file.
    Store(String),
}

impl fmt::Display for RegistrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistrationError::PermissionDenied => write!(f, "Permission to write settings denied"),
            RegistrationError::Store(msg) => write!(f, "Media store error: {}", msg),
        }
    }
}

impl StdError for RegistrationError {}

/// Platform side that turns a trimmed file into the active ringtone.
pub trait RingtoneRegistrar {
    /// Whether the process may change the default ringtone.
    fn can_write_settings(&self) -> bool;

    /// Asks the user for the settings permission. Called when it is missing.
    fn request_write_settings(&self) {}

    /// Inserts the file into the media store and makes it the ringtone.
    fn register(&self, trimmed: &TrimResult) -> std::result::Result<(), RegistrationError>;
}

/// Failure reported back to the caller, with a stable code.
#[derive(Debug)]
pub struct ServiceError {
    pub code: &'static str,
    pub message: String,
    /// Pipeline failure category, for trim failures only.
    pub trim_kind: Option<ErrorKind>,
}

impl ServiceError {
    pub const INVALID_ARGUMENT: &'static str = "INVALID_ARGUMENT";
    pub const PERMISSIONS_REQUIRED: &'static str = "PERMISSIONS_REQUIRED";
    pub const TRIM_ERROR: &'static str = "TRIM_ERROR";
    pub const MEDIASTORE_ERROR: &'static str = "MEDIASTORE_ERROR";
    /// Failures that fit no other category, such as a worker that died.
    pub const ERROR: &'static str = "ERROR";

    fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            trim_kind: None,
        }
    }

    fn trim(err: crate::Error) -> Self {
        let code = match err.kind() {
            ErrorKind::Unknown => Self::ERROR,
            _ => Self::TRIM_ERROR,
        };
        Self {
            code,
            message: err.to_string(),
            trim_kind: Some(err.kind()),
        }
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl StdError for ServiceError {}

/// A request to trim a file and set it as ringtone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RingtoneRequest {
    pub path: PathBuf,
    pub start_time_ms: u64,
    pub end_time_ms: u64,
}

impl RingtoneRequest {
    /// Reads `path`, `startTimeMs` and `endTimeMs` from string arguments.
    /// Missing times default to zero.
    pub fn from_args(args: &HashMap<String, String>) -> std::result::Result<Self, ServiceError> {
        let path = args
            .get("path")
            .filter(|p| !p.is_empty())
            .ok_or_else(|| ServiceError::new(ServiceError::INVALID_ARGUMENT, "Missing argument: path"))?;

        let millis = |key: &str| -> std::result::Result<u64, ServiceError> {
            match args.get(key) {
                None => Ok(0),
                Some(value) => value.trim().parse::<u64>().map_err(|_| {
                    ServiceError::new(
                        ServiceError::INVALID_ARGUMENT,
                        format!("{} must be a non-negative integer, got {:?}", key, value),
                    )
                }),
            }
        };

        Ok(Self {
            path: PathBuf::from(path),
            start_time_ms: millis("startTimeMs")?,
            end_time_ms: millis("endTimeMs")?,
        })
    }

    pub fn to_trim_request(&self) -> TrimRequest {
        TrimRequest::from_millis(self.path.clone(), self.start_time_ms, self.end_time_ms)
    }
}

/// Sequences permission check, trim and registration for one request.
pub struct RingtoneService<R> {
    config: TrimConfig,
    registrar: R,
}

impl<R: RingtoneRegistrar> RingtoneService<R> {
    pub fn new(config: TrimConfig, registrar: R) -> Self {
        Self { config, registrar }
    }

    pub fn registrar(&self) -> &R {
        &self.registrar
    }

    /// Trims the requested file and registers it. Registration only runs once
    /// the trim has succeeded.
    pub async fn set_ringtone(
        &self,
        request: &RingtoneRequest,
    ) -> std::result::Result<TrimResult, ServiceError> {
        if !self.registrar.can_write_settings() {
            self.registrar.request_write_settings();
            return Err(ServiceError::new(
                ServiceError::PERMISSIONS_REQUIRED,
                "Permission to write settings was denied",
            ));
        }

        let trimmed = spawn_trim(self.config.clone(), request.to_trim_request())
            .map_err(ServiceError::trim)?
            .await
            .map_err(ServiceError::trim)?;

        self.registrar.register(&trimmed).map_err(|e| {
            log::error!("Registering {} failed: {}", trimmed.path.display(), e);
            ServiceError::new(ServiceError::MEDIASTORE_ERROR, e.to_string())
        })?;

        log::info!("Registered {} as ringtone", trimmed.path.display());
        Ok(trimmed)
    }
}
