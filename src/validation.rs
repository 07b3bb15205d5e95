use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationErrors};

use crate::error::AppError;

/// Structured failure surfaced to whatever sits in front of the service.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ErrorResponse {
    pub kind: String,
    pub message: String,
    pub retryable: bool,
}

impl From<&AppError> for ErrorResponse {
    fn from(error: &AppError) -> Self {
        let message = match error {
            AppError::Validation(msg)
            | AppError::NotFound(msg)
            | AppError::Forbidden(msg)
            | AppError::Conflict(msg) => msg.clone(),
            AppError::Infrastructure(err) => format!("Store unavailable: {}", err),
            AppError::Internal(_) => "Internal error".to_string(),
        };

        Self {
            kind: error.kind().to_string(),
            message,
            retryable: error.is_retryable(),
        }
    }
}

impl From<ValidationErrors> for AppError {
    fn from(errors: ValidationErrors) -> Self {
        let mut fields: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for (field, field_errors) in errors.field_errors() {
            let messages = field_errors
                .iter()
                .map(|error| {
                    error
                        .message
                        .clone()
                        .unwrap_or_else(|| "invalid value".into())
                        .to_string()
                })
                .collect();
            fields.insert(field.to_string(), messages);
        }

        let message = fields
            .into_iter()
            .map(|(field, messages)| format!("{}: {}", field, messages.join(", ")))
            .collect::<Vec<_>>()
            .join("; ");

        AppError::Validation(message)
    }
}

pub trait ValidateExt: Sized {
    fn validated(self) -> Result<Self, AppError>;
}

impl<T: Validate> ValidateExt for T {
    fn validated(self) -> Result<Self, AppError> {
        self.validate()?;
        Ok(self)
    }
}

// Range checks let NaN through, so numeric inputs get an explicit finiteness check.
pub fn ensure_finite(field: &str, value: Option<f64>) -> Result<(), AppError> {
    match value {
        Some(v) if !v.is_finite() => Err(AppError::Validation(format!(
            "{}: must be a finite number",
            field
        ))),
        _ => Ok(()),
    }
}

/// Scores and weights are stored as whole hundredths; a value needing a
/// third decimal is rejected instead of being silently rounded.
pub fn ensure_hundredths(field: &str, value: Option<f64>) -> Result<(), AppError> {
    ensure_finite(field, value)?;
    match value {
        Some(v) if ((v * 100.0) - (v * 100.0).round()).abs() > 1e-6 => Err(AppError::Validation(
            format!("{}: at most two decimal places are allowed", field),
        )),
        _ => Ok(()),
    }
}
