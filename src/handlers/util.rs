//! Field-level validation shared across handlers.

use std::collections::HashMap;

use crate::error::ApiError;

/// Collects per-field validation messages and converts to a single
/// `VALIDATION_ERROR` response.
#[derive(Debug, Default)]
pub struct FieldErrors {
    errors: HashMap<String, String>,
}

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: &str, message: impl Into<String>) {
        self.errors.insert(field.to_string(), message.into());
    }

    pub fn check(&mut self, field: &str, result: Result<(), String>) {
        if let Err(message) = result {
            self.insert(field, message);
        }
    }

    pub fn into_result(self) -> Result<(), ApiError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ApiError::validation_error(
                "Validation failed",
                Some(self.errors),
            ))
        }
    }
}

pub fn validate_required(value: &str, label: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        Err(format!("{label} is required"))
    } else {
        Ok(())
    }
}

pub fn validate_email(email: &str) -> Result<(), String> {
    let parts: Vec<&str> = email.split('@').collect();
    let valid = parts.len() == 2
        && !parts[0].is_empty()
        && parts[1].contains('.')
        && !parts[1].starts_with('.')
        && !parts[1].ends_with('.');
    if valid {
        Ok(())
    } else {
        Err("Please enter a valid email".to_string())
    }
}

pub fn validate_password(password: &str) -> Result<(), String> {
    if password.len() < 6 {
        Err("Password must be at least 6 characters".to_string())
    } else {
        Ok(())
    }
}

pub fn validate_max_len(value: &str, max: usize, label: &str) -> Result<(), String> {
    if value.chars().count() > max {
        Err(format!("{label} cannot be more than {max} characters"))
    } else {
        Ok(())
    }
}
