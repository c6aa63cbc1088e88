use crate::limits::*;
use crate::model::Window;

use super::EngineError;

pub(crate) fn name(field: &'static str, value: &str) -> Result<(), EngineError> {
    if value.trim().is_empty() {
        return Err(EngineError::Invalid(format!("{field} must not be empty")));
    }
    if value.len() > MAX_NAME_LEN {
        return Err(EngineError::LimitExceeded("name too long"));
    }
    Ok(())
}

pub(crate) fn text(value: Option<&str>) -> Result<(), EngineError> {
    if value.is_some_and(|v| v.len() > MAX_TEXT_LEN) {
        return Err(EngineError::LimitExceeded("text too long"));
    }
    Ok(())
}

pub(crate) fn reason(value: &str) -> Result<(), EngineError> {
    if value.len() > MAX_REASON_LEN {
        return Err(EngineError::LimitExceeded("reason too long"));
    }
    Ok(())
}

pub(crate) fn password(value: &str) -> Result<(), EngineError> {
    if value.is_empty() {
        return Err(EngineError::Invalid("password must not be empty".into()));
    }
    if value.len() > MAX_PASSWORD_LEN {
        return Err(EngineError::LimitExceeded("password too long"));
    }
    Ok(())
}

/// Canonical (lowercased, trimmed) form of an email, or `Invalid`.
pub(crate) fn email(value: &str) -> Result<String, EngineError> {
    let email = value.trim().to_ascii_lowercase();
    if email.len() > MAX_EMAIL_LEN {
        return Err(EngineError::LimitExceeded("email too long"));
    }
    let well_formed = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && !domain.contains('@')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if !well_formed {
        return Err(EngineError::Invalid(format!("malformed email: {value}")));
    }
    Ok(email)
}

pub(crate) fn schedule(windows: &[Window]) -> Result<(), EngineError> {
    if windows.len() > MAX_WINDOWS_PER_ROOM {
        return Err(EngineError::LimitExceeded("too many schedule windows"));
    }
    if let Some(bad) = windows.iter().find(|w| !w.is_well_formed()) {
        return Err(EngineError::Invalid(format!(
            "schedule window {}-{} must start before it ends",
            bad.start, bad.end
        )));
    }
    Ok(())
}
