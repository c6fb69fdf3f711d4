//! Validation rules for user attributes accepted from callers.

use crate::domain::error::DomainError;

pub const USERNAME_MAX_CHARS: usize = 32;
pub const AVATAR_MAX_CHARS: usize = 255;
pub const EMAIL_MAX_CHARS: usize = 128;

/// Sex codes: 0 unknown, 1 male, 2 female.
pub const SEX_CODES: [i32; 3] = [0, 1, 2];

pub fn validate_username(username: &str) -> Result<(), DomainError> {
    let trimmed = username.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation("username must not be empty"));
    }
    if trimmed.chars().count() > USERNAME_MAX_CHARS {
        return Err(DomainError::validation(format!(
            "username exceeds {USERNAME_MAX_CHARS} characters"
        )));
    }
    Ok(())
}

pub fn validate_email(email: &str) -> Result<(), DomainError> {
    if email.is_empty() {
        return Ok(());
    }
    if email.chars().count() > EMAIL_MAX_CHARS {
        return Err(DomainError::validation(format!(
            "email exceeds {EMAIL_MAX_CHARS} characters"
        )));
    }
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
        _ => Err(DomainError::validation(format!(
            "`{email}` is not an email address"
        ))),
    }
}

pub fn validate_avatar(avatar: &str) -> Result<(), DomainError> {
    if avatar.chars().count() > AVATAR_MAX_CHARS {
        return Err(DomainError::validation(format!(
            "avatar exceeds {AVATAR_MAX_CHARS} characters"
        )));
    }
    Ok(())
}

pub fn validate_sex(sex: i32) -> Result<(), DomainError> {
    if SEX_CODES.contains(&sex) {
        Ok(())
    } else {
        Err(DomainError::validation(format!("unknown sex code {sex}")))
    }
}
