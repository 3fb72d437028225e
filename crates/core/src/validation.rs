use thiserror::Error;

use crate::model::Dimensions;

pub const MAX_NAME_LENGTH: usize = 120;
pub const MAX_ICON_LENGTH: usize = 16;
pub const MAX_LABEL_LENGTH: usize = 200;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("name must not be empty")]
    EmptyName,
    #[error("name exceeds {MAX_NAME_LENGTH} characters")]
    NameTooLong,
    #[error("icon must not be empty")]
    EmptyIcon,
    #[error("icon exceeds {MAX_ICON_LENGTH} characters")]
    IconTooLong,
    #[error("label exceeds {MAX_LABEL_LENGTH} characters")]
    LabelTooLong,
    #[error("dimensions must be finite and non-negative")]
    InvalidDimensions,
}

pub fn validate_name(name: &str) -> Result<(), ValidationError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyName);
    }
    if trimmed.chars().count() > MAX_NAME_LENGTH {
        return Err(ValidationError::NameTooLong);
    }
    Ok(())
}

pub fn validate_icon(icon: &str) -> Result<(), ValidationError> {
    if icon.is_empty() {
        return Err(ValidationError::EmptyIcon);
    }
    if icon.chars().count() > MAX_ICON_LENGTH {
        return Err(ValidationError::IconTooLong);
    }
    Ok(())
}

pub fn validate_label(label: &str) -> Result<(), ValidationError> {
    if label.chars().count() > MAX_LABEL_LENGTH {
        return Err(ValidationError::LabelTooLong);
    }
    Ok(())
}

/// Zero is allowed on any axis and means "unset"; negative or non-finite
/// values are never valid.
pub fn validate_dimensions(dimensions: &Dimensions) -> Result<(), ValidationError> {
    for value in [dimensions.width, dimensions.height, dimensions.depth] {
        if !value.is_finite() || value < 0.0 {
            return Err(ValidationError::InvalidDimensions);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_name_cases() {
        assert!(validate_name("Kitchen").is_ok());
        assert!(validate_name("  Bedroom  ").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("   ").is_err());
        assert!(validate_name(&"x".repeat(121)).is_err());
        assert!(validate_name(&"x".repeat(120)).is_ok());
    }

    #[test]
    fn validate_icon_cases() {
        assert!(validate_icon("🍳").is_ok());
        assert!(validate_icon("").is_err());
        assert!(validate_icon(&"🛏".repeat(17)).is_err());
    }

    #[test]
    fn validate_label_allows_empty() {
        assert!(validate_label("").is_ok());
        assert!(validate_label("Sofa").is_ok());
        assert!(validate_label(&"x".repeat(201)).is_err());
    }

    #[test]
    fn validate_dimensions_cases() {
        let ok = Dimensions {
            width: 10.0,
            height: 0.0,
            depth: 5.5,
        };
        assert!(validate_dimensions(&ok).is_ok());
        assert!(validate_dimensions(&Dimensions::default()).is_ok());

        let negative = Dimensions {
            width: -1.0,
            ..Dimensions::default()
        };
        assert!(validate_dimensions(&negative).is_err());

        let nan = Dimensions {
            depth: f64::NAN,
            ..Dimensions::default()
        };
        assert!(validate_dimensions(&nan).is_err());
    }
}
