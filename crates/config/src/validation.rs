use crate::{ConfigError, ConfigResult};

/// Trait for configuration validation
pub trait ConfigValidator {
    fn validate(&self) -> ConfigResult<()>;
}

/// General validation utilities
pub struct ValidationUtils;

impl ValidationUtils {
    /// Validate that a string is not empty
    pub fn validate_not_empty(value: &str, field_name: &str) -> ConfigResult<()> {
        if value.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "{field_name} cannot be empty"
            )));
        }
        Ok(())
    }

    /// Validate that an interval is reasonable
    pub fn validate_seconds(seconds: u64, field_name: &str) -> ConfigResult<()> {
        if seconds == 0 {
            return Err(ConfigError::Validation(format!(
                "{field_name} must be greater than 0"
            )));
        }
        if seconds > 3600 {
            return Err(ConfigError::Validation(format!(
                "{field_name} must be less than or equal to 3600"
            )));
        }
        Ok(())
    }

    /// Validate that a count is within (0, max]
    pub fn validate_count(count: usize, field_name: &str, max: usize) -> ConfigResult<()> {
        if count == 0 {
            return Err(ConfigError::Validation(format!(
                "{field_name} must be greater than 0"
            )));
        }
        if count > max {
            return Err(ConfigError::Validation(format!(
                "{field_name} must be less than or equal to {max}"
            )));
        }
        Ok(())
    }

    /// Validate that a probability lies in (0, 1]
    pub fn validate_probability(value: f64, field_name: &str) -> ConfigResult<()> {
        if !(value > 0.0 && value <= 1.0) {
            return Err(ConfigError::Validation(format!(
                "{field_name} must be in (0, 1]"
            )));
        }
        Ok(())
    }

    /// Validate that a URL has a valid format
    pub fn validate_url(url: &str, field_name: &str) -> ConfigResult<()> {
        Self::validate_not_empty(url, field_name)?;
        if !url.contains("://") {
            return Err(ConfigError::Validation(format!(
                "{field_name} must be a valid URL with protocol"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_not_empty() {
        assert!(ValidationUtils::validate_not_empty("test", "field").is_ok());
        assert!(ValidationUtils::validate_not_empty("", "field").is_err());
        assert!(ValidationUtils::validate_not_empty("   ", "field").is_err());
    }

    #[test]
    fn test_validate_seconds() {
        assert!(ValidationUtils::validate_seconds(5, "poll").is_ok());
        assert!(ValidationUtils::validate_seconds(0, "poll").is_err());
        assert!(ValidationUtils::validate_seconds(3601, "poll").is_err());
    }

    #[test]
    fn test_validate_count() {
        assert!(ValidationUtils::validate_count(5, "concurrency", 1000).is_ok());
        assert!(ValidationUtils::validate_count(0, "concurrency", 1000).is_err());
        assert!(ValidationUtils::validate_count(1001, "concurrency", 1000).is_err());
    }

    #[test]
    fn test_validate_probability() {
        assert!(ValidationUtils::validate_probability(1.0, "p").is_ok());
        assert!(ValidationUtils::validate_probability(0.1, "p").is_ok());
        assert!(ValidationUtils::validate_probability(0.0, "p").is_err());
        assert!(ValidationUtils::validate_probability(1.5, "p").is_err());
    }

    #[test]
    fn test_validate_url() {
        assert!(ValidationUtils::validate_url("redis://localhost:6379", "url").is_ok());
        assert!(ValidationUtils::validate_url("localhost:6379", "url").is_err());
        assert!(ValidationUtils::validate_url("", "url").is_err());
    }
}
