//! Configuration validation with range checks.

use crate::error::ConfigError;

use super::Config;

impl Config {
    /// Validate configuration values are within acceptable ranges.
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.blur.analysis_max_dimension < 8 {
            return Err(ConfigError::ValidationError(
                "blur.analysis_max_dimension must be >= 8".into(),
            ));
        }
        if self.blur.grid_size == 0 || self.blur.grid_size > 64 {
            return Err(ConfigError::ValidationError(
                "blur.grid_size must be between 1 and 64".into(),
            ));
        }
        if self.blur.strong_blur_threshold < 0.0 || self.blur.medium_blur_threshold < 0.0 {
            return Err(ConfigError::ValidationError(
                "blur thresholds must be >= 0.0".into(),
            ));
        }
        if self.blur.strong_blur_threshold > self.blur.medium_blur_threshold {
            return Err(ConfigError::ValidationError(
                "blur.strong_blur_threshold must not exceed blur.medium_blur_threshold".into(),
            ));
        }
        if self.limits.max_file_size_mb == 0 {
            return Err(ConfigError::ValidationError(
                "limits.max_file_size_mb must be > 0".into(),
            ));
        }
        if self.limits.max_image_dimension == 0 {
            return Err(ConfigError::ValidationError(
                "limits.max_image_dimension must be > 0".into(),
            ));
        }
        if self.limits.max_buffer_pixels == 0 {
            return Err(ConfigError::ValidationError(
                "limits.max_buffer_pixels must be > 0".into(),
            ));
        }
        if self.limits.decode_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "limits.decode_timeout_ms must be > 0".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_passes_validation() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_tiny_analysis_dimension() {
        let mut config = Config::default();
        config.blur.analysis_max_dimension = 4;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("analysis_max_dimension"));
    }

    #[test]
    fn test_validate_rejects_zero_grid() {
        let mut config = Config::default();
        config.blur.grid_size = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("grid_size"));
    }

    #[test]
    fn test_validate_rejects_inverted_thresholds() {
        let mut config = Config::default();
        config.blur.strong_blur_threshold = 500.0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("strong_blur_threshold"));
    }

    #[test]
    fn test_validate_rejects_zero_limits() {
        let mut config = Config::default();
        config.limits.max_buffer_pixels = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_buffer_pixels"));

        let mut config = Config::default();
        config.limits.decode_timeout_ms = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("decode_timeout_ms"));
    }
}
