use std::time::Duration;

/// Errors that can occur when driving a head tracker or relaying its data.
#[derive(Debug, thiserror::Error)]
pub enum HeadTrackerError {
    #[error("Device '{requested}' not found (available: [{}])", available.join(", "))]
    DeviceNotFound {
        requested: String,
        available: Vec<String>,
    },

    #[error("Device '{0}' is already claimed by another process")]
    DeviceUnavailable(String),

    #[error("Device is not open")]
    NotOpen,

    #[error("No data available within {0:?}")]
    NoDataAvailable(Duration),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Target '{target}' does not accept {format} data")]
    UnsupportedFormat {
        target: &'static str,
        format: &'static str,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Backend error: {0}")]
    Backend(String),
}

impl HeadTrackerError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        HeadTrackerError::InvalidValue(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_not_found_lists_candidates() {
        let err = HeadTrackerError::DeviceNotFound {
            requested: "HT1".into(),
            available: vec!["HT1 1".into(), "MrHeadTracker 2".into()],
        };
        assert_eq!(
            err.to_string(),
            "Device 'HT1' not found (available: [HT1 1, MrHeadTracker 2])"
        );
    }
}
