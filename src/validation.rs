//! Input validation for command-line and configuration values.
//!
//! Everything here runs once at startup, so the panel's hot path can trust
//! the values it is handed.

use crate::entries::SortAttr;
use crate::error::{ConnwatchError, Result};
use std::path::Path;

/// Maximum allowed length for file paths
const MAX_PATH_LEN: usize = 4096;

/// Longest process name the kernel keeps in `/proc/<pid>/comm`
const MAX_PROCESS_NAME_LEN: usize = 15;

/// Minimum allowed refresh rate in seconds
pub const MIN_REFRESH_RATE: u64 = 1;

/// Maximum allowed refresh rate in seconds
pub const MAX_REFRESH_RATE: u64 = 3600;

/// Validates file paths for logging
///
/// # Examples
/// ```
/// use connwatch::validation::validate_file_path;
///
/// assert!(validate_file_path("/tmp/connwatch.log", Some("log")).is_ok());
/// assert!(validate_file_path("../../../etc/passwd", None).is_err());
/// ```
pub fn validate_file_path(path: &str, expected_extension: Option<&str>) -> Result<()> {
    if path.is_empty() {
        return Err(ConnwatchError::Config(
            "File path cannot be empty".to_string(),
        ));
    }

    if path.len() > MAX_PATH_LEN {
        return Err(ConnwatchError::Config(format!(
            "File path too long (max {MAX_PATH_LEN} characters)"
        )));
    }

    if path.chars().any(|c| c.is_control()) {
        return Err(ConnwatchError::Config(
            "Control characters not allowed in file path".to_string(),
        ));
    }

    if path.contains("..") {
        return Err(ConnwatchError::Config("Path traversal detected".to_string()));
    }

    let sensitive_dirs = ["/etc", "/boot", "/proc", "/sys", "/dev", "/bin", "/sbin"];
    if sensitive_dirs.iter().any(|dir| path.starts_with(dir)) {
        return Err(ConnwatchError::Config(
            "Access to sensitive directory denied".to_string(),
        ));
    }

    if let Some(expected_ext) = expected_extension {
        match Path::new(path).extension() {
            Some(extension)
                if extension.to_string_lossy().eq_ignore_ascii_case(expected_ext) => {}
            Some(_) => {
                return Err(ConnwatchError::Config(format!(
                    "Invalid file extension, expected: {expected_ext}"
                )))
            }
            None => {
                return Err(ConnwatchError::Config(format!(
                    "Missing file extension, expected: {expected_ext}"
                )))
            }
        }
    }

    Ok(())
}

/// Validates the seconds between polls
pub fn validate_refresh_rate(seconds: u64) -> Result<()> {
    if seconds < MIN_REFRESH_RATE {
        return Err(ConnwatchError::Config(format!(
            "Refresh rate too small (minimum {MIN_REFRESH_RATE} second)"
        )));
    }

    if seconds > MAX_REFRESH_RATE {
        return Err(ConnwatchError::Config(format!(
            "Refresh rate too large (maximum {MAX_REFRESH_RATE} seconds)"
        )));
    }

    Ok(())
}

/// Turns sort attribute indices into an ordering: one to three distinct
/// attributes.
///
/// ```
/// use connwatch::entries::SortAttr;
/// use connwatch::validation::validate_sort_order;
///
/// assert_eq!(
///     validate_sort_order(&[0, 1]).unwrap(),
///     vec![SortAttr::Category, SortAttr::Uptime]
/// );
/// assert!(validate_sort_order(&[0, 0]).is_err());
/// ```
pub fn validate_sort_order(indices: &[usize]) -> Result<Vec<SortAttr>> {
    if indices.is_empty() || indices.len() > SortAttr::MAX_KEYS {
        return Err(ConnwatchError::Config(format!(
            "Invalid sort order: expected 1 to {} attributes, got {}",
            SortAttr::MAX_KEYS,
            indices.len()
        )));
    }

    let mut order = Vec::with_capacity(indices.len());
    for &index in indices {
        let attr = SortAttr::from_index(index).ok_or_else(|| {
            ConnwatchError::Config(format!(
                "Invalid sort order: no attribute {index} (valid: 0-{})",
                SortAttr::ALL.len() - 1
            ))
        })?;

        if order.contains(&attr) {
            return Err(ConnwatchError::Config(format!(
                "Invalid sort order: {} listed twice",
                attr.label()
            )));
        }
        order.push(attr);
    }

    Ok(order)
}

/// Validates the name used to find the relay process
pub fn validate_process_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(ConnwatchError::Config(
            "Process name cannot be empty".to_string(),
        ));
    }

    if name.chars().count() > MAX_PROCESS_NAME_LEN {
        return Err(ConnwatchError::Config(format!(
            "Process name too long (max {MAX_PROCESS_NAME_LEN} characters)"
        )));
    }

    if name.contains('/') || name.chars().any(|c| c.is_control()) {
        return Err(ConnwatchError::Config(
            "Invalid characters in process name".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_path_validation() {
        assert!(validate_file_path("/tmp/connwatch.log", Some("log")).is_ok());
        assert!(validate_file_path("connwatch.LOG", Some("log")).is_ok());
        assert!(validate_file_path("relative/path.log", None).is_ok());

        assert!(validate_file_path("", None).is_err());
        assert!(validate_file_path("../../../etc/passwd", None).is_err());
        assert!(validate_file_path("/etc/shadow", None).is_err());
        assert!(validate_file_path("/tmp/connwatch.txt", Some("log")).is_err());
        assert!(validate_file_path("/tmp/connwatch", Some("log")).is_err());
        assert!(validate_file_path("/tmp/conn\nwatch.log", Some("log")).is_err());
    }

    #[test]
    fn test_refresh_rate_bounds() {
        assert!(validate_refresh_rate(1).is_ok());
        assert!(validate_refresh_rate(3600).is_ok());
        assert!(validate_refresh_rate(0).is_err());
        assert!(validate_refresh_rate(3601).is_err());
    }

    #[test]
    fn test_sort_order_validation() {
        assert_eq!(
            validate_sort_order(&[0, 2, 1]).unwrap(),
            vec![SortAttr::Category, SortAttr::Listing, SortAttr::Uptime]
        );
        assert!(validate_sort_order(&[]).is_err());
        assert!(validate_sort_order(&[0, 1, 2, 3]).is_err());
        assert!(validate_sort_order(&[8]).is_err());
        assert!(validate_sort_order(&[2, 2]).is_err());
    }

    #[test]
    fn test_process_name_validation() {
        assert!(validate_process_name("tor").is_ok());
        assert!(validate_process_name("").is_err());
        assert!(validate_process_name("/usr/bin/tor").is_err());
        assert!(validate_process_name("a-very-long-process-name").is_err());
        assert!(validate_process_name("tor\0").is_err());
    }
}
