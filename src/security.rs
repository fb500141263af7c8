//! Input validation for structured documents
//!
//! Descriptions are fetched from third-party systems and rendered into a
//! destination that displays Markdown to users. This module guards the two
//! places where that input can hurt:
//!
//! - **Nesting depth**: the converter is recursive, so a hostile or corrupt
//!   document nested thousands of levels deep must be rejected before it
//!   exhausts the stack.
//! - **Link targets**: `javascript:`, `data:` and similar schemes must not end
//!   up as clickable Markdown links.

/// Maximum allowed nesting depth for document nodes
/// Prevents stack overflow from deeply nested structures
const MAX_NESTING_DEPTH: usize = 1000;

/// Dangerous URL schemes that should be blocked
const DANGEROUS_URL_SCHEMES: &[&str] = &[
    "javascript:", // JavaScript execution
    "data:",       // Can contain executable content
    "vbscript:",   // VBScript execution (legacy IE)
    "file:",       // Local file access
];

/// Security validator for structured document input
#[derive(Debug, Clone)]
pub struct SecurityValidator {
    /// Maximum allowed nesting depth
    max_depth: usize,
}

impl SecurityValidator {
    /// Create a new security validator with default settings
    pub fn new() -> Self {
        Self {
            max_depth: MAX_NESTING_DEPTH,
        }
    }

    /// Create a security validator with custom maximum depth
    pub fn with_max_depth(max_depth: usize) -> Self {
        Self { max_depth }
    }

    /// Check if a URL uses a dangerous scheme
    ///
    /// # Examples
    ///
    /// ```
    /// use testcase_migrator::security::SecurityValidator;
    ///
    /// let validator = SecurityValidator::new();
    /// assert!(validator.is_dangerous_url("javascript:alert('xss')"));
    /// assert!(validator.is_dangerous_url("  DATA:text/html,<b>x</b>"));
    /// assert!(!validator.is_dangerous_url("https://example.com"));
    /// assert!(!validator.is_dangerous_url("/relative/path"));
    /// ```
    pub fn is_dangerous_url(&self, url: &str) -> bool {
        let url_lower = url.trim().to_lowercase();
        DANGEROUS_URL_SCHEMES
            .iter()
            .any(|scheme| url_lower.starts_with(scheme))
    }

    /// Validate nesting depth to prevent stack overflow
    ///
    /// # Examples
    ///
    /// ```
    /// use testcase_migrator::security::SecurityValidator;
    ///
    /// let validator = SecurityValidator::with_max_depth(100);
    /// assert!(validator.validate_depth(50).is_ok());
    /// assert!(validator.validate_depth(150).is_err());
    /// ```
    pub fn validate_depth(&self, depth: usize) -> Result<(), String> {
        if depth > self.max_depth {
            Err(format!(
                "document nesting depth {} exceeds maximum allowed depth {}",
                depth, self.max_depth
            ))
        } else {
            Ok(())
        }
    }
}

impl Default for SecurityValidator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dangerous_schemes() {
        let validator = SecurityValidator::new();
        for url in [
            "javascript:void(0)",
            "JavaScript:alert(1)",
            "vbscript:msgbox",
            "file:///etc/passwd",
            "data:image/svg+xml;base64,PHN2Zz4=",
        ] {
            assert!(validator.is_dangerous_url(url), "{url}");
        }
    }

    #[test]
    fn test_safe_urls() {
        let validator = SecurityValidator::new();
        for url in [
            "https://jira.example.com/browse/PRJ-1",
            "http://example.com",
            "mailto:qa@example.com",
            "report.png",
        ] {
            assert!(!validator.is_dangerous_url(url), "{url}");
        }
    }

    #[test]
    fn test_depth_boundary() {
        let validator = SecurityValidator::with_max_depth(3);
        assert!(validator.validate_depth(3).is_ok());
        let err = validator.validate_depth(4).unwrap_err();
        assert!(err.contains("exceeds maximum"));
    }
}
