use crate::contracts::current_timestamp_ms;

/// Error kind used when the fault carries no identifying name.
pub const UNKNOWN_ERROR: &str = "UnknownError";
/// Warning message used when the warning carries no message.
pub const UNKNOWN_WARNING: &str = "UnknownWarning";
/// Longest label value derived from a fault (bounds series cardinality).
pub const MAX_LABEL_LEN: usize = 128;

/// An intercepted error, converted 1:1 into an error counter increment.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorEvent {
    pub kind: String,
    pub message: String,
    /// Where the fault came from (component, module, or source location).
    pub origin: String,
    pub timestamp_ms: u64,
}

impl ErrorEvent {
    /// Builds an event; a missing or blank kind becomes [`UNKNOWN_ERROR`].
    pub fn new(kind: Option<&str>, message: impl Into<String>, origin: impl Into<String>) -> Self {
        Self {
            kind: non_blank(kind).unwrap_or(UNKNOWN_ERROR).to_string(),
            message: message.into(),
            origin: origin.into(),
            timestamp_ms: current_timestamp_ms(),
        }
    }

    /// Builds an event from any error value.
    pub fn from_error<E>(kind: Option<&str>, error: &E, origin: impl Into<String>) -> Self
    where
        E: std::error::Error + ?Sized,
    {
        Self::new(kind, error.to_string(), origin)
    }
}

/// An intercepted warning, converted 1:1 into a warning counter increment.
#[derive(Debug, Clone, PartialEq)]
pub struct WarningEvent {
    pub kind: String,
    pub message: String,
    pub origin: String,
    pub timestamp_ms: u64,
}

impl WarningEvent {
    /// Builds an event; a missing or blank message becomes [`UNKNOWN_WARNING`].
    pub fn new(message: Option<&str>, origin: impl Into<String>) -> Self {
        Self {
            kind: "Warning".to_string(),
            message: non_blank(message).unwrap_or(UNKNOWN_WARNING).to_string(),
            origin: origin.into(),
            timestamp_ms: current_timestamp_ms(),
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Truncates a label value to [`MAX_LABEL_LEN`] bytes on a char boundary.
pub(crate) fn label_value(value: &str) -> String {
    if value.len() <= MAX_LABEL_LEN {
        return value.to_string();
    }
    let mut cut = MAX_LABEL_LEN;
    while !value.is_char_boundary(cut) {
        cut -= 1;
    }
    value[..cut].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_without_name_is_unknown() {
        assert_eq!(ErrorEvent::new(None, "boom", "app").kind, UNKNOWN_ERROR);
        assert_eq!(ErrorEvent::new(Some("  "), "boom", "app").kind, UNKNOWN_ERROR);
        assert_eq!(ErrorEvent::new(Some("TypeError"), "boom", "app").kind, "TypeError");
    }

    #[test]
    fn test_warning_without_message_is_unknown() {
        assert_eq!(WarningEvent::new(None, "app").message, UNKNOWN_WARNING);
        assert_eq!(WarningEvent::new(Some(""), "app").message, UNKNOWN_WARNING);
        assert_eq!(WarningEvent::new(Some("NG0913"), "app").message, "NG0913");
    }

    #[test]
    fn test_from_error_uses_display() {
        let err = std::io::Error::new(std::io::ErrorKind::Other, "disk on fire");
        let event = ErrorEvent::from_error(Some("IoError"), &err, "storage");
        assert_eq!(event.message, "disk on fire");
        assert_eq!(event.origin, "storage");
    }

    #[test]
    fn test_label_value_truncates_on_char_boundary() {
        let long = "é".repeat(100); // 200 bytes
        let label = label_value(&long);
        assert!(label.len() <= MAX_LABEL_LEN);
        assert!(label.chars().all(|c| c == 'é'));
        assert_eq!(label_value("short"), "short");
    }
}
