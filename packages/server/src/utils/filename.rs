/// Result of validating an upload filename.
#[derive(Debug)]
pub enum FilenameError {
    /// Filename is empty or whitespace-only.
    Empty,
    /// Filename contains path separators (`/` or `\`).
    ContainsPathSeparator,
    /// Filename contains path traversal patterns (`..`).
    PathTraversal,
    /// Filename contains null bytes.
    NullByte,
    /// Filename starts with a dot (hidden file).
    Hidden,
    /// Filename contains control characters (CR, LF, etc.).
    ControlCharacter,
}

impl FilenameError {
    /// Returns a human-readable error message.
    pub fn message(&self) -> &'static str {
        match self {
            Self::Empty => "Filename cannot be empty",
            Self::ContainsPathSeparator => "Invalid filename: path separators are not allowed",
            Self::PathTraversal => "Invalid filename: '..' is not allowed",
            Self::NullByte => "Invalid filename: null bytes are not allowed",
            Self::Hidden => "Invalid filename: hidden files (starting with '.') are not allowed",
            Self::ControlCharacter => "Invalid filename: control characters are not allowed",
        }
    }
}

/// Validates an upload filename (no directory components allowed).
pub fn validate_upload_filename(filename: &str) -> Result<&str, FilenameError> {
    let trimmed = filename.trim();

    if trimmed.is_empty() {
        return Err(FilenameError::Empty);
    }

    if trimmed.contains('\0') {
        return Err(FilenameError::NullByte);
    }

    // Reject ASCII control characters to prevent
    // HTTP header injection (e.g. CRLF in Content-Disposition).
    if trimmed.chars().any(|c| c.is_ascii_control()) {
        return Err(FilenameError::ControlCharacter);
    }

    if trimmed.contains('/') || trimmed.contains('\\') {
        return Err(FilenameError::ContainsPathSeparator);
    }

    if trimmed == ".." {
        return Err(FilenameError::PathTraversal);
    }

    if trimmed.starts_with('.') {
        return Err(FilenameError::Hidden);
    }

    Ok(trimmed)
}

/// Build a safe `Content-Disposition` header value for a download.
pub fn content_disposition_value(filename: &str) -> String {
    let ascii_safe: String = filename
        .chars()
        .filter(|c| c.is_ascii_graphic() && !matches!(c, '"' | ';' | '\\'))
        .collect();
    let ascii_name = if ascii_safe.is_empty() {
        "download".to_string()
    } else {
        ascii_safe
    };

    // RFC 5987 percent-encoding for filename*.
    let encoded: String = filename
        .bytes()
        .map(|b| match b {
            b'A'..=b'Z'
            | b'a'..=b'z'
            | b'0'..=b'9'
            | b'!'
            | b'#'
            | b'$'
            | b'&'
            | b'+'
            | b'-'
            | b'.'
            | b'^'
            | b'_'
            | b'`'
            | b'|'
            | b'~' => String::from(b as char),
            _ => format!("%{b:02X}"),
        })
        .collect();

    format!("attachment; filename=\"{ascii_name}\"; filename*=UTF-8''{encoded}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_accepts_valid_names() {
        assert!(validate_upload_filename("rapport.pdf").is_ok());
        assert!(validate_upload_filename("TP2 - final.zip").is_ok());
        assert!(validate_upload_filename("  padded.txt  ").is_ok());
    }

    #[test]
    fn validate_rejects_empty() {
        assert!(matches!(
            validate_upload_filename(""),
            Err(FilenameError::Empty)
        ));
        assert!(matches!(
            validate_upload_filename("   "),
            Err(FilenameError::Empty)
        ));
    }

    #[test]
    fn validate_rejects_path_separators() {
        assert!(matches!(
            validate_upload_filename("dir/rapport.pdf"),
            Err(FilenameError::ContainsPathSeparator)
        ));
        assert!(matches!(
            validate_upload_filename("dir\\rapport.pdf"),
            Err(FilenameError::ContainsPathSeparator)
        ));
    }

    #[test]
    fn validate_rejects_traversal_and_hidden() {
        assert!(matches!(
            validate_upload_filename(".."),
            Err(FilenameError::PathTraversal)
        ));
        assert!(matches!(
            validate_upload_filename(".bashrc"),
            Err(FilenameError::Hidden)
        ));
    }

    #[test]
    fn validate_rejects_control_characters() {
        assert!(matches!(
            validate_upload_filename("file\r\nname.txt"),
            Err(FilenameError::ControlCharacter)
        ));
    }

    #[test]
    fn content_disposition_keeps_ascii() {
        let value = content_disposition_value("rapport.pdf");
        assert!(value.contains("filename=\"rapport.pdf\""));
    }

    #[test]
    fn content_disposition_encodes_non_ascii() {
        let value = content_disposition_value("résumé.pdf");
        assert!(value.contains("filename*=UTF-8''r%C3%A9sum%C3%A9.pdf"));
    }
}
