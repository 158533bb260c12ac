use std::path::Path;

/// Maximum upload size: 100 MiB
pub const MAX_FILE_SIZE: usize = 100 * 1024 * 1024;

/// Declared MIME types accepted for conversion
pub const ALLOWED_MIME_TYPES: &[&str] = &["image/jpeg", "image/png", "image/gif"];

/// Strips parameters and normalizes case: `Image/PNG; q=1` -> `image/png`
pub fn normalize_mime(content_type: &str) -> String {
    match content_type.trim().parse::<mime::Mime>() {
        Ok(parsed) => parsed.essence_str().to_lowercase(),
        Err(_) => content_type
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_lowercase(),
    }
}

/// Checks a declared content type against the allow-list
pub fn is_allowed_mime_type(content_type: &str) -> bool {
    let normalized = normalize_mime(content_type);
    ALLOWED_MIME_TYPES
        .iter()
        .any(|&allowed| allowed == normalized)
}

/// Scratch-file extension for an allowed type
pub fn extension_for_mime(content_type: &str) -> Option<&'static str> {
    match normalize_mime(content_type).as_str() {
        "image/jpeg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/gif" => Some("gif"),
        _ => None,
    }
}

/// Sanitizes a client-supplied filename for logging and display.
/// Path components are dropped and reserved characters replaced.
pub fn sanitize_filename(filename: &str) -> String {
    // Treat backslashes as separators too, clients on Windows send them
    let unified = filename.replace('\\', "/");
    let name = Path::new(&unified)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("");

    if filename.contains("..") || filename.contains('/') || filename.contains('\\') {
        tracing::warn!("Path traversal attempt detected: {}", filename);
    }

    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_control()
                || c == ':'
                || c == '*'
                || c == '?'
                || c == '"'
                || c == '<'
                || c == '>'
                || c == '|'
                || c == ';'
            {
                '_'
            } else {
                c
            }
        })
        .collect();

    // Limit length safely for UTF-8
    let sanitized = if sanitized.len() > 255 {
        let mut end = 255;
        while !sanitized.is_char_boundary(end) {
            end -= 1;
        }
        sanitized[..end].to_string()
    } else {
        sanitized
    };

    if sanitized.is_empty() {
        "unnamed".to_string()
    } else {
        sanitized
    }
}
