use chrono::Utc;
use rand::Rng;

/// Maximum length of the sanitized filename suffix embedded in a key.
const MAX_NAME_LEN: usize = 128;

/// Sanitize an upload filename for embedding in an object key.
///
/// Keeps ASCII alphanumerics, `.`, `_` and `-`; everything else becomes `_`.
/// Leading dots are stripped so keys never look like hidden files.
pub fn sanitize_filename(name: &str) -> String {
    let mut out: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    while out.starts_with('.') {
        out.remove(0);
    }

    if out.is_empty() {
        out.push_str("file");
    }

    if out.len() > MAX_NAME_LEN {
        out.truncate(MAX_NAME_LEN);
    }

    out
}

/// Generate a collision-resistant object key for an upload.
///
/// Layout: `{unix_millis}-{8 hex random}-{sanitized name}`. Keys are never
/// reused, so an upload can never overwrite an existing object.
pub fn generate_key(name: &str) -> String {
    let millis = Utc::now().timestamp_millis();
    let random: [u8; 4] = rand::rng().random();
    format!("{millis}-{}-{}", hex::encode(random), sanitize_filename(name))
}

/// Recover the (sanitized) upload filename from an object key.
///
/// Falls back to the whole key if it does not match the generated layout.
pub fn original_filename(key: &str) -> &str {
    let mut parts = key.splitn(3, '-');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(_), Some(_), Some(name)) if !name.is_empty() => name,
        _ => key,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_keeps_safe_characters() {
        assert_eq!(sanitize_filename("report-v2.pdf"), "report-v2.pdf");
        assert_eq!(sanitize_filename("Main_1.java"), "Main_1.java");
    }

    #[test]
    fn sanitize_replaces_unsafe_characters() {
        assert_eq!(sanitize_filename("mon rapport.pdf"), "mon_rapport.pdf");
        assert_eq!(sanitize_filename("a/b\\c.txt"), "a_b_c.txt");
        assert_eq!(sanitize_filename("résumé.doc"), "r_sum_.doc");
    }

    #[test]
    fn sanitize_strips_leading_dots() {
        assert_eq!(sanitize_filename("..hidden.txt"), "hidden.txt");
        assert_eq!(sanitize_filename("..."), "file");
    }

    #[test]
    fn sanitize_never_returns_empty() {
        assert_eq!(sanitize_filename(""), "file");
        assert_eq!(sanitize_filename("   "), "file");
    }

    #[test]
    fn generated_keys_are_unique() {
        let a = generate_key("essay.pdf");
        let b = generate_key("essay.pdf");
        assert_ne!(a, b);
    }

    #[test]
    fn original_filename_round_trip() {
        let key = generate_key("essay final.pdf");
        assert_eq!(original_filename(&key), "essay_final.pdf");
    }

    #[test]
    fn original_filename_preserves_dashes_in_name() {
        let key = generate_key("report-v2.pdf");
        assert_eq!(original_filename(&key), "report-v2.pdf");
    }

    #[test]
    fn original_filename_falls_back_on_foreign_keys() {
        assert_eq!(original_filename("plain.txt"), "plain.txt");
        assert_eq!(original_filename(""), "");
    }
}
