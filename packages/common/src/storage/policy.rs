use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Logical bucket for one upload use case.
///
/// Each bucket maps to a key prefix inside the physical store and carries its
/// own upload policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
    ProfileImages,
    CourseImages,
    ActivityFiles,
    Deposits,
}

impl Bucket {
    /// Key prefix inside the physical store.
    pub fn prefix(&self) -> &'static str {
        match self {
            Bucket::ProfileImages => "profile-images",
            Bucket::CourseImages => "course-images",
            Bucket::ActivityFiles => "activity-files",
            Bucket::Deposits => "deposits",
        }
    }

    /// Upload policy for this bucket.
    pub fn policy(&self) -> UploadPolicy {
        match self {
            Bucket::ProfileImages => UploadPolicy {
                max_size: 5 * 1024 * 1024,
                allowed_mime: &["image/png", "image/jpeg", "image/webp"],
                allowed_ext: &["png", "jpg", "jpeg", "webp"],
            },
            Bucket::CourseImages => UploadPolicy {
                max_size: 10 * 1024 * 1024,
                allowed_mime: &["image/png", "image/jpeg", "image/webp"],
                allowed_ext: &["png", "jpg", "jpeg", "webp"],
            },
            // Teaching material and deposited work accept any type; only
            // the size envelope differs.
            Bucket::ActivityFiles => UploadPolicy {
                max_size: 128 * 1024 * 1024,
                allowed_mime: &[],
                allowed_ext: &[],
            },
            Bucket::Deposits => UploadPolicy {
                max_size: 64 * 1024 * 1024,
                allowed_mime: &[],
                allowed_ext: &[],
            },
        }
    }
}

/// Per-use-case upload constraints. Empty allow-lists accept everything.
#[derive(Clone, Copy, Debug)]
pub struct UploadPolicy {
    pub max_size: u64,
    pub allowed_mime: &'static [&'static str],
    pub allowed_ext: &'static [&'static str],
}

/// Reason an upload was rejected before reaching the store.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PolicyError {
    #[error("file exceeds maximum size of {limit} bytes")]
    TooLarge { limit: u64 },
    #[error("content type '{0}' is not allowed")]
    MimeNotAllowed(String),
    #[error("file extension '{0}' is not allowed")]
    ExtensionNotAllowed(String),
}

impl UploadPolicy {
    /// Pure pre-upload check. Performs no I/O; callers run it before any
    /// byte reaches the store.
    pub fn check(
        &self,
        filename: &str,
        content_type: Option<&str>,
        size: u64,
    ) -> Result<(), PolicyError> {
        if size > self.max_size {
            return Err(PolicyError::TooLarge {
                limit: self.max_size,
            });
        }

        if !self.allowed_mime.is_empty() {
            let mime = content_type
                .map(str::to_owned)
                .or_else(|| {
                    mime_guess::from_path(filename)
                        .first()
                        .map(|m| m.to_string())
                })
                .unwrap_or_default();
            if !self.allowed_mime.iter().any(|m| *m == mime) {
                return Err(PolicyError::MimeNotAllowed(mime));
            }
        }

        if !self.allowed_ext.is_empty() {
            let ext = filename
                .rsplit_once('.')
                .map(|(_, e)| e.to_ascii_lowercase())
                .unwrap_or_default();
            if !self.allowed_ext.iter().any(|e| *e == ext) {
                return Err(PolicyError::ExtensionNotAllowed(ext));
            }
        }

        Ok(())
    }
}

/// Coarse file-kind tag derived from the extension.
///
/// Depository activities restrict uploads by these tags rather than by raw
/// extensions, so "pdf" covers a report and "archive" covers zip/tar alike.
pub fn file_kind(filename: &str) -> Option<&'static str> {
    let ext = filename.rsplit_once('.')?.1.to_ascii_lowercase();
    let kind = match ext.as_str() {
        "pdf" => "pdf",
        "png" | "jpg" | "jpeg" | "gif" | "webp" | "svg" => "image",
        "mp4" | "mkv" | "webm" | "avi" | "mov" => "video",
        "mp3" | "wav" | "ogg" | "flac" => "audio",
        "zip" | "tar" | "gz" | "rar" | "7z" => "archive",
        "doc" | "docx" | "odt" | "ppt" | "pptx" | "odp" | "xls" | "xlsx" | "ods" => "document",
        "txt" | "md" | "csv" => "text",
        "c" | "h" | "cpp" | "hpp" | "rs" | "py" | "java" | "js" | "ts" | "go" | "sql" => "code",
        _ => return None,
    };
    Some(kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_bucket_rejects_non_images() {
        let policy = Bucket::ProfileImages.policy();
        assert!(policy.check("avatar.png", Some("image/png"), 1024).is_ok());
        assert!(matches!(
            policy.check("avatar.exe", Some("application/octet-stream"), 1024),
            Err(PolicyError::MimeNotAllowed(_))
        ));
    }

    #[test]
    fn mime_is_guessed_from_filename_when_missing() {
        let policy = Bucket::CourseImages.policy();
        assert!(policy.check("banner.jpg", None, 1024).is_ok());
        assert!(policy.check("banner.pdf", None, 1024).is_err());
    }

    #[test]
    fn size_limit_enforced() {
        let policy = Bucket::Deposits.policy();
        assert!(matches!(
            policy.check("big.bin", None, policy.max_size + 1),
            Err(PolicyError::TooLarge { .. })
        ));
        assert!(policy.check("ok.bin", None, policy.max_size).is_ok());
    }

    #[test]
    fn deposit_bucket_accepts_any_extension() {
        let policy = Bucket::Deposits.policy();
        assert!(policy.check("weird.xyz", None, 10).is_ok());
    }

    #[test]
    fn extension_allow_list_is_case_insensitive() {
        let policy = Bucket::ProfileImages.policy();
        assert!(policy.check("AVATAR.PNG", Some("image/png"), 10).is_ok());
    }

    #[test]
    fn file_kind_maps_known_extensions() {
        assert_eq!(file_kind("report.pdf"), Some("pdf"));
        assert_eq!(file_kind("photo.JPG"), Some("image"));
        assert_eq!(file_kind("sources.zip"), Some("archive"));
        assert_eq!(file_kind("main.rs"), Some("code"));
    }

    #[test]
    fn file_kind_unknown_extensions() {
        assert_eq!(file_kind("data.xyz"), None);
        assert_eq!(file_kind("no_extension"), None);
    }
}
