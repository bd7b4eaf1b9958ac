use thiserror::Error;

/// 5 MiB.
pub const MAX_FILE_SIZE: u64 = 5 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Please select a valid image file.")]
    NotAnImage { mime: String },
    #[error("File size exceeds 5MB.")]
    TooLarge { size: u64, limit: u64 },
}

/// Accepts a candidate only when its declared type is an image and it fits
/// within `limit` bytes. The type is checked first.
pub fn validate_image(mime: &str, size: u64, limit: u64) -> Result<(), ValidationError> {
    if !mime.trim().to_ascii_lowercase().starts_with("image/") {
        return Err(ValidationError::NotAnImage {
            mime: mime.to_string(),
        });
    }
    if size > limit {
        return Err(ValidationError::TooLarge { size, limit });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_image_is_rejected_regardless_of_size() {
        for size in [0, 1, MAX_FILE_SIZE, MAX_FILE_SIZE + 1] {
            let err = validate_image("application/pdf", size, MAX_FILE_SIZE).unwrap_err();
            assert_eq!(err.to_string(), "Please select a valid image file.");
        }
        assert!(validate_image("", 10, MAX_FILE_SIZE).is_err());
        assert!(validate_image("text/plain", 10, MAX_FILE_SIZE).is_err());
    }

    #[test]
    fn size_limit_is_inclusive() {
        assert!(validate_image("image/png", 5_242_880, MAX_FILE_SIZE).is_ok());
        let err = validate_image("image/png", 5_242_881, MAX_FILE_SIZE).unwrap_err();
        assert_eq!(err.to_string(), "File size exceeds 5MB.");
        assert_eq!(
            err,
            ValidationError::TooLarge {
                size: 5_242_881,
                limit: MAX_FILE_SIZE
            }
        );
    }

    #[test]
    fn any_image_subtype_is_accepted() {
        for mime in ["image/jpeg", "image/webp", "image/heic", "IMAGE/PNG"] {
            assert!(validate_image(mime, 1024, MAX_FILE_SIZE).is_ok(), "{mime}");
        }
    }
}
