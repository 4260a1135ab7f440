use crate::error::ValidationError;

use super::types::RawUpload;

/// 合成前的快速预检，不做任何解码。
///
/// 规则按固定顺序短路：数量 → 文件名 → 声明类型 → 单文件大小。
/// 数量不对时直接返回，不检查文件名与类型。
pub fn validate(uploads: &[RawUpload], max_file_bytes: u64) -> Result<(), ValidationError> {
    if uploads.is_empty() {
        return Err(ValidationError::NoFiles);
    }
    if uploads.len() != 2 {
        return Err(ValidationError::WrongCount(uploads.len()));
    }

    for upload in uploads {
        if upload.filename.trim().is_empty() {
            return Err(ValidationError::EmptyFilename);
        }
    }

    for upload in uploads {
        let declared = upload.content_type.as_deref().unwrap_or("");
        if !declared.starts_with("image/") {
            return Err(ValidationError::WrongType(if declared.is_empty() {
                "未声明".to_string()
            } else {
                declared.to_string()
            }));
        }
    }

    if max_file_bytes > 0 {
        for upload in uploads {
            if upload.len() > max_file_bytes {
                return Err(ValidationError::TooLarge {
                    limit: max_file_bytes,
                    actual: upload.len(),
                });
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::validate;
    use crate::error::ValidationError;
    use crate::features::process::types::RawUpload;
    use axum::body::Bytes;

    fn upload(filename: &str, content_type: Option<&str>, size: usize) -> RawUpload {
        RawUpload {
            filename: filename.to_string(),
            content_type: content_type.map(str::to_string),
            bytes: Bytes::from(vec![0u8; size]),
        }
    }

    #[test]
    fn empty_list_is_no_files() {
        assert_eq!(validate(&[], 0), Err(ValidationError::NoFiles));
    }

    #[test]
    fn wrong_count_short_circuits_before_other_rules() {
        // 三个上传全都有空文件名和错误类型，但必须先报数量错误。
        let uploads = vec![
            upload("", Some("text/plain"), 1),
            upload("", Some("text/plain"), 1),
            upload("", Some("text/plain"), 1),
        ];
        assert_eq!(validate(&uploads, 0), Err(ValidationError::WrongCount(3)));
    }

    #[test]
    fn empty_filename_is_checked_before_type() {
        let uploads = vec![
            upload("", Some("text/plain"), 1),
            upload("style.png", Some("image/png"), 1),
        ];
        assert_eq!(validate(&uploads, 0), Err(ValidationError::EmptyFilename));
    }

    #[test]
    fn declared_type_must_be_image() {
        let uploads = vec![
            upload("content.jpg", Some("image/jpeg"), 1),
            upload("style.txt", Some("text/plain"), 1),
        ];
        assert_eq!(
            validate(&uploads, 0),
            Err(ValidationError::WrongType("text/plain".to_string()))
        );
    }

    #[test]
    fn missing_declared_type_is_rejected() {
        let uploads = vec![
            upload("content.jpg", Some("image/jpeg"), 1),
            upload("style.png", None, 1),
        ];
        assert!(matches!(
            validate(&uploads, 0),
            Err(ValidationError::WrongType(_))
        ));
    }

    #[test]
    fn per_file_cap_is_enforced_last() {
        let uploads = vec![
            upload("content.jpg", Some("image/jpeg"), 10),
            upload("style.png", Some("image/png"), 100),
        ];
        assert_eq!(
            validate(&uploads, 64),
            Err(ValidationError::TooLarge {
                limit: 64,
                actual: 100
            })
        );
        // 上限为 0 表示不启用单文件大小检查。
        assert_eq!(validate(&uploads, 0), Ok(()));
    }

    #[test]
    fn two_wellformed_uploads_pass() {
        let uploads = vec![
            upload("content.jpg", Some("image/jpeg"), 10),
            upload("style.png", Some("image/png"), 10),
        ];
        assert_eq!(validate(&uploads, 1024), Ok(()));
    }
}
