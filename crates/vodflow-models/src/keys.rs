//! Object-store key conventions.

/// Prefix under which the edge stores source uploads.
pub const RAW_VIDEO_PREFIX: &str = "raw-videos/";

/// Whether a key points at a stored source upload.
pub fn is_raw_video_key(key: &str) -> bool {
    key.strip_prefix(RAW_VIDEO_PREFIX)
        .is_some_and(|rest| !rest.is_empty() && !rest.contains(".."))
}

/// Derive the HLS output prefix for a source key: the conventional
/// `raw-videos/` segment and the file extension are stripped, so
/// `raw-videos/{uuid}-{name}.mp4` becomes `{uuid}-{name}`.
pub fn derive_output_prefix(raw_object_key: &str) -> String {
    let stripped = raw_object_key
        .strip_prefix(RAW_VIDEO_PREFIX)
        .unwrap_or(raw_object_key);

    // Drop the extension of the final path segment only.
    match (stripped.rfind('.'), stripped.rfind('/')) {
        (Some(dot), Some(slash)) if dot > slash => stripped[..dot].to_string(),
        (Some(dot), None) => stripped[..dot].to_string(),
        _ => stripped.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_prefix_and_extension() {
        assert_eq!(
            derive_output_prefix("raw-videos/3f2a-sample.mp4"),
            "3f2a-sample"
        );
    }

    #[test]
    fn handles_dotted_names() {
        assert_eq!(
            derive_output_prefix("raw-videos/a-b.c.final.mov"),
            "a-b.c.final"
        );
    }

    #[test]
    fn leaves_extensionless_keys_alone() {
        assert_eq!(derive_output_prefix("raw-videos/noext"), "noext");
    }

    #[test]
    fn dot_in_directory_is_not_an_extension() {
        assert_eq!(derive_output_prefix("some.dir/video"), "some.dir/video");
    }

    #[test]
    fn raw_key_validation() {
        assert!(is_raw_video_key("raw-videos/uuid-name.mp4"));
        assert!(!is_raw_video_key("raw-videos/"));
        assert!(!is_raw_video_key("raw-videos/../secret"));
        assert!(!is_raw_video_key("other/uuid-name.mp4"));
    }
}
