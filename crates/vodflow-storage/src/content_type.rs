//! Content-type inference for HLS output files.

/// Content type for an uploaded file, by extension. Only the types the HLS
/// tree actually contains are mapped; everything else is an octet stream.
pub fn content_type_for(filename: &str) -> &'static str {
    let ext = filename
        .rsplit('.')
        .next()
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "m3u8" => "application/vnd.apple.mpegurl",
        "ts" => "video/MP2T",
        "mp4" => "video/mp4",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn playlist_and_segment_types() {
        assert_eq!(content_type_for("master.m3u8"), "application/vnd.apple.mpegurl");
        assert_eq!(content_type_for("index.M3U8"), "application/vnd.apple.mpegurl");
        assert_eq!(content_type_for("segment000.ts"), "video/MP2T");
        assert_eq!(content_type_for("input.mp4"), "video/mp4");
        assert_eq!(content_type_for("notes.txt"), "application/octet-stream");
        assert_eq!(content_type_for("noext"), "application/octet-stream");
    }
}
