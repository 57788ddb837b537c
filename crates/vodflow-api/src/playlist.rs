//! HLS playlist rewriting.
//!
//! Stored playlists reference their variants and segments relatively; the
//! proxy rewrites those references to absolute URLs under its own `/hls`
//! tree so players stream through it instead of hitting the private bucket.

/// Whether a line already carries an absolute reference. Rewriting is
/// idempotent: such lines pass through untouched.
fn is_absolute(line: &str) -> bool {
    line.starts_with('/') || line.contains("://")
}

/// Whether a line is a bare segment file name (`segment000.ts`).
pub fn is_segment_name(name: &str) -> bool {
    name.strip_prefix("segment")
        .and_then(|rest| rest.strip_suffix(".ts"))
        .is_some_and(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
}

/// Rewrite a master playlist: each relative variant URI `{tag}/index.m3u8`
/// becomes `{api_base}/hls/{prefix}/{tag}/playlist.m3u8`. Tags and comments
/// are preserved verbatim.
pub fn rewrite_master(body: &str, api_base: &str, prefix: &str) -> String {
    body.split('\n')
        .map(|line| {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') || is_absolute(trimmed) {
                return line.to_string();
            }
            match trimmed.strip_suffix("/index.m3u8") {
                Some(tag) => format!("{api_base}/hls/{prefix}/{tag}/playlist.m3u8"),
                None => line.to_string(),
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Rewrite a variant playlist: each bare `segment{NNN}.ts` line becomes
/// `{api_base}/hls/{prefix}/{tag}/{segment}`. All `#EXT...` tags are
/// preserved verbatim.
pub fn rewrite_variant(body: &str, api_base: &str, prefix: &str, tag: &str) -> String {
    body.split('\n')
        .map(|line| {
            let trimmed = line.trim();
            if is_segment_name(trimmed) {
                format!("{api_base}/hls/{prefix}/{tag}/{trimmed}")
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "http://localhost:8000/api/upload";

    #[test]
    fn rewrites_master_variants() {
        let body = "#EXTM3U\n#EXT-X-VERSION:3\n\
                    #EXT-X-STREAM-INF:BANDWIDTH=896000,RESOLUTION=640x360\n360p/index.m3u8\n";
        let rewritten = rewrite_master(body, BASE, "P");
        assert_eq!(
            rewritten,
            "#EXTM3U\n#EXT-X-VERSION:3\n\
             #EXT-X-STREAM-INF:BANDWIDTH=896000,RESOLUTION=640x360\n\
             http://localhost:8000/api/upload/hls/P/360p/playlist.m3u8\n"
        );
    }

    #[test]
    fn master_rewrite_is_idempotent() {
        let body = "#EXTM3U\n360p/index.m3u8\n";
        let once = rewrite_master(body, BASE, "P");
        let twice = rewrite_master(&once, BASE, "P");
        assert_eq!(once, twice);
    }

    #[test]
    fn variant_rewrite_matches_wire_format() {
        // Literal end-to-end scenario body.
        let body = "#EXTM3U\n#EXTINF:15.0,\nsegment000.ts\nsegment001.ts\n#EXT-X-ENDLIST\n";
        let rewritten = rewrite_variant(body, BASE, "P", "360p");
        assert_eq!(
            rewritten,
            format!(
                "#EXTM3U\n#EXTINF:15.0,\n{BASE}/hls/P/360p/segment000.ts\n{BASE}/hls/P/360p/segment001.ts\n#EXT-X-ENDLIST\n"
            )
        );
    }

    #[test]
    fn ext_tags_pass_verbatim() {
        let body = "#EXT-X-TARGETDURATION:15\n#EXT-X-MEDIA-SEQUENCE:0\n";
        assert_eq!(rewrite_variant(body, BASE, "P", "360p"), body);
    }

    #[test]
    fn absolute_segment_lines_are_untouched() {
        let body = format!("{BASE}/hls/P/360p/segment000.ts\n");
        assert_eq!(rewrite_variant(&body, BASE, "P", "360p"), body);
    }

    #[test]
    fn segment_name_validation() {
        assert!(is_segment_name("segment000.ts"));
        assert!(is_segment_name("segment1234.ts"));
        assert!(!is_segment_name("segment.ts"));
        assert!(!is_segment_name("segment00x.ts"));
        assert!(!is_segment_name("other000.ts"));
        assert!(!is_segment_name("segment000.m3u8"));
    }

    #[test]
    fn nested_prefixes_are_supported() {
        let body = "720p/index.m3u8\n";
        let rewritten = rewrite_master(body, BASE, "courses/intro");
        assert_eq!(
            rewritten,
            format!("{BASE}/hls/courses/intro/720p/playlist.m3u8\n")
        );
    }
}
