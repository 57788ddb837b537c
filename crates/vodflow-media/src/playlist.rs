//! Master playlist generation.

use vodflow_models::Resolution;

/// Render the master playlist referencing the given renditions, ascending by
/// bandwidth. Variant URIs are relative (`{tag}/index.m3u8`); the serving
/// proxy rewrites them to absolute URLs.
pub fn render_master_playlist(resolutions: &[Resolution]) -> String {
    let mut sorted: Vec<Resolution> = resolutions.to_vec();
    sorted.sort_by_key(|r| r.bandwidth_bps());
    sorted.dedup();

    let mut out = String::from("#EXTM3U\n#EXT-X-VERSION:3\n");
    for r in sorted {
        out.push_str(&format!(
            "#EXT-X-STREAM-INF:BANDWIDTH={},RESOLUTION={}x{}\n{}/index.m3u8\n",
            r.bandwidth_bps(),
            r.width(),
            r.height(),
            r.tag(),
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_rendition_master() {
        let playlist = render_master_playlist(&[Resolution::R360p]);
        assert_eq!(
            playlist,
            "#EXTM3U\n#EXT-X-VERSION:3\n\
             #EXT-X-STREAM-INF:BANDWIDTH=896000,RESOLUTION=640x360\n360p/index.m3u8\n"
        );
    }

    #[test]
    fn full_ladder_ascending_bitrate() {
        // Deliberately shuffled input
        let playlist = render_master_playlist(&[
            Resolution::R1080p,
            Resolution::R360p,
            Resolution::R720p,
            Resolution::R480p,
        ]);

        let uris: Vec<&str> = playlist
            .lines()
            .filter(|l| !l.starts_with('#'))
            .collect();
        assert_eq!(
            uris,
            vec![
                "360p/index.m3u8",
                "480p/index.m3u8",
                "720p/index.m3u8",
                "1080p/index.m3u8"
            ]
        );

        let bandwidths: Vec<&str> = playlist
            .lines()
            .filter(|l| l.starts_with("#EXT-X-STREAM-INF"))
            .collect();
        assert!(bandwidths[0].contains("BANDWIDTH=896000"));
        assert!(bandwidths[3].contains("BANDWIDTH=5192000,RESOLUTION=1920x1080"));
    }

    #[test]
    fn duplicates_collapse() {
        let playlist = render_master_playlist(&[Resolution::R360p, Resolution::R360p]);
        assert_eq!(playlist.matches("360p/index.m3u8").count(), 1);
    }
}
