// FormatSelector - maps a quality tier to a yt-dlp format expression
//
// Probed heights decide which bucket is requested:
// - High: best separate streams, falling back to best combined
// - Normal: <=480p, then <=720p, then unrestricted best
// - Low: best of <=360p when such a stream exists, else absolute worst

use std::collections::BTreeSet;

use super::models::{MediaKind, QualityTier};

pub const BEST: &str = "bestvideo+bestaudio/best";
pub const WORST: &str = "worstvideo+worstaudio/worst";
pub const AUDIO: &str = "bestaudio/best";

/// Expression used once after a FORMAT_UNAVAILABLE failure
pub const FALLBACK: &str = "best";

/// Format selector for quality tiers
pub struct FormatSelector;

impl FormatSelector {
    /// Format expression for a request, given the heights the probe saw
    pub fn select(kind: MediaKind, tier: QualityTier, heights: &BTreeSet<u32>) -> String {
        match kind {
            MediaKind::Audio => AUDIO.to_string(),
            MediaKind::Video => Self::select_video(tier, heights),
        }
    }

    pub fn select_video(tier: QualityTier, heights: &BTreeSet<u32>) -> String {
        match tier {
            QualityTier::High => BEST.to_string(),
            QualityTier::Normal => [480, 720]
                .into_iter()
                .find(|&cap| Self::has_height_at_most(heights, cap))
                .map(Self::capped)
                .unwrap_or_else(|| BEST.to_string()),
            QualityTier::Low => {
                if Self::has_height_at_most(heights, 360) {
                    Self::capped(360)
                } else {
                    WORST.to_string()
                }
            }
        }
    }

    /// Separate streams under the cap, or a combined stream under the cap
    fn capped(max_height: u32) -> String {
        format!(
            "bv[height<={}]+ba/b[height<={}]",
            max_height, max_height
        )
    }

    fn has_height_at_most(heights: &BTreeSet<u32>, cap: u32) -> bool {
        heights.range(..=cap).next().is_some()
    }

    /// Get recommended tier for the heights a video offers
    pub fn recommend_tier(heights: &BTreeSet<u32>) -> QualityTier {
        match heights.iter().next_back() {
            Some(&max) if max > 720 => QualityTier::Normal,
            Some(_) => QualityTier::High,
            None => QualityTier::Normal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heights(values: &[u32]) -> BTreeSet<u32> {
        values.iter().copied().collect()
    }

    #[test]
    fn high_is_always_best_pair() {
        assert_eq!(FormatSelector::select_video(QualityTier::High, &heights(&[144, 1080])), BEST);
        assert_eq!(FormatSelector::select_video(QualityTier::High, &BTreeSet::new()), BEST);
    }

    #[test]
    fn normal_prefers_480_then_720_then_best() {
        assert_eq!(
            FormatSelector::select_video(QualityTier::Normal, &heights(&[360, 720, 1080])),
            "bv[height<=480]+ba/b[height<=480]"
        );
        assert_eq!(
            FormatSelector::select_video(QualityTier::Normal, &heights(&[720, 1080])),
            "bv[height<=720]+ba/b[height<=720]"
        );
        assert_eq!(
            FormatSelector::select_video(QualityTier::Normal, &heights(&[1080, 2160])),
            BEST
        );
    }

    #[test]
    fn low_prefers_360_bucket_over_absolute_worst() {
        assert_eq!(
            FormatSelector::select_video(QualityTier::Low, &heights(&[144, 240, 360, 1080])),
            "bv[height<=360]+ba/b[height<=360]"
        );
        assert_eq!(FormatSelector::select_video(QualityTier::Low, &heights(&[480, 720])), WORST);
    }

    #[test]
    fn empty_height_set_falls_back_to_unrestricted() {
        let empty = BTreeSet::new();
        assert_eq!(FormatSelector::select_video(QualityTier::Normal, &empty), BEST);
        assert_eq!(FormatSelector::select_video(QualityTier::Low, &empty), WORST);
    }

    #[test]
    fn selection_is_pure() {
        let set = heights(&[240, 480, 1080]);
        for tier in [QualityTier::High, QualityTier::Normal, QualityTier::Low] {
            let first = FormatSelector::select(MediaKind::Video, tier, &set);
            let reordered = heights(&[1080, 240, 480, 480]);
            assert_eq!(first, FormatSelector::select(MediaKind::Video, tier, &set));
            assert_eq!(first, FormatSelector::select(MediaKind::Video, tier, &reordered));
        }
    }

    #[test]
    fn audio_ignores_tier_and_heights() {
        assert_eq!(FormatSelector::select(MediaKind::Audio, QualityTier::Low, &heights(&[144])), AUDIO);
        assert_eq!(FormatSelector::select(MediaKind::Audio, QualityTier::High, &BTreeSet::new()), AUDIO);
    }

    #[test]
    fn recommendation_tracks_max_height() {
        assert_eq!(FormatSelector::recommend_tier(&heights(&[360, 1080])), QualityTier::Normal);
        assert_eq!(FormatSelector::recommend_tier(&heights(&[360, 720])), QualityTier::High);
    }
}
