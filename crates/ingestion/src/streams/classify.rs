//! URL classification, quality inference and ranking

use crate::models::{Quality, ServerCandidate, StreamType};
use url::Url;

const SEGMENTED_MARKERS: &[&str] = &[".m3u8", ".mpd"];
const EMBED_MARKERS: &[&str] = &["embed", "player"];

const FHD_TOKENS: &[&str] = &["2160", "4k", "1080", "fhd", "fullhd"];
const HD_TOKENS: &[&str] = &["720", "hd"];
const SD_TOKENS: &[&str] = &["480", "360", "sd"];

/// Transport type judged from the URL text alone
pub fn classify_url(raw: &str) -> StreamType {
    let raw = raw.trim();
    if raw.is_empty() || Url::parse(raw).is_err() {
        return StreamType::Unknown;
    }

    let lower = raw.to_ascii_lowercase();
    if SEGMENTED_MARKERS.iter().any(|m| lower.contains(m)) {
        StreamType::SegmentedStream
    } else if EMBED_MARKERS.iter().any(|m| lower.contains(m)) {
        StreamType::Embed
    } else {
        StreamType::DirectFile
    }
}

/// Quality hint from resolution markers in the URL
///
/// Markers must be whole tokens (`1080p` counts, `a1080b` does not). No marker
/// means HD; this is a convention, not a measurement.
pub fn infer_quality(raw: &str) -> Quality {
    let lower = raw.to_ascii_lowercase();
    let tokens: Vec<&str> = lower
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| match t.strip_suffix('p') {
            Some(digits) if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) => {
                digits
            }
            _ => t,
        })
        .collect();

    let has = |markers: &[&str]| tokens.iter().any(|t| markers.contains(t));
    if has(FHD_TOKENS) {
        Quality::FHD
    } else if has(HD_TOKENS) {
        Quality::HD
    } else if has(SD_TOKENS) {
        Quality::SD
    } else {
        Quality::HD
    }
}

/// Fill in type, quality and priority from the URL
pub fn classify(mut candidate: ServerCandidate) -> ServerCandidate {
    candidate.stream_type = classify_url(&candidate.url);
    candidate.quality = infer_quality(&candidate.url);
    candidate.priority = candidate.stream_type.priority();
    candidate
}

/// Sort best-first by (type priority, not working); stable otherwise
pub fn rank(mut candidates: Vec<ServerCandidate>) -> Vec<ServerCandidate> {
    for candidate in &mut candidates {
        candidate.priority = candidate.stream_type.priority();
    }
    candidates.sort_by_key(|c| (c.priority, !c.is_working));
    candidates
}

/// Best server of the preferred quality, else best overall
pub fn select_best(ranked: &[ServerCandidate], preferred: Quality) -> Option<&ServerCandidate> {
    ranked
        .iter()
        .find(|c| c.quality == preferred)
        .or_else(|| ranked.first())
}
