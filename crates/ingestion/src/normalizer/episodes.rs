//! Episode list extraction
//!
//! Structured lists come as server groups (`server_name` + `server_data`) or
//! as a flat `items` array. Some sources embed the list as free text, one
//! `Tập N|url` line per episode.

use super::aliases::{self, text};
use crate::models::{EpisodeRecord, ServerCandidate};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};

static FREE_TEXT_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)^\s*(t[ậa]p\s*[^|\r\n]*?)\s*\|\s*(\S+)\s*$").expect("valid episode line pattern")
});

static EPISODE_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d+").expect("valid episode number pattern"));

const SERVER_NAME: &[&str] = &["server_name", "name"];
const SERVER_ENTRIES: &[&str] = &["server_data", "items"];
const ENTRY_NAME: &[&str] = &["name", "title", "episode", "slug"];
const LINK_M3U8: &[&str] = &["link_m3u8", "m3u8"];
const LINK_EMBED: &[&str] = &["link_embed", "embed"];
const LINK_OTHER: &[&str] = &["url", "link", "file"];

/// Episodes from whatever structure the provider used
pub(crate) fn parse(slug: &str, value: &Value) -> Vec<EpisodeRecord> {
    match value {
        Value::String(body) => parse_free_text(slug, body),
        Value::Array(entries) => parse_array(slug, entries),
        Value::Object(_) => aliases::lookup(value, &["items", "episodes", "server_data"])
            .map(|inner| parse(slug, inner))
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

/// One episode per `Tập N|url` line, numbered 1.. in order of appearance
pub(crate) fn parse_free_text(slug: &str, body: &str) -> Vec<EpisodeRecord> {
    FREE_TEXT_LINE
        .captures_iter(body)
        .enumerate()
        .map(|(index, caps)| {
            let title = caps[1].trim().to_string();
            let url = caps[2].to_string();
            EpisodeRecord {
                movie_slug: slug.to_string(),
                episode_number: index as u32 + 1,
                title,
                servers: vec![ServerCandidate::unanalyzed("Server 1", url.clone())],
                url,
            }
        })
        .collect()
}

fn parse_array(slug: &str, entries: &[Value]) -> Vec<EpisodeRecord> {
    let grouped = entries.iter().any(|e| e.get("server_data").is_some());

    let mut merged: BTreeMap<u32, EpisodeDraft> = BTreeMap::new();
    if grouped {
        for (index, group) in entries.iter().enumerate() {
            let server = Some(text(group, SERVER_NAME))
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| format!("Server {}", index + 1));
            let items = aliases::lookup(group, SERVER_ENTRIES)
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default();
            merge_group(&mut merged, &server, items);
        }
    } else {
        merge_group(&mut merged, "Server 1", entries);
    }

    merged
        .into_iter()
        .map(|(number, draft)| draft.finish(slug, number))
        .collect()
}

#[derive(Default)]
struct EpisodeDraft {
    title: String,
    m3u8: Option<String>,
    embed: Option<String>,
    other: Option<String>,
    servers: Vec<ServerCandidate>,
}

impl EpisodeDraft {
    fn finish(self, slug: &str, number: u32) -> EpisodeRecord {
        // m3u8 first; embed only when no manifest exists anywhere
        let url = self.m3u8.or(self.embed).or(self.other).unwrap_or_default();
        let title = if self.title.is_empty() {
            format!("Tập {}", number)
        } else {
            self.title
        };
        EpisodeRecord {
            movie_slug: slug.to_string(),
            episode_number: number,
            title,
            url,
            servers: self.servers,
        }
    }
}

fn merge_group(merged: &mut BTreeMap<u32, EpisodeDraft>, server: &str, items: &[Value]) {
    let numbers = episode_numbers(items);

    for (item, number) in items.iter().zip(numbers) {
        let draft = merged.entry(number).or_default();
        if draft.title.is_empty() {
            draft.title = text(item, ENTRY_NAME);
        }

        let m3u8 = aliases::optional_text(item, LINK_M3U8);
        let embed = aliases::optional_text(item, LINK_EMBED);
        let other = aliases::optional_text(item, LINK_OTHER);

        if let Some(url) = &m3u8 {
            draft.m3u8.get_or_insert_with(|| url.clone());
            draft.servers.push(ServerCandidate::unanalyzed(server, url.clone()));
        }
        if let Some(url) = &embed {
            draft.embed.get_or_insert_with(|| url.clone());
            draft.servers.push(ServerCandidate::unanalyzed(server, url.clone()));
        }
        if m3u8.is_none() && embed.is_none() {
            if let Some(url) = other {
                draft.other.get_or_insert_with(|| url.clone());
                draft.servers.push(ServerCandidate::unanalyzed(server, url));
            }
        }
    }
}

/// Numbers parsed from entry names when they are complete and distinct,
/// otherwise 1-based positions
fn episode_numbers(items: &[Value]) -> Vec<u32> {
    let parsed: Option<Vec<u32>> = items
        .iter()
        .map(|item| {
            let label = text(item, ENTRY_NAME);
            EPISODE_NUMBER
                .find(&label)
                .and_then(|m| m.as_str().parse::<u32>().ok())
                .filter(|n| *n > 0)
        })
        .collect();

    match parsed {
        Some(numbers) if numbers.iter().collect::<HashSet<_>>().len() == numbers.len() => numbers,
        _ => (1..=items.len() as u32).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_free_text_numbering_follows_line_order() {
        let body = "Tập 5|https://a.example.com/5.m3u8\n\
                    garbage line\n\
                    Tập 2 | https://a.example.com/2.m3u8\n\
                    tap 9|https://a.example.com/9/embed";
        let episodes = parse_free_text("show", body);

        assert_eq!(episodes.len(), 3);
        let numbers: Vec<u32> = episodes.iter().map(|e| e.episode_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert_eq!(episodes[0].title, "Tập 5");
        assert_eq!(episodes[1].url, "https://a.example.com/2.m3u8");
    }

    #[test]
    fn test_server_groups_merge_by_episode() {
        let value = json!([
            {
                "server_name": "Vietsub #1",
                "server_data": [
                    { "name": "Tập 01", "link_embed": "https://p.example.com/e1", "link_m3u8": "https://s.example.com/1.m3u8" },
                    { "name": "Tập 02", "link_embed": "https://p.example.com/e2", "link_m3u8": "" }
                ]
            },
            {
                "server_name": "Thuyết minh",
                "server_data": [
                    { "name": "Tập 02", "link_m3u8": "https://t.example.com/2.m3u8" }
                ]
            }
        ]);

        let episodes = parse("show", &value);
        assert_eq!(episodes.len(), 2);

        assert_eq!(episodes[0].url, "https://s.example.com/1.m3u8");
        assert_eq!(episodes[0].servers.len(), 2);

        // Manifest from the second server wins over the first server's embed
        assert_eq!(episodes[1].episode_number, 2);
        assert_eq!(episodes[1].url, "https://t.example.com/2.m3u8");
        assert_eq!(episodes[1].servers.len(), 2);
    }

    #[test]
    fn test_embed_is_primary_only_without_manifest() {
        let value = json!([{ "server_name": "S", "server_data": [
            { "name": "Full", "link_embed": "https://p.example.com/full" }
        ]}]);
        let episodes = parse("movie", &value);
        assert_eq!(episodes[0].url, "https://p.example.com/full");
        assert_eq!(episodes[0].episode_number, 1);
    }

    #[test]
    fn test_duplicate_labels_fall_back_to_positions() {
        let value = json!([
            { "name": "Tập 1", "url": "https://a/1.mp4" },
            { "name": "Tập 1", "url": "https://a/2.mp4" }
        ]);
        let numbers: Vec<u32> = parse("x", &value).iter().map(|e| e.episode_number).collect();
        assert_eq!(numbers, vec![1, 2]);
    }
}
