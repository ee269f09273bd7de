use crate::feeds::{Author, Mention};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateEntry {
    pub handle: String,
    pub display_name: String,
    pub verified: bool,
    pub count: u32,
}

/// Count mentions per author handle and rank them, most mentions first.
///
/// `mentions` is newest-first, so it is walked from the oldest end: authors
/// with equal counts keep the order in which they were first discovered.
/// Mentions whose author is not in `authors` are skipped.
pub fn aggregate(mentions: &[Mention], authors: &IndexMap<String, Author>) -> Vec<AggregateEntry> {
    let mut counts: IndexMap<&str, AggregateEntry> = IndexMap::new();

    for mention in mentions.iter().rev() {
        let Some(author) = authors.get(&mention.author_id) else {
            continue;
        };

        counts
            .entry(author.handle.as_str())
            .or_insert_with(|| AggregateEntry {
                handle: author.handle.clone(),
                display_name: author.display_name.clone(),
                verified: author.verified,
                count: 0,
            })
            .count += 1;
    }

    let mut ranked: Vec<AggregateEntry> = counts.into_values().collect();
    // stable: ties stay in discovery order
    ranked.sort_by(|a, b| b.count.cmp(&a.count));
    ranked
}

/// Case-insensitive handle lookup, tolerating a leading "@".
/// Returns the 1-based rank alongside the entry.
pub fn find_entry<'a>(ranked: &'a [AggregateEntry], handle: &str) -> Option<(usize, &'a AggregateEntry)> {
    let wanted = normalize_handle(handle);
    if wanted.is_empty() {
        return None;
    }
    ranked
        .iter()
        .enumerate()
        .find(|(_, entry)| normalize_handle(&entry.handle).eq_ignore_ascii_case(wanted))
        .map(|(index, entry)| (index + 1, entry))
}

pub fn normalize_handle(handle: &str) -> &str {
    handle.trim().trim_start_matches('@')
}
