use crate::aggregate::AggregateEntry;
use crate::snapshot::Snapshot;
use chrono::{DateTime, Utc};

pub const LEADERBOARD_SIZE: usize = 10;

/// Longest message the chat transport accepts in one piece.
pub const MESSAGE_LIMIT: usize = 4096;
/// Chunk size used once a message exceeds [`MESSAGE_LIMIT`].
pub const CHUNK_SIZE: usize = 4000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Champion,
    TopThree,
    TopTen,
    TopHalf,
    Rising,
}

impl Tier {
    pub fn for_rank(rank: usize, total_users: usize) -> Self {
        match rank {
            1 => Tier::Champion,
            2..=3 => Tier::TopThree,
            4..=10 => Tier::TopTen,
            _ if rank <= total_users.div_ceil(2) => Tier::TopHalf,
            _ => Tier::Rising,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Tier::Champion => "🥇 #1 Champion",
            Tier::TopThree => "🥈 Top 3",
            Tier::TopTen => "🏅 Top 10",
            Tier::TopHalf => "📈 Top half",
            Tier::Rising => "🌱 Rising",
        }
    }

    pub fn encouragement(&self) -> &'static str {
        match self {
            Tier::Champion => "👑 You're the biggest supporter out there. Thank you!",
            Tier::TopThree => "🔥 So close to the top spot. Keep it going!",
            Tier::TopTen => "💪 You're in the top 10. A few more mentions and you'll climb!",
            Tier::TopHalf => "🚀 Solid work. The top 10 is within reach!",
            Tier::Rising => "🌟 Every mention counts. Keep spreading the word!",
        }
    }
}

/// Result of a personal-stats lookup. A miss is a normal answer, not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum PersonalStats {
    Found(UserStats),
    NotFound { handle: String, target_handle: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserStats {
    pub entry: AggregateEntry,
    pub rank: usize,
    pub total_users: usize,
    pub share_percent: f64,
    pub tier: Tier,
}

impl PersonalStats {
    pub fn found(&self) -> bool {
        matches!(self, PersonalStats::Found(_))
    }

    pub fn render(&self) -> String {
        match self {
            PersonalStats::Found(stats) => format_user_stats(stats),
            PersonalStats::NotFound { handle, target_handle } => format!(
                "❌ @{} has not mentioned @{} recently, or is not on the leaderboard yet.",
                handle, target_handle
            ),
        }
    }
}

/// `count / total * 100`, rounded to one decimal.
pub fn share_percent(count: u32, total_mentions: usize) -> f64 {
    if total_mentions == 0 {
        return 0.0;
    }
    let share = f64::from(count) / total_mentions as f64 * 100.0;
    (share * 10.0).round() / 10.0
}

fn verified_badge(verified: bool) -> &'static str {
    if verified {
        " ✓"
    } else {
        ""
    }
}

fn entry_line(rank: usize, entry: &AggregateEntry) -> String {
    format!(
        "#{:02} | {:>3} mentions | @{}{}",
        rank,
        entry.count,
        entry.handle,
        verified_badge(entry.verified)
    )
}

/// Top-10 leaderboard as sent to chat.
pub fn format_leaderboard(snapshot: &Snapshot, now: DateTime<Utc>) -> String {
    let mut lines = vec![
        "🏆 TOP 10 MOST ACTIVE MENTIONERS 🏆".to_string(),
        "═".repeat(45),
    ];
    lines.extend(
        snapshot
            .aggregate
            .iter()
            .take(LEADERBOARD_SIZE)
            .enumerate()
            .map(|(index, entry)| entry_line(index + 1, entry)),
    );
    lines.push(String::new());
    lines.push(format!("📊 Total unique users: {}", snapshot.unique_users()));
    lines.push(format!("📈 Total mentions analyzed: {}", snapshot.total_mentions));
    lines.push(format!("🕒 Last updated: {}", format_age(snapshot, now)));
    lines.join("\n")
}

/// Every entry, with display names. Used for logging.
pub fn format_full_leaderboard(snapshot: &Snapshot) -> String {
    let mut lines = vec!["🏆 MENTIONS LEADERBOARD 🏆".to_string(), "═".repeat(50)];
    lines.extend(
        snapshot
            .aggregate
            .iter()
            .enumerate()
            .map(|(index, entry)| format!("{} ({})", entry_line(index + 1, entry), entry.display_name)),
    );
    lines.join("\n")
}

fn format_age(snapshot: &Snapshot, now: DateTime<Utc>) -> String {
    match snapshot.age(now) {
        Some(age) => format!("{} minutes ago", age.num_minutes().max(0)),
        None => "never".to_string(),
    }
}

fn format_user_stats(stats: &UserStats) -> String {
    let entry = &stats.entry;
    [
        format!("📊 USER STATS FOR @{}{}", entry.handle, verified_badge(entry.verified)),
        "═".repeat(35),
        format!("🏅 Rank: #{} of {}", stats.rank, stats.total_users),
        format!("💬 Mentions: {}", entry.count),
        format!("📈 Share of all mentions: {:.1}%", stats.share_percent),
        format!("🎯 Performance: {}", stats.tier.label()),
        String::new(),
        format!("👤 Display name: {}", entry.display_name),
        format!("✅ Verified: {}", if entry.verified { "Yes" } else { "No" }),
        String::new(),
        stats.tier.encouragement().to_string(),
    ]
    .join("\n")
}

/// Split `text` for a transport that rejects messages over [`MESSAGE_LIMIT`].
///
/// Short messages pass through whole. Longer ones are cut into pieces of at
/// most [`CHUNK_SIZE`] characters, breaking after a newline where possible.
pub fn chunk_message(text: &str) -> Vec<String> {
    if text.chars().count() <= MESSAGE_LIMIT {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut rest = text;
    while !rest.is_empty() {
        let limit = rest
            .char_indices()
            .nth(CHUNK_SIZE)
            .map(|(index, _)| index)
            .unwrap_or(rest.len());
        let cut = if limit == rest.len() {
            limit
        } else {
            match rest[..limit].rfind('\n') {
                Some(newline) if newline > 0 => newline + 1,
                _ => limit,
            }
        };
        chunks.push(rest[..cut].to_string());
        rest = &rest[cut..];
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feeds::testing::{author, mention};
    use indexmap::IndexMap;

    fn entry(handle: &str, count: u32, verified: bool) -> AggregateEntry {
        AggregateEntry {
            handle: handle.to_string(),
            display_name: handle.to_uppercase(),
            verified,
            count,
        }
    }

    fn snapshot(updated: DateTime<Utc>) -> Snapshot {
        let mut x = author("x", "xavier");
        x.verified = true;
        let authors: IndexMap<_, _> = [x, author("y", "yolanda")]
            .into_iter()
            .map(|a| (a.id.clone(), a))
            .collect();
        Snapshot::build(
            "target".to_string(),
            vec![mention("3", "x", 3), mention("2", "y", 2), mention("1", "x", 1)],
            authors,
            Some("3".to_string()),
            Some(updated),
            Some(updated),
        )
    }

    #[test]
    fn test_entry_line_padding() {
        assert_eq!(entry_line(1, &entry("alice", 7, true)), "#01 |   7 mentions | @alice ✓");
        assert_eq!(entry_line(12, &entry("bob", 1234, false)), "#12 | 1234 mentions | @bob");
    }

    #[test]
    fn test_format_leaderboard() {
        let updated = Utc::now();
        let text = format_leaderboard(&snapshot(updated), updated + chrono::Duration::minutes(7));
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "🏆 TOP 10 MOST ACTIVE MENTIONERS 🏆");
        assert_eq!(lines[1], "═".repeat(45));
        assert_eq!(lines[2], "#01 |   2 mentions | @xavier ✓");
        assert_eq!(lines[3], "#02 |   1 mentions | @yolanda");
        assert_eq!(lines[4], "");
        assert_eq!(lines[5], "📊 Total unique users: 2");
        assert_eq!(lines[6], "📈 Total mentions analyzed: 3");
        assert_eq!(lines[7], "🕒 Last updated: 7 minutes ago");
    }

    #[test]
    fn test_format_leaderboard_caps_at_ten() {
        let mut snap = Snapshot::empty("target");
        snap.aggregate = (0..15).map(|i| entry(&format!("user{i}"), 20 - i, false)).collect();

        let text = format_leaderboard(&snap, Utc::now());

        assert_eq!(text.lines().filter(|l| l.starts_with('#')).count(), 10);
        assert!(text.contains("Last updated: never"));
    }

    #[test]
    fn test_format_full_leaderboard_includes_display_names() {
        let text = format_full_leaderboard(&snapshot(Utc::now()));
        assert!(text.contains("#01 |   2 mentions | @xavier ✓ (XAVIER)"));
        assert!(text.contains("#02 |   1 mentions | @yolanda (YOLANDA)"));
    }

    #[test]
    fn test_tiers() {
        assert_eq!(Tier::for_rank(1, 50), Tier::Champion);
        assert_eq!(Tier::for_rank(3, 50), Tier::TopThree);
        assert_eq!(Tier::for_rank(10, 50), Tier::TopTen);
        assert_eq!(Tier::for_rank(25, 50), Tier::TopHalf);
        assert_eq!(Tier::for_rank(26, 50), Tier::Rising);
        assert_eq!(Tier::for_rank(11, 21), Tier::TopHalf);
    }

    #[test]
    fn test_share_percent_rounds_to_one_decimal() {
        assert_eq!(share_percent(1, 3), 33.3);
        assert_eq!(share_percent(2, 3), 66.7);
        assert_eq!(share_percent(5, 0), 0.0);
    }

    #[test]
    fn test_render_user_stats() {
        let stats = PersonalStats::Found(UserStats {
            entry: entry("alice", 4, true),
            rank: 2,
            total_users: 9,
            share_percent: 40.0,
            tier: Tier::TopThree,
        });
        let text = stats.render();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "📊 USER STATS FOR @alice ✓");
        assert_eq!(lines[2], "🏅 Rank: #2 of 9");
        assert_eq!(lines[3], "💬 Mentions: 4");
        assert_eq!(lines[4], "📈 Share of all mentions: 40.0%");
        assert_eq!(lines[5], "🎯 Performance: 🥈 Top 3");
        assert_eq!(lines[7], "👤 Display name: ALICE");
        assert_eq!(lines[8], "✅ Verified: Yes");
        assert_eq!(lines[10], Tier::TopThree.encouragement());
    }

    #[test]
    fn test_render_not_found() {
        let stats = PersonalStats::NotFound {
            handle: "ghost".to_string(),
            target_handle: "target".to_string(),
        };
        assert!(!stats.found());
        assert!(stats.render().contains("@ghost"));
    }

    #[test]
    fn test_chunk_short_message_untouched() {
        assert_eq!(chunk_message("hello"), vec!["hello".to_string()]);
        let exact = "a".repeat(MESSAGE_LIMIT);
        assert_eq!(chunk_message(&exact).len(), 1);
    }

    #[test]
    fn test_chunk_long_message_prefers_newlines() {
        let line = format!("{}\n", "x".repeat(99));
        let text = line.repeat(50);

        let chunks = chunk_message(&text);

        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| c.chars().count() <= CHUNK_SIZE));
        assert!(chunks[0].ends_with('\n'));
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn test_chunk_without_newlines_hard_splits() {
        let text = "é".repeat(9000);

        let chunks = chunk_message(&text);

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].chars().count(), CHUNK_SIZE);
        assert_eq!(chunks[2].chars().count(), 1000);
    }
}
