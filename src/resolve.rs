//! Free-text server and channel name resolution.
//!
//! Resolution tries, in order: "current server" aliases (guilds only), an
//! exact name match, a case-insensitive match, then the single best fuzzy
//! candidate at or above the similarity threshold.

use crate::error::ResolutionError;
use crate::{ChannelInfo, GuildInfo};
use std::sync::Arc;

/// Queries that always mean the guild the directive came from.
const CURRENT_GUILD_ALIASES: [&str; 3] = ["this server", "current server", "here"];

/// String similarity strategy. Scores are in `0.0..=1.0`.
pub trait Similarity: Send + Sync {
    fn score(&self, a: &str, b: &str) -> f64;
}

/// Matching-blocks (Ratcliff/Obershelp) ratio over lowercased input:
/// `2 * M / T`, where `M` counts characters in recursively found longest
/// common blocks and `T` is the combined length.
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchingBlocksRatio;

impl Similarity for MatchingBlocksRatio {
    fn score(&self, a: &str, b: &str) -> f64 {
        let a: Vec<char> = a.to_lowercase().chars().collect();
        let b: Vec<char> = b.to_lowercase().chars().collect();
        let total = a.len() + b.len();
        if total == 0 {
            return 1.0;
        }
        2.0 * matched_chars(&a, &b) as f64 / total as f64
    }
}

fn matched_chars(a: &[char], b: &[char]) -> usize {
    let mut matched = 0;
    let mut pending = vec![(0, a.len(), 0, b.len())];

    while let Some((a_lo, a_hi, b_lo, b_hi)) = pending.pop() {
        let (i, j, size) = longest_block(a, b, a_lo, a_hi, b_lo, b_hi);
        if size == 0 {
            continue;
        }
        matched += size;
        if a_lo < i && b_lo < j {
            pending.push((a_lo, i, b_lo, j));
        }
        if i + size < a_hi && j + size < b_hi {
            pending.push((i + size, a_hi, j + size, b_hi));
        }
    }

    matched
}

/// Longest common block within the given ranges. Ties go to the block that
/// ends earliest in `a`, then earliest in `b`.
fn longest_block(
    a: &[char],
    b: &[char],
    a_lo: usize,
    a_hi: usize,
    b_lo: usize,
    b_hi: usize,
) -> (usize, usize, usize) {
    let width = b_hi - b_lo + 1;
    let mut best = (a_lo, b_lo, 0);
    let mut previous = vec![0usize; width];

    for i in a_lo..a_hi {
        let mut current = vec![0usize; width];
        for j in b_lo..b_hi {
            if a[i] == b[j] {
                let length = previous[j - b_lo] + 1;
                current[j - b_lo + 1] = length;
                if length > best.2 {
                    best = (i + 1 - length, j + 1 - length, length);
                }
            }
        }
        previous = current;
    }

    best
}

/// How a name was matched.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MatchKind {
    /// "this server", "here", or the context guild's own name.
    Alias,
    Exact,
    CaseInsensitive,
    Fuzzy { score: f64 },
}

/// A successful resolution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NameMatch<'a, T> {
    pub value: &'a T,
    pub kind: MatchKind,
}

impl<T> NameMatch<'_, T> {
    /// Fuzzy matches warrant an "assuming you meant" notice to the user.
    pub fn is_fuzzy(&self) -> bool {
        matches!(self.kind, MatchKind::Fuzzy { .. })
    }
}

/// Resolves guild and channel names with a pluggable similarity strategy.
#[derive(Clone)]
pub struct NameResolver {
    similarity: Arc<dyn Similarity>,
    threshold: f64,
}

impl std::fmt::Debug for NameResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NameResolver")
            .field("threshold", &self.threshold)
            .finish_non_exhaustive()
    }
}

impl Default for NameResolver {
    fn default() -> Self {
        Self::new(0.5)
    }
}

impl NameResolver {
    /// Resolver using [`MatchingBlocksRatio`].
    pub fn new(threshold: f64) -> Self {
        Self::with_similarity(Arc::new(MatchingBlocksRatio), threshold)
    }

    pub fn with_similarity(similarity: Arc<dyn Similarity>, threshold: f64) -> Self {
        Self {
            similarity,
            threshold,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn resolve_guild<'a>(
        &self,
        query: &str,
        context_guild: Option<&'a GuildInfo>,
        guilds: &'a [GuildInfo],
    ) -> Result<NameMatch<'a, GuildInfo>, ResolutionError> {
        let query = query.trim();
        let lowered = query.to_lowercase();

        if let Some(context) = context_guild
            && (CURRENT_GUILD_ALIASES.contains(&lowered.as_str())
                || context.name.to_lowercase() == lowered)
        {
            return Ok(NameMatch {
                value: context,
                kind: MatchKind::Alias,
            });
        }

        self.match_name(query, guilds, |guild| Some(guild.name.as_str()))
            .ok_or_else(|| ResolutionError::GuildNotFound {
                query: query.to_string(),
            })
    }

    /// Resolve among a guild's text channels.
    pub fn resolve_channel<'a>(
        &self,
        query: &str,
        guild: &GuildInfo,
        text_channels: &'a [ChannelInfo],
    ) -> Result<NameMatch<'a, ChannelInfo>, ResolutionError> {
        let query = query.trim();
        self.match_name(query, text_channels, |channel| channel.name.as_deref())
            .ok_or_else(|| ResolutionError::ChannelNotFound {
                guild: guild.name.clone(),
                query: query.to_string(),
            })
    }

    fn match_name<'a, T>(
        &self,
        query: &str,
        candidates: &'a [T],
        name_of: impl Fn(&T) -> Option<&str>,
    ) -> Option<NameMatch<'a, T>> {
        if let Some(value) = candidates.iter().find(|c| name_of(c) == Some(query)) {
            return Some(NameMatch {
                value,
                kind: MatchKind::Exact,
            });
        }

        let lowered = query.to_lowercase();
        if let Some(value) = candidates
            .iter()
            .find(|c| name_of(c).is_some_and(|name| name.to_lowercase() == lowered))
        {
            return Some(NameMatch {
                value,
                kind: MatchKind::CaseInsensitive,
            });
        }

        let mut best: Option<(&'a T, f64)> = None;
        for candidate in candidates {
            let Some(name) = name_of(candidate) else {
                continue;
            };
            let score = self.similarity.score(query, name);
            if score >= self.threshold && best.is_none_or(|(_, best_score)| score > best_score) {
                best = Some((candidate, score));
            }
        }

        best.map(|(value, score)| NameMatch {
            value,
            kind: MatchKind::Fuzzy { score },
        })
    }
}
