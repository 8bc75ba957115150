// Path ranking - orders destinations by keyword hits in the probed title
//
// Score = number of a destination's keywords found as substrings of the
// lowercased title. Ordering is descending by score and stable, so a
// catch-all entry without keywords is always kept, behind anything that matched.

use std::cmp::Reverse;

use super::models::DestinationCandidate;

/// What text the keywords are matched against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RankingMode {
    /// Title only
    #[default]
    TitleOnly,
    /// Title plus every tag; a keyword still counts once
    TitleAndTags,
}

impl RankingMode {
    pub fn from_score_tags(score_tags: bool) -> Self {
        if score_tags {
            Self::TitleAndTags
        } else {
            Self::TitleOnly
        }
    }
}

/// Rank `catalog` for a probed title. Returns every entry exactly once.
pub fn rank<'a>(
    title: &str,
    tags: &[String],
    catalog: &'a [DestinationCandidate],
    mode: RankingMode,
) -> Vec<&'a DestinationCandidate> {
    let mut haystacks = vec![title.to_lowercase()];
    if mode == RankingMode::TitleAndTags {
        haystacks.extend(tags.iter().map(|tag| tag.to_lowercase()));
    }

    let mut ranked: Vec<(usize, &DestinationCandidate)> = catalog
        .iter()
        .map(|candidate| (score(candidate, &haystacks), candidate))
        .collect();

    // sort_by_key is stable
    ranked.sort_by_key(|(score, _)| Reverse(*score));

    ranked.into_iter().map(|(_, candidate)| candidate).collect()
}

fn score(candidate: &DestinationCandidate, haystacks: &[String]) -> usize {
    candidate
        .keywords
        .iter()
        .filter(|keyword| haystacks.iter().any(|text| text.contains(keyword.as_str())))
        .count()
}
