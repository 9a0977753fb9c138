//! Suggested pairing candidates for a developer object.

use crate::types::ApiObject;

/// How closely a candidate label matches the developer object's label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MatchRank {
    Exact,
    Substring,
    WordOverlap,
    None,
}

impl MatchRank {
    pub fn is_match(&self) -> bool {
        *self != MatchRank::None
    }
}

/// Rank `candidate` against `label`, case-insensitively.
pub fn match_rank(label: &str, candidate: &str) -> MatchRank {
    let label = label.trim().to_lowercase();
    let candidate = candidate.trim().to_lowercase();
    if label.is_empty() || candidate.is_empty() {
        return MatchRank::None;
    }

    if label == candidate {
        MatchRank::Exact
    } else if candidate.contains(&label) || label.contains(&candidate) {
        MatchRank::Substring
    } else if words(&label).any(|w| words(&candidate).any(|c| c == w)) {
        MatchRank::WordOverlap
    } else {
        MatchRank::None
    }
}

fn words(s: &str) -> impl Iterator<Item = &str> {
    s.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
}

fn candidate_rank(label: &str, candidate: &ApiObject) -> MatchRank {
    match_rank(label, &candidate.label_one).min(match_rank(label, &candidate.label_many))
}

/// Order candidates best match first; ties broken alphabetically by label.
pub fn rank_candidates<'a>(
    label: &str,
    candidates: impl IntoIterator<Item = &'a ApiObject>,
) -> Vec<&'a ApiObject> {
    let mut ranked: Vec<(MatchRank, String, &ApiObject)> = candidates
        .into_iter()
        .map(|c| (candidate_rank(label, c), c.label_one.to_lowercase(), c))
        .collect();
    ranked.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
    ranked.into_iter().map(|(_, _, c)| c).collect()
}

/// Returns true if the candidate is considered a suggested match for `label`.
pub fn is_suggested(label: &str, candidate: &ApiObject) -> bool {
    candidate_rank(label, candidate).is_match()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(label: &str) -> ApiObject {
        ApiObject {
            id: label.to_lowercase(),
            slug: label.to_lowercase(),
            label_one: label.to_string(),
            label_many: String::new(),
            selector: None,
        }
    }

    #[test]
    fn match_rank_levels() {
        assert_eq!(match_rank("Contact", "contact"), MatchRank::Exact);
        assert_eq!(match_rank("Contact", "Contacts"), MatchRank::Substring);
        assert_eq!(match_rank("Sales Order", "Order Line"), MatchRank::WordOverlap);
        assert_eq!(match_rank("Contact", "Invoice"), MatchRank::None);
        assert_eq!(match_rank("", "Invoice"), MatchRank::None);
    }

    #[test]
    fn matches_rank_before_non_matches() {
        let candidates = vec![api("Invoice"), api("Contacts"), api("Account"), api("Contact Person")];
        let ranked: Vec<&str> = rank_candidates("Contact", &candidates)
            .iter()
            .map(|c| c.label_one.as_str())
            .collect();
        assert_eq!(ranked, ["Contact Person", "Contacts", "Account", "Invoice"]);
    }

    #[test]
    fn label_many_counts_toward_match() {
        let mut person = api("Person");
        person.label_many = "Contacts".into();
        assert!(is_suggested("Contact", &person));
        assert!(!is_suggested("Contact", &api("Invoice")));
    }
}
