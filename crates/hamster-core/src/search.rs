//! Free-text search terms over facts.
//!
//! In a search query a comma (`,`) is a boolean OR and whitespace is a
//! boolean AND: `"work personal, urgent"` matches facts mentioning both
//! "work" and "personal", or mentioning "urgent". Each term is a
//! case-insensitive substring match against the fact's tags, category name,
//! activity name and description.

use serde::Serialize;

use crate::fact::Fact;

/// A parsed search query in disjunctive normal form.
///
/// Terms are stored lower-cased. An empty predicate matches every fact.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SearchPredicate {
    groups: Vec<Vec<String>>,
}

/// Parses a search query into a predicate.
///
/// Empty OR-groups (`"a,,b"`, a trailing comma) are dropped, so a query made
/// only of separators matches everything.
pub fn parse(query: &str) -> SearchPredicate {
    let groups = query
        .split(',')
        .map(|group| {
            group
                .split_whitespace()
                .map(str::to_lowercase)
                .collect::<Vec<_>>()
        })
        .filter(|terms| !terms.is_empty())
        .collect();
    SearchPredicate { groups }
}

impl SearchPredicate {
    /// A predicate that matches every fact.
    pub const fn match_all() -> Self {
        Self { groups: Vec::new() }
    }

    /// Whether this predicate matches everything.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// The OR-groups, each a list of lower-cased AND-terms.
    pub fn groups(&self) -> &[Vec<String>] {
        &self.groups
    }

    /// Evaluates the predicate against a fact.
    pub fn matches(&self, fact: &Fact) -> bool {
        if self.groups.is_empty() {
            return true;
        }
        let haystack = Haystack::from_fact(fact);
        self.groups
            .iter()
            .any(|terms| terms.iter().all(|term| haystack.contains(term)))
    }
}

/// Lower-cased searchable fields of one fact.
struct Haystack {
    fields: Vec<String>,
}

impl Haystack {
    fn from_fact(fact: &Fact) -> Self {
        let mut fields: Vec<String> = fact.tags.iter().map(|tag| tag.to_lowercase()).collect();
        if let Some(category) = fact.category.as_deref() {
            fields.push(category.to_lowercase());
        }
        fields.push(fact.activity.to_lowercase());
        fields.push(fact.description.to_lowercase());
        Self { fields }
    }

    fn contains(&self, term: &str) -> bool {
        self.fields.iter().any(|field| field.contains(term))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fact(activity: &str, category: Option<&str>, description: &str, tags: &[&str]) -> Fact {
        let mut fact = Fact::new(activity)
            .with_description(description)
            .with_tags(tags.iter().copied());
        fact.category = category.map(str::to_string);
        fact
    }

    #[test]
    fn test_parse_splits_or_groups_and_terms() {
        let predicate = parse("work personal, urgent");
        assert_eq!(
            predicate.groups(),
            &[
                vec!["work".to_string(), "personal".to_string()],
                vec!["urgent".to_string()]
            ]
        );
    }

    #[test]
    fn test_empty_query_matches_everything() {
        let predicate = parse("");
        assert!(predicate.is_empty());
        assert!(predicate.matches(&fact("Anything", None, "", &[])));
        assert!(parse(" , ,").is_empty());
    }

    #[test]
    fn test_empty_groups_are_dropped() {
        let predicate = parse("alpha,,beta,");
        assert_eq!(predicate.groups().len(), 2);
        assert!(!predicate.matches(&fact("gamma", None, "", &[])));
    }

    #[test]
    fn test_and_within_group_or_across_groups() {
        let predicate = parse("work personal, urgent");

        let both = fact("Planning", Some("Work"), "personal errands", &[]);
        let only_work = fact("Planning", Some("Work"), "", &[]);
        let urgent_tag = fact("Email", None, "", &["URGENT"]);
        let neither = fact("Lunch", Some("Life"), "sandwich", &["food"]);

        assert!(predicate.matches(&both));
        assert!(!predicate.matches(&only_work));
        assert!(predicate.matches(&urgent_tag));
        assert!(!predicate.matches(&neither));
    }

    #[test]
    fn test_terms_match_substrings_case_insensitively() {
        let predicate = parse("COD");
        assert!(predicate.matches(&fact("Coding", None, "", &[])));
        assert!(predicate.matches(&fact("Review", None, "code review", &[])));
        assert!(predicate.matches(&fact("Review", Some("Encoding"), "", &[])));
        assert!(predicate.matches(&fact("Review", None, "", &["decoder"])));
        assert!(!predicate.matches(&fact("Review", None, "", &["c-o-d"])));
    }

    #[test]
    fn test_term_may_be_satisfied_by_different_fields() {
        let predicate = parse("rust bugfix");
        assert!(predicate.matches(&fact("Bugfix", None, "", &["rust"])));
    }
}
