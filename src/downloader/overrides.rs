// Override resolution - picks the cookies/format rule for a URL

use super::models::SourceOverride;

/// First rule whose pattern is contained in `url`. Table order decides, not specificity.
pub fn resolve<'a>(url: &str, overrides: &'a [SourceOverride]) -> Option<&'a SourceOverride> {
    overrides
        .iter()
        .find(|rule| url.contains(rule.url_pattern.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(pattern: &str, cookies: &str) -> SourceOverride {
        SourceOverride::new(pattern, Some(cookies.to_string()), None)
    }

    #[test]
    fn test_empty_table() {
        assert!(resolve("https://siteA.com/video", &[]).is_none());
    }

    #[test]
    fn test_first_match_wins_over_longer() {
        let table = vec![rule("siteA.com", "X"), rule("siteA.com/premium", "Y")];
        let hit = resolve("https://siteA.com/premium/video", &table).unwrap();
        assert_eq!(hit.cookies.as_deref(), Some("X"));
    }

    #[test]
    fn test_skips_non_matching_rules() {
        let table = vec![rule("siteB.org", "B"), rule("siteA.com", "A")];
        let hit = resolve("https://siteA.com/watch?v=1", &table).unwrap();
        assert_eq!(hit.cookies.as_deref(), Some("A"));
        assert!(resolve("https://other.net/", &table).is_none());
    }

    #[test]
    fn test_match_is_case_sensitive_substring() {
        let table = vec![rule("SiteA.com", "A")];
        assert!(resolve("https://sitea.com/x", &table).is_none());
    }
}
