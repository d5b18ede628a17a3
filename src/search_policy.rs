use serde_json::Value;
use std::collections::HashSet;

/// Maximum number of users returned by user search.
pub const SEARCH_RESULT_CAP: usize = 10;

/// Keeps one account at the top of user search results when the query
/// resembles its username.
#[derive(Debug, Clone)]
pub struct PinnedAccountPolicy {
    username: String,
}

impl PinnedAccountPolicy {
    /// `None` for an empty username, which disables pinning.
    pub fn new(username: &str) -> Option<Self> {
        let username = normalize(username);
        if username.is_empty() {
            None
        } else {
            Some(Self { username })
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn matches(&self, query: &str) -> bool {
        let query = normalize(query);
        !query.is_empty() && (self.username.contains(&query) || query.contains(&self.username))
    }

    /// Puts `pinned` first, drops repeated fids and truncates.
    pub fn merge(pinned: Option<Value>, results: Vec<Value>) -> Vec<Value> {
        let mut seen = HashSet::new();
        pinned
            .into_iter()
            .chain(results)
            .filter(|user| match user.get("fid").and_then(Value::as_u64) {
                Some(fid) => seen.insert(fid),
                None => true,
            })
            .take(SEARCH_RESULT_CAP)
            .collect()
    }
}

fn normalize(raw: &str) -> String {
    raw.trim().trim_start_matches('@').to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn triggers_on_substring_either_way() {
        let policy = PinnedAccountPolicy::new("homiehouse").unwrap();
        assert!(policy.matches("homie"));
        assert!(policy.matches("@HomieHouse"));
        assert!(policy.matches("homiehouse.eth"));
        assert!(!policy.matches("dwr"));
        assert!(!policy.matches("@"));
    }

    #[test]
    fn empty_username_disables_policy() {
        assert!(PinnedAccountPolicy::new("").is_none());
        assert!(PinnedAccountPolicy::new("  @ ").is_none());
    }

    #[test]
    fn merge_dedupes_and_caps() {
        let pinned = json!({"fid": 7, "username": "homiehouse"});
        let mut results = vec![json!({"fid": 7, "username": "homiehouse"})];
        results.extend((100..120).map(|fid| json!({"fid": fid})));

        let merged = PinnedAccountPolicy::merge(Some(pinned), results);
        assert_eq!(merged.len(), SEARCH_RESULT_CAP);
        assert_eq!(merged[0]["fid"], 7);
        assert_eq!(merged[1]["fid"], 100);
        assert_eq!(merged.iter().filter(|u| u["fid"] == 7).count(), 1);
    }

    #[test]
    fn merge_without_pin_keeps_order() {
        let merged = PinnedAccountPolicy::merge(
            None,
            vec![json!({"fid": 2}), json!({"fid": 1}), json!({"fid": 2})],
        );
        assert_eq!(merged, vec![json!({"fid": 2}), json!({"fid": 1})]);
    }
}
