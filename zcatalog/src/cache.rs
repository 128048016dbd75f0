//! Process-wide cache of proxy searches.
//!
//! Remote result sets die with their connection, so the proxy stores
//! the query itself under a minted token and re-runs it at fetch
//! time.  Entries are bounded and evicted oldest-first; a fetch
//! against an evicted token is an expired session.

use z3950::rpn::StructuredQuery;

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use rand::distributions::Alphanumeric;
use rand::Rng;

/// Default entry bound.
pub const DEFAULT_MAX_ENTRIES: usize = 1024;

const TOKEN_RANDOM_LEN: usize = 8;

#[derive(Debug, Clone)]
pub struct CachedSearch {
    /// Registry name of the target searched.
    pub target: String,
    /// Database name on the remote server.
    pub database: String,
    pub query: StructuredQuery,
}

pub struct SearchCache {
    entries: HashMap<String, CachedSearch>,
    order: VecDeque<String>,
    max_entries: usize,
}

impl SearchCache {
    pub fn new(max_entries: usize) -> Self {
        SearchCache {
            entries: HashMap::new(),
            order: VecDeque::new(),
            max_entries,
        }
    }

    pub fn into_shared(self) -> Arc<Mutex<Self>> {
        Arc::new(Mutex::new(self))
    }

    pub fn insert(&mut self, token: String, search: CachedSearch) {
        if self.entries.insert(token.clone(), search).is_none() {
            self.order.push_back(token);
        }

        while self.entries.len() > self.max_entries {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            self.entries.remove(&oldest);
        }
    }

    pub fn get(&self, token: &str) -> Option<CachedSearch> {
        self.entries.get(token).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Mint a session-scoped token: random prefix plus a nanosecond
/// stamp.
pub fn mint_token() -> String {
    let random: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_RANDOM_LEN)
        .map(char::from)
        .collect();

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);

    format!("{random}-{nanos}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use z3950::bib1::Use;
    use z3950::rpn::QueryNode;

    fn entry() -> CachedSearch {
        CachedSearch {
            target: "loc".to_string(),
            database: "books".to_string(),
            query: StructuredQuery::new(QueryNode::leaf(Use::Title, "Go")),
        }
    }

    #[test]
    fn test_insert_get() {
        let mut cache = SearchCache::new(4);
        let token = mint_token();

        cache.insert(token.clone(), entry());

        assert_eq!(cache.get(&token).unwrap().target, "loc");
        assert!(cache.get("missing").is_none());
    }

    #[test]
    fn test_oldest_first_eviction() {
        let mut cache = SearchCache::new(2);

        cache.insert("a".to_string(), entry());
        cache.insert("b".to_string(), entry());
        cache.insert("c".to_string(), entry());

        assert_eq!(cache.len(), 2);
        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_some());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn test_tokens_are_distinct() {
        let a = mint_token();
        let b = mint_token();
        assert_ne!(a, b);
        assert!(a.contains('-'));
    }
}
