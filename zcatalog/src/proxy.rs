//! Proxy catalog: a [`Catalog`] whose records live on remote Z39.50
//! servers.
//!
//! Result sets exist only for the lifetime of a remote connection,
//! so ids cannot be fetched by value later.  A search caches its
//! query under a minted token and returns `"<token>:<index>"` ids;
//! fetch re-opens the target, re-runs the cached search, and
//! presents the wanted indexes one record at a time.

use crate::cache::{mint_token, CachedSearch, SearchCache};
use crate::catalog::{Catalog, ScanOptions, TermCount};
use crate::error::{LocalError, LocalResult};
use crate::targets::{Target, TargetRegistry};

use marcrec::{text, Record};
use z3950::bib1::Use;
use z3950::rpn::StructuredQuery;
use z3950::Client;

use std::sync::{Arc, Mutex};

/// Cap on how many result ids a proxy search returns.
pub const DEFAULT_MAX_RESULTS: u32 = 20;

pub struct ProxyCatalog {
    targets: TargetRegistry,
    cache: Arc<Mutex<SearchCache>>,
    max_results: u32,
}

impl ProxyCatalog {
    pub fn new(targets: TargetRegistry) -> Self {
        ProxyCatalog {
            targets,
            cache: SearchCache::new(crate::cache::DEFAULT_MAX_ENTRIES).into_shared(),
            max_results: DEFAULT_MAX_RESULTS,
        }
    }

    /// Use a shared (possibly smaller) cache; tests lean on this.
    pub fn with_cache(mut self, cache: Arc<Mutex<SearchCache>>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_max_results(mut self, max_results: u32) -> Self {
        self.max_results = max_results;
        self
    }

    pub fn targets(&self) -> &TargetRegistry {
        &self.targets
    }

    fn target(&self, name: &str) -> LocalResult<&Target> {
        self.targets
            .get(name)
            .ok_or_else(|| LocalError::UnknownTarget(name.to_string()))
    }

    /// Connect and initialize a session with the target.
    fn open_client(&self, target: &Target) -> LocalResult<Client> {
        let mut client = Client::connect(&target.host, target.port)
            .map_err(|e| friendly_error(&target.name, &e))?;

        client.set_authentication(target.open_auth());

        client
            .init()
            .map_err(|e| friendly_error(&target.name, &e))?;

        Ok(client)
    }

    fn cache(&self) -> std::sync::MutexGuard<'_, SearchCache> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Catalog for ProxyCatalog {
    /// `database` is the registry name of the target to search.
    fn search(&self, database: &str, query: &StructuredQuery) -> LocalResult<Vec<String>> {
        let target = self.target(database)?;

        let mut client = self.open_client(target)?;

        let count = client
            .search(&target.database_name, query)
            .map_err(|e| friendly_error(&target.name, &e))?;

        let count = count.min(self.max_results);

        let token = mint_token();
        self.cache().insert(
            token.clone(),
            CachedSearch {
                target: database.to_string(),
                database: target.database_name.clone(),
                query: query.clone(),
            },
        );

        client.close().ok();

        log::info!(
            "proxy search target={database} hits={count} token={token}"
        );

        Ok((1..=count).map(|idx| format!("{token}:{idx}")).collect())
    }

    fn fetch(&self, database: &str, ids: &[String]) -> LocalResult<Vec<Record>> {
        let Some(first) = ids.first() else {
            return Ok(Vec::new());
        };

        let token = first
            .split(':')
            .next()
            .ok_or_else(|| LocalError::Backend(format!("malformed proxy id: {first}")))?;

        let cached = self.cache().get(token).ok_or(LocalError::ExpiredSession)?;

        let target = self.target(&cached.target)?;

        let mut client = self.open_client(target)?;

        // Re-establish the remote result set.
        client
            .search(&cached.database, &cached.query)
            .map_err(|e| friendly_error(&target.name, &e))?;

        let syntax = target.encoding.syntax_oid();
        let mut records = Vec::new();

        for id in ids {
            let index = id
                .rsplit(':')
                .next()
                .and_then(|s| s.parse::<u32>().ok())
                .filter(|idx| *idx > 0)
                .ok_or_else(|| LocalError::Backend(format!("malformed proxy id: {id}")))?;

            let payloads = client
                .present(index, 1, syntax)
                .map_err(|e| friendly_error(&target.name, &e))?;

            for payload in payloads {
                let record = match target.encoding.profile() {
                    Some(_) => Record::from_bytes(&payload).map_err(LocalError::Backend)?,
                    // Plain-text record syntax.
                    None => Record::from_sutrs(&text::decode(&payload)),
                };
                records.push(record);
            }
        }

        client.close().ok();

        // `database` names the same target unless the caller mixed
        // ids across targets, which is not supported.
        if database != cached.target {
            log::warn!(
                "proxy fetch target mismatch: asked={database} cached={}",
                cached.target
            );
        }

        Ok(records)
    }

    fn scan(
        &self,
        database: &str,
        field: Use,
        start_term: &str,
        opts: &ScanOptions,
    ) -> LocalResult<Vec<TermCount>> {
        let target = self.target(database)?;

        let mut client = self.open_client(target)?;

        let entries = client
            .scan(
                &target.database_name,
                start_term,
                field.code(),
                opts.count as u32,
            )
            .map_err(|e| friendly_error(&target.name, &e))?;

        client.close().ok();

        Ok(entries
            .into_iter()
            .map(|e| TermCount {
                term: e.term,
                count: e.count,
            })
            .collect())
    }

    fn profile(&self) -> marcrec::Profile {
        marcrec::Profile::Marc21
    }
}

/// Search several targets, tolerating per-target failures.
///
/// Returns the combined id list plus `(target, error)` pairs for the
/// targets that failed; one dead server never empties a federated
/// result.
pub fn federated_search(
    proxy: &ProxyCatalog,
    target_names: &[String],
    query: &StructuredQuery,
) -> (Vec<String>, Vec<(String, LocalError)>) {
    let mut ids = Vec::new();
    let mut failures = Vec::new();

    for name in target_names {
        match proxy.search(name, query) {
            Ok(mut found) => ids.append(&mut found),
            Err(e) => {
                log::warn!("federated search: {name} failed: {e}");
                failures.push((name.clone(), e));
            }
        }
    }

    (ids, failures)
}

/// Map low-level network noise onto a message naming the target.
fn friendly_error(target_name: &str, err: &z3950::Z39Error) -> LocalError {
    let text = err.to_string();

    let msg = if text.contains("timed out") || text.contains("i/o timeout") {
        format!("connection to {target_name} timed out")
    } else if text.contains("connection refused") {
        format!("{target_name} refused the connection")
    } else if text.contains("no such host") || text.contains("failed to lookup") {
        format!("cannot resolve the address of {target_name}")
    } else if text.contains("reset by peer") {
        format!("connection to {target_name} was reset")
    } else if matches!(err, z3950::Z39Error::InitRejected) {
        format!("{target_name} rejected the connection")
    } else {
        format!("{target_name}: {text}")
    };

    LocalError::Remote(msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use z3950::rpn::QueryNode;

    #[test]
    fn test_unknown_target() {
        let proxy = ProxyCatalog::new(TargetRegistry::new());
        let query = StructuredQuery::new(QueryNode::leaf(Use::Title, "Go"));

        assert_eq!(
            proxy.search("nowhere", &query).unwrap_err(),
            LocalError::UnknownTarget("nowhere".to_string())
        );
    }

    #[test]
    fn test_expired_session() {
        let mut registry = TargetRegistry::new();
        registry.add(Target::new("loc", "127.0.0.1", 2100, "books"));

        let proxy = ProxyCatalog::new(registry);

        // A token that was never cached (or has been evicted).
        let ids = vec!["gone-123:1".to_string()];
        assert_eq!(
            proxy.fetch("loc", &ids).unwrap_err(),
            LocalError::ExpiredSession
        );
    }

    #[test]
    fn test_friendly_errors() {
        let refused =
            friendly_error("loc", &z3950::Z39Error::Network("connection refused".into()));
        assert_eq!(
            refused,
            LocalError::Remote("loc refused the connection".to_string())
        );

        let rejected = friendly_error("loc", &z3950::Z39Error::InitRejected);
        assert_eq!(
            rejected,
            LocalError::Remote("loc rejected the connection".to_string())
        );
    }
}
