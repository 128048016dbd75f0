//! The catalog capability: what the session server and the proxy
//! require of any record store.

use crate::error::LocalResult;

use marcrec::{Profile, Record};
use z3950::bib1;
use z3950::rpn::StructuredQuery;

/// Options for a term scan.
///
/// `step_size` and `position` arrive on the wire and are passed
/// through for backends that can honor them; the local stores return
/// a plain ascending window and ignore stepping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanOptions {
    pub count: usize,
    pub step_size: u32,
    pub position: u32,
}

impl Default for ScanOptions {
    fn default() -> Self {
        ScanOptions {
            count: 20,
            step_size: 0,
            position: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermCount {
    pub term: String,
    pub count: u64,
}

/// A searchable record store.
///
/// Implementations are shared across sessions: multi-reader access
/// with per-key exclusive writes is the required discipline, so the
/// operations take `&self` and implementations must be `Send + Sync`.
pub trait Catalog: Send + Sync {
    /// Interpret the RPN tree and return matching record ids.
    fn search(&self, database: &str, query: &StructuredQuery) -> LocalResult<Vec<String>>;

    /// Hydrate records for previously returned ids, in id order.
    fn fetch(&self, database: &str, ids: &[String]) -> LocalResult<Vec<Record>>;

    /// Up to `opts.count` index terms greater-or-equal to
    /// `start_term`, ascending, with occurrence counts.
    fn scan(
        &self,
        database: &str,
        field: bib1::Use,
        start_term: &str,
        opts: &ScanOptions,
    ) -> LocalResult<Vec<TermCount>>;

    /// The profile this store's records are modeled under.
    fn profile(&self) -> Profile {
        Profile::Marc21
    }
}
