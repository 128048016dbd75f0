//! In-memory catalog: the default store when no database is
//! configured, and the test double everywhere else.

use crate::catalog::{Catalog, ScanOptions, TermCount};
use crate::error::{LocalError, LocalResult};

use marcrec::{clean_isbn, profile, Profile, Record};
use z3950::bib1::Use;
use z3950::rpn::{Operator, QueryNode, SortKey, StructuredQuery};

#[derive(Debug, Clone, Default)]
pub struct BibRecord {
    pub id: String,
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub publisher: String,
    pub pub_year: String,
    pub issn: String,
    pub subjects: String,
}

pub struct MemoryCatalog {
    /// Accepted database names; empty accepts any name.
    names: Vec<String>,
    profile: Profile,
    records: Vec<BibRecord>,
}

impl MemoryCatalog {
    pub fn new(records: Vec<BibRecord>) -> Self {
        MemoryCatalog {
            names: Vec::new(),
            profile: Profile::Marc21,
            records,
        }
    }

    pub fn with_profile(mut self, profile: Profile) -> Self {
        self.profile = profile;
        self
    }

    /// Restrict the store to the given database names.
    pub fn with_names(mut self, names: &[&str]) -> Self {
        self.names = names.iter().map(|n| n.to_string()).collect();
        self
    }

    fn check_database(&self, database: &str) -> LocalResult<()> {
        if self.names.is_empty()
            || self
                .names
                .iter()
                .any(|n| n.eq_ignore_ascii_case(database))
        {
            Ok(())
        } else {
            Err(LocalError::UnknownDatabase(database.to_string()))
        }
    }

    fn field_values<'a>(record: &'a BibRecord, field: Use) -> Vec<&'a str> {
        match field {
            Use::Title | Use::TitleSeries => vec![&record.title],
            Use::PersonalName | Use::CorporateName | Use::Author => vec![&record.author],
            Use::Isbn => vec![&record.isbn],
            Use::Issn => vec![&record.issn],
            Use::Subject => vec![&record.subjects],
            Use::DatePub => vec![&record.pub_year],
            Use::Any => vec![
                &record.title,
                &record.author,
                &record.isbn,
                &record.issn,
                &record.subjects,
                &record.publisher,
                &record.pub_year,
            ],
        }
    }

    fn matches(record: &BibRecord, node: &QueryNode) -> bool {
        match node {
            QueryNode::Leaf { attribute, term } => {
                let field = Use::from_code(*attribute as u32);

                if field == Use::Isbn {
                    let wanted = clean_isbn(term);
                    return !wanted.is_empty()
                        && clean_isbn(&record.isbn).eq_ignore_ascii_case(&wanted);
                }

                let term = term.to_lowercase();
                Self::field_values(record, field)
                    .iter()
                    .any(|v| v.to_lowercase().contains(&term))
            }
            QueryNode::Branch { op, left, right } => {
                let l = Self::matches(record, left);
                // Short-circuit per operator.
                match op {
                    Operator::And => l && Self::matches(record, right),
                    Operator::Or => l || Self::matches(record, right),
                    Operator::AndNot => l && !Self::matches(record, right),
                }
            }
        }
    }

    fn sort_value<'a>(record: &'a BibRecord, key: &SortKey) -> &'a str {
        Self::field_values(record, Use::from_code(key.attribute as u32))
            .first()
            .copied()
            .unwrap_or("")
    }
}

impl Catalog for MemoryCatalog {
    fn search(&self, database: &str, query: &StructuredQuery) -> LocalResult<Vec<String>> {
        self.check_database(database)?;

        let mut hits: Vec<&BibRecord> = self
            .records
            .iter()
            .filter(|r| Self::matches(r, &query.root))
            .collect();

        for key in query.sort_keys.iter().rev() {
            hits.sort_by(|a, b| {
                let ord = Self::sort_value(a, key).cmp(Self::sort_value(b, key));
                if key.descending {
                    ord.reverse()
                } else {
                    ord
                }
            });
        }

        let offset = query.offset.unwrap_or(0) as usize;
        let limit = query.limit.map(|l| l as usize).unwrap_or(usize::MAX);

        Ok(hits
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|r| r.id.clone())
            .collect())
    }

    fn fetch(&self, database: &str, ids: &[String]) -> LocalResult<Vec<Record>> {
        self.check_database(database)?;

        let mut records = Vec::new();

        for id in ids {
            let Some(bib) = self.records.iter().find(|r| &r.id == id) else {
                log::warn!("fetch: no such record id={id}");
                continue;
            };

            records.push(profile::build_record(
                self.profile,
                &bib.id,
                &bib.title,
                &bib.author,
                &bib.isbn,
                &bib.publisher,
                &bib.pub_year,
                &bib.issn,
                &bib.subjects,
            )?);
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
        self.check_database(database)?;

        let mut terms: Vec<&str> = self
            .records
            .iter()
            .flat_map(|r| Self::field_values(r, field))
            .filter(|v| !v.is_empty() && *v >= start_term)
            .collect();

        terms.sort();

        let mut entries: Vec<TermCount> = Vec::new();
        for term in terms {
            match entries.last_mut() {
                Some(last) if last.term == term => last.count += 1,
                _ => entries.push(TermCount {
                    term: term.to_string(),
                    count: 1,
                }),
            }
        }

        entries.truncate(opts.count);

        Ok(entries)
    }

    fn profile(&self) -> Profile {
        self.profile
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use z3950::bib1::Use;

    fn go_shelf() -> MemoryCatalog {
        let mk = |id: &str, title: &str, author: &str| BibRecord {
            id: id.to_string(),
            title: title.to_string(),
            author: author.to_string(),
            ..Default::default()
        };

        MemoryCatalog::new(vec![
            mk("1", "The Go Programming Language", "Alan Donovan"),
            mk("2", "Thinking in Go", "Rob Pike"),
            mk("3", "Black Hat Go", "Tom Steele"),
            mk("4", "Z39.50 for Dummies", "Anonymous"),
            mk("5", "Go in Practice", "Matt Butcher"),
        ])
    }

    #[test]
    fn test_title_search() {
        let catalog = go_shelf();
        let query = StructuredQuery::new(QueryNode::leaf(Use::Title, "Go"));

        let ids = catalog.search("Default", &query).unwrap();
        assert_eq!(ids, vec!["1", "2", "3", "5"]);
    }

    #[test]
    fn test_and_not_search() {
        let catalog = go_shelf();
        let query = StructuredQuery::new(QueryNode::and_not(
            QueryNode::leaf(Use::Title, "Go"),
            QueryNode::leaf(Use::Author, "Pike"),
        ));

        let ids = catalog.search("Default", &query).unwrap();
        assert_eq!(ids, vec!["1", "3", "5"]);
    }

    #[test]
    fn test_limit_offset() {
        let catalog = go_shelf();
        let mut query = StructuredQuery::new(QueryNode::leaf(Use::Title, "Go"));
        query.offset = Some(1);
        query.limit = Some(2);

        let ids = catalog.search("Default", &query).unwrap();
        assert_eq!(ids, vec!["2", "3"]);
    }

    #[test]
    fn test_any_attribute_matches_any_field() {
        let catalog = go_shelf();

        // Attribute 0 resolves to Any.
        let query = StructuredQuery::new(QueryNode::leaf_code(0, "Pike"));
        let ids = catalog.search("Default", &query).unwrap();
        assert_eq!(ids, vec!["2"]);
    }

    #[test]
    fn test_scan_ascending_from_start_term() {
        let catalog = go_shelf();

        let entries = catalog
            .scan("Default", Use::Title, "Go", &ScanOptions::default())
            .unwrap();

        let terms: Vec<&str> = entries.iter().map(|e| e.term.as_str()).collect();
        assert_eq!(
            terms,
            vec![
                "Go in Practice",
                "The Go Programming Language",
                "Thinking in Go",
                "Z39.50 for Dummies"
            ]
        );
    }

    #[test]
    fn test_fetch_builds_marc() {
        let catalog = go_shelf();
        let records = catalog
            .fetch("Default", &["2".to_string()])
            .unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0].title(Profile::Marc21).as_deref(),
            Some("Thinking in Go")
        );
    }

    #[test]
    fn test_unknown_database() {
        let catalog = go_shelf().with_names(&["Default"]);
        let query = StructuredQuery::new(QueryNode::leaf(Use::Title, "Go"));

        assert!(catalog.search("Default", &query).is_ok());
        assert_eq!(
            catalog.search("Elsewhere", &query).unwrap_err(),
            LocalError::UnknownDatabase("Elsewhere".to_string())
        );
    }
}
