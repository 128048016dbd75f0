//! RPN-to-SQL compilation and the embedded SQLite catalog.
//!
//! The compiler is shared with the PostgreSQL backend; only the
//! placeholder style differs.

use crate::catalog::{Catalog, ScanOptions, TermCount};
use crate::error::{LocalError, LocalResult};
use crate::targets::Target;

use marcrec::{clean_isbn, profile, Profile, Record};
use rusqlite::Connection;
use z3950::bib1::Use;
use z3950::rpn::{Operator, QueryNode, SortKey, StructuredQuery};

use std::str::FromStr;
use std::sync::Mutex;

/// Columns hydrated by fetch, in order.
const BIB_COLUMNS: &str = "id, title, author, isbn, publisher, pub_year, issn, subjects, \
     raw_record, raw_record_format";

pub(crate) const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS bibliography (
    id INTEGER PRIMARY KEY,
    title TEXT,
    author TEXT,
    isbn TEXT,
    publisher TEXT,
    pub_year TEXT,
    issn TEXT,
    subjects TEXT,
    raw_record BLOB,
    raw_record_format TEXT
);
CREATE TABLE IF NOT EXISTS targets (
    name TEXT UNIQUE NOT NULL,
    host TEXT NOT NULL,
    port INTEGER NOT NULL,
    database_name TEXT NOT NULL,
    encoding TEXT NOT NULL,
    auth_user TEXT,
    auth_pass TEXT
);
";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Placeholder {
    /// `?N` (SQLite)
    Question,
    /// `$N` (PostgreSQL)
    Dollar,
}

impl Placeholder {
    fn next(self, params: &mut Vec<String>, value: String) -> String {
        params.push(value);
        match self {
            Self::Question => format!("?{}", params.len()),
            Self::Dollar => format!("${}", params.len()),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct CompiledQuery {
    pub predicate: String,
    pub params: Vec<String>,
    pub tail: String,
}

/// Column searched for a Use attribute; None means any-field.
pub(crate) fn column(field: Use) -> Option<&'static str> {
    match field {
        Use::Title | Use::TitleSeries => Some("title"),
        Use::PersonalName | Use::CorporateName | Use::Author => Some("author"),
        Use::Isbn => Some("isbn"),
        Use::Issn => Some("issn"),
        Use::Subject => Some("subjects"),
        Use::DatePub => Some("pub_year"),
        Use::Any => None,
    }
}

/// Columns an any-field predicate fans out over.
const ANY_COLUMNS: [&str; 7] = [
    "title", "author", "isbn", "issn", "subjects", "publisher", "pub_year",
];

/// Translate a structured query into a WHERE predicate, its bound
/// parameters, and the ORDER BY / LIMIT / OFFSET tail.
pub(crate) fn compile_query(
    query: &StructuredQuery,
    style: Placeholder,
) -> LocalResult<CompiledQuery> {
    let mut params = Vec::new();
    let predicate = compile_node(&query.root, &mut params, style);

    let mut tail = String::new();

    if query.sort_keys.is_empty() {
        tail.push_str(" ORDER BY id");
    } else {
        tail.push_str(" ORDER BY ");
        let keys: Vec<String> = query
            .sort_keys
            .iter()
            .map(|k| sort_term(k))
            .collect();
        tail.push_str(&keys.join(", "));
    }

    // The window applies after the predicate; values are validated
    // integers, not user text.
    if let Some(limit) = query.limit {
        tail.push_str(&format!(" LIMIT {limit}"));
    }
    if let Some(offset) = query.offset {
        if query.limit.is_none() {
            tail.push_str(" LIMIT -1");
        }
        tail.push_str(&format!(" OFFSET {offset}"));
    }

    Ok(CompiledQuery {
        predicate,
        params,
        tail,
    })
}

fn sort_term(key: &SortKey) -> String {
    let col = column(Use::from_code(key.attribute as u32)).unwrap_or("id");
    let dir = if key.descending { "DESC" } else { "ASC" };
    format!("{col} {dir}")
}

fn compile_node(node: &QueryNode, params: &mut Vec<String>, style: Placeholder) -> String {
    match node {
        QueryNode::Leaf { attribute, term } => {
            let field = Use::from_code(*attribute as u32);

            match column(field) {
                // ISBN matches by equality on the canonical form.
                Some("isbn") => {
                    let p = style.next(params, clean_isbn(term));
                    format!("(isbn = {p})")
                }
                Some(col) => {
                    let p = style.next(params, format!("%{}%", term.to_lowercase()));
                    format!("(LOWER({col}) LIKE {p})")
                }
                None => {
                    let clauses: Vec<String> = ANY_COLUMNS
                        .iter()
                        .map(|col| {
                            let p =
                                style.next(params, format!("%{}%", term.to_lowercase()));
                            format!("LOWER({col}) LIKE {p}")
                        })
                        .collect();
                    format!("({})", clauses.join(" OR "))
                }
            }
        }
        QueryNode::Branch { op, left, right } => {
            let l = compile_node(left, params, style);
            let r = compile_node(right, params, style);
            let joiner = match op {
                Operator::And => "AND",
                Operator::Or => "OR",
                Operator::AndNot => "AND NOT",
            };
            format!("({l} {joiner} {r})")
        }
    }
}

/// Row values shared by the SQL backends.
pub(crate) struct BibRow {
    pub id: String,
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub publisher: String,
    pub pub_year: String,
    pub issn: String,
    pub subjects: String,
    pub raw_record: Option<Vec<u8>>,
    pub raw_record_format: Option<String>,
}

impl BibRow {
    /// Turn a row into a record: a stored raw record is used directly
    /// when its format matches the store's profile (or is JSON-MARC);
    /// otherwise the record is synthesized from the columns.
    pub fn into_record(self, profile_wanted: Profile) -> LocalResult<Record> {
        if let Some(ref raw) = self.raw_record {
            if self.raw_format_matches(profile_wanted) {
                match Record::from_bytes(raw) {
                    Ok(record) => return Ok(record),
                    Err(e) => {
                        log::warn!("discarding unparseable raw_record id={}: {e}", self.id)
                    }
                }
            }
        }

        Ok(profile::build_record(
            profile_wanted,
            &self.id,
            &self.title,
            &self.author,
            &self.isbn,
            &self.publisher,
            &self.pub_year,
            &self.issn,
            &self.subjects,
        )?)
    }

    fn raw_format_matches(&self, profile_wanted: Profile) -> bool {
        let Some(ref format) = self.raw_record_format else {
            return false;
        };

        if format.eq_ignore_ascii_case("JSON") {
            return true;
        }

        Profile::from_str(format).is_ok_and(|p| p == profile_wanted)
    }
}

/// Embedded catalog over a SQLite file (or `:memory:`).
pub struct SqliteCatalog {
    conn: Mutex<Connection>,
    names: Vec<String>,
    profile: Profile,
}

impl SqliteCatalog {
    pub fn open(path: &str) -> LocalResult<Self> {
        let conn = Connection::open(path)?;
        Ok(Self::from_connection(conn))
    }

    pub fn open_in_memory() -> LocalResult<Self> {
        Ok(Self::from_connection(Connection::open_in_memory()?))
    }

    fn from_connection(conn: Connection) -> Self {
        SqliteCatalog {
            conn: Mutex::new(conn),
            names: Vec::new(),
            profile: Profile::Marc21,
        }
    }

    pub fn with_profile(mut self, profile: Profile) -> Self {
        self.profile = profile;
        self
    }

    pub fn with_names(mut self, names: &[&str]) -> Self {
        self.names = names.iter().map(|n| n.to_string()).collect();
        self
    }

    /// Create the bibliography and targets tables if absent.
    pub fn init_schema(&self) -> LocalResult<()> {
        self.conn().execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Insert a bibliography row; used by embedded deployments and
    /// tests.
    pub fn add_bib(
        &self,
        title: &str,
        author: &str,
        isbn: &str,
        publisher: &str,
        pub_year: &str,
        issn: &str,
        subjects: &str,
    ) -> LocalResult<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO bibliography \
             (title, author, isbn, publisher, pub_year, issn, subjects) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                title,
                author,
                clean_isbn(isbn),
                publisher,
                pub_year,
                issn,
                subjects
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// All configured remote targets.
    pub fn load_targets(&self) -> LocalResult<Vec<Target>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT name, host, port, database_name, encoding, auth_user, auth_pass \
             FROM targets ORDER BY name",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, u16>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, Option<String>>(5)?,
                row.get::<_, Option<String>>(6)?,
            ))
        })?;

        let mut targets = Vec::new();
        for row in rows {
            let (name, host, port, database_name, encoding, user, pass) = row?;
            targets.push(Target::from_columns(
                name,
                host,
                port,
                database_name,
                &encoding,
                user,
                pass,
            )?);
        }

        Ok(targets)
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        // A poisoned lock means another session panicked mid-query;
        // the connection itself is still usable.
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
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
}

impl Catalog for SqliteCatalog {
    fn search(&self, database: &str, query: &StructuredQuery) -> LocalResult<Vec<String>> {
        self.check_database(database)?;

        let compiled = compile_query(query, Placeholder::Question)?;
        let sql = format!(
            "SELECT id FROM bibliography WHERE {}{}",
            compiled.predicate, compiled.tail
        );

        log::debug!("search sql: {sql}");

        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(
            rusqlite::params_from_iter(compiled.params.iter()),
            |row| row.get::<_, i64>(0),
        )?;

        let mut ids = Vec::new();
        for row in rows {
            ids.push(row?.to_string());
        }

        Ok(ids)
    }

    fn fetch(&self, database: &str, ids: &[String]) -> LocalResult<Vec<Record>> {
        self.check_database(database)?;

        let conn = self.conn();
        let sql = format!("SELECT {BIB_COLUMNS} FROM bibliography WHERE id = ?1");
        let mut stmt = conn.prepare(&sql)?;

        let mut records = Vec::new();

        for id in ids {
            let Ok(rowid) = id.parse::<i64>() else {
                log::warn!("fetch: malformed record id={id}");
                continue;
            };

            let row = stmt.query_row([rowid], |row| {
                Ok(BibRow {
                    id: row.get::<_, i64>(0)?.to_string(),
                    title: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                    author: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                    isbn: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                    publisher: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
                    pub_year: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
                    issn: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
                    subjects: row.get::<_, Option<String>>(7)?.unwrap_or_default(),
                    raw_record: row.get::<_, Option<Vec<u8>>>(8)?,
                    raw_record_format: row.get::<_, Option<String>>(9)?,
                })
            });

            match row {
                Ok(row) => records.push(row.into_record(self.profile)?),
                Err(rusqlite::Error::QueryReturnedNoRows) => {
                    log::warn!("fetch: no such record id={id}")
                }
                Err(e) => return Err(e.into()),
            }
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

        let col = column(field)
            .ok_or_else(|| LocalError::Unsupported("scan over the Any attribute".to_string()))?;

        let sql = format!(
            "SELECT {col}, COUNT(*) FROM bibliography \
             WHERE {col} >= ?1 AND {col} <> '' \
             GROUP BY {col} ORDER BY {col} ASC LIMIT ?2",
        );

        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(
            rusqlite::params![start_term, opts.count as i64],
            |row| {
                Ok(TermCount {
                    term: row.get(0)?,
                    count: row.get::<_, i64>(1)? as u64,
                })
            },
        )?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }

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

    fn seeded() -> SqliteCatalog {
        let catalog = SqliteCatalog::open_in_memory().unwrap();
        catalog.init_schema().unwrap();

        let rows = [
            ("The Go Programming Language", "Alan Donovan", "0134190440"),
            ("Thinking in Go", "Rob Pike", ""),
            ("Black Hat Go", "Tom Steele", "1593278659"),
            ("Z39.50 for Dummies", "Anonymous", ""),
            ("Go in Practice", "Matt Butcher", ""),
        ];

        for (title, author, isbn) in rows {
            catalog
                .add_bib(title, author, isbn, "", "", "", "")
                .unwrap();
        }

        catalog
    }

    #[test]
    fn test_compile_leaf() {
        let query = StructuredQuery::new(QueryNode::leaf(Use::Title, "Go"));
        let compiled = compile_query(&query, Placeholder::Question).unwrap();

        assert_eq!(compiled.predicate, "(LOWER(title) LIKE ?1)");
        assert_eq!(compiled.params, vec!["%go%"]);
    }

    #[test]
    fn test_compile_and_not() {
        let query = StructuredQuery::new(QueryNode::and_not(
            QueryNode::leaf(Use::Title, "Go"),
            QueryNode::leaf(Use::Author, "Pike"),
        ));
        let compiled = compile_query(&query, Placeholder::Dollar).unwrap();

        assert_eq!(
            compiled.predicate,
            "((LOWER(title) LIKE $1) AND NOT (LOWER(author) LIKE $2))"
        );
    }

    #[test]
    fn test_compile_isbn_equality() {
        let query =
            StructuredQuery::new(QueryNode::leaf(Use::Isbn, "ISBN: 0-13-419044-0"));
        let compiled = compile_query(&query, Placeholder::Question).unwrap();

        assert_eq!(compiled.predicate, "(isbn = ?1)");
        assert_eq!(compiled.params, vec!["0134190440"]);
    }

    #[test]
    fn test_search_title() {
        let catalog = seeded();
        let query = StructuredQuery::new(QueryNode::leaf(Use::Title, "Go"));

        let ids = catalog.search("Default", &query).unwrap();
        assert_eq!(ids.len(), 4);
    }

    #[test]
    fn test_search_and_not() {
        let catalog = seeded();
        let query = StructuredQuery::new(QueryNode::and_not(
            QueryNode::leaf(Use::Title, "Go"),
            QueryNode::leaf(Use::Author, "Pike"),
        ));

        let ids = catalog.search("Default", &query).unwrap();
        assert_eq!(ids.len(), 3);
    }

    #[test]
    fn test_search_isbn() {
        let catalog = seeded();
        let query = StructuredQuery::new(QueryNode::leaf(Use::Isbn, "0-13-419044-0"));

        let ids = catalog.search("Default", &query).unwrap();
        assert_eq!(ids.len(), 1);

        let records = catalog.fetch("Default", &ids).unwrap();
        assert_eq!(
            records[0].title(Profile::Marc21).as_deref(),
            Some("The Go Programming Language")
        );
    }

    #[test]
    fn test_limit_offset() {
        let catalog = seeded();
        let mut query = StructuredQuery::new(QueryNode::leaf(Use::Title, "Go"));
        query.limit = Some(2);
        query.offset = Some(1);

        let ids = catalog.search("Default", &query).unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(ids[0], "2");
    }

    #[test]
    fn test_scan() {
        let catalog = seeded();

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
    fn test_raw_record_hydration() {
        let catalog = seeded();

        let json = r#"{"fields": [{"245": "Stored title"}]}"#;
        catalog
            .conn()
            .execute(
                "UPDATE bibliography SET raw_record = ?1, raw_record_format = 'JSON' \
                 WHERE id = 1",
                rusqlite::params![json.as_bytes()],
            )
            .unwrap();

        let records = catalog.fetch("Default", &["1".to_string()]).unwrap();
        assert_eq!(
            records[0].title(Profile::Marc21).as_deref(),
            Some("Stored title")
        );
    }
}
