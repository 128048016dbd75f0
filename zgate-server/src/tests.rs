//! Loopback integration tests: a real server on an ephemeral port,
//! driven by the real client.

use crate::server::ZServer;

use marcrec::{Profile, Record};
use z3950::bib1::Use;
use z3950::pdu::{Close, Message, MessagePayload};
use z3950::rpn::{QueryNode, SortKey, StructuredQuery};
use z3950::Client;
use zcatalog::{
    BibRecord, Catalog, CatalogError, MemoryCatalog, ProxyCatalog, SearchCache, Target,
    TargetRegistry,
};

use std::net::TcpListener;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Once};
use std::thread::JoinHandle;

static PREFS: Once = Once::new();

/// The prefs global is process-wide; install the server's canned
/// values exactly once, before any PDU defaults are built.
fn apply_prefs() {
    PREFS.call_once(|| {
        z3950::ImplementationPrefs {
            implementation_name: Some("zgate-test".to_string()),
            init_options: z3950::prefs::InitOptions {
                search: true,
                present: true,
                del_set: true,
                scan: true,
                sort: true,
                named_result_sets: true,
                ..Default::default()
            },
            ..Default::default()
        }
        .apply();
    });
}

fn bib(id: &str, title: &str, author: &str) -> BibRecord {
    BibRecord {
        id: id.to_string(),
        title: title.to_string(),
        author: author.to_string(),
        ..Default::default()
    }
}

struct TestServer {
    port: u16,
    shutdown: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl TestServer {
    fn start(records: Vec<BibRecord>) -> Self {
        Self::start_with(Arc::new(MemoryCatalog::new(records)))
    }

    fn start_with(catalog: Arc<dyn Catalog>) -> Self {
        apply_prefs();

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = shutdown.clone();

        let handle = std::thread::spawn(move || {
            ZServer::new(listener, catalog, flag).run().unwrap();
        });

        TestServer {
            port,
            shutdown,
            handle,
        }
    }

    fn stop(self) {
        self.shutdown.store(true, Ordering::Relaxed);
        self.handle.join().unwrap();
    }
}

#[test]
fn test_search_present_lifecycle() {
    let server = TestServer::start(vec![
        bib("1", "The Go Programming Language", "Alan Donovan"),
        bib("2", "Thinking in Go", "Rob Pike"),
        bib("3", "Black Hat Go", "Tom Steele"),
        bib("4", "Z39.50 for Dummies", "Anonymous"),
    ]);

    let mut client = Client::connect("127.0.0.1", server.port).unwrap();

    // Init: affirmative, with search and present granted.
    client.init().unwrap();
    let options = client.negotiated_options().to_vec();
    assert!(options.len() >= 2);
    assert_eq!(options[1] & 0xC0, 0xC0);

    // Title search.
    let query = StructuredQuery::new(QueryNode::leaf(Use::Title, "Go"));
    let count = client.search("Default", &query).unwrap();
    assert_eq!(count, 3);

    // Present the first two records as MARC21.
    let payloads = client.present(1, 2, z3950::oid::MARC21).unwrap();
    assert_eq!(payloads.len(), 2);

    for payload in &payloads {
        let record = Record::from_bytes(payload).unwrap();
        let title = record.title(Profile::Marc21).unwrap();
        assert!(title.contains("Go"), "unexpected title {title}");
    }

    // AND-NOT excludes the Pike title.
    let query = StructuredQuery::new(QueryNode::and_not(
        QueryNode::leaf(Use::Title, "Go"),
        QueryNode::leaf(Use::Author, "Pike"),
    ));
    let count = client.search("Default", &query).unwrap();
    assert_eq!(count, 2);

    client.close().unwrap();
    server.stop();
}

#[test]
fn test_scan_entries_ascending() {
    let server = TestServer::start(vec![
        bib("1", "The Go Programming Language", "Alan Donovan"),
        bib("2", "Thinking in Go", "Rob Pike"),
        bib("3", "Black Hat Go", "Tom Steele"),
        bib("4", "Go in Practice", "Matt Butcher"),
    ]);

    let mut client = Client::connect("127.0.0.1", server.port).unwrap();
    client.init().unwrap();

    let entries = client
        .scan("Default", "Go", Use::Title.code(), 10)
        .unwrap();

    let terms: Vec<&str> = entries.iter().map(|e| e.term.as_str()).collect();
    assert_eq!(
        terms,
        vec![
            "Go in Practice",
            "The Go Programming Language",
            "Thinking in Go"
        ]
    );

    client.close().unwrap();
    server.stop();
}

#[test]
fn test_sorted_search() {
    let server = TestServer::start(vec![
        bib("1", "The Go Programming Language", "Alan Donovan"),
        bib("2", "Thinking in Go", "Rob Pike"),
        bib("3", "Black Hat Go", "Tom Steele"),
    ]);

    let mut client = Client::connect("127.0.0.1", server.port).unwrap();
    client.init().unwrap();

    let mut query = StructuredQuery::new(QueryNode::leaf(Use::Title, "Go"));
    query.sort_keys.push(SortKey::ascending(Use::Title));

    let count = client.search("Default", &query).unwrap();
    assert_eq!(count, 3);

    // The server re-ordered the stored result set.
    let payloads = client.present(1, 1, z3950::oid::MARC21).unwrap();
    let record = Record::from_bytes(&payloads[0]).unwrap();
    assert_eq!(
        record.title(Profile::Marc21).as_deref(),
        Some("Black Hat Go")
    );

    client.close().unwrap();
    server.stop();
}

#[test]
fn test_profile_by_database_name_and_sutrs() {
    let server = TestServer::start(vec![bib("1", "Pièce", "Dupont")]);

    let mut client = Client::connect("127.0.0.1", server.port).unwrap();
    client.init().unwrap();

    // A UNIMARC-flavored database name selects the UNIMARC profile
    // for presented records.
    let query = StructuredQuery::new(QueryNode::leaf(Use::Title, "Pièce"));
    let count = client.search("Books-UNIMARC", &query).unwrap();
    assert_eq!(count, 1);

    let payloads = client.present(1, 1, z3950::oid::UNIMARC).unwrap();
    let record = Record::from_bytes(&payloads[0]).unwrap();
    assert_eq!(record.title(Profile::Unimarc).as_deref(), Some("Pièce"));
    assert_eq!(record.title(Profile::Marc21), None);

    client.close().unwrap();

    // SUTRS delivery: plain text, labeled fields.
    let mut client = Client::connect("127.0.0.1", server.port).unwrap();
    client.init().unwrap();

    let query = StructuredQuery::new(QueryNode::leaf(Use::Title, "Pièce"));
    client.search("Default", &query).unwrap();

    let payloads = client.present(1, 1, z3950::oid::SUTRS).unwrap();
    let text = String::from_utf8_lossy(&payloads[0]).into_owned();
    assert!(text.contains("title: Pièce"), "unexpected SUTRS text {text}");

    client.close().unwrap();
    server.stop();
}

#[test]
fn test_delete_result_set() {
    let server = TestServer::start(vec![bib("1", "The Go Programming Language", "X")]);

    let mut client = Client::connect("127.0.0.1", server.port).unwrap();
    client.init().unwrap();

    let query = StructuredQuery::new(QueryNode::leaf(Use::Title, "Go"));
    let count = client.search("Default", &query).unwrap();
    assert_eq!(count, 1);

    client.delete_result_set().unwrap();

    // The session survives and can search again.
    let count = client.search("Default", &query).unwrap();
    assert_eq!(count, 1);

    client.close().unwrap();
    server.stop();
}

#[test]
fn test_search_failure_keeps_session() {
    let catalog = MemoryCatalog::new(vec![bib("1", "The Go Programming Language", "X")])
        .with_names(&["Default"]);

    let server = TestServer::start_with(Arc::new(catalog));

    let mut client = Client::connect("127.0.0.1", server.port).unwrap();
    client.init().unwrap();

    // An unknown database answers in-band with SearchStatus=false.
    let query = StructuredQuery::new(QueryNode::leaf(Use::Title, "Go"));
    assert!(client.search("Elsewhere", &query).is_err());

    // The session is still usable.
    let count = client.search("Default", &query).unwrap();
    assert_eq!(count, 1);

    client.close().unwrap();
    server.stop();
}

#[test]
fn test_proxy_search_fetch_exchange() {
    let server = TestServer::start(vec![
        bib("1", "The Go Programming Language", "Alan Donovan"),
        bib("2", "Thinking in Go", "Rob Pike"),
        bib("3", "Black Hat Go", "Tom Steele"),
    ]);

    let mut registry = TargetRegistry::new();
    registry.add(Target::new("upstream", "127.0.0.1", server.port, "Default"));

    let proxy = ProxyCatalog::new(registry);

    let query = StructuredQuery::new(QueryNode::leaf(Use::Title, "Go"));
    let ids = proxy.search("upstream", &query).unwrap();

    assert_eq!(ids.len(), 3);
    assert!(ids[0].ends_with(":1"));
    assert!(ids[2].ends_with(":3"));

    // The ids minted by search are exactly the ones fetch accepts.
    let records = proxy.fetch("upstream", &ids[0..2]).unwrap();
    assert_eq!(records.len(), 2);

    for record in &records {
        let title = record.title(Profile::Marc21).unwrap();
        assert!(title.contains("Go"), "unexpected title {title}");
    }

    server.stop();
}

#[test]
fn test_proxy_eviction_expires_session() {
    let server = TestServer::start(vec![bib("1", "The Go Programming Language", "X")]);

    let mut registry = TargetRegistry::new();
    registry.add(Target::new("upstream", "127.0.0.1", server.port, "Default"));

    // A one-entry cache: the second search evicts the first.
    let proxy =
        ProxyCatalog::new(registry).with_cache(SearchCache::new(1).into_shared());

    let query = StructuredQuery::new(QueryNode::leaf(Use::Title, "Go"));

    let first = proxy.search("upstream", &query).unwrap();
    let second = proxy.search("upstream", &query).unwrap();

    assert_eq!(
        proxy.fetch("upstream", &first).unwrap_err(),
        CatalogError::ExpiredSession
    );

    assert_eq!(proxy.fetch("upstream", &second).unwrap().len(), 1);

    server.stop();
}

#[test]
fn test_unsolicited_close_surfaces() {
    // A "server" that answers everything with Close.
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let handle = std::thread::spawn(move || {
        use std::io::{Read, Write};

        let (mut stream, _addr) = listener.accept().unwrap();

        let mut buf = [0u8; 1024];
        let _ = stream.read(&mut buf).unwrap();

        let close = Message::from_payload(MessagePayload::Close(Close::default()));
        stream.write_all(&close.to_bytes().unwrap()).unwrap();
    });

    let mut client = Client::connect("127.0.0.1", port).unwrap();

    match client.init() {
        Err(z3950::Z39Error::ServerClosed(reason)) => assert_eq!(reason, 0),
        other => panic!("expected ServerClosed, got {other:?}"),
    }

    handle.join().unwrap();
}
