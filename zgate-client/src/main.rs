//! Command-line Z39.50 client: search, present, and scan against any
//! server speaking the protocol.

use marcrec::{Profile, Record};
use z3950::bib1::Use;
use z3950::rpn::{QueryNode, SortKey, StructuredQuery};
use z3950::Client;

use std::str::FromStr;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 2100;
const DEFAULT_COUNT: u32 = 10;

struct Options {
    host: String,
    port: u16,
    database: String,
    profile: Profile,
    auth: Option<String>,
    start: u32,
    count: u32,
    scan_term: Option<String>,
    sort_by_title: bool,
    query: Option<QueryNode>,
}

fn usage(ops: &getopts::Options) -> ! {
    let brief = "zgate-client [options]\n\n\
        Search fields combine with AND; at least one of --title, \
        --author,\n--isbn, --issn, --subject, or --any is required \
        unless --scan is used.";
    println!("{}", ops.usage(brief));
    std::process::exit(0);
}

fn load_options() -> Options {
    let mut ops = getopts::Options::new();

    ops.optflag("h", "help", "print this help text");
    ops.optopt("", "host", "server host", "HOST");
    ops.optopt("", "port", "server port", "PORT");
    ops.optopt("d", "db", "database name", "NAME");
    ops.optopt("", "format", "record format: MARC21|UNIMARC|CNMARC", "FMT");
    ops.optopt("u", "auth", "credentials as user/pass", "AUTH");
    ops.optopt("", "title", "title search term", "TERM");
    ops.optopt("", "author", "author search term", "TERM");
    ops.optopt("", "isbn", "ISBN search term", "TERM");
    ops.optopt("", "issn", "ISSN search term", "TERM");
    ops.optopt("", "subject", "subject search term", "TERM");
    ops.optopt("", "any", "any-field search term", "TERM");
    ops.optopt("", "scan", "scan index terms from this start term", "TERM");
    ops.optopt("", "start", "first record position (1-based)", "N");
    ops.optopt("", "count", "how many records to retrieve", "N");
    ops.optflag("", "sort-title", "ask the server to sort by title");

    let args: Vec<String> = std::env::args().collect();

    let params = match ops.parse(&args[1..]) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Cannot parse options: {e}");
            std::process::exit(2);
        }
    };

    if params.opt_present("help") {
        usage(&ops);
    }

    let host = params.opt_str("host").unwrap_or(DEFAULT_HOST.to_string());
    let port = match params.opt_str("port") {
        Some(p) => p.parse::<u16>().unwrap_or_else(|_| {
            eprintln!("Invalid port value: {p}");
            std::process::exit(2);
        }),
        None => DEFAULT_PORT,
    };

    let profile = match params.opt_str("format") {
        Some(f) => Profile::from_str(&f).unwrap_or_else(|e| {
            eprintln!("{e}");
            std::process::exit(2);
        }),
        None => Profile::Marc21,
    };

    // AND-join the per-field terms into one RPN tree.
    let clauses = [
        (Use::Title, params.opt_str("title")),
        (Use::Author, params.opt_str("author")),
        (Use::Isbn, params.opt_str("isbn")),
        (Use::Issn, params.opt_str("issn")),
        (Use::Subject, params.opt_str("subject")),
        (Use::Any, params.opt_str("any")),
    ];

    let mut query: Option<QueryNode> = None;
    for (field, term) in clauses {
        let Some(term) = term else { continue };
        let leaf = QueryNode::leaf(field, term);
        query = Some(match query {
            Some(tree) => QueryNode::and(tree, leaf),
            None => leaf,
        });
    }

    Options {
        host,
        port,
        database: params.opt_str("db").unwrap_or("Default".to_string()),
        profile,
        auth: params.opt_str("auth"),
        start: params
            .opt_str("start")
            .and_then(|v| v.parse().ok())
            .unwrap_or(1),
        count: params
            .opt_str("count")
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_COUNT),
        scan_term: params.opt_str("scan"),
        sort_by_title: params.opt_present("sort-title"),
        query,
    }
}

fn print_record(position: u32, record: &Record, profile: Profile) {
    println!("--- record {position} ---");

    let fields = [
        ("title", record.title(profile)),
        ("author", record.author(profile)),
        ("isbn", record.isbn(profile)),
        ("issn", record.issn(profile)),
        ("publisher", record.publisher(profile)),
        ("subject", record.subject(profile)),
    ];

    for (label, value) in fields {
        if let Some(value) = value {
            println!("{label:>10}: {value}");
        }
    }
}

fn run(options: &Options) -> Result<(), String> {
    let mut client =
        Client::connect(&options.host, options.port).map_err(|e| e.to_string())?;

    client.set_authentication(options.auth.clone());
    client.init().map_err(|e| e.to_string())?;

    if let Some(ref term) = options.scan_term {
        let entries = client
            .scan(&options.database, term, Use::Title.code(), options.count)
            .map_err(|e| e.to_string())?;

        for entry in entries {
            println!("{:>6}  {}", entry.count, entry.term);
        }

        return client.close().map_err(|e| e.to_string());
    }

    let Some(ref root) = options.query else {
        return Err("No search terms given; see --help".to_string());
    };

    let mut query = StructuredQuery::new(root.clone());
    if options.sort_by_title {
        query.sort_keys.push(SortKey::ascending(Use::Title));
    }

    let count = client
        .search(&options.database, &query)
        .map_err(|e| e.to_string())?;

    println!("{count} records matched");

    if count == 0 {
        return client.close().map_err(|e| e.to_string());
    }

    let syntax = match options.profile {
        Profile::Marc21 => z3950::oid::MARC21,
        Profile::Unimarc | Profile::Cnmarc => z3950::oid::UNIMARC,
    };

    let wanted = options.count.min(count);
    let payloads = client
        .present(options.start, wanted, syntax)
        .map_err(|e| e.to_string())?;

    for (idx, payload) in payloads.iter().enumerate() {
        let position = options.start + idx as u32;

        match Record::from_bytes(payload) {
            Ok(record) => print_record(position, &record, options.profile),
            Err(e) => eprintln!("record {position} did not parse: {e}"),
        }
    }

    client.close().map_err(|e| e.to_string())
}

fn main() {
    env_logger::init();

    let options = load_options();

    if let Err(e) = run(&options) {
        eprintln!("{e}");
        std::process::exit(1);
    }
}
