//! Handles a single connected Z39.50 session.
use crate::error::{LocalError, LocalResult};

use marcrec::{profile, Profile, Record, Semantic};
use z3950::bib1::Use;
use z3950::oid;
use z3950::pdu::*;
use z3950::rpn::StructuredQuery;
use zcatalog::{Catalog, ScanOptions};

use std::fmt;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const NETWORK_BUFSIZE: usize = 1024;

/// Result ids stashed by the last search, keyed to the database they
/// came from.
#[derive(Debug, Default)]
struct BibSearch {
    database_name: String,
    record_ids: Vec<String>,
}

pub(crate) struct Session {
    id: usize,
    tcp_stream: TcpStream,
    peer_addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    catalog: Arc<dyn Catalog>,
    bound_database: Option<String>,
    last_search: Option<BibSearch>,
    negotiated_version: Vec<u8>,
    negotiated_options: Vec<u8>,
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Session {} [{}]", self.id, self.peer_addr)
    }
}

impl Session {
    pub fn new(
        id: usize,
        tcp_stream: TcpStream,
        peer_addr: SocketAddr,
        catalog: Arc<dyn Catalog>,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self {
            id,
            tcp_stream,
            peer_addr,
            shutdown,
            catalog,
            bound_database: None,
            last_search: None,
            negotiated_version: Vec::new(),
            negotiated_options: Vec::new(),
        }
    }

    /// Main listen loop.
    ///
    /// Reads bytes from the TCP stream, feeding them into the BER
    /// parser until a complete message is formed.  Handle the message,
    /// rinse and repeat.
    pub fn listen(&mut self) -> LocalResult<()> {
        log::info!("{self} starting session");

        let mut bytes = Vec::new();

        loop {
            let mut buffer = [0u8; NETWORK_BUFSIZE];

            let count = match self.tcp_stream.read(&mut buffer) {
                Ok(c) => c,
                Err(e) => match e.kind() {
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut => {
                        if self.shutdown.load(Ordering::Relaxed) {
                            log::debug!("{self} shutdown flag set; exiting listen loop");
                            self.send_close(CloseReason::Shutdown, None).ok();
                            break;
                        }

                        // Go back and wait for requests to arrive.
                        continue;
                    }
                    _ => {
                        // Connection severed.  We're done.
                        log::info!("{self} socket closed: {e}");
                        break;
                    }
                },
            };

            if count == 0 {
                // Returning Ok(0) from read for a TcpStream indicates
                // the remote end of the stream was shut down.
                log::debug!("{self} socket shut down by remote endpoint");
                break;
            }

            bytes.extend_from_slice(&buffer[0..count]);

            // Parse the message bytes.
            let msg = match Message::from_bytes(&bytes) {
                Ok(Some(m)) => m,
                Ok(None) => {
                    log::debug!("{self} partial message read; more bytes needed");
                    continue;
                }
                Err(e) => {
                    // Unknown tags and malformed BER close the
                    // connection; the client is off the rails.
                    log::error!("{self} unusable message: {e}");
                    self.send_close(CloseReason::ProtocolError, Some(e.to_string()))
                        .ok();
                    break;
                }
            };

            // Reset the byte array for the next message cycle.
            bytes.clear();

            if let MessagePayload::Close(ref close) = msg.payload {
                log::info!("{self} client closed: {:?}", close.close_reason);
                self.send_close(CloseReason::Finished, None).ok();
                break;
            }

            // Handle the message.
            let resp = match self.handle_message(msg) {
                Ok(r) => r,
                Err(e) => {
                    log::error!("{self} handle_message() exited with {e}");

                    let (reason, diag) = match e {
                        // Avoid sending internal debug info to the client.
                        LocalError::Internal(_) => (CloseReason::SystemProblem, None),
                        _ => (CloseReason::ProtocolError, Some(e.to_string())),
                    };

                    self.send_close(reason, diag)?;
                    break;
                }
            };

            self.send_reply(resp)?;
        }

        log::info!("{self} session exiting");

        Ok(())
    }

    /// Send a Close message to the caller with the provided close
    /// reason and optional diagnostic info.
    fn send_close(&mut self, reason: CloseReason, diag: Option<String>) -> LocalResult<()> {
        log::debug!("{self} sending Close {reason:?} {diag:?}");

        let close = Close {
            close_reason: reason,
            diagnostic_information: diag,
            ..Default::default()
        };

        self.send_reply(Message::from_payload(MessagePayload::Close(close)))
    }

    /// Send message bytes to the caller.
    fn send_reply(&mut self, msg: Message) -> LocalResult<()> {
        let bytes = msg.to_bytes()?;

        log::trace!("{self} replying with {} bytes", bytes.len());

        self.tcp_stream
            .write_all(bytes.as_slice())
            .map_err(|e| LocalError::Internal(e.to_string()))
    }

    /// Shut down the session's TcpStream.
    ///
    /// Ignores errors.
    pub fn shutdown(&mut self) {
        self.tcp_stream.shutdown(std::net::Shutdown::Both).ok();
    }

    /// Message handler.
    ///
    /// Dispatches each message to the handler for its tag.
    fn handle_message(&mut self, msg: Message) -> LocalResult<Message> {
        log::debug!("{self} processing message {msg:?}");

        let payload = match msg.payload {
            MessagePayload::InitializeRequest(r) => self.handle_init_request(&r)?,
            MessagePayload::SearchRequest(r) => self.handle_search_request(&r)?,
            MessagePayload::PresentRequest(r) => self.handle_present_request(&r)?,
            MessagePayload::ScanRequest(r) => self.handle_scan_request(&r)?,
            MessagePayload::SortRequest(r) => self.handle_sort_request(&r)?,
            MessagePayload::DeleteResultSetRequest(r) => self.handle_delete_request(&r)?,
            ref other => {
                return Err(LocalError::Protocol(format!(
                    "unsupported message type: {other:?}"
                )))
            }
        };

        Ok(Message::from_payload(payload))
    }

    /// Always affirmative, granting the intersection of the client's
    /// requested version/options and our own.
    fn handle_init_request(&mut self, req: &InitializeRequest) -> LocalResult<MessagePayload> {
        let mut resp = InitializeResponse::default();

        resp.protocol_version = and_bits(&req.protocol_version, &resp.protocol_version);
        resp.options = and_bits(&req.options, &resp.options);
        resp.result = Some(true);

        self.negotiated_version = resp.protocol_version.clone();
        self.negotiated_options = resp.options.clone();

        log::info!(
            "{self} initialized; version={:?} options={:?}",
            self.negotiated_version,
            self.negotiated_options
        );

        Ok(MessagePayload::InitializeResponse(resp))
    }

    /// Run a catalog search and retain the resulting ids for
    /// subsequent retrievals via PresentRequest.
    ///
    /// Search failures stay in-band: the response carries
    /// SearchStatus=false and the session continues.
    fn handle_search_request(&mut self, req: &SearchRequest) -> LocalResult<MessagePayload> {
        log::info!("{self} search query: {:?}", req.query);

        let mut resp = SearchResponse::default();

        let db_name = req
            .database_names
            .first()
            .cloned()
            .unwrap_or_else(|| "Default".to_string());

        let query = StructuredQuery::new(req.query.clone());

        let ids = match self.catalog.search(&db_name, &query) {
            Ok(ids) => ids,
            Err(e) => {
                log::error!("{self} search failed: {e}");
                resp.search_status = false;
                return Ok(MessagePayload::SearchResponse(resp));
            }
        };

        log::info!("{self} search returned {} ids", ids.len());

        resp.result_count = ids.len() as u32;
        resp.search_status = true;
        resp.next_result_set_position = if ids.is_empty() { 0 } else { 1 };

        self.bound_database = Some(db_name.clone());
        self.last_search = Some(BibSearch {
            database_name: db_name,
            record_ids: ids,
        });

        Ok(MessagePayload::SearchResponse(resp))
    }

    /// Collect and return the requested records from the preceding
    /// SearchRequest.
    fn handle_present_request(&mut self, req: &PresentRequest) -> LocalResult<MessagePayload> {
        let mut resp = PresentResponse::default();

        let Some(search) = self.last_search.as_ref() else {
            log::warn!("{self} PresentRequest with no search in progress");
            return Ok(MessagePayload::PresentResponse(resp));
        };

        let num_requested = req.number_of_records_requested as usize;

        // 1-based start point, clamped half-open to the stored ids.
        let start = (req.result_set_start_point as usize).saturating_sub(1);

        if num_requested == 0 || start >= search.record_ids.len() {
            log::warn!("{self} PresentRequest window is empty");
            return Ok(MessagePayload::PresentResponse(resp));
        }

        let end = (start + num_requested).min(search.record_ids.len());
        let ids = search.record_ids[start..end].to_vec();
        let database_name = search.database_name.clone();

        let records = self.collect_records(req, &database_name, &ids)?;

        resp.number_of_records_returned = records.len() as u32;
        resp.next_result_set_position = if end >= search.record_ids.len() {
            0
        } else {
            end as u32 + 1
        };
        resp.records = records;

        Ok(MessagePayload::PresentResponse(resp))
    }

    fn collect_records(
        &self,
        req: &PresentRequest,
        database_name: &str,
        ids: &[String],
    ) -> LocalResult<Vec<DbRecord>> {
        log::info!("{self} collecting records {ids:?}");

        let session_profile = profile_for_database(database_name, self.catalog.profile());

        let want_sutrs = req
            .preferred_record_syntax
            .as_deref()
            .is_some_and(oid::is_sutrs);

        let mut records = Vec::new();

        for record in self.catalog.fetch(database_name, ids)? {
            if want_sutrs {
                let text = sutrs_text(&record, self.catalog.profile());
                records.push(DbRecord::new(oid::SUTRS, text.into_bytes()));
                continue;
            }

            let record = transcode(record, self.catalog.profile(), session_profile)?;

            let syntax = match session_profile {
                Profile::Marc21 => oid::MARC21,
                Profile::Unimarc | Profile::Cnmarc => oid::UNIMARC,
            };

            let bytes = record.to_binary().map_err(LocalError::Internal)?;

            records.push(DbRecord::new(syntax, bytes));
        }

        Ok(records)
    }

    /// Enumerate index terms for the scan term's Use attribute.
    ///
    /// Failures answer with scan status 6 (failure) and the session
    /// continues.
    fn handle_scan_request(&mut self, req: &ScanRequest) -> LocalResult<MessagePayload> {
        let db_name = req
            .database_names
            .first()
            .cloned()
            .or_else(|| self.bound_database.clone())
            .unwrap_or_else(|| "Default".to_string());

        // First Use attribute wins; 0 falls back to Any.
        let use_value = req
            .attributes
            .iter()
            .find(|(attr_type, _)| *attr_type == 1)
            .map(|(_, value)| *value)
            .unwrap_or(0);

        let opts = ScanOptions {
            count: req.number_of_terms_requested.max(1) as usize,
            step_size: req.step_size,
            position: req.position_of_term,
        };

        let mut resp = ScanResponse {
            step_size: req.step_size,
            ..Default::default()
        };

        match self
            .catalog
            .scan(&db_name, Use::from_code(use_value), &req.start_term, &opts)
        {
            Ok(entries) => {
                resp.entries = entries
                    .into_iter()
                    .map(|e| TermInfo {
                        term: e.term,
                        count: e.count,
                    })
                    .collect();
            }
            Err(e) => {
                log::error!("{self} scan failed: {e}");
                resp.scan_status = 6;
            }
        }

        Ok(MessagePayload::ScanResponse(resp))
    }

    /// Re-order the stored result set by the first sort key.
    ///
    /// Sort failures answer with a failing status; the session and
    /// the stored result set survive.
    fn handle_sort_request(&mut self, req: &SortRequest) -> LocalResult<MessagePayload> {
        let mut resp = SortResponse::default();

        let Some(search) = self.last_search.as_mut() else {
            resp.sort_status = 2;
            return Ok(MessagePayload::SortResponse(resp));
        };

        let Some(key) = req.sort_keys.first() else {
            resp.sort_status = 2;
            return Ok(MessagePayload::SortResponse(resp));
        };

        let database_name = search.database_name.clone();
        let ids = search.record_ids.clone();

        let records = match self.catalog.fetch(&database_name, &ids) {
            Ok(r) if r.len() == ids.len() => r,
            Ok(_) | Err(_) => {
                resp.sort_status = 2;
                return Ok(MessagePayload::SortResponse(resp));
            }
        };

        let semantic = semantic_for_use(Use::from_code(key.attribute as u32));
        let catalog_profile = self.catalog.profile();

        let mut keyed: Vec<(String, String)> = ids
            .into_iter()
            .zip(records.iter())
            .map(|(id, rec)| {
                let value = rec
                    .semantic_value(catalog_profile, semantic)
                    .unwrap_or_default();
                (id, value)
            })
            .collect();

        keyed.sort_by(|a, b| {
            if key.descending {
                b.1.cmp(&a.1)
            } else {
                a.1.cmp(&b.1)
            }
        });

        search.record_ids = keyed.into_iter().map(|(id, _)| id).collect();

        Ok(MessagePayload::SortResponse(resp))
    }

    fn handle_delete_request(
        &mut self,
        _req: &DeleteResultSetRequest,
    ) -> LocalResult<MessagePayload> {
        self.last_search = None;

        Ok(MessagePayload::DeleteResultSetResponse(
            DeleteResultSetResponse::default(),
        ))
    }
}

/// Bitwise intersection of two bit-string payloads, preserving the
/// unused-bits octet.
fn and_bits(a: &[u8], b: &[u8]) -> Vec<u8> {
    if a.len() < 2 || b.len() < 2 {
        return b.to_vec();
    }

    let mut out = vec![0u8];
    for idx in 1..a.len().max(b.len()) {
        let av = a.get(idx).copied().unwrap_or(0);
        let bv = b.get(idx).copied().unwrap_or(0);
        out.push(av & bv);
    }
    out
}

/// Profile selection by database-name substring; anything else gets
/// the supplied default, the profile the backing catalog was built
/// with.
fn profile_for_database(database_name: &str, default: Profile) -> Profile {
    let upper = database_name.to_uppercase();

    if upper.contains("CNMARC") {
        Profile::Cnmarc
    } else if upper.contains("UNIMARC") {
        Profile::Unimarc
    } else {
        default
    }
}

/// Rebuild a record under another profile by way of its semantic
/// fields.
fn transcode(record: Record, from: Profile, to: Profile) -> LocalResult<Record> {
    if from == to {
        return Ok(record);
    }

    let id = record
        .control_content("001")
        .unwrap_or_default()
        .to_string();

    profile::build_record(
        to,
        &id,
        record.title(from).as_deref().unwrap_or(""),
        record.author(from).as_deref().unwrap_or(""),
        record.isbn(from).as_deref().unwrap_or(""),
        record.publisher(from).as_deref().unwrap_or(""),
        record
            .semantic_value(from, Semantic::PubYear)
            .as_deref()
            .unwrap_or(""),
        record.issn(from).as_deref().unwrap_or(""),
        record.subject(from).as_deref().unwrap_or(""),
    )
    .map_err(LocalError::Internal)
}

/// Flatten a record into SUTRS text.
fn sutrs_text(record: &Record, profile: Profile) -> String {
    let mut lines = Vec::new();

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
            lines.push(format!("{label}: {value}"));
        }
    }

    lines.push(String::new());
    lines.join("\n")
}

fn semantic_for_use(field: Use) -> Semantic {
    match field {
        Use::Title | Use::TitleSeries => Semantic::Title,
        Use::PersonalName | Use::CorporateName | Use::Author => Semantic::Author,
        Use::Isbn => Semantic::Isbn,
        Use::Issn => Semantic::Issn,
        Use::Subject => Semantic::Subject,
        Use::DatePub => Semantic::PubYear,
        Use::Any => Semantic::Title,
    }
}
