//! Blocking Z39.50 origin (client) with an explicit session state
//! machine.
//!
//! A client owns its TCP socket and issues one request at a time; a
//! response is fully read before the next request goes out.  It is
//! not safe to share across threads.

use crate::error::{LocalError, LocalResult};
use crate::pdu::*;
use crate::rpn::{SortKey, StructuredQuery};

use std::fmt;
use std::io::Write;
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

/// TCP dial timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Result set name used for every search this client issues.
pub const DEFAULT_RESULT_SET: &str = "default";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Connected,
    Initialized,
    SearchDone,
    Closed,
}

pub struct Client {
    tcp_stream: TcpStream,
    peer: String,
    state: State,
    authentication: Option<String>,
    negotiated_version: Vec<u8>,
    negotiated_options: Vec<u8>,
}

impl fmt::Display for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Client [{}]", self.peer)
    }
}

impl Client {
    /// Open a TCP connection to a Z39.50 server.
    ///
    /// Each resolved address is tried in turn with a 10-second dial
    /// timeout.
    pub fn connect(host: &str, port: u16) -> LocalResult<Self> {
        let peer = format!("{host}:{port}");

        let addrs = (host, port)
            .to_socket_addrs()
            .map_err(|e| LocalError::Network(format!("no such host: {peer}: {e}")))?;

        let mut last_err = LocalError::Network(format!("no addresses for {peer}"));

        for addr in addrs {
            match TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT) {
                Ok(tcp_stream) => {
                    log::debug!("connected to {peer}");
                    return Ok(Client {
                        tcp_stream,
                        peer,
                        state: State::Connected,
                        authentication: None,
                        negotiated_version: Vec::new(),
                        negotiated_options: Vec::new(),
                    });
                }
                Err(e) => last_err = LocalError::Network(format!("{peer}: {e}")),
            }
        }

        Err(last_err)
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Credentials for the InitializeRequest, open form ("user/pass").
    pub fn set_authentication(&mut self, auth: Option<String>) {
        self.authentication = auth;
    }

    /// Options bit-string octets the server granted at init time.
    pub fn negotiated_options(&self) -> &[u8] {
        &self.negotiated_options
    }

    /// True if the server granted protocol version 3.
    pub fn negotiated_v3(&self) -> bool {
        // Bit 2, counted from the most significant bit of the first
        // content octet after the unused-bits count.
        self.negotiated_version
            .get(1)
            .is_some_and(|b| b & 0x20 != 0)
    }

    /// Initialize the session.
    ///
    /// Fails with [`LocalError::InitRejected`] unless the server
    /// answers Result=true.
    pub fn init(&mut self) -> LocalResult<()> {
        self.require_state(State::Connected, "init")?;

        let mut req = InitializeRequest::default();
        req.authentication = self.authentication.clone();

        let resp = self.request(Message::from_payload(MessagePayload::InitializeRequest(
            req,
        )))?;

        let MessagePayload::InitializeResponse(resp) = resp.payload else {
            return Err(LocalError::Protocol(format!(
                "{self} expected InitializeResponse"
            )));
        };

        if resp.result != Some(true) {
            return Err(LocalError::InitRejected);
        }

        self.negotiated_version = resp.protocol_version;
        self.negotiated_options = resp.options;
        self.state = State::Initialized;

        log::info!(
            "{self} initialized; v3={} options={:?}",
            self.negotiated_v3(),
            self.negotiated_options
        );

        Ok(())
    }

    /// Run a search, returning the server's result count.
    ///
    /// When the query carries sort keys and the search matched
    /// anything, a SortRequest for the default result set follows.  A
    /// sort failure is logged and otherwise ignored, since many
    /// servers do not support Sort.
    pub fn search(&mut self, database: &str, query: &StructuredQuery) -> LocalResult<u32> {
        if self.state != State::Initialized && self.state != State::SearchDone {
            return Err(LocalError::Protocol(format!(
                "{self} search requires an initialized session"
            )));
        }

        let req = SearchRequest::new(database, query.root.clone());
        let resp = self.request(Message::from_payload(MessagePayload::SearchRequest(req)))?;

        let MessagePayload::SearchResponse(resp) = resp.payload else {
            return Err(LocalError::Protocol(format!(
                "{self} expected SearchResponse"
            )));
        };

        if !resp.search_status {
            return Err(LocalError::Protocol(format!(
                "{self} server reported search failure"
            )));
        }

        self.state = State::SearchDone;

        if !query.sort_keys.is_empty() && resp.result_count > 0 {
            if let Err(e) = self.sort(&query.sort_keys) {
                log::warn!("{self} sort request failed; continuing unsorted: {e}");
            }
        }

        Ok(resp.result_count)
    }

    fn sort(&mut self, keys: &[SortKey]) -> LocalResult<()> {
        let req = SortRequest {
            reference_id: None,
            input_result_set_names: vec![DEFAULT_RESULT_SET.to_string()],
            sorted_result_set_name: DEFAULT_RESULT_SET.to_string(),
            sort_keys: keys
                .iter()
                .map(|k| SortKeySpec {
                    attribute: k.attribute,
                    descending: k.descending,
                })
                .collect(),
        };

        let resp = self.request(Message::from_payload(MessagePayload::SortRequest(req)))?;

        let MessagePayload::SortResponse(resp) = resp.payload else {
            return Err(LocalError::Protocol(format!(
                "{self} expected SortResponse"
            )));
        };

        if resp.sort_status != 0 {
            return Err(LocalError::Protocol(format!(
                "{self} sort status {}",
                resp.sort_status
            )));
        }

        Ok(())
    }

    /// Retrieve `count` records starting at the 1-based `start`
    /// position, as raw record payloads in ascending index order.
    pub fn present(
        &mut self,
        start: u32,
        count: u32,
        syntax: &[u32],
    ) -> LocalResult<Vec<Vec<u8>>> {
        self.require_state(State::SearchDone, "present")?;

        let req = PresentRequest::new(DEFAULT_RESULT_SET, start, count, syntax);
        let resp = self.request(Message::from_payload(MessagePayload::PresentRequest(req)))?;

        let MessagePayload::PresentResponse(resp) = resp.payload else {
            return Err(LocalError::Protocol(format!(
                "{self} expected PresentResponse"
            )));
        };

        Ok(resp.records.into_iter().map(|r| r.data).collect())
    }

    /// Enumerate index terms at or after `start_term`.
    pub fn scan(
        &mut self,
        database: &str,
        start_term: &str,
        use_attribute: u16,
        count: u32,
    ) -> LocalResult<Vec<TermInfo>> {
        if self.state == State::Connected || self.state == State::Closed {
            return Err(LocalError::Protocol(format!(
                "{self} scan requires an initialized session"
            )));
        }

        let req = ScanRequest::new(database, start_term, use_attribute, count);
        let resp = self.request(Message::from_payload(MessagePayload::ScanRequest(req)))?;

        let MessagePayload::ScanResponse(resp) = resp.payload else {
            return Err(LocalError::Protocol(format!("{self} expected ScanResponse")));
        };

        Ok(resp.entries)
    }

    /// Delete the server-side result set from the last search.
    pub fn delete_result_set(&mut self) -> LocalResult<()> {
        self.require_state(State::SearchDone, "delete")?;

        let req = DeleteResultSetRequest {
            reference_id: None,
            delete_function: 0,
            result_set_ids: vec![DEFAULT_RESULT_SET.to_string()],
        };

        let resp = self.request(Message::from_payload(
            MessagePayload::DeleteResultSetRequest(req),
        ))?;

        match resp.payload {
            MessagePayload::DeleteResultSetResponse(_) => {
                self.state = State::Initialized;
                Ok(())
            }
            _ => Err(LocalError::Protocol(format!(
                "{self} expected DeleteResultSetResponse"
            ))),
        }
    }

    /// Send a Close with reason Finished, then drop the socket.
    pub fn close(&mut self) -> LocalResult<()> {
        if self.state == State::Closed {
            return Ok(());
        }

        let close = Close::default();
        let bytes = Message::from_payload(MessagePayload::Close(close)).to_bytes()?;

        // Best effort; the peer may already be gone.
        self.tcp_stream.write_all(&bytes).ok();
        self.tcp_stream.shutdown(Shutdown::Both).ok();
        self.state = State::Closed;

        log::debug!("{self} closed");

        Ok(())
    }

    /// Send one PDU and read the reply.
    ///
    /// An unsolicited Close from the server surfaces as
    /// [`LocalError::ServerClosed`].
    fn request(&mut self, msg: Message) -> LocalResult<Message> {
        let bytes = msg.to_bytes()?;

        log::trace!("{self} sending {} bytes", bytes.len());

        self.tcp_stream.write_all(&bytes)?;

        let resp = Message::read(&mut self.tcp_stream)?;

        if let MessagePayload::Close(ref close) = resp.payload {
            self.state = State::Closed;
            self.tcp_stream.shutdown(Shutdown::Both).ok();
            return Err(LocalError::ServerClosed(close.close_reason.code()));
        }

        Ok(resp)
    }

    fn require_state(&self, wanted: State, op: &str) -> LocalResult<()> {
        if self.state == wanted {
            Ok(())
        } else {
            Err(LocalError::Protocol(format!(
                "{self} cannot {op} in state {:?}",
                self.state
            )))
        }
    }
}

// A dropped client discards all pending state; make sure the socket
// goes with it on every exit path.
impl Drop for Client {
    fn drop(&mut self) {
        self.tcp_stream.shutdown(Shutdown::Both).ok();
    }
}
