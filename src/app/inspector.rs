//! Inspector state machine
//!
//! Everything the inspector owns (working set, filters, the store) is only
//! touched from [`Inspector::handle`]. Slow work is requested by returning
//! [`Command`]s; its outcome comes back later as another [`Event`].

use crate::config::InspectorConfig;
use crate::feed::FeedError;
use crate::inspect::visible_set;
use crate::models::{CapturedRequest, FilterChain, Session, SessionHandle, Tunnel};
use crate::session::SessionManager;
use crate::storage::{RequestStore, StoreResult};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

/// Input to the event loop
#[derive(Debug)]
pub enum Event {
    /// Periodic refresh
    Tick,
    /// Whether the request list has focus; picks the poll interval
    FocusChanged(bool),
    TunnelsLoaded(Result<Vec<Tunnel>, FeedError>),
    RequestsLoaded(Result<Vec<CapturedRequest>, FeedError>),
    ReplayFinished {
        request_id: String,
        result: Result<(), FeedError>,
    },
    SetFilters(FilterChain),
    SetSearch(String),
    ToggleStar(String),
    LoadSession(String),
    ExitHistory,
    Cleanup,
    /// Export a stored session, or the live one when `session_id` is `None`
    ExportSession {
        session_id: Option<String>,
        path: PathBuf,
    },
    ExportRequests {
        ids: Vec<String>,
        path: PathBuf,
    },
    Replay(String),
    Quit,
}

/// Work the driver performs on the inspector's behalf
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    FetchTunnels,
    FetchRequests { limit: usize },
    Replay(String),
    ScheduleTick(Duration),
    Exit,
}

pub struct Inspector {
    config: InspectorConfig,
    store: RequestStore,
    sessions: SessionManager,
    session: Option<SessionHandle>,
    tunnel: Option<Tunnel>,
    saved_ids: HashSet<String>,
    chain: FilterChain,
    query: String,
    focused: bool,
    last_error: Option<String>,
    notice: Option<String>,
    quitting: bool,
}

impl Inspector {
    pub fn new(config: InspectorConfig, store: RequestStore) -> Self {
        Self {
            config,
            store,
            sessions: SessionManager::new(),
            session: None,
            tunnel: None,
            saved_ids: HashSet::new(),
            chain: FilterChain::new(),
            query: String::new(),
            focused: true,
            last_error: None,
            notice: None,
            quitting: false,
        }
    }

    /// Apply retention and issue the first fetches
    pub fn start(&mut self) -> Vec<Command> {
        if let Err(err) = self.store.cleanup(self.config.keep_days, self.config.keep_count) {
            tracing::warn!("Startup cleanup failed: {}", err);
        }
        vec![
            Command::FetchTunnels,
            self.fetch_requests(),
            Command::ScheduleTick(self.config.poll_interval(self.focused)),
        ]
    }

    pub fn handle(&mut self, event: Event) -> Vec<Command> {
        if self.quitting {
            return Vec::new();
        }
        match event {
            Event::Tick => {
                let mut commands = Vec::new();
                if self.session.is_none() && self.store.is_enabled() {
                    commands.push(Command::FetchTunnels);
                }
                if !self.sessions.is_viewing_history() {
                    commands.push(self.fetch_requests());
                }
                commands.push(Command::ScheduleTick(self.config.poll_interval(self.focused)));
                commands
            }
            Event::FocusChanged(focused) => {
                self.focused = focused;
                Vec::new()
            }
            Event::TunnelsLoaded(result) => {
                self.on_tunnels(result);
                Vec::new()
            }
            Event::RequestsLoaded(result) => {
                self.on_requests(result);
                Vec::new()
            }
            Event::ReplayFinished { request_id, result } => match result {
                Ok(()) => {
                    self.notice = Some(format!("Replayed {request_id}"));
                    vec![self.fetch_requests()]
                }
                Err(err) => {
                    self.fail(format!("replay of {request_id} failed: {err}"));
                    Vec::new()
                }
            },
            Event::SetFilters(chain) => {
                self.chain = chain;
                Vec::new()
            }
            Event::SetSearch(query) => {
                self.query = query;
                Vec::new()
            }
            Event::ToggleStar(id) => {
                match self.store.toggle_star(&id) {
                    Ok(starred) => self.sessions.mark_starred(&id, starred),
                    Err(err) => self.fail(format!("could not star {id}: {err}")),
                }
                Vec::new()
            }
            Event::LoadSession(id) => {
                let loaded = self.sessions.load_session(&self.store, &id).map(|_| ());
                if let Err(err) = loaded {
                    self.fail(format!("could not load {id}: {err}"));
                }
                Vec::new()
            }
            Event::ExitHistory => {
                self.sessions.exit_history();
                Vec::new()
            }
            Event::Cleanup => {
                match self.store.cleanup(self.config.keep_days, self.config.keep_count) {
                    Ok(report) => {
                        self.notice = Some(format!(
                            "Removed {} requests and {} sessions",
                            report.requests_deleted, report.sessions_deleted
                        ))
                    }
                    Err(err) => self.fail(format!("cleanup failed: {err}")),
                }
                Vec::new()
            }
            Event::ExportSession { session_id, path } => {
                let result = match &session_id {
                    Some(id) => self.store.export_session(id, &path),
                    None => self.store.export_current_session(&path),
                };
                self.report_export(result, &path);
                Vec::new()
            }
            Event::ExportRequests { ids, path } => {
                let result = self.store.export_requests(&ids, &path);
                self.report_export(result, &path);
                Vec::new()
            }
            Event::Replay(id) => vec![Command::Replay(id)],
            Event::Quit => {
                self.quitting = true;
                if let Some(handle) = self.session.take() {
                    if let Err(err) = self.store.end_session(&handle) {
                        tracing::warn!("Could not end session {}: {}", handle.id(), err);
                    }
                }
                vec![Command::Exit]
            }
        }
    }

    fn fetch_requests(&self) -> Command {
        Command::FetchRequests {
            limit: self.config.fetch_limit,
        }
    }

    fn fail(&mut self, message: String) {
        tracing::warn!("{}", message);
        self.last_error = Some(message);
    }

    fn report_export(&mut self, result: StoreResult<usize>, path: &std::path::Path) {
        if !self.store.is_enabled() {
            self.notice = Some("History is disabled; nothing was exported".to_string());
            return;
        }
        match result {
            Ok(count) => {
                self.notice = Some(format!("Exported {} requests to {}", count, path.display()))
            }
            Err(err) => self.fail(format!("export failed: {err}")),
        }
    }

    fn on_tunnels(&mut self, result: Result<Vec<Tunnel>, FeedError>) {
        let tunnels = match result {
            Ok(tunnels) => tunnels,
            Err(err) => return self.fail(err.to_string()),
        };
        let Some(first) = tunnels.into_iter().next() else {
            return self.fail(FeedError::NoTunnel.to_string());
        };
        self.last_error = None;

        if self.session.is_none() && self.store.is_enabled() {
            match self.store.start_session(&first.public_url) {
                Ok(handle) => self.session = Some(handle),
                Err(err) => self.fail(format!("could not start session: {err}")),
            }
        }
        self.tunnel = Some(first);
    }

    fn on_requests(&mut self, result: Result<Vec<CapturedRequest>, FeedError>) {
        let mut requests = match result {
            Ok(requests) => requests,
            Err(err) => return self.fail(err.to_string()),
        };
        if self.sessions.is_viewing_history() {
            return;
        }
        self.last_error = None;
        self.persist_new(&mut requests);
        self.sessions.apply_live(requests);
    }

    /// Save requests not yet persisted in this process. An id is only
    /// remembered once its save succeeded, so failures retry next refresh.
    fn persist_new(&mut self, requests: &mut [CapturedRequest]) {
        for req in requests.iter_mut() {
            if let Ok(true) = self.store.is_starred(&req.id) {
                req.starred = true;
            }
            let Some(handle) = &self.session else {
                continue;
            };
            req.session_id = handle.id().to_string();
            if self.saved_ids.contains(&req.id) {
                continue;
            }
            match self.store.save_request(handle, req) {
                Ok(()) => {
                    self.saved_ids.insert(req.id.clone());
                }
                Err(err) => {
                    tracing::warn!("Could not save request {}: {}", req.id, err);
                    self.last_error = Some(err.to_string());
                }
            }
        }
    }

    /// Working set narrowed by the active filters and search query
    pub fn visible(&self) -> Vec<&CapturedRequest> {
        visible_set(self.sessions.working_set(), &self.chain, &self.query)
    }

    pub fn working_set(&self) -> &[CapturedRequest] {
        self.sessions.working_set()
    }

    pub fn is_viewing_history(&self) -> bool {
        self.sessions.is_viewing_history()
    }

    /// Stored sessions other than the live one
    pub fn history_sessions(&self) -> StoreResult<Vec<Session>> {
        SessionManager::history_sessions(&self.store, self.session.as_ref().map(|h| h.id()))
    }

    pub fn session(&self) -> Option<&SessionHandle> {
        self.session.as_ref()
    }

    pub fn tunnel(&self) -> Option<&Tunnel> {
        self.tunnel.as_ref()
    }

    pub fn chain(&self) -> &FilterChain {
        &self.chain
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn store(&self) -> &RequestStore {
        &self.store
    }

    /// Close the store, ending the live session if still open
    pub fn shutdown(self) -> StoreResult<()> {
        self.store.close()
    }
}
