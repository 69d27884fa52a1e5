use crate::models::{CapturedRequest, HeaderMap, Session, SessionHandle, StoreStats};
use crate::storage::error::{StoreError, StoreResult};
use chrono::{DateTime, Duration, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::fs;
use std::path::{Path, PathBuf};

const REQUEST_COLUMNS: &str = "id, session_id, method, path, status_code, duration_ms, timestamp,
     req_headers, req_body, res_headers, res_body, starred";

/// Rows removed by a retention pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub requests_deleted: u64,
    pub sessions_deleted: u64,
}

/// Durable log of capture sessions and their requests.
///
/// A store without a connection is "disabled": writes are silently dropped
/// and reads come back empty, so the inspector keeps working when the
/// database cannot be opened.
pub struct RequestStore {
    conn: Option<Connection>,
    db_path: Option<PathBuf>,
    open_session: Option<String>,
    last_session_nanos: i64,
}

impl RequestStore {
    /// Open or create the database at `db_path`
    pub fn open(db_path: impl AsRef<Path>) -> StoreResult<Self> {
        let db_path = db_path.as_ref();
        if let Some(dir) = db_path.parent() {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                fs::create_dir_all(dir)?;
            }
        }
        let conn = Connection::open(db_path)?;
        Self::init_schema(&conn)?;
        Ok(Self::with_connection(conn, Some(db_path.to_path_buf())))
    }

    /// Open an in-memory database (useful for testing).
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self::with_connection(conn, None))
    }

    /// Open the database, falling back to a disabled store on failure
    pub fn open_or_disabled(db_path: impl AsRef<Path>) -> Self {
        match Self::open(db_path.as_ref()) {
            Ok(store) => store,
            Err(err) => {
                tracing::warn!(
                    "History disabled, could not open {}: {}",
                    db_path.as_ref().display(),
                    err
                );
                Self::disabled()
            }
        }
    }

    /// A store with persistence switched off
    pub fn disabled() -> Self {
        Self {
            conn: None,
            db_path: None,
            open_session: None,
            last_session_nanos: 0,
        }
    }

    fn with_connection(conn: Connection, db_path: Option<PathBuf>) -> Self {
        Self {
            conn: Some(conn),
            db_path,
            open_session: None,
            last_session_nanos: 0,
        }
    }

    /// Create tables if they don't exist. Migrations are additive only.
    fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                tunnel_url TEXT,
                started_at INTEGER,
                ended_at INTEGER
            );
            CREATE TABLE IF NOT EXISTS requests (
                id TEXT PRIMARY KEY,
                session_id TEXT,
                method TEXT,
                path TEXT,
                status_code INTEGER,
                duration_ms INTEGER,
                timestamp INTEGER,
                req_headers TEXT,
                req_body BLOB,
                res_headers TEXT,
                res_body BLOB,
                starred BOOLEAN DEFAULT FALSE,
                FOREIGN KEY (session_id) REFERENCES sessions(id)
            );
            CREATE INDEX IF NOT EXISTS idx_requests_session ON requests(session_id);
            CREATE INDEX IF NOT EXISTS idx_requests_timestamp ON requests(timestamp);
            CREATE INDEX IF NOT EXISTS idx_requests_starred ON requests(starred);
            ",
        )
    }

    pub fn is_enabled(&self) -> bool {
        self.conn.is_some()
    }

    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Id of the session currently accepting writes
    pub fn open_session_id(&self) -> Option<&str> {
        self.open_session.as_deref()
    }

    /// `session_<unix nanos>`, strictly increasing within this store
    fn next_session_id(&mut self) -> String {
        let nanos = to_nanos(Utc::now()).max(self.last_session_nanos + 1);
        self.last_session_nanos = nanos;
        format!("session_{nanos}")
    }

    /// Create a new session and make it the one accepting writes. Any session
    /// still open on this store is ended first.
    pub fn start_session(&mut self, tunnel_url: &str) -> StoreResult<SessionHandle> {
        if self.conn.is_none() {
            return Err(StoreError::StorageUnavailable);
        }
        if let Some(previous) = self.open_session.clone() {
            self.mark_ended(&previous)?;
        }

        let id = self.next_session_id();
        let started_at = Utc::now();
        let conn = self.conn.as_ref().ok_or(StoreError::StorageUnavailable)?;
        conn.execute(
            "INSERT INTO sessions (id, tunnel_url, started_at) VALUES (?1, ?2, ?3)",
            params![id, tunnel_url, to_nanos(started_at)],
        )?;
        self.open_session = Some(id.clone());

        tracing::info!("Started capture session {} for {}", id, tunnel_url);
        Ok(SessionHandle::new(id, started_at))
    }

    /// Mark a session as ended
    pub fn end_session(&mut self, handle: &SessionHandle) -> StoreResult<()> {
        if self.conn.is_none() {
            return Ok(());
        }
        self.mark_ended(handle.id())
    }

    fn mark_ended(&mut self, session_id: &str) -> StoreResult<()> {
        if let Some(conn) = &self.conn {
            conn.execute(
                "UPDATE sessions SET ended_at = ?1 WHERE id = ?2",
                params![to_nanos(Utc::now()), session_id],
            )?;
            tracing::info!("Ended capture session {}", session_id);
        }
        if self.open_session.as_deref() == Some(session_id) {
            self.open_session = None;
        }
        Ok(())
    }

    /// Insert or replace a request under the handle's session
    pub fn save_request(&self, handle: &SessionHandle, req: &CapturedRequest) -> StoreResult<()> {
        let Some(conn) = &self.conn else {
            return Ok(());
        };
        if self.open_session.as_deref() != Some(handle.id()) {
            return Err(StoreError::NoActiveSession);
        }

        let req_headers = serde_json::to_string(&req.request_headers)?;
        let res_headers = serde_json::to_string(&req.response_headers)?;
        conn.execute(
            "INSERT OR REPLACE INTO requests
               (id, session_id, method, path, status_code, duration_ms, timestamp,
                req_headers, req_body, res_headers, res_body, starred)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                req.id,
                handle.id(),
                req.method,
                req.path,
                req.status_code,
                req.duration_ms,
                to_nanos(req.timestamp),
                req_headers,
                req.request_body,
                res_headers,
                req.response_body,
                req.starred,
            ],
        )?;
        tracing::debug!("Saved request {} to {}", req.id, handle.id());
        Ok(())
    }

    /// All sessions, most recently started first
    pub fn get_sessions(&self) -> StoreResult<Vec<Session>> {
        let Some(conn) = &self.conn else {
            return Ok(Vec::new());
        };
        let mut stmt = conn.prepare(
            "SELECT id, tunnel_url, started_at, ended_at FROM sessions
             ORDER BY started_at DESC, id DESC",
        )?;
        let rows = stmt.query_map([], row_to_session)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn get_session(&self, session_id: &str) -> StoreResult<Session> {
        let conn = self
            .conn
            .as_ref()
            .ok_or_else(|| StoreError::NotFound(session_id.to_string()))?;
        conn.query_row(
            "SELECT id, tunnel_url, started_at, ended_at FROM sessions WHERE id = ?1",
            params![session_id],
            row_to_session,
        )
        .optional()?
        .ok_or_else(|| StoreError::NotFound(session_id.to_string()))
    }

    /// Requests of a session, most recent first
    pub fn get_session_requests(&self, session_id: &str) -> StoreResult<Vec<CapturedRequest>> {
        self.query_requests(
            &format!(
                "SELECT {REQUEST_COLUMNS} FROM requests WHERE session_id = ?1
                 ORDER BY timestamp DESC, id DESC"
            ),
            params![session_id],
        )
    }

    /// Number of requests recorded under a session
    pub fn count_session_requests(&self, session_id: &str) -> StoreResult<u64> {
        let Some(conn) = &self.conn else {
            return Ok(0);
        };
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM requests WHERE session_id = ?1",
            params![session_id],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }

    pub fn get_request(&self, request_id: &str) -> StoreResult<Option<CapturedRequest>> {
        let Some(conn) = &self.conn else {
            return Ok(None);
        };
        let sql = format!("SELECT {REQUEST_COLUMNS} FROM requests WHERE id = ?1");
        Ok(conn
            .query_row(&sql, params![request_id], row_to_request)
            .optional()?)
    }

    /// Starred requests across all sessions, most recent first
    pub fn get_starred_requests(&self) -> StoreResult<Vec<CapturedRequest>> {
        self.query_requests(
            &format!(
                "SELECT {REQUEST_COLUMNS} FROM requests WHERE starred = TRUE
                 ORDER BY timestamp DESC, id DESC"
            ),
            [],
        )
    }

    /// Substring search over path, method and stored bodies
    pub fn search_requests(&self, query: &str, limit: u32) -> StoreResult<Vec<CapturedRequest>> {
        let term = format!("%{query}%");
        self.query_requests(
            &format!(
                "SELECT {REQUEST_COLUMNS} FROM requests
                 WHERE path LIKE ?1 OR method LIKE ?1
                    OR CAST(req_body AS TEXT) LIKE ?1 OR CAST(res_body AS TEXT) LIKE ?1
                 ORDER BY timestamp DESC, id DESC
                 LIMIT ?2"
            ),
            params![term, limit],
        )
    }

    /// Most recent requests across all sessions
    pub fn get_recent_requests(&self, limit: u32) -> StoreResult<Vec<CapturedRequest>> {
        self.query_requests(
            &format!(
                "SELECT {REQUEST_COLUMNS} FROM requests
                 ORDER BY timestamp DESC, id DESC LIMIT ?1"
            ),
            params![limit],
        )
    }

    fn query_requests<P: rusqlite::Params>(
        &self,
        sql: &str,
        params: P,
    ) -> StoreResult<Vec<CapturedRequest>> {
        let Some(conn) = &self.conn else {
            return Ok(Vec::new());
        };
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, row_to_request)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Flip the starred flag, returning the new value
    pub fn toggle_star(&self, request_id: &str) -> StoreResult<bool> {
        let Some(conn) = &self.conn else {
            return Ok(false);
        };
        let starred = self.is_starred(request_id)?;
        conn.execute(
            "UPDATE requests SET starred = ?1 WHERE id = ?2",
            params![!starred, request_id],
        )?;
        Ok(!starred)
    }

    pub fn is_starred(&self, request_id: &str) -> StoreResult<bool> {
        let Some(conn) = &self.conn else {
            return Ok(false);
        };
        conn.query_row(
            "SELECT starred FROM requests WHERE id = ?1",
            params![request_id],
            |row| row.get::<_, bool>(0),
        )
        .optional()?
        .ok_or_else(|| StoreError::NotFound(request_id.to_string()))
    }

    pub fn delete_request(&self, request_id: &str) -> StoreResult<()> {
        if let Some(conn) = &self.conn {
            conn.execute("DELETE FROM requests WHERE id = ?1", params![request_id])?;
        }
        Ok(())
    }

    /// Delete a session and all of its requests atomically
    pub fn delete_session(&mut self, session_id: &str) -> StoreResult<()> {
        let Some(conn) = self.conn.as_mut() else {
            return Ok(());
        };
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM requests WHERE session_id = ?1", params![session_id])?;
        tx.execute("DELETE FROM sessions WHERE id = ?1", params![session_id])?;
        tx.commit()?;

        if self.open_session.as_deref() == Some(session_id) {
            self.open_session = None;
        }
        Ok(())
    }

    /// Retention pass.
    ///
    /// Deletes non-starred requests older than `keep_days`, sparing the
    /// `keep_count` most recent non-starred requests store-wide, then drops
    /// sessions left without any request.
    pub fn cleanup(&self, keep_days: u32, keep_count: u32) -> StoreResult<CleanupReport> {
        let Some(conn) = &self.conn else {
            return Ok(CleanupReport::default());
        };
        let cutoff = to_nanos(Utc::now() - Duration::days(i64::from(keep_days)));

        let requests_deleted = conn.execute(
            "DELETE FROM requests
             WHERE starred = FALSE
               AND timestamp < ?1
               AND id NOT IN (
                   SELECT id FROM requests
                   WHERE starred = FALSE
                   ORDER BY timestamp DESC, id DESC
                   LIMIT ?2
               )",
            params![cutoff, keep_count],
        )? as u64;
        let sessions_deleted = conn.execute(
            "DELETE FROM sessions
             WHERE id NOT IN (SELECT DISTINCT session_id FROM requests WHERE session_id IS NOT NULL)",
            [],
        )? as u64;

        if requests_deleted > 0 {
            // Reclaim disk space after deleting rows
            conn.execute_batch("VACUUM")?;
            tracing::info!(
                "Cleanup removed {} requests and {} sessions (keep {} days / {} requests)",
                requests_deleted,
                sessions_deleted,
                keep_days,
                keep_count
            );
        }

        Ok(CleanupReport {
            requests_deleted,
            sessions_deleted,
        })
    }

    pub fn stats(&self) -> StoreResult<StoreStats> {
        let Some(conn) = &self.conn else {
            return Ok(StoreStats::default());
        };
        let count = |sql: &str| -> rusqlite::Result<u64> {
            conn.query_row(sql, [], |row| row.get::<_, i64>(0))
                .map(|n| n.max(0) as u64)
        };
        Ok(StoreStats {
            sessions: count("SELECT COUNT(*) FROM sessions")?,
            requests: count("SELECT COUNT(*) FROM requests")?,
            starred: count("SELECT COUNT(*) FROM requests WHERE starred = TRUE")?,
        })
    }

    /// End the open session and release the connection
    pub fn close(mut self) -> StoreResult<()> {
        if let Some(open) = self.open_session.clone() {
            self.mark_ended(&open)?;
        }
        if let Some(conn) = self.conn.take() {
            conn.close().map_err(|(_, err)| StoreError::Query(err))?;
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn connection(&self) -> Option<&Connection> {
        self.conn.as_ref()
    }
}

/// Times are stored as Unix nanoseconds so reloads keep full precision
fn to_nanos(time: DateTime<Utc>) -> i64 {
    time.timestamp_nanos_opt()
        .unwrap_or_else(|| time.timestamp_millis().saturating_mul(1_000_000))
}

fn from_nanos(nanos: i64) -> DateTime<Utc> {
    Utc.timestamp_nanos(nanos)
}

fn row_to_session(row: &Row<'_>) -> rusqlite::Result<Session> {
    Ok(Session {
        id: row.get(0)?,
        tunnel_url: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
        started_at: from_nanos(row.get(2)?),
        ended_at: row.get::<_, Option<i64>>(3)?.map(from_nanos),
    })
}

fn parse_headers(json: Option<String>) -> HeaderMap {
    json.and_then(|raw| serde_json::from_str(&raw).ok())
        .unwrap_or_default()
}

fn row_to_request(row: &Row<'_>) -> rusqlite::Result<CapturedRequest> {
    Ok(CapturedRequest {
        id: row.get(0)?,
        session_id: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
        method: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
        path: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
        status_code: row.get::<_, Option<u16>>(4)?.unwrap_or(0),
        duration_ms: row.get::<_, Option<i64>>(5)?.unwrap_or(0),
        timestamp: from_nanos(row.get::<_, Option<i64>>(6)?.unwrap_or(0)),
        request_headers: parse_headers(row.get(7)?),
        request_body: row.get::<_, Option<Vec<u8>>>(8)?.unwrap_or_default(),
        response_headers: parse_headers(row.get(9)?),
        response_body: row.get::<_, Option<Vec<u8>>>(10)?.unwrap_or_default(),
        starred: row.get::<_, Option<bool>>(11)?.unwrap_or(false),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn make_req(id: &str, age: Duration) -> CapturedRequest {
        let mut req = CapturedRequest::new(id, "GET", format!("/items/{id}"));
        req.status_code = 200;
        req.timestamp = Utc::now() - age;
        req
    }

    fn count_requests(store: &RequestStore) -> i64 {
        store
            .connection()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM requests", [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn save_request_is_idempotent_per_id() {
        let mut store = RequestStore::open_in_memory().unwrap();
        let session = store.start_session("https://a.ngrok.app").unwrap();

        let mut req = make_req("r1", Duration::zero());
        req.response_body = b"a".to_vec();
        store.save_request(&session, &req).unwrap();
        req.response_body = b"b".to_vec();
        store.save_request(&session, &req).unwrap();

        assert_eq!(count_requests(&store), 1);
        let stored = store.get_request("r1").unwrap().unwrap();
        assert_eq!(stored.response_body, b"b".to_vec());
        assert_eq!(stored.session_id, session.id());
    }

    #[test]
    fn save_without_open_session_fails() {
        let mut store = RequestStore::open_in_memory().unwrap();
        let session = store.start_session("https://a.ngrok.app").unwrap();
        store.end_session(&session).unwrap();

        let err = store
            .save_request(&session, &make_req("r1", Duration::zero()))
            .unwrap_err();
        assert!(matches!(err, StoreError::NoActiveSession));
    }

    #[test]
    fn starting_a_session_ends_the_previous_one() {
        let mut store = RequestStore::open_in_memory().unwrap();
        let first = store.start_session("https://one.ngrok.app").unwrap();
        let second = store.start_session("https://two.ngrok.app").unwrap();

        assert!(first.id() < second.id(), "session ids increase");
        assert_eq!(store.open_session_id(), Some(second.id()));
        assert!(!store.get_session(first.id()).unwrap().is_open());
        assert!(store.get_session(second.id()).unwrap().is_open());
        assert!(matches!(
            store.save_request(&first, &make_req("r1", Duration::zero())),
            Err(StoreError::NoActiveSession)
        ));
    }

    #[test]
    fn sessions_and_requests_are_most_recent_first() {
        let mut store = RequestStore::open_in_memory().unwrap();
        let old = store.start_session("https://old.ngrok.app").unwrap();
        store.save_request(&old, &make_req("a", Duration::minutes(5))).unwrap();
        let new = store.start_session("https://new.ngrok.app").unwrap();
        store.save_request(&new, &make_req("b", Duration::minutes(3))).unwrap();
        store.save_request(&new, &make_req("c", Duration::minutes(1))).unwrap();

        let sessions = store.get_sessions().unwrap();
        let ids: Vec<_> = sessions.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec![new.id(), old.id()]);

        let reqs = store.get_session_requests(new.id()).unwrap();
        let ids: Vec<_> = reqs.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "b"]);
    }

    #[test]
    fn toggle_star_flips_and_reports_unknown_ids() {
        let mut store = RequestStore::open_in_memory().unwrap();
        let session = store.start_session("https://a.ngrok.app").unwrap();
        store.save_request(&session, &make_req("r1", Duration::zero())).unwrap();

        assert!(!store.is_starred("r1").unwrap());
        assert!(store.toggle_star("r1").unwrap());
        assert!(store.is_starred("r1").unwrap());
        assert_eq!(store.get_starred_requests().unwrap().len(), 1);
        assert!(!store.toggle_star("r1").unwrap());

        assert!(matches!(store.toggle_star("nope"), Err(StoreError::NotFound(_))));
        assert!(matches!(store.is_starred("nope"), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn cleanup_keeps_newest_and_starred() {
        let mut store = RequestStore::open_in_memory().unwrap();
        let session = store.start_session("https://a.ngrok.app").unwrap();
        for i in 0..1500 {
            // r0000 is the newest, r1499 the oldest; all older than 7 days
            let req = make_req(&format!("r{i:04}"), Duration::days(8) + Duration::minutes(i));
            store.save_request(&session, &req).unwrap();
        }
        let mut starred = make_req("starred", Duration::days(30));
        starred.starred = true;
        store.save_request(&session, &starred).unwrap();

        let report = store.cleanup(7, 1000).unwrap();
        assert_eq!(report.requests_deleted, 500);
        assert_eq!(report.sessions_deleted, 0);
        assert_eq!(count_requests(&store), 1001);
        assert!(store.get_request("r0999").unwrap().is_some());
        assert!(store.get_request("r1000").unwrap().is_none());
        assert!(store.is_starred("starred").unwrap());
    }

    #[test]
    fn cleanup_removes_emptied_sessions_but_not_starred_only_ones() {
        let mut store = RequestStore::open_in_memory().unwrap();
        let doomed = store.start_session("https://doomed.ngrok.app").unwrap();
        store.save_request(&doomed, &make_req("old", Duration::days(10))).unwrap();
        let kept = store.start_session("https://kept.ngrok.app").unwrap();
        let mut fav = make_req("fav", Duration::days(10));
        fav.starred = true;
        store.save_request(&kept, &fav).unwrap();

        let report = store.cleanup(7, 0).unwrap();
        assert_eq!(report, CleanupReport { requests_deleted: 1, sessions_deleted: 1 });
        assert!(matches!(store.get_session(doomed.id()), Err(StoreError::NotFound(_))));
        assert!(store.get_session(kept.id()).is_ok());
    }

    #[test]
    fn recent_requests_are_not_cleaned_up() {
        let mut store = RequestStore::open_in_memory().unwrap();
        let session = store.start_session("https://a.ngrok.app").unwrap();
        store.save_request(&session, &make_req("fresh", Duration::hours(1))).unwrap();
        let report = store.cleanup(7, 0).unwrap();
        assert_eq!(report.requests_deleted, 0);
        assert_eq!(count_requests(&store), 1);
    }

    #[test]
    fn delete_session_removes_its_requests() {
        let mut store = RequestStore::open_in_memory().unwrap();
        let session = store.start_session("https://a.ngrok.app").unwrap();
        store.save_request(&session, &make_req("r1", Duration::zero())).unwrap();
        store.save_request(&session, &make_req("r2", Duration::zero())).unwrap();

        store.delete_session(session.id()).unwrap();
        assert_eq!(count_requests(&store), 0);
        assert!(store.get_sessions().unwrap().is_empty());
        assert_eq!(store.open_session_id(), None);
    }

    #[test]
    fn search_and_recent_queries() {
        let mut store = RequestStore::open_in_memory().unwrap();
        let session = store.start_session("https://a.ngrok.app").unwrap();
        store.save_request(&session, &make_req("one", Duration::minutes(2))).unwrap();
        let mut post = make_req("two", Duration::minutes(1));
        post.method = "POST".into();
        post.request_body = b"{\"sku\":\"blue-widget\"}".to_vec();
        store.save_request(&session, &post).unwrap();

        let hits = store.search_requests("widget", 100).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "two");
        assert_eq!(store.search_requests("/items/", 100).unwrap().len(), 2);

        let recent = store.get_recent_requests(1).unwrap();
        assert_eq!(recent[0].id, "two");

        let stats = store.stats().unwrap();
        assert_eq!(stats, StoreStats { sessions: 1, requests: 2, starred: 0 });
        store.delete_request("one").unwrap();
        assert_eq!(store.stats().unwrap().requests, 1);
    }

    #[test]
    fn headers_and_bodies_survive_storage() {
        let mut store = RequestStore::open_in_memory().unwrap();
        let session = store.start_session("https://a.ngrok.app").unwrap();
        let mut req = make_req("r1", Duration::zero());
        req.request_headers
            .insert("Accept".into(), vec!["text/html".into(), "*/*".into()]);
        req.response_headers
            .insert("Set-Cookie".into(), vec!["a=1".into(), "b=2".into()]);
        req.request_body = b"SGVsbG8=".to_vec();
        req.duration_ms = 42;
        store.save_request(&session, &req).unwrap();

        let stored = store.get_request("r1").unwrap().unwrap();
        assert_eq!(stored.request_headers, req.request_headers);
        assert_eq!(stored.response_headers, req.response_headers);
        assert_eq!(stored.request_body, req.request_body);
        assert_eq!(stored.duration_ms, 42);
        assert_eq!(stored.timestamp, req.timestamp);
    }

    #[test]
    fn disabled_store_no_ops() {
        let mut store = RequestStore::disabled();
        assert!(!store.is_enabled());
        assert!(matches!(
            store.start_session("https://a.ngrok.app"),
            Err(StoreError::StorageUnavailable)
        ));

        let handle = SessionHandle::new("session_1".into(), Utc::now());
        store.save_request(&handle, &make_req("r1", Duration::zero())).unwrap();
        assert!(store.get_sessions().unwrap().is_empty());
        assert!(store.get_session_requests("session_1").unwrap().is_empty());
        assert_eq!(store.cleanup(7, 1000).unwrap(), CleanupReport::default());
        assert!(!store.is_starred("r1").unwrap());
        store.close().unwrap();
    }

    #[test]
    fn unopenable_path_falls_back_to_disabled() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"file").unwrap();

        let store = RequestStore::open_or_disabled(blocker.join("history.db"));
        assert!(!store.is_enabled());
    }

    #[test]
    fn close_marks_session_ended_on_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("history.db");

        let mut store = RequestStore::open(&path).unwrap();
        let session = store.start_session("https://a.ngrok.app").unwrap();
        store.save_request(&session, &make_req("r1", Duration::zero())).unwrap();
        store.close().unwrap();

        let reopened = RequestStore::open(&path).unwrap();
        let sessions = reopened.get_sessions().unwrap();
        assert_eq!(sessions.len(), 1);
        assert!(sessions[0].ended_at.is_some());
        assert_eq!(reopened.get_session_requests(session.id()).unwrap().len(), 1);
    }

    #[test]
    fn timestamps_keep_nanosecond_precision() {
        let mut store = RequestStore::open_in_memory().unwrap();
        let session = store.start_session("https://a.ngrok.app").unwrap();

        let base = Utc.timestamp_nanos(1_714_557_600_123_456_789);
        let mut early = make_req("b-early", Duration::zero());
        early.timestamp = base;
        let mut late = make_req("a-late", Duration::zero());
        late.timestamp = base + Duration::nanoseconds(500);
        store.save_request(&session, &early).unwrap();
        store.save_request(&session, &late).unwrap();

        let stored = store.get_request("b-early").unwrap().unwrap();
        assert_eq!(stored.timestamp, base);

        // same millisecond, so only the sub-millisecond part orders them
        let ids: Vec<_> = store
            .get_session_requests(session.id())
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["a-late", "b-early"]);

        let reloaded = store.get_session(session.id()).unwrap();
        assert_eq!(reloaded.started_at, session.started_at());
    }

    #[test]
    fn cleanup_breaks_timestamp_ties_by_id() {
        let mut store = RequestStore::open_in_memory().unwrap();
        let session = store.start_session("https://a.ngrok.app").unwrap();
        let stamp = Utc::now() - Duration::days(30);
        for id in ["a", "b", "c"] {
            let mut req = make_req(id, Duration::zero());
            req.timestamp = stamp;
            store.save_request(&session, &req).unwrap();
        }

        let report = store.cleanup(7, 1).unwrap();
        assert_eq!(report.requests_deleted, 2);
        assert!(store.get_request("c").unwrap().is_some());
        assert!(store.get_request("a").unwrap().is_none());
    }

    #[test]
    fn counts_requests_per_session() {
        let mut store = RequestStore::open_in_memory().unwrap();
        let first = store.start_session("https://one.ngrok.app").unwrap();
        store.save_request(&first, &make_req("a", Duration::zero())).unwrap();
        store.save_request(&first, &make_req("b", Duration::zero())).unwrap();
        let second = store.start_session("https://two.ngrok.app").unwrap();

        assert_eq!(store.count_session_requests(first.id()).unwrap(), 2);
        assert_eq!(store.count_session_requests(second.id()).unwrap(), 0);
        assert_eq!(RequestStore::disabled().count_session_requests(first.id()).unwrap(), 0);
    }
}
