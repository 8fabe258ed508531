//! Tamper-evident audit logging for boundary crossings.
//!
//! Every sanitizer decision and LLM call is durably recorded as one JSON
//! line in an append-only segment file. Each line carries the SHA-256 of
//! the previously written line, building a verifiable per-segment hash
//! chain, and is optionally HMAC-SHA256 signed over its canonical fields.
//! Appends are strictly serial: one mutex guards the hash cursor and the
//! file handle, held only for the duration of a single append.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::error::{DaxGateError, Result};

type HmacSha256 = Hmac<Sha256>;

const LOG_VERSION: &str = "1.0";
const SEGMENT_PREFIX: &str = "audit_";
const SEGMENT_SUFFIX: &str = ".jsonl";

/// Types of audit events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventKind {
    // Connection events
    ConnectionOpened,
    ConnectionClosed,
    ConnectionFailed,

    // Query events
    QuerySubmitted,
    QueryExecuted,
    QueryFailed,

    // LLM events
    LlmRequest,
    LlmResponse,
    LlmError,

    // Security events
    PiiDetected,
    PolicyViolation,
    AccessDenied,
    DataBoundaryViolation,

    // System events
    ServerStarted,
    ServerStopped,
    ValidationRun,
    ConfigChanged,
}

/// Severity levels for audit events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditSeverity {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

/// One audit event, exactly as serialized to the segment file.
///
/// Created and appended exactly once; never mutated. The `details` map is
/// restricted by convention to non-sensitive scalar/array values: no
/// query results, no data values, no PII.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: Uuid,
    pub event_type: AuditEventKind,
    pub severity: AuditSeverity,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub request_id: Option<String>,
    pub details: serde_json::Map<String, Value>,
    pub previous_hash: Option<String>,
    pub signature: Option<String>,
}

/// A not-yet-appended event. Severity defaults to Info.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub kind: AuditEventKind,
    pub severity: AuditSeverity,
    pub message: String,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub request_id: Option<String>,
    pub details: serde_json::Map<String, Value>,
}

impl NewEvent {
    pub fn new(kind: AuditEventKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: AuditSeverity::Info,
            message: message.into(),
            user_id: None,
            session_id: None,
            request_id: None,
            details: serde_json::Map::new(),
        }
    }

    pub fn severity(mut self, severity: AuditSeverity) -> Self {
        self.severity = severity;
        self
    }

    pub fn request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn details(mut self, details: serde_json::Map<String, Value>) -> Self {
        self.details = details;
        self
    }
}

/// Configuration for the audit log.
#[derive(Debug)]
pub struct AuditConfig {
    /// Directory holding segment files.
    pub directory: PathBuf,
    /// Rotation threshold per segment, in bytes.
    pub max_file_size: u64,
    /// Retention cap: oldest segments beyond this count are deleted.
    pub max_files: usize,
    /// Whether to HMAC-sign each entry.
    pub sign_entries: bool,
    /// Externally persisted signing key; a random 256-bit key is
    /// generated when absent. Key persistence across restarts is a
    /// deployment concern.
    pub signing_key: Option<Zeroizing<Vec<u8>>>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("./logs/audit"),
            max_file_size: 10 * 1024 * 1024,
            max_files: 100,
            sign_entries: true,
            signing_key: None,
        }
    }
}

impl AuditConfig {
    /// Supplies a signing key as base64, the form it takes in deployment
    /// configuration.
    ///
    /// # Errors
    /// Returns a configuration error when the key is not valid base64.
    pub fn with_signing_key_base64(mut self, encoded: &str) -> Result<Self> {
        use base64::Engine as _;
        let key = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| DaxGateError::configuration(format!("invalid signing key: {e}")))?;
        self.signing_key = Some(Zeroizing::new(key));
        Ok(self)
    }
}

/// Per-segment integrity verification result.
#[derive(Debug, Clone, Serialize)]
pub struct IntegrityReport {
    pub file: PathBuf,
    pub valid: bool,
    pub events_checked: usize,
    /// Line indices whose `previous_hash` did not match the replayed chain.
    pub chain_failures: Vec<usize>,
    /// Line indices whose HMAC signature did not verify.
    pub signature_failures: Vec<usize>,
    pub error: Option<String>,
}

/// Audit log statistics.
#[derive(Debug, Clone, Serialize)]
pub struct AuditStats {
    pub directory: PathBuf,
    pub current_file: PathBuf,
    pub total_files: usize,
    pub total_size_bytes: u64,
    pub events_in_session: u64,
    pub signing_enabled: bool,
}

#[derive(Serialize)]
struct SegmentHeader<'a> {
    log_version: &'a str,
    created_at: DateTime<Utc>,
    signing_enabled: bool,
}

struct SegmentState {
    file: File,
    path: PathBuf,
    previous_hash: String,
    bytes_written: u64,
    event_count: u64,
}

/// Append-only, hash-chained, optionally HMAC-signed event store.
///
/// # Failure semantics
/// A failed write is fatal to that append. The audit record is the
/// compliance evidence for the boundary guarantee, so callers should
/// prefer failing the request over proceeding un-audited.
pub struct AuditLog {
    directory: PathBuf,
    max_file_size: u64,
    max_files: usize,
    sign_entries: bool,
    signing_key: Zeroizing<Vec<u8>>,
    state: Mutex<SegmentState>,
}

impl AuditLog {
    /// Opens the log: creates the directory, starts a fresh segment, and
    /// writes its header record.
    ///
    /// # Errors
    /// Returns [`DaxGateError::Audit`] when the directory or segment
    /// cannot be created.
    pub fn open(config: AuditConfig) -> Result<Self> {
        fs::create_dir_all(&config.directory)
            .map_err(|e| DaxGateError::audit("cannot create audit directory", e))?;

        let signing_key = config.signing_key.unwrap_or_else(|| {
            let mut key = vec![0u8; 32];
            rand::rng().fill_bytes(&mut key);
            Zeroizing::new(key)
        });

        let state = open_segment(&config.directory, config.sign_entries)?;

        Ok(Self {
            directory: config.directory,
            max_file_size: config.max_file_size,
            max_files: config.max_files,
            sign_entries: config.sign_entries,
            signing_key,
            state: Mutex::new(state),
        })
    }

    /// Appends one event, flushing to durable storage before returning.
    ///
    /// # Errors
    /// Returns [`DaxGateError::Audit`] if the write or flush fails; the
    /// chain cursor is not advanced in that case.
    pub fn append(&self, event: NewEvent) -> Result<AuditEvent> {
        let mut state = self.lock_state();

        let mut record = AuditEvent {
            event_id: Uuid::new_v4(),
            event_type: event.kind,
            severity: event.severity,
            message: event.message,
            timestamp: Utc::now(),
            user_id: event.user_id,
            session_id: event.session_id,
            request_id: event.request_id,
            details: event.details,
            previous_hash: Some(state.previous_hash.clone()),
            signature: None,
        };

        if self.sign_entries {
            record.signature = Some(self.sign(&record)?);
        }

        let line = serde_json::to_string(&record)
            .map_err(|e| DaxGateError::serialization("audit event", e))?;

        state
            .file
            .write_all(line.as_bytes())
            .and_then(|()| state.file.write_all(b"\n"))
            .and_then(|()| state.file.sync_data())
            .map_err(|e| DaxGateError::audit("cannot append audit event", e))?;

        state.previous_hash = sha256_hex(line.as_bytes());
        state.bytes_written += line.len() as u64 + 1;
        state.event_count += 1;

        if state.bytes_written >= self.max_file_size {
            self.rotate(&mut state)?;
        }

        Ok(record)
    }

    /// Verifies the integrity of a segment. With no path, verifies the
    /// currently open segment; the append lock is held for the whole
    /// replay so a partial write cannot be observed.
    ///
    /// # Errors
    /// Returns [`DaxGateError::Audit`] when the segment cannot be read.
    pub fn verify_integrity(&self, path: Option<&Path>) -> Result<IntegrityReport> {
        let state = self.lock_state();
        let target = path.map_or_else(|| state.path.clone(), Path::to_path_buf);
        let key = self.sign_entries.then_some(self.signing_key.as_slice());
        verify_segment(&target, key)
    }

    /// Appends a query-execution event. Only the query's hash, length,
    /// and accessed table names are recorded, never its result.
    pub fn log_query(
        &self,
        query: &str,
        request_id: &str,
        user_id: Option<&str>,
        tables_accessed: &[String],
    ) -> Result<AuditEvent> {
        let mut details = serde_json::Map::new();
        details.insert(
            "query_hash".to_string(),
            json!(&sha256_hex(query.as_bytes())[..16]),
        );
        details.insert("query_length".to_string(), json!(query.len()));
        details.insert("tables_accessed".to_string(), json!(tables_accessed));

        let mut event = NewEvent::new(AuditEventKind::QueryExecuted, "DAX query executed")
            .request_id(request_id)
            .details(details);
        if let Some(user_id) = user_id {
            event = event.user_id(user_id);
        }
        self.append(event)
    }

    /// Appends an LLM-request event. `data_included` is always false:
    /// only the sanitized schema crosses the boundary.
    pub fn log_llm_request(
        &self,
        request_id: &str,
        provider: &str,
        schema_hash: &str,
        intent_length: usize,
    ) -> Result<AuditEvent> {
        let mut details = serde_json::Map::new();
        details.insert("provider".to_string(), json!(provider));
        details.insert("schema_hash".to_string(), json!(schema_hash));
        details.insert("intent_length".to_string(), json!(intent_length));
        details.insert("data_included".to_string(), json!(false));

        self.append(
            NewEvent::new(AuditEventKind::LlmRequest, "LLM inference request")
                .request_id(request_id)
                .details(details),
        )
    }

    /// Appends an LLM-response event.
    pub fn log_llm_response(
        &self,
        request_id: &str,
        provider: &str,
        latency_ms: f64,
        tokens: Option<u64>,
    ) -> Result<AuditEvent> {
        let mut details = serde_json::Map::new();
        details.insert("provider".to_string(), json!(provider));
        details.insert("latency_ms".to_string(), json!(latency_ms));
        details.insert("tokens".to_string(), json!(tokens));

        self.append(
            NewEvent::new(AuditEventKind::LlmResponse, "LLM inference completed")
                .request_id(request_id)
                .details(details),
        )
    }

    /// Appends a security event at warning severity.
    pub fn log_security_event(
        &self,
        kind: AuditEventKind,
        message: impl Into<String>,
        request_id: Option<&str>,
        details: serde_json::Map<String, Value>,
    ) -> Result<AuditEvent> {
        let mut event = NewEvent::new(kind, message)
            .severity(AuditSeverity::Warning)
            .details(details);
        if let Some(request_id) = request_id {
            event = event.request_id(request_id);
        }
        self.append(event)
    }

    /// Current log statistics.
    pub fn stats(&self) -> AuditStats {
        let state = self.lock_state();
        let segments = list_segments(&self.directory).unwrap_or_default();
        let total_size_bytes = segments
            .iter()
            .filter_map(|p| fs::metadata(p).ok())
            .map(|m| m.len())
            .sum();

        AuditStats {
            directory: self.directory.clone(),
            current_file: state.path.clone(),
            total_files: segments.len(),
            total_size_bytes,
            events_in_session: state.event_count,
            signing_enabled: self.sign_entries,
        }
    }

    fn sign(&self, event: &AuditEvent) -> Result<String> {
        let timestamp = serde_json::to_value(event.timestamp)
            .map_err(|e| DaxGateError::serialization("audit timestamp", e))?;
        let event_type = serde_json::to_value(event.event_type)
            .map_err(|e| DaxGateError::serialization("audit event type", e))?;

        let canonical = canonical_signing_string(
            &event.event_id.to_string(),
            &event_type,
            &event.message,
            event.previous_hash.as_deref(),
            &timestamp,
        );
        Ok(hmac_hex(&self.signing_key, canonical.as_bytes()))
    }

    fn rotate(&self, state: &mut SegmentState) -> Result<()> {
        let segments = list_segments(&self.directory)?;
        // Filenames encode a UTC timestamp, so lexicographic order is
        // chronological; delete the oldest beyond the retention cap.
        let excess = (segments.len() + 1).saturating_sub(self.max_files);
        for old in segments.iter().take(excess) {
            fs::remove_file(old)
                .map_err(|e| DaxGateError::audit("cannot delete rotated segment", e))?;
        }

        *state = open_segment(&self.directory, self.sign_entries)?;
        Ok(())
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, SegmentState> {
        // A poisoned mutex means a prior append panicked mid-write; the
        // chain cursor is still consistent because it is only advanced
        // after a successful write.
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Replays a segment line by line, recomputing the expected hash chain
/// and, when a key is supplied, the HMAC signatures.
///
/// A segment is valid iff every line parses as JSON and both failure
/// lists are empty. Rotated segments can be verified across process
/// restarts by supplying the externally persisted key.
///
/// # Errors
/// Returns [`DaxGateError::Audit`] when the file cannot be opened.
pub fn verify_segment(path: &Path, signing_key: Option<&[u8]>) -> Result<IntegrityReport> {
    let file =
        File::open(path).map_err(|e| DaxGateError::audit("cannot open audit segment", e))?;
    let reader = BufReader::new(file);

    let mut report = IntegrityReport {
        file: path.to_path_buf(),
        valid: true,
        events_checked: 0,
        chain_failures: Vec::new(),
        signature_failures: Vec::new(),
        error: None,
    };

    let mut previous_hash: Option<String> = None;

    for (index, line) in reader.lines().enumerate() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                report.valid = false;
                report.error = Some(format!("read failure at line {index}: {e}"));
                break;
            }
        };

        let data: Value = match serde_json::from_str(&line) {
            Ok(data) => data,
            Err(_) => {
                report.valid = false;
                report.error = Some(format!("invalid JSON at line {index}"));
                break;
            }
        };

        // Header line re-seeds the chain.
        if data.get("log_version").is_some() {
            previous_hash = Some(sha256_hex(line.as_bytes()));
            continue;
        }

        report.events_checked += 1;

        let stored_previous = data.get("previous_hash").and_then(Value::as_str);
        if stored_previous != previous_hash.as_deref() {
            report.chain_failures.push(index);
            report.valid = false;
        }

        if let (Some(key), Some(stored_signature)) =
            (signing_key, data.get("signature").and_then(Value::as_str))
        {
            let canonical = canonical_signing_string(
                data.get("event_id").and_then(Value::as_str).unwrap_or(""),
                data.get("event_type").unwrap_or(&Value::Null),
                data.get("message").and_then(Value::as_str).unwrap_or(""),
                stored_previous,
                data.get("timestamp").unwrap_or(&Value::Null),
            );
            if hmac_hex(key, canonical.as_bytes()) != stored_signature {
                report.signature_failures.push(index);
                report.valid = false;
            }
        }

        previous_hash = Some(sha256_hex(line.as_bytes()));
    }

    Ok(report)
}

/// Canonical JSON for signing: fixed (alphabetical) key order over the
/// identity-bearing fields, excluding the signature itself.
fn canonical_signing_string(
    event_id: &str,
    event_type: &Value,
    message: &str,
    previous_hash: Option<&str>,
    timestamp: &Value,
) -> String {
    // serde_json maps are BTreeMaps, so keys serialize sorted.
    json!({
        "event_id": event_id,
        "event_type": event_type,
        "message": message,
        "previous_hash": previous_hash,
        "timestamp": timestamp,
    })
    .to_string()
}

fn open_segment(directory: &Path, signing_enabled: bool) -> Result<SegmentState> {
    let stamp = Utc::now().format("%Y%m%d_%H%M%S");
    let mut path = directory.join(format!("{SEGMENT_PREFIX}{stamp}{SEGMENT_SUFFIX}"));
    // Size-triggered rotation can reopen within the same second; suffix
    // so the previous segment is never clobbered.
    let mut counter = 1;
    while path.exists() {
        path = directory.join(format!("{SEGMENT_PREFIX}{stamp}_{counter}{SEGMENT_SUFFIX}"));
        counter += 1;
    }

    let header = serde_json::to_string(&SegmentHeader {
        log_version: LOG_VERSION,
        created_at: Utc::now(),
        signing_enabled,
    })
    .map_err(|e| DaxGateError::serialization("audit segment header", e))?;

    let mut file = OpenOptions::new()
        .create_new(true)
        .append(true)
        .open(&path)
        .map_err(|e| DaxGateError::audit("cannot create audit segment", e))?;

    file.write_all(header.as_bytes())
        .and_then(|()| file.write_all(b"\n"))
        .and_then(|()| file.sync_data())
        .map_err(|e| DaxGateError::audit("cannot write audit segment header", e))?;

    Ok(SegmentState {
        file,
        previous_hash: sha256_hex(header.as_bytes()),
        bytes_written: header.len() as u64 + 1,
        event_count: 0,
        path,
    })
}

fn list_segments(directory: &Path) -> Result<Vec<PathBuf>> {
    let mut segments: Vec<PathBuf> = fs::read_dir(directory)
        .map_err(|e| DaxGateError::audit("cannot list audit directory", e))?
        .filter_map(std::result::Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(SEGMENT_PREFIX) && n.ends_with(SEGMENT_SUFFIX))
        })
        .collect();
    segments.sort();
    Ok(segments)
}

pub(crate) fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn hmac_hex(key: &[u8], message: &[u8]) -> String {
    // HMAC accepts keys of any length.
    let mut mac = HmacSha256::new_from_slice(key)
        .unwrap_or_else(|_| unreachable!("HMAC-SHA256 accepts any key length"));
    mac.update(message);
    hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_log(dir: &TempDir) -> AuditLog {
        AuditLog::open(AuditConfig {
            directory: dir.path().to_path_buf(),
            ..AuditConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_append_builds_hash_chain() {
        let dir = TempDir::new().unwrap();
        let log = test_log(&dir);

        let first = log
            .append(NewEvent::new(AuditEventKind::ServerStarted, "started"))
            .unwrap();
        let second = log
            .append(NewEvent::new(AuditEventKind::LlmRequest, "request"))
            .unwrap();

        assert!(first.previous_hash.is_some());
        assert_ne!(first.previous_hash, second.previous_hash);
        assert!(first.signature.is_some());
    }

    #[test]
    fn test_verify_clean_segment() {
        let dir = TempDir::new().unwrap();
        let log = test_log(&dir);

        for i in 0..5 {
            log.append(NewEvent::new(
                AuditEventKind::LlmRequest,
                format!("event {i}"),
            ))
            .unwrap();
        }

        let report = log.verify_integrity(None).unwrap();
        assert!(report.valid, "report: {report:?}");
        assert_eq!(report.events_checked, 5);
        assert!(report.chain_failures.is_empty());
        assert!(report.signature_failures.is_empty());
    }

    #[test]
    fn test_tampered_line_breaks_chain_and_signature() {
        let dir = TempDir::new().unwrap();
        let log = test_log(&dir);

        for i in 0..4 {
            log.append(NewEvent::new(
                AuditEventKind::LlmRequest,
                format!("event {i}"),
            ))
            .unwrap();
        }
        let path = log.stats().current_file;

        // Flip the message of the second event (line index 2: header + 1).
        let contents = fs::read_to_string(&path).unwrap();
        let tampered = contents.replace("event 1", "event X");
        assert_ne!(contents, tampered);
        fs::write(&path, tampered).unwrap();

        let report = log.verify_integrity(Some(&path)).unwrap();
        assert!(!report.valid);
        // The tampered line still stores the original previous_hash, so
        // the chain breaks at the line after it; its own signature fails.
        assert!(report.signature_failures.contains(&2), "report: {report:?}");
        assert_eq!(report.chain_failures, vec![3], "report: {report:?}");
    }

    #[test]
    fn test_rotation_enforces_retention() {
        let dir = TempDir::new().unwrap();
        let log = AuditLog::open(AuditConfig {
            directory: dir.path().to_path_buf(),
            max_file_size: 400,
            max_files: 3,
            ..AuditConfig::default()
        })
        .unwrap();

        for i in 0..12 {
            log.append(NewEvent::new(
                AuditEventKind::QueryExecuted,
                format!("query {i}"),
            ))
            .unwrap();
        }

        let stats = log.stats();
        assert!(stats.total_files <= 3, "stats: {stats:?}");
    }

    #[test]
    fn test_rotated_segment_verifies_with_external_key() {
        let dir = TempDir::new().unwrap();
        use base64::Engine as _;
        let key = base64::engine::general_purpose::STANDARD.encode([7u8; 32]);

        let log = AuditLog::open(
            AuditConfig {
                directory: dir.path().to_path_buf(),
                ..AuditConfig::default()
            }
            .with_signing_key_base64(&key)
            .unwrap(),
        )
        .unwrap();

        log.append(NewEvent::new(AuditEventKind::ConfigChanged, "reconfig"))
            .unwrap();
        let path = log.stats().current_file;
        drop(log);

        // Simulates verification after a restart with the persisted key.
        let report = verify_segment(&path, Some(&[7u8; 32])).unwrap();
        assert!(report.valid, "report: {report:?}");
        assert_eq!(report.events_checked, 1);

        let wrong = verify_segment(&path, Some(&[8u8; 32])).unwrap();
        assert!(!wrong.valid);
        assert_eq!(wrong.signature_failures, vec![1]);
    }

    #[test]
    fn test_unsigned_log_still_chains() {
        let dir = TempDir::new().unwrap();
        let log = AuditLog::open(AuditConfig {
            directory: dir.path().to_path_buf(),
            sign_entries: false,
            ..AuditConfig::default()
        })
        .unwrap();

        let event = log
            .append(NewEvent::new(AuditEventKind::ServerStarted, "started"))
            .unwrap();
        assert!(event.signature.is_none());
        assert!(event.previous_hash.is_some());

        let report = log.verify_integrity(None).unwrap();
        assert!(report.valid);
    }

    #[test]
    fn test_convenience_events_shape() {
        let dir = TempDir::new().unwrap();
        let log = test_log(&dir);

        let event = log
            .log_llm_request("req-1", "ollama", "abcd1234abcd1234", 42)
            .unwrap();
        assert_eq!(event.details["data_included"], json!(false));
        assert_eq!(event.details["provider"], json!("ollama"));
        assert_eq!(event.details["intent_length"], json!(42));

        let event = log
            .log_query("EVALUATE Sales", "req-1", None, &["Sales".to_string()])
            .unwrap();
        assert_eq!(event.details["query_length"], json!(14));
        assert!(event.details.get("query_hash").is_some());
        // The query text itself is never recorded.
        assert!(!serde_json::to_string(&event).unwrap().contains("EVALUATE"));

        let event = log
            .log_security_event(
                AuditEventKind::DataBoundaryViolation,
                "boundary violation detected",
                Some("req-2"),
                serde_json::Map::new(),
            )
            .unwrap();
        assert_eq!(event.severity, AuditSeverity::Warning);
    }

    #[test]
    fn test_header_line_shape() {
        let dir = TempDir::new().unwrap();
        let log = test_log(&dir);
        let path = log.stats().current_file;

        let contents = fs::read_to_string(path).unwrap();
        let header: Value = serde_json::from_str(contents.lines().next().unwrap()).unwrap();
        assert_eq!(header["log_version"], json!("1.0"));
        assert_eq!(header["signing_enabled"], json!(true));
        assert!(header.get("created_at").is_some());
    }
}
