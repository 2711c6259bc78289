//! Tracks remote rooms, scores them for delegation, and delegates over
//! HTTP. Timeout sweep runs on every query (sweep-on-read, not a
//! background timer, per the ambient design notes).

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{
    ExecutionMetadata, Finding, Outcome, ProcessType, RoomDelegationResult, RoomHeartbeat,
    RoomInfo, RoomRegistration, RoomStatus, RoomType, TaskContext,
};

const DEFAULT_HEARTBEAT_TIMEOUT_SECS: i64 = 120;
const DEFAULT_DELEGATION_TIMEOUT_SECS: u64 = 60;

pub struct RoomRegistry {
    rooms: Mutex<HashMap<String, RoomInfo>>,
    heartbeat_timeout_secs: i64,
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomRegistry {
    pub fn new() -> Self {
        let mut rooms = HashMap::new();
        rooms.insert(
            "server".to_string(),
            RoomInfo {
                room_id: "server".to_string(),
                room_name: "server".to_string(),
                room_type: RoomType::Server,
                url: String::new(),
                capabilities: vec!["reasoning".to_string()],
                instruments: vec!["note".to_string(), "research".to_string()],
                status: RoomStatus::Online,
                last_heartbeat: Utc::now(),
            },
        );
        Self {
            rooms: Mutex::new(rooms),
            heartbeat_timeout_secs: DEFAULT_HEARTBEAT_TIMEOUT_SECS,
        }
    }

    pub fn register(&self, registration: RoomRegistration) -> RoomInfo {
        let info = RoomInfo {
            room_id: registration.room_id,
            room_name: registration.room_name,
            room_type: registration.room_type,
            url: registration.url,
            capabilities: registration.capabilities,
            instruments: registration.instruments,
            status: RoomStatus::Online,
            last_heartbeat: Utc::now(),
        };
        self.rooms.lock().unwrap().insert(info.room_id.clone(), info.clone());
        info
    }

    pub fn deregister(&self, room_id: &str) -> bool {
        self.rooms.lock().unwrap().remove(room_id).is_some()
    }

    /// Returns `true` if the heartbeat was applied; `false` means the room
    /// is unknown and the caller needs to re-register.
    pub fn heartbeat(&self, heartbeat: RoomHeartbeat) -> bool {
        let mut rooms = self.rooms.lock().unwrap();
        match rooms.get_mut(&heartbeat.room_id) {
            Some(room) => {
                room.last_heartbeat = Utc::now();
                if let Some(status) = heartbeat.status {
                    room.status = status;
                }
                true
            }
            None => false,
        }
    }

    fn sweep_timeouts(&self) {
        let now = Utc::now();
        let timeout = self.heartbeat_timeout_secs;
        let mut rooms = self.rooms.lock().unwrap();
        for room in rooms.values_mut() {
            if room.room_type == RoomType::Server {
                continue;
            }
            if now - room.last_heartbeat > Duration::seconds(timeout) {
                room.status = RoomStatus::Offline;
            }
        }
    }

    pub fn get_rooms_by_capability(&self, capability: &str) -> Vec<RoomInfo> {
        self.sweep_timeouts();
        self.rooms
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.status == RoomStatus::Online && r.capabilities.iter().any(|c| c == capability))
            .cloned()
            .collect()
    }

    /// Scores `online` rooms satisfying `required_capabilities` by
    /// `10·[type matches preference] + 5·[prefer_local ∧ type=local] +
    /// |capabilities|`, restricting to local rooms when `local_only`.
    pub fn get_best_room_for_task(
        &self,
        required_capabilities: &[String],
        preferred_type: Option<RoomType>,
        prefer_local: bool,
        local_only: bool,
    ) -> Option<RoomInfo> {
        self.sweep_timeouts();
        let rooms = self.rooms.lock().unwrap();

        rooms
            .values()
            .filter(|r| r.status == RoomStatus::Online)
            .filter(|r| {
                required_capabilities
                    .iter()
                    .all(|cap| r.capabilities.iter().any(|c| c == cap))
            })
            .filter(|r| !local_only || r.room_type == RoomType::Local)
            .max_by(|a, b| {
                score(a, preferred_type, prefer_local)
                    .partial_cmp(&score(b, preferred_type, prefer_local))
                    .unwrap()
            })
            .cloned()
    }
}

fn score(room: &RoomInfo, preferred_type: Option<RoomType>, prefer_local: bool) -> f64 {
    let mut total = 0.0;
    if preferred_type == Some(room.room_type) {
        total += 10.0;
    }
    if prefer_local && room.room_type == RoomType::Local {
        total += 5.0;
    }
    total += room.capabilities.len() as f64;
    total
}

#[derive(Debug, Serialize)]
struct DelegationPayload<'a> {
    query: &'a str,
    instrument: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    context: Option<&'a TaskContext>,
}

#[derive(Debug, Deserialize)]
struct RawDelegationResponse {
    #[serde(default)]
    outcome: Option<String>,
    #[serde(default)]
    findings: Vec<serde_json::Value>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    confidence: Option<f64>,
}

pub struct RoomClient {
    http: reqwest::Client,
    timeout: StdDuration,
}

impl Default for RoomClient {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomClient {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
            timeout: StdDuration::from_secs(DEFAULT_DELEGATION_TIMEOUT_SECS),
        }
    }

    /// POSTs `{query, instrument, context?}` to `room.url + "/task"` with a
    /// bounded timeout. Always returns a normalized result; transport
    /// failures become `success=false` rather than propagating.
    pub async fn delegate(
        &self,
        room: &RoomInfo,
        instrument: &str,
        query: &str,
        context: Option<&TaskContext>,
    ) -> RoomDelegationResult {
        let started = std::time::Instant::now();
        let url = format!("{}/task", room.url.trim_end_matches('/'));
        let payload = DelegationPayload {
            query,
            instrument,
            context,
        };

        let response = self
            .http
            .post(&url)
            .timeout(self.timeout)
            .json(&payload)
            .send()
            .await;

        let latency_ms = started.elapsed().as_millis() as u64;

        let response = match response {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                return RoomDelegationResult {
                    success: false,
                    error: Some(format!("room returned status {}", r.status())),
                    latency_ms: Some(latency_ms),
                    ..Default::default()
                }
            }
            Err(e) if e.is_timeout() => {
                return RoomDelegationResult {
                    success: false,
                    error: Some("room delegation timed out".to_string()),
                    latency_ms: Some(latency_ms),
                    ..Default::default()
                }
            }
            Err(e) if e.is_connect() => {
                return RoomDelegationResult {
                    success: false,
                    error: Some(format!("could not connect to room: {e}")),
                    latency_ms: Some(latency_ms),
                    ..Default::default()
                }
            }
            Err(e) => {
                return RoomDelegationResult {
                    success: false,
                    error: Some(format!("room delegation failed: {e}")),
                    latency_ms: Some(latency_ms),
                    ..Default::default()
                }
            }
        };

        match response.json::<RawDelegationResponse>().await {
            Ok(raw) => self.normalize(room, instrument, raw, latency_ms),
            Err(e) => RoomDelegationResult {
                success: false,
                error: Some(format!("invalid room response: {e}")),
                latency_ms: Some(latency_ms),
                ..Default::default()
            },
        }
    }

    fn normalize(
        &self,
        room: &RoomInfo,
        instrument: &str,
        raw: RawDelegationResponse,
        latency_ms: u64,
    ) -> RoomDelegationResult {
        let outcome = raw
            .outcome
            .as_deref()
            .map(|s| match s.to_lowercase().as_str() {
                "complete" => Outcome::Complete,
                "saturated" => Outcome::Saturated,
                "bounded" => Outcome::Bounded,
                _ => Outcome::Inconclusive,
            })
            .unwrap_or(Outcome::Inconclusive);

        let findings = raw
            .findings
            .into_iter()
            .map(|v| match v {
                serde_json::Value::String(s) => Finding::new(s, 0.5),
                other => {
                    let content = other
                        .get("content")
                        .and_then(|c| c.as_str())
                        .unwrap_or_default()
                        .to_string();
                    let confidence = other.get("confidence").and_then(|c| c.as_f64()).unwrap_or(0.5);
                    Finding::new(content, confidence)
                }
            })
            .collect();

        RoomDelegationResult {
            success: true,
            outcome: Some(outcome),
            findings,
            summary: raw.summary,
            confidence: raw.confidence,
            metadata: Some(ExecutionMetadata {
                instrument_used: format!("room:{}/{}", room.room_id, instrument),
                iterations: 1,
                duration_ms: latency_ms,
                sources_consulted: Vec::new(),
                process_type: ProcessType::SemiAutonomic,
                room_id: Some(room.room_id.clone()),
            }),
            error: None,
            latency_ms: Some(latency_ms),
        }
    }

    pub async fn check_health(&self, room: &RoomInfo) -> bool {
        let url = format!("{}/health", room.url.trim_end_matches('/'));
        self.http
            .get(&url)
            .timeout(StdDuration::from_secs(5))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}

impl Default for RoomDelegationResult {
    fn default() -> Self {
        Self {
            success: false,
            outcome: None,
            findings: Vec::new(),
            summary: None,
            confidence: None,
            metadata: None,
            error: None,
            latency_ms: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn room(room_type: RoomType, capabilities: &[&str]) -> RoomInfo {
        RoomInfo {
            room_id: format!("{room_type:?}"),
            room_name: "r".to_string(),
            room_type,
            url: "http://localhost".to_string(),
            capabilities: capabilities.iter().map(|s| s.to_string()).collect(),
            instruments: Vec::new(),
            status: RoomStatus::Online,
            last_heartbeat: Utc::now(),
        }
    }

    #[test]
    fn type_match_outranks_capability_count_tiebreak() {
        let local = room(RoomType::Local, &["shell_execution"]);
        let ios = room(RoomType::Ios, &["shell_execution", "vision"]);
        let local_score = score(&local, Some(RoomType::Local), false);
        let ios_score = score(&ios, Some(RoomType::Local), false);
        assert!(local_score >= ios_score);
    }

    #[test]
    fn register_then_deregister_round_trips() {
        let registry = RoomRegistry::new();
        let before = registry.get_rooms_by_capability("shell_execution").len();
        registry.register(RoomRegistration {
            room_id: "r1".to_string(),
            room_name: "r1".to_string(),
            room_type: RoomType::Local,
            url: "http://localhost".to_string(),
            capabilities: vec!["shell_execution".to_string()],
            instruments: vec![],
        });
        assert_eq!(registry.get_rooms_by_capability("shell_execution").len(), before + 1);
        registry.deregister("r1");
        assert_eq!(registry.get_rooms_by_capability("shell_execution").len(), before);
    }

    #[test]
    fn heartbeat_on_unknown_room_signals_reregister() {
        let registry = RoomRegistry::new();
        let ok = registry.heartbeat(RoomHeartbeat {
            room_id: "ghost".to_string(),
            status: None,
        });
        assert!(!ok);
    }
}
