//! Holds pending approvals when trust gating requires sign-off.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{ConductorError, ConductorResult};
use crate::model::{ApprovalRequest, ApprovalStatus};

pub struct ApprovalRouter {
    requests: Mutex<HashMap<Uuid, ApprovalRequest>>,
}

impl Default for ApprovalRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl ApprovalRouter {
    pub fn new() -> Self {
        Self {
            requests: Mutex::new(HashMap::new()),
        }
    }

    pub fn submit(
        &self,
        conductor_id: impl Into<String>,
        action_type: impl Into<String>,
        description: impl Into<String>,
        context: serde_json::Value,
        trust_level: u8,
        ttl_seconds: u64,
        now: DateTime<Utc>,
    ) -> ApprovalRequest {
        let request = ApprovalRequest {
            id: Uuid::new_v4(),
            conductor_id: conductor_id.into(),
            action_type: action_type.into(),
            description: description.into(),
            context,
            trust_level,
            status: ApprovalStatus::Pending,
            requested_at: now,
            resolved_at: None,
            resolved_by: None,
            ttl_seconds,
        };
        self.requests
            .lock()
            .unwrap()
            .insert(request.id, request.clone());
        request
    }

    /// Resolves a pending approval. Fails `NotFound` for an unknown id, and
    /// also `NotFound` for a request no longer PENDING: resolving again
    /// requires a transition out of PENDING, which has already happened.
    pub fn resolve(
        &self,
        id: Uuid,
        approve: bool,
        resolved_by: impl Into<String>,
        now: DateTime<Utc>,
    ) -> ConductorResult<ApprovalRequest> {
        let mut requests = self.requests.lock().unwrap();
        let request = requests
            .get_mut(&id)
            .ok_or_else(|| ConductorError::ApprovalNotFound(id.to_string()))?;
        if request.status != ApprovalStatus::Pending {
            return Err(ConductorError::ApprovalNotFound(id.to_string()));
        }
        request.status = if approve {
            ApprovalStatus::Approved
        } else {
            ApprovalStatus::Denied
        };
        request.resolved_at = Some(now);
        request.resolved_by = Some(resolved_by.into());
        Ok(request.clone())
    }

    pub fn get(&self, id: Uuid) -> Option<ApprovalRequest> {
        self.requests.lock().unwrap().get(&id).cloned()
    }

    pub fn get_pending(&self, conductor_id: Option<&str>) -> Vec<ApprovalRequest> {
        self.requests
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.status == ApprovalStatus::Pending)
            .filter(|r| conductor_id.map(|id| id == r.conductor_id).unwrap_or(true))
            .cloned()
            .collect()
    }

    /// Sweep-on-read: marks requests whose TTL has elapsed as EXPIRED.
    pub fn expire_stale(&self, now: DateTime<Utc>) -> usize {
        let mut requests = self.requests.lock().unwrap();
        let mut expired = 0;
        for request in requests.values_mut() {
            if request.status == ApprovalStatus::Pending {
                let elapsed = (now - request.requested_at).num_seconds();
                if elapsed > request.ttl_seconds as i64 {
                    request.status = ApprovalStatus::Expired;
                    expired += 1;
                }
            }
        }
        expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn resolve_unknown_id_is_not_found() {
        let router = ApprovalRouter::new();
        let err = router
            .resolve(Uuid::new_v4(), true, "alice", Utc::now())
            .unwrap_err();
        assert!(matches!(err, ConductorError::ApprovalNotFound(_)));
    }

    #[test]
    fn resolve_twice_is_not_found_on_second_call() {
        let router = ApprovalRouter::new();
        let now = Utc::now();
        let request = router.submit("c1", "research", "desc", serde_json::json!({}), 0, 300, now);
        router.resolve(request.id, true, "alice", now).unwrap();
        let err = router.resolve(request.id, true, "alice", now).unwrap_err();
        assert!(matches!(err, ConductorError::ApprovalNotFound(_)));
    }

    #[test]
    fn expires_after_ttl() {
        let router = ApprovalRouter::new();
        let now = Utc::now();
        let request = router.submit("c1", "research", "desc", serde_json::json!({}), 0, 10, now);
        let later = now + Duration::seconds(11);
        router.expire_stale(later);
        let refreshed = router.get(request.id).unwrap();
        assert_eq!(refreshed.status, ApprovalStatus::Expired);
    }
}
