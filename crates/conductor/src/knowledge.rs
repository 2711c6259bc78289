//! Knowledge base: a monotonically versioned set of entries synced out
//! to rooms, plus aggregation of per-room learnings back into shared
//! knowledge, plus rendering views (markdown knowledge files, per-user
//! knowledge summaries).

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use chrono::Utc;
use uuid::Uuid;

use crate::model::{
    KnowledgeCategory, KnowledgeEntry, KnowledgeFile, KnowledgeSource, KnowledgeSyncEntry,
    KnowledgeSyncPush, RoomLearning, RoomLearningBatch, TrustMetrics, UserKnowledge,
};

const AGGREGATION_THRESHOLD: usize = 3;

pub struct KnowledgeBase {
    entries: Mutex<HashMap<Uuid, KnowledgeEntry>>,
    version: Mutex<u64>,
    room_sync_versions: Mutex<HashMap<String, u64>>,
    pending_learnings: Mutex<Vec<RoomLearning>>,
}

impl Default for KnowledgeBase {
    fn default() -> Self {
        Self::new()
    }
}

impl KnowledgeBase {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            version: Mutex::new(0),
            room_sync_versions: Mutex::new(HashMap::new()),
            pending_learnings: Mutex::new(Vec::new()),
        }
    }

    fn bump_version(&self) -> u64 {
        let mut version = self.version.lock().unwrap();
        *version += 1;
        *version
    }

    pub fn upsert(
        &self,
        category: KnowledgeCategory,
        title: impl Into<String>,
        content: impl Into<String>,
        source: KnowledgeSource,
        confidence: f64,
        tags: Vec<String>,
    ) -> KnowledgeEntry {
        let version = self.bump_version();
        let entry = KnowledgeEntry {
            id: Uuid::new_v4(),
            category,
            title: title.into(),
            content: content.into(),
            source,
            confidence: confidence.clamp(0.0, 1.0),
            tags,
            version,
            is_active: true,
            updated_at: Utc::now(),
        };
        self.entries.lock().unwrap().insert(entry.id, entry.clone());
        entry
    }

    pub fn deactivate(&self, id: Uuid) {
        let version = self.bump_version();
        if let Some(entry) = self.entries.lock().unwrap().get_mut(&id) {
            entry.is_active = false;
            entry.version = version;
            entry.updated_at = Utc::now();
        }
    }

    pub fn current_version(&self) -> u64 {
        *self.version.lock().unwrap()
    }

    /// Entries newer than `last_synced_version`, plus the ids of any
    /// entries that were deactivated since then.
    pub fn get_sync_push(&self, room_id: &str, last_synced_version: u64) -> KnowledgeSyncPush {
        let entries = self.entries.lock().unwrap();
        let current = self.current_version();

        let mut fresh = Vec::new();
        let mut removed = Vec::new();
        for entry in entries.values() {
            if entry.version <= last_synced_version {
                continue;
            }
            if entry.is_active {
                fresh.push(KnowledgeSyncEntry {
                    id: entry.id.to_string(),
                    category: format!("{:?}", entry.category).to_lowercase(),
                    title: entry.title.clone(),
                    content: entry.content.clone(),
                    source: format!("{:?}", entry.source).to_lowercase(),
                    confidence: entry.confidence,
                    tags: entry.tags.clone(),
                    version: entry.version,
                    updated_at: entry.updated_at,
                });
            } else {
                removed.push(entry.id.to_string());
            }
        }
        fresh.sort_by_key(|e| e.version);

        self.room_sync_versions
            .lock()
            .unwrap()
            .insert(room_id.to_string(), current);

        KnowledgeSyncPush {
            server_version: current,
            entries: fresh,
            removed_ids: removed,
        }
    }

    pub fn last_synced_version(&self, room_id: &str) -> u64 {
        self.room_sync_versions
            .lock()
            .unwrap()
            .get(room_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn accept_learnings(&self, batch: RoomLearningBatch) {
        self.pending_learnings.lock().unwrap().extend(batch.learnings);
    }

    /// Groups pending learnings by `(category, title)`. Any group reported
    /// by at least `AGGREGATION_THRESHOLD` distinct rooms becomes a shared
    /// knowledge entry with confidence `min(1, mean(confidence) + 0.2)`;
    /// groups below the threshold are kept as individual low-trust
    /// `RoomLearning` entries with confidence `min(0.8, mean(confidence))`.
    pub fn aggregate_learnings(&self) -> Vec<KnowledgeEntry> {
        let mut pending = self.pending_learnings.lock().unwrap();
        let mut groups: HashMap<(String, String), Vec<RoomLearning>> = HashMap::new();
        for learning in pending.drain(..) {
            groups
                .entry((learning.category.clone(), learning.title.clone()))
                .or_default()
                .push(learning);
        }

        let mut created = Vec::new();
        for ((category, title), learnings) in groups {
            let mean_confidence =
                learnings.iter().map(|l| l.confidence).sum::<f64>() / learnings.len() as f64;
            let mut tags: Vec<String> = learnings.iter().flat_map(|l| l.tags.clone()).collect();
            tags.sort();
            tags.dedup();

            let category = parse_category(&category);

            let distinct_rooms: HashSet<&str> =
                learnings.iter().map(|l| l.room_id.as_str()).collect();

            let (source, confidence, content) = if distinct_rooms.len() >= AGGREGATION_THRESHOLD {
                (
                    KnowledgeSource::Aggregated,
                    (mean_confidence + 0.2).min(1.0),
                    learnings
                        .iter()
                        .map(|l| l.content.as_str())
                        .collect::<Vec<_>>()
                        .join(" "),
                )
            } else {
                (
                    KnowledgeSource::RoomLearning,
                    mean_confidence.min(0.8),
                    learnings[0].content.clone(),
                )
            };

            created.push(self.upsert(category, title, content, source, confidence, tags));
        }
        created
    }

    pub fn render_file(&self, category: KnowledgeCategory) -> KnowledgeFile {
        let entries = self.entries.lock().unwrap();
        let mut matching: Vec<KnowledgeEntry> = entries
            .values()
            .filter(|e| e.category == category && e.is_active)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap());

        let title = format!("{category:?}");
        let mut markdown = format!("# {title}\n\n");
        for entry in &matching {
            markdown.push_str(&format!("## {}\n\n{}\n\n", entry.title, entry.content));
        }

        KnowledgeFile {
            category,
            title,
            markdown,
            last_updated: matching.iter().map(|e| e.updated_at).max(),
            entries: matching,
        }
    }

    pub fn render_user_view(&self, user_id: &str, trust: &TrustMetrics) -> UserKnowledge {
        let entries = self.entries.lock().unwrap();
        let mut matching: Vec<KnowledgeEntry> = entries
            .values()
            .filter(|e| e.category == KnowledgeCategory::User && e.is_active)
            .filter(|e| e.tags.iter().any(|t| t == user_id))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

        let success_rate = if trust.total_tasks == 0 {
            0.0
        } else {
            trust.successful_tasks as f64 / trust.total_tasks as f64
        };

        UserKnowledge {
            user_id: user_id.to_string(),
            trust_level: trust.current_trust_level,
            total_tasks: trust.total_tasks,
            success_rate,
            preferred_patterns: matching
                .iter()
                .filter(|e| e.source == KnowledgeSource::ArrangementTracker)
                .map(|e| e.title.clone())
                .collect(),
            entries: matching,
        }
    }
}

fn parse_category(raw: &str) -> KnowledgeCategory {
    match raw {
        "boundaries" => KnowledgeCategory::Boundaries,
        "patterns" => KnowledgeCategory::Patterns,
        "changelog" => KnowledgeCategory::Changelog,
        "user" => KnowledgeCategory::User,
        _ => KnowledgeCategory::Capabilities,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn learning(category: &str, title: &str, confidence: f64, room_id: &str) -> RoomLearning {
        RoomLearning {
            category: category.to_string(),
            title: title.to_string(),
            content: "observed behavior".to_string(),
            confidence,
            tags: Vec::new(),
            room_id: room_id.to_string(),
            observed_at: Utc::now(),
        }
    }

    #[test]
    fn sync_push_only_returns_newer_entries() {
        let kb = KnowledgeBase::new();
        kb.upsert(
            KnowledgeCategory::Capabilities,
            "t1",
            "c1",
            KnowledgeSource::Seed,
            0.9,
            vec![],
        );
        let push = kb.get_sync_push("room1", 0);
        assert_eq!(push.entries.len(), 1);
        let push2 = kb.get_sync_push("room1", push.server_version);
        assert_eq!(push2.entries.len(), 0);
    }

    #[test]
    fn below_threshold_learnings_stay_room_sourced() {
        let kb = KnowledgeBase::new();
        kb.accept_learnings(RoomLearningBatch {
            room_id: "r1".to_string(),
            learnings: vec![learning("patterns", "quick replies work", 0.6, "r1")],
        });
        let created = kb.aggregate_learnings();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].source, KnowledgeSource::RoomLearning);
        assert!(created[0].confidence <= 0.8);
    }

    #[test]
    fn at_threshold_learnings_aggregate() {
        let kb = KnowledgeBase::new();
        let learnings = (0..3)
            .map(|i| learning("patterns", "quick replies work", 0.7, &format!("r{i}")))
            .collect();
        kb.accept_learnings(RoomLearningBatch {
            room_id: "r0".to_string(),
            learnings,
        });
        let created = kb.aggregate_learnings();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].source, KnowledgeSource::Aggregated);
        assert!((created[0].confidence - 0.9).abs() < 1e-9);
    }
}
