mod helpers;

use chrono::Utc;
use helpers::{chunk, days_ago, memory_store, unit};
use hindsight::knowledge::{CandidateFilter, ChunkType, ProjectScope};

#[test]
fn conversation_older_than_30_days_is_pruned() {
    let store = memory_store();
    let now = Utc::now();
    store
        .upsert(&chunk("old-chat", ChunkType::Conversation, "api", unit(1), days_ago(now, 31)))
        .unwrap();

    let report = store.prune(now).unwrap();
    assert_eq!(report.removed, 1);
    assert_eq!(report.by_type[&ChunkType::Conversation], 1);
    assert!(store.get("old-chat").unwrap().is_none());
}

#[test]
fn error_resolution_is_never_pruned() {
    let store = memory_store();
    let now = Utc::now();
    store
        .upsert(&chunk("ancient-fix", ChunkType::ErrorResolution, "api", unit(1), days_ago(now, 3650)))
        .unwrap();

    let report = store.prune(now).unwrap();
    assert_eq!(report.removed, 0);
    assert!(store.get("ancient-fix").unwrap().is_some());
}

#[test]
fn each_type_follows_its_retention_window() {
    let store = memory_store();
    let now = Utc::now();
    let cases = [
        ("task-89", ChunkType::TaskOutcome, 89, true),
        ("task-91", ChunkType::TaskOutcome, 91, false),
        ("directive-89", ChunkType::DirectiveSummary, 89, true),
        ("directive-91", ChunkType::DirectiveSummary, 91, false),
        ("chat-29", ChunkType::Conversation, 29, true),
        ("code-29", ChunkType::CodeChange, 29, true),
        ("code-31", ChunkType::CodeChange, 31, false),
        ("fix-400", ChunkType::ErrorResolution, 400, true),
    ];
    for (id, chunk_type, age, _) in cases {
        store
            .upsert(&chunk(id, chunk_type, "api", unit(1), days_ago(now, age)))
            .unwrap();
    }

    let report = store.prune(now).unwrap();
    assert_eq!(report.removed, 3);

    for (id, _, _, kept) in cases {
        assert_eq!(store.get(id).unwrap().is_some(), kept, "{id}");
    }
}

#[test]
fn prune_is_idempotent() {
    let store = memory_store();
    let now = Utc::now();
    store
        .upsert(&chunk("old", ChunkType::CodeChange, "api", unit(1), days_ago(now, 60)))
        .unwrap();

    assert_eq!(store.prune(now).unwrap().removed, 1);
    assert_eq!(store.prune(now).unwrap().removed, 0);
}

#[test]
fn candidates_hide_expired_chunks_before_prune_runs() {
    let store = memory_store();
    let now = Utc::now();
    store
        .upsert(&chunk("stale", ChunkType::Conversation, "api", unit(1), days_ago(now, 40)))
        .unwrap();
    store
        .upsert(&chunk("fresh", ChunkType::Conversation, "api", unit(2), days_ago(now, 1)))
        .unwrap();

    let set = store
        .get_candidates(&CandidateFilter::new(ProjectScope::project("api")), now)
        .unwrap();
    let ids: Vec<_> = set.chunks.iter().map(|c| c.source_id.as_str()).collect();
    assert_eq!(ids, vec!["fresh"]);
}
