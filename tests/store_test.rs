mod helpers;

use std::sync::Arc;
use std::thread;

use chrono::Utc;
use helpers::{chunk, memory_store, unit};
use hindsight::embedding::EMBEDDING_DIM;
use hindsight::knowledge::{CandidateFilter, ChunkType, ProjectScope, UpsertOutcome};
use hindsight::KnowledgeError;

fn project(name: &str) -> CandidateFilter {
    CandidateFilter::new(ProjectScope::project(name))
}

#[test]
fn upsert_then_candidates_round_trip() {
    let store = memory_store();
    let now = Utc::now();
    for (i, chunk_type) in ChunkType::ALL.into_iter().enumerate() {
        let id = format!("chunk-{i}");
        store.upsert(&chunk(&id, chunk_type, "api", unit(i), now)).unwrap();
    }

    let set = store.get_candidates(&project("api"), now).unwrap();
    assert_eq!(set.chunks.len(), ChunkType::ALL.len());
    assert!(set.skipped.is_empty());

    for (i, chunk_type) in ChunkType::ALL.into_iter().enumerate() {
        let id = format!("chunk-{i}");
        let got = set.chunks.iter().find(|c| c.source_id == id).unwrap();
        assert_eq!(got.chunk_type, chunk_type);
        assert_eq!(got.content, format!("content of {id}"));
        assert_eq!(got.embedding.len(), EMBEDDING_DIM);
        assert_eq!(got.embedding, unit(i));
    }
}

#[test]
fn same_source_id_twice_keeps_one_chunk_with_second_content() {
    let store = memory_store();
    let now = Utc::now();

    let mut first = chunk("err-1", ChunkType::ErrorResolution, "api", unit(1), now);
    first.content = "first version".into();
    let mut second = first.clone();
    second.content = "second version".into();
    second.embedding = unit(2);

    assert_eq!(store.upsert(&first).unwrap(), UpsertOutcome::Inserted);
    assert_eq!(store.upsert(&second).unwrap(), UpsertOutcome::Updated);

    let set = store.get_candidates(&project("api"), now).unwrap();
    assert_eq!(set.chunks.len(), 1);
    assert_eq!(set.chunks[0].content, "second version");
    assert_eq!(set.chunks[0].embedding, unit(2));
}

#[test]
fn reads_are_scoped_to_one_project_unless_asked() {
    let store = memory_store();
    let now = Utc::now();
    store.upsert(&chunk("a", ChunkType::TaskOutcome, "api", unit(1), now)).unwrap();
    store.upsert(&chunk("b", ChunkType::TaskOutcome, "web", unit(2), now)).unwrap();

    let api = store.get_candidates(&project("api"), now).unwrap();
    assert_eq!(api.chunks.len(), 1);
    assert_eq!(api.chunks[0].source_id, "a");

    let all = store
        .get_candidates(&CandidateFilter::new(ProjectScope::AllProjects), now)
        .unwrap();
    assert_eq!(all.chunks.len(), 2);
}

#[test]
fn reingest_can_move_a_chunk_between_projects() {
    let store = memory_store();
    let now = Utc::now();
    store.upsert(&chunk("a", ChunkType::TaskOutcome, "api", unit(1), now)).unwrap();
    store.upsert(&chunk("a", ChunkType::TaskOutcome, "web", unit(1), now)).unwrap();

    assert!(store.get_candidates(&project("api"), now).unwrap().chunks.is_empty());
    assert_eq!(store.get_candidates(&project("web"), now).unwrap().chunks.len(), 1);
}

#[test]
fn concurrent_upserts_lose_nothing() {
    let store = Arc::new(memory_store());
    let now = Utc::now();

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for i in 0..25 {
                    let id = format!("t{t}-{i}");
                    store
                        .upsert(&chunk(&id, ChunkType::Conversation, "api", unit(i), now))
                        .unwrap();
                    // Every thread also rewrites one shared key.
                    store
                        .upsert(&chunk("shared", ChunkType::Conversation, "api", unit(t), now))
                        .unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let counts = store.count_chunks(Some("api")).unwrap();
    assert_eq!(counts[&ChunkType::Conversation], 101);
    let shared = store.get("shared").unwrap().unwrap();
    assert_eq!(shared.embedding.len(), EMBEDDING_DIM);
}

#[test]
fn malformed_source_ids_are_validation_errors() {
    let store = memory_store();
    let now = Utc::now();
    for bad in ["", " lead", "trail ", "tab\there"] {
        let err = store
            .upsert(&chunk(bad, ChunkType::Conversation, "api", unit(1), now))
            .unwrap_err();
        assert!(matches!(err, KnowledgeError::Validation(_)), "{bad:?}");
        assert!(!err.is_retryable());
    }
}

#[test]
fn closed_store_rejects_everything() {
    let store = memory_store();
    store.close().unwrap();

    let now = Utc::now();
    assert!(matches!(
        store.get_candidates(&project("api"), now),
        Err(KnowledgeError::Closed)
    ));
    assert!(matches!(store.prune(now), Err(KnowledgeError::Closed)));
    assert!(matches!(store.delete("x"), Err(KnowledgeError::Closed)));
}
