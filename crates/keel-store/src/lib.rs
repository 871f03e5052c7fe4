//! # keel-store
//!
//! Content-addressable artifact storage and the idempotency cache for the
//! KEEL runtime.
//!
//! ## Overview
//!
//! - [`ArtifactStore`] implements
//!   [`ArtifactSink`](keel_core::traits::ArtifactSink). Ids are
//!   `{kind}_{hash}` over the key-sorted JSON of the content, so storing the
//!   same payload twice is free and returns the same id.
//! - [`IdempotencyCache`] deduplicates repeated invocations of one logical
//!   unit of work within a (session, turn).
//!
//! Both are constructed once by the composition root and shared via `Arc`.

pub mod artifact;
pub mod hash;
pub mod idempotency;

pub use artifact::ArtifactStore;
pub use hash::{artifact_id, canonicalize, content_hash};
pub use idempotency::{CachedAnswer, IdempotencyCache, IdempotencyKey};

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;

    use keel_contracts::ids::{SessionId, TurnId};
    use keel_core::traits::ArtifactSink;

    use super::{content_hash, ArtifactStore, IdempotencyCache, IdempotencyKey};

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn session(name: &str) -> SessionId {
        SessionId::from(name)
    }

    fn key(session_id: &str, turn: &str, step: &str) -> IdempotencyKey {
        IdempotencyKey::new(SessionId::from(session_id), TurnId::from(turn), step)
    }

    // ── Hashing ───────────────────────────────────────────────────────────────

    /// Key order does not change the hash, at any depth.
    #[test]
    fn test_hash_is_order_independent() {
        let a: serde_json::Value =
            serde_json::from_str(r#"{"b":1,"a":{"y":[1,2],"x":null}}"#).unwrap();
        let b: serde_json::Value =
            serde_json::from_str(r#"{"a":{"x":null,"y":[1,2]},"b":1}"#).unwrap();

        assert_eq!(content_hash(&a).unwrap(), content_hash(&b).unwrap());
    }

    #[test]
    fn test_hash_is_short_hex() {
        let digest = content_hash(&json!({ "stars": 42 })).unwrap();
        assert_eq!(digest.len(), 16);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_array_order_matters() {
        assert_ne!(
            content_hash(&json!([1, 2])).unwrap(),
            content_hash(&json!([2, 1])).unwrap()
        );
    }

    // ── Artifact store ────────────────────────────────────────────────────────

    /// Identical content under the same kind yields the same id.
    #[test]
    fn test_same_content_same_id() {
        let store = ArtifactStore::new();
        let s = session("s1");
        let content = json!({ "repo": "a/b", "stars": 10 });

        let first = store.persist(&s, None, "fetch", &content).unwrap();
        let second = store.persist(&s, None, "fetch", &content).unwrap();

        assert_eq!(first, second);
        assert!(first.as_str().starts_with("fetch_"));
        assert_eq!(store.len(), 1);
        assert_eq!(store.get_by_session(&s).unwrap().len(), 1);
    }

    #[test]
    fn test_different_content_different_id() {
        let store = ArtifactStore::new();
        let s = session("s1");

        let a = store.persist(&s, None, "fetch", &json!({ "stars": 1 })).unwrap();
        let b = store.persist(&s, None, "fetch", &json!({ "stars": 2 })).unwrap();

        assert_ne!(a, b);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_same_content_different_kind() {
        let store = ArtifactStore::new();
        let s = session("s1");
        let content = json!({ "x": 1 });

        let a = store.persist(&s, None, "fetch", &content).unwrap();
        let b = store.persist(&s, None, "score", &content).unwrap();

        assert_ne!(a, b);
    }

    /// `get_by_kind` returns only the given session's artifacts of that kind.
    #[test]
    fn test_get_by_kind_is_session_scoped() {
        let store = ArtifactStore::new();
        let (s1, s2) = (session("s1"), session("s2"));

        store.persist(&s1, None, "fetch", &json!({ "n": 1 })).unwrap();
        store.persist(&s1, None, "fetch", &json!({ "n": 2 })).unwrap();
        store.persist(&s1, None, "score", &json!({ "n": 3 })).unwrap();
        store.persist(&s2, None, "fetch", &json!({ "n": 4 })).unwrap();

        let fetched = store.get_by_kind(&s1, "fetch").unwrap();
        assert_eq!(fetched.len(), 2);
        assert!(fetched.iter().all(|a| a.kind == "fetch" && a.session_id == s1));
        assert_eq!(fetched[0].content, json!({ "n": 1 }));

        assert_eq!(store.get_by_kind(&s2, "fetch").unwrap().len(), 1);
        assert!(store.get_by_kind(&s2, "score").unwrap().is_empty());
        assert!(store.get_by_kind(&session("nobody"), "fetch").unwrap().is_empty());
    }

    #[test]
    fn test_get_by_id_and_turn_tag() {
        let store = ArtifactStore::new();
        let turn = TurnId::from("t7");
        let artifact = store
            .store(&session("s"), Some(&turn), "summary", &json!({ "text": "hi" }))
            .unwrap();

        let loaded = store.get(&artifact.id).unwrap().unwrap();
        assert_eq!(loaded.turn_id, Some(turn));
        assert_eq!(loaded.content, json!({ "text": "hi" }));
        assert!(store.get(&keel_contracts::ids::ArtifactId::from("nope_0")).unwrap().is_none());
    }

    /// With a session cap, the oldest artifacts fall out of that session.
    #[test]
    fn test_session_cap_evicts_oldest() {
        let store = ArtifactStore::with_session_cap(2);
        let s = session("s");

        for n in 0..4 {
            store.persist(&s, None, "fetch", &json!({ "n": n })).unwrap();
        }

        let kept: Vec<serde_json::Value> =
            store.get_by_session(&s).unwrap().into_iter().map(|a| a.content).collect();
        assert_eq!(kept, vec![json!({ "n": 2 }), json!({ "n": 3 })]);
        assert_eq!(store.len(), 2);
    }

    /// An artifact still referenced by another session survives eviction.
    #[test]
    fn test_session_cap_keeps_shared_artifacts() {
        let store = ArtifactStore::with_session_cap(1);
        let shared = json!({ "shared": true });

        let id = store.persist(&session("a"), None, "k", &shared).unwrap();
        store.persist(&session("b"), None, "k", &shared).unwrap();
        store.persist(&session("a"), None, "k", &json!({ "other": 1 })).unwrap();

        assert!(store.get(&id).unwrap().is_some());
        assert_eq!(store.get_by_session(&session("b")).unwrap().len(), 1);
    }

    #[test]
    fn test_concurrent_persist() {
        let store = Arc::new(ArtifactStore::new());
        std::thread::scope(|scope| {
            for t in 0..4 {
                let store = store.clone();
                scope.spawn(move || {
                    for n in 0..25 {
                        store
                            .persist(&SessionId::from("s"), None, "k", &json!({ "t": t, "n": n }))
                            .unwrap();
                    }
                });
            }
        });
        assert_eq!(store.len(), 100);
        assert_eq!(store.get_by_kind(&SessionId::from("s"), "k").unwrap().len(), 100);
    }

    // ── Idempotency cache ─────────────────────────────────────────────────────

    /// Store then fetch with the same key: a hit with the original answer id.
    #[test]
    fn test_hit_returns_original_answer() {
        let cache: IdempotencyCache = IdempotencyCache::new(Duration::from_secs(60), true);
        let stored = cache.put(key("s", "t1", "answer"), json!({ "text": "42" }));
        assert!(!stored.hit);

        let fetched = cache.get(&key("s", "t1", "answer")).unwrap();
        assert!(fetched.hit);
        assert_eq!(fetched.value, json!({ "text": "42" }));
        assert_eq!(fetched.answer_id, stored.answer_id);
    }

    /// A different turn under the same session misses.
    #[test]
    fn test_other_turn_misses() {
        let cache: IdempotencyCache = IdempotencyCache::new(Duration::from_secs(60), true);
        cache.put(key("s", "t1", "answer"), json!(1));

        assert!(cache.get(&key("s", "t2", "answer")).is_none());
        assert!(cache.get(&key("s", "t1", "other_step")).is_none());
        assert!(cache.get(&key("other", "t1", "answer")).is_none());
    }

    /// Disabling the cache forces every lookup to miss.
    #[test]
    fn test_disabled_cache_always_misses() {
        let cache: IdempotencyCache = IdempotencyCache::new(Duration::from_secs(60), false);
        let stored = cache.put(key("s", "t", "answer"), json!(1));

        assert!(cache.get(&key("s", "t", "answer")).is_none());
        assert!(cache.is_empty());
        assert!(!stored.answer_id.as_str().is_empty());
    }

    /// Expired entries miss and are removed on lookup.
    #[test]
    fn test_expired_entry_is_removed_lazily() {
        let cache: IdempotencyCache = IdempotencyCache::new(Duration::ZERO, true);
        cache.put(key("s", "t", "answer"), json!(1));
        assert_eq!(cache.len(), 1, "no background sweep");

        assert!(cache.get(&key("s", "t", "answer")).is_none());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_get_or_compute_runs_once() {
        let cache: IdempotencyCache<u32> = IdempotencyCache::new(Duration::from_secs(60), true);
        let mut runs = 0;

        let first = cache
            .get_or_compute(key("s", "t", "score"), || -> Result<u32, String> {
                runs += 1;
                Ok(7)
            })
            .unwrap();
        let second = cache
            .get_or_compute(key("s", "t", "score"), || -> Result<u32, String> {
                runs += 1;
                Ok(8)
            })
            .unwrap();

        assert_eq!(runs, 1);
        assert_eq!(second.value, 7);
        assert!(second.hit);
        assert_eq!(first.answer_id, second.answer_id);
    }

    #[test]
    fn test_compute_error_is_not_cached() {
        let cache: IdempotencyCache<u32> = IdempotencyCache::new(Duration::from_secs(60), true);

        let failed = cache.get_or_compute(key("s", "t", "score"), || Err::<u32, _>("model down"));
        assert_eq!(failed.unwrap_err(), "model down");
        assert!(cache.is_empty());

        let ok = cache.get_or_compute(key("s", "t", "score"), || Ok::<_, &str>(3)).unwrap();
        assert!(!ok.hit);
    }

    #[test]
    fn test_invalidate() {
        let cache: IdempotencyCache = IdempotencyCache::default();
        cache.put(key("s", "t", "answer"), json!(1));

        assert!(cache.invalidate(&key("s", "t", "answer")));
        assert!(!cache.invalidate(&key("s", "t", "answer")));
        assert!(cache.get(&key("s", "t", "answer")).is_none());
    }

    /// A TTL past the end of the clock never expires instead of overflowing.
    #[test]
    fn test_huge_ttl_never_expires() {
        let config = keel_contracts::config::RuntimeConfig::from_toml_str(
            r#"
            [idempotency]
            ttl_secs = 9223372036854775807
            "#,
        )
        .unwrap();
        let cache: IdempotencyCache = IdempotencyCache::from_config(&config.idempotency);

        let stored = cache.put(key("s", "t", "answer"), json!(1));
        let fetched = cache.get(&key("s", "t", "answer")).unwrap();
        assert!(fetched.hit);
        assert_eq!(fetched.answer_id, stored.answer_id);
    }

    /// Repeated puts mint distinct answer ids.
    #[test]
    fn test_answer_ids_are_distinct() {
        let cache: IdempotencyCache = IdempotencyCache::default();
        let a = cache.put(key("s", "t1", "answer"), json!(1));
        let b = cache.put(key("s", "t2", "answer"), json!(1));
        assert_ne!(a.answer_id, b.answer_id);
    }
}
