//! Concurrency and expiry properties of the lifecycle engine.

mod common;

use burnbox::clock::ManualClock;
use burnbox::config::SecretsConfig;
use burnbox::lifecycle::code::ALPHABET;
use burnbox::lifecycle::{Ciphertext, Lifecycle, Retrieval};
use burnbox::store::{AttachOutcome, InMemoryStore};
use common::{sealed_body, CountingStore};
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

const RACERS: usize = 64;

fn engine() -> (Arc<Lifecycle>, Arc<ManualClock>) {
    let clock = ManualClock::shared();
    let store = Arc::new(InMemoryStore::new(clock.clone()));
    let engine = Arc::new(Lifecycle::new(store, SecretsConfig::default()));
    (engine, clock)
}

fn blob(payload: &[u8]) -> Ciphertext {
    Ciphertext::parse(&sealed_body(payload)).unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_attach_has_one_winner() {
    let (engine, _) = engine();
    let code = engine.request_new_code().await.unwrap().to_string();

    let tasks = (0..RACERS).map(|i| {
        let engine = engine.clone();
        let code = code.clone();
        tokio::spawn(async move {
            let sealed = blob(format!("racer-{i}").as_bytes());
            let outcome = engine.attach_secret(&code, &sealed).await.unwrap();
            (outcome, sealed.as_str().to_string())
        })
    });
    let results: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(Result::unwrap)
        .collect();

    let winners: Vec<_> = results
        .iter()
        .filter(|(outcome, _)| *outcome == AttachOutcome::Attached)
        .collect();
    assert_eq!(winners.len(), 1);
    assert!(results
        .iter()
        .filter(|(outcome, _)| *outcome != AttachOutcome::Attached)
        .all(|(outcome, _)| *outcome == AttachOutcome::Conflict));

    // The stored value is the winner's
    assert_eq!(
        engine.retrieve_secret(&code).await.unwrap(),
        Retrieval::Secret(winners[0].1.clone())
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_retrieve_has_one_winner() {
    let (engine, _) = engine();
    let code = engine.request_new_code().await.unwrap().to_string();
    let secret = blob(b"only once");
    engine.attach_secret(&code, &secret).await.unwrap();

    let tasks = (0..RACERS).map(|_| {
        let engine = engine.clone();
        let code = code.clone();
        tokio::spawn(async move { engine.retrieve_secret(&code).await.unwrap() })
    });
    let results: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(Result::unwrap)
        .collect();

    let found: Vec<_> = results
        .iter()
        .filter(|r| matches!(r, Retrieval::Secret(_)))
        .collect();
    assert_eq!(found.len(), 1);
    assert_eq!(*found[0], Retrieval::Secret(secret.as_str().to_string()));
    assert_eq!(
        results.iter().filter(|r| **r == Retrieval::NotFound).count(),
        RACERS - 1
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_reservations_are_unique() {
    let (engine, _) = engine();

    let tasks = (0..256).map(|_| {
        let engine = engine.clone();
        tokio::spawn(async move { engine.request_new_code().await.unwrap() })
    });
    let codes: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(Result::unwrap)
        .collect();

    let distinct: HashSet<_> = codes.iter().map(|c| c.as_str().to_string()).collect();
    assert_eq!(distinct.len(), codes.len());
    for code in &codes {
        assert_eq!(code.as_str().len(), 8);
        assert!(code.as_str().bytes().all(|b| ALPHABET.contains(&b)));
    }
}

#[tokio::test]
async fn test_reservation_expires_for_attach_and_retrieve() {
    let (engine, clock) = engine();
    let code = engine.request_new_code().await.unwrap().to_string();

    clock.advance(Duration::from_secs(30 * 60));

    assert_eq!(
        engine.attach_secret(&code, &blob(b"late")).await.unwrap(),
        AttachOutcome::NotFound
    );
    assert_eq!(
        engine.retrieve_secret(&code).await.unwrap(),
        Retrieval::NotFound
    );
}

#[tokio::test]
async fn test_populated_secret_expires() {
    let (engine, clock) = engine();
    let code = engine.request_new_code().await.unwrap().to_string();
    engine.attach_secret(&code, &blob(b"x")).await.unwrap();

    clock.advance(Duration::from_secs(24 * 60 * 60 - 1));
    clock.advance(Duration::from_secs(1));

    assert_eq!(
        engine.retrieve_secret(&code).await.unwrap(),
        Retrieval::NotFound
    );
    // Populated codes never return to reserved-empty
    assert_eq!(
        engine.attach_secret(&code, &blob(b"y")).await.unwrap(),
        AttachOutcome::NotFound
    );
}

#[tokio::test]
async fn test_attach_on_populated_keeps_original() {
    let (engine, _) = engine();
    let code = engine.request_new_code().await.unwrap().to_string();
    let original = blob(b"original");

    engine.attach_secret(&code, &original).await.unwrap();
    for i in 0..5 {
        let other = blob(format!("other-{i}").as_bytes());
        assert_eq!(
            engine.attach_secret(&code, &other).await.unwrap(),
            AttachOutcome::Conflict
        );
    }
    assert_eq!(
        engine.retrieve_secret(&code).await.unwrap(),
        Retrieval::Secret(original.as_str().to_string())
    );
}

#[tokio::test]
async fn test_malformed_codes_skip_the_store() {
    let store = Arc::new(CountingStore::new(ManualClock::shared()));
    let engine = Lifecycle::new(store.clone(), SecretsConfig::default());

    for code in ["", "short", "waytoolongcode", "Ab3dEf0h", "Ab3d/f9h"] {
        assert_eq!(
            engine.attach_secret(code, &blob(b"x")).await.unwrap(),
            AttachOutcome::NotFound
        );
        assert_eq!(
            engine.retrieve_secret(code).await.unwrap(),
            Retrieval::NotFound
        );
    }
    assert_eq!(store.calls(), 0);
}

#[tokio::test]
async fn test_retrieve_destroys_empty_reservation() {
    let (engine, _) = engine();
    let code = engine.request_new_code().await.unwrap().to_string();

    assert_eq!(
        engine.retrieve_secret(&code).await.unwrap(),
        Retrieval::NotFound
    );
    assert_eq!(
        engine.attach_secret(&code, &blob(b"too late")).await.unwrap(),
        AttachOutcome::NotFound
    );
}
