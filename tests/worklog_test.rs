//! Backend contract tests for the worklog.
//!
//! Every backend must satisfy the same contract; each check runs against
//! the in-memory and SQLite implementations.

use chrono::{DateTime, Duration, Utc};
use taskq::ident::Ident;
use taskq::worklog::{Criteria, Entry, MemoryWorklog, SqliteWorklog, State, Worklog};
use taskq::Error;

fn backends() -> Vec<(&'static str, Box<dyn Worklog>)> {
    vec![
        ("memory", Box::new(MemoryWorklog::new())),
        (
            "sqlite",
            Box::new(SqliteWorklog::in_memory().expect("open sqlite")),
        ),
    ]
}

fn entry(id: Ident, state: State, created: DateTime<Utc>) -> Entry {
    Entry::new(id, "test://tasks/contract", state, created)
}

#[tokio::test]
async fn create_entry_conflicts_once_a_task_exists() {
    for (name, log) in backends() {
        let id = Ident::new();
        let first = entry(id, State::Pending, Utc::now());
        log.create_entry(&first).await.unwrap_or_else(|e| panic!("{name}: {e}"));

        let again = entry(id, State::Pending, Utc::now()).task_seq(1);
        assert!(
            matches!(log.create_entry(&again).await, Err(Error::Conflict(_))),
            "{name}: second create must conflict"
        );
    }
}

#[tokio::test]
async fn store_entry_enforces_sequence_uniqueness() {
    for (name, log) in backends() {
        let id = Ident::new();
        let first = entry(id, State::Pending, Utc::now());
        log.store_entry(&first).await.unwrap();

        let dup = entry(id, State::Running, Utc::now());
        assert!(
            matches!(log.store_entry(&dup).await, Err(Error::Conflict(_))),
            "{name}: duplicate (task, seq) must conflict"
        );

        let next = first.next(State::Running, Vec::new());
        log.store_entry(&next).await.unwrap_or_else(|e| panic!("{name}: {e}"));
    }
}

#[tokio::test]
async fn fetch_latest_returns_the_highest_sequence() {
    for (name, log) in backends() {
        let id = Ident::new();
        let first = entry(id, State::Pending, Utc::now());
        let second = first.next(State::Running, b"attempt".to_vec());
        let third = second.next(State::Complete, Vec::new());
        for e in [&first, &second, &third] {
            log.store_entry(e).await.unwrap();
        }

        let latest = log.fetch_latest_entry_for_task(id).await.unwrap();
        assert_eq!(latest.task_seq, 2, "{name}");
        assert_eq!(latest.state, State::Complete, "{name}");

        let fetched = log.fetch_entry(id, 1).await.unwrap();
        assert_eq!(fetched.state, State::Running, "{name}");
        assert_eq!(fetched.data, b"attempt", "{name}");

        assert!(
            matches!(log.fetch_entry(id, 9).await, Err(Error::NotFound(_))),
            "{name}"
        );
        assert!(
            matches!(
                log.fetch_latest_entry_for_task(Ident::new()).await,
                Err(Error::NotFound(_))
            ),
            "{name}"
        );
    }
}

#[tokio::test]
async fn persisted_sequences_honor_the_transition_rules() {
    // task_seq strictly increases; state_seq increments exactly on change
    for (name, log) in backends() {
        let id = Ident::new();
        let mut current = entry(id, State::Pending, Utc::now());
        log.store_entry(&current).await.unwrap();

        for state in [State::Running, State::Running, State::Failed] {
            current = current.next(state, Vec::new());
            log.store_entry(&current).await.unwrap();
        }

        let mut prev: Option<Entry> = None;
        for seq in 0..4 {
            let e = log.fetch_entry(id, seq).await.unwrap();
            if let Some(prev) = &prev {
                assert!(e.task_seq > prev.task_seq, "{name}");
                assert!(e.state_seq >= prev.state_seq, "{name}");
                assert_eq!(
                    e.state_seq > prev.state_seq,
                    e.state != prev.state,
                    "{name}: state_seq moves exactly when state does"
                );
            }
            prev = Some(e);
        }
    }
}

#[tokio::test]
async fn renew_extends_the_lease_atomically() {
    for (name, log) in backends() {
        let id = Ident::new();
        let running = entry(id, State::Running, Utc::now());
        log.store_entry(&running).await.unwrap();

        let expires = Utc::now() + Duration::minutes(5);
        let renewed = log.renew_entry(&running, expires).await.unwrap();
        assert_eq!(renewed.task_seq, running.task_seq, "{name}");
        let got = renewed.expires.expect("expires set");
        assert!((got - expires).num_seconds().abs() < 1, "{name}");

        let fetched = log.fetch_entry(id, 0).await.unwrap();
        assert!(fetched.expires.is_some(), "{name}");

        let ghost = entry(Ident::new(), State::Running, Utc::now());
        assert!(
            matches!(
                log.renew_entry(&ghost, expires).await,
                Err(Error::NotFound(_))
            ),
            "{name}"
        );
    }
}

#[tokio::test]
async fn an_expired_running_entry_is_no_longer_valid() {
    for (name, log) in backends() {
        let now = Utc::now();
        let id = Ident::new();
        let running = entry(id, State::Running, now).expires(now + Duration::minutes(1));
        log.store_entry(&running).await.unwrap();

        let latest = log.fetch_latest_entry_for_task(id).await.unwrap();
        assert!(latest.valid(now), "{name}: inside the lease");
        assert!(
            !latest.valid(now + Duration::minutes(2)),
            "{name}: after the lease lapses"
        );
    }
}

#[tokio::test]
async fn iteration_yields_the_latest_entry_per_task_with_criteria() {
    for (name, log) in backends() {
        let now = Utc::now();
        let epoch = now - Duration::days(1);

        let done = Ident::new();
        log.store_entry(&entry(done, State::Pending, now)).await.unwrap();
        log.store_entry(&entry(done, State::Complete, now).task_seq(1).state_seq(1))
            .await
            .unwrap();

        let running = Ident::new();
        log.store_entry(
            &entry(running, State::Running, now).expires(now + Duration::minutes(5)),
        )
        .await
        .unwrap();

        let expired = Ident::new();
        log.store_entry(
            &entry(expired, State::Running, now).expires(now - Duration::minutes(5)),
        )
        .await
        .unwrap();

        let all: Vec<_> = log
            .iter_latest_entry_for_every_task(Criteria::default(), epoch)
            .await
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(all.len(), 3, "{name}: one latest entry per task");
        assert!(
            all.iter().all(|e| !(e.task_id == done && e.state != State::Complete)),
            "{name}: superseded entries are not yielded"
        );

        let resolved: Vec<_> = log
            .iter_latest_entry_for_every_task(
                Criteria {
                    resolved: true,
                    ..Criteria::default()
                },
                epoch,
            )
            .await
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(resolved.len(), 1, "{name}");
        assert_eq!(resolved[0].task_id, done, "{name}");

        let lapsed: Vec<_> = log
            .iter_latest_entry_for_every_task(
                Criteria {
                    expired: true,
                    ..Criteria::default()
                },
                epoch,
            )
            .await
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(lapsed.len(), 1, "{name}");
        assert_eq!(lapsed[0].task_id, expired, "{name}");

        let by_state: Vec<_> = log
            .iter_latest_entry_for_every_task(
                Criteria {
                    states: vec![State::Running],
                    ..Criteria::default()
                },
                epoch,
            )
            .await
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(by_state.len(), 2, "{name}: both running tasks");

        let future: Vec<_> = log
            .iter_latest_entry_for_every_task(Criteria::default(), now + Duration::hours(1))
            .await
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert!(future.is_empty(), "{name}: nothing created after `since`");
    }
}

#[tokio::test]
async fn delete_task_removes_all_entries_idempotently() {
    for (name, log) in backends() {
        let id = Ident::new();
        let first = entry(id, State::Pending, Utc::now());
        log.store_entry(&first).await.unwrap();
        log.store_entry(&first.next(State::Running, Vec::new())).await.unwrap();

        log.delete_task(id).await.unwrap();
        assert!(
            matches!(
                log.fetch_latest_entry_for_task(id).await,
                Err(Error::NotFound(_))
            ),
            "{name}"
        );
        // deleting again is not an error
        log.delete_task(id).await.unwrap_or_else(|e| panic!("{name}: {e}"));
    }
}

#[tokio::test]
async fn sqlite_round_trips_every_field() {
    let log = SqliteWorklog::in_memory().unwrap();
    let id = Ident::new();

    let mut triggers = taskq::worklog::Triggers::new();
    triggers.add(State::Complete, ["next://one"]);
    let attrs: taskq::attrs::Attributes = [("tier", "gold")].into_iter().collect();

    let stored = Entry::new(id, "test://tasks/full?q=1", State::Failed, Utc::now())
        .data(b"\x00\x01binary".to_vec())
        .attrs(attrs.clone())
        .triggers(triggers.clone())
        .retry(true)
        .error(serde_json::json!({"message": "boom"}))
        .expires(Utc::now() + Duration::minutes(3));
    log.store_entry(&stored).await.unwrap();

    let got = log.fetch_entry(id, 0).await.unwrap();
    assert_eq!(got.utd, "test://tasks/full?q=1");
    assert_eq!(got.state, State::Failed);
    assert_eq!(got.data, b"\x00\x01binary");
    assert_eq!(got.attrs, attrs);
    assert_eq!(got.triggers, triggers);
    assert!(got.retry);
    assert_eq!(got.error.unwrap()["message"], "boom");
    assert!(got.expires.is_some());
}
