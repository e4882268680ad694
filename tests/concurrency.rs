use std::sync::Arc;

use futures::future::join_all;
use ulid::Ulid;

use slotbook::notify::NotifyHub;
use slotbook::{ConflictError, Engine, EngineConfig, EngineError, ErrorKind, Ms, Span};

const H: Ms = 3_600_000;
/// 2100-01-01T00:00:00Z
const T0: Ms = 4_102_444_800_000;

// ── Test infrastructure ──────────────────────────────────────

fn start_engine(name: &str) -> Arc<Engine> {
    let dir = std::env::temp_dir().join(format!("slotbook_int_test_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    let config = EngineConfig::with_journal(dir.join(name));
    Arc::new(Engine::new(config, Arc::new(NotifyHub::new())).unwrap())
}

async fn assert_no_overlaps(engine: &Engine) {
    let slots = engine.all_slots().await;
    for pair in slots.windows(2) {
        // all_slots is in timeline order, so checking neighbours is enough
        assert!(
            pair[0].span.end <= pair[1].span.start,
            "overlap between {} and {}",
            pair[0].id,
            pair[1].id
        );
    }
}

// ── Tests ────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_overlapping_creates_admit_exactly_one() {
    let engine = start_engine("race.wal");

    let a = {
        let engine = engine.clone();
        tokio::spawn(async move {
            engine
                .create_booking(Ulid::new(), vec![Span::new(T0 + 12 * H, T0 + 13 * H)])
                .await
        })
    };
    let b = {
        let engine = engine.clone();
        tokio::spawn(async move {
            engine
                .create_booking(
                    Ulid::new(),
                    vec![Span::new(T0 + 12 * H + H / 2, T0 + 13 * H + H / 2)],
                )
                .await
        })
    };

    let results = [a.await.unwrap(), b.await.unwrap()];
    let ok = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(ok, 1, "exactly one create must win: {results:?}");
    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        assert!(
            matches!(
                err.kind(),
                ErrorKind::ConflictAgainstExisting | ErrorKind::TransientStore
            ),
            "unexpected loser error: {err}"
        );
    }
    assert_eq!(engine.slot_count().await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn many_writers_on_one_hour_one_wins() {
    let engine = start_engine("pileup.wal");

    let attempts = (0..32).map(|i| {
        let engine = engine.clone();
        // Every candidate covers T0+10h..T0+10h+1min at least.
        let start = T0 + 10 * H - (i as Ms) * 60_000;
        async move {
            engine
                .create_booking(Ulid::new(), vec![Span::new(start, start + H)])
                .await
        }
    });
    let results = join_all(attempts).await;

    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    assert!(results.iter().all(|r| match r {
        Ok(_) => true,
        Err(EngineError::Conflict(ConflictError::AgainstExisting { .. })) => true,
        Err(e) => e.is_retryable(),
    }));
    assert_no_overlaps(&engine).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn mixed_concurrent_workload_keeps_timeline_disjoint() {
    let engine = start_engine("mixed.wal");
    let n_tasks = 8;
    let n_per_task = 40;

    let mut handles = Vec::new();
    for t in 0..n_tasks {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            let owner = Ulid::new();
            let mut mine = Vec::new();
            for j in 0..n_per_task {
                // Tasks share a 48-hour range with staggered offsets so they collide often.
                let start = T0 + ((j * 7 + t * 5) % 48) as Ms * H + (t as Ms) * 600_000;
                let span = Span::new(start, start + H);
                match j % 4 {
                    0 | 1 => {
                        if let Ok(b) = engine.create_booking(owner, vec![span]).await {
                            mine.push(b);
                        }
                    }
                    2 => {
                        if let Some(b) = mine.last() {
                            let _ = engine.add_slot(b.id, owner, span).await;
                        }
                    }
                    _ => {
                        if let Some(b) = mine.first() {
                            let _ = engine
                                .update_slot(b.id, owner, b.slots[0].id, span)
                                .await;
                        }
                    }
                }
            }
            if let Some(b) = mine.pop() {
                engine.delete_booking(b.id, owner).await.unwrap();
            }
        }));
    }
    for h in handles {
        h.await.unwrap();
    }

    assert_no_overlaps(&engine).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancelled_creates_commit_fully_or_not_at_all() {
    let engine = start_engine("cancel.wal");

    for i in 0..16 {
        let owner = Ulid::new();
        let spans = vec![
            Span::new(T0 + (2 * i) * H, T0 + (2 * i + 1) * H),
            Span::new(T0 + (2 * i + 1) * H, T0 + (2 * i + 2) * H),
        ];
        // Drop the future at whatever point it reached.
        let fut = engine.create_booking(owner, spans);
        let _ = tokio::time::timeout(std::time::Duration::from_micros(i as u64 * 10), fut).await;

        let bookings = engine.list_bookings_of(owner).await;
        match bookings.as_slice() {
            [] => {}
            [b] => assert_eq!(b.slots.len(), 2),
            more => panic!("{} bookings from one create", more.len()),
        }
    }
    let total: usize = engine.slot_count().await;
    assert_eq!(total % 2, 0);
    assert_no_overlaps(&engine).await;
}
