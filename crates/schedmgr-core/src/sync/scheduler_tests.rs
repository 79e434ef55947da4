//! Tests for the automatic sync loop. Time is paused, so sleeps advance the
//! clock instantly once every task is idle.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono_tz::Tz;
    use tokio::sync::Notify;

    use crate::storage::{EventStore, MemoryStore, SyncConfig};
    use crate::sync::engine::SyncEngine;
    use crate::sync::mirror::ExternalCalendar;
    use crate::sync::scheduler::*;
    use crate::sync::test_support::FakeCalendar;
    use crate::sync::types::SyncError;

    const SCHEDULE: SyncSchedule = SyncSchedule {
        initial_delay: Duration::from_secs(5),
        interval: Duration::from_secs(60),
    };

    fn engine(store: Arc<MemoryStore>, fake: Option<Arc<FakeCalendar>>) -> Arc<SyncEngine> {
        let store: Arc<dyn EventStore> = store;
        let mirror = fake.map(|f| f as Arc<dyn ExternalCalendar>);
        Arc::new(SyncEngine::new(store, mirror, Tz::UTC))
    }

    async fn advance(secs: u64) {
        tokio::time::sleep(Duration::from_secs(secs)).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[test]
    fn test_schedule_from_config() {
        let config = SyncConfig {
            initial_delay_secs: 2,
            interval_secs: 0,
            ..Default::default()
        };
        let schedule = SyncSchedule::from(&config);
        assert_eq!(schedule.initial_delay, Duration::from_secs(2));
        assert_eq!(schedule.interval, Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_round_waits_for_initial_delay() {
        let fake = FakeCalendar::new();
        let engine = engine(Arc::new(MemoryStore::new()), Some(fake.clone()));
        let auto = AutoSync::spawn(Arc::clone(&engine), SCHEDULE).unwrap();

        advance(4).await;
        assert_eq!(fake.pulls(), 0);

        advance(2).await;
        assert_eq!(fake.pulls(), 1);
        assert!(engine.status().last_sync_at.is_some());

        advance(60).await;
        assert_eq!(fake.pulls(), 2);

        auto.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_tick_is_skipped() {
        let gate = Arc::new(Notify::new());
        let fake = FakeCalendar::gated(Arc::clone(&gate));
        let engine = engine(Arc::new(MemoryStore::new()), Some(fake.clone()));
        let _auto = AutoSync::spawn(Arc::clone(&engine), SCHEDULE).unwrap();

        advance(6).await;
        assert_eq!(fake.pulls(), 1);
        assert!(engine.status().in_progress);
        assert!(matches!(engine.sync_once().await, Err(SyncError::InFlight)));

        // Tick at 65s finds the first round still blocked.
        advance(60).await;
        assert_eq!(fake.pulls(), 1);

        gate.notify_one();
        advance(0).await;
        assert!(!engine.status().in_progress);

        advance(60).await;
        assert_eq!(fake.pulls(), 2);
        gate.notify_one();
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_pending_delay() {
        let fake = FakeCalendar::new();
        let engine = engine(Arc::new(MemoryStore::new()), Some(fake.clone()));
        let auto = AutoSync::spawn(engine, SCHEDULE).unwrap();

        advance(1).await;
        auto.shutdown();
        advance(600).await;
        assert_eq!(fake.pulls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_round_completes_after_shutdown() {
        let gate = Arc::new(Notify::new());
        let fake = FakeCalendar::gated(Arc::clone(&gate));
        let engine = engine(Arc::new(MemoryStore::new()), Some(fake.clone()));
        let auto = AutoSync::spawn(Arc::clone(&engine), SCHEDULE).unwrap();

        advance(6).await;
        assert_eq!(fake.pulls(), 1);
        auto.shutdown();

        gate.notify_one();
        advance(0).await;
        assert!(engine.status().last_sync_at.is_some());

        advance(600).await;
        assert_eq!(fake.pulls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_rounds_stay_silent_and_loop_continues() {
        let fake = FakeCalendar::new();
        fake.fail_pull.store(true, std::sync::atomic::Ordering::SeqCst);
        let engine = engine(Arc::new(MemoryStore::new()), Some(fake.clone()));
        let auto = AutoSync::spawn(Arc::clone(&engine), SCHEDULE).unwrap();

        advance(66).await;
        assert_eq!(fake.pulls(), 2);
        assert!(engine.status().last_sync_at.is_none());
        assert!(!auto.is_finished());
    }

    #[tokio::test]
    async fn test_inert_without_endpoint_or_store() {
        let unconfigured = engine(Arc::new(MemoryStore::new()), None);
        assert!(AutoSync::spawn(unconfigured, SCHEDULE).is_none());

        let store = Arc::new(MemoryStore::new());
        store.set_connected(false);
        let disconnected = engine(store, Some(FakeCalendar::new()));
        assert!(AutoSync::spawn(disconnected, SCHEDULE).is_none());
    }
}
