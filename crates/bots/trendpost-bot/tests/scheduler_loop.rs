use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use time::macros::{datetime, time};
use tokio::sync::oneshot;
use trendpost_bot::generator::{GeneratorResult, TextGenerator};
use trendpost_bot::job::PublicationJob;
use trendpost_bot::publisher::{PublishResult, Publisher};
use trendpost_bot::run_scheduler_loop;
use trendpost_bot::schedule::{LocalTime, Schedule};
use trendpost_bot::scraper::{CandidateItem, FetchResult, SourceFetcher};
use trendpost_bot::seen::{DEFAULT_SEEN_FILE, SeenSet, SeenStore};

struct OneStory;

#[async_trait]
impl SourceFetcher for OneStory {
    async fn fetch_top(&self, _limit: usize) -> FetchResult<Vec<CandidateItem>> {
        Ok(vec![CandidateItem {
            id: "99".to_string(),
            title: "Slow story".to_string(),
            link: "https://example.com/99".to_string(),
        }])
    }
}

struct EchoGenerator;

#[async_trait]
impl TextGenerator for EchoGenerator {
    async fn try_generate(&self, title: &str, _link: &str) -> GeneratorResult<String> {
        Ok(title.to_string())
    }
}

/// Signals once publishing has started, then takes a while to finish.
struct SlowPublisher {
    started: Mutex<Option<oneshot::Sender<()>>>,
    sent: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Publisher for SlowPublisher {
    async fn publish(&self, text: &str) -> PublishResult<()> {
        if let Some(started) = self.started.lock().unwrap().take() {
            let _ = started.send(());
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.sent.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

#[test_log::test(tokio::test)]
async fn shutdown_during_a_job_lets_it_finish() {
    let dir = tempfile::tempdir().unwrap();
    let store_path = dir.path().join(DEFAULT_SEEN_FILE);
    let sent = Arc::new(Mutex::new(Vec::new()));
    let (started_tx, started_rx) = oneshot::channel();

    let mut job = PublicationJob::new(
        Box::new(OneStory),
        Box::new(EchoGenerator),
        Box::new(SlowPublisher {
            started: Mutex::new(Some(started_tx)),
            sent: sent.clone(),
        }),
        SeenStore::new(&store_path),
        SeenSet::default(),
        5,
    );

    // 09:00 at UTC+5 is due at 04:00 UTC
    let post_time: LocalTime = "09:00".parse().unwrap();
    let schedule = Schedule::from_local_times(&[post_time], 5);
    assert_eq!(schedule.triggers(), [time!(04:00)]);

    let shutdown = async {
        let _ = started_rx.await;
    };

    tokio::time::timeout(
        Duration::from_secs(10),
        run_scheduler_loop(
            schedule,
            &mut job,
            || datetime!(2026-03-01 04:00 UTC),
            shutdown,
        ),
    )
    .await
    .expect("scheduler loop should stop after shutdown");

    assert_eq!(*sent.lock().unwrap(), vec!["Slow story"]);
    assert!(job.seen().contains("99"));
    assert!(SeenStore::new(&store_path).load().contains("99"));
}

#[test_log::test(tokio::test)]
async fn shutdown_while_idle_returns_without_running_a_job() {
    let dir = tempfile::tempdir().unwrap();
    let sent = Arc::new(Mutex::new(Vec::new()));

    let mut job = PublicationJob::new(
        Box::new(OneStory),
        Box::new(EchoGenerator),
        Box::new(SlowPublisher {
            started: Mutex::new(None),
            sent: sent.clone(),
        }),
        SeenStore::new(dir.path().join(DEFAULT_SEEN_FILE)),
        SeenSet::default(),
        5,
    );

    let post_time: LocalTime = "09:00".parse().unwrap();
    let schedule = Schedule::from_local_times(&[post_time], 5);

    tokio::time::timeout(
        Duration::from_secs(10),
        run_scheduler_loop(
            schedule,
            &mut job,
            || datetime!(2026-03-01 12:00 UTC),
            std::future::ready(()),
        ),
    )
    .await
    .expect("scheduler loop should stop after shutdown");

    assert!(sent.lock().unwrap().is_empty());
    assert!(job.seen().is_empty());
}
