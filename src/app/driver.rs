//! Async event loop around [`Inspector`]
//!
//! Each command runs as a one-shot tokio task that posts its result back as
//! an event. Nothing is cancelled: when two fetches overlap, whichever
//! finishes last wins.

use super::inspector::{Command, Event, Inspector};
use crate::feed::CaptureFeed;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Drive the inspector until it exits or `input` closes.
///
/// `on_change` runs after every handled event with the updated state.
/// Returns the inspector so the caller can shut the store down.
pub async fn run(
    mut inspector: Inspector,
    feed: Arc<dyn CaptureFeed>,
    mut input: mpsc::Receiver<Event>,
    mut on_change: impl FnMut(&Inspector),
) -> anyhow::Result<Inspector> {
    let (results_tx, mut results) = mpsc::unbounded_channel();
    let mut pending = inspector.start();

    loop {
        for command in pending.drain(..) {
            if !dispatch(command, &feed, &results_tx) {
                tracing::info!("Inspector loop stopped");
                return Ok(inspector);
            }
        }
        on_change(&inspector);

        let event = tokio::select! {
            Some(event) = results.recv() => event,
            event = input.recv() => event.unwrap_or(Event::Quit),
        };
        pending = inspector.handle(event);
    }
}

/// Start the work for one command. Returns false on `Exit`.
fn dispatch(
    command: Command,
    feed: &Arc<dyn CaptureFeed>,
    results: &mpsc::UnboundedSender<Event>,
) -> bool {
    let feed = Arc::clone(feed);
    let results = results.clone();
    match command {
        Command::FetchTunnels => {
            tokio::spawn(async move {
                let _ = results.send(Event::TunnelsLoaded(feed.tunnels().await));
            });
        }
        Command::FetchRequests { limit } => {
            tokio::spawn(async move {
                let _ = results.send(Event::RequestsLoaded(feed.requests(limit).await));
            });
        }
        Command::Replay(request_id) => {
            tokio::spawn(async move {
                let result = feed.replay(&request_id).await;
                let _ = results.send(Event::ReplayFinished { request_id, result });
            });
        }
        Command::ScheduleTick(delay) => {
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = results.send(Event::Tick);
            });
        }
        Command::Exit => return false,
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InspectorConfig;
    use crate::feed::FeedError;
    use crate::models::{CapturedRequest, Tunnel};
    use crate::storage::RequestStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct FakeFeed {
        replays: AtomicUsize,
    }

    #[async_trait]
    impl CaptureFeed for FakeFeed {
        async fn tunnels(&self) -> Result<Vec<Tunnel>, FeedError> {
            Ok(vec![Tunnel {
                name: "command_line".into(),
                public_url: "https://fake.ngrok.app".into(),
                proto: "https".into(),
                local_address: "http://localhost:8080".into(),
            }])
        }

        async fn requests(&self, limit: usize) -> Result<Vec<CapturedRequest>, FeedError> {
            let mut first = CapturedRequest::new("one", "GET", "/");
            first.status_code = 200;
            let mut second = CapturedRequest::new("two", "POST", "/submit");
            second.status_code = 201;
            Ok(vec![first, second].into_iter().take(limit).collect())
        }

        async fn replay(&self, _request_id: &str) -> Result<(), FeedError> {
            self.replays.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn is_available(&self) -> bool {
            true
        }
    }

    fn fast_config() -> InspectorConfig {
        InspectorConfig {
            active_poll: Duration::from_millis(10),
            idle_poll: Duration::from_millis(10),
            ..InspectorConfig::default()
        }
    }

    #[tokio::test]
    async fn polls_saves_and_quits() {
        let inspector = Inspector::new(fast_config(), RequestStore::open_in_memory().unwrap());
        let feed = Arc::new(FakeFeed::default());
        let (tx, rx) = mpsc::channel(8);

        let quit = tx.clone();
        let inspector = tokio::time::timeout(
            Duration::from_secs(10),
            run(inspector, feed, rx, move |state| {
                if state.store().stats().map(|s| s.requests).unwrap_or(0) == 2 {
                    let _ = quit.try_send(Event::Quit);
                }
            }),
        )
        .await
        .expect("loop finishes")
        .expect("loop succeeds");

        let sessions = inspector.store().get_sessions().unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].tunnel_url, "https://fake.ngrok.app");
        assert!(sessions[0].ended_at.is_some());
        assert_eq!(inspector.working_set().len(), 2);
        inspector.shutdown().unwrap();
        drop(tx);
    }

    #[tokio::test]
    async fn replay_is_sent_to_the_feed() {
        let inspector = Inspector::new(fast_config(), RequestStore::disabled());
        let feed = Arc::new(FakeFeed::default());
        let (tx, rx) = mpsc::channel(8);
        tx.send(Event::Replay("one".into())).await.unwrap();

        let quit = tx.clone();
        let handle: Arc<dyn CaptureFeed> = feed.clone();
        tokio::time::timeout(
            Duration::from_secs(10),
            run(inspector, handle, rx, move |state| {
                if state.notice() == Some("Replayed one") {
                    let _ = quit.try_send(Event::Quit);
                }
            }),
        )
        .await
        .expect("loop finishes")
        .expect("loop succeeds");

        assert_eq!(feed.replays.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn closed_input_stops_the_loop() {
        let inspector = Inspector::new(fast_config(), RequestStore::disabled());
        let (tx, rx) = mpsc::channel(1);
        drop(tx);
        let result = tokio::time::timeout(
            Duration::from_secs(10),
            run(inspector, Arc::new(FakeFeed::default()), rx, |_| {}),
        )
        .await
        .expect("loop finishes");
        assert!(result.is_ok());
    }
}
