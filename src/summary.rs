use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use tokio::sync::watch;

use crate::api::Api;
use crate::model::{ServiceInfo, ServiceStats};
use crate::sync::{Fetched, PollHandle, Publisher, Resync, Snapshot, fetch_one, spawn_poller};

pub const INFO_PATH: &str = "info";
pub const STATS_PATH: &str = "stats";

/// Polls the two summary singletons. The fetches are independent: a failure
/// in one never blocks or rolls back the other.
pub struct SummaryPoller {
    api: Arc<dyn Api>,
    info: Publisher<Option<ServiceInfo>>,
    stats: Publisher<Option<ServiceStats>>,
    closed: Arc<AtomicBool>,
}

impl SummaryPoller {
    pub fn new(api: Arc<dyn Api>) -> Arc<Self> {
        let closed = Arc::new(AtomicBool::new(false));
        Arc::new(Self {
            api,
            info: Publisher::new(None, Arc::clone(&closed)),
            stats: Publisher::new(None, Arc::clone(&closed)),
            closed,
        })
    }

    pub fn info(&self) -> Option<ServiceInfo> {
        self.info.current()
    }

    pub fn stats(&self) -> Option<ServiceStats> {
        self.stats.current()
    }

    pub fn subscribe_info(&self) -> watch::Receiver<Snapshot<Option<ServiceInfo>>> {
        self.info.subscribe()
    }

    pub fn subscribe_stats(&self) -> watch::Receiver<Snapshot<Option<ServiceStats>>> {
        self.stats.subscribe()
    }

    async fn refresh_info(&self) -> Resync {
        let ticket = self.info.ticket();
        match fetch_one::<ServiceInfo>(self.api.as_ref(), INFO_PATH).await {
            Fetched::Snapshot(info) => self.info.publish(ticket, Some(info)),
            Fetched::KeepPrevious => Resync::KeptPrevious,
        }
    }

    async fn refresh_stats(&self) -> Resync {
        let ticket = self.stats.ticket();
        match fetch_one::<ServiceStats>(self.api.as_ref(), STATS_PATH).await {
            Fetched::Snapshot(stats) => self.stats.publish(ticket, Some(stats)),
            Fetched::KeepPrevious => Resync::KeptPrevious,
        }
    }

    /// Refresh both singletons concurrently. Returns (info, stats) outcomes.
    pub async fn refresh(&self) -> (Resync, Resync) {
        tokio::join!(self.refresh_info(), self.refresh_stats())
    }

    /// Start periodic polling; the first refresh happens immediately.
    pub fn poll(self: &Arc<Self>, every: Duration) -> PollHandle {
        let poller = Arc::clone(self);
        spawn_poller(every, Arc::clone(&self.closed), move || {
            let poller = Arc::clone(&poller);
            async move {
                poller.refresh().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeApi;
    use reqwest::Method;
    use serde_json::{Value, json};

    fn info(status: &str) -> Value {
        json!({
            "SshClientURI": "tunnel@gateway:22",
            "SshClientConnectionStatus": status,
            "JumpHosts": ["bastion"]
        })
    }

    fn stats(tunnels: u64) -> Value {
        json!({"CountTunnels": tunnels, "MemTotal": 2048})
    }

    #[tokio::test]
    async fn starts_without_snapshots() {
        let poller = SummaryPoller::new(Arc::new(FakeApi::new()));
        assert!(poller.info().is_none());
        assert!(poller.stats().is_none());
    }

    #[tokio::test]
    async fn refresh_publishes_both() {
        let api = Arc::new(FakeApi::new());
        api.reply(Method::GET, INFO_PATH, Ok(info("Connected")));
        api.reply(Method::GET, STATS_PATH, Ok(stats(2)));
        let poller = SummaryPoller::new(api);

        assert_eq!(poller.refresh().await, (Resync::Published, Resync::Published));
        assert_eq!(poller.info().unwrap().jump_hosts, vec!["bastion".to_string()]);
        assert_eq!(poller.stats().unwrap().count_tunnels, 2);
    }

    #[tokio::test]
    async fn info_failure_does_not_block_stats() {
        let api = Arc::new(FakeApi::new());
        api.fail(Method::GET, INFO_PATH);
        api.reply(Method::GET, STATS_PATH, Ok(stats(4)));
        let poller = SummaryPoller::new(api.clone());

        assert_eq!(poller.refresh().await, (Resync::KeptPrevious, Resync::Published));
        assert!(poller.info().is_none());
        assert_eq!(poller.stats().unwrap().count_tunnels, 4);
        assert_eq!(api.count(Method::GET, STATS_PATH), 1);
    }

    #[tokio::test]
    async fn null_or_failed_fetch_keeps_previous_singleton() {
        let api = Arc::new(FakeApi::new());
        api.reply(Method::GET, INFO_PATH, Ok(info("Connected")));
        api.reply(Method::GET, STATS_PATH, Ok(stats(1)));
        api.reply(Method::GET, INFO_PATH, Ok(Value::Null));
        api.fail(Method::GET, STATS_PATH);
        let poller = SummaryPoller::new(api);

        poller.refresh().await;
        assert_eq!(poller.refresh().await, (Resync::KeptPrevious, Resync::KeptPrevious));
        assert_eq!(poller.info().unwrap().ssh_client_connection_status, "Connected");
        assert_eq!(poller.stats().unwrap().count_tunnels, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn polls_on_shared_timer_until_torn_down() {
        let api = Arc::new(FakeApi::new());
        api.reply(Method::GET, INFO_PATH, Ok(info("Connecting")));
        api.reply(Method::GET, INFO_PATH, Ok(info("Connected")));
        api.reply(Method::GET, STATS_PATH, Ok(stats(0)));
        api.reply(Method::GET, STATS_PATH, Ok(stats(3)));
        let poller = SummaryPoller::new(api.clone());

        let handle = poller.poll(Duration::from_secs(5));
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(poller.info().unwrap().ssh_client_connection_status, "Connected");
        assert_eq!(poller.stats().unwrap().count_tunnels, 3);

        drop(handle);
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(api.count(Method::GET, INFO_PATH), 2);
        assert_eq!(api.count(Method::GET, STATS_PATH), 2);
    }
}
