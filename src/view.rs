use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tokio::sync::watch;

use crate::api::Api;
use crate::form::{CreateForm, ValidationError};
use crate::model::{Resource, ServiceInfo, ServiceStats};
use crate::summary::SummaryPoller;
use crate::sync::{Collection, Mutation, PollHandle, ResourceList, Resync, Snapshot, SyncError};

/// A table bound to one resource list, with an optional creation form.
///
/// Mounting starts the poller; dropping the view tears it down. Each mount
/// gets its own list, so nothing survives an unmount.
pub struct CollectionView<R: Resource> {
    list: Arc<ResourceList<R>>,
    rows: watch::Receiver<Snapshot<Collection<R>>>,
    form_open: bool,
    form_error: Option<ValidationError>,
    _poll: Option<PollHandle>,
}

impl<R: Resource + DeserializeOwned> CollectionView<R> {
    /// Mount with a polling task firing immediately and then every `every`.
    pub fn mount(api: Arc<dyn Api>, every: Duration) -> Self {
        let mut view = Self::detached(api);
        view._poll = Some(view.list.poll(every));
        view
    }

    /// A view without a polling task, for one-shot commands.
    pub fn detached(api: Arc<dyn Api>) -> Self {
        let list = ResourceList::new(api);
        let rows = list.subscribe();
        Self {
            list,
            rows,
            form_open: false,
            form_error: None,
            _poll: None,
        }
    }

    pub fn rows(&self) -> Collection<R> {
        self.rows.borrow().value.clone()
    }

    /// Rows the user may be offered a stop action for.
    pub fn stoppable(&self) -> Vec<R> {
        self.rows().iter().filter(|r| r.is_stoppable()).cloned().collect()
    }

    /// Wait for the next published snapshot.
    pub async fn changed(&mut self) -> bool {
        self.rows.changed().await.is_ok()
    }

    pub async fn refresh(&self) -> Resync {
        self.list.resync().await
    }

    pub fn form_open(&self) -> bool {
        self.form_open
    }

    pub fn form_error(&self) -> Option<&ValidationError> {
        self.form_error.as_ref()
    }

    /// Show or hide the creation form. Returns the new state.
    pub fn toggle_form(&mut self) -> bool {
        self.form_open = !self.form_open;
        if !self.form_open {
            self.form_error = None;
        }
        self.form_open
    }

    /// Submit the creation form. A validation error keeps the form open and
    /// sends nothing; otherwise the form closes whatever the server says.
    pub async fn submit(&mut self, form: &CreateForm) -> Result<Mutation, ValidationError> {
        let request = match form.validate(R::HAS_DIRECTION) {
            Ok(r) => r,
            Err(e) => {
                self.form_open = true;
                self.form_error = Some(e.clone());
                return Err(e);
            }
        };
        let outcome = self.list.create(&request).await;
        self.form_open = false;
        self.form_error = None;
        Ok(outcome)
    }

    pub async fn stop(&self, id: u64) -> Result<Mutation, SyncError> {
        self.list.delete_id(id).await
    }
}

/// Home view: service info and stats on one shared timer.
pub struct SummaryView {
    poller: Arc<SummaryPoller>,
    info: watch::Receiver<Snapshot<Option<ServiceInfo>>>,
    stats: watch::Receiver<Snapshot<Option<ServiceStats>>>,
    _poll: Option<PollHandle>,
}

impl SummaryView {
    pub fn mount(api: Arc<dyn Api>, every: Duration) -> Self {
        let mut view = Self::detached(api);
        view._poll = Some(view.poller.poll(every));
        view
    }

    pub fn detached(api: Arc<dyn Api>) -> Self {
        let poller = SummaryPoller::new(api);
        let info = poller.subscribe_info();
        let stats = poller.subscribe_stats();
        Self {
            poller,
            info,
            stats,
            _poll: None,
        }
    }

    pub fn info(&self) -> Option<ServiceInfo> {
        self.poller.info()
    }

    pub fn stats(&self) -> Option<ServiceStats> {
        self.poller.stats()
    }

    pub async fn refresh(&self) -> (Resync, Resync) {
        self.poller.refresh().await
    }

    /// Wait until either singleton is republished.
    pub async fn changed(&mut self) -> bool {
        tokio::select! {
            r = self.info.changed() => r.is_ok(),
            r = self.stats.changed() => r.is_ok(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Pipe, Tunnel};
    use crate::testing::FakeApi;
    use reqwest::Method;
    use serde_json::json;

    #[tokio::test]
    async fn form_toggles() {
        let mut view = CollectionView::<Tunnel>::detached(Arc::new(FakeApi::new()));
        assert!(!view.form_open());
        assert!(view.toggle_form());
        assert!(!view.toggle_form());
    }

    #[tokio::test]
    async fn invalid_form_stays_open_and_sends_nothing() {
        let api = Arc::new(FakeApi::new());
        let mut view = CollectionView::<Tunnel>::detached(api.clone());
        view.toggle_form();

        let form = CreateForm {
            local: ":8080".into(),
            remote: " ".into(),
            forward: false,
        };
        assert!(view.submit(&form).await.is_err());
        assert!(view.form_open());
        assert_eq!(view.form_error().unwrap().field, crate::form::Field::Remote);
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn failed_create_closes_form_and_resyncs() {
        let api = Arc::new(FakeApi::new());
        api.fail(Method::POST, "tuns/");
        api.reply(Method::GET, "tuns/", Ok(json!(null)));
        let mut view = CollectionView::<Tunnel>::detached(api.clone());
        view.toggle_form();

        let form = CreateForm {
            local: ":8080".into(),
            remote: "db:5432".into(),
            forward: true,
        };
        assert_eq!(view.submit(&form).await.unwrap(), Mutation::Rejected);
        assert!(!view.form_open());
        assert!(view.form_error().is_none());
        assert_eq!(api.count(Method::GET, "tuns/"), 1);
        assert_eq!(
            api.calls()[0].body,
            Some(json!({"local": ":8080", "remote": "db:5432", "forward": true}))
        );
    }

    #[tokio::test]
    async fn pipe_form_with_direction_is_refused() {
        let api = Arc::new(FakeApi::new());
        let mut view = CollectionView::<Pipe>::detached(api.clone());
        let form = CreateForm {
            local: ":8080".into(),
            remote: "web:80".into(),
            forward: true,
        };
        let err = view.submit(&form).await.unwrap_err();
        assert_eq!(err.field, crate::form::Field::Forward);
        assert!(view.form_open());
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn stop_after_failed_refresh_reports_unreachable() {
        let api = Arc::new(FakeApi::new());
        api.fail(Method::GET, "tuns/");
        let view = CollectionView::<Tunnel>::detached(api.clone());
        assert_eq!(view.refresh().await, Resync::KeptPrevious);

        assert_eq!(
            view.stop(5).await.unwrap_err(),
            SyncError::Unreachable { noun: "tunnel" }
        );
        assert_eq!(api.count(Method::DELETE, "tuns/5"), 0);
    }

    #[tokio::test]
    async fn stoppable_filters_rows() {
        let api = Arc::new(FakeApi::new());
        api.reply(
            Method::GET,
            "pipes/",
            Ok(json!([{"Id": 2, "IsStoppable": false}, {"Id": 1, "IsStoppable": true}])),
        );
        let view = CollectionView::<Pipe>::detached(api);
        view.refresh().await;
        let ids: Vec<u64> = view.stoppable().iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![1]);
    }

    #[tokio::test(start_paused = true)]
    async fn mounted_view_sees_published_rows() {
        let api = Arc::new(FakeApi::new());
        api.reply(Method::GET, "tuns/", Ok(json!([{"Id": 3}, {"Id": 1}, {"Id": 2}])));
        let mut view = CollectionView::<Tunnel>::mount(api.clone(), Duration::from_secs(5));

        assert!(view.changed().await);
        let ids: Vec<u64> = view.rows().iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);

        drop(view);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(api.count(Method::GET, "tuns/"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn summary_view_wakes_on_either_singleton() {
        let api = Arc::new(FakeApi::new());
        api.fail(Method::GET, "info");
        api.reply(Method::GET, "stats", Ok(json!({"CountPipes": 2})));
        let mut view = SummaryView::mount(api, Duration::from_secs(5));

        assert!(view.changed().await);
        assert!(view.info().is_none());
        assert_eq!(view.stats().unwrap().count_pipes, 2);
    }
}
