//! App session registry.
//!
//! Maps app ids to their snapshot store, exclusive section and live
//! subscribers. Each registered app owns one dispatcher task that drains a
//! queue of event batches, so batches reach subscribers in the order they
//! were published, across operations.

use crate::app::App;
use crate::error::{CoreError, CoreResult};
use crate::subscriber::{DeliveryError, FileEvent, Subscriber};
use appsnap_snapshot::{SnapshotStore, StoreConfig};
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex, MutexGuard, RwLock};
use tracing::{debug, info, warn};

/// Longest a single delivery may take before the subscriber is dropped.
const DELIVERY_TIMEOUT: Duration = Duration::from_secs(5);

type SubscriberList = Arc<RwLock<Vec<Arc<dyn Subscriber>>>>;

enum Dispatch {
    Events(Vec<FileEvent>),
    Flush(oneshot::Sender<()>),
}

/// Live state of one registered app.
pub struct AppHandle {
    id: String,
    app: RwLock<App>,
    store: SnapshotStore,
    section: Mutex<()>,
    subscribers: SubscriberList,
    dispatch: mpsc::UnboundedSender<Dispatch>,
}

impl AppHandle {
    fn spawn(app: App, store_config: StoreConfig) -> Self {
        let subscribers: SubscriberList = Arc::new(RwLock::new(Vec::new()));
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_dispatcher(app.id.clone(), subscribers.clone(), rx));

        Self {
            id: app.id.clone(),
            store: SnapshotStore::new(app.workdir.clone(), store_config),
            app: RwLock::new(app),
            section: Mutex::new(()),
            subscribers,
            dispatch: tx,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current app metadata.
    pub async fn app(&self) -> App {
        self.app.read().await.clone()
    }

    pub(crate) async fn set_app(&self, app: App) {
        *self.app.write().await = app;
    }

    /// Snapshot store of this app. Cheap to clone into blocking tasks.
    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    /// Enter the app's exclusive section.
    ///
    /// Snapshot operations on one app never overlap; the section is held
    /// until the returned guard drops.
    pub async fn exclusive(&self, timeout: Option<Duration>) -> CoreResult<MutexGuard<'_, ()>> {
        match timeout {
            None => Ok(self.section.lock().await),
            Some(limit) => tokio::time::timeout(limit, self.section.lock())
                .await
                .map_err(|_| CoreError::ExclusiveSectionTimeout {
                    app_id: self.id.clone(),
                    waited_ms: limit.as_millis() as u64,
                }),
        }
    }

    pub async fn subscribe(&self, subscriber: Arc<dyn Subscriber>) {
        debug!(app_id = %self.id, subscriber = %subscriber.id(), "Subscriber added");
        self.subscribers.write().await.push(subscriber);
    }

    /// Remove a subscriber. Returns whether it was present.
    pub async fn unsubscribe(&self, subscriber_id: &str) -> bool {
        let mut subscribers = self.subscribers.write().await;
        let before = subscribers.len();
        subscribers.retain(|s| s.id() != subscriber_id);
        before != subscribers.len()
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }

    /// Queue events for every subscriber and return immediately.
    pub fn publish(&self, events: Vec<FileEvent>) {
        if events.is_empty() {
            return;
        }
        if self.dispatch.send(Dispatch::Events(events)).is_err() {
            warn!(app_id = %self.id, "Dispatcher stopped, events dropped");
        }
    }

    /// Wait until everything published so far has been delivered.
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.dispatch.send(Dispatch::Flush(tx)).is_ok() {
            let _ = rx.await;
        }
    }
}

async fn run_dispatcher(
    app_id: String,
    subscribers: SubscriberList,
    mut rx: mpsc::UnboundedReceiver<Dispatch>,
) {
    while let Some(message) = rx.recv().await {
        match message {
            Dispatch::Events(events) => deliver_batch(&app_id, &subscribers, &events).await,
            Dispatch::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    debug!(app_id = %app_id, "Dispatcher stopped");
}

/// Deliver one batch to every subscriber concurrently, each in order.
/// Subscribers that fail or stall past [`DELIVERY_TIMEOUT`] are dropped.
async fn deliver_batch(app_id: &str, subscribers: &SubscriberList, events: &[FileEvent]) {
    let targets: Vec<Arc<dyn Subscriber>> = subscribers.read().await.clone();
    if targets.is_empty() {
        return;
    }

    let results = join_all(targets.iter().map(|subscriber| async move {
        for event in events {
            let delivered = tokio::time::timeout(DELIVERY_TIMEOUT, subscriber.deliver(event))
                .await
                .unwrap_or_else(|_| {
                    Err(DeliveryError::Failed(format!(
                        "timed out after {}ms",
                        DELIVERY_TIMEOUT.as_millis()
                    )))
                });
            if let Err(e) = delivered {
                warn!(
                    app_id = %app_id,
                    subscriber = %subscriber.id(),
                    path = %event.path,
                    error = %e,
                    "Dropping subscriber after failed delivery"
                );
                return Some(subscriber.id().to_string());
            }
        }
        None
    }))
    .await;

    let failed: Vec<String> = results.into_iter().flatten().collect();
    if !failed.is_empty() {
        subscribers
            .write()
            .await
            .retain(|s| !failed.iter().any(|id| id == s.id()));
    }
}

/// Registry of apps known to the engine.
pub struct AppRegistry {
    apps: RwLock<HashMap<String, Arc<AppHandle>>>,
    store_config: StoreConfig,
}

impl AppRegistry {
    pub fn new(store_config: StoreConfig) -> Self {
        Self {
            apps: RwLock::new(HashMap::new()),
            store_config,
        }
    }

    /// Register an app. Registering the same id again returns the existing
    /// handle.
    pub async fn register(&self, app: App) -> Arc<AppHandle> {
        let mut apps = self.apps.write().await;
        if let Some(handle) = apps.get(&app.id) {
            return handle.clone();
        }

        info!(app_id = %app.id, workdir = %app.workdir.display(), "Registered app");
        let handle = Arc::new(AppHandle::spawn(app, self.store_config.clone()));
        apps.insert(handle.id().to_string(), handle.clone());
        handle
    }

    pub async fn get(&self, app_id: &str) -> CoreResult<Arc<AppHandle>> {
        self.apps
            .read()
            .await
            .get(app_id)
            .cloned()
            .ok_or_else(|| CoreError::AppNotFound(app_id.to_string()))
    }

    pub async fn contains(&self, app_id: &str) -> bool {
        self.apps.read().await.contains_key(app_id)
    }

    /// Forget an app. Its dispatcher stops once the last handle is dropped.
    pub async fn unregister(&self, app_id: &str) -> Option<Arc<AppHandle>> {
        let handle = self.apps.write().await.remove(app_id)?;
        handle.subscribers.write().await.clear();
        info!(app_id = %app_id, "Unregistered app");
        Some(handle)
    }

    pub async fn subscribe(&self, app_id: &str, subscriber: Arc<dyn Subscriber>) -> CoreResult<()> {
        self.get(app_id).await?.subscribe(subscriber).await;
        Ok(())
    }

    pub async fn unsubscribe(&self, app_id: &str, subscriber_id: &str) -> CoreResult<bool> {
        Ok(self.get(app_id).await?.unsubscribe(subscriber_id).await)
    }

    /// Fan events out to the app's subscribers without waiting for delivery.
    pub async fn publish(&self, app_id: &str, events: Vec<FileEvent>) -> CoreResult<()> {
        self.get(app_id).await?.publish(events);
        Ok(())
    }

    /// All registered apps, ordered by id.
    pub async fn apps(&self) -> Vec<App> {
        let handles: Vec<_> = self.apps.read().await.values().cloned().collect();
        let mut apps = Vec::with_capacity(handles.len());
        for handle in handles {
            apps.push(handle.app().await);
        }
        apps.sort_by(|a, b| a.id.cmp(&b.id));
        apps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscriber::ChannelSubscriber;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn registry() -> AppRegistry {
        AppRegistry::new(StoreConfig::default())
    }

    fn app(id: &str) -> App {
        App::new(id, id, std::env::temp_dir().join(id))
    }

    struct Broken {
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl Subscriber for Broken {
        fn id(&self) -> &str {
            "sub_broken"
        }

        async fn deliver(&self, _event: &FileEvent) -> Result<(), DeliveryError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(DeliveryError::Failed("socket closed".to_string()))
        }
    }

    #[tokio::test]
    async fn register_is_idempotent() {
        let registry = registry();
        let first = registry.register(app("app_1")).await;
        let second = registry.register(app("app_1")).await;

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.apps().await.len(), 1);
    }

    #[tokio::test]
    async fn unknown_app_is_an_error() {
        let registry = registry();
        assert!(matches!(
            registry.get("app_missing").await,
            Err(CoreError::AppNotFound(_))
        ));
        assert!(registry
            .publish("app_missing", vec![FileEvent::deleted("app_missing", "a")])
            .await
            .is_err());
    }

    #[tokio::test]
    async fn publish_preserves_order_per_app() {
        let registry = registry();
        let handle = registry.register(app("app_1")).await;
        let (subscriber, mut rx) = ChannelSubscriber::new(16);
        handle.subscribe(Arc::new(subscriber)).await;

        handle.publish(vec![FileEvent::deleted("app_1", "first")]);
        handle.publish(vec![
            FileEvent::deleted("app_1", "second"),
            FileEvent::deleted("app_1", "third"),
        ]);
        handle.flush().await;

        let mut paths = Vec::new();
        while let Ok(event) = rx.try_recv() {
            paths.push(event.path);
        }
        assert_eq!(paths, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn failing_subscriber_is_dropped_without_blocking_others() {
        let registry = registry();
        let handle = registry.register(app("app_1")).await;
        let broken = Arc::new(Broken {
            attempts: AtomicUsize::new(0),
        });
        let (healthy, mut rx) = ChannelSubscriber::new(16);
        handle.subscribe(broken.clone()).await;
        handle.subscribe(Arc::new(healthy)).await;

        handle.publish(vec![
            FileEvent::deleted("app_1", "a.txt"),
            FileEvent::deleted("app_1", "b.txt"),
        ]);
        handle.flush().await;

        assert_eq!(handle.subscriber_count().await, 1);
        assert_eq!(broken.attempts.load(Ordering::SeqCst), 1);
        assert_eq!(rx.try_recv().unwrap().path, "a.txt");
        assert_eq!(rx.try_recv().unwrap().path, "b.txt");

        handle.publish(vec![FileEvent::deleted("app_1", "c.txt")]);
        handle.flush().await;
        assert_eq!(broken.attempts.load(Ordering::SeqCst), 1);
        assert_eq!(rx.try_recv().unwrap().path, "c.txt");
    }

    struct Stalled;

    #[async_trait]
    impl Subscriber for Stalled {
        fn id(&self) -> &str {
            "sub_stalled"
        }

        async fn deliver(&self, _event: &FileEvent) -> Result<(), DeliveryError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn full_channel_subscriber_does_not_block_others() {
        let registry = registry();
        let handle = registry.register(app("app_1")).await;
        let (stuck, _never_read) = ChannelSubscriber::new(1);
        let (healthy, mut rx) = ChannelSubscriber::new(16);
        handle.subscribe(Arc::new(stuck)).await;
        handle.subscribe(Arc::new(healthy)).await;

        handle.publish(vec![
            FileEvent::deleted("app_1", "a.txt"),
            FileEvent::deleted("app_1", "b.txt"),
        ]);
        handle.publish(vec![FileEvent::deleted("app_1", "c.txt")]);
        tokio::time::timeout(Duration::from_secs(2), handle.flush())
            .await
            .expect("flush should not hang on a full subscriber");

        let mut paths = Vec::new();
        while let Ok(event) = rx.try_recv() {
            paths.push(event.path);
        }
        assert_eq!(paths, vec!["a.txt", "b.txt", "c.txt"]);
        assert_eq!(handle.subscriber_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_subscriber_is_dropped_after_timeout() {
        let registry = registry();
        let handle = registry.register(app("app_1")).await;
        let (healthy, mut rx) = ChannelSubscriber::new(16);
        handle.subscribe(Arc::new(Stalled)).await;
        handle.subscribe(Arc::new(healthy)).await;

        handle.publish(vec![FileEvent::deleted("app_1", "a.txt")]);
        handle.publish(vec![FileEvent::deleted("app_1", "b.txt")]);
        handle.flush().await;

        assert_eq!(rx.try_recv().unwrap().path, "a.txt");
        assert_eq!(rx.try_recv().unwrap().path, "b.txt");
        assert_eq!(handle.subscriber_count().await, 1);
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let registry = registry();
        registry.register(app("app_1")).await;
        let (subscriber, mut rx) = ChannelSubscriber::new(16);
        let id = subscriber.id().to_string();
        registry.subscribe("app_1", Arc::new(subscriber)).await.unwrap();

        assert!(registry.unsubscribe("app_1", &id).await.unwrap());
        assert!(!registry.unsubscribe("app_1", &id).await.unwrap());

        let handle = registry.get("app_1").await.unwrap();
        handle.publish(vec![FileEvent::deleted("app_1", "a.txt")]);
        handle.flush().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn exclusive_section_times_out_while_held() {
        let registry = registry();
        let handle = registry.register(app("app_1")).await;

        let _held = handle.exclusive(None).await.unwrap();
        let err = handle
            .exclusive(Some(Duration::from_millis(20)))
            .await
            .unwrap_err();

        assert!(err.is_retryable());
        assert!(matches!(
            err,
            CoreError::ExclusiveSectionTimeout { waited_ms: 20, .. }
        ));
    }

    #[tokio::test]
    async fn different_apps_do_not_share_a_section() {
        let registry = registry();
        let one = registry.register(app("app_1")).await;
        let two = registry.register(app("app_2")).await;

        let _held = one.exclusive(None).await.unwrap();
        assert!(two.exclusive(Some(Duration::from_millis(20))).await.is_ok());
    }

    #[tokio::test]
    async fn unregister_removes_app() {
        let registry = registry();
        registry.register(app("app_1")).await;
        assert!(registry.unregister("app_1").await.is_some());
        assert!(!registry.contains("app_1").await);
        assert!(registry.unregister("app_1").await.is_none());
    }
}
