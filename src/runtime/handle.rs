//! Single-writer runtime owning the [`Storefront`], and its persistence worker.

use std::sync::Arc;

use hashbrown::HashMap;
use rust_decimal::Decimal;
use thiserror::Error;
use tokio::{
    sync::{Mutex, broadcast, mpsc, oneshot},
    time::{Duration, Instant},
};
use tracing::{debug, warn};

use crate::{
    config::{ConfigError, StoreConfig},
    core::{
        cart::Cart,
        favorites::Favorites,
        store::StoreError,
        storefront::{LoginMerge, Storefront},
    },
    diag::{Inspect, StorefrontReport},
    line::{CartLine, CartLineDraft},
    persist::{
        KvStorage, PersistError,
        cache::{DurableCache, caches, load_storefront},
    },
    types::{OpSeq, ProductId, UserKey},
};

use super::events::StoreEvent;

/// Failure of a runtime request.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The store rejected the command.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Storage failed during a flush or shutdown.
    #[error(transparent)]
    Persist(#[from] PersistError),
    /// The runtime could not be started with this configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The runtime task has stopped.
    #[error("storefront runtime has shut down")]
    ChannelClosed,
}

/// Cloneable handle to the single task that owns the [`Storefront`].
///
/// Commands run one at a time, each to completion, so a login merge is never
/// observed half-applied.
#[derive(Clone)]
pub struct StorefrontHandle {
    cmd_tx: mpsc::Sender<Command>,
    events_tx: broadcast::Sender<StoreEvent>,
}

enum Command {
    SetActiveUser {
        user: UserKey,
        resp: oneshot::Sender<()>,
    },
    MergeIntoUser {
        user: UserKey,
        resp: oneshot::Sender<Result<LoginMerge, StoreError>>,
    },
    ResetToGuest {
        resp: oneshot::Sender<()>,
    },
    UpsertLine {
        draft: CartLineDraft,
        resp: oneshot::Sender<Result<u32, StoreError>>,
    },
    RemoveLine {
        product_id: ProductId,
        resp: oneshot::Sender<bool>,
    },
    SetQuantity {
        product_id: ProductId,
        quantity: u32,
        resp: oneshot::Sender<Result<bool, StoreError>>,
    },
    ClearCart {
        resp: oneshot::Sender<usize>,
    },
    ToggleFavorite {
        product_id: ProductId,
        resp: oneshot::Sender<bool>,
    },
    ClearFavorites {
        resp: oneshot::Sender<usize>,
    },
    ActiveUser {
        resp: oneshot::Sender<UserKey>,
    },
    CartLines {
        resp: oneshot::Sender<Vec<CartLine>>,
    },
    CartTotal {
        resp: oneshot::Sender<Decimal>,
    },
    CartCount {
        resp: oneshot::Sender<u64>,
    },
    Favorites {
        resp: oneshot::Sender<Vec<ProductId>>,
    },
    IsFavorite {
        product_id: ProductId,
        resp: oneshot::Sender<bool>,
    },
    Diagnostics {
        resp: oneshot::Sender<StorefrontReport>,
    },
    Flush {
        resp: oneshot::Sender<Result<OpSeq, RuntimeError>>,
    },
    Shutdown {
        resp: oneshot::Sender<Result<(), RuntimeError>>,
    },
}

enum PersistMsg {
    Snapshot {
        key: String,
        payload: String,
        revision: OpSeq,
    },
    Flush {
        resp: oneshot::Sender<Result<OpSeq, PersistError>>,
    },
    Shutdown {
        resp: oneshot::Sender<()>,
    },
}

enum DurableReport {
    UpTo(OpSeq),
    Failed(String),
}

/// Loads both stores from `storage` and starts the runtime over them.
///
/// Must be called from within a Tokio runtime.
///
/// # Errors
///
/// Returns `RuntimeError::Config` if `config` fails [`StoreConfig::validate`].
pub fn open_storefront(storage: Box<dyn KvStorage>, config: StoreConfig) -> Result<StorefrontHandle, RuntimeError> {
    let storefront = load_storefront(storage.as_ref(), &config)?;
    spawn_storefront(storefront, Some(storage), config)
}

/// Starts the runtime. Without `storage` state lives in memory only.
///
/// Must be called from within a Tokio runtime.
///
/// # Errors
///
/// Returns `RuntimeError::Config` if `config` fails [`StoreConfig::validate`].
pub fn spawn_storefront(
    storefront: Storefront,
    storage: Option<Box<dyn KvStorage>>,
    config: StoreConfig,
) -> Result<StorefrontHandle, RuntimeError> {
    let (cart_cache, favorites_cache) = caches(&config)?;

    let (cmd_tx, mut cmd_rx) = mpsc::channel::<Command>(256);
    let (events_tx, _) = broadcast::channel::<StoreEvent>(1024);

    let (persist_tx, mut durable_rx) = if let Some(storage) = storage {
        let (persist_tx, persist_rx) = mpsc::channel::<PersistMsg>(config.persist_queue_bound);
        let (durable_tx, durable_rx) = mpsc::unbounded_channel::<DurableReport>();
        spawn_persistence_worker(storage, persist_rx, durable_tx, config.clone());
        (Some(persist_tx), Some(durable_rx))
    } else {
        (None, None)
    };

    let mut writer = Writer {
        storefront,
        cart_cache,
        favorites_cache,
        events_tx: events_tx.clone(),
        persist_tx,
        revision: 0,
        cart_dirty: false,
        favorites_dirty: false,
        durable_revision: None,
        last_persist_error: None,
    };

    tokio::spawn(async move {
        let initial_user = writer.storefront.active_user().clone();
        writer.settle(&initial_user);

        loop {
            if let Some(rx) = durable_rx.as_mut() {
                let mut writer_gone = false;
                tokio::select! {
                    cmd = cmd_rx.recv() => {
                        let Some(cmd) = cmd else { break; };
                        if writer.handle_command(cmd).await {
                            break;
                        }
                    }
                    report = rx.recv() => {
                        match report {
                            Some(report) => writer.on_durable_report(report),
                            None => writer_gone = true,
                        }
                    }
                }
                if writer_gone {
                    durable_rx = None;
                }
            } else {
                let Some(cmd) = cmd_rx.recv().await else { break; };
                if writer.handle_command(cmd).await {
                    break;
                }
            }
        }
        debug!("storefront runtime stopped");
    });

    Ok(StorefrontHandle { cmd_tx, events_tx })
}

impl StorefrontHandle {
    /// New receiver for [`StoreEvent`]s emitted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events_tx.subscribe()
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(make(tx))
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)
    }

    /// Switches both stores to `user`'s partitions, or guest for `None`/empty, without merging.
    pub async fn set_active_user(&self, user: Option<&str>) -> Result<(), RuntimeError> {
        let user = UserKey::from_session(user);
        self.request(|resp| Command::SetActiveUser { user, resp }).await
    }

    /// Login: folds guest data into `user` in one command.
    pub async fn merge_into_user(&self, user: UserKey) -> Result<LoginMerge, RuntimeError> {
        Ok(self.request(|resp| Command::MergeIntoUser { user, resp }).await??)
    }

    /// Logout: guest becomes active; nothing is cleared.
    pub async fn reset_to_guest(&self) -> Result<(), RuntimeError> {
        self.request(|resp| Command::ResetToGuest { resp }).await
    }

    /// Adds to the active cart. Returns the line's resulting quantity.
    pub async fn upsert_line(&self, draft: CartLineDraft) -> Result<u32, RuntimeError> {
        Ok(self.request(|resp| Command::UpsertLine { draft, resp }).await??)
    }

    /// Removes a line from the active cart.
    pub async fn remove_line(&self, product_id: impl Into<ProductId>) -> Result<bool, RuntimeError> {
        let product_id = product_id.into();
        self.request(|resp| Command::RemoveLine { product_id, resp }).await
    }

    /// Overwrites a line quantity in the active cart.
    pub async fn set_quantity(
        &self,
        product_id: impl Into<ProductId>,
        quantity: u32,
    ) -> Result<bool, RuntimeError> {
        let product_id = product_id.into();
        Ok(self
            .request(|resp| Command::SetQuantity {
                product_id,
                quantity,
                resp,
            })
            .await??)
    }

    /// Empties the active cart.
    pub async fn clear_cart(&self) -> Result<usize, RuntimeError> {
        self.request(|resp| Command::ClearCart { resp }).await
    }

    /// Toggles an id in the active favorites. Returns whether it is now present.
    pub async fn toggle_favorite(&self, product_id: impl Into<ProductId>) -> Result<bool, RuntimeError> {
        let product_id = product_id.into();
        self.request(|resp| Command::ToggleFavorite { product_id, resp }).await
    }

    /// Empties the active favorites.
    pub async fn clear_favorites(&self) -> Result<usize, RuntimeError> {
        self.request(|resp| Command::ClearFavorites { resp }).await
    }

    /// Currently active key.
    pub async fn active_user(&self) -> Result<UserKey, RuntimeError> {
        self.request(|resp| Command::ActiveUser { resp }).await
    }

    /// Lines of the active cart.
    pub async fn cart_lines(&self) -> Result<Vec<CartLine>, RuntimeError> {
        self.request(|resp| Command::CartLines { resp }).await
    }

    /// Total of the active cart.
    pub async fn cart_total(&self) -> Result<Decimal, RuntimeError> {
        self.request(|resp| Command::CartTotal { resp }).await
    }

    /// Units in the active cart.
    pub async fn cart_count(&self) -> Result<u64, RuntimeError> {
        self.request(|resp| Command::CartCount { resp }).await
    }

    /// Ids in the active favorites.
    pub async fn favorites(&self) -> Result<Vec<ProductId>, RuntimeError> {
        self.request(|resp| Command::Favorites { resp }).await
    }

    /// Membership in the active favorites.
    pub async fn is_favorite(&self, product_id: impl Into<ProductId>) -> Result<bool, RuntimeError> {
        let product_id = product_id.into();
        self.request(|resp| Command::IsFavorite { product_id, resp }).await
    }

    /// Store reports plus persistence state.
    pub async fn diagnostics(&self) -> Result<StorefrontReport, RuntimeError> {
        self.request(|resp| Command::Diagnostics { resp }).await
    }

    /// Writes every pending snapshot and returns the durable revision.
    pub async fn flush(&self) -> Result<OpSeq, RuntimeError> {
        self.request(|resp| Command::Flush { resp }).await?
    }

    /// Flushes, then stops the runtime and its writer.
    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        self.request(|resp| Command::Shutdown { resp }).await?
    }
}

struct Writer {
    storefront: Storefront,
    cart_cache: DurableCache<Cart>,
    favorites_cache: DurableCache<Favorites>,
    events_tx: broadcast::Sender<StoreEvent>,
    persist_tx: Option<mpsc::Sender<PersistMsg>>,
    revision: OpSeq,
    cart_dirty: bool,
    favorites_dirty: bool,
    durable_revision: Option<OpSeq>,
    last_persist_error: Option<String>,
}

impl Writer {
    async fn handle_command(&mut self, cmd: Command) -> bool {
        let prev_user = self.storefront.active_user().clone();

        match cmd {
            Command::SetActiveUser { user, resp } => {
                self.storefront.set_active_user(user);
                self.settle(&prev_user);
                let _ = resp.send(());
            }
            Command::MergeIntoUser { user, resp } => {
                let res = self.storefront.merge_into_user(user.clone());
                self.settle(&prev_user);
                if let Ok(merge) = &res {
                    let _ = self.events_tx.send(StoreEvent::Merged { user, merge: *merge });
                }
                let _ = resp.send(res);
            }
            Command::ResetToGuest { resp } => {
                self.storefront.reset_to_guest();
                self.settle(&prev_user);
                let _ = resp.send(());
            }
            Command::UpsertLine { draft, resp } => {
                let res = self.storefront.upsert_line(draft);
                self.settle(&prev_user);
                let _ = resp.send(res);
            }
            Command::RemoveLine { product_id, resp } => {
                let removed = self.storefront.remove_line(&product_id);
                self.settle(&prev_user);
                let _ = resp.send(removed);
            }
            Command::SetQuantity {
                product_id,
                quantity,
                resp,
            } => {
                let res = self.storefront.set_quantity(&product_id, quantity);
                self.settle(&prev_user);
                let _ = resp.send(res);
            }
            Command::ClearCart { resp } => {
                let removed = self.storefront.clear_cart();
                self.settle(&prev_user);
                let _ = resp.send(removed);
            }
            Command::ToggleFavorite { product_id, resp } => {
                let present = self.storefront.toggle_favorite(&product_id);
                self.settle(&prev_user);
                let _ = resp.send(present);
            }
            Command::ClearFavorites { resp } => {
                let removed = self.storefront.clear_favorites();
                self.settle(&prev_user);
                let _ = resp.send(removed);
            }
            Command::ActiveUser { resp } => {
                let _ = resp.send(prev_user);
            }
            Command::CartLines { resp } => {
                let _ = resp.send(self.storefront.cart().lines().to_vec());
            }
            Command::CartTotal { resp } => {
                let _ = resp.send(self.storefront.cart().total());
            }
            Command::CartCount { resp } => {
                let _ = resp.send(self.storefront.cart().count());
            }
            Command::Favorites { resp } => {
                let _ = resp.send(self.storefront.favorites().ids().to_vec());
            }
            Command::IsFavorite { product_id, resp } => {
                let _ = resp.send(self.storefront.favorites().contains(&product_id));
            }
            Command::Diagnostics { resp } => {
                let mut report = self.storefront.report();
                report.durable_revision = self.durable_revision;
                report.last_persist_error = self.last_persist_error.clone();
                let _ = resp.send(report);
            }
            Command::Flush { resp } => {
                let _ = resp.send(self.flush().await);
            }
            Command::Shutdown { resp } => {
                let _ = resp.send(self.shutdown().await);
                return true;
            }
        }

        false
    }

    /// Drains ops produced by the last command, emits change events, and
    /// hands dirty snapshots to the writer.
    fn settle(&mut self, prev_user: &UserKey) {
        let (cart_ops, favorites_ops) = self.storefront.drain_pending_ops();
        if cart_ops.is_empty() && favorites_ops.is_empty() {
            return;
        }

        self.revision += 1;
        let revision = self.revision;

        let active = self.storefront.active_user();
        if active != prev_user {
            let _ = self.events_tx.send(StoreEvent::ActiveUserChanged { user: active.clone() });
        }
        if !cart_ops.is_empty() {
            self.cart_dirty = true;
            let _ = self.events_tx.send(StoreEvent::CartChanged { revision });
        }
        if !favorites_ops.is_empty() {
            self.favorites_dirty = true;
            let _ = self.events_tx.send(StoreEvent::FavoritesChanged { revision });
        }

        self.offer_snapshots();
    }

    fn offer_snapshots(&mut self) {
        let Some(tx) = self.persist_tx.clone() else {
            self.cart_dirty = false;
            self.favorites_dirty = false;
            return;
        };

        if self.cart_dirty {
            match self.cart_snapshot() {
                Ok(msg) => self.cart_dirty = !try_enqueue(&tx, msg),
                Err(err) => {
                    self.cart_dirty = false;
                    self.record_persist_error(err.to_string());
                }
            }
        }
        if self.favorites_dirty {
            match self.favorites_snapshot() {
                Ok(msg) => self.favorites_dirty = !try_enqueue(&tx, msg),
                Err(err) => {
                    self.favorites_dirty = false;
                    self.record_persist_error(err.to_string());
                }
            }
        }
    }

    async fn send_dirty_snapshots(&mut self, tx: &mpsc::Sender<PersistMsg>) -> Result<(), RuntimeError> {
        if self.cart_dirty {
            let msg = self.cart_snapshot()?;
            tx.send(msg).await.map_err(|_| RuntimeError::ChannelClosed)?;
            self.cart_dirty = false;
        }
        if self.favorites_dirty {
            let msg = self.favorites_snapshot()?;
            tx.send(msg).await.map_err(|_| RuntimeError::ChannelClosed)?;
            self.favorites_dirty = false;
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<OpSeq, RuntimeError> {
        let Some(tx) = self.persist_tx.clone() else {
            return Ok(self.revision);
        };
        self.send_dirty_snapshots(&tx).await?;

        let (flush_tx, flush_rx) = oneshot::channel();
        tx.send(PersistMsg::Flush { resp: flush_tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        let durable = flush_rx.await.map_err(|_| RuntimeError::ChannelClosed)??;
        self.durable_revision = Some(durable);
        Ok(durable)
    }

    async fn shutdown(&mut self) -> Result<(), RuntimeError> {
        let Some(tx) = self.persist_tx.take() else {
            return Ok(());
        };
        self.send_dirty_snapshots(&tx).await?;

        let (done_tx, done_rx) = oneshot::channel();
        tx.send(PersistMsg::Shutdown { resp: done_tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        done_rx.await.map_err(|_| RuntimeError::ChannelClosed)
    }

    fn cart_snapshot(&self) -> Result<PersistMsg, PersistError> {
        Ok(PersistMsg::Snapshot {
            key: self.cart_cache.key().to_string(),
            payload: self.cart_cache.encode(self.storefront.cart())?,
            revision: self.revision,
        })
    }

    fn favorites_snapshot(&self) -> Result<PersistMsg, PersistError> {
        Ok(PersistMsg::Snapshot {
            key: self.favorites_cache.key().to_string(),
            payload: self.favorites_cache.encode(self.storefront.favorites())?,
            revision: self.revision,
        })
    }

    fn on_durable_report(&mut self, report: DurableReport) {
        match report {
            DurableReport::UpTo(revision) => {
                self.durable_revision = Some(revision);
                let _ = self.events_tx.send(StoreEvent::DurableUpTo { revision });
            }
            DurableReport::Failed(message) => self.record_persist_error(message),
        }
    }

    fn record_persist_error(&mut self, message: String) {
        warn!(error = %message, "storefront state not persisted; in-memory state remains authoritative");
        self.last_persist_error = Some(message.clone());
        let _ = self.events_tx.send(StoreEvent::PersistFailed { message });
    }
}

fn try_enqueue(tx: &mpsc::Sender<PersistMsg>, msg: PersistMsg) -> bool {
    match tx.try_send(msg) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(_)) => {
            debug!("persist queue full; snapshot deferred to the next write");
            false
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            warn!("persist writer has stopped; snapshot dropped");
            false
        }
    }
}

fn spawn_persistence_worker(
    storage: Box<dyn KvStorage>,
    mut rx: mpsc::Receiver<PersistMsg>,
    durable_tx: mpsc::UnboundedSender<DurableReport>,
    config: StoreConfig,
) {
    let storage = Arc::new(Mutex::new(storage));
    let latency = Duration::from_millis(config.batch_max_latency_ms);
    tokio::spawn(async move {
        let mut buf = HashMap::<String, String>::new();
        let mut pending_revision: OpSeq = 0;
        let mut last_durable: OpSeq = 0;
        let mut deadline = Instant::now() + latency;

        loop {
            tokio::select! {
                msg = rx.recv() => {
                    let Some(msg) = msg else {
                        let _ = flush_buf(&storage, &mut buf, pending_revision, &mut last_durable, &durable_tx, true).await;
                        break;
                    };

                    match msg {
                        PersistMsg::Snapshot { key, payload, revision } => {
                            if buf.is_empty() {
                                deadline = Instant::now() + latency;
                            }
                            buf.insert(key, payload);
                            pending_revision = pending_revision.max(revision);

                            if config.write_through {
                                let _ = flush_buf(&storage, &mut buf, pending_revision, &mut last_durable, &durable_tx, false).await;
                            }
                        }
                        PersistMsg::Flush { resp } => {
                            let result = flush_buf(&storage, &mut buf, pending_revision, &mut last_durable, &durable_tx, true).await;
                            let _ = resp.send(result.map(|_| last_durable));
                        }
                        PersistMsg::Shutdown { resp } => {
                            let _ = flush_buf(&storage, &mut buf, pending_revision, &mut last_durable, &durable_tx, true).await;
                            let _ = resp.send(());
                            break;
                        }
                    }
                }
                _ = tokio::time::sleep_until(deadline), if !buf.is_empty() => {
                    let _ = flush_buf(&storage, &mut buf, pending_revision, &mut last_durable, &durable_tx, false).await;
                }
            }
        }
    });
}

async fn flush_buf(
    storage: &Arc<Mutex<Box<dyn KvStorage>>>,
    buf: &mut HashMap<String, String>,
    pending_revision: OpSeq,
    last_durable: &mut OpSeq,
    durable_tx: &mpsc::UnboundedSender<DurableReport>,
    call_flush: bool,
) -> Result<(), PersistError> {
    if buf.is_empty() && !call_flush {
        return Ok(());
    }

    let entries: Vec<(String, String)> = buf.drain().collect();
    let storage_ref = Arc::clone(storage);
    let write_res = tokio::task::spawn_blocking(move || {
        let mut storage = storage_ref.blocking_lock();
        for (key, payload) in &entries {
            storage.set(key, payload)?;
        }
        if call_flush {
            storage.flush()?;
        }
        Result::<bool, PersistError>::Ok(!entries.is_empty())
    })
    .await
    .map_err(|e| PersistError::Message(format!("join error: {e}")))?;

    match write_res {
        Ok(wrote) => {
            if wrote {
                *last_durable = (*last_durable).max(pending_revision);
                let _ = durable_tx.send(DurableReport::UpTo(*last_durable));
            }
            Ok(())
        }
        Err(err) => {
            let _ = durable_tx.send(DurableReport::Failed(err.to_string()));
            Err(err)
        }
    }
}
