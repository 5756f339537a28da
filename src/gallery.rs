use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex, PoisonError,
    },
    time::Duration,
};

use alloy_primitives::{Address, U256};
use tokio::{
    sync::{mpsc, watch},
    task::JoinSet,
};
use tracing::{debug, info, warn};

use crate::{
    card::Card,
    config::DEFAULT_PAGE_SIZE,
    contract::CollectionReader,
    error::Result,
    fetcher::{next_page, FetchOutcome, FetchWindow, Fetcher, Resize, DEFAULT_BATCH_SIZE},
    item::Slot,
    metadata::MetadataSource,
    notify::Notifier,
    source::{AllTokens, OwnedTokens},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GalleryKind {
    // 全部 token，倒序分页
    All,
    // 当前地址持有的 token，正序一次加载完
    Owned,
}

// 触发加载的外部事件
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GalleryEvent {
    TotalChanged(usize),
    VisibilityEntered,
    AddressChanged(Option<Address>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GalleryOptions {
    pub batch_size: usize,
    pub page_size: usize,
}

impl Default for GalleryOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

pub struct Gallery<C: ?Sized> {
    kind: GalleryKind,
    reader: Arc<C>,
    fetcher: Fetcher,
    options: GalleryOptions,
    loaded: AtomicUsize,
    owner: Mutex<Option<Address>>,
    // 会话进行中被推迟的最新 total
    pending: Mutex<Option<usize>>,
}

impl<C> Gallery<C>
where
    C: CollectionReader + ?Sized,
{
    pub fn all_tokens(
        reader: Arc<C>,
        metadata: Arc<dyn MetadataSource>,
        notifier: Arc<dyn Notifier>,
        options: GalleryOptions,
    ) -> Self {
        Self::new(GalleryKind::All, reader, None, metadata, notifier, options)
    }

    pub fn owned_tokens(
        reader: Arc<C>,
        owner: Option<Address>,
        metadata: Arc<dyn MetadataSource>,
        notifier: Arc<dyn Notifier>,
        options: GalleryOptions,
    ) -> Self {
        Self::new(GalleryKind::Owned, reader, owner, metadata, notifier, options)
    }

    fn new(
        kind: GalleryKind,
        reader: Arc<C>,
        owner: Option<Address>,
        metadata: Arc<dyn MetadataSource>,
        notifier: Arc<dyn Notifier>,
        options: GalleryOptions,
    ) -> Self {
        Self {
            kind,
            reader,
            fetcher: Fetcher::new(metadata, notifier),
            options,
            // 首屏就是一页
            loaded: AtomicUsize::new(options.page_size),
            owner: Mutex::new(owner),
            pending: Mutex::new(None),
        }
    }

    pub fn kind(&self) -> GalleryKind {
        self.kind
    }

    pub fn owner(&self) -> Option<Address> {
        *self.owner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn loaded(&self) -> usize {
        self.loaded.load(Ordering::Acquire)
    }

    pub fn total(&self) -> usize {
        self.fetcher.total()
    }

    pub fn is_fetching(&self) -> bool {
        self.fetcher.is_fetching()
    }

    pub fn snapshot(&self) -> Arc<Vec<Slot>> {
        self.fetcher.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<Vec<Slot>>> {
        self.fetcher.subscribe()
    }

    pub async fn handle(&self, event: GalleryEvent) -> Result<FetchOutcome> {
        match (self.kind, event) {
            (_, GalleryEvent::TotalChanged(total)) => Ok(self.reload(total, Resize::Preserve).await),
            (GalleryKind::All, GalleryEvent::VisibilityEntered) => Ok(self.extend().await),
            (GalleryKind::Owned, GalleryEvent::AddressChanged(owner)) => {
                *self.owner.lock().unwrap_or_else(PoisonError::into_inner) = owner;
                // 换了地址，旧地址的 token 立即作废，正在跑的会话在下一批之前停下
                self.set_pending(None);
                self.fetcher.reset(0);
                let Some(owner) = owner else {
                    return Ok(FetchOutcome::Skipped);
                };
                let balance = self.reader.balance_of(owner).await?;
                Ok(self.reload(balance, Resize::Clear).await)
            }
            (kind, event) => {
                debug!(?kind, ?event, "event ignored");
                Ok(FetchOutcome::Skipped)
            }
        }
    }

    fn set_pending(&self, total: Option<usize>) {
        *self.pending.lock().unwrap_or_else(PoisonError::into_inner) = total;
    }

    fn take_pending(&self) -> Option<usize> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    // total 变化：调整槽位，再加载第一个窗口；之后补上期间被推迟的 total
    async fn reload(&self, total: usize, resize: Resize) -> FetchOutcome {
        let outcome = self.reload_once(total, resize).await;
        self.replay_pending().await;
        outcome
    }

    // 还有会话在跑时由那个会话结束后负责补
    async fn replay_pending(&self) {
        while !self.fetcher.is_fetching() {
            let Some(total) = self.take_pending() else {
                return;
            };
            let outcome = self.reload_once(total, Resize::Preserve).await;
            debug!(total, skipped = outcome.is_skipped(), "deferred reload replayed");
        }
    }

    async fn reload_once(&self, total: usize, resize: Resize) -> FetchOutcome {
        let Some(session) = self.fetcher.try_begin_with(total, resize) else {
            // 换了集合就不能继续显示旧槽位
            if resize == Resize::Clear {
                self.fetcher.reset(total);
            }
            self.set_pending(Some(total));
            debug!(total, "fetch in progress, reload deferred");
            return FetchOutcome::Skipped;
        };
        if total == 0 {
            return FetchOutcome::Skipped;
        }
        match self.kind {
            GalleryKind::All => {
                let loaded = self.loaded().max(self.options.page_size).min(total);
                self.loaded.store(loaded, Ordering::Release);
                let window = FetchWindow::descending(total - 1, self.options.page_size)
                    .with_batch_size(self.options.batch_size);
                let source = AllTokens::new(self.reader.clone());
                FetchOutcome::Finished(self.fetcher.run(session, &source, window).await)
            }
            GalleryKind::Owned => {
                let Some(owner) = self.owner() else {
                    return FetchOutcome::Skipped;
                };
                let window =
                    FetchWindow::ascending(0, total).with_batch_size(self.options.batch_size);
                let source = OwnedTokens::new(self.reader.clone(), owner);
                FetchOutcome::Finished(self.fetcher.run(session, &source, window).await)
            }
        }
    }

    // 哨兵进入视野后加载下一页
    pub async fn extend(&self) -> FetchOutcome {
        if self.kind != GalleryKind::All {
            return FetchOutcome::Skipped;
        }
        let total = self.total();
        let loaded = self.loaded();
        let Some(window) = next_page(loaded, self.options.page_size, total) else {
            return FetchOutcome::Skipped;
        };
        let Some(session) = self.fetcher.try_begin() else {
            return FetchOutcome::Skipped;
        };
        self.loaded
            .store((loaded + self.options.page_size).min(total), Ordering::Release);
        let window = window.with_batch_size(self.options.batch_size);
        let source = AllTokens::new(self.reader.clone());
        let outcome = FetchOutcome::Finished(self.fetcher.run(session, &source, window).await);
        self.replay_pending().await;
        outcome
    }

    // 当前应当渲染的卡片
    pub fn cards(&self) -> Vec<Card> {
        let slots = self.snapshot();
        let total = slots.len();
        match self.kind {
            GalleryKind::All => slots
                .iter()
                .rev()
                .take(self.loaded().min(total))
                .enumerate()
                .map(|(position, slot)| Card::from_slot(slot, U256::from(total - (position + 1)), true))
                .collect(),
            GalleryKind::Owned => slots
                .iter()
                .enumerate()
                .map(|(index, slot)| Card::from_slot(slot, U256::from(index), false))
                .collect(),
        }
    }

    async fn read_total(&self) -> Result<Option<usize>> {
        match self.kind {
            GalleryKind::All => Ok(Some(self.reader.total_supply().await?)),
            GalleryKind::Owned => match self.owner() {
                Some(owner) => Ok(Some(self.reader.balance_of(owner).await?)),
                None => Ok(None),
            },
        }
    }

    // 轮询 totalSupply 或 balanceOf，数值变化时发出事件；接收端关闭后返回
    pub async fn watch_total(&self, events: mpsc::UnboundedSender<GalleryEvent>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        let mut last = None;
        loop {
            ticker.tick().await;
            if events.is_closed() {
                return;
            }
            match self.read_total().await {
                Ok(Some(total)) if last != Some(total) => {
                    debug!(total, "total changed");
                    last = Some(total);
                    if events.send(GalleryEvent::TotalChanged(total)).is_err() {
                        return;
                    }
                }
                Ok(_) => {}
                Err(err) => warn!(error = %err, "failed to read collection size"),
            }
        }
    }
}

impl<C> Gallery<C>
where
    C: CollectionReader + ?Sized + 'static,
{
    // 每个事件单独一个任务，会话进行中时后来的触发会被丢弃而不是排队
    pub async fn drive(self: Arc<Self>, mut events: mpsc::UnboundedReceiver<GalleryEvent>) {
        let mut tasks = JoinSet::new();
        loop {
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else { break };
                    let gallery = self.clone();
                    tasks.spawn(async move {
                        match gallery.handle(event.clone()).await {
                            Ok(FetchOutcome::Finished(report)) => {
                                info!(?event, resolved = report.resolved.len(), "event handled");
                            }
                            Ok(FetchOutcome::Skipped) => debug!(?event, "event skipped"),
                            Err(err) => warn!(?event, error = %err, "event failed"),
                        }
                    });
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(err) = joined {
                        warn!(error = %err, "gallery task failed");
                    }
                }
            }
        }
        while let Some(joined) = tasks.join_next().await {
            if let Err(err) = joined {
                warn!(error = %err, "gallery task failed");
            }
        }
    }
}
