use std::{
    panic::AssertUnwindSafe,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
};

use alloy_primitives::U256;
use async_trait::async_trait;
use futures::{future::join_all, FutureExt};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::{
    error::{GalleryError, Result},
    item::{Item, Location, Slot, Stage},
    metadata::MetadataSource,
    notify::{Notification, Notifier},
};

pub const DEFAULT_BATCH_SIZE: usize = 10;

// 按下标解析 token，第二步读取 owner 和 tokenURI
#[async_trait]
pub trait IndexResolver: Send + Sync {
    async fn identify(&self, index: usize) -> Result<U256>;
    async fn locate(&self, token_id: U256) -> Result<Location>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    // 最新的 token 在前
    Descending,
    Ascending,
}

// 一次会话要解析的下标范围
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FetchWindow {
    pub start: usize,
    pub count: usize,
    pub batch_size: usize,
    pub direction: Direction,
}

impl FetchWindow {
    pub fn descending(start: usize, count: usize) -> Self {
        Self {
            start,
            count,
            batch_size: DEFAULT_BATCH_SIZE,
            direction: Direction::Descending,
        }
    }

    pub fn ascending(start: usize, count: usize) -> Self {
        Self {
            start,
            count,
            batch_size: DEFAULT_BATCH_SIZE,
            direction: Direction::Ascending,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    // 切分批次，越界的下标全部裁掉
    pub fn batches(&self, total: usize) -> Vec<Vec<usize>> {
        if total == 0 || self.count == 0 {
            return Vec::new();
        }
        let indices: Vec<usize> = match self.direction {
            Direction::Descending => {
                let start = self.start.min(total - 1);
                let count = self.count.min(start + 1);
                (start + 1 - count..=start).rev().collect()
            }
            Direction::Ascending => {
                if self.start >= total {
                    return Vec::new();
                }
                let end = self.start.saturating_add(self.count).min(total);
                (self.start..end).collect()
            }
        };
        indices
            .chunks(self.batch_size.max(1))
            .map(<[usize]>::to_vec)
            .collect()
    }
}

// 下一页的窗口，已经全部加载时返回 None
pub fn next_page(loaded: usize, step: usize, total: usize) -> Option<FetchWindow> {
    if step == 0 || loaded >= total {
        return None;
    }
    Some(FetchWindow::descending(total - loaded - 1, step))
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionReport {
    pub batches: usize,
    // 至少拿到了 token id 的下标
    pub resolved: Vec<usize>,
    // 第一步就失败，槽位保持未解析
    pub failed: Vec<usize>,
    // 拿到 id 但后续阶段失败
    pub incomplete: Vec<usize>,
    pub failed_batches: usize,
    // 结果到达时世代已经变了，写入被丢弃
    pub discarded: Vec<usize>,
    pub superseded: bool,
}

impl SessionReport {
    fn record(&mut self, index: usize, stage: Option<Stage>) {
        match stage {
            None => self.discarded.push(index),
            Some(Stage::Unresolved) => self.failed.push(index),
            Some(Stage::Identified | Stage::Located) => {
                self.resolved.push(index);
                self.incomplete.push(index);
            }
            Some(Stage::Complete) => self.resolved.push(index),
        }
    }
}

// 调整槽位数量时如何处理已有的槽位
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resize {
    // 同一个集合变大或变小，范围内的槽位保留
    Preserve,
    // 换成了另一个集合，全部清空
    Clear,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FetchOutcome {
    // 已有会话在跑，或者前置条件不满足
    Skipped,
    Finished(SessionReport),
}

impl FetchOutcome {
    pub fn is_skipped(&self) -> bool {
        matches!(self, FetchOutcome::Skipped)
    }

    pub fn report(&self) -> Option<&SessionReport> {
        match self {
            FetchOutcome::Finished(report) => Some(report),
            FetchOutcome::Skipped => None,
        }
    }
}

// 正在运行的会话，drop 时释放进行中标记
pub struct Session<'a> {
    fetcher: &'a Fetcher,
    generation: u64,
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        self.fetcher.in_progress.store(false, Ordering::Release);
    }
}

// 分批并发解析集合，结果通过 watch 通道发布快照
pub struct Fetcher {
    slots: watch::Sender<Arc<Vec<Slot>>>,
    generation: AtomicU64,
    in_progress: AtomicBool,
    metadata: Arc<dyn MetadataSource>,
    notifier: Arc<dyn Notifier>,
}

impl Fetcher {
    pub fn new(metadata: Arc<dyn MetadataSource>, notifier: Arc<dyn Notifier>) -> Self {
        let (slots, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            slots,
            generation: AtomicU64::new(0),
            in_progress: AtomicBool::new(false),
            metadata,
            notifier,
        }
    }

    // 调整为 total 个槽位：缩小时丢弃越界的，扩大时保留已有的
    pub fn initialize(&self, total: usize) {
        self.resize(total, Resize::Preserve);
    }

    // 调整为 total 个未解析的槽位
    pub fn reset(&self, total: usize) {
        self.resize(total, Resize::Clear);
    }

    // 每次调整都进入新的世代，返回新世代
    fn resize(&self, total: usize, policy: Resize) -> u64 {
        let mut generation = 0;
        self.slots.send_modify(|slots| {
            generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
            let kept = match policy {
                Resize::Preserve => total,
                Resize::Clear => 0,
            };
            let mut next: Vec<Slot> = slots.iter().take(kept).cloned().collect();
            next.resize(total, Slot::Unresolved);
            *slots = Arc::new(next);
        });
        debug!(total, ?policy, "slots initialized");
        generation
    }

    pub fn snapshot(&self) -> Arc<Vec<Slot>> {
        self.slots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<Vec<Slot>>> {
        self.slots.subscribe()
    }

    pub fn total(&self) -> usize {
        self.slots.borrow().len()
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn is_fetching(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    // 同一时间只允许一个会话，抢不到直接返回 None
    pub fn try_begin(&self) -> Option<Session<'_>> {
        self.in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        Some(Session {
            fetcher: self,
            generation: self.generation(),
        })
    }

    // 先抢到会话再调整槽位，抢不到时不动槽位和世代，正在跑的会话不受影响
    pub fn try_begin_with(&self, total: usize, policy: Resize) -> Option<Session<'_>> {
        let mut session = self.try_begin()?;
        session.generation = self.resize(total, policy);
        Some(session)
    }

    pub async fn fetch_range<R>(&self, resolver: &R, window: FetchWindow) -> FetchOutcome
    where
        R: IndexResolver + ?Sized,
    {
        match self.try_begin() {
            Some(session) => FetchOutcome::Finished(self.run(session, resolver, window).await),
            None => {
                debug!(?window, "fetch already in progress, trigger dropped");
                FetchOutcome::Skipped
            }
        }
    }

    // 批次之间严格串行，批次内部并发
    pub(crate) async fn run<R>(&self, session: Session<'_>, resolver: &R, window: FetchWindow) -> SessionReport
    where
        R: IndexResolver + ?Sized,
    {
        // 会话的世代只对发放它的 fetcher 有意义
        debug_assert!(
            std::ptr::eq(session.fetcher, self),
            "session belongs to another fetcher"
        );
        let batches = window.batches(self.total());
        info!(
            start = window.start,
            count = window.count,
            batches = batches.len(),
            direction = ?window.direction,
            "fetch session started"
        );

        let mut report = SessionReport::default();
        for batch in batches {
            // 期间 total 变化过，剩下的批次不再请求
            if self.generation() != session.generation {
                debug!("fetch session superseded by a newer generation");
                report.superseded = true;
                break;
            }
            debug!(first = batch[0], last = batch[batch.len() - 1], "resolving batch");

            let work = join_all(
                batch
                    .iter()
                    .map(|&index| self.resolve_slot(&session, resolver, index)),
            );
            match AssertUnwindSafe(work).catch_unwind().await {
                Ok(outcomes) => {
                    for (index, stage) in outcomes {
                        report.record(index, stage);
                    }
                }
                Err(_) => {
                    warn!(first = batch[0], "batch panicked");
                    self.notifier
                        .notify(Notification::error("Error processing NFT batch"));
                    report.failed_batches += 1;
                }
            }
            report.batches += 1;
        }

        info!(
            resolved = report.resolved.len(),
            failed = report.failed.len(),
            discarded = report.discarded.len(),
            "fetch session finished"
        );
        report
    }

    // 返回槽位停留的阶段；写入被新世代丢弃时返回 None，后面的阶段也不再请求
    async fn resolve_slot<R>(
        &self,
        session: &Session<'_>,
        resolver: &R,
        index: usize,
    ) -> (usize, Option<Stage>)
    where
        R: IndexResolver + ?Sized,
    {
        // 第一步：下标换 token id
        let token_id = match resolver.identify(index).await {
            Ok(token_id) => token_id,
            Err(err) => {
                self.report_failure(format!("Error fetching NFT #{index}"), &err);
                return (index, Some(Stage::Unresolved));
            }
        };
        if !self.write(session.generation, index, Item::IdentifierOnly { token_id }) {
            return (index, None);
        }

        // 第二步：owner 和 tokenURI
        let Location { owner, uri } = match resolver.locate(token_id).await {
            Ok(location) => location,
            Err(err) => {
                self.report_failure(format!("Error fetching NFT #{token_id}"), &err);
                return (index, Some(Stage::Identified));
            }
        };
        let located = Item::WithOwnerAndUri {
            token_id,
            owner,
            uri: uri.clone(),
        };
        if !self.write(session.generation, index, located) {
            return (index, None);
        }

        // 第三步：元数据文档
        match self.metadata.fetch(&uri).await {
            Ok(metadata) => {
                let complete = Item::Complete {
                    token_id,
                    owner,
                    uri,
                    metadata,
                };
                let stage = self
                    .write(session.generation, index, complete)
                    .then_some(Stage::Complete);
                (index, stage)
            }
            Err(err) => {
                self.report_failure("Error fetching NFT metadata".to_owned(), &err);
                (index, Some(Stage::Located))
            }
        }
    }

    // 读最新快照、写入修改后的副本，旧世代的结果直接丢弃
    fn write(&self, generation: u64, index: usize, item: Item) -> bool {
        self.slots.send_if_modified(|slots| {
            if self.generation() != generation || index >= slots.len() {
                return false;
            }
            Arc::make_mut(slots)[index] = Slot::Resolved(item);
            true
        })
    }

    fn report_failure(&self, message: String, err: &GalleryError) {
        warn!(error = %err, "{message}");
        self.notifier.notify(Notification::error(message));
    }
}
