//! 错误上报端（sink）的标签转发
//!
//! 每次设置请求ID时，会把 `("request_id", id)` 转发给已安装的错误上报端。
//! 转发是尽力而为的：未安装、未激活、阻塞或 panic 的上报端都不会影响请求处理。

use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::sync::{Arc, PoisonError, RwLock};
use std::thread;

/// 转发请求ID时使用的标签名
pub const REQUEST_ID_TAG: &str = "request_id";

/// 后台队列容量，队列满时新的标签直接丢弃
const QUEUE_CAPACITY: usize = 1024;

/// 标签的投递方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// 在调用者线程上同步调用，只适用于纯内存操作的上报端
    Inline,
    /// 通过有界队列交给后台线程处理，调用者永远不会等待
    Background,
}

/// 错误上报端接口
///
/// 只有 `is_active()` 返回 true 时才会调用 `record_tag`。
pub trait TagSink: Send + Sync + 'static {
    /// 上报端是否已初始化
    fn is_active(&self) -> bool;

    /// 记录一个标签
    fn record_tag(&self, key: &str, value: &str);

    /// 投递方式，默认走后台队列
    fn dispatch(&self) -> Dispatch {
        Dispatch::Background
    }
}

#[derive(Clone)]
enum Route {
    Inline,
    Queue(SyncSender<(&'static str, String)>),
    Unavailable,
}

struct Installed {
    sink: Arc<dyn TagSink>,
    route: Route,
}

static SINK: RwLock<Option<Installed>> = RwLock::new(None);

/// 安装全局错误上报端，替换之前安装的上报端
///
/// 旧上报端的后台线程会在队列排空后退出。
pub fn install_sink<T: TagSink>(sink: T) {
    let sink: Arc<dyn TagSink> = Arc::new(sink);
    let route = match sink.dispatch() {
        Dispatch::Inline => Route::Inline,
        Dispatch::Background => spawn_worker(Arc::clone(&sink)),
    };

    let mut slot = SINK.write().unwrap_or_else(PoisonError::into_inner);
    *slot = Some(Installed { sink, route });
}

/// 卸载全局错误上报端
///
/// # 返回
/// 之前是否安装过上报端
pub fn uninstall_sink() -> bool {
    let mut slot = SINK.write().unwrap_or_else(PoisonError::into_inner);
    slot.take().is_some()
}

/// 把标签转发给已安装的上报端，不会阻塞也不会失败
pub(crate) fn forward_tag(key: &'static str, value: &str) {
    let (sink, route) = {
        let slot = SINK.read().unwrap_or_else(PoisonError::into_inner);
        match slot.as_ref() {
            Some(installed) => (Arc::clone(&installed.sink), installed.route.clone()),
            None => return,
        }
    };

    match route {
        Route::Inline => deliver(sink.as_ref(), key, value),
        Route::Queue(queue) => match queue.try_send((key, value.to_string())) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                tracing::debug!(key, "Error sink queue is full, dropping tag");
            }
            Err(TrySendError::Disconnected(_)) => {
                tracing::debug!(key, "Error sink worker has stopped, dropping tag");
            }
        },
        Route::Unavailable => {}
    }
}

fn spawn_worker(sink: Arc<dyn TagSink>) -> Route {
    let (tx, rx) = mpsc::sync_channel::<(&'static str, String)>(QUEUE_CAPACITY);
    let spawned = thread::Builder::new()
        .name("request-id-sink".to_string())
        .spawn(move || {
            for (key, value) in rx {
                deliver(sink.as_ref(), key, &value);
            }
        });

    match spawned {
        Ok(_) => Route::Queue(tx),
        Err(err) => {
            tracing::warn!(error = %err, "Failed to start error sink worker; request ID tags will not be forwarded");
            Route::Unavailable
        }
    }
}

fn deliver(sink: &dyn TagSink, key: &str, value: &str) {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        if sink.is_active() {
            sink.record_tag(key, value);
        }
    }));
    if outcome.is_err() {
        tracing::warn!(key, "Error sink panicked while recording a tag; ignored");
    }
}
