//! 请求ID上下文管理
//!
//! 使用 `tokio::task_local` 提供与Web框架无关的请求ID上下文管理。
//! 每个请求在自己的任务作用域中持有至多一个请求ID，并发请求之间互不可见；
//! 通过 [`spawn`] 派生的子任务在派生时继承父任务的值。
//!
//! 不在任何任务作用域内、也不在 Tokio 运行时中时（例如独立的同步线程），退回到当前线程的隐式作用域。
//! 运行时的工作线程被多个任务共享，因此在那里不提供线程级的值。

use crate::request_id::RequestId;
use crate::sink::{self, REQUEST_ID_TAG};
use std::cell::RefCell;
use std::future::Future;
use tokio::task::JoinHandle;
use tokio::task_local;

// 使用tokio的task_local来存储当前请求的request_id
task_local! {
    static CURRENT_REQUEST_ID: RefCell<Option<RequestId>>;
}

thread_local! {
    static THREAD_REQUEST_ID: RefCell<Option<RequestId>> = const { RefCell::new(None) };
}

/// 获取当前请求ID
///
/// 优先读取当前任务作用域；不在任务作用域内时，只有在运行时之外的线程上才读取线程级的值。
///
/// # 返回
/// 当前作用域（或继承自父作用域）的请求ID，从未设置时返回None
pub fn get_request_id() -> Option<RequestId> {
    CURRENT_REQUEST_ID
        .try_with(|slot| slot.borrow().clone())
        .unwrap_or_else(|_| {
            if on_runtime_thread() {
                None
            } else {
                THREAD_REQUEST_ID.with(|slot| slot.borrow().clone())
            }
        })
}

/// 设置当前请求ID
///
/// 只影响调用者所在的作用域，然后把ID作为 `request_id` 标签转发给错误上报端。
/// 转发是尽力而为的，不会阻塞或失败。
///
/// 在运行时中但不在任何请求作用域内调用时，只记录警告，不绑定也不转发。
///
/// # 参数
/// * `request_id` - 要绑定的请求ID
pub fn set_request_id(request_id: RequestId) {
    let bound_to_task = CURRENT_REQUEST_ID
        .try_with(|slot| *slot.borrow_mut() = Some(request_id.clone()))
        .is_ok();

    if !bound_to_task {
        // 工作线程被多个任务共享，线程级的值会被其他任务看到
        if on_runtime_thread() {
            tracing::warn!(request_id = %request_id, "RequestId set outside a request scope on a runtime thread; ignored. Use `with_request_id` or `with_request_scope`.");
            return;
        }
        THREAD_REQUEST_ID.with(|slot| *slot.borrow_mut() = Some(request_id.clone()));
    }

    sink::forward_tag(REQUEST_ID_TAG, request_id.as_str());
}

fn on_runtime_thread() -> bool {
    tokio::runtime::Handle::try_current().is_ok()
}

/// 生成新的请求ID
///
/// 纯函数，不读写上下文
pub fn generate_request_id() -> RequestId {
    RequestId::new()
}

/// 在指定的请求上下文中执行异步操作
///
/// 进入一个新的作用域并通过 [`set_request_id`] 绑定ID（因此会通知错误上报端）。
/// 嵌套调用会遮蔽外层的值，退出后恢复。
///
/// # 参数
/// * `request_id` - 要设置的请求ID
/// * `future` - 要执行的异步操作
///
/// # 返回
/// 异步操作的结果
pub async fn with_request_id<F, T>(request_id: RequestId, future: F) -> T
where
    F: Future<Output = T>,
{
    CURRENT_REQUEST_ID
        .scope(RefCell::new(None), async move {
            set_request_id(request_id);
            future.await
        })
        .await
}

/// 在一个空的请求作用域中执行异步操作
///
/// 作用域内 `get_request_id()` 初始为None，`set_request_id` 只影响这个作用域。
pub async fn with_request_scope<F, T>(future: F) -> T
where
    F: Future<Output = T>,
{
    CURRENT_REQUEST_ID.scope(RefCell::new(None), future).await
}

/// 在同步作用域中执行闭包
///
/// # 参数
/// * `request_id` - 作用域的初始值
/// * `f` - 要执行的闭包
pub fn sync_scope<F, R>(request_id: Option<RequestId>, f: F) -> R
where
    F: FnOnce() -> R,
{
    CURRENT_REQUEST_ID.sync_scope(RefCell::new(request_id), f)
}

/// 派生继承当前请求ID的子任务
///
/// 子任务得到派生时刻的值的副本，之后双方的修改互不影响。
/// 直接使用 `tokio::spawn` 的任务不会继承请求ID。
pub fn spawn<F>(future: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    let inherited = get_request_id();
    tokio::spawn(CURRENT_REQUEST_ID.scope(RefCell::new(inherited), future))
}
