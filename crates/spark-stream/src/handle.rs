//! 独占式描述符句柄。
//!
//! # 教案式说明
//! - **意图（Why）**：把“至多一个存活所有者、析构即关闭”的约束交给类型系统，
//!   端点之间转移句柄时只能移动，不能复制。
//! - **逻辑（How）**：内部以 `Option<OwnedFd>` 保存描述符，`None` 即“未设置”哨兵；
//!   关闭动作全部委托给 `OwnedFd::drop`，保证每个描述符恰好关闭一次。
//! - **契约（What）**：`get` 在未设置时返回 [`UNSET_FD`]；`reset` 与析构对哨兵均为空操作；
//!   任何方法都不会 panic。

use std::fmt;
use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, IntoRawFd, OwnedFd, RawFd};

use tracing::trace;

/// 未设置句柄时 [`OwnedHandle::get`] 返回的哨兵值。
pub const UNSET_FD: RawFd = -1;

/// 独占持有一个 OS 描述符的句柄。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 为描述符流、套接字与串口端点提供统一的所有权基座；
/// - 在 Rust 的移动语义之外，额外提供 [`OwnedHandle::take`] 以在运行期显式转移并使源失效。
///
/// ## 契约（What）
/// - `get`：读取原始描述符，仅用于系统调用参数，不转移所有权；
/// - `set`：接管新描述符，先关闭旧值；
/// - `reset`：关闭并回到未设置状态；
/// - `try_clone`：经由 OS `dup` 复制，得到另一个独立所有者；
/// - 相等性按原始描述符数值比较，两个未设置句柄彼此相等。
#[derive(Default)]
pub struct OwnedHandle {
    fd: Option<OwnedFd>,
}

impl OwnedHandle {
    /// 创建未设置的句柄。
    pub const fn unset() -> Self {
        Self { fd: None }
    }

    pub fn get(&self) -> RawFd {
        self.fd.as_ref().map_or(UNSET_FD, AsRawFd::as_raw_fd)
    }

    pub fn is_set(&self) -> bool {
        self.fd.is_some()
    }

    /// 接管 `fd`，若此前持有描述符则先将其关闭。
    pub fn set(&mut self, fd: OwnedFd) {
        if let Some(previous) = self.fd.replace(fd) {
            trace!(fd = previous.as_raw_fd(), "closing replaced descriptor");
        }
    }

    /// 关闭当前描述符；对未设置的句柄无任何效果。
    pub fn reset(&mut self) {
        if let Some(fd) = self.fd.take() {
            trace!(fd = fd.as_raw_fd(), "closing descriptor");
        }
    }

    /// 取出描述符所有权，句柄随即回到未设置状态。
    pub fn take(&mut self) -> Option<OwnedFd> {
        self.fd.take()
    }

    /// 借出底层 `OwnedFd`，供 `socket2::SockRef` 等借用型包装使用。
    pub fn fd(&self) -> Option<&OwnedFd> {
        self.fd.as_ref()
    }

    pub fn as_fd(&self) -> Option<BorrowedFd<'_>> {
        self.fd.as_ref().map(AsFd::as_fd)
    }

    /// 通过 OS 复制描述符；未设置的句柄复制结果仍为未设置。
    pub fn try_clone(&self) -> io::Result<Self> {
        match &self.fd {
            Some(fd) => Ok(Self::from(fd.try_clone()?)),
            None => Ok(Self::unset()),
        }
    }
}

impl From<OwnedFd> for OwnedHandle {
    fn from(fd: OwnedFd) -> Self {
        Self { fd: Some(fd) }
    }
}

impl FromRawFd for OwnedHandle {
    /// 负数描述符被视为哨兵，得到未设置的句柄。
    ///
    /// # Safety
    /// 非负的 `fd` 必须是调用方独占持有、尚未关闭的描述符。
    unsafe fn from_raw_fd(fd: RawFd) -> Self {
        if fd < 0 {
            return Self::unset();
        }
        // SAFETY: 调用方保证 `fd` 打开且所有权已转交本句柄。
        Self::from(unsafe { OwnedFd::from_raw_fd(fd) })
    }
}

impl AsRawFd for OwnedHandle {
    fn as_raw_fd(&self) -> RawFd {
        self.get()
    }
}

impl IntoRawFd for OwnedHandle {
    fn into_raw_fd(mut self) -> RawFd {
        self.take().map_or(UNSET_FD, IntoRawFd::into_raw_fd)
    }
}

impl PartialEq for OwnedHandle {
    fn eq(&self, other: &Self) -> bool {
        self.get() == other.get()
    }
}

impl Eq for OwnedHandle {}

impl fmt::Debug for OwnedHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("OwnedHandle").field(&self.get()).finish()
    }
}
