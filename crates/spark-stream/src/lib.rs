#![doc = r#"
# spark-stream

## 模块使命（Why）
- **统一字节流契约**：为套接字、串口与任意描述符端点定义同一组同步能力（读、写、可读量、可写量），
  上层逻辑只面向 [`ByteStream`] 编程。
- **独占所有权**：以 [`OwnedHandle`] 表达“一个描述符至多一个存活所有者”，析构即关闭，
  杜绝重复关闭与泄漏。

## 核心契约（What）
- `read`/`write` 返回实际字节数；非阻塞句柄上的“暂无数据/暂无空间”统一为 `Ok(0)`；
- `can_read`/`can_write` 为零超时查询，永不阻塞；
- 所有失败携带稳定错误码（`spark.stream.*`）与原始 errno，见 [`IoError`]。

## 实现策略（How）
- 直接调用 POSIX `read`/`write`/`poll`/`ioctl`/`fcntl`，`EINTR` 自动重试，`EAGAIN` 吸收为 `Ok(0)`；
- 描述符关闭完全委托给 `std::os::fd::OwnedFd`。

## 风险提示（Trade-offs）
- 仅支持类 Unix 平台；
- 端点不是线程安全的，跨线程共享需调用方自行加锁。
"#]

pub mod error;
pub mod fd;
pub mod handle;
pub mod poll;
pub mod stream;

pub use error::{IoError, OperationKind, drive_io};
pub use fd::FdStream;
pub use handle::{OwnedHandle, UNSET_FD};
pub use stream::ByteStream;
