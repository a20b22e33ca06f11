use crate::error::IoError;

/// 所有端点共享的同步字节流能力集。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 描述符流、套接字与串口以同一组四个操作对外暴露，调用方只面向能力编程；
/// - 变体在构造时确定，不依赖运行期类型探测。
///
/// ## 契约（What）
/// - `read`/`write`：返回实际读写的字节数；非阻塞句柄上的“暂无数据/暂无空间”返回 `Ok(0)`，
///   其余失败返回 `Self::Error`，写入可能少于请求长度，由调用方负责补写；
/// - `can_read`/`can_write`：零超时查询，永不阻塞，报告内核当前可读字节数或可写余量；
/// - `Error`：实现专属的错误类型，必须能无损转换为 [`IoError`]，以便跨端点统一处理。
///
/// ## 风险提示（Trade-offs）
/// - 同一端点不支持无同步的并发使用：读写与就绪查询共享同一描述符；
/// - 阻塞模式下 `read` 返回 `Ok(0)` 表示对端结束，非阻塞模式下与“暂无数据”无法区分，
///   需要结合 `can_read` 判断。
pub trait ByteStream {
    /// 端点专属的错误类型。
    type Error: std::error::Error + Into<IoError> + Send + Sync + 'static;

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;

    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error>;

    fn can_read(&self) -> Result<usize, Self::Error>;

    fn can_write(&self) -> Result<usize, Self::Error>;

    /// 循环写入直至全部完成或遇到“暂无空间”，返回已写入的字节数。
    ///
    /// 阻塞句柄上返回值总是等于 `buf.len()`；非阻塞句柄在缓冲区写满时提前返回。
    fn write_all(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        let mut written = 0;
        while written < buf.len() {
            match self.write(&buf[written..])? {
                0 => break,
                n => written += n,
            }
        }
        Ok(written)
    }

    fn write_str(&mut self, text: &str) -> Result<usize, Self::Error> {
        self.write_all(text.as_bytes())
    }
}

impl<S: ByteStream + ?Sized> ByteStream for &mut S {
    type Error = S::Error;

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        (**self).read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        (**self).write(buf)
    }

    fn can_read(&self) -> Result<usize, Self::Error> {
        (**self).can_read()
    }

    fn can_write(&self) -> Result<usize, Self::Error> {
        (**self).can_write()
    }
}
