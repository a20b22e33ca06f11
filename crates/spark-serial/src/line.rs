//! 带预读缓冲的行切分器。
//!
//! # 教案式说明
//! - **意图（Why）**：行读取与原始字节读取需要在同一端点上透明混用；越过行尾读到的字节必须
//!   保留给下一次调用，而不是丢弃。
//! - **逻辑（How）**：[`LineReader`] 只持有预读队列，底层读取委托给任意 [`ByteStream`]；
//!   每次以 1024 字节为块读取并扫描 `\n`。
//! - **契约（What）**：返回的行去掉结尾连续的 `\r`/`\n`；流结束或出错前若已积累内容，
//!   则返回这段不完整的行；非 UTF-8 字节以替换字符呈现。
//!
//! 非阻塞流上 `read` 的 `Ok(0)` 与 EOF 无法区分，此时同样返回已积累的内容。

use spark_stream::ByteStream;

const CHUNK_SIZE: usize = 1024;

/// 行切分状态，可复用于任意字节流。
#[derive(Debug, Default, Clone)]
pub struct LineReader {
    lookahead: Vec<u8>,
}

impl LineReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// 尚未消费的预读字节。
    pub fn buffered(&self) -> &[u8] {
        &self.lookahead
    }

    pub fn has_buffered(&self) -> bool {
        !self.lookahead.is_empty()
    }

    /// 把预读字节搬入 `buf`，返回搬运数量；预读为空时返回 0。
    pub fn read_buffered(&mut self, buf: &mut [u8]) -> usize {
        let n = buf.len().min(self.lookahead.len());
        buf[..n].copy_from_slice(&self.lookahead[..n]);
        self.lookahead.drain(..n);
        n
    }

    /// 读取下一行。
    ///
    /// 错误发生时若尚未积累任何内容则原样返回错误，否则返回已积累的部分行。
    pub fn read_line<S>(&mut self, stream: &mut S) -> Result<String, S::Error>
    where
        S: ByteStream + ?Sized,
    {
        if let Some(newline) = find_newline(&self.lookahead) {
            let rest = self.lookahead.split_off(newline + 1);
            let line = std::mem::replace(&mut self.lookahead, rest);
            return Ok(finish(line));
        }

        let mut line = std::mem::take(&mut self.lookahead);
        let mut chunk = [0u8; CHUNK_SIZE];
        loop {
            let n = match stream.read(&mut chunk) {
                Ok(0) => return Ok(finish(line)),
                Ok(n) => n,
                Err(err) if line.is_empty() => return Err(err),
                Err(_) => return Ok(finish(line)),
            };
            let chunk = &chunk[..n];
            match find_newline(chunk) {
                Some(newline) => {
                    line.extend_from_slice(&chunk[..newline]);
                    self.lookahead.extend_from_slice(&chunk[newline + 1..]);
                    return Ok(finish(line));
                }
                None => line.extend_from_slice(chunk),
            }
        }
    }
}

fn find_newline(bytes: &[u8]) -> Option<usize> {
    bytes.iter().position(|&byte| byte == b'\n')
}

fn finish(mut line: Vec<u8>) -> String {
    while matches!(line.last(), Some(b'\r' | b'\n')) {
        line.pop();
    }
    match String::from_utf8(line) {
        Ok(text) => text,
        Err(err) => String::from_utf8_lossy(err.as_bytes()).into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use spark_stream::IoError;
    use std::collections::VecDeque;
    use std::io;

    /// 按预设分块交付数据的字节流；分块耗尽后报告 EOF 或预设错误。
    struct Scripted {
        chunks: VecDeque<Vec<u8>>,
        fail_at_end: bool,
    }

    impl Scripted {
        fn new(data: &[u8], cuts: &[usize]) -> Self {
            let mut chunks = VecDeque::new();
            let mut start = 0;
            for &cut in cuts {
                let cut = cut.clamp(start, data.len());
                if cut > start {
                    chunks.push_back(data[start..cut].to_vec());
                    start = cut;
                }
            }
            if start < data.len() {
                chunks.push_back(data[start..].to_vec());
            }
            Self {
                chunks,
                fail_at_end: false,
            }
        }
    }

    impl ByteStream for Scripted {
        type Error = IoError;

        fn read(&mut self, buf: &mut [u8]) -> Result<usize, IoError> {
            let Some(mut chunk) = self.chunks.pop_front() else {
                if self.fail_at_end {
                    return Err(IoError::new(
                        spark_stream::error::READ,
                        io::Error::from_raw_os_error(nix::libc::EIO),
                    ));
                }
                return Ok(0);
            };
            let n = buf.len().min(chunk.len());
            buf[..n].copy_from_slice(&chunk[..n]);
            if n < chunk.len() {
                self.chunks.push_front(chunk.split_off(n));
            }
            Ok(n)
        }

        fn write(&mut self, buf: &[u8]) -> Result<usize, IoError> {
            Ok(buf.len())
        }

        fn can_read(&self) -> Result<usize, IoError> {
            Ok(self.chunks.iter().map(Vec::len).sum())
        }

        fn can_write(&self) -> Result<usize, IoError> {
            Ok(usize::MAX)
        }
    }

    fn lines_of(stream: &mut Scripted, count: usize) -> Vec<String> {
        let mut reader = LineReader::new();
        (0..count)
            .map(|_| reader.read_line(stream).expect("read line"))
            .collect()
    }

    #[test]
    fn splits_mixed_line_endings() {
        let mut stream = Scripted::new(b"ABC\r\nDEF\nGHI", &[]);
        assert_eq!(lines_of(&mut stream, 3), ["ABC", "DEF", "GHI"]);
    }

    #[test]
    fn lookahead_is_served_before_the_stream() {
        let mut stream = Scripted::new(b"one\ntwo\nthree", &[]);
        let mut reader = LineReader::new();
        assert_eq!(reader.read_line(&mut stream).expect("line"), "one");
        assert_eq!(reader.buffered(), b"two\nthree");

        let mut buf = [0u8; 3];
        assert_eq!(reader.read_buffered(&mut buf), 3);
        assert_eq!(&buf, b"two");
        assert_eq!(reader.read_line(&mut stream).expect("line"), "");
        assert_eq!(reader.read_line(&mut stream).expect("line"), "three");
        assert!(!reader.has_buffered());
    }

    #[test]
    fn lookahead_line_strips_carriage_return() {
        let mut stream = Scripted::new(b"a\r\nb\r\n", &[]);
        let mut reader = LineReader::new();
        assert_eq!(reader.read_line(&mut stream).expect("line"), "a");
        assert_eq!(reader.read_line(&mut stream).expect("line"), "b");
    }

    #[test]
    fn error_with_partial_line_returns_partial() {
        let mut stream = Scripted::new(b"partial", &[]);
        stream.fail_at_end = true;
        let mut reader = LineReader::new();
        assert_eq!(reader.read_line(&mut stream).expect("partial"), "partial");
        let err = reader.read_line(&mut stream).expect_err("nothing accumulated");
        assert_eq!(err.errno(), Some(nix::libc::EIO));
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let mut stream = Scripted::new(b"ok\xff\n", &[]);
        assert_eq!(lines_of(&mut stream, 1), ["ok\u{fffd}"]);
    }

    #[test]
    fn long_line_spans_many_chunks() {
        let mut data = vec![b'x'; 3 * CHUNK_SIZE + 17];
        data.extend_from_slice(b"\r\nnext\n");
        let mut stream = Scripted::new(&data, &[]);
        let lines = lines_of(&mut stream, 2);
        assert_eq!(lines[0].len(), 3 * CHUNK_SIZE + 17);
        assert_eq!(lines[1], "next");
    }

    proptest! {
        /// 无论数据如何被切分，三次读取都得到同样的三行。
        #[test]
        fn chunk_boundaries_do_not_matter(cuts in proptest::collection::vec(0usize..13, 0..8)) {
            let mut cuts = cuts;
            cuts.sort_unstable();
            let mut stream = Scripted::new(b"ABC\r\nDEF\nGHI", &cuts);
            prop_assert_eq!(lines_of(&mut stream, 3), ["ABC", "DEF", "GHI"]);
        }

        /// 任意不含换行的行，以任意行尾拼接后都能被原样切回。
        #[test]
        fn arbitrary_lines_round_trip(
            lines in proptest::collection::vec("[a-zA-Z0-9 ]{0,40}", 1..10),
            crlf in any::<bool>(),
            cuts in proptest::collection::vec(0usize..512, 0..16),
        ) {
            let ending = if crlf { "\r\n" } else { "\n" };
            let text: String = lines.iter().map(|line| format!("{line}{ending}")).collect();
            let mut cuts = cuts;
            cuts.sort_unstable();
            let mut stream = Scripted::new(text.as_bytes(), &cuts);
            prop_assert_eq!(lines_of(&mut stream, lines.len()), lines);
        }
    }
}
