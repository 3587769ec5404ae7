//! 测试用的最小 RESP 服务端，用来模拟慢响应和断线的 Redis
#![allow(dead_code)]

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use inspection_guard::config::RedisSettings;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

/// 对一条命令的回应
pub enum Reply {
    Raw(Vec<u8>),
    /// 不回应，直接断开连接
    Close,
}

impl Reply {
    pub fn ok() -> Self {
        Reply::Raw(b"+OK\r\n".to_vec())
    }

    pub fn error(message: &str) -> Self {
        Reply::Raw(format!("-{message}\r\n").into_bytes())
    }

    pub fn integer(n: i64) -> Self {
        Reply::Raw(format!(":{n}\r\n").into_bytes())
    }

    pub fn integers(values: &[i64]) -> Self {
        let mut out = format!("*{}\r\n", values.len());
        for v in values {
            out.push_str(&format!(":{v}\r\n"));
        }
        Reply::Raw(out.into_bytes())
    }

    /// SCAN 的一页结果：下一个游标和本页键
    pub fn scan_page(cursor: u64, keys: &[&str]) -> Self {
        let cursor = cursor.to_string();
        let mut out = format!("*2\r\n${}\r\n{}\r\n*{}\r\n", cursor.len(), cursor, keys.len());
        for key in keys {
            out.push_str(&format!("${}\r\n{}\r\n", key.len(), key));
        }
        Reply::Raw(out.into_bytes())
    }
}

type Handler = Arc<dyn Fn(Vec<String>) -> Pin<Box<dyn Future<Output = Reply> + Send>> + Send + Sync>;

pub struct FakeRedis {
    pub url: String,
    connections: Arc<AtomicUsize>,
}

impl FakeRedis {
    /// 启动服务端；`CLIENT` 握手命令总是回 OK，其余命令交给 `respond`
    pub async fn start<F, Fut>(respond: F) -> Self
    where
        F: Fn(Vec<String>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Reply> + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handler: Handler = Arc::new(
            move |args: Vec<String>| -> Pin<Box<dyn Future<Output = Reply> + Send>> {
                Box::pin(respond(args))
            },
        );

        let connections = Arc::new(AtomicUsize::new(0));
        let accepted = Arc::clone(&connections);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                accepted.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(serve(stream, Arc::clone(&handler)));
            }
        });

        Self {
            url: format!("redis://{addr}"),
            connections,
        }
    }

    /// 已接受的 TCP 连接数
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn settings(&self, command_timeout: Duration, reconnect_delay: Duration) -> RedisSettings {
        RedisSettings {
            url: Some(self.url.clone()),
            connect_timeout: Duration::from_millis(500),
            command_timeout,
            max_reconnect_attempts: 3,
            reconnect_base_delay: reconnect_delay,
            reconnect_max_delay: reconnect_delay,
        }
    }
}

async fn serve(stream: TcpStream, handler: Handler) {
    let (read, mut write) = stream.into_split();
    let mut reader = BufReader::new(read);

    while let Some(args) = read_command(&mut reader).await {
        let is_handshake = args
            .first()
            .is_some_and(|cmd| cmd.eq_ignore_ascii_case("CLIENT"));
        let reply = if is_handshake {
            Reply::ok()
        } else {
            handler(args).await
        };

        match reply {
            Reply::Raw(bytes) => {
                if write.write_all(&bytes).await.is_err() {
                    return;
                }
            }
            Reply::Close => return,
        }
    }
}

async fn read_command<R: AsyncBufRead + Unpin>(reader: &mut R) -> Option<Vec<String>> {
    let count: usize = read_line(reader).await?.strip_prefix('*')?.parse().ok()?;
    let mut args = Vec::with_capacity(count);
    for _ in 0..count {
        let len: usize = read_line(reader).await?.strip_prefix('$')?.parse().ok()?;
        let mut buf = vec![0u8; len + 2];
        reader.read_exact(&mut buf).await.ok()?;
        buf.truncate(len);
        args.push(String::from_utf8(buf).ok()?);
    }
    Some(args)
}

async fn read_line<R: AsyncBufRead + Unpin>(reader: &mut R) -> Option<String> {
    let mut line = String::new();
    if reader.read_line(&mut line).await.ok()? == 0 {
        return None;
    }
    Some(line.trim_end().to_owned())
}
