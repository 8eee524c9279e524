//! Redis-backed counter store.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;
use tracing::info;

use super::store::{CounterStore, StoreError};

/// Counter store shared through a Redis server.
///
/// The increment runs as a `MULTI`/`EXEC` pipeline of `INCR` and `EXPIRE`, so
/// concurrent requests from several server processes never lose an update.
/// The connection is re-established in the background after it drops; only
/// the calls made while it is down fail.
#[derive(Clone)]
pub struct RedisCounterStore {
    conn: ConnectionManager,
}

impl RedisCounterStore {
    /// Connect to the Redis server at `url`.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        info!(url = %url, "Connected to Redis counter store");
        Ok(Self { conn })
    }
}

impl std::fmt::Debug for RedisCounterStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCounterStore").finish_non_exhaustive()
    }
}

/// `MULTI; INCR key; EXPIRE key ttl; EXEC`, yielding the incremented count.
fn increment_pipeline(key: &str, ttl: Duration) -> redis::Pipeline {
    let mut pipe = redis::pipe();
    pipe.atomic()
        .cmd("INCR")
        .arg(key)
        .cmd("EXPIRE")
        .arg(key)
        .arg(ttl.as_secs())
        .ignore();
    pipe
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn get(&self, key: &str) -> Result<Option<u64>, StoreError> {
        let mut conn = self.conn.clone();
        let value: Option<u64> = conn.get(key).await?;
        Ok(value)
    }

    async fn increment(&self, key: &str, ttl: Duration) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        let pipe = increment_pipeline(key, ttl);
        let (count,): (u64,) = pipe.query_async(&mut conn).await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::net::SocketAddr;
    use std::sync::Arc;
    use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::sync::broadcast;

    const TTL: Duration = Duration::from_secs(60);

    type Counters = Arc<Mutex<HashMap<String, u64>>>;

    /// Minimal in-process RESP server that understands the commands the store sends.
    struct FakeRedis {
        addr: SocketAddr,
        hangup: broadcast::Sender<()>,
        _acceptor: tokio::task::JoinHandle<()>,
    }

    impl FakeRedis {
        async fn start() -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let counters: Counters = Arc::default();
            let (hangup, _) = broadcast::channel(4);

            let sender = hangup.clone();
            let acceptor = tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    tokio::spawn(serve_connection(stream, counters.clone(), sender.subscribe()));
                }
            });

            Self {
                addr,
                hangup,
                _acceptor: acceptor,
            }
        }

        fn url(&self) -> String {
            format!("redis://{}/", self.addr)
        }

        /// Close every open connection. The listener keeps accepting.
        fn hang_up(&self) {
            let _ = self.hangup.send(());
        }
    }

    async fn serve_connection(stream: TcpStream, counters: Counters, mut hangup: broadcast::Receiver<()>) {
        let (read, mut write) = stream.into_split();
        let mut reader = BufReader::new(read);
        let mut transaction: Option<Vec<String>> = None;

        loop {
            let command = tokio::select! {
                biased;
                _ = hangup.recv() => return,
                command = read_command(&mut reader) => command,
            };
            let Some(args) = command else {
                return;
            };
            let reply = respond(&args, &counters, &mut transaction);
            if write.write_all(reply.as_bytes()).await.is_err() {
                return;
            }
        }
    }

    async fn read_command<R>(reader: &mut R) -> Option<Vec<String>>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut line = String::new();
        if reader.read_line(&mut line).await.ok()? == 0 {
            return None;
        }
        let count: usize = line.trim_end().strip_prefix('*')?.parse().ok()?;

        let mut args = Vec::with_capacity(count);
        for _ in 0..count {
            line.clear();
            reader.read_line(&mut line).await.ok()?;
            let len: usize = line.trim_end().strip_prefix('$')?.parse().ok()?;
            let mut buf = vec![0; len + 2];
            reader.read_exact(&mut buf).await.ok()?;
            buf.truncate(len);
            args.push(String::from_utf8(buf).ok()?);
        }
        Some(args)
    }

    fn respond(args: &[String], counters: &Counters, transaction: &mut Option<Vec<String>>) -> String {
        let name = args[0].to_ascii_uppercase();

        if name == "EXEC" {
            let replies = transaction.take().unwrap_or_default();
            return format!("*{}\r\n{}", replies.len(), replies.concat());
        }
        if let Some(replies) = transaction.as_mut() {
            replies.push(execute(&name, args, counters));
            return "+QUEUED\r\n".to_string();
        }
        if name == "MULTI" {
            *transaction = Some(Vec::new());
            return "+OK\r\n".to_string();
        }
        execute(&name, args, counters)
    }

    fn execute(name: &str, args: &[String], counters: &Counters) -> String {
        let mut counters = counters.lock();
        match name {
            "GET" => match counters.get(&args[1]) {
                Some(value) => {
                    let value = value.to_string();
                    format!("${}\r\n{}\r\n", value.len(), value)
                }
                None => "$-1\r\n".to_string(),
            },
            "INCR" => {
                let value = counters.entry(args[1].clone()).or_insert(0);
                *value += 1;
                format!(":{}\r\n", value)
            }
            "EXPIRE" => ":1\r\n".to_string(),
            "PING" => "+PONG\r\n".to_string(),
            _ => "+OK\r\n".to_string(),
        }
    }

    #[test]
    fn test_increment_is_one_transaction() {
        let packed = increment_pipeline("scoop:1.2.3.4|GET|28333333", TTL).get_packed_pipeline();
        assert_eq!(
            String::from_utf8(packed).unwrap(),
            "*1\r\n$5\r\nMULTI\r\n\
             *2\r\n$4\r\nINCR\r\n$26\r\nscoop:1.2.3.4|GET|28333333\r\n\
             *3\r\n$6\r\nEXPIRE\r\n$26\r\nscoop:1.2.3.4|GET|28333333\r\n$2\r\n60\r\n\
             *1\r\n$4\r\nEXEC\r\n"
        );
    }

    #[tokio::test]
    async fn test_get_and_increment() {
        let server = FakeRedis::start().await;
        let store = RedisCounterStore::connect(&server.url()).await.unwrap();

        assert_eq!(store.get("k").await.unwrap(), None);
        assert_eq!(store.increment("k", TTL).await.unwrap(), 1);
        assert_eq!(store.increment("k", TTL).await.unwrap(), 2);
        assert_eq!(store.get("k").await.unwrap(), Some(2));
        assert_eq!(store.get("other").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_recovers_after_connection_drop() {
        let server = FakeRedis::start().await;
        let store = RedisCounterStore::connect(&server.url()).await.unwrap();
        assert_eq!(store.increment("k", TTL).await.unwrap(), 1);

        server.hang_up();

        let mut recovered = None;
        for _ in 0..50 {
            match tokio::time::timeout(Duration::from_secs(1), store.increment("k", TTL)).await {
                Ok(Ok(count)) => {
                    recovered = Some(count);
                    break;
                }
                _ => tokio::time::sleep(Duration::from_millis(100)).await,
            }
        }
        assert_eq!(recovered, Some(2));
        assert_eq!(store.get("k").await.unwrap(), Some(2));
    }
}
