//! TCP server for handling factor requests.
//!
//! Accepts one client connection at a time, reads newline-delimited
//! requests, and answers each with `found`/`done` reply lines or `invalid`.
//! A failure on one connection is logged and never stops the accept loop;
//! only a failure to bind the listening socket is fatal.

use crate::config::Config;
use crate::engine;
use crate::protocol::{self, FactorRequest, Reply};
use std::io;
use std::net::SocketAddr;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

/// Server instance owning the listening socket
pub struct Server {
    listener: TcpListener,
    certainty: u32,
}

impl Server {
    /// Bind the listening socket. A failure here is fatal to the process:
    /// the error propagates to the caller and there is no retry.
    pub async fn bind(config: &Config) -> io::Result<Server> {
        let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;

        Ok(Server {
            listener,
            certainty: config.certainty,
        })
    }

    /// Local address of the bound listener
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept and serve clients until process exit.
    ///
    /// Connections are handled strictly one at a time: the next accept does
    /// not happen until the current client disconnects, so a second client
    /// waits in the listen backlog rather than being refused.
    pub async fn serve(&self) -> io::Result<()> {
        info!(address = %self.local_addr()?, "Server listening");

        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    debug!(peer = %addr, "New connection");

                    match handle_connection(stream, self.certainty).await {
                        Ok(()) => debug!(peer = %addr, "Client disconnected"),
                        Err(e) => warn!(peer = %addr, error = %e, "Connection error"),
                    }
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }
}

/// Handle a single client connection until end-of-stream or I/O error.
///
/// Each request is a single line of text; replies for a request are fully
/// written before the next line is read.
async fn handle_connection(stream: TcpStream, certainty: u32) -> io::Result<()> {
    let (reader, writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut writer = BufWriter::new(writer);
    let mut line = String::with_capacity(64);

    loop {
        line.clear();

        let n = reader.read_line(&mut line).await?;
        if n == 0 {
            // EOF
            return Ok(());
        }

        let request = line.trim_end_matches(['\n', '\r']);

        match protocol::parse_request(request) {
            Ok(request) => answer_request(&mut writer, &request, certainty).await?,
            Err(e) => {
                // protocol errors do not close the connection
                debug!(error = %e, "Rejected request");
                send_reply(&mut writer, &Reply::Invalid).await?;
            }
        }
    }
}

/// Run the engine for a validated request and stream the replies.
///
/// The engine call is synchronous and of unbounded duration; it runs on the
/// connection's own task, behind this function boundary, so a future
/// extension (cancellation, worker-pool dispatch) can wrap it without
/// touching the protocol handling.
async fn answer_request(
    writer: &mut BufWriter<OwnedWriteHalf>,
    request: &FactorRequest,
    certainty: u32,
) -> io::Result<()> {
    let factors = engine::find_prime_factors(&request.target, &request.low, &request.high, certainty);

    for factor in factors {
        let reply = Reply::Found {
            target: request.target.clone(),
            factor,
        };
        send_reply(writer, &reply).await?;
    }

    let done = Reply::Done {
        target: request.target.clone(),
        low: request.low.clone(),
        high: request.high.clone(),
    };
    send_reply(writer, &done).await
}

/// Write one newline-terminated reply and flush it immediately, so the
/// client can read replies incrementally without waiting for close.
async fn send_reply(writer: &mut BufWriter<OwnedWriteHalf>, reply: &Reply) -> io::Result<()> {
    writer.write_all(format!("{}\n", reply).as_bytes()).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::net::tcp::OwnedReadHalf;
    use tokio::time::timeout;

    fn test_config() -> Config {
        Config {
            host: "127.0.0.1".to_string(),
            port: 0,
            certainty: engine::DEFAULT_CERTAINTY,
            log_level: "info".to_string(),
        }
    }

    async fn start_server() -> SocketAddr {
        let server = Server::bind(&test_config()).await.unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(async move { server.serve().await });
        addr
    }

    async fn connect(addr: SocketAddr) -> (BufReader<OwnedReadHalf>, OwnedWriteHalf) {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (reader, writer) = stream.into_split();
        (BufReader::new(reader), writer)
    }

    async fn read_reply(reader: &mut BufReader<OwnedReadHalf>) -> String {
        let mut line = String::new();
        let n = timeout(Duration::from_secs(5), reader.read_line(&mut line))
            .await
            .expect("timed out waiting for reply")
            .unwrap();
        assert!(n > 0, "server closed the connection");
        line.trim_end().to_string()
    }

    #[tokio::test]
    async fn test_factor_request_replies() {
        let addr = start_server().await;
        let (mut reader, mut writer) = connect(addr).await;

        writer.write_all(b"factor 85 2 17\n").await.unwrap();

        assert_eq!(read_reply(&mut reader).await, "found 85 5");
        assert_eq!(read_reply(&mut reader).await, "found 85 17");
        assert_eq!(read_reply(&mut reader).await, "done 85 2 17");
    }

    #[tokio::test]
    async fn test_no_factors_still_replies_done() {
        let addr = start_server().await;
        let (mut reader, mut writer) = connect(addr).await;

        writer.write_all(b"factor 85 2 4\n").await.unwrap();

        assert_eq!(read_reply(&mut reader).await, "done 85 2 4");
    }

    #[tokio::test]
    async fn test_invalid_requests_keep_connection_open() {
        let addr = start_server().await;
        let (mut reader, mut writer) = connect(addr).await;

        writer.write_all(b"factor 0 2 10\n").await.unwrap();
        assert_eq!(read_reply(&mut reader).await, "invalid");

        writer.write_all(b"hello world\n").await.unwrap();
        assert_eq!(read_reply(&mut reader).await, "invalid");

        writer.write_all(b"factor 85 2 17 junk\n").await.unwrap();
        assert_eq!(read_reply(&mut reader).await, "invalid");

        // the same connection still serves valid requests
        writer.write_all(b"factor 6 2 3\n").await.unwrap();
        assert_eq!(read_reply(&mut reader).await, "found 6 2");
        assert_eq!(read_reply(&mut reader).await, "found 6 3");
        assert_eq!(read_reply(&mut reader).await, "done 6 2 3");
    }

    #[tokio::test]
    async fn test_multiple_requests_per_connection() {
        let addr = start_server().await;
        let (mut reader, mut writer) = connect(addr).await;

        writer.write_all(b"factor 264 2 17\n").await.unwrap();
        for expected in [
            "found 264 2",
            "found 264 2",
            "found 264 2",
            "found 264 3",
            "found 264 11",
            "done 264 2 17",
        ] {
            assert_eq!(read_reply(&mut reader).await, expected);
        }

        writer.write_all(b"factor 85 17 2\n").await.unwrap();
        assert_eq!(read_reply(&mut reader).await, "done 85 17 2");
    }

    #[tokio::test]
    async fn test_crlf_line_endings_accepted() {
        let addr = start_server().await;
        let (mut reader, mut writer) = connect(addr).await;

        writer.write_all(b"factor 85 2 17\r\n").await.unwrap();

        assert_eq!(read_reply(&mut reader).await, "found 85 5");
    }

    #[tokio::test]
    async fn test_second_client_waits_for_first() {
        let addr = start_server().await;

        let (mut reader_a, mut writer_a) = connect(addr).await;
        writer_a.write_all(b"factor 85 2 17\n").await.unwrap();
        assert_eq!(read_reply(&mut reader_a).await, "found 85 5");

        // B connects (sits in the listen backlog) and sends a request,
        // but gets no reply while A is still connected
        let (mut reader_b, mut writer_b) = connect(addr).await;
        writer_b.write_all(b"factor 6 2 3\n").await.unwrap();

        let mut line = String::new();
        let pending = timeout(Duration::from_millis(200), reader_b.read_line(&mut line)).await;
        assert!(pending.is_err(), "B was served while A was connected");

        // once A disconnects, B's buffered request is served
        drop(reader_a);
        drop(writer_a);

        assert_eq!(read_reply(&mut reader_b).await, "found 6 2");
        assert_eq!(read_reply(&mut reader_b).await, "found 6 3");
        assert_eq!(read_reply(&mut reader_b).await, "done 6 2 3");
    }

    #[tokio::test]
    async fn test_server_survives_client_reset() {
        let addr = start_server().await;

        // first client disconnects abruptly mid-session
        let stream = TcpStream::connect(addr).await.unwrap();
        drop(stream);

        // server keeps accepting
        let (mut reader, mut writer) = connect(addr).await;
        writer.write_all(b"factor 85 2 17\n").await.unwrap();
        assert_eq!(read_reply(&mut reader).await, "found 85 5");
    }

    #[tokio::test]
    async fn test_bind_failure_is_an_error() {
        let server = Server::bind(&test_config()).await.unwrap();
        let addr = server.local_addr().unwrap();

        let mut config = test_config();
        config.port = addr.port();
        assert!(Server::bind(&config).await.is_err());
    }
}
