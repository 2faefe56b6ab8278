//! One-shot HTTP client.
//!
//! Each call spins up its own small event loop and performs
//! resolve → connect → write → read under a single deadline. Deadline expiry
//! maps to `timeout`, every transport failure to `unavailable`.

use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::http::codec::{self, ParseError};
use crate::status::{Result, Status};

/// Result of a successful one-shot request.
#[derive(Debug, Clone)]
pub struct HttpClientResponse {
    pub status: u16,
    pub body: Vec<u8>,
    /// Empty when the server sent no Content-Type.
    pub content_type: String,
}

pub struct HttpClient;

impl HttpClient {
    /// Blocking GET with a deadline over the whole operation.
    pub fn get(
        host: &str,
        port: u16,
        target: &str,
        timeout: Duration,
    ) -> Result<HttpClientResponse> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| Status::internal_error(format!("failed to build client loop: {e}")))?;

        let op = async {
            let mut stream = TcpStream::connect((host, port)).await?;

            let request = format!(
                "GET {target} HTTP/1.1\r\nHost: {host}\r\nUser-Agent: chmicro/0.1\r\nConnection: close\r\n\r\n"
            );
            stream.write_all(request.as_bytes()).await?;

            let mut buf = BytesMut::with_capacity(8 * 1024);
            let head = loop {
                match codec::parse_response_head(&buf) {
                    Ok(head) => break head,
                    Err(ParseError::Incomplete) => {
                        if stream.read_buf(&mut buf).await? == 0 {
                            return Err(std::io::Error::new(
                                std::io::ErrorKind::UnexpectedEof,
                                "connection closed before response head",
                            ));
                        }
                    }
                    Err(ParseError::Invalid(msg)) => {
                        return Err(std::io::Error::new(std::io::ErrorKind::InvalidData, msg));
                    }
                }
            };

            let body = match head.content_length {
                Some(len) => {
                    while buf.len() < head.body_start + len {
                        if stream.read_buf(&mut buf).await? == 0 {
                            return Err(std::io::Error::new(
                                std::io::ErrorKind::UnexpectedEof,
                                "connection closed mid-body",
                            ));
                        }
                    }
                    buf[head.body_start..head.body_start + len].to_vec()
                }
                None => {
                    // No declared length: the response runs to end of stream.
                    loop {
                        if stream.read_buf(&mut buf).await? == 0 {
                            break;
                        }
                    }
                    buf[head.body_start..].to_vec()
                }
            };

            let _ = stream.shutdown().await;

            Ok::<HttpClientResponse, std::io::Error>(HttpClientResponse {
                status: head.status,
                body,
                content_type: head.content_type,
            })
        };

        match runtime.block_on(async { tokio::time::timeout(timeout, op).await }) {
            Err(_elapsed) => Err(Status::timeout("http client timeout")),
            Ok(Err(e)) => Err(Status::unavailable(e.to_string())),
            Ok(Ok(resp)) => Ok(resp),
        }
    }
}
