//! Minimal blocking HTTP/1.1 JSON client for the collaborators the fog talks
//! to: a remote predictor, a remote people detector and the status API.
//!
//! Only plain `http://` endpoints are supported; every call is bounded by the
//! caller's timeout on connect, read and write.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("dns error: {0}")]
    Dns(String),
    #[error("connect error: {0}")]
    Connect(std::io::Error),
    #[error("io error: {0}")]
    Io(std::io::Error),
    #[error("http status {0} ({1})")]
    Status(u16, String),
    #[error("malformed http response: {0}")]
    Malformed(&'static str),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedUrl {
    pub host: String,
    pub port: u16,
    pub path: String,
}

pub fn parse_http_url(endpoint: &str) -> Result<ParsedUrl, HttpError> {
    let trimmed = endpoint
        .strip_prefix("http://")
        .ok_or_else(|| HttpError::InvalidUrl("only http:// supported".to_string()))?;

    let (host_port, path) = match trimmed.split_once('/') {
        Some((host_port, path)) if !path.is_empty() => (host_port, format!("/{path}")),
        Some((host_port, _)) => (host_port, "/".to_string()),
        None => (trimmed, "/".to_string()),
    };
    if host_port.is_empty() {
        return Err(HttpError::InvalidUrl("missing host".to_string()));
    }

    let (host, port) = match host_port.split_once(':') {
        Some((host, port)) if !port.is_empty() => {
            let port = port
                .parse::<u16>()
                .map_err(|_| HttpError::InvalidUrl("invalid port".to_string()))?;
            (host, port)
        }
        Some((host, _)) => (host, 80),
        None => (host_port, 80),
    };
    if host.is_empty() {
        return Err(HttpError::InvalidUrl("missing host".to_string()));
    }

    Ok(ParsedUrl {
        host: host.to_string(),
        port,
        path,
    })
}

/// POST `body` as JSON and decode the JSON response.
pub fn post_json<B, R>(endpoint: &str, body: &B, timeout: Duration) -> Result<R, HttpError>
where
    B: Serialize,
    R: DeserializeOwned,
{
    let payload = serde_json::to_string(body)?;
    let response = send_http_json(endpoint, &payload, timeout)?;
    Ok(serde_json::from_str(&response)?)
}

/// POST `body` as JSON, ignoring any response body.
pub fn post_json_discard<B>(endpoint: &str, body: &B, timeout: Duration) -> Result<(), HttpError>
where
    B: Serialize,
{
    let payload = serde_json::to_string(body)?;
    send_http_json(endpoint, &payload, timeout)?;
    Ok(())
}

fn send_http_json(endpoint: &str, body: &str, timeout: Duration) -> Result<String, HttpError> {
    let parsed = parse_http_url(endpoint)?;
    let addr = (parsed.host.as_str(), parsed.port)
        .to_socket_addrs()
        .map_err(|err| HttpError::Dns(err.to_string()))?
        .next()
        .ok_or_else(|| HttpError::Dns("no addresses resolved".to_string()))?;

    let mut stream = TcpStream::connect_timeout(&addr, timeout).map_err(HttpError::Connect)?;
    stream
        .set_read_timeout(Some(timeout))
        .map_err(HttpError::Io)?;
    stream
        .set_write_timeout(Some(timeout))
        .map_err(HttpError::Io)?;

    let request = format!(
        "POST {} HTTP/1.1\r\nHost: {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        parsed.path,
        parsed.host,
        body.len(),
        body
    );
    stream
        .write_all(request.as_bytes())
        .map_err(HttpError::Io)?;

    let mut response = String::new();
    stream.read_to_string(&mut response).map_err(HttpError::Io)?;

    let (status_code, body) = split_response(&response)?;
    if status_code >= 400 {
        return Err(HttpError::Status(status_code, body.trim().to_string()));
    }
    Ok(body.to_string())
}

fn split_response(response: &str) -> Result<(u16, &str), HttpError> {
    let (headers, body) = response
        .split_once("\r\n\r\n")
        .ok_or(HttpError::Malformed("missing header terminator"))?;
    let status_line = headers
        .lines()
        .next()
        .ok_or(HttpError::Malformed("missing status line"))?;
    let status_code = status_line
        .split_whitespace()
        .nth(1)
        .ok_or(HttpError::Malformed("missing status code"))?
        .parse::<u16>()
        .map_err(|_| HttpError::Malformed("invalid status code"))?;
    Ok((status_code, body))
}
