// src/transport/socks.rs

//! Minimal SOCKS5 client (RFC 1928) with optional username/password auth (RFC 1929).
//! Only the CONNECT command is used; the target host is always sent as a domain name or
//! literal address, so name resolution happens on the proxy.

use crate::error::ZmqError;

use bytes::{BufMut, BytesMut};
use std::net::IpAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

const VERSION: u8 = 0x05;
const AUTH_NONE: u8 = 0x00;
const AUTH_PASSWORD: u8 = 0x02;
const AUTH_UNACCEPTABLE: u8 = 0xFF;
const CMD_CONNECT: u8 = 0x01;
const ATYP_IPV4: u8 = 0x01;
const ATYP_DOMAIN: u8 = 0x03;
const ATYP_IPV6: u8 = 0x04;

fn violation(what: impl Into<String>) -> ZmqError {
  ZmqError::ProtocolViolation(format!("SOCKS5: {}", what.into()))
}

/// Opens a tunnel to `host:port` through the proxy at `proxy` (`host:port`).
pub(crate) async fn connect(
  proxy: &str,
  host: &str,
  port: u16,
  auth: Option<(&str, &str)>,
) -> Result<TcpStream, ZmqError> {
  let mut stream = TcpStream::connect(proxy)
    .await
    .map_err(|e| ZmqError::from_io_endpoint(e, proxy))?;

  // Method negotiation.
  let methods: &[u8] = if auth.is_some() {
    &[AUTH_NONE, AUTH_PASSWORD]
  } else {
    &[AUTH_NONE]
  };
  let mut hello = vec![VERSION, methods.len() as u8];
  hello.extend_from_slice(methods);
  stream.write_all(&hello).await?;

  let mut choice = [0u8; 2];
  stream.read_exact(&mut choice).await?;
  if choice[0] != VERSION {
    return Err(violation(format!("unexpected version {}", choice[0])));
  }
  match (choice[1], auth) {
    (AUTH_NONE, _) => {}
    (AUTH_PASSWORD, Some((user, pass))) => authenticate(&mut stream, user, pass).await?,
    (AUTH_UNACCEPTABLE, _) => return Err(violation("no acceptable authentication method")),
    (other, _) => return Err(violation(format!("proxy chose unsupported method {other}"))),
  }

  // CONNECT request.
  let mut request = BytesMut::with_capacity(7 + host.len());
  request.put_slice(&[VERSION, CMD_CONNECT, 0x00]);
  match host.parse::<IpAddr>() {
    Ok(IpAddr::V4(ip)) => {
      request.put_u8(ATYP_IPV4);
      request.put_slice(&ip.octets());
    }
    Ok(IpAddr::V6(ip)) => {
      request.put_u8(ATYP_IPV6);
      request.put_slice(&ip.octets());
    }
    Err(_) => {
      if host.len() > u8::MAX as usize {
        return Err(violation("host name too long"));
      }
      request.put_u8(ATYP_DOMAIN);
      request.put_u8(host.len() as u8);
      request.put_slice(host.as_bytes());
    }
  }
  request.put_u16(port);
  stream.write_all(&request).await?;

  let mut reply = [0u8; 4];
  stream.read_exact(&mut reply).await?;
  if reply[0] != VERSION {
    return Err(violation(format!("unexpected version {}", reply[0])));
  }
  if reply[1] != 0x00 {
    return Err(ZmqError::ConnectionRefused(format!(
      "SOCKS5 proxy {proxy} refused {host}:{port} (reply {})",
      reply[1]
    )));
  }
  // Skip the bound address.
  let addr_len = match reply[3] {
    ATYP_IPV4 => 4,
    ATYP_IPV6 => 16,
    ATYP_DOMAIN => stream.read_u8().await? as usize,
    other => return Err(violation(format!("unknown address type {other}"))),
  };
  let mut bound = vec![0u8; addr_len + 2];
  stream.read_exact(&mut bound).await?;

  tracing::debug!(%proxy, %host, port, "SOCKS5 tunnel established");
  Ok(stream)
}

async fn authenticate(stream: &mut TcpStream, user: &str, pass: &str) -> Result<(), ZmqError> {
  if user.len() > u8::MAX as usize || pass.len() > u8::MAX as usize {
    return Err(violation("credentials too long"));
  }
  let mut request = Vec::with_capacity(3 + user.len() + pass.len());
  request.push(0x01);
  request.push(user.len() as u8);
  request.extend_from_slice(user.as_bytes());
  request.push(pass.len() as u8);
  request.extend_from_slice(pass.as_bytes());
  stream.write_all(&request).await?;

  let mut status = [0u8; 2];
  stream.read_exact(&mut status).await?;
  if status[1] != 0x00 {
    return Err(ZmqError::PermissionDenied("SOCKS5 authentication rejected".into()));
  }
  Ok(())
}
