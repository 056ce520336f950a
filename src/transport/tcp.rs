// src/transport/tcp.rs

use crate::engine::BoxedStream;
use crate::error::ZmqError;
use crate::socket::options::SocketOptions;
use crate::transport::{socks, Connector, Listener};

use async_trait::async_trait;
use socket2::{Domain, Protocol, SockRef, Socket as RawSocket, TcpKeepalive, Type};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};

/// Keepalive knobs copied out of the socket options at bind/connect time.
#[derive(Debug, Clone, Copy)]
struct KeepaliveConfig {
  /// -1 system default, 0 off, 1 on.
  enabled: i32,
  idle: i32,
  interval: i32,
  count: i32,
}

impl KeepaliveConfig {
  fn from_options(options: &SocketOptions) -> Self {
    Self {
      enabled: options.tcp_keepalive,
      idle: options.tcp_keepalive_idle,
      interval: options.tcp_keepalive_intvl,
      count: options.tcp_keepalive_cnt,
    }
  }
}

fn configure_stream(stream: &TcpStream, keepalive: KeepaliveConfig) -> Result<(), ZmqError> {
  let socket_ref = SockRef::from(stream);
  socket_ref.set_nodelay(true)?;

  match keepalive.enabled {
    0 => socket_ref.set_keepalive(false)?,
    1 => {
      let mut params = TcpKeepalive::new();
      if keepalive.idle > 0 {
        params = params.with_time(Duration::from_secs(keepalive.idle as u64));
      }
      #[cfg(any(unix, target_os = "windows"))]
      if keepalive.interval > 0 {
        params = params.with_interval(Duration::from_secs(keepalive.interval as u64));
      }
      #[cfg(target_os = "linux")]
      if keepalive.count > 0 {
        params = params.with_retries(keepalive.count as u32);
      }
      socket_ref.set_tcp_keepalive(&params)?;
      tracing::trace!(?keepalive, "Applied TCP keepalive");
    }
    _ => {}
  }
  Ok(())
}

async fn resolve(host: &str, port: u16, ipv6: bool, uri: &str) -> Result<SocketAddr, ZmqError> {
  if host == "*" {
    let ip: IpAddr = if ipv6 {
      Ipv6Addr::UNSPECIFIED.into()
    } else {
      Ipv4Addr::UNSPECIFIED.into()
    };
    return Ok(SocketAddr::new(ip, port));
  }
  if let Ok(ip) = host.parse::<IpAddr>() {
    return Ok(SocketAddr::new(ip, port));
  }
  let mut candidates = tokio::net::lookup_host((host, port))
    .await
    .map_err(|_| ZmqError::InvalidEndpoint(uri.to_string()))?;
  let preferred = candidates.find(|addr| ipv6 || addr.is_ipv4());
  preferred.ok_or_else(|| ZmqError::AddrNotAvailable(uri.to_string()))
}

pub(crate) struct TcpAcceptor {
  listener: TcpListener,
  keepalive: KeepaliveConfig,
  resolved: String,
}

impl TcpAcceptor {
  /// Binds and starts listening. Must run inside the I/O runtime.
  pub(crate) async fn bind(host: &str, port: u16, options: &SocketOptions, uri: &str) -> Result<Self, ZmqError> {
    let addr = resolve(host, port, options.ipv6, uri).await?;
    let socket = RawSocket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    if addr.is_ipv6() {
      socket.set_only_v6(false)?;
    }
    #[cfg(unix)]
    socket.set_reuse_address(true)?;
    socket
      .bind(&addr.into())
      .map_err(|e| ZmqError::from_io_endpoint(e, uri))?;
    socket.listen(options.backlog.max(1))?;
    socket.set_nonblocking(true)?;

    let listener = TcpListener::from_std(socket.into())?;
    let local_addr = listener.local_addr()?;
    tracing::debug!(%local_addr, %uri, "TCP listener bound");
    Ok(Self {
      listener,
      keepalive: KeepaliveConfig::from_options(options),
      resolved: format!("tcp://{local_addr}"),
    })
  }

  pub(crate) fn resolved(&self) -> &str {
    &self.resolved
  }
}

#[async_trait]
impl Listener for TcpAcceptor {
  async fn accept(&self) -> Result<(BoxedStream, String), ZmqError> {
    let (stream, peer) = self.listener.accept().await?;
    if let Err(e) = configure_stream(&stream, self.keepalive) {
      tracing::debug!(%peer, error = %e, "Failed to apply TCP options to accepted stream");
    }
    Ok((Box::new(stream), peer.to_string()))
  }
}

pub(crate) struct TcpConnector {
  host: String,
  port: u16,
  ipv6: bool,
  keepalive: KeepaliveConfig,
  socks_proxy: Option<String>,
  socks_auth: Option<(String, String)>,
  uri: String,
}

impl TcpConnector {
  pub(crate) fn new(host: String, port: u16, options: &SocketOptions, uri: &str) -> Self {
    let socks_auth = options
      .socks_username
      .clone()
      .map(|user| (user, options.socks_password.clone().unwrap_or_default()));
    Self {
      host,
      port,
      ipv6: options.ipv6,
      keepalive: KeepaliveConfig::from_options(options),
      socks_proxy: options.socks_proxy.clone(),
      socks_auth,
      uri: uri.to_string(),
    }
  }
}

#[async_trait]
impl Connector for TcpConnector {
  async fn connect(&self) -> Result<BoxedStream, ZmqError> {
    if self.port == 0 || self.host == "*" {
      return Err(ZmqError::InvalidEndpoint(self.uri.clone()));
    }
    let stream = match &self.socks_proxy {
      Some(proxy) => {
        let auth = self.socks_auth.as_ref().map(|(u, p)| (u.as_str(), p.as_str()));
        socks::connect(proxy, &self.host, self.port, auth).await?
      }
      None => {
        let addr = resolve(&self.host, self.port, self.ipv6, &self.uri).await?;
        TcpStream::connect(addr)
          .await
          .map_err(|e| ZmqError::from_io_endpoint(e, &self.uri))?
      }
    };
    configure_stream(&stream, self.keepalive)?;
    Ok(Box::new(stream))
  }
}
