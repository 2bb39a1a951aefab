//! Remote Endpoint - 远程 worker 地址

use std::fmt;
use std::net::SocketAddr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EndpointError {
    #[error("<IP,Port> address invalid: {0}")]
    InvalidFormat(String),

    #[error("Invalid port: {0}")]
    InvalidPort(String),
}

/// 用户输入的地址（尚未解析）
///
/// 接受 `host,port`（图形界面的输入格式）与 `host:port` 两种写法
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointAddress {
    pub host: String,
    pub port: u16,
}

impl EndpointAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn parse(input: &str) -> Result<Self, EndpointError> {
        let input = input.trim();
        let (host, port) = input
            .split_once(',')
            .or_else(|| input.rsplit_once(':'))
            .ok_or_else(|| EndpointError::InvalidFormat(input.to_string()))?;

        let host = host.trim().trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(EndpointError::InvalidFormat(input.to_string()));
        }

        let port_text = port.trim();
        let port: u16 = port_text
            .parse()
            .map_err(|_| EndpointError::InvalidPort(port_text.to_string()))?;
        if port == 0 {
            return Err(EndpointError::InvalidPort(port_text.to_string()));
        }

        Ok(Self::new(host, port))
    }
}

impl fmt::Display for EndpointAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// 已解析的远程 worker 端点
///
/// 在 connect 时解析一次，此后在客户端生命周期内不变
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEndpoint {
    host: String,
    addr: SocketAddr,
}

impl RemoteEndpoint {
    pub fn new(host: impl Into<String>, addr: SocketAddr) -> Self {
        Self {
            host: host.into(),
            addr,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// 控制通道地址
    pub fn control_addr(&self) -> SocketAddr {
        self.addr
    }

    /// 同一主机上的其他端口（文件传输通道）
    pub fn with_port(&self, port: u16) -> SocketAddr {
        SocketAddr::new(self.addr.ip(), port)
    }
}

impl fmt::Display for RemoteEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@[{}]:{}", self.addr.ip(), self.addr.port())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_comma_form() {
        let addr = EndpointAddress::parse(" 192.168.1.20, 9000 ").unwrap();
        assert_eq!(addr, EndpointAddress::new("192.168.1.20", 9000));
    }

    #[test]
    fn test_parse_colon_form() {
        let addr = EndpointAddress::parse("gpu-box:7860").unwrap();
        assert_eq!(addr.host, "gpu-box");
        assert_eq!(addr.port, 7860);

        let v6 = EndpointAddress::parse("[::1]:7860").unwrap();
        assert_eq!(v6.host, "::1");
    }

    #[test]
    fn test_parse_rejects_invalid() {
        assert!(matches!(
            EndpointAddress::parse("localhost"),
            Err(EndpointError::InvalidFormat(_))
        ));
        assert!(matches!(
            EndpointAddress::parse("localhost,abc"),
            Err(EndpointError::InvalidPort(_))
        ));
        assert!(EndpointAddress::parse("localhost,0").is_err());
        assert!(EndpointAddress::parse(",80").is_err());
    }

    #[test]
    fn test_with_port_keeps_host() {
        let endpoint = RemoteEndpoint::new("box", "10.0.0.2:9000".parse().unwrap());
        assert_eq!(endpoint.with_port(23333), "10.0.0.2:23333".parse().unwrap());
        assert_eq!(endpoint.to_string(), "@[10.0.0.2]:9000");
    }
}
