//! Discovery of the addresses a host advertises in its room.

use log::{debug, warn};
use reqwest::Client;
use std::future::Future;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;
use tokio::net::UdpSocket;

/// Public IP echo services, tried in order; first success wins.
pub const ECHO_SERVICES: &[&str] = &[
    "https://api.ipify.org",
    "https://icanhazip.com",
    "https://api.my-ip.io/ip",
    "https://ifconfig.me/ip",
];

/// Any routable address works; no packet is sent by a UDP `connect`.
const ROUTE_PROBE: &str = "8.8.8.8:80";

pub trait AddressResolver: Send + Sync + 'static {
    /// The address other networks see us as, if any service answers.
    fn public_ip(&self) -> impl Future<Output = Option<IpAddr>> + Send;

    /// The LAN address of the default route, loopback if there is none.
    fn local_ip(&self) -> impl Future<Output = IpAddr> + Send;
}

/// Resolves the public address through HTTP echo services.
#[derive(Debug, Clone)]
pub struct HttpAddressResolver {
    client: Client,
    services: Vec<String>,
    timeout: Duration,
}

impl HttpAddressResolver {
    pub fn new(timeout: Duration) -> Self {
        Self::with_services(ECHO_SERVICES.iter().map(|s| s.to_string()).collect(), timeout)
    }

    pub fn with_services(services: Vec<String>, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            services,
            timeout,
        }
    }

    async fn ask(&self, service: &str) -> Result<IpAddr, String> {
        let response = self
            .client
            .get(service)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !response.status().is_success() {
            return Err(format!("status {}", response.status()));
        }
        let body = response.text().await.map_err(|e| e.to_string())?;
        parse_echo(&body).ok_or_else(|| format!("unexpected body {:?}", body.trim()))
    }
}

fn parse_echo(body: &str) -> Option<IpAddr> {
    body.trim().parse().ok()
}

impl AddressResolver for HttpAddressResolver {
    async fn public_ip(&self) -> Option<IpAddr> {
        for service in &self.services {
            match self.ask(service).await {
                Ok(ip) => {
                    debug!("Public address {} via {}", ip, service);
                    return Some(ip);
                }
                Err(e) => debug!("Echo service {} failed: {}", service, e),
            }
        }
        warn!("Could not determine public IP address from any echo service");
        None
    }

    async fn local_ip(&self) -> IpAddr {
        probe_local_ip().await
    }
}

/// Local address of the interface that routes to the internet.
pub async fn probe_local_ip() -> IpAddr {
    async fn probe() -> std::io::Result<IpAddr> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
        socket.connect(ROUTE_PROBE).await?;
        Ok(socket.local_addr()?.ip())
    }

    match probe().await {
        Ok(ip) if !ip.is_unspecified() => ip,
        Ok(_) => IpAddr::V4(Ipv4Addr::LOCALHOST),
        Err(e) => {
            debug!("Route probe failed ({}), using loopback", e);
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        }
    }
}

/// Fixed answers, for LAN play without echo services and for tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedAddresses {
    pub public: Option<IpAddr>,
    pub local: IpAddr,
}

impl FixedAddresses {
    pub fn loopback() -> Self {
        let local = IpAddr::V4(Ipv4Addr::LOCALHOST);
        Self {
            public: Some(local),
            local,
        }
    }
}

impl AddressResolver for FixedAddresses {
    async fn public_ip(&self) -> Option<IpAddr> {
        self.public
    }

    async fn local_ip(&self) -> IpAddr {
        self.local
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_echo_body() {
        assert_eq!(
            parse_echo("203.0.113.7\n"),
            Some(IpAddr::V4(Ipv4Addr::new(203, 0, 113, 7)))
        );
        assert!(parse_echo("2001:db8::1").is_some());
        assert_eq!(parse_echo("<html>rate limited</html>"), None);
        assert_eq!(parse_echo(""), None);
    }

    #[tokio::test]
    async fn test_no_services_means_no_public_ip() {
        let resolver = HttpAddressResolver::with_services(Vec::new(), Duration::from_millis(10));
        assert_eq!(resolver.public_ip().await, None);
    }

    #[tokio::test]
    async fn test_probe_never_returns_unspecified() {
        let ip = probe_local_ip().await;
        assert!(!ip.is_unspecified());
    }

    #[tokio::test]
    async fn test_fixed_addresses() {
        let fixed = FixedAddresses::loopback();
        assert_eq!(fixed.public_ip().await, Some(IpAddr::V4(Ipv4Addr::LOCALHOST)));
        assert_eq!(fixed.local_ip().await, IpAddr::V4(Ipv4Addr::LOCALHOST));
    }
}
