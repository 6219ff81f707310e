//! Worker identity.

use std::fmt::{Display, Formatter};
use std::net::{IpAddr, Ipv4Addr, UdpSocket};

use tracing::warn;
use uuid::Uuid;

/// Uniquely identifies one consumer process within a consumer group.
///
/// Generated once when the coordinator is built and never changed afterwards.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WorkerId(String);

impl WorkerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Builds `<prefix><ip>-<uuid>`.
    pub fn generate(prefix: &str, ip: IpAddr) -> Self {
        Self(format!("{prefix}{ip}-{}", Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for WorkerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WorkerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for WorkerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Best-effort lookup of the address this host uses for outbound traffic.
///
/// Connecting a UDP socket only selects a route, no packet is sent. Falls back
/// to the loopback address when no route is available.
pub fn local_ip() -> IpAddr {
    let probe = || -> std::io::Result<IpAddr> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        socket.connect((Ipv4Addr::new(8, 8, 8, 8), 80))?;
        Ok(socket.local_addr()?.ip())
    };

    match probe() {
        Ok(ip) => ip,
        Err(err) => {
            warn!(%err, "cannot detect local ip, using loopback");
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        }
    }
}
