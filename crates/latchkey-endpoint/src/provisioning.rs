//! Network provisioning check.
//!
//! Runs once before the endpoint starts: the broker host must resolve and
//! accept a TCP connection within the configured time. If it does not, the
//! process stops instead of entering the access loop.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use tokio::net::{TcpStream, lookup_host};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::Config;

#[derive(Debug, Error)]
pub enum ProvisioningError {
    #[error("Cannot resolve {host}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{host} resolved to no addresses")]
    NoAddress { host: String },

    #[error("Broker at {addr} unreachable: {source}")]
    Unreachable {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Network not ready after {0}ms")]
    Timeout(u64),
}

/// Outcome of a successful check.
#[derive(Debug, Clone, Copy)]
pub struct ProvisioningReport {
    pub broker_addr: SocketAddr,
    pub elapsed: Duration,
}

#[derive(Debug, Clone)]
pub struct NetworkProvisioner {
    host: String,
    port: u16,
    timeout: Duration,
}

impl NetworkProvisioner {
    pub fn new(host: impl Into<String>, port: u16, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            timeout,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.bus.host.clone(),
            config.bus.port,
            Duration::from_millis(config.provisioning.timeout_ms),
        )
    }

    /// Resolve the broker and open one TCP connection to it.
    ///
    /// # Errors
    /// Returns an error if the host does not resolve, no address accepts a
    /// connection, or the whole check exceeds the timeout.
    pub async fn provision(&self) -> Result<ProvisioningReport, ProvisioningError> {
        let started = Instant::now();
        info!(host = %self.host, port = self.port, "Checking network connectivity");

        let broker_addr = tokio::time::timeout(self.timeout, self.probe())
            .await
            .map_err(|_| ProvisioningError::Timeout(millis(self.timeout)))??;

        let report = ProvisioningReport {
            broker_addr,
            elapsed: started.elapsed(),
        };
        info!(
            broker = %report.broker_addr,
            elapsed_ms = millis(report.elapsed),
            "Network ready"
        );
        Ok(report)
    }

    async fn probe(&self) -> Result<SocketAddr, ProvisioningError> {
        let addrs: Vec<SocketAddr> = lookup_host((self.host.as_str(), self.port))
            .await
            .map_err(|source| ProvisioningError::Resolve {
                host: self.host.clone(),
                source,
            })?
            .collect();

        let mut last_error = None;
        for addr in addrs {
            match TcpStream::connect(addr).await {
                Ok(_stream) => return Ok(addr),
                Err(e) => {
                    debug!(%addr, error = %e, "Address not reachable");
                    last_error = Some((addr, e));
                }
            }
        }

        match last_error {
            Some((addr, source)) => {
                warn!(%addr, error = %source, "Broker unreachable");
                Err(ProvisioningError::Unreachable { addr, source })
            }
            None => Err(ProvisioningError::NoAddress {
                host: self.host.clone(),
            }),
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
