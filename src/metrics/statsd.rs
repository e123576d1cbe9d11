use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs, UdpSocket};

use crate::config::EngineConfig;

pub const METRIC_PREFIX: &str = "metric";
pub const LINES_PROCESSED: &str = "lines_processed";
pub const LINES_FAILED: &str = "lines_failed";

/// Fire-and-forget counter sink. Implementations never report failure
/// back to the caller.
pub trait MetricsSink {
    fn count(&self, name: &str, value: u64);
}

pub struct NoopSink;

impl MetricsSink for NoopSink {
    fn count(&self, _name: &str, _value: u64) {}
}

/// StatsD over UDP, `<prefix>.<name>:<value>|c`.
pub struct StatsdSink {
    socket: UdpSocket,
    target: SocketAddr,
    prefix: String,
}

impl StatsdSink {
    pub fn connect(server: &str, prefix: &str) -> std::io::Result<Self> {
        let target = server.to_socket_addrs()?.next().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, "statsd server did not resolve")
        })?;
        let bind = if target.is_ipv4() {
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
        } else {
            SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
        };
        let socket = UdpSocket::bind(bind)?;
        socket.set_nonblocking(true)?;

        Ok(StatsdSink {
            socket,
            target,
            prefix: prefix.to_string(),
        })
    }

    fn packet(&self, name: &str, value: u64) -> String {
        format!("{}.{}:{}|c", self.prefix, name, value)
    }
}

impl MetricsSink for StatsdSink {
    fn count(&self, name: &str, value: u64) {
        let packet = self.packet(name, value);
        if let Err(e) = self.socket.send_to(packet.as_bytes(), self.target) {
            tracing::debug!(error = %e, metric = name, "statsd send failed");
        }
    }
}

/// Builds the sink named by the config, or a no-op sink when none is
/// configured or the server cannot be resolved.
pub fn sink_from_config(config: &EngineConfig) -> Box<dyn MetricsSink> {
    let Some(server) = config.statsd_server.as_deref() else {
        return Box::new(NoopSink);
    };

    match StatsdSink::connect(server, METRIC_PREFIX) {
        Ok(sink) => {
            tracing::info!(server, "statsd metrics enabled");
            Box::new(sink)
        }
        Err(e) => {
            tracing::warn!(server, error = %e, "statsd unavailable, metrics disabled");
            Box::new(NoopSink)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn sends_prefixed_counter() {
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        receiver.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        let server = receiver.local_addr().unwrap().to_string();

        let sink = StatsdSink::connect(&server, METRIC_PREFIX).unwrap();
        sink.count(LINES_FAILED, 3);

        let mut buf = [0u8; 128];
        let (len, _) = receiver.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..len], b"metric.lines_failed:3|c");
    }

    #[test]
    fn unreachable_server_is_ignored() {
        let config = EngineConfig {
            statsd_server: Some("127.0.0.1:9".to_string()),
            ..EngineConfig::default()
        };
        let sink = sink_from_config(&config);
        sink.count(LINES_PROCESSED, 1);
        sink.count(LINES_PROCESSED, 2);
    }

    #[test]
    fn no_server_means_noop() {
        let sink = sink_from_config(&EngineConfig::default());
        sink.count(LINES_PROCESSED, 1);
    }
}
