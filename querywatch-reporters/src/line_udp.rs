//! Line protocol over UDP, one datagram per measurement.

use std::net::UdpSocket;

use querywatch_config::ReporterSpec;
use querywatch_core::measurement::Measurement;
use serde::Deserialize;
use tracing::debug;
use validator::Validate;

use crate::{typed_options, Reporter, SinkError};

#[derive(Debug, Deserialize, Validate)]
pub struct LineUdpOptions {
    /// Destination `host:port`.
    #[validate(length(min = 1))]
    pub address: String,

    /// Local bind address.
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "0.0.0.0:0".into()
}

pub struct LineUdpReporter {
    name: String,
    options: LineUdpOptions,
    socket: Option<UdpSocket>,
}

pub fn build(spec: &ReporterSpec) -> Result<Box<dyn Reporter>, SinkError> {
    let options: LineUdpOptions = typed_options(spec)?;
    Ok(Box::new(LineUdpReporter {
        name: spec.name().to_string(),
        options,
        socket: None,
    }))
}

impl LineUdpReporter {
    fn io_error(&self, source: std::io::Error) -> SinkError {
        SinkError::Io {
            reporter: self.name.clone(),
            source,
        }
    }
}

impl Reporter for LineUdpReporter {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_start(&mut self) -> Result<(), SinkError> {
        let socket = UdpSocket::bind(&self.options.bind).map_err(|e| self.io_error(e))?;
        socket
            .connect(&self.options.address)
            .map_err(|e| self.io_error(e))?;
        debug!(reporter = %self.name, address = %self.options.address, "Line protocol sink connected");
        self.socket = Some(socket);
        Ok(())
    }

    fn on_measurement(&mut self, measurement: &Measurement) -> Result<(), SinkError> {
        let Some(socket) = &self.socket else {
            return Err(self.io_error(std::io::ErrorKind::NotConnected.into()));
        };
        socket
            .send(measurement.to_line_protocol().as_bytes())
            .map(|_| ())
            .map_err(|e| self.io_error(e))
    }

    fn on_stop(&mut self) {
        self.socket = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn sends_one_datagram_per_measurement() {
        let server = UdpSocket::bind("127.0.0.1:0").unwrap();
        server
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let address = server.local_addr().unwrap().to_string();

        let mut reporter = build(&crate::spec(
            "line_udp",
            json!({"address": address, "bind": "127.0.0.1:0"}),
        ))
        .unwrap();
        reporter.on_start().unwrap();

        let measurement = Measurement::simple("rate", 2.5).tag("kind", "READ").build();
        reporter.on_measurement(&measurement).unwrap();

        let mut buf = [0u8; 512];
        let n = server.recv(&mut buf).unwrap();
        assert_eq!(
            std::str::from_utf8(&buf[..n]).unwrap(),
            measurement.to_line_protocol()
        );
        reporter.on_stop();
    }

    #[test]
    fn address_is_required() {
        let err = build(&crate::spec("line_udp", json!({}))).err().unwrap();
        assert!(matches!(err, SinkError::Config { .. }));
    }

    #[test]
    fn send_before_start_fails_without_panicking() {
        let mut reporter =
            build(&crate::spec("line_udp", json!({"address": "127.0.0.1:9"}))).unwrap();
        let err = reporter
            .on_measurement(&Measurement::simple("m", 1.0).build())
            .unwrap_err();
        assert!(matches!(err, SinkError::Io { .. }));
    }
}
