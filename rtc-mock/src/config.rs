#[cfg(test)]
mod config_test;

use std::net::{IpAddr, Ipv4Addr};

use rtc::peer_connection::transport::{RTCDtlsRole, RTCIceServer};

pub(crate) const DEFAULT_RECEIVE_BUFFER_SIZE: usize = 2000;

/// MockRtcConfig controls how mock peers bind and negotiate their transport.
#[derive(Debug, Clone)]
pub struct MockRtcConfig {
    /// Address each session's UDP socket binds to. The port is always ephemeral.
    pub bind_address: IpAddr,
    /// ICE servers handed to every peer connection. Empty by default, mock
    /// peers normally talk to a peer under test on the same host.
    pub ice_servers: Vec<RTCIceServer>,
    /// DTLS role taken when answering an offer.
    pub answering_dtls_role: RTCDtlsRole,
    /// Size of the buffer each session reads datagrams into.
    pub receive_buffer_size: usize,
}

impl Default for MockRtcConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            ice_servers: vec![],
            answering_dtls_role: RTCDtlsRole::Client,
            receive_buffer_size: DEFAULT_RECEIVE_BUFFER_SIZE,
        }
    }
}

/// Builder for [`MockRtcConfig`].
///
/// ```
/// use rtc_mock::MockRtcConfigBuilder;
///
/// let config = MockRtcConfigBuilder::new()
///     .with_bind_address("0.0.0.0".parse().unwrap())
///     .with_ice_server_urls(vec!["stun:stun.l.google.com:19302".to_owned()])
///     .build();
/// assert_eq!(config.ice_servers.len(), 1);
/// ```
#[derive(Debug, Default, Clone)]
pub struct MockRtcConfigBuilder {
    config: MockRtcConfig,
}

impl MockRtcConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bind_address(mut self, bind_address: IpAddr) -> Self {
        self.config.bind_address = bind_address;
        self
    }

    pub fn with_ice_servers(mut self, ice_servers: Vec<RTCIceServer>) -> Self {
        self.config.ice_servers = ice_servers;
        self
    }

    /// Shorthand for ICE servers that need no credentials.
    pub fn with_ice_server_urls(mut self, urls: Vec<String>) -> Self {
        self.config.ice_servers = vec![RTCIceServer {
            urls,
            ..Default::default()
        }];
        self
    }

    pub fn with_answering_dtls_role(mut self, role: RTCDtlsRole) -> Self {
        self.config.answering_dtls_role = role;
        self
    }

    pub fn with_receive_buffer_size(mut self, size: usize) -> Self {
        self.config.receive_buffer_size = size;
        self
    }

    pub fn build(self) -> MockRtcConfig {
        self.config
    }
}
