use std::net::SocketAddr;

use log::{debug, info};
use rtc::peer_connection::RTCPeerConnectionBuilder;
use rtc::peer_connection::configuration::RTCConfigurationBuilder;
use rtc::peer_connection::configuration::setting_engine::SettingEngine;
use rtc::peer_connection::sdp::{RTCSdpType, RTCSessionDescription};
use rtc::peer_connection::transport::{CandidateConfig, CandidateHostConfig, RTCIceCandidate};

use crate::config::MockRtcConfig;
use crate::error::{Error, Result};
use crate::session::PeerSession;

/// NegotiationAdapter turns a remote offer into a [`PeerSession`] and the
/// answer to return to the offerer.
///
/// Negotiation is answer-only and non-trickle: the one host candidate of the
/// session's socket is embedded in the answer.
#[derive(Debug, Clone)]
pub struct NegotiationAdapter {
    config: MockRtcConfig,
}

impl NegotiationAdapter {
    pub fn new(config: MockRtcConfig) -> Self {
        Self { config }
    }

    /// Answers `offer` for a session whose transport is bound to `local_addr`.
    ///
    /// Fails with [`Error::ErrNegotiation`] when `offer` is not an offer or
    /// cannot be applied.
    pub fn answer_offer(
        &self,
        offer: RTCSessionDescription,
        local_addr: SocketAddr,
    ) -> Result<(PeerSession, RTCSessionDescription)> {
        if offer.sdp_type != RTCSdpType::Offer {
            return Err(Error::ErrNegotiation(format!(
                "expected an offer, got {}",
                offer.sdp_type
            )));
        }

        let mut setting_engine = SettingEngine::default();
        setting_engine
            .set_answering_dtls_role(self.config.answering_dtls_role)
            .map_err(Error::negotiation)?;

        let configuration = RTCConfigurationBuilder::new()
            .with_ice_servers(self.config.ice_servers.clone())
            .build();

        let mut peer_connection = RTCPeerConnectionBuilder::new()
            .with_configuration(configuration)
            .with_setting_engine(setting_engine)
            .build()
            .map_err(Error::negotiation)?;

        debug!("set remote description {}", offer);
        peer_connection
            .set_remote_description(offer)
            .map_err(Error::negotiation)?;

        let candidate = CandidateHostConfig {
            base_config: CandidateConfig {
                network: "udp".to_owned(),
                address: local_addr.ip().to_string(),
                port: local_addr.port(),
                component: 1,
                ..Default::default()
            },
            ..Default::default()
        }
        .new_candidate_host()
        .map_err(Error::negotiation)?;
        let local_candidate_init = RTCIceCandidate::from(&candidate)
            .to_json()
            .map_err(Error::negotiation)?;
        peer_connection
            .add_local_candidate(local_candidate_init)
            .map_err(Error::negotiation)?;

        let answer = peer_connection
            .create_answer(None)
            .map_err(Error::negotiation)?;
        peer_connection
            .set_local_description(answer.clone())
            .map_err(Error::negotiation)?;
        let answer = peer_connection
            .local_description()
            .unwrap_or(answer);
        info!("answer created for peer session {}", local_addr);

        Ok((PeerSession::new(peer_connection, local_addr), answer))
    }
}
