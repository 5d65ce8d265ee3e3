use super::*;

#[test]
fn test_config_defaults() {
    let config = MockRtcConfig::default();
    assert_eq!(config.bind_address, IpAddr::V4(Ipv4Addr::LOCALHOST));
    assert!(config.ice_servers.is_empty());
    assert_eq!(config.answering_dtls_role, RTCDtlsRole::Client);
    assert_eq!(config.receive_buffer_size, DEFAULT_RECEIVE_BUFFER_SIZE);
}

#[test]
fn test_config_builder_overrides() {
    let config = MockRtcConfigBuilder::new()
        .with_bind_address(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
        .with_answering_dtls_role(RTCDtlsRole::Server)
        .with_receive_buffer_size(1500)
        .with_ice_server_urls(vec!["stun:127.0.0.1:3478".to_owned()])
        .build();

    assert_eq!(config.bind_address, IpAddr::V4(Ipv4Addr::UNSPECIFIED));
    assert_eq!(config.answering_dtls_role, RTCDtlsRole::Server);
    assert_eq!(config.receive_buffer_size, 1500);
    assert_eq!(
        config.ice_servers[0].urls,
        vec!["stun:127.0.0.1:3478".to_owned()]
    );
}
