use super::*;
use crate::step::StepBuilder;

#[test]
fn test_build_peer_requires_running_service() {
    let mock = MockRtc::default();
    let result = mock.build_peer(StepBuilder::new().build());
    assert!(matches!(result, Err(Error::ErrServiceNotRunning)));
}

#[test]
fn test_start_twice_fails() -> Result<()> {
    let mut mock = MockRtc::default();
    mock.start()?;
    assert!(matches!(mock.start(), Err(Error::ErrServiceAlreadyRunning)));
    mock.stop()?;
    assert!(!mock.is_running());
    Ok(())
}

#[test]
fn test_stop_is_idempotent_and_restartable() -> Result<()> {
    let mut mock = MockRtc::default();
    mock.stop()?;
    mock.start()?;
    mock.stop()?;
    mock.stop()?;
    mock.start()?;
    assert!(mock.is_running());
    Ok(())
}

#[tokio::test]
async fn test_peer_from_stopped_service_is_refused() -> Result<()> {
    let mut mock = MockRtc::default();
    mock.start()?;
    let mut peer = mock.build_peer(StepBuilder::new().sleep(10).build())?;
    mock.stop()?;

    let offer = RTCSessionDescription::default();
    let result = peer.answer_offer(offer).await;
    assert!(matches!(result, Err(Error::ErrServiceNotRunning)));
    assert_eq!(peer.scheduler_state(), None);
    Ok(())
}

#[tokio::test]
async fn test_answer_rejects_non_offer() -> Result<()> {
    let mut mock = MockRtc::default();
    mock.start()?;
    let mut peer = mock.build_peer(StepBuilder::new().build())?;

    let mut description = RTCSessionDescription::default();
    description.sdp_type = rtc::peer_connection::sdp::RTCSdpType::Answer;
    let result = peer.answer_offer(description).await;
    assert!(matches!(result, Err(Error::ErrNegotiation(_))));

    // the script was consumed by the failed attempt
    let again = peer.answer_offer(RTCSessionDescription::default()).await;
    assert!(matches!(again, Err(Error::ErrScriptAlreadyBound)));

    mock.stop()?;
    Ok(())
}
