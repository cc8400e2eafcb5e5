//! Capture session on an opened scope.
//!
//! A [`PdsScope`] binds the identity fetched at open time to a live
//! transport and holds at most one [`Capture`]. Reads are synchronous and
//! blocking; periodic refresh is the caller's policy, not the session's.

use crate::frame::{self, Capture};
use crate::pds_connector::{DeviceIdentity, PdsConnector, PdsConnectorError};
use crate::usb_transport::{ScopeTransport, TransportError, UsbTransport, CMD_START};

#[derive(Debug, thiserror::Error)]
pub enum ScopeError {
    #[error(transparent)]
    Connector(#[from] PdsConnectorError),

    #[error("USB transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("malformed frame: {0}")]
    Frame(#[from] frame::FrameError),

    #[error("scope session is closed")]
    Closed,
}

/// A capture session with an Owon PDS oscilloscope.
pub struct PdsScope<T: ScopeTransport> {
    transport: Option<T>,
    identity: DeviceIdentity,
    capture: Option<Capture>,
}

impl PdsScope<UsbTransport> {
    /// Open the nth connected scope (0 = first).
    pub fn open(index: usize) -> Result<Self, ScopeError> {
        let (transport, identity) = PdsConnector::open(index)?;
        log::debug!(
            "session opened on {} {}",
            identity.manufacturer,
            identity.product
        );
        Ok(Self::with_transport(transport, identity))
    }
}

impl<T: ScopeTransport> PdsScope<T> {
    /// Build a session over an already-open transport.
    pub fn with_transport(transport: T, identity: DeviceIdentity) -> Self {
        Self {
            transport: Some(transport),
            identity,
            capture: None,
        }
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    /// The most recent successful capture, if any.
    pub fn capture(&self) -> Option<&Capture> {
        self.capture.as_ref()
    }

    /// Request one capture from the scope.
    ///
    /// On success the previous capture is replaced wholesale. On any
    /// transport or decode failure the previous capture stays untouched
    /// and the error is returned; whether to retry is the caller's call.
    pub fn read(&mut self) -> Result<&Capture, ScopeError> {
        let transport = self.transport.as_mut().ok_or(ScopeError::Closed)?;
        let payload = transport.transfer(CMD_START)?;
        log::debug!("received {} byte capture payload", payload.len());
        let capture = frame::decode(&payload)?;
        Ok(self.capture.insert(capture))
    }

    /// Release the device and discard the current capture.
    ///
    /// Closing an already-closed session is a no-op.
    pub fn close(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            log::debug!("closing scope session");
            transport.close();
        }
        self.capture = None;
    }
}

impl<T: ScopeTransport> Drop for PdsScope<T> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::frame::test_frames::{vector_frame, ChannelSpec};

    struct MockTransport {
        responses: VecDeque<Result<Vec<u8>, TransportError>>,
        requests: Vec<Vec<u8>>,
        closes: Arc<AtomicUsize>,
    }

    impl MockTransport {
        fn new(responses: Vec<Result<Vec<u8>, TransportError>>) -> Self {
            Self {
                responses: responses.into(),
                requests: Vec::new(),
                closes: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl ScopeTransport for MockTransport {
        fn transfer(&mut self, request: &[u8]) -> Result<Vec<u8>, TransportError> {
            self.requests.push(request.to_vec());
            self.responses
                .pop_front()
                .unwrap_or(Err(TransportError::Closed))
        }

        fn close(&mut self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn identity() -> DeviceIdentity {
        DeviceIdentity {
            manufacturer: "Owon".to_string(),
            product: "PDS6062T".to_string(),
            name: "PDS606".to_string(),
        }
    }

    fn scope_with(
        responses: Vec<Result<Vec<u8>, TransportError>>,
    ) -> (PdsScope<MockTransport>, Arc<AtomicUsize>) {
        let transport = MockTransport::new(responses);
        let closes = transport.closes.clone();
        (PdsScope::with_transport(transport, identity()), closes)
    }

    fn one_channel_frame() -> Vec<u8> {
        vector_frame(b'V', &[ChannelSpec::default()])
    }

    #[test]
    fn read_sends_start_and_stores_capture() {
        let (mut scope, _) = scope_with(vec![Ok(one_channel_frame())]);
        assert!(scope.capture().is_none());

        let capture = scope.read().unwrap();
        assert_eq!(capture.as_vector().unwrap().channels.len(), 1);
        assert!(scope.capture().is_some());

        let transport = scope.transport.as_ref().unwrap();
        assert_eq!(transport.requests, vec![CMD_START.to_vec()]);
    }

    #[test]
    fn read_replaces_previous_capture() {
        let second = vector_frame(
            b'V',
            &[ChannelSpec::default(), ChannelSpec::default()],
        );
        let (mut scope, _) = scope_with(vec![Ok(one_channel_frame()), Ok(second)]);

        scope.read().unwrap();
        assert_eq!(
            scope.capture().unwrap().as_vector().unwrap().channels.len(),
            1
        );

        scope.read().unwrap();
        assert_eq!(
            scope.capture().unwrap().as_vector().unwrap().channels.len(),
            2
        );
    }

    #[test]
    fn transport_failure_keeps_previous_capture() {
        let (mut scope, _) = scope_with(vec![
            Ok(one_channel_frame()),
            Err(TransportError::Timeout(std::time::Duration::from_secs(2))),
        ]);

        scope.read().unwrap();
        let error = scope.read().unwrap_err();
        assert!(matches!(
            error,
            ScopeError::Transport(TransportError::Timeout(_))
        ));
        assert_eq!(
            scope.capture().unwrap().as_vector().unwrap().channels.len(),
            1
        );
    }

    #[test]
    fn decode_failure_keeps_previous_capture() {
        let (mut scope, _) = scope_with(vec![
            Ok(one_channel_frame()),
            Ok(b"garbage payload".to_vec()),
        ]);

        scope.read().unwrap();
        let error = scope.read().unwrap_err();
        assert!(matches!(error, ScopeError::Frame(_)));
        assert!(scope.capture().is_some());
    }

    #[test]
    fn close_is_idempotent() {
        let (mut scope, closes) = scope_with(vec![Ok(one_channel_frame())]);
        scope.read().unwrap();

        scope.close();
        assert!(scope.capture().is_none());
        assert_eq!(closes.load(Ordering::SeqCst), 1);

        scope.close();
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn read_after_close_fails() {
        let (mut scope, _) = scope_with(vec![Ok(one_channel_frame())]);
        scope.close();
        assert!(matches!(scope.read(), Err(ScopeError::Closed)));
    }

    #[test]
    fn drop_releases_the_transport() {
        let (scope, closes) = scope_with(vec![]);
        drop(scope);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }
}
