use async_trait::async_trait;
use meshrtc_core::PeerId;
use meshrtc_peer::{
    CaptureDevice, CaptureError, CaptureStream, LocalTrack, MediaConstraints, RemoteMedia,
    RenderSink, ScreenConstraints, SourceKind,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// Capture device producing fresh tracks on every request.
#[derive(Default)]
pub struct MockCaptureDevice {
    camera_error: Mutex<Option<CaptureError>>,
    screen_error: Mutex<Option<CaptureError>>,
    screen_gate: Mutex<Option<Arc<Notify>>>,
    screen_opens: AtomicUsize,
    last_camera: Mutex<Option<CaptureStream>>,
    last_screen: Mutex<Option<CaptureStream>>,
}

impl MockCaptureDevice {
    pub fn deny_camera(&self, error: CaptureError) {
        *self.camera_error.lock().unwrap() = Some(error);
    }

    pub fn fail_screen(&self, error: CaptureError) {
        *self.screen_error.lock().unwrap() = Some(error);
    }

    /// Keeps the screen picker open until the returned gate is notified.
    pub fn hold_screen(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.screen_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn screen_opens(&self) -> usize {
        self.screen_opens.load(Ordering::SeqCst)
    }

    pub fn last_camera(&self) -> Option<CaptureStream> {
        self.last_camera.lock().unwrap().clone()
    }

    pub fn last_screen(&self) -> Option<CaptureStream> {
        self.last_screen.lock().unwrap().clone()
    }
}

#[async_trait]
impl CaptureDevice for MockCaptureDevice {
    async fn open_camera(
        &self,
        constraints: &MediaConstraints,
    ) -> Result<CaptureStream, CaptureError> {
        if let Some(error) = self.camera_error.lock().unwrap().clone() {
            return Err(error);
        }
        let stream = CaptureStream {
            audio: constraints
                .audio
                .then(|| LocalTrack::new(SourceKind::Microphone)),
            video: constraints
                .video
                .as_ref()
                .map(|_| LocalTrack::new(SourceKind::Camera)),
        };
        *self.last_camera.lock().unwrap() = Some(stream.clone());
        Ok(stream)
    }

    async fn open_screen(
        &self,
        _constraints: &ScreenConstraints,
    ) -> Result<CaptureStream, CaptureError> {
        self.screen_opens.fetch_add(1, Ordering::SeqCst);
        let gate = self.screen_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        if let Some(error) = self.screen_error.lock().unwrap().clone() {
            return Err(error);
        }
        let stream = CaptureStream {
            audio: None,
            video: Some(LocalTrack::new(SourceKind::Screen)),
        };
        *self.last_screen.lock().unwrap() = Some(stream.clone());
        Ok(stream)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkCall {
    Attached { peer_id: PeerId, track_id: String },
    Detached(PeerId),
}

#[derive(Default)]
pub struct RecordingSink {
    calls: Mutex<Vec<SinkCall>>,
}

impl RecordingSink {
    pub fn calls(&self) -> Vec<SinkCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn detached(&self, peer_id: &str) -> bool {
        self.calls()
            .contains(&SinkCall::Detached(PeerId::from(peer_id)))
    }
}

impl RenderSink for RecordingSink {
    fn attach(&self, peer_id: &PeerId, media: RemoteMedia) {
        self.calls.lock().unwrap().push(SinkCall::Attached {
            peer_id: peer_id.clone(),
            track_id: media.track_id,
        });
    }

    fn detach(&self, peer_id: &PeerId) {
        self.calls
            .lock()
            .unwrap()
            .push(SinkCall::Detached(peer_id.clone()));
    }
}
