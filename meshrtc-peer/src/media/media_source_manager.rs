use crate::media::{CaptureStream, LocalTrack};
use crate::orchestrator::SwapId;
use crate::session::PeerSession;
use meshrtc_core::{OutgoingKind, PeerId, TrackKind};
use serde::Serialize;
use tracing::{debug, info};

/// What the local participant currently sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalMediaStatus {
    pub audio_enabled: bool,
    pub video_enabled: bool,
    pub sharing: bool,
    pub has_microphone: bool,
    pub has_camera: bool,
}

/// Owner of the local capture sources.
///
/// Holds the camera stream, the optional screen stream and which of them
/// feeds the outgoing video sender. Only the dispatch loop touches it.
#[derive(Debug)]
pub struct MediaSourceManager {
    camera: Option<CaptureStream>,
    screen: Option<CaptureStream>,
    active: OutgoingKind,
    audio_enabled: bool,
    video_enabled: bool,
}

impl Default for MediaSourceManager {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaSourceManager {
    pub fn new() -> Self {
        Self {
            camera: None,
            screen: None,
            active: OutgoingKind::Camera,
            audio_enabled: true,
            video_enabled: true,
        }
    }

    /// Replaces (and stops) the previous camera stream. The desired enabled
    /// flags carry over to the new tracks.
    pub fn install_camera(&mut self, stream: CaptureStream) {
        if let Some(track) = &stream.audio {
            track.set_enabled(self.audio_enabled);
        }
        if let Some(track) = &stream.video {
            track.set_enabled(self.video_enabled);
        }
        if let Some(previous) = self.camera.replace(stream) {
            debug!("Stopping previous camera stream");
            previous.stop();
        }
    }

    pub fn install_screen(&mut self, stream: CaptureStream) {
        if let Some(previous) = self.screen.replace(stream) {
            previous.stop();
        }
    }

    /// Removes the screen stream and stops it.
    pub fn take_screen(&mut self) -> Option<CaptureStream> {
        let screen = self.screen.take()?;
        screen.stop();
        Some(screen)
    }

    pub fn active(&self) -> OutgoingKind {
        self.active
    }

    pub fn is_sharing(&self) -> bool {
        self.active == OutgoingKind::Screen && self.screen.is_some()
    }

    pub fn outgoing_video(&self) -> Option<LocalTrack> {
        let stream = match self.active {
            OutgoingKind::Camera => self.camera.as_ref(),
            OutgoingKind::Screen => self.screen.as_ref(),
        };
        stream.and_then(|s| s.video.clone())
    }

    /// Screen audio is never sent; the microphone stays the audio source.
    pub fn outgoing_audio(&self) -> Option<LocalTrack> {
        self.camera.as_ref().and_then(|s| s.audio.clone())
    }

    pub fn outgoing(&self, kind: TrackKind) -> Option<LocalTrack> {
        match kind {
            TrackKind::Audio => self.outgoing_audio(),
            TrackKind::Video => self.outgoing_video(),
        }
    }

    pub fn screen_track_id(&self) -> Option<&str> {
        self.screen
            .as_ref()
            .and_then(|s| s.video.as_ref())
            .map(LocalTrack::id)
    }

    /// Flips the microphone flag. The device keeps running.
    pub fn toggle_audio(&mut self) -> bool {
        self.audio_enabled = !self.audio_enabled;
        if let Some(track) = self.camera.as_ref().and_then(|s| s.audio.as_ref()) {
            track.set_enabled(self.audio_enabled);
        }
        self.audio_enabled
    }

    /// Flips the camera flag. A running screen share is not affected.
    pub fn toggle_video(&mut self) -> bool {
        self.video_enabled = !self.video_enabled;
        if let Some(track) = self.camera.as_ref().and_then(|s| s.video.as_ref()) {
            track.set_enabled(self.video_enabled);
        }
        self.video_enabled
    }

    pub fn audio_enabled(&self) -> bool {
        self.audio_enabled
    }

    pub fn video_enabled(&self) -> bool {
        self.video_enabled
    }

    pub fn status(&self) -> LocalMediaStatus {
        LocalMediaStatus {
            audio_enabled: self.audio_enabled,
            video_enabled: self.video_enabled,
            sharing: self.is_sharing(),
            has_microphone: self.outgoing_audio().is_some(),
            has_camera: self.camera.as_ref().is_some_and(|s| s.video.is_some()),
        }
    }

    /// Switches the outgoing video source and queues a hot-swap on every
    /// session that already carries media. Sessions whose sender already
    /// carries the new track are skipped. Returns the peers targeted by the
    /// swap; their results come back as driver outcomes tagged `swap`.
    pub(crate) fn set_active_outgoing<'a>(
        &mut self,
        kind: OutgoingKind,
        sessions: impl Iterator<Item = &'a mut PeerSession>,
        swap: SwapId,
    ) -> Vec<PeerId> {
        self.active = kind;
        let track = self.outgoing_video();
        info!(
            "Outgoing video is now {:?} ({})",
            kind,
            track.as_ref().map(LocalTrack::id).unwrap_or("none")
        );

        let target = track.as_ref().map(LocalTrack::id);
        sessions
            .filter(|session| session.state().accepts_hot_swap())
            .filter(|session| {
                let current = session.attached_track(TrackKind::Video) == target;
                if current {
                    debug!("{} already sends {:?} video", session.peer_id(), kind);
                }
                !current
            })
            .map(|session| {
                session.replace_track(TrackKind::Video, track.clone(), Some(swap));
                session.peer_id().clone()
            })
            .collect()
    }

    /// Queues replacements for senders still carrying a stale source, e.g. a
    /// session created while a swap was in flight or before the camera opened.
    pub(crate) fn catch_up(&self, session: &mut PeerSession) {
        for kind in [TrackKind::Audio, TrackKind::Video] {
            let track = self.outgoing(kind);
            if session.attached_track(kind) == track.as_ref().map(LocalTrack::id) {
                continue;
            }
            debug!(
                "Catching up {:?} sender toward {}",
                kind,
                session.peer_id()
            );
            session.replace_track(kind, track, None);
        }
    }

    /// Stops every local track.
    pub fn release(&mut self) {
        if let Some(camera) = self.camera.take() {
            camera.stop();
        }
        if let Some(screen) = self.screen.take() {
            screen.stop();
        }
        self.active = OutgoingKind::Camera;
    }
}
