#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;
use tokio::sync::{watch, Notify};
use voice_widget::audio::AudioFrameReceiver;
use voice_widget::controller::{Notifier, VoiceController};
use voice_widget::devices::{
    AudioConstraints, DeviceInfo, DeviceKind, LocalStream, LocalTrack, MediaDevices, Playback,
};
use voice_widget::signaling::{IceCandidate, RelayConfig, SdpType, SessionDescription, Signaling};
use voice_widget::transport::{
    EventSender, PeerTransport, TransportEvent, TransportFactory, TransportState,
};
use voice_widget::{ConnectionState, VoiceError};

/// Holds track release until a test lets it through
///
/// Release blocks the calling thread, like stopping a real capture stream.
#[derive(Default)]
pub struct StopGate {
    open: Mutex<bool>,
    opened: Condvar,
    waiting: AtomicUsize,
    timed_out: AtomicBool,
}

impl StopGate {
    pub fn release(&self) {
        *self.open.lock().unwrap() = true;
        self.opened.notify_all();
    }

    pub fn waiting(&self) -> usize {
        self.waiting.load(Ordering::SeqCst)
    }

    /// True if a release gave up waiting, meaning nobody could open the gate
    pub fn timed_out(&self) -> bool {
        self.timed_out.load(Ordering::SeqCst)
    }

    fn wait(&self) {
        self.waiting.fetch_add(1, Ordering::SeqCst);
        let open = self.open.lock().unwrap();
        let (_open, result) = self
            .opened
            .wait_timeout_while(open, Duration::from_secs(1), |open| !*open)
            .unwrap();
        if result.timed_out() {
            self.timed_out.store(true, Ordering::SeqCst);
        }
    }
}

pub struct MockTrack {
    id: String,
    live: AtomicBool,
    stop_gate: Option<Arc<StopGate>>,
}

impl MockTrack {
    fn new(id: String, stop_gate: Option<Arc<StopGate>>) -> Self {
        Self {
            id,
            live: AtomicBool::new(true),
            stop_gate,
        }
    }
}

impl LocalTrack for MockTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &str {
        "audio"
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    fn stop(&self) {
        if !self.live.load(Ordering::SeqCst) {
            return;
        }
        if let Some(gate) = &self.stop_gate {
            gate.wait();
        }
        self.live.store(false, Ordering::SeqCst);
    }
}

/// Playback that counts the frames it is fed
pub struct MockPlayback {
    device_id: Option<String>,
    playing: AtomicBool,
    pub received: Arc<AtomicUsize>,
}

impl Playback for MockPlayback {
    fn device_id(&self) -> Option<String> {
        self.device_id.clone()
    }

    fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    fn stop(&self) {
        self.playing.store(false, Ordering::SeqCst);
    }
}

/// Media backend with two inputs and two outputs
#[derive(Default)]
pub struct MockMedia {
    pub deny: AtomicBool,
    /// When set, the first microphone request waits for a permit
    pub media_gate: Option<Arc<Notify>>,
    gate_used: AtomicBool,
    pub stop_gate: Option<Arc<StopGate>>,
    pub requests: Mutex<Vec<AudioConstraints>>,
    pub tracks: Mutex<Vec<Arc<MockTrack>>>,
    pub sinks: Mutex<Vec<String>>,
    pub playbacks: Mutex<Vec<Arc<MockPlayback>>>,
}

impl MockMedia {
    pub fn denying() -> Self {
        let media = Self::default();
        media.deny.store(true, Ordering::SeqCst);
        media
    }

    pub fn gated(gate: Arc<Notify>) -> Self {
        Self {
            media_gate: Some(gate),
            ..Self::default()
        }
    }

    pub fn with_stop_gate(gate: Arc<StopGate>) -> Self {
        Self {
            stop_gate: Some(gate),
            ..Self::default()
        }
    }

    pub fn playbacks(&self) -> Vec<Arc<MockPlayback>> {
        self.playbacks.lock().unwrap().clone()
    }

    pub fn requests(&self) -> Vec<AudioConstraints> {
        self.requests.lock().unwrap().clone()
    }

    pub fn live_tracks(&self) -> usize {
        self.tracks
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.is_live())
            .count()
    }

    pub fn sinks(&self) -> Vec<String> {
        self.sinks.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl MediaDevices for MockMedia {
    async fn get_user_media(&self, constraints: &AudioConstraints) -> voice_widget::Result<LocalStream> {
        self.requests.lock().unwrap().push(constraints.clone());

        if let Some(gate) = &self.media_gate {
            if !self.gate_used.swap(true, Ordering::SeqCst) {
                gate.notified().await;
            }
        }

        if self.deny.load(Ordering::SeqCst) {
            return Err(VoiceError::PermissionDenied("NotAllowedError".to_string()));
        }

        let mut tracks = self.tracks.lock().unwrap();
        let track = Arc::new(MockTrack::new(
            format!("track-{}", tracks.len()),
            self.stop_gate.clone(),
        ));
        tracks.push(Arc::clone(&track));

        Ok(LocalStream {
            id: format!("stream-{}", tracks.len()),
            tracks: vec![track as Arc<dyn LocalTrack>],
        })
    }

    async fn enumerate_devices(&self) -> voice_widget::Result<Vec<DeviceInfo>> {
        Ok(vec![
            device("in1", "Built-in Microphone", DeviceKind::Input),
            device("in2", "", DeviceKind::Input),
            device("out1", "Built-in Speakers", DeviceKind::Output),
            device("out2", "USB Headset", DeviceKind::Output),
        ])
    }

    async fn play(
        &self,
        mut frames: AudioFrameReceiver,
        device_id: Option<&str>,
    ) -> voice_widget::Result<Arc<dyn Playback>> {
        let playback = Arc::new(MockPlayback {
            device_id: device_id.map(str::to_string),
            playing: AtomicBool::new(true),
            received: Arc::new(AtomicUsize::new(0)),
        });

        let received = Arc::clone(&playback.received);
        tokio::spawn(async move {
            while frames.recv().await.is_some() {
                received.fetch_add(1, Ordering::SeqCst);
            }
        });

        self.playbacks.lock().unwrap().push(Arc::clone(&playback));
        Ok(playback)
    }

    async fn set_sink(&self, device_id: &str) -> voice_widget::Result<()> {
        self.sinks.lock().unwrap().push(device_id.to_string());
        Ok(())
    }
}

fn device(id: &str, label: &str, kind: DeviceKind) -> DeviceInfo {
    DeviceInfo {
        id: id.to_string(),
        label: label.to_string(),
        kind,
    }
}

/// Transport that lets tests emit events by hand
#[derive(Default)]
pub struct MockTransport {
    events: Mutex<Option<EventSender>>,
    pub closed: AtomicBool,
    pub tracks_added: AtomicUsize,
    pub channels: Mutex<Vec<String>>,
}

impl MockTransport {
    pub fn emit(&self, event: TransportEvent) {
        if let Some(events) = self.events.lock().unwrap().as_ref() {
            let _ = events.send(event);
        }
    }

    pub fn emit_state(&self, state: TransportState) {
        self.emit(TransportEvent::StateChanged(state));
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl PeerTransport for MockTransport {
    async fn add_track(&self, _track: &dyn LocalTrack, _stream_id: &str) -> voice_widget::Result<()> {
        self.tracks_added.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn open_data_channel(&self, label: &str) -> voice_widget::Result<()> {
        self.channels.lock().unwrap().push(label.to_string());
        Ok(())
    }

    async fn create_offer(&self) -> voice_widget::Result<SessionDescription> {
        Ok(SessionDescription {
            sdp: "v=0 mock-offer".to_string(),
            sdp_type: SdpType::Offer,
        })
    }

    async fn set_remote_description(&self, _description: SessionDescription) -> voice_widget::Result<()> {
        Ok(())
    }

    async fn close(&self) -> voice_widget::Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        self.events.lock().unwrap().take();
        Ok(())
    }
}

#[derive(Default)]
pub struct MockTransportFactory {
    pub transports: Mutex<Vec<Arc<MockTransport>>>,
    pub relays: Mutex<Vec<RelayConfig>>,
}

impl MockTransportFactory {
    pub fn created(&self) -> usize {
        self.transports.lock().unwrap().len()
    }

    pub fn all(&self) -> Vec<Arc<MockTransport>> {
        self.transports.lock().unwrap().clone()
    }

    pub fn last(&self) -> Arc<MockTransport> {
        Arc::clone(self.transports.lock().unwrap().last().expect("no transport created"))
    }
}

#[async_trait::async_trait]
impl TransportFactory for MockTransportFactory {
    async fn create(
        &self,
        relay: &RelayConfig,
        events: EventSender,
    ) -> voice_widget::Result<Arc<dyn PeerTransport>> {
        self.relays.lock().unwrap().push(relay.clone());

        let transport = Arc::new(MockTransport {
            events: Mutex::new(Some(events)),
            ..MockTransport::default()
        });
        self.transports.lock().unwrap().push(Arc::clone(&transport));

        Ok(transport)
    }
}

/// Signaling double recording offers and candidates
#[derive(Default)]
pub struct MockSignaling {
    /// When set, `exchange_offer` waits for a permit before answering
    pub gate: Option<Arc<Notify>>,
    pub fail_offer: bool,
    pub offers: Mutex<Vec<(SessionDescription, String)>>,
    pub candidates: Mutex<Vec<(IceCandidate, String)>>,
}

impl MockSignaling {
    pub fn gated(gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::default()
        }
    }

    pub fn offers(&self) -> Vec<(SessionDescription, String)> {
        self.offers.lock().unwrap().clone()
    }

    pub fn candidates(&self) -> Vec<(IceCandidate, String)> {
        self.candidates.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Signaling for MockSignaling {
    async fn fetch_relay_config(&self) -> RelayConfig {
        RelayConfig::default()
    }

    async fn exchange_offer(
        &self,
        offer: &SessionDescription,
        session_id: &str,
    ) -> voice_widget::Result<SessionDescription> {
        self.offers
            .lock()
            .unwrap()
            .push((offer.clone(), session_id.to_string()));

        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        if self.fail_offer {
            return Err(VoiceError::Network("connection refused".to_string()));
        }

        Ok(SessionDescription {
            sdp: "v=0 mock-answer".to_string(),
            sdp_type: SdpType::Answer,
        })
    }

    async fn send_ice_candidate(
        &self,
        candidate: &IceCandidate,
        session_id: &str,
    ) -> voice_widget::Result<()> {
        self.candidates
            .lock()
            .unwrap()
            .push((candidate.clone(), session_id.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub struct CountingNotifier {
    pub alerts: Mutex<Vec<String>>,
}

impl CountingNotifier {
    pub fn alerts(&self) -> Vec<String> {
        self.alerts.lock().unwrap().clone()
    }
}

impl Notifier for CountingNotifier {
    fn alert(&self, message: &str) {
        self.alerts.lock().unwrap().push(message.to_string());
    }
}

pub struct Harness {
    pub controller: VoiceController,
    pub media: Arc<MockMedia>,
    pub transports: Arc<MockTransportFactory>,
    pub signaling: Arc<MockSignaling>,
    pub notifier: Arc<CountingNotifier>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(MockSignaling::default(), MockMedia::default())
    }

    pub fn with(signaling: MockSignaling, media: MockMedia) -> Self {
        let media = Arc::new(media);
        let transports = Arc::new(MockTransportFactory::default());
        let signaling = Arc::new(signaling);
        let notifier = Arc::new(CountingNotifier::default());

        let controller = VoiceController::new(
            signaling.clone(),
            media.clone(),
            transports.clone(),
            notifier.clone(),
        );

        Self {
            controller,
            media,
            transports,
            signaling,
            notifier,
        }
    }
}

pub fn candidate(value: &str) -> IceCandidate {
    IceCandidate {
        candidate: value.to_string(),
        sdp_mid: Some("0".to_string()),
        sdp_mline_index: Some(0),
        username_fragment: None,
    }
}

/// Wait until the watched state satisfies `pred`, failing after two seconds
pub async fn wait_for_state(
    states: &mut watch::Receiver<ConnectionState>,
    pred: impl FnMut(&ConnectionState) -> bool,
) -> ConnectionState {
    let state = tokio::time::timeout(Duration::from_secs(2), states.wait_for(pred))
        .await
        .expect("timed out waiting for connection state")
        .expect("controller dropped");
    *state
}

/// Poll `check` until it holds, failing after two seconds
pub async fn eventually(mut check: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition never held");
}
