use super::notify::{Notifier, PERMISSION_DENIED_MESSAGE};
use super::session::Session;
use super::state::{transition, ConnectionState, Transition};
use crate::devices::{
    list_devices, AudioConstraints, DeviceList, DeviceSelection, LocalStream, MediaDevices,
    Playback,
};
use crate::error::Result;
use crate::signaling::{IceCandidate, Signaling};
use crate::transport::{EventReceiver, PeerTransport, RemoteAudio, TransportEvent, TransportFactory};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, error, info, warn};

/// Label of the data channel opened alongside the audio track
pub const DATA_CHANNEL_LABEL: &str = "text";

/// Invoked with the connected flag every time it flips
pub type ConnectionCallback = Arc<dyn Fn(bool) + Send + Sync>;

/// Drives one voice session at a time
///
/// `toggle` starts a session from `Idle` and ends it from `Connected`. While
/// a session is being negotiated further toggles are ignored. Cloning yields
/// another handle to the same controller.
#[derive(Clone)]
pub struct VoiceController {
    inner: Arc<Inner>,
}

struct Inner {
    signaling: Arc<dyn Signaling>,
    media: Arc<dyn MediaDevices>,
    transports: Arc<dyn TransportFactory>,
    notifier: Arc<dyn Notifier>,

    /// Processing flags applied to every microphone request
    processing: StdMutex<AudioConstraints>,

    state: watch::Sender<ConnectionState>,

    /// Bumped when an attempt starts and when a session ends; a connect
    /// holding an older value must not install its session
    generation: AtomicU64,

    on_change: StdMutex<Option<ConnectionCallback>>,

    /// The live session, if any
    session: Mutex<Option<Session>>,

    devices: StdMutex<DeviceList>,
    selection: StdMutex<DeviceSelection>,
}

fn lock<T>(mutex: &StdMutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl VoiceController {
    pub fn new(
        signaling: Arc<dyn Signaling>,
        media: Arc<dyn MediaDevices>,
        transports: Arc<dyn TransportFactory>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Idle);

        Self {
            inner: Arc::new(Inner {
                signaling,
                media,
                transports,
                notifier,
                processing: StdMutex::new(AudioConstraints::default()),
                state,
                generation: AtomicU64::new(0),
                on_change: StdMutex::new(None),
                session: Mutex::new(None),
                devices: StdMutex::new(DeviceList::default()),
                selection: StdMutex::new(DeviceSelection::default()),
            }),
        }
    }

    /// Override the processing flags used for microphone requests
    pub fn with_processing(self, processing: AudioConstraints) -> Self {
        self.set_processing(processing);
        self
    }

    /// Replace the processing flags; takes effect on the next session
    ///
    /// Any device constraint in `processing` is ignored in favour of the
    /// selected input.
    pub fn set_processing(&self, processing: AudioConstraints) {
        *lock(&self.inner.processing) = AudioConstraints {
            device_id: None,
            ..processing
        };
    }

    pub fn processing(&self) -> AudioConstraints {
        lock(&self.inner.processing).clone()
    }

    pub fn set_on_connection_change(&self, callback: ConnectionCallback) {
        *lock(&self.inner.on_change) = Some(callback);
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Enumerate devices and default the selection to the first of each kind
    pub async fn refresh_devices(&self) -> DeviceList {
        let devices = list_devices(self.inner.media.as_ref()).await;

        lock(&self.inner.selection).apply_defaults(&devices);
        *lock(&self.inner.devices) = devices.clone();

        devices
    }

    pub fn devices(&self) -> DeviceList {
        lock(&self.inner.devices).clone()
    }

    pub fn selection(&self) -> DeviceSelection {
        lock(&self.inner.selection).clone()
    }

    /// Choose the microphone for the next session
    pub fn select_input_device(&self, device_id: &str) {
        info!("Input device selected: {}", device_id);
        lock(&self.inner.selection).input = Some(device_id.to_string());
    }

    /// Choose the playback device; applied immediately when a session is live
    pub async fn select_output_device(&self, device_id: &str) {
        lock(&self.inner.selection).output = Some(device_id.to_string());

        if self.inner.session.lock().await.is_some() {
            self.inner.apply_sink(device_id).await;
        }
    }

    /// Id of the live session, if any
    pub async fn session_id(&self) -> Option<String> {
        self.inner
            .session
            .lock()
            .await
            .as_ref()
            .map(|s| s.id().to_string())
    }

    /// Local tracks still holding hardware access
    pub async fn live_tracks(&self) -> usize {
        self.inner
            .session
            .lock()
            .await
            .as_ref()
            .map(Session::live_tracks)
            .unwrap_or(0)
    }

    /// Connect from `Idle`, disconnect from `Connected`, ignore while `Connecting`
    ///
    /// Returns the state after the call. Failures are logged, never returned;
    /// a denied microphone additionally raises a notification.
    pub async fn toggle(&self) -> ConnectionState {
        match self.state() {
            ConnectionState::Connecting => {
                info!("Connection attempt already in progress.");
            }
            ConnectionState::Connected => {
                self.inner.shutdown_session(None, true).await;
            }
            ConnectionState::Idle => {
                let Some(attempt) = self.inner.begin_connecting() else {
                    info!("Connection attempt already in progress.");
                    return self.state();
                };

                info!("Attempting to start voice chat setup...");
                if let Err(e) = self.inner.connect(attempt).await {
                    error!("Error in WebRTC setup process: {}", e);
                    if e.is_permission_denied() {
                        self.inner.notifier.alert(PERMISSION_DENIED_MESSAGE);
                    }
                }
            }
        }

        self.state()
    }

    /// Release any live session regardless of state
    pub async fn close(&self) {
        info!("Cleaning up voice connection...");
        self.inner.shutdown_session(None, true).await;
    }
}

impl Inner {
    /// Claim `Idle -> Connecting` and return the attempt's generation
    ///
    /// `None` if another caller got there first.
    fn begin_connecting(&self) -> Option<u64> {
        let mut attempt = None;
        self.state.send_if_modified(|state| {
            if *state == ConnectionState::Idle {
                *state = ConnectionState::Connecting;
                attempt = Some(self.generation.fetch_add(1, Ordering::SeqCst) + 1);
                true
            } else {
                false
            }
        });
        attempt
    }

    /// Return to `Idle` after a failed attempt, unless it was already superseded
    fn fail_attempt(&self, attempt: u64) {
        let superseded = self
            .generation
            .compare_exchange(attempt, attempt + 1, Ordering::SeqCst, Ordering::SeqCst)
            .is_err();

        if superseded {
            debug!("Attempt {} already superseded, leaving state alone", attempt);
        } else {
            self.set_state(ConnectionState::Idle);
        }
    }

    fn set_state(&self, next: ConnectionState) {
        let previous = self.state.send_replace(next);
        if previous == next {
            return;
        }

        info!("Connection state: {} -> {}", previous, next);

        if previous.is_connected() != next.is_connected() {
            let callback = lock(&self.on_change).clone();
            if let Some(callback) = callback {
                callback(next.is_connected());
            }
        }
    }

    fn constraints(&self) -> AudioConstraints {
        let input = lock(&self.selection).input.clone();
        AudioConstraints {
            device_id: AudioConstraints::for_device(input.as_deref()).device_id,
            ..lock(&self.processing).clone()
        }
    }

    async fn connect(self: &Arc<Self>, attempt: u64) -> Result<()> {
        let relay = self.signaling.fetch_relay_config().await;
        debug!("Using RTC configuration: {:?}", relay);

        info!("Requesting microphone permissions...");
        let stream = match self.media.get_user_media(&self.constraints()).await {
            Ok(stream) => stream,
            Err(e) => {
                self.fail_attempt(attempt);
                return Err(e);
            }
        };

        let session_id = Session::generate_id();
        info!("Generated WebRTC ID: {}", session_id);

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let transport = match self.transports.create(&relay, events_tx).await {
            Ok(transport) => transport,
            Err(e) => {
                stream.stop_all().await;
                self.fail_attempt(attempt);
                return Err(e);
            }
        };

        // Install only if no close() or newer attempt intervened. Holding the
        // slot also keeps the event task from observing a missing session.
        let installed = {
            let mut slot = self.session.lock().await;
            if slot.is_none() && self.generation.load(Ordering::SeqCst) == attempt {
                let events = tokio::spawn(Self::consume_events(
                    Arc::clone(self),
                    session_id.clone(),
                    events_rx,
                ));
                *slot = Some(Session::new(
                    session_id.clone(),
                    Arc::clone(&transport),
                    stream.clone(),
                    events,
                ));
                true
            } else {
                false
            }
        };

        if !installed {
            info!("Session {} abandoned during setup", session_id);
            stream.stop_all().await;
            if let Err(e) = transport.close().await {
                warn!("Failed to close abandoned transport: {}", e);
            }
            return Ok(());
        }

        if let Err(e) = self.negotiate(&session_id, transport.as_ref(), &stream).await {
            self.shutdown_session(Some(&session_id), true).await;
            return Err(e);
        }

        Ok(())
    }

    async fn negotiate(
        &self,
        session_id: &str,
        transport: &dyn PeerTransport,
        stream: &LocalStream,
    ) -> Result<()> {
        for track in &stream.tracks {
            transport.add_track(track.as_ref(), &stream.id).await?;
        }

        transport.open_data_channel(DATA_CHANNEL_LABEL).await?;

        let offer = transport.create_offer().await?;
        let answer = self.signaling.exchange_offer(&offer, session_id).await?;
        info!("Offer sent, server responded.");

        transport.set_remote_description(answer).await
    }

    /// Consume one session's transport events until it ends
    async fn consume_events(self: Arc<Self>, session_id: String, mut events: EventReceiver) {
        while let Some(event) = events.recv().await {
            match &event {
                TransportEvent::IceCandidate(candidate) => {
                    self.forward_candidate(&session_id, candidate.clone());
                }
                TransportEvent::RemoteTrack {
                    kind,
                    stream_id,
                    audio,
                } => {
                    self.attach_remote(&session_id, kind, stream_id, audio.as_ref())
                        .await;
                }
                TransportEvent::StateChanged(state) => {
                    debug!("Session {} transport state: {}", session_id, state);
                }
            }

            let current = *self.state.borrow();
            match transition(current, &event) {
                Transition::Stay => {}
                Transition::Connected => {
                    if self.is_current(&session_id).await {
                        self.set_state(ConnectionState::Connected);
                    }
                }
                Transition::TearDown => {
                    if self.shutdown_session(Some(&session_id), false).await {
                        break;
                    }
                }
            }
        }

        debug!("Event stream for session {} ended", session_id);
    }

    async fn is_current(&self, session_id: &str) -> bool {
        self.session
            .lock()
            .await
            .as_ref()
            .map_or(false, |s| s.id() == session_id)
    }

    /// Fire-and-forget candidate delivery
    fn forward_candidate(&self, session_id: &str, candidate: IceCandidate) {
        let signaling = Arc::clone(&self.signaling);
        let session_id = session_id.to_string();

        tokio::spawn(async move {
            if let Err(e) = signaling.send_ice_candidate(&candidate, &session_id).await {
                warn!("Failed to send ICE candidate: {}", e);
            }
        });
    }

    /// Play a remote audio track on the selected output
    async fn attach_remote(
        &self,
        session_id: &str,
        kind: &str,
        stream_id: &str,
        audio: Option<&RemoteAudio>,
    ) {
        if kind != "audio" {
            debug!("Ignoring remote {} track", kind);
            return;
        }

        let Some(frames) = audio.and_then(RemoteAudio::take) else {
            warn!("Remote stream {} carries no decodable audio", stream_id);
            return;
        };

        let output = lock(&self.selection).output.clone();
        info!(
            "Attaching remote stream {} to {}",
            stream_id,
            output.as_deref().unwrap_or("default output")
        );

        let playback = match self.media.play(frames, output.as_deref()).await {
            Ok(playback) => playback,
            Err(e) => {
                error!("Error starting remote audio playback: {}", e);
                return;
            }
        };

        let retired = {
            let mut slot = self.session.lock().await;
            match slot.as_mut() {
                Some(session) if session.id() == session_id => session.attach_playback(playback),
                _ => Some(playback),
            }
        };

        if let Some(retired) = retired {
            stop_playback(retired).await;
        }
    }

    async fn apply_sink(&self, device_id: &str) {
        match self.media.set_sink(device_id).await {
            Ok(()) => info!("Audio output device changed to: {}", device_id),
            Err(e) => error!("Error setting audio output device: {}", e),
        }
    }

    /// Tear down the live session and enter `Idle`
    ///
    /// With `expected` set, only that session is torn down; returns false if
    /// it is no longer the live one.
    async fn shutdown_session(&self, expected: Option<&str>, abort_events: bool) -> bool {
        let session = {
            let mut guard = self.session.lock().await;
            match (guard.as_ref(), expected) {
                (Some(live), Some(id)) if live.id() != id => return false,
                (None, Some(_)) => return false,
                _ => {
                    // Any attempt still acquiring devices is now stale
                    self.generation.fetch_add(1, Ordering::SeqCst);
                    guard.take()
                }
            }
        };

        if let Some(session) = session {
            session.teardown(abort_events).await;
        }

        self.set_state(ConnectionState::Idle);
        true
    }
}

async fn stop_playback(playback: Arc<dyn Playback>) {
    if let Err(e) = tokio::task::spawn_blocking(move || playback.stop()).await {
        warn!("Stopping playback failed: {}", e);
    }
}

impl std::fmt::Debug for VoiceController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoiceController")
            .field("state", &self.state())
            .field("selection", &self.selection())
            .finish()
    }
}
