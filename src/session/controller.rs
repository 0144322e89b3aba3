//! The session owner task and its command handle.
//!
//! [`CameraSessionController`] owns the backend, the render targets and at
//! most one live session. It runs as a single task that serializes three
//! inputs: caller commands from [`CameraSession`] handles, driver events
//! from [`DriverCallback`]s, and permission outcomes from the gate. Session
//! state is only ever touched from that task.

use super::{
    ControllerFault, ErrorClass, ErrorKind, EventNotifier, FrameSink, OpenedSession,
    OperationKind, OutputTarget, PendingOperations, PendingReply, PreviewStreamer, Recorder,
    Reply, SessionError, SessionEvent, SessionHandle, SessionId, SessionState, SessionStats,
    TargetError,
};
use crate::device::{
    CameraBackend, CameraDescriptor, CameraDevice, DriverCallback, DriverError, DriverEvent,
    DriverMessage, OpenRequest, RenderTargets, Resolution, ResolutionPreset, TextureId,
};
use crate::permission::{PermissionGate, PermissionOutcome};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

const COMMAND_QUEUE_DEPTH: usize = 64;

/// Requests sent from [`CameraSession`] to the owner task.
enum Command {
    Open {
        descriptor: CameraDescriptor,
        preset: ResolutionPreset,
        enable_audio: bool,
        respond_to: Reply<OpenedSession>,
    },
    CaptureStill {
        path: PathBuf,
        respond_to: Reply<()>,
    },
    StartRecording {
        path: PathBuf,
        respond_to: Reply<()>,
    },
    StopRecording {
        respond_to: Reply<()>,
    },
    PauseRecording {
        respond_to: Reply<()>,
    },
    ResumeRecording {
        respond_to: Reply<()>,
    },
    StartImageStream {
        sink: Box<dyn FrameSink>,
        respond_to: Reply<()>,
    },
    StopImageStream {
        respond_to: Reply<()>,
    },
    Close {
        respond_to: oneshot::Sender<()>,
    },
    Observe {
        respond_to: Reply<mpsc::UnboundedReceiver<SessionEvent>>,
    },
    Unobserve {
        respond_to: oneshot::Sender<()>,
    },
    State {
        respond_to: oneshot::Sender<SessionState>,
    },
    Stats {
        respond_to: oneshot::Sender<SessionStats>,
    },
}

struct PermissionResult {
    session: SessionId,
    outcome: PermissionOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    AwaitingPermission,
    Opening,
    Open,
}

/// Why a session is being torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Teardown {
    Closed,
    Replaced,
    Disconnected,
    OpenFailed,
    Fault,
    Shutdown,
}

struct ActiveSession {
    id: SessionId,
    phase: Phase,
    descriptor: CameraDescriptor,
    resolution: Resolution,
    enable_audio: bool,
    texture: Option<TextureId>,
    device: Option<Box<dyn CameraDevice>>,
    permission_task: Option<JoinHandle<()>>,
    recorder: Recorder,
    streamer: PreviewStreamer,
    pending: PendingOperations,
    notifier: EventNotifier,
}

/// Borrowed view of a session in the `Open` phase.
struct OpenSession<'a> {
    device: &'a mut dyn CameraDevice,
    recorder: &'a mut Recorder,
    streamer: &'a mut PreviewStreamer,
    pending: &'a mut PendingOperations,
}

impl ActiveSession {
    fn state(&self) -> SessionState {
        match self.phase {
            Phase::AwaitingPermission | Phase::Opening => SessionState::Opening,
            Phase::Open => SessionState::Open {
                recording: self.recorder.state(),
                streaming: self.streamer.state(),
            },
        }
    }

    fn as_open(&mut self) -> Option<OpenSession<'_>> {
        if self.phase != Phase::Open {
            return None;
        }
        let device = self.device.as_deref_mut()?;
        Some(OpenSession {
            device,
            recorder: &mut self.recorder,
            streamer: &mut self.streamer,
            pending: &mut self.pending,
        })
    }
}

fn not_open(operation: OperationKind) -> SessionError {
    SessionError::precondition(operation.precondition_kind(), "No camera is open")
}

/// Claims an output path, refusing to overwrite.
fn claim(operation: OperationKind, path: PathBuf) -> Result<OutputTarget, SessionError> {
    OutputTarget::vacant(path).map_err(|e| match e {
        TargetError::Exists(path) => SessionError::file_exists(&path),
        other => SessionError::from_driver(operation, DriverError::Io(other.to_string())),
    })
}

/// Owner of one camera and its session.
///
/// Created together with its first [`CameraSession`] handle; drive it with
/// [`CameraSessionController::run`] or [`CameraSessionController::spawn`].
pub struct CameraSessionController {
    backend: Box<dyn CameraBackend>,
    targets: Box<dyn RenderTargets>,
    gate: Arc<PermissionGate>,
    commands: mpsc::Receiver<Command>,
    driver_tx: mpsc::UnboundedSender<DriverMessage>,
    driver_rx: mpsc::UnboundedReceiver<DriverMessage>,
    permission_tx: mpsc::UnboundedSender<PermissionResult>,
    permission_rx: mpsc::UnboundedReceiver<PermissionResult>,
    next_session: u64,
    session: Option<ActiveSession>,
    stats: SessionStats,
    fault: Option<ControllerFault>,
}

enum Input {
    Command(Option<Command>),
    Driver(DriverMessage),
    Permission(PermissionResult),
}

impl CameraSessionController {
    /// Creates a controller and a handle to it.
    pub fn new(
        backend: impl CameraBackend + 'static,
        targets: impl RenderTargets + 'static,
        gate: Arc<PermissionGate>,
    ) -> (Self, CameraSession) {
        let (command_tx, commands) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let (driver_tx, driver_rx) = mpsc::unbounded_channel();
        let (permission_tx, permission_rx) = mpsc::unbounded_channel();

        let controller = Self {
            backend: Box::new(backend),
            targets: Box::new(targets),
            gate,
            commands,
            driver_tx,
            driver_rx,
            permission_tx,
            permission_rx,
            next_session: 0,
            session: None,
            stats: SessionStats::default(),
            fault: None,
        };
        (controller, CameraSession { sender: command_tx })
    }

    /// Runs the controller on its own task.
    pub fn spawn(self) -> JoinHandle<Result<(), ControllerFault>> {
        tokio::spawn(self.run())
    }

    /// Processes commands and driver events until every handle is dropped.
    ///
    /// Returns `Err` if the driver raised an unexpected fault; the session
    /// has been torn down by then.
    pub async fn run(mut self) -> Result<(), ControllerFault> {
        tracing::info!("camera session controller started");

        loop {
            let input = tokio::select! {
                command = self.commands.recv() => Input::Command(command),
                Some(message) = self.driver_rx.recv() => Input::Driver(message),
                Some(result) = self.permission_rx.recv() => Input::Permission(result),
            };

            let before = self.state();
            match input {
                Input::Command(Some(command)) => self.handle_command(command),
                Input::Command(None) => break,
                Input::Driver(message) => self.handle_driver(message),
                Input::Permission(result) => self.handle_permission(result),
            }
            let after = self.state();
            if before != after {
                tracing::info!(from = %before, to = %after, "session state changed");
            }

            if let Some(fault) = self.fault.take() {
                self.teardown(Teardown::Fault);
                tracing::error!(
                    operation = %fault.operation,
                    error = %fault.description,
                    "camera session controller stopped by driver fault"
                );
                return Err(fault);
            }
        }

        self.teardown(Teardown::Shutdown);
        tracing::info!("camera session controller stopped");
        Ok(())
    }

    fn state(&self) -> SessionState {
        self.session
            .as_ref()
            .map_or(SessionState::Closed, ActiveSession::state)
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Open {
                descriptor,
                preset,
                enable_audio,
                respond_to,
            } => self.open(descriptor, preset, enable_audio, respond_to),
            Command::CaptureStill { path, respond_to } => self.capture_still(path, respond_to),
            Command::StartRecording { path, respond_to } => {
                self.start_recording(path, respond_to)
            }
            Command::StopRecording { respond_to } => self.stop_recording(respond_to),
            Command::PauseRecording { respond_to } => {
                let op = OperationKind::PauseRecording;
                let capabilities = self.backend.capabilities();
                let result = self
                    .require_open(op)
                    .and_then(|open| open.recorder.pause(open.device, capabilities));
                self.respond(op, respond_to, result);
            }
            Command::ResumeRecording { respond_to } => {
                let op = OperationKind::ResumeRecording;
                let capabilities = self.backend.capabilities();
                let result = self
                    .require_open(op)
                    .and_then(|open| open.recorder.resume(open.device, capabilities));
                self.respond(op, respond_to, result);
            }
            Command::StartImageStream { sink, respond_to } => {
                let op = OperationKind::StartImageStream;
                let result = self
                    .require_open(op)
                    .and_then(|open| open.streamer.start(open.device, sink));
                self.respond(op, respond_to, result);
            }
            Command::StopImageStream { respond_to } => {
                let op = OperationKind::StopImageStream;
                let result = self
                    .require_open(op)
                    .and_then(|open| open.streamer.stop(open.device));
                self.respond(op, respond_to, result);
            }
            Command::Close { respond_to } => {
                tracing::debug!("close requested");
                self.teardown(Teardown::Closed);
                let _ = respond_to.send(());
            }
            Command::Observe { respond_to } => {
                let result = match self.session.as_mut() {
                    Some(session) => Ok(session.notifier.attach()),
                    None => Err(SessionError::precondition(
                        ErrorKind::AccessFailure,
                        "No camera is open",
                    )),
                };
                let _ = respond_to.send(result);
            }
            Command::Unobserve { respond_to } => {
                if let Some(session) = self.session.as_mut() {
                    session.notifier.detach();
                }
                let _ = respond_to.send(());
            }
            Command::State { respond_to } => {
                let _ = respond_to.send(self.state());
            }
            Command::Stats { respond_to } => {
                let mut stats = self.stats.clone();
                stats.live_session = self.session.as_ref().map(|s| s.id);
                let _ = respond_to.send(stats);
            }
        }
    }

    fn open(
        &mut self,
        descriptor: CameraDescriptor,
        preset: ResolutionPreset,
        enable_audio: bool,
        respond_to: Reply<OpenedSession>,
    ) {
        let op = OperationKind::Open;
        if self
            .session
            .as_ref()
            .is_some_and(|s| s.pending.is_pending(op))
        {
            let err = SessionError::precondition(
                ErrorKind::DeviceUnavailable,
                "A camera is already being opened",
            );
            return self.respond(op, respond_to, Err(err));
        }
        if self.session.is_some() {
            tracing::info!("closing previous session before opening a new one");
            self.teardown(Teardown::Replaced);
        }

        let Some(resolution) = preset.resolve(&descriptor) else {
            let err = SessionError::new(
                ErrorKind::DeviceUnavailable,
                ErrorClass::Capability,
                format!("Camera '{}' reports no supported resolutions", descriptor.name),
            );
            return self.respond(op, respond_to, Err(err));
        };

        self.next_session += 1;
        let id = SessionId::new(self.next_session);
        tracing::info!(
            session = %id,
            camera = %descriptor.name,
            %preset,
            %resolution,
            audio = enable_audio,
            "opening camera"
        );

        let gate = Arc::clone(&self.gate);
        let results = self.permission_tx.clone();
        let permission_task = tokio::spawn(async move {
            let outcome = gate.request_permissions(enable_audio).await;
            let _ = results.send(PermissionResult {
                session: id,
                outcome,
            });
        });

        let mut pending = PendingOperations::default();
        if let Err(reply) = pending.insert(op, PendingReply::Open(respond_to)) {
            reply.fail(SessionError::session_closed(op));
        }
        self.session = Some(ActiveSession {
            id,
            phase: Phase::AwaitingPermission,
            descriptor,
            resolution,
            enable_audio,
            texture: None,
            device: None,
            permission_task: Some(permission_task),
            recorder: Recorder::default(),
            streamer: PreviewStreamer::default(),
            pending,
            notifier: EventNotifier::default(),
        });
    }

    fn handle_permission(&mut self, result: PermissionResult) {
        let Some(session) = self
            .session
            .as_mut()
            .filter(|s| s.id == result.session && s.phase == Phase::AwaitingPermission)
        else {
            tracing::debug!(session = %result.session, "late permission result dropped");
            return;
        };
        session.permission_task = None;

        match result.outcome {
            PermissionOutcome::Granted => self.open_device(),
            PermissionOutcome::Denied(denied) => {
                self.fail_open(SessionError::access_denied(denied));
            }
        }
    }

    /// Allocates the render target and asks the backend for a device.
    fn open_device(&mut self) {
        let texture = match self.targets.allocate() {
            Ok(texture) => texture,
            Err(e) => {
                let err = SessionError::new(
                    ErrorKind::DeviceUnavailable,
                    ErrorClass::DriverIo,
                    e.to_string(),
                );
                return self.fail_open(err);
            }
        };
        let Some(session) = self.session.as_mut() else {
            self.targets.release(texture);
            return;
        };
        session.texture = Some(texture);

        let request = OpenRequest {
            descriptor: session.descriptor.clone(),
            resolution: session.resolution,
            enable_audio: session.enable_audio,
            texture,
        };
        let callback = DriverCallback::new(session.id, self.driver_tx.clone());
        match self.backend.open(request, callback) {
            Ok(device) => {
                session.device = Some(device);
                session.phase = Phase::Opening;
            }
            Err(e) => self.fail_open(SessionError::from_driver(OperationKind::Open, e)),
        }
    }

    fn fail_open(&mut self, err: SessionError) {
        self.note_failure(OperationKind::Open, &err);
        if let Some(reply) = self
            .session
            .as_mut()
            .and_then(|s| s.pending.take(OperationKind::Open))
        {
            reply.fail(err);
        }
        self.teardown(Teardown::OpenFailed);
    }

    fn complete_open(&mut self, result: Result<(), DriverError>) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.phase != Phase::Opening {
            tracing::warn!(session = %session.id, "unexpected open completion ignored");
            return;
        }
        if let Err(e) = result {
            return self.fail_open(SessionError::from_driver(OperationKind::Open, e));
        }
        let Some(texture_id) = session.texture else {
            let err = SessionError::new(
                ErrorKind::DeviceUnavailable,
                ErrorClass::DriverIo,
                "render target missing",
            );
            return self.fail_open(err);
        };

        session.phase = Phase::Open;
        self.stats.sessions_opened += 1;
        let opened = OpenedSession {
            handle: SessionHandle {
                session: session.id,
                texture_id,
            },
            preview_width: session.resolution.width,
            preview_height: session.resolution.height,
        };
        tracing::info!(session = %session.id, texture = %texture_id, "camera opened");
        if let Some(reply) = session.pending.take(OperationKind::Open) {
            reply.opened(opened);
        }
    }

    fn require_open(&mut self, operation: OperationKind) -> Result<OpenSession<'_>, SessionError> {
        match self.session.as_mut() {
            None => Err(not_open(operation)),
            Some(session) => session.as_open().ok_or_else(|| {
                SessionError::precondition(operation.precondition_kind(), "Camera is not open yet")
            }),
        }
    }

    fn capture_still(&mut self, path: PathBuf, respond_to: Reply<()>) {
        let op = OperationKind::CaptureStill;
        let result = self.require_open(op).and_then(|open| {
            if open.pending.is_pending(op) {
                return Err(SessionError::precondition(
                    op.precondition_kind(),
                    "A still capture is already in progress",
                ));
            }
            let target = claim(op, path)?;
            tracing::debug!(path = %target.path().display(), "capturing still");
            open.device
                .capture_still(target.path())
                .map_err(|e| SessionError::from_driver(op, e))
        });
        match result {
            Ok(()) => self.park(op, PendingReply::Unit(respond_to)),
            Err(err) => self.respond(op, respond_to, Err(err)),
        }
    }

    fn start_recording(&mut self, path: PathBuf, respond_to: Reply<()>) {
        let op = OperationKind::StartRecording;
        let result = self.require_open(op).and_then(|open| {
            let target = claim(op, path)?;
            open.recorder.start(open.device, target)
        });
        match result {
            Ok(()) => self.park(op, PendingReply::Unit(respond_to)),
            Err(err) => self.respond(op, respond_to, Err(err)),
        }
    }

    fn stop_recording(&mut self, respond_to: Reply<()>) {
        let op = OperationKind::StopRecording;
        let result = self
            .require_open(op)
            .and_then(|open| open.recorder.stop(open.device));
        match result {
            Ok(()) => self.park(op, PendingReply::Unit(respond_to)),
            Err(err) => self.respond(op, respond_to, Err(err)),
        }
    }

    /// Holds a reply until the driver reports completion.
    fn park(&mut self, operation: OperationKind, reply: PendingReply) {
        let Some(session) = self.session.as_mut() else {
            return reply.fail(SessionError::session_closed(operation));
        };
        if let Err(reply) = session.pending.insert(operation, reply) {
            reply.fail(SessionError::precondition(
                operation.precondition_kind(),
                format!("{operation} is already in progress"),
            ));
        }
    }

    fn respond<T>(
        &mut self,
        operation: OperationKind,
        respond_to: Reply<T>,
        result: Result<T, SessionError>,
    ) {
        if let Err(err) = &result {
            self.note_failure(operation, err);
        }
        if respond_to.send(result).is_err() {
            tracing::debug!(%operation, "caller went away before the reply");
        }
    }

    fn note_failure(&mut self, operation: OperationKind, err: &SessionError) {
        self.stats.failed_operations += 1;
        if err.is_fatal() {
            tracing::error!(%operation, error = %err, "unexpected driver fault");
            self.fault.get_or_insert_with(|| ControllerFault {
                operation,
                description: err.description().to_string(),
            });
        } else {
            tracing::warn!(%operation, code = err.code(), error = %err.description(), "operation failed");
        }
    }

    fn handle_driver(&mut self, message: DriverMessage) {
        let DriverMessage { session: id, event } = message;
        let Some(session) = self.session.as_mut().filter(|s| s.id == id) else {
            tracing::trace!(session = %id, "event for a stale session dropped");
            return;
        };

        match event {
            DriverEvent::Completed { operation, result } => {
                self.handle_completion(operation, result)
            }
            DriverEvent::Frame(frame) => {
                if let Some(open) = session.as_open() {
                    if open.streamer.deliver(frame, open.device) {
                        self.stats.frames_delivered += 1;
                    }
                }
            }
            DriverEvent::Error(description) => {
                tracing::warn!(session = %id, error = %description, "camera reported an error");
                self.stats.driver_errors += 1;
                session.notifier.notify(SessionEvent::Error { description });
            }
            DriverEvent::Closed => {
                tracing::warn!(session = %id, "camera closed by the device");
                self.stats.external_closures += 1;
                session.notifier.notify(SessionEvent::CameraClosed);
                self.teardown(Teardown::Disconnected);
            }
        }
    }

    fn handle_completion(&mut self, operation: OperationKind, result: Result<(), DriverError>) {
        if operation == OperationKind::Open {
            return self.complete_open(result);
        }
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let Some(reply) = session.pending.take(operation) else {
            tracing::warn!(session = %session.id, %operation, "completion without a pending operation");
            return;
        };

        let succeeded = result.is_ok();
        match operation {
            OperationKind::StartRecording if succeeded => session.recorder.confirm_started(),
            OperationKind::StartRecording => session.recorder.abort_start(),
            OperationKind::StopRecording if succeeded => {
                session.recorder.confirm_stopped();
                self.stats.recordings_completed += 1;
            }
            OperationKind::StopRecording => session.recorder.abort_stop(),
            OperationKind::CaptureStill if succeeded => {
                tracing::debug!(session = %session.id, "still captured");
                self.stats.stills_captured += 1;
            }
            _ => {}
        }

        match result {
            Ok(()) => reply.succeed(),
            Err(e) => {
                let err = SessionError::from_driver(operation, e);
                self.note_failure(operation, &err);
                reply.fail(err);
            }
        }
    }

    /// Releases everything the current session holds.
    ///
    /// Pending operations fail, the device closes and the render target is
    /// released before this returns. The observer channel ends.
    fn teardown(&mut self, reason: Teardown) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        let from = session.state();
        tracing::info!(
            session = %session.id,
            %from,
            to = %SessionState::Closing,
            ?reason,
            "session state changed"
        );

        if let Some(task) = session.permission_task.take() {
            task.abort();
        }
        session.streamer.detach();
        session.recorder.reset();
        if reason == Teardown::Fault {
            session
                .pending
                .fail_all(|_| SessionError::controller_stopped());
        } else {
            session.pending.fail_all(SessionError::session_closed);
        }
        if let Some(mut device) = session.device.take() {
            device.close();
        }
        if let Some(texture) = session.texture.take() {
            self.targets.release(texture);
        }
        session.notifier.detach();
        self.stats.sessions_closed += 1;

        tracing::info!(
            session = %session.id,
            from = %SessionState::Closing,
            to = %SessionState::Closed,
            "session state changed"
        );
    }
}

impl std::fmt::Debug for CameraSessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraSessionController")
            .field("state", &self.state())
            .field("stats", &self.stats)
            .finish()
    }
}

/// Cloneable handle for issuing commands to a [`CameraSessionController`].
///
/// Every operation resolves exactly once. Once the controller has stopped,
/// operations fail with a `fault` error, except [`CameraSession::close`]
/// which always succeeds.
#[derive(Debug, Clone)]
pub struct CameraSession {
    sender: mpsc::Sender<Command>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Command::Open { .. } => "Open",
            Command::CaptureStill { .. } => "CaptureStill",
            Command::StartRecording { .. } => "StartRecording",
            Command::StopRecording { .. } => "StopRecording",
            Command::PauseRecording { .. } => "PauseRecording",
            Command::ResumeRecording { .. } => "ResumeRecording",
            Command::StartImageStream { .. } => "StartImageStream",
            Command::StopImageStream { .. } => "StopImageStream",
            Command::Close { .. } => "Close",
            Command::Observe { .. } => "Observe",
            Command::Unobserve { .. } => "Unobserve",
            Command::State { .. } => "State",
            Command::Stats { .. } => "Stats",
        };
        f.write_str(name)
    }
}

impl CameraSession {
    async fn request<T>(
        &self,
        command: impl FnOnce(Reply<T>) -> Command,
    ) -> Result<T, SessionError> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(command(respond_to))
            .await
            .map_err(|_| SessionError::controller_stopped())?;
        response
            .await
            .map_err(|_| SessionError::controller_stopped())?
    }

    /// Opens `descriptor` at `preset`, closing any session already open.
    ///
    /// Requests camera permission, and microphone permission when
    /// `enable_audio` is set, before the device is touched.
    pub async fn open(
        &self,
        descriptor: CameraDescriptor,
        preset: ResolutionPreset,
        enable_audio: bool,
    ) -> Result<OpenedSession, SessionError> {
        self.request(|respond_to| Command::Open {
            descriptor,
            preset,
            enable_audio,
            respond_to,
        })
        .await
    }

    /// Writes a still picture to `path`, which must not exist yet.
    pub async fn capture_still(&self, path: impl Into<PathBuf>) -> Result<(), SessionError> {
        let path = path.into();
        self.request(|respond_to| Command::CaptureStill { path, respond_to })
            .await
    }

    /// Starts recording video to `path`, which must not exist yet.
    pub async fn start_recording(&self, path: impl Into<PathBuf>) -> Result<(), SessionError> {
        let path = path.into();
        self.request(|respond_to| Command::StartRecording { path, respond_to })
            .await
    }

    /// Stops the recording and finalizes the file.
    pub async fn stop_recording(&self) -> Result<(), SessionError> {
        self.request(|respond_to| Command::StopRecording { respond_to })
            .await
    }

    /// Pauses the running recording.
    pub async fn pause_recording(&self) -> Result<(), SessionError> {
        self.request(|respond_to| Command::PauseRecording { respond_to })
            .await
    }

    /// Resumes a paused recording.
    pub async fn resume_recording(&self) -> Result<(), SessionError> {
        self.request(|respond_to| Command::ResumeRecording { respond_to })
            .await
    }

    /// Does nothing; recording needs no preparation.
    pub async fn prepare_for_video_recording(&self) -> Result<(), SessionError> {
        Ok(())
    }

    /// Starts pushing preview frames to `sink`.
    pub async fn start_image_stream(
        &self,
        sink: impl FrameSink + 'static,
    ) -> Result<(), SessionError> {
        let sink: Box<dyn FrameSink> = Box::new(sink);
        self.request(|respond_to| Command::StartImageStream { sink, respond_to })
            .await
    }

    /// Stops pushing frames. No frame reaches the sink after this returns.
    pub async fn stop_image_stream(&self) -> Result<(), SessionError> {
        self.request(|respond_to| Command::StopImageStream { respond_to })
            .await
    }

    /// Closes the session. Safe to call in any state, any number of times.
    pub async fn close(&self) -> Result<(), SessionError> {
        let (respond_to, response) = oneshot::channel();
        if self.sender.send(Command::Close { respond_to }).await.is_ok() {
            let _ = response.await;
        }
        Ok(())
    }

    /// Same as [`CameraSession::close`].
    pub async fn dispose(&self) -> Result<(), SessionError> {
        self.close().await
    }

    /// Attaches an observer for unsolicited events of the current session,
    /// replacing any previous observer.
    pub async fn observe(&self) -> Result<mpsc::UnboundedReceiver<SessionEvent>, SessionError> {
        self.request(|respond_to| Command::Observe { respond_to })
            .await
    }

    /// Detaches the event observer.
    pub async fn unobserve(&self) {
        let (respond_to, response) = oneshot::channel();
        if self.sender.send(Command::Unobserve { respond_to }).await.is_ok() {
            let _ = response.await;
        }
    }

    /// Current session state. `Closed` once the controller has stopped.
    pub async fn state(&self) -> SessionState {
        let (respond_to, response) = oneshot::channel();
        if self.sender.send(Command::State { respond_to }).await.is_err() {
            return SessionState::Closed;
        }
        response.await.unwrap_or_default()
    }

    /// Lifetime counters of the controller.
    pub async fn stats(&self) -> Result<SessionStats, SessionError> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(Command::Stats { respond_to })
            .await
            .map_err(|_| SessionError::controller_stopped())?;
        response.await.map_err(|_| SessionError::controller_stopped())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{InMemoryRenderTargets, LensDirection, MockBackend, MockControl};
    use crate::permission::ScriptedPermissionHost;
    use crate::session::RecordingState;

    fn descriptor() -> CameraDescriptor {
        CameraDescriptor::new(
            "back",
            LensDirection::Back,
            vec![Resolution::new(640, 480), Resolution::new(1280, 720)],
        )
    }

    fn start(host: ScriptedPermissionHost) -> (CameraSession, MockControl, JoinHandle<Result<(), ControllerFault>>) {
        let backend = MockBackend::new();
        let control = backend.control();
        let gate = Arc::new(PermissionGate::new(Arc::new(host)));
        let (controller, session) =
            CameraSessionController::new(backend, InMemoryRenderTargets::new(), gate);
        (session, control, controller.spawn())
    }

    #[tokio::test]
    async fn test_open_resolves_preset() {
        let (session, control, _task) = start(ScriptedPermissionHost::granted());

        let opened = session
            .open(descriptor(), ResolutionPreset::High, false)
            .await
            .unwrap();
        assert_eq!((opened.preview_width, opened.preview_height), (1280, 720));
        assert_eq!(session.state().await, SessionState::opened());
        assert!(control.is_device_open());
    }

    #[tokio::test]
    async fn test_commands_while_closed_are_preconditions() {
        let (session, control, _task) = start(ScriptedPermissionHost::granted());

        let dir = tempfile::tempdir().unwrap();
        let (sink, _frames) = mpsc::unbounded_channel::<crate::device::Frame>();
        let results = [
            (
                "startRecording",
                session.start_recording(dir.path().join("clip.mp4")).await,
                ErrorKind::VideoRecordingFailed,
            ),
            ("stopRecording", session.stop_recording().await, ErrorKind::VideoRecordingFailed),
            ("pauseRecording", session.pause_recording().await, ErrorKind::VideoRecordingFailed),
            ("resumeRecording", session.resume_recording().await, ErrorKind::VideoRecordingFailed),
            (
                "captureStill",
                session.capture_still(dir.path().join("never.jpg")).await,
                ErrorKind::AccessFailure,
            ),
            ("startImageStream", session.start_image_stream(sink).await, ErrorKind::AccessFailure),
            ("stopImageStream", session.stop_image_stream().await, ErrorKind::AccessFailure),
        ];

        for (name, result, kind) in results {
            let err = result.unwrap_err();
            assert_eq!(err.kind(), kind, "{name}");
            assert_eq!(err.class(), ErrorClass::Precondition, "{name}");
        }
        assert_eq!(control.open_count(), 0);
        assert!(control.writes().is_empty());
        assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
        assert_eq!(session.state().await, SessionState::Closed);
    }

    #[tokio::test]
    async fn test_open_with_denied_permission() {
        let host = ScriptedPermissionHost::new(false, false);
        host.answer_with(false, false);
        let (session, control, _task) = start(host);

        let err = session
            .open(descriptor(), ResolutionPreset::Low, false)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AccessDenied);
        assert_eq!(err.code(), "cameraPermission");
        assert_eq!(control.open_count(), 0);
        assert_eq!(session.state().await, SessionState::Closed);
    }

    #[tokio::test]
    async fn test_recording_state_is_reported() {
        let (session, _control, _task) = start(ScriptedPermissionHost::granted());
        let dir = tempfile::tempdir().unwrap();
        session
            .open(descriptor(), ResolutionPreset::Medium, false)
            .await
            .unwrap();

        session
            .start_recording(dir.path().join("clip.mp4"))
            .await
            .unwrap();
        assert_eq!(
            session.state().await.recording(),
            Some(RecordingState::Recording)
        );
        session.pause_recording().await.unwrap();
        assert_eq!(session.state().await.recording(), Some(RecordingState::Paused));
    }

    #[tokio::test]
    async fn test_stats_track_lifecycle() {
        let (session, _control, _task) = start(ScriptedPermissionHost::granted());
        session
            .open(descriptor(), ResolutionPreset::Low, false)
            .await
            .unwrap();
        let live = session.stats().await.unwrap();
        assert_eq!(live.sessions_opened, 1);
        assert!(live.live_session.is_some());

        session.close().await.unwrap();
        let closed = session.stats().await.unwrap();
        assert_eq!(closed.sessions_closed, 1);
        assert_eq!(closed.live_session, None);
    }
}
