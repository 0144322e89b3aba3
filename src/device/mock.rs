//! Scriptable in-process camera backend.
//!
//! Generates synthetic frames and writes placeholder files so the session
//! controller can be exercised without hardware. A [`MockControl`] handle
//! lets tests inject failures, unsolicited events and frames.

use super::{
    CameraBackend, CameraDevice, DriverCallback, DriverCapabilities, DriverError, Frame,
    ImageFormat, OpenRequest, Plane, Resolution,
};
use crate::session::{OperationKind, SessionId};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

/// Leading bytes of the placeholder still image (JPEG SOI + APP0).
const STILL_MAGIC: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0];
/// Leading bytes of the placeholder recording (ISO BMFF `ftyp` box).
const RECORDING_MAGIC: &[u8] = b"\x00\x00\x00\x18ftypmp42";

/// Mock backend settings.
#[derive(Debug, Clone)]
pub struct MockConfig {
    /// Frames per second generated while streaming. Zero means frames are
    /// only produced through [`MockControl::emit_frames`].
    pub fps: u32,
    /// Reported capabilities.
    pub capabilities: DriverCapabilities,
    /// Layout of generated frames.
    pub format: ImageFormat,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            fps: 0,
            capabilities: DriverCapabilities::default(),
            format: ImageFormat::Yuv420,
        }
    }
}

#[derive(Debug)]
struct LiveDevice {
    session: SessionId,
    callback: DriverCallback,
    resolution: Resolution,
    streaming: bool,
    /// Bumped on every stream start; a pump only emits for its own.
    generation: u64,
    sequence: u64,
}

#[derive(Debug, Default)]
struct MockState {
    opens: u64,
    closes: u64,
    current: Option<LiveDevice>,
    writes: Vec<PathBuf>,
    recording: Option<PathBuf>,
    paused: bool,
    frames_emitted: u64,
    fail_open: Option<DriverError>,
    fail_open_async: Option<DriverError>,
    fail_still: Option<DriverError>,
    fail_stream: Option<DriverError>,
    defer_stills: bool,
    deferred_stills: Vec<(DriverCallback, PathBuf)>,
}

fn lock(state: &Mutex<MockState>) -> MutexGuard<'_, MockState> {
    state.lock().unwrap_or_else(|e| {
        tracing::error!("mock camera state mutex poisoned: {e}");
        e.into_inner()
    })
}

/// Bytes in a `width` x `height` plane at `bytes_per_pixel`.
fn plane_len(width: u32, height: u32, bytes_per_pixel: u32) -> usize {
    width as usize * height as usize * bytes_per_pixel as usize
}

/// Synthetic frame for the given size and sequence number.
fn synthesize(format: ImageFormat, resolution: Resolution, sequence: u64) -> Frame {
    let Resolution { width, height } = resolution;
    let pattern = |len: usize| -> Vec<u8> {
        (0..len)
            .map(|i| ((i as u64 ^ sequence) % 256) as u8)
            .collect()
    };
    match format {
        ImageFormat::Yuv420 => {
            let luma = Plane {
                bytes: pattern(plane_len(width, height, 1)),
                bytes_per_row: width,
                bytes_per_pixel: 1,
            };
            let chroma_width = width.div_ceil(2);
            let chroma_len = plane_len(chroma_width, height.div_ceil(2), 1);
            let chroma = Plane {
                bytes: pattern(chroma_len),
                bytes_per_row: chroma_width,
                bytes_per_pixel: 1,
            };
            Frame::new(format, width, height, vec![luma, chroma.clone(), chroma], sequence)
        }
        ImageFormat::Nv21 => {
            let luma = Plane {
                bytes: pattern(plane_len(width, height, 1)),
                bytes_per_row: width,
                bytes_per_pixel: 1,
            };
            let chroma = Plane {
                bytes: pattern(plane_len(width, height.div_ceil(2), 1)),
                bytes_per_row: width,
                bytes_per_pixel: 2,
            };
            Frame::new(format, width, height, vec![luma, chroma], sequence)
        }
        ImageFormat::Rgb8 => Frame::packed(
            format,
            width,
            height,
            pattern(plane_len(width, height, 3)),
            sequence,
        ),
        ImageFormat::Jpeg => {
            let mut bytes = STILL_MAGIC.to_vec();
            bytes.extend(pattern(64));
            Frame::packed(format, width, height, bytes, sequence)
        }
    }
}

/// Emits the next frame for `session` if it is still the streaming device.
/// A pump passes its `generation` and stops once a newer stream replaced it.
fn emit_next(
    state: &Mutex<MockState>,
    session: SessionId,
    generation: Option<u64>,
    format: ImageFormat,
) -> bool {
    let mut guard = lock(state);
    let state = &mut *guard;
    let Some(device) = state.current.as_mut() else {
        return false;
    };
    if device.session != session || !device.streaming {
        return false;
    }
    if generation.is_some_and(|g| g != device.generation) {
        return false;
    }
    device.sequence += 1;
    let frame = synthesize(format, device.resolution, device.sequence);
    device.callback.frame(frame);
    state.frames_emitted += 1;
    true
}

/// Mock camera backend.
#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    config: MockConfig,
    state: Arc<Mutex<MockState>>,
}

impl MockBackend {
    /// Creates a backend with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend with custom settings.
    pub fn with_config(config: MockConfig) -> Self {
        Self {
            config,
            state: Arc::default(),
        }
    }

    /// Returns a handle for scripting and inspecting this backend.
    pub fn control(&self) -> MockControl {
        MockControl {
            state: Arc::clone(&self.state),
            format: self.config.format,
        }
    }
}

impl CameraBackend for MockBackend {
    fn capabilities(&self) -> DriverCapabilities {
        self.config.capabilities
    }

    fn open(
        &mut self,
        request: OpenRequest,
        callback: DriverCallback,
    ) -> Result<Box<dyn CameraDevice>, DriverError> {
        let mut state = lock(&self.state);
        if let Some(err) = state.fail_open.take() {
            return Err(err);
        }
        if let Some(previous) = state.current.as_ref() {
            return Err(DriverError::Access(format!(
                "camera '{}' already in use by session {}",
                request.descriptor.name, previous.session
            )));
        }

        let session = callback.session();
        state.opens += 1;

        if let Some(err) = state.fail_open_async.take() {
            callback.completed(OperationKind::Open, Err(err));
        } else {
            state.current = Some(LiveDevice {
                session,
                callback: callback.clone(),
                resolution: request.resolution,
                streaming: false,
                generation: 0,
                sequence: 0,
            });
            callback.completed(OperationKind::Open, Ok(()));
        }

        tracing::info!(
            camera = %request.descriptor.name,
            resolution = %request.resolution,
            texture = %request.texture,
            audio = request.enable_audio,
            "MockCamera opened"
        );

        Ok(Box::new(MockDevice {
            session,
            callback,
            config: self.config.clone(),
            state: Arc::clone(&self.state),
            pump: None,
            closed: false,
        }))
    }
}

struct MockDevice {
    session: SessionId,
    callback: DriverCallback,
    config: MockConfig,
    state: Arc<Mutex<MockState>>,
    pump: Option<JoinHandle<()>>,
    closed: bool,
}

impl MockDevice {
    fn ensure_current(&self, state: &MockState) -> Result<(), DriverError> {
        match state.current.as_ref() {
            Some(device) if device.session == self.session && !self.closed => Ok(()),
            _ => Err(DriverError::Access("camera device is closed".to_string())),
        }
    }

    /// Detaches the pump thread. It exits on its next tick once it sees
    /// the stream is off or belongs to a newer generation.
    fn stop_pump(&mut self) {
        if self.pump.take().is_some() {
            tracing::trace!(session = %self.session, "mock frame pump detached");
        }
    }
}

impl CameraDevice for MockDevice {
    fn capture_still(&mut self, path: &Path) -> Result<(), DriverError> {
        let mut state = lock(&self.state);
        self.ensure_current(&state)?;
        if state.recording.is_some() && !self.config.capabilities.still_during_recording {
            return Err(DriverError::Busy(
                "still capture is not available while recording".to_string(),
            ));
        }
        if let Some(err) = state.fail_still.take() {
            self.callback.completed(OperationKind::CaptureStill, Err(err));
            return Ok(());
        }
        if state.defer_stills {
            state
                .deferred_stills
                .push((self.callback.clone(), path.to_path_buf()));
            return Ok(());
        }

        let result = write_still(&mut state, path);
        self.callback.completed(OperationKind::CaptureStill, result);
        Ok(())
    }

    fn start_recording(&mut self, path: &Path) -> Result<(), DriverError> {
        let mut state = lock(&self.state);
        self.ensure_current(&state)?;
        if state.recording.is_some() {
            return Err(DriverError::Busy("recorder already running".to_string()));
        }
        std::fs::write(path, RECORDING_MAGIC).map_err(|e| DriverError::Io(e.to_string()))?;
        state.writes.push(path.to_path_buf());
        state.recording = Some(path.to_path_buf());
        state.paused = false;
        self.callback.completed(OperationKind::StartRecording, Ok(()));
        Ok(())
    }

    fn stop_recording(&mut self) -> Result<(), DriverError> {
        let mut state = lock(&self.state);
        self.ensure_current(&state)?;
        if state.recording.take().is_none() {
            return Err(DriverError::Capture("recorder is not running".to_string()));
        }
        state.paused = false;
        self.callback.completed(OperationKind::StopRecording, Ok(()));
        Ok(())
    }

    fn pause_recording(&mut self) -> Result<(), DriverError> {
        if !self.config.capabilities.pause_resume {
            return Err(DriverError::Unsupported(
                "pauseVideoRecording is not supported by this device".to_string(),
            ));
        }
        let mut state = lock(&self.state);
        self.ensure_current(&state)?;
        state.paused = true;
        Ok(())
    }

    fn resume_recording(&mut self) -> Result<(), DriverError> {
        if !self.config.capabilities.pause_resume {
            return Err(DriverError::Unsupported(
                "resumeVideoRecording is not supported by this device".to_string(),
            ));
        }
        let mut state = lock(&self.state);
        self.ensure_current(&state)?;
        state.paused = false;
        Ok(())
    }

    fn start_frame_stream(&mut self) -> Result<(), DriverError> {
        let generation = {
            let mut state = lock(&self.state);
            self.ensure_current(&state)?;
            if let Some(err) = state.fail_stream.take() {
                return Err(err);
            }
            let Some(device) = state.current.as_mut() else {
                return Err(DriverError::Access("camera device is closed".to_string()));
            };
            device.streaming = true;
            device.generation += 1;
            device.sequence = 0;
            device.generation
        };

        if self.config.fps > 0 {
            let state = Arc::clone(&self.state);
            let session = self.session;
            let format = self.config.format;
            let interval = Duration::from_millis(1000 / u64::from(self.config.fps.max(1)));
            let pump = std::thread::Builder::new()
                .name(format!("mock-frames-{}", self.session))
                .spawn(move || {
                    loop {
                        std::thread::sleep(interval);
                        if !emit_next(&state, session, Some(generation), format) {
                            break;
                        }
                    }
                })
                .map_err(|e| DriverError::Fault(format!("failed to spawn frame pump: {e}")))?;
            self.pump = Some(pump);
        }
        Ok(())
    }

    fn stop_frame_stream(&mut self) -> Result<(), DriverError> {
        {
            let mut state = lock(&self.state);
            self.ensure_current(&state)?;
            if let Some(device) = state.current.as_mut() {
                device.streaming = false;
            }
        }
        self.stop_pump();
        Ok(())
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        {
            let mut state = lock(&self.state);
            if state
                .current
                .as_ref()
                .is_some_and(|device| device.session == self.session)
            {
                state.current = None;
                state.recording = None;
                state.paused = false;
            }
            state.closes += 1;
        }
        self.stop_pump();
        tracing::info!(session = %self.session, "MockCamera closed");
    }
}

impl Drop for MockDevice {
    fn drop(&mut self) {
        self.close();
    }
}

fn write_still(state: &mut MockState, path: &Path) -> Result<(), DriverError> {
    std::fs::write(path, STILL_MAGIC).map_err(|e| DriverError::Io(e.to_string()))?;
    state.writes.push(path.to_path_buf());
    Ok(())
}

/// Test and demo handle onto a [`MockBackend`].
#[derive(Debug, Clone)]
pub struct MockControl {
    state: Arc<Mutex<MockState>>,
    format: ImageFormat,
}

impl MockControl {
    /// Makes the next `open` fail before a device handle is returned.
    pub fn fail_next_open(&self, err: DriverError) {
        lock(&self.state).fail_open = Some(err);
    }

    /// Makes the next `open` return a handle but report failure.
    pub fn fail_next_open_async(&self, err: DriverError) {
        lock(&self.state).fail_open_async = Some(err);
    }

    /// Makes the next still capture complete with `err`.
    pub fn fail_next_still(&self, err: DriverError) {
        lock(&self.state).fail_still = Some(err);
    }

    /// Makes the next `start_frame_stream` fail.
    pub fn fail_next_stream(&self, err: DriverError) {
        lock(&self.state).fail_stream = Some(err);
    }

    /// Holds still captures until [`MockControl::complete_deferred_stills`].
    pub fn defer_stills(&self, defer: bool) {
        lock(&self.state).defer_stills = defer;
    }

    /// Number of still captures currently held.
    pub fn deferred_stills(&self) -> usize {
        lock(&self.state).deferred_stills.len()
    }

    /// Completes every held still capture, writing the files.
    pub fn complete_deferred_stills(&self) -> usize {
        let mut state = lock(&self.state);
        let deferred = std::mem::take(&mut state.deferred_stills);
        let count = deferred.len();
        for (callback, path) in deferred {
            let result = write_still(&mut state, &path);
            callback.completed(OperationKind::CaptureStill, result);
        }
        count
    }

    /// Pushes up to `count` frames if the current device is streaming.
    /// Returns how many were emitted.
    pub fn emit_frames(&self, count: usize) -> usize {
        let session = match lock(&self.state).current.as_ref() {
            Some(device) => device.session,
            None => return 0,
        };
        (0..count)
            .take_while(|_| emit_next(&self.state, session, None, self.format))
            .count()
    }

    /// Raises an unsolicited error on the current device.
    pub fn raise_error(&self, description: &str) -> bool {
        match lock(&self.state).current.as_ref() {
            Some(device) => {
                device.callback.error(description);
                true
            }
            None => false,
        }
    }

    /// Simulates the OS reclaiming the device.
    pub fn disconnect(&self) -> bool {
        match lock(&self.state).current.as_ref() {
            Some(device) => {
                device.callback.closed();
                true
            }
            None => false,
        }
    }

    /// Number of devices opened so far.
    pub fn open_count(&self) -> u64 {
        lock(&self.state).opens
    }

    /// Number of `close` calls on devices.
    pub fn close_count(&self) -> u64 {
        lock(&self.state).closes
    }

    /// Returns true while a device is open.
    pub fn is_device_open(&self) -> bool {
        lock(&self.state).current.is_some()
    }

    /// Every file the driver has written, in order.
    pub fn writes(&self) -> Vec<PathBuf> {
        lock(&self.state).writes.clone()
    }

    /// Path of the running recording.
    pub fn recording(&self) -> Option<PathBuf> {
        lock(&self.state).recording.clone()
    }

    /// Returns true while the recording is paused.
    pub fn is_paused(&self) -> bool {
        lock(&self.state).paused
    }

    /// Returns true while the device is in image-stream mode.
    pub fn is_streaming(&self) -> bool {
        lock(&self.state)
            .current
            .as_ref()
            .is_some_and(|device| device.streaming)
    }

    /// Total frames emitted across all streams.
    pub fn frames_emitted(&self) -> u64 {
        lock(&self.state).frames_emitted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{CameraDescriptor, DriverEvent, LensDirection, TextureId};

    fn request() -> OpenRequest {
        OpenRequest {
            descriptor: CameraDescriptor::new(
                "back",
                LensDirection::Back,
                vec![Resolution::new(320, 240)],
            ),
            resolution: Resolution::new(32, 24),
            enable_audio: false,
            texture: TextureId(1),
        }
    }

    #[test]
    fn test_mock_device_lifecycle() {
        let mut backend = MockBackend::new();
        let control = backend.control();
        let (callback, mut rx) = DriverCallback::channel(SessionId::new(1));

        let mut device = backend.open(request(), callback).unwrap();
        assert!(control.is_device_open());
        assert!(matches!(
            rx.try_recv().unwrap().event,
            DriverEvent::Completed {
                operation: OperationKind::Open,
                result: Ok(())
            }
        ));

        device.start_frame_stream().unwrap();
        assert_eq!(control.emit_frames(2), 2);
        let frame = match rx.try_recv().unwrap().event {
            DriverEvent::Frame(frame) => frame,
            other => panic!("unexpected event: {other:?}"),
        };
        assert_eq!(frame.sequence(), 1);
        assert!(frame.is_valid());

        device.stop_frame_stream().unwrap();
        assert_eq!(control.emit_frames(5), 0);

        device.close();
        assert!(!control.is_device_open());
        assert_eq!(control.close_count(), 1);
    }

    #[test]
    fn test_second_open_while_in_use_is_refused() {
        let mut backend = MockBackend::new();
        let (first, _rx1) = DriverCallback::channel(SessionId::new(1));
        let (second, _rx2) = DriverCallback::channel(SessionId::new(2));

        let _device = backend.open(request(), first).unwrap();
        assert!(matches!(
            backend.open(request(), second),
            Err(DriverError::Access(_))
        ));
    }

    #[test]
    fn test_pause_unsupported() {
        let mut backend = MockBackend::with_config(MockConfig {
            capabilities: DriverCapabilities {
                pause_resume: false,
                still_during_recording: true,
            },
            ..MockConfig::default()
        });
        let (callback, _rx) = DriverCallback::channel(SessionId::new(1));
        let mut device = backend.open(request(), callback).unwrap();
        assert!(matches!(
            device.pause_recording(),
            Err(DriverError::Unsupported(_))
        ));
    }

    #[test]
    fn test_stop_stream_does_not_wait_for_pump() {
        let mut backend = MockBackend::with_config(MockConfig {
            fps: 1,
            ..MockConfig::default()
        });
        let control = backend.control();
        let (callback, _rx) = DriverCallback::channel(SessionId::new(1));
        let mut device = backend.open(request(), callback).unwrap();

        device.start_frame_stream().unwrap();
        let started = std::time::Instant::now();
        device.stop_frame_stream().unwrap();
        device.close();
        assert!(started.elapsed() < Duration::from_millis(500));

        std::thread::sleep(Duration::from_millis(1100));
        assert_eq!(control.frames_emitted(), 0);
    }

    #[test]
    fn test_restarted_stream_retires_old_pump() {
        let mut backend = MockBackend::with_config(MockConfig {
            fps: 50,
            ..MockConfig::default()
        });
        let control = backend.control();
        let (callback, mut rx) = DriverCallback::channel(SessionId::new(1));
        let mut device = backend.open(request(), callback).unwrap();
        let _ = rx.try_recv();

        device.start_frame_stream().unwrap();
        device.stop_frame_stream().unwrap();
        device.start_frame_stream().unwrap();
        std::thread::sleep(Duration::from_millis(200));
        device.stop_frame_stream().unwrap();

        // One live pump means sequence numbers never repeat.
        let mut last = 0;
        while let Ok(message) = rx.try_recv() {
            if let DriverEvent::Frame(frame) = message.event {
                assert_eq!(frame.sequence(), last + 1);
                last = frame.sequence();
            }
        }
        assert!(last > 0);
        assert_eq!(control.frames_emitted(), last);
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_plane_len_widens_before_multiplying() {
        assert_eq!(plane_len(65_536, 65_536, 1), 1 << 32);
        assert_eq!(plane_len(u32::MAX, 2, 3), u32::MAX as usize * 6);
    }

    #[test]
    fn test_synthesized_formats_are_valid() {
        let size = Resolution::new(9, 7);
        for format in [
            ImageFormat::Yuv420,
            ImageFormat::Nv21,
            ImageFormat::Rgb8,
            ImageFormat::Jpeg,
        ] {
            assert!(synthesize(format, size, 3).is_valid(), "{format:?}");
        }
    }
}
