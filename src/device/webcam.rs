//! Webcam backend built on `nokhwa`.
//!
//! Each open device gets a worker thread that owns the `nokhwa` camera;
//! commands reach it over a channel and everything it observes is reported
//! through the session's [`DriverCallback`]. Video recording needs an
//! encoder this backend does not have, so recording requests are rejected
//! as unsupported.

use super::{
    CameraBackend, CameraDevice, DriverCallback, DriverCapabilities, DriverError, Frame,
    ImageFormat, OpenRequest, Resolution,
};
use crate::session::OperationKind;
use nokhwa::{
    pixel_format::RgbFormat,
    utils::{
        CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType,
        Resolution as NokhwaResolution,
    },
    Camera,
};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread::JoinHandle;

const STREAM_FPS: u32 = 30;

enum WorkerCommand {
    Still(PathBuf),
    StartStream,
    StopStream(mpsc::Sender<()>),
    Close,
}

/// Backend for USB and built-in webcams.
#[derive(Debug, Default)]
pub struct NokhwaBackend;

impl NokhwaBackend {
    /// Creates the backend.
    pub fn new() -> Self {
        Self
    }
}

/// Maps a descriptor name to a `nokhwa` index: numeric names select by
/// position, anything else by device name.
fn camera_index(name: &str) -> CameraIndex {
    match name.parse::<u32>() {
        Ok(index) => CameraIndex::Index(index),
        Err(_) => CameraIndex::String(name.to_string()),
    }
}

impl CameraBackend for NokhwaBackend {
    fn capabilities(&self) -> DriverCapabilities {
        DriverCapabilities {
            pause_resume: false,
            still_during_recording: false,
        }
    }

    fn open(
        &mut self,
        request: OpenRequest,
        callback: DriverCallback,
    ) -> Result<Box<dyn CameraDevice>, DriverError> {
        let (tx, rx) = mpsc::channel();
        let worker_callback = callback.clone();
        let worker = std::thread::Builder::new()
            .name(format!("webcam-{}", callback.session()))
            .spawn(move || run_worker(request, worker_callback, rx))
            .map_err(|e| DriverError::Fault(format!("failed to spawn camera worker: {e}")))?;

        Ok(Box::new(WebcamDevice {
            commands: tx,
            worker: Some(worker),
        }))
    }
}

fn open_camera(request: &OpenRequest) -> Result<Camera, DriverError> {
    let Resolution { width, height } = request.resolution;
    let wanted = CameraFormat::new(
        NokhwaResolution::new(width, height),
        FrameFormat::MJPEG,
        STREAM_FPS,
    );
    let format = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(wanted));
    let mut camera = Camera::new(camera_index(&request.descriptor.name), format)
        .map_err(|e| DriverError::Access(format!("failed to create camera: {e}")))?;
    camera
        .open_stream()
        .map_err(|e| DriverError::Access(format!("failed to open camera stream: {e}")))?;
    Ok(camera)
}

fn grab_frame(camera: &mut Camera, sequence: u64) -> Result<Frame, DriverError> {
    let buffer = camera
        .frame()
        .map_err(|e| DriverError::Capture(format!("failed to read frame: {e}")))?;
    let image = buffer
        .decode_image::<RgbFormat>()
        .map_err(|e| DriverError::Capture(format!("failed to decode frame: {e}")))?;
    let (width, height) = (image.width(), image.height());
    Ok(Frame::packed(
        ImageFormat::Rgb8,
        width,
        height,
        image.into_raw(),
        sequence,
    ))
}

fn save_still(camera: &mut Camera, path: &Path) -> Result<(), DriverError> {
    let buffer = camera
        .frame()
        .map_err(|e| DriverError::Capture(format!("failed to read frame: {e}")))?;
    let image = buffer
        .decode_image::<RgbFormat>()
        .map_err(|e| DriverError::Capture(format!("failed to decode frame: {e}")))?;
    image
        .save(path)
        .map_err(|e| DriverError::Io(format!("failed saving image: {e}")))
}

fn run_worker(request: OpenRequest, callback: DriverCallback, commands: mpsc::Receiver<WorkerCommand>) {
    let mut camera = match open_camera(&request) {
        Ok(camera) => camera,
        Err(err) => {
            callback.completed(OperationKind::Open, Err(err));
            return;
        }
    };
    callback.completed(OperationKind::Open, Ok(()));
    tracing::info!(camera = %request.descriptor.name, "webcam opened");

    let mut streaming = false;
    let mut sequence = 0u64;

    loop {
        let command = if streaming {
            match commands.try_recv() {
                Ok(command) => Some(command),
                Err(mpsc::TryRecvError::Empty) => None,
                Err(mpsc::TryRecvError::Disconnected) => break,
            }
        } else {
            match commands.recv() {
                Ok(command) => Some(command),
                Err(_) => break,
            }
        };

        match command {
            Some(WorkerCommand::Still(path)) => {
                let result = save_still(&mut camera, &path);
                callback.completed(OperationKind::CaptureStill, result);
            }
            Some(WorkerCommand::StartStream) => {
                streaming = true;
                sequence = 0;
            }
            Some(WorkerCommand::StopStream(ack)) => {
                streaming = false;
                let _ = ack.send(());
            }
            Some(WorkerCommand::Close) => break,
            None => {
                sequence += 1;
                match grab_frame(&mut camera, sequence) {
                    Ok(frame) => callback.frame(frame),
                    Err(err) => callback.error(err.to_string()),
                }
            }
        }
    }

    if let Err(e) = camera.stop_stream() {
        tracing::warn!("failed to stop camera stream: {e}");
    }
    tracing::info!(camera = %request.descriptor.name, "webcam closed");
}

struct WebcamDevice {
    commands: mpsc::Sender<WorkerCommand>,
    worker: Option<JoinHandle<()>>,
}

impl WebcamDevice {
    fn send(&self, command: WorkerCommand) -> Result<(), DriverError> {
        self.commands
            .send(command)
            .map_err(|_| DriverError::Access("camera worker has stopped".to_string()))
    }
}

impl CameraDevice for WebcamDevice {
    fn capture_still(&mut self, path: &Path) -> Result<(), DriverError> {
        self.send(WorkerCommand::Still(path.to_path_buf()))
    }

    fn start_recording(&mut self, _path: &Path) -> Result<(), DriverError> {
        Err(DriverError::Unsupported(
            "video recording is not available on webcam devices".to_string(),
        ))
    }

    fn stop_recording(&mut self) -> Result<(), DriverError> {
        Err(DriverError::Unsupported(
            "video recording is not available on webcam devices".to_string(),
        ))
    }

    fn pause_recording(&mut self) -> Result<(), DriverError> {
        Err(DriverError::Unsupported(
            "pauseVideoRecording is not available on webcam devices".to_string(),
        ))
    }

    fn resume_recording(&mut self) -> Result<(), DriverError> {
        Err(DriverError::Unsupported(
            "resumeVideoRecording is not available on webcam devices".to_string(),
        ))
    }

    fn start_frame_stream(&mut self) -> Result<(), DriverError> {
        self.send(WorkerCommand::StartStream)
    }

    fn stop_frame_stream(&mut self) -> Result<(), DriverError> {
        let (ack_tx, ack_rx) = mpsc::channel();
        self.send(WorkerCommand::StopStream(ack_tx))?;
        // The worker acknowledges between frames, so nothing is pushed after this.
        ack_rx
            .recv()
            .map_err(|_| DriverError::Access("camera worker has stopped".to_string()))
    }

    fn close(&mut self) {
        let _ = self.commands.send(WorkerCommand::Close);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!("camera worker panicked");
            }
        }
    }
}

impl Drop for WebcamDevice {
    fn drop(&mut self) {
        self.close();
    }
}
