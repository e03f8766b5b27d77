//! In-memory stand-ins for hardware and network, shared by the unit tests.
//! Handles returned by the accessors share state with the fake, so a test
//! keeps them after moving the fake into a driver.

use crate::device::FrameToken;
use crate::hmd::{PoseRuntime, RawPose};
use crate::landmark::LandmarkSource;
use crate::midi::{channel_input, ChannelInput, ChannelSender, MidiBackend, MidiOutput};
use crate::relay::Transport;
use crate::{HeadTrackerError, Result};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

pub struct MockMidiBackend {
    inputs: Vec<String>,
    outputs: Vec<String>,
    sender: ChannelSender,
    input: ChannelInput,
    sent: Rc<RefCell<Vec<Vec<u8>>>>,
    busy: Rc<Cell<bool>>,
}

impl MockMidiBackend {
    pub fn new(inputs: &[&str], outputs: &[&str]) -> Self {
        let (sender, input) = channel_input(256);
        Self {
            inputs: names(inputs),
            outputs: names(outputs),
            sender,
            input,
            sent: Rc::new(RefCell::new(Vec::new())),
            busy: Rc::new(Cell::new(false)),
        }
    }

    /// Feeds every input port opened from this backend.
    pub fn input_sender(&self) -> ChannelSender {
        self.sender.clone()
    }

    /// Everything written to any output port.
    pub fn sent_messages(&self) -> Rc<RefCell<Vec<Vec<u8>>>> {
        self.sent.clone()
    }

    /// While set, opening a port fails as if another program held it.
    pub fn busy_flag(&self) -> Rc<Cell<bool>> {
        self.busy.clone()
    }

    fn claim(&self, port: &str) -> Result<()> {
        if self.busy.get() {
            return Err(HeadTrackerError::DeviceUnavailable(port.to_string()));
        }
        Ok(())
    }
}

pub struct MockOutput {
    sent: Rc<RefCell<Vec<Vec<u8>>>>,
}

impl MidiOutput for MockOutput {
    fn send(&mut self, message: &[u8]) -> Result<()> {
        self.sent.borrow_mut().push(message.to_vec());
        Ok(())
    }
}

impl MidiBackend for MockMidiBackend {
    type Input = ChannelInput;
    type Output = MockOutput;

    fn input_ports(&self) -> Result<Vec<String>> {
        Ok(self.inputs.clone())
    }

    fn output_ports(&self) -> Result<Vec<String>> {
        Ok(self.outputs.clone())
    }

    fn open_input(&mut self, port: &str) -> Result<ChannelInput> {
        self.claim(port)?;
        Ok(self.input.clone())
    }

    fn open_output(&mut self, port: &str) -> Result<MockOutput> {
        self.claim(port)?;
        Ok(MockOutput {
            sent: self.sent.clone(),
        })
    }
}

pub struct MockLandmarkSource {
    cameras: Vec<String>,
    frames: Rc<RefCell<VecDeque<Vec<[f64; 3]>>>>,
    running: Rc<RefCell<Option<String>>>,
}

impl MockLandmarkSource {
    pub fn new(cameras: &[&str]) -> Self {
        Self {
            cameras: names(cameras),
            frames: Rc::new(RefCell::new(VecDeque::new())),
            running: Rc::new(RefCell::new(None)),
        }
    }

    /// Name of the camera currently started, if any.
    pub fn running_flag(&self) -> Rc<RefCell<Option<String>>> {
        self.running.clone()
    }

    /// Frames pushed here are delivered in order once the camera runs.
    pub fn frame_queue(&self) -> Rc<RefCell<VecDeque<Vec<[f64; 3]>>>> {
        self.frames.clone()
    }
}

impl LandmarkSource for MockLandmarkSource {
    fn available_cameras(&self) -> Result<Vec<String>> {
        Ok(self.cameras.clone())
    }

    fn start(&mut self, camera: &str) -> Result<()> {
        *self.running.borrow_mut() = Some(camera.to_string());
        Ok(())
    }

    fn stop(&mut self) {
        *self.running.borrow_mut() = None;
    }

    fn poll_frame(&mut self) -> Result<Option<Vec<[f64; 3]>>> {
        if self.running.borrow().is_none() {
            return Err(HeadTrackerError::Backend("camera not started".into()));
        }
        Ok(self.frames.borrow_mut().pop_front())
    }
}

/// XR runtime returning one settable pose for every frame.
#[derive(Clone)]
pub struct MockRuntime {
    systems: Vec<String>,
    pose: Rc<Cell<Option<RawPose>>>,
    located: Rc<RefCell<Vec<FrameToken>>>,
    session: Rc<Cell<bool>>,
}

impl MockRuntime {
    pub fn new(systems: &[&str]) -> Self {
        Self {
            systems: names(systems),
            pose: Rc::new(Cell::new(None)),
            located: Rc::new(RefCell::new(Vec::new())),
            session: Rc::new(Cell::new(false)),
        }
    }

    pub fn set_pose(&self, pose: Option<RawPose>) {
        self.pose.set(pose);
    }

    pub fn has_session(&self) -> bool {
        self.session.get()
    }

    pub fn located_frames(&self) -> Vec<FrameToken> {
        self.located.borrow().clone()
    }
}

impl PoseRuntime for MockRuntime {
    fn systems(&self) -> Result<Vec<String>> {
        Ok(self.systems.clone())
    }

    fn begin_session(&mut self, _system: &str) -> Result<()> {
        self.session.set(true);
        Ok(())
    }

    fn end_session(&mut self) {
        self.session.set(false);
    }

    fn locate_head(&mut self, frame: FrameToken) -> Result<Option<RawPose>> {
        if !self.session.get() {
            return Err(HeadTrackerError::Backend("no session".into()));
        }
        self.located.borrow_mut().push(frame);
        Ok(self.pose.get())
    }
}

/// Transport that keeps every datagram.
#[derive(Clone, Default)]
pub struct RecordingTransport {
    datagrams: Rc<RefCell<Vec<Vec<u8>>>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn datagrams(&self) -> Vec<Vec<u8>> {
        self.datagrams.borrow().clone()
    }
}

impl Transport for RecordingTransport {
    fn send(&mut self, datagram: &[u8]) -> Result<()> {
        self.datagrams.borrow_mut().push(datagram.to_vec());
        Ok(())
    }
}
