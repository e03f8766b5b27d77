//! Relay a simulated MrHeadTracker to the IEM SceneRotator over OSC.
//!
//! Usage: cargo run --example midi_relay
//!
//! Environment:
//!   HEADTRACKER_RELAY_ADDR  target host:port (default 127.0.0.1:8000)
//!   HEADTRACKER_FORMAT      "q" or "ypr" (default q)
//!   HEADTRACKER_SECONDS     run time (default 10)

use headtracker::midi::{channel_input, ChannelInput, ChannelSender};
use headtracker::protocol::{encode_mrheadtracker_quaternion, encode_mrheadtracker_ypr};
use headtracker::{
    HeadTracker, MidiBackend, MidiOptions, MidiOutput, MidiTracker, MidiVendor, OrientFormat,
    Quaternion, Relay, Target, UdpTransport, Ypr,
};
use std::thread;
use std::time::{Duration, Instant};

const PORT_NAME: &str = "MrHeadTracker 1";

/// A head slowly turning left and right, streamed at 50 Hz in the
/// tracker's `format` mode.
fn simulate(sender: ChannelSender, format: OrientFormat) {
    let start = Instant::now();
    loop {
        let t = start.elapsed().as_secs_f64();
        let yaw = 60.0 * (t * 0.5).sin();
        let messages = match format {
            OrientFormat::Quaternion => Quaternion::from_axis_angle([0.0, 0.0, 1.0], yaw)
                .map(|q| encode_mrheadtracker_quaternion(&q)),
            OrientFormat::Ypr => Ypr::new(yaw, 0.0, 0.0).map(|ypr| encode_mrheadtracker_ypr(&ypr)),
        };
        for msg in messages.unwrap_or_default() {
            sender.send(&msg);
        }
        thread::sleep(Duration::from_millis(20));
    }
}

struct SimBackend {
    input: ChannelInput,
}

struct NullOutput;

impl MidiOutput for NullOutput {
    fn send(&mut self, message: &[u8]) -> headtracker::Result<()> {
        log::debug!("MIDI out: {:02X?}", message);
        Ok(())
    }
}

impl MidiBackend for SimBackend {
    type Input = ChannelInput;
    type Output = NullOutput;

    fn input_ports(&self) -> headtracker::Result<Vec<String>> {
        Ok(vec![PORT_NAME.to_string()])
    }

    fn output_ports(&self) -> headtracker::Result<Vec<String>> {
        Ok(vec![PORT_NAME.to_string()])
    }

    fn open_input(&mut self, _port: &str) -> headtracker::Result<ChannelInput> {
        Ok(self.input.clone())
    }

    fn open_output(&mut self, _port: &str) -> headtracker::Result<NullOutput> {
        Ok(NullOutput)
    }
}

fn read_env_string(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn read_env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn main() {
    env_logger::init();

    let addr = read_env_string("HEADTRACKER_RELAY_ADDR", "127.0.0.1:8000");
    let seconds = read_env_u64("HEADTRACKER_SECONDS", 10);
    let format: OrientFormat = match read_env_string("HEADTRACKER_FORMAT", "q").parse() {
        Ok(f) => f,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    let (sender, input) = channel_input(1024);
    thread::spawn(move || simulate(sender, format));

    let options = MidiOptions::new(MidiVendor::MrHeadTracker, PORT_NAME, format);
    let mut tracker = match MidiTracker::new(SimBackend { input }, options) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("Invalid tracker options: {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = tracker.open().and_then(|_| tracker.zero()) {
        eprintln!("Failed to start tracker: {}", e);
        std::process::exit(1);
    }

    let transport = match UdpTransport::connect(addr.as_str()) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("Failed to connect to {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    let mut relay = Relay::new(transport, Target::SceneRotator(format));

    println!("Relaying {} to {} for {} s", format.as_str(), addr, seconds);
    let deadline = Instant::now() + Duration::from_secs(seconds);
    let mut sent = 0u64;
    while Instant::now() < deadline {
        match tracker.read_orientation(()) {
            Ok(Some(sample)) => {
                if let Err(e) = relay.send_orientation(&sample) {
                    eprintln!("Send failed: {}", e);
                } else {
                    sent += 1;
                }
            }
            Ok(None) => {}
            Err(e) => {
                eprintln!("Read failed: {}", e);
                break;
            }
        }
        thread::sleep(Duration::from_millis(5));
    }

    tracker.close();
    println!("Sent {} orientations", sent);
}
