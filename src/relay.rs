//! OSC output to spatial audio renderers.
//!
//! Each `Target` has a fixed message layout. A relay never converts
//! between orientation formats: a sample whose tag does not match the
//! target is rejected with `UnsupportedFormat` and nothing is sent.

use crate::osc::OscMessage;
use crate::types::{OrientFormat, Position, Quaternion, Sample, Ypr};
use crate::{HeadTrackerError, Result};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs, UdpSocket};

/// Outbound datagram channel.
pub trait Transport {
    fn send(&mut self, datagram: &[u8]) -> Result<()>;
}

/// Unconnected UDP socket addressed to one peer. Sends are
/// fire-and-forget: an absent listener is not an error.
pub struct UdpTransport {
    socket: UdpSocket,
    peer: SocketAddr,
}

impl UdpTransport {
    pub fn connect(addr: impl ToSocketAddrs) -> Result<Self> {
        let peer = addr
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| HeadTrackerError::invalid("relay address did not resolve"))?;
        let local = if peer.is_ipv4() {
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
        } else {
            SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
        };
        let socket = UdpSocket::bind(local)?;
        log::info!("Relaying to {}", peer);
        Ok(Self { socket, peer })
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }
}

impl Transport for UdpTransport {
    fn send(&mut self, datagram: &[u8]) -> Result<()> {
        match self.socket.send_to(datagram, self.peer) {
            Ok(_) => Ok(()),
            // Some platforms still surface a stale ICMP port-unreachable.
            Err(e) if e.kind() == std::io::ErrorKind::ConnectionRefused => {
                log::debug!("No listener at {}: {}", self.peer, e);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Which side of the IEM RoomEncoder the head position drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomEncoderRole {
    Listener,
    Source,
}

/// Supported renderers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// IEM SceneRotator, in quaternion or YPR mode.
    SceneRotator(OrientFormat),
    /// IEM DirectivityShaper probe.
    DirectivityShaper,
    /// SPARTA binaural decoders.
    Sparta,
    /// IEM RoomEncoder (position only).
    RoomEncoder(RoomEncoderRole),
    /// TASCAR scene object.
    Tascar,
}

impl Target {
    pub fn name(&self) -> &'static str {
        match self {
            Target::SceneRotator(_) => "SceneRotator",
            Target::DirectivityShaper => "DirectivityShaper",
            Target::Sparta => "SPARTA",
            Target::RoomEncoder(_) => "RoomEncoder",
            Target::Tascar => "TASCAR",
        }
    }

    pub fn default_prefix(&self) -> &'static str {
        match self {
            Target::SceneRotator(_) => "/SceneRotator/",
            Target::DirectivityShaper => "/DirectivityShaper/",
            Target::Sparta => "/",
            Target::RoomEncoder(_) => "/RoomEncoder/",
            Target::Tascar => "/scene/out/",
        }
    }

    /// Port the renderer listens on out of the box.
    pub fn default_port(&self) -> u16 {
        match self {
            Target::SceneRotator(_) | Target::DirectivityShaper | Target::RoomEncoder(_) => 8000,
            Target::Sparta => 9000,
            Target::Tascar => 9877,
        }
    }

    /// Orientation format the target accepts, `None` if it takes none.
    pub fn orientation_format(&self) -> Option<OrientFormat> {
        match self {
            Target::SceneRotator(format) => Some(*format),
            Target::DirectivityShaper | Target::Sparta | Target::Tascar => Some(OrientFormat::Ypr),
            Target::RoomEncoder(_) => None,
        }
    }

    pub fn has_position(&self) -> bool {
        matches!(self, Target::RoomEncoder(_) | Target::Tascar)
    }
}

/// Per-axis correction of YPR angles before sending: the offset (degrees)
/// is added first, then the sign is flipped where `invert` is set.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AngleAdjust {
    /// yaw, pitch, roll
    pub offset: [f64; 3],
    pub invert: [bool; 3],
}

impl AngleAdjust {
    pub fn apply(&self, ypr: [f64; 3]) -> [f64; 3] {
        let mut out = ypr;
        for i in 0..3 {
            out[i] += self.offset[i];
            if self.invert[i] {
                out[i] = -out[i];
            }
        }
        out
    }
}

/// Sends samples from one tracker to one renderer.
pub struct Relay<T: Transport> {
    transport: T,
    target: Target,
    prefix: String,
    adjust: AngleAdjust,
}

impl<T: Transport> Relay<T> {
    pub fn new(transport: T, target: Target) -> Self {
        Self {
            transport,
            target,
            prefix: target.default_prefix().to_string(),
            adjust: AngleAdjust::default(),
        }
    }

    /// Replace the address prefix. It must start and end with `/`.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Result<Self> {
        let prefix = prefix.into();
        if !prefix.starts_with('/') || !prefix.ends_with('/') {
            return Err(HeadTrackerError::invalid(format!(
                "OSC prefix must start and end with '/', got \"{}\"",
                prefix
            )));
        }
        self.prefix = prefix;
        Ok(self)
    }

    /// Angle correction for YPR targets. Quaternion output is unaffected.
    pub fn with_adjust(mut self, adjust: AngleAdjust) -> Self {
        self.adjust = adjust;
        self
    }

    pub fn target(&self) -> Target {
        self.target
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn message(&self, name: &str, args: Vec<f32>) -> Result<OscMessage> {
        OscMessage::new(format!("{}{}", self.prefix, name), args)
    }

    fn unsupported(&self, sample: &Sample) -> HeadTrackerError {
        HeadTrackerError::UnsupportedFormat {
            target: self.target.name(),
            format: sample.kind(),
        }
    }

    /// Messages a target expects once after connecting.
    pub fn handshake_messages(&self) -> Result<Vec<OscMessage>> {
        match self.target {
            Target::DirectivityShaper => Ok(vec![self.message("probeLock", vec![1.0])?]),
            _ => Ok(Vec::new()),
        }
    }

    pub fn orientation_messages(&self, sample: &Sample) -> Result<Vec<OscMessage>> {
        match (self.target.orientation_format(), sample) {
            (Some(OrientFormat::Quaternion), Sample::Quaternion(q)) => self.quaternion_messages(q),
            (Some(OrientFormat::Ypr), Sample::Ypr(ypr)) => self.ypr_messages(ypr),
            _ => Err(self.unsupported(sample)),
        }
    }

    fn quaternion_messages(&self, q: &Quaternion) -> Result<Vec<OscMessage>> {
        // SceneRotator expects x and z negated.
        let args = [q.w(), -q.x(), q.y(), -q.z()].map(|v| v as f32);
        Ok(vec![self.message("quaternions", args.to_vec())?])
    }

    fn ypr_messages(&self, ypr: &Ypr) -> Result<Vec<OscMessage>> {
        let [yaw, pitch, roll] = self.adjust.apply(ypr.to_array()).map(|v| v as f32);
        match self.target {
            Target::SceneRotator(_) => Ok(vec![
                self.message("yaw", vec![-yaw])?,
                self.message("pitch", vec![pitch])?,
                self.message("roll", vec![-roll])?,
            ]),
            Target::DirectivityShaper => Ok(vec![
                self.message("probeAzimuth", vec![yaw])?,
                self.message("probeElevation", vec![pitch])?,
                self.message("probeRoll", vec![roll])?,
            ]),
            Target::Sparta => Ok(vec![self.message("ypr", vec![yaw, pitch, roll])?]),
            Target::Tascar => Ok(vec![self.message("zyxeuler", vec![yaw, pitch, roll])?]),
            Target::RoomEncoder(_) => Err(HeadTrackerError::UnsupportedFormat {
                target: self.target.name(),
                format: "ypr",
            }),
        }
    }

    pub fn position_messages(&self, sample: &Sample) -> Result<Vec<OscMessage>> {
        let Sample::Position(p) = sample else {
            return Err(self.unsupported(sample));
        };
        let Position { x, y, z } = *p;
        let [x, y, z] = [x, y, z].map(|v| v as f32);
        match self.target {
            Target::RoomEncoder(role) => {
                let who = match role {
                    RoomEncoderRole::Listener => "listener",
                    RoomEncoderRole::Source => "source",
                };
                Ok(vec![
                    self.message(&format!("{}X", who), vec![x])?,
                    self.message(&format!("{}Y", who), vec![y])?,
                    self.message(&format!("{}Z", who), vec![z])?,
                ])
            }
            Target::Tascar => Ok(vec![self.message("pos", vec![x, y, z])?]),
            _ => Err(self.unsupported(sample)),
        }
    }

    /// Encode everything first so a failure never leaves a partial burst.
    fn send_all(&mut self, messages: &[OscMessage]) -> Result<()> {
        let datagrams: Vec<Vec<u8>> = messages.iter().map(OscMessage::encode).collect();
        for (msg, datagram) in messages.iter().zip(&datagrams) {
            log::debug!("-> {} {:?}", msg.address(), msg.args());
            self.transport.send(datagram)?;
        }
        Ok(())
    }

    /// Send the target's handshake, if it has one.
    pub fn announce(&mut self) -> Result<()> {
        let messages = self.handshake_messages()?;
        self.send_all(&messages)
    }

    pub fn send_orientation(&mut self, sample: &Sample) -> Result<()> {
        let messages = self.orientation_messages(sample)?;
        self.send_all(&messages)
    }

    pub fn send_position(&mut self, sample: &Sample) -> Result<()> {
        let messages = self.position_messages(sample)?;
        self.send_all(&messages)
    }
}
