//! Minimal OSC 1.0 message codec: one address, float32 arguments.
//!
//! Layout: address string, type tag string (`,` then one `f` per argument),
//! then the big-endian arguments. Strings are NUL terminated and padded to
//! a multiple of 4 bytes.

use crate::{HeadTrackerError, Result};

pub const TYPE_TAG_PREFIX: u8 = b',';
pub const TAG_FLOAT: u8 = b'f';

/// One OSC message with float arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct OscMessage {
    address: String,
    args: Vec<f32>,
}

impl OscMessage {
    /// Addresses must start with `/` and must not contain NUL or spaces.
    pub fn new(address: impl Into<String>, args: Vec<f32>) -> Result<Self> {
        let address = address.into();
        if !address.starts_with('/') || address.contains(['\0', ' ']) {
            return Err(HeadTrackerError::invalid(format!(
                "invalid OSC address \"{}\"",
                address
            )));
        }
        Ok(Self { address, args })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn args(&self) -> &[f32] {
        &self.args
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.address.len() + 8 + self.args.len() * 5);
        write_padded(&mut buf, self.address.as_bytes());

        let mut tags = Vec::with_capacity(self.args.len() + 1);
        tags.push(TYPE_TAG_PREFIX);
        tags.resize(self.args.len() + 1, TAG_FLOAT);
        write_padded(&mut buf, &tags);

        for arg in &self.args {
            buf.extend_from_slice(&arg.to_be_bytes());
        }
        buf
    }

    /// Decode a message that only carries float arguments.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let (address, rest) = read_padded(data)?;
        let (tags, mut rest) = read_padded(rest)?;

        let Some((&TYPE_TAG_PREFIX, tags)) = tags.split_first() else {
            return Err(HeadTrackerError::invalid("OSC type tag string missing"));
        };
        let mut args = Vec::with_capacity(tags.len());
        for &tag in tags {
            if tag != TAG_FLOAT {
                return Err(HeadTrackerError::invalid(format!(
                    "unsupported OSC type tag '{}'",
                    tag as char
                )));
            }
            let (bytes, tail) = rest
                .split_first_chunk::<4>()
                .ok_or_else(|| HeadTrackerError::invalid("OSC argument truncated"))?;
            args.push(f32::from_be_bytes(*bytes));
            rest = tail;
        }

        let address = std::str::from_utf8(address)
            .map_err(|_| HeadTrackerError::invalid("OSC address is not UTF-8"))?;
        Self::new(address, args)
    }
}

fn write_padded(buf: &mut Vec<u8>, s: &[u8]) {
    buf.extend_from_slice(s);
    // At least one NUL, then pad to 4.
    let pad = 4 - s.len() % 4;
    buf.resize(buf.len() + pad, 0);
}

/// Split off one padded string, returning it without the NULs.
fn read_padded(data: &[u8]) -> Result<(&[u8], &[u8])> {
    let end = data
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| HeadTrackerError::invalid("unterminated OSC string"))?;
    let padded = (end / 4 + 1) * 4;
    if padded > data.len() {
        return Err(HeadTrackerError::invalid("OSC string padding truncated"));
    }
    Ok((&data[..end], &data[padded..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_layout() {
        let msg = OscMessage::new("/ypr", vec![1.0, -0.5]).unwrap();
        let bytes = msg.encode();
        assert_eq!(&bytes[..8], b"/ypr\0\0\0\0");
        assert_eq!(&bytes[8..12], b",ff\0");
        assert_eq!(&bytes[12..16], &1.0f32.to_be_bytes());
        assert_eq!(&bytes[16..20], &(-0.5f32).to_be_bytes());
        assert_eq!(bytes.len(), 20);
    }

    #[test]
    fn test_encode_no_args() {
        let bytes = OscMessage::new("/SceneRotator/q", vec![]).unwrap().encode();
        assert_eq!(bytes.len(), 20);
        assert_eq!(&bytes[16..], b",\0\0\0");
    }

    #[test]
    fn test_decode_encoded() {
        let msg = OscMessage::new("/SceneRotator/quaternions", vec![0.5, 0.5, -0.5, 0.5]).unwrap();
        assert_eq!(OscMessage::decode(&msg.encode()).unwrap(), msg);
    }

    #[test]
    fn test_rejects_bad_address_and_data() {
        assert!(OscMessage::new("yaw", vec![]).is_err());
        assert!(OscMessage::new("/a b", vec![]).is_err());
        assert!(OscMessage::decode(b"/x\0\0,i\0\0\0\0\0\x01").is_err());
        assert!(OscMessage::decode(b"/x\0\0,f\0\0\0\0").is_err());
        assert!(OscMessage::decode(b"/x").is_err());
    }
}
