//! The fixed-size binary control protocol.
//!
//! Every message on the wire is exactly [`MESSAGE_SIZE`] bytes: a 12-byte
//! header (`version`, `size`, `type`, each a little-endian `u32`) followed by
//! a payload area sized for the largest payload (STATUS) and zero-padded for
//! the shorter ones. Nothing relies on native struct layout; every field is
//! encoded and decoded explicitly at a fixed offset.
//!
//! A message is accepted only if `version` equals [`PROTOCOL_VERSION`] and
//! `size` equals [`MESSAGE_SIZE`]; anything else is a [`ProtocolError`] and
//! the bytes are discarded without side effects. The message-type value −1
//! is reserved as an in-memory "no message" sentinel and never appears on
//! the wire; an empty pending slot is simply `None` here.

use std::error::Error;
use std::fmt;

/// Protocol version sent and required in every message header.
pub const PROTOCOL_VERSION: u32 = 1;

/// Total size of every wire message in bytes.
pub const MESSAGE_SIZE: usize = 140;

pub const MSG_SET_AXISANGLE: u32 = 1;
pub const MSG_GET_STATUS: u32 = 2;
pub const MSG_STATUS: u32 = 3;
pub const MSG_SET_TRIM: u32 = 4;
pub const MSG_SET_EUCLIDEAN: u32 = 5;

/// Platform is at rest at the reported pose.
pub const STATUS_STATIONARY: u32 = 0;
/// Platform is still traveling towards the reported pose. Reserved; the
/// server currently always reports stationary.
pub const STATUS_MOVING: u32 = 1;

/// Rotation request as an axis and an angle, plus a translation.
/// Angles in degrees; the axis need not be normalized.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AxisAngle {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub angle: f32,
    pub translate: [f32; 3],
}

/// Rotation request as intrinsic yaw/pitch/roll angles in degrees, plus a
/// translation.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Euclidean {
    pub yaw: f32,
    pub pitch: f32,
    pub roll: f32,
    pub translate: [f32; 3],
}

/// Per-servo slice of a status report. Angles in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ServoStatus {
    pub angle: f32,
    pub trim: f32,
}

/// Full status report: elapsed server time, the six solved servo angles and
/// trims, and the pose (origin + rotation matrix) currently applied.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Status {
    pub sec: i64,
    pub usec: i64,
    pub servos: [ServoStatus; 6],
    pub status: u32,
    pub origin: [f32; 3],
    /// Rotation matrix, flattened column-major.
    pub rotation: [f32; 9],
    pub reserved: [f32; 3],
}

/// One decoded protocol message.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Message {
    SetAxisAngle(AxisAngle),
    GetStatus,
    Status(Status),
    SetTrim { servo: u32, angle: f32 },
    SetEuclidean(Euclidean),
}

impl Message {
    /// The wire value of this message's type field.
    pub fn message_type(&self) -> u32 {
        match self {
            Message::SetAxisAngle(_) => MSG_SET_AXISANGLE,
            Message::GetStatus => MSG_GET_STATUS,
            Message::Status(_) => MSG_STATUS,
            Message::SetTrim { .. } => MSG_SET_TRIM,
            Message::SetEuclidean(_) => MSG_SET_EUCLIDEAN,
        }
    }

    /// Encodes the message into a full, zero-padded wire frame.
    pub fn encode(&self) -> [u8; MESSAGE_SIZE] {
        let mut buf = [0u8; MESSAGE_SIZE];
        let mut w = Cursor::new(&mut buf);
        w.put_u32(PROTOCOL_VERSION);
        w.put_u32(MESSAGE_SIZE as u32);
        w.put_u32(self.message_type());

        match *self {
            Message::SetAxisAngle(ref p) => {
                w.put_f32(p.x);
                w.put_f32(p.y);
                w.put_f32(p.z);
                w.put_f32(p.angle);
                w.put_f32_array(&p.translate);
            }
            Message::GetStatus => {}
            Message::Status(ref s) => {
                w.put_i64(s.sec);
                w.put_i64(s.usec);
                for servo in &s.servos {
                    w.put_f32(servo.angle);
                    w.put_f32(servo.trim);
                }
                w.put_u32(s.status);
                w.put_f32_array(&s.origin);
                w.put_f32_array(&s.rotation);
                w.put_f32_array(&s.reserved);
            }
            Message::SetTrim { servo, angle } => {
                w.put_u32(servo);
                w.put_f32(angle);
            }
            Message::SetEuclidean(ref p) => {
                w.put_f32(p.yaw);
                w.put_f32(p.pitch);
                w.put_f32(p.roll);
                w.put_f32_array(&p.translate);
            }
        }

        buf
    }

    /// Decodes one wire frame. The input must be exactly one message long;
    /// header fields are validated before any payload is touched.
    pub fn decode(buf: &[u8]) -> Result<Message, ProtocolError> {
        if buf.len() != MESSAGE_SIZE {
            return Err(ProtocolError::WrongLength {
                expected: MESSAGE_SIZE,
                found: buf.len(),
            });
        }

        let mut r = Reader::new(buf);
        let version = r.u32();
        if version != PROTOCOL_VERSION {
            return Err(ProtocolError::BadVersion(version));
        }
        let size = r.u32();
        if size as usize != MESSAGE_SIZE {
            return Err(ProtocolError::BadSize(size));
        }

        let message_type = r.u32();
        match message_type {
            MSG_SET_AXISANGLE => Ok(Message::SetAxisAngle(AxisAngle {
                x: r.f32(),
                y: r.f32(),
                z: r.f32(),
                angle: r.f32(),
                translate: r.f32_array(),
            })),
            MSG_GET_STATUS => Ok(Message::GetStatus),
            MSG_STATUS => {
                let sec = r.i64();
                let usec = r.i64();
                let mut servos = [ServoStatus::default(); 6];
                for servo in &mut servos {
                    servo.angle = r.f32();
                    servo.trim = r.f32();
                }
                Ok(Message::Status(Status {
                    sec,
                    usec,
                    servos,
                    status: r.u32(),
                    origin: r.f32_array(),
                    rotation: r.f32_array(),
                    reserved: r.f32_array(),
                }))
            }
            MSG_SET_TRIM => Ok(Message::SetTrim {
                servo: r.u32(),
                angle: r.f32(),
            }),
            MSG_SET_EUCLIDEAN => Ok(Message::SetEuclidean(Euclidean {
                yaw: r.f32(),
                pitch: r.f32(),
                roll: r.f32(),
                translate: r.f32_array(),
            })),
            other => Err(ProtocolError::UnknownType(other)),
        }
    }
}

/// Reasons a wire frame is rejected. Rejection never mutates any state.
#[derive(Debug, PartialEq, Eq)]
pub enum ProtocolError {
    /// Input is not exactly one message long.
    WrongLength { expected: usize, found: usize },
    /// Header version does not match [`PROTOCOL_VERSION`].
    BadVersion(u32),
    /// Header size field does not match [`MESSAGE_SIZE`].
    BadSize(u32),
    /// Type field is not a known message type.
    UnknownType(u32),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            ProtocolError::WrongLength { expected, found } => {
                write!(f, "wrong message length: expected {expected}, found {found}")
            }
            ProtocolError::BadVersion(v) => write!(f, "unsupported protocol version {v}"),
            ProtocolError::BadSize(s) => write!(f, "bad size field {s}"),
            ProtocolError::UnknownType(t) => write!(f, "unknown message type {t}"),
        }
    }
}

impl Error for ProtocolError {}

struct Cursor<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a mut [u8]) -> Self {
        Cursor { buf, pos: 0 }
    }

    fn put_u32(&mut self, v: u32) {
        self.buf[self.pos..self.pos + 4].copy_from_slice(&v.to_le_bytes());
        self.pos += 4;
    }

    fn put_i64(&mut self, v: i64) {
        self.buf[self.pos..self.pos + 8].copy_from_slice(&v.to_le_bytes());
        self.pos += 8;
    }

    fn put_f32(&mut self, v: f32) {
        self.buf[self.pos..self.pos + 4].copy_from_slice(&v.to_le_bytes());
        self.pos += 4;
    }

    fn put_f32_array(&mut self, vs: &[f32]) {
        for &v in vs {
            self.put_f32(v);
        }
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Reader { buf, pos: 0 }
    }

    fn u32(&mut self) -> u32 {
        let v = u32::from_le_bytes(self.buf[self.pos..self.pos + 4].try_into().unwrap());
        self.pos += 4;
        v
    }

    fn i64(&mut self) -> i64 {
        let v = i64::from_le_bytes(self.buf[self.pos..self.pos + 8].try_into().unwrap());
        self.pos += 8;
        v
    }

    fn f32(&mut self) -> f32 {
        let v = f32::from_le_bytes(self.buf[self.pos..self.pos + 4].try_into().unwrap());
        self.pos += 4;
        v
    }

    fn f32_array<const N: usize>(&mut self) -> [f32; N] {
        std::array::from_fn(|_| self.f32())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_is_little_endian() {
        let frame = Message::GetStatus.encode();
        assert_eq!(&frame[0..4], &[1, 0, 0, 0]);
        assert_eq!(&frame[4..8], &(MESSAGE_SIZE as u32).to_le_bytes());
        assert_eq!(&frame[8..12], &[2, 0, 0, 0]);
    }

    #[test]
    fn axis_angle_roundtrip() {
        let msg = Message::SetAxisAngle(AxisAngle {
            x: 0.0,
            y: 0.5,
            z: 1.0,
            angle: 12.5,
            translate: [0.25, -0.5, 2.0],
        });
        let decoded = Message::decode(&msg.encode()).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn euclidean_roundtrip() {
        let msg = Message::SetEuclidean(Euclidean {
            yaw: 30.0,
            pitch: -15.0,
            roll: 7.5,
            translate: [0.0, 0.0, 1.0],
        });
        assert_eq!(Message::decode(&msg.encode()).unwrap(), msg);
    }

    #[test]
    fn trim_roundtrip() {
        let msg = Message::SetTrim {
            servo: 2,
            angle: 5.0,
        };
        assert_eq!(Message::decode(&msg.encode()).unwrap(), msg);
    }

    #[test]
    fn status_roundtrip() {
        let mut servos = [ServoStatus::default(); 6];
        for (i, s) in servos.iter_mut().enumerate() {
            s.angle = i as f32 * 10.0 - 25.0;
            s.trim = i as f32 * 0.5;
        }
        let msg = Message::Status(Status {
            sec: 12345,
            usec: 678901,
            servos,
            status: STATUS_STATIONARY,
            origin: [0.0, 1.0, 2.0],
            rotation: [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
            reserved: [0.0; 3],
        });
        assert_eq!(Message::decode(&msg.encode()).unwrap(), msg);
    }

    #[test]
    fn short_payloads_are_zero_padded() {
        let frame = Message::SetTrim {
            servo: 0,
            angle: 0.0,
        }
        .encode();
        assert!(frame[20..].iter().all(|&b| b == 0));
    }

    #[test]
    fn wrong_version_is_rejected() {
        let mut frame = Message::GetStatus.encode();
        frame[0] = 9;
        assert_eq!(
            Message::decode(&frame),
            Err(ProtocolError::BadVersion(9))
        );
    }

    #[test]
    fn wrong_size_field_is_rejected() {
        let mut frame = Message::GetStatus.encode();
        frame[4..8].copy_from_slice(&100u32.to_le_bytes());
        assert_eq!(Message::decode(&frame), Err(ProtocolError::BadSize(100)));
    }

    #[test]
    fn unknown_type_is_rejected() {
        let mut frame = Message::GetStatus.encode();
        frame[8..12].copy_from_slice(&77u32.to_le_bytes());
        assert_eq!(Message::decode(&frame), Err(ProtocolError::UnknownType(77)));
    }

    #[test]
    fn truncated_input_is_rejected() {
        let frame = Message::GetStatus.encode();
        assert_eq!(
            Message::decode(&frame[..MESSAGE_SIZE - 1]),
            Err(ProtocolError::WrongLength {
                expected: MESSAGE_SIZE,
                found: MESSAGE_SIZE - 1,
            })
        );
        let mut oversized = frame.to_vec();
        oversized.push(0);
        assert_eq!(
            Message::decode(&oversized),
            Err(ProtocolError::WrongLength {
                expected: MESSAGE_SIZE,
                found: MESSAGE_SIZE + 1,
            })
        );
    }

    #[test]
    fn status_payload_fills_the_frame_exactly() {
        // sec + usec + 6 servo pairs + status word + origin + rotation +
        // reserved must land exactly on the end of the frame.
        let payload = 8 + 8 + 6 * 8 + 4 + 12 + 36 + 12;
        assert_eq!(payload + 12, MESSAGE_SIZE);
    }
}
