//! Base framing (RFC 6455 section 5).
//!
//! ```text
//!  0               1               2               3
//!  0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
//! |I|S|S|S|  (4)  |A|     (7)     |             (16/64)           |
//! |N|V|V|V|       |S|             |   (if payload len==126/127)   |
//! +-+-+-+-+-------+-+-------------+ - - - - - - - - - - - - - - - +
//! |     Extended payload length continued, if payload len == 127  |
//! + - - - - - - - - - - - - - - - +-------------------------------+
//! |                               |Masking-key, if MASK set to 1  |
//! +-------------------------------+-------------------------------+
//! | Masking-key (continued)       |          Payload Data         |
//! +-------------------------------- - - - - - - - - - - - - - - - +
//! ```

use crate::error::WebSocketError;

/// Largest payload a control frame may carry.
pub const MAX_CONTROL_PAYLOAD: usize = 125;

/// Close status codes sent by the server.
pub mod close_code {
    pub const NORMAL: u16 = 1000;
    pub const GOING_AWAY: u16 = 1001;
    pub const PROTOCOL_ERROR: u16 = 1002;
    pub const INVALID_PAYLOAD: u16 = 1007;
    pub const MESSAGE_TOO_BIG: u16 = 1009;
    pub const INTERNAL_ERROR: u16 = 1011;

    /// Whether `code` may be carried in a close frame. 1004-1006 and 1015
    /// are reserved for local reporting and never go on the wire.
    pub fn is_sendable(code: u16) -> bool {
        matches!(code, 1000..=1003 | 1007..=1011 | 3000..=4999)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Continuation,
    Text,
    Binary,
    Close,
    Ping,
    Pong,
}

impl Opcode {
    pub fn from_u8(value: u8) -> Result<Self, WebSocketError> {
        match value & 0x0F {
            0x0 => Ok(Self::Continuation),
            0x1 => Ok(Self::Text),
            0x2 => Ok(Self::Binary),
            0x8 => Ok(Self::Close),
            0x9 => Ok(Self::Ping),
            0xA => Ok(Self::Pong),
            other => Err(WebSocketError::Protocol(format!(
                "unknown opcode 0x{other:X}"
            ))),
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Self::Continuation => 0x0,
            Self::Text => 0x1,
            Self::Binary => 0x2,
            Self::Close => 0x8,
            Self::Ping => 0x9,
            Self::Pong => 0xA,
        }
    }

    pub fn is_control(self) -> bool {
        matches!(self, Self::Close | Self::Ping | Self::Pong)
    }
}

/// How the payload length is written in the frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthEncoding {
    /// Fits in the 7-bit field (0..=125).
    Short,
    /// Marker 126 followed by a 16-bit length.
    Extended16,
    /// Marker 127 followed by a 64-bit length.
    Extended64,
}

impl LengthEncoding {
    pub fn for_len(len: usize) -> Self {
        if len <= 125 {
            Self::Short
        } else if len <= u16::MAX as usize {
            Self::Extended16
        } else {
            Self::Extended64
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub fin: bool,
    pub opcode: Opcode,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(opcode: Opcode, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            fin: true,
            opcode,
            payload: payload.into(),
        }
    }

    pub fn text(data: &str) -> Self {
        Self::new(Opcode::Text, data.as_bytes())
    }

    pub fn pong(payload: &[u8]) -> Self {
        Self::new(Opcode::Pong, payload)
    }

    /// A close frame carrying `code` and a reason trimmed to fit the
    /// control-frame limit.
    pub fn close(code: u16, reason: &str) -> Self {
        let mut payload = Vec::with_capacity(2 + reason.len());
        payload.extend_from_slice(&code.to_be_bytes());

        let mut reason_len = reason.len().min(MAX_CONTROL_PAYLOAD - 2);
        while !reason.is_char_boundary(reason_len) {
            reason_len -= 1;
        }
        payload.extend_from_slice(&reason.as_bytes()[..reason_len]);

        Self::new(Opcode::Close, payload)
    }

    /// Status code carried by a close frame, if any.
    pub fn close_code(&self) -> Option<u16> {
        match (self.opcode, self.payload.as_slice()) {
            (Opcode::Close, [hi, lo, ..]) => Some(u16::from_be_bytes([*hi, *lo])),
            _ => None,
        }
    }
}

/// Serializes `frame`. Server-to-client frames pass `None`; a mask is only
/// used when acting as a client (tests, tooling).
pub fn encode_frame(frame: &Frame, mask: Option<[u8; 4]>) -> Vec<u8> {
    let len = frame.payload.len();
    let mut buf = Vec::with_capacity(len + 14);

    let fin_bit = if frame.fin { 0x80 } else { 0x00 };
    buf.push(fin_bit | frame.opcode.as_u8());

    let mask_bit = if mask.is_some() { 0x80 } else { 0x00 };
    match LengthEncoding::for_len(len) {
        LengthEncoding::Short => buf.push(mask_bit | len as u8),
        LengthEncoding::Extended16 => {
            buf.push(mask_bit | 126);
            buf.extend_from_slice(&(len as u16).to_be_bytes());
        }
        LengthEncoding::Extended64 => {
            buf.push(mask_bit | 127);
            buf.extend_from_slice(&(len as u64).to_be_bytes());
        }
    }

    match mask {
        Some(key) => {
            buf.extend_from_slice(&key);
            let start = buf.len();
            buf.extend_from_slice(&frame.payload);
            apply_mask(&mut buf[start..], key);
        }
        None => buf.extend_from_slice(&frame.payload),
    }

    buf
}

/// Decodes one frame from the front of `buf`.
///
/// Returns `Ok(None)` while the buffer is short, otherwise the frame and the
/// number of bytes it used. With `require_mask` set, an unmasked frame is a
/// protocol error.
pub fn decode_frame(
    buf: &[u8],
    require_mask: bool,
    max_payload: usize,
) -> Result<Option<(Frame, usize)>, WebSocketError> {
    if buf.len() < 2 {
        return Ok(None);
    }

    let b0 = buf[0];
    let b1 = buf[1];

    if b0 & 0x70 != 0 {
        return Err(WebSocketError::Protocol(
            "reserved bits set without a negotiated extension".into(),
        ));
    }

    let fin = b0 & 0x80 != 0;
    let opcode = Opcode::from_u8(b0)?;
    let masked = b1 & 0x80 != 0;

    if require_mask && !masked {
        return Err(WebSocketError::Protocol("client frame is not masked".into()));
    }

    let mut offset = 2;
    let declared: u64 = match b1 & 0x7F {
        126 => {
            if buf.len() < offset + 2 {
                return Ok(None);
            }
            let len = u16::from_be_bytes([buf[2], buf[3]]);
            offset += 2;
            u64::from(len)
        }
        127 => {
            if buf.len() < offset + 8 {
                return Ok(None);
            }
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&buf[2..10]);
            offset += 8;
            let len = u64::from_be_bytes(raw);
            if len & (1 << 63) != 0 {
                return Err(WebSocketError::Protocol(
                    "most significant bit of 64-bit length is set".into(),
                ));
            }
            len
        }
        short => u64::from(short),
    };

    if opcode.is_control() {
        if !fin {
            return Err(WebSocketError::Protocol("fragmented control frame".into()));
        }
        if declared > MAX_CONTROL_PAYLOAD as u64 {
            return Err(WebSocketError::Protocol(format!(
                "control frame payload of {declared} bytes"
            )));
        }
    }

    if declared > max_payload as u64 {
        return Err(WebSocketError::FrameTooLarge {
            size: declared,
            limit: max_payload,
        });
    }
    let len = declared as usize;

    let mask = if masked {
        if buf.len() < offset + 4 {
            return Ok(None);
        }
        let key = [
            buf[offset],
            buf[offset + 1],
            buf[offset + 2],
            buf[offset + 3],
        ];
        offset += 4;
        Some(key)
    } else {
        None
    };

    if buf.len() < offset + len {
        return Ok(None);
    }

    let mut payload = buf[offset..offset + len].to_vec();
    if let Some(key) = mask {
        apply_mask(&mut payload, key);
    }

    Ok(Some((
        Frame {
            fin,
            opcode,
            payload,
        },
        offset + len,
    )))
}

/// XORs `data` in place with the 4-byte masking key.
pub fn apply_mask(data: &mut [u8], key: [u8; 4]) {
    for (i, byte) in data.iter_mut().enumerate() {
        *byte ^= key[i % 4];
    }
}
