//! # MQTT Packet Structures and Serialization
//!
//! This module defines the MQTT 3.1 / 3.1.1 control packets a subscribing client
//! needs and the traits for encoding and decoding them to and from a byte buffer.
//!
//! Encoders reserve four bytes for the remaining length, write the variable
//! header and payload, then compact the packet once the real length is known.

use crate::error::{MqttError, ProtocolError};
use crate::transport::ErrorPlaceHolder;
use crate::util::{self, Partial, read_u16, read_utf8_string, write_binary, write_utf8_string};
use heapless::Vec;

/// Maximum number of topic filters carried by one SUBSCRIBE / SUBACK.
pub const MAX_FILTERS_PER_SUBSCRIBE: usize = 8;

/// Represents the Quality of Service (QoS) levels for MQTT messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum QoS {
    AtMostOnce = 0,
    AtLeastOnce = 1,
    ExactlyOnce = 2,
}

impl QoS {
    fn from_bits(bits: u8) -> Result<Self, MqttError<ErrorPlaceHolder>> {
        match bits {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Ok(QoS::ExactlyOnce),
            _ => Err(MqttError::Protocol(ProtocolError::MalformedPacket)),
        }
    }
}

/// The MQTT protocol revision spoken on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MqttVersion {
    /// MQTT 3.1, protocol name `MQIsdp`, level 3.
    V3_1,
    /// MQTT 3.1.1, protocol name `MQTT`, level 4.
    V3_1_1,
}

impl MqttVersion {
    fn protocol_name(self) -> &'static str {
        match self {
            MqttVersion::V3_1 => "MQIsdp",
            MqttVersion::V3_1_1 => "MQTT",
        }
    }

    fn level(self) -> u8 {
        match self {
            MqttVersion::V3_1 => 3,
            MqttVersion::V3_1_1 => 4,
        }
    }
}

/// A trait for packets that can be encoded into a byte buffer.
pub trait EncodePacket {
    fn encode(&self, buf: &mut [u8]) -> Result<usize, MqttError<ErrorPlaceHolder>>;
}

/// A trait for packets that can be decoded from a byte buffer holding exactly one packet.
pub trait DecodePacket<'a>: Sized {
    fn decode(buf: &'a [u8]) -> Result<Self, MqttError<ErrorPlaceHolder>>;
}

/// An enumeration of the MQTT control packets a client can receive.
#[derive(Debug)]
pub enum MqttPacket<'a> {
    ConnAck(ConnAck),
    Publish(Publish<'a>),
    PubAck(Ack),
    PubRec(Ack),
    PubRel(Ack),
    PubComp(Ack),
    SubAck(SubAck),
    UnsubAck(Ack),
    PingResp,
}

/// Returns the total length of the first packet in `buf`, or `Incomplete` if
/// the fixed header itself has not fully arrived yet.
pub fn packet_length(buf: &[u8]) -> Result<Partial<usize>, MqttError<ErrorPlaceHolder>> {
    if buf.is_empty() {
        return Ok(Partial::Incomplete);
    }
    match util::peek_variable_byte_integer(&buf[1..])? {
        Partial::Complete((remaining, used)) => Ok(Partial::Complete(1 + used + remaining)),
        Partial::Incomplete => Ok(Partial::Incomplete),
    }
}

/// Decodes a buffer holding exactly one complete packet.
pub fn decode(buf: &[u8]) -> Result<MqttPacket<'_>, MqttError<ErrorPlaceHolder>> {
    let header = *buf
        .first()
        .ok_or(MqttError::Protocol(ProtocolError::MalformedPacket))?;
    let packet_type = header >> 4;
    let packet = match packet_type {
        2 => MqttPacket::ConnAck(ConnAck::decode(buf)?),
        3 => MqttPacket::Publish(Publish::decode(buf)?),
        4 => MqttPacket::PubAck(Ack::decode(buf)?),
        5 => MqttPacket::PubRec(Ack::decode(buf)?),
        6 => MqttPacket::PubRel(Ack::decode(buf)?),
        7 => MqttPacket::PubComp(Ack::decode(buf)?),
        9 => MqttPacket::SubAck(SubAck::decode(buf)?),
        11 => MqttPacket::UnsubAck(Ack::decode(buf)?),
        13 => MqttPacket::PingResp,
        _ => {
            return Err(MqttError::Protocol(ProtocolError::InvalidPacketType(
                packet_type,
            )));
        }
    };
    Ok(packet)
}

/// Skips the fixed header, returning the cursor at the variable header and
/// the end of the packet.
fn body_bounds(buf: &[u8]) -> Result<(usize, usize), MqttError<ErrorPlaceHolder>> {
    let mut cursor = 1;
    let remaining_len = util::read_variable_byte_integer(&mut cursor, buf)?;
    let end = cursor + remaining_len;
    if end > buf.len() {
        return Err(MqttError::Protocol(ProtocolError::MalformedPacket));
    }
    Ok((cursor, end))
}

/// Writes `bytes` at `*cursor`, advancing it.
fn put(buf: &mut [u8], cursor: &mut usize, bytes: &[u8]) -> Result<(), MqttError<ErrorPlaceHolder>> {
    buf.get_mut(*cursor..*cursor + bytes.len())
        .ok_or(MqttError::BufferTooSmall)?
        .copy_from_slice(bytes);
    *cursor += bytes.len();
    Ok(())
}

/// Writes the remaining length in front of the content written at
/// `content_start..end` and compacts the packet. Returns its total length.
fn finish(buf: &mut [u8], content_start: usize, end: usize) -> Result<usize, MqttError<ErrorPlaceHolder>> {
    let remaining_len = end - content_start;
    let len_bytes = util::write_variable_byte_integer_len(&mut buf[1..content_start], remaining_len)?;
    let header_len = 1 + len_bytes;
    buf.copy_within(content_start..end, header_len);
    Ok(header_len + remaining_len)
}

/// Offset of the first content byte: one header byte plus four reserved length bytes.
const CONTENT_START: usize = 5;

// --- CONNECT Packet ---
#[derive(Debug)]
pub struct Connect<'a> {
    pub version: MqttVersion,
    pub clean_session: bool,
    pub keep_alive: u16,
    pub client_id: &'a str,
    pub username: Option<&'a str>,
    pub password: Option<&'a [u8]>,
}

impl<'a> Connect<'a> {
    pub fn new(client_id: &'a str, keep_alive: u16, clean_session: bool) -> Self {
        Self {
            version: MqttVersion::V3_1_1,
            clean_session,
            keep_alive,
            client_id,
            username: None,
            password: None,
        }
    }
}

impl EncodePacket for Connect<'_> {
    fn encode(&self, buf: &mut [u8]) -> Result<usize, MqttError<ErrorPlaceHolder>> {
        if buf.len() < CONTENT_START {
            return Err(MqttError::BufferTooSmall);
        }
        buf[0] = 0x10;
        let mut cursor = CONTENT_START;
        cursor += write_utf8_string(&mut buf[cursor..], self.version.protocol_name())?;

        let mut flags = 0;
        if self.clean_session {
            flags |= 0x02;
        }
        if self.username.is_some() {
            flags |= 0x80;
        }
        if self.password.is_some() {
            flags |= 0x40;
        }
        put(buf, &mut cursor, &[self.version.level(), flags])?;
        put(buf, &mut cursor, &self.keep_alive.to_be_bytes())?;

        cursor += write_utf8_string(&mut buf[cursor..], self.client_id)?;
        if let Some(username) = self.username {
            cursor += write_utf8_string(&mut buf[cursor..], username)?;
        }
        if let Some(password) = self.password {
            cursor += write_binary(&mut buf[cursor..], password)?;
        }
        finish(buf, CONTENT_START, cursor)
    }
}

// --- CONNACK Packet ---
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnAck {
    pub session_present: bool,
    pub return_code: u8,
}

impl DecodePacket<'_> for ConnAck {
    fn decode(buf: &[u8]) -> Result<Self, MqttError<ErrorPlaceHolder>> {
        let (cursor, end) = body_bounds(buf)?;
        if end - cursor < 2 {
            return Err(MqttError::Protocol(ProtocolError::MalformedPacket));
        }
        Ok(Self {
            session_present: (buf[cursor] & 0x01) != 0,
            return_code: buf[cursor + 1],
        })
    }
}

// --- PUBLISH Packet ---
#[derive(Debug)]
pub struct Publish<'a> {
    pub topic: &'a str,
    pub qos: QoS,
    pub retain: bool,
    pub dup: bool,
    pub payload: &'a [u8],
    pub packet_id: Option<u16>,
}

impl<'a> DecodePacket<'a> for Publish<'a> {
    fn decode(buf: &'a [u8]) -> Result<Self, MqttError<ErrorPlaceHolder>> {
        let flags = buf
            .first()
            .ok_or(MqttError::Protocol(ProtocolError::MalformedPacket))?
            & 0x0F;
        let qos = QoS::from_bits((flags >> 1) & 0x03)?;

        let (mut cursor, end) = body_bounds(buf)?;
        let body = &buf[..end];
        let topic = read_utf8_string(&mut cursor, body)?;

        let packet_id = if qos != QoS::AtMostOnce {
            Some(read_u16(&mut cursor, body)?)
        } else {
            None
        };

        Ok(Publish {
            topic,
            qos,
            retain: flags & 0x01 != 0,
            dup: flags & 0x08 != 0,
            payload: &body[cursor..],
            packet_id,
        })
    }
}

impl EncodePacket for Publish<'_> {
    fn encode(&self, buf: &mut [u8]) -> Result<usize, MqttError<ErrorPlaceHolder>> {
        if buf.len() < CONTENT_START {
            return Err(MqttError::BufferTooSmall);
        }
        let mut header = 0x30 | ((self.qos as u8) << 1);
        if self.retain {
            header |= 0x01;
        }
        if self.dup {
            header |= 0x08;
        }
        buf[0] = header;

        let mut cursor = CONTENT_START;
        cursor += write_utf8_string(&mut buf[cursor..], self.topic)?;
        if self.qos != QoS::AtMostOnce
            && let Some(id) = self.packet_id
        {
            put(buf, &mut cursor, &id.to_be_bytes())?;
        }
        put(buf, &mut cursor, self.payload)?;
        finish(buf, CONTENT_START, cursor)
    }
}

/// The two-byte acknowledgement packets: PUBACK, PUBREC, PUBREL, PUBCOMP, UNSUBACK.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    pub packet_id: u16,
}

impl DecodePacket<'_> for Ack {
    fn decode(buf: &[u8]) -> Result<Self, MqttError<ErrorPlaceHolder>> {
        let (mut cursor, end) = body_bounds(buf)?;
        let packet_id = read_u16(&mut cursor, &buf[..end])?;
        Ok(Self { packet_id })
    }
}

/// Which acknowledgement an [`AckPacket`] encodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckKind {
    PubAck,
    PubRec,
    PubRel,
    PubComp,
}

/// An outgoing acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckPacket {
    pub kind: AckKind,
    pub packet_id: u16,
}

impl EncodePacket for AckPacket {
    fn encode(&self, buf: &mut [u8]) -> Result<usize, MqttError<ErrorPlaceHolder>> {
        let header = match self.kind {
            AckKind::PubAck => 0x40,
            AckKind::PubRec => 0x50,
            // PUBREL carries the reserved flag bits 0b0010.
            AckKind::PubRel => 0x62,
            AckKind::PubComp => 0x70,
        };
        let slice = buf.get_mut(0..4).ok_or(MqttError::BufferTooSmall)?;
        slice[0] = header;
        slice[1] = 0x02;
        slice[2..4].copy_from_slice(&self.packet_id.to_be_bytes());
        Ok(4)
    }
}

// --- SUBSCRIBE Packet ---
#[derive(Debug)]
pub struct Subscribe<'a> {
    pub packet_id: u16,
    pub topics: Vec<(&'a str, QoS), MAX_FILTERS_PER_SUBSCRIBE>,
}

impl<'a> Subscribe<'a> {
    /// Creates a new Subscribe packet with a single topic.
    pub fn new(packet_id: u16, topic: &'a str, qos: QoS) -> Self {
        let mut topics = Vec::new();
        let _ = topics.push((topic, qos));
        Self { packet_id, topics }
    }
}

impl EncodePacket for Subscribe<'_> {
    fn encode(&self, buf: &mut [u8]) -> Result<usize, MqttError<ErrorPlaceHolder>> {
        if buf.len() < CONTENT_START {
            return Err(MqttError::BufferTooSmall);
        }
        // Fixed header: SUBSCRIBE packet type (8) with reserved bits (0x02)
        buf[0] = 0x82;
        let mut cursor = CONTENT_START;
        put(buf, &mut cursor, &self.packet_id.to_be_bytes())?;

        for (topic, qos) in &self.topics {
            cursor += write_utf8_string(&mut buf[cursor..], topic)?;
            put(buf, &mut cursor, &[*qos as u8])?;
        }
        finish(buf, CONTENT_START, cursor)
    }
}

// --- SUBACK Packet ---
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubAck {
    pub packet_id: u16,
    pub return_codes: Vec<u8, MAX_FILTERS_PER_SUBSCRIBE>,
}

impl SubAck {
    /// Return code the broker uses for a rejected filter.
    pub const FAILURE: u8 = 0x80;
}

impl DecodePacket<'_> for SubAck {
    fn decode(buf: &[u8]) -> Result<Self, MqttError<ErrorPlaceHolder>> {
        let (mut cursor, end) = body_bounds(buf)?;
        let packet_id = read_u16(&mut cursor, &buf[..end])?;

        let mut return_codes = Vec::new();
        for code in &buf[cursor..end] {
            return_codes
                .push(*code)
                .map_err(|_| MqttError::Protocol(ProtocolError::MalformedPacket))?;
        }
        Ok(SubAck {
            packet_id,
            return_codes,
        })
    }
}

// --- PINGREQ Packet ---
#[derive(Debug)]
pub struct PingReq;

impl EncodePacket for PingReq {
    fn encode(&self, buf: &mut [u8]) -> Result<usize, MqttError<ErrorPlaceHolder>> {
        let slice = buf.get_mut(0..2).ok_or(MqttError::BufferTooSmall)?;
        slice.copy_from_slice(&[0xC0, 0x00]);
        Ok(2)
    }
}

// --- DISCONNECT Packet ---
#[derive(Debug)]
pub struct Disconnect;

impl EncodePacket for Disconnect {
    fn encode(&self, buf: &mut [u8]) -> Result<usize, MqttError<ErrorPlaceHolder>> {
        let slice = buf.get_mut(0..2).ok_or(MqttError::BufferTooSmall)?;
        slice.copy_from_slice(&[0xE0, 0x00]);
        Ok(2)
    }
}
