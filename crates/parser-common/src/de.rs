use std::io::Cursor;

use bytes::Buf;
use serde::Deserialize;
use serde_json::value::RawValue;
use sockwire_core::{
    Str, Value,
    packet::{DEFAULT_NSP, Packet, PacketData},
    parser::ParseError,
};

/// Decode the message part of a frame in the array grammar, the leading `4` already removed:
/// ```text
/// <sub-type>[<# of attachments>-][<namespace>,][<ack id>][JSON array]
/// ```
pub fn deserialize_array(data: Str) -> Result<Packet, ParseError> {
    // Separators are ascii so the cursor can walk the bytes of the utf-8 str
    let mut reader = Cursor::new(data.as_str());
    let index = read_index(&mut reader)?;

    if index == b'5' || index == b'6' {
        skip_attachments(&mut reader);
    }

    // Custom nsps will start with a slash
    let ns = if reader.has_remaining() && reader.chunk()[0] == b'/' {
        read_nsp(&mut reader, &data)
    } else {
        Str::from(DEFAULT_NSP)
    };
    let ack = read_ack(&mut reader)?;
    let rest = data.slice(reader.position() as usize..);

    let inner = match index {
        b'0' => PacketData::Connect(read_optional_json(rest)?),
        b'1' => PacketData::Disconnect,
        b'2' => {
            let (event, args) = read_event(&rest)?;
            PacketData::Event(event, args, ack)
        }
        b'3' => PacketData::EventAck(read_args(&rest)?, ack.ok_or(ParseError::InvalidAckId)?),
        b'4' => PacketData::ConnectError(read_connect_error(&rest)?),
        b'5' => {
            let (event, args) = read_event(&rest)?;
            PacketData::BinaryEvent(event, args, ack)
        }
        _ => PacketData::BinaryAck(read_args(&rest)?, ack.ok_or(ParseError::InvalidAckId)?),
    };
    Ok(Packet { inner, ns })
}

/// Decode the message part of a frame in the object grammar, the leading `4` already removed:
/// ```text
/// <sub-type>{"type":<n>,"data":[...],"nsp":"/","id":<n>}
/// ```
/// Frames in the array grammar are still accepted so peers that never switched keep working.
pub fn deserialize_object(data: Str) -> Result<Packet, ParseError> {
    let index = *data
        .as_bytes()
        .first()
        .ok_or(ParseError::InvalidPacketType(None))?;
    if data.as_bytes().get(1) != Some(&b'{') {
        return deserialize_array(data);
    }
    if !(b'0'..=b'6').contains(&index) {
        return Err(ParseError::InvalidPacketType(Some(index)));
    }
    let body = data.slice(1..);

    #[derive(Deserialize)]
    struct RawPacket<'a> {
        #[serde(rename = "type", default)]
        ty: Option<u8>,
        #[serde(borrow, default)]
        data: Option<&'a RawValue>,
        #[serde(default)]
        nsp: Option<String>,
        #[serde(borrow, default)]
        id: Option<&'a RawValue>,
    }

    let raw: RawPacket<'_> =
        serde_json::from_str(&body).map_err(|e| ParseError::InvalidPayload(e.to_string()))?;
    match raw.ty {
        // A bare json payload such as `0{"sid":"..."}`
        None => return deserialize_array(data),
        Some(ty) if ty != index - b'0' => return Err(ParseError::InvalidPacketType(Some(index))),
        Some(_) => (),
    }
    let ack = match raw.id.map(RawValue::get) {
        None | Some("null") => None,
        Some(id) => Some(id.parse::<u64>().map_err(|_| ParseError::InvalidAckId)?),
    };
    let ns = raw.nsp.map_or_else(|| Str::from(DEFAULT_NSP), Str::from);
    let data = raw.data.map(|d| sub_slice(&body, d.get()));

    let inner = match index {
        b'0' => PacketData::Connect(data.map(Value::Str)),
        b'1' => PacketData::Disconnect,
        b'2' | b'5' => {
            let data = data.ok_or_else(|| ParseError::InvalidPayload("missing data".into()))?;
            let (event, args) = read_event(&data)?;
            if index == b'2' {
                PacketData::Event(event, args, ack)
            } else {
                PacketData::BinaryEvent(event, args, ack)
            }
        }
        b'3' | b'6' => {
            let args = match data {
                Some(data) => read_args(&data)?,
                None => Vec::new(),
            };
            let ack = ack.ok_or(ParseError::InvalidAckId)?;
            if index == b'3' {
                PacketData::EventAck(args, ack)
            } else {
                PacketData::BinaryAck(args, ack)
            }
        }
        _ => PacketData::ConnectError(match data {
            Some(data) => read_connect_error(&data)?,
            None => String::new(),
        }),
    };
    Ok(Packet { inner, ns })
}

fn read_index(reader: &mut Cursor<&str>) -> Result<u8, ParseError> {
    if !reader.has_remaining() {
        return Err(ParseError::InvalidPacketType(None));
    }
    let index = reader.get_u8();
    (b'0'..=b'6')
        .contains(&index)
        .then_some(index)
        .ok_or(ParseError::InvalidPacketType(Some(index)))
}

/// Binary placeholders are not reassembled, the count prefix is skipped
/// and placeholders stay as regular arguments.
fn skip_attachments(reader: &mut Cursor<&str>) {
    let start = reader.position();
    while reader.has_remaining() && reader.chunk()[0].is_ascii_digit() {
        reader.advance(1);
    }
    if reader.position() > start && reader.has_remaining() && reader.chunk()[0] == b'-' {
        reader.advance(1);
    } else {
        reader.set_position(start);
    }
}

fn read_nsp(reader: &mut Cursor<&str>, data: &Str) -> Str {
    let start_index = reader.position() as usize;
    loop {
        match reader.has_remaining().then(|| reader.get_u8()) {
            Some(b',') => {
                break data.slice(start_index..reader.position() as usize - 1);
            }
            // The namespace may end the frame without a trailing comma, e.g `41/custom`
            None => {
                break data.slice(start_index..reader.position() as usize);
            }
            Some(_) => (),
        }
    }
}

fn read_ack(reader: &mut Cursor<&str>) -> Result<Option<u64>, ParseError> {
    let start_index = reader.position() as usize;
    let data = *reader.get_ref();
    while reader.has_remaining() && reader.chunk()[0].is_ascii_digit() {
        reader.advance(1);
    }
    let end_index = reader.position() as usize;
    if end_index == start_index {
        return Ok(None);
    }
    match reader.has_remaining().then(|| reader.chunk()[0]) {
        None | Some(b'[' | b'{' | b'"') => data[start_index..end_index]
            .parse()
            .map(Some)
            .map_err(|_| ParseError::InvalidAckId),
        Some(_) => Err(ParseError::InvalidAckId),
    }
}

/// Slice `child`, a sub str borrowed from `parent`, out of the shared buffer without copying.
fn sub_slice(parent: &Str, child: &str) -> Str {
    let start = child.as_ptr() as usize - parent.as_ptr() as usize;
    parent.slice(start..start + child.len())
}

fn read_array<'a>(data: &'a Str) -> Result<Vec<&'a RawValue>, ParseError> {
    serde_json::from_str(data).map_err(|e| ParseError::InvalidPayload(e.to_string()))
}

fn read_event(data: &Str) -> Result<(Str, Vec<Value>), ParseError> {
    let items = read_array(data)?;
    let (event, args) = items.split_first().ok_or(ParseError::InvalidEventName)?;
    let event: String =
        serde_json::from_str(event.get()).map_err(|_| ParseError::InvalidEventName)?;
    let args = args
        .iter()
        .map(|raw| Value::Str(sub_slice(data, raw.get())))
        .collect();
    Ok((Str::from(event), args))
}

fn read_args(data: &Str) -> Result<Vec<Value>, ParseError> {
    if data.is_empty() {
        return Ok(Vec::new());
    }
    Ok(read_array(data)?
        .into_iter()
        .map(|raw| Value::Str(sub_slice(data, raw.get())))
        .collect())
}

fn read_optional_json(data: Str) -> Result<Option<Value>, ParseError> {
    if data.is_empty() {
        return Ok(None);
    }
    serde_json::from_str::<&RawValue>(&data)
        .map_err(|e| ParseError::InvalidPayload(e.to_string()))?;
    Ok(Some(Value::Str(data)))
}

fn read_connect_error(data: &str) -> Result<String, ParseError> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ErrorPayload {
        Object { message: String },
        Message(String),
    }
    if data.is_empty() {
        return Ok(String::new());
    }
    match serde_json::from_str(data) {
        Ok(ErrorPayload::Object { message } | ErrorPayload::Message(message)) => Ok(message),
        Err(e) => Err(ParseError::InvalidPayload(e.to_string())),
    }
}
