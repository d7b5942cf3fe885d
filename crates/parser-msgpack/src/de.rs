use std::{io::Cursor, ops::Range};

use bytes::Bytes;
use rmp::{Marker, decode};
use sockwire_core::{
    Str, Value,
    packet::{DEFAULT_NSP, Packet, PacketData},
    parser::ParseError,
};

/// Nested containers deeper than this are rejected instead of recursing further
const MAX_DEPTH: usize = 128;

/// Decode a msgpack packet map (the engine class byte already removed):
/// `{ "type": <n>, "nsp": <str>, "data": <any>, "id": <uint> }`
pub fn deserialize_packet(buff: Bytes) -> Result<Packet, ParseError> {
    let mut reader = Cursor::new(buff.as_ref());
    let maplen = decode::read_map_len(&mut reader).map_err(invalid)?;

    // Other implementations might add keys we don't support, but never that many
    if maplen == 0 || maplen > 20 {
        return Err(ParseError::InvalidPayload(format!(
            "packet length too big or empty: {maplen}"
        )));
    }

    let mut index = None;
    let mut nsp = None;
    let mut data_pos: Option<Range<usize>> = None;
    let mut id = None;

    for _ in 0..maplen {
        match read_str(&mut reader)? {
            "type" => {
                let ty: u64 = decode::read_int(&mut reader).map_err(invalid)?;
                index = Some(ty);
            }
            "nsp" => nsp = Some(Str::copy_from_slice(read_str(&mut reader)?)),
            "data" => {
                let start = reader.position() as usize;
                skip_element(&mut reader, 0)?;
                data_pos = Some(start..reader.position() as usize);
            }
            "id" => id = read_id(&mut reader)?,
            _ => skip_element(&mut reader, 0)?,
        }
    }
    if (reader.position() as usize) < buff.len() {
        return Err(ParseError::InvalidPayload("trailing bytes after packet".into()));
    }

    let data = data_pos.map(|range| undefined_to_nil(buff.slice(range)));
    let index = index.ok_or(ParseError::InvalidPacketType(None))?;
    let inner = match index {
        0 => PacketData::Connect(data.map(Value::Bytes)),
        1 => PacketData::Disconnect,
        2 | 5 => {
            let data = data.ok_or_else(|| ParseError::InvalidPayload("missing data".into()))?;
            let (event, args) = read_event(&data)?;
            if index == 2 {
                PacketData::Event(event, args, id)
            } else {
                PacketData::BinaryEvent(event, args, id)
            }
        }
        3 | 6 => {
            let args = match data {
                Some(data) => read_args(&data)?,
                None => Vec::new(),
            };
            let id = id.ok_or(ParseError::InvalidAckId)?;
            if index == 3 {
                PacketData::EventAck(args, id)
            } else {
                PacketData::BinaryAck(args, id)
            }
        }
        4 => PacketData::ConnectError(match data {
            Some(data) => read_connect_error(&data)?,
            None => String::new(),
        }),
        n => return Err(ParseError::InvalidPacketType(u8::try_from(n).ok())),
    };

    Ok(Packet {
        inner,
        ns: nsp.unwrap_or_else(|| Str::from(DEFAULT_NSP)),
    })
}

fn invalid(e: impl std::fmt::Debug) -> ParseError {
    ParseError::InvalidPayload(format!("{e:?}"))
}

fn eof() -> ParseError {
    ParseError::InvalidPayload("unexpected end of data".into())
}

/// The js msgpack encoder represents `undefined` as a zeroed 1-ext, it is read as nil.
fn undefined_to_nil(data: Bytes) -> Bytes {
    if data.as_ref() == [0xd4, 0x00, 0x00] {
        Bytes::from_static(&[0xc0])
    } else {
        data
    }
}

fn read_id(reader: &mut Cursor<&[u8]>) -> Result<Option<u64>, ParseError> {
    let pos = reader.position() as usize;
    match reader.get_ref().get(pos).map(|b| Marker::from_u8(*b)) {
        None => Err(eof()),
        Some(Marker::Null) => {
            reader.set_position(pos as u64 + 1);
            Ok(None)
        }
        // Negative, float and non numeric ids are all rejected
        Some(_) => decode::read_int::<u64, _>(reader)
            .map(Some)
            .map_err(|_| ParseError::InvalidAckId),
    }
}

fn read_str<'a>(reader: &mut Cursor<&'a [u8]>) -> Result<&'a str, ParseError> {
    let len = decode::read_str_len(reader).map_err(invalid)? as usize;
    let start = reader.position() as usize;
    skip(reader, len)?;
    let buff: &'a [u8] = *reader.get_ref();
    std::str::from_utf8(&buff[start..start + len]).map_err(invalid)
}

fn skip(reader: &mut Cursor<&[u8]>, len: usize) -> Result<(), ParseError> {
    let end = reader.position() as usize + len;
    if end > reader.get_ref().len() {
        return Err(eof());
    }
    reader.set_position(end as u64);
    Ok(())
}

/// Read a big endian length of `size` bytes
fn read_len(reader: &mut Cursor<&[u8]>, size: usize) -> Result<usize, ParseError> {
    let start = reader.position() as usize;
    let bytes = reader.get_ref().get(start..start + size).ok_or_else(eof)?;
    let len = bytes.iter().fold(0usize, |acc, b| (acc << 8) | *b as usize);
    reader.set_position((start + size) as u64);
    Ok(len)
}

/// Move the reader past the next element, whatever its type
fn skip_element(reader: &mut Cursor<&[u8]>, depth: usize) -> Result<(), ParseError> {
    if depth > MAX_DEPTH {
        return Err(ParseError::InvalidPayload("nesting too deep".into()));
    }
    let marker = decode::read_marker(reader).map_err(invalid)?;
    let (len, items) = match marker {
        Marker::FixPos(_)
        | Marker::FixNeg(_)
        | Marker::Null
        | Marker::Reserved
        | Marker::False
        | Marker::True => (0, 0),
        Marker::FixMap(n) => (0, n as usize * 2),
        Marker::FixArray(n) => (0, n as usize),
        Marker::FixStr(n) => (n as usize, 0),
        Marker::FixExt1 => (2, 0),
        Marker::FixExt2 => (3, 0),
        Marker::FixExt4 => (5, 0),
        Marker::FixExt8 => (9, 0),
        Marker::FixExt16 => (17, 0),
        Marker::U8 | Marker::I8 => (1, 0),
        Marker::U16 | Marker::I16 => (2, 0),
        Marker::F32 | Marker::U32 | Marker::I32 => (4, 0),
        Marker::F64 | Marker::U64 | Marker::I64 => (8, 0),
        Marker::Str8 | Marker::Bin8 => (read_len(reader, 1)?, 0),
        Marker::Str16 | Marker::Bin16 => (read_len(reader, 2)?, 0),
        Marker::Str32 | Marker::Bin32 => (read_len(reader, 4)?, 0),
        // ext payloads are preceded by a one byte type tag
        Marker::Ext8 => (read_len(reader, 1)? + 1, 0),
        Marker::Ext16 => (read_len(reader, 2)? + 1, 0),
        Marker::Ext32 => (read_len(reader, 4)? + 1, 0),
        Marker::Array16 => (0, read_len(reader, 2)?),
        Marker::Array32 => (0, read_len(reader, 4)?),
        Marker::Map16 => (0, read_len(reader, 2)? * 2),
        Marker::Map32 => (0, read_len(reader, 4)? * 2),
    };
    skip(reader, len)?;
    for _ in 0..items {
        skip_element(reader, depth + 1)?;
    }
    Ok(())
}

/// Split a msgpack array into one slice per element
fn split_array(data: &Bytes) -> Result<Vec<Bytes>, ParseError> {
    let mut reader = Cursor::new(data.as_ref());
    let len = decode::read_array_len(&mut reader).map_err(invalid)? as usize;
    let mut items = Vec::with_capacity(len.min(64));
    for _ in 0..len {
        let start = reader.position() as usize;
        skip_element(&mut reader, 1)?;
        items.push(undefined_to_nil(data.slice(start..reader.position() as usize)));
    }
    Ok(items)
}

fn read_event(data: &Bytes) -> Result<(Str, Vec<Value>), ParseError> {
    let mut items = split_array(data)?.into_iter();
    let event = items.next().ok_or(ParseError::InvalidEventName)?;
    let mut reader = Cursor::new(event.as_ref());
    let event = read_str(&mut reader).map_err(|_| ParseError::InvalidEventName)?;
    Ok((Str::copy_from_slice(event), items.map(Value::Bytes).collect()))
}

fn read_args(data: &Bytes) -> Result<Vec<Value>, ParseError> {
    Ok(split_array(data)?.into_iter().map(Value::Bytes).collect())
}

fn read_connect_error(data: &Bytes) -> Result<String, ParseError> {
    #[derive(serde::Deserialize)]
    #[serde(untagged)]
    enum ErrorPayload {
        Object { message: String },
        Message(String),
    }
    match rmp_serde::from_slice(data) {
        Ok(ErrorPayload::Object { message } | ErrorPayload::Message(message)) => Ok(message),
        Err(e) => Err(invalid(e)),
    }
}
