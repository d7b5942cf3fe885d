use bytes::Bytes;
use rmp::encode;
use sockwire_core::{
    Value,
    packet::{Packet, PacketData},
};

/// Encode a message packet as a msgpack map, keys in the order `type`, `nsp`, `data`, `id`.
/// `data` is omitted for packets without payload and `id` for packets without ack id.
pub fn serialize_packet(packet: Packet, prefix: Option<u8>) -> Bytes {
    let mut buff = Vec::with_capacity(size_hint(&packet));
    if let Some(prefix) = prefix {
        buff.push(prefix);
    }
    let has_data = has_data(&packet.inner);
    let ack = packet.inner.ack_id();
    let len = 2 + u32::from(has_data) + u32::from(ack.is_some());

    // Writing into a Vec never fails, the io results are discarded
    let _ = encode::write_map_len(&mut buff, len);
    let _ = encode::write_str(&mut buff, "type");
    let _ = encode::write_uint(&mut buff, packet.inner.index().unwrap_or_default().into());
    let _ = encode::write_str(&mut buff, "nsp");
    let _ = encode::write_str(&mut buff, &packet.ns);

    if has_data {
        let _ = encode::write_str(&mut buff, "data");
        match &packet.inner {
            PacketData::Connect(Some(data)) => write_fragment(&mut buff, data),
            PacketData::Event(event, args, _) | PacketData::BinaryEvent(event, args, _) => {
                let _ = encode::write_array_len(&mut buff, args.len() as u32 + 1);
                let _ = encode::write_str(&mut buff, event);
                args.iter().for_each(|arg| write_fragment(&mut buff, arg));
            }
            PacketData::EventAck(args, _) | PacketData::BinaryAck(args, _) => {
                let _ = encode::write_array_len(&mut buff, args.len() as u32);
                args.iter().for_each(|arg| write_fragment(&mut buff, arg));
            }
            PacketData::ConnectError(message) => {
                let _ = encode::write_map_len(&mut buff, 1);
                let _ = encode::write_str(&mut buff, "message");
                let _ = encode::write_str(&mut buff, message);
            }
            _ => (),
        }
    }

    if let Some(ack) = ack {
        let _ = encode::write_str(&mut buff, "id");
        let _ = encode::write_uint(&mut buff, ack);
    }
    buff.into()
}

fn has_data(data: &PacketData) -> bool {
    matches!(
        data,
        PacketData::Connect(Some(_))
            | PacketData::Event(..)
            | PacketData::BinaryEvent(..)
            | PacketData::EventAck(..)
            | PacketData::BinaryAck(..)
            | PacketData::ConnectError(_)
    )
}

/// json fragments cannot be carried in a msgpack frame, they are written as nil.
fn write_fragment(buff: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Bytes(data) => buff.extend_from_slice(data),
        Value::Str(_) => {
            let _ = encode::write_nil(buff);
        }
    }
}

fn size_hint(packet: &Packet) -> usize {
    let args_len = |args: &[Value]| args.iter().map(Value::len).sum::<usize>() + 5;
    let data_len = match &packet.inner {
        PacketData::Connect(Some(data)) => data.len(),
        PacketData::Event(event, args, _) | PacketData::BinaryEvent(event, args, _) => {
            event.len() + 5 + args_len(args)
        }
        PacketData::EventAck(args, _) | PacketData::BinaryAck(args, _) => args_len(args),
        PacketData::ConnectError(message) => message.len() + 14,
        _ => 0,
    };
    // map header, keys, type and id
    data_len + packet.ns.len() + 32
}
