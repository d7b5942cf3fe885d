use sockwire_core::{
    Str, Value,
    packet::{DEFAULT_NSP, Packet, PacketData},
};

/// Encode a message packet in the array grammar:
/// ```text
/// 4<sub-type>[<namespace>,][<ack id>][JSON array]
/// ```
pub fn serialize_array(packet: Packet) -> Str {
    let mut buffer = String::with_capacity(size_hint(&packet));
    write_prefix(&mut buffer, &packet.inner);

    if packet.ns != DEFAULT_NSP {
        buffer.push_str(&packet.ns);
        buffer.push(',');
    }

    match &packet.inner {
        PacketData::Connect(Some(data)) => write_fragment(&mut buffer, data),
        PacketData::Event(event, args, ack) | PacketData::BinaryEvent(event, args, ack) => {
            write_ack(&mut buffer, *ack);
            write_array(&mut buffer, Some(event), args);
        }
        PacketData::EventAck(args, ack) | PacketData::BinaryAck(args, ack) => {
            write_ack(&mut buffer, Some(*ack));
            write_array(&mut buffer, None, args);
        }
        PacketData::ConnectError(message) => write_error(&mut buffer, message),
        _ => (),
    }
    Str::from(buffer)
}

/// Encode a message packet in the object grammar:
/// ```text
/// 4<sub-type>{"type":<n>,"data":[...],"nsp":"/","id":<n>}
/// ```
/// `data` is omitted for packets without payload and `id` for packets without ack id.
pub fn serialize_object(packet: Packet) -> Str {
    let mut buffer = String::with_capacity(size_hint(&packet) + 32);
    write_prefix(&mut buffer, &packet.inner);
    let index = buffer.as_bytes()[1];

    buffer.push_str("{\"type\":");
    buffer.push(index as char);

    match &packet.inner {
        PacketData::Connect(Some(data)) => {
            buffer.push_str(",\"data\":");
            write_fragment(&mut buffer, data);
        }
        PacketData::Event(event, args, _) | PacketData::BinaryEvent(event, args, _) => {
            buffer.push_str(",\"data\":");
            write_array(&mut buffer, Some(event), args);
        }
        PacketData::EventAck(args, _) | PacketData::BinaryAck(args, _) => {
            buffer.push_str(",\"data\":");
            write_array(&mut buffer, None, args);
        }
        PacketData::ConnectError(message) => {
            buffer.push_str(",\"data\":");
            write_error(&mut buffer, message);
        }
        _ => (),
    }

    buffer.push_str(",\"nsp\":");
    write_json_str(&mut buffer, &packet.ns);

    if let Some(ack) = packet.inner.ack_id() {
        buffer.push_str(",\"id\":");
        write_ack(&mut buffer, Some(ack));
    }
    buffer.push('}');
    Str::from(buffer)
}

fn write_prefix(buffer: &mut String, data: &PacketData) {
    buffer.push('4');
    // Engine level packets never reach the message serializers
    let index = data.index().unwrap_or_default();
    buffer.push((b'0' + index) as char);
}

fn write_ack(buffer: &mut String, ack: Option<u64>) {
    if let Some(ack) = ack {
        let mut itoa_buf = itoa::Buffer::new();
        buffer.push_str(itoa_buf.format(ack));
    }
}

fn write_array(buffer: &mut String, event: Option<&Str>, args: &[Value]) {
    buffer.push('[');
    if let Some(event) = event {
        write_json_str(buffer, event);
    }
    for (i, arg) in args.iter().enumerate() {
        if i > 0 || event.is_some() {
            buffer.push(',');
        }
        write_fragment(buffer, arg);
    }
    buffer.push(']');
}

/// msgpack fragments cannot be carried in a text frame, they are written as `null`.
fn write_fragment(buffer: &mut String, value: &Value) {
    match value {
        Value::Str(s) => buffer.push_str(s),
        Value::Bytes(_) => buffer.push_str("null"),
    }
}

fn write_json_str(buffer: &mut String, s: &str) {
    if let Ok(s) = serde_json::to_string(s) {
        buffer.push_str(&s);
    }
}

fn write_error(buffer: &mut String, message: &str) {
    #[derive(serde::Serialize)]
    struct ErrorMessage<'a> {
        message: &'a str,
    }
    if let Ok(data) = serde_json::to_string(&ErrorMessage { message }) {
        buffer.push_str(&data);
    }
}

fn size_hint(packet: &Packet) -> usize {
    let args_len = |args: &[Value]| args.iter().map(|a| a.len() + 1).sum::<usize>();
    let data_len = match &packet.inner {
        PacketData::Connect(Some(data)) => data.len(),
        PacketData::Event(event, args, _) | PacketData::BinaryEvent(event, args, _) => {
            event.len() + 4 + args_len(args) + 20
        }
        PacketData::EventAck(args, _) | PacketData::BinaryAck(args, _) => args_len(args) + 22,
        PacketData::ConnectError(message) => message.len() + 14,
        _ => 0,
    };
    data_len + packet.ns.len() + 3
}
