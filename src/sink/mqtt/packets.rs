use mqttrs::{
    Connack, Connect, ConnectReturnCode, Packet, Protocol, Publish, QosPid, decode_slice,
    encode_slice,
};

use crate::error::ConnectError;

/// Keep-alive announced in CONNECT. The client pings at half this period.
pub const KEEP_ALIVE_SECS: u16 = 60;

// Fixed header (up to 5 bytes) plus length prefixes.
const HEADER_SLACK: usize = 16;

fn encode(packet: &Packet, capacity: usize) -> Result<Vec<u8>, mqttrs::Error> {
    let mut buf = vec![0u8; capacity];
    let packet_length = encode_slice(packet, &mut buf)?;
    buf.truncate(packet_length);
    Ok(buf)
}

pub fn build_connect_packet(
    client_id: &str,
    username: &str,
    password: &str,
    keep_alive: u16,
) -> Result<Vec<u8>, mqttrs::Error> {
    let packet: Packet = Connect {
        protocol: Protocol::MQTT311,
        keep_alive,
        client_id,
        clean_session: true,
        last_will: None,
        username: Some(username),
        password: Some(password.as_bytes()),
    }
    .into();

    let capacity = 2 * HEADER_SLACK + client_id.len() + username.len() + password.len();
    encode(&packet, capacity)
}

/// Accepts only a well-formed CONNACK carrying `Accepted`.
pub fn parse_connack(buf: &[u8]) -> Result<(), ConnectError> {
    match decode_slice(buf)? {
        Some(Packet::Connack(Connack { code, .. })) => {
            if code == ConnectReturnCode::Accepted {
                Ok(())
            } else {
                Err(ConnectError::Refused(format!("{code:?}")))
            }
        }
        Some(other) => Err(ConnectError::Protocol(format!(
            "expected CONNACK, got {other:?}"
        ))),
        None => Err(ConnectError::Protocol("incomplete CONNACK".to_string())),
    }
}

pub fn build_publish_packet(topic: &str, payload: &[u8]) -> Result<Vec<u8>, mqttrs::Error> {
    let packet: Packet = Publish {
        dup: false,
        qospid: QosPid::AtMostOnce,
        retain: false,
        topic_name: topic,
        payload,
    }
    .into();

    encode(&packet, HEADER_SLACK + topic.len() + payload.len())
}

pub fn build_pingreq_packet() -> Result<Vec<u8>, mqttrs::Error> {
    encode(&Packet::Pingreq, 2)
}

pub fn build_disconnect_packet() -> Result<Vec<u8>, mqttrs::Error> {
    encode(&Packet::Disconnect, 2)
}
