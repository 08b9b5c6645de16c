use crate::message::{
    BlockHeader, FilterLoadMessage, GetHeadersMessage, Inventory, MerkleBlockMessage, Message,
    NetAddr, RejectMessage, VersionMessage,
};
use crate::{double_sha256, Network, WireError, HEADER_LEN};

/// Serializes a message to its full wire frame: header plus payload.
///
/// Fails only when an [`Message::Other`] carries a command that cannot be
/// represented in the 12-byte header field.
pub fn encode_message(message: &Message, network: Network) -> Result<Vec<u8>, WireError> {
    let command = command_field(message.command())?;
    let payload = encode_payload(message);

    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
    frame.extend_from_slice(&network.magic());
    frame.extend_from_slice(&command);
    frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    frame.extend_from_slice(&double_sha256(&payload)[..4]);
    frame.extend_from_slice(&payload);
    Ok(frame)
}

fn command_field(name: &str) -> Result<[u8; 12], WireError> {
    let bytes = name.as_bytes();
    if bytes.is_empty() || bytes.len() > 12 || !bytes.iter().all(u8::is_ascii_graphic) {
        return Err(WireError::UnencodableCommand(name.to_string()));
    }
    let mut field = [0u8; 12];
    field[..bytes.len()].copy_from_slice(bytes);
    Ok(field)
}

fn encode_payload(message: &Message) -> Vec<u8> {
    let mut buf = Vec::new();
    match message {
        Message::Version(version) => encode_version(version, &mut buf),
        Message::VerAck | Message::FilterClear => {}
        Message::Ping(nonce) | Message::Pong(nonce) => {
            buf.extend_from_slice(&nonce.to_le_bytes());
        }
        Message::Inv(items) | Message::GetData(items) => encode_inventory(items, &mut buf),
        Message::GetHeaders(request) => encode_getheaders(request, &mut buf),
        Message::Headers(headers) => encode_headers(headers, &mut buf),
        Message::Tx(tx) => buf.extend_from_slice(&tx.0),
        Message::MerkleBlock(block) => encode_merkleblock(block, &mut buf),
        Message::FilterLoad(filter) => encode_filterload(filter, &mut buf),
        Message::Reject(reject) => encode_reject(reject, &mut buf),
        Message::Other { payload, .. } => buf.extend_from_slice(payload),
    }
    buf
}

fn encode_version(version: &VersionMessage, buf: &mut Vec<u8>) {
    buf.extend_from_slice(&version.version.to_le_bytes());
    buf.extend_from_slice(&version.services.bits().to_le_bytes());
    buf.extend_from_slice(&version.timestamp.to_le_bytes());
    encode_net_addr(&version.addr_recv, buf);
    encode_net_addr(&version.addr_from, buf);
    buf.extend_from_slice(&version.nonce.to_le_bytes());
    write_var_str(&version.user_agent, buf);
    buf.extend_from_slice(&version.start_height.to_le_bytes());
    if let Some(relay) = version.relay {
        buf.push(u8::from(relay));
    }
}

fn encode_net_addr(addr: &NetAddr, buf: &mut Vec<u8>) {
    buf.extend_from_slice(&addr.services.bits().to_le_bytes());
    // IPv4 uses the standard ::ffff: mapping into the 16-byte field
    let ip = match addr.ip {
        std::net::IpAddr::V4(v4) => v4.to_ipv6_mapped().octets(),
        std::net::IpAddr::V6(v6) => v6.octets(),
    };
    buf.extend_from_slice(&ip);
    buf.extend_from_slice(&addr.port.to_be_bytes());
}

fn encode_block_header(header: &BlockHeader, buf: &mut Vec<u8>) {
    buf.extend_from_slice(&header.version.to_le_bytes());
    buf.extend_from_slice(&header.prev_blockhash);
    buf.extend_from_slice(&header.merkle_root);
    buf.extend_from_slice(&header.time.to_le_bytes());
    buf.extend_from_slice(&header.bits.to_le_bytes());
    buf.extend_from_slice(&header.nonce.to_le_bytes());
}

fn encode_inventory(items: &[Inventory], buf: &mut Vec<u8>) {
    write_varint(items.len() as u64, buf);
    for item in items {
        buf.extend_from_slice(&(item.kind as u32).to_le_bytes());
        buf.extend_from_slice(&item.hash);
    }
}

fn encode_getheaders(request: &GetHeadersMessage, buf: &mut Vec<u8>) {
    buf.extend_from_slice(&request.version.to_le_bytes());
    write_varint(request.locator.len() as u64, buf);
    for hash in &request.locator {
        buf.extend_from_slice(hash);
    }
    buf.extend_from_slice(&request.stop);
}

fn encode_headers(headers: &[BlockHeader], buf: &mut Vec<u8>) {
    write_varint(headers.len() as u64, buf);
    for header in headers {
        encode_block_header(header, buf);
        // txn_count, always zero in a headers message
        write_varint(0, buf);
    }
}

fn encode_merkleblock(block: &MerkleBlockMessage, buf: &mut Vec<u8>) {
    encode_block_header(&block.header, buf);
    buf.extend_from_slice(&block.total_tx.to_le_bytes());
    write_varint(block.hashes.len() as u64, buf);
    for hash in &block.hashes {
        buf.extend_from_slice(hash);
    }
    write_var_bytes(&block.flags, buf);
}

fn encode_filterload(filter: &FilterLoadMessage, buf: &mut Vec<u8>) {
    write_var_bytes(&filter.filter, buf);
    buf.extend_from_slice(&filter.hash_funcs.to_le_bytes());
    buf.extend_from_slice(&filter.tweak.to_le_bytes());
    buf.push(filter.flags);
}

fn encode_reject(reject: &RejectMessage, buf: &mut Vec<u8>) {
    write_var_str(&reject.command, buf);
    buf.push(reject.code as u8);
    write_var_str(&reject.reason, buf);
    buf.extend_from_slice(&reject.data);
}

/// Bitcoin CompactSize encoding.
pub(crate) fn write_varint(value: u64, buf: &mut Vec<u8>) {
    match value {
        0..=0xFC => buf.push(value as u8),
        0xFD..=0xFFFF => {
            buf.push(0xFD);
            buf.extend_from_slice(&(value as u16).to_le_bytes());
        }
        0x1_0000..=0xFFFF_FFFF => {
            buf.push(0xFE);
            buf.extend_from_slice(&(value as u32).to_le_bytes());
        }
        _ => {
            buf.push(0xFF);
            buf.extend_from_slice(&value.to_le_bytes());
        }
    }
}

fn write_var_bytes(bytes: &[u8], buf: &mut Vec<u8>) {
    write_varint(bytes.len() as u64, buf);
    buf.extend_from_slice(bytes);
}

fn write_var_str(text: &str, buf: &mut Vec<u8>) {
    write_var_bytes(text.as_bytes(), buf);
}
