use std::net::IpAddr;

use crate::message::{
    BlockHeader, FilterLoadMessage, GetHeadersMessage, InvKind, Inventory, MerkleBlockMessage,
    Message, MessageHeader, NetAddr, RawTx, RejectCode, RejectMessage, Services, VersionMessage,
};
use crate::{Hash, Network, WireError, HEADER_LEN};

/// Upper bound on `inv`/`getdata` entries, as enforced by Bitcoin Core.
const MAX_INV_ENTRIES: u64 = 50_000;
/// Upper bound on `headers` entries per message.
const MAX_HEADERS_ENTRIES: u64 = 2_000;
/// Upper bound on `getheaders` locator hashes.
const MAX_LOCATOR_HASHES: u64 = 2_000;

/// Validates and decodes the fixed 24-byte header.
///
/// Rejects a mismatched magic, a command that is not zero-padded printable
/// ASCII, and any payload length above `max_payload` before a single byte of
/// payload is buffered.
pub fn decode_header(
    bytes: &[u8; HEADER_LEN],
    network: Network,
    max_payload: usize,
) -> Result<MessageHeader, WireError> {
    if bytes[0..4] != network.magic() {
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[0..4]);
        return Err(WireError::WrongMagic(magic));
    }

    let command = parse_command(&bytes[4..16])?;

    let length = u32::from_le_bytes([bytes[16], bytes[17], bytes[18], bytes[19]]);
    if length as usize > max_payload {
        return Err(WireError::OversizedPayload {
            len: length,
            max: max_payload,
        });
    }

    let mut checksum = [0u8; 4];
    checksum.copy_from_slice(&bytes[20..24]);

    Ok(MessageHeader {
        command,
        length,
        checksum,
    })
}

fn parse_command(field: &[u8]) -> Result<String, WireError> {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    let (name, padding) = field.split_at(end);
    if name.is_empty()
        || !name.iter().all(u8::is_ascii_graphic)
        || padding.iter().any(|&b| b != 0)
    {
        return Err(WireError::BadCommand);
    }
    // the bytes are ascii-graphic, so utf-8 conversion cannot fail
    String::from_utf8(name.to_vec()).map_err(|_| WireError::BadCommand)
}

/// Decodes a payload for the given command.
///
/// The caller has already verified the checksum.  Unknown printable commands
/// decode into [`Message::Other`] with the payload preserved verbatim.
pub fn decode_payload(command: &str, payload: &[u8]) -> Result<Message, WireError> {
    match command {
        "version" => Ok(Message::Version(decode_version(payload)?)),
        "verack" => empty_payload(payload, Message::VerAck),
        "ping" => Ok(Message::Ping(decode_nonce(payload)?)),
        "pong" => Ok(Message::Pong(decode_nonce(payload)?)),
        "inv" => Ok(Message::Inv(decode_inventory(payload)?)),
        "getdata" => Ok(Message::GetData(decode_inventory(payload)?)),
        "getheaders" => Ok(Message::GetHeaders(decode_getheaders(payload)?)),
        "headers" => Ok(Message::Headers(decode_headers(payload)?)),
        "tx" => {
            if payload.is_empty() {
                return Err(WireError::Invalid("empty tx payload"));
            }
            Ok(Message::Tx(RawTx(payload.to_vec())))
        }
        "merkleblock" => Ok(Message::MerkleBlock(decode_merkleblock(payload)?)),
        "filterload" => Ok(Message::FilterLoad(decode_filterload(payload)?)),
        "filterclear" => empty_payload(payload, Message::FilterClear),
        "reject" => Ok(Message::Reject(decode_reject(payload)?)),
        other => Ok(Message::Other {
            command: other.to_string(),
            payload: payload.to_vec(),
        }),
    }
}

fn empty_payload(payload: &[u8], message: Message) -> Result<Message, WireError> {
    if payload.is_empty() {
        Ok(message)
    } else {
        Err(WireError::Invalid("payload on an empty-bodied command"))
    }
}

fn decode_version(payload: &[u8]) -> Result<VersionMessage, WireError> {
    let mut c = 0;

    let version = read_i32(payload, &mut c)?;
    let services = Services::from(read_u64(payload, &mut c)?);
    let timestamp = read_i64(payload, &mut c)?;
    let addr_recv = decode_net_addr(payload, &mut c)?;
    let addr_from = decode_net_addr(payload, &mut c)?;
    let nonce = read_u64(payload, &mut c)?;
    let user_agent = read_var_str(payload, &mut c, "version user agent")?;
    let start_height = read_i32(payload, &mut c)?;
    // peers speaking pre-BIP37 protocols omit the relay byte; anything past
    // it belongs to protocol versions newer than ours and is ignored
    let relay = payload.get(c).map(|&b| b != 0);

    Ok(VersionMessage {
        version,
        services,
        timestamp,
        addr_recv,
        addr_from,
        nonce,
        user_agent,
        start_height,
        relay,
    })
}

fn decode_net_addr(payload: &[u8], c: &mut usize) -> Result<NetAddr, WireError> {
    let services = Services::from(read_u64(payload, c)?);
    let ip_bytes: [u8; 16] = read_array(payload, c, "net_addr ip")?;
    let port = u16::from_be_bytes(read_array(payload, c, "net_addr port")?);

    let v6 = std::net::Ipv6Addr::from(ip_bytes);
    let ip = match v6.to_ipv4_mapped() {
        Some(v4) => IpAddr::V4(v4),
        None => IpAddr::V6(v6),
    };

    Ok(NetAddr { services, ip, port })
}

fn decode_nonce(payload: &[u8]) -> Result<u64, WireError> {
    if payload.len() != 8 {
        return Err(WireError::Invalid("ping nonce length"));
    }
    let mut c = 0;
    read_u64(payload, &mut c)
}

fn decode_inventory(payload: &[u8]) -> Result<Vec<Inventory>, WireError> {
    let mut c = 0;
    let count = read_varint(payload, &mut c)?;
    if count > MAX_INV_ENTRIES {
        return Err(WireError::Invalid("inventory count"));
    }
    let mut items = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let raw_kind = read_u32(payload, &mut c)?;
        let kind = InvKind::from_u32(raw_kind).ok_or(WireError::Invalid("inventory type"))?;
        let hash = read_array(payload, &mut c, "inventory hash")?;
        items.push(Inventory { kind, hash });
    }
    expect_consumed(payload, c)?;
    Ok(items)
}

fn decode_getheaders(payload: &[u8]) -> Result<GetHeadersMessage, WireError> {
    let mut c = 0;
    let version = read_i32(payload, &mut c)?;
    let count = read_varint(payload, &mut c)?;
    if count > MAX_LOCATOR_HASHES {
        return Err(WireError::Invalid("locator hash count"));
    }
    let mut locator = Vec::with_capacity(count as usize);
    for _ in 0..count {
        locator.push(read_array::<32>(payload, &mut c, "locator hash")?);
    }
    let stop = read_array(payload, &mut c, "stop hash")?;
    expect_consumed(payload, c)?;
    Ok(GetHeadersMessage {
        version,
        locator,
        stop,
    })
}

fn decode_block_header(payload: &[u8], c: &mut usize) -> Result<BlockHeader, WireError> {
    Ok(BlockHeader {
        version: read_i32(payload, c)?,
        prev_blockhash: read_array(payload, c, "prev blockhash")?,
        merkle_root: read_array(payload, c, "merkle root")?,
        time: read_u32(payload, c)?,
        bits: read_u32(payload, c)?,
        nonce: read_u32(payload, c)?,
    })
}

fn decode_headers(payload: &[u8]) -> Result<Vec<BlockHeader>, WireError> {
    let mut c = 0;
    let count = read_varint(payload, &mut c)?;
    if count > MAX_HEADERS_ENTRIES {
        return Err(WireError::Invalid("headers count"));
    }
    let mut headers = Vec::with_capacity(count as usize);
    for _ in 0..count {
        headers.push(decode_block_header(payload, &mut c)?);
        // txn_count, always zero in a headers message
        let _ = read_varint(payload, &mut c)?;
    }
    expect_consumed(payload, c)?;
    Ok(headers)
}

fn decode_merkleblock(payload: &[u8]) -> Result<MerkleBlockMessage, WireError> {
    let mut c = 0;
    let header = decode_block_header(payload, &mut c)?;
    let total_tx = read_u32(payload, &mut c)?;
    let count = read_varint(payload, &mut c)?;
    // each hash is 32 bytes, so the count can never exceed the remainder
    if count.saturating_mul(32) > (payload.len() - c) as u64 {
        return Err(WireError::Truncated("merkleblock hashes"));
    }
    let mut hashes: Vec<Hash> = Vec::with_capacity(count as usize);
    for _ in 0..count {
        hashes.push(read_array(payload, &mut c, "merkleblock hash")?);
    }
    let flags = read_var_bytes(payload, &mut c, "merkleblock flags")?;
    expect_consumed(payload, c)?;
    Ok(MerkleBlockMessage {
        header,
        total_tx,
        hashes,
        flags,
    })
}

fn decode_filterload(payload: &[u8]) -> Result<FilterLoadMessage, WireError> {
    let mut c = 0;
    let filter = read_var_bytes(payload, &mut c, "filter bytes")?;
    if filter.len() > FilterLoadMessage::MAX_FILTER_BYTES {
        return Err(WireError::Invalid("filter size"));
    }
    let hash_funcs = read_u32(payload, &mut c)?;
    if hash_funcs > FilterLoadMessage::MAX_HASH_FUNCS {
        return Err(WireError::Invalid("filter hash function count"));
    }
    let tweak = read_u32(payload, &mut c)?;
    let flags = read_u8(payload, &mut c, "filter flags")?;
    expect_consumed(payload, c)?;
    Ok(FilterLoadMessage {
        filter,
        hash_funcs,
        tweak,
        flags,
    })
}

fn decode_reject(payload: &[u8]) -> Result<RejectMessage, WireError> {
    let mut c = 0;
    let command = read_var_str(payload, &mut c, "reject command")?;
    let code_byte = read_u8(payload, &mut c, "reject code")?;
    let code = RejectCode::from_u8(code_byte).ok_or(WireError::Invalid("reject code"))?;
    let reason = read_var_str(payload, &mut c, "reject reason")?;
    let data = payload[c..].to_vec();
    Ok(RejectMessage {
        command,
        code,
        reason,
        data,
    })
}

fn expect_consumed(payload: &[u8], c: usize) -> Result<(), WireError> {
    if c == payload.len() {
        Ok(())
    } else {
        Err(WireError::Invalid("trailing payload bytes"))
    }
}

/// Bitcoin CompactSize decoding; rejects non-minimal encodings.
pub(crate) fn read_varint(payload: &[u8], c: &mut usize) -> Result<u64, WireError> {
    let first = read_u8(payload, c, "varint")?;
    match first {
        0xFD => {
            let value = u16::from_le_bytes(read_array(payload, c, "varint")?);
            if value < 0xFD {
                return Err(WireError::NonMinimalVarint);
            }
            Ok(u64::from(value))
        }
        0xFE => {
            let value = u32::from_le_bytes(read_array(payload, c, "varint")?);
            if value <= u32::from(u16::MAX) {
                return Err(WireError::NonMinimalVarint);
            }
            Ok(u64::from(value))
        }
        0xFF => {
            let value = u64::from_le_bytes(read_array(payload, c, "varint")?);
            if value <= u64::from(u32::MAX) {
                return Err(WireError::NonMinimalVarint);
            }
            Ok(value)
        }
        n => Ok(u64::from(n)),
    }
}

fn read_var_bytes(
    payload: &[u8],
    c: &mut usize,
    ctx: &'static str,
) -> Result<Vec<u8>, WireError> {
    let len = read_varint(payload, c)? as usize;
    let end = c.checked_add(len).ok_or(WireError::Truncated(ctx))?;
    let bytes = payload
        .get(*c..end)
        .ok_or(WireError::Truncated(ctx))?
        .to_vec();
    *c = end;
    Ok(bytes)
}

fn read_var_str(payload: &[u8], c: &mut usize, ctx: &'static str) -> Result<String, WireError> {
    let bytes = read_var_bytes(payload, c, ctx)?;
    String::from_utf8(bytes).map_err(|_| WireError::Invalid("utf-8 string"))
}

fn read_u8(payload: &[u8], c: &mut usize, ctx: &'static str) -> Result<u8, WireError> {
    let byte = *payload.get(*c).ok_or(WireError::Truncated(ctx))?;
    *c += 1;
    Ok(byte)
}

fn read_u32(payload: &[u8], c: &mut usize) -> Result<u32, WireError> {
    Ok(u32::from_le_bytes(read_array(payload, c, "u32")?))
}

fn read_u64(payload: &[u8], c: &mut usize) -> Result<u64, WireError> {
    Ok(u64::from_le_bytes(read_array(payload, c, "u64")?))
}

fn read_i32(payload: &[u8], c: &mut usize) -> Result<i32, WireError> {
    Ok(i32::from_le_bytes(read_array(payload, c, "i32")?))
}

fn read_i64(payload: &[u8], c: &mut usize) -> Result<i64, WireError> {
    Ok(i64::from_le_bytes(read_array(payload, c, "i64")?))
}

fn read_array<const N: usize>(
    payload: &[u8],
    c: &mut usize,
    ctx: &'static str,
) -> Result<[u8; N], WireError> {
    let slice = payload
        .get(*c..*c + N)
        .ok_or(WireError::Truncated(ctx))?;
    let mut array = [0u8; N];
    array.copy_from_slice(slice);
    *c += N;
    Ok(array)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MAX_PAYLOAD_BYTES;
    use std::net::Ipv4Addr;

    fn header_bytes(magic: [u8; 4], command: &[u8], length: u32) -> [u8; HEADER_LEN] {
        let mut bytes = [0u8; HEADER_LEN];
        bytes[0..4].copy_from_slice(&magic);
        bytes[4..4 + command.len()].copy_from_slice(command);
        bytes[16..20].copy_from_slice(&length.to_le_bytes());
        bytes
    }

    fn net_addr_bytes(services: u64, ip: [u8; 4], port: u16) -> Vec<u8> {
        let mut b = Vec::new();
        b.extend_from_slice(&services.to_le_bytes());
        b.extend_from_slice(&[0u8; 10]);
        b.extend_from_slice(&[0xFF, 0xFF]);
        b.extend_from_slice(&ip);
        b.extend_from_slice(&port.to_be_bytes());
        b
    }

    /// Realistic version payload for protocol v70016 (/Satoshi:25.0.0/).
    fn version_payload_v70016() -> Vec<u8> {
        let mut p = Vec::new();
        p.extend_from_slice(&70016i32.to_le_bytes());
        p.extend_from_slice(&1033u64.to_le_bytes());
        p.extend_from_slice(&1_700_000_000i64.to_le_bytes());
        p.extend(net_addr_bytes(1033, [192, 168, 1, 1], 8333));
        p.extend(net_addr_bytes(1033, [10, 0, 0, 1], 8333));
        p.extend_from_slice(&0x1234_5678_90ab_cdefu64.to_le_bytes());
        let ua = b"/Satoshi:25.0.0/";
        p.push(ua.len() as u8);
        p.extend_from_slice(ua);
        p.extend_from_slice(&820_000i32.to_le_bytes());
        p.push(1);
        p
    }

    #[test]
    fn header_accepts_known_command() {
        let bytes = header_bytes(Network::Mainnet.magic(), b"verack", 0);
        let header = decode_header(&bytes, Network::Mainnet, MAX_PAYLOAD_BYTES).unwrap();
        assert_eq!(header.command, "verack");
        assert_eq!(header.length, 0);
    }

    #[test]
    fn header_rejects_wrong_magic() {
        let bytes = header_bytes(Network::Testnet.magic(), b"verack", 0);
        assert!(matches!(
            decode_header(&bytes, Network::Mainnet, MAX_PAYLOAD_BYTES),
            Err(WireError::WrongMagic(_))
        ));
    }

    #[test]
    fn header_rejects_unprintable_command() {
        let bytes = header_bytes(Network::Mainnet.magic(), &[0x01, 0x02, 0x03], 0);
        assert_eq!(
            decode_header(&bytes, Network::Mainnet, MAX_PAYLOAD_BYTES),
            Err(WireError::BadCommand)
        );
    }

    #[test]
    fn header_rejects_interior_nul_in_command() {
        let bytes = header_bytes(Network::Mainnet.magic(), b"ver\0ack", 0);
        assert_eq!(
            decode_header(&bytes, Network::Mainnet, MAX_PAYLOAD_BYTES),
            Err(WireError::BadCommand)
        );
    }

    #[test]
    fn header_rejects_oversized_payload_length() {
        let bytes = header_bytes(Network::Mainnet.magic(), b"tx", 1024 * 1024);
        assert!(matches!(
            decode_header(&bytes, Network::Mainnet, 1024),
            Err(WireError::OversizedPayload { .. })
        ));
    }

    #[test]
    fn decode_version_all_fields() {
        let msg = decode_version(&version_payload_v70016()).unwrap();
        assert_eq!(msg.version, 70016);
        assert_eq!(msg.services.bits(), 1033);
        assert_eq!(msg.timestamp, 1_700_000_000);
        assert_eq!(msg.user_agent, "/Satoshi:25.0.0/");
        assert_eq!(msg.start_height, 820_000);
        assert_eq!(msg.relay, Some(true));
        assert_eq!(msg.addr_recv.ip, IpAddr::V4(Ipv4Addr::new(192, 168, 1, 1)));
        assert_eq!(msg.addr_recv.port, 8333);
        assert_eq!(msg.addr_from.ip, IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)));
    }

    #[test]
    fn decode_version_relay_absent_when_byte_missing() {
        let mut payload = version_payload_v70016();
        payload.pop();
        let msg = decode_version(&payload).unwrap();
        assert_eq!(msg.relay, None);
    }

    #[test]
    fn decode_version_truncated_payload_errors() {
        assert!(matches!(
            decode_version(&[0u8; 10]),
            Err(WireError::Truncated(_))
        ));
    }

    #[test]
    fn varint_accepts_minimal_encodings() {
        for (bytes, expected) in [
            (vec![0x00], 0u64),
            (vec![0xFC], 0xFC),
            (vec![0xFD, 0xFD, 0x00], 0xFD),
            (vec![0xFE, 0x00, 0x00, 0x01, 0x00], 0x1_0000),
            (vec![0xFF, 0, 0, 0, 0, 1, 0, 0, 0], 0x1_0000_0000),
        ] {
            let mut c = 0;
            assert_eq!(read_varint(&bytes, &mut c).unwrap(), expected);
            assert_eq!(c, bytes.len());
        }
    }

    #[test]
    fn varint_rejects_non_minimal_encodings() {
        for bytes in [
            vec![0xFD, 0x20, 0x00],
            vec![0xFE, 0xFF, 0xFF, 0x00, 0x00],
            vec![0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0, 0, 0, 0],
        ] {
            let mut c = 0;
            assert_eq!(
                read_varint(&bytes, &mut c),
                Err(WireError::NonMinimalVarint)
            );
        }
    }

    #[test]
    fn ping_requires_exactly_eight_bytes() {
        assert!(decode_payload("ping", &[0u8; 4]).is_err());
        assert!(decode_payload("ping", &[0u8; 9]).is_err());
        assert_eq!(
            decode_payload("ping", &7u64.to_le_bytes()).unwrap(),
            Message::Ping(7)
        );
    }

    #[test]
    fn verack_with_payload_is_invalid() {
        assert!(decode_payload("verack", &[1]).is_err());
    }

    #[test]
    fn unknown_printable_command_becomes_other() {
        let decoded = decode_payload("sendcmpct", &[0x00, 0x02]).unwrap();
        assert_eq!(
            decoded,
            Message::Other {
                command: "sendcmpct".to_string(),
                payload: vec![0x00, 0x02],
            }
        );
    }

    #[test]
    fn inventory_rejects_unknown_type() {
        let mut payload = vec![1u8];
        payload.extend_from_slice(&9u32.to_le_bytes());
        payload.extend_from_slice(&[0u8; 32]);
        assert_eq!(
            decode_payload("inv", &payload),
            Err(WireError::Invalid("inventory type"))
        );
    }

    #[test]
    fn inventory_rejects_trailing_bytes() {
        let mut payload = vec![1u8];
        payload.extend_from_slice(&1u32.to_le_bytes());
        payload.extend_from_slice(&[0u8; 32]);
        payload.push(0xAA);
        assert_eq!(
            decode_payload("inv", &payload),
            Err(WireError::Invalid("trailing payload bytes"))
        );
    }

    #[test]
    fn filterload_enforces_bip37_limits() {
        // filter larger than 36000 bytes
        let mut payload = Vec::new();
        payload.push(0xFD);
        payload.extend_from_slice(&36_001u16.to_le_bytes());
        payload.extend_from_slice(&vec![0u8; 36_001]);
        payload.extend_from_slice(&1u32.to_le_bytes());
        payload.extend_from_slice(&0u32.to_le_bytes());
        payload.push(0);
        assert_eq!(
            decode_payload("filterload", &payload),
            Err(WireError::Invalid("filter size"))
        );

        // too many hash functions
        let mut payload = vec![1u8, 0xAB];
        payload.extend_from_slice(&51u32.to_le_bytes());
        payload.extend_from_slice(&0u32.to_le_bytes());
        payload.push(0);
        assert_eq!(
            decode_payload("filterload", &payload),
            Err(WireError::Invalid("filter hash function count"))
        );
    }

    #[test]
    fn merkleblock_hash_count_cannot_exceed_remaining_bytes() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&[0u8; 80]);
        payload.extend_from_slice(&400u32.to_le_bytes());
        // claims 300 hashes with no bytes behind them
        payload.push(0xFD);
        payload.extend_from_slice(&300u16.to_le_bytes());
        assert_eq!(
            decode_payload("merkleblock", &payload),
            Err(WireError::Truncated("merkleblock hashes"))
        );
    }

    #[test]
    fn reject_keeps_extra_data() {
        let mut payload = Vec::new();
        payload.push(2);
        payload.extend_from_slice(b"tx");
        payload.push(0x12);
        payload.push(4);
        payload.extend_from_slice(b"dupe");
        payload.extend_from_slice(&[0xAB; 32]);
        let Message::Reject(reject) = decode_payload("reject", &payload).unwrap() else {
            panic!("expected Message::Reject");
        };
        assert_eq!(reject.command, "tx");
        assert_eq!(reject.code, RejectCode::Duplicate);
        assert_eq!(reject.reason, "dupe");
        assert_eq!(reject.data, vec![0xAB; 32]);
    }
}
