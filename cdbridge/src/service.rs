//! Port service dispatcher
//!
//! Maps one inbound packet on a reserved port to at most one reply packet.
//! A reply reuses the request object: addresses exchanged, payload
//! overwritten. A malformed or filtered-out request comes back in `Err` so
//! the caller can return it to its pool.

use core::fmt::Write as _;

use heapless::String;

use crate::config::{BridgeConfig, Mode, INTF_RS485};
use crate::core::{Level, Mac, NetAddr, Port, MAX_PACKET_PAYLOAD};
use crate::link::{BusLink, NetLink};
use crate::nvm::Nvm;
use crate::packet::Packet;

const SW_VER: &str = env!("CARGO_PKG_VERSION");
const MODEL: &str = "cdbus_bridge";

const WORD: usize = 4;
/// Fill byte for the trailing partial word of a flash write.
const NVM_PAD: u8 = 0xff;

/// Routes one system-port packet to its handler.
///
/// The caller guarantees the bridge's own bus filter is a valid,
/// non-broadcast address before exposing the flash service.
pub fn dispatch<B, N, V>(
    pkt: Packet,
    cfg: &mut BridgeConfig,
    bus: &mut B,
    net: &mut N,
    nvm: &mut V,
) -> Result<Packet, Packet>
where
    B: BusLink,
    N: NetLink,
    V: Nvm,
{
    match pkt.dst_port {
        Port::IDENTIFY => identify(pkt, cfg, net),
        Port::BAUD_RATE => baud_rate(pkt),
        Port::ADDRESS => address(pkt, cfg, bus, net),
        Port::FLASH => flash(pkt, nvm, net),
        Port::RAW_CONF => raw_conf(pkt, cfg, net),
        _ => {
            warn!("service: unknown port {}", pkt.dst_port.into_u16());
            Err(pkt)
        }
    }
}

fn uid_hex(uid: &[u8; 12]) -> String<24> {
    const TLB: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::new();
    // Low nibble first, matching the on-device serial string convention.
    for &val in uid {
        unwrap!(out.push(TLB[usize::from(val & 0xf)] as char).ok());
        unwrap!(out.push(TLB[usize::from(val >> 4)] as char).ok());
    }
    out
}

/// Port 1: device identification.
///
/// A non-empty request payload acts as a substring filter, used by hosts to
/// discover devices by partial match; a miss drops the request silently.
fn identify<N: NetLink>(mut pkt: Packet, cfg: &BridgeConfig, net: &N) -> Result<Packet, Packet> {
    let mut info: String<96> = String::new();
    unwrap!(write!(info, "M: {}; S: {}; SW: {}", MODEL, uid_hex(&cfg.uid), SW_VER).ok());

    if !pkt.data.is_empty() {
        let matched = core::str::from_utf8(&pkt.data)
            .map(|filter| info.contains(filter))
            .unwrap_or(false);
        if !matched {
            debug!("identify: filter miss");
            return Err(pkt);
        }
    }

    pkt.data.clear();
    unwrap!(pkt.data.extend_from_slice(info.as_bytes()).ok());
    pkt.exchange_src_dst(net.local_addr());
    Ok(pkt)
}

/// Port 2: bus baud rate get/set. Reserved, not yet implemented.
fn baud_rate(pkt: Packet) -> Result<Packet, Packet> {
    Err(pkt)
}

/// Port 3: node address and network id configuration.
fn address<B, N>(mut pkt: Packet, cfg: &mut BridgeConfig, bus: &mut B, net: &mut N) -> Result<Packet, Packet>
where
    B: BusLink,
    N: NetLink,
{
    if cfg.mode == Mode::Bridge {
        // Legacy dialect: [0x08][intf] prefix, then optional mac.
        if pkt.data.len() < 2 || pkt.data[0] != 0x08 || pkt.data[1] != INTF_RS485 {
            warn!("p3: malformed bridge request, len {}", pkt.data.len());
            return Err(pkt);
        }
        match pkt.data.len() {
            2 => {
                let mac = bus.filter();
                pkt.data.clear();
                unwrap!(pkt.data.push(mac.into_u8()).ok());
            }
            3 => {
                let mac = Mac::new(pkt.data[2]);
                bus.set_filter(mac);
                debug!("p3: set filter {}", mac.into_u8());
                pkt.data.clear();
            }
            _ => {
                warn!("p3: malformed bridge request, len {}", pkt.data.len());
                return Err(pkt);
            }
        }
        pkt.exchange_src_dst(net.local_addr());
        return Ok(pkt);
    }

    match (pkt.data.len(), pkt.data.first().copied()) {
        // Set mac.
        (2, Some(0x00)) => {
            let mac = Mac::new(pkt.data[1]);
            bus.set_filter(mac);
            net.set_local_mac(mac);
            cfg.local.mac = mac;
            debug!("p3: set filter {}", mac.into_u8());
            pkt.data.clear();
        }
        // Set net id.
        (2, Some(0x01)) => {
            let id = pkt.data[1];
            net.set_local_net(id);
            cfg.local.net = id;
            debug!("p3: set net {}", id);
            pkt.data.clear();
        }
        // Read net id.
        (1, Some(0x01)) => {
            let id = cfg.local.net;
            pkt.data.clear();
            unwrap!(pkt.data.push(id).ok());
        }
        _ => {
            warn!("p3: malformed request, len {}", pkt.data.len());
            return Err(pkt);
        }
    }
    pkt.exchange_src_dst(net.local_addr());
    Ok(pkt)
}

/// Port 10: remote flash erase/read/write.
///
/// ```text
/// erase: [0xff][addr:4][len:4]   -> [] on success, else [status]
/// read:  [0x00][addr:4][len:1]   -> [data]
/// write: [0x01][addr:4][data…]   -> [] on success, else [status]
/// ```
fn flash<V, N>(mut pkt: Packet, nvm: &mut V, net: &N) -> Result<Packet, Packet>
where
    V: Nvm,
    N: NetLink,
{
    match (pkt.data.first().copied(), pkt.data.len()) {
        (Some(0xff), 9) => {
            let addr = u32::from_le_bytes(unwrap!(pkt.data[1..5].try_into().ok()));
            let len = u32::from_le_bytes(unwrap!(pkt.data[5..9].try_into().ok()));
            let pages = len.div_ceil(nvm.page_size());

            nvm.unlock();
            let ret = nvm.erase(addr, pages);
            nvm.lock();

            debug!("nvm erase: {} +{}", addr, len);
            pkt.data.clear();
            if let Err(status) = ret {
                unwrap!(pkt.data.push(status.into_u8()).ok());
            }
        }
        (Some(0x00), 6) => {
            let addr = u32::from_le_bytes(unwrap!(pkt.data[1..5].try_into().ok()));
            let len = usize::from(pkt.data[5]);
            // Whole aligned words, truncated afterwards to the request.
            let cnt = len.div_ceil(WORD).min(MAX_PACKET_PAYLOAD / WORD);

            pkt.data.clear();
            for i in 0..cnt {
                let word = nvm.read_word(addr + (i * WORD) as u32);
                unwrap!(pkt.data.extend_from_slice(&word.to_le_bytes()).ok());
            }
            pkt.data.truncate((cnt * WORD).min(len));
            debug!("nvm read: {} len {}", addr, pkt.data.len());
        }
        (Some(0x01), len) if len > 5 => {
            let addr = u32::from_le_bytes(unwrap!(pkt.data[1..5].try_into().ok()));

            nvm.unlock();
            let mut ret = Ok(());
            for (i, chunk) in pkt.data[5..].chunks(WORD).enumerate() {
                let mut word = [NVM_PAD; WORD];
                word[..chunk.len()].copy_from_slice(chunk);
                ret = nvm.program_word(addr + (i * WORD) as u32, u32::from_le_bytes(word));
                if ret.is_err() {
                    break;
                }
            }
            nvm.lock();

            debug!("nvm write: {} len {}", addr, len - 5);
            pkt.data.clear();
            if let Err(status) = ret {
                unwrap!(pkt.data.push(status.into_u8()).ok());
            }
        }
        _ => {
            warn!("nvm: wrong cmd, len {}", pkt.data.len());
            return Err(pkt);
        }
    }

    pkt.exchange_src_dst(net.local_addr());
    Ok(pkt)
}

/// Port 21: raw report stream configuration.
///
/// Payload `[flags][rpt_mac][net][mac]`: flag bit 7 enables the stream,
/// bits 5:4 select multi-net/multicast, bit 3 enables sequencing, bits 1:0
/// pick the addressing level.
fn raw_conf<N: NetLink>(mut pkt: Packet, cfg: &mut BridgeConfig, net: &N) -> Result<Packet, Packet> {
    if pkt.data.len() != 4 {
        warn!("raw_conf: wrong len {}", pkt.data.len());
        return Err(pkt);
    }

    let flags = pkt.data[0];
    cfg.rpt_en = flags & 0x80 != 0;
    cfg.rpt_multi_net = flags & 0x10 != 0;
    cfg.rpt_multicast = flags & 0x20 != 0;
    cfg.rpt_seq = flags & 0x08 != 0;
    cfg.rpt_level = Level::from_u8_truncating(flags & 0x03);
    cfg.rpt_mac = Mac::new(pkt.data[1]);
    cfg.rpt_dst = NetAddr::new(pkt.data[2], Mac::new(pkt.data[3]));

    debug!(
        "raw_conf: en {}, mac {}, lev {}",
        cfg.rpt_en,
        cfg.rpt_mac.into_u8(),
        cfg.rpt_level.into_u8()
    );

    pkt.data.clear();
    pkt.exchange_src_dst(net.local_addr());
    Ok(pkt)
}
