//! Raw-mode packet aggregator
//!
//! Accumulates the host byte stream into CDNET packets toward the configured
//! report peer. Packet boundaries carry no meaning in raw mode; the
//! aggregator trades boundary fidelity for bounded latency: a span of bytes
//! is never held longer than the configured quiet period.

use crate::config::BridgeConfig;
use crate::core::{Port, MAX_PACKET_PAYLOAD};
use crate::link::NetLink;
use crate::packet::Packet;
use crate::pool::Pool;
use crate::time::Instant;
use embassy_sync::blocking_mutex::raw::RawMutex;

pub struct RawAggregator {
    pending: Option<Packet>,
    t_last: Instant,
}

impl RawAggregator {
    pub fn new() -> Self {
        Self {
            pending: None,
            t_last: Instant::MIN,
        }
    }

    /// Consumes one span of host bytes; call with an empty span to run the
    /// quiet-period check when nothing arrived this iteration.
    ///
    /// Packets are acquired lazily and addressed from the current
    /// configuration; a full packet (243 bytes) flushes immediately, a
    /// partial one flushes after `cfg.raw_flush_idle` of silence. Disabled
    /// entirely until the report stream is configured on.
    pub fn poll<M, N, const PN: usize>(
        &mut self,
        mut bytes: &[u8],
        now: Instant,
        cfg: &BridgeConfig,
        pool: &Pool<M, Packet, PN>,
        net: &mut N,
    ) where
        M: RawMutex,
        N: NetLink,
    {
        if !cfg.rpt_en {
            // Disabling reporting also voids whatever was accumulated.
            if let Some(pkt) = self.pending.take() {
                pool.release(pkt);
            }
            if !bytes.is_empty() {
                warn!("raw <- host: rpt_en disabled, drop {}", bytes.len());
            }
            return;
        }

        if bytes.is_empty() {
            let idle = match &self.pending {
                Some(pkt) if !pkt.data.is_empty() => now > self.t_last + cfg.raw_flush_idle,
                _ => false,
            };
            if idle {
                let pkt = unwrap!(self.pending.take());
                self.flush(pkt, pool, net);
            }
            return;
        }

        while !bytes.is_empty() {
            let mut pkt = match self.pending.take() {
                Some(pkt) => pkt,
                None => match pool.acquire() {
                    Some(pkt) => Self::address(pkt, cfg, net),
                    None => {
                        error!("raw <- host: no free pkt, drop {}", bytes.len());
                        return;
                    }
                },
            };

            self.t_last = now;
            let cpy_len = (MAX_PACKET_PAYLOAD - pkt.data.len()).min(bytes.len());
            unwrap!(pkt.data.extend_from_slice(&bytes[..cpy_len]).ok());
            bytes = &bytes[cpy_len..];

            if pkt.data.len() == MAX_PACKET_PAYLOAD {
                self.flush(pkt, pool, net);
            } else {
                self.pending = Some(pkt);
            }
        }
    }

    /// Stamps a fresh packet with the report flow parameters.
    fn address<N: NetLink>(mut pkt: Packet, cfg: &BridgeConfig, net: &N) -> Packet {
        pkt.level = cfg.rpt_level;
        pkt.seq = cfg.rpt_seq;
        pkt.multi_net = cfg.rpt_multi_net;
        pkt.multicast = cfg.rpt_multicast;
        pkt.fill_src_addr(net.local_addr());
        pkt.dst = cfg.rpt_dst;
        pkt.dst_mac = cfg.rpt_mac;
        pkt.src_port = Port::DEF;
        pkt.dst_port = Port::RAW_SER;
        pkt.data.clear();
        pkt
    }

    fn flush<M, N, const PN: usize>(&mut self, pkt: Packet, pool: &Pool<M, Packet, PN>, net: &mut N)
    where
        M: RawMutex,
        N: NetLink,
    {
        trace!("raw <- host: flush len {}", pkt.data.len());
        if let Err(pkt) = net.push_tx(pkt) {
            warn!("raw <- host: net tx full");
            pool.release(pkt);
        }
    }
}

impl Default for RawAggregator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex as TestMutex;
    use heapless::Deque;

    use crate::core::{Level, Mac, NetAddr};
    use crate::time::Duration;

    struct TestNet {
        local: NetAddr,
        tx: Deque<Packet, 8>,
    }

    impl TestNet {
        fn new() -> Self {
            Self {
                local: NetAddr::new(0, Mac::new(1)),
                tx: Deque::new(),
            }
        }
    }

    impl NetLink for TestNet {
        fn poll_rx(&mut self) {}
        fn poll_tx(&mut self) {}
        fn pop_rx(&mut self) -> Option<Packet> {
            None
        }
        fn push_tx(&mut self, pkt: Packet) -> Result<(), Packet> {
            self.tx.push_back(pkt)
        }
        fn local_addr(&self) -> NetAddr {
            self.local
        }
        fn set_local_mac(&mut self, mac: Mac) {
            self.local.mac = mac;
        }
        fn set_local_net(&mut self, net: u8) {
            self.local.net = net;
        }
    }

    fn cfg_enabled() -> BridgeConfig {
        BridgeConfig {
            rpt_en: true,
            rpt_dst: NetAddr::new(0, Mac::new(2)),
            rpt_mac: Mac::new(2),
            rpt_level: Level::L0,
            ..Default::default()
        }
    }

    fn ts(us: u64) -> Instant {
        Instant::MIN + Duration::from_micros(us)
    }

    #[test]
    fn test_full_packets_flush_immediately() {
        let pool: Pool<TestMutex, Packet, 4> = Pool::new();
        let mut net = TestNet::new();
        let mut agg = RawAggregator::new();
        let cfg = cfg_enabled();

        let data = [0x5a; MAX_PACKET_PAYLOAD * 2];
        agg.poll(&data, ts(0), &cfg, &pool, &mut net);

        assert_eq!(net.tx.len(), 2);
        for _ in 0..2 {
            let pkt = net.tx.pop_front().unwrap();
            assert_eq!(pkt.data.len(), MAX_PACKET_PAYLOAD);
            assert_eq!(pkt.dst_port, Port::RAW_SER);
            assert_eq!(pkt.src_port, Port::DEF);
            assert_eq!(pkt.dst_mac, Mac::new(2));
        }
    }

    #[test]
    fn test_partial_packet_flushes_on_idle() {
        let pool: Pool<TestMutex, Packet, 4> = Pool::new();
        let mut net = TestNet::new();
        let mut agg = RawAggregator::new();
        let cfg = cfg_enabled();

        agg.poll(&[1, 2, 3], ts(0), &cfg, &pool, &mut net);
        assert!(net.tx.is_empty());

        // Quiet period not yet over.
        agg.poll(&[], ts(1_000), &cfg, &pool, &mut net);
        assert!(net.tx.is_empty());

        agg.poll(&[], ts(10_000), &cfg, &pool, &mut net);
        let pkt = net.tx.pop_front().unwrap();
        assert_eq!(&pkt.data[..], &[1, 2, 3]);
    }

    #[test]
    fn test_disabled_drops_bytes() {
        let pool: Pool<TestMutex, Packet, 4> = Pool::new();
        let mut net = TestNet::new();
        let mut agg = RawAggregator::new();
        let cfg = BridgeConfig::default();

        agg.poll(&[1, 2, 3], ts(0), &cfg, &pool, &mut net);
        agg.poll(&[], ts(10_000), &cfg, &pool, &mut net);
        assert!(net.tx.is_empty());
        assert_eq!(pool.free_count(), 4);
    }

    #[test]
    fn test_disable_discards_pending() {
        let pool: Pool<TestMutex, Packet, 4> = Pool::new();
        let mut net = TestNet::new();
        let mut agg = RawAggregator::new();
        let mut cfg = cfg_enabled();

        agg.poll(&[1, 2, 3], ts(0), &cfg, &pool, &mut net);
        assert_eq!(pool.free_count(), 3);

        // Turning the stream off voids the partial packet; the idle timer
        // must not flush it later.
        cfg.rpt_en = false;
        agg.poll(&[], ts(50_000), &cfg, &pool, &mut net);
        assert!(net.tx.is_empty());
        assert_eq!(pool.free_count(), 4);

        cfg.rpt_en = true;
        agg.poll(&[], ts(100_000), &cfg, &pool, &mut net);
        assert!(net.tx.is_empty());
    }

    #[test]
    fn test_pool_exhaustion_drops() {
        let pool: Pool<TestMutex, Packet, 1> = Pool::new();
        let held = pool.acquire().unwrap();
        let mut net = TestNet::new();
        let mut agg = RawAggregator::new();
        let cfg = cfg_enabled();

        agg.poll(&[1, 2, 3], ts(0), &cfg, &pool, &mut net);
        assert!(net.tx.is_empty());
        pool.release(held);
    }
}
