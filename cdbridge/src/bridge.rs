//! Cooperative bridge controller
//!
//! Ties the pipeline stages together behind one non-blocking `poll` call,
//! meant to run from the firmware main loop. Frame and packet pools and the
//! host-ward frame queue live outside the controller (typically in statics
//! shared with the driver interrupt handlers); the controller borrows them.

use embassy_sync::blocking_mutex::raw::RawMutex;

use crate::aggregate::RawAggregator;
use crate::config::{BridgeConfig, Mode};
use crate::core::{Level, Port};
use crate::deframe::Deframer;
use crate::frame::Frame;
use crate::link::{BusLink, HostTx, NetLink};
use crate::mux::HostMux;
use crate::nvm::Nvm;
use crate::packet::Packet;
use crate::pool::{Pool, Queue};
use crate::service;
use crate::time::Instant;

/// Free frames shared by the deframer, the bus driver, and the multiplexer.
pub const FRAME_POOL: usize = 10;
/// Free packets shared by the network link, the aggregator, and the services.
pub const PACKET_POOL: usize = 10;
/// Host-ward frames queued by the platform (local replies, diagnostics).
pub const HOST_FRAMES: usize = 10;

const RAW_HOST: usize = 4;

pub struct Bridge<'a, M, B, N, H, V>
where
    M: RawMutex,
{
    cfg: BridgeConfig,
    deframer: Deframer,
    aggregator: RawAggregator,
    mux: HostMux<M>,
    /// Port-20 tunnel packets waiting for host serialization.
    raw_host: Queue<M, Packet, RAW_HOST>,

    frame_pool: &'a Pool<M, Frame, FRAME_POOL>,
    packet_pool: &'a Pool<M, Packet, PACKET_POOL>,
    host_frames: &'a Queue<M, Frame, HOST_FRAMES>,

    bus: B,
    net: N,
    host: H,
    nvm: V,
}

impl<'a, M, B, N, H, V> Bridge<'a, M, B, N, H, V>
where
    M: RawMutex,
    B: BusLink,
    N: NetLink,
    H: HostTx,
    V: Nvm,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        cfg: BridgeConfig,
        bus: B,
        net: N,
        host: H,
        nvm: V,
        frame_pool: &'a Pool<M, Frame, FRAME_POOL>,
        packet_pool: &'a Pool<M, Packet, PACKET_POOL>,
        host_frames: &'a Queue<M, Frame, HOST_FRAMES>,
    ) -> Self {
        info!("bridge: mode {}, mac {}", cfg.mode as u8, cfg.local.mac.into_u8());
        Self {
            cfg,
            deframer: Deframer::new(),
            aggregator: RawAggregator::new(),
            mux: HostMux::new(),
            raw_host: Queue::new(),
            frame_pool,
            packet_pool,
            host_frames,
            bus,
            net,
            host,
            nvm,
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.cfg
    }

    pub fn config_mut(&mut self) -> &mut BridgeConfig {
        &mut self.cfg
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    pub fn net_mut(&mut self) -> &mut N {
        &mut self.net
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// Runs one cooperative iteration. Never blocks.
    ///
    /// `rx` is the span of host bytes received since the previous call; pass
    /// an empty span when nothing arrived so the idle flush and resync
    /// timers still run. `now` is sampled once by the caller per iteration.
    pub fn poll(&mut self, now: Instant, rx: &[u8]) {
        self.poll_net();

        match self.cfg.mode {
            Mode::Raw => {
                self.aggregator
                    .poll(rx, now, &self.cfg, self.packet_pool, &mut self.net);
            }
            Mode::Bridge | Mode::PassThru => {
                self.deframer
                    .feed(rx, now, &self.cfg, self.frame_pool, &mut self.bus);
            }
        }

        self.mux.poll_fill(
            &self.cfg,
            &mut self.bus,
            self.host_frames,
            &self.raw_host,
            self.frame_pool,
            self.packet_pool,
        );
        self.mux.poll_tx(&mut self.host);
    }

    fn poll_net(&mut self) {
        self.net.poll_rx();
        if let Some(pkt) = self.net.pop_rx() {
            self.handle_packet(pkt);
        }
        self.net.poll_tx();
    }

    /// Gates and routes one inbound network packet.
    ///
    /// Only level 0/1 request traffic from a regular client port to a
    /// reserved service port is accepted; port 20 bypasses the dispatcher
    /// and feeds the raw host stream.
    fn handle_packet(&mut self, pkt: Packet) {
        if pkt.level == Level::L2 || pkt.src_port.is_system() || !pkt.dst_port.is_system() {
            warn!(
                "bridge <- net: wrong port {} -> {}",
                pkt.src_port.into_u16(),
                pkt.dst_port.into_u16()
            );
            self.packet_pool.release(pkt);
            return;
        }

        if pkt.dst_port == Port::RAW_SER {
            if self.cfg.mode != Mode::Raw {
                warn!("bridge <- net: raw tunnel outside raw mode");
                self.packet_pool.release(pkt);
            } else if let Err(pkt) = self.raw_host.push_back(pkt) {
                warn!("bridge <- net: raw host queue full");
                self.packet_pool.release(pkt);
            }
            return;
        }

        match service::dispatch(pkt, &mut self.cfg, &mut self.bus, &mut self.net, &mut self.nvm) {
            Ok(reply) => {
                if let Err(reply) = self.net.push_tx(reply) {
                    warn!("bridge -> net: tx full, drop reply");
                    self.packet_pool.release(reply);
                }
            }
            Err(pkt) => self.packet_pool.release(pkt),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex as TestMutex;
    use heapless::Deque;

    use crate::core::{Mac, NetAddr};
    use crate::link::SendError;
    use crate::nvm::NvmStatus;
    use crate::time::Duration;

    struct TestBus {
        filter: Mac,
        tx: Deque<Frame, 8>,
        rx: Deque<Frame, 8>,
    }

    impl TestBus {
        fn new() -> Self {
            Self {
                filter: Mac::new(254),
                tx: Deque::new(),
                rx: Deque::new(),
            }
        }
    }

    impl BusLink for TestBus {
        fn push_tx(&mut self, frame: Frame) -> Result<(), Frame> {
            self.tx.push_back(frame)
        }
        fn pop_rx(&mut self) -> Option<Frame> {
            self.rx.pop_front()
        }
        fn set_filter(&mut self, mac: Mac) {
            self.filter = mac;
        }
        fn filter(&self) -> Mac {
            self.filter
        }
    }

    struct TestNet {
        local: NetAddr,
        rx: Deque<Packet, 8>,
        tx: Deque<Packet, 8>,
    }

    impl TestNet {
        fn new() -> Self {
            Self {
                local: NetAddr::new(0, Mac::new(254)),
                rx: Deque::new(),
                tx: Deque::new(),
            }
        }
    }

    impl NetLink for TestNet {
        fn poll_rx(&mut self) {}
        fn poll_tx(&mut self) {}
        fn pop_rx(&mut self) -> Option<Packet> {
            self.rx.pop_front()
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

    struct TestHost;

    impl HostTx for TestHost {
        fn is_busy(&self) -> bool {
            false
        }
        fn send(&mut self, _bytes: &[u8]) -> Result<(), SendError> {
            Ok(())
        }
    }

    struct TestNvm;

    impl Nvm for TestNvm {
        fn page_size(&self) -> u32 {
            1024
        }
        fn unlock(&mut self) {}
        fn lock(&mut self) {}
        fn erase(&mut self, _page_addr: u32, _pages: u32) -> Result<(), NvmStatus> {
            Ok(())
        }
        fn program_word(&mut self, _addr: u32, _word: u32) -> Result<(), NvmStatus> {
            Ok(())
        }
        fn read_word(&self, _addr: u32) -> u32 {
            0
        }
    }

    fn ts(us: u64) -> Instant {
        Instant::MIN + Duration::from_micros(us)
    }

    fn request(pool: &Pool<TestMutex, Packet, PACKET_POOL>, dst_port: Port) -> Packet {
        let mut pkt = pool.acquire().unwrap();
        pkt.level = Level::L0;
        pkt.src = NetAddr::new(0, Mac::new(10));
        pkt.src_mac = Mac::new(10);
        pkt.src_port = Port::DEF;
        pkt.dst_port = dst_port;
        pkt.data.clear();
        pkt
    }

    #[test]
    fn test_service_round_trip() {
        let frame_pool = Pool::new();
        let packet_pool = Pool::new();
        let host_frames = Queue::new();
        let mut net = TestNet::new();

        net.rx.push_back(request(&packet_pool, Port::IDENTIFY)).unwrap();
        let mut bridge: Bridge<TestMutex, _, _, _, _> = Bridge::new(
            BridgeConfig::default(),
            TestBus::new(),
            net,
            TestHost,
            TestNvm,
            &frame_pool,
            &packet_pool,
            &host_frames,
        );

        bridge.poll(ts(0), &[]);

        let reply = bridge.net_mut().tx.pop_front().unwrap();
        assert_eq!(reply.src_port, Port::IDENTIFY);
        assert_eq!(reply.dst_mac, Mac::new(10));
        assert!(reply.data.starts_with(b"M: cdbus_bridge"));
    }

    #[test]
    fn test_port_gate_releases_packet() {
        let frame_pool = Pool::new();
        let packet_pool: Pool<TestMutex, Packet, PACKET_POOL> = Pool::new();
        let host_frames = Queue::new();
        let mut net = TestNet::new();

        // Client-to-client traffic is not the bridge's business.
        let mut pkt = request(&packet_pool, Port::DEF);
        pkt.src_port = Port::DEF;
        net.rx.push_back(pkt).unwrap();
        // Replies must not be dispatched as requests either.
        let mut pkt = request(&packet_pool, Port::IDENTIFY);
        pkt.src_port = Port::new(5);
        net.rx.push_back(pkt).unwrap();

        let mut bridge: Bridge<TestMutex, _, _, _, _> = Bridge::new(
            BridgeConfig::default(),
            TestBus::new(),
            net,
            TestHost,
            TestNvm,
            &frame_pool,
            &packet_pool,
            &host_frames,
        );

        bridge.poll(ts(0), &[]);
        bridge.poll(ts(100), &[]);

        assert!(bridge.net_mut().tx.is_empty());
        assert_eq!(packet_pool.free_count(), PACKET_POOL);
    }

    #[test]
    fn test_raw_tunnel_requires_raw_mode() {
        let frame_pool = Pool::new();
        let packet_pool: Pool<TestMutex, Packet, PACKET_POOL> = Pool::new();
        let host_frames = Queue::new();
        let mut net = TestNet::new();

        let mut pkt = request(&packet_pool, Port::RAW_SER);
        pkt.data.extend_from_slice(&[1, 2, 3]).unwrap();
        net.rx.push_back(pkt).unwrap();

        let mut bridge: Bridge<TestMutex, _, _, _, _> = Bridge::new(
            BridgeConfig::default(),
            TestBus::new(),
            net,
            TestHost,
            TestNvm,
            &frame_pool,
            &packet_pool,
            &host_frames,
        );

        bridge.poll(ts(0), &[]);
        assert_eq!(packet_pool.free_count(), PACKET_POOL);
    }

    #[test]
    fn test_host_stream_reaches_bus() {
        let frame_pool: Pool<TestMutex, Frame, FRAME_POOL> = Pool::new();
        let packet_pool = Pool::new();
        let host_frames = Queue::new();

        let mut bridge: Bridge<TestMutex, _, _, _, _> = Bridge::new(
            BridgeConfig::default(),
            TestBus::new(),
            TestNet::new(),
            TestHost,
            TestNvm,
            &frame_pool,
            &packet_pool,
            &host_frames,
        );

        // [0xAA][0x56][02][src 01][dst 02][crc]
        let mut wire = heapless::Vec::<u8, 16>::new();
        wire.extend_from_slice(&[0xaa, 0x56, 0x02, 0x01, 0x02]).unwrap();
        let crc = crate::core::Crc16::sum(&wire);
        wire.extend_from_slice(&crc.to_le_bytes()).unwrap();

        bridge.poll(ts(0), &wire);

        let frame = bridge.bus_mut().tx.pop_front().unwrap();
        assert_eq!(frame.src, Mac::new(0x01));
        assert_eq!(frame.dst, Mac::new(0x02));
        assert!(frame.data.is_empty());
    }
}
