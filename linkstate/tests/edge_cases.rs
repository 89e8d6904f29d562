mod common;

use std::cell::Cell;
use std::net::Ipv4Addr;
use std::rc::Rc;
use std::time::Duration;

use linkstate::concepts::link::LinkKey;
use linkstate::concepts::packet::{
    encode_packet, HelloGroup, HelloMessage, LinkCode, LinkType, MessageBody, MessageHeader,
    NeighbourType, PacketHeader,
};
use linkstate::concepts::prefix::Prefix;
use linkstate::concepts::route::RouteOp;
use linkstate::cursor::Cursor;
use linkstate::framework::{InterfaceConfig, ProtocolParams};
use linkstate::metric::{EtxFf, HopCount, LqSamples, LqTuple, LQ_FF_QUICKSTART_INIT};
use linkstate::router::{InboundMessage, MessageFilter, Router};
use linkstate::util::encode_vtime;

use common::graphs::{hop_count, vnet_line, vnet_short_line};
use common::virtual_network::{addr, init_logging, VirtualNet, VirtualNetwork};

#[test]
fn broken_link_removes_routes() {
    let mut network = vnet_short_line(hop_count());
    network.run_for(Duration::from_secs(30));
    assert_eq!(network.get_next_hop(1, 3), 2);
    network.get_node(1).kernel_ops.clear();

    network.set_link(2, 3, false);
    network.run_for(Duration::from_secs(45));

    assert!(network.route(1, 3).is_none());
    assert!(network.route(2, 3).is_none());
    assert_eq!(network.get_next_hop(1, 2), 2);
    assert!(network.routers[&1]
        .kernel_ops
        .iter()
        .any(|op| op.op == RouteOp::Delete && op.prefix == Prefix::host(addr(3))));
    assert!(!network.routers[&2].neighbours.contains_key(&addr(3)));
}

#[test]
fn healed_link_restores_routes() {
    let mut network = vnet_short_line(hop_count());
    network.run_for(Duration::from_secs(30));
    network.set_link(2, 3, false);
    network.run_for(Duration::from_secs(45));
    assert!(network.route(1, 3).is_none());

    network.set_link(2, 3, true);
    network.run_for(Duration::from_secs(30));
    assert_eq!(network.get_next_hop(1, 3), 2);
    assert_eq!(network.get_hops_to(1, 3), 2);
}

#[test]
fn removing_the_interface_flushes_routes() {
    let mut network = vnet_line(hop_count());
    network.run_for(Duration::from_secs(40));
    let now = network.now;
    let router = network.get_node(1);
    assert!(!router.routes.is_empty());
    router.kernel_ops.clear();

    let config = router.remove_interface(now, &0).unwrap();
    assert_eq!(config.address, addr(1));
    assert!(router.remove_interface(now, &0).is_err());
    assert_eq!(router.router_id(), None);
    assert!(router.links.is_empty());
    assert!(router.neighbours.is_empty());

    router.tick(now + 2_000);
    assert!(router.routes.is_empty());
    assert_eq!(
        router
            .kernel_ops
            .iter()
            .filter(|op| op.op == RouteOp::Delete)
            .count(),
        3
    );
}

#[test]
fn neighbours_follow_a_router_id_change() {
    let mut network = VirtualNetwork::create(&[1, 2], &[(1, 2)], hop_count());
    network.run_for(Duration::from_secs(30));
    assert_eq!(network.get_next_hop(1, 2), 2);

    let now = network.now;
    network.get_node(2).set_router_id(now, Some(addr(99)));
    network.run_for(Duration::from_secs(90));

    let router = &network.routers[&1];
    assert!(router.links.values().all(|l| l.neighbour == addr(99)));
    assert!(!router.neighbours.contains_key(&addr(2)));
    assert!(router.neighbours[&addr(99)].is_sym);
    assert_eq!(network.get_next_hop(1, 99), 2);
    assert_eq!(network.get_hops_to(1, 99), 1);

    // the interface address stays reachable, now through the new id
    let interface = network.route(1, 2).expect("interface address lost");
    assert_eq!(interface.best_path().unwrap().originator, addr(99));

    let back = &network.routers[&2].neighbours[&addr(1)];
    assert!(back.is_sym);
    assert_eq!(network.get_next_hop(2, 1), 1);
}

#[test]
fn lost_link_code_restarts_the_measurement() {
    init_logging();
    let mut router: Router<VirtualNet> = Router::with_config(ProtocolParams {
        jitter_seed: Some(4),
        ..Default::default()
    });
    router.add_interface(0, InterfaceConfig::new(0, addr(1))).unwrap();
    let metric = EtxFf::new(1);
    let hello = |link: LinkType, seqno: u16| {
        let header = MessageHeader {
            msg_type: 0,
            vtime: encode_vtime(Duration::from_secs(20)),
            size: 0,
            originator: addr(2),
            ttl: 1,
            hop_count: 0,
            seqno,
        };
        let body = MessageBody::Hello(HelloMessage {
            htime: encode_vtime(Duration::from_secs(1)),
            willingness: 3,
            groups: vec![HelloGroup {
                code: LinkCode::new(link, NeighbourType::Sym),
                neighbours: vec![(addr(1), LqTuple::new(255, 255))],
            }],
        });
        encode_packet(seqno, &body.encode(&header, &metric).unwrap()).unwrap()
    };

    for seqno in 0..5u16 {
        let now = 1_000 * seqno as u64 + 10;
        router.tick(now);
        router.handle_datagram(now, &0, addr(2), &hello(LinkType::Sym, seqno));
    }
    router.tick(5_500);
    let key = LinkKey {
        interface: 0,
        remote: addr(2),
    };
    assert!(router.links[&key].is_symmetric());
    assert!(router.links[&key].lq.tuple.lq > 0);

    router.handle_datagram(5_600, &0, addr(2), &hello(LinkType::Lost, 5));
    let link = &router.links[&key];
    assert!(!link.is_symmetric());
    assert_eq!(link.lq.tuple.lq, 0);
    match &link.lq.samples {
        LqSamples::Window(window) => {
            assert_eq!(window.window_size, LQ_FF_QUICKSTART_INIT);
            assert_eq!(window.last_seqno, None);
        }
        other => panic!("unexpected samples {other:?}"),
    }
}

#[test]
fn crowded_tc_is_split() {
    init_logging();
    let mut router: Router<VirtualNet> = Router::with_config(ProtocolParams {
        jitter_seed: Some(2),
        ..hop_count()
    });
    // 48 bytes per datagram: a TC header and four neighbours
    let mut config = InterfaceConfig::new(0, addr(1));
    config.mtu = 80;
    router.add_interface(0, config).unwrap();

    for n in 2..=6u8 {
        let header = MessageHeader {
            msg_type: 0,
            vtime: encode_vtime(Duration::from_secs(60)),
            size: 0,
            originator: addr(n),
            ttl: 1,
            hop_count: 0,
            seqno: 1,
        };
        let hello = MessageBody::Hello(HelloMessage {
            htime: encode_vtime(Duration::from_secs(2)),
            willingness: 3,
            groups: vec![HelloGroup {
                code: LinkCode::new(LinkType::Sym, NeighbourType::Sym),
                neighbours: vec![(addr(1), LqTuple::new(255, 255))],
            }],
        })
        .encode(&header, &HopCount)
        .unwrap();
        router.handle_datagram(10, &0, addr(n), &encode_packet(1, &hello).unwrap());
    }
    assert_eq!(router.neighbours.values().filter(|n| n.is_sym).count(), 5);

    for now in (100..=6_000).step_by(100) {
        router.tick(now);
    }
    let mut tcs = Vec::new();
    for packet in &router.outbound_packets {
        let mut cursor = Cursor::new(&packet.data);
        PacketHeader::read(&mut cursor).unwrap();
        while !cursor.is_eof() {
            let header = MessageHeader::<Ipv4Addr>::read(&mut cursor).unwrap();
            let len = header.size as usize - MessageHeader::<Ipv4Addr>::len();
            let mut body = cursor.sub_cursor(len).unwrap();
            if let Some(MessageBody::Tc(tc)) = MessageBody::<Ipv4Addr>::read(header.msg_type, &mut body, &HopCount).unwrap() {
                tcs.push(tc);
            }
        }
    }
    assert_eq!(tcs.iter().map(|tc| tc.neighbours.len()).collect::<Vec<_>>(), vec![4, 1]);
    assert_eq!(tcs[0].ansn, tcs[1].ansn);
}

#[test]
fn router_id_follows_the_interfaces() {
    init_logging();
    let mut router: Router<VirtualNet> = Router::with_config(ProtocolParams {
        jitter_seed: Some(3),
        ..hop_count()
    });
    assert_eq!(router.router_id(), None);

    router.add_interface(0, InterfaceConfig::new(5, addr(50))).unwrap();
    assert_eq!(router.router_id(), Some(addr(50)));
    assert!(router.add_interface(0, InterfaceConfig::new(5, addr(51))).is_err());

    // the lowest interface id wins
    router.add_interface(0, InterfaceConfig::new(1, addr(10))).unwrap();
    assert_eq!(router.router_id(), Some(addr(10)));

    router.set_router_id(0, Some(addr(99)));
    assert_eq!(router.router_id(), Some(addr(99)));
    assert!(router.local_addresses().contains(&addr(99)));

    router.set_router_id(0, None);
    assert_eq!(router.router_id(), Some(addr(10)));
}

fn counting_router() -> (Router<VirtualNet>, Rc<Cell<u32>>) {
    init_logging();
    let mut router = Router::with_config(ProtocolParams {
        jitter_seed: Some(1),
        ..hop_count()
    });
    router.add_interface(0, InterfaceConfig::new(0, addr(1))).unwrap();
    let seen = Rc::new(Cell::new(0));
    let counter = seen.clone();
    router.register_handler(
        MessageFilter::Promiscuous,
        Box::new(move |_: &InboundMessage<'_, VirtualNet>| counter.set(counter.get() + 1)),
    );
    (router, seen)
}

fn mid(originator: Ipv4Addr, ttl: u8, hop_count: u8, seqno: u16) -> Vec<u8> {
    let header = MessageHeader {
        msg_type: 0,
        vtime: 0x48,
        size: 0,
        originator,
        ttl,
        hop_count,
        seqno,
    };
    MessageBody::Mid(vec![Ipv4Addr::new(10, 1, 0, 7)])
        .encode(&header, &HopCount)
        .unwrap()
}

#[test]
fn accepts_a_valid_message() {
    let (mut router, seen) = counting_router();
    let packet = encode_packet(1, &mid(addr(7), 255, 0, 1)).unwrap();
    router.handle_datagram(10, &0, addr(2), &packet);
    assert_eq!(seen.get(), 1);
}

#[test]
fn malformed_packets_are_dropped() {
    let (mut router, seen) = counting_router();
    let message = mid(addr(7), 255, 0, 1);

    // shorter than a packet header
    router.handle_datagram(10, &0, addr(2), &[0, 4]);

    // declared size does not match the datagram
    let mut packet = encode_packet(1, &message).unwrap();
    packet.push(0);
    router.handle_datagram(10, &0, addr(2), &packet);

    // a message claiming more bytes than the packet has left
    let mut truncated = message.clone();
    truncated[3] += 8;
    router.handle_datagram(10, &0, addr(2), &encode_packet(2, &truncated).unwrap());

    // zero sized message
    let mut empty = message.clone();
    empty[2] = 0;
    empty[3] = 0;
    router.handle_datagram(10, &0, addr(2), &encode_packet(3, &empty).unwrap());

    // unknown interface
    router.handle_datagram(10, &7, addr(2), &encode_packet(4, &message).unwrap());

    assert_eq!(seen.get(), 0);
}

#[test]
fn invalid_messages_are_skipped() {
    let (mut router, seen) = counting_router();
    let messages = [
        // our own
        mid(addr(1), 255, 0, 1),
        // not a usable originator
        mid(Ipv4Addr::UNSPECIFIED, 255, 0, 1),
        mid(Ipv4Addr::new(224, 0, 0, 1), 255, 0, 1),
        // expired or impossible hop counts
        mid(addr(7), 0, 3, 1),
        mid(addr(7), 200, 100, 2),
    ];
    for (seqno, message) in messages.iter().enumerate() {
        let packet = encode_packet(seqno as u16, message).unwrap();
        router.handle_datagram(10, &0, addr(2), &packet);
    }
    assert_eq!(seen.get(), 0);

    // a later valid message in the same packet is still handled
    let mut batch = mid(addr(1), 255, 0, 1);
    batch.extend(mid(addr(7), 255, 0, 9));
    router.handle_datagram(20, &0, addr(2), &encode_packet(9, &batch).unwrap());
    assert_eq!(seen.get(), 1);
}

#[test]
fn duplicate_sweep_forgets_old_entries() {
    let (mut router, seen) = counting_router();
    let packet = encode_packet(1, &mid(addr(7), 255, 0, 1)).unwrap();
    router.handle_datagram(10, &0, addr(2), &packet);
    router.handle_datagram(20, &0, addr(2), &packet);
    assert_eq!(seen.get(), 1);

    // past the hold time the same sequence number is new again
    let hold = router.params.dup_hold_time.as_millis() as u64;
    router.tick(3 * hold);
    router.handle_datagram(3 * hold + 10, &0, addr(2), &packet);
    assert_eq!(seen.get(), 2);
}
