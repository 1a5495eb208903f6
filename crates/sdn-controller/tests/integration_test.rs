//! Integration tests for the controller with a simulated network
//!
//! These tests drive the ControllerDaemon with topology, host and packet-in
//! events and check the rules and frames it sends to the devices.

use pretty_assertions::assert_eq;
use sdn_controller::daemon::{ControllerDaemon, ControllerDaemonConfig, ControllerEvent, DaemonError};
use sdn_controller::flow::{
    AddressResolver, FlowAction, FlowError, FlowMatch, FlowProgrammer, FlowRule, HostTracker,
    PacketEmitter, TopologyProvider, DEFAULT_PRIORITY, IDLE_TIMEOUT_SECS, MAX_PRIORITY, NO_TIMEOUT,
};
use sdn_controller::l3routing::{InstalledRuleRecord, L3RoutingOrch, RoutingConfig};
use sdn_controller::sim::StaticHostTracker;
use sdn_controller::loadbalancer::{
    build_instances, InstanceConfig, LoadBalancerCollaborators, LoadBalancerConfig, LoadBalancerOrch,
};
use sdn_controller::packet::{
    encode_arp, encode_tcp_segment, parse_frame, ArpFrame, ArpOp, PacketIn, ParsedPacket,
    TcpSegmentInfo,
};
use sdn_controller::topology::{Device, Host, HostChange, Link, TopologyChange};
use sdn_types::{DeviceId, MacAddress, PortNo, TableId};
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};

/// Mock network implementing every collaborator
///
/// Keeps a per-device flow table with OpenFlow add/delete semantics: adding
/// a rule with the same table, priority and match replaces it, deleting
/// removes every rule in the table with that exact match.
#[derive(Default)]
struct MockNetwork {
    devices: Mutex<Vec<Device>>,
    links: Mutex<Vec<Link>>,
    hosts: Mutex<Vec<Host>>,
    tables: Mutex<Vec<(DeviceId, FlowRule)>>,
    installs: Mutex<Vec<(DeviceId, FlowRule)>>,
    removals: Mutex<Vec<(DeviceId, TableId, FlowMatch)>>,
    sent: Mutex<Vec<(DeviceId, PortNo, Vec<u8>)>>,
}

impl MockNetwork {
    /// Rules currently in `device`'s `table`.
    fn rules(&self, device: DeviceId, table: TableId) -> Vec<FlowRule> {
        self.tables
            .lock()
            .unwrap()
            .iter()
            .filter(|(d, r)| *d == device && r.table == table)
            .map(|(_, r)| r.clone())
            .collect()
    }

    /// Output port of the route to `ip` on `device`, if one is installed.
    fn route(&self, device: DeviceId, ip: Ipv4Addr) -> Option<PortNo> {
        self.rules(device, routing_table())
            .into_iter()
            .find(|r| r.flow_match == FlowMatch::ipv4_dst(ip))
            .and_then(|r| {
                r.actions().find_map(|a| match a {
                    FlowAction::Output(p) => Some(*p),
                    _ => None,
                })
            })
    }

    /// Sorted textual dump of `device`'s `table`.
    fn dump(&self, device: DeviceId, table: TableId) -> Vec<String> {
        let mut lines: Vec<String> = self.rules(device, table).iter().map(|r| r.to_string()).collect();
        lines.sort();
        lines
    }

    fn take_installs(&self) -> Vec<(DeviceId, FlowRule)> {
        std::mem::take(&mut *self.installs.lock().unwrap())
    }

    fn take_sent(&self) -> Vec<(DeviceId, PortNo, Vec<u8>)> {
        std::mem::take(&mut *self.sent.lock().unwrap())
    }
}

impl TopologyProvider for MockNetwork {
    fn devices(&self) -> Vec<Device> {
        self.devices.lock().unwrap().clone()
    }

    fn links(&self) -> Vec<Link> {
        self.links.lock().unwrap().clone()
    }
}

impl HostTracker for MockNetwork {
    fn hosts(&self) -> Vec<Host> {
        self.hosts.lock().unwrap().clone()
    }
}

impl AddressResolver for MockNetwork {
    fn resolve_mac(&self, ip: Ipv4Addr) -> Option<MacAddress> {
        self.hosts
            .lock()
            .unwrap()
            .iter()
            .find(|h| h.ipv4 == Some(ip))
            .map(|h| h.mac)
    }
}

impl FlowProgrammer for MockNetwork {
    fn install(&self, device: DeviceId, rule: &FlowRule) -> Result<(), FlowError> {
        let mut tables = self.tables.lock().unwrap();
        tables.retain(|(d, r)| {
            !(*d == device
                && r.table == rule.table
                && r.priority == rule.priority
                && r.flow_match == rule.flow_match)
        });
        tables.push((device, rule.clone()));
        self.installs.lock().unwrap().push((device, rule.clone()));
        Ok(())
    }

    fn remove(&self, device: DeviceId, table: TableId, flow_match: &FlowMatch) -> Result<(), FlowError> {
        self.tables
            .lock()
            .unwrap()
            .retain(|(d, r)| !(*d == device && r.table == table && r.flow_match == *flow_match));
        self.removals
            .lock()
            .unwrap()
            .push((device, table, flow_match.clone()));
        Ok(())
    }
}

impl PacketEmitter for MockNetwork {
    fn send(&self, device: DeviceId, port: PortNo, frame: &[u8]) -> Result<(), FlowError> {
        self.sent.lock().unwrap().push((device, port, frame.to_vec()));
        Ok(())
    }
}

fn dev(id: u64) -> DeviceId {
    DeviceId::new(id)
}

fn port(p: u32) -> PortNo {
    PortNo::new(p)
}

fn ip(last: u8) -> Ipv4Addr {
    Ipv4Addr::new(10, 0, 0, last)
}

fn mac(last: u8) -> MacAddress {
    MacAddress::new([0, 0, 0, 0, 0, last])
}

fn lb_table() -> TableId {
    TableId::new(0)
}

fn routing_table() -> TableId {
    TableId::new(1)
}

fn vip() -> Ipv4Addr {
    ip(100)
}

fn host(last: u8, device: u64, p: u32) -> Host {
    Host::new(mac(last))
        .with_ipv4(ip(last))
        .attached_to(dev(device), port(p))
}

/// Line A(1) - B(2) - C(3). A port 2 faces B port 1, B port 2 faces C port 1.
/// Backends 10.0.0.1 on A port 3 and 10.0.0.2 on C port 3, client 10.0.0.5
/// on A port 4.
fn line_network() -> Arc<MockNetwork> {
    let network = MockNetwork::default();
    *network.devices.lock().unwrap() = vec![
        Device::new(dev(1)).with_ports([port(2), port(3), port(4)]),
        Device::new(dev(2)).with_ports([port(1), port(2)]),
        Device::new(dev(3)).with_ports([port(1), port(3)]),
    ];
    *network.links.lock().unwrap() = vec![
        Link::new(dev(1), port(2), dev(2), port(1)),
        Link::new(dev(2), port(2), dev(3), port(1)),
    ];
    *network.hosts.lock().unwrap() = vec![host(1, 1, 3), host(2, 3, 3), host(5, 1, 4)];
    Arc::new(network)
}

async fn start(network: &Arc<MockNetwork>) -> ControllerDaemon {
    start_with_hosts(network, network.clone()).await
}

async fn start_with_hosts(network: &Arc<MockNetwork>, hosts: Arc<dyn HostTracker>) -> ControllerDaemon {
    let instances = build_instances([InstanceConfig {
        virtual_ip: vip(),
        virtual_mac: mac(100),
        servers: vec![ip(1), ip(2)],
    }]);
    let routing = L3RoutingOrch::new(
        RoutingConfig {
            table: routing_table(),
            next_table: TableId::new(2),
            virtual_ips: vec![vip()],
        },
        network.clone(),
    );
    let loadbalancer = LoadBalancerOrch::new(
        LoadBalancerConfig::default(),
        instances,
        LoadBalancerCollaborators {
            programmer: network.clone(),
            emitter: network.clone(),
            resolver: network.clone(),
        },
    );
    let (mut daemon, _handle) = ControllerDaemon::new(
        ControllerDaemonConfig::default(),
        routing,
        loadbalancer,
        hosts,
    );
    daemon.bootstrap_from(network.as_ref()).await;
    daemon
}

fn client_segment(src_port: u16) -> TcpSegmentInfo {
    TcpSegmentInfo {
        eth_src: mac(5),
        eth_dst: mac(100),
        src_ip: ip(5),
        dst_ip: vip(),
        src_port,
        dst_port: 80,
    }
}

fn tcp_packet_in(src_port: u16) -> ControllerEvent {
    ControllerEvent::PacketIn(PacketIn::new(
        dev(1),
        port(4),
        encode_tcp_segment(&client_segment(src_port), &[]),
    ))
}

#[tokio::test]
async fn test_bootstrap_rules_on_every_device() {
    let network = line_network();
    let _daemon = start(&network).await;

    for id in 1..=3 {
        let lb_rules = network.rules(dev(id), lb_table());
        assert_eq!(lb_rules.len(), 3);
        assert!(lb_rules.iter().any(|r| r.flow_match == FlowMatch::tcp_to(vip())
            && r.priority == DEFAULT_PRIORITY + 1
            && r.actions().collect::<Vec<_>>() == vec![&FlowAction::Controller]));
        assert!(lb_rules.iter().any(|r| r.flow_match == FlowMatch::arp_for(vip())));
        assert!(lb_rules.iter().any(|r| r.flow_match.is_wildcard()
            && r.priority == DEFAULT_PRIORITY
            && r.goto_table() == Some(routing_table())));
        assert!(lb_rules
            .iter()
            .all(|r| r.idle_timeout == NO_TIMEOUT && r.hard_timeout == NO_TIMEOUT));

        let catch_all: Vec<FlowRule> = network
            .rules(dev(id), routing_table())
            .into_iter()
            .filter(|r| r.flow_match.is_wildcard())
            .collect();
        assert_eq!(catch_all.len(), 1);
        assert_eq!(catch_all[0].goto_table(), Some(TableId::new(2)));
    }
}

#[tokio::test]
async fn test_line_topology_routes() {
    let network = line_network();
    let daemon = start(&network).await;

    // Host 10.0.0.2 sits on C port 3
    assert_eq!(network.route(dev(1), ip(2)), Some(port(2)));
    assert_eq!(network.route(dev(2), ip(2)), Some(port(2)));
    assert_eq!(network.route(dev(3), ip(2)), Some(port(3)));

    // Host 10.0.0.1 sits on A port 3
    assert_eq!(network.route(dev(3), ip(1)), Some(port(1)));
    assert_eq!(network.route(dev(2), ip(1)), Some(port(1)));
    assert_eq!(network.route(dev(1), ip(1)), Some(port(3)));

    let route = network
        .rules(dev(1), routing_table())
        .into_iter()
        .find(|r| r.flow_match == FlowMatch::ipv4_dst(ip(2)))
        .unwrap();
    assert_eq!(route.priority, DEFAULT_PRIORITY);
    assert_eq!(route.idle_timeout, NO_TIMEOUT);
    assert_eq!(route.hard_timeout, NO_TIMEOUT);

    assert_eq!(daemon.routing().installed_route_count(), 9);
    assert_eq!(daemon.routing().path_store().snapshot().distance(dev(1), dev(3)), Some(2));
}

#[tokio::test]
async fn test_link_failure_leaves_no_rule_for_unreachable_pairs() {
    let network = line_network();
    let mut daemon = start(&network).await;

    let link = Link::new(dev(2), port(2), dev(3), port(1));
    network.links.lock().unwrap().retain(|l| *l != link);
    assert!(
        daemon
            .handle_event(ControllerEvent::Topology(TopologyChange::LinkRemoved(link.reversed())))
            .await
    );

    // C is cut off from A and B
    assert_eq!(network.route(dev(1), ip(2)), None);
    assert_eq!(network.route(dev(2), ip(2)), None);
    assert_eq!(network.route(dev(3), ip(2)), Some(port(3)));
    assert_eq!(network.route(dev(3), ip(1)), None);
    assert_eq!(network.route(dev(2), ip(1)), Some(port(1)));

    let installed = daemon.routing().installed(dev(1)).unwrap();
    assert!(!installed.contains(ip(2)));
    assert!(installed.contains(ip(1)));
    assert_eq!(daemon.routing().counters().skipped, 0);
}

/// Both tables of every device plus the routing records.
fn installed_state(network: &MockNetwork, daemon: &ControllerDaemon) -> Vec<(Vec<String>, Vec<String>, Option<InstalledRuleRecord>)> {
    (1..=3)
        .map(|id| {
            (
                network.dump(dev(id), lb_table()),
                network.dump(dev(id), routing_table()),
                daemon.routing().installed(dev(id)).cloned(),
            )
        })
        .collect()
}

#[tokio::test]
async fn test_redundant_link_report_changes_nothing() {
    let network = line_network();
    let mut daemon = start(&network).await;
    let generation = daemon.routing().path_store().generation();
    let removals = network.removals.lock().unwrap().len();

    daemon
        .handle_event(ControllerEvent::Topology(TopologyChange::LinkAdded(Link::new(
            dev(2),
            port(1),
            dev(1),
            port(2),
        ))))
        .await;

    assert_eq!(daemon.routing().path_store().generation(), generation);
    assert_eq!(network.removals.lock().unwrap().len(), removals);
}

#[tokio::test]
async fn test_resync_is_idempotent() {
    let network = line_network();
    let mut daemon = start(&network).await;
    let generation = daemon.routing().path_store().generation();
    let before = installed_state(&network, &daemon);

    // A rejoin with unchanged ports resyncs against the same graph
    daemon
        .handle_event(ControllerEvent::Topology(TopologyChange::DeviceAdded(
            Device::new(dev(2)).with_ports([port(1), port(2)]),
        )))
        .await;
    assert_eq!(daemon.routing().path_store().generation(), generation + 1);
    assert_eq!(installed_state(&network, &daemon), before);

    // A shortcut that comes and goes leaves the same rules behind
    let shortcut = Link::new(dev(1), port(5), dev(3), port(5));
    daemon
        .handle_event(ControllerEvent::Topology(TopologyChange::LinkAdded(shortcut)))
        .await;
    assert_eq!(network.route(dev(1), ip(2)), Some(port(5)));
    daemon
        .handle_event(ControllerEvent::Topology(TopologyChange::LinkRemoved(shortcut)))
        .await;

    assert_eq!(daemon.routing().path_store().generation(), generation + 3);
    assert_eq!(installed_state(&network, &daemon), before);
}

#[tokio::test]
async fn test_rejoined_device_recovers_routes() {
    let network = line_network();
    let mut daemon = start(&network).await;
    let before = installed_state(&network, &daemon);

    // The device comes back with an empty table
    network.tables.lock().unwrap().retain(|(d, _)| *d != dev(2));
    assert_eq!(network.route(dev(2), ip(2)), None);

    daemon
        .handle_event(ControllerEvent::Topology(TopologyChange::DeviceAdded(
            Device::new(dev(2)).with_ports([port(1), port(2)]),
        )))
        .await;

    assert_eq!(network.route(dev(2), ip(2)), Some(port(2)));
    assert_eq!(network.route(dev(2), ip(1)), Some(port(1)));
    assert_eq!(network.rules(dev(2), lb_table()).len(), 3);
    assert_eq!(installed_state(&network, &daemon), before);
}

#[tokio::test]
async fn test_static_tracker_keeps_attached_host_across_resync() {
    let network = line_network();
    let tracker = Arc::new(StaticHostTracker::new(network.hosts()));
    let mut daemon = start_with_hosts(&network, tracker.clone()).await;

    let newcomer = host(7, 2, 9);
    daemon
        .handle_event(ControllerEvent::Host(HostChange::Attached(newcomer.clone())))
        .await;
    assert!(tracker.hosts().contains(&newcomer));

    // Any topology change rebuilds routes from the tracker's hosts
    let link = Link::new(dev(2), port(2), dev(3), port(1));
    daemon
        .handle_event(ControllerEvent::Topology(TopologyChange::LinkRemoved(link)))
        .await;

    assert_eq!(network.route(dev(1), ip(7)), Some(port(2)));
    assert_eq!(network.route(dev(2), ip(7)), Some(port(9)));
    assert_eq!(network.route(dev(3), ip(7)), None);

    daemon
        .handle_event(ControllerEvent::Host(HostChange::Detached(newcomer)))
        .await;
    daemon
        .handle_event(ControllerEvent::Topology(TopologyChange::LinkAdded(link)))
        .await;
    for id in 1..=3 {
        assert_eq!(network.route(dev(id), ip(7)), None);
    }
    assert_eq!(network.route(dev(1), ip(2)), Some(port(2)));
}

#[tokio::test]
async fn test_host_detach_is_idempotent() {
    let network = line_network();
    let mut daemon = start(&network).await;

    let detach = ControllerEvent::Host(HostChange::Detached(host(2, 3, 3)));
    daemon.handle_event(detach.clone()).await;
    for id in 1..=3 {
        assert_eq!(network.route(dev(id), ip(2)), None);
    }
    let removals = network.removals.lock().unwrap().len();
    let routes = daemon.routing().installed_route_count();

    daemon.handle_event(detach).await;
    assert_eq!(daemon.routing().installed_route_count(), routes);
    // Removal is requested again but nothing else changes
    assert_eq!(network.removals.lock().unwrap().len(), removals + 3);
    assert_eq!(network.route(dev(1), ip(1)), Some(port(3)));
}

#[tokio::test]
async fn test_host_attach_adds_route_everywhere() {
    let network = line_network();
    let mut daemon = start(&network).await;

    let newcomer = host(7, 2, 9);
    network.hosts.lock().unwrap().push(newcomer.clone());
    daemon
        .handle_event(ControllerEvent::Host(HostChange::Attached(newcomer)))
        .await;

    assert_eq!(network.route(dev(1), ip(7)), Some(port(2)));
    assert_eq!(network.route(dev(2), ip(7)), Some(port(9)));
    assert_eq!(network.route(dev(3), ip(7)), Some(port(1)));
}

#[tokio::test]
async fn test_dispatch_installs_rewrite_rules() {
    let network = line_network();
    let mut daemon = start(&network).await;
    network.take_installs();

    daemon.handle_event(tcp_packet_in(40000)).await;

    let installs = network.take_installs();
    assert_eq!(installs.len(), 2);
    let (device, to_server) = &installs[0];
    assert_eq!(*device, dev(1));
    assert_eq!(
        *to_server,
        FlowRule::new(
            lb_table(),
            MAX_PRIORITY,
            FlowMatch::tcp_flow(ip(5), vip(), 40000, 80)
        )
        .apply(vec![FlowAction::SetIpv4Dst(ip(1)), FlowAction::SetEthDst(mac(1))])
        .goto(routing_table())
        .with_idle_timeout(IDLE_TIMEOUT_SECS)
    );

    let (_, to_client) = &installs[1];
    assert_eq!(
        *to_client,
        FlowRule::new(
            lb_table(),
            MAX_PRIORITY,
            FlowMatch::tcp_flow(ip(1), ip(5), 80, 40000)
        )
        .apply(vec![FlowAction::SetIpv4Src(vip()), FlowAction::SetEthSrc(mac(100))])
        .goto(routing_table())
        .with_idle_timeout(IDLE_TIMEOUT_SECS)
    );
    assert_eq!(to_client.hard_timeout, NO_TIMEOUT);

    // The first packet itself is not forwarded
    assert!(network.take_sent().is_empty());
}

#[tokio::test]
async fn test_round_robin_across_connections() {
    let network = line_network();
    let mut daemon = start(&network).await;
    network.take_installs();

    for src_port in 40000..40004 {
        daemon.handle_event(tcp_packet_in(src_port)).await;
    }

    let backends: Vec<Ipv4Addr> = network
        .take_installs()
        .iter()
        .filter_map(|(_, rule)| {
            rule.actions().find_map(|a| match a {
                FlowAction::SetIpv4Dst(ip) => Some(*ip),
                _ => None,
            })
        })
        .collect();
    assert_eq!(backends, vec![ip(1), ip(2), ip(1), ip(2)]);

    let stats: Vec<(Ipv4Addr, u64)> = daemon.loadbalancer().instance(vip()).unwrap().assignments().collect();
    assert_eq!(stats, vec![(ip(1), 2), (ip(2), 2)]);
}

#[tokio::test]
async fn test_arp_request_for_virtual_ip_is_answered() {
    let network = line_network();
    let mut daemon = start(&network).await;

    let request = ArpFrame::request(mac(5), ip(5), vip());
    daemon
        .handle_event(ControllerEvent::PacketIn(PacketIn::new(dev(1), port(4), encode_arp(&request))))
        .await;

    let sent = network.take_sent();
    assert_eq!(sent.len(), 1);
    let (device, out_port, frame) = &sent[0];
    assert_eq!((*device, *out_port), (dev(1), port(4)));

    let ParsedPacket::Arp(reply) = parse_frame(frame).unwrap() else {
        panic!("expected an ARP reply");
    };
    assert_eq!(
        reply,
        ArpFrame {
            eth_src: mac(100),
            eth_dst: mac(5),
            operation: ArpOp::Reply,
            sender_mac: mac(100),
            sender_ip: vip(),
            target_mac: mac(5),
            target_ip: ip(5),
        }
    );
}

#[tokio::test]
async fn test_other_traffic_is_ignored() {
    let network = line_network();
    let mut daemon = start(&network).await;
    network.take_installs();

    // ARP for a real host, and TCP to a real host
    let request = ArpFrame::request(mac(5), ip(5), ip(1));
    daemon
        .handle_event(ControllerEvent::PacketIn(PacketIn::new(dev(1), port(4), encode_arp(&request))))
        .await;
    let mut segment = client_segment(40000);
    segment.dst_ip = ip(2);
    daemon
        .handle_event(ControllerEvent::PacketIn(PacketIn::new(
            dev(1),
            port(4),
            encode_tcp_segment(&segment, &[]),
        )))
        .await;

    assert!(network.take_sent().is_empty());
    assert!(network.take_installs().is_empty());
    assert_eq!(daemon.loadbalancer().counters().ignored, 2);
}

#[tokio::test]
async fn test_event_loop_via_handle() {
    let network = line_network();
    let instances = build_instances([InstanceConfig {
        virtual_ip: vip(),
        virtual_mac: mac(100),
        servers: vec![ip(1), ip(2)],
    }]);
    let routing = L3RoutingOrch::new(RoutingConfig::default(), network.clone());
    let loadbalancer = LoadBalancerOrch::new(
        LoadBalancerConfig::default(),
        instances,
        LoadBalancerCollaborators {
            programmer: network.clone(),
            emitter: network.clone(),
            resolver: network.clone(),
        },
    );
    let (daemon, handle) = ControllerDaemon::new(
        ControllerDaemonConfig {
            event_queue_depth: 4,
        },
        routing,
        loadbalancer,
        network.clone(),
    );
    let task = tokio::spawn(daemon.run());

    for device in network.devices() {
        handle
            .send(ControllerEvent::Topology(TopologyChange::DeviceAdded(device)))
            .await
            .unwrap();
    }
    for link in network.links() {
        handle
            .send(ControllerEvent::Topology(TopologyChange::LinkAdded(link)))
            .await
            .unwrap();
    }
    handle.send(tcp_packet_in(40000)).await.unwrap();
    handle.shutdown().await.unwrap();

    let daemon = task.await.unwrap();
    assert_eq!(daemon.events_handled(), 7);
    assert_eq!(daemon.topology().link_count(), 2);
    assert_eq!(network.route(dev(1), ip(2)), Some(port(2)));
    assert_eq!(daemon.loadbalancer().counters().success, 4);

    drop(daemon);
    assert_eq!(
        handle.try_send(ControllerEvent::Shutdown),
        Err(DaemonError::Closed)
    );
}
