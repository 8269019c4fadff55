use pnet::packet::arp::{ArpHardwareTypes, ArpOperation, ArpOperations, ArpPacket, MutableArpPacket};
use pnet::packet::ethernet::{EtherTypes, EthernetPacket, MutableEthernetPacket};
use pnet::packet::{MutablePacket, Packet};
use std::net::Ipv4Addr;
use crate::types::MacAddr;

/// Ethernet header plus an IPv4-over-Ethernet ARP body.
pub const ARP_FRAME_LEN: usize = 42;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArpRequest {
    pub sender_mac: MacAddr,
    pub sender_ip: Ipv4Addr,
    pub target_ip: Ipv4Addr,
}

/// Extracts an ARP request from a raw Ethernet frame. Frames that are not ARP
/// requests yield `Ok(None)`; truncated ARP frames are an error.
pub fn parse_arp_request(frame: &[u8]) -> Result<Option<ArpRequest>, String> {
    let ethernet = EthernetPacket::new(frame)
        .ok_or_else(|| format!("frame of {} bytes is shorter than an Ethernet header", frame.len()))?;
    if ethernet.get_ethertype() != EtherTypes::Arp {
        return Ok(None);
    }

    let arp = ArpPacket::new(ethernet.payload())
        .ok_or_else(|| format!("ARP body of {} bytes is truncated", ethernet.payload().len()))?;
    if arp.get_operation() != ArpOperations::Request {
        return Ok(None);
    }

    Ok(Some(ArpRequest {
        sender_mac: arp.get_sender_hw_addr(),
        sender_ip: arp.get_sender_proto_addr(),
        target_ip: arp.get_target_proto_addr(),
    }))
}

/// Reply telling the requester that `request.target_ip` is at `resolved`.
pub fn build_arp_reply(request: &ArpRequest, resolved: MacAddr) -> Option<Vec<u8>> {
    build_arp_frame(
        ArpOperations::Reply,
        resolved,
        request.target_ip,
        request.sender_mac,
        request.sender_ip,
        request.sender_mac,
    )
}

/// Broadcast who-has for `target_ip`.
pub fn build_arp_request(sender_mac: MacAddr, sender_ip: Ipv4Addr, target_ip: Ipv4Addr) -> Option<Vec<u8>> {
    build_arp_frame(
        ArpOperations::Request,
        sender_mac,
        sender_ip,
        MacAddr::zero(),
        target_ip,
        MacAddr::broadcast(),
    )
}

fn build_arp_frame(
    operation: ArpOperation,
    sender_mac: MacAddr,
    sender_ip: Ipv4Addr,
    target_mac: MacAddr,
    target_ip: Ipv4Addr,
    eth_dst: MacAddr,
) -> Option<Vec<u8>> {
    let mut buffer = vec![0u8; ARP_FRAME_LEN];
    {
        let mut ethernet = MutableEthernetPacket::new(&mut buffer)?;
        ethernet.set_destination(eth_dst);
        ethernet.set_source(sender_mac);
        ethernet.set_ethertype(EtherTypes::Arp);

        let mut arp = MutableArpPacket::new(ethernet.payload_mut())?;
        arp.set_hardware_type(ArpHardwareTypes::Ethernet);
        arp.set_protocol_type(EtherTypes::Ipv4);
        arp.set_hw_addr_len(6);
        arp.set_proto_addr_len(4);
        arp.set_operation(operation);
        arp.set_sender_hw_addr(sender_mac);
        arp.set_sender_proto_addr(sender_ip);
        arp.set_target_hw_addr(target_mac);
        arp.set_target_proto_addr(target_ip);
    }
    Some(buffer)
}
