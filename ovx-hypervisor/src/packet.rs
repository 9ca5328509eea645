//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use bytes::{Buf, BufMut, Bytes, BytesMut, TryGetError};
use derive_new::new;
use ovx_utils::mac_addr::MacAddr;
use serde::{Deserialize, Serialize};

use crate::physical::{Dpid, PortNo};

//
// Discovery probe frame.
//
// +--------------------------------------------+
// | Ethernet header (optional 802.1Q tag)      |
// +--------------------------------------------+
// | Chassis ID TLV: subtype 4, low 48 bits of  |
// | the datapath ID                            |
// +--------------------------------------------+
// | Port ID TLV: subtype 2, 16-bit port number |
// +--------------------------------------------+
// | TTL TLV: 120 seconds                       |
// +--------------------------------------------+
// | Organizational TLV: OUI a4:23:05,          |
// | subtype 1, hypervisor name                 |
// +--------------------------------------------+
// | Organizational TLV: OUI a4:23:05,          |
// | subtype 2, 64-bit datapath ID              |
// +--------------------------------------------+
// | End of LLDPDU TLV                          |
// +--------------------------------------------+
//
// The BDDP variant has the same payload, a broadcast destination and its own
// ethertype, so it crosses legacy segments that filter LLDP.
//
#[derive(Clone, Debug, Eq, new, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct Probe {
    pub kind: ProbeKind,
    pub src_mac: MacAddr,
    pub dpid: Dpid,
    pub port: PortNo,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum ProbeKind {
    Lldp,
    Bddp,
}

// Probe decode errors.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum DecodeError {
    IncompleteFrame(usize),
    UnknownEthertype(u16),
    InvalidTlvLength(u8, u16),
    MissingTlv(u8),
    ForeignProbe,
    ReadOutOfBounds,
}

// ===== impl Probe =====

impl Probe {
    pub const LLDP_ETHERTYPE: u16 = 0x88cc;
    pub const BDDP_ETHERTYPE: u16 = 0x8942;
    pub const VLAN_ETHERTYPE: u16 = 0x8100;
    pub const LLDP_DST: MacAddr =
        MacAddr::from_bytes([0x01, 0x23, 0x20, 0x00, 0x00, 0x01]);
    pub const OUI: [u8; 3] = [0xa4, 0x23, 0x05];
    pub const NAME: &'static [u8] = b"OpenVirteX";
    pub const TTL: u16 = 120;
    pub const MIN_LEN: usize = 61;

    // TLV types.
    const TLV_END: u8 = 0;
    const TLV_CHASSIS_ID: u8 = 1;
    const TLV_PORT_ID: u8 = 2;
    const TLV_TTL: u8 = 3;
    const TLV_ORG: u8 = 127;

    // Subtypes.
    const CHASSIS_ID_MAC: u8 = 4;
    const PORT_ID_COMPONENT: u8 = 2;
    const ORG_NAME: u8 = 1;
    const ORG_DPID: u8 = 2;

    pub fn dst_mac(&self) -> MacAddr {
        match self.kind {
            ProbeKind::Lldp => Self::LLDP_DST,
            ProbeKind::Bddp => MacAddr::BROADCAST,
        }
    }

    pub fn ethertype(&self) -> u16 {
        match self.kind {
            ProbeKind::Lldp => Self::LLDP_ETHERTYPE,
            ProbeKind::Bddp => Self::BDDP_ETHERTYPE,
        }
    }

    // Encodes the probe into an Ethernet frame.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(64);

        // Ethernet header.
        buf.put_slice(&self.dst_mac().as_bytes());
        buf.put_slice(&self.src_mac.as_bytes());
        buf.put_u16(self.ethertype());

        // Chassis ID.
        put_tlv_header(&mut buf, Self::TLV_CHASSIS_ID, 7);
        buf.put_u8(Self::CHASSIS_ID_MAC);
        buf.put_slice(&MacAddr::from_u64(self.dpid).as_bytes());

        // Port ID.
        put_tlv_header(&mut buf, Self::TLV_PORT_ID, 3);
        buf.put_u8(Self::PORT_ID_COMPONENT);
        buf.put_u16(self.port);

        // Time to live.
        put_tlv_header(&mut buf, Self::TLV_TTL, 2);
        buf.put_u16(Self::TTL);

        // Hypervisor name.
        put_tlv_header(&mut buf, Self::TLV_ORG, 4 + Self::NAME.len() as u16);
        buf.put_slice(&Self::OUI);
        buf.put_u8(Self::ORG_NAME);
        buf.put_slice(Self::NAME);

        // Full datapath ID.
        put_tlv_header(&mut buf, Self::TLV_ORG, 12);
        buf.put_slice(&Self::OUI);
        buf.put_u8(Self::ORG_DPID);
        buf.put_u64(self.dpid);

        put_tlv_header(&mut buf, Self::TLV_END, 0);
        buf.freeze()
    }

    // Decodes a probe from an Ethernet frame.
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        if data.len() < Self::MIN_LEN {
            return Err(DecodeError::IncompleteFrame(data.len()));
        }
        let mut buf = Bytes::copy_from_slice(data);

        // Ethernet header.
        let mut dst = [0; 6];
        buf.try_copy_to_slice(&mut dst)?;
        let mut src = [0; 6];
        buf.try_copy_to_slice(&mut src)?;
        let mut ethertype = buf.try_get_u16()?;
        if ethertype == Self::VLAN_ETHERTYPE {
            let _tci = buf.try_get_u16()?;
            ethertype = buf.try_get_u16()?;
        }
        let kind = match ethertype {
            Self::LLDP_ETHERTYPE => ProbeKind::Lldp,
            Self::BDDP_ETHERTYPE => ProbeKind::Bddp,
            _ => return Err(DecodeError::UnknownEthertype(ethertype)),
        };

        // TLVs.
        let mut port = None;
        let mut dpid = None;
        let mut named = false;
        loop {
            let header = buf.try_get_u16()?;
            let tlv_type = (header >> 9) as u8;
            let tlv_len = header & 0x01ff;
            if tlv_type == Self::TLV_END {
                break;
            }
            if tlv_len as usize > buf.remaining() {
                return Err(DecodeError::InvalidTlvLength(tlv_type, tlv_len));
            }
            let mut value = buf.split_to(tlv_len as usize);

            match tlv_type {
                Self::TLV_PORT_ID => {
                    if tlv_len != 3 {
                        return Err(DecodeError::InvalidTlvLength(
                            tlv_type, tlv_len,
                        ));
                    }
                    let _subtype = value.try_get_u8()?;
                    port = Some(value.try_get_u16()?);
                }
                Self::TLV_ORG => {
                    if tlv_len < 4 {
                        return Err(DecodeError::InvalidTlvLength(
                            tlv_type, tlv_len,
                        ));
                    }
                    let mut oui = [0; 3];
                    value.try_copy_to_slice(&mut oui)?;
                    let subtype = value.try_get_u8()?;
                    if oui != Self::OUI {
                        continue;
                    }
                    match subtype {
                        Self::ORG_NAME => {
                            named = value.as_ref() == Self::NAME;
                        }
                        Self::ORG_DPID => {
                            dpid = Some(value.try_get_u64()?);
                        }
                        _ => (),
                    }
                }
                // Chassis ID and TTL carry nothing the datapath ID doesn't.
                _ => (),
            }
        }

        if !named {
            return Err(DecodeError::ForeignProbe);
        }
        let port = port.ok_or(DecodeError::MissingTlv(Self::TLV_PORT_ID))?;
        let dpid = dpid.ok_or(DecodeError::MissingTlv(Self::TLV_ORG))?;

        Ok(Probe {
            kind,
            src_mac: MacAddr::from(src),
            dpid,
            port,
        })
    }
}

// ===== impl DecodeError =====

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::IncompleteFrame(len) => {
                write!(f, "incomplete frame (length {len})")
            }
            DecodeError::UnknownEthertype(ethertype) => {
                write!(f, "unknown ethertype: {ethertype:#06x}")
            }
            DecodeError::InvalidTlvLength(tlv_type, len) => {
                write!(f, "invalid length {len} for TLV type {tlv_type}")
            }
            DecodeError::MissingTlv(tlv_type) => {
                write!(f, "missing TLV type {tlv_type}")
            }
            DecodeError::ForeignProbe => {
                write!(f, "probe not originated by this hypervisor")
            }
            DecodeError::ReadOutOfBounds => {
                write!(f, "attempt to read out of bounds")
            }
        }
    }
}

impl std::error::Error for DecodeError {}

impl From<TryGetError> for DecodeError {
    fn from(_error: TryGetError) -> DecodeError {
        DecodeError::ReadOutOfBounds
    }
}

// ===== helper functions =====

fn put_tlv_header(buf: &mut BytesMut, tlv_type: u8, len: u16) {
    buf.put_u16((u16::from(tlv_type) << 9) | (len & 0x01ff));
}
