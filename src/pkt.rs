use bytestream::ByteOrder::BigEndian;
use bytestream::{StreamReader, StreamWriter};
use std::io::{Error, ErrorKind};
use std::net::Ipv4Addr;

use crate::codec::{FromBytestream, IntoBytestream};

pub const AF_INET: u16 = 2;

/// Protocol version emitted in and required of packet headers.
pub const RIP_VERSION: u8 = 2;

/// Encoded size of one advertisement entry.
pub const RIP_ENTRY_SIZE: usize = 20;

/// Entry capacity of a single packet (RFC 2453).
pub const RIP_MAX_ENTRIES: usize = 25;

/// A full RIP packet: a 4 byte header followed by up to 25 entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RipPacket {
    pub command: RipCommand,
    // version is fixed at RIP_VERSION
    pub entries: Vec<RipEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RipCommand {
    Request = 1,
    Response = 2,
}

impl RipCommand {
    #[must_use]
    pub fn to_raw(self) -> u8 {
        self as u8
    }

    #[must_use]
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            1 => Some(Self::Request),
            2 => Some(Self::Response),
            _ => None,
        }
    }
}

/// Information about a single route, as carried in an advertisement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RipEntry {
    pub addr_fam: u16,
    pub target: Ipv4Addr,
    pub mask: Ipv4Addr,
    pub next_hop: Ipv4Addr,
    pub metric: u32,
}

impl RipPacket {
    /// Splits an entry list into as many packets as its length demands.
    #[must_use]
    pub fn packets(command: RipCommand, mut entries: &[RipEntry]) -> Vec<RipPacket> {
        let mut r = Vec::with_capacity(entries.len() / RIP_MAX_ENTRIES + 1);
        while !entries.is_empty() {
            let n = entries.len().min(RIP_MAX_ENTRIES);
            r.push(RipPacket {
                command,
                entries: entries[..n].to_vec(),
            });
            entries = &entries[n..];
        }
        r
    }
}

impl IntoBytestream for RipPacket {
    type Error = Error;
    fn to_bytestream(&self, bytestream: &mut impl std::io::Write) -> Result<(), Self::Error> {
        self.command.to_raw().write_to(bytestream, BigEndian)?;
        RIP_VERSION.write_to(bytestream, BigEndian)?;
        0u16.write_to(bytestream, BigEndian)?;
        for entry in &self.entries {
            entry.to_bytestream(bytestream)?;
        }
        Ok(())
    }
}

impl FromBytestream for RipPacket {
    type Error = Error;
    fn from_bytestream(
        bytestream: &mut std::io::Cursor<impl AsRef<[u8]>>,
    ) -> Result<Self, Self::Error> {
        let command = RipCommand::from_raw(u8::read_from(bytestream, BigEndian)?).ok_or(
            Error::new(ErrorKind::InvalidData, "unknown command in rip packet"),
        )?;
        let version = u8::read_from(bytestream, BigEndian)?;
        if version != RIP_VERSION {
            return Err(Error::new(
                ErrorKind::InvalidData,
                "unsupported version in rip packet",
            ));
        }
        let _pad = u16::read_from(bytestream, BigEndian)?;

        let len = bytestream.get_ref().as_ref().len() as u64;
        let mut entries = Vec::new();
        while bytestream.position() < len {
            entries.push(RipEntry::from_bytestream(bytestream)?);
        }
        Ok(RipPacket { command, entries })
    }
}

impl IntoBytestream for RipEntry {
    type Error = Error;
    fn to_bytestream(&self, bytestream: &mut impl std::io::Write) -> Result<(), Self::Error> {
        self.addr_fam.write_to(bytestream, BigEndian)?;
        0u16.write_to(bytestream, BigEndian)?;
        u32::from(self.target).write_to(bytestream, BigEndian)?;
        u32::from(self.mask).write_to(bytestream, BigEndian)?;
        u32::from(self.next_hop).write_to(bytestream, BigEndian)?;
        self.metric.write_to(bytestream, BigEndian)?;

        Ok(())
    }
}

impl FromBytestream for RipEntry {
    type Error = Error;
    fn from_bytestream(
        bytestream: &mut std::io::Cursor<impl AsRef<[u8]>>,
    ) -> Result<Self, Self::Error> {
        let addr_fam = u16::read_from(bytestream, BigEndian)?;
        let _pad = u16::read_from(bytestream, BigEndian)?;
        let target = Ipv4Addr::from(u32::read_from(bytestream, BigEndian)?);
        let mask = Ipv4Addr::from(u32::read_from(bytestream, BigEndian)?);
        let next_hop = Ipv4Addr::from(u32::read_from(bytestream, BigEndian)?);
        let metric = u32::read_from(bytestream, BigEndian)?;

        Ok(Self {
            addr_fam,
            target,
            mask,
            next_hop,
            metric,
        })
    }
}

/// Encodes a bare entry array, without the packet header.
///
/// This is the framing the advertisement path uses on the wire.
pub fn entries_to_payload(entries: &[RipEntry]) -> Result<Vec<u8>, Error> {
    let mut payload = Vec::with_capacity(entries.len() * RIP_ENTRY_SIZE);
    for entry in entries {
        entry.to_bytestream(&mut payload)?;
    }
    Ok(payload)
}

/// Decodes a received buffer as a bare entry array, without a header.
///
/// Exactly `len / 20` entries are taken; trailing bytes are discarded.
#[must_use]
pub fn payload_to_entries(payload: &[u8]) -> Vec<RipEntry> {
    payload
        .chunks_exact(RIP_ENTRY_SIZE)
        .filter_map(|chunk| RipEntry::from_buffer(chunk).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Result;

    #[test]
    fn single_entry_encoding() -> Result<()> {
        let pkt = RipPacket {
            command: RipCommand::Response,
            entries: vec![RipEntry {
                addr_fam: AF_INET,
                target: Ipv4Addr::new(1, 2, 3, 4),
                mask: Ipv4Addr::new(255, 255, 255, 0),
                next_hop: Ipv4Addr::UNSPECIFIED,
                metric: 1003,
            }],
        };

        let buf = pkt.to_buffer()?;
        assert_eq!(
            buf,
            &[
                0x02, 0x02, 0x00, 0x00, // header
                0x00, 0x02, 0x00, 0x00, // addr_fam
                0x01, 0x02, 0x03, 0x04, // ip,
                0xff, 0xff, 0xff, 0x00, // mask
                0x00, 0x00, 0x00, 0x00, // next hop
                0x00, 0x00, 0x03, 0xeb, // metric
            ]
        );

        Ok(())
    }

    #[test]
    fn single_entry_decoding() -> Result<()> {
        let buf = &[
            0x01, 0x02, 0x00, 0x00, // header
            0x00, 0x02, 0x00, 0x00, // addr_fam
            0x06, 0x07, 0x08, 0x09, // ip,
            0x00, 0x00, 0x00, 0x00, // mask
            0x00, 0x00, 0x00, 0x00, // next hop
            0x00, 0x00, 0x03, 0xeb, // metric
        ];

        let pkt = RipPacket::from_buffer(buf)?;

        assert_eq!(
            pkt,
            RipPacket {
                command: RipCommand::Request,
                entries: vec![RipEntry {
                    addr_fam: AF_INET,
                    target: Ipv4Addr::new(6, 7, 8, 9),
                    mask: Ipv4Addr::UNSPECIFIED,
                    next_hop: Ipv4Addr::UNSPECIFIED,
                    metric: 1003
                }],
            }
        );

        Ok(())
    }

    #[test]
    fn unknown_command_is_rejected() {
        let buf = &[0x03u8, 0x02, 0x00, 0x00];
        let err = RipPacket::from_buffer(buf).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidData);
    }

    #[test]
    fn wrong_version_is_rejected() {
        let buf = &[0x02u8, 0x01, 0x00, 0x00];
        let err = RipPacket::from_buffer(buf).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidData);
    }

    #[test]
    fn multi_entry_stream() -> Result<()> {
        let entries = (1..=60)
            .map(|i| RipEntry {
                addr_fam: AF_INET,
                target: Ipv4Addr::new(i as u8, (i * 2) as u8, ((i * i) % 256) as u8, i as u8 / 2),
                mask: Ipv4Addr::from(i),
                next_hop: Ipv4Addr::UNSPECIFIED,
                metric: i * i ^ 0xaa571b,
            })
            .collect::<Vec<_>>();

        let pkts = RipPacket::packets(RipCommand::Response, &entries);
        assert_eq!(
            pkts.iter().map(|p| p.entries.len()).collect::<Vec<_>>(),
            vec![25, 25, 10]
        );

        for pkt in pkts {
            let buf = pkt.to_buffer()?;
            assert_eq!(buf.len(), 4 + RIP_ENTRY_SIZE * pkt.entries.len());
            assert_eq!(RipPacket::from_buffer(&buf)?, pkt);
        }

        Ok(())
    }

    #[test]
    fn bare_payload_roundtrip() -> Result<()> {
        let entries = vec![
            RipEntry {
                addr_fam: AF_INET,
                target: Ipv4Addr::new(10, 0, 1, 0),
                mask: Ipv4Addr::new(255, 255, 255, 0),
                next_hop: Ipv4Addr::new(10, 0, 0, 2),
                metric: 5,
            },
            RipEntry {
                addr_fam: AF_INET,
                target: Ipv4Addr::new(10, 0, 2, 0),
                mask: Ipv4Addr::new(255, 255, 255, 0),
                next_hop: Ipv4Addr::UNSPECIFIED,
                metric: 16,
            },
        ];

        let payload = entries_to_payload(&entries)?;
        assert_eq!(payload.len(), 2 * RIP_ENTRY_SIZE);
        assert_eq!(payload_to_entries(&payload), entries);

        Ok(())
    }

    #[test]
    fn ragged_payload_discards_trailing_bytes() -> Result<()> {
        let entries = vec![RipEntry {
            addr_fam: AF_INET,
            target: Ipv4Addr::new(10, 0, 1, 0),
            mask: Ipv4Addr::new(255, 255, 255, 0),
            next_hop: Ipv4Addr::UNSPECIFIED,
            metric: 1,
        }];

        let mut payload = entries_to_payload(&entries)?;
        payload.extend([0xde, 0xad, 0xbe]);
        assert_eq!(payload_to_entries(&payload), entries);

        assert!(payload_to_entries(&[0u8; 7]).is_empty());
        assert!(payload_to_entries(&[]).is_empty());

        Ok(())
    }
}
