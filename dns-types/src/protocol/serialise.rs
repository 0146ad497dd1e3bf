//! Serialisation of DNS messages to the wire format. See the `types` module
//! for details of the format.

use crate::protocol::types::*;

impl Message {
    pub fn to_octets(&self) -> Vec<u8> {
        let mut buffer = WritableBuffer::default();
        self.serialise(&mut buffer);
        buffer.octets
    }

    pub fn serialise(&self, buffer: &mut WritableBuffer) {
        let header = WireHeader {
            header: self.header,
            qdcount: self.questions.len() as u16,
            ancount: self.answers.len() as u16,
            nscount: self.authority.len() as u16,
            arcount: self.additional.len() as u16,
        };
        header.serialise(buffer);

        for question in &self.questions {
            question.serialise(buffer);
        }
        for rr in &self.answers {
            rr.serialise(buffer);
        }
        for rr in &self.authority {
            rr.serialise(buffer);
        }
        for rr in &self.additional {
            rr.serialise(buffer);
        }
    }
}

struct WireHeader {
    header: Header,
    qdcount: u16,
    ancount: u16,
    nscount: u16,
    arcount: u16,
}

impl WireHeader {
    fn serialise(&self, buffer: &mut WritableBuffer) {
        let flags1 = (if self.header.is_response {
            0b1000_0000
        } else {
            0
        }) | (0b0111_1000 & (u8::from(self.header.opcode) << 3))
            | (if self.header.is_authoritative {
                0b0000_0100
            } else {
                0
            })
            | (if self.header.is_truncated {
                0b0000_0010
            } else {
                0
            })
            | (if self.header.recursion_desired {
                0b0000_0001
            } else {
                0
            });
        let flags2 = (if self.header.recursion_available {
            0b1000_0000
        } else {
            0
        }) | (0b0000_1111 & u8::from(self.header.rcode));

        buffer.write_u16(self.header.id);
        buffer.write_u8(flags1);
        buffer.write_u8(flags2);
        buffer.write_u16(self.qdcount);
        buffer.write_u16(self.ancount);
        buffer.write_u16(self.nscount);
        buffer.write_u16(self.arcount);
    }
}

impl Question {
    pub fn serialise(&self, buffer: &mut WritableBuffer) {
        self.name.serialise(buffer);
        buffer.write_u16(self.qtype.into());
        buffer.write_u16(self.qclass.into());
    }
}

impl ResourceRecord {
    pub fn serialise(&self, buffer: &mut WritableBuffer) {
        let (rtype, rdata): (RecordType, Vec<u8>) = match &self.rtype_with_data {
            RecordTypeWithData::A { address } => (RecordType::A, address.octets().to_vec()),
            RecordTypeWithData::Uninterpreted { rtype, octets } => (*rtype, octets.clone()),
        };

        self.name.serialise(buffer);
        buffer.write_u16(rtype.into());
        buffer.write_u16(self.rclass.into());
        buffer.write_u32(self.ttl);
        buffer.write_u16(rdata.len() as u16);
        buffer.write_octets(&rdata);
    }
}

impl DomainName {
    /// Writes the name's labels directly, uncompressed. This workspace only
    /// ever serialises a handful of records per message, so name
    /// compression is not worth the bookkeeping the teacher's own `TODO`
    /// left unimplemented either.
    pub fn serialise(&self, buffer: &mut WritableBuffer) {
        buffer.write_octets(&self.octets);
    }
}

/// A buffer which can be written to, for serialisation purposes.
pub struct WritableBuffer {
    pub octets: Vec<u8>,
}

impl Default for WritableBuffer {
    fn default() -> Self {
        Self {
            octets: Vec::with_capacity(512),
        }
    }
}

impl WritableBuffer {
    pub fn write_u8(&mut self, octet: u8) {
        self.octets.push(octet);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.octets.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.octets.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_octets(&mut self, octets: &[u8]) {
        self.octets.extend_from_slice(octets);
    }
}
