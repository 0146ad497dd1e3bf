//! Deserialisation of DNS messages from the wire format. See the `types`
//! module for details of the format.

use crate::protocol::types::*;

impl Message {
    pub fn from_octets(octets: &[u8]) -> Result<Self, ProtocolError> {
        let mut buffer = ConsumableBuffer {
            octets,
            position: 0,
        };
        Self::deserialise(&mut buffer)
    }

    pub fn deserialise(buffer: &mut ConsumableBuffer) -> Result<Self, ProtocolError> {
        let header = Header::deserialise(buffer)?;

        let mut questions = Vec::with_capacity(header.qdcount as usize);
        for _ in 0..header.qdcount {
            questions.push(Question::deserialise(buffer, header.id)?);
        }

        let mut answers = Vec::with_capacity(header.ancount as usize);
        for _ in 0..header.ancount {
            answers.push(ResourceRecord::deserialise(buffer, header.id)?);
        }

        let mut authority = Vec::with_capacity(header.nscount as usize);
        for _ in 0..header.nscount {
            authority.push(ResourceRecord::deserialise(buffer, header.id)?);
        }

        let mut additional = Vec::with_capacity(header.arcount as usize);
        for _ in 0..header.arcount {
            additional.push(ResourceRecord::deserialise(buffer, header.id)?);
        }

        Ok(Self {
            header,
            questions,
            answers,
            authority,
            additional,
        })
    }
}

impl Header {
    pub fn deserialise(buffer: &mut ConsumableBuffer) -> Result<Self, ProtocolError> {
        let id = buffer.next_u16().ok_or(ProtocolError::CompletelyBusted)?;
        let flags1 = buffer
            .next_u8()
            .ok_or(ProtocolError::HeaderTooShort(id))?;
        let flags2 = buffer
            .next_u8()
            .ok_or(ProtocolError::HeaderTooShort(id))?;
        let qdcount = buffer.next_u16().ok_or(ProtocolError::HeaderTooShort(id))?;
        let ancount = buffer.next_u16().ok_or(ProtocolError::HeaderTooShort(id))?;
        let nscount = buffer.next_u16().ok_or(ProtocolError::HeaderTooShort(id))?;
        let arcount = buffer.next_u16().ok_or(ProtocolError::HeaderTooShort(id))?;

        Ok(Self {
            id,
            is_response: flags1 & 0b10000000 != 0,
            opcode: Opcode::from((flags1 & 0b01111000) >> 3),
            is_authoritative: flags1 & 0b00000100 != 0,
            is_truncated: flags1 & 0b00000010 != 0,
            recursion_desired: flags1 & 0b00000001 != 0,
            recursion_available: flags2 & 0b10000000 != 0,
            rcode: Rcode::from(flags2 & 0b00001111),
            qdcount,
            ancount,
            nscount,
            arcount,
        })
    }
}

impl Question {
    pub fn deserialise(buffer: &mut ConsumableBuffer, id: u16) -> Result<Self, ProtocolError> {
        let name = DomainName::deserialise(buffer, id)?;
        let qtype = buffer
            .next_u16()
            .ok_or(ProtocolError::QuestionTooShort(id))?
            .into();
        let qclass = buffer
            .next_u16()
            .ok_or(ProtocolError::QuestionTooShort(id))?
            .into();

        Ok(Self {
            name,
            qtype,
            qclass,
        })
    }
}

impl ResourceRecord {
    pub fn deserialise(buffer: &mut ConsumableBuffer, id: u16) -> Result<Self, ProtocolError> {
        let name = DomainName::deserialise(buffer, id)?;
        let rtype: RecordType = buffer
            .next_u16()
            .ok_or(ProtocolError::ResourceRecordTooShort(id))?
            .into();
        let rclass = buffer
            .next_u16()
            .ok_or(ProtocolError::ResourceRecordTooShort(id))?
            .into();
        let ttl = buffer
            .next_u32()
            .ok_or(ProtocolError::ResourceRecordTooShort(id))?;
        let rdlength = buffer
            .next_u16()
            .ok_or(ProtocolError::ResourceRecordTooShort(id))?;
        let rdata = buffer
            .take(rdlength as usize)
            .ok_or(ProtocolError::ResourceRecordTooShort(id))?;

        let rtype_with_data = match rtype {
            RecordType::A if rdata.len() == 4 => RecordTypeWithData::A {
                address: std::net::Ipv4Addr::new(rdata[0], rdata[1], rdata[2], rdata[3]),
            },
            other => RecordTypeWithData::Uninterpreted {
                rtype: other,
                octets: rdata.to_vec(),
            },
        };

        Ok(Self {
            name,
            rtype_with_data,
            rclass,
            ttl,
        })
    }
}

impl DomainName {
    pub fn deserialise(buffer: &mut ConsumableBuffer, id: u16) -> Result<Self, ProtocolError> {
        let start = buffer.position;
        let mut octets = Vec::with_capacity(64);
        let mut labels = Vec::new();
        let mut seen_pointer = false;
        let mut post_pointer_position = None;

        loop {
            let length = buffer
                .next_u8()
                .ok_or(ProtocolError::DomainTooShort(id))?;

            if length == 0 {
                octets.push(0);
                break;
            } else if length & 0b1100_0000 == 0b1100_0000 {
                let lower = buffer
                    .next_u8()
                    .ok_or(ProtocolError::DomainTooShort(id))?;
                let ptr = (((length & 0b0011_1111) as usize) << 8) | lower as usize;
                if ptr >= start {
                    return Err(ProtocolError::DomainPointerInvalid(id));
                }
                if !seen_pointer {
                    post_pointer_position = Some(buffer.position);
                    seen_pointer = true;
                }
                buffer.position = ptr;
            } else if length & 0b1100_0000 != 0 {
                return Err(ProtocolError::DomainLabelInvalid(id));
            } else {
                let label_octets = buffer
                    .take(length as usize)
                    .ok_or(ProtocolError::DomainTooShort(id))?;
                if octets.len() + label_octets.len() + 1 > 255 {
                    return Err(ProtocolError::DomainTooLong(id));
                }

                octets.push(length);
                let mut label = Vec::with_capacity(label_octets.len());
                for octet in label_octets {
                    let lower = octet.to_ascii_lowercase();
                    label.push(lower);
                    octets.push(lower);
                }
                labels.push(label);
            }
        }

        if let Some(position) = post_pointer_position {
            buffer.position = position;
        }

        if labels.is_empty() {
            labels.push(Vec::new());
        }

        Ok(Self { octets, labels })
    }
}

/// Errors which can occur while parsing a wire-format message. Every
/// variant carries the query ID when it can be recovered, so the listener
/// can still return a well-formed `FORMERR` response (see
/// `Message::make_format_error_response`).
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ProtocolError {
    CompletelyBusted,
    HeaderTooShort(u16),
    QuestionTooShort(u16),
    ResourceRecordTooShort(u16),
    DomainTooShort(u16),
    DomainTooLong(u16),
    DomainPointerInvalid(u16),
    DomainLabelInvalid(u16),
}

impl ProtocolError {
    pub fn id(&self) -> Option<u16> {
        match self {
            ProtocolError::CompletelyBusted => None,
            ProtocolError::HeaderTooShort(id)
            | ProtocolError::QuestionTooShort(id)
            | ProtocolError::ResourceRecordTooShort(id)
            | ProtocolError::DomainTooShort(id)
            | ProtocolError::DomainTooLong(id)
            | ProtocolError::DomainPointerInvalid(id)
            | ProtocolError::DomainLabelInvalid(id) => Some(*id),
        }
    }
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtocolError::CompletelyBusted => write!(f, "message too short to contain a header"),
            ProtocolError::HeaderTooShort(id) => write!(f, "header too short (id {id})"),
            ProtocolError::QuestionTooShort(id) => write!(f, "question too short (id {id})"),
            ProtocolError::ResourceRecordTooShort(id) => {
                write!(f, "resource record too short (id {id})")
            }
            ProtocolError::DomainTooShort(id) => write!(f, "domain name too short (id {id})"),
            ProtocolError::DomainTooLong(id) => write!(f, "domain name too long (id {id})"),
            ProtocolError::DomainPointerInvalid(id) => {
                write!(f, "domain name pointer invalid (id {id})")
            }
            ProtocolError::DomainLabelInvalid(id) => {
                write!(f, "domain name label invalid (id {id})")
            }
        }
    }
}

impl std::error::Error for ProtocolError {}

/// A cursor over an immutable byte slice, used for parsing wire-format
/// messages. Supports the rewind-on-pointer behaviour domain name
/// decompression needs.
pub struct ConsumableBuffer<'a> {
    pub octets: &'a [u8],
    pub position: usize,
}

impl<'a> ConsumableBuffer<'a> {
    pub fn next_u8(&mut self) -> Option<u8> {
        let octet = *self.octets.get(self.position)?;
        self.position += 1;
        Some(octet)
    }

    pub fn next_u16(&mut self) -> Option<u16> {
        let hi = self.next_u8()?;
        let lo = self.next_u8()?;
        Some(u16::from_be_bytes([hi, lo]))
    }

    pub fn next_u32(&mut self) -> Option<u32> {
        let a = self.next_u8()?;
        let b = self.next_u8()?;
        let c = self.next_u8()?;
        let d = self.next_u8()?;
        Some(u32::from_be_bytes([a, b, c, d]))
    }

    pub fn take(&mut self, size: usize) -> Option<&'a [u8]> {
        let slice = self.octets.get(self.position..self.position + size)?;
        self.position += size;
        Some(slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_too_short_reports_id() {
        let octets = [0x12, 0x34, 0x01];
        let err = Message::from_octets(&octets).unwrap_err();
        assert_eq!(Some(0x1234), err.id());
    }

    #[test]
    fn completely_busted_on_empty_input() {
        let err = Message::from_octets(&[]).unwrap_err();
        assert_eq!(ProtocolError::CompletelyBusted, err);
    }
}
