use std::convert::TryFrom;
use std::fmt;
use std::net::Ipv4Addr;

/// Basic DNS message format, used for both queries and responses.
///
/// ```text
///     +---------------------+
///     |        Header       |
///     +---------------------+
///     |       Question      | the question for the name server
///     +---------------------+
///     |        Answer       | RRs answering the question
///     +---------------------+
///     |      Authority      | RRs pointing toward an authority
///     +---------------------+
///     |      Additional     | RRs holding additional information
///     +---------------------+
/// ```
///
/// See section 4.1 of RFC 1035. This workspace only ever emits zero or one
/// answer (a single synthetic `A` record) and never populates authority or
/// additional sections, but keeps the full shape so parsing of arbitrary
/// incoming queries does not have to special-case those sections away.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Message {
    pub header: Header,
    pub questions: Vec<Question>,
    pub answers: Vec<ResourceRecord>,
    pub authority: Vec<ResourceRecord>,
    pub additional: Vec<ResourceRecord>,
}

impl Message {
    /// Build an empty NOERROR response shell for this query: RD mirrored, RA
    /// set, no answers yet.
    pub fn make_response(&self) -> Self {
        Self {
            header: Header {
                id: self.header.id,
                is_response: true,
                opcode: self.header.opcode,
                is_authoritative: false,
                is_truncated: false,
                recursion_desired: self.header.recursion_desired,
                recursion_available: true,
                rcode: Rcode::NoError,
            },
            questions: self.questions.clone(),
            answers: Vec::new(),
            authority: Vec::new(),
            additional: Vec::new(),
        }
    }

    pub fn make_format_error_response(id: u16) -> Self {
        Self {
            header: Header {
                id,
                is_response: true,
                opcode: Opcode::Standard,
                is_authoritative: false,
                is_truncated: false,
                recursion_desired: false,
                recursion_available: true,
                rcode: Rcode::FormatError,
            },
            questions: Vec::new(),
            answers: Vec::new(),
            authority: Vec::new(),
            additional: Vec::new(),
        }
    }

    pub fn from_question(id: u16, question: Question) -> Self {
        Self {
            header: Header {
                id,
                is_response: false,
                opcode: Opcode::Standard,
                is_authoritative: false,
                is_truncated: false,
                recursion_desired: true,
                recursion_available: false,
                rcode: Rcode::NoError,
            },
            questions: vec![question],
            answers: Vec::new(),
            authority: Vec::new(),
            additional: Vec::new(),
        }
    }
}

/// Common header type for all messages. See section 4.1.1 of RFC 1035.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Header {
    /// A 16 bit identifier assigned by the program that generates any kind
    /// of query. Copied verbatim into the corresponding reply.
    pub id: u16,
    pub is_response: bool,
    pub opcode: Opcode,
    pub is_authoritative: bool,
    pub is_truncated: bool,
    pub recursion_desired: bool,
    pub recursion_available: bool,
    pub rcode: Rcode,
    pub qdcount: u16,
    pub ancount: u16,
    pub nscount: u16,
    pub arcount: u16,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Opcode {
    Standard,
    Inverse,
    Status,
    Reserved(u8),
}

impl From<u8> for Opcode {
    fn from(octet: u8) -> Self {
        match octet {
            0 => Opcode::Standard,
            1 => Opcode::Inverse,
            2 => Opcode::Status,
            other => Opcode::Reserved(other),
        }
    }
}

impl From<Opcode> for u8 {
    fn from(opcode: Opcode) -> Self {
        match opcode {
            Opcode::Standard => 0,
            Opcode::Inverse => 1,
            Opcode::Status => 2,
            Opcode::Reserved(other) => other,
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Rcode {
    NoError,
    FormatError,
    ServerFailure,
    NameError,
    NotImplemented,
    Refused,
    Reserved(u8),
}

impl From<u8> for Rcode {
    fn from(octet: u8) -> Self {
        match octet {
            0 => Rcode::NoError,
            1 => Rcode::FormatError,
            2 => Rcode::ServerFailure,
            3 => Rcode::NameError,
            4 => Rcode::NotImplemented,
            5 => Rcode::Refused,
            other => Rcode::Reserved(other),
        }
    }
}

impl From<Rcode> for u8 {
    fn from(rcode: Rcode) -> Self {
        match rcode {
            Rcode::NoError => 0,
            Rcode::FormatError => 1,
            Rcode::ServerFailure => 2,
            Rcode::NameError => 3,
            Rcode::NotImplemented => 4,
            Rcode::Refused => 5,
            Rcode::Reserved(other) => other,
        }
    }
}

/// A single question, as carried in the question section of a message. This
/// system only ever looks at `questions[0]` (spec: multi-question messages
/// are not supported) but still parses the whole section so a malformed
/// trailing question does not corrupt the response.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Question {
    pub name: DomainName,
    pub qtype: QueryType,
    pub qclass: QueryClass,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum QueryType {
    Record(RecordType),
    Wildcard,
}

impl From<u16> for QueryType {
    fn from(value: u16) -> Self {
        match value {
            255 => QueryType::Wildcard,
            other => QueryType::Record(RecordType::from(other)),
        }
    }
}

impl From<QueryType> for u16 {
    fn from(qtype: QueryType) -> Self {
        match qtype {
            QueryType::Wildcard => 255,
            QueryType::Record(rtype) => rtype.into(),
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum QueryClass {
    Record(RecordClass),
    Wildcard,
}

impl From<u16> for QueryClass {
    fn from(value: u16) -> Self {
        match value {
            255 => QueryClass::Wildcard,
            other => QueryClass::Record(RecordClass::from(other)),
        }
    }
}

impl From<QueryClass> for u16 {
    fn from(qclass: QueryClass) -> Self {
        match qclass {
            QueryClass::Wildcard => 255,
            QueryClass::Record(rclass) => rclass.into(),
        }
    }
}

/// Record types this crate actually interprets or needs to recognise by
/// name in order to decide listener behaviour (spec §4.2's response-policy
/// table). Everything else round-trips as `Unknown`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum RecordType {
    A,
    NS,
    CNAME,
    SOA,
    PTR,
    MX,
    TXT,
    AAAA,
    SRV,
    HTTPS,
    SVCB,
    Unknown(u16),
}

impl From<u16> for RecordType {
    fn from(value: u16) -> Self {
        match value {
            1 => RecordType::A,
            2 => RecordType::NS,
            5 => RecordType::CNAME,
            6 => RecordType::SOA,
            12 => RecordType::PTR,
            15 => RecordType::MX,
            16 => RecordType::TXT,
            28 => RecordType::AAAA,
            33 => RecordType::SRV,
            64 => RecordType::SVCB,
            65 => RecordType::HTTPS,
            other => RecordType::Unknown(other),
        }
    }
}

impl From<RecordType> for u16 {
    fn from(rtype: RecordType) -> Self {
        match rtype {
            RecordType::A => 1,
            RecordType::NS => 2,
            RecordType::CNAME => 5,
            RecordType::SOA => 6,
            RecordType::PTR => 12,
            RecordType::MX => 15,
            RecordType::TXT => 16,
            RecordType::AAAA => 28,
            RecordType::SRV => 33,
            RecordType::SVCB => 64,
            RecordType::HTTPS => 65,
            RecordType::Unknown(other) => other,
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum RecordClass {
    IN,
    CS,
    CH,
    HS,
    Unknown(u16),
}

impl From<u16> for RecordClass {
    fn from(value: u16) -> Self {
        match value {
            1 => RecordClass::IN,
            2 => RecordClass::CS,
            3 => RecordClass::CH,
            4 => RecordClass::HS,
            other => RecordClass::Unknown(other),
        }
    }
}

impl From<RecordClass> for u16 {
    fn from(rclass: RecordClass) -> Self {
        match rclass {
            RecordClass::IN => 1,
            RecordClass::CS => 2,
            RecordClass::CH => 3,
            RecordClass::HS => 4,
            RecordClass::Unknown(other) => other,
        }
    }
}

/// A resource record, as carried in the answer/authority/additional
/// sections of a message.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ResourceRecord {
    pub name: DomainName,
    pub rtype_with_data: RecordTypeWithData,
    pub rclass: RecordClass,
    pub ttl: u32,
}

/// RDATA, tagged by record type. Only `A` is ever synthesised by this
/// workspace; `Uninterpreted` preserves any other RR's raw bytes so a
/// parsed-then-reserialised message (e.g. in a round-trip test) is lossless.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum RecordTypeWithData {
    A { address: Ipv4Addr },
    Uninterpreted { rtype: RecordType, octets: Vec<u8> },
}

/// A domain name: both the wire octets (length-prefixed labels, no trailing
/// compression pointer once parsed) and the decoded labels for convenience.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct DomainName {
    pub octets: Vec<u8>,
    pub labels: Vec<Vec<u8>>,
}

impl DomainName {
    pub fn root_domain() -> Self {
        Self {
            octets: vec![0],
            labels: vec![Vec::new()],
        }
    }

    pub fn to_dotted_string(&self) -> String {
        if self.octets == vec![0] {
            return ".".to_string();
        }

        let mut out = String::with_capacity(self.octets.len());
        let mut first = true;
        for label in &self.labels {
            if first {
                first = false;
            } else {
                out.push('.');
            }
            for octet in label {
                out.push(*octet as char);
            }
        }
        out
    }

    /// Strip the trailing root dot, the way the listener does before
    /// handing a name to the resolver (spec §4.2).
    pub fn to_relative_string(&self) -> String {
        let dotted = self.to_dotted_string();
        dotted.strip_suffix('.').unwrap_or(&dotted).to_string()
    }

    pub fn from_dotted_string(s: &str) -> Option<Self> {
        if s == "." {
            return Some(DomainName::root_domain());
        }

        let chunks = s.split('.').collect::<Vec<_>>();
        let mut labels = Vec::with_capacity(chunks.len());
        for (i, label) in chunks.iter().enumerate() {
            if label.is_empty() && i != chunks.len() - 1 {
                return None;
            }
            labels.push(label.as_bytes().to_vec());
        }

        Self::from_labels(labels)
    }

    /// Build a `DomainName` from a relative (no trailing dot) string, e.g.
    /// a domain as resolved via DoH, lower-casing and trailing-dotting it.
    pub fn from_relative_str(s: &str) -> Option<Self> {
        if s.ends_with('.') {
            Self::from_dotted_string(s)
        } else {
            Self::from_dotted_string(&format!("{s}."))
        }
    }

    pub fn from_labels(mixed_case_labels: Vec<Vec<u8>>) -> Option<Self> {
        if mixed_case_labels.is_empty() {
            return None;
        }

        let mut labels = Vec::<Vec<u8>>::with_capacity(mixed_case_labels.len());
        let mut octets = Vec::<u8>::with_capacity(255);
        let mut blank_label = false;

        for mc_label in &mixed_case_labels {
            if blank_label {
                return None;
            }
            blank_label = mc_label.is_empty();

            match u8::try_from(mc_label.len()) {
                Ok(n) if n <= 63 => {
                    octets.push(n);
                    let mut label = Vec::<u8>::with_capacity(mc_label.len());
                    for octet in mc_label {
                        if !octet.is_ascii() {
                            return None;
                        }
                        let octet = octet.to_ascii_lowercase();
                        label.push(octet);
                        octets.push(octet);
                    }
                    labels.push(label);
                }
                _ => return None,
            }
        }

        if blank_label && octets.len() <= 255 {
            Some(Self { octets, labels })
        } else {
            None
        }
    }
}

impl fmt::Display for DomainName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_dotted_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domainname_root_conversions() {
        assert_eq!(
            Some(DomainName::root_domain()),
            DomainName::from_dotted_string(".")
        );
        assert_eq!(".", DomainName::root_domain().to_dotted_string());
    }

    #[test]
    fn relative_string_round_trips() {
        let name = DomainName::from_relative_str("example.com").unwrap();
        assert_eq!("example.com", name.to_relative_string());
        assert_eq!("example.com.", name.to_dotted_string());
    }

    #[test]
    fn from_dotted_string_lowercases() {
        let name = DomainName::from_dotted_string("Example.COM.").unwrap();
        assert_eq!("example.com.", name.to_dotted_string());
    }

    #[test]
    fn rejects_blank_interior_label() {
        assert_eq!(None, DomainName::from_dotted_string("a..b."));
    }
}
