use fake::{Fake, Faker};

use dns_types::protocol::deserialise::ConsumableBuffer;
use dns_types::protocol::types::*;

#[test]
fn roundtrip_header() {
    for _ in 0..100 {
        let original = arbitrary_header();

        let octets = {
            let msg = Message {
                header: original,
                questions: Vec::new(),
                answers: Vec::new(),
                authority: Vec::new(),
                additional: Vec::new(),
            };
            msg.to_octets()
        };
        let mut buffer = ConsumableBuffer {
            octets: &octets,
            position: 0,
        };
        let deserialised = Header::deserialise(&mut buffer).unwrap();

        assert_eq!(original, deserialised);
    }
}

#[test]
fn roundtrip_a_record_message() {
    for _ in 0..100 {
        let question = arbitrary_question();
        let answer = arbitrary_a_record();

        let original = Message {
            header: Header {
                qdcount: 1,
                ancount: 1,
                nscount: 0,
                arcount: 0,
                ..arbitrary_header()
            },
            questions: vec![question],
            answers: vec![answer],
            authority: Vec::new(),
            additional: Vec::new(),
        };

        let deserialised = Message::from_octets(&original.to_octets()).unwrap();
        assert_eq!(original, deserialised);
    }
}

#[test]
fn roundtrip_domainname() {
    for _ in 0..100 {
        let original = arbitrary_domainname();

        let mut buffer = dns_types::protocol::serialise::WritableBuffer::default();
        original.serialise(&mut buffer);
        let mut cursor = ConsumableBuffer {
            octets: &buffer.octets,
            position: 0,
        };
        let deserialised = DomainName::deserialise(&mut cursor, 0).unwrap();

        assert_eq!(original, deserialised);
    }
}

fn arbitrary_header() -> Header {
    Header {
        id: Faker.fake(),
        is_response: Faker.fake(),
        opcode: Opcode::Standard,
        is_authoritative: Faker.fake(),
        is_truncated: Faker.fake(),
        recursion_desired: Faker.fake(),
        recursion_available: Faker.fake(),
        rcode: Rcode::NoError,
        qdcount: 0,
        ancount: 0,
        nscount: 0,
        arcount: 0,
    }
}

fn arbitrary_question() -> Question {
    Question {
        name: arbitrary_domainname(),
        qtype: QueryType::Record(RecordType::A),
        qclass: QueryClass::Record(RecordClass::IN),
    }
}

fn arbitrary_a_record() -> ResourceRecord {
    ResourceRecord {
        name: arbitrary_domainname(),
        rtype_with_data: RecordTypeWithData::A {
            address: std::net::Ipv4Addr::new(
                Faker.fake(),
                Faker.fake(),
                Faker.fake(),
                Faker.fake(),
            ),
        },
        rclass: RecordClass::IN,
        ttl: Faker.fake(),
    }
}

fn arbitrary_domainname() -> DomainName {
    let labels_len = (1..5).fake::<usize>();
    let mut labels = Vec::with_capacity(labels_len);

    for _ in 0..labels_len {
        let label_len = (1..10).fake::<usize>();
        let mut label = Vec::with_capacity(label_len);
        for _ in 0..label_len {
            let chr = (b'a'..=b'z').fake::<u8>();
            label.push(chr);
        }
        labels.push(label);
    }
    labels.push(Vec::new());

    DomainName::from_labels(labels).unwrap()
}
