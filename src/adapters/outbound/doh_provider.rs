//! DNS-over-HTTPS Provider
//!
//! Implements DnsProvider with RFC 8484 POST requests carrying
//! `application/dns-message` wire-format queries.

use crate::domain::entities::DnsAnswer;
use crate::domain::errors::DnsError;
use crate::domain::ports::DnsProvider;
use crate::domain::services::domain_name;
use crate::domain::value_objects::RecordKind;
use async_trait::async_trait;
use hickory_proto::op::{Edns, Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::rdata::opt::EdnsOption;
use hickory_proto::rr::{Name, RData, RecordType};
use hickory_proto::serialize::binary::{BinDecodable, BinEncodable};
use ipnetwork::IpNetwork;
use std::net::IpAddr;
use std::time::Duration;

const DNS_MESSAGE: &str = "application/dns-message";

/// EDNS option code for client subnet (RFC 7871).
const EDNS_CLIENT_SUBNET: u16 = 8;

const EDNS_MAX_PAYLOAD: u16 = 4096;

/// One DoH endpoint.
pub struct DohProvider {
    name: String,
    url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl DohProvider {
    /// Create a provider for `url`. `timeout` bounds the whole HTTP exchange.
    pub fn new(name: impl Into<String>, url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("rule-advisor/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            name: name.into(),
            url: url.into(),
            client,
            timeout,
        })
    }

    async fn exchange(&self, packet: Vec<u8>) -> Result<Vec<u8>, DnsError> {
        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", DNS_MESSAGE)
            .header("Accept", DNS_MESSAGE)
            .body(packet)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DnsError::HttpStatus(status.as_u16()));
        }

        let body = response.bytes().await.map_err(|e| self.transport_error(e))?;
        Ok(body.to_vec())
    }

    fn transport_error(&self, e: reqwest::Error) -> DnsError {
        if e.is_timeout() {
            DnsError::Timeout(self.timeout)
        } else {
            DnsError::Transport(e.to_string())
        }
    }
}

#[async_trait]
impl DnsProvider for DohProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn query(
        &self,
        domain: &str,
        kind: RecordKind,
        client_subnet: Option<IpNetwork>,
    ) -> Result<Vec<DnsAnswer>, DnsError> {
        let id: u16 = rand::random();
        let packet = build_query(id, domain, kind, client_subnet)?;

        tracing::debug!(provider = %self.name, domain = %domain, kind = %kind, "sending DoH query");
        let body = self.exchange(packet).await?;
        parse_response(id, &body)
    }
}

/// Encode a recursive query for `domain`, optionally with a client-subnet hint.
pub fn build_query(
    id: u16,
    domain: &str,
    kind: RecordKind,
    client_subnet: Option<IpNetwork>,
) -> Result<Vec<u8>, DnsError> {
    let fqdn = format!("{}.", domain_name::canonical(domain));
    let name = Name::from_ascii(&fqdn).map_err(|e| DnsError::InvalidName(format!("{}: {}", domain, e)))?;

    let mut query = Query::new();
    query.set_name(name);
    query.set_query_type(record_type(kind));

    let mut message = Message::new();
    message.set_id(id);
    message.set_message_type(MessageType::Query);
    message.set_op_code(OpCode::Query);
    message.set_recursion_desired(true);
    message.add_query(query);

    if let Some(subnet) = client_subnet {
        let mut edns = Edns::new();
        edns.set_max_payload(EDNS_MAX_PAYLOAD);
        edns.options_mut().insert(EdnsOption::Unknown(
            EDNS_CLIENT_SUBNET,
            client_subnet_option(&subnet),
        ));
        message.set_edns(edns);
    }

    message
        .to_bytes()
        .map_err(|e| DnsError::InvalidName(format!("{}: {}", domain, e)))
}

/// Wire payload of a client-subnet option: family, source prefix, scope
/// prefix 0, then only the significant bytes of the network address.
pub fn client_subnet_option(subnet: &IpNetwork) -> Vec<u8> {
    let prefix = subnet.prefix();
    let significant = (prefix as usize).div_ceil(8);
    let (family, address): (u16, Vec<u8>) = match subnet.network() {
        IpAddr::V4(v4) => (1, v4.octets().to_vec()),
        IpAddr::V6(v6) => (2, v6.octets().to_vec()),
    };

    let mut data = Vec::with_capacity(4 + significant);
    data.extend_from_slice(&family.to_be_bytes());
    data.push(prefix);
    data.push(0);
    data.extend_from_slice(&address[..significant]);
    data
}

/// Decode a DoH response body into answers.
///
/// Records of types other than A, AAAA and NS are ignored. Any response
/// code other than NOERROR is an error.
pub fn parse_response(expected_id: u16, body: &[u8]) -> Result<Vec<DnsAnswer>, DnsError> {
    let message = Message::from_bytes(body).map_err(|e| DnsError::Malformed(e.to_string()))?;

    if message.message_type() != MessageType::Response {
        return Err(DnsError::Malformed("not a response".to_string()));
    }
    if message.id() != expected_id {
        return Err(DnsError::Malformed(format!(
            "id mismatch: sent {}, got {}",
            expected_id,
            message.id()
        )));
    }
    if message.response_code() != ResponseCode::NoError {
        return Err(DnsError::ResponseCode(message.response_code().to_string()));
    }

    let answers = message
        .answers()
        .iter()
        .filter_map(|record| match record.data() {
            Some(RData::A(a)) => Some(DnsAnswer::Address(IpAddr::V4(a.0))),
            Some(RData::AAAA(aaaa)) => Some(DnsAnswer::Address(IpAddr::V6(aaaa.0))),
            Some(RData::NS(ns)) => Some(DnsAnswer::Nameserver(domain_name::canonical(&ns.0.to_utf8()))),
            _ => None,
        })
        .collect();
    Ok(answers)
}

fn record_type(kind: RecordKind) -> RecordType {
    match kind {
        RecordKind::A => RecordType::A,
        RecordKind::Aaaa => RecordType::AAAA,
        RecordKind::Ns => RecordType::NS,
    }
}
