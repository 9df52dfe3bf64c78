use crate::commandclass_raw::CCRaw;
use crate::prelude::*;
use bytes::{Bytes, BytesMut};
use derive_try_from_primitive::*;
use zwh_core::parse::{
    ParseError, Parser,
    bytes::{be_u8, complete::take, rest},
    validate,
};
use zwh_core::prelude::*;
use zwh_core::security::crypto::{decrypt_ccm, encrypt_ccm};
use zwh_core::security::{S2_ENTROPY_SIZE, SecurityManagerS2};

const EXT_FLAG_UNENCRYPTED: u8 = 0b0000_0001;
const EXT_TYPE_MASK: u8 = 0b0011_1111;
const EXT_MORE_TO_FOLLOW: u8 = 0b1000_0000;
const EXT_TYPE_SPAN: u8 = 0x01;

const NONCE_REPORT_SOS: u8 = 0b0000_0001;
const NONCE_REPORT_MOS: u8 = 0b0000_0010;

const CCM_MAC_SIZE: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, TryFromPrimitive)]
#[repr(u8)]
pub enum Security2CCCommand {
    NonceGet = 0x01,
    NonceReport = 0x02,
    MessageEncapsulation = 0x03,
}

/// Asks the peer to send a fresh receiver entropy input
#[derive(Debug, Clone, PartialEq)]
pub struct Security2CCNonceGet {
    pub sequence_number: u8,
}

impl CCBase for Security2CCNonceGet {
    fn expects_response(&self) -> bool {
        true
    }

    fn test_response(&self, response: &CC) -> bool {
        matches!(response, CC::Security2CCNonceReport(_))
    }
}

impl CCValues for Security2CCNonceGet {}

impl CCId for Security2CCNonceGet {
    fn cc_id(&self) -> CommandClasses {
        CommandClasses::Security2
    }

    fn cc_command(&self) -> Option<u8> {
        Some(Security2CCCommand::NonceGet as _)
    }
}

impl CCParsable for Security2CCNonceGet {
    fn parse(i: &mut Bytes, _ctx: &CCParsingContext) -> ParseResult<Self> {
        let sequence_number = be_u8(i)?;
        Ok(Self { sequence_number })
    }
}

impl CCSerializable for Security2CCNonceGet {
    fn serialize(&self, output: &mut BytesMut, _ctx: &CCEncodingContext) {
        serialize::bytes::be_u8(self.sequence_number).serialize(output);
    }
}

impl ToLogPayload for Security2CCNonceGet {
    fn to_log_payload(&self) -> LogPayload {
        LogPayloadDict::new()
            .with_entry("sequence number", self.sequence_number)
            .into()
    }
}

/// Transfers receiver entropy (SOS) or reports lost multicast sync (MOS)
#[derive(Debug, Clone, PartialEq)]
pub struct Security2CCNonceReport {
    pub sequence_number: u8,
    pub singlecast_out_of_sync: bool,
    pub multicast_out_of_sync: bool,
    pub receiver_entropy: Option<[u8; S2_ENTROPY_SIZE]>,
}

impl CCBase for Security2CCNonceReport {}

impl CCValues for Security2CCNonceReport {}

impl CCId for Security2CCNonceReport {
    fn cc_id(&self) -> CommandClasses {
        CommandClasses::Security2
    }

    fn cc_command(&self) -> Option<u8> {
        Some(Security2CCCommand::NonceReport as _)
    }
}

impl CCParsable for Security2CCNonceReport {
    fn parse(i: &mut Bytes, _ctx: &CCParsingContext) -> ParseResult<Self> {
        let sequence_number = be_u8(i)?;
        let flags = be_u8(i)?;
        let singlecast_out_of_sync = flags & NONCE_REPORT_SOS != 0;
        let multicast_out_of_sync = flags & NONCE_REPORT_MOS != 0;

        let receiver_entropy = if singlecast_out_of_sync {
            let entropy = take(S2_ENTROPY_SIZE).parse(i)?;
            let mut buf = [0u8; S2_ENTROPY_SIZE];
            buf.copy_from_slice(&entropy);
            Some(buf)
        } else {
            None
        };

        Ok(Self {
            sequence_number,
            singlecast_out_of_sync,
            multicast_out_of_sync,
            receiver_entropy,
        })
    }
}

impl CCSerializable for Security2CCNonceReport {
    fn serialize(&self, output: &mut BytesMut, _ctx: &CCEncodingContext) {
        use serialize::bytes::{be_u8, slice};

        let mut flags = 0;
        if self.singlecast_out_of_sync {
            flags |= NONCE_REPORT_SOS;
        }
        if self.multicast_out_of_sync {
            flags |= NONCE_REPORT_MOS;
        }
        be_u8(self.sequence_number).serialize(output);
        be_u8(flags).serialize(output);
        if let Some(entropy) = &self.receiver_entropy {
            slice(entropy).serialize(output);
        }
    }
}

impl ToLogPayload for Security2CCNonceReport {
    fn to_log_payload(&self) -> LogPayload {
        LogPayloadDict::new()
            .with_entry("sequence number", self.sequence_number)
            .with_entry("SOS", self.singlecast_out_of_sync)
            .with_entry("MOS", self.multicast_out_of_sync)
            .into()
    }
}

/// Carries a command protected with AES-128-CCM under the keys of the given
/// security class. The nonce comes from the SPAN shared with the peer.
#[derive(Debug, Clone, PartialEq)]
pub struct Security2CCMessageEncapsulation {
    pub sequence_number: u8,
    pub security_class: SecurityClass,
    /// Sender entropy transferred in a SPAN extension while the SPAN is
    /// being established
    pub sender_entropy: Option<[u8; S2_ENTROPY_SIZE]>,
    pub encapsulated: Box<CC>,
}

fn serialize_span_extension(entropy: &[u8; S2_ENTROPY_SIZE], output: &mut Vec<u8>) {
    output.push(2 + S2_ENTROPY_SIZE as u8);
    output.push(EXT_TYPE_SPAN | 0b0100_0000); // critical
    output.extend_from_slice(entropy);
}

impl Security2CCMessageEncapsulation {
    fn build_aad(
        sender: NodeId,
        receiver: NodeId,
        home_id: u32,
        message_length: u16,
        header: &[u8],
    ) -> Vec<u8> {
        let mut aad = Vec::with_capacity(8 + header.len());
        aad.push(sender.into());
        aad.push(receiver.into());
        aad.extend_from_slice(&home_id.to_be_bytes());
        aad.extend_from_slice(&message_length.to_be_bytes());
        aad.extend_from_slice(header);
        aad
    }
}

impl CCBase for Security2CCMessageEncapsulation {
    fn expects_response(&self) -> bool {
        self.encapsulated.expects_response()
    }

    fn test_response(&self, response: &CC) -> bool {
        let CC::Security2CCMessageEncapsulation(response) = response else {
            return false;
        };
        self.encapsulated.test_response(&response.encapsulated)
    }
}

impl CCValues for Security2CCMessageEncapsulation {}

impl CCId for Security2CCMessageEncapsulation {
    fn cc_id(&self) -> CommandClasses {
        CommandClasses::Security2
    }

    fn cc_command(&self) -> Option<u8> {
        Some(Security2CCCommand::MessageEncapsulation as _)
    }
}

impl CCParsable for Security2CCMessageEncapsulation {
    fn parse(i: &mut Bytes, ctx: &CCParsingContext) -> ParseResult<Self> {
        let Some(manager) = &ctx.security_manager_s2 else {
            return Err(ParseError::security_failure(
                "received an S2 encapsulated command, but the S2 security manager is not configured",
            ));
        };

        let full_len = i.len();
        let sequence_number = be_u8(i)?;
        let ext_flags = be_u8(i)?;

        let mut sender_entropy = None;
        if ext_flags & EXT_FLAG_UNENCRYPTED != 0 {
            loop {
                let len = be_u8(i)?;
                validate(len >= 2, "S2 extension too short")?;
                let control = be_u8(i)?;
                let data = take(len as usize - 2).parse(i)?;
                if control & EXT_TYPE_MASK == EXT_TYPE_SPAN {
                    validate(
                        data.len() == S2_ENTROPY_SIZE,
                        "SPAN extension must carry 16 bytes of entropy",
                    )?;
                    let mut buf = [0u8; S2_ENTROPY_SIZE];
                    buf.copy_from_slice(&data);
                    sender_entropy = Some(buf);
                }
                if control & EXT_MORE_TO_FOLLOW == 0 {
                    break;
                }
            }
        }

        let header_len = full_len - i.len();
        let ciphertext = rest(i)?;
        validate(
            ciphertext.len() > CCM_MAC_SIZE,
            "S2 encapsulation has no payload",
        )?;

        // A SPAN extension means the sender just (re)synchronized: mix its
        // entropy with the one we handed out in our nonce report
        let peer = ctx.source_node_id;
        // The peer's granted class selects which network key to decrypt with
        let security_class = ctx.security_class;
        if let Some(sender_ei) = &sender_entropy {
            let Some(receiver_ei) = manager.local_entropy(peer) else {
                return Err(ParseError::security_failure(
                    "received a SPAN extension without having sent entropy",
                ));
            };
            manager.establish_span(peer, security_class, sender_ei, &receiver_ei);
        }

        let Some(nonce) = manager.next_span_nonce(peer) else {
            return Err(ParseError::security_failure("SPAN is not established"));
        };
        let Some(keys) = manager.keys(security_class) else {
            return Err(ParseError::security_failure(
                "no network key for the S2 security class",
            ));
        };

        // AAD covers the addressing and the whole unencrypted part of the CC
        let header = {
            // Reconstruct the header bytes we consumed above
            let mut h = Vec::with_capacity(header_len);
            h.push(sequence_number);
            h.push(ext_flags);
            if let Some(entropy) = &sender_entropy {
                serialize_span_extension(entropy, &mut h);
            }
            h
        };
        validate(header.len() == header_len, "inconsistent S2 header")?;
        let message_length = (2 + full_len) as u16;
        let aad = Self::build_aad(
            ctx.source_node_id,
            ctx.own_node_id,
            ctx.home_id,
            message_length,
            &header,
        );

        let Some(plaintext) = decrypt_ccm(&ciphertext, &keys.key_ccm, &nonce, &aad) else {
            manager.record_mac_failure(peer);
            return Err(ParseError::security_failure(
                "message authentication failed",
            ));
        };
        manager.reset_mac_failures(peer);

        let mut inner = Bytes::from(plaintext);
        let raw = CCRaw::parse(&mut inner)?;
        let encapsulated = CC::try_from_raw(raw, ctx)?;

        Ok(Self {
            sequence_number,
            security_class,
            sender_entropy,
            encapsulated: Box::new(encapsulated),
        })
    }
}

impl CCSerializable for Security2CCMessageEncapsulation {
    fn serialize(&self, output: &mut BytesMut, ctx: &CCEncodingContext) {
        use serialize::bytes::slice;

        let manager: &SecurityManagerS2 = ctx
            .security_manager_s2
            .as_ref()
            .expect("the S2 security manager must be configured to send secure commands");

        let mut header = vec![
            self.sequence_number,
            if self.sender_entropy.is_some() {
                EXT_FLAG_UNENCRYPTED
            } else {
                0
            },
        ];
        if let Some(entropy) = &self.sender_entropy {
            serialize_span_extension(entropy, &mut header);
        }

        let nonce = manager
            .next_span_nonce(ctx.node_id)
            .expect("the SPAN must be established before sending S2 commands");
        let keys = manager
            .keys(self.security_class)
            .expect("a network key must be configured for the S2 security class");

        let plaintext = self.encapsulated.as_raw(ctx).as_bytes();
        let message_length = (2 + header.len() + plaintext.len() + CCM_MAC_SIZE) as u16;
        let aad = Self::build_aad(
            ctx.own_node_id,
            ctx.node_id,
            ctx.home_id,
            message_length,
            &header,
        );
        let ciphertext = encrypt_ccm(&plaintext, &keys.key_ccm, &nonce, &aad);

        slice(header).serialize(output);
        slice(ciphertext).serialize(output);
    }
}

impl ToLogPayload for Security2CCMessageEncapsulation {
    fn to_log_payload(&self) -> LogPayload {
        LogPayloadText::new("S2 encapsulation")
            .with_nested(self.encapsulated.to_log_payload())
            .into()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn establish_pair(class: SecurityClass) -> (SecurityManagerS2, SecurityManagerS2) {
        let host = SecurityManagerS2::new(NodeId::new(1));
        let node = SecurityManagerS2::new(NodeId::new(5));
        let key = [0x42u8; 16];
        host.set_network_key(class, &key);
        node.set_network_key(class, &key);

        let sender_ei = [0x11u8; S2_ENTROPY_SIZE];
        let receiver_ei = [0x22u8; S2_ENTROPY_SIZE];
        host.establish_span(NodeId::new(5), class, &sender_ei, &receiver_ei);
        node.establish_span(NodeId::new(1), class, &sender_ei, &receiver_ei);
        (host, node)
    }

    #[test]
    fn test_encrypt_decrypt() {
        // Use a non-default class so the key selection is actually driven
        // by the granted class on both sides
        let class = SecurityClass::S2AccessControl;
        let (host, node) = establish_pair(class);

        let inner = CC::from(
            BinarySwitchCCSet::builder().target_value(BinarySet::On).build(),
        );
        let encap = Security2CCMessageEncapsulation {
            sequence_number: 7,
            security_class: class,
            sender_entropy: None,
            encapsulated: Box::new(inner.clone()),
        };

        let enc_ctx = CCEncodingContext::builder()
            .own_node_id(NodeId::new(1))
            .node_id(NodeId::new(5))
            .home_id(0xdeadbeef)
            .security_manager_s2(host)
            .build();
        let bytes = CC::from(encap).as_raw(&enc_ctx).as_bytes();
        assert_eq!(&bytes[..2], &[0x9f, 0x03]);

        let parse_ctx = CCParsingContext::builder()
            .source_node_id(NodeId::new(1))
            .own_node_id(NodeId::new(5))
            .home_id(0xdeadbeef)
            .security_class(class)
            .security_manager_s2(node)
            .build();
        let mut input = bytes;
        let raw = CCRaw::parse(&mut input).unwrap();
        let parsed = CC::try_from_raw(raw, &parse_ctx).unwrap();
        let CC::Security2CCMessageEncapsulation(parsed) = parsed else {
            panic!("expected an S2 encapsulation");
        };
        assert_eq!(*parsed.encapsulated, inner);
        assert_eq!(parsed.security_class, class);
    }

    #[test]
    fn test_wrong_granted_class_fails_authentication() {
        let (host, node) = establish_pair(SecurityClass::S2Authenticated);
        node.set_network_key(SecurityClass::S2Unauthenticated, &[0x99u8; 16]);

        let encap = Security2CCMessageEncapsulation {
            sequence_number: 9,
            security_class: SecurityClass::S2Authenticated,
            sender_entropy: None,
            encapsulated: Box::new(CC::from(BinarySwitchCCGet::default())),
        };
        let enc_ctx = CCEncodingContext::builder()
            .own_node_id(NodeId::new(1))
            .node_id(NodeId::new(5))
            .security_manager_s2(host)
            .build();
        let bytes = CC::from(encap).as_raw(&enc_ctx).as_bytes();

        // Decrypting under a different class than the sender used must not
        // silently succeed
        let parse_ctx = CCParsingContext::builder()
            .source_node_id(NodeId::new(1))
            .own_node_id(NodeId::new(5))
            .security_class(SecurityClass::S2Unauthenticated)
            .security_manager_s2(node)
            .build();
        let mut input = bytes;
        let raw = CCRaw::parse(&mut input).unwrap();
        let err = CC::try_from_raw(raw, &parse_ctx).unwrap_err();
        assert!(err.is_security_failure());
    }

    #[test]
    fn test_mac_failure_is_reported() {
        let (host, node) = establish_pair(SecurityClass::S2Authenticated);

        let encap = Security2CCMessageEncapsulation {
            sequence_number: 8,
            security_class: SecurityClass::S2Authenticated,
            sender_entropy: None,
            encapsulated: Box::new(CC::from(BinarySwitchCCGet::default())),
        };
        let enc_ctx = CCEncodingContext::builder()
            .own_node_id(NodeId::new(1))
            .node_id(NodeId::new(5))
            .security_manager_s2(host)
            .build();
        let mut bytes = CC::from(encap).as_raw(&enc_ctx).as_bytes().to_vec();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;

        let parse_ctx = CCParsingContext::builder()
            .source_node_id(NodeId::new(1))
            .own_node_id(NodeId::new(5))
            .security_class(SecurityClass::S2Authenticated)
            .security_manager_s2(node)
            .build();
        let mut input = Bytes::from(bytes);
        let raw = CCRaw::parse(&mut input).unwrap();
        let err = CC::try_from_raw(raw, &parse_ctx).unwrap_err();
        assert!(err.is_security_failure());
    }
}
