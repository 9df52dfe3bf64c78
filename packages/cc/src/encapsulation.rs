use crate::commandclass::*;
use typed_builder::TypedBuilder;
use zwh_core::prelude::*;

/// The largest CC that fits a single frame without security overhead
pub const SINGLE_FRAME_MTU: usize = 46;
/// The largest CC that fits a single frame when Security S0 wraps it
pub const SINGLE_FRAME_MTU_SECURE: usize = 39;

/// How a command should be wrapped on its way out
#[derive(Default, TypedBuilder)]
#[builder(field_defaults(default))]
pub struct EncapsulationOptions {
    pub endpoint_index: EndpointIndex,
    /// Protect the command with a CRC16 checksum
    pub use_crc16: bool,
    /// Ask for an explicit success/failure confirmation. Only honored when
    /// a session id was assigned.
    #[builder(setter(into))]
    pub supervision_session_id: Option<u8>,
    /// The security class to encrypt with; `None` sends in the clear
    #[builder(default = SecurityClass::None)]
    pub security_class: SecurityClass,
    #[builder(setter(into))]
    pub s2_sequence_number: Option<u8>,
    /// Session id for Transport Service segmentation, should it be needed
    pub segment_session_id: u8,
}

impl EncapsulationOptions {
    pub fn for_endpoint(endpoint_index: EndpointIndex) -> Self {
        Self::builder().endpoint_index(endpoint_index).build()
    }
}

/// A command ready for the wire: either a single CC or the Transport
/// Service segments of one that did not fit a frame
pub enum EncapsulatedCC {
    Single(CC),
    Segmented { session_id: u8, segments: Vec<CC> },
}

/// Applies the encapsulation layers in their fixed resolution order:
/// application CC, CRC16, Multi Channel, Supervision, Security, and finally
/// Transport Service when the result exceeds the single-frame MTU.
pub fn encapsulate(
    cc: CC,
    options: &EncapsulationOptions,
    ctx: &CCEncodingContext,
) -> EncapsulatedCC {
    let mut current = cc;

    if options.use_crc16 {
        current = Crc16CCCommandEncapsulation::new(current).into();
    }

    if let EndpointIndex::Endpoint(index) = options.endpoint_index {
        current = MultiChannelCCCommandEncapsulation::new(index, current).into();
    }

    if let Some(session_id) = options.supervision_session_id {
        current = SupervisionCCGet::new(session_id, current).into();
    }

    // The MTU decision is made on the unencrypted size; security overhead
    // is what shrinks the budget from 46 to 39 bytes
    let unencrypted_size = current.as_raw(ctx).as_bytes().len();

    let secure = options.security_class != SecurityClass::None;
    match options.security_class {
        SecurityClass::S0Legacy => {
            current = SecurityCCCommandEncapsulation::new(current).into();
        }
        class if class.is_s2() => {
            current = Security2CCMessageEncapsulation {
                sequence_number: options.s2_sequence_number.unwrap_or_default(),
                security_class: class,
                sender_entropy: None,
                encapsulated: Box::new(current),
            }
            .into();
        }
        _ => {}
    }

    let mtu = if secure {
        SINGLE_FRAME_MTU_SECURE
    } else {
        SINGLE_FRAME_MTU
    };
    if unencrypted_size > mtu {
        // Serialize exactly once (security consumes nonces) and ship the
        // datagram in segments
        let datagram = current.as_raw(ctx).as_bytes();
        let segments = segment_datagram(&datagram, options.segment_session_id);
        EncapsulatedCC::Segmented {
            session_id: options.segment_session_id,
            segments,
        }
    } else {
        EncapsulatedCC::Single(current)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use bytes::Bytes;

    fn binary_get() -> CC {
        BinarySwitchCCGet::default().into()
    }

    #[test]
    fn test_plain_cc_stays_unwrapped() {
        let result = encapsulate(
            binary_get(),
            &EncapsulationOptions::default(),
            &CCEncodingContext::default(),
        );
        let EncapsulatedCC::Single(cc) = result else {
            panic!("expected a single CC");
        };
        assert!(matches!(cc, CC::BinarySwitchCCGet(_)));
    }

    #[test]
    fn test_endpoint_gets_multi_channel() {
        let options = EncapsulationOptions::for_endpoint(EndpointIndex::Endpoint(2));
        let result = encapsulate(binary_get(), &options, &CCEncodingContext::default());
        let EncapsulatedCC::Single(cc) = result else {
            panic!("expected a single CC");
        };
        let bytes = cc.as_raw(&CCEncodingContext::default()).as_bytes();
        assert_eq!(bytes, Bytes::from_static(&[0x60, 0x0d, 0x00, 0x02, 0x25, 0x02]));
    }

    #[test]
    fn test_crc16_inside_multi_channel() {
        let options = EncapsulationOptions::builder()
            .endpoint_index(EndpointIndex::Endpoint(1))
            .use_crc16(true)
            .build();
        let result = encapsulate(binary_get(), &options, &CCEncodingContext::default());
        let EncapsulatedCC::Single(cc) = result else {
            panic!("expected a single CC");
        };
        // Multi Channel is the outer layer, CRC16 sits inside
        let CC::MultiChannelCCCommandEncapsulation(outer) = &cc else {
            panic!("expected Multi Channel outermost");
        };
        assert!(matches!(
            *outer.encapsulated,
            CC::Crc16CCCommandEncapsulation(_)
        ));
    }

    #[test]
    fn test_supervision_outside_multi_channel() {
        let options = EncapsulationOptions::builder()
            .endpoint_index(EndpointIndex::Endpoint(1))
            .supervision_session_id(3u8)
            .build();
        let result = encapsulate(binary_get(), &options, &CCEncodingContext::default());
        let EncapsulatedCC::Single(cc) = result else {
            panic!("expected a single CC");
        };
        let CC::SupervisionCCGet(outer) = &cc else {
            panic!("expected Supervision outermost");
        };
        assert!(matches!(
            *outer.encapsulated,
            CC::MultiChannelCCCommandEncapsulation(_)
        ));
    }
}
