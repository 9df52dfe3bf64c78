use zwh_core::prelude::*;

/// A value a CC exposes to applications: its id within the CC plus the
/// metadata describing it
#[derive(Debug, Clone, PartialEq)]
pub struct CCValue {
    pub id: ValueId,
    pub metadata: ValueMetadata,
}

impl CCValue {
    pub fn new(id: ValueId, metadata: ValueMetadata) -> Self {
        Self { id, metadata }
    }
}

/// Defines an accessor for a statically known CC value:
/// `cc_value!(pub current_value, BinarySwitch, 0x00, ValueMetadata::...)`
#[macro_export]
macro_rules! cc_value {
    ($vis:vis $name:ident, $cc:ident, $property:expr, $metadata:expr) => {
        $vis fn $name() -> $crate::values::CCValue {
            $crate::values::CCValue::new(
                zwh_core::value_id::ValueId::new(
                    zwh_core::definitions::CommandClasses::$cc,
                    $property as u32,
                    None,
                ),
                $metadata,
            )
        }
    };
}
