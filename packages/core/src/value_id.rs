use crate::prelude::*;
use std::borrow::Cow;
use typed_builder::TypedBuilder;

/// Uniquely identifies which CC and property a value belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TypedBuilder)]
pub struct ValueId {
    command_class: CommandClasses,
    #[builder(setter(into))]
    property: u32,
    #[builder(default, setter(into))]
    property_key: Option<u32>,
}

impl ValueId {
    pub fn new(
        command_class: CommandClasses,
        property: impl Into<u32>,
        property_key: Option<u32>,
    ) -> Self {
        Self {
            command_class,
            property: property.into(),
            property_key,
        }
    }

    pub fn command_class(&self) -> CommandClasses {
        self.command_class
    }

    pub fn property(&self) -> u32 {
        self.property
    }

    pub fn property_key(&self) -> Option<u32> {
        self.property_key
    }

    pub fn at(&self, node_id: NodeId, endpoint: EndpointIndex) -> EndpointValueId {
        EndpointValueId {
            node_id,
            endpoint,
            value_id: *self,
        }
    }
}

/// Uniquely identifies which node, endpoint, CC and property a value
/// belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EndpointValueId {
    node_id: NodeId,
    endpoint: EndpointIndex,
    value_id: ValueId,
}

impl EndpointValueId {
    pub fn new(node_id: NodeId, endpoint: EndpointIndex, value_id: ValueId) -> Self {
        Self {
            node_id,
            endpoint,
            value_id,
        }
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn endpoint(&self) -> EndpointIndex {
        self.endpoint
    }

    pub fn value_id(&self) -> ValueId {
        self.value_id
    }

    pub fn command_class(&self) -> CommandClasses {
        self.value_id.command_class
    }

    pub fn property(&self) -> u32 {
        self.value_id.property
    }

    pub fn property_key(&self) -> Option<u32> {
        self.value_id.property_key
    }

    pub fn with_endpoint(&self, endpoint: EndpointIndex) -> Self {
        Self { endpoint, ..*self }
    }
}

/// A subset of [ValueId] used for matching
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ValueIdProperties {
    property: u32,
    property_key: Option<u32>,
}

impl ValueIdProperties {
    pub fn new(property: impl Into<u32>, property_key: Option<u32>) -> Self {
        Self {
            property: property.into(),
            property_key,
        }
    }

    pub fn property(&self) -> u32 {
        self.property
    }

    pub fn property_key(&self) -> Option<u32> {
        self.property_key
    }

    pub fn with_cc(&self, cc: CommandClasses) -> ValueId {
        ValueId::new(cc, self.property, self.property_key)
    }
}

impl From<ValueId> for ValueIdProperties {
    fn from(value: ValueId) -> Self {
        Self {
            property: value.property,
            property_key: value.property_key,
        }
    }
}

/// The shape of the values stored under a value id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Boolean,
    Number,
    String,
    Buffer,
    Duration,
}

/// Describes a value to applications: whether it can be read/written, what
/// type it has and how to present it. Stored separately from the values so
/// that deleting a value preserves its schema.
#[derive(Debug, Clone, PartialEq, TypedBuilder)]
pub struct ValueMetadata {
    #[builder(default = true)]
    pub readable: bool,
    #[builder(default = true)]
    pub writable: bool,
    pub value_type: ValueType,
    #[builder(default, setter(into))]
    pub min: Option<i64>,
    #[builder(default, setter(into))]
    pub max: Option<i64>,
    #[builder(default, setter(into))]
    pub label: Option<Cow<'static, str>>,
    #[builder(default, setter(into))]
    pub unit: Option<Cow<'static, str>>,
    /// Stateful values are persisted and restored across sessions;
    /// event-like values (notifications) are not
    #[builder(default = true)]
    pub stateful: bool,
}

impl ValueMetadata {
    pub fn boolean(label: impl Into<Cow<'static, str>>) -> Self {
        Self::builder()
            .value_type(ValueType::Boolean)
            .label(Some(label.into()))
            .build()
    }

    pub fn readonly_boolean(label: impl Into<Cow<'static, str>>) -> Self {
        Self::builder()
            .value_type(ValueType::Boolean)
            .writable(false)
            .label(Some(label.into()))
            .build()
    }

    pub fn level(label: impl Into<Cow<'static, str>>) -> Self {
        Self::builder()
            .value_type(ValueType::Number)
            .min(Some(0))
            .max(Some(99))
            .label(Some(label.into()))
            .build()
    }

    pub fn readonly_level(label: impl Into<Cow<'static, str>>) -> Self {
        Self {
            writable: false,
            ..Self::level(label)
        }
    }

    pub fn readonly_number(label: impl Into<Cow<'static, str>>) -> Self {
        Self::builder()
            .value_type(ValueType::Number)
            .writable(false)
            .label(Some(label.into()))
            .build()
    }

    pub fn duration(label: impl Into<Cow<'static, str>>) -> Self {
        Self::builder()
            .value_type(ValueType::Duration)
            .label(Some(label.into()))
            .build()
    }

    pub fn readonly_duration(label: impl Into<Cow<'static, str>>) -> Self {
        Self {
            writable: false,
            ..Self::duration(label)
        }
    }

    pub fn readonly_string(label: impl Into<Cow<'static, str>>) -> Self {
        Self::builder()
            .value_type(ValueType::String)
            .writable(false)
            .label(Some(label.into()))
            .build()
    }

    pub fn with_label(mut self, label: impl Into<Cow<'static, str>>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_unit(mut self, unit: impl Into<Cow<'static, str>>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn not_stateful(mut self) -> Self {
        self.stateful = false;
        self
    }
}
