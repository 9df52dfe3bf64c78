use std::time::Duration;
use typed_builder::TypedBuilder;
use zwh_logging::Loglevel;

/// How often commands are retried before giving up
#[derive(Debug, Clone, Copy, TypedBuilder)]
pub struct Attempts {
    /// Attempts to get a frame past the controller (ACK level)
    #[builder(default = 3)]
    pub controller: u8,
    /// Attempts to get a SendData command to its destination node
    #[builder(default = 3)]
    pub send_data: u8,
}

impl Default for Attempts {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[derive(Debug, Clone, Copy, TypedBuilder)]
pub struct Timeouts {
    /// How long the controller may take to ACK a frame
    #[builder(default = Duration::from_millis(1600))]
    pub ack: Duration,
    /// How long the controller may take to answer a request
    #[builder(default = Duration::from_secs(10))]
    pub response: Duration,
    /// How long a SendData transmission may take end to end
    #[builder(default = Duration::from_secs(65))]
    pub send_data_callback: Duration,
    /// How long to wait for a security nonce from a node
    #[builder(default = Duration::from_secs(5))]
    pub nonce: Duration,
    /// How long to wait for a node to answer a single interview exchange
    #[builder(default = Duration::from_secs(30))]
    pub report: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// The network keys the driver should use. Missing keys disable the
/// corresponding security class.
#[derive(Default, Clone, TypedBuilder)]
#[builder(field_defaults(default))]
pub struct SecurityKeys {
    #[builder(setter(into))]
    pub s0_legacy: Option<Vec<u8>>,
    #[builder(setter(into))]
    pub s2_unauthenticated: Option<Vec<u8>>,
    #[builder(setter(into))]
    pub s2_authenticated: Option<Vec<u8>>,
    #[builder(setter(into))]
    pub s2_access_control: Option<Vec<u8>>,
}

#[derive(Clone, TypedBuilder)]
pub struct DriverOptions {
    /// Keep values for CCs the driver has no metadata for
    #[builder(default = true)]
    pub preserve_unknown_values: bool,
    /// Never update `currentValue` before the device confirmed it
    #[builder(default)]
    pub disable_optimistic_value_update: bool,
    #[builder(default)]
    pub attempts: Attempts,
    #[builder(default)]
    pub timeouts: Timeouts,
    #[builder(default)]
    pub security_keys: SecurityKeys,
    #[builder(default = Loglevel::Info)]
    pub log_level: Loglevel,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}
