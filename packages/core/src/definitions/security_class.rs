use std::fmt::Display;

/// The security classes a node can be granted, ordered from lowest to
/// highest trust
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SecurityClass {
    #[default]
    None,
    S0Legacy,
    S2Unauthenticated,
    S2Authenticated,
    S2AccessControl,
}

impl SecurityClass {
    pub fn is_s2(&self) -> bool {
        matches!(
            self,
            Self::S2Unauthenticated | Self::S2Authenticated | Self::S2AccessControl
        )
    }
}

impl Display for SecurityClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::None => "None",
            Self::S0Legacy => "S0 Legacy",
            Self::S2Unauthenticated => "S2 Unauthenticated",
            Self::S2Authenticated => "S2 Authenticated",
            Self::S2AccessControl => "S2 Access Control",
        };
        write!(f, "{}", name)
    }
}
