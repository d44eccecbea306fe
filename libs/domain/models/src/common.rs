use serde::{Deserialize, Serialize};

/// Opaque identifier of an account (the "subject" in the original system).
/// Authentication and session handling are out of scope here; this is just
/// the key other entities reference.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccountRef(pub String);

impl AccountRef {
    pub fn new(subject: impl Into<String>) -> Self {
        Self(subject.into())
    }
}

impl std::fmt::Display for AccountRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Multiplier applied to a `TradeAgreement`'s `amount` to get a Wh value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Unit {
    Wh,
    KWh,
    MWh,
    GWh,
}

impl Unit {
    pub fn multiplier(self) -> u64 {
        match self {
            Unit::Wh => 1,
            Unit::KWh => 1_000,
            Unit::MWh => 1_000_000,
            Unit::GWh => 1_000_000_000,
        }
    }
}

/// Human label for a `(tech_code, fuel_code)` pair, e.g. ("T010000", "F01010100")
/// -> "Solar". Joined by GGOs and Meteringpoints for presentation purposes only;
/// carries no allocation semantics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Technology {
    pub tech_code: String,
    pub fuel_code: String,
    pub label: String,
}
