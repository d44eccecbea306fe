use serde::{Deserialize, Serialize};

use crate::common::AccountRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MeteringPointType {
    Production,
    Consumption,
}

/// A physical facility, either producing or consuming electricity.
///
/// `retiring_priority` ranks this meteringpoint among its owner's other
/// consumption facilities when the allocation engine enumerates retire
/// consumers: lower number, higher priority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meteringpoint {
    pub public_id: String,
    pub gsrn: String,
    pub meteringpoint_type: MeteringPointType,
    pub sector: String,
    pub tech_code: Option<String>,
    pub fuel_code: Option<String>,
    pub name: String,
    pub retiring_priority: Option<i32>,
    pub subject: AccountRef,
    pub tags: Vec<String>,
}

impl Meteringpoint {
    pub fn is_producer(&self) -> bool {
        self.meteringpoint_type == MeteringPointType::Production
    }

    pub fn is_consumer(&self) -> bool {
        self.meteringpoint_type == MeteringPointType::Consumption
    }
}
