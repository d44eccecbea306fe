//! Shared data model for the GGO ledger.
//!
//! These types carry no I/O: persistence lives in `ggo-infra-db`, business
//! rules that act on several entities at once live in `ggo-domain-engine`
//! and `ggo-domain-agreements`. What's here is the entity shapes and the
//! state-machine methods that only need the entity's own fields.

pub mod common;
pub mod meteringpoint;
pub mod measurement;
pub mod ggo;
pub mod transaction;
pub mod batch;
pub mod agreement;

pub use common::{AccountRef, Technology, Unit};
pub use meteringpoint::{Meteringpoint, MeteringPointType};
pub use measurement::Measurement;
pub use ggo::Ggo;
pub use transaction::{RetireTransaction, SplitTarget, SplitTransaction, Transaction};
pub use batch::{Batch, BatchState};
pub use agreement::{AgreementDirection, AgreementState, TradeAgreement};
