// [libs/infra/db/src/repositories/mod.rs]
//! One repository per entity (§C), each a zero-sized struct with async
//! associated functions taking an explicit `&libsql::Connection` — the
//! teacher's repository-per-entity convention, adapted so every repository
//! can share the single connection/transaction `LedgerUnitOfWork` opens per
//! call into the allocation engine or agreement manager.

pub mod agreement_repository;
pub mod batch_repository;
pub mod ggo_repository;
pub mod measurement_repository;
pub mod meteringpoint_repository;
pub mod technology_repository;
pub mod transaction_repository;
pub mod unit_of_work;

pub use agreement_repository::AgreementRepository;
pub use batch_repository::BatchRepository;
pub use ggo_repository::GgoRepository;
pub use measurement_repository::MeasurementRepository;
pub use meteringpoint_repository::MeteringpointRepository;
pub use technology_repository::TechnologyRepository;
pub use transaction_repository::TransactionRepository;
pub use unit_of_work::LedgerUnitOfWork;
