pub mod composer;
pub mod consumers;
pub mod engine;
pub mod ports;

pub use composer::{ComposedBatch, Composer, ComposerError};
pub use consumers::{
    AgreementConsumer, AgreementLimitedToConsumptionConsumer, GgoConsumer, RetiringConsumer,
    build_consumer_chain,
};
pub use engine::{allocate_on_receive, consume_ggo, EngineError};
pub use ports::{
    AgreementStore, Clock, GgoStore, LedgerWriter, MeasurementStore, MeteringpointStore, Ports,
    StoreError, SystemClock, TransactionStore,
};
