#[macro_use]
pub mod macros;

agg_mod![db, error, memory, models, store, utils];

pub use error::StoreError;
pub use store::LedgerStore;
