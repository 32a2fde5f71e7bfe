pub mod intent;
pub mod portfolio;
pub mod record;
pub mod transaction;

pub use intent::*;
pub use portfolio::*;
pub use record::*;
pub use transaction::*;
