pub mod alert;
pub mod event;
pub mod pattern;
pub mod phase;
pub mod risk;
pub mod settings;
pub mod similarity;
pub mod snapshot;
pub mod storage;

pub use alert::*;
pub use event::*;
pub use pattern::*;
pub use phase::*;
pub use risk::*;
pub use settings::*;
pub use similarity::*;
pub use snapshot::*;
pub use storage::*;
