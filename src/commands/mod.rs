pub mod events;
pub mod risk;
pub mod settings;
pub mod storage;
