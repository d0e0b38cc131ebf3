pub mod bench;
pub mod inventory;
pub mod status;
