pub mod segment;
pub mod status;
