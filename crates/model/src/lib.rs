pub mod errors;
pub mod ids;
pub mod proto;
pub mod timestamp;
pub mod training;
