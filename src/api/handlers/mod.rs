pub mod convert;
pub mod health;
pub mod read_icc;
