pub mod adf;
pub mod time;
