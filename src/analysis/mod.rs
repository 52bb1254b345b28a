pub mod flaw;
pub mod metrics;
pub mod style;
