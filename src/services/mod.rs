pub mod insights;
pub mod pricing;
