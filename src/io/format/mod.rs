pub mod hcl;
pub mod yaml;
