pub mod expr;
pub mod labels;
pub mod rules;
pub mod terraform;
