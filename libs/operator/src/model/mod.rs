pub mod address;
pub mod attributes;
pub mod plan;
pub mod tree;
pub mod workload;
