pub mod config;
pub mod form;
pub mod mapping;
pub mod serve;
pub mod store;
pub mod substitution;
pub mod tomldir;
pub mod topic;
pub mod transform;
