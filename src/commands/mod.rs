pub mod clone;
pub mod create;
pub mod delete;
pub mod doctor;
pub mod engines;
pub mod list;
pub mod rename;
pub mod start;
pub mod status;
pub mod stop;
pub mod url;
