pub mod dev;
pub mod doctor;
pub mod graph;
pub mod init;
pub mod ports;
pub mod status;
pub mod stop;
pub mod validate;
