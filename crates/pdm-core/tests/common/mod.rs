pub mod ftp_server;
pub mod range_server;
