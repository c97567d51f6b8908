pub mod edit;
pub mod init;
pub mod repo;
