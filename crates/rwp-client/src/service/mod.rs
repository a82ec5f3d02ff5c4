pub mod auto_login;
pub mod channel;
pub mod tokens;
