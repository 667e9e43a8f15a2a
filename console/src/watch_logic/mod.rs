pub mod input;
pub mod session;
pub mod view;
