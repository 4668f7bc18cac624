pub mod audit;
pub mod client;
pub mod network;
pub mod project;
pub mod user;
pub mod vpu_user;
