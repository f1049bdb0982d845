pub mod audit;
pub mod builder;
pub mod bus;
pub mod config;
pub mod consts;
pub mod events;
pub mod message;
pub mod request;
pub mod retry;
pub mod template;
pub mod worker;
