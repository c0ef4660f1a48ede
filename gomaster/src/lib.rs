#![doc = include_str!("../README.md")]

pub mod chat;
pub mod config;
pub mod deadgroup;
pub mod error;
pub mod genmove;
pub mod history;
pub mod ident;
pub mod listener;
pub mod logging;
pub mod master;
pub mod proxy;
pub mod replies;
pub mod select;
pub mod worker;

/// Register every module's biometrics with one collector, the way `busyrpc::register_biometrics`
/// fans out to its own submodules.
pub fn register_biometrics(collector: &mut biometrics::Collector) {
    chat::register_biometrics(collector);
    deadgroup::register_biometrics(collector);
    genmove::register_biometrics(collector);
    listener::register_biometrics(collector);
    logging::register_biometrics(collector);
    master::register_biometrics(collector);
    proxy::register_biometrics(collector);
    select::register_biometrics(collector);
    worker::register_biometrics(collector);
}
