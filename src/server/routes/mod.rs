pub mod oauth;
pub mod rpc;
pub mod webhooks;
