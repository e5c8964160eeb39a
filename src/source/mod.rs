pub mod browser;
pub mod html;
pub mod http;
pub mod resolver;
pub mod signed_url;
