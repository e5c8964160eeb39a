pub mod audit;
pub mod config;
pub mod decode;
pub mod index;
pub mod mojibake;
pub mod paths;
pub mod pipeline;
pub mod snapshot;
pub mod state;
pub mod stats;
pub mod util;
pub mod warn;
